// Price normalization: currency conversion, baggage and booking fees, tax,
// and final-price ranking.

use crate::model::{CabinClass, Itinerary, PriceBreakdown, SearchRequest};
use anyhow::{anyhow, ensure};
use async_trait::async_trait;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

// Rate conversion collaborator. Implementations may call out to a remote
// service; failures are absorbed per itinerary by the normalizer.
#[async_trait]
pub trait CurrencyConverter: Send + Sync {
    async fn convert(&self, amount: f64, from: &str, to: &str) -> anyhow::Result<f64>;
}

/// Returns every amount unchanged.
pub struct IdentityConverter;

#[async_trait]
impl CurrencyConverter for IdentityConverter {
    async fn convert(&self, amount: f64, _from: &str, _to: &str) -> anyhow::Result<f64> {
        Ok(amount)
    }
}

// Fixed rate table, each rate in units of currency per one unit of `base`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StaticRateConverter {
    pub base: String,
    pub rates: HashMap<String, f64>,
}

impl StaticRateConverter {
    pub fn new(base: impl Into<String>, rates: HashMap<String, f64>) -> Self {
        Self {
            base: base.into(),
            rates,
        }
    }

    fn rate(&self, currency: &str) -> anyhow::Result<f64> {
        if currency == self.base {
            return Ok(1.0);
        }
        let rate = self
            .rates
            .get(currency)
            .copied()
            .ok_or_else(|| anyhow!("no rate for {currency}"))?;
        ensure!(rate.is_finite() && rate > 0.0, "unusable rate {rate} for {currency}");
        Ok(rate)
    }
}

#[async_trait]
impl CurrencyConverter for StaticRateConverter {
    async fn convert(&self, amount: f64, from: &str, to: &str) -> anyhow::Result<f64> {
        if from == to {
            return Ok(amount);
        }
        Ok(amount / self.rate(from)? * self.rate(to)?)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BaggageAllowance {
    pub free_bags: u32,
    pub fee_per_bag: f64,
}

// Fee amounts are in the settlement currency
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PricingConfig {
    pub economy: BaggageAllowance,
    pub premium_economy: BaggageAllowance,
    pub business: BaggageAllowance,
    pub first: BaggageAllowance,
    pub booking_fees: HashMap<String, f64>,
    pub default_booking_fee: f64,
    pub virtual_interline_booking_fee: f64,
    pub tax_rate: f64,
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            economy: BaggageAllowance {
                free_bags: 0,
                fee_per_bag: 350.0,
            },
            premium_economy: BaggageAllowance {
                free_bags: 1,
                fee_per_bag: 300.0,
            },
            business: BaggageAllowance {
                free_bags: 2,
                fee_per_bag: 250.0,
            },
            first: BaggageAllowance {
                free_bags: 2,
                fee_per_bag: 250.0,
            },
            booking_fees: HashMap::new(),
            default_booking_fee: 50.0,
            virtual_interline_booking_fee: 150.0,
            tax_rate: 0.15,
        }
    }
}

impl PricingConfig {
    pub fn allowance(&self, cabin: CabinClass) -> BaggageAllowance {
        match cabin {
            CabinClass::Economy => self.economy,
            CabinClass::PremiumEconomy => self.premium_economy,
            CabinClass::Business => self.business,
            CabinClass::First => self.first,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PricingPreferences {
    pub currency: String,
    pub passengers: u32,
    pub bags: u32,
    pub cabin_class: CabinClass,
}

impl From<&SearchRequest> for PricingPreferences {
    fn from(request: &SearchRequest) -> Self {
        Self {
            currency: request.currency.clone(),
            passengers: request.passengers,
            bags: request.bags,
            cabin_class: request.cabin_class,
        }
    }
}

pub struct PriceNormalizer {
    config: PricingConfig,
    converter: Arc<dyn CurrencyConverter>,
}

impl PriceNormalizer {
    pub fn new(config: PricingConfig, converter: Arc<dyn CurrencyConverter>) -> Self {
        Self { config, converter }
    }

    /// Bags beyond the per-passenger free allowance are charged per bag.
    pub fn baggage_fee(&self, prefs: &PricingPreferences) -> f64 {
        let allowance = self.config.allowance(prefs.cabin_class);
        let free = allowance.free_bags.saturating_mul(prefs.passengers);
        f64::from(prefs.bags.saturating_sub(free)) * allowance.fee_per_bag
    }

    /// Self transfers carry their own, higher fee.
    pub fn booking_fee(&self, itinerary: &Itinerary) -> f64 {
        if itinerary.virtual_interline {
            return self.config.virtual_interline_booking_fee;
        }
        self.config
            .booking_fees
            .get(itinerary.source.as_str())
            .copied()
            .unwrap_or(self.config.default_booking_fee)
    }

    pub async fn price(
        &self,
        itinerary: &Itinerary,
        prefs: &PricingPreferences,
    ) -> anyhow::Result<PriceBreakdown> {
        ensure!(
            itinerary.price.is_finite() && itinerary.price >= 0.0,
            "invalid price {}",
            itinerary.price
        );

        let base = if itinerary.currency == prefs.currency {
            itinerary.price
        } else {
            self.converter
                .convert(itinerary.price, &itinerary.currency, &prefs.currency)
                .await?
        };
        ensure!(base.is_finite(), "conversion produced {base}");

        let baggage_fee = self.baggage_fee(prefs);
        let booking_fee = self.booking_fee(itinerary);
        let tax = base * self.config.tax_rate;

        Ok(PriceBreakdown {
            currency: prefs.currency.clone(),
            base,
            baggage_fee,
            booking_fee,
            tax,
            final_price: base + baggage_fee + booking_fee + tax,
        })
    }

    /// Prices every itinerary. One that cannot be priced is logged and kept
    /// as it was rather than dropped.
    pub async fn normalize_all(
        &self,
        itineraries: Vec<Itinerary>,
        prefs: &PricingPreferences,
    ) -> Vec<Itinerary> {
        let priced = join_all(itineraries.into_iter().map(|itinerary| async move {
            let pricing = self.price(&itinerary, prefs).await;
            (itinerary, pricing)
        }))
        .await;

        priced
            .into_iter()
            .map(|(mut itinerary, pricing)| {
                match pricing {
                    Ok(breakdown) => itinerary.pricing = Some(breakdown),
                    Err(e) => warn!(
                        id = %itinerary.id,
                        currency = %itinerary.currency,
                        error = %e,
                        "could not normalize price, keeping raw price"
                    ),
                }
                itinerary
            })
            .collect()
    }
}

/// Stable ascending sort on final price.
pub fn sort_by_price(mut itineraries: Vec<Itinerary>) -> Vec<Itinerary> {
    itineraries.sort_by(|a, b| a.final_price().total_cmp(&b.final_price()));
    itineraries
}

pub fn filter_by_max_price(itineraries: Vec<Itinerary>, max_price: f64) -> Vec<Itinerary> {
    let before = itineraries.len();
    let kept: Vec<Itinerary> = itineraries
        .into_iter()
        .filter(|itinerary| itinerary.final_price() <= max_price)
        .collect();
    debug!(before, after = kept.len(), max_price, "applied price cap");
    kept
}
