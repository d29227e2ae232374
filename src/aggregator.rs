// Aggregation pipeline: provider fan-out, stitching, dedup, validation,
// pricing, ranking, booking links and result caching behind one entry point.

use crate::cache::{InMemorySearchCache, SearchCache};
use crate::config::SearchConfig;
use crate::dedup::deduplicate;
use crate::model::{Itinerary, ItinerarySource, RequestError, SearchRequest, TripType};
use crate::pricing::{
    filter_by_max_price, sort_by_price, CurrencyConverter, IdentityConverter, PriceNormalizer,
    PricingPreferences,
};
use crate::provider::{BookingLinkGenerator, FlightProvider, ProviderError};
use crate::reference::ReferenceData;
use crate::stitcher::RouteStitcher;
use crate::validator::RouteValidator;
use anyhow::{bail, Context};
use chrono::Utc;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, error, info, warn};

#[derive(Error, Debug)]
pub enum SearchError {
    #[error("Invalid search request: {0}")]
    InvalidRequest(#[from] RequestError),

    #[error("Search timed out after {0}ms")]
    Timeout(u64),

    // Stage failures are logged with the request and never surfaced individually
    #[error("Search failed, please try again")]
    SearchFailed,
}

pub struct RouteAggregator {
    providers: Vec<Arc<dyn FlightProvider>>,
    multi_leg_links: Arc<dyn BookingLinkGenerator>,
    cache: Arc<dyn SearchCache>,
    config: SearchConfig,
    validator: RouteValidator,
    stitcher: RouteStitcher,
    normalizer: PriceNormalizer,
}

impl RouteAggregator {
    /// Aggregator over `providers` with the built-in reference data, no
    /// currency conversion and an in-process cache sized by `config.cache`.
    pub fn new(
        config: SearchConfig,
        providers: Vec<Arc<dyn FlightProvider>>,
        multi_leg_links: Arc<dyn BookingLinkGenerator>,
    ) -> Self {
        let validator = RouteValidator::new(
            config.connection.clone(),
            config.duration.clone(),
            Arc::new(ReferenceData::builtin()),
        );
        let stitcher = RouteStitcher::new(config.stitching.clone(), validator.clone());
        let normalizer = PriceNormalizer::new(config.pricing.clone(), Arc::new(IdentityConverter));
        let cache = Arc::new(InMemorySearchCache::new(config.cache.clone()));

        Self {
            providers,
            multi_leg_links,
            cache,
            config,
            validator,
            stitcher,
            normalizer,
        }
    }

    pub fn with_reference(mut self, reference: Arc<ReferenceData>) -> Self {
        self.validator = RouteValidator::new(
            self.config.connection.clone(),
            self.config.duration.clone(),
            reference,
        );
        self.stitcher = RouteStitcher::new(self.config.stitching.clone(), self.validator.clone());
        self
    }

    pub fn with_converter(mut self, converter: Arc<dyn CurrencyConverter>) -> Self {
        self.normalizer = PriceNormalizer::new(self.config.pricing.clone(), converter);
        self
    }

    pub fn with_cache(mut self, cache: Arc<dyn SearchCache>) -> Self {
        self.cache = cache;
        self
    }

    /// Cheapest priced, validated, deduplicated itineraries for `request`,
    /// ascending by final price. An empty list means nothing was found.
    pub async fn find_cheapest_routes(
        &self,
        request: &SearchRequest,
    ) -> Result<Vec<Itinerary>, SearchError> {
        request.validate()?;

        let outcome = match self.config.search_timeout() {
            Some(limit) => match tokio::time::timeout(limit, self.run_pipeline(request)).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    let limit_ms = limit.as_millis() as u64;
                    warn!(?request, limit_ms, "search timed out");
                    return Err(SearchError::Timeout(limit_ms));
                }
            },
            None => self.run_pipeline(request).await,
        };

        outcome.map_err(|e| {
            error!(?request, error = ?e, "search failed");
            SearchError::SearchFailed
        })
    }

    async fn run_pipeline(&self, request: &SearchRequest) -> anyhow::Result<Vec<Itinerary>> {
        let started = Instant::now();
        let key = request.cache_key();

        if let Some(cached) = self.cached_results(&key).await {
            info!(key = %key, results = cached.len(), "cache hit");
            return Ok(cached);
        }

        let direct = self.query_providers(request).await?;

        let mut candidates = Vec::with_capacity(direct.len());
        if self.config.virtual_interlining && !direct.is_empty() {
            let stitched =
                self.stitcher
                    .synthesize(&direct, &request.origin, &request.destination);
            candidates.extend(direct);
            candidates.extend(stitched);
        } else {
            candidates.extend(direct);
        }
        candidates.retain(|itinerary| serves_request(itinerary, request));

        let unique = deduplicate(candidates);
        let turnaround =
            (request.trip_type == TripType::Return).then_some(request.destination.as_str());
        let valid =
            self.validator
                .filter(unique, self.config.connection_overrides(), turnaround);

        let prefs = PricingPreferences::from(request);
        let priced = self.normalizer.normalize_all(valid, &prefs).await;
        let mut ranked = sort_by_price(priced);
        if let Some(max_price) = request.max_price {
            ranked = filter_by_max_price(ranked, max_price);
        }
        ranked.truncate(self.config.max_results);

        for itinerary in ranked.iter_mut() {
            itinerary.booking_link = self.booking_link(itinerary);
        }

        let payload = serde_json::to_vec(&ranked).context("serializing search results")?;
        let ttl = self
            .config
            .cache_ttl
            .ttl_for(request.departure_date, Utc::now().date_naive());
        if let Err(e) = self.cache.set(&key, payload, ttl).await {
            warn!(key = %key, error = %e, "cache store failed, result not cached");
        }

        info!(
            origin = %request.origin,
            destination = %request.destination,
            results = ranked.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "search completed"
        );
        Ok(ranked)
    }

    // Unreadable or unavailable cache entries are treated as misses
    async fn cached_results(&self, key: &str) -> Option<Vec<Itinerary>> {
        match self.cache.get(key).await {
            Ok(Some(bytes)) => match serde_json::from_slice(&bytes) {
                Ok(itineraries) => Some(itineraries),
                Err(e) => {
                    warn!(key, error = %e, "discarding unreadable cache entry");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!(key, error = %e, "cache lookup failed, bypassing cache");
                None
            }
        }
    }

    // All-settle fan-out: each provider runs under its own timeout and a
    // failure only removes that provider's results
    async fn query_providers(&self, request: &SearchRequest) -> anyhow::Result<Vec<Itinerary>> {
        let timeout = self.config.provider_timeout();

        let calls = self.providers.iter().map(|provider| async move {
            let outcome = match tokio::time::timeout(timeout, provider.search(request)).await {
                Ok(outcome) => outcome,
                Err(_) => Err(ProviderError::Timeout(timeout.as_millis() as u64)),
            };
            (provider.name(), outcome)
        });

        let mut direct = Vec::new();
        let mut failures = 0;
        for (provider, outcome) in join_all(calls).await {
            match outcome {
                Ok(itineraries) => {
                    debug!(provider, count = itineraries.len(), "provider responded");
                    direct.extend(itineraries);
                }
                Err(e) => {
                    failures += 1;
                    warn!(provider, error = %e, "provider failed, continuing without it");
                }
            }
        }

        if failures > 0 && failures == self.providers.len() {
            bail!("all {failures} providers failed");
        }
        Ok(direct)
    }

    fn booking_link(&self, itinerary: &Itinerary) -> Option<String> {
        match &itinerary.source {
            ItinerarySource::Stitched => self.multi_leg_links.generate_link(itinerary),
            ItinerarySource::Provider(name) => self
                .providers
                .iter()
                .find(|provider| provider.name() == name)
                .and_then(|provider| provider.generate_link(itinerary)),
        }
    }
}

// Origin to destination, or for return trips a loop back to the origin that
// passes through the destination
fn serves_request(itinerary: &Itinerary, request: &SearchRequest) -> bool {
    let (Some(origin), Some(destination)) = (itinerary.origin(), itinerary.destination()) else {
        return false;
    };
    if origin != request.origin {
        return false;
    }
    if destination == request.destination {
        return true;
    }

    request.trip_type == TripType::Return
        && destination == request.origin
        && itinerary
            .segments
            .iter()
            .any(|segment| segment.destination == request.destination)
}
