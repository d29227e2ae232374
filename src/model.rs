// Shared flight data model: segments, itineraries and search requests

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;

/// Returns true for a three letter, upper case IATA style code.
pub fn is_iata_code(code: &str) -> bool {
    code.len() == 3 && code.bytes().all(|b| b.is_ascii_uppercase())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CabinClass {
    Economy,
    PremiumEconomy,
    Business,
    First,
}

impl Default for CabinClass {
    fn default() -> Self {
        CabinClass::Economy
    }
}

impl CabinClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            CabinClass::Economy => "economy",
            CabinClass::PremiumEconomy => "premium_economy",
            CabinClass::Business => "business",
            CabinClass::First => "first",
        }
    }
}

impl fmt::Display for CabinClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CabinClass {
    type Err = RequestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "economy" | "m" | "y" => Ok(CabinClass::Economy),
            "premium" | "premium_economy" | "w" => Ok(CabinClass::PremiumEconomy),
            "business" | "c" => Ok(CabinClass::Business),
            "first" | "f" => Ok(CabinClass::First),
            other => Err(RequestError::UnknownCabinClass(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TripType {
    OneWay,
    Return,
}

impl Default for TripType {
    fn default() -> Self {
        TripType::OneWay
    }
}

// One operated flight leg. Never mutated after construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub carrier: String,
    pub flight_number: Option<String>,
    pub origin: String,
    pub destination: String,
    pub departure: DateTime<Utc>,
    pub arrival: DateTime<Utc>,
    pub duration_minutes: i64,
    pub fare: f64,
    pub currency: String,
    pub aircraft: Option<String>,
    pub cabin: Option<CabinClass>,
}

impl Segment {
    pub fn new(
        carrier: impl Into<String>,
        origin: impl Into<String>,
        destination: impl Into<String>,
        departure: DateTime<Utc>,
        arrival: DateTime<Utc>,
    ) -> Self {
        Self {
            carrier: carrier.into(),
            flight_number: None,
            origin: origin.into(),
            destination: destination.into(),
            departure,
            arrival,
            duration_minutes: (arrival - departure).num_minutes(),
            fare: 0.0,
            currency: String::new(),
            aircraft: None,
            cabin: None,
        }
    }

    pub fn with_flight_number(mut self, flight_number: impl Into<String>) -> Self {
        self.flight_number = Some(flight_number.into());
        self
    }

    pub fn with_fare(mut self, amount: f64, currency: impl Into<String>) -> Self {
        self.fare = amount;
        self.currency = currency.into();
        self
    }

    pub fn with_duration_minutes(mut self, minutes: i64) -> Self {
        self.duration_minutes = minutes;
        self
    }

    pub fn with_aircraft(mut self, aircraft: impl Into<String>) -> Self {
        self.aircraft = Some(aircraft.into());
        self
    }

    pub fn with_cabin(mut self, cabin: CabinClass) -> Self {
        self.cabin = Some(cabin);
        self
    }

    /// Wall clock minutes between departure and arrival.
    pub fn elapsed_minutes(&self) -> i64 {
        (self.arrival - self.departure).num_minutes()
    }

    // Stable per-segment key used for itinerary ids
    fn id_fragment(&self) -> String {
        format!(
            "{}{}:{}-{}@{}",
            self.carrier,
            self.flight_number.as_deref().unwrap_or(""),
            self.origin,
            self.destination,
            self.departure.format("%Y%m%dT%H%MZ")
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItinerarySource {
    Provider(String),
    Stitched,
}

impl ItinerarySource {
    pub fn as_str(&self) -> &str {
        match self {
            ItinerarySource::Provider(name) => name,
            ItinerarySource::Stitched => "stitched",
        }
    }
}

impl fmt::Display for ItinerarySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// Fee inclusive pricing attached by the price normalizer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceBreakdown {
    pub currency: String,
    pub base: f64,
    pub baggage_fee: f64,
    pub booking_fee: f64,
    pub tax: f64,
    pub final_price: f64,
}

// An ordered, connected sequence of segments forming one travel option.
// Stitched itineraries keep shared references to the itineraries they were
// built from in `original_components`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Itinerary {
    pub id: String,
    pub segments: Vec<Segment>,
    pub carriers: BTreeSet<String>,
    pub price: f64,
    pub currency: String,
    pub total_duration_minutes: i64,
    pub source: ItinerarySource,
    pub separate_tickets: bool,
    pub virtual_interline: bool,
    pub connection_airport: Option<String>,
    pub hub_chain: Option<Vec<String>>,
    #[serde(default)]
    pub original_components: Vec<Arc<Itinerary>>,
    #[serde(default)]
    pub pricing: Option<PriceBreakdown>,
    #[serde(default)]
    pub booking_link: Option<String>,
}

impl Itinerary {
    pub fn new(
        source: ItinerarySource,
        segments: Vec<Segment>,
        price: f64,
        currency: impl Into<String>,
    ) -> Self {
        let id = itinerary_id(&segments);
        let carriers = segments.iter().map(|s| s.carrier.clone()).collect();
        let total_duration_minutes = total_minutes(&segments);

        Self {
            id,
            segments,
            carriers,
            price,
            currency: currency.into(),
            total_duration_minutes,
            source,
            separate_tickets: false,
            virtual_interline: false,
            connection_airport: None,
            hub_chain: None,
            original_components: Vec::new(),
            pricing: None,
            booking_link: None,
        }
    }

    pub fn first_segment(&self) -> Option<&Segment> {
        self.segments.first()
    }

    pub fn last_segment(&self) -> Option<&Segment> {
        self.segments.last()
    }

    pub fn origin(&self) -> Option<&str> {
        self.first_segment().map(|s| s.origin.as_str())
    }

    pub fn destination(&self) -> Option<&str> {
        self.last_segment().map(|s| s.destination.as_str())
    }

    pub fn departure(&self) -> Option<DateTime<Utc>> {
        self.first_segment().map(|s| s.departure)
    }

    pub fn stops(&self) -> usize {
        self.segments.len().saturating_sub(1)
    }

    pub fn is_stitched(&self) -> bool {
        self.source == ItinerarySource::Stitched
    }

    /// Airports where separately ticketed parts were joined.
    pub fn junction_airports(&self) -> Vec<&str> {
        match (&self.hub_chain, &self.connection_airport) {
            (Some(chain), _) => chain.iter().map(String::as_str).collect(),
            (None, Some(airport)) => vec![airport.as_str()],
            (None, None) => Vec::new(),
        }
    }

    /// Fee inclusive price when normalized, the raw total otherwise.
    pub fn final_price(&self) -> f64 {
        self.pricing
            .as_ref()
            .map_or(self.price, |pricing| pricing.final_price)
    }
}

// Deterministic id: same segments in the same order give the same id
pub fn itinerary_id(segments: &[Segment]) -> String {
    if segments.is_empty() {
        return "EMPTY".to_string();
    }
    segments
        .iter()
        .map(Segment::id_fragment)
        .collect::<Vec<_>>()
        .join("/")
}

// End to end wall clock minutes, ground time included
pub fn total_minutes(segments: &[Segment]) -> i64 {
    match (segments.first(), segments.last()) {
        (Some(first), Some(last)) => (last.arrival - first.departure).num_minutes(),
        _ => 0,
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RequestError {
    #[error("Invalid airport code: {0:?}")]
    InvalidAirportCode(String),

    #[error("Origin and destination are both {0}")]
    SameOriginDestination(String),

    #[error("At least one passenger is required")]
    NoPassengers,

    #[error("Return date {return_date} is before departure date {departure_date}")]
    ReturnBeforeDeparture {
        departure_date: NaiveDate,
        return_date: NaiveDate,
    },

    #[error("Return trip without a return date")]
    MissingReturnDate,

    #[error("Invalid currency code: {0:?}")]
    InvalidCurrency(String),

    #[error("Unknown cabin class: {0}")]
    UnknownCabinClass(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchRequest {
    pub origin: String,
    pub destination: String,
    pub departure_date: NaiveDate,
    pub return_date: Option<NaiveDate>,
    pub passengers: u32,
    pub bags: u32,
    pub cabin_class: CabinClass,
    pub currency: String,
    pub trip_type: TripType,
    #[serde(default)]
    pub max_price: Option<f64>,
}

impl SearchRequest {
    pub fn one_way(
        origin: impl Into<String>,
        destination: impl Into<String>,
        departure_date: NaiveDate,
        currency: impl Into<String>,
    ) -> Self {
        Self {
            origin: origin.into(),
            destination: destination.into(),
            departure_date,
            return_date: None,
            passengers: 1,
            bags: 0,
            cabin_class: CabinClass::Economy,
            currency: currency.into(),
            trip_type: TripType::OneWay,
            max_price: None,
        }
    }

    pub fn validate(&self) -> Result<(), RequestError> {
        for code in [&self.origin, &self.destination] {
            if !is_iata_code(code) {
                return Err(RequestError::InvalidAirportCode(code.clone()));
            }
        }
        if self.origin == self.destination {
            return Err(RequestError::SameOriginDestination(self.origin.clone()));
        }
        if self.passengers == 0 {
            return Err(RequestError::NoPassengers);
        }
        if !is_iata_code(&self.currency) {
            return Err(RequestError::InvalidCurrency(self.currency.clone()));
        }
        match (self.trip_type, self.return_date) {
            (TripType::Return, None) => Err(RequestError::MissingReturnDate),
            (_, Some(return_date)) if return_date < self.departure_date => {
                Err(RequestError::ReturnBeforeDeparture {
                    departure_date: self.departure_date,
                    return_date,
                })
            }
            _ => Ok(()),
        }
    }

    /// Cache key built from the normalized request fields.
    pub fn cache_key(&self) -> String {
        format!(
            "search:{}:{}:{}:{}:{}:{}:{}:{}:{:?}:{}",
            self.origin.trim().to_ascii_uppercase(),
            self.destination.trim().to_ascii_uppercase(),
            self.departure_date,
            self.return_date
                .map_or_else(|| "-".to_string(), |d| d.to_string()),
            self.passengers,
            self.bags,
            self.cabin_class,
            self.currency.trim().to_ascii_uppercase(),
            self.trip_type,
            self.max_price
                .map_or_else(|| "-".to_string(), |p| format!("{p:.2}")),
        )
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub fn at(timestamp: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(timestamp)
            .unwrap()
            .with_timezone(&Utc)
    }

    pub fn seg(flight: &str, origin: &str, destination: &str, dep: &str, arr: &str) -> Segment {
        let (carrier, number) = flight.split_at(2);
        Segment::new(carrier, origin, destination, at(dep), at(arr))
            .with_flight_number(number)
            .with_fare(0.0, "ZAR")
    }

    pub fn direct(provider: &str, segments: Vec<Segment>, price: f64) -> Itinerary {
        Itinerary::new(
            ItinerarySource::Provider(provider.to_string()),
            segments,
            price,
            "ZAR",
        )
    }

    pub fn request(origin: &str, destination: &str) -> SearchRequest {
        SearchRequest::one_way(
            origin,
            destination,
            NaiveDate::from_ymd_opt(2026, 11, 1).unwrap(),
            "ZAR",
        )
    }
}
