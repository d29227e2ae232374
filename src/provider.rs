// Flight provider collaborators and the boundary adapter that turns each
// provider's payload into strict `Itinerary` values.
//
// Transport concerns (HTTP, rate limiting, retries, auth) belong to the
// provider implementations, never to the search pipeline.

use crate::model::{is_iata_code, CabinClass, Itinerary, ItinerarySource, SearchRequest, Segment};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("Request timeout after {0}ms")]
    Timeout(u64),

    #[error("API error: {status_code} - {message}")]
    ApiResponseError { status_code: u16, message: String },

    #[error("Invalid provider data: {0}")]
    InvalidData(String),

    #[error("JSON parse error: {0}")]
    JsonParseError(#[from] serde_json::Error),
}

pub trait BookingLinkGenerator: Send + Sync {
    fn generate_link(&self, itinerary: &Itinerary) -> Option<String>;
}

// One flight data source. Every provider is also responsible for booking
// links to its own itineraries.
#[async_trait]
pub trait FlightProvider: BookingLinkGenerator {
    fn name(&self) -> &str;

    async fn search(&self, request: &SearchRequest) -> Result<Vec<Itinerary>, ProviderError>;
}

// Wire shape shared by provider feeds
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProviderResponse {
    pub offers: Vec<ProviderOffer>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProviderOffer {
    pub price: f64,
    pub currency: String,
    pub segments: Vec<ProviderSegment>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProviderSegment {
    pub carrier: String,
    #[serde(default)]
    pub flight_number: Option<String>,
    pub origin: String,
    pub destination: String,
    pub departure: String,
    pub arrival: String,
    #[serde(default)]
    pub duration_minutes: Option<i64>,
    #[serde(default)]
    pub fare: Option<f64>,
    #[serde(default)]
    pub aircraft: Option<String>,
    #[serde(default)]
    pub cabin: Option<CabinClass>,
}

fn parse_instant(field: &str, value: &str) -> Result<DateTime<Utc>, ProviderError> {
    DateTime::parse_from_rfc3339(value.trim())
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| ProviderError::InvalidData(format!("{field} {value:?}: {e}")))
}

fn airport_code(value: &str) -> Result<String, ProviderError> {
    let code = value.trim().to_ascii_uppercase();
    if !is_iata_code(&code) {
        return Err(ProviderError::InvalidData(format!(
            "airport code {value:?}"
        )));
    }
    Ok(code)
}

impl ProviderSegment {
    pub fn into_segment(self, currency: &str) -> Result<Segment, ProviderError> {
        let departure = parse_instant("departure", &self.departure)?;
        let arrival = parse_instant("arrival", &self.arrival)?;

        let mut segment = Segment::new(
            self.carrier.trim().to_ascii_uppercase(),
            airport_code(&self.origin)?,
            airport_code(&self.destination)?,
            departure,
            arrival,
        )
        .with_fare(self.fare.unwrap_or(0.0), currency);

        if let Some(number) = self.flight_number.filter(|n| !n.trim().is_empty()) {
            segment = segment.with_flight_number(number.trim());
        }
        if let Some(minutes) = self.duration_minutes {
            segment = segment.with_duration_minutes(minutes);
        }
        if let Some(aircraft) = self.aircraft {
            segment = segment.with_aircraft(aircraft);
        }
        if let Some(cabin) = self.cabin {
            segment = segment.with_cabin(cabin);
        }
        Ok(segment)
    }
}

impl ProviderOffer {
    pub fn into_itinerary(self, provider: &str) -> Result<Itinerary, ProviderError> {
        if self.segments.is_empty() {
            return Err(ProviderError::InvalidData("offer without segments".to_string()));
        }
        if !self.price.is_finite() || self.price < 0.0 {
            return Err(ProviderError::InvalidData(format!("price {}", self.price)));
        }

        let currency = self.currency.trim().to_ascii_uppercase();
        let segments = self
            .segments
            .into_iter()
            .map(|s| s.into_segment(&currency))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Itinerary::new(
            ItinerarySource::Provider(provider.to_string()),
            segments,
            self.price,
            currency,
        ))
    }
}

/// Parses a provider payload. Offers that fail the boundary checks are
/// skipped with a warning; a malformed document is an error.
pub fn parse_response(provider: &str, json: &str) -> Result<Vec<Itinerary>, ProviderError> {
    let response: ProviderResponse = serde_json::from_str(json)?;

    let mut itineraries = Vec::with_capacity(response.offers.len());
    for offer in response.offers {
        match offer.into_itinerary(provider) {
            Ok(itinerary) => itineraries.push(itinerary),
            Err(e) => warn!(provider, error = %e, "skipping malformed offer"),
        }
    }
    Ok(itineraries)
}

// "SA302-JNB-CPT-20261101" style leg descriptors for deep links
fn leg_descriptors(itinerary: &Itinerary) -> String {
    itinerary
        .segments
        .iter()
        .map(|s| {
            format!(
                "{}{}-{}-{}-{}",
                s.carrier,
                s.flight_number.as_deref().unwrap_or(""),
                s.origin,
                s.destination,
                s.departure.format("%Y%m%d")
            )
        })
        .collect::<Vec<_>>()
        .join(",")
}

/// Serves offers from an in-memory JSON feed. Only offers departing on the
/// requested date are returned.
pub struct JsonFeedProvider {
    name: String,
    itineraries: Vec<Itinerary>,
    link_base: String,
}

impl JsonFeedProvider {
    pub fn from_json(
        name: impl Into<String>,
        json: &str,
        link_base: impl Into<String>,
    ) -> Result<Self, ProviderError> {
        let name = name.into();
        let itineraries = parse_response(&name, json)?;
        Ok(Self {
            name,
            itineraries,
            link_base: link_base.into(),
        })
    }
}

impl BookingLinkGenerator for JsonFeedProvider {
    fn generate_link(&self, itinerary: &Itinerary) -> Option<String> {
        if itinerary.segments.is_empty() {
            return None;
        }
        Some(format!(
            "{}/book?flights={}",
            self.link_base.trim_end_matches('/'),
            leg_descriptors(itinerary)
        ))
    }
}

#[async_trait]
impl FlightProvider for JsonFeedProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn search(&self, request: &SearchRequest) -> Result<Vec<Itinerary>, ProviderError> {
        Ok(self
            .itineraries
            .iter()
            .filter(|itinerary| {
                itinerary
                    .departure()
                    .is_some_and(|t| t.date_naive() == request.departure_date)
            })
            .cloned()
            .collect())
    }
}

/// Links for stitched itineraries: one multi-leg booking path listing every
/// separately ticketed component.
pub struct MultiLegLinkGenerator {
    base_url: String,
}

impl MultiLegLinkGenerator {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
        }
    }
}

impl BookingLinkGenerator for MultiLegLinkGenerator {
    fn generate_link(&self, itinerary: &Itinerary) -> Option<String> {
        if itinerary.original_components.is_empty() {
            return None;
        }
        // nested stitched components are flattened into their tickets
        let mut tickets = Vec::new();
        let mut pending: Vec<&Itinerary> = itinerary
            .original_components
            .iter()
            .rev()
            .map(|c| c.as_ref())
            .collect();
        while let Some(component) = pending.pop() {
            if component.original_components.is_empty() {
                tickets.push(leg_descriptors(component));
            } else {
                pending.extend(component.original_components.iter().rev().map(|c| c.as_ref()));
            }
        }

        Some(format!(
            "{}/multi?tickets={}",
            self.base_url.trim_end_matches('/'),
            tickets.join("|")
        ))
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::fixtures::{direct, request, seg};
    use std::sync::Arc;

    const FEED: &str = r#"{
        "offers": [
            {
                "price": 3000.0,
                "currency": "zar",
                "segments": [
                    {
                        "carrier": "SA",
                        "flight_number": "302",
                        "origin": "jnb",
                        "destination": "CPT",
                        "departure": "2026-11-01T10:00:00+02:00",
                        "arrival": "2026-11-01T12:10:00+02:00",
                        "aircraft": "A320",
                        "cabin": "economy"
                    }
                ]
            },
            {
                "price": 2000.0,
                "currency": "ZAR",
                "segments": [
                    {
                        "carrier": "ET",
                        "origin": "JNB",
                        "destination": "ADD",
                        "departure": "not a timestamp",
                        "arrival": "2026-11-01T11:45:00Z"
                    }
                ]
            },
            {
                "price": 1800.0,
                "currency": "ZAR",
                "segments": [
                    {
                        "carrier": "FA",
                        "flight_number": "101",
                        "origin": "JNB",
                        "destination": "CPT",
                        "departure": "2026-11-02T06:00:00Z",
                        "arrival": "2026-11-02T08:10:00Z"
                    }
                ]
            },
            {
                "price": 10.0,
                "currency": "ZAR",
                "segments": []
            }
        ]
    }"#;

    #[test]
    fn test_parse_response_normalizes_and_skips_bad_offers() {
        let itineraries = parse_response("feed", FEED).unwrap();
        assert_eq!(itineraries.len(), 2);

        let first = &itineraries[0];
        assert_eq!(first.source, ItinerarySource::Provider("feed".to_string()));
        assert_eq!(first.currency, "ZAR");
        let segment = &first.segments[0];
        assert_eq!(segment.origin, "JNB");
        assert_eq!(segment.flight_number.as_deref(), Some("302"));
        assert_eq!(segment.departure.to_rfc3339(), "2026-11-01T08:00:00+00:00");
        assert_eq!(segment.duration_minutes, 130);
        assert_eq!(segment.aircraft.as_deref(), Some("A320"));
        assert_eq!(segment.cabin, Some(CabinClass::Economy));
    }

    #[test]
    fn test_parse_response_rejects_malformed_documents() {
        assert!(matches!(
            parse_response("feed", "{\"offers\": 12}"),
            Err(ProviderError::JsonParseError(_))
        ));
    }

    #[test]
    fn test_offer_boundary_checks() {
        let offer = ProviderOffer {
            price: 100.0,
            currency: "ZAR".to_string(),
            segments: vec![ProviderSegment {
                carrier: "SA".to_string(),
                flight_number: None,
                origin: "Johannesburg".to_string(),
                destination: "CPT".to_string(),
                departure: "2026-11-01T08:00:00Z".to_string(),
                arrival: "2026-11-01T10:00:00Z".to_string(),
                duration_minutes: None,
                fare: None,
                aircraft: None,
                cabin: None,
            }],
        };
        assert!(matches!(
            offer.into_itinerary("feed"),
            Err(ProviderError::InvalidData(_))
        ));
    }

    #[tokio::test]
    async fn test_json_feed_filters_by_date() {
        let provider = JsonFeedProvider::from_json("feed", FEED, "https://feed.test/").unwrap();
        let results = provider.search(&request("JNB", "CPT")).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].price, 3000.0);

        let link = provider.generate_link(&results[0]).unwrap();
        assert_eq!(link, "https://feed.test/book?flights=SA302-JNB-CPT-20261101");
    }

    #[test]
    fn test_multi_leg_link_lists_every_ticket() {
        let leg1 = Arc::new(direct(
            "alpha",
            vec![seg("KQ761", "JNB", "NBO", "2026-11-01T06:00:00Z", "2026-11-01T10:00:00Z")],
            1.0,
        ));
        let leg2 = Arc::new(direct(
            "beta",
            vec![seg("ET308", "NBO", "ADD", "2026-11-01T14:30:00Z", "2026-11-01T16:30:00Z")],
            1.0,
        ));
        let leg3 = Arc::new(direct(
            "gamma",
            vec![seg("ET847", "ADD", "CPT", "2026-11-01T21:00:00Z", "2026-11-02T04:00:00Z")],
            1.0,
        ));
        let mut partial = direct("x", vec![], 2.0);
        partial.original_components = vec![leg1, leg2];
        let mut chain = direct("x", vec![], 3.0);
        chain.original_components = vec![Arc::new(partial), leg3];

        let links = MultiLegLinkGenerator::new("https://multi.test");
        assert_eq!(
            links.generate_link(&chain).unwrap(),
            "https://multi.test/multi?tickets=KQ761-JNB-NBO-20261101|ET308-NBO-ADD-20261101|ET847-ADD-CPT-20261101"
        );
        assert_eq!(links.generate_link(&direct("x", vec![], 1.0)), None);
    }
}
