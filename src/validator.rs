// Route validation: per-segment sanity, connection legality, transit visa
// heuristic, backtracking and total duration plausibility.
//
// Every check is a pure predicate. A failing itinerary is dropped by the
// caller; the reason is only used for diagnostics.

use crate::connection::{ConnectionOverrides, ConnectionPolicy};
use crate::model::{is_iata_code, total_minutes, Itinerary, Segment};
use crate::reference::ReferenceData;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RejectReason {
    #[error("Itinerary has no segments")]
    EmptyItinerary,

    #[error("Invalid airport code: {0:?}")]
    InvalidAirportCode(String),

    #[error("Segment departs and arrives at {0}")]
    SameOriginDestination(String),

    #[error("Segment {origin}-{destination} does not arrive after it departs")]
    NonPositiveDuration { origin: String, destination: String },

    #[error("Segment lasts {minutes} minutes, limit is {limit}")]
    SegmentTooLong { minutes: i64, limit: i64 },

    #[error("Segment arrives at {arrived} but the next departs from {departs}")]
    Disconnected { arrived: String, departs: String },

    #[error("Next flight leaves {airport} {minutes} minutes before arrival")]
    NegativeConnection { airport: String, minutes: i64 },

    #[error("Connection at {airport} is {minutes} minutes, needs at least {required}")]
    ConnectionTooShort {
        airport: String,
        minutes: i64,
        required: i64,
    },

    #[error("Connection at {airport} is {minutes} minutes, allowed at most {allowed}")]
    ConnectionTooLong {
        airport: String,
        minutes: i64,
        allowed: i64,
    },

    #[error("Transit through {airport} likely requires a {country} transit visa")]
    TransitVisaRequired { airport: String, country: String },

    #[error("Itinerary revisits {0}")]
    AirportRevisited(String),

    #[error("Total duration {minutes} minutes exceeds {limit}")]
    TotalDurationTooLong { minutes: i64, limit: i64 },

    #[error("Total duration {minutes} minutes is implausibly short, expected at least {expected}")]
    TotalDurationImplausible { minutes: i64, expected: i64 },
}

pub type ValidationVerdict = Result<(), RejectReason>;

// Duration sanity limits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DurationLimits {
    pub max_segment_minutes: i64,
    pub max_total_minutes: i64,
    pub cruise_speed_kmh: f64,
    pub ground_minutes_per_segment: i64,
    pub min_plausible_ratio: f64,
}

impl Default for DurationLimits {
    fn default() -> Self {
        Self {
            max_segment_minutes: 20 * 60,
            max_total_minutes: 48 * 60,
            cruise_speed_kmh: 800.0,
            ground_minutes_per_segment: 90,
            min_plausible_ratio: 0.5,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RouteValidator {
    policy: ConnectionPolicy,
    limits: DurationLimits,
    reference: Arc<ReferenceData>,
}

impl RouteValidator {
    pub fn new(
        policy: ConnectionPolicy,
        limits: DurationLimits,
        reference: Arc<ReferenceData>,
    ) -> Self {
        Self {
            policy,
            limits,
            reference,
        }
    }

    pub fn reference(&self) -> &ReferenceData {
        &self.reference
    }

    pub fn validate_segment(&self, segment: &Segment) -> bool {
        self.check_segment(segment).is_ok()
    }

    pub fn check_segment(&self, segment: &Segment) -> ValidationVerdict {
        for code in [&segment.origin, &segment.destination] {
            if !is_iata_code(code) {
                return Err(RejectReason::InvalidAirportCode(code.clone()));
            }
        }
        if segment.origin == segment.destination {
            return Err(RejectReason::SameOriginDestination(segment.origin.clone()));
        }
        if segment.departure >= segment.arrival {
            return Err(RejectReason::NonPositiveDuration {
                origin: segment.origin.clone(),
                destination: segment.destination.clone(),
            });
        }
        let minutes = segment.elapsed_minutes();
        if minutes > self.limits.max_segment_minutes {
            return Err(RejectReason::SegmentTooLong {
                minutes,
                limit: self.limits.max_segment_minutes,
            });
        }
        Ok(())
    }

    pub fn validate_connection(
        &self,
        prev: &Segment,
        next: &Segment,
        virtual_interline: bool,
    ) -> ValidationVerdict {
        self.validate_connection_with(prev, next, virtual_interline, ConnectionOverrides::default())
    }

    pub fn validate_connection_with(
        &self,
        prev: &Segment,
        next: &Segment,
        virtual_interline: bool,
        overrides: ConnectionOverrides,
    ) -> ValidationVerdict {
        if prev.destination != next.origin
            && !(self.policy.allow_airport_transfers
                && self.reference.same_city(&prev.destination, &next.origin))
        {
            return Err(RejectReason::Disconnected {
                arrived: prev.destination.clone(),
                departs: next.origin.clone(),
            });
        }

        let gap = next.departure - prev.arrival;
        if gap < chrono::Duration::zero() {
            return Err(RejectReason::NegativeConnection {
                airport: prev.destination.clone(),
                minutes: gap.num_minutes(),
            });
        }

        let minutes = gap.num_minutes();
        let window = self
            .policy
            .window(prev, next, virtual_interline, &self.reference, overrides);
        if minutes < window.min_minutes {
            return Err(RejectReason::ConnectionTooShort {
                airport: prev.destination.clone(),
                minutes,
                required: window.min_minutes,
            });
        }
        if minutes > window.max_minutes {
            return Err(RejectReason::ConnectionTooLong {
                airport: prev.destination.clone(),
                minutes,
                allowed: window.max_minutes,
            });
        }
        Ok(())
    }

    // Conservative heuristic, not visa law: any layover in a country on the
    // transit visa list fails. Landside airport transfers count as well.
    pub fn validate_visa_requirements(&self, segments: &[Segment]) -> ValidationVerdict {
        for pair in segments.windows(2) {
            let airport = &pair[0].destination;
            if let Some(country) = self.reference.country_of(airport) {
                if self.reference.requires_transit_visa(country) {
                    return Err(RejectReason::TransitVisaRequired {
                        airport: airport.clone(),
                        country: country.to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    pub fn validate_airport_changes(&self, segments: &[Segment]) -> ValidationVerdict {
        let Some(first) = segments.first() else {
            return Ok(());
        };

        let mut stops = vec![first.origin.as_str()];
        for segment in segments {
            if stops.last() != Some(&segment.origin.as_str()) {
                stops.push(&segment.origin);
            }
            stops.push(&segment.destination);
        }

        let last_index = stops.len() - 1;
        let mut visited = HashSet::new();
        for (index, airport) in stops.into_iter().enumerate() {
            // the final destination may close a loop, nothing else may
            if !visited.insert(airport) && index != last_index {
                return Err(RejectReason::AirportRevisited(airport.to_string()));
            }
        }
        Ok(())
    }

    pub fn validate_total_duration(&self, itinerary: &Itinerary) -> ValidationVerdict {
        self.check_total_duration(&itinerary.segments)
    }

    fn check_total_duration(&self, segments: &[Segment]) -> ValidationVerdict {
        let minutes = total_minutes(segments);
        if minutes > self.limits.max_total_minutes {
            return Err(RejectReason::TotalDurationTooLong {
                minutes,
                limit: self.limits.max_total_minutes,
            });
        }

        if let Some(expected) = self.estimated_minimum_minutes(segments) {
            let floor = (expected as f64 * self.limits.min_plausible_ratio) as i64;
            if minutes < floor {
                return Err(RejectReason::TotalDurationImplausible { minutes, expected });
            }
        }
        Ok(())
    }

    // Distance at cruise speed plus ground handling per segment. None when an
    // airport is missing from the reference data.
    fn estimated_minimum_minutes(&self, segments: &[Segment]) -> Option<i64> {
        let mut distance_km = 0.0;
        for segment in segments {
            distance_km += self
                .reference
                .distance_km(&segment.origin, &segment.destination)?;
        }
        let flying = distance_km / self.limits.cruise_speed_kmh * 60.0;
        let ground = self.limits.ground_minutes_per_segment * segments.len() as i64;
        Some(flying as i64 + ground)
    }

    /// First failing check in pipeline order: segments, connections, visa,
    /// airport changes, total duration.
    pub fn check_route(
        &self,
        itinerary: &Itinerary,
        overrides: ConnectionOverrides,
    ) -> ValidationVerdict {
        self.check_trip(itinerary, overrides, None)
    }

    /// Like `check_route`, but an itinerary that lands at `turnaround` and
    /// flies on is treated as an outbound and a return direction. The stay
    /// between them only has to be ordered and at the same airport; layover
    /// ceilings, transit visas and the total duration apply per direction.
    pub fn check_trip(
        &self,
        itinerary: &Itinerary,
        overrides: ConnectionOverrides,
        turnaround: Option<&str>,
    ) -> ValidationVerdict {
        let segments = &itinerary.segments;
        if segments.is_empty() {
            return Err(RejectReason::EmptyItinerary);
        }
        for segment in segments {
            self.check_segment(segment)?;
        }

        let split = turnaround.and_then(|airport| {
            segments[..segments.len() - 1]
                .iter()
                .position(|segment| segment.destination == airport)
        });
        let (outbound, inbound) = match split {
            Some(index) => segments.split_at(index + 1),
            None => (segments.as_slice(), &[][..]),
        };
        if let (Some(arriving), Some(departing)) = (outbound.last(), inbound.first()) {
            self.check_stay(arriving, departing)?;
        }

        for direction in [outbound, inbound] {
            if !direction.is_empty() {
                self.check_direction(itinerary, direction, overrides)?;
            }
        }
        Ok(())
    }

    fn check_direction(
        &self,
        itinerary: &Itinerary,
        segments: &[Segment],
        overrides: ConnectionOverrides,
    ) -> ValidationVerdict {
        let junctions = itinerary.junction_airports();
        for pair in segments.windows(2) {
            let self_transfer = itinerary.virtual_interline
                && (junctions.is_empty() || junctions.contains(&pair[0].destination.as_str()));
            self.validate_connection_with(&pair[0], &pair[1], self_transfer, overrides)?;
        }

        self.validate_visa_requirements(segments)?;
        self.validate_airport_changes(segments)?;
        self.check_total_duration(segments)
    }

    // The traveller stays at the destination, so only ordering and adjacency
    // matter between the two directions.
    fn check_stay(&self, arriving: &Segment, departing: &Segment) -> ValidationVerdict {
        if arriving.destination != departing.origin {
            return Err(RejectReason::Disconnected {
                arrived: arriving.destination.clone(),
                departs: departing.origin.clone(),
            });
        }
        let gap = departing.departure - arriving.arrival;
        if gap < chrono::Duration::zero() {
            return Err(RejectReason::NegativeConnection {
                airport: arriving.destination.clone(),
                minutes: gap.num_minutes(),
            });
        }
        Ok(())
    }

    pub fn validate_route(&self, itinerary: &Itinerary, overrides: ConnectionOverrides) -> bool {
        self.check_route(itinerary, overrides).is_ok()
    }

    /// Keeps the itineraries passing `check_trip`. Pass the request
    /// destination as `turnaround` for return searches.
    pub fn filter(
        &self,
        itineraries: Vec<Itinerary>,
        overrides: ConnectionOverrides,
        turnaround: Option<&str>,
    ) -> Vec<Itinerary> {
        let before = itineraries.len();
        let valid: Vec<Itinerary> = itineraries
            .into_iter()
            .filter(|itinerary| match self.check_trip(itinerary, overrides, turnaround) {
                Ok(()) => true,
                Err(reason) => {
                    debug!(id = %itinerary.id, source = %itinerary.source, %reason, "dropping invalid itinerary");
                    false
                }
            })
            .collect();
        debug!(before, after = valid.len(), "validated itineraries");
        valid
    }
}
