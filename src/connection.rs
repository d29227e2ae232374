// Connection time policy shared by the validator and the stitcher.
//
// The minutes table below is the only source of minimum/maximum connection
// times. Caller supplied millisecond bounds can only tighten the minimum and
// replace the default maximum; the 24h ceiling always applies.

use crate::model::Segment;
use crate::reference::ReferenceData;
use serde::{Deserialize, Serialize};

pub const HARD_MAX_CONNECTION_MINUTES: i64 = 24 * 60;

const MS_PER_MINUTE: u64 = 60_000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionPolicy {
    pub default_minutes: i64,
    pub international_minutes: i64,
    pub large_hub_minutes: i64,
    pub airport_change_minutes: i64,
    pub virtual_interline_minutes: i64,
    pub max_connection_minutes: i64,
    pub visa_free_transit_max_minutes: i64,
    pub visa_required_transit_max_minutes: i64,
    // Accept connections between two airports of the same city
    pub allow_airport_transfers: bool,
}

impl Default for ConnectionPolicy {
    fn default() -> Self {
        Self {
            default_minutes: 60,
            international_minutes: 90,
            large_hub_minutes: 120,
            airport_change_minutes: 180,
            virtual_interline_minutes: 240,
            max_connection_minutes: HARD_MAX_CONNECTION_MINUTES,
            visa_free_transit_max_minutes: 720,
            visa_required_transit_max_minutes: 480,
            allow_airport_transfers: false,
        }
    }
}

// Caller bounds in milliseconds, as accepted by the route validator entry point
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConnectionOverrides {
    pub min_ms: Option<u64>,
    pub max_ms: Option<u64>,
}

impl ConnectionOverrides {
    pub fn new(min_ms: Option<u64>, max_ms: Option<u64>) -> Self {
        Self { min_ms, max_ms }
    }

    fn min_minutes(&self) -> Option<i64> {
        self.min_ms.map(|ms| ms.div_ceil(MS_PER_MINUTE) as i64)
    }

    fn max_minutes(&self) -> Option<i64> {
        self.max_ms.map(|ms| (ms / MS_PER_MINUTE) as i64)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionWindow {
    pub min_minutes: i64,
    pub max_minutes: i64,
}

impl ConnectionWindow {
    pub fn contains(&self, gap_minutes: i64) -> bool {
        gap_minutes >= self.min_minutes && gap_minutes <= self.max_minutes
    }
}

impl ConnectionPolicy {
    /// Minimum ground time between `arriving` and `departing`, by priority:
    /// virtual interline, airport change, large hub, international, domestic.
    pub fn minimum_minutes(
        &self,
        arriving: &Segment,
        departing: &Segment,
        virtual_interline: bool,
        reference: &ReferenceData,
    ) -> i64 {
        if virtual_interline {
            self.virtual_interline_minutes
        } else if reference.same_city(&arriving.destination, &departing.origin) {
            self.airport_change_minutes
        } else if reference.is_large_hub(&arriving.destination) {
            self.large_hub_minutes
        } else if reference.is_international(&arriving.origin, &arriving.destination)
            || reference.is_international(&departing.origin, &departing.destination)
        {
            self.international_minutes
        } else {
            self.default_minutes
        }
    }

    /// Longest allowed layover at `transit_airport`.
    pub fn maximum_minutes(
        &self,
        transit_airport: &str,
        virtual_interline: bool,
        reference: &ReferenceData,
        overrides: ConnectionOverrides,
    ) -> i64 {
        let max = overrides
            .max_minutes()
            .unwrap_or(self.max_connection_minutes)
            .min(HARD_MAX_CONNECTION_MINUTES);

        let visa_required = reference
            .country_of(transit_airport)
            .is_some_and(|country| reference.requires_transit_visa(country));

        if visa_required {
            max.min(self.visa_required_transit_max_minutes)
        } else if virtual_interline {
            // self transfers leave the airside, so the visa free ceiling applies
            max.min(self.visa_free_transit_max_minutes)
        } else {
            max
        }
    }

    pub fn window(
        &self,
        arriving: &Segment,
        departing: &Segment,
        virtual_interline: bool,
        reference: &ReferenceData,
        overrides: ConnectionOverrides,
    ) -> ConnectionWindow {
        let table_min = self.minimum_minutes(arriving, departing, virtual_interline, reference);
        ConnectionWindow {
            min_minutes: overrides
                .min_minutes()
                .map_or(table_min, |caller_min| caller_min.max(table_min)),
            max_minutes: self.maximum_minutes(
                &arriving.destination,
                virtual_interline,
                reference,
                overrides,
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::fixtures::seg;
    use test_case::test_case;

    // (arriving, departing, virtual interline) -> expected minimum
    #[test_case("NBO", "ADD", "ADD", "CPT", true, 240; "virtual interline wins")]
    #[test_case("JNB", "LHR", "LGW", "MAN", false, 180; "same city airport change")]
    #[test_case("JNB", "DXB", "DXB", "BOM", false, 120; "large hub")]
    #[test_case("JNB", "NBO", "NBO", "KGL", false, 90; "international")]
    #[test_case("CPT", "JNB", "JNB", "DUR", false, 60; "domestic")]
    fn test_minimum_connection_priority(
        a_from: &str,
        a_to: &str,
        b_from: &str,
        b_to: &str,
        virtual_interline: bool,
        expected: i64,
    ) {
        let policy = ConnectionPolicy::default();
        let reference = ReferenceData::builtin();
        let arriving = seg("XX1", a_from, a_to, "2026-11-01T06:00:00Z", "2026-11-01T08:00:00Z");
        let departing = seg("XX2", b_from, b_to, "2026-11-01T12:00:00Z", "2026-11-01T14:00:00Z");
        assert_eq!(
            policy.minimum_minutes(&arriving, &departing, virtual_interline, &reference),
            expected
        );
    }

    #[test]
    fn test_maximum_connection_ceilings() {
        let policy = ConnectionPolicy::default();
        let reference = ReferenceData::builtin();
        let none = ConnectionOverrides::default();

        assert_eq!(policy.maximum_minutes("ADD", false, &reference, none), 1440);
        assert_eq!(policy.maximum_minutes("ADD", true, &reference, none), 720);
        assert_eq!(policy.maximum_minutes("LHR", false, &reference, none), 480);
        assert_eq!(policy.maximum_minutes("LHR", true, &reference, none), 480);

        // caller can shorten the maximum but never exceed the hard ceiling
        let short = ConnectionOverrides::new(None, Some(6 * 60 * MS_PER_MINUTE));
        assert_eq!(policy.maximum_minutes("ADD", false, &reference, short), 360);
        let long = ConnectionOverrides::new(None, Some(48 * 60 * MS_PER_MINUTE));
        assert_eq!(policy.maximum_minutes("ADD", false, &reference, long), 1440);
    }

    #[test]
    fn test_caller_minimum_only_tightens() {
        let policy = ConnectionPolicy::default();
        let reference = ReferenceData::builtin();
        let arriving = seg("SA1", "CPT", "JNB", "2026-11-01T06:00:00Z", "2026-11-01T08:00:00Z");
        let departing = seg("SA2", "JNB", "DUR", "2026-11-01T12:00:00Z", "2026-11-01T13:00:00Z");

        let loose = ConnectionOverrides::new(Some(30 * MS_PER_MINUTE), None);
        let window = policy.window(&arriving, &departing, false, &reference, loose);
        assert_eq!(window.min_minutes, 60);

        let strict = ConnectionOverrides::new(Some(90 * MS_PER_MINUTE + 1), None);
        let window = policy.window(&arriving, &departing, false, &reference, strict);
        assert_eq!(window.min_minutes, 91);
        assert!(window.contains(91));
        assert!(!window.contains(90));
    }
}
