// Stable deduplication of itineraries that describe the same bookable flights

use crate::model::Itinerary;
use std::collections::HashSet;
use tracing::debug;

/// Canonical signature: the ordered (carrier, flight number, origin,
/// destination) of every segment, then total price and total duration so
/// differently priced fares on the same flights stay distinct.
///
/// Itineraries without segments get a random signature and are never
/// collapsed.
pub fn signature(itinerary: &Itinerary) -> String {
    if itinerary.segments.is_empty() {
        return format!("opaque:{:016x}", rand::random::<u64>());
    }

    let flights = itinerary
        .segments
        .iter()
        .map(|s| {
            format!(
                "{}|{}|{}|{}",
                s.carrier,
                s.flight_number.as_deref().unwrap_or(""),
                s.origin,
                s.destination
            )
        })
        .collect::<Vec<_>>()
        .join(";");

    format!(
        "{flights}#{:.2}#{}",
        itinerary.price, itinerary.total_duration_minutes
    )
}

/// First seen wins; input order is preserved.
pub fn deduplicate(itineraries: Vec<Itinerary>) -> Vec<Itinerary> {
    let before = itineraries.len();
    let mut seen = HashSet::with_capacity(before);

    let unique: Vec<Itinerary> = itineraries
        .into_iter()
        .filter(|itinerary| seen.insert(signature(itinerary)))
        .collect();

    debug!(before, after = unique.len(), "deduplicated itineraries");
    unique
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::fixtures::{direct, seg};

    fn jnb_cpt(provider: &str, price: f64) -> Itinerary {
        direct(
            provider,
            vec![seg("SA302", "JNB", "CPT", "2026-11-01T08:00:00Z", "2026-11-01T10:10:00Z")],
            price,
        )
    }

    #[test]
    fn test_collapses_repeats_across_providers() {
        let result = deduplicate(vec![
            jnb_cpt("alpha", 3000.0),
            jnb_cpt("beta", 3000.0),
            jnb_cpt("gamma", 3000.0),
        ]);
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].source.as_str(), "alpha");
    }

    #[test]
    fn test_keeps_different_fares_on_same_flights() {
        let result = deduplicate(vec![jnb_cpt("alpha", 3000.0), jnb_cpt("beta", 4200.0)]);
        assert_eq!(result.len(), 2);
    }

    #[test]
    fn test_preserves_first_seen_order() {
        let other = direct(
            "beta",
            vec![seg("FA101", "JNB", "CPT", "2026-11-01T07:00:00Z", "2026-11-01T09:10:00Z")],
            1800.0,
        );
        let result = deduplicate(vec![
            jnb_cpt("alpha", 3000.0),
            other.clone(),
            jnb_cpt("gamma", 3000.0),
        ]);
        assert_eq!(result.len(), 2);
        assert_eq!(result[0].source.as_str(), "alpha");
        assert_eq!(result[1], other);
    }

    #[test]
    fn test_is_idempotent() {
        let input = vec![
            jnb_cpt("alpha", 3000.0),
            jnb_cpt("beta", 3000.0),
            jnb_cpt("gamma", 2500.0),
            direct("delta", vec![], 10.0),
        ];
        let once = deduplicate(input);
        let twice = deduplicate(once.clone());
        assert_eq!(once, twice);
    }

    #[test]
    fn test_segmentless_itineraries_are_never_merged() {
        let result = deduplicate(vec![direct("alpha", vec![], 10.0), direct("alpha", vec![], 10.0)]);
        assert_eq!(result.len(), 2);
    }
}
