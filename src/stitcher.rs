// Route synthesis: joins separately ticketed itineraries at shared airports
// ("virtual interlining"), including origin -> hub1 -> hub2 -> destination
// chains.
//
// All the work is bounded by the caps in `StitchConfig`: hub count,
// combinations per hub and number of multi-hub results.

use crate::model::{Itinerary, ItinerarySource};
use crate::validator::RouteValidator;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet};
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpansionStrategy {
    // Cheapest combined price first, up to the per-hub cap
    BestFirst,
    // Truncated cross product in provider order
    CappedCrossProduct,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StitchConfig {
    pub max_hubs: usize,
    pub min_hub_frequency: usize,
    pub max_combinations_per_hub: usize,
    pub multi_hub_candidates: usize,
    pub multi_hub_legs_per_slot: usize,
    pub max_multi_hub_results: usize,
    pub strategy: ExpansionStrategy,
}

impl Default for StitchConfig {
    fn default() -> Self {
        Self {
            max_hubs: 10,
            min_hub_frequency: 3,
            max_combinations_per_hub: 50,
            multi_hub_candidates: 5,
            multi_hub_legs_per_slot: 3,
            max_multi_hub_results: 10,
            strategy: ExpansionStrategy::BestFirst,
        }
    }
}

// Heap entry for best-first pair expansion, ordered as a min-heap on cost
struct PairCandidate {
    cost: f64,
    i: usize,
    j: usize,
}

impl PartialEq for PairCandidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for PairCandidate {}

impl PartialOrd for PairCandidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PairCandidate {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .cost
            .total_cmp(&self.cost)
            .then_with(|| other.i.cmp(&self.i))
            .then_with(|| other.j.cmp(&self.j))
    }
}

#[derive(Debug, Clone)]
pub struct RouteStitcher {
    config: StitchConfig,
    validator: RouteValidator,
}

impl RouteStitcher {
    pub fn new(config: StitchConfig, validator: RouteValidator) -> Self {
        Self { config, validator }
    }

    /// Builds every stitched itinerary reachable from `direct` within the
    /// configured caps. Inputs are left untouched; outputs only reference them.
    pub fn synthesize(&self, direct: &[Itinerary], origin: &str, destination: &str) -> Vec<Itinerary> {
        let pool: Vec<Arc<Itinerary>> = direct.iter().cloned().map(Arc::new).collect();

        let hubs = self.identify_hubs(direct, origin, destination);
        let mut stitched = self.single_hub_routes(&pool, origin, destination, &hubs);
        let single_hub = stitched.len();
        stitched.extend(self.multi_hub_routes(&pool, origin, destination));

        debug!(
            origin,
            destination,
            hubs = hubs.len(),
            single_hub,
            multi_hub = stitched.len() - single_hub,
            "synthesized itineraries"
        );
        stitched
    }

    /// Intermediate airports seen in the direct results that are either
    /// curated hubs or frequent enough, most frequent first.
    pub fn identify_hubs(&self, direct: &[Itinerary], origin: &str, destination: &str) -> Vec<String> {
        let mut counts: HashMap<&str, usize> = HashMap::new();
        for itinerary in direct {
            for segment in &itinerary.segments {
                for code in [segment.origin.as_str(), segment.destination.as_str()] {
                    if code != origin && code != destination {
                        *counts.entry(code).or_default() += 1;
                    }
                }
            }
        }

        let reference = self.validator.reference();
        let mut hubs: Vec<(&str, usize)> = counts
            .into_iter()
            .filter(|&(code, count)| {
                reference.is_known_hub(code) || count >= self.config.min_hub_frequency
            })
            .collect();
        hubs.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        hubs.truncate(self.config.max_hubs);

        hubs.into_iter().map(|(code, _)| code.to_string()).collect()
    }

    /// Joins `first` and `second` at the airport where `first` ends. Returns
    /// None when they do not meet, are the same itinerary, are priced in
    /// different currencies or the self transfer window is not respected.
    pub fn stitch_two_routes(
        &self,
        first: &Arc<Itinerary>,
        second: &Arc<Itinerary>,
    ) -> Option<Itinerary> {
        let arriving = first.last_segment()?;
        let departing = second.first_segment()?;

        if arriving.destination != departing.origin || first.id == second.id {
            return None;
        }
        if first.currency != second.currency {
            debug!(first = %first.id, second = %second.id, "currency mismatch, not stitching");
            return None;
        }
        if let Err(reason) = self.validator.validate_connection(arriving, departing, true) {
            debug!(first = %first.id, second = %second.id, %reason, "connection rejected");
            return None;
        }

        let mut chain: Vec<String> = first
            .junction_airports()
            .into_iter()
            .map(str::to_string)
            .collect();
        chain.push(arriving.destination.clone());
        chain.extend(second.junction_airports().into_iter().map(str::to_string));

        let segments = first
            .segments
            .iter()
            .chain(second.segments.iter())
            .cloned()
            .collect();

        let mut stitched = Itinerary::new(
            ItinerarySource::Stitched,
            segments,
            first.price + second.price,
            first.currency.clone(),
        );
        stitched.separate_tickets = true;
        stitched.virtual_interline = true;
        stitched.connection_airport = chain.first().cloned();
        stitched.hub_chain = (chain.len() > 1).then_some(chain);
        stitched.original_components = vec![Arc::clone(first), Arc::clone(second)];
        Some(stitched)
    }

    fn single_hub_routes(
        &self,
        pool: &[Arc<Itinerary>],
        origin: &str,
        destination: &str,
        hubs: &[String],
    ) -> Vec<Itinerary> {
        let mut stitched = Vec::new();

        for hub in hubs {
            let to_hub = legs_between(pool, origin, hub);
            let from_hub = legs_between(pool, hub, destination);
            if to_hub.is_empty() || from_hub.is_empty() {
                continue;
            }

            let before = stitched.len();
            for (i, j) in self.candidate_pairs(&to_hub, &from_hub) {
                if let Some(itinerary) = self.stitch_two_routes(to_hub[i], from_hub[j]) {
                    stitched.push(itinerary);
                }
            }
            debug!(
                hub = %hub,
                to_hub = to_hub.len(),
                from_hub = from_hub.len(),
                stitched = stitched.len() - before,
                "stitched through hub"
            );
        }
        stitched
    }

    // Index pairs into (to_hub, from_hub), at most `max_combinations_per_hub`
    fn candidate_pairs(
        &self,
        to_hub: &[&Arc<Itinerary>],
        from_hub: &[&Arc<Itinerary>],
    ) -> Vec<(usize, usize)> {
        let cap = self.config.max_combinations_per_hub;
        if cap == 0 {
            return Vec::new();
        }

        match self.config.strategy {
            ExpansionStrategy::BestFirst => cheapest_pairs(to_hub, from_hub, cap),
            ExpansionStrategy::CappedCrossProduct => {
                let (left, right) = if to_hub.len() * from_hub.len() <= cap {
                    (to_hub.len(), from_hub.len())
                } else {
                    let per_side = cap.div_ceil(to_hub.len().max(from_hub.len()));
                    (per_side.min(to_hub.len()), per_side.min(from_hub.len()))
                };
                (0..left)
                    .flat_map(|i| (0..right).map(move |j| (i, j)))
                    .take(cap)
                    .collect()
            }
        }
    }

    fn multi_hub_routes(
        &self,
        pool: &[Arc<Itinerary>],
        origin: &str,
        destination: &str,
    ) -> Vec<Itinerary> {
        let limit = self.config.max_multi_hub_results;
        let mut results = Vec::new();
        if limit == 0 {
            return results;
        }

        let candidates = airports_seen(pool, origin, destination, self.config.multi_hub_candidates);
        let per_slot = self.config.multi_hub_legs_per_slot;

        for hub1 in &candidates {
            for hub2 in &candidates {
                if hub1 == hub2 {
                    continue;
                }

                let first_legs = self.slot(pool, origin, hub1, per_slot);
                let middle_legs = self.slot(pool, hub1, hub2, per_slot);
                let last_legs = self.slot(pool, hub2, destination, per_slot);
                if first_legs.is_empty() || middle_legs.is_empty() || last_legs.is_empty() {
                    continue;
                }

                for leg1 in &first_legs {
                    for leg2 in &middle_legs {
                        let Some(partial) = self.stitch_two_routes(leg1, leg2) else {
                            continue;
                        };
                        let partial = Arc::new(partial);
                        for leg3 in &last_legs {
                            if let Some(itinerary) = self.stitch_two_routes(&partial, leg3) {
                                results.push(itinerary);
                                if results.len() >= limit {
                                    debug!(limit, "multi-hub result cap reached");
                                    return results;
                                }
                            }
                        }
                    }
                }
            }
        }
        results
    }

    // Candidate legs for one slot of a 2-hub chain
    fn slot<'a>(
        &self,
        pool: &'a [Arc<Itinerary>],
        from: &str,
        to: &str,
        limit: usize,
    ) -> Vec<&'a Arc<Itinerary>> {
        let mut legs = legs_between(pool, from, to);
        if self.config.strategy == ExpansionStrategy::BestFirst {
            legs.sort_by(|a, b| a.price.total_cmp(&b.price));
        }
        legs.truncate(limit);
        legs
    }
}

fn legs_between<'a>(pool: &'a [Arc<Itinerary>], from: &str, to: &str) -> Vec<&'a Arc<Itinerary>> {
    pool.iter()
        .filter(|itinerary| itinerary.origin() == Some(from) && itinerary.destination() == Some(to))
        .collect()
}

// Unique airports in first-seen order, excluding the search endpoints
fn airports_seen(pool: &[Arc<Itinerary>], origin: &str, destination: &str, limit: usize) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut airports = Vec::new();

    for segment in pool.iter().flat_map(|itinerary| itinerary.segments.iter()) {
        for code in [&segment.origin, &segment.destination] {
            if code != origin && code != destination && seen.insert(code.as_str()) {
                airports.push(code.clone());
                if airports.len() == limit {
                    return airports;
                }
            }
        }
    }
    airports
}

// k cheapest (i, j) pairs by combined price, without building the full product
fn cheapest_pairs(left: &[&Arc<Itinerary>], right: &[&Arc<Itinerary>], k: usize) -> Vec<(usize, usize)> {
    let mut left_order: Vec<usize> = (0..left.len()).collect();
    left_order.sort_by(|&a, &b| left[a].price.total_cmp(&left[b].price));
    let mut right_order: Vec<usize> = (0..right.len()).collect();
    right_order.sort_by(|&a, &b| right[a].price.total_cmp(&right[b].price));

    let cost = |i: usize, j: usize| left[left_order[i]].price + right[right_order[j]].price;

    let mut pairs = Vec::with_capacity(k.min(left.len() * right.len()));
    let mut queued = HashSet::new();
    let mut heap = BinaryHeap::new();
    heap.push(PairCandidate { cost: cost(0, 0), i: 0, j: 0 });
    queued.insert((0, 0));

    while let Some(PairCandidate { i, j, .. }) = heap.pop() {
        pairs.push((left_order[i], right_order[j]));
        if pairs.len() >= k {
            break;
        }
        for (ni, nj) in [(i + 1, j), (i, j + 1)] {
            if ni < left.len() && nj < right.len() && queued.insert((ni, nj)) {
                heap.push(PairCandidate { cost: cost(ni, nj), i: ni, j: nj });
            }
        }
    }
    pairs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::ConnectionPolicy;
    use crate::model::fixtures::{direct, seg};
    use crate::reference::ReferenceData;
    use crate::validator::DurationLimits;

    fn stitcher_with(config: StitchConfig) -> RouteStitcher {
        let validator = RouteValidator::new(
            ConnectionPolicy::default(),
            DurationLimits::default(),
            Arc::new(ReferenceData::builtin()),
        );
        RouteStitcher::new(config, validator)
    }

    fn stitcher() -> RouteStitcher {
        stitcher_with(StitchConfig::default())
    }

    fn leg(flight: &str, from: &str, to: &str, dep: &str, arr: &str, price: f64) -> Itinerary {
        direct("alpha", vec![seg(flight, from, to, dep, arr)], price)
    }

    fn jnb_add() -> Arc<Itinerary> {
        Arc::new(leg("ET808", "JNB", "ADD", "2026-11-01T04:15:00Z", "2026-11-01T10:00:00Z", 2000.0))
    }

    fn add_cpt(departure: &str, arrival: &str) -> Arc<Itinerary> {
        Arc::new(leg("ET847", "ADD", "CPT", departure, arrival, 1500.0))
    }

    #[test]
    fn test_no_stitch_when_airports_differ() {
        let to_cpt = Arc::new(leg("SA302", "JNB", "CPT", "2026-11-01T08:00:00Z", "2026-11-01T10:10:00Z", 3000.0));
        let from_jnb = Arc::new(leg("SA550", "JNB", "DUR", "2026-11-01T18:00:00Z", "2026-11-01T19:05:00Z", 1200.0));
        assert!(stitcher().stitch_two_routes(&to_cpt, &from_jnb).is_none());
    }

    #[test]
    fn test_no_stitch_with_negative_gap() {
        let first = Arc::new(leg("ET808", "JNB", "ADD", "2026-11-01T08:15:00Z", "2026-11-01T14:00:00Z", 2000.0));
        let second = add_cpt("2026-11-01T13:00:00Z", "2026-11-01T20:00:00Z");
        assert!(stitcher().stitch_two_routes(&first, &second).is_none());
    }

    #[test]
    fn test_self_transfer_needs_four_hours() {
        let s = stitcher();
        let too_tight = add_cpt("2026-11-01T12:00:00Z", "2026-11-01T19:00:00Z");
        assert!(s.stitch_two_routes(&jnb_add(), &too_tight).is_none());

        let comfortable = add_cpt("2026-11-01T15:00:00Z", "2026-11-01T22:00:00Z");
        assert!(s.stitch_two_routes(&jnb_add(), &comfortable).is_some());
    }

    #[test]
    fn test_stitched_itinerary_shape() {
        let first = jnb_add();
        let second = Arc::new(direct(
            "beta",
            vec![seg("FA847", "ADD", "CPT", "2026-11-01T15:00:00Z", "2026-11-01T22:00:00Z")],
            1500.0,
        ));
        let stitched = stitcher().stitch_two_routes(&first, &second).unwrap();

        assert_eq!(stitched.segments.len(), 2);
        assert_eq!(stitched.price, 3500.0);
        assert_eq!(stitched.currency, "ZAR");
        assert_eq!(stitched.total_duration_minutes, 17 * 60 + 45);
        assert_eq!(stitched.source, ItinerarySource::Stitched);
        assert!(stitched.virtual_interline);
        assert!(stitched.separate_tickets);
        assert_eq!(stitched.connection_airport.as_deref(), Some("ADD"));
        assert_eq!(stitched.hub_chain, None);
        assert_eq!(stitched.original_components.len(), 2);
        assert_eq!(stitched.original_components[0].id, first.id);
        assert_eq!(stitched.original_components[1].id, second.id);
        assert_eq!(
            stitched.carriers.iter().map(String::as_str).collect::<Vec<_>>(),
            vec!["ET", "FA"]
        );
        // inputs keep their identity
        assert!(!first.virtual_interline);
        assert_eq!(Arc::strong_count(&first), 2);
    }

    #[test]
    fn test_no_self_join() {
        let loop_trip = Arc::new(direct(
            "alpha",
            vec![
                seg("SA301", "JNB", "CPT", "2026-11-01T06:00:00Z", "2026-11-01T08:10:00Z"),
                seg("SA302", "CPT", "JNB", "2026-11-01T10:00:00Z", "2026-11-01T12:00:00Z"),
            ],
            4000.0,
        ));
        let same = Arc::new((*loop_trip).clone());
        assert!(stitcher().stitch_two_routes(&loop_trip, &same).is_none());
    }

    #[test]
    fn test_no_stitch_across_currencies() {
        let mut second = leg("ET847", "ADD", "CPT", "2026-11-01T15:00:00Z", "2026-11-01T22:00:00Z", 80.0);
        second.currency = "USD".to_string();
        assert!(stitcher().stitch_two_routes(&jnb_add(), &Arc::new(second)).is_none());
    }

    #[test]
    fn test_identify_hubs() {
        let direct_results = vec![
            leg("ET808", "JNB", "ADD", "2026-11-01T04:15:00Z", "2026-11-01T10:00:00Z", 2000.0),
            leg("ET847", "ADD", "CPT", "2026-11-01T15:00:00Z", "2026-11-01T22:00:00Z", 1500.0),
            // WDH is not curated, but seen three times
            leg("SA74", "JNB", "WDH", "2026-11-01T09:00:00Z", "2026-11-01T11:00:00Z", 2500.0),
            leg("SW711", "WDH", "CPT", "2026-11-01T16:00:00Z", "2026-11-01T18:00:00Z", 1900.0),
            leg("SW712", "WDH", "CPT", "2026-11-01T19:00:00Z", "2026-11-01T21:00:00Z", 1700.0),
            // GBE is neither curated nor frequent
            leg("BP201", "JNB", "GBE", "2026-11-01T09:00:00Z", "2026-11-01T10:00:00Z", 1400.0),
        ];
        let hubs = stitcher().identify_hubs(&direct_results, "JNB", "CPT");
        assert_eq!(hubs, vec!["WDH".to_string(), "ADD".to_string()]);

        let capped = stitcher_with(StitchConfig {
            max_hubs: 1,
            ..StitchConfig::default()
        });
        assert_eq!(capped.identify_hubs(&direct_results, "JNB", "CPT"), vec!["WDH".to_string()]);
    }

    #[test]
    fn test_synthesize_through_single_hub() {
        let direct_results = vec![
            leg("SA302", "JNB", "CPT", "2026-11-01T08:00:00Z", "2026-11-01T10:10:00Z", 3000.0),
            (*jnb_add()).clone(),
            (*add_cpt("2026-11-01T15:00:00Z", "2026-11-01T22:00:00Z")).clone(),
        ];
        let stitched = stitcher().synthesize(&direct_results, "JNB", "CPT");
        assert_eq!(stitched.len(), 1);
        assert_eq!(stitched[0].origin(), Some("JNB"));
        assert_eq!(stitched[0].destination(), Some("CPT"));
        assert_eq!(stitched[0].price, 3500.0);
    }

    fn hub_buckets(count: usize) -> Vec<Itinerary> {
        let mut results = Vec::new();
        for n in 0..count {
            results.push(leg(
                &format!("ET{}", 100 + n),
                "JNB",
                "ADD",
                "2026-11-01T04:15:00Z",
                "2026-11-01T10:00:00Z",
                1000.0 + 10.0 * n as f64,
            ));
            results.push(leg(
                &format!("ET{}", 500 + n),
                "ADD",
                "CPT",
                "2026-11-01T15:00:00Z",
                "2026-11-01T22:00:00Z",
                2000.0 - 10.0 * n as f64,
            ));
        }
        results
    }

    #[test]
    fn test_per_hub_cap_bounds_combinations() {
        let results = hub_buckets(20);
        let s = stitcher_with(StitchConfig {
            max_combinations_per_hub: 7,
            ..StitchConfig::default()
        });
        assert_eq!(s.synthesize(&results, "JNB", "CPT").len(), 7);
    }

    #[test]
    fn test_best_first_yields_cheapest_pairs() {
        let results = hub_buckets(10);
        let s = stitcher_with(StitchConfig {
            max_combinations_per_hub: 5,
            ..StitchConfig::default()
        });
        let stitched = s.synthesize(&results, "JNB", "CPT");
        assert_eq!(stitched.len(), 5);

        // cheapest possible combined price is 1000 + 1910
        let prices: Vec<f64> = stitched.iter().map(|i| i.price).collect();
        assert_eq!(prices[0], 2910.0);
        assert!(prices.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_capped_cross_product_limits_each_side() {
        let results = hub_buckets(20);
        let s = stitcher_with(StitchConfig {
            max_combinations_per_hub: 50,
            strategy: ExpansionStrategy::CappedCrossProduct,
            ..StitchConfig::default()
        });
        // 20 x 20 exceeds the cap, so ceil(50 / 20) = 3 per side
        assert_eq!(s.synthesize(&results, "JNB", "CPT").len(), 9);
    }

    #[test]
    fn test_two_hub_chain() {
        let results = vec![
            leg("KQ761", "JNB", "NBO", "2026-11-01T06:00:00Z", "2026-11-01T10:00:00Z", 2500.0),
            leg("ET308", "NBO", "ADD", "2026-11-01T14:30:00Z", "2026-11-01T16:30:00Z", 900.0),
            leg("ET847", "ADD", "CPT", "2026-11-01T21:00:00Z", "2026-11-02T04:00:00Z", 1500.0),
        ];
        let stitched = stitcher().synthesize(&results, "JNB", "CPT");
        let chain: Vec<&Itinerary> = stitched.iter().filter(|i| i.hub_chain.is_some()).collect();

        assert_eq!(chain.len(), 1);
        let itinerary = chain[0];
        assert_eq!(itinerary.segments.len(), 3);
        assert_eq!(itinerary.price, 4900.0);
        assert_eq!(
            itinerary.hub_chain,
            Some(vec!["NBO".to_string(), "ADD".to_string()])
        );
        assert_eq!(itinerary.connection_airport.as_deref(), Some("NBO"));
        assert_eq!(itinerary.original_components.len(), 2);
        assert!(itinerary.original_components[0].is_stitched());
    }

    #[test]
    fn test_multi_hub_result_cap() {
        let mut results = Vec::new();
        for n in 0..4 {
            let price = 100.0 * (n + 1) as f64;
            results.push(leg(&format!("KQ{n}"), "JNB", "NBO", "2026-11-01T06:00:00Z", "2026-11-01T10:00:00Z", price));
            results.push(leg(&format!("ET{n}"), "NBO", "ADD", "2026-11-01T14:30:00Z", "2026-11-01T16:30:00Z", price));
            results.push(leg(&format!("EY{n}"), "ADD", "CPT", "2026-11-01T21:00:00Z", "2026-11-02T04:00:00Z", price));
        }
        let s = stitcher_with(StitchConfig {
            max_multi_hub_results: 4,
            ..StitchConfig::default()
        });
        let chains = s
            .synthesize(&results, "JNB", "CPT")
            .into_iter()
            .filter(|i| i.hub_chain.is_some())
            .count();
        assert_eq!(chains, 4);
    }
}
