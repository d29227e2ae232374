// Flight route search with virtual interlining: provider aggregation,
// stitching of separately ticketed itineraries, validation and pricing

pub mod aggregator;
pub mod cache;
pub mod config;
pub mod connection;
pub mod dedup;
pub mod model;
pub mod pricing;
pub mod provider;
pub mod reference;
pub mod stitcher;
pub mod validator;

// Re-export key types for convenience
pub use aggregator::{RouteAggregator, SearchError};
pub use cache::{CacheConfig, CacheTtlPolicy, EvictionPolicy, InMemorySearchCache, SearchCache};
pub use config::{ConfigError, SearchConfig};
pub use connection::{ConnectionOverrides, ConnectionPolicy};
pub use model::{
    CabinClass, Itinerary, ItinerarySource, PriceBreakdown, RequestError, SearchRequest, Segment,
    TripType,
};
pub use pricing::{CurrencyConverter, IdentityConverter, PriceNormalizer, StaticRateConverter};
pub use provider::{
    BookingLinkGenerator, FlightProvider, JsonFeedProvider, MultiLegLinkGenerator, ProviderError,
};
pub use reference::{ReferenceData, ReferenceDataError};
pub use stitcher::{ExpansionStrategy, RouteStitcher, StitchConfig};
pub use validator::{DurationLimits, RejectReason, RouteValidator};
