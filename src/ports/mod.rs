//! Ports Layer - Trait boundaries between domain and the outside world
//!
//! Discovery and enrichment are the two seams; adapters implement these
//! traits and the application layer only ever sees the traits.

pub mod discovery;
pub mod enrichment;
pub mod mocks;

pub use discovery::{DiscoveryError, DiscoveryParams, DiscoverySource};
pub use enrichment::{EnrichError, EnrichField, Enricher};
