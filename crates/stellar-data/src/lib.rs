//! Star identity resolution, cross-catalog merge and abundance normalization.
//!
//! Catalog rows are resolved to canonical stars (cache, alias store, then a
//! rate-limited external service), merged per star, re-expressed against
//! each configured solar scale, and reduced into per-element statistics.

pub mod cache;
pub mod canonical;
pub mod catalog;
pub mod config;
pub mod document;
pub mod error;
pub mod names;
pub mod normalize;
pub mod pipeline;
pub mod policy;
pub mod reducer;
pub mod representative;
pub mod resolution;
pub mod resolver;
pub mod simbad;
pub mod solar;
pub mod stats;
pub mod store;

pub use cache::IdentityCache;
pub use canonical::{CanonicalStar, IdentityOrigin};
pub use catalog::{CatalogRecord, CatalogRegistry, CatalogRow, CatalogTable, Ratio};
pub use config::{EngineConfig, ReductionConfig, ResolverConfig};
pub use document::{save_array, save_per_star, StarDocument};
pub use error::{CatalogError, CatalogResult};
pub use normalize::{CatalogAbundances, NormalizedAbundances};
pub use pipeline::{IngestionPipeline, ParamSource, ParamSourceTables, RunSummary};
pub use policy::{AutoCreate, OperatorQueue, QueuedName, ResolutionPolicy, UnresolvedDecision};
pub use reducer::{ParamSources, StarParams};
pub use representative::{ErrorSource, RepresentativeErrors};
pub use resolution::{Resolution, ResolutionStats, ResolvedVia, StarResolver};
pub use resolver::{ExternalResolver, ExternalStar, RateLimited, ResolverOutcome, StaticResolver};
pub use simbad::SimbadTapResolver;
pub use solar::SolarNorms;
pub use stats::{reduce_abundances, ElementStats, ReducedAbundances};
pub use store::{AliasStore, InMemoryAliasStore, JsonAliasStore};
