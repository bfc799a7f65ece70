//! Infrastructure layer - concrete cache components and background services

pub mod alias;
pub mod epoch;
pub mod policy;
pub mod prefetch;
pub mod result_cache;
pub mod slo;
pub mod store;

pub use alias::SemanticAliasIndex;
pub use epoch::IndexEpochRegistry;
pub use policy::{DynamicCachePolicy, PolicyConfigStore, StaticCachePolicy};
pub use prefetch::PredictivePrefetcher;
pub use result_cache::ResultCache;
pub use slo::{AdmissionMode, SloGuardrail, SloMonitor};
pub use store::TenantCacheStore;
