pub mod generation;
pub mod refresh;
pub mod store;

pub use generation::{CatalogGeneration, LookupHit, VersionSelector};
pub use refresh::{CatalogCache, RefreshDelta, RefreshOutcome};
pub use store::{default_state_dir, CatalogStore};
