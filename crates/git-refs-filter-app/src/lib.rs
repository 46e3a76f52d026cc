//! Application layer of git-refs-filter.
//!
//! This crate wires the change-state caches, the change scanner and the
//! project configuration into [`ForProjectFilter`], a permission-layer wrapper
//! that hides refs of closed changes from ref advertisements.

pub mod cache_key;
pub mod change_cache;
pub mod change_store;
pub mod clock;
pub mod config;
pub mod filter;
pub mod memory_store;
pub mod permissions;
pub mod scanner;

// Re-exports for convenience
pub use cache_key::ChangeCacheKey;
pub use change_cache::{CHANGES_TS_CACHE, CacheLoadError, ChangeCaches, OPEN_CHANGES_CACHE};
pub use change_store::{ChangeStore, RepoHandle};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{CacheConfig, ConfigError, ProjectFilterConfig, RefsFilterConfig};
pub use filter::{CandidateOpenSet, ForProjectFilter, RefsFilter, Viewer};
pub use memory_store::MemoryChangeStore;
pub use permissions::{
    AllRefsVisible, GrantedRef, ProjectPermission, ProjectPermissions, Ref, RefFilterOptions,
    RefMap, RefPermission, RefPermissions, ref_map,
};
pub use scanner::{ChangeScan, ChangeScanError, ChangeScanner, ScanError, ScannedChange};
