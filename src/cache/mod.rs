//! Versioned response storage for offline support.
//!
//! This module provides the persistence side of the interceptor:
//! - One independent key-value store per cache version
//! - Whole-entry overwrite on write, copy-on-read on lookup
//! - Listing and deleting entire versions for lifecycle pruning
//! - The retrieval strategies that read and refresh it (`CacheLayer`)

mod layer;
mod served;
mod storage;
mod store;

pub use layer::CacheLayer;
pub use served::{CacheSource, Served};
pub use storage::{CacheStorage, MemoryStorage, SqliteStorage, VersionInfo};
pub use store::ResponseStore;
