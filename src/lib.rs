//! offgrid - offline-first request interception
//!
//! Routes every same-origin request to one of three retrieval strategies
//! (network-first for pages, stale-while-revalidate for data, cache-first
//! for everything else) over a versioned response store, and manages that
//! store's install/activate lifecycle.

pub mod cache;
pub mod classify;
pub mod config;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod logging;
pub mod network;
pub mod router;
#[cfg(test)]
mod testing;

pub use error::{FetchError, InstallError, InterceptError, StoreError};
pub use router::{Router, RouterSettings};
