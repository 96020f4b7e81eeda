//! Response cache subsystem.
//!
//! # Data Flow
//! ```text
//! Resolved request on a cacheable binding (GET/HEAD)
//!     → key.rs (binding name + captured values + canonical query)
//!     → store.rs lookup
//!         hit  → stored response, marked `x-cache: HIT`
//!         miss → handler runs → 2xx response stored
//!
//! Startup: snapshot file → store (warm)
//! Shutdown: store → snapshot file (flush)
//! ```
//!
//! # Design Decisions
//! - One store shared by all workers; sharded locking via DashMap
//! - The binding name is the identity, so snapshots survive restarts
//! - Disabled cache is a pass-through, never an error

pub mod key;
pub mod store;

pub use key::CacheKey;
pub use store::{CacheEntry, CacheStats, ResponseCache, X_CACHE};
