//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs, driven by HttpServer::start):
//!     Register built-in routes → Bind → Warm caches → Accept
//!
//! Shutdown (HttpServer::stop):
//!     Stop accepting → Drain workers → Close sockets → Flush caches
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - State only moves forward (state.rs); start twice is an error
//! - Shutdown steps are independent: one failing does not skip the rest
//! - Drain has timeout: stuck connections are abandoned after the deadline

pub mod shutdown;
pub mod signals;
pub mod startup;
pub mod state;

pub use shutdown::{triggered, Shutdown};
pub use state::{Lifecycle, LifecycleError, LifecycleState};
