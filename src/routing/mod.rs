//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request (method, path)
//!     → router.rs (snapshot lookup, registration order)
//!     → binding.rs (method filter)
//!     → pattern.rs (segment-by-segment match)
//!     → Return: MatchResult { binding, params } or no match
//!
//! Registration (startup, optional dynamic extension):
//!     pattern text
//!     → Pattern::compile (typed segments, syntax checks)
//!     → RouteBinding (handler, method filter, cache policy)
//!     → Router::register publishes a new immutable snapshot
//! ```
//!
//! # Design Decisions
//! - Patterns compiled at registration, immutable at runtime
//! - No regex in the hot path
//! - Deterministic: same input always matches same route
//! - First match wins (ordered by registration)

pub mod binding;
pub mod params;
pub mod pattern;
pub mod router;

pub use binding::{MethodFilter, RouteBinding};
pub use params::Params;
pub use pattern::{Pattern, PatternSyntaxError, Segment};
pub use router::{MatchResult, RouteError, RouteTable, Router};
