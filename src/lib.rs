//! Embeddable HTTP server core.
//!
//! Applications register handlers against path patterns, then start the
//! server; connections are served by a fixed pool of workers behind a
//! bounded queue.
//!
//! ```text
//!     Client ──▶ net::Listener ──▶ pool::WorkerPool ──▶ http::Dispatcher
//!                 (port recovery)    (bounded queue,      │
//!                                     503 when full)      ├─▶ routing::Router (first match wins)
//!                                                         ├─▶ cache::ResponseCache
//!                                                         └─▶ Handler
//! ```

pub mod admin;
pub mod cache;
pub mod config;
pub mod context;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod pool;
pub mod routing;

pub use config::ServerConfig;
pub use context::{BoundAddresses, ServerContext};
pub use http::{handler_fn, Handler, HandlerRequest, HttpServer, Response, ServerError};
pub use lifecycle::{LifecycleState, Shutdown};
pub use routing::{Pattern, RouteBinding, Router};
