//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! Connection (from a pool worker)
//!     → hyper HTTP/1.1 driver + tower layers (request ID, trace, Server header)
//!     → dispatch.rs (route, cache lookup, bounded body, handler)
//!     → handler.rs (application or built-in handler)
//!     → response.rs (owned response → wire response)
//!     → Send to client
//!
//! server.rs coordinates listeners, pool and context across the lifecycle.
//! ```

pub mod dispatch;
pub mod handler;
pub mod request;
pub mod response;
pub mod server;
pub mod static_files;

pub use dispatch::Dispatcher;
pub use handler::{handler_fn, FnHandler, Handler};
pub use request::{HandlerRequest, UuidRequestId, X_REQUEST_ID};
pub use response::Response;
pub use server::{HttpServer, ServerError};
