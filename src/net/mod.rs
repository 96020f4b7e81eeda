//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (accept loop, port recovery)
//!     → pool (bounded queue, worker picks it up)
//!     → connection.rs (optional TLS handshake, lifecycle tracking)
//!     → Hand off to HTTP layer
//! ```
//!
//! # Design Decisions
//! - The listener never blocks on a busy pool; saturation is answered with 503
//! - TLS handshakes run on workers, not on the accept loop
//! - Each connection tracked for graceful shutdown

pub mod connection;
pub mod listener;
pub mod tls;

pub use connection::{Connection, ConnectionId, ConnectionTracker, IncomingConnection, Transport};
pub use listener::{Listener, ListenerError};
