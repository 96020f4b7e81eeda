//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → ServerConfig (validated, immutable)
//!     → shared via Arc to all subsystems
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → ServerContext applies the runtime-adjustable subset
//! ```
//!
//! # Design Decisions
//! - Listener and worker settings are fixed for the process lifetime
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{
    AdminConfig, CacheConfig, ListenerConfig, LogFormat, ObservabilityConfig, ServerConfig,
    StaticFilesConfig, TlsConfig, WorkerConfig,
};
pub use validation::{validate_config, ValidationError};
pub use watcher::ConfigWatcher;
