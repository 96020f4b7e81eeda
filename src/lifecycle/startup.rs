//! Startup orchestration.
//!
//! # Responsibilities
//! - Register the built-in routes after the application's own
//! - Warm the response cache from its snapshot
//!
//! # Design Decisions
//! - Built-ins go last so application routes take precedence
//! - A missing or unreadable snapshot is logged and startup continues

use crate::admin;
use crate::context::ServerContext;
use crate::http::static_files::StaticFiles;
use crate::routing::RouteError;

/// Append diagnostic and static-file routes according to the configuration.
pub fn register_builtin_routes(context: &ServerContext) -> Result<(), RouteError> {
    admin::register(context)?;

    let static_files = &context.config.static_files;
    if static_files.enabled {
        StaticFiles::from_config(static_files).register(&context.router)?;
        tracing::info!(root = ?static_files.root, "Static files enabled");
    }
    Ok(())
}

/// Load the persisted cache snapshot, if any. Never fails startup.
pub fn warm_cache(context: &ServerContext) {
    match context.cache.load_from_file() {
        Ok(0) => {}
        Ok(loaded) => tracing::info!(entries = loaded, "Response cache warmed"),
        Err(e) => tracing::warn!(
            error = %e,
            path = ?context.cache.persistence_path(),
            "Failed to load response cache snapshot, starting cold"
        ),
    }
}
