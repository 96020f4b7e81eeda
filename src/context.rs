//! Shared server context.
//!
//! One `ServerContext` is built per server and cloned into every worker,
//! listener and diagnostic handler. Cloning is cheap: every field is shared.

use std::net::SocketAddr;
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::cache::ResponseCache;
use crate::config::ServerConfig;
use crate::lifecycle::Lifecycle;
use crate::net::ConnectionTracker;
use crate::routing::Router;

/// Addresses the listeners actually bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BoundAddresses {
    pub http: SocketAddr,
    pub https: Option<SocketAddr>,
}

#[derive(Debug, Clone)]
pub struct ServerContext {
    pub config: Arc<ServerConfig>,
    pub router: Arc<Router>,
    pub cache: Arc<ResponseCache>,
    pub connections: ConnectionTracker,
    pub lifecycle: Arc<Lifecycle>,
    addresses: Arc<OnceLock<BoundAddresses>>,
    started_at: Instant,
}

impl ServerContext {
    pub fn new(config: ServerConfig, router: Arc<Router>) -> Self {
        let cache = Arc::new(ResponseCache::new(&config.cache));
        Self {
            config: Arc::new(config),
            router,
            cache,
            connections: ConnectionTracker::new(),
            lifecycle: Arc::new(Lifecycle::new()),
            addresses: Arc::new(OnceLock::new()),
            started_at: Instant::now(),
        }
    }

    /// Effective addresses, once the server has bound them.
    pub fn addresses(&self) -> Option<BoundAddresses> {
        self.addresses.get().copied()
    }

    pub(crate) fn set_addresses(&self, addresses: BoundAddresses) {
        if self.addresses.set(addresses).is_err() {
            tracing::warn!("Bound addresses already recorded");
        }
    }

    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Apply the runtime-adjustable part of a reloaded configuration.
    ///
    /// Listener and worker settings are fixed once the server runs; changes
    /// to them are reported and ignored.
    pub fn apply_config_update(&self, new: &ServerConfig) {
        self.cache.set_enabled(new.cache.enabled);
        self.cache.set_ttl(new.cache.ttl());

        if new.listener.port != self.config.listener.port
            || new.listener.host != self.config.listener.host
            || new.workers.count != self.config.workers.count
            || new.workers.queue_capacity != self.config.workers.queue_capacity
        {
            tracing::warn!("Listener and worker changes take effect after a restart");
        }

        tracing::info!(
            cache_enabled = new.cache.enabled,
            cache_ttl_secs = new.cache.ttl_secs,
            "Configuration reloaded"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reload_adjusts_cache() {
        let context = ServerContext::new(ServerConfig::default(), Arc::new(Router::new()));
        assert!(context.cache.is_enabled());

        let mut updated = ServerConfig::default();
        updated.cache.enabled = false;
        updated.cache.ttl_secs = 30;
        context.apply_config_update(&updated);

        assert!(!context.cache.is_enabled());
        assert_eq!(context.cache.ttl(), Some(Duration::from_secs(30)));
        // The fixed part is untouched.
        assert!(context.config.cache.enabled);
    }
}
