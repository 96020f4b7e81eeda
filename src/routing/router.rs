//! Route lookup and dispatch.
//!
//! # Responsibilities
//! - Store compiled bindings in registration order
//! - Look up the first binding matching a request
//! - Return the matched binding with its parameters, or an explicit no-match
//!
//! # Design Decisions
//! - Readers load an immutable snapshot (`ArcSwap`) and never lock
//! - Writers serialize on a registration mutex and publish a fresh snapshot
//! - First match wins; precedence is controlled by registration order
//! - Registration is all-or-nothing per binding

use std::sync::{Arc, Mutex, PoisonError};

use arc_swap::ArcSwap;
use axum::http::Method;
use thiserror::Error;

use super::binding::RouteBinding;
use super::params::Params;
use super::pattern::PatternSyntaxError;

/// Errors raised while registering bindings.
#[derive(Debug, Error)]
pub enum RouteError {
    #[error(transparent)]
    Pattern(#[from] PatternSyntaxError),

    #[error("a binding named `{0}` is already registered")]
    DuplicateName(String),
}

/// A successful resolution: the binding and what its pattern captured.
#[derive(Debug, Clone)]
pub struct MatchResult {
    pub binding: Arc<RouteBinding>,
    pub params: Params,
}

/// An immutable, ordered set of bindings.
#[derive(Debug, Default)]
pub struct RouteTable {
    bindings: Vec<Arc<RouteBinding>>,
}

impl RouteTable {
    /// First binding, in registration order, that accepts `method` and whose
    /// pattern matches `path`.
    pub fn resolve(&self, method: &Method, path: &str) -> Option<MatchResult> {
        self.bindings
            .iter()
            .filter(|binding| binding.methods().allows(method))
            .find_map(|binding| {
                binding.pattern().matches(path).map(|params| MatchResult {
                    binding: Arc::clone(binding),
                    params,
                })
            })
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<RouteBinding>> {
        self.bindings.iter()
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    fn contains_name(&self, name: &str) -> bool {
        self.bindings.iter().any(|b| b.name() == name)
    }
}

/// Copy-on-write router shared by every worker.
#[derive(Debug)]
pub struct Router {
    table: ArcSwap<RouteTable>,
    registration: Mutex<()>,
}

impl Router {
    pub fn new() -> Self {
        Self {
            table: ArcSwap::from_pointee(RouteTable::default()),
            registration: Mutex::new(()),
        }
    }

    /// Append a binding. Fails without touching the table if the name is taken.
    pub fn register(&self, binding: RouteBinding) -> Result<Arc<RouteBinding>, RouteError> {
        let _guard = self
            .registration
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let current = self.table.load_full();
        if current.contains_name(binding.name()) {
            return Err(RouteError::DuplicateName(binding.name().to_string()));
        }

        let binding = Arc::new(binding);
        let mut bindings = current.bindings.clone();
        bindings.push(Arc::clone(&binding));
        self.table.store(Arc::new(RouteTable { bindings }));

        tracing::debug!(
            name = %binding.name(),
            pattern = %binding.pattern(),
            methods = %binding.methods(),
            cacheable = binding.is_cacheable(),
            "Route registered"
        );
        Ok(binding)
    }

    /// Replace the whole table. Either every binding is installed or none is.
    pub fn rebuild(&self, bindings: Vec<RouteBinding>) -> Result<(), RouteError> {
        let _guard = self
            .registration
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let mut table = RouteTable::default();
        for binding in bindings {
            if table.contains_name(binding.name()) {
                return Err(RouteError::DuplicateName(binding.name().to_string()));
            }
            table.bindings.push(Arc::new(binding));
        }

        tracing::info!(routes = table.len(), "Route table rebuilt");
        self.table.store(Arc::new(table));
        Ok(())
    }

    /// Resolve a request against the current snapshot.
    pub fn resolve(&self, method: &Method, path: &str) -> Option<MatchResult> {
        self.table.load().resolve(method, path)
    }

    /// The current table.
    pub fn snapshot(&self) -> Arc<RouteTable> {
        self.table.load_full()
    }

    pub fn len(&self) -> usize {
        self.table.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.load().is_empty()
    }

    /// Log every binding in priority order.
    pub fn dump(&self) {
        let table = self.table.load();
        tracing::info!(routes = table.len(), "Route table");
        for (priority, binding) in table.iter().enumerate() {
            tracing::info!(
                priority,
                name = %binding.name(),
                pattern = %binding.pattern(),
                methods = %binding.methods(),
                cacheable = binding.is_cacheable(),
                "  route"
            );
        }
    }
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::handler::{handler_fn, Handler};
    use crate::http::response::Response;

    fn reply(body: &'static str) -> impl Handler {
        handler_fn(move |_| async move { Ok(Response::text(body)) })
    }

    fn binding(pattern: &str, body: &'static str) -> RouteBinding {
        RouteBinding::new(pattern, reply(body)).unwrap()
    }

    #[test]
    fn first_registered_match_wins() {
        let router = Router::new();
        router.register(binding("docs/<page>", "a")).unwrap();
        router.register(binding("docs/[page]", "b")).unwrap();

        let hit = router.resolve(&Method::GET, "/docs/intro").unwrap();
        assert_eq!(hit.binding.pattern().as_str(), "docs/<page>");
        assert_eq!(hit.params.get("page"), Some("intro"));

        // Only the catch-all accepts the bare prefix.
        let hit = router.resolve(&Method::GET, "/docs").unwrap();
        assert_eq!(hit.binding.pattern().as_str(), "docs/[page]");
    }

    #[test]
    fn order_decides_precedence() {
        let router = Router::new();
        router.register(binding("[page]", "catch-all")).unwrap();
        router.register(binding("about", "about")).unwrap();

        let hit = router.resolve(&Method::GET, "/about").unwrap();
        assert_eq!(hit.binding.pattern().as_str(), "[page]");
    }

    #[test]
    fn method_filter_skips_binding() {
        let router = Router::new();
        router
            .register(binding("items", "post").with_method(Method::POST))
            .unwrap();
        router
            .register(binding("items", "get").with_method(Method::GET))
            .unwrap();

        let hit = router.resolve(&Method::GET, "/items").unwrap();
        assert_eq!(hit.binding.name(), "GET /items");
        let hit = router.resolve(&Method::POST, "/items").unwrap();
        assert_eq!(hit.binding.name(), "POST /items");
        assert!(router.resolve(&Method::DELETE, "/items").is_none());
    }

    #[test]
    fn no_match_is_none() {
        let router = Router::new();
        router.register(binding("a", "a")).unwrap();
        assert!(router.resolve(&Method::GET, "/b").is_none());
    }

    #[test]
    fn duplicate_name_leaves_table_untouched() {
        let router = Router::new();
        router.register(binding("a", "a").with_name("same")).unwrap();
        let err = router
            .register(binding("b", "b").with_name("same"))
            .unwrap_err();
        assert!(matches!(err, RouteError::DuplicateName(name) if name == "same"));
        assert_eq!(router.len(), 1);
        assert!(router.resolve(&Method::GET, "/b").is_none());
    }

    #[test]
    fn rebuild_is_all_or_nothing() {
        let router = Router::new();
        router.register(binding("old", "old")).unwrap();

        let result = router.rebuild(vec![
            binding("x", "x").with_name("dup"),
            binding("y", "y").with_name("dup"),
        ]);
        assert!(result.is_err());
        assert!(router.resolve(&Method::GET, "/old").is_some());

        router.rebuild(vec![binding("new", "new")]).unwrap();
        assert!(router.resolve(&Method::GET, "/old").is_none());
        assert!(router.resolve(&Method::GET, "/new").is_some());
    }

    #[test]
    fn snapshot_survives_later_registration() {
        let router = Router::new();
        router.register(binding("a", "a")).unwrap();
        let snapshot = router.snapshot();
        router.register(binding("b", "b")).unwrap();

        assert_eq!(snapshot.len(), 1);
        assert_eq!(router.len(), 2);
    }

    #[test]
    fn concurrent_resolve_during_registration() {
        let router = Router::new();
        router.register(binding("stable/<id>", "stable")).unwrap();

        std::thread::scope(|scope| {
            for _ in 0..4 {
                scope.spawn(|| {
                    for i in 0..500 {
                        let path = format!("/stable/{i}");
                        let hit = router.resolve(&Method::GET, &path).unwrap();
                        assert_eq!(hit.params.get("id"), Some(i.to_string().as_str()));
                    }
                });
            }
            scope.spawn(|| {
                for i in 0..50 {
                    router
                        .register(binding(&format!("extra{i}"), "extra"))
                        .unwrap();
                }
            });
        });

        assert_eq!(router.len(), 51);
    }
}
