//! Route bindings: a compiled pattern plus the handler it dispatches to.

use std::fmt;
use std::sync::Arc;

use axum::http::Method;

use super::pattern::{Pattern, PatternSyntaxError};
use crate::http::handler::Handler;

/// Which request methods a binding accepts.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum MethodFilter {
    #[default]
    Any,
    Only(Method),
}

impl MethodFilter {
    /// `HEAD` is accepted wherever `GET` is.
    pub fn allows(&self, method: &Method) -> bool {
        match self {
            MethodFilter::Any => true,
            MethodFilter::Only(expected) => {
                expected == method || (*expected == Method::GET && *method == Method::HEAD)
            }
        }
    }
}

impl fmt::Display for MethodFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MethodFilter::Any => f.write_str("*"),
            MethodFilter::Only(method) => write!(f, "{method}"),
        }
    }
}

/// A registered `(pattern, handler, method filter, cache policy)` tuple.
///
/// Immutable once registered. The name is the binding's identity: it must be
/// unique within a router and it keys cached responses.
pub struct RouteBinding {
    name: String,
    pattern: Pattern,
    handler: Arc<dyn Handler>,
    methods: MethodFilter,
    cacheable: bool,
    explicit_name: bool,
}

impl RouteBinding {
    /// Compile `pattern` and bind it to `handler`. Accepts any method and is not
    /// cacheable until configured otherwise.
    pub fn new(pattern: &str, handler: impl Handler) -> Result<Self, PatternSyntaxError> {
        Ok(Self::from_pattern(Pattern::compile(pattern)?, Arc::new(handler)))
    }

    pub fn from_pattern(pattern: Pattern, handler: Arc<dyn Handler>) -> Self {
        let methods = MethodFilter::Any;
        Self {
            name: default_name(&methods, &pattern),
            pattern,
            handler,
            methods,
            cacheable: false,
            explicit_name: false,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self.explicit_name = true;
        self
    }

    pub fn with_method(mut self, method: Method) -> Self {
        self.methods = MethodFilter::Only(method);
        if !self.explicit_name {
            self.name = default_name(&self.methods, &self.pattern);
        }
        self
    }

    pub fn with_cacheable(mut self, cacheable: bool) -> Self {
        self.cacheable = cacheable;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn pattern(&self) -> &Pattern {
        &self.pattern
    }

    pub fn handler(&self) -> &Arc<dyn Handler> {
        &self.handler
    }

    pub fn methods(&self) -> &MethodFilter {
        &self.methods
    }

    pub fn is_cacheable(&self) -> bool {
        self.cacheable
    }
}

impl fmt::Debug for RouteBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteBinding")
            .field("name", &self.name)
            .field("pattern", &self.pattern.as_str())
            .field("methods", &self.methods)
            .field("cacheable", &self.cacheable)
            .finish_non_exhaustive()
    }
}

fn default_name(methods: &MethodFilter, pattern: &Pattern) -> String {
    format!("{} /{}", methods, pattern.as_str().trim_start_matches('/'))
}
