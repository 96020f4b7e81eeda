//! Diagnostic routes.
//!
//! `debug/*` echo the request back and are registered in debug mode.
//! `admin/*` expose server state and need `Authorization: Bearer <api_key>`.

pub mod auth;
pub mod handlers;

use axum::http::Method;

use self::auth::RequireApiKey;
use self::handlers::*;
use crate::context::ServerContext;
use crate::http::handler::{handler_fn, Handler};
use crate::http::request::HandlerRequest;
use crate::routing::{RouteBinding, RouteError};

/// Adapt a context-taking admin function into a guarded handler.
macro_rules! admin_route {
    ($context:expr, $api_key:expr, $f:path) => {{
        let context = $context.clone();
        RequireApiKey::new(
            $api_key,
            handler_fn(move |_req: HandlerRequest| $f(context.clone())),
        )
    }};
}

pub fn register(context: &ServerContext) -> Result<(), RouteError> {
    let router = &context.router;

    if context.config.debug {
        router.register(
            RouteBinding::new("debug/string/[value]", handler_fn(debug_string))?
                .with_name("debug-string"),
        )?;
        router.register(
            RouteBinding::new("debug/json/[value]", handler_fn(debug_json))?
                .with_name("debug-json"),
        )?;
    }

    if context.config.admin.enabled {
        let api_key = context.config.admin.api_key.as_str();
        register_admin(
            context,
            "admin/status",
            "admin-status",
            Method::GET,
            admin_route!(context, api_key, get_status),
        )?;
        register_admin(
            context,
            "admin/routes",
            "admin-routes",
            Method::GET,
            admin_route!(context, api_key, get_routes),
        )?;
        register_admin(
            context,
            "admin/cache",
            "admin-cache",
            Method::GET,
            admin_route!(context, api_key, get_cache),
        )?;
        register_admin(
            context,
            "admin/cache/clear",
            "admin-cache-clear",
            Method::POST,
            admin_route!(context, api_key, clear_cache),
        )?;
    }

    Ok(())
}

fn register_admin(
    context: &ServerContext,
    pattern: &str,
    name: &str,
    method: Method,
    handler: impl Handler,
) -> Result<(), RouteError> {
    context
        .router
        .register(RouteBinding::new(pattern, handler)?.with_method(method).with_name(name))?;
    Ok(())
}
