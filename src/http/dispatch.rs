//! Request dispatch.
//!
//! # Responsibilities
//! - Resolve the request path to a binding
//! - Serve cacheable GET/HEAD requests from the response cache
//! - Buffer the body, invoke the handler, contain its failures
//! - Record per-request metrics

use std::any::Any;
use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;
use std::time::Instant;

use axum::body::{Body, Bytes, HttpBody};
use axum::http::request::Parts;
use axum::http::{Method, Request, StatusCode};
use axum::response::IntoResponse;
use axum::BoxError;
use futures_util::FutureExt;
use http_body_util::LengthLimitError;

use super::request::{HandlerRequest, X_REQUEST_ID};
use super::response::Response;
use crate::cache::{CacheEntry, CacheKey};
use crate::context::ServerContext;
use crate::net::Transport;
use crate::observability::metrics;
use crate::routing::MatchResult;

/// Turns parsed requests into responses. Shared by all workers.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    context: ServerContext,
}

impl Dispatcher {
    pub fn new(context: ServerContext) -> Self {
        Self { context }
    }

    pub fn context(&self) -> &ServerContext {
        &self.context
    }

    pub async fn dispatch<B>(
        &self,
        request: Request<B>,
        peer_addr: SocketAddr,
        transport: Transport,
    ) -> axum::response::Response
    where
        B: HttpBody<Data = Bytes> + Send + 'static,
        B::Error: Into<BoxError>,
    {
        let started = Instant::now();
        let (parts, body) = request.into_parts();

        let response = match self.context.router.resolve(&parts.method, parts.uri.path()) {
            Some(matched) => {
                self.invoke(matched, parts, Body::new(body), peer_addr, transport)
                    .await
            }
            None => {
                tracing::debug!(
                    method = %parts.method,
                    path = %parts.uri.path(),
                    "No route matched"
                );
                Response::not_found()
            }
        };

        metrics::record_request(response.status_code().as_u16(), started);
        response.into_response()
    }

    async fn invoke(
        &self,
        matched: MatchResult,
        parts: Parts,
        body: Body,
        peer_addr: SocketAddr,
        transport: Transport,
    ) -> Response {
        let MatchResult { binding, params } = matched;
        let path = parts.uri.path().to_string();
        let request_id = parts
            .headers
            .get(X_REQUEST_ID)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();

        let cache_key = (binding.is_cacheable() && is_cacheable_method(&parts.method))
            .then(|| CacheKey::new(binding.name(), &params, parts.uri.query()));

        if let Some(key) = &cache_key {
            if let Some(entry) = self.context.cache.get(key) {
                tracing::debug!(binding = binding.name(), path = %path, "Served from cache");
                return entry.to_response();
            }
        }

        let limit = self.context.config.listener.max_body_bytes;
        let body = match axum::body::to_bytes(body, limit).await {
            Ok(bytes) => bytes,
            Err(e) if is_length_limit(&e) => {
                tracing::debug!(path = %path, limit, "Request body over limit");
                return Response::status(StatusCode::PAYLOAD_TOO_LARGE);
            }
            Err(e) => {
                tracing::debug!(error = %e, path = %path, "Request body unreadable");
                return Response::status(StatusCode::BAD_REQUEST);
            }
        };

        let request = HandlerRequest {
            method: parts.method.clone(),
            path: path.clone(),
            query: parts.uri.query().map(str::to_string),
            headers: parts.headers,
            params,
            body,
            request_id: request_id.clone(),
            peer_addr,
            transport,
        };

        let outcome = AssertUnwindSafe(binding.handler().handle(request))
            .catch_unwind()
            .await;

        let response = match outcome {
            Ok(Ok(response)) => response,
            Ok(Err(err)) => {
                tracing::error!(
                    request_id = %request_id,
                    method = %parts.method,
                    path = %path,
                    binding = binding.name(),
                    error = %format!("{err:#}"),
                    "Handler failed"
                );
                metrics::record_handler_failure("error");
                Response::internal_error()
            }
            Err(panic) => {
                tracing::error!(
                    request_id = %request_id,
                    method = %parts.method,
                    path = %path,
                    binding = binding.name(),
                    panic = panic_message(&*panic),
                    "Handler panicked"
                );
                metrics::record_handler_failure("panic");
                Response::internal_error()
            }
        };

        if let Some(key) = cache_key {
            if response.status_code().is_success() {
                self.context.cache.put(key, CacheEntry::from_response(&response));
            }
        }

        response
    }
}

fn is_cacheable_method(method: &Method) -> bool {
    method == Method::GET || method == Method::HEAD
}

fn is_length_limit(error: &axum::Error) -> bool {
    let mut source: Option<&(dyn std::error::Error + 'static)> = Some(error);
    while let Some(err) = source {
        if err.is::<LengthLimitError>() {
            return true;
        }
        source = err.source();
    }
    false
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.as_str()
    } else {
        "non-string panic payload"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use axum::http::header::{self, HeaderValue};

    use crate::cache::X_CACHE;
    use crate::config::ServerConfig;
    use crate::http::handler::handler_fn;
    use crate::routing::{RouteBinding, Router};

    fn dispatcher(router: Router) -> Dispatcher {
        let mut config = ServerConfig::default();
        config.listener.max_body_bytes = 16;
        Dispatcher::new(ServerContext::new(config, Arc::new(router)))
    }

    fn peer() -> SocketAddr {
        SocketAddr::from((Ipv4Addr::LOCALHOST, 40000))
    }

    async fn send(
        dispatcher: &Dispatcher,
        method: Method,
        uri: &str,
        body: &'static str,
    ) -> axum::response::Response {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::from(body))
            .unwrap();
        dispatcher.dispatch(request, peer(), Transport::Plain).await
    }

    async fn body_text(response: axum::response::Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn params_reach_the_handler() {
        let router = Router::new();
        router
            .register(
                RouteBinding::new(
                    "hello/[name=world]",
                    handler_fn(|req: HandlerRequest| async move {
                        Ok(Response::text(format!("hello {}", req.param("name").unwrap_or("?"))))
                    }),
                )
                .unwrap(),
            )
            .unwrap();
        let dispatcher = dispatcher(router);

        let response = send(&dispatcher, Method::GET, "/hello/ferris", "").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, "hello ferris");

        let response = send(&dispatcher, Method::GET, "/hello", "").await;
        assert_eq!(body_text(response).await, "hello world");
    }

    #[tokio::test]
    async fn unmatched_path_is_404() {
        let dispatcher = dispatcher(Router::new());
        let response = send(&dispatcher, Method::GET, "/nowhere", "").await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_text(response).await, "Not Found\n");
    }

    #[tokio::test]
    async fn failures_and_panics_become_500() {
        let router = Router::new();
        router
            .register(
                RouteBinding::new(
                    "fail",
                    handler_fn(|_req: HandlerRequest| async move {
                        Err::<Response, _>(anyhow::anyhow!("database unavailable"))
                    }),
                )
                .unwrap(),
            )
            .unwrap();
        router
            .register(
                RouteBinding::new(
                    "panic",
                    handler_fn(|_req: HandlerRequest| async move {
                        if true {
                            panic!("handler exploded");
                        }
                        Ok(Response::text("unreachable"))
                    }),
                )
                .unwrap(),
            )
            .unwrap();
        let dispatcher = dispatcher(router);

        let response = send(&dispatcher, Method::GET, "/fail", "").await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let response = send(&dispatcher, Method::GET, "/panic", "").await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn cacheable_binding_invokes_handler_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let router = Router::new();
        router
            .register(
                RouteBinding::new(
                    "item/<id>",
                    handler_fn(move |req: HandlerRequest| {
                        let counter = Arc::clone(&counter);
                        async move {
                            counter.fetch_add(1, Ordering::SeqCst);
                            let id = req.param("id").unwrap_or_default();
                            Ok(Response::text(format!("item {id}")))
                        }
                    }),
                )
                .unwrap()
                .with_cacheable(true),
            )
            .unwrap();
        let dispatcher = dispatcher(router);

        let first = send(&dispatcher, Method::GET, "/item/7", "").await;
        assert!(first.headers().get(X_CACHE).is_none());
        assert_eq!(body_text(first).await, "item 7");

        let second = send(&dispatcher, Method::GET, "/item/7", "").await;
        assert_eq!(second.headers()[X_CACHE], "HIT");
        assert_eq!(body_text(second).await, "item 7");
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // Different value, different entry.
        send(&dispatcher, Method::GET, "/item/8", "").await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        // Writes are never served from the cache.
        send(&dispatcher, Method::POST, "/item/7", "").await;
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn error_responses_are_not_cached() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let router = Router::new();
        router
            .register(
                RouteBinding::new(
                    "flaky",
                    handler_fn(move |_req: HandlerRequest| {
                        let counter = Arc::clone(&counter);
                        async move {
                            counter.fetch_add(1, Ordering::SeqCst);
                            Ok(Response::status(StatusCode::SERVICE_UNAVAILABLE))
                        }
                    }),
                )
                .unwrap()
                .with_cacheable(true),
            )
            .unwrap();
        let dispatcher = dispatcher(router);

        send(&dispatcher, Method::GET, "/flaky", "").await;
        send(&dispatcher, Method::GET, "/flaky", "").await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn oversized_body_is_413() {
        let router = Router::new();
        router
            .register(
                RouteBinding::new(
                    "upload",
                    handler_fn(|req: HandlerRequest| async move { Ok(Response::text(req.body)) }),
                )
                .unwrap(),
            )
            .unwrap();
        let dispatcher = dispatcher(router);

        let response = send(&dispatcher, Method::POST, "/upload", "small").await;
        assert_eq!(body_text(response).await, "small");

        let response =
            send(&dispatcher, Method::POST, "/upload", "this body is far too long").await;
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn broken_body_stream_is_400() {
        let router = Router::new();
        router
            .register(
                RouteBinding::new(
                    "upload",
                    handler_fn(|req: HandlerRequest| async move { Ok(Response::text(req.body)) }),
                )
                .unwrap(),
            )
            .unwrap();
        let dispatcher = dispatcher(router);

        let chunks = futures_util::stream::iter(vec![
            Ok(Bytes::from_static(b"ab")),
            Err(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "peer went away")),
        ]);
        let request = Request::builder()
            .method(Method::POST)
            .uri("/upload")
            .body(Body::from_stream(chunks))
            .unwrap();

        let response = dispatcher.dispatch(request, peer(), Transport::Plain).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn cache_hit_keeps_handler_headers() {
        let router = Router::new();
        router
            .register(
                RouteBinding::new(
                    "doc",
                    handler_fn(|_req: HandlerRequest| async move {
                        Ok(Response::text("v1 body")
                            .with_header(header::ETAG, HeaderValue::from_static("\"v1\""))
                            .with_header(
                                header::CONTENT_DISPOSITION,
                                HeaderValue::from_static("inline"),
                            ))
                    }),
                )
                .unwrap()
                .with_cacheable(true),
            )
            .unwrap();
        let dispatcher = dispatcher(router);

        let miss = send(&dispatcher, Method::GET, "/doc", "").await;
        assert_eq!(miss.headers()[header::ETAG], "\"v1\"");

        let hit = send(&dispatcher, Method::GET, "/doc", "").await;
        assert_eq!(hit.headers()[X_CACHE], "HIT");
        assert_eq!(hit.headers()[header::ETAG], "\"v1\"");
        assert_eq!(hit.headers()[header::CONTENT_DISPOSITION], "inline");
        assert_eq!(hit.headers()[header::CONTENT_TYPE], "text/plain; charset=utf-8");
    }
}
