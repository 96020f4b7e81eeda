//! Shared utilities for integration testing.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dispatch_server::config::ServerConfig;
use dispatch_server::{handler_fn, HandlerRequest, HttpServer, Response, RouteBinding, Router};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

/// Loopback, ephemeral port, small pool, no built-in routes.
pub fn test_config() -> ServerConfig {
    let mut config = ServerConfig::default();
    config.hostname = "127.0.0.1".into();
    config.listener.host = "127.0.0.1".into();
    config.listener.port = 0;
    config.listener.port_retry_attempts = 1;
    config.workers.count = 2;
    config.workers.queue_capacity = 8;
    config.workers.drain_timeout_secs = 5;
    config.static_files.enabled = false;
    config
}

/// Start a server and return it with its plain address.
pub async fn start_server(config: ServerConfig, router: Arc<Router>) -> (HttpServer, SocketAddr) {
    let mut server = HttpServer::with_router(config, router);
    let addresses = server.start().await.expect("server should start");
    (server, addresses.http)
}

/// Client that opens a fresh connection per request.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .timeout(Duration::from_secs(10))
        .build()
        .unwrap()
}

/// Register a GET-any route answering with fixed text.
pub fn text_route(router: &Router, pattern: &str, body: &'static str) {
    router
        .register(
            RouteBinding::new(
                pattern,
                handler_fn(move |_req: HandlerRequest| async move { Ok(Response::text(body)) }),
            )
            .unwrap(),
        )
        .unwrap();
}

/// Register a route that counts invocations and echoes its `id` capture.
pub fn counting_route(router: &Router, pattern: &str, cacheable: bool) -> Arc<AtomicUsize> {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    router
        .register(
            RouteBinding::new(
                pattern,
                handler_fn(move |req: HandlerRequest| {
                    let counter = Arc::clone(&counter);
                    async move {
                        counter.fetch_add(1, Ordering::SeqCst);
                        Ok(Response::text(format!("id={}", req.param("id").unwrap_or("-"))))
                    }
                }),
            )
            .unwrap()
            .with_cacheable(cacheable),
        )
        .unwrap();
    calls
}

/// Write raw bytes and read until the server closes the connection.
pub async fn raw_exchange(addr: SocketAddr, request: &str) -> String {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(request.as_bytes()).await.unwrap();

    let mut response = Vec::new();
    tokio::time::timeout(Duration::from_secs(10), stream.read_to_end(&mut response))
        .await
        .expect("server should close the connection")
        .unwrap();
    String::from_utf8_lossy(&response).into_owned()
}
