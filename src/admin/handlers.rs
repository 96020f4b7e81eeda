use serde::Serialize;

use crate::cache::CacheStats;
use crate::context::{BoundAddresses, ServerContext};
use crate::http::request::HandlerRequest;
use crate::http::response::Response;

#[derive(Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub state: String,
    pub uptime_secs: u64,
    pub active_connections: u64,
    pub routes: usize,
    pub addresses: Option<BoundAddresses>,
}

#[derive(Serialize)]
pub struct RouteStatus {
    pub priority: usize,
    pub name: String,
    pub pattern: String,
    pub methods: String,
    pub cacheable: bool,
}

#[derive(Serialize)]
pub struct RequestEcho {
    pub request_id: String,
    pub method: String,
    pub path: String,
    pub query: Option<String>,
    pub params: Vec<(String, String)>,
    pub peer_addr: String,
    pub transport: String,
    pub body_bytes: usize,
}

impl RequestEcho {
    fn from_request(request: &HandlerRequest) -> Self {
        Self {
            request_id: request.request_id.clone(),
            method: request.method.to_string(),
            path: request.path.clone(),
            query: request.query.clone(),
            params: request
                .params
                .iter()
                .map(|(name, value)| (name.to_string(), value.to_string()))
                .collect(),
            peer_addr: request.peer_addr.to_string(),
            transport: request.transport.to_string(),
            body_bytes: request.body.len(),
        }
    }
}

pub async fn get_status(context: ServerContext) -> anyhow::Result<Response> {
    let status = SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        state: context.lifecycle.current().to_string(),
        uptime_secs: context.uptime().as_secs(),
        active_connections: context.connections.active_count(),
        routes: context.router.len(),
        addresses: context.addresses(),
    };
    Ok(Response::json(&status)?)
}

pub async fn get_routes(context: ServerContext) -> anyhow::Result<Response> {
    let routes: Vec<RouteStatus> = context
        .router
        .snapshot()
        .iter()
        .enumerate()
        .map(|(priority, binding)| RouteStatus {
            priority,
            name: binding.name().to_string(),
            pattern: binding.pattern().to_string(),
            methods: binding.methods().to_string(),
            cacheable: binding.is_cacheable(),
        })
        .collect();
    Ok(Response::json(&routes)?)
}

pub async fn get_cache(context: ServerContext) -> anyhow::Result<Response> {
    let stats: CacheStats = context.cache.stats();
    Ok(Response::json(&stats)?)
}

pub async fn clear_cache(context: ServerContext) -> anyhow::Result<Response> {
    let evicted = context.cache.len();
    context.cache.clear();
    tracing::info!(evicted, "Response cache cleared");
    Ok(Response::json(&serde_json::json!({ "evicted": evicted }))?)
}

pub async fn debug_string(request: HandlerRequest) -> anyhow::Result<Response> {
    let echo = RequestEcho::from_request(&request);
    let mut text = format!(
        "{} {} ({}) from {} over {}\n",
        echo.method, echo.path, echo.request_id, echo.peer_addr, echo.transport
    );
    for (name, value) in &echo.params {
        text.push_str(&format!("{name} = {value}\n"));
    }
    Ok(Response::text(text))
}

pub async fn debug_json(request: HandlerRequest) -> anyhow::Result<Response> {
    Ok(Response::json(&RequestEcho::from_request(&request))?)
}
