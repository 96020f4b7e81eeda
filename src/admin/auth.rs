use async_trait::async_trait;
use axum::http::{header, StatusCode};

use crate::http::handler::Handler;
use crate::http::request::HandlerRequest;
use crate::http::response::Response;

/// Wraps a handler so it only runs for `Authorization: Bearer <api_key>`.
pub struct RequireApiKey<H> {
    api_key: String,
    inner: H,
}

impl<H: Handler> RequireApiKey<H> {
    pub fn new(api_key: impl Into<String>, inner: H) -> Self {
        Self {
            api_key: api_key.into(),
            inner,
        }
    }

    fn is_authorized(&self, request: &HandlerRequest) -> bool {
        request
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .is_some_and(|token| {
                !self.api_key.is_empty() && tokens_match(token.as_bytes(), self.api_key.as_bytes())
            })
    }
}

/// Compare without an early exit on the first differing byte.
fn tokens_match(presented: &[u8], expected: &[u8]) -> bool {
    if presented.len() != expected.len() {
        return false;
    }
    presented
        .iter()
        .zip(expected)
        .fold(0u8, |diff, (a, b)| diff | (a ^ b))
        == 0
}

#[async_trait]
impl<H: Handler> Handler for RequireApiKey<H> {
    async fn handle(&self, request: HandlerRequest) -> anyhow::Result<Response> {
        if self.is_authorized(&request) {
            return self.inner.handle(request).await;
        }
        tracing::warn!(
            path = %request.path,
            peer_addr = %request.peer_addr,
            "Rejected unauthenticated admin request"
        );
        Ok(Response::status(StatusCode::UNAUTHORIZED))
    }
}
