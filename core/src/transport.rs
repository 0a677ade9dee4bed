//! Execution of `HttpRequest` values against the network.
//!
//! # Design
//! `Transport` is the only seam through which bytes leave the process. It
//! returns an `HttpResponse` for every status code, leaving status
//! interpretation to `BackendClient`, and fails only when no response was
//! received. `UreqTransport` drives a blocking `ureq` agent on tokio's
//! blocking pool so callers stay non-blocking.

use std::future::Future;

use ureq::typestate::WithBody;
use ureq::RequestBuilder;

use crate::error::ApiError;
use crate::http::{HttpMethod, HttpRequest, HttpResponse};

pub trait Transport: Send + Sync + 'static {
    fn execute(
        &self,
        request: HttpRequest,
    ) -> impl Future<Output = Result<HttpResponse, ApiError>> + Send;
}

#[derive(Debug, Clone)]
pub struct UreqTransport {
    agent: ureq::Agent,
}

impl UreqTransport {
    /// An agent that hands 4xx/5xx back as data rather than `Err`.
    pub fn new() -> Self {
        let agent = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .build()
            .new_agent();
        Self { agent }
    }
}

impl Default for UreqTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for UreqTransport {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, ApiError> {
        let agent = self.agent.clone();
        tokio::task::spawn_blocking(move || send(&agent, request))
            .await
            .map_err(|e| ApiError::Network(format!("transport task failed: {e}")))?
    }
}

fn send(agent: &ureq::Agent, request: HttpRequest) -> Result<HttpResponse, ApiError> {
    let HttpRequest {
        method,
        path,
        headers,
        body,
    } = request;

    let result = match method {
        HttpMethod::Get => with_headers(agent.get(&path), &headers).call(),
        HttpMethod::Delete => with_headers(agent.delete(&path), &headers).call(),
        HttpMethod::Post => send_body(with_headers(agent.post(&path), &headers), body),
        HttpMethod::Put => send_body(with_headers(agent.put(&path), &headers), body),
        HttpMethod::Patch => send_body(with_headers(agent.patch(&path), &headers), body),
    };
    let mut response =
        result.map_err(|e| ApiError::Network(format!("{} {path}: {e}", method.as_str())))?;

    let status = response.status().as_u16();
    let headers = response
        .headers()
        .iter()
        .map(|(name, value)| {
            (
                name.as_str().to_string(),
                value.to_str().unwrap_or_default().to_string(),
            )
        })
        .collect();
    let body = response
        .body_mut()
        .read_to_string()
        .map_err(|e| ApiError::Network(format!("reading response body: {e}")))?;

    Ok(HttpResponse {
        status,
        headers,
        body,
    })
}

fn with_headers<B>(mut builder: RequestBuilder<B>, headers: &[(String, String)]) -> RequestBuilder<B> {
    for (name, value) in headers {
        builder = builder.header(name.as_str(), value.as_str());
    }
    builder
}

fn send_body(
    builder: RequestBuilder<WithBody>,
    body: Option<String>,
) -> Result<ureq::http::Response<ureq::Body>, ureq::Error> {
    match body {
        Some(body) => builder.send(body.as_bytes()),
        None => builder.send_empty(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unreachable_host_is_a_network_error() {
        // Port 9 (discard) on localhost is closed in test environments.
        let request = HttpRequest {
            method: HttpMethod::Get,
            path: "http://127.0.0.1:9/auth/me".to_string(),
            headers: Vec::new(),
            body: None,
        };
        let err = UreqTransport::new().execute(request).await.unwrap_err();
        assert!(matches!(err, ApiError::Network(_)));
    }
}
