//! The real `HttpPort` implementation (§4.6 "Implementations: real client,
//! recorded replay"). Behind the `reqwest-client` feature so crates that only
//! need the trait (`workflow-executor`, `workflow-planner`) never pull in an
//! HTTP client transitively — only a binary wiring concrete adapters depends
//! on this module, the same separation `ports::testing`'s `ReplayHttpPort`
//! gives the replay side.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use crate::error::{PortError, Result};
use crate::http::{HttpMethod, HttpPort, HttpRequest, HttpResponse};

/// A thin wrapper over a shared `reqwest::Client`. One instance is safe to
/// reuse across every `http` node dispatch in the process (§5 "HTTP: 30s"
/// default is applied per call via the `timeout` argument, not baked into
/// the client itself, since different nodes may override it).
pub struct ReqwestHttpPort {
    client: Client,
}

impl ReqwestHttpPort {
    pub fn new() -> Self {
        Self { client: Client::new() }
    }
}

impl Default for ReqwestHttpPort {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HttpPort for ReqwestHttpPort {
    async fn request(&self, req: HttpRequest, timeout: Duration) -> Result<HttpResponse> {
        let method = match req.method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Patch => reqwest::Method::PATCH,
            HttpMethod::Delete => reqwest::Method::DELETE,
            HttpMethod::Head => reqwest::Method::HEAD,
            HttpMethod::Options => reqwest::Method::OPTIONS,
        };

        let mut builder = self.client.request(method, &req.url).timeout(timeout);
        for (key, value) in &req.headers {
            builder = builder.header(key, value);
        }
        if let Some(body) = &req.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(|e| PortError::HttpUnavailable(e.to_string()))?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| value.to_str().ok().map(|v| (name.to_string(), v.to_string())))
            .collect();
        let body = response.json().await.unwrap_or(serde_json::Value::Null);

        Ok(HttpResponse { status, headers, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_client_constructs() {
        let _port = ReqwestHttpPort::new();
    }
}
