//! HTTP request node and the reqwest-backed client.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::{Client, Method};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::definition::HttpRequestNode;
use crate::template::{replace_in_value, replace_template_variables};
use crate::traits::{ExecutableNode, HttpClient, HttpRequest, HttpResponse, Services};
use crate::{ExecutionContext, LogLevel, NodeError};

/// Fixed per-request timeout of the http_request node.
pub const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// [`HttpClient`] over a shared `reqwest::Client`.
pub struct ReqwestHttpClient {
    client: Client,
}

impl ReqwestHttpClient {
    pub fn new() -> Self {
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .unwrap_or_else(|e| {
                warn!("Failed to build HTTP client with timeout defaults: {}", e);
                Client::new()
            });
        Self { client }
    }
}

impl Default for ReqwestHttpClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HttpClient for ReqwestHttpClient {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, NodeError> {
        let method = Method::from_bytes(request.method.to_uppercase().as_bytes())
            .map_err(|_| NodeError::InvalidConfig(format!("unknown HTTP method: {}", request.method)))?;

        let mut builder = self
            .client
            .request(method, &request.url)
            .timeout(request.timeout);
        for (key, value) in &request.headers {
            builder = builder.header(key, value);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_builder() {
                NodeError::InvalidConfig(format!("invalid request to {}: {}", request.url, e))
            } else {
                NodeError::Transport(format!("{} {}: {}", request.method, request.url, e))
            }
        })?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_str().unwrap_or("").to_string()))
            .collect();

        let text = response.text().await.map_err(|e| {
            NodeError::Transport(format!("failed to read response body from {}: {}", request.url, e))
        })?;
        let body_len = text.len();
        let body = serde_json::from_str(&text).unwrap_or(Value::String(text));

        Ok(HttpResponse {
            status,
            headers,
            body,
            body_len,
        })
    }
}

#[async_trait]
impl ExecutableNode for HttpRequestNode {
    async fn execute(&self, ctx: &mut ExecutionContext, services: &Services) -> Result<(), NodeError> {
        let url = replace_template_variables(&self.url, &ctx.data);
        let headers: BTreeMap<String, String> = self
            .headers
            .iter()
            .map(|(k, v)| (k.clone(), replace_template_variables(v, &ctx.data)))
            .collect();
        let body = self.body.as_ref().map(|b| replace_in_value(b, &ctx.data));

        ctx.log(LogLevel::Info, "http_request", format!("{} {}", self.method.to_uppercase(), url));
        debug!("HTTP {} {}", self.method, url);

        let start = Instant::now();
        let response = services
            .http
            .send(HttpRequest {
                method: self.method.clone(),
                url: url.clone(),
                headers,
                body,
                timeout: services.http_timeout,
            })
            .await?;

        ctx.log(
            LogLevel::Info,
            "http_response",
            format!(
                "HTTP {} from {} ({} bytes, {}ms)",
                response.status,
                url,
                response.body_len,
                start.elapsed().as_millis()
            ),
        );

        let header_map: Map<String, Value> = response
            .headers
            .into_iter()
            .map(|(k, v)| (k, Value::String(v)))
            .collect();
        let mut merged = Map::new();
        merged.insert("httpResponse".into(), response.body);
        merged.insert("httpStatus".into(), Value::from(response.status));
        merged.insert("httpHeaders".into(), Value::Object(header_map));
        ctx.merge(merged);

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockServices;
    use serde_json::json;
    use uuid::Uuid;

    fn ctx(data: Value) -> ExecutionContext {
        ExecutionContext::new(Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4(), data)
    }

    #[tokio::test]
    async fn substitutes_templates_and_merges_response() {
        let mocks = MockServices::new();
        mocks.http.respond(404, json!({ "error": "not found" }));
        let node = HttpRequestNode {
            url: "https://api.example.com/users/{{user.id}}".into(),
            method: "post".into(),
            headers: BTreeMap::from([("X-Org".to_string(), "{{org}}".to_string())]),
            body: Some(json!({ "name": "{{user.name}}" })),
            next: vec![],
        };
        let mut c = ctx(json!({ "user": { "id": 7, "name": "Ana" }, "org": "acme", "httpStatus": 1 }));

        node.execute(&mut c, &mocks.services()).await.expect("4xx is not an error");

        let sent = mocks.http.requests();
        assert_eq!(sent[0].url, "https://api.example.com/users/7");
        assert_eq!(sent[0].headers["X-Org"], "acme");
        assert_eq!(sent[0].body, Some(json!({ "name": "Ana" })));
        assert_eq!(sent[0].timeout, HTTP_TIMEOUT);

        assert_eq!(c.data["httpStatus"], 404);
        assert_eq!(c.data["httpResponse"]["error"], "not found");
        assert!(c.data["httpHeaders"].is_object());
    }

    #[tokio::test]
    async fn transport_failure_is_an_error() {
        let mocks = MockServices::new();
        mocks.http.fail("connection refused");
        let node = HttpRequestNode {
            url: "https://down.example.com".into(),
            method: "GET".into(),
            headers: BTreeMap::new(),
            body: None,
            next: vec![],
        };
        let mut c = ctx(json!({}));

        let err = node.execute(&mut c, &mocks.services()).await.unwrap_err();
        assert!(matches!(err, NodeError::Transport(_)));
        assert!(c.data.get("httpStatus").is_none());
    }
}
