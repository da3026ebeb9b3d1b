//! Transport to the CRM REST API.
//!
//! The pipeline talks to the remote system only through the [`Transport`]
//! trait, so retry and batching logic can be exercised against scripted
//! responses. Two implementations ship with the crate:
//! - **[`HttpTransport`]**: `reqwest` client with bearer-token auth.
//! - **[`DryRunTransport`]**: answers locally with synthetic ids, used by
//!   `--dry-run` and when exploring a dataset without credentials.

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::config::ApiConfig;

/// Placeholder shipped in sample `.env` files; treated as "no key".
const PLACEHOLDER_KEY: &str = "YOUR_API_KEY_HERE";

/// Path used as a cheap connectivity and credential probe.
pub const PROBE_PATH: &str = "/crm/v3/objects/contacts?limit=1";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

/// One outgoing API call.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub body: Option<Value>,
}

impl ApiRequest {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            path: path.into(),
            body: None,
        }
    }

    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self {
            method: Method::Post,
            path: path.into(),
            body: Some(body),
        }
    }
}

/// Raw status and body of a completed HTTP exchange.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: String,
}

impl ApiResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }
}

/// Connection-level failure: nothing came back (refused, timed out, TLS).
#[derive(Debug, Clone, thiserror::Error)]
#[error("request failed: {0}")]
pub struct TransportError(pub String);

#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, TransportError>;
}

// ============ HTTP ============

pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl HttpTransport {
    /// Build a client from `[api]` config, reading the key from the configured env var.
    ///
    /// # Errors
    ///
    /// Fails if the variable is unset, empty, or still the placeholder value.
    pub fn from_config(config: &ApiConfig) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env).unwrap_or_default();
        if api_key.trim().is_empty() || api_key == PLACEHOLDER_KEY {
            bail!(
                "{} environment variable not set (use --dry-run to run without an API key)",
                config.api_key_env
            );
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, TransportError> {
        let url = format!("{}{}", self.base_url, request.path);
        let builder = match request.method {
            Method::Get => self.client.get(&url),
            Method::Post => self.client.post(&url),
        };
        let builder = builder
            .bearer_auth(&self.api_key)
            .header("Content-Type", "application/json");
        let builder = match &request.body {
            Some(body) => builder.json(body),
            None => builder,
        };

        let response = builder
            .send()
            .await
            .map_err(|e| TransportError(e.to_string()))?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| TransportError(e.to_string()))?;

        Ok(ApiResponse { status, body })
    }
}

// ============ Dry run ============

/// Local stand-in for the API: every call succeeds without leaving the process.
///
/// Object batch creates return one synthetic id per input
/// (`dry-<object type>-<n>`), numbered across the whole run.
#[derive(Debug, Default)]
pub struct DryRunTransport {
    next_id: AtomicUsize,
    requests: AtomicUsize,
}

impl DryRunTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of calls answered so far.
    pub fn request_count(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for DryRunTransport {
    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, TransportError> {
        self.requests.fetch_add(1, Ordering::SeqCst);

        let object_type = request
            .path
            .strip_prefix("/crm/v3/objects/")
            .and_then(|rest| rest.strip_suffix("/batch/create"));

        let body = match (request.method, object_type) {
            (Method::Post, Some(object_type)) => {
                let count = request
                    .body
                    .as_ref()
                    .and_then(|b| b.get("inputs"))
                    .and_then(|i| i.as_array())
                    .map(|a| a.len())
                    .unwrap_or(0);
                let results: Vec<Value> = (0..count)
                    .map(|_| {
                        let n = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
                        json!({ "id": format!("dry-{}-{}", object_type, n) })
                    })
                    .collect();
                json!({ "status": "COMPLETE", "results": results })
            }
            _ => json!({ "status": "COMPLETE", "results": [] }),
        };

        Ok(ApiResponse::new(200, body.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_dry_run_assigns_ids_per_input() {
        let transport = DryRunTransport::new();
        let request = ApiRequest::post(
            "/crm/v3/objects/contacts/batch/create",
            json!({ "inputs": [{"properties": {}}, {"properties": {}}] }),
        );
        let response = transport.send(&request).await.unwrap();
        assert_eq!(response.status, 200);
        let body: Value = serde_json::from_str(&response.body).unwrap();
        let ids: Vec<&str> = body["results"]
            .as_array()
            .unwrap()
            .iter()
            .map(|r| r["id"].as_str().unwrap())
            .collect();
        assert_eq!(ids, vec!["dry-contacts-1", "dry-contacts-2"]);
    }

    #[tokio::test]
    async fn test_dry_run_probe_and_associations() {
        let transport = DryRunTransport::new();
        let probe = transport.send(&ApiRequest::get(PROBE_PATH)).await.unwrap();
        assert_eq!(probe.status, 200);
        let assoc = transport
            .send(&ApiRequest::post(
                "/crm/v3/associations/tickets/contacts/batch/create",
                json!({ "inputs": [] }),
            ))
            .await
            .unwrap();
        assert_eq!(assoc.status, 200);
        assert_eq!(transport.request_count(), 2);
    }

    #[test]
    fn test_missing_api_key_rejected() {
        let config = ApiConfig {
            api_key_env: "CRM_IMPORT_TEST_KEY_THAT_IS_NEVER_SET".to_string(),
            ..ApiConfig::default()
        };
        assert!(HttpTransport::from_config(&config).is_err());
    }
}
