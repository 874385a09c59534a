//! The upstream fall-through client: forwards a JSON-RPC call to the proxy
//! node and returns its result. TCP-level unreachability and upstream error
//! objects surface as distinct kinds so the router can tell them apart.

use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;
use vdb_state::{Error, Result};

#[derive(Debug, Deserialize)]
struct UpstreamResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<UpstreamError>,
}

#[derive(Debug, Deserialize)]
struct UpstreamError {
    code: i64,
    message: String,
}

#[derive(Clone)]
pub struct ProxyClient {
    client: reqwest::Client,
    url: String,
}

impl ProxyClient {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::ClientBuilder::new()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::internal(e.to_string()))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    /// Forwards one call and returns the upstream's `result` verbatim.
    pub async fn call(&self, method: &str, params: Value) -> Result<Value> {
        debug!(method, "forwarding call upstream");
        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });
        let response = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() || e.is_timeout() {
                    Error::ProxyUnavailable(e.to_string())
                } else {
                    Error::ProxyError(e.to_string())
                }
            })?;

        if !response.status().is_success() {
            return Err(Error::ProxyError(format!(
                "upstream returned HTTP {}",
                response.status()
            )));
        }

        let parsed: UpstreamResponse = response
            .json()
            .await
            .map_err(|e| Error::ProxyError(e.to_string()))?;
        if let Some(err) = parsed.error {
            return Err(Error::ProxyError(format!("{} (code {})", err.message, err.code)));
        }
        Ok(parsed.result.unwrap_or(Value::Null))
    }

    /// Proxied `statediff_` call with its own, typically longer, deadline.
    pub async fn call_with_timeout(
        &self,
        method: &str,
        params: Value,
        timeout: Duration,
    ) -> Result<Value> {
        tokio::time::timeout(timeout, self.call(method, params))
            .await
            .map_err(|_| Error::Timeout)?
    }
}
