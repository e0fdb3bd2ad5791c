// src/chain/rpc.rs
// Minimal Ethereum JSON-RPC client (eth_call only)

use crate::types::Address;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use thiserror::Error;
use url::Url;

pub const JSONRPC_VERSION: &str = "2.0";

#[derive(Error, Debug)]
pub enum RpcClientError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("rpc endpoint returned HTTP {0}")]
    HttpStatus(StatusCode),

    #[error("rpc error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("rpc response carried neither result nor error")]
    EmptyResponse,

    #[error("malformed rpc result: {0}")]
    Malformed(String),
}

#[derive(Debug, Clone, Serialize)]
struct JsonRpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: Value,
}

#[derive(Debug, Clone, Deserialize)]
struct JsonRpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<JsonRpcError>,
}

#[derive(Debug, Clone, Deserialize)]
struct JsonRpcError {
    code: i64,
    message: String,
}

/// One client per chain endpoint; cloning shares the connection pool.
#[derive(Clone, Debug)]
pub struct EvmRpcClient {
    inner: Client,
    url: Url,
}

impl EvmRpcClient {
    pub fn new(url: Url, timeout: Duration) -> Result<Self, RpcClientError> {
        let inner = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()?;
        Ok(Self { inner, url })
    }

    pub fn endpoint(&self) -> &Url {
        &self.url
    }

    /// Issue a raw JSON-RPC call and return the untyped result.
    pub async fn request(&self, method: &str, params: Value) -> Result<Value, RpcClientError> {
        let payload = JsonRpcRequest {
            jsonrpc: JSONRPC_VERSION,
            id: 1,
            method,
            params,
        };

        let response = self.inner.post(self.url.clone()).json(&payload).send().await?;
        if !response.status().is_success() {
            return Err(RpcClientError::HttpStatus(response.status()));
        }

        let response: JsonRpcResponse = response.json().await?;
        if let Some(error) = response.error {
            return Err(RpcClientError::Rpc {
                code: error.code,
                message: error.message,
            });
        }
        response.result.ok_or(RpcClientError::EmptyResponse)
    }

    /// `eth_call` against `latest`, returning the decoded return bytes.
    pub async fn eth_call(&self, to: &Address, data: &[u8]) -> Result<Vec<u8>, RpcClientError> {
        let params = json!([
            { "to": to.to_string(), "data": format!("0x{}", hex::encode(data)) },
            "latest"
        ]);
        let result = self.request("eth_call", params).await?;
        let text = result
            .as_str()
            .ok_or_else(|| RpcClientError::Malformed(format!("expected hex string, got {}", result)))?;
        let digits = text
            .strip_prefix("0x")
            .ok_or_else(|| RpcClientError::Malformed(format!("missing 0x prefix: {}", text)))?;
        hex::decode(digits).map_err(|e| RpcClientError::Malformed(e.to_string()))
    }
}
