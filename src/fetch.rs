//! Fetches deployed bytecode from a JSON-RPC node via `eth_getCode`. The only
//! networked collaborator besides the HTTP server itself.

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};

use crate::config::resolve_rpc_url;
use crate::error::{AnalyzerError, Result};

#[derive(Debug, Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'a str,
    method: &'a str,
    params: serde_json::Value,
    id: u64,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    result: Option<String>,
    error: Option<RpcErrorBody>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    message: String,
}

/// Fetch the deployed code at `address` on `network`, resolving the RPC
/// endpoint via [`resolve_rpc_url`] unless `rpc_url` is given explicitly.
pub async fn fetch_code(address: &str, network: &str, rpc_url: Option<&str>) -> Result<String> {
    let endpoint = resolve_rpc_url(network, rpc_url)?;

    info!(address, network, "fetching contract bytecode via eth_getCode");

    let client = reqwest::Client::new();
    let body = RpcRequest {
        jsonrpc: "2.0",
        method: "eth_getCode",
        params: json!([address, "latest"]),
        id: 1,
    };

    let response = client
        .post(&endpoint)
        .json(&body)
        .send()
        .await
        .map_err(|e| {
            warn!(error = %e, "RPC request failed");
            AnalyzerError::RpcTransport(e.to_string())
        })?;

    let parsed: RpcResponse = response.json().await.map_err(|e| {
        warn!(error = %e, "RPC response was not valid JSON-RPC");
        AnalyzerError::RpcTransport(e.to_string())
    })?;

    if let Some(err) = parsed.error {
        return Err(AnalyzerError::RpcTransport(err.message));
    }

    let code = parsed
        .result
        .ok_or_else(|| AnalyzerError::RpcTransport("missing result field".to_string()))?;

    if code == "0x" || code.is_empty() {
        return Err(AnalyzerError::NoCodeAtAddress(address.to_string()));
    }

    Ok(code)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_rpc_config_is_an_error() {
        std::env::remove_var("RPC_URL_DEFAULT");
        std::env::remove_var("RPC_URL_NOWHERE");
        let result = fetch_code("0xabc", "nowhere", None).await;
        assert!(matches!(result, Err(AnalyzerError::MissingRpcConfig(_))));
    }
}
