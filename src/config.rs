//! RPC endpoint resolution, shared by the CLI and the code-fetching
//! collaborator. Two environment variables and a CLI/request override — not
//! worth a config crate.

use crate::error::{AnalyzerError, Result};

/// Resolve the JSON-RPC endpoint to use for `network`.
///
/// Resolution order: an explicit `rpc_url`, then `RPC_URL_<NETWORK>`
/// (network name upper-cased with non-alphanumerics turned to `_`), then
/// `RPC_URL_DEFAULT`.
pub fn resolve_rpc_url(network: &str, rpc_url: Option<&str>) -> Result<String> {
    if let Some(url) = rpc_url {
        return Ok(url.to_string());
    }

    let var_name = format!("RPC_URL_{}", upper_snake(network));
    if let Ok(url) = std::env::var(&var_name) {
        return Ok(url);
    }
    if let Ok(url) = std::env::var("RPC_URL_DEFAULT") {
        return Ok(url);
    }

    Err(AnalyzerError::MissingRpcConfig(network.to_string()))
}

fn upper_snake(network: &str) -> String {
    network
        .chars()
        .map(|c| if c.is_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
        .collect()
}
