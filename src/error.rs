use thiserror::Error;

/// Every way the analyzer and its collaborators can fail, from the core
/// outward to the HTTP/CLI boundary.
#[derive(Error, Debug)]
pub enum AnalyzerError {
    #[error("malformed bytecode: {0}")]
    MalformedBytecode(String),

    #[error("no code at address {0}")]
    NoCodeAtAddress(String),

    #[error("missing RPC configuration for network {0}")]
    MissingRpcConfig(String),

    #[error("RPC request failed: {0}")]
    RpcTransport(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, AnalyzerError>;
