/*
 ═══════════════════════════════════════════════════════════════════════════════
  SENTINEL SHIELD - DELEGATECALL Scanner HTTP Server

  Exposes the analyzer over a small REST API: POST a contract's bytecode (or
  an address to fetch it for) and get back the full report as JSON.
 ═══════════════════════════════════════════════════════════════════════════════
*/

use std::net::SocketAddr;

use axum::{
    extract::{DefaultBodyLimit, Json},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use delegatecall_scanner::{analyze, fetch::fetch_code, AnalyzeOptions, AnalyzerError};

const MAX_BODY_BYTES: usize = 1024 * 1024;

// ═══════════════════════════════════════════════════════════════════════════════
//                              REQUEST/RESPONSE TYPES
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum AnalyzeRequest {
    ByAddress {
        address: String,
        network: Option<String>,
        #[serde(rename = "rpcUrl")]
        rpc_url: Option<String>,
    },
    ByBytecode {
        bytecode: String,
    },
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: String,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

// ═══════════════════════════════════════════════════════════════════════════════
//                              HANDLERS
// ═══════════════════════════════════════════════════════════════════════════════

async fn health_handler() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

async fn analyze_handler(payload: Result<Json<AnalyzeRequest>, axum::extract::rejection::JsonRejection>) -> impl IntoResponse {
    let Json(request) = match payload {
        Ok(p) => p,
        Err(rejection) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse {
                    error: "Invalid request body".to_string(),
                    details: Some(rejection.to_string()),
                }),
            )
                .into_response();
        }
    };

    info!("handling analyze request");

    let (bytecode, address, network) = match request {
        AnalyzeRequest::ByBytecode { bytecode } => (bytecode, None, None),
        AnalyzeRequest::ByAddress { address, network, rpc_url } => {
            let network = network.unwrap_or_else(|| "mainnet".to_string());
            match fetch_code(&address, &network, rpc_url.as_deref()).await {
                Ok(code) => (code, Some(address), Some(network)),
                Err(e) => {
                    warn!(error = %e, "code fetch failed");
                    return analysis_error_response(e);
                }
            }
        }
    };

    let options = AnalyzeOptions {
        contract_address: address,
        network,
        use_cfg: true,
    };

    let result = tokio::task::spawn_blocking(move || analyze(&bytecode, &options)).await;

    match result {
        Ok(Ok(report)) => Json(report).into_response(),
        Ok(Err(e)) => {
            warn!(error = %e, "analysis failed");
            analysis_error_response(e)
        }
        Err(join_error) => {
            warn!(error = %join_error, "analysis task panicked");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: "Analysis failed".to_string(),
                    details: None,
                }),
            )
                .into_response()
        }
    }
}

fn analysis_error_response(error: AnalyzerError) -> axum::response::Response {
    match error {
        AnalyzerError::MalformedBytecode(_) | AnalyzerError::InvalidRequest(_) => (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: "Invalid request".to_string(),
                details: Some(error.to_string()),
            }),
        )
            .into_response(),
        _ => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse {
                error: "Analysis failed".to_string(),
                details: None,
            }),
        )
            .into_response(),
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
//                              SERVER
// ═══════════════════════════════════════════════════════════════════════════════

pub async fn run_server(port: u16) -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/health", get(health_handler))
        .route("/analyze", post(analyze_handler))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(cors);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    info!(%addr, "listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
