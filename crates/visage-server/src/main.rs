use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use visage_server::config::Config;
use visage_server::rpc;
use visage_server::state::AppState;
use visage_server::tools::ToolRouter;

/// Per-request deadline.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

struct CliArgs {
    help: bool,
}

fn parse_args() -> CliArgs {
    let args: Vec<String> = std::env::args().collect();
    CliArgs {
        help: args.iter().any(|a| a == "--help" || a == "-h"),
    }
}

fn print_help() {
    eprintln!(
        r#"visage-server - biometric recognition tool server (JSON-RPC over stdio)

USAGE:
    visage-server [OPTIONS]

OPTIONS:
    -h, --help    Print this help

ENVIRONMENT VARIABLES:
    VISAGE_DATA_DIR               Base data directory (default: ./visage_data)
    VISAGE_KEYS_DIR               RSA keypair directory (default: <data>/keys)
    VISAGE_CLIENTS_FILE           OAuth client registry (default: <data>/clients.json)
    VISAGE_INDEX_DIR              Vector index directory (default: <data>/vectors)
    VISAGE_AUDIT_DIR              Audit log directory (default: <data>/audit)
    VISAGE_TOKEN_TTL_SECS         Access token lifetime (default: 3600)
    VISAGE_DISTANCE_THRESHOLD     Default recognition threshold (default: 0.40)
    VISAGE_AUDIT_RETENTION_DAYS   Audit retention window (default: 30)
    VISAGE_REDACT_PII             Redact names in audit events (default: false)
    RUST_LOG                      Log filter (default: visage_server=info)

Create clients and issue tokens with the companion `visage-admin` binary.
"#
    );
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = parse_args();
    if args.help {
        print_help();
        return Ok(());
    }

    // Logs go to stderr; stdout carries only JSON-RPC frames
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "visage_server=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = Config::from_env()?;
    tracing::info!(data_dir = ?config.data_dir, "Starting visage server");

    let state = match AppState::new(config).await {
        Ok(state) => state,
        Err(e) => {
            // Key generation, model load and audit directory failures are
            // fatal by contract
            tracing::error!("Fatal startup failure: {:#}", e);
            std::process::exit(1);
        }
    };

    serve_stdio(state).await?;

    tracing::info!("Server shutting down");
    Ok(())
}

/// Serve line-delimited JSON-RPC until stdin closes.
async fn serve_stdio(state: Arc<AppState>) -> Result<()> {
    let router = ToolRouter::new(state);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }

        let response = handle_line(&router, &line).await;
        let mut raw = serde_json::to_string(&response)?;
        raw.push('\n');
        stdout.write_all(raw.as_bytes()).await?;
        stdout.flush().await?;
    }

    Ok(())
}

async fn handle_line(router: &ToolRouter, line: &str) -> rpc::Response {
    let request = match rpc::parse_request(line) {
        Ok(request) => request,
        Err(e) => return rpc::Response::error(serde_json::Value::Null, e.code, &e.message),
    };

    let id = request.id.clone();
    match tokio::time::timeout(REQUEST_TIMEOUT, router.dispatch(&request.method, request.params))
        .await
    {
        Ok(Some(result)) => rpc::Response::result(id, result),
        Ok(None) => rpc::Response::error(
            id,
            rpc::METHOD_NOT_FOUND,
            &format!("unknown tool: {}", request.method),
        ),
        Err(_) => {
            router.audit_timeout(&request.method, REQUEST_TIMEOUT.as_secs());
            rpc::Response::result(
                id,
                serde_json::json!({
                    "status": "error",
                    "kind": "internal",
                    "message": format!("request deadline of {}s exceeded", REQUEST_TIMEOUT.as_secs()),
                }),
            )
        }
    }
}
