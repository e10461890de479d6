//! HTTP trigger surface over the extraction engine.
//!
//! Thin trigger layer: each endpoint builds a per-request config, runs the
//! corresponding engine path to completion and returns its `RunReport` as
//! the response body. Only a fatal report maps to a 5xx.

use std::path::PathBuf;

use anyhow::Result;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use clap::Parser;
use serde::Deserialize;
use tokio::sync::watch;

use listascrape::config::HarvestConfig;
use listascrape::engine;
use listascrape::record::{RunReport, RunStatus};
use listascrape::sink::OutputTarget;

#[derive(Parser)]
#[command(name = "listascrape-api")]
#[command(about = "HTTP API for triggering extraction runs")]
#[command(version)]
struct Args {
    #[arg(long, default_value_t = 8080)]
    port: u16,

    #[arg(long, default_value = "data/listings.csv")]
    csv_path: PathBuf,

    #[arg(long, default_value = "sqlite://data/listings.db")]
    db_url: String,

    #[arg(long, default_value_t = 100)]
    chunk_size: usize,

    #[arg(long, default_value_t = 4)]
    workers: usize,
}

#[derive(Clone)]
struct AppState {
    csv_path: PathBuf,
    db_url: String,
    chunk_size: usize,
    workers: usize,
}

impl AppState {
    fn build_config(&self, output: &str) -> Result<HarvestConfig> {
        let target = match output {
            "file" => OutputTarget::File(self.csv_path.clone()),
            "database" => OutputTarget::Database(self.db_url.clone()),
            "both" => OutputTarget::Both {
                csv: self.csv_path.clone(),
                database: self.db_url.clone(),
            },
            other => anyhow::bail!("unknown output target '{other}'"),
        };
        HarvestConfig::builder()
            .output(target)
            .chunk_size(self.chunk_size)
            .worker_count(self.workers)
            .build()
    }
}

fn default_output() -> String {
    "both".to_string()
}

#[derive(Deserialize)]
struct BulkRequest {
    start_id: u64,
    end_id: u64,
    #[serde(default = "default_output")]
    output: String,
}

#[derive(Deserialize)]
struct SequentialRequest {
    #[serde(default)]
    rubros: Option<Vec<String>>,
    #[serde(default)]
    localidades: Option<Vec<String>>,
    #[serde(default = "default_output")]
    output: String,
}

#[derive(Deserialize)]
struct ManualRequest {
    url: String,
    #[serde(default = "default_output")]
    output: String,
}

fn respond(report: RunReport) -> (StatusCode, Json<RunReport>) {
    let code = match report.status {
        RunStatus::Error => StatusCode::INTERNAL_SERVER_ERROR,
        RunStatus::Success | RunStatus::Warning => StatusCode::OK,
    };
    (code, Json(report))
}

async fn bulk_handler(
    State(state): State<AppState>,
    Json(req): Json<BulkRequest>,
) -> (StatusCode, Json<RunReport>) {
    let cfg = match state.build_config(&req.output) {
        Ok(cfg) => cfg,
        Err(e) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(RunReport::error(format!("{e:#}"))),
            );
        }
    };
    let (_cancel_tx, cancel_rx) = watch::channel(false);
    respond(engine::run_bulk(&cfg, req.start_id, req.end_id, cancel_rx).await)
}

async fn sequential_handler(
    State(state): State<AppState>,
    Json(req): Json<SequentialRequest>,
) -> (StatusCode, Json<RunReport>) {
    let cfg = match state.build_config(&req.output) {
        Ok(cfg) => cfg,
        Err(e) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(RunReport::error(format!("{e:#}"))),
            );
        }
    };
    let (_cancel_tx, cancel_rx) = watch::channel(false);
    let rubros = req.rubros.unwrap_or_default();
    let localidades = req.localidades.unwrap_or_default();
    respond(engine::run_sequential(&cfg, &rubros, &localidades, cancel_rx).await)
}

async fn manual_handler(
    State(state): State<AppState>,
    Json(req): Json<ManualRequest>,
) -> (StatusCode, Json<RunReport>) {
    let cfg = match state.build_config(&req.output) {
        Ok(cfg) => cfg,
        Err(e) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(RunReport::error(format!("{e:#}"))),
            );
        }
    };
    respond(engine::run_manual_url(&cfg, &req.url).await)
}

async fn health_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let state = AppState {
        csv_path: args.csv_path,
        db_url: args.db_url,
        chunk_size: args.chunk_size,
        workers: args.workers,
    };

    let app = Router::new()
        .route("/etl/bulk", post(bulk_handler))
        .route("/etl/sequential", post(sequential_handler))
        .route("/etl/manual", post(manual_handler))
        .route("/health", get(health_handler))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", args.port)).await?;
    tracing::info!("Listening on 0.0.0.0:{}", args.port);
    axum::serve(listener, app).await?;
    Ok(())
}
