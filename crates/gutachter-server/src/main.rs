//! Binary entrypoint: configuration, telemetry, registry load, serve.

mod config;
mod routes;
mod telemetry;

use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use gutachter_core::{RegistryError, SchemeRegistry};
use gutachter_runtime::{
    EngineConfig, EvaluationEngine, JudgeError, OpenAiConfig, OpenAiJudge, RetryPolicy,
};

use crate::config::{AppConfig, ConfigError};
use crate::routes::AppState;
use crate::telemetry::TelemetryError;

#[derive(Error, Debug)]
enum StartupError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("telemetry error: {0}")]
    Telemetry(#[from] TelemetryError),

    #[error("scheme registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("judge error: {0}")]
    Judge(#[from] JudgeError),

    #[error("server error: {0}")]
    Io(#[from] std::io::Error),
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("gutachter-server failed to start: {err}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), StartupError> {
    let config = AppConfig::load()?;
    telemetry::init(&config.log_level)?;

    // A scheme set that fails validation refuses to serve.
    let registry = Arc::new(SchemeRegistry::load_dir(&config.schemes_dir)?);
    info!(
        schemes = registry.len(),
        dir = %config.schemes_dir,
        "scheme registry loaded"
    );

    let judge = Arc::new(OpenAiJudge::new(OpenAiConfig {
        api_key: config.openai_api_key.clone(),
        model: config.openai_model.clone(),
        base_url: config.openai_base_url.clone(),
        timeout: config.openai_timeout,
    })?);

    let engine = Arc::new(EvaluationEngine::new(
        registry,
        judge,
        EngineConfig {
            max_concurrent_judge_calls: config.max_concurrent_llm_calls,
            judge_timeout: config.openai_timeout,
            retry: RetryPolicy::default(),
            max_tokens: 1024,
        },
    ));

    let state = AppState {
        engine,
        http_timeout: config.http_timeout,
    };
    let app = routes::router(state);

    let addr = config.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, model = %config.openai_model, "content evaluator ready");

    axum::serve(listener, app).await?;
    Ok(())
}
