//! Automation Server
//!
//! Runs the crawler scheduler (due-run and resume sweeps) and the SSE server
//! that streams live crawler status to clients.

use std::sync::Arc;

use anyhow::{Context, Result};
use automation_core::domains::automation::{AutomationService, AutomationSettings, PgAutomationStore};
use automation_core::kernel::{
    scheduled_tasks::start_scheduler, sse::SseState, BaseSearchService, HttpUrlChecker, LlmRouter,
    NoopSearchService, PgDocumentLoader, PgNotifier, PgProposalCreator, SerperClient, ServerDeps,
    StreamHub,
};
use automation_core::Config;
use llm_client::{AnthropicClient, ChatProvider, ModelCapabilities, OpenAIClient};
use sqlx::postgres::PgPoolOptions;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,automation_core=debug".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_line_number(true),
        )
        .init();

    tracing::info!("Starting automation server");

    let config = Config::from_env().context("Failed to load configuration")?;
    for (name, set) in [
        ("SERPER_API_KEY", config.serper_api_key.is_some()),
        ("OPENAI_API_KEY", config.openai_api_key.is_some()),
        ("ANTHROPIC_API_KEY", config.anthropic_api_key.is_some()),
    ] {
        if set {
            tracing::info!("  {}: set", name);
        } else {
            tracing::warn!("  {}: NOT SET", name);
        }
    }

    // Database setup
    let pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .connect(&config.database_url)
        .await
        .context("Failed to connect to database")?;

    tracing::info!("Running database migrations...");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("Failed to run migrations")?;

    // Search provider
    let search: Arc<dyn BaseSearchService> = match &config.serper_api_key {
        Some(key) => Arc::new(
            SerperClient::with_base_url(key.clone(), config.serper_base_url.clone())
                .context("Failed to create Serper client")?,
        ),
        None => Arc::new(NoopSearchService),
    };

    // LLM providers, routed by model name
    let openai: Option<Arc<dyn ChatProvider>> = config.openai_api_key.as_ref().map(|key| {
        Arc::new(OpenAIClient::new(key.clone(), ModelCapabilities::default())) as Arc<dyn ChatProvider>
    });
    let anthropic: Option<Arc<dyn ChatProvider>> = config
        .anthropic_api_key
        .as_ref()
        .map(|key| Arc::new(AnthropicClient::new(key.clone())) as Arc<dyn ChatProvider>);

    let settings = AutomationSettings::default();
    let url_checker = HttpUrlChecker::new(settings.url_check_timeout)?;

    let server_deps = ServerDeps::new(
        Arc::new(PgAutomationStore::new(pool.clone())),
        search,
        Arc::new(LlmRouter::new(openai, anthropic)),
        Arc::new(url_checker),
        Arc::new(PgProposalCreator::new(pool.clone())),
        Arc::new(PgDocumentLoader::new(pool.clone())),
        Arc::new(PgNotifier::new(pool.clone())),
        StreamHub::new(),
        settings,
    );

    let service = AutomationService::new(server_deps.clone());
    let _scheduler = start_scheduler(service, &config)
        .await
        .context("Failed to start scheduler")?;

    // SSE server for live crawler status
    let sse_router = automation_core::kernel::sse::router(SseState {
        stream_hub: server_deps.stream_hub.clone(),
    })
    .layer(CorsLayer::permissive())
    .layer(TraceLayer::new_for_http());
    let sse_addr = format!("0.0.0.0:{}", config.sse_port);
    tracing::info!("SSE server listening on {}", sse_addr);
    let sse_listener = tokio::net::TcpListener::bind(&sse_addr)
        .await
        .context("Failed to bind SSE server")?;

    axum::serve(sse_listener, sse_router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("SSE server failed")?;

    tracing::info!("Automation server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
}
