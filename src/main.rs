use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use techbook::config::AppConfig;
use techbook::db;
use techbook::handlers;
use techbook::services::ai::extractor::LlmExtractor;
use techbook::services::ai::ollama::OllamaProvider;
use techbook::services::ai::openai::OpenAiProvider;
use techbook::services::ai::LlmProvider;
use techbook::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = AppConfig::from_env();

    let conn = db::init_db(&config.database_url)?;
    db::seed_demo_bookings(&conn)?;

    let llm: Box<dyn LlmProvider> = match config.llm_provider.as_str() {
        "ollama" => {
            tracing::info!(
                "using Ollama LLM provider (url: {}, model: {})",
                config.ollama_url,
                config.ollama_model
            );
            Box::new(OllamaProvider::new(
                config.ollama_url.clone(),
                config.ollama_model.clone(),
            ))
        }
        _ => {
            anyhow::ensure!(
                !config.openai_api_key.is_empty(),
                "OPENAI_API_KEY must be set when LLM_PROVIDER=openai"
            );
            tracing::info!("using OpenAI LLM provider (model: {})", config.openai_model);
            Box::new(OpenAiProvider::new(
                config.openai_api_key.clone(),
                config.openai_model.clone(),
            ))
        }
    };

    let extractor = LlmExtractor::new(llm, Duration::from_secs(config.llm_timeout_secs));

    let state = Arc::new(AppState {
        db: Arc::new(Mutex::new(conn)),
        config: config.clone(),
        extractor: Box::new(extractor),
    });

    let app = Router::new()
        .route("/health", get(handlers::health::health))
        .route("/auth/signup", post(handlers::auth::signup))
        .route("/chat", post(handlers::chat::chat))
        .route(
            "/bookings",
            post(handlers::bookings::create_booking).get(handlers::bookings::list_my_bookings),
        )
        .route(
            "/bookings/:id",
            get(handlers::bookings::get_booking).delete(handlers::bookings::delete_booking),
        )
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!("starting server on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
