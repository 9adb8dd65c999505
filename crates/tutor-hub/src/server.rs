//! HTTP server wiring: state construction, router and listener.

use std::time::Duration;
use tracing::info;

use crate::{api, config::Config, shared_state::AppState};

pub async fn run_server(cfg: Config) -> anyhow::Result<()> {
    crate::telemetry::init_tracing("info");
    crate::metrics::init_metrics()?;
    cfg.print_config();

    let addr = cfg.api_addr()?;
    let request_timeout = cfg.stream_timeout();
    let state = AppState::initialize(cfg)?;

    info!("Starting HTTP server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let app = build_router(state, request_timeout);

    axum::serve(listener, app).await?;

    Ok(())
}

pub fn build_router(state: AppState, request_timeout: Duration) -> axum::Router {
    use axum::{
        extract::DefaultBodyLimit,
        routing::{delete, get, post, put},
        Router,
    };
    use tower_http::{
        cors::{Any, CorsLayer},
        timeout::TimeoutLayer,
        trace::TraceLayer,
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            axum::http::Method::GET,
            axum::http::Method::POST,
            axum::http::Method::PUT,
            axum::http::Method::DELETE,
        ])
        .allow_headers(Any);

    Router::new()
        .route("/api/v1/meta/health", get(api::health))
        .route("/api/v1/meta/version", get(api::version))
        .route("/api/v1/pronounce", get(api::pronounce))
        .route("/api/v1/query", get(api::smart_query))
        .route("/api/v1/models", get(api::list_models))
        .route("/api/v1/models/selected", get(api::selected_models))
        .route("/api/v1/models/select", post(api::select_models))
        .route("/api/v1/conversation", post(api::create_conversation))
        .route(
            "/api/v1/conversation/:sid",
            post(api::append_turn).delete(api::end_conversation),
        )
        .route("/api/v1/conversation/:sid/stream", post(api::stream_turn))
        .route("/api/v1/conversations/archived", get(api::list_archived))
        .route("/api/v1/conversations/archived/:sid", get(api::get_archived_transcript))
        .route("/api/v1/conversations/search", get(api::search_conversations))
        .route("/api/v1/conversations/:sid", delete(api::delete_conversation))
        .route("/api/v1/math/conversations", get(api::list_math_conversations))
        .route("/api/v1/math/solve", post(api::solve_problem))
        .route(
            "/api/v1/math/solve-image",
            post(api::solve_image).layer(DefaultBodyLimit::max(api::math_api::MAX_IMAGE_BYTES)),
        )
        .route("/api/v1/math/concept", post(api::explain_concept))
        .route("/api/v1/math/question", post(api::ask_question))
        .route("/api/v1/math/concepts", get(api::list_concepts))
        .route("/api/v1/math/concepts/search", get(api::search_concepts))
        .route("/api/v1/math/domains", get(api::list_domains))
        .route("/api/v1/math/status", get(api::tutor_status))
        .route("/api/v1/config/endpoints", get(api::list_endpoints).post(api::add_endpoint))
        .route(
            "/api/v1/config/endpoints/:id",
            put(api::update_endpoint).delete(api::delete_endpoint),
        )
        .route(
            "/api/v1/config/models/:model_type",
            get(api::list_catalog_models).post(api::add_catalog_model),
        )
        .route(
            "/api/v1/config/models/:model_type/:id",
            put(api::update_catalog_model).delete(api::delete_catalog_model),
        )
        .route("/api/v1/config/defaults/:feature", get(api::get_defaults).put(api::set_defaults))
        .route("/api/v1/config/reload", post(api::reload_config))
        .route("/metrics", get(api::metrics_text))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(request_timeout))
        .with_state(state)
}
