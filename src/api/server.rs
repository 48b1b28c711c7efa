use std::sync::Arc;

use anyhow::Result;
use axum::{
    routing::{delete, get, post, put},
    Router,
};
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::config::Config;
use crate::engine::{AgentOrchestrator, ToolClient};
use crate::indexer::ResourceIndexer;
use crate::store::ProfileStore;

use super::handlers;

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<AgentOrchestrator>,
    pub profiles: Arc<ProfileStore>,
    pub indexer: Arc<ResourceIndexer>,
    pub tools: Arc<dyn ToolClient>,
    pub config: Arc<Config>,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/agent/state", get(handlers::get_agent_state))
        .route("/agent/graph", get(handlers::get_agent_graph))
        .route("/agent/configure", post(handlers::configure_agent))
        .route("/agent/start", post(handlers::start_agent))
        .route("/agent/pause", post(handlers::pause_agent))
        .route("/agent/resume", post(handlers::resume_agent))
        .route("/agent/stop", post(handlers::stop_agent))
        .route("/agent/events", get(handlers::stream_agent_events))
        .route("/profiles", get(handlers::list_profiles))
        .route("/profiles", post(handlers::create_profile))
        .route("/profiles/:id", put(handlers::update_profile))
        .route("/profiles/:id", delete(handlers::delete_profile))
        .route("/profiles/:id/activate", post(handlers::activate_profile))
        .route("/resources", get(handlers::list_resources))
        .route("/resources", delete(handlers::clear_resources))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn serve(state: AppState, port: u16) -> Result<()> {
    let app = create_router(state);
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}")).await?;

    info!(port, "control API listening");

    axum::serve(listener, app).await?;
    Ok(())
}
