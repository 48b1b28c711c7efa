use std::convert::Infallible;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::Json;
use futures::stream::Stream;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::warn;
use uuid::Uuid;

use crate::engine::AgentConfig;
use crate::providers::{provider_for, LlmClient};
use crate::types::{AgentState, ColorTag, GraphSnapshot, IndexedResource, UserProfile};

use super::error::ApiError;
use super::server::AppState;

pub async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigureRequest {
    pub provider: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub max_depth: Option<u32>,
}

pub async fn configure_agent(
    State(state): State<AppState>,
    Json(request): Json<ConfigureRequest>,
) -> Result<Json<Value>, ApiError> {
    let api_key = request
        .api_key
        .or_else(|| match request.provider.to_lowercase().as_str() {
            "claude" | "anthropic" => state.config.anthropic_api_key.clone(),
            "gemini" | "google" => state.config.gemini_api_key.clone(),
            _ => None,
        })
        .ok_or_else(|| ApiError::BadRequest("no API key provided or configured".to_string()))?;

    let provider = provider_for(&request.provider, api_key, request.model)
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;
    let mut config = AgentConfig::new(LlmClient::new(provider), state.tools.clone());
    if let Some(max_depth) = request.max_depth {
        config = config.with_max_depth(max_depth);
    }
    state.orchestrator.configure(config);

    Ok(Json(json!({"configured": true})))
}

pub async fn get_agent_state(State(state): State<AppState>) -> Json<AgentState> {
    Json(state.orchestrator.state())
}

pub async fn get_agent_graph(State(state): State<AppState>) -> Json<GraphSnapshot> {
    Json(state.orchestrator.state().graph)
}

pub async fn start_agent(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    state
        .orchestrator
        .start()
        .map_err(|e| ApiError::Conflict(e.to_string()))?;
    Ok(Json(json!({"status": "running"})))
}

pub async fn pause_agent(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    state
        .orchestrator
        .pause()
        .map_err(|e| ApiError::Conflict(e.to_string()))?;
    Ok(Json(json!({"status": "paused"})))
}

pub async fn resume_agent(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    state
        .orchestrator
        .resume()
        .map_err(|e| ApiError::Conflict(e.to_string()))?;
    Ok(Json(json!({"status": "running"})))
}

pub async fn stop_agent(State(state): State<AppState>) -> Json<Value> {
    state.orchestrator.stop();
    Json(json!({"status": "idle"}))
}

/// Streams agent events, starting with a synthetic `state` snapshot so a
/// late subscriber can render immediately.
pub async fn stream_agent_events(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let (snapshot, mut receiver) = state.orchestrator.subscribe_with_state();

    let stream = async_stream::stream! {
        yield Ok(Event::default()
            .event(snapshot.event_type.as_str())
            .data(serde_json::to_string(&snapshot).unwrap_or_default()));

        loop {
            match receiver.recv().await {
                Ok(event) => {
                    yield Ok(Event::default()
                        .event(event.event_type.as_str())
                        .data(serde_json::to_string(&event).unwrap_or_default()));
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "event subscriber lagged, dropping oldest events");
                    continue;
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    };

    Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateProfileRequest {
    pub display_name: String,
    pub color_tag: ColorTag,
}

pub async fn list_profiles(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "profiles": state.profiles.profiles(),
        "activeProfileId": state.profiles.active_profile_id(),
    }))
}

pub async fn create_profile(
    State(state): State<AppState>,
    Json(request): Json<CreateProfileRequest>,
) -> Json<UserProfile> {
    Json(
        state
            .profiles
            .create_profile(request.display_name, request.color_tag),
    )
}

pub async fn update_profile(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(mut profile): Json<UserProfile>,
) -> Result<Json<UserProfile>, ApiError> {
    profile.id = id;
    let updated = state
        .profiles
        .update_profile(profile)
        .map_err(|e| ApiError::NotFound(e.to_string()))?;
    Ok(Json(updated))
}

pub async fn delete_profile(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, ApiError> {
    state
        .profiles
        .delete_profile(id)
        .map_err(|e| ApiError::NotFound(e.to_string()))?;
    Ok(Json(json!({"deleted": true})))
}

pub async fn activate_profile(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, ApiError> {
    state
        .profiles
        .set_active(Some(id))
        .map_err(|e| ApiError::NotFound(e.to_string()))?;
    Ok(Json(json!({"activeProfileId": id})))
}

pub async fn list_resources(State(state): State<AppState>) -> Json<Vec<IndexedResource>> {
    Json(state.indexer.resources())
}

pub async fn clear_resources(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    state.indexer.clear()?;
    Ok(Json(json!({"cleared": true})))
}
