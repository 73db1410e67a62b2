use crate::error::ApiError;
use crate::AdminState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use relay_core::{
    ConfigId, DeliveryRecord, NewSourceConfig, RunOutcome, SourceConfig, SourceConfigUpdate,
    SubredditSummary,
};
use serde::Deserialize;
use tracing::info;

const SEARCH_LIMIT: u32 = 10;
const DEFAULT_DELIVERY_LIMIT: u32 = 50;
const MAX_DELIVERY_LIMIT: u32 = 500;

#[derive(Deserialize)]
pub struct SearchQuery {
    q: Option<String>,
}

#[derive(Deserialize)]
pub struct DeliveriesQuery {
    limit: Option<u32>,
}

fn config_not_found(id: ConfigId) -> ApiError {
    ApiError::not_found(format!("config {}", id))
}

pub async fn search_subreddits(
    State(state): State<AdminState>,
    Query(params): Query<SearchQuery>,
) -> Result<Json<Vec<SubredditSummary>>, ApiError> {
    let query = params.q.unwrap_or_default();
    let query = query.trim();
    if query.is_empty() {
        return Ok(Json(Vec::new()));
    }
    let results = state.directory.search_sources(query, SEARCH_LIMIT).await?;
    Ok(Json(results))
}

pub async fn list_configs(
    State(state): State<AdminState>,
) -> Result<Json<Vec<SourceConfig>>, ApiError> {
    Ok(Json(state.store.list_configs().await?))
}

pub async fn get_config(
    State(state): State<AdminState>,
    Path(id): Path<ConfigId>,
) -> Result<Json<SourceConfig>, ApiError> {
    let config = state
        .store
        .get_config(id)
        .await?
        .ok_or_else(|| config_not_found(id))?;
    Ok(Json(config))
}

pub async fn create_config(
    State(state): State<AdminState>,
    Json(body): Json<NewSourceConfig>,
) -> Result<impl IntoResponse, ApiError> {
    let config = state.store.create_config(&body).await?;
    info!("Created config {} for r/{}", config.id, config.subreddit_name);
    state.scheduler.activate(&config);
    Ok((StatusCode::CREATED, Json(config)))
}

pub async fn update_config(
    State(state): State<AdminState>,
    Path(id): Path<ConfigId>,
    Json(body): Json<SourceConfigUpdate>,
) -> Result<Json<SourceConfig>, ApiError> {
    let config = state
        .store
        .update_config(id, &body)
        .await?
        .ok_or_else(|| config_not_found(id))?;
    if config.is_active {
        state.scheduler.activate(&config);
    }
    Ok(Json(config))
}

pub async fn delete_config(
    State(state): State<AdminState>,
    Path(id): Path<ConfigId>,
) -> Result<StatusCode, ApiError> {
    if !state.store.delete_config(id).await? {
        return Err(config_not_found(id));
    }
    state.scheduler.unschedule(id);
    info!("Deleted config {}", id);
    Ok(StatusCode::NO_CONTENT)
}

pub async fn toggle_config(
    State(state): State<AdminState>,
    Path(id): Path<ConfigId>,
) -> Result<Json<SourceConfig>, ApiError> {
    let config = state
        .store
        .toggle_config(id)
        .await?
        .ok_or_else(|| config_not_found(id))?;
    if config.is_active {
        state.scheduler.activate(&config);
    } else {
        state.scheduler.unschedule(id);
    }
    Ok(Json(config))
}

pub async fn send_now(
    State(state): State<AdminState>,
    Path(id): Path<ConfigId>,
) -> Result<Json<RunOutcome>, ApiError> {
    let config = state
        .store
        .get_config(id)
        .await?
        .ok_or_else(|| config_not_found(id))?;
    if !config.is_active {
        return Err(ApiError::bad_request(format!(
            "config {} is inactive",
            id
        )));
    }

    let outcome = state
        .scheduler
        .run_now(id)
        .await
        .map_err(ApiError::run_failed)?;
    Ok(Json(outcome))
}

pub async fn recent_deliveries(
    State(state): State<AdminState>,
    Query(params): Query<DeliveriesQuery>,
) -> Result<Json<Vec<DeliveryRecord>>, ApiError> {
    let limit = params
        .limit
        .unwrap_or(DEFAULT_DELIVERY_LIMIT)
        .min(MAX_DELIVERY_LIMIT);
    Ok(Json(state.ledger.recent_deliveries(limit).await?))
}
