use axum::{extract::State, http::StatusCode, Json};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterBody {
    pub package_name: Option<String>,
    pub api_key: Option<String>,
    pub webhook_url: Option<String>,
    #[serde(default)]
    pub server_urls: Vec<String>,
}

pub async fn register(
    State(state): State<AppState>,
    Json(body): Json<RegisterBody>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let package_name = body
        .package_name
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ApiError::BadRequest("packageName is required".into()))?;
    let api_key = body
        .api_key
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ApiError::BadRequest("apiKey is required".into()))?;
    let webhook_url = body
        .webhook_url
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ApiError::BadRequest("webhookUrl is required".into()))?;

    let registration_id = state
        .registration
        .register(&package_name, &api_key, &webhook_url, body.server_urls)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "registrationId": registration_id,
        })),
    ))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationIdBody {
    pub registration_id: Option<String>,
}

pub async fn heartbeat(
    State(state): State<AppState>,
    Json(body): Json<RegistrationIdBody>,
) -> Result<Json<Value>, ApiError> {
    let registration_id = body
        .registration_id
        .ok_or_else(|| ApiError::BadRequest("registrationId is required".into()))?;
    state.registration.heartbeat(&registration_id)?;
    Ok(Json(json!({ "success": true })))
}

pub async fn restart(
    State(state): State<AppState>,
    Json(body): Json<RegistrationIdBody>,
) -> Result<Json<Value>, ApiError> {
    let registration_id = body
        .registration_id
        .ok_or_else(|| ApiError::BadRequest("registrationId is required".into()))?;
    let recovered = state.registration.restart(&registration_id).await?;
    Ok(Json(json!({
        "success": true,
        "recoveredSessions": recovered,
    })))
}
