// rest_api/src/handlers/emergency.rs

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use lib::errors::ServiceError;
use lib::services::{holder_channel, EmergencyAccessEvent, IssuedToken, ResolvedAccess, TokenSummary};
use models::errors::ValidationError;
use models::medical::TokenKind;
use serde::Deserialize;

use crate::errors::RestApiError;
use crate::extractors::{ApiJson, ApiPath, AuthUser, ClientOrigin};
use crate::response::ApiResponse;
use crate::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmergencyTokenRequest {
    pub record_ids: Vec<String>,
    pub emergency_contact: String,
    #[serde(default)]
    pub additional_info: String,
}

pub async fn generate_emergency_token_handler(
    State(state): State<AppState>,
    auth: AuthUser,
    origin: ClientOrigin,
    ApiJson(payload): ApiJson<EmergencyTokenRequest>,
) -> Result<(StatusCode, Json<ApiResponse<IssuedToken>>), RestApiError> {
    if payload.emergency_contact.trim().is_empty() {
        return Err(ServiceError::from(ValidationError::MissingField("emergencyContact")).into());
    }
    let issued = state
        .services
        .tokens
        .issue_emergency_token(
            &auth.user.id,
            payload.record_ids,
            payload.emergency_contact,
            payload.additional_info,
            &origin.web(),
        )
        .await?;
    Ok((
        StatusCode::CREATED,
        ApiResponse::data(issued).message("Emergency access token generated").json(),
    ))
}

pub async fn list_emergency_tokens_handler(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<ApiResponse<Vec<TokenSummary>>>, RestApiError> {
    let tokens = state
        .services
        .tokens
        .tokens_for_owner(&auth.user.id, Some(TokenKind::Emergency))
        .await?;
    Ok(ApiResponse::list(tokens).json())
}

pub async fn revoke_emergency_token_handler(
    State(state): State<AppState>,
    auth: AuthUser,
    origin: ClientOrigin,
    ApiPath(token_id): ApiPath<String>,
) -> Result<Json<ApiResponse<TokenSummary>>, RestApiError> {
    let summary = state
        .services
        .tokens
        .revoke_token(&auth.user.id, &token_id, &origin.web())
        .await?;
    Ok(ApiResponse::data(summary).message("Emergency access revoked").json())
}

pub async fn access_emergency_handler(
    State(state): State<AppState>,
    origin: ClientOrigin,
    ApiPath(token): ApiPath<String>,
) -> Result<Json<ApiResponse<ResolvedAccess>>, RestApiError> {
    let resolved = state
        .services
        .tokens
        .resolve_token(&token, TokenKind::Emergency, &origin.context(holder_channel(TokenKind::Emergency)))
        .await?;
    Ok(ApiResponse::data(resolved).json())
}

pub async fn emergency_logs_handler(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<ApiResponse<Vec<EmergencyAccessEvent>>>, RestApiError> {
    let events = state.services.tokens.emergency_access_events(&auth.user.id).await?;
    Ok(ApiResponse::list(events).json())
}
