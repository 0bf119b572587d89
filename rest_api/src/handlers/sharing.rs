// rest_api/src/handlers/sharing.rs

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use lib::services::{holder_channel, IssuedToken, ResolvedAccess, TokenSummary};
use models::medical::{AccessLogEntry, ExtensionRequest, GrantAccess, MedicalRecord, SharedGrant, TokenKind};
use serde::Deserialize;

use crate::errors::RestApiError;
use crate::extractors::{ApiJson, ApiPath, AuthUser, ClientOrigin};
use crate::response::ApiResponse;
use crate::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateShareRequest {
    pub record_ids: Vec<String>,
    #[serde(default, alias = "expiryMinutes")]
    pub ttl_minutes: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct RevokeByTokenRequest {
    pub token: String,
}

#[derive(Debug, Deserialize)]
pub struct ExtensionRequestBody {
    pub reason: String,
}

#[derive(Debug, Deserialize)]
pub struct ExtensionDecision {
    pub granted: bool,
    #[serde(default)]
    pub minutes: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GrantRequest {
    pub user_id: String,
    #[serde(default)]
    pub access_type: GrantAccess,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct ShareLinkRequest {
    #[serde(default)]
    pub hours: Option<i64>,
}

pub async fn generate_share_token_handler(
    State(state): State<AppState>,
    auth: AuthUser,
    origin: ClientOrigin,
    ApiJson(payload): ApiJson<GenerateShareRequest>,
) -> Result<(StatusCode, Json<ApiResponse<IssuedToken>>), RestApiError> {
    let issued = state
        .services
        .tokens
        .issue_share_token(&auth.user.id, payload.record_ids, payload.ttl_minutes, &origin.web())
        .await?;
    Ok((StatusCode::CREATED, ApiResponse::data(issued).message("Share token generated").json()))
}

pub async fn list_share_tokens_handler(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<ApiResponse<Vec<TokenSummary>>>, RestApiError> {
    let tokens = state
        .services
        .tokens
        .tokens_for_owner(&auth.user.id, Some(TokenKind::Share))
        .await?;
    Ok(ApiResponse::list(tokens).json())
}

pub async fn revoke_token_handler(
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
    Ok(ApiResponse::data(summary).message("Access revoked").json())
}

pub async fn revoke_by_token_handler(
    State(state): State<AppState>,
    auth: AuthUser,
    origin: ClientOrigin,
    ApiJson(payload): ApiJson<RevokeByTokenRequest>,
) -> Result<Json<ApiResponse<TokenSummary>>, RestApiError> {
    let summary = state
        .services
        .tokens
        .revoke_by_token_string(&auth.user.id, &payload.token, &origin.web())
        .await?;
    Ok(ApiResponse::data(summary).message("Access revoked").json())
}

pub async fn decide_extension_handler(
    State(state): State<AppState>,
    auth: AuthUser,
    origin: ClientOrigin,
    ApiPath(token_id): ApiPath<String>,
    ApiJson(decision): ApiJson<ExtensionDecision>,
) -> Result<Json<ApiResponse<TokenSummary>>, RestApiError> {
    let summary = state
        .services
        .tokens
        .decide_extension(&auth.user.id, &token_id, decision.granted, decision.minutes, &origin.web())
        .await?;
    let message = if decision.granted { "Extension granted" } else { "Extension denied" };
    Ok(ApiResponse::data(summary).message(message).json())
}

pub async fn access_shared_handler(
    State(state): State<AppState>,
    origin: ClientOrigin,
    ApiPath(token): ApiPath<String>,
) -> Result<Json<ApiResponse<ResolvedAccess>>, RestApiError> {
    let resolved = state
        .services
        .tokens
        .resolve_token(&token, TokenKind::Share, &origin.context(holder_channel(TokenKind::Share)))
        .await?;
    Ok(ApiResponse::data(resolved).json())
}

pub async fn request_extension_handler(
    State(state): State<AppState>,
    origin: ClientOrigin,
    ApiPath(token): ApiPath<String>,
    ApiJson(payload): ApiJson<ExtensionRequestBody>,
) -> Result<Json<ApiResponse<ExtensionRequest>>, RestApiError> {
    let request = state
        .services
        .tokens
        .request_extension(&token, &payload.reason, &origin.context(holder_channel(TokenKind::Share)))
        .await?;
    Ok(ApiResponse::data(request).message("Extension requested").json())
}

pub async fn access_logs_handler(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<ApiResponse<Vec<AccessLogEntry>>>, RestApiError> {
    let entries = state.services.tokens.access_logs(&auth.user.id).await?;
    Ok(ApiResponse::list(entries).json())
}

pub async fn shared_by_me_handler(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<ApiResponse<Vec<MedicalRecord>>>, RestApiError> {
    let records = state.services.records.shared_by_me(&auth.user.id).await?;
    Ok(ApiResponse::list(records).json())
}

pub async fn shared_with_me_handler(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<ApiResponse<Vec<MedicalRecord>>>, RestApiError> {
    let records = state.services.records.shared_with_me(&auth.user.id).await?;
    Ok(ApiResponse::list(records).json())
}

pub async fn grant_access_handler(
    State(state): State<AppState>,
    auth: AuthUser,
    origin: ClientOrigin,
    ApiPath(record_id): ApiPath<String>,
    ApiJson(payload): ApiJson<GrantRequest>,
) -> Result<(StatusCode, Json<ApiResponse<SharedGrant>>), RestApiError> {
    let grant = state
        .services
        .records
        .share_with_user(
            &auth.user.id,
            &record_id,
            &payload.user_id,
            payload.access_type,
            payload.expires_at,
            &origin.web(),
        )
        .await?;
    Ok((StatusCode::CREATED, ApiResponse::data(grant).message("Record shared successfully").json()))
}

pub async fn share_link_handler(
    State(state): State<AppState>,
    auth: AuthUser,
    origin: ClientOrigin,
    ApiPath(record_id): ApiPath<String>,
    payload: Option<Json<ShareLinkRequest>>,
) -> Result<(StatusCode, Json<ApiResponse<IssuedToken>>), RestApiError> {
    let hours = payload.and_then(|Json(request)| request.hours);
    let issued = state
        .services
        .tokens
        .issue_share_link(&auth.user.id, &record_id, hours, &origin.web())
        .await?;
    Ok((StatusCode::CREATED, ApiResponse::data(issued).message("Share link generated").json()))
}

pub async fn revoke_grant_handler(
    State(state): State<AppState>,
    auth: AuthUser,
    origin: ClientOrigin,
    ApiPath((record_id, user_id)): ApiPath<(String, String)>,
) -> Result<Json<ApiResponse<()>>, RestApiError> {
    state
        .services
        .records
        .revoke_grant(&auth.user.id, &record_id, &user_id, &origin.web())
        .await?;
    Ok(ApiResponse::done("Access revoked successfully").json())
}
