// rest_api/src/handlers/auth.rs

use axum::extract::State;
use axum::Json;
use models::medical::UserProfile;
use serde::Deserialize;
use serde_json::{json, Value};
use security::{DigiLockerSession, LoginOutcome, OtpIssued};

use crate::errors::RestApiError;
use crate::extractors::{ApiJson, ApiQuery, AuthUser, ClientOrigin};
use crate::response::ApiResponse;
use crate::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AadhaarRequest {
    pub aadhaar_number: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyOtpRequest {
    pub aadhaar_number: String,
    pub otp: String,
}

#[derive(Debug, Deserialize)]
pub struct ProfileUpdate {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct DigiLockerCallback {
    pub code: String,
    /// The session id handed out when the handoff started.
    pub state: String,
}

pub async fn health_check_handler(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "success": true,
        "status": "ok",
        "message": "Server is running",
        "storage": state.services.store.engine_name(),
    }))
}

pub async fn request_otp_handler(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<AadhaarRequest>,
) -> Result<Json<ApiResponse<OtpIssued>>, RestApiError> {
    let issued = state.identity.request_otp(&payload.aadhaar_number).await?;
    Ok(ApiResponse::data(issued).message("OTP sent successfully").json())
}

pub async fn verify_otp_handler(
    State(state): State<AppState>,
    origin: ClientOrigin,
    ApiJson(payload): ApiJson<VerifyOtpRequest>,
) -> Result<Json<ApiResponse<LoginOutcome>>, RestApiError> {
    let outcome = state
        .identity
        .verify_otp(&payload.aadhaar_number, &payload.otp, &origin.web())
        .await?;
    Ok(ApiResponse::data(outcome).message("Authentication successful").json())
}

pub async fn current_user_handler(auth: AuthUser) -> Json<ApiResponse<UserProfile>> {
    ApiResponse::data(auth.user.profile()).json()
}

pub async fn update_profile_handler(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiJson(payload): ApiJson<ProfileUpdate>,
) -> Result<Json<ApiResponse<UserProfile>>, RestApiError> {
    let profile = state.identity.update_profile(&auth.user, &payload.name).await?;
    Ok(ApiResponse::data(profile).message("Profile updated").json())
}

pub async fn logout_handler(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<ApiResponse<()>>, RestApiError> {
    state.identity.logout(&auth.credential).await?;
    Ok(ApiResponse::done("Logged out successfully").json())
}

pub async fn digilocker_session_handler(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<DigiLockerSession>>, RestApiError> {
    let session = state.identity.start_digilocker_session().await?;
    Ok(ApiResponse::data(session).json())
}

pub async fn digilocker_callback_handler(
    State(state): State<AppState>,
    origin: ClientOrigin,
    ApiQuery(callback): ApiQuery<DigiLockerCallback>,
) -> Result<Json<ApiResponse<LoginOutcome>>, RestApiError> {
    let outcome = state
        .identity
        .complete_digilocker_session(&callback.state, &callback.code, &origin.web())
        .await?;
    Ok(ApiResponse::data(outcome).message("Authentication successful").json())
}
