// rest_api/src/handlers/records.rs

use axum::extract::multipart::MultipartRejection;
use axum::extract::{Multipart, State};
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_TYPE};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use models::medical::{FileAttachment, MedicalRecord, NewMedicalRecord, RecordUpdate};

use crate::errors::RestApiError;
use crate::extractors::{ApiJson, ApiPath, AuthUser, ClientOrigin};
use crate::response::ApiResponse;
use crate::AppState;

const UPLOAD_FIELD: &str = "file";

/// Keeps a filename safe to place inside a quoted header parameter.
fn disposition_filename(name: &str) -> String {
    name.chars()
        .map(|c| if (c.is_ascii_graphic() && c != '"' && c != '\\') || c == ' ' { c } else { '_' })
        .collect()
}

pub async fn list_records_handler(
    State(state): State<AppState>,
    auth: AuthUser,
    origin: ClientOrigin,
) -> Result<Json<ApiResponse<Vec<MedicalRecord>>>, RestApiError> {
    let records = state.services.records.list_records(&auth.user.id, &origin.web()).await?;
    Ok(ApiResponse::list(records).json())
}

pub async fn records_by_category_handler(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiPath(category): ApiPath<String>,
) -> Result<Json<ApiResponse<Vec<MedicalRecord>>>, RestApiError> {
    let records = state.services.records.records_by_category(&auth.user.id, &category).await?;
    Ok(ApiResponse::list(records).json())
}

pub async fn get_record_handler(
    State(state): State<AppState>,
    auth: AuthUser,
    origin: ClientOrigin,
    ApiPath(id): ApiPath<String>,
) -> Result<Json<ApiResponse<MedicalRecord>>, RestApiError> {
    let record = state.services.records.get_record(&auth.user.id, &id, &origin.web()).await?;
    Ok(ApiResponse::data(record).json())
}

pub async fn create_record_handler(
    State(state): State<AppState>,
    auth: AuthUser,
    origin: ClientOrigin,
    ApiJson(payload): ApiJson<NewMedicalRecord>,
) -> Result<(StatusCode, Json<ApiResponse<MedicalRecord>>), RestApiError> {
    let record = state
        .services
        .records
        .create_record(&auth.user.id, payload, &origin.web())
        .await?;
    Ok((StatusCode::CREATED, ApiResponse::data(record).message("Record created").json()))
}

pub async fn update_record_handler(
    State(state): State<AppState>,
    auth: AuthUser,
    origin: ClientOrigin,
    ApiPath(id): ApiPath<String>,
    ApiJson(payload): ApiJson<RecordUpdate>,
) -> Result<Json<ApiResponse<MedicalRecord>>, RestApiError> {
    let record = state
        .services
        .records
        .update_record(&auth.user.id, &id, payload, &origin.web())
        .await?;
    Ok(ApiResponse::data(record).message("Record updated").json())
}

pub async fn delete_record_handler(
    State(state): State<AppState>,
    auth: AuthUser,
    origin: ClientOrigin,
    ApiPath(id): ApiPath<String>,
) -> Result<Json<ApiResponse<()>>, RestApiError> {
    state.services.records.delete_record(&auth.user.id, &id, &origin.web()).await?;
    Ok(ApiResponse::done("Record deleted").json())
}

pub async fn upload_file_handler(
    State(state): State<AppState>,
    auth: AuthUser,
    origin: ClientOrigin,
    ApiPath(id): ApiPath<String>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<(StatusCode, Json<ApiResponse<FileAttachment>>), RestApiError> {
    let mut multipart = multipart?;
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }
        let original_name = field.file_name().unwrap_or("upload").to_string();
        let content_type = field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();
        let bytes = field.bytes().await?;
        let attachment = state
            .services
            .records
            .attach_file(&auth.user.id, &id, &original_name, &content_type, &bytes, &origin.web())
            .await?;
        return Ok((
            StatusCode::CREATED,
            ApiResponse::data(attachment).message("File uploaded successfully").json(),
        ));
    }
    Err(RestApiError::BadRequest("Please upload a file".to_string()))
}

pub async fn download_file_handler(
    State(state): State<AppState>,
    auth: AuthUser,
    origin: ClientOrigin,
    ApiPath((id, file_id)): ApiPath<(String, String)>,
) -> Result<impl IntoResponse, RestApiError> {
    let download = state
        .services
        .records
        .download_file(&auth.user.id, &id, &file_id, &origin.web())
        .await?;
    let headers = [
        (CONTENT_TYPE, download.file.content_type.clone()),
        (
            CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", disposition_filename(&download.file.original_name)),
        ),
        (CONTENT_LENGTH, download.bytes.len().to_string()),
    ];
    Ok((headers, download.bytes))
}

pub async fn delete_file_handler(
    State(state): State<AppState>,
    auth: AuthUser,
    origin: ClientOrigin,
    ApiPath((id, file_id)): ApiPath<(String, String)>,
) -> Result<Json<ApiResponse<()>>, RestApiError> {
    state
        .services
        .records
        .delete_file(&auth.user.id, &id, &file_id, &origin.web())
        .await?;
    Ok(ApiResponse::done("File deleted").json())
}

#[cfg(test)]
mod tests {
    use super::disposition_filename;

    #[test]
    fn should_sanitize_disposition_filename() {
        assert_eq!(disposition_filename("cbc report.pdf"), "cbc report.pdf");
        assert_eq!(disposition_filename("a\"b\\c\u{e9}.png"), "a_b_c_.png");
    }
}
