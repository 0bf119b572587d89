// rest_api/src/lib.rs

//! JSON/HTTP surface of the records service.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Error as AnyhowError};
use axum::extract::DefaultBodyLimit;
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{HeaderName, Method};
use axum::routing::{delete, get, post, put};
use axum::Router;
use lib::config::AppConfig;
use lib::services::Services;
use log::info;
use security::{IdentityProvider, IdentityService};
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub mod errors;
pub mod extractors;
pub mod handlers;
pub mod response;

use handlers::{auth, emergency, records, sharing};

pub use errors::RestApiError;
pub use response::ApiResponse;

/// Room for multipart framing on top of the largest accepted file.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

// Shared state for the Axum application
#[derive(Clone)]
pub struct AppState {
    pub services: Services,
    pub identity: Arc<IdentityService>,
    pub config: Arc<AppConfig>,
}

impl AppState {
    pub fn new(config: AppConfig, services: Services, provider: Arc<dyn IdentityProvider>) -> Self {
        let identity = IdentityService::new(&services, &config.auth, provider);
        AppState {
            services,
            identity: Arc::new(identity),
            config: Arc::new(config),
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE, HeaderName::from_static(extractors::SESSION_HEADER)])
        .allow_origin(Any);
    let body_limit = usize::try_from(state.config.uploads.max_file_size)
        .unwrap_or(usize::MAX)
        .saturating_add(MULTIPART_OVERHEAD);

    Router::new()
        .route("/api/health", get(auth::health_check_handler))
        .route("/api/auth/aadhaar", post(auth::request_otp_handler))
        .route("/api/auth/verify-otp", post(auth::verify_otp_handler))
        .route("/api/auth/user", get(auth::current_user_handler))
        .route("/api/auth/profile", put(auth::update_profile_handler))
        .route("/api/auth/logout", post(auth::logout_handler))
        .route("/api/digilocker/session", get(auth::digilocker_session_handler))
        .route("/api/digilocker/callback", get(auth::digilocker_callback_handler))
        .route(
            "/api/records",
            get(records::list_records_handler).post(records::create_record_handler),
        )
        .route("/api/records/category/:category", get(records::records_by_category_handler))
        .route(
            "/api/records/:id",
            get(records::get_record_handler)
                .put(records::update_record_handler)
                .delete(records::delete_record_handler),
        )
        .route("/api/records/:id/files", post(records::upload_file_handler))
        .route(
            "/api/records/:id/files/:file_id",
            get(records::download_file_handler).delete(records::delete_file_handler),
        )
        .route("/api/share/generate", post(sharing::generate_share_token_handler))
        .route("/api/share/tokens", get(sharing::list_share_tokens_handler))
        .route("/api/share/tokens/:token_id", delete(sharing::revoke_token_handler))
        .route("/api/share/tokens/:token_id/extension", post(sharing::decide_extension_handler))
        .route("/api/share/revoke", post(sharing::revoke_by_token_handler))
        .route("/api/share/access/:token", get(sharing::access_shared_handler))
        .route("/api/share/access/:token/extension", post(sharing::request_extension_handler))
        .route("/api/share/logs", get(sharing::access_logs_handler))
        .route("/api/share/shared-by-me", get(sharing::shared_by_me_handler))
        .route("/api/share/shared-with-me", get(sharing::shared_with_me_handler))
        .route("/api/share/:record_id", post(sharing::grant_access_handler))
        .route("/api/share/:record_id/link", post(sharing::share_link_handler))
        .route("/api/share/:record_id/:user_id", delete(sharing::revoke_grant_handler))
        .route("/api/emergency/token", post(emergency::generate_emergency_token_handler))
        .route("/api/emergency/tokens", get(emergency::list_emergency_tokens_handler))
        .route("/api/emergency/token/:token_id", delete(emergency::revoke_emergency_token_handler))
        .route("/api/emergency/access/:token", get(emergency::access_emergency_handler))
        .route("/api/emergency/logs", get(emergency::emergency_logs_handler))
        .with_state(state)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        log::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Received shutdown signal.");
}

// Main function to start the REST API server
pub async fn start_server(state: AppState) -> Result<(), AnyhowError> {
    let addr = format!("{}:{}", state.config.server.host, state.config.server.port);
    let app = build_router(state);

    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to address: {}", addr))?;
    info!("REST API server listening on {}", addr);

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("REST API server failed to start or run")?;

    info!("REST API server stopped.");
    Ok(())
}
