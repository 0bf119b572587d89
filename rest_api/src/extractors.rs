// rest_api/src/extractors.rs

use std::convert::Infallible;
use std::net::SocketAddr;

use axum::async_trait;
use axum::extract::{ConnectInfo, FromRequest, FromRequestParts, Path, Query, Request};
use axum::http::header::{AUTHORIZATION, USER_AGENT};
use axum::http::request::Parts;
use axum::http::HeaderMap;
use axum::Json;
use models::medical::{AccessChannel, AccessContext, RequestOrigin, User};
use security::{AuthError, Credential};
use serde::de::DeserializeOwned;

use crate::errors::RestApiError;
use crate::AppState;

pub const SESSION_HEADER: &str = "x-session-id";
const FORWARDED_FOR: &str = "x-forwarded-for";

fn header_str<'a>(headers: &'a HeaderMap, name: impl axum::http::header::AsHeaderName) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// The authenticated caller. The credential is resolved once, here.
pub struct AuthUser {
    pub user: User,
    pub credential: Credential,
}

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = RestApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let credential = Credential::from_headers(
            header_str(&parts.headers, AUTHORIZATION),
            header_str(&parts.headers, SESSION_HEADER),
        )
        .ok_or(AuthError::MissingCredential)?;
        let user = state.identity.authenticate(&credential).await?;
        Ok(AuthUser { user, credential })
    }
}

/// Network origin of the request: first `x-forwarded-for` hop, else the
/// peer address.
pub struct ClientOrigin(pub RequestOrigin);

impl ClientOrigin {
    pub fn context(&self, channel: AccessChannel) -> AccessContext {
        AccessContext::new(self.0.clone(), channel)
    }

    pub fn web(&self) -> AccessContext {
        self.context(AccessChannel::Web)
    }
}

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for ClientOrigin {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let forwarded = header_str(&parts.headers, FORWARDED_FOR)
            .and_then(|v| v.split(',').next())
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty());
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip().to_string());
        Ok(ClientOrigin(RequestOrigin {
            ip_address: forwarded.or(peer),
            user_agent: header_str(&parts.headers, USER_AGENT).map(str::to_string),
        }))
    }
}

/// JSON body whose rejection is answered with a 400 envelope.
pub struct ApiJson<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned + Send,
    S: Send + Sync,
{
    type Rejection = RestApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        Ok(ApiJson(value))
    }
}

pub struct ApiPath<T>(pub T);

#[async_trait]
impl<S, T> FromRequestParts<S> for ApiPath<T>
where
    T: DeserializeOwned + Send,
    S: Send + Sync,
{
    type Rejection = RestApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(value) = Path::<T>::from_request_parts(parts, state).await?;
        Ok(ApiPath(value))
    }
}

pub struct ApiQuery<T>(pub T);

#[async_trait]
impl<S, T> FromRequestParts<S> for ApiQuery<T>
where
    T: DeserializeOwned + Send,
    S: Send + Sync,
{
    type Rejection = RestApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Query(value) = Query::<T>::from_request_parts(parts, state).await?;
        Ok(ApiQuery(value))
    }
}
