// security/src/lib.rs

//! Authentication for the records API: Aadhaar + OTP logins that yield a
//! signed bearer token, DigiLocker handoffs that yield a server-side session,
//! and resolution of either credential back to a user.

pub mod errors;
pub mod identity_provider;
pub mod identity_service;
pub mod jwt;
pub mod otp;
pub mod sessions;

pub use errors::{AuthError, AuthResult};
pub use identity_provider::{DigiLockerClient, IdentityProvider, ProviderProfile};
pub use identity_service::{DigiLockerSession, IdentityService, LoginOutcome, OtpIssued};
pub use jwt::{Claims, JwtIssuer};

/// The one credential a request carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credential {
    Bearer(String),
    Session(String),
}

impl Credential {
    /// Picks the credential out of the raw header values. A bearer token
    /// wins over a session id when both are sent.
    pub fn from_headers(authorization: Option<&str>, session_id: Option<&str>) -> Option<Self> {
        let bearer = authorization
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|token| !token.is_empty());
        if let Some(token) = bearer {
            return Some(Credential::Bearer(token.to_string()));
        }
        session_id
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(|id| Credential::Session(id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_prefer_bearer_over_session() {
        assert_eq!(
            Credential::from_headers(Some("Bearer abc"), Some("s-1")),
            Some(Credential::Bearer("abc".into()))
        );
        assert_eq!(
            Credential::from_headers(Some("Basic zzz"), Some("s-1")),
            Some(Credential::Session("s-1".into()))
        );
        assert_eq!(Credential::from_headers(Some("Bearer "), None), None);
        assert_eq!(Credential::from_headers(None, None), None);
    }
}
