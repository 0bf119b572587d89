// security/src/identity_service.rs

use std::sync::Arc;

use log::{info, warn};
use models::medical::{AccessAction, AccessContext, AccessLogEntry, Identity, User, UserProfile};
use models::{AadhaarNumber, OtpCode};
use serde::Serialize;

use lib::clock::Clock;
use lib::config::AuthConfig;
use lib::errors::StoreError;
use lib::services::{AccessLogRecorder, Services};
use lib::storage_engine::Datastore;

use crate::errors::{AuthError, AuthResult};
use crate::identity_provider::IdentityProvider;
use crate::jwt::JwtIssuer;
use crate::otp::OtpStore;
use crate::sessions::SessionStore;
use crate::Credential;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OtpIssued {
    pub expires_in_seconds: i64,
    /// Only present when the deployment echoes codes for development.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dev_otp: Option<String>,
}

/// A completed login: the credential to present from now on and who it
/// belongs to.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginOutcome {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    pub user: UserProfile,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DigiLockerSession {
    pub session_id: String,
    pub authorization_url: String,
}

/// Both login flows plus credential resolution for every later request.
pub struct IdentityService {
    store: Arc<dyn Datastore>,
    log: AccessLogRecorder,
    clock: Arc<dyn Clock>,
    otps: OtpStore,
    sessions: SessionStore,
    jwt: JwtIssuer,
    provider: Arc<dyn IdentityProvider>,
    expose_dev_otp: bool,
}

impl IdentityService {
    pub fn new(services: &Services, auth: &AuthConfig, provider: Arc<dyn IdentityProvider>) -> Self {
        IdentityService {
            store: services.store.clone(),
            log: services.log.clone(),
            clock: services.clock.clone(),
            otps: OtpStore::new(auth.otp_ttl_minutes, auth.otp_max_attempts),
            sessions: SessionStore::new(),
            jwt: JwtIssuer::new(&auth.jwt_secret, auth.jwt_ttl_hours),
            provider,
            expose_dev_otp: auth.expose_dev_otp,
        }
    }

    pub async fn request_otp(&self, aadhaar: &str) -> AuthResult<OtpIssued> {
        let aadhaar = AadhaarNumber::new(aadhaar)?;
        let code = self.otps.issue(&aadhaar, self.clock.now()).await?;
        info!("OTP issued for Aadhaar {}", aadhaar.masked());
        Ok(OtpIssued {
            expires_in_seconds: self.otps.ttl().num_seconds(),
            dev_otp: self.expose_dev_otp.then(|| code.as_str().to_string()),
        })
    }

    pub async fn verify_otp(&self, aadhaar: &str, otp: &str, ctx: &AccessContext) -> AuthResult<LoginOutcome> {
        let aadhaar = AadhaarNumber::new(aadhaar)?;
        let otp = OtpCode::new(otp)?;
        let now = self.clock.now();
        if let Err(e) = self.otps.verify(&aadhaar, &otp, now).await {
            warn!("OTP verification failed for Aadhaar {}: {}", aadhaar.masked(), e);
            return Err(e);
        }

        let fallback_name = format!("Patient {}", &aadhaar[8..]);
        let user = self
            .find_or_create(Identity::Aadhaar(aadhaar), &fallback_name, ctx)
            .await?;
        let token = self.jwt.issue(&user.id, &user.name, now)?;
        Ok(LoginOutcome {
            token: Some(token),
            session_id: None,
            user: user.profile(),
        })
    }

    pub async fn start_digilocker_session(&self) -> AuthResult<DigiLockerSession> {
        let session_id = self.sessions.start(self.clock.now()).await;
        let authorization_url = self.provider.authorization_url(&session_id)?;
        Ok(DigiLockerSession {
            session_id,
            authorization_url,
        })
    }

    pub async fn complete_digilocker_session(
        &self,
        session_id: &str,
        code: &str,
        ctx: &AccessContext,
    ) -> AuthResult<LoginOutcome> {
        if code.trim().is_empty() {
            return Err(models::errors::ValidationError::MissingField("code").into());
        }
        // Nothing is created or logged for a callback without a live handoff.
        self.sessions.ensure_pending(session_id, self.clock.now()).await?;
        let profile = self.provider.exchange_code(code).await.map_err(|e| {
            warn!("DigiLocker code exchange failed: {}", e);
            e
        })?;
        let user = self
            .find_or_create(Identity::DigiLocker(profile.subject), &profile.name, ctx)
            .await?;
        self.sessions.activate(session_id, &user.id, self.clock.now()).await?;
        Ok(LoginOutcome {
            token: None,
            session_id: Some(session_id.to_string()),
            user: user.profile(),
        })
    }

    /// Renames the caller. The name is trimmed and must not be blank.
    pub async fn update_profile(&self, user: &User, name: &str) -> AuthResult<UserProfile> {
        let name = name.trim();
        if name.is_empty() {
            return Err(models::errors::ValidationError::MissingField("name").into());
        }
        let mut updated = user.clone();
        updated.name = name.to_string();
        updated.updated_at = self.clock.now();
        self.store.update_user(&updated).await?;
        info!("User {} updated their profile", updated.id);
        Ok(updated.profile())
    }

    /// Resolves a credential to its user. Unknown users behind a valid
    /// credential are treated as an invalid credential.
    pub async fn authenticate(&self, credential: &Credential) -> AuthResult<User> {
        let user_id = match credential {
            Credential::Bearer(token) => self.jwt.verify(token, self.clock.now())?.sub,
            Credential::Session(id) => self.sessions.user_for(id).await?,
        };
        self.store
            .get_user(&user_id)
            .await?
            .ok_or_else(|| AuthError::InvalidToken("user no longer exists".to_string()))
    }

    /// Ends a DigiLocker session. Bearer tokens are stateless and simply
    /// age out.
    pub async fn logout(&self, credential: &Credential) -> AuthResult<()> {
        if let Credential::Session(id) = credential {
            if !self.sessions.end(id).await {
                return Err(AuthError::UnknownSession);
            }
            info!("Session {} ended", id);
        }
        Ok(())
    }

    /// Looks the identity up, creating the user on first login, then stamps
    /// the login time and records a `LOGIN` entry.
    async fn find_or_create(&self, identity: Identity, name: &str, ctx: &AccessContext) -> AuthResult<User> {
        let now = self.clock.now();
        let mut user = match self.store.find_user_by_identity(&identity).await? {
            Some(user) => user,
            None => {
                let user = User::new(name, identity.clone(), now);
                match self.store.insert_user(&user).await {
                    Ok(()) => {
                        info!("Created user {}", user.id);
                        user
                    }
                    Err(StoreError::Conflict(_)) => self
                        .store
                        .find_user_by_identity(&identity)
                        .await?
                        .ok_or_else(|| AuthError::Provider("identity vanished during login".to_string()))?,
                    Err(e) => return Err(e.into()),
                }
            }
        };
        user.last_login = Some(now);
        user.updated_at = now;
        self.store.update_user(&user).await?;

        self.log
            .record(
                AccessLogEntry::new(&user.id, AccessAction::Login, ctx, now)
                    .by(&user.id)
                    .details("User logged in"),
            )
            .await?;
        Ok(user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity_provider::ProviderProfile;
    use async_trait::async_trait;
    use chrono::{Duration, TimeZone, Utc};
    use lib::clock::ManualClock;
    use lib::config::AppConfig;
    use lib::storage_engine::Storage;

    struct FakeProvider;

    #[async_trait]
    impl IdentityProvider for FakeProvider {
        fn authorization_url(&self, state: &str) -> AuthResult<String> {
            Ok(format!("https://provider.test/authorize?state={}", state))
        }

        async fn exchange_code(&self, code: &str) -> AuthResult<ProviderProfile> {
            match code {
                "good" => Ok(ProviderProfile {
                    subject: "dl-42".into(),
                    name: "Asha Rao".into(),
                }),
                _ => Err(AuthError::Provider("bad code".into())),
            }
        }
    }

    fn service(expose_dev_otp: bool) -> (IdentityService, Arc<ManualClock>, Services) {
        let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 4, 1, 9, 0, 0).unwrap()));
        let mut config = AppConfig::default();
        config.auth.expose_dev_otp = expose_dev_otp;
        let services = Services::new(Storage::in_memory(), &config, clock.clone());
        let identity = IdentityService::new(&services, &config.auth, Arc::new(FakeProvider));
        (identity, clock, services)
    }

    #[tokio::test]
    async fn should_log_in_with_otp_and_reuse_user() {
        let (identity, clock, services) = service(true);
        let ctx = AccessContext::default();

        let issued = identity.request_otp("123456789012").await.unwrap();
        let code = issued.dev_otp.unwrap();
        let first = identity.verify_otp("123456789012", &code, &ctx).await.unwrap();
        assert_eq!(first.user.aadhaar_number.as_deref(), Some("XXXX-XXXX-9012"));

        let token = first.token.unwrap();
        let user = identity.authenticate(&Credential::Bearer(token.clone())).await.unwrap();
        assert_eq!(user.id, first.user.id);
        assert_eq!(user.last_login, Some(clock.now()));

        let code = identity.request_otp("1234 5678 9012").await.unwrap().dev_otp.unwrap();
        let second = identity.verify_otp("123456789012", &code, &ctx).await.unwrap();
        assert_eq!(second.user.id, first.user.id);

        let logins = services.log.entries_for(&user.id).await.unwrap();
        assert_eq!(logins.iter().filter(|e| e.action == AccessAction::Login).count(), 2);

        clock.advance(Duration::hours(25));
        assert!(matches!(
            identity.authenticate(&Credential::Bearer(token)).await,
            Err(AuthError::InvalidToken(_))
        ));
    }

    #[tokio::test]
    async fn should_hide_dev_otp_and_validate_input() {
        let (identity, _clock, _services) = service(false);
        assert!(identity.request_otp("123456789012").await.unwrap().dev_otp.is_none());
        assert!(matches!(
            identity.request_otp("12345").await,
            Err(AuthError::InvalidInput(_))
        ));
        assert!(matches!(
            identity.verify_otp("123456789012", "12ab56", &AccessContext::default()).await,
            Err(AuthError::InvalidInput(_))
        ));
        assert!(matches!(
            identity.verify_otp("999999999999", "123456", &AccessContext::default()).await,
            Err(AuthError::OtpNotRequested)
        ));
    }

    #[tokio::test]
    async fn should_complete_digilocker_handoff_and_logout() {
        let (identity, _clock, _services) = service(false);
        let ctx = AccessContext::default();
        let started = identity.start_digilocker_session().await.unwrap();
        assert!(started.authorization_url.ends_with(&started.session_id));

        let pending = Credential::Session(started.session_id.clone());
        assert!(matches!(identity.authenticate(&pending).await, Err(AuthError::SessionPending)));
        assert!(identity
            .complete_digilocker_session(&started.session_id, "bad", &ctx)
            .await
            .is_err());

        let done = identity
            .complete_digilocker_session(&started.session_id, "good", &ctx)
            .await
            .unwrap();
        assert_eq!(done.user.external_session_id.as_deref(), Some("dl-42"));
        let user = identity.authenticate(&pending).await.unwrap();
        assert_eq!(user.name, "Asha Rao");

        identity.logout(&pending).await.unwrap();
        assert!(matches!(identity.authenticate(&pending).await, Err(AuthError::UnknownSession)));
        assert!(matches!(identity.logout(&pending).await, Err(AuthError::UnknownSession)));
    }

    #[tokio::test]
    async fn should_not_touch_users_for_unknown_session() {
        let (identity, _clock, services) = service(false);
        let ctx = AccessContext::default();
        assert!(matches!(
            identity.complete_digilocker_session("no-such-session", "good", &ctx).await,
            Err(AuthError::UnknownSession)
        ));

        let subject = Identity::DigiLocker("dl-42".into());
        assert!(services.store.find_user_by_identity(&subject).await.unwrap().is_none());

        // A later genuine handoff creates the user with a single login entry.
        let started = identity.start_digilocker_session().await.unwrap();
        let done = identity
            .complete_digilocker_session(&started.session_id, "good", &ctx)
            .await
            .unwrap();
        let entries = services.log.entries_for(&done.user.id).await.unwrap();
        assert_eq!(entries.iter().filter(|e| e.action == AccessAction::Login).count(), 1);
    }

    #[tokio::test]
    async fn should_rename_user_and_reject_blank_name() {
        let (identity, clock, services) = service(true);
        let ctx = AccessContext::default();
        let code = identity.request_otp("123456789012").await.unwrap().dev_otp.unwrap();
        let login = identity.verify_otp("123456789012", &code, &ctx).await.unwrap();
        let user = services.store.get_user(&login.user.id).await.unwrap().unwrap();

        clock.advance(Duration::minutes(3));
        let profile = identity.update_profile(&user, "  Meera Iyer ").await.unwrap();
        assert_eq!(profile.name, "Meera Iyer");
        let stored = services.store.get_user(&user.id).await.unwrap().unwrap();
        assert_eq!(stored.name, "Meera Iyer");
        assert_eq!(stored.updated_at, clock.now());

        assert!(matches!(
            identity.update_profile(&stored, "   ").await,
            Err(AuthError::InvalidInput(_))
        ));
    }
}
