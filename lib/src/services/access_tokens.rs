// lib/src/services/access_tokens.rs

//! Issuance, resolution, extension and revocation of share and emergency
//! tokens.
//!
//! Expiry is evaluated lazily: nothing sweeps tokens in the background.
//! Every resolution reads the clock exactly once and validates and appends
//! its access event inside a single atomic document update, so concurrent
//! resolutions of one token agree on whether it is still usable.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use log::{info, warn};
use models::errors::ValidationError;
use models::medical::{
    AccessAction, AccessChannel, AccessContext, AccessEvent, AccessLogEntry, AccessToken, AccessWindow,
    EmergencyDetails, ExtensionRequest, MedicalRecord, TokenKind, TokenState, TokenUnusable,
};
use rand::Rng;
use serde::Serialize;

use crate::clock::Clock;
use crate::config::{AppConfig, SharingConfig};
use crate::errors::{Result, ServiceError, StoreError};
use crate::services::access_log::AccessLogRecorder;
use crate::services::records::RecordService;
use crate::storage_engine::{edit, Datastore};

const TOKEN_BYTES: usize = 32;
const MAX_ISSUE_ATTEMPTS: usize = 5;

/// Opaque, URL-safe bearer string.
fn new_token_string() -> String {
    let bytes: [u8; TOKEN_BYTES] = rand::thread_rng().gen();
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Drops repeated ids, keeping first occurrences in order.
fn dedupe(ids: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    ids.into_iter().filter(|id| seen.insert(id.clone())).collect()
}

fn unusable(reason: TokenUnusable) -> ServiceError {
    match reason {
        TokenUnusable::Expired => ServiceError::Expired,
        TokenUnusable::Revoked => ServiceError::Revoked,
    }
}

/// Sharing limits and the URL base access links are rendered against.
#[derive(Debug, Clone)]
pub struct TokenPolicy {
    pub default_ttl_minutes: i64,
    pub max_ttl_minutes: i64,
    pub expiring_soon: Duration,
    pub default_link_hours: i64,
    pub public_base_url: String,
}

impl TokenPolicy {
    pub fn from_config(config: &AppConfig) -> Self {
        let SharingConfig {
            default_ttl_minutes,
            max_ttl_minutes,
            expiring_soon_minutes,
            default_link_hours,
        } = config.sharing.clone();
        TokenPolicy {
            default_ttl_minutes,
            max_ttl_minutes,
            expiring_soon: Duration::minutes(expiring_soon_minutes),
            default_link_hours,
            public_base_url: config.public_base_url.trim_end_matches('/').to_string(),
        }
    }

    fn check_minutes(&self, minutes: i64) -> Result<i64> {
        if (1..=self.max_ttl_minutes).contains(&minutes) {
            Ok(minutes)
        } else {
            Err(ValidationError::InvalidDuration {
                min: 1,
                max: self.max_ttl_minutes,
                got: minutes,
            }
            .into())
        }
    }

    pub fn access_url(&self, kind: TokenKind, token: &str) -> String {
        match kind {
            TokenKind::Share => format!("{}/access/{}", self.public_base_url, token),
            TokenKind::Emergency => format!("{}/emergency/{}", self.public_base_url, token),
        }
    }
}

/// What the owner gets back after issuing a token.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuedToken {
    pub id: String,
    pub token: String,
    pub access_url: String,
    pub expires_at: Option<DateTime<Utc>>,
    pub record_count: usize,
}

/// What a token holder sees after a successful resolution.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedAccess {
    pub token_id: String,
    pub kind: TokenKind,
    pub owner_name: Option<String>,
    pub record_ids: Vec<String>,
    pub records: Vec<MedicalRecord>,
    /// Referenced ids whose record no longer exists.
    pub missing_record_ids: Vec<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub remaining_seconds: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub emergency_contact: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub additional_info: Option<String>,
}

/// Owner-facing view of a token with its state computed at listing time.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenSummary {
    pub id: String,
    pub token: String,
    pub kind: TokenKind,
    pub state: TokenState,
    pub access_url: String,
    pub record_ids: Vec<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub remaining_seconds: Option<i64>,
    pub is_active: bool,
    pub access_count: usize,
    pub pending_extension: Option<ExtensionRequest>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub emergency_contact: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub additional_info: Option<String>,
    pub created_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
}

/// One access to an emergency token, flattened for the owner's log view.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EmergencyAccessEvent {
    pub token_id: String,
    pub accessed_at: DateTime<Utc>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub record_count: usize,
}

#[derive(Clone)]
pub struct AccessTokenManager {
    store: Arc<dyn Datastore>,
    records: RecordService,
    log: AccessLogRecorder,
    clock: Arc<dyn Clock>,
    policy: TokenPolicy,
}

impl AccessTokenManager {
    pub fn new(
        store: Arc<dyn Datastore>,
        records: RecordService,
        log: AccessLogRecorder,
        clock: Arc<dyn Clock>,
        policy: TokenPolicy,
    ) -> Self {
        AccessTokenManager { store, records, log, clock, policy }
    }

    pub fn policy(&self) -> &TokenPolicy {
        &self.policy
    }

    /// Validates the selection and ownership. Nothing is written on failure.
    async fn checked_selection(&self, owner: &str, record_ids: Vec<String>) -> Result<Vec<String>> {
        let ids = dedupe(record_ids);
        if ids.is_empty() {
            return Err(ValidationError::EmptyRecordSelection.into());
        }
        self.records.ensure_owned(owner, &ids).await?;
        Ok(ids)
    }

    /// Persists a token built by `build`, drawing a fresh token string when
    /// the previous one collides.
    async fn insert_fresh<F>(&self, build: F) -> Result<AccessToken>
    where
        F: Fn(String) -> AccessToken,
    {
        for _ in 0..MAX_ISSUE_ATTEMPTS {
            let token = build(new_token_string());
            match self.store.insert_token(&token).await {
                Ok(()) => return Ok(token),
                Err(StoreError::Conflict(_)) => warn!("Token string collision, retrying"),
                Err(e) => return Err(e.into()),
            }
        }
        Err(ServiceError::Internal("could not allocate a unique token".to_string()))
    }

    fn issued(&self, token: &AccessToken) -> IssuedToken {
        IssuedToken {
            id: token.id.clone(),
            token: token.token.clone(),
            access_url: self.policy.access_url(token.kind(), &token.token),
            expires_at: token.expires_at.expires_at(),
            record_count: token.record_ids.len(),
        }
    }

    pub async fn issue_share_token(
        &self,
        owner: &str,
        record_ids: Vec<String>,
        ttl_minutes: Option<i64>,
        ctx: &AccessContext,
    ) -> Result<IssuedToken> {
        let ids = self.checked_selection(owner, record_ids).await?;
        let ttl = self
            .policy
            .check_minutes(ttl_minutes.unwrap_or(self.policy.default_ttl_minutes))?;
        let now = self.clock.now();
        let token = self
            .insert_fresh(|token| {
                AccessToken::new_share(owner, token, ids.clone(), AccessWindow::starting_at(now, ttl), now)
            })
            .await?;

        info!("User {} issued share token {} for {} record(s)", owner, token.id, ids.len());
        self.log
            .record(
                AccessLogEntry::new(owner, AccessAction::ShareCreated, ctx, now)
                    .by(owner)
                    .details(format!(
                        "Generated share token for {} records, expires in {} minutes",
                        ids.len(),
                        ttl
                    )),
            )
            .await?;
        Ok(self.issued(&token))
    }

    /// Single-record share link lasting `hours`.
    pub async fn issue_share_link(
        &self,
        owner: &str,
        record_id: &str,
        hours: Option<i64>,
        ctx: &AccessContext,
    ) -> Result<IssuedToken> {
        let hours = hours.unwrap_or(self.policy.default_link_hours);
        self.issue_share_token(owner, vec![record_id.to_string()], Some(hours.saturating_mul(60)), ctx)
            .await
    }

    /// Permanent token. Every referenced record becomes emergency accessible.
    pub async fn issue_emergency_token(
        &self,
        owner: &str,
        record_ids: Vec<String>,
        emergency_contact: String,
        additional_info: String,
        ctx: &AccessContext,
    ) -> Result<IssuedToken> {
        let ids = self.checked_selection(owner, record_ids).await?;
        let now = self.clock.now();
        let details = EmergencyDetails { emergency_contact, additional_info };
        let token = self
            .insert_fresh(|token| AccessToken::new_emergency(owner, token, ids.clone(), details.clone(), now))
            .await?;
        self.records.flag_emergency_accessible(&ids).await?;

        info!("User {} issued emergency token {} for {} record(s)", owner, token.id, ids.len());
        self.log
            .record(
                AccessLogEntry::new(owner, AccessAction::EmergencyCreated, ctx, now)
                    .by(owner)
                    .details(format!("Generated emergency access token for {} records", ids.len())),
            )
            .await?;
        Ok(self.issued(&token))
    }

    async fn find_by_token(&self, token: &str) -> Result<AccessToken> {
        self.store
            .find_token(token)
            .await?
            .ok_or_else(|| ServiceError::not_found("Access token"))
    }

    async fn owned_token(&self, owner: &str, token_id: &str) -> Result<AccessToken> {
        let token = self
            .store
            .get_token(token_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Access token"))?;
        if !token.is_owned_by(owner) {
            warn!("User {} denied access to token {}", owner, token_id);
            return Err(ServiceError::forbidden("Not authorized to manage this token"));
        }
        Ok(token)
    }

    async fn log_denied(
        &self,
        token: &AccessToken,
        action: AccessAction,
        err: &ServiceError,
        ctx: &AccessContext,
        now: DateTime<Utc>,
    ) -> Result<()> {
        warn!("Token {} refused for {:?}: {}", token.id, action, err);
        self.log
            .record(
                AccessLogEntry::new(&token.owner, action, ctx, now)
                    .details(format!("Access denied: {}", err))
                    .failed(),
            )
            .await
    }

    /// Validates the token and records the access. The clock is read once.
    ///
    /// A token presented on the other kind's route is reported as not
    /// found. The logged channel always follows the token's own kind.
    pub async fn resolve_token(
        &self,
        token: &str,
        expected: TokenKind,
        ctx: &AccessContext,
    ) -> Result<ResolvedAccess> {
        let now = self.clock.now();
        let found = self.find_by_token(token).await?;
        if found.kind() != expected {
            warn!("Token {} is a {:?} token, presented as {:?}", found.id, found.kind(), expected);
            return Err(ServiceError::not_found("Access token"));
        }
        let ctx = &AccessContext::new(ctx.origin.clone(), holder_channel(found.kind()));
        let action = match found.kind() {
            TokenKind::Share => AccessAction::ShareAccessed,
            TokenKind::Emergency => AccessAction::EmergencyAccessed,
        };

        let event = AccessEvent::new(now, &ctx.origin);
        let updated = self
            .store
            .update_token_with(
                &found.id,
                edit(move |t: &mut AccessToken| {
                    t.check_usable(now).map_err(unusable)?;
                    t.access_logs.push(event.clone());
                    Ok(())
                }),
            )
            .await;
        let resolved = match updated {
            Ok(Some(t)) => t,
            Ok(None) => return Err(ServiceError::not_found("Access token")),
            Err(err @ (ServiceError::Expired | ServiceError::Revoked)) => {
                self.log_denied(&found, action, &err, ctx, now).await?;
                return Err(err);
            }
            Err(err) => return Err(err),
        };

        let (records, missing_record_ids) = self.records.records_for_token(&resolved.record_ids).await?;
        if !missing_record_ids.is_empty() {
            warn!("Token {} references {} missing record(s)", resolved.id, missing_record_ids.len());
        }
        let owner_name = self.store.get_user(&resolved.owner).await?.map(|u| u.name);

        let details = match resolved.kind() {
            TokenKind::Share => format!("Share token used to view {} records", records.len()),
            TokenKind::Emergency => format!("Emergency access token used to view {} records", records.len()),
        };
        self.log
            .record(AccessLogEntry::new(&resolved.owner, action, ctx, now).details(details))
            .await?;

        let (emergency_contact, additional_info) = match &resolved.emergency {
            Some(e) => (Some(e.emergency_contact.clone()), Some(e.additional_info.clone())),
            None => (None, None),
        };
        Ok(ResolvedAccess {
            token_id: resolved.id.clone(),
            kind: resolved.kind(),
            owner_name,
            record_ids: resolved.record_ids.clone(),
            records,
            missing_record_ids,
            expires_at: resolved.expires_at.expires_at(),
            remaining_seconds: resolved.expires_at.remaining_at(now).map(|d| d.num_seconds()),
            emergency_contact,
            additional_info,
        })
    }

    /// Idempotent: revoking a revoked token succeeds and logs nothing.
    pub async fn revoke_token(&self, owner: &str, token_id: &str, ctx: &AccessContext) -> Result<TokenSummary> {
        self.owned_token(owner, token_id).await?;
        let now = self.clock.now();
        let changed = Arc::new(AtomicBool::new(false));
        let flag = changed.clone();
        let token = self
            .store
            .update_token_with(
                token_id,
                edit(move |t: &mut AccessToken| {
                    flag.store(t.revoke(now), Ordering::SeqCst);
                    Ok(())
                }),
            )
            .await?
            .ok_or_else(|| ServiceError::not_found("Access token"))?;

        if changed.load(Ordering::SeqCst) {
            let (action, details) = match token.kind() {
                TokenKind::Share => (AccessAction::ShareRevoked, "Revoked share token"),
                TokenKind::Emergency => (AccessAction::EmergencyRevoked, "Revoked emergency access token"),
            };
            info!("User {} revoked token {}", owner, token.id);
            self.log
                .record(AccessLogEntry::new(owner, action, ctx, now).by(owner).details(details))
                .await?;
        }
        Ok(self.summarize(&token, now))
    }

    /// Revocation addressed by the token string instead of its id.
    pub async fn revoke_by_token_string(&self, owner: &str, token: &str, ctx: &AccessContext) -> Result<TokenSummary> {
        let found = self.find_by_token(token).await?;
        self.revoke_token(owner, &found.id, ctx).await
    }

    /// Filed by the token holder. A newer request replaces a pending one.
    pub async fn request_extension(&self, token: &str, reason: &str, ctx: &AccessContext) -> Result<ExtensionRequest> {
        let reason = reason.trim().to_string();
        if reason.is_empty() {
            return Err(ValidationError::MissingField("reason").into());
        }
        let now = self.clock.now();
        let found = self.find_by_token(token).await?;
        let request = ExtensionRequest { reason, requested_at: now };
        let pending = request.clone();

        let updated = self
            .store
            .update_token_with(
                &found.id,
                edit(move |t: &mut AccessToken| {
                    t.check_usable(now).map_err(unusable)?;
                    if t.kind() == TokenKind::Emergency {
                        return Err(ValidationError::NotExtendable.into());
                    }
                    t.pending_extension = Some(pending.clone());
                    Ok(())
                }),
            )
            .await;
        match updated {
            Ok(Some(_)) => {}
            Ok(None) => return Err(ServiceError::not_found("Access token")),
            Err(err @ (ServiceError::Expired | ServiceError::Revoked)) => {
                self.log_denied(&found, AccessAction::ExtensionRequested, &err, ctx, now).await?;
                return Err(err);
            }
            Err(err) => return Err(err),
        }

        info!("Extension requested for token {}", found.id);
        self.log
            .record(
                AccessLogEntry::new(&found.owner, AccessAction::ExtensionRequested, ctx, now)
                    .details(format!("Extension requested: {}", request.reason)),
            )
            .await?;
        Ok(request)
    }

    /// Owner's answer to a pending request. Granting pushes the deadline out
    /// by `minutes`; either way the request is cleared.
    pub async fn decide_extension(
        &self,
        owner: &str,
        token_id: &str,
        granted: bool,
        minutes: Option<i64>,
        ctx: &AccessContext,
    ) -> Result<TokenSummary> {
        self.owned_token(owner, token_id).await?;
        let minutes = if granted {
            self.policy
                .check_minutes(minutes.unwrap_or(self.policy.default_ttl_minutes))?
        } else {
            0
        };
        let now = self.clock.now();
        let token = self
            .store
            .update_token_with(
                token_id,
                edit(move |t: &mut AccessToken| {
                    if t.pending_extension.is_none() {
                        return Err(ValidationError::NoPendingExtension.into());
                    }
                    t.check_usable(now).map_err(unusable)?;
                    if granted {
                        t.expires_at.extend(minutes);
                    }
                    t.pending_extension = None;
                    Ok(())
                }),
            )
            .await?
            .ok_or_else(|| ServiceError::not_found("Access token"))?;

        let (action, details) = if granted {
            (AccessAction::ExtensionGranted, format!("Extended access by {} minutes", minutes))
        } else {
            (AccessAction::ExtensionDenied, "Extension request denied".to_string())
        };
        info!("User {} {:?} on token {}", owner, action, token.id);
        self.log
            .record(AccessLogEntry::new(owner, action, ctx, now).by(owner).details(details))
            .await?;
        Ok(self.summarize(&token, now))
    }

    /// The owner's tokens, newest first, optionally narrowed to one kind.
    pub async fn tokens_for_owner(&self, owner: &str, kind: Option<TokenKind>) -> Result<Vec<TokenSummary>> {
        let now = self.clock.now();
        let mut tokens: Vec<AccessToken> = self
            .store
            .tokens_by_owner(owner)
            .await?
            .into_iter()
            .filter(|t| kind.map_or(true, |k| t.kind() == k))
            .collect();
        tokens.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(tokens.iter().map(|t| self.summarize(t, now)).collect())
    }

    /// Every access to the owner's emergency tokens, newest first.
    pub async fn emergency_access_events(&self, owner: &str) -> Result<Vec<EmergencyAccessEvent>> {
        let mut events: Vec<EmergencyAccessEvent> = self
            .store
            .tokens_by_owner(owner)
            .await?
            .into_iter()
            .filter(|t| t.kind() == TokenKind::Emergency)
            .flat_map(|t| {
                let record_count = t.record_ids.len();
                let token_id = t.id.clone();
                t.access_logs.into_iter().map(move |e| EmergencyAccessEvent {
                    token_id: token_id.clone(),
                    accessed_at: e.accessed_at,
                    ip_address: e.ip_address,
                    user_agent: e.user_agent,
                    record_count,
                })
            })
            .collect();
        events.sort_by(|a, b| b.accessed_at.cmp(&a.accessed_at));
        Ok(events)
    }

    pub async fn access_logs(&self, owner: &str) -> Result<Vec<AccessLogEntry>> {
        self.log.entries_for(owner).await
    }

    pub fn summarize(&self, token: &AccessToken, now: DateTime<Utc>) -> TokenSummary {
        let (emergency_contact, additional_info) = match &token.emergency {
            Some(e) => (Some(e.emergency_contact.clone()), Some(e.additional_info.clone())),
            None => (None, None),
        };
        TokenSummary {
            id: token.id.clone(),
            token: token.token.clone(),
            kind: token.kind(),
            state: token.state_at(now, self.policy.expiring_soon),
            access_url: self.policy.access_url(token.kind(), &token.token),
            record_ids: token.record_ids.clone(),
            expires_at: token.expires_at.expires_at(),
            remaining_seconds: token.expires_at.remaining_at(now).map(|d| d.num_seconds()),
            is_active: token.is_active,
            access_count: token.access_logs.len(),
            pending_extension: token.pending_extension.clone(),
            emergency_contact,
            additional_info,
            created_at: token.created_at,
            revoked_at: token.revoked_at,
        }
    }
}

/// Channel an anonymous token holder arrives through.
pub fn holder_channel(kind: TokenKind) -> AccessChannel {
    match kind {
        TokenKind::Share => AccessChannel::Qr,
        TokenKind::Emergency => AccessChannel::Emergency,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::services::{seed, Services};
    use crate::storage_engine::Storage;
    use chrono::TimeZone;
    use models::medical::User;

    struct Fixture {
        services: Services,
        clock: Arc<ManualClock>,
        patient: User,
        ctx: AccessContext,
    }

    async fn fixture() -> Fixture {
        let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap()));
        let mut config = AppConfig::default();
        config.public_base_url = "https://ayu.example/".to_string();
        config.sharing.max_ttl_minutes = 120;
        config.sharing.expiring_soon_minutes = 2;
        let services = Services::new(Storage::in_memory(), &config, clock.clone());
        let patient = seed::seed_demo_data(&services.store, clock.now()).await.unwrap();
        Fixture {
            services,
            clock,
            patient,
            ctx: AccessContext::default(),
        }
    }

    fn ids(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    async fn actions(f: &Fixture) -> Vec<AccessAction> {
        f.services
            .tokens
            .access_logs(&f.patient.id)
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.action)
            .collect()
    }

    #[tokio::test]
    async fn should_resolve_share_token_until_it_expires() {
        let f = fixture().await;
        let tokens = &f.services.tokens;
        let issued = tokens
            .issue_share_token(&f.patient.id, ids(&["rec-001", "rec-002"]), Some(10), &f.ctx)
            .await
            .unwrap();
        assert_eq!(issued.access_url, format!("https://ayu.example/access/{}", issued.token));
        assert_eq!(issued.expires_at, Some(f.clock.now() + Duration::minutes(10)));

        let resolved = tokens.resolve_token(&issued.token, TokenKind::Share, &f.ctx).await.unwrap();
        assert_eq!(resolved.record_ids, ids(&["rec-001", "rec-002"]));
        let got: Vec<_> = resolved.records.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(got, vec!["rec-001", "rec-002"]);
        assert!(resolved.missing_record_ids.is_empty());
        assert_eq!(resolved.owner_name.as_deref(), Some("Demo Patient"));

        let accessed = actions(&f).await.iter().filter(|a| **a == AccessAction::ShareAccessed).count();
        assert_eq!(accessed, 1);

        f.clock.advance(Duration::minutes(11));
        assert!(matches!(tokens.resolve_token(&issued.token, TokenKind::Share, &f.ctx).await, Err(ServiceError::Expired)));
    }

    #[tokio::test]
    async fn should_treat_deadline_as_expired() {
        let f = fixture().await;
        let issued = f
            .services
            .tokens
            .issue_share_token(&f.patient.id, ids(&["rec-001"]), Some(5), &f.ctx)
            .await
            .unwrap();
        f.clock.advance(Duration::minutes(5));
        assert!(matches!(
            f.services.tokens.resolve_token(&issued.token, TokenKind::Share, &f.ctx).await,
            Err(ServiceError::Expired)
        ));
    }

    #[tokio::test]
    async fn should_keep_emergency_token_alive_and_flag_records() {
        let f = fixture().await;
        let tokens = &f.services.tokens;
        let issued = tokens
            .issue_emergency_token(
                &f.patient.id,
                ids(&["rec-003"]),
                "Dr. Patel: +91 98765 43210".to_string(),
                "Allergic to penicillin".to_string(),
                &f.ctx,
            )
            .await
            .unwrap();
        assert!(issued.expires_at.is_none());
        assert_eq!(issued.access_url, format!("https://ayu.example/emergency/{}", issued.token));

        let record = f.services.store.get_record("rec-003").await.unwrap().unwrap();
        assert!(record.is_emergency_accessible);

        f.clock.advance(Duration::days(400));
        let resolved = tokens.resolve_token(&issued.token, TokenKind::Emergency, &f.ctx).await.unwrap();
        assert_eq!(resolved.kind, TokenKind::Emergency);
        assert_eq!(resolved.emergency_contact.as_deref(), Some("Dr. Patel: +91 98765 43210"));
        assert_eq!(resolved.records.len(), 1);

        let events = tokens.emergency_access_events(&f.patient.id).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].record_count, 1);
    }

    #[tokio::test]
    async fn should_refuse_revoked_token_and_revoke_idempotently() {
        let f = fixture().await;
        let tokens = &f.services.tokens;
        let issued = tokens
            .issue_share_token(&f.patient.id, ids(&["rec-001"]), Some(30), &f.ctx)
            .await
            .unwrap();

        let first = tokens.revoke_token(&f.patient.id, &issued.id, &f.ctx).await.unwrap();
        assert_eq!(first.state, TokenState::Revoked);
        assert!(matches!(tokens.resolve_token(&issued.token, TokenKind::Share, &f.ctx).await, Err(ServiceError::Revoked)));

        let second = tokens.revoke_token(&f.patient.id, &issued.id, &f.ctx).await.unwrap();
        assert!(!second.is_active);
        assert_eq!(second.revoked_at, first.revoked_at);
        let revocations = actions(&f).await.iter().filter(|a| **a == AccessAction::ShareRevoked).count();
        assert_eq!(revocations, 1);

        // Past the deadline the expiry wins over the revocation.
        f.clock.advance(Duration::minutes(31));
        assert!(matches!(tokens.resolve_token(&issued.token, TokenKind::Share, &f.ctx).await, Err(ServiceError::Expired)));
    }

    #[tokio::test]
    async fn should_reject_empty_or_foreign_selection_without_creating_tokens() {
        let f = fixture().await;
        let tokens = &f.services.tokens;
        assert!(matches!(
            tokens.issue_share_token(&f.patient.id, vec![], Some(10), &f.ctx).await,
            Err(ServiceError::Validation(ValidationError::EmptyRecordSelection))
        ));

        let stranger = "someone-else";
        assert!(matches!(
            tokens.issue_share_token(stranger, ids(&["rec-001"]), Some(10), &f.ctx).await,
            Err(ServiceError::Forbidden(_))
        ));
        assert!(matches!(
            tokens
                .issue_share_token(&f.patient.id, ids(&["rec-001", "rec-404"]), Some(10), &f.ctx)
                .await,
            Err(ServiceError::Forbidden(_))
        ));
        assert!(matches!(
            tokens.issue_share_token(&f.patient.id, ids(&["rec-001"]), Some(0), &f.ctx).await,
            Err(ServiceError::Validation(ValidationError::InvalidDuration { .. }))
        ));
        assert!(tokens.tokens_for_owner(&f.patient.id, None).await.unwrap().is_empty());
        assert!(tokens.tokens_for_owner(stranger, None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn should_forbid_revocation_by_non_owner() {
        let f = fixture().await;
        let tokens = &f.services.tokens;
        let issued = tokens
            .issue_share_token(&f.patient.id, ids(&["rec-001"]), None, &f.ctx)
            .await
            .unwrap();
        assert!(matches!(
            tokens.revoke_token("intruder", &issued.id, &f.ctx).await,
            Err(ServiceError::Forbidden(_))
        ));
        assert!(matches!(
            tokens.revoke_token(&f.patient.id, "no-such-token", &f.ctx).await,
            Err(ServiceError::NotFound(_))
        ));
        assert!(matches!(tokens.resolve_token("no-such-token", TokenKind::Share, &f.ctx).await, Err(ServiceError::NotFound(_))));
    }

    #[tokio::test]
    async fn should_only_resolve_token_on_its_own_route() {
        let f = fixture().await;
        let tokens = &f.services.tokens;
        let share = tokens
            .issue_share_token(&f.patient.id, ids(&["rec-001"]), Some(10), &f.ctx)
            .await
            .unwrap();
        let emergency = tokens
            .issue_emergency_token(&f.patient.id, ids(&["rec-003"]), "Dr. Patel".to_string(), String::new(), &f.ctx)
            .await
            .unwrap();

        assert!(matches!(
            tokens.resolve_token(&share.token, TokenKind::Emergency, &f.ctx).await,
            Err(ServiceError::NotFound(_))
        ));
        assert!(matches!(
            tokens.resolve_token(&emergency.token, TokenKind::Share, &f.ctx).await,
            Err(ServiceError::NotFound(_))
        ));
        let token = f.services.store.get_token(&share.id).await.unwrap().unwrap();
        assert!(token.access_logs.is_empty());

        // The caller's channel is ignored in favour of the token's kind.
        let web = AccessContext::new(Default::default(), AccessChannel::Web);
        tokens.resolve_token(&share.token, TokenKind::Share, &web).await.unwrap();
        let entry = tokens
            .access_logs(&f.patient.id)
            .await
            .unwrap()
            .into_iter()
            .find(|e| e.action == AccessAction::ShareAccessed)
            .unwrap();
        assert_eq!(entry.channel, AccessChannel::Qr);
    }

    #[tokio::test]
    async fn should_report_deleted_records_as_missing() {
        let f = fixture().await;
        let issued = f
            .services
            .tokens
            .issue_share_token(&f.patient.id, ids(&["rec-001", "rec-002"]), Some(10), &f.ctx)
            .await
            .unwrap();
        f.services.records.delete_record(&f.patient.id, "rec-002", &f.ctx).await.unwrap();

        let resolved = f.services.tokens.resolve_token(&issued.token, TokenKind::Share, &f.ctx).await.unwrap();
        assert_eq!(resolved.records.len(), 1);
        assert_eq!(resolved.missing_record_ids, ids(&["rec-002"]));
    }

    #[tokio::test]
    async fn should_negotiate_extension_between_holder_and_owner() {
        let f = fixture().await;
        let tokens = &f.services.tokens;
        let issued = tokens
            .issue_share_token(&f.patient.id, ids(&["rec-001"]), Some(10), &f.ctx)
            .await
            .unwrap();

        assert!(matches!(
            tokens.decide_extension(&f.patient.id, &issued.id, true, Some(30), &f.ctx).await,
            Err(ServiceError::Validation(ValidationError::NoPendingExtension))
        ));
        assert!(matches!(
            tokens.request_extension(&issued.token, "   ", &f.ctx).await,
            Err(ServiceError::Validation(ValidationError::MissingField("reason")))
        ));

        tokens.request_extension(&issued.token, "first", &f.ctx).await.unwrap();
        tokens.request_extension(&issued.token, "need more time", &f.ctx).await.unwrap();
        let listed = tokens.tokens_for_owner(&f.patient.id, Some(TokenKind::Share)).await.unwrap();
        assert_eq!(listed[0].pending_extension.as_ref().unwrap().reason, "need more time");

        f.clock.advance(Duration::minutes(9));
        let summary = tokens
            .decide_extension(&f.patient.id, &issued.id, true, Some(30), &f.ctx)
            .await
            .unwrap();
        assert!(summary.pending_extension.is_none());
        assert_eq!(summary.state, TokenState::Active);
        assert_eq!(summary.remaining_seconds, Some(31 * 60));

        tokens.request_extension(&issued.token, "again", &f.ctx).await.unwrap();
        let denied = tokens
            .decide_extension(&f.patient.id, &issued.id, false, None, &f.ctx)
            .await
            .unwrap();
        assert_eq!(denied.expires_at, summary.expires_at);
        assert!(denied.pending_extension.is_none());

        let log = actions(&f).await;
        assert!(log.contains(&AccessAction::ExtensionGranted));
        assert!(log.contains(&AccessAction::ExtensionDenied));
    }

    #[tokio::test]
    async fn should_fail_decision_once_pending_request_lapsed() {
        let f = fixture().await;
        let tokens = &f.services.tokens;
        let issued = tokens
            .issue_share_token(&f.patient.id, ids(&["rec-001"]), Some(10), &f.ctx)
            .await
            .unwrap();
        tokens.request_extension(&issued.token, "please", &f.ctx).await.unwrap();
        f.clock.advance(Duration::minutes(10));
        assert!(matches!(
            tokens.decide_extension(&f.patient.id, &issued.id, true, Some(10), &f.ctx).await,
            Err(ServiceError::Expired)
        ));
        assert!(matches!(
            tokens.request_extension(&issued.token, "please", &f.ctx).await,
            Err(ServiceError::Expired)
        ));
    }

    #[tokio::test]
    async fn should_reject_extension_of_emergency_and_revoked_tokens() {
        let f = fixture().await;
        let tokens = &f.services.tokens;
        let emergency = tokens
            .issue_emergency_token(&f.patient.id, ids(&["rec-005"]), "ICE".into(), String::new(), &f.ctx)
            .await
            .unwrap();
        assert!(matches!(
            tokens.request_extension(&emergency.token, "why not", &f.ctx).await,
            Err(ServiceError::Validation(ValidationError::NotExtendable))
        ));

        let share = tokens
            .issue_share_token(&f.patient.id, ids(&["rec-001"]), Some(10), &f.ctx)
            .await
            .unwrap();
        tokens.request_extension(&share.token, "please", &f.ctx).await.unwrap();
        tokens.revoke_by_token_string(&f.patient.id, &share.token, &f.ctx).await.unwrap();
        assert!(matches!(
            tokens.decide_extension(&f.patient.id, &share.id, true, Some(10), &f.ctx).await,
            Err(ServiceError::Revoked)
        ));
    }

    #[tokio::test]
    async fn should_report_expiring_soon_in_listing() {
        let f = fixture().await;
        let tokens = &f.services.tokens;
        tokens
            .issue_share_token(&f.patient.id, ids(&["rec-001"]), Some(10), &f.ctx)
            .await
            .unwrap();
        f.clock.advance(Duration::minutes(9));
        let listed = tokens.tokens_for_owner(&f.patient.id, None).await.unwrap();
        assert_eq!(listed[0].state, TokenState::ExpiringSoon);
        assert_eq!(listed[0].remaining_seconds, Some(60));
    }

    #[tokio::test]
    async fn should_append_every_concurrent_access() {
        let f = fixture().await;
        let tokens = f.services.tokens.clone();
        let issued = tokens
            .issue_share_token(&f.patient.id, ids(&["rec-001"]), Some(10), &f.ctx)
            .await
            .unwrap();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let tokens = tokens.clone();
            let token = issued.token.clone();
            handles.push(tokio::spawn(async move {
                tokens.resolve_token(&token, TokenKind::Share, &AccessContext::default()).await.map(|_| ())
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        let listed = tokens.tokens_for_owner(&f.patient.id, None).await.unwrap();
        assert_eq!(listed[0].access_count, 8);
    }
}
