// security/src/sessions.rs

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use log::debug;
use models::new_id;
use tokio::sync::RwLock;

use crate::errors::{AuthError, AuthResult};

/// How long a started DigiLocker handoff may stay unanswered.
const PENDING_SESSION_MINUTES: i64 = 15;

#[derive(Debug, Clone, PartialEq, Eq)]
enum SessionState {
    Pending { started_at: DateTime<Utc> },
    Active { user_id: String },
}

impl SessionState {
    /// A pending handoff past its window can never be activated.
    fn is_stale(&self, now: DateTime<Utc>) -> bool {
        match self {
            SessionState::Pending { started_at } => now >= *started_at + Duration::minutes(PENDING_SESSION_MINUTES),
            SessionState::Active { .. } => false,
        }
    }
}

/// Server-side DigiLocker sessions, addressed by the `x-session-id` header.
#[derive(Default)]
pub struct SessionStore {
    sessions: RwLock<HashMap<String, SessionState>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a pending handoff. Abandoned handoffs are dropped here.
    pub async fn start(&self, now: DateTime<Utc>) -> String {
        let id = new_id();
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, state| !state.is_stale(now));
        if sessions.len() < before {
            debug!("Dropped {} abandoned session(s)", before - sessions.len());
        }
        sessions.insert(id.clone(), SessionState::Pending { started_at: now });
        id
    }

    /// Succeeds only for a pending session still within its handoff window.
    pub async fn ensure_pending(&self, id: &str, now: DateTime<Utc>) -> AuthResult<()> {
        match self.sessions.read().await.get(id) {
            Some(state @ SessionState::Pending { .. }) if !state.is_stale(now) => Ok(()),
            _ => Err(AuthError::UnknownSession),
        }
    }

    /// Binds a pending session to `user_id`. Only pending sessions started
    /// within the handoff window can be activated.
    pub async fn activate(&self, id: &str, user_id: &str, now: DateTime<Utc>) -> AuthResult<()> {
        let mut sessions = self.sessions.write().await;
        let within_window = match sessions.get(id) {
            Some(state @ SessionState::Pending { .. }) => Some(!state.is_stale(now)),
            _ => None,
        };
        match within_window {
            Some(true) => {
                sessions.insert(id.to_string(), SessionState::Active { user_id: user_id.to_string() });
                debug!("Session {} activated", id);
                Ok(())
            }
            Some(false) => {
                sessions.remove(id);
                Err(AuthError::UnknownSession)
            }
            None => Err(AuthError::UnknownSession),
        }
    }

    pub async fn user_for(&self, id: &str) -> AuthResult<String> {
        match self.sessions.read().await.get(id) {
            Some(SessionState::Active { user_id, .. }) => Ok(user_id.clone()),
            Some(SessionState::Pending { .. }) => Err(AuthError::SessionPending),
            None => Err(AuthError::UnknownSession),
        }
    }

    /// Returns whether the session existed.
    pub async fn end(&self, id: &str) -> bool {
        self.sessions.write().await.remove(id).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[tokio::test]
    async fn should_move_from_pending_to_active() {
        let store = SessionStore::new();
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let id = store.start(now).await;
        assert!(matches!(store.user_for(&id).await, Err(AuthError::SessionPending)));

        store.activate(&id, "user-7", now).await.unwrap();
        assert_eq!(store.user_for(&id).await.unwrap(), "user-7");
        assert!(matches!(store.activate(&id, "user-8", now).await, Err(AuthError::UnknownSession)));

        assert!(store.end(&id).await);
        assert!(matches!(store.user_for(&id).await, Err(AuthError::UnknownSession)));
    }

    #[tokio::test]
    async fn should_refuse_stale_handoff() {
        let store = SessionStore::new();
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let id = store.start(now).await;
        let late = now + Duration::minutes(PENDING_SESSION_MINUTES);
        assert!(matches!(store.ensure_pending(&id, late).await, Err(AuthError::UnknownSession)));
        assert!(matches!(store.activate(&id, "user-7", late).await, Err(AuthError::UnknownSession)));
        assert!(!store.end(&id).await);
    }

    #[tokio::test]
    async fn should_check_pending_without_consuming() {
        let store = SessionStore::new();
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let id = store.start(now).await;
        store.ensure_pending(&id, now).await.unwrap();
        store.ensure_pending(&id, now).await.unwrap();
        assert!(matches!(store.ensure_pending("nope", now).await, Err(AuthError::UnknownSession)));

        store.activate(&id, "user-7", now).await.unwrap();
        assert!(matches!(store.ensure_pending(&id, now).await, Err(AuthError::UnknownSession)));
    }

    #[tokio::test]
    async fn should_drop_abandoned_handoffs_on_start() {
        let store = SessionStore::new();
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let abandoned = store.start(now).await;
        let active = store.start(now).await;
        store.activate(&active, "user-7", now).await.unwrap();

        let later = now + Duration::minutes(PENDING_SESSION_MINUTES + 1);
        let fresh = store.start(later).await;

        let sessions = store.sessions.read().await;
        assert_eq!(sessions.len(), 2);
        assert!(!sessions.contains_key(&abandoned));
        assert!(sessions.contains_key(&active));
        assert!(sessions.contains_key(&fresh));
    }
}
