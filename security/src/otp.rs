// security/src/otp.rs

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use models::{AadhaarNumber, OtpCode};
use rand::Rng;
use tokio::sync::Mutex;

use crate::errors::{AuthError, AuthResult};

#[derive(Debug, Clone)]
struct PendingOtp {
    code: OtpCode,
    expires_at: DateTime<Utc>,
    attempts_left: u32,
}

/// Outstanding one-time passwords, one per Aadhaar number. Requesting a new
/// code replaces the previous one.
pub struct OtpStore {
    pending: Mutex<HashMap<AadhaarNumber, PendingOtp>>,
    ttl: Duration,
    max_attempts: u32,
}

impl OtpStore {
    pub fn new(ttl_minutes: i64, max_attempts: u32) -> Self {
        OtpStore {
            pending: Mutex::new(HashMap::new()),
            ttl: Duration::minutes(ttl_minutes),
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Expired codes for any number are swept out before the new one is
    /// stored.
    pub async fn issue(&self, aadhaar: &AadhaarNumber, now: DateTime<Utc>) -> AuthResult<OtpCode> {
        let value: u32 = rand::thread_rng().gen_range(0..1_000_000);
        let code = OtpCode::new(&format!("{:06}", value))?;
        let mut pending = self.pending.lock().await;
        pending.retain(|_, otp| now < otp.expires_at);
        pending.insert(
            aadhaar.clone(),
            PendingOtp {
                code: code.clone(),
                expires_at: now + self.ttl,
                attempts_left: self.max_attempts,
            },
        );
        Ok(code)
    }

    /// Consumes the code on success. A wrong guess burns one attempt; the
    /// last one discards the code.
    pub async fn verify(&self, aadhaar: &AadhaarNumber, code: &OtpCode, now: DateTime<Utc>) -> AuthResult<()> {
        let mut pending = self.pending.lock().await;
        let entry = pending.get_mut(aadhaar).ok_or(AuthError::OtpNotRequested)?;
        if now >= entry.expires_at {
            pending.remove(aadhaar);
            return Err(AuthError::OtpExpired);
        }
        if entry.code != *code {
            entry.attempts_left = entry.attempts_left.saturating_sub(1);
            if entry.attempts_left == 0 {
                pending.remove(aadhaar);
                return Err(AuthError::TooManyAttempts);
            }
            return Err(AuthError::OtpMismatch);
        }
        pending.remove(aadhaar);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn aadhaar() -> AadhaarNumber {
        AadhaarNumber::new("1234 5678 9012").unwrap()
    }

    fn wrong(code: &OtpCode) -> OtpCode {
        let flipped = if code.as_str() == "000000" { "111111" } else { "000000" };
        OtpCode::new(flipped).unwrap()
    }

    #[tokio::test]
    async fn should_accept_code_once() {
        let store = OtpStore::new(5, 3);
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let code = store.issue(&aadhaar(), now).await.unwrap();
        assert_eq!(code.as_str().len(), 6);
        store.verify(&aadhaar(), &code, now).await.unwrap();
        assert!(matches!(
            store.verify(&aadhaar(), &code, now).await,
            Err(AuthError::OtpNotRequested)
        ));
    }

    #[tokio::test]
    async fn should_expire_code_after_ttl() {
        let store = OtpStore::new(5, 3);
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let code = store.issue(&aadhaar(), now).await.unwrap();
        assert!(matches!(
            store.verify(&aadhaar(), &code, now + Duration::minutes(5)).await,
            Err(AuthError::OtpExpired)
        ));
    }

    #[tokio::test]
    async fn should_discard_code_after_attempt_budget() {
        let store = OtpStore::new(5, 2);
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let code = store.issue(&aadhaar(), now).await.unwrap();
        let bad = wrong(&code);
        assert!(matches!(store.verify(&aadhaar(), &bad, now).await, Err(AuthError::OtpMismatch)));
        assert!(matches!(store.verify(&aadhaar(), &bad, now).await, Err(AuthError::TooManyAttempts)));
        assert!(matches!(
            store.verify(&aadhaar(), &code, now).await,
            Err(AuthError::OtpNotRequested)
        ));
    }

    #[tokio::test]
    async fn should_sweep_expired_codes_on_issue() {
        let store = OtpStore::new(5, 3);
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let other = AadhaarNumber::new("999999999999").unwrap();
        store.issue(&other, now).await.unwrap();
        store.issue(&aadhaar(), now + Duration::minutes(4)).await.unwrap();

        store.issue(&aadhaar(), now + Duration::minutes(6)).await.unwrap();
        let pending = store.pending.lock().await;
        assert_eq!(pending.len(), 1);
        assert!(pending.contains_key(&aadhaar()));
    }
}
