// models/src/medical/access_window.rs

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// The expiry rule shared by per-user grants and bearer access tokens.
///
/// `None` means the access never lapses by time and can only be ended by an
/// explicit revocation. A window is expired from the instant `now` reaches
/// the deadline; it is never re-checked in the background.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccessWindow(Option<DateTime<Utc>>);

impl AccessWindow {
    pub fn permanent() -> Self {
        AccessWindow(None)
    }

    pub fn until(deadline: DateTime<Utc>) -> Self {
        AccessWindow(Some(deadline))
    }

    pub fn starting_at(now: DateTime<Utc>, minutes: i64) -> Self {
        AccessWindow(Some(now + Duration::minutes(minutes)))
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.0
    }

    pub fn is_permanent(&self) -> bool {
        self.0.is_none()
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        matches!(self.0, Some(deadline) if now >= deadline)
    }

    /// Time left before expiry, clamped at zero. `None` for permanent windows.
    pub fn remaining_at(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.0.map(|deadline| (deadline - now).max(Duration::zero()))
    }

    /// Pushes the deadline back. Permanent windows stay permanent.
    pub fn extend(&mut self, minutes: i64) {
        if let Some(deadline) = self.0.as_mut() {
            *deadline += Duration::minutes(minutes);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::AccessWindow;
    use chrono::{Duration, TimeZone, Utc};

    #[test]
    fn expires_exactly_at_deadline() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap();
        let window = AccessWindow::starting_at(start, 10);
        assert!(!window.is_expired_at(start + Duration::minutes(9)));
        assert!(window.is_expired_at(start + Duration::minutes(10)));
        assert_eq!(window.remaining_at(start + Duration::minutes(11)), Some(Duration::zero()));
    }

    #[test]
    fn permanent_window_never_expires_or_extends() {
        let mut window = AccessWindow::permanent();
        let far = Utc.with_ymd_and_hms(2099, 1, 1, 0, 0, 0).unwrap();
        assert!(!window.is_expired_at(far));
        window.extend(30);
        assert!(window.is_permanent());
        assert_eq!(window.remaining_at(far), None);
    }
}
