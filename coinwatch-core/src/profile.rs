//! The authenticated user and premium entitlement.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// Profile returned by the profile endpoint.
///
/// Only `username` and `email` are guaranteed. The extended fields are sent by
/// some backend versions and are kept when present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    /// Login name.
    pub username: String,
    /// Email address.
    #[serde(default)]
    pub email: String,
    /// Premium flag as stored by the backend.
    #[serde(default)]
    pub is_premium: bool,
    /// Premium expiry timestamp as sent by the backend.
    #[serde(default)]
    pub premium_expires_at: Option<String>,
    /// Staff (admin) flag.
    #[serde(default)]
    pub is_staff: bool,
    /// Numeric user id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    /// Given name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    /// Family name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    /// Registration timestamp.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_joined: Option<String>,
    /// Last login timestamp.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_login: Option<String>,
}

/// Client-computed premium entitlement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PremiumStatus {
    /// `is_premium` is false.
    Inactive,
    /// `is_premium` is true but the expiry is in the past.
    Expired {
        /// When premium ended.
        expired_at: DateTime<Utc>,
    },
    /// Premium is active, optionally until `expires_at`.
    Active {
        /// When premium ends, if it ever does.
        expires_at: Option<DateTime<Utc>>,
    },
}

impl PremiumStatus {
    /// Returns `true` for [`PremiumStatus::Active`].
    pub fn is_active(&self) -> bool {
        matches!(self, PremiumStatus::Active { .. })
    }

    /// Returns `true` for [`PremiumStatus::Expired`].
    pub fn is_expired(&self) -> bool {
        matches!(self, PremiumStatus::Expired { .. })
    }
}

impl UserProfile {
    /// Parses `premium_expires_at`.
    ///
    /// Accepts RFC 3339, a naive `YYYY-MM-DDTHH:MM:SS` (read as UTC) or a bare
    /// date (midnight UTC). Anything else counts as no expiry.
    pub fn premium_expiry(&self) -> Option<DateTime<Utc>> {
        let raw = self.premium_expires_at.as_deref()?.trim();
        if raw.is_empty() {
            return None;
        }
        if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
            return Some(parsed.with_timezone(&Utc));
        }
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
            return Some(naive.and_utc());
        }
        NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .ok()
            .and_then(|date| date.and_hms_opt(0, 0, 0))
            .map(|naive| naive.and_utc())
    }

    /// Premium status at `now`. Expired iff the expiry is strictly before
    /// `now`.
    pub fn premium_status_at(&self, now: DateTime<Utc>) -> PremiumStatus {
        if !self.is_premium {
            return PremiumStatus::Inactive;
        }
        match self.premium_expiry() {
            Some(expiry) if expiry < now => PremiumStatus::Expired { expired_at: expiry },
            expires_at => PremiumStatus::Active { expires_at },
        }
    }

    /// Premium status right now.
    pub fn premium_status(&self) -> PremiumStatus {
        self.premium_status_at(Utc::now())
    }

    /// Shorthand for `premium_status_at(now).is_active()`.
    pub fn has_premium_at(&self, now: DateTime<Utc>) -> bool {
        self.premium_status_at(now).is_active()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn user(is_premium: bool, expires: Option<&str>) -> UserProfile {
        serde_json::from_value(serde_json::json!({
            "username": "sara",
            "email": "sara@example.com",
            "is_premium": is_premium,
            "premium_expires_at": expires,
        }))
        .unwrap()
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn past_expiry_is_not_premium() {
        let status = user(true, Some("2025-05-31T23:59:59Z")).premium_status_at(now());
        assert!(status.is_expired());
        assert!(!status.is_active());
    }

    #[test]
    fn future_or_missing_expiry_is_premium() {
        assert!(user(true, Some("2025-06-02")).has_premium_at(now()));
        assert!(user(true, None).has_premium_at(now()));
        assert_eq!(
            user(false, Some("2030-01-01T00:00:00Z")).premium_status_at(now()),
            PremiumStatus::Inactive
        );
    }

    #[test]
    fn expiry_equal_to_now_is_still_active() {
        let status = user(true, Some("2025-06-01T12:00:00+00:00")).premium_status_at(now());
        assert!(status.is_active());
    }

    #[test]
    fn unparseable_expiry_counts_as_none() {
        let profile = user(true, Some("not a date"));
        assert_eq!(profile.premium_expiry(), None);
        assert!(profile.has_premium_at(now()));
    }

    #[test]
    fn naive_timestamps_read_as_utc() {
        let profile = user(true, Some("2025-06-01T11:00:00.250"));
        assert!(profile.premium_status_at(now()).is_expired());
    }
}
