//! Token records and provider token responses.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A persisted access/refresh token pair.
///
/// `id` is stable across in-place refreshes and new for every authorization.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRecord {
    pub id: Uuid,
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Validity window in seconds, as reported by the provider.
    pub expires_in: i64,
    pub issued_at: DateTime<Utc>,
}

impl TokenRecord {
    /// Build a new record from a code exchange response.
    #[must_use]
    pub fn issue(response: TokenResponse, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            access_token: response.access_token,
            refresh_token: response.refresh_token.filter(|t| !t.is_empty()),
            expires_in: response.expires_in,
            issued_at: now,
        }
    }

    /// Apply a refresh response in place, keeping the prior refresh token when
    /// the provider does not rotate it.
    #[must_use]
    pub fn refreshed(&self, response: TokenResponse, now: DateTime<Utc>) -> Self {
        Self {
            id: self.id,
            access_token: response.access_token,
            refresh_token: response
                .refresh_token
                .filter(|t| !t.is_empty())
                .or_else(|| self.refresh_token.clone()),
            expires_in: response.expires_in,
            issued_at: now,
        }
    }

    /// Unix second at which this record stops being valid.
    #[must_use]
    pub fn expires_at(&self) -> i64 {
        self.issued_at.timestamp().saturating_add(self.expires_in)
    }

    /// A record is expired iff `now >= issued_at + expires_in`, in whole seconds.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now.timestamp() >= self.expires_at()
    }

    /// The refresh token, if one is usable.
    #[must_use]
    pub fn refresh_token(&self) -> Option<&str> {
        self.refresh_token.as_deref().filter(|t| !t.is_empty())
    }
}

impl std::fmt::Debug for TokenRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenRecord")
            .field("id", &self.id)
            .field("has_refresh_token", &self.refresh_token().is_some())
            .field("expires_in", &self.expires_in)
            .field("issued_at", &self.issued_at)
            .finish()
    }
}

/// JSON body returned by the provider token endpoint.
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    pub expires_in: i64,
}

impl std::fmt::Debug for TokenResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenResponse")
            .field("has_refresh_token", &self.refresh_token.is_some())
            .field("expires_in", &self.expires_in)
            .finish()
    }
}

/// Token status for display. Carries no secrets.
#[derive(Debug, Clone, Serialize)]
pub struct TokenInfo {
    pub issued_at: DateTime<Utc>,
    pub expires_in_secs: i64,
    pub is_expired: bool,
    pub can_refresh: bool,
}

impl TokenInfo {
    #[must_use]
    pub fn from_record(record: &TokenRecord, now: DateTime<Utc>) -> Self {
        Self {
            issued_at: record.issued_at,
            expires_in_secs: (record.expires_at() - now.timestamp()).max(0),
            is_expired: record.is_expired(now),
            can_refresh: record.refresh_token().is_some(),
        }
    }
}
