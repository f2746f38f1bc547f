//! Per-user session state.
//!
//! ## Design
//! - Exactly one `UserSession` per user id, created lazily, never deleted
//! - Each session sits behind its own lock; different users never contend
//! - Mutations are write-through to a pluggable `SessionBackend`
//!   (memory or SQLite)
//! - Day rollover of the usage counter happens lazily on first access

pub mod backend;
pub mod store;
pub mod usage;

pub use backend::{MemoryBackend, SessionBackend, SqliteBackend};
pub use store::SessionStore;
pub use usage::UsageCounter;

use serde::{Deserialize, Serialize};

/// Opaque, transport-provided user identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for UserId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<i64> for UserId {
    fn from(id: i64) -> Self {
        Self(id.to_string())
    }
}

/// Mutable per-user state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSession {
    pub user_id: UserId,
    /// Selected translation direction code.
    pub direction: String,
    /// Selected interface language.
    pub ui_language: String,
    /// Current tier name.
    pub tier: String,
    pub usage: UsageCounter,
}

/// Result of an idempotent selection change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Change {
    Updated,
    /// The value was already current; nothing was written.
    Unchanged,
}

/// Errors from session mutations.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("unknown direction: {0}")]
    UnknownDirection(String),

    #[error("unknown UI language: {0}")]
    UnknownUiLanguage(String),

    #[error("invalid access code")]
    PasswordInvalid,

    /// The storage backend failed; the in-memory session was left untouched.
    #[error("session store unavailable: {0:#}")]
    Store(#[from] anyhow::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_id_conversions() {
        assert_eq!(UserId::from(1_300_323_894_i64).as_str(), "1300323894");
        assert_eq!(UserId::from("abc").to_string(), "abc");
        assert_eq!(
            serde_json::to_string(&UserId::new("u1")).unwrap(),
            "\"u1\""
        );
    }

    #[test]
    fn store_error_keeps_cause() {
        let err = SessionError::from(anyhow::anyhow!("disk full"));
        assert!(err.to_string().contains("disk full"));
    }
}
