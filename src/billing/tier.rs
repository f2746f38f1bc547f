//! Access-code driven tier changes.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::catalog::Tier;
use crate::session::{SessionError, SessionStore, UserId};

/// A tier switch applied by `TierResolver::apply_code`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierChange {
    pub previous: String,
    pub tier: Tier,
}

/// Validates access codes and applies the tier they grant.
pub struct TierResolver {
    store: Arc<SessionStore>,
}

impl TierResolver {
    pub fn new(store: Arc<SessionStore>) -> Self {
        Self { store }
    }

    /// Tier granted by `code`. Pure lookup.
    pub fn resolve(&self, code: &str) -> Option<&Tier> {
        self.store.catalogs().tiers.resolve_code(code)
    }

    /// Switch the user to the tier granted by `code` and clear today's usage.
    ///
    /// Re-entering a code for the current tier still clears usage. An invalid
    /// code leaves the session untouched.
    pub fn apply_code(&self, user_id: &UserId, code: &str) -> Result<TierChange, SessionError> {
        let Some(tier) = self.resolve(code) else {
            tracing::info!(user_id = %user_id, "Invalid access code submitted");
            return Err(SessionError::PasswordInvalid);
        };

        let change = self.store.update(user_id, |session| {
            let previous = std::mem::replace(&mut session.tier, tier.name.clone());
            session.usage.clear();
            TierChange {
                previous,
                tier: tier.clone(),
            }
        })?;

        tracing::info!(
            user_id = %user_id,
            from = %change.previous,
            to = %change.tier.name,
            "Tier changed by access code"
        );
        Ok(change)
    }
}
