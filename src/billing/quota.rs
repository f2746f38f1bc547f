//! Daily quota admission and usage status.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;

use crate::catalog::Quota;
use crate::session::{SessionStore, UserId, UserSession};

/// Result of one admission attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaOutcome {
    pub allowed: bool,
    /// Requests charged today, after this attempt.
    pub used: u32,
    pub limit: Quota,
    /// Tier the decision was made under.
    pub tier: String,
}

/// Admission decision plus the session snapshot taken under the same lock.
///
/// The pipeline uses `session` for the direction, so a selection change that
/// lands while a request is in flight does not affect that request.
#[derive(Debug, Clone)]
pub struct Admission {
    pub outcome: QuotaOutcome,
    pub session: UserSession,
}

/// Read-only usage summary for `/status`-style requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusReport {
    pub user_id: UserId,
    pub tier: String,
    pub tier_label: String,
    pub limit: Quota,
    pub used: u32,
    /// `None` when unlimited.
    pub remaining: Option<u32>,
    pub direction: String,
    pub direction_label: String,
    pub ui_language: String,
}

/// Admission policy over the session store and tier catalog.
pub struct QuotaManager {
    store: Arc<SessionStore>,
    unlimited_users: HashSet<UserId>,
    admins: HashSet<UserId>,
}

impl QuotaManager {
    pub fn new(
        store: Arc<SessionStore>,
        unlimited_users: impl IntoIterator<Item = UserId>,
        admins: impl IntoIterator<Item = UserId>,
    ) -> Self {
        Self {
            store,
            unlimited_users: unlimited_users.into_iter().collect(),
            admins: admins.into_iter().collect(),
        }
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    /// Whether `user_id` is exempt from quota accounting.
    pub fn is_unlimited(&self, user_id: &UserId) -> bool {
        self.unlimited_users.contains(user_id)
    }

    pub fn is_admin(&self, user_id: &UserId) -> bool {
        self.admins.contains(user_id)
    }

    /// Effective limit for a session: the unlimited override wins over the
    /// tier, and a tier that is no longer configured counts as the default.
    pub fn limit_for(&self, session: &UserSession) -> Quota {
        if self.is_unlimited(&session.user_id) {
            return Quota::Unlimited;
        }
        self.store
            .catalogs()
            .tiers
            .get_or_default(&session.tier)
            .quota
    }

    /// Charge one request if the user has quota left today.
    ///
    /// Check and increment happen atomically under the user's lock. Denied
    /// and unlimited attempts do not change the counter. Errors only when
    /// the session backend fails to persist the increment.
    pub fn try_consume(&self, user_id: &UserId) -> anyhow::Result<Admission> {
        let catalogs = Arc::clone(self.store.catalogs());

        let admission = self.store.update(user_id, |session| {
            let tier = catalogs.tiers.get_or_default(&session.tier).name.clone();
            let limit = self.limit_for(session);

            let allowed = match limit {
                Quota::Unlimited => true,
                Quota::Limited(quota) => session.usage.try_increment(quota),
            };

            Admission {
                outcome: QuotaOutcome {
                    allowed,
                    used: session.usage.count,
                    limit,
                    tier,
                },
                session: session.clone(),
            }
        })?;

        let outcome = &admission.outcome;
        if outcome.allowed {
            tracing::debug!(
                user_id = %user_id,
                tier = %outcome.tier,
                used = outcome.used,
                limit = %outcome.limit,
                "Request admitted"
            );
        } else {
            tracing::info!(
                user_id = %user_id,
                tier = %outcome.tier,
                used = outcome.used,
                limit = %outcome.limit,
                "Daily quota exceeded"
            );
        }

        Ok(admission)
    }

    /// Usage summary for `user_id`. Applies day rollover, never charges.
    pub fn status(&self, user_id: &UserId) -> StatusReport {
        self.report(self.store.get(user_id))
    }

    /// Like `status`, for a user other than the requester: an id that has
    /// never been seen is reported with defaults and not registered.
    pub fn peek_status(&self, user_id: &UserId) -> StatusReport {
        self.report(self.store.peek(user_id))
    }

    fn report(&self, session: UserSession) -> StatusReport {
        let catalogs = self.store.catalogs();
        let tier = catalogs.tiers.get_or_default(&session.tier);
        let direction = catalogs.direction_or_default(&session.direction);
        let limit = self.limit_for(&session);

        StatusReport {
            user_id: session.user_id.clone(),
            tier: tier.name.clone(),
            tier_label: tier.label.clone(),
            limit,
            used: session.usage.count,
            remaining: limit.remaining(session.usage.count),
            direction: direction.code.clone(),
            direction_label: direction.label.clone(),
            ui_language: session.ui_language,
        }
    }
}
