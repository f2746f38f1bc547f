//! Keyed session store with per-user locking.

use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;

use super::{Change, SessionBackend, SessionError, UsageCounter, UserId, UserSession};
use crate::catalog::Catalogs;
use crate::util::Clock;

type SessionCell = Arc<Mutex<UserSession>>;

/// Owns every user's session.
///
/// The outer map lock is held only long enough to find or insert a cell;
/// all reads and mutations of a session happen under that session's own
/// lock, so requests from different users proceed in parallel while
/// requests from the same user are serialized.
pub struct SessionStore {
    sessions: RwLock<HashMap<UserId, SessionCell>>,
    backend: Arc<dyn SessionBackend>,
    catalogs: Arc<Catalogs>,
    clock: Arc<dyn Clock>,
}

impl SessionStore {
    pub fn new(
        backend: Arc<dyn SessionBackend>,
        catalogs: Arc<Catalogs>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            backend,
            catalogs,
            clock,
        }
    }

    pub fn catalogs(&self) -> &Arc<Catalogs> {
        &self.catalogs
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    /// Sessions currently held in memory.
    pub fn user_count(&self) -> usize {
        self.sessions.read().len()
    }

    /// Current session of `user_id`, created with defaults on first contact.
    ///
    /// Never fails: a backend load error is logged and the user starts from
    /// defaults. The returned value is a snapshot; later changes to the
    /// session do not affect it.
    pub fn get(&self, user_id: &UserId) -> UserSession {
        let cell = self.cell(user_id);
        let mut session = cell.lock();
        session.usage.roll_over(self.clock.today());
        session.clone()
    }

    /// Current session of `user_id` without registering it.
    ///
    /// A user already in memory is read under their lock; anyone else is
    /// loaded from the backend (or defaulted) and not kept, so looking a
    /// user up does not count as their first contact.
    pub fn peek(&self, user_id: &UserId) -> UserSession {
        let cell = self.sessions.read().get(user_id).map(Arc::clone);
        let mut session = match cell {
            Some(cell) => cell.lock().clone(),
            None => self.load_or_default(user_id),
        };
        session.usage.roll_over(self.clock.today());
        session
    }

    /// Apply `mutate` to the user's session atomically.
    ///
    /// The closure runs on a draft under the user's lock, after day rollover.
    /// When the draft differs from the current session it is saved to the
    /// backend first and only then committed in memory, so a failed save
    /// leaves the session exactly as it was.
    pub fn update<R>(
        &self,
        user_id: &UserId,
        mutate: impl FnOnce(&mut UserSession) -> R,
    ) -> anyhow::Result<R> {
        let cell = self.cell(user_id);
        let mut session = cell.lock();
        session.usage.roll_over(self.clock.today());

        let mut draft = session.clone();
        let result = mutate(&mut draft);

        if draft != *session {
            if let Err(e) = self.backend.save(&draft) {
                tracing::error!(
                    user_id = %user_id,
                    backend = self.backend.name(),
                    "Session save failed: {e:#}"
                );
                return Err(e);
            }
            *session = draft;
        }

        Ok(result)
    }

    /// Select a translation direction. Selecting the current one is reported
    /// as `Change::Unchanged` and writes nothing.
    pub fn set_direction(&self, user_id: &UserId, code: &str) -> Result<Change, SessionError> {
        if !self.catalogs.directions.contains(code) {
            return Err(SessionError::UnknownDirection(code.to_string()));
        }

        let change = self.update(user_id, |s| {
            if s.direction == code {
                Change::Unchanged
            } else {
                s.direction = code.to_string();
                Change::Updated
            }
        })?;

        tracing::debug!(user_id = %user_id, direction = code, ?change, "Direction selected");
        Ok(change)
    }

    /// Select an interface language, same contract as `set_direction`.
    pub fn set_ui_language(&self, user_id: &UserId, code: &str) -> Result<Change, SessionError> {
        if !self.catalogs.is_ui_language(code) {
            return Err(SessionError::UnknownUiLanguage(code.to_string()));
        }

        let change = self.update(user_id, |s| {
            if s.ui_language == code {
                Change::Unchanged
            } else {
                s.ui_language = code.to_string();
                Change::Updated
            }
        })?;

        tracing::debug!(user_id = %user_id, ui_language = code, ?change, "UI language selected");
        Ok(change)
    }

    // ── Internals ────────────────────────────────────────────────

    fn cell(&self, user_id: &UserId) -> SessionCell {
        if let Some(cell) = self.sessions.read().get(user_id) {
            return Arc::clone(cell);
        }

        // Load outside the map lock; if another request raced us the first
        // inserted cell wins and this one is dropped.
        let session = self.load_or_default(user_id);
        let mut sessions = self.sessions.write();
        Arc::clone(
            sessions
                .entry(user_id.clone())
                .or_insert_with(|| Arc::new(Mutex::new(session))),
        )
    }

    fn load_or_default(&self, user_id: &UserId) -> UserSession {
        match self.backend.load(user_id) {
            Ok(Some(mut session)) => {
                self.sanitize(&mut session);
                session
            }
            Ok(None) => {
                tracing::debug!(user_id = %user_id, "New session");
                self.default_session(user_id)
            }
            Err(e) => {
                tracing::error!(
                    user_id = %user_id,
                    backend = self.backend.name(),
                    "Session load failed, starting from defaults: {e:#}"
                );
                self.default_session(user_id)
            }
        }
    }

    fn default_session(&self, user_id: &UserId) -> UserSession {
        UserSession {
            user_id: user_id.clone(),
            direction: self.catalogs.default_direction().code.clone(),
            ui_language: self.catalogs.default_ui_language().to_string(),
            tier: self.catalogs.tiers.default_tier().name.clone(),
            usage: UsageCounter::new(self.clock.today()),
        }
    }

    /// Replace selections that the current configuration no longer offers.
    /// Unknown tiers are kept: quota lookups fall back to the default tier.
    fn sanitize(&self, session: &mut UserSession) {
        if !self.catalogs.directions.contains(&session.direction) {
            tracing::debug!(
                user_id = %session.user_id,
                direction = %session.direction,
                "Stored direction no longer configured, using default"
            );
            session.direction = self.catalogs.default_direction().code.clone();
        }
        if !self.catalogs.is_ui_language(&session.ui_language) {
            session.ui_language = self.catalogs.default_ui_language().to_string();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::session::{MemoryBackend, SqliteBackend};
    use crate::util::ManualClock;
    use chrono::NaiveDate;
    use std::sync::atomic::{AtomicBool, Ordering};

    /// Memory backend whose writes can be switched off.
    #[derive(Default)]
    struct FlakyBackend {
        inner: MemoryBackend,
        failing: AtomicBool,
    }

    impl SessionBackend for FlakyBackend {
        fn name(&self) -> &str {
            "flaky"
        }

        fn load(&self, user_id: &UserId) -> anyhow::Result<Option<UserSession>> {
            if self.failing.load(Ordering::SeqCst) {
                anyhow::bail!("backend offline");
            }
            self.inner.load(user_id)
        }

        fn save(&self, session: &UserSession) -> anyhow::Result<()> {
            if self.failing.load(Ordering::SeqCst) {
                anyhow::bail!("backend offline");
            }
            self.inner.save(session)
        }
    }

    fn store_with(backend: Arc<dyn SessionBackend>) -> (SessionStore, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::starting(2026, 3, 1));
        let catalogs = Arc::new(Catalogs::from_config(&Config::default()).unwrap());
        let store = SessionStore::new(backend, catalogs, clock.clone());
        (store, clock)
    }

    fn store() -> (SessionStore, Arc<ManualClock>) {
        store_with(Arc::new(MemoryBackend::new()))
    }

    #[test]
    fn creates_defaults_lazily() {
        let (store, _) = store();
        assert_eq!(store.user_count(), 0);

        let s = store.get(&UserId::from("u1"));
        assert_eq!(s.direction, "ru_de");
        assert_eq!(s.ui_language, "ru");
        assert_eq!(s.tier, "free");
        assert_eq!(s.usage.count, 0);
        assert_eq!(store.user_count(), 1);
    }

    #[test]
    fn usage_resets_on_new_day() {
        let (store, clock) = store();
        let user = UserId::from("u1");
        store.update(&user, |s| s.usage.count = 17).unwrap();
        assert_eq!(store.get(&user).usage.count, 17);

        clock.advance_days(1);
        let s = store.get(&user);
        assert_eq!(s.usage.count, 0);
        assert_eq!(s.usage.day, NaiveDate::from_ymd_opt(2026, 3, 2).unwrap());
    }

    #[test]
    fn direction_change_reports_unchanged() {
        let (store, _) = store();
        let user = UserId::from("u1");
        assert_eq!(store.set_direction(&user, "ru_de").unwrap(), Change::Unchanged);
        assert_eq!(store.set_direction(&user, "de_ru").unwrap(), Change::Updated);
        assert_eq!(store.set_direction(&user, "de_ru").unwrap(), Change::Unchanged);
        assert_eq!(store.get(&user).direction, "de_ru");
    }

    #[test]
    fn ui_language_change_reports_unchanged() {
        let (store, _) = store();
        let user = UserId::from("u1");
        assert_eq!(store.set_ui_language(&user, "de").unwrap(), Change::Updated);
        assert_eq!(store.set_ui_language(&user, "de").unwrap(), Change::Unchanged);
    }

    #[test]
    fn unknown_codes_are_rejected_without_change() {
        let (store, _) = store();
        let user = UserId::from("u1");
        assert!(matches!(
            store.set_direction(&user, "fr_de"),
            Err(SessionError::UnknownDirection(code)) if code == "fr_de"
        ));
        assert!(matches!(
            store.set_ui_language(&user, "xx"),
            Err(SessionError::UnknownUiLanguage(_))
        ));
        assert_eq!(store.get(&user).direction, "ru_de");
    }

    #[test]
    fn failed_save_leaves_session_untouched() {
        let backend = Arc::new(FlakyBackend::default());
        let (store, _) = store_with(backend.clone());
        let user = UserId::from("u1");
        store.set_direction(&user, "en_de").unwrap();

        backend.failing.store(true, Ordering::SeqCst);
        let err = store.set_direction(&user, "de_en").unwrap_err();
        assert!(matches!(err, SessionError::Store(_)));
        assert_eq!(store.get(&user).direction, "en_de");
    }

    #[test]
    fn load_failure_falls_back_to_defaults() {
        let backend = Arc::new(FlakyBackend::default());
        backend.failing.store(true, Ordering::SeqCst);
        let (store, _) = store_with(backend);

        let s = store.get(&UserId::from("u9"));
        assert_eq!(s.tier, "free");
    }

    #[test]
    fn persisted_sessions_are_reloaded_and_sanitized() {
        let backend = Arc::new(MemoryBackend::new());
        let today = NaiveDate::from_ymd_opt(2026, 3, 1).unwrap();
        backend
            .save(&UserSession {
                user_id: UserId::from("u1"),
                direction: "retired_pair".into(),
                ui_language: "de".into(),
                tier: "b1".into(),
                usage: UsageCounter { day: today, count: 12 },
            })
            .unwrap();

        let (store, _) = store_with(backend);
        let s = store.get(&UserId::from("u1"));
        assert_eq!(s.direction, "ru_de");
        assert_eq!(s.ui_language, "de");
        assert_eq!(s.tier, "b1");
        assert_eq!(s.usage.count, 12);
    }

    #[test]
    fn peek_does_not_register_unknown_users() {
        let (store, clock) = store();
        let user = UserId::from("u1");
        assert_eq!(store.peek(&user).tier, "free");
        assert_eq!(store.user_count(), 0);

        store.update(&user, |s| s.usage.count = 5).unwrap();
        assert_eq!(store.peek(&user).usage.count, 5);
        clock.advance_days(1);
        assert_eq!(store.peek(&user).usage.count, 0);
        assert_eq!(store.user_count(), 1);
    }

    #[test]
    fn mutations_are_written_through_to_sqlite() {
        let tmp = tempfile::TempDir::new().unwrap();
        let db = tmp.path().join("sessions.db");
        let user = UserId::from("u1");

        {
            let (store, _) = store_with(Arc::new(SqliteBackend::open(&db).unwrap()));
            store.set_direction(&user, "en_de").unwrap();
            store.set_ui_language(&user, "de").unwrap();
            store.update(&user, |s| s.usage.count = 4).unwrap();
        }

        let (reopened, _) = store_with(Arc::new(SqliteBackend::open(&db).unwrap()));
        let s = reopened.get(&user);
        assert_eq!(s.direction, "en_de");
        assert_eq!(s.ui_language, "de");
        assert_eq!(s.usage.count, 4);
    }

    #[test]
    fn unchanged_update_does_not_write() {
        let backend = Arc::new(MemoryBackend::new());
        let (store, _) = store_with(backend.clone());
        store.get(&UserId::from("u1"));
        store.update(&UserId::from("u1"), |_| ()).unwrap();
        assert!(backend.is_empty());
    }
}
