//! Live builder sessions with periodic auto-save.
//!
//! Working copies live in memory and are marked dirty by every mutation. The
//! auto-save task flushes dirty sessions on a fixed period; a failed flush
//! leaves the session dirty for the next tick instead of retrying in a loop.
//! Clean sessions idle past the TTL are then dropped from memory and reloaded
//! from the store on next access. Saving never touches version history, so
//! repeated saves are idempotent.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};
use uuid::Uuid;

use crate::builder::persistence::SessionRepository;
use crate::builder::session::{BuilderSession, TargetInputs};
use crate::errors::AppError;
use crate::store::RecordStore;

struct LiveSession {
    session: BuilderSession,
    dirty: bool,
    /// Bumped by every mutation, so a save that raced a mutation keeps the session dirty.
    revision: u64,
}

/// A session as read by a caller, with its activity flag.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    pub session: BuilderSession,
    /// False once the session has been idle longer than the TTL.
    pub active: bool,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FlushReport {
    pub saved: usize,
    pub failed: usize,
}

pub struct SessionManager {
    repository: SessionRepository,
    live: Mutex<HashMap<Uuid, LiveSession>>,
    ttl: chrono::Duration,
}

impl SessionManager {
    pub fn new(store: Arc<dyn RecordStore>, ttl: chrono::Duration) -> Self {
        Self {
            repository: SessionRepository::new(store),
            live: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    /// Creates a session from target inputs and saves it immediately.
    pub async fn create(&self, inputs: TargetInputs) -> Result<BuilderSession, AppError> {
        let session = BuilderSession::start(inputs, Utc::now())?;
        self.repository.save(&session).await?;
        info!("Created session {}", session.session_id);

        self.lock().insert(
            session.session_id,
            LiveSession {
                session: session.clone(),
                dirty: false,
                revision: 0,
            },
        );
        Ok(session)
    }

    /// Reads a session. Expired sessions are returned with `active = false`,
    /// never discarded.
    pub async fn load(&self, session_id: Uuid) -> Result<SessionView, AppError> {
        self.ensure_loaded(session_id).await?;
        let session = self
            .lock()
            .get(&session_id)
            .map(|live| live.session.clone())
            .ok_or_else(|| not_found(session_id))?;
        let active = session.is_active(Utc::now(), self.ttl);
        Ok(SessionView { session, active })
    }

    /// Applies `f` to the live session and marks it dirty when `f` succeeds.
    pub async fn mutate<T>(
        &self,
        session_id: Uuid,
        f: impl FnOnce(&mut BuilderSession) -> Result<T, AppError>,
    ) -> Result<T, AppError> {
        self.ensure_loaded(session_id).await?;
        let mut live = self.lock();
        let entry = live
            .get_mut(&session_id)
            .ok_or_else(|| not_found(session_id))?;
        let value = f(&mut entry.session)?;
        entry.dirty = true;
        entry.revision += 1;
        Ok(value)
    }

    /// Explicit checkpoint. A clean session only has its `lastSavedAt` moved.
    pub async fn save(&self, session_id: Uuid) -> Result<BuilderSession, AppError> {
        self.ensure_loaded(session_id).await?;
        let (session, dirty, revision) = {
            let live = self.lock();
            let entry = live.get(&session_id).ok_or_else(|| not_found(session_id))?;
            (entry.session.clone(), entry.dirty, entry.revision)
        };
        self.persist(session, dirty, revision).await
    }

    /// Saves every dirty session. Failures stay dirty for the next call.
    pub async fn flush_dirty(&self) -> FlushReport {
        let pending: Vec<(BuilderSession, u64)> = self
            .lock()
            .values()
            .filter(|live| live.dirty)
            .map(|live| (live.session.clone(), live.revision))
            .collect();

        let mut report = FlushReport::default();
        for (session, revision) in pending {
            let session_id = session.session_id;
            match self.persist(session, true, revision).await {
                Ok(_) => report.saved += 1,
                Err(e) => {
                    warn!("Auto-save of session {session_id} failed, retrying next tick: {e}");
                    report.failed += 1;
                }
            }
        }
        report
    }

    /// Drops clean sessions idle longer than the TTL from memory. Returns how
    /// many were dropped.
    pub fn evict_idle(&self) -> usize {
        let now = Utc::now();
        let mut live = self.lock();
        let before = live.len();
        live.retain(|_, entry| entry.dirty || entry.session.is_active(now, self.ttl));
        before - live.len()
    }

    /// Runs `flush_dirty` then `evict_idle` every `period` until the returned
    /// handle is aborted.
    pub fn spawn_autosave(self: &Arc<Self>, period: Duration) -> JoinHandle<()> {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let report = manager.flush_dirty().await;
                let evicted = manager.evict_idle();
                if report.saved > 0 || report.failed > 0 || evicted > 0 {
                    info!(
                        "Auto-save tick: {} saved, {} failed, {evicted} evicted",
                        report.saved, report.failed
                    );
                }
            }
        })
    }

    pub fn dirty_count(&self) -> usize {
        self.lock().values().filter(|live| live.dirty).count()
    }

    async fn persist(
        &self,
        mut session: BuilderSession,
        dirty: bool,
        revision: u64,
    ) -> Result<BuilderSession, AppError> {
        let session_id = session.session_id;
        let now = Utc::now();
        session.last_saved_at = now;
        if dirty {
            self.repository.save(&session).await?;
        } else {
            self.repository.touch(session_id, now).await?;
        }

        {
            let mut live = self.lock();
            if let Some(entry) = live.get_mut(&session_id) {
                entry.session.last_saved_at = now;
                if entry.revision == revision {
                    entry.dirty = false;
                }
            }
        }
        Ok(session)
    }

    async fn ensure_loaded(&self, session_id: Uuid) -> Result<(), AppError> {
        let cached = self.lock().contains_key(&session_id);
        if cached {
            return Ok(());
        }
        let session = self
            .repository
            .load(session_id)
            .await?
            .ok_or_else(|| not_found(session_id))?;
        self.lock().entry(session_id).or_insert(LiveSession {
            session,
            dirty: false,
            revision: 0,
        });
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<Uuid, LiveSession>> {
        self.live.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn not_found(session_id: Uuid) -> AppError {
    AppError::NotFound(format!("Session {session_id} not found"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::session::fixtures::{inputs, matrix};
    use crate::builder::step::BuilderStep;
    use crate::store::{MemoryRecordStore, SESSION_TABLE};
    use serde_json::json;

    fn manager() -> (Arc<SessionManager>, Arc<MemoryRecordStore>) {
        let store = Arc::new(MemoryRecordStore::new());
        let manager = Arc::new(SessionManager::new(
            store.clone(),
            chrono::Duration::hours(24),
        ));
        (manager, store)
    }

    async fn stored(store: &MemoryRecordStore, id: Uuid) -> BuilderSession {
        let mut rows = store
            .get(SESSION_TABLE, &json!({ "id": id.to_string() }))
            .await
            .unwrap();
        serde_json::from_value(rows.pop().unwrap()).unwrap()
    }

    #[tokio::test]
    async fn test_create_persists_immediately() {
        let (manager, store) = manager();
        let session = manager.create(inputs("jd")).await.unwrap();
        assert_eq!(store.record_count(SESSION_TABLE), 1);
        assert_eq!(stored(&store, session.session_id).await.session_id, session.session_id);
        assert_eq!(manager.dirty_count(), 0);
    }

    #[tokio::test]
    async fn test_repeated_save_adds_no_history() {
        let (manager, store) = manager();
        let id = manager.create(inputs("jd")).await.unwrap().session_id;

        let first = manager.save(id).await.unwrap();
        let second = manager.save(id).await.unwrap();

        assert_eq!(first.version_history, second.version_history);
        assert_eq!(first.snapshot(), second.snapshot());
        assert!(second.last_saved_at >= first.last_saved_at);
        assert_eq!(stored(&store, id).await.version_history.len(), 1);
    }

    #[tokio::test]
    async fn test_mutation_marks_dirty_and_save_cleans() {
        let (manager, store) = manager();
        let id = manager.create(inputs("jd")).await.unwrap().session_id;

        manager
            .mutate(id, |s| Ok(s.complete_assessment(matrix(), Utc::now())?))
            .await
            .unwrap();
        assert_eq!(manager.dirty_count(), 1);
        assert!(stored(&store, id).await.matrix.is_none());

        manager.save(id).await.unwrap();
        assert_eq!(manager.dirty_count(), 0);
        assert_eq!(stored(&store, id).await.current_step, BuilderStep::Build);
    }

    #[tokio::test]
    async fn test_failed_mutation_leaves_session_clean() {
        let (manager, _store) = manager();
        let id = manager.create(inputs("jd")).await.unwrap().session_id;

        let result = manager
            .mutate(id, |s| Ok(s.navigate(BuilderStep::Finalize)?))
            .await;
        assert!(matches!(result, Err(AppError::InvalidTransition(_))));
        assert_eq!(manager.dirty_count(), 0);
    }

    #[tokio::test]
    async fn test_unknown_session_is_not_found() {
        let (manager, _store) = manager();
        let id = Uuid::new_v4();
        assert!(matches!(manager.load(id).await, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_expired_session_is_flagged_not_deleted() {
        let (manager, store) = manager();
        let mut session = BuilderSession::start(inputs("jd"), Utc::now()).unwrap();
        session.last_saved_at = Utc::now() - chrono::Duration::hours(30);
        SessionRepository::new(store.clone())
            .save(&session)
            .await
            .unwrap();

        let view = manager.load(session.session_id).await.unwrap();
        assert!(!view.active);
        assert_eq!(view.session.session_id, session.session_id);
        assert_eq!(store.record_count(SESSION_TABLE), 1);
    }

    #[tokio::test]
    async fn test_failed_flush_stays_dirty_for_next_attempt() {
        let (manager, store) = manager();
        let id = manager.create(inputs("jd")).await.unwrap().session_id;
        manager
            .mutate(id, |s| Ok(s.complete_assessment(matrix(), Utc::now())?))
            .await
            .unwrap();

        store.set_offline(true);
        let report = manager.flush_dirty().await;
        assert_eq!(report, FlushReport { saved: 0, failed: 1 });
        assert_eq!(manager.dirty_count(), 1);

        store.set_offline(false);
        let report = manager.flush_dirty().await;
        assert_eq!(report, FlushReport { saved: 1, failed: 0 });
        assert_eq!(manager.dirty_count(), 0);
        assert!(stored(&store, id).await.matrix.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_autosave_flushes_on_the_period() {
        let (manager, store) = manager();
        let id = manager.create(inputs("jd")).await.unwrap().session_id;
        let autosave = manager.spawn_autosave(Duration::from_secs(30));

        manager
            .mutate(id, |s| Ok(s.complete_assessment(matrix(), Utc::now())?))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(stored(&store, id).await.matrix.is_none());

        tokio::time::sleep(Duration::from_secs(25)).await;
        assert!(stored(&store, id).await.matrix.is_some());
        assert_eq!(manager.dirty_count(), 0);

        autosave.abort();
    }

    #[tokio::test]
    async fn test_idle_clean_sessions_are_evicted_and_reloaded() {
        let (manager, store) = manager();
        let fresh = manager.create(inputs("jd")).await.unwrap().session_id;

        let mut idle = BuilderSession::start(inputs("jd"), Utc::now()).unwrap();
        idle.last_saved_at = Utc::now() - chrono::Duration::hours(30);
        SessionRepository::new(store.clone())
            .save(&idle)
            .await
            .unwrap();
        manager.load(idle.session_id).await.unwrap();

        assert_eq!(manager.evict_idle(), 1);
        assert_eq!(manager.evict_idle(), 0);

        let view = manager.load(idle.session_id).await.unwrap();
        assert!(!view.active);
        assert!(manager.load(fresh).await.is_ok());
    }

    #[tokio::test]
    async fn test_dirty_idle_session_is_kept_until_saved() {
        let (manager, store) = manager();
        let mut idle = BuilderSession::start(inputs("jd"), Utc::now()).unwrap();
        idle.last_saved_at = Utc::now() - chrono::Duration::hours(30);
        SessionRepository::new(store.clone())
            .save(&idle)
            .await
            .unwrap();
        let id = idle.session_id;

        manager
            .mutate(id, |s| Ok(s.complete_assessment(matrix(), Utc::now())?))
            .await
            .unwrap();
        assert_eq!(manager.evict_idle(), 0);

        store.set_offline(true);
        manager.flush_dirty().await;
        assert_eq!(manager.evict_idle(), 0);

        store.set_offline(false);
        manager.flush_dirty().await;
        // the save refreshed lastSavedAt, so it is active again
        assert_eq!(manager.evict_idle(), 0);
        assert!(stored(&store, id).await.matrix.is_some());
    }
}
