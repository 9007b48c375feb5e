//! Live session registry.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::session::ResearchSession;

/// A registered session: its cancellation flag and last-known state.
#[derive(Debug, Clone)]
pub struct SessionEntry {
    pub cancel: Arc<AtomicBool>,
    pub snapshot: ResearchSession,
}

impl SessionEntry {
    fn new(snapshot: ResearchSession) -> Self {
        Self {
            cancel: Arc::new(AtomicBool::new(false)),
            snapshot,
        }
    }
}

/// Sessions keyed by id.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, SessionEntry>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a session, returning its cancellation flag.
    ///
    /// An active entry keeps its flag so a cancel issued before the run
    /// starts is not lost. A finished entry has its flag cleared.
    pub async fn register(&self, snapshot: ResearchSession) -> Arc<AtomicBool> {
        let mut sessions = self.sessions.write().await;
        match sessions.get_mut(&snapshot.id) {
            Some(entry) => {
                if !entry.snapshot.status.is_active() {
                    entry.cancel.store(false, Ordering::SeqCst);
                }
                entry.snapshot = snapshot;
                Arc::clone(&entry.cancel)
            }
            None => {
                let entry = SessionEntry::new(snapshot);
                let cancel = Arc::clone(&entry.cancel);
                sessions.insert(entry.snapshot.id.clone(), entry);
                cancel
            }
        }
    }

    /// Replace the snapshot of a registered session.
    pub async fn update(&self, snapshot: &ResearchSession) {
        if let Some(entry) = self.sessions.write().await.get_mut(&snapshot.id) {
            entry.snapshot = snapshot.clone();
        }
    }

    pub async fn snapshot(&self, id: &str) -> Option<ResearchSession> {
        self.sessions
            .read()
            .await
            .get(id)
            .map(|entry| entry.snapshot.clone())
    }

    /// Set the cancellation flag of an active session.
    pub async fn request_cancel(&self, id: &str) -> bool {
        match self.sessions.read().await.get(id) {
            Some(entry) if entry.snapshot.status.is_active() => {
                entry.cancel.store(true, Ordering::SeqCst);
                true
            }
            _ => false,
        }
    }

    /// All snapshots, oldest first.
    pub async fn list(&self) -> Vec<ResearchSession> {
        let mut sessions: Vec<ResearchSession> = self
            .sessions
            .read()
            .await
            .values()
            .map(|entry| entry.snapshot.clone())
            .collect();
        sessions.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        sessions
    }

    pub async fn remove(&self, id: &str) -> Option<SessionEntry> {
        self.sessions.write().await.remove(id)
    }

    /// `(active, total)` session counts.
    pub async fn counts(&self) -> (usize, usize) {
        let sessions = self.sessions.read().await;
        let active = sessions
            .values()
            .filter(|entry| entry.snapshot.status.is_active())
            .count();
        (active, sessions.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionStatus;

    #[tokio::test]
    async fn test_register_keeps_existing_flag() {
        let registry = SessionRegistry::new();
        let first = registry.register(ResearchSession::new("s1", "goal", 3, 1)).await;
        assert!(registry.request_cancel("s1").await);

        let second = registry.register(ResearchSession::new("s1", "goal", 3, 1)).await;
        assert!(Arc::ptr_eq(&first, &second));
        assert!(second.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_reregistering_finished_session_clears_flag() {
        let registry = SessionRegistry::new();
        let mut session = ResearchSession::new("s1", "goal", 3, 1);
        let flag = registry.register(session.clone()).await;
        assert!(registry.request_cancel("s1").await);

        session.finish(SessionStatus::Cancelled, None);
        registry.update(&session).await;

        let rerun = registry.register(ResearchSession::new("s1", "goal", 3, 1)).await;
        assert!(Arc::ptr_eq(&flag, &rerun));
        assert!(!rerun.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_cancel_requires_active_session() {
        let registry = SessionRegistry::new();
        assert!(!registry.request_cancel("missing").await);

        let mut session = ResearchSession::new("s1", "goal", 3, 1);
        registry.register(session.clone()).await;
        session.finish(SessionStatus::Completed, None);
        registry.update(&session).await;

        assert!(!registry.request_cancel("s1").await);
        assert_eq!(registry.counts().await, (0, 1));
    }

    #[tokio::test]
    async fn test_update_ignores_unknown_session() {
        let registry = SessionRegistry::new();
        registry.update(&ResearchSession::new("ghost", "goal", 1, 1)).await;
        assert!(registry.snapshot("ghost").await.is_none());
        assert!(registry.list().await.is_empty());
    }
}
