//! Process-wide set of live peer sessions

use crate::peer::session::PeerSession;
use futures::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

/// Sessions are inserted when an offer arrives and removed when they reach
/// a terminal state or the server shuts down.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, Arc<PeerSession>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, session: Arc<PeerSession>) {
        let mut sessions = self.sessions.write().await;
        sessions.insert(session.id().to_owned(), session);
    }

    /// Returns the session if it was still registered
    pub async fn remove(&self, id: &str) -> Option<Arc<PeerSession>> {
        self.sessions.write().await.remove(id)
    }

    pub async fn sessions(&self) -> Vec<Arc<PeerSession>> {
        self.sessions.read().await.values().cloned().collect()
    }

    pub async fn contains(&self, id: &str) -> bool {
        self.sessions.read().await.contains_key(id)
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Empties the registry and closes every session that was in it.
    /// Sessions already closing are left to finish on their own.
    pub async fn shutdown(&self) {
        let drained: Vec<Arc<PeerSession>> = {
            let mut sessions = self.sessions.write().await;
            sessions.drain().map(|(_, s)| s).collect()
        };
        info!(count = drained.len(), "closing peer sessions");

        join_all(drained.iter().map(|session| session.close())).await;
    }
}

