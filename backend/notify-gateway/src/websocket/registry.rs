/// Client connection registry
///
/// Tracks the live outbound handle for every connected consumer, keyed by an
/// opaque client identifier. Pure bookkeeping: no retry, no ordering, no
/// dedup. The delivery path takes a fresh snapshot on every attempt, so a
/// client that disconnects between retries is simply skipped.
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};

/// Outbound handle for one client. Bounded so a slow consumer can never
/// block the processing loop; a full buffer is that client's failure.
pub type ClientSender = mpsc::Sender<String>;

#[derive(Clone, Default)]
pub struct ConnectionRegistry {
    connections: Arc<RwLock<HashMap<String, ClientSender>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite the handle for a client
    ///
    /// A reconnecting client replaces its stale handle; the old channel is
    /// dropped and any writer holding it sees a closed-channel failure.
    pub async fn register(&self, client_id: impl Into<String>, sender: ClientSender) {
        let client_id = client_id.into();
        let mut connections = self.connections.write().await;
        let replaced = connections.insert(client_id.clone(), sender).is_some();

        tracing::info!(
            client_id = %client_id,
            replaced = replaced,
            total = connections.len(),
            "client registered"
        );
    }

    /// Remove a client; no-op when absent
    pub async fn unregister(&self, client_id: &str) {
        let mut connections = self.connections.write().await;
        if connections.remove(client_id).is_some() {
            tracing::info!(client_id = %client_id, total = connections.len(), "client unregistered");
        }
    }

    /// Remove a client only if `sender` is still its registered handle.
    /// A session that was replaced by a reconnect must not tear down the
    /// replacement's registration.
    pub async fn unregister_if_current(&self, client_id: &str, sender: &ClientSender) {
        let mut connections = self.connections.write().await;
        let is_current = connections
            .get(client_id)
            .map(|current| current.same_channel(sender))
            .unwrap_or(false);
        if is_current {
            connections.remove(client_id);
            tracing::info!(client_id = %client_id, total = connections.len(), "client unregistered");
        }
    }

    /// Look up a single live handle
    pub async fn get(&self, client_id: &str) -> Option<ClientSender> {
        let connections = self.connections.read().await;
        connections.get(client_id).cloned()
    }

    /// Snapshot of every live handle, taken fresh per delivery attempt
    pub async fn snapshot(&self) -> Vec<(String, ClientSender)> {
        let connections = self.connections.read().await;
        connections
            .iter()
            .map(|(id, sender)| (id.clone(), sender.clone()))
            .collect()
    }

    pub async fn contains(&self, client_id: &str) -> bool {
        let connections = self.connections.read().await;
        connections.contains_key(client_id)
    }

    pub async fn client_count(&self) -> usize {
        let connections = self.connections.read().await;
        connections.len()
    }

    pub async fn client_ids(&self) -> Vec<String> {
        let connections = self.connections.read().await;
        connections.keys().cloned().collect()
    }

    /// Drop every handle (graceful shutdown / tests)
    pub async fn clear(&self) {
        let mut connections = self.connections.write().await;
        connections.clear();
    }
}
