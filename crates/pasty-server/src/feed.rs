//! The paste feed: the one place the shared list is mutated and broadcast.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use metrics::{counter, gauge};
use parking_lot::Mutex;
use pasty_core::ConnectionId;
use pasty_store::{NewPaste, Paste, PasteId, PasteStore, StoreError};
use tokio::task;
use tracing::{error, info, warn};

use crate::errors::FeedError;
use crate::metrics::{PASTES_ADDED_TOTAL, PASTES_DELETED_TOTAL, PASTES_STORED, STORE_ERRORS_TOTAL};
use crate::websocket::broadcast::BroadcastManager;
use crate::websocket::connection::ClientConnection;

/// Serialize the store's list as the wire frame clients receive.
pub fn encode_list(store: &PasteStore) -> Result<String, serde_json::Error> {
    let pastes: Vec<&Paste> = store.list().collect();
    serde_json::to_string(&pastes)
}

/// Store plus broadcast hub behind one lock.
///
/// Mutation, serialization and enqueue to every connection happen in one
/// critical section with no `.await`, so every connection's queue sees the
/// lists in mutation order and a newly attached connection gets a snapshot
/// that no concurrent broadcast can precede.
///
/// The lock may be held across a SQLite transaction. Async callers go
/// through the `spawn_*` methods, which run on the blocking pool.
pub struct PasteFeed {
    store: Mutex<PasteStore>,
    hub: Arc<BroadcastManager>,
    stored: AtomicUsize,
}

impl PasteFeed {
    /// Wrap a store and a hub.
    pub fn new(store: PasteStore, hub: Arc<BroadcastManager>) -> Self {
        #[allow(clippy::cast_precision_loss)]
        gauge!(PASTES_STORED).set(store.len() as f64);
        Self {
            stored: AtomicUsize::new(store.len()),
            store: Mutex::new(store),
            hub,
        }
    }

    /// The connection registry.
    pub fn hub(&self) -> &Arc<BroadcastManager> {
        &self.hub
    }

    /// Add a paste and broadcast the new list.
    pub fn add(&self, new: NewPaste) -> Result<Paste, StoreError> {
        let mut store = self.store.lock();
        let paste = store.add(new).inspect_err(|e| {
            counter!(STORE_ERRORS_TOTAL, "op" => "add").increment(1);
            error!(error = %e, "failed to add paste");
        })?;
        counter!(PASTES_ADDED_TOTAL).increment(1);
        info!(
            paste_id = paste.id,
            user = %paste.user,
            network = %paste.network,
            device = %paste.device,
            bytes = paste.text.len(),
            "paste added"
        );
        self.publish(&store);
        Ok(paste)
    }

    /// Delete a paste. Broadcasts only when something was removed.
    pub fn delete(&self, id: PasteId) -> Result<bool, StoreError> {
        let mut store = self.store.lock();
        let removed = store.delete(id).inspect_err(|e| {
            counter!(STORE_ERRORS_TOTAL, "op" => "delete").increment(1);
            error!(paste_id = id, error = %e, "failed to delete paste");
        })?;
        if removed {
            counter!(PASTES_DELETED_TOTAL).increment(1);
            info!(paste_id = id, "paste deleted");
            self.publish(&store);
        }
        Ok(removed)
    }

    /// Register a connection and queue the current list for it.
    ///
    /// Returns `false` if the snapshot could not be queued; the connection is
    /// then already unregistered.
    pub fn attach(&self, connection: Arc<ClientConnection>) -> bool {
        let store = self.store.lock();
        let id = connection.id.clone();
        self.hub.add(connection);
        match encode_list(&store) {
            Ok(json) => self.hub.send_to(&id, Arc::from(json)),
            Err(e) => {
                warn!(client_id = %id, error = %e, "failed to serialize paste list");
                let _ = self.hub.remove(&id);
                false
            }
        }
    }

    /// Unregister a connection.
    pub fn detach(&self, id: &ConnectionId) -> bool {
        self.hub.remove(id)
    }

    /// [`add`](Self::add) on the blocking pool.
    pub async fn spawn_add(self: &Arc<Self>, new: NewPaste) -> Result<Paste, FeedError> {
        Ok(self.on_blocking_pool(move |feed| feed.add(new)).await??)
    }

    /// [`delete`](Self::delete) on the blocking pool.
    pub async fn spawn_delete(self: &Arc<Self>, id: PasteId) -> Result<bool, FeedError> {
        Ok(self.on_blocking_pool(move |feed| feed.delete(id)).await??)
    }

    /// [`attach`](Self::attach) on the blocking pool, so a slow write in
    /// progress does not hold up the runtime.
    pub async fn spawn_attach(self: &Arc<Self>, connection: Arc<ClientConnection>) -> bool {
        self.on_blocking_pool(move |feed| feed.attach(connection))
            .await
            .unwrap_or(false)
    }

    /// Number of retained pastes. Does not take the store lock.
    pub fn len(&self) -> usize {
        self.stored.load(Ordering::Relaxed)
    }

    /// Whether no pastes are retained.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of the current list, newest first.
    #[cfg(test)]
    pub(crate) fn snapshot(&self) -> Vec<Paste> {
        self.store.lock().list().cloned().collect()
    }

    async fn on_blocking_pool<T, F>(self: &Arc<Self>, f: F) -> Result<T, FeedError>
    where
        F: FnOnce(&PasteFeed) -> T + Send + 'static,
        T: Send + 'static,
    {
        let feed = Arc::clone(self);
        task::spawn_blocking(move || f(&feed)).await.map_err(|e| {
            error!(error = %e, "paste feed task failed");
            FeedError::Task(e)
        })
    }

    fn publish(&self, store: &PasteStore) {
        self.stored.store(store.len(), Ordering::Relaxed);
        #[allow(clippy::cast_precision_loss)]
        gauge!(PASTES_STORED).set(store.len() as f64);
        match encode_list(store) {
            Ok(json) => {
                let _ = self.hub.broadcast_all(&Arc::from(json));
            }
            Err(e) => warn!(error = %e, "failed to serialize paste list"),
        }
    }
}
