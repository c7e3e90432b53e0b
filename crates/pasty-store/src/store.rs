//! Bounded, newest-first paste list.

use std::collections::VecDeque;

use chrono::Utc;
use tracing::debug;

use crate::errors::StoreError;
use crate::paste::{NewPaste, Paste, PasteId};
use crate::repository::PasteRepository;

/// Ordered paste collection.
///
/// Front of the deque is the newest paste. IDs strictly increase with
/// insertion order. When an add would exceed `capacity` the oldest pastes are
/// evicted. With a repository attached every mutation is written through
/// first; a failed write leaves the list untouched.
pub struct PasteStore {
    pastes: VecDeque<Paste>,
    capacity: usize,
    next_id: PasteId,
    repository: Option<PasteRepository>,
}

impl PasteStore {
    /// In-memory store. A `capacity` of 0 is treated as 1.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            pastes: VecDeque::with_capacity(capacity),
            capacity,
            next_id: 1,
            repository: None,
        }
    }

    /// Store backed by `repository`, preloaded with its newest pastes.
    pub fn with_repository(
        capacity: usize,
        mut repository: PasteRepository,
    ) -> Result<Self, StoreError> {
        let capacity = capacity.max(1);
        let pastes: VecDeque<Paste> = repository.load_recent(capacity)?.into();
        let newest = pastes.front().map_or(0, |p| p.id);
        let next_id = repository.last_assigned_id()?.max(newest) + 1;
        debug!(loaded = pastes.len(), capacity, "paste store restored");
        Ok(Self {
            pastes,
            capacity,
            next_id,
            repository: Some(repository),
        })
    }

    /// Append a paste as the newest entry and return it.
    pub fn add(&mut self, new: NewPaste) -> Result<Paste, StoreError> {
        let created_at = Utc::now();
        let keep = self.capacity - 1;
        let evict: Vec<PasteId> = self.pastes.iter().skip(keep).map(|p| p.id).collect();

        let id = match self.repository.as_mut() {
            Some(repo) => repo.insert(&new, created_at, &evict, self.next_id)?,
            None => self.next_id,
        };
        self.next_id = id + 1;

        self.pastes.truncate(keep);
        if !evict.is_empty() {
            debug!(evicted = ?evict, "evicted oldest pastes");
        }

        let paste = Paste {
            id,
            user: new.user,
            text: new.text,
            created_at,
            network: new.network,
            device: new.device,
        };
        self.pastes.push_front(paste.clone());
        Ok(paste)
    }

    /// Remove the paste with `id`. Returns whether one was removed.
    pub fn delete(&mut self, id: PasteId) -> Result<bool, StoreError> {
        let Some(pos) = self.pastes.iter().position(|p| p.id == id) else {
            return Ok(false);
        };
        if let Some(repo) = self.repository.as_mut() {
            let _ = repo.delete(id)?;
        }
        let _ = self.pastes.remove(pos);
        Ok(true)
    }

    /// Pastes, newest first.
    pub fn list(&self) -> impl ExactSizeIterator<Item = &Paste> {
        self.pastes.iter()
    }

    /// Number of retained pastes.
    pub fn len(&self) -> usize {
        self.pastes.len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.pastes.is_empty()
    }

    /// Maximum retained pastes.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Whether mutations are written to SQLite.
    pub fn is_persistent(&self) -> bool {
        self.repository.is_some()
    }
}
