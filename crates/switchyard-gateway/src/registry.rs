//! The session registry: the single source of truth for "is this session alive".
//!
//! Entries are written only through [`SessionHooks`](crate::hooks::SessionHooks):
//! inserted when a channel announces its id, removed when it announces closure.
//! Lookups never create entries.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::RwLock;
use switchyard_core::SessionId;

use crate::channel::Channel;

/// A live session as the registry sees it.
#[derive(Clone)]
pub struct SessionEntry {
    pub channel: Arc<dyn Channel>,
    /// When the gateway created the session's channel, not when it registered.
    pub created_at: DateTime<Utc>,
}

impl std::fmt::Debug for SessionEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionEntry")
            .field("session_id", &self.channel.session_id())
            .field("created_at", &self.created_at)
            .finish_non_exhaustive()
    }
}

/// Concurrent map from session id to channel.
pub struct SessionRegistry {
    sessions: DashMap<SessionId, SessionEntry>,
    /// Held shared by inserts and exclusively by `begin_drain`, so an insert
    /// either lands before the drain snapshot or is refused.
    draining: RwLock<bool>,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
            draining: RwLock::new(false),
        }
    }

    pub fn get(&self, id: &SessionId) -> Option<Arc<dyn Channel>> {
        self.sessions.get(id).map(|entry| Arc::clone(&entry.channel))
    }

    pub fn contains(&self, id: &SessionId) -> bool {
        self.sessions.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn ids(&self) -> Vec<SessionId> {
        self.sessions.iter().map(|entry| entry.key().clone()).collect()
    }

    pub fn is_draining(&self) -> bool {
        *self.draining.read()
    }

    /// Register an established channel. Refused while draining or if the id
    /// is already taken.
    pub(crate) fn insert(
        &self,
        id: SessionId,
        channel: Arc<dyn Channel>,
        created_at: DateTime<Utc>,
    ) -> bool {
        let draining = self.draining.read();
        if *draining {
            tracing::warn!(session_id = %id, "registry draining, session not registered");
            return false;
        }
        match self.sessions.entry(id) {
            Entry::Occupied(occupied) => {
                tracing::warn!(session_id = %occupied.key(), "duplicate session id, keeping existing channel");
                false
            }
            Entry::Vacant(vacant) => {
                vacant.insert(SessionEntry {
                    channel,
                    created_at,
                });
                true
            }
        }
    }

    /// Remove `id` only if it still maps to the channel at `channel`.
    pub(crate) fn remove_channel(&self, id: &SessionId, channel: *const dyn Channel) -> bool {
        self.sessions
            .remove_if(id, |_, entry| {
                std::ptr::addr_eq(Arc::as_ptr(&entry.channel), channel)
            })
            .is_some()
    }

    /// Refuse further inserts and return every session registered so far.
    /// Entries stay until each channel's closure removes them.
    pub fn begin_drain(&self) -> Vec<SessionEntry> {
        *self.draining.write() = true;
        self.sessions
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// Drop any entries still present. Returns how many there were.
    ///
    /// Entries are dropped outside the shard locks: dropping the last handle
    /// to a channel fires its closed signal, which removes from this map.
    pub(crate) fn clear(&self) -> usize {
        let removed: Vec<(SessionId, SessionEntry)> = self
            .ids()
            .iter()
            .filter_map(|id| self.sessions.remove(id))
            .collect();
        removed.len()
    }
}
