//! One-shot notifications from a channel back to the registry.
//!
//! [`EstablishedSignal::fire`] and [`ClosedSignal::fire`] consume the signal, so
//! each can run at most once. A `ClosedSignal` that is dropped unfired fires
//! itself, which makes closure exactly-once even for channels that are thrown
//! away without an explicit `close()`.
//!
//! Both signals share one phase machine per session, so "inserted after
//! closed" cannot happen: once closed, establishment is refused.

use std::sync::{Arc, OnceLock, Weak};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use switchyard_core::SessionId;

use crate::channel::Channel;
use crate::registry::SessionRegistry;

#[derive(Debug)]
enum Phase {
    Pending,
    Established(SessionId),
    Closed,
}

struct HookState {
    phase: Mutex<Phase>,
    registry: Weak<SessionRegistry>,
    channel: OnceLock<Weak<dyn Channel>>,
    created_at: DateTime<Utc>,
}

impl HookState {
    fn establish(&self, id: SessionId) -> bool {
        let mut phase = self.phase.lock();
        if !matches!(*phase, Phase::Pending) {
            tracing::debug!(session_id = %id, phase = ?*phase, "establish ignored");
            return false;
        }
        let Some(registry) = self.registry.upgrade() else {
            return false;
        };
        let Some(channel) = self.channel.get().and_then(Weak::upgrade) else {
            tracing::warn!(session_id = %id, "established before channel was attached");
            return false;
        };
        if !registry.insert(id.clone(), channel, self.created_at) {
            return false;
        }
        tracing::info!(session_id = %id, sessions = registry.len(), "session established");
        *phase = Phase::Established(id);
        true
    }

    fn close(&self) {
        let mut phase = self.phase.lock();
        let Phase::Established(id) = std::mem::replace(&mut *phase, Phase::Closed) else {
            return;
        };
        let (Some(registry), Some(channel)) = (self.registry.upgrade(), self.channel.get()) else {
            return;
        };
        if registry.remove_channel(&id, channel.as_ptr()) {
            tracing::info!(session_id = %id, sessions = registry.len(), "session removed");
        }
    }
}

/// Fires once the channel knows its session id; registers the channel.
pub struct EstablishedSignal {
    state: Arc<HookState>,
}

impl EstablishedSignal {
    /// Returns whether the session is now discoverable in the registry.
    pub fn fire(self, id: SessionId) -> bool {
        self.state.establish(id)
    }
}

/// Fires when the channel closes for any reason; unregisters the channel.
pub struct ClosedSignal {
    state: Option<Arc<HookState>>,
}

impl ClosedSignal {
    pub fn fire(mut self) {
        if let Some(state) = self.state.take() {
            state.close();
        }
    }
}

impl Drop for ClosedSignal {
    fn drop(&mut self) {
        if let Some(state) = self.state.take() {
            state.close();
        }
    }
}

/// The two capabilities a channel receives at construction.
pub struct SessionHooks {
    pub established: EstablishedSignal,
    pub closed: ClosedSignal,
}

/// Dispatcher-side handle used to tell the hooks which channel they belong to.
pub struct HookBinding {
    state: Arc<HookState>,
}

impl HookBinding {
    pub fn attach(self, channel: &Arc<dyn Channel>) {
        let _ = self.state.channel.set(Arc::downgrade(channel));
    }
}

impl SessionHooks {
    pub fn new(registry: &Arc<SessionRegistry>) -> (Self, HookBinding) {
        Self::with_registry(Arc::downgrade(registry))
    }

    /// Hooks wired to nothing; firing them has no effect. For channels used
    /// outside a gateway.
    pub fn detached() -> Self {
        Self::with_registry(Weak::new()).0
    }

    fn with_registry(registry: Weak<SessionRegistry>) -> (Self, HookBinding) {
        let state = Arc::new(HookState {
            phase: Mutex::new(Phase::Pending),
            registry,
            channel: OnceLock::new(),
            created_at: Utc::now(),
        });
        (
            Self {
                established: EstablishedSignal {
                    state: Arc::clone(&state),
                },
                closed: ClosedSignal {
                    state: Some(Arc::clone(&state)),
                },
            },
            HookBinding { state },
        )
    }
}
