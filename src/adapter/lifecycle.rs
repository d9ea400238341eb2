//! Adapter wrapper owning the connect/disconnect gate

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tracing::info;

use crate::session::Session;
use crate::Result;

use super::{Action, AdapterHooks};

/// One transport integration bound to a session
pub struct Adapter {
    pub(super) hooks: Box<dyn AdapterHooks>,
    pub(super) session: Arc<Session>,
    connected: Mutex<bool>,
    counters: [AtomicUsize; 4],
}

impl Adapter {
    /// Wrap `hooks` for use with `session`; starts disconnected
    pub fn new(session: Arc<Session>, hooks: impl AdapterHooks + 'static) -> Self {
        Self {
            hooks: Box::new(hooks),
            session,
            connected: Mutex::new(false),
            counters: Default::default(),
        }
    }

    /// Transport name
    ///
    /// # Errors
    ///
    /// Returns error if the integration does not provide the `id` hook
    pub fn id(&self) -> Result<String> {
        self.hooks.id()
    }

    /// Whether interception is attached
    #[must_use]
    pub fn is_connected(&self) -> bool {
        *self.connected.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Attach interception; no-op when already connected
    ///
    /// # Errors
    ///
    /// Returns error raised by the `on_connect` hook, leaving the adapter
    /// disconnected
    pub fn connect(&self) -> Result<()> {
        let mut connected = self.connected.lock().unwrap_or_else(PoisonError::into_inner);
        if !*connected {
            self.hooks.on_connect().map_err(|e| self.session.escalate(e))?;
            *connected = true;
            info!("Adapter {} connected", self.hooks.id().unwrap_or_default());
        }
        Ok(())
    }

    /// Detach interception; no-op when not connected
    ///
    /// # Errors
    ///
    /// Returns error raised by the `on_disconnect` hook, leaving the adapter
    /// connected
    pub fn disconnect(&self) -> Result<()> {
        let mut connected = self.connected.lock().unwrap_or_else(PoisonError::into_inner);
        if *connected {
            self.hooks.on_disconnect().map_err(|e| self.session.escalate(e))?;
            *connected = false;
            info!("Adapter {} disconnected", self.hooks.id().unwrap_or_default());
        }
        Ok(())
    }

    /// Get dispatch statistics
    #[must_use]
    pub fn stats(&self) -> DispatchStats {
        DispatchStats {
            passthrough: self.count(Action::Passthrough),
            intercept: self.count(Action::Intercept),
            record: self.count(Action::Record),
            replay: self.count(Action::Replay),
        }
    }

    pub(super) fn increment(&self, action: Action) {
        self.counters[action as usize].fetch_add(1, Ordering::Relaxed);
    }

    fn count(&self, action: Action) -> usize {
        self.counters[action as usize].load(Ordering::Relaxed)
    }
}

/// Number of requests dispatched per action
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    /// Requests passed through
    pub passthrough: usize,
    /// Requests intercepted
    pub intercept: usize,
    /// Requests recorded
    pub record: usize,
    /// Requests replayed
    pub replay: usize,
}

impl DispatchStats {
    /// Total dispatched requests
    #[must_use]
    pub fn total(&self) -> usize {
        self.passthrough + self.intercept + self.record + self.replay
    }
}
