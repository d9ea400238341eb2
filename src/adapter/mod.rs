//! Transport adapters and the per-request dispatch decision
//!
//! A transport integration implements [`AdapterHooks`] and is wrapped in an
//! [`Adapter`], which owns the connect/disconnect gate and routes every
//! intercepted request to exactly one [`Action`].

mod dispatch;
mod expiration;
mod hooks;
mod lifecycle;
mod timing;

pub use dispatch::Handled;
pub use expiration::{
    is_expired, parse_expires_in, Connectivity, ConnectivitySignal, ExpirationPolicy,
};
pub use hooks::AdapterHooks;
pub use lifecycle::{Adapter, DispatchStats};
pub use timing::{Timing, MAX_DELAY};

use std::fmt;

/// Terminal decision for a single request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    /// Request reached the real network untouched
    Passthrough,
    /// Response was produced by request handlers
    Intercept,
    /// Request was performed live and persisted
    Record,
    /// Response was synthesized from a stored entry
    Replay,
}

impl Action {
    /// Lowercase action name
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Passthrough => "passthrough",
            Action::Intercept => "intercept",
            Action::Record => "record",
            Action::Replay => "replay",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
