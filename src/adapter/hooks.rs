//! Hook contract implemented by transport integrations

use async_trait::async_trait;

use crate::persister::RecordingEntry;
use crate::request::{PollyRequest, Response};
use crate::{PollyError, Result};

/// Operations a concrete transport must provide
///
/// The dispatch core calls into these but never implements transport
/// behavior itself. Every default fails with [`PollyError::NotImplemented`]
/// naming the missing hook, so an integration that forgets one is caught the
/// first time the hook is needed.
#[async_trait]
pub trait AdapterHooks: Send + Sync {
    /// Transport name used in diagnostics and as the registry key
    ///
    /// # Errors
    ///
    /// The default always fails
    fn id(&self) -> Result<String> {
        Err(PollyError::NotImplemented { hook: "id" })
    }

    /// Attach interception at the transport level
    ///
    /// # Errors
    ///
    /// The default always fails
    fn on_connect(&self) -> Result<()> {
        Err(PollyError::NotImplemented { hook: "on_connect" })
    }

    /// Detach interception at the transport level
    ///
    /// # Errors
    ///
    /// The default always fails
    fn on_disconnect(&self) -> Result<()> {
        Err(PollyError::NotImplemented { hook: "on_disconnect" })
    }

    /// Let the request reach the real network
    ///
    /// # Errors
    ///
    /// The default always fails
    async fn on_passthrough(&self, _request: &mut PollyRequest) -> Result<()> {
        Err(PollyError::NotImplemented {
            hook: "on_passthrough",
        })
    }

    /// Deliver a response produced by request handlers
    ///
    /// # Errors
    ///
    /// The default always fails
    async fn on_intercept(&self, _request: &mut PollyRequest, _response: &Response) -> Result<()> {
        Err(PollyError::NotImplemented {
            hook: "on_intercept",
        })
    }

    /// Perform the request live and persist the interaction
    ///
    /// # Errors
    ///
    /// The default always fails
    async fn on_record(&self, _request: &mut PollyRequest) -> Result<()> {
        Err(PollyError::NotImplemented { hook: "on_record" })
    }

    /// Synthesize a response from a stored entry without touching the network
    ///
    /// # Errors
    ///
    /// The default always fails
    async fn on_replay(&self, _request: &mut PollyRequest, _entry: &RecordingEntry) -> Result<()> {
        Err(PollyError::NotImplemented { hook: "on_replay" })
    }
}
