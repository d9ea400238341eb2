//! Intercepted request values and request-level handlers

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::adapter::Action;
use crate::fingerprint::request_id;
use crate::persister::RecordingEntry;
use crate::{PollyError, Result};

/// Request as captured by a transport, before registration
#[derive(Debug, Clone, Default)]
pub struct RawRequest {
    /// HTTP method (e.g., "GET", "POST")
    pub method: String,
    /// Absolute request url
    pub url: String,
    /// Request headers
    pub headers: Vec<(String, String)>,
    /// Request body
    pub body: Vec<u8>,
}

impl RawRequest {
    /// Create a bodyless request
    #[must_use]
    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            url: url.into(),
            ..Self::default()
        }
    }
}

/// HTTP response delivered to the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// HTTP status code
    pub status: u16,
    /// Response headers
    pub headers: Vec<(String, String)>,
    /// Response body
    pub body: Vec<u8>,
}

impl Default for Response {
    fn default() -> Self {
        Self {
            status: 200,
            headers: Vec::new(),
            body: Vec::new(),
        }
    }
}

impl Response {
    /// Check the response can be handed to a transport
    ///
    /// # Errors
    ///
    /// Returns error if the status code is outside 100..=599
    pub fn validate(&self) -> Result<()> {
        if !(100..=599).contains(&self.status) {
            return Err(PollyError::InvalidResponse(format!(
                "status code {} is out of range",
                self.status
            )));
        }
        Ok(())
    }
}

/// User middleware attached to every request of a session
///
/// Handlers run in registration order. Every method defaults to a no-op.
#[async_trait]
pub trait RequestHandler: Send + Sync {
    /// Runs during request setup; may set the passthrough or intercept flags
    async fn setup(&self, _request: &mut PollyRequest) -> Result<()> {
        Ok(())
    }

    /// Builds the response for an intercepted request
    async fn intercept(&self, _request: &PollyRequest, _response: &mut Response) -> Result<()> {
        Ok(())
    }

    /// Observes or rewrites a stored entry before it is replayed
    async fn before_replay(
        &self,
        _request: &PollyRequest,
        _entry: &mut RecordingEntry,
    ) -> Result<()> {
        Ok(())
    }
}

/// One intercepted network request
pub struct PollyRequest {
    /// HTTP method
    pub method: String,
    /// Absolute request url
    pub url: String,
    /// Request headers
    pub headers: Vec<(String, String)>,
    /// Request body
    pub body: Vec<u8>,
    /// Registration time in milliseconds since the Unix epoch
    pub timestamp: u64,
    /// Skip recording and replay for this request
    pub should_passthrough: bool,
    /// Answer this request from request handlers
    pub should_intercept: bool,
    /// Response built up for this request, if any
    pub response: Option<Response>,
    id: Option<String>,
    action: Option<Action>,
    handlers: Arc<[Arc<dyn RequestHandler>]>,
}

impl PollyRequest {
    pub(crate) fn new(
        raw: RawRequest,
        timestamp: u64,
        handlers: Arc<[Arc<dyn RequestHandler>]>,
    ) -> Self {
        Self {
            method: raw.method,
            url: raw.url,
            headers: raw.headers,
            body: raw.body,
            timestamp,
            should_passthrough: false,
            should_intercept: false,
            response: None,
            id: None,
            action: None,
            handlers,
        }
    }

    /// Request identity, available once setup has completed
    #[must_use]
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    /// Action chosen by dispatch, if any
    #[must_use]
    pub fn action(&self) -> Option<Action> {
        self.action
    }

    /// Prepare the request for dispatch
    ///
    /// Normalizes the method, computes the request identity and runs the
    /// `setup` step of every handler.
    ///
    /// # Errors
    ///
    /// Returns the first error raised by a handler
    pub async fn setup(&mut self) -> Result<()> {
        self.method = self.method.to_uppercase();
        self.id = Some(request_id(&self.method, &self.url, &self.headers, &self.body));

        let handlers = Arc::clone(&self.handlers);
        for handler in handlers.iter() {
            handler.setup(self).await?;
        }

        Ok(())
    }

    /// Run the intercept step and return the validated response
    ///
    /// # Errors
    ///
    /// Returns error if a handler fails or the response is invalid
    pub(crate) async fn invoke_intercept(&mut self) -> Result<Response> {
        let mut response = self.response.take().unwrap_or_default();

        for handler in self.handlers.iter() {
            handler.intercept(self, &mut response).await?;
        }

        response.validate()?;
        Ok(response)
    }

    /// Run the before-replay notification
    ///
    /// # Errors
    ///
    /// Returns the first error raised by a handler
    pub(crate) async fn trigger_before_replay(&self, entry: &mut RecordingEntry) -> Result<()> {
        for handler in self.handlers.iter() {
            handler.before_replay(self, entry).await?;
        }
        Ok(())
    }

    /// Record the dispatch decision
    ///
    /// # Errors
    ///
    /// Returns error if an action was already assigned; the first action
    /// is kept
    pub(crate) fn set_action(&mut self, action: Action) -> Result<()> {
        if let Some(current) = self.action {
            return Err(PollyError::Other(format!(
                "action already assigned for {} {}: {} (attempted {})",
                self.method, self.url, current, action
            )));
        }
        self.action = Some(action);
        Ok(())
    }
}

impl fmt::Debug for PollyRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PollyRequest")
            .field("method", &self.method)
            .field("url", &self.url)
            .field("timestamp", &self.timestamp)
            .field("should_passthrough", &self.should_passthrough)
            .field("should_intercept", &self.should_intercept)
            .field("id", &self.id)
            .field("action", &self.action)
            .finish_non_exhaustive()
    }
}
