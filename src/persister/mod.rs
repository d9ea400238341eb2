//! Persistence collaborator contract and stored interaction types

mod memory;

pub use memory::{MemoryPersister, PersisterStats};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::request::PollyRequest;
use crate::Result;

/// Request half of a stored interaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedRequest {
    /// HTTP method
    pub method: String,
    /// Request url
    pub url: String,
    /// Send time in milliseconds since the Unix epoch
    pub timestamp: u64,
}

/// Response half of a stored interaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedResponse {
    /// HTTP status code
    pub status: u16,
    /// Response headers
    pub headers: Vec<(String, String)>,
    /// Response body
    pub body: Vec<u8>,
    /// Receive time in milliseconds since the Unix epoch
    pub timestamp: u64,
}

/// A previously captured interaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordingEntry {
    /// Identity of the request this entry answers
    pub id: String,
    /// When the interaction was recorded
    pub created_at: DateTime<Utc>,
    /// Recorded request
    pub request: RecordedRequest,
    /// Recorded response
    pub response: RecordedResponse,
}

/// Storage backend that matches requests to stored interactions
///
/// Implementations own the matching strategy and must tolerate concurrent
/// lookups.
#[async_trait]
pub trait Persister: Send + Sync {
    /// Find the stored entry answering `request`, if any
    ///
    /// # Errors
    ///
    /// Returns error if the backend cannot be queried
    async fn find_recording_entry(&self, request: &PollyRequest) -> Result<Option<RecordingEntry>>;
}
