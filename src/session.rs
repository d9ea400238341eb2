//! Session owning configuration, mode and connected adapters

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::RwLock;
use tracing::{error, info};

use crate::adapter::{
    Adapter, AdapterHooks, Connectivity, ConnectivitySignal, ExpirationPolicy, Timing,
};
use crate::config::{Config, Mode};
use crate::persister::Persister;
use crate::request::{PollyRequest, RawRequest, RequestHandler};
use crate::{PollyError, Result};

/// Source of the current time
pub trait Clock: Send + Sync {
    /// Current instant
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    /// Create a clock frozen at `now`
    #[must_use]
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    /// Move the clock forward
    pub fn advance(&self, by: chrono::Duration) {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Owning context of one test run
///
/// Adapters registered through [`Session::connect_to`] hold the session
/// alive until they are removed by [`Session::disconnect_from`],
/// [`Session::disconnect`] or [`Session::stop`].
pub struct Session {
    config: Config,
    mode: RwLock<Mode>,
    persister: Arc<dyn Persister>,
    expiration: ExpirationPolicy,
    timing: Timing,
    connectivity: Arc<dyn Connectivity>,
    clock: Arc<dyn Clock>,
    handlers: Arc<[Arc<dyn RequestHandler>]>,
    adapters: DashMap<String, Arc<Adapter>>,
    failures: AtomicUsize,
}

impl Session {
    /// Create a session from a validated configuration
    ///
    /// # Errors
    ///
    /// Returns error if the configuration is invalid
    pub fn new(config: Config, persister: Arc<dyn Persister>) -> Result<Self> {
        config.validate()?;

        let expiration = ExpirationPolicy {
            expires_in: config.expires_in_duration()?,
            record_if_expired: config.record_if_expired,
        };

        Ok(Self {
            mode: RwLock::new(config.mode),
            timing: config.timing_policy(),
            config,
            persister,
            expiration,
            connectivity: Arc::new(ConnectivitySignal::default()),
            clock: Arc::new(SystemClock),
            handlers: Arc::from(Vec::new()),
            adapters: DashMap::new(),
            failures: AtomicUsize::new(0),
        })
    }

    /// Replace the timing policy
    #[must_use]
    pub fn with_timing(mut self, timing: Timing) -> Self {
        self.timing = timing;
        self
    }

    /// Replace the connectivity signal
    #[must_use]
    pub fn with_connectivity(mut self, connectivity: Arc<dyn Connectivity>) -> Self {
        self.connectivity = connectivity;
        self
    }

    /// Replace the clock
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Append a request handler
    #[must_use]
    pub fn with_handler(mut self, handler: Arc<dyn RequestHandler>) -> Self {
        let mut handlers = self.handlers.to_vec();
        handlers.push(handler);
        self.handlers = handlers.into();
        self
    }

    /// Session configuration
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Current mode
    pub async fn mode(&self) -> Mode {
        *self.mode.read().await
    }

    /// Switch to record mode
    pub async fn record(&self) {
        self.set_mode(Mode::Record).await;
    }

    /// Switch to replay mode
    pub async fn replay(&self) {
        self.set_mode(Mode::Replay).await;
    }

    /// Switch to passthrough mode
    pub async fn passthrough(&self) {
        self.set_mode(Mode::Passthrough).await;
    }

    async fn set_mode(&self, mode: Mode) {
        let mut current = self.mode.write().await;
        if *current != mode {
            info!("Session mode {:?} -> {:?}", *current, mode);
            *current = mode;
        }
    }

    /// Persistence collaborator
    #[must_use]
    pub fn persister(&self) -> &dyn Persister {
        self.persister.as_ref()
    }

    /// Expiration policy derived from configuration
    #[must_use]
    pub fn expiration(&self) -> &ExpirationPolicy {
        &self.expiration
    }

    /// Timing policy
    #[must_use]
    pub fn timing(&self) -> &Timing {
        &self.timing
    }

    /// Connectivity signal
    #[must_use]
    pub fn connectivity(&self) -> &dyn Connectivity {
        self.connectivity.as_ref()
    }

    /// Current time
    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Wrap a captured request for dispatch
    #[must_use]
    pub fn register_request(&self, raw: RawRequest) -> PollyRequest {
        let timestamp = u64::try_from(self.now().timestamp_millis()).unwrap_or_default();
        PollyRequest::new(raw, timestamp, Arc::clone(&self.handlers))
    }

    /// Fail with `err` unless `predicate` holds
    ///
    /// # Errors
    ///
    /// Returns `err()` when `predicate` is false
    pub fn assert(&self, predicate: bool, err: impl FnOnce() -> PollyError) -> Result<()> {
        if predicate {
            Ok(())
        } else {
            Err(self.fail(err()))
        }
    }

    /// Report a fatal condition and hand it back for propagation
    pub fn fail(&self, err: PollyError) -> PollyError {
        error!("{}", err);
        self.failures.fetch_add(1, Ordering::Relaxed);
        err
    }

    /// Route `err` through [`Session::fail`] when it is fatal
    pub fn escalate(&self, err: PollyError) -> PollyError {
        if err.is_fatal() {
            self.fail(err)
        } else {
            err
        }
    }

    /// Number of fatal conditions reported so far
    #[must_use]
    pub fn failure_count(&self) -> usize {
        self.failures.load(Ordering::Relaxed)
    }

    /// Return the adapter for this transport, creating and connecting it once
    ///
    /// # Errors
    ///
    /// Returns error if the integration lacks an `id` or fails to connect
    pub fn connect_to(self: &Arc<Self>, hooks: impl AdapterHooks + 'static) -> Result<Arc<Adapter>> {
        let id = hooks.id().map_err(|e| self.escalate(e))?;

        match self.adapters.entry(id) {
            Entry::Occupied(entry) => Ok(Arc::clone(entry.get())),
            Entry::Vacant(entry) => {
                let adapter = Arc::new(Adapter::new(Arc::clone(self), hooks));
                adapter.connect()?;
                Ok(Arc::clone(entry.insert(adapter).value()))
            }
        }
    }

    /// Disconnect and remove one adapter; unknown ids are ignored
    ///
    /// # Errors
    ///
    /// Returns error raised by the adapter's `on_disconnect` hook; the
    /// adapter then stays connected and registered
    pub fn disconnect_from(&self, id: &str) -> Result<()> {
        if let Some(adapter) = self.adapter(id) {
            adapter.disconnect()?;
            self.adapters.remove(id);
        }
        Ok(())
    }

    /// Disconnect and remove every adapter
    ///
    /// # Errors
    ///
    /// Returns the first error raised by an `on_disconnect` hook; adapters
    /// that failed to disconnect stay registered
    pub fn disconnect(&self) -> Result<()> {
        let adapters: Vec<_> = self
            .adapters
            .iter()
            .map(|entry| (entry.key().clone(), Arc::clone(entry.value())))
            .collect();

        let mut first_err = None;
        for (id, adapter) in adapters {
            match adapter.disconnect() {
                Ok(()) => {
                    self.adapters.remove(&id);
                }
                Err(e) => {
                    error!("Failed to disconnect adapter {}: {}", id, e);
                    first_err.get_or_insert(e);
                }
            }
        }

        first_err.map_or(Ok(()), Err)
    }

    /// Disconnect every adapter and stop handling requests
    ///
    /// # Errors
    ///
    /// Returns the first error raised by an `on_disconnect` hook
    pub async fn stop(&self) -> Result<()> {
        let result = self.disconnect();
        self.set_mode(Mode::Stopped).await;
        result
    }

    /// Look up a connected adapter by transport id
    #[must_use]
    pub fn adapter(&self, id: &str) -> Option<Arc<Adapter>> {
        self.adapters.get(id).map(|entry| Arc::clone(entry.value()))
    }

    /// Get the number of connected adapters
    #[must_use]
    pub fn adapter_count(&self) -> usize {
        self.adapters.len()
    }
}
