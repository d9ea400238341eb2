//! Polly Adapter - request dispatch core for HTTP record/replay harnesses
//!
//! Decides, once per intercepted request, whether to pass it through, hand it
//! to request handlers, replay a stored interaction or record a live one.

#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs, clippy::all, clippy::pedantic, clippy::cargo)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::multiple_crate_versions
)]

pub mod adapter;
pub mod config;
pub mod error;
pub mod fingerprint;
pub mod logging;
pub mod persister;
pub mod request;
pub mod session;

pub use adapter::{Action, Adapter, AdapterHooks, Handled, Timing};
pub use config::{Config, Mode};
pub use error::{PollyError, Result};
pub use persister::{MemoryPersister, Persister, RecordingEntry};
pub use request::{PollyRequest, RawRequest, RequestHandler, Response};
pub use session::Session;
