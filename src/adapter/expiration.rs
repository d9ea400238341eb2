//! Age-based staleness of stored entries

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::warn;

use crate::persister::RecordingEntry;

const SECOND_MS: f64 = 1_000.0;
const MINUTE_MS: f64 = 60.0 * SECOND_MS;
const HOUR_MS: f64 = 60.0 * MINUTE_MS;
const DAY_MS: f64 = 24.0 * HOUR_MS;
const WEEK_MS: f64 = 7.0 * DAY_MS;
const MONTH_MS: f64 = 30.0 * DAY_MS;
const YEAR_MS: f64 = 365.0 * DAY_MS;

/// Source of the process connectivity signal
pub trait Connectivity: Send + Sync {
    /// Whether the process can currently reach the network
    fn is_online(&self) -> bool;
}

/// Settable connectivity flag, online by default
#[derive(Debug)]
pub struct ConnectivitySignal {
    online: AtomicBool,
}

impl ConnectivitySignal {
    /// Create a signal with the given initial state
    #[must_use]
    pub fn new(online: bool) -> Self {
        Self {
            online: AtomicBool::new(online),
        }
    }

    /// Update the signal
    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::Relaxed);
    }
}

impl Default for ConnectivitySignal {
    fn default() -> Self {
        Self::new(true)
    }
}

impl Connectivity for ConnectivitySignal {
    fn is_online(&self) -> bool {
        self.online.load(Ordering::Relaxed)
    }
}

/// Parse an expiry such as `"30d"`, `"1y 2mo"`, `"1.5h"` or `"500ms"`
///
/// Units: `y` (365 days), `mo` (30 days), `w`, `d`, `h`, `m`, `s`, `ms`.
/// Returns `None` for empty or malformed input.
#[must_use]
pub fn parse_expires_in(input: &str) -> Option<Duration> {
    let mut rest = input.trim();
    if rest.is_empty() {
        return None;
    }

    let mut total_ms = 0.0_f64;
    while !rest.is_empty() {
        let number_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        let value: f64 = rest[..number_len].parse().ok()?;
        rest = rest[number_len..].trim_start();

        let unit_len = rest
            .find(|c: char| !c.is_ascii_alphabetic())
            .unwrap_or(rest.len());
        let unit_ms = match &rest[..unit_len] {
            "y" => YEAR_MS,
            "mo" => MONTH_MS,
            "w" => WEEK_MS,
            "d" => DAY_MS,
            "h" => HOUR_MS,
            "m" => MINUTE_MS,
            "s" => SECOND_MS,
            "ms" => 1.0,
            _ => return None,
        };
        rest = rest[unit_len..].trim_start_matches([' ', ',']);

        total_ms += value * unit_ms;
    }

    Duration::try_from_secs_f64(total_ms / SECOND_MS).ok()
}

/// Whether an entry created at `created_at` is older than `expires_in`
///
/// `None` means entries never expire.
#[must_use]
pub fn is_expired(created_at: DateTime<Utc>, now: DateTime<Utc>, expires_in: Option<Duration>) -> bool {
    let Some(limit) = expires_in.and_then(|d| chrono::Duration::from_std(d).ok()) else {
        return false;
    };

    now.signed_duration_since(created_at) > limit
}

/// Decides whether a stale entry is swapped for a fresh recording
#[derive(Debug, Clone, Copy, Default)]
pub struct ExpirationPolicy {
    /// Maximum entry age, `None` for never
    pub expires_in: Option<Duration>,
    /// Whether expired entries may be re-recorded
    pub record_if_expired: bool,
}

impl ExpirationPolicy {
    /// Whether `entry` should be re-recorded instead of replayed
    ///
    /// An expired entry is still replayed when re-recording is disabled or
    /// the process is offline; both cases log a warning.
    #[must_use]
    pub fn should_re_record(
        &self,
        entry: &RecordingEntry,
        now: DateTime<Utc>,
        connectivity: &dyn Connectivity,
    ) -> bool {
        if !is_expired(entry.created_at, now, self.expires_in) {
            return false;
        }

        if !self.record_if_expired {
            warn!(
                "[Polly] Recording for the following request has expired but `recordIfExpired` is `false`.\n{} {}",
                entry.request.method, entry.request.url
            );
            return false;
        }

        if !connectivity.is_online() {
            warn!(
                "[Polly] Recording for the following request has expired but the process is offline.\n{} {}",
                entry.request.method, entry.request.url
            );
            return false;
        }

        true
    }
}
