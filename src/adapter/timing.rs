//! Simulated replay latency

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Upper bound on any simulated replay delay
pub const MAX_DELAY: Duration = Duration::from_secs(60 * 60);

/// Computes how long to wait before delivering a replayed response
///
/// Inputs are the recorded request and response timestamps in milliseconds.
#[derive(Clone, Default)]
pub enum Timing {
    /// Deliver immediately
    #[default]
    None,
    /// Always wait the same amount
    Fixed(Duration),
    /// Wait the recorded latency scaled by a ratio
    Relative(f64),
    /// User-supplied function of `(request_ts, response_ts)`
    Custom(Arc<dyn Fn(u64, u64) -> Duration + Send + Sync>),
}

impl Timing {
    /// Wrap a user function
    pub fn custom<F>(f: F) -> Self
    where
        F: Fn(u64, u64) -> Duration + Send + Sync + 'static,
    {
        Self::Custom(Arc::new(f))
    }

    /// Delay for an interaction recorded at the given timestamps, capped
    /// at [`MAX_DELAY`]
    #[must_use]
    pub fn delay(&self, request_ts: u64, response_ts: u64) -> Duration {
        let delay = match self {
            Timing::None => Duration::ZERO,
            Timing::Fixed(delay) => *delay,
            Timing::Relative(ratio) if ratio.is_finite() && *ratio > 0.0 => {
                let span_ms = response_ts.saturating_sub(request_ts) as f64;
                Duration::try_from_secs_f64(span_ms * ratio / 1000.0).unwrap_or(MAX_DELAY)
            }
            Timing::Relative(_) => Duration::ZERO,
            Timing::Custom(f) => f(request_ts, response_ts),
        };
        delay.min(MAX_DELAY)
    }
}

impl fmt::Debug for Timing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Timing::None => f.write_str("None"),
            Timing::Fixed(delay) => f.debug_tuple("Fixed").field(delay).finish(),
            Timing::Relative(ratio) => f.debug_tuple("Relative").field(ratio).finish(),
            Timing::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_timing() {
        assert_eq!(Timing::None.delay(0, 250), Duration::ZERO);
    }

    #[test]
    fn test_fixed_timing() {
        let timing = Timing::Fixed(Duration::from_millis(40));
        assert_eq!(timing.delay(0, 250), Duration::from_millis(40));
        assert_eq!(timing.delay(900, 100), Duration::from_millis(40));
    }

    #[test]
    fn test_relative_timing() {
        assert_eq!(Timing::Relative(1.0).delay(0, 250), Duration::from_millis(250));
        assert_eq!(Timing::Relative(2.0).delay(100, 350), Duration::from_millis(500));
        assert_eq!(Timing::Relative(1.0).delay(350, 100), Duration::ZERO);
        assert_eq!(Timing::Relative(-1.0).delay(0, 250), Duration::ZERO);
        assert_eq!(Timing::Relative(f64::NAN).delay(0, 250), Duration::ZERO);
    }

    #[test]
    fn test_delay_is_capped() {
        assert_eq!(Timing::Relative(1e300).delay(0, 250), MAX_DELAY);
        assert_eq!(Timing::Relative(f64::MAX).delay(0, u64::MAX), MAX_DELAY);
        assert_eq!(Timing::Fixed(Duration::MAX).delay(0, 0), MAX_DELAY);
        assert_eq!(Timing::custom(|_, _| Duration::MAX).delay(0, 0), MAX_DELAY);
    }

    #[test]
    fn test_custom_timing() {
        let timing = Timing::custom(|req, res| Duration::from_millis(res - req));
        assert_eq!(timing.delay(0, 250), Duration::from_millis(250));
        assert_eq!(format!("{timing:?}"), "Custom(..)");
    }
}
