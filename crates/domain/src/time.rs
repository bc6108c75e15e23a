//! Time helpers: UTC timestamps and validated watch durations.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// UTC timestamp attached to every published event.
pub type Timestamp = DateTime<Utc>;

/// Return the current UTC time.
#[must_use]
pub fn now() -> Timestamp {
    Utc::now()
}

/// Number of seconds a watch waits for activity before it fires.
///
/// Always finite and strictly positive. Two watches with the same duration
/// produce events that compare equal on this field, which is what listeners
/// filter on.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct WatchDuration(f64);

impl WatchDuration {
    /// Validate a duration given in seconds.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidDuration`] for zero, negative,
    /// NaN or infinite values, and for values too large for a [`Duration`].
    pub fn from_secs(seconds: f64) -> Result<Self, ValidationError> {
        if seconds > 0.0 && Duration::try_from_secs_f64(seconds).is_ok() {
            Ok(Self(seconds))
        } else {
            Err(ValidationError::InvalidDuration { seconds })
        }
    }

    #[must_use]
    pub fn as_secs(self) -> f64 {
        self.0
    }

    #[must_use]
    pub fn as_duration(self) -> Duration {
        Duration::try_from_secs_f64(self.0).unwrap_or(Duration::MAX)
    }
}

impl TryFrom<f64> for WatchDuration {
    type Error = ValidationError;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        Self::from_secs(value)
    }
}

impl From<WatchDuration> for f64 {
    fn from(value: WatchDuration) -> Self {
        value.0
    }
}

impl std::fmt::Display for WatchDuration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}s", self.0)
    }
}

/// Convert a timer delay in seconds into a [`Duration`].
///
/// Zero is allowed (fire on the next scheduler turn).
///
/// # Errors
///
/// Returns [`ValidationError::InvalidDelay`] for negative, NaN or infinite values.
pub fn delay_from_secs(seconds: f64) -> Result<Duration, ValidationError> {
    Duration::try_from_secs_f64(seconds).map_err(|_| ValidationError::InvalidDelay { seconds })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_return_current_utc_time() {
        let before = Utc::now();
        let ts = now();
        assert!(ts >= before);
    }

    #[test]
    fn should_accept_fractional_duration() {
        let d = WatchDuration::from_secs(0.5).unwrap();
        assert_eq!(d.as_duration(), Duration::from_millis(500));
    }

    #[test]
    fn should_reject_zero_negative_and_nan_durations() {
        assert!(WatchDuration::from_secs(0.0).is_err());
        assert!(WatchDuration::from_secs(-3.0).is_err());
        assert!(WatchDuration::from_secs(f64::NAN).is_err());
        assert!(WatchDuration::from_secs(f64::INFINITY).is_err());
    }

    #[test]
    fn should_reject_duration_too_large_for_std_duration() {
        assert_eq!(
            WatchDuration::from_secs(1e20),
            Err(ValidationError::InvalidDuration { seconds: 1e20 })
        );
        assert!(WatchDuration::from_secs(f64::MAX).is_err());
    }

    #[test]
    fn should_convert_largest_accepted_duration() {
        let d = WatchDuration::from_secs(1e19).unwrap();
        assert_eq!(d.as_duration().as_secs(), 10_000_000_000_000_000_000);
    }

    #[test]
    fn should_reject_negative_duration_when_deserializing() {
        let result: Result<WatchDuration, _> = serde_json::from_str("-1.0");
        assert!(result.is_err());
    }

    #[test]
    fn should_display_duration_with_unit() {
        assert_eq!(WatchDuration::from_secs(10.0).unwrap().to_string(), "10s");
    }

    #[test]
    fn should_allow_zero_delay_but_not_negative() {
        assert_eq!(delay_from_secs(0.0).unwrap(), Duration::ZERO);
        assert_eq!(
            delay_from_secs(-0.1),
            Err(ValidationError::InvalidDelay { seconds: -0.1 })
        );
    }
}
