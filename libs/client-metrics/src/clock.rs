//! Time sources for the metrics tracer.
//!
//! Every duration a tracer reports is the difference of two [`Clock::now`]
//! readings. Production code uses [`SystemClock`]; tests inject a
//! [`ScriptedClock`] to replay an exact sequence of timestamps.

use chrono::{DateTime, TimeDelta, Utc};
use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};
use tracing::warn;

/// Capability that supplies the current wall-clock time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Clock backed by the system wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[derive(Debug)]
enum Script {
    Stepping { next: DateTime<Utc>, step: TimeDelta },
    Fixed {
        remaining: VecDeque<DateTime<Utc>>,
        last: Option<DateTime<Utc>>,
    },
}

/// Deterministic clock for tests.
///
/// Either advances by a fixed step on every reading, or hands out a fixed
/// list of timestamps in order. Once a fixed list is exhausted the last
/// timestamp is repeated.
#[derive(Debug)]
pub struct ScriptedClock {
    script: Mutex<Script>,
    calls: Mutex<usize>,
}

impl ScriptedClock {
    /// First reading returns `start`, each later reading is `step` further on.
    pub fn stepping(start: DateTime<Utc>, step: TimeDelta) -> Self {
        Self::with_script(Script::Stepping { next: start, step })
    }

    /// Readings return `timestamps` in order.
    pub fn from_timestamps(timestamps: impl IntoIterator<Item = DateTime<Utc>>) -> Self {
        Self::with_script(Script::Fixed {
            remaining: timestamps.into_iter().collect(),
            last: None,
        })
    }

    /// Readings return `UNIX_EPOCH + millis` for each entry in order.
    pub fn from_millis(millis: impl IntoIterator<Item = i64>) -> Self {
        Self::from_timestamps(
            millis
                .into_iter()
                .map(|ms| DateTime::<Utc>::UNIX_EPOCH + TimeDelta::milliseconds(ms)),
        )
    }

    /// Number of times [`Clock::now`] has been called.
    pub fn calls(&self) -> usize {
        *self.calls.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn with_script(script: Script) -> Self {
        Self {
            script: Mutex::new(script),
            calls: Mutex::new(0),
        }
    }
}

impl Clock for ScriptedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.calls.lock().unwrap_or_else(PoisonError::into_inner) += 1;
        let mut script = self.script.lock().unwrap_or_else(PoisonError::into_inner);
        match &mut *script {
            Script::Stepping { next, step } => {
                let current = *next;
                *next = current + *step;
                current
            }
            Script::Fixed { remaining, last } => match remaining.pop_front() {
                Some(ts) => {
                    *last = Some(ts);
                    ts
                }
                None => {
                    warn!("Scripted clock exhausted, repeating last timestamp");
                    last.unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
                }
            },
        }
    }
}

/// Elapsed time between two readings, clamped at zero.
pub(crate) fn elapsed(start: DateTime<Utc>, end: DateTime<Utc>) -> std::time::Duration {
    (end - start).to_std().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_stepping_clock_advances() {
        let clock = ScriptedClock::stepping(DateTime::<Utc>::UNIX_EPOCH, TimeDelta::seconds(1));
        let first = clock.now();
        let second = clock.now();
        assert_eq!(first, DateTime::<Utc>::UNIX_EPOCH);
        assert_eq!(elapsed(first, second), Duration::from_secs(1));
        assert_eq!(clock.calls(), 2);
    }

    #[test]
    fn test_fixed_clock_repeats_last_when_exhausted() {
        let clock = ScriptedClock::from_millis([5, 12]);
        assert_eq!(clock.now().timestamp_millis(), 5);
        assert_eq!(clock.now().timestamp_millis(), 12);
        assert_eq!(clock.now().timestamp_millis(), 12);
    }

    #[test]
    fn test_elapsed_clamps_negative_span() {
        let later = DateTime::<Utc>::UNIX_EPOCH + TimeDelta::seconds(10);
        assert_eq!(elapsed(later, DateTime::<Utc>::UNIX_EPOCH), Duration::ZERO);
    }

    #[test]
    fn test_system_clock_is_monotonic_enough() {
        let clock = SystemClock;
        let a = clock.now();
        let b = clock.now();
        assert!(b >= a);
    }
}
