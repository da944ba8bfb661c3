//! Drift tuner
//!
//! Between two tuning wakes the co-processor keeps network time by counting
//! its own periods. Comparing that count with a fresh fetch tells how far
//! the wake period is off, and the period is rescaled by the same ratio.
//! Each accepted measurement also lengthens the time to the next one.

use core::fmt;

use crate::settings::Settings;
use crate::shared::SharedState;
use crate::time::{ClockTime, SECS_PER_WHEEL};

/// Network time and tuning counter captured before a fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DriftSample {
    pub net: ClockTime,
    pub sleep_count: u16,
}

impl DriftSample {
    pub fn capture(mem: &SharedState) -> Self {
        Self {
            net: mem.net,
            sleep_count: mem.sleep_count,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TuneOutcome {
    /// No fresh network time to compare against
    Unavailable,
    /// Drift too large to be real; nothing changed
    Aborted { diff: i32 },
    /// Interval escalated, wake period left alone
    WithinTolerance { diff: i32 },
    Retuned { diff: i32, old: u32, new: u32 },
}

impl fmt::Display for TuneOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TuneOutcome::Unavailable => write!(f, "no network time"),
            TuneOutcome::Aborted { diff } => write!(f, "aborted, drift {}s", diff),
            TuneOutcome::WithinTolerance { diff } => write!(f, "within tolerance, drift {}s", diff),
            TuneOutcome::Retuned { diff, old, new } => {
                write!(f, "drift {}s, wake period {} -> {}", diff, old, new)
            }
        }
    }
}

/// Signed seconds on the wheel, folded into (-6h, 6h]
fn fold(secs: i32) -> i32 {
    let wheel = SECS_PER_WHEEL as i32;
    let secs = secs.rem_euclid(wheel);
    if secs > wheel / 2 {
        secs - wheel
    } else {
        secs
    }
}

/// How many seconds the co-processor's network time ran ahead of the
/// freshly fetched `mem.net` since `before`
pub fn drift(before: DriftSample, mem: &SharedState) -> i32 {
    let offset = mem.sleep_count.wrapping_sub(before.sleep_count);
    let counted = before.net.as_secs() as i32 + i32::from(offset);
    fold(counted - mem.net.as_secs() as i32)
}

/// Apply one measurement to `mem`
///
/// `mem.net` must already hold the fetched time.
pub fn retune(mem: &mut SharedState, before: DriftSample, settings: &Settings) -> TuneOutcome {
    let diff = drift(before, mem);
    if diff.abs() > settings.drift_abort_secs {
        return TuneOutcome::Aborted { diff };
    }

    let interval = i64::from(mem.sleep_interval.max(1));
    let old = mem.wake_period;
    let new = if diff.abs() > settings.drift_tolerance_secs {
        let scaled = i64::from(old) * (interval + i64::from(diff)) / interval;
        match u32::try_from(scaled) {
            Ok(new) if new > 0 => Some(new),
            _ => return TuneOutcome::Aborted { diff },
        }
    } else {
        None
    };

    // clamps at the last level and re-applies its interval
    mem.set_tune_level(mem.tune_level.saturating_add(1), settings);

    match new {
        None => TuneOutcome::WithinTolerance { diff },
        Some(new) => {
            mem.wake_period = new;
            TuneOutcome::Retuned { diff, old, new }
        }
    }
}
