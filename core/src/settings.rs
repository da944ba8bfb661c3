//! Tunable constants of the clock
//!
//! Everything here is fixed at build time on the target; tests and the
//! simulator construct variants. Defaults are tuned for a Lavet stepping
//! motor of a 30 cm wall clock driven from a 4xAA/LiPo supply.

use crate::time::{ClockTime, SECS_PER_WHEEL};

/// Co-processor program runs per second at the nominal wake period
pub const CALLS_PER_SEC: u32 = 8;

/// Length of the call-count cycle; `call_count` stays below this
pub const CALL_CYCLE: u8 = 8;

/// Number of entries in the tune interval schedule
pub const TUNE_LEVELS: usize = 5;

/// One drive pulse: `ms` milliseconds of PWM at `duty` percent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Pulse {
    pub ms: u32,
    pub duty: u32,
}

/// Reverse step: short pulse on one line, gap, long pulse on the other
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ReversePulse {
    pub short_ms: u32,
    pub gap_ms: u32,
    pub long_ms: u32,
    pub duty: u32,
}

impl ReversePulse {
    pub const fn total_ms(&self) -> u32 {
        self.short_ms + self.gap_ms + self.long_ms
    }
}

/// Drive waveform timing
///
/// Every tick-engine invocation consumes exactly `quantum_ms` of delay,
/// padding with idle time after the pulse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TickProfile {
    pub quantum_ms: u32,
    pub normal: Pulse,
    pub forward: Pulse,
    /// Used while the second hand is in `reverse_a_seconds`
    pub reverse_a: ReversePulse,
    /// Used for the rest of the dial
    pub reverse_b: ReversePulse,
    /// Half-open range `[start, end)` of second-hand positions
    pub reverse_a_seconds: (u8, u8),
}

impl TickProfile {
    pub const fn new() -> Self {
        Self {
            quantum_ms: 60,
            normal: Pulse { ms: 31, duty: 60 },
            forward: Pulse { ms: 31, duty: 65 },
            reverse_a: ReversePulse {
                short_ms: 9,
                gap_ms: 5,
                long_ms: 23,
                duty: 85,
            },
            reverse_b: ReversePulse {
                short_ms: 9,
                gap_ms: 5,
                long_ms: 23,
                duty: 85,
            },
            reverse_a_seconds: (35, 55),
        }
    }

    /// Whether the second hand is in the region driven with `reverse_a`
    pub fn in_reverse_a(&self, second: u8) -> bool {
        let (start, end) = self.reverse_a_seconds;
        (start..end).contains(&second)
    }

    /// The reverse waveform for the given second-hand position
    pub fn reverse_for(&self, second: u8) -> &ReversePulse {
        if self.in_reverse_a(second) {
            &self.reverse_a
        } else {
            &self.reverse_b
        }
    }

    /// Whether every waveform fits in one quantum
    pub fn is_valid(&self) -> bool {
        self.normal.ms <= self.quantum_ms
            && self.forward.ms <= self.quantum_ms
            && self.reverse_a.total_ms() <= self.quantum_ms
            && self.reverse_b.total_ms() <= self.quantum_ms
            && self.normal.duty <= 100
            && self.forward.duty <= 100
            && self.reverse_a.duty <= 100
            && self.reverse_b.duty <= 100
    }
}

impl Default for TickProfile {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Settings {
    pub profile: TickProfile,

    /// A normal tick happens when `call_count & normal_mask == 0`
    pub normal_mask: u8,
    /// A forward tick happens when `call_count & forward_mask == 0`
    pub forward_mask: u8,
    /// A reverse tick happens when `call_count & reverse_mask == 0`
    pub reverse_mask: u8,

    /// Packed distances at or above this reverse, below it go forward
    pub diff_threshold: ClockTime,
    /// Distances closer than this (either way round) do not start a catch-up
    pub tolerance_secs: u32,
    /// Periods to idle when switching directly between catch-up directions
    pub direction_switch_delay: u16,
    /// Periods to idle after reverse catch-up settles
    pub reverse_settle_delay: u16,

    /// Below this the clock pauses
    pub supply_low_mv: u32,
    /// At or above this a paused clock restarts
    pub supply_high_mv: u32,

    /// Seconds between drift tunes, by tune level
    pub tune_intervals: [u16; TUNE_LEVELS],
    /// Added to the tune interval when a tune falls due mid catch-up
    pub catch_up_extension_secs: u16,
    /// Tune interval while the network is unreachable
    pub offline_interval_secs: u16,
    /// Seconds after cold boot before the first network time update
    pub boot_update_delay_secs: u16,
    /// Drift beyond this is treated as a bad measurement
    pub drift_abort_secs: i32,
    /// Drift within this does not touch the wake period
    pub drift_tolerance_secs: i32,

    /// Button debounce and release-poll interval
    pub debounce_ms: u32,
    /// Hold time that turns a button press into a factory reset
    pub long_press_ms: u32,
    pub long_press_poll_ms: u32,
    /// Idle time before a hardware reset
    pub reset_settle_ms: u32,
    /// How long auto-connect may offer the portal before giving up
    pub portal_timeout_secs: u16,

    /// Used when no time server URL has been configured
    pub default_url: &'static str,
    pub default_timezone: &'static str,
}

impl Settings {
    pub const fn new() -> Self {
        Self {
            profile: TickProfile::new(),
            normal_mask: 7,
            forward_mask: 0,
            reverse_mask: 1,
            diff_threshold: ClockTime::at(7, 0, 2),
            tolerance_secs: 30,
            direction_switch_delay: 8,
            reverse_settle_delay: 4,
            supply_low_mv: 4200,
            supply_high_mv: 4200 + 200,
            tune_intervals: [300, 900, 1800, 3600, 7200],
            catch_up_extension_secs: 300,
            offline_interval_secs: 60,
            boot_update_delay_secs: 5,
            drift_abort_secs: 60,
            drift_tolerance_secs: 5,
            debounce_ms: 50,
            long_press_ms: 1000,
            long_press_poll_ms: 5,
            reset_settle_ms: 500,
            portal_timeout_secs: 10,
            default_url: "http://espclock.randseq.org/now.php?tz=[tz]",
            default_timezone: "UTC",
        }
    }

    /// Wake period that gives [`CALLS_PER_SEC`] runs per second
    ///
    /// Each run already spends one quantum busy, so the timer only has to
    /// cover the rest of the 125 ms slot.
    pub const fn default_wake_period(&self) -> u32 {
        (1000 / CALLS_PER_SEC - self.profile.quantum_ms) * 1000
    }

    /// Tune interval for `level`, clamped to the last schedule entry
    pub fn tune_interval(&self, level: u8) -> u16 {
        let level = usize::from(level).min(TUNE_LEVELS - 1);
        self.tune_intervals[level]
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self::new()
    }
}

/// Seconds until a catch-up of `distance` seconds converges
///
/// The hands gain (or lose) one second every `speedup` seconds, so each
/// round closes half the remaining distance until it is within two steps.
fn catch_up_secs(direction: i32, mut distance: i32, speedup: i32) -> i32 {
    let mut elapsed = 0;
    while distance > speedup * 2 {
        let interval = distance / 2 / speedup;
        elapsed += interval;
        distance = distance - interval * speedup + interval * direction;
    }
    elapsed + distance / speedup
}

/// The distance at which forward and reverse catch-up take equally long
///
/// `forward_speedup` and `reverse_speedup` are how many times faster than
/// real time the hands move in each catch-up mode. Searches distances from
/// three to ten hours; returns the first crossover found.
pub fn crossover_threshold(forward_speedup: u16, reverse_speedup: u16) -> Option<ClockTime> {
    let fwd = i32::from(forward_speedup);
    let rev = i32::from(reverse_speedup);
    if fwd == 0 || rev == 0 {
        return None;
    }
    let wheel = SECS_PER_WHEEL as i32;
    (3 * 3600..10 * 3600)
        .find(|&secs| catch_up_secs(1, secs, fwd) == catch_up_secs(-1, wheel - secs, rev))
        .map(|secs| ClockTime::from_secs(secs as u32))
}
