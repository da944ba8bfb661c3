//! Direction engine
//!
//! Picks the next tick action from the distance between the hands and
//! network time. Short distances are made up by running forward at 8x;
//! long ones by stepping backwards at 4x, whichever finishes sooner.
//!
//! On a second boundary a reverse tick and the network time update close
//! two seconds at once, so a reverse catch-up can jump from 1 s ahead to
//! 1 s behind. The hands then settle inside the tolerance band and keep
//! that second until the next refresh.

use crate::settings::Settings;
use crate::shared::{SharedState, TickAction};
use crate::stack::{Routine, StackFault};
use crate::time::{ClockTime, SECS_PER_WHEEL};

/// Outcome of one evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    pub action: TickAction,
    /// Idle periods to insert before the next tick, if any
    pub delay: Option<u16>,
}

/// Choose the action following `prev` for a clock `diff` behind network time
///
/// - no distance: tick normally;
/// - distance at or above the threshold: reverse, otherwise forward;
/// - starting a catch-up is refused while the hands are within tolerance
///   of network time on either side of the dial;
/// - switching straight between forward and reverse idles one second,
///   settling from reverse into normal idles half a second.
pub fn decide(prev: TickAction, diff: ClockTime, settings: &Settings) -> Decision {
    if diff == ClockTime::ZERO {
        return settle(prev, settings);
    }

    let candidate = if diff.pack() >= settings.diff_threshold.pack() {
        TickAction::Reverse
    } else {
        TickAction::Forward
    };

    if prev != candidate && within_tolerance(diff, settings.tolerance_secs) {
        return settle(prev, settings);
    }

    let delay = match (prev, candidate) {
        (TickAction::Forward, TickAction::Reverse) | (TickAction::Reverse, TickAction::Forward) => {
            Some(settings.direction_switch_delay)
        }
        _ => None,
    };
    Decision {
        action: candidate,
        delay,
    }
}

fn settle(prev: TickAction, settings: &Settings) -> Decision {
    Decision {
        action: TickAction::Normal,
        delay: (prev == TickAction::Reverse).then_some(settings.reverse_settle_delay),
    }
}

/// Whether the hands are within `tolerance_secs` of network time, either side
fn within_tolerance(diff: ClockTime, tolerance_secs: u32) -> bool {
    let ahead = diff.as_secs();
    ahead < tolerance_secs || SECS_PER_WHEEL - ahead < tolerance_secs
}

/// Recompute `diff` and the next tick action
pub(crate) fn evaluate(mem: &mut SharedState, settings: &Settings) -> Result<(), StackFault> {
    let frame = mem.stack.call(Routine::CalcTimeDiff, &[])?;
    mem.diff = mem.clk.distance_to(mem.net);
    mem.stack.ret(frame)?;

    let prev = mem.tick_action;
    let decision = decide(prev, mem.diff, settings);
    mem.prev_tick_action = prev;
    mem.tick_action = decision.action;
    if let Some(delay) = decision.delay {
        mem.tick_delay = delay;
    }

    if decision.action != prev {
        debug!(
            "tick action {:?} -> {:?} (ct={} nt={})",
            prev,
            decision.action,
            mem.clk,
            mem.net
        );
    }
    Ok(())
}
