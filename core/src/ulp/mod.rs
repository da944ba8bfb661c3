//! The co-processor program
//!
//! One call of [`Coprocessor::run_period`] is one wake of the co-processor
//! (every ~125 ms). A period runs, in order:
//!
//! 1. the supply check (once per second)
//! 2. the button check
//! 3. the pause check
//! 4. the tick engine, or an idle quantum while a direction change settles
//! 5. the per-second bookkeeping of network time and counters
//! 6. the direction engine and the tuning check
//!
//! and ends by halting until the next period or by waking the primary.

pub mod button;
pub mod direction;
pub mod power;
pub mod tick;

use core::convert::Infallible;

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{InputPin, OutputPin};
use hal_abstractions::adc::SupplyAdc;

use crate::settings::Settings;
use crate::shared::{PauseState, SharedState, TickAction, WakeReason};
use crate::stack::StackFault;

pub use tick::DriveLines;

/// How a period ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PeriodOutcome {
    /// Sleep until the next period
    Halt,
    /// Wake the primary controller, then sleep
    Wake,
}

/// Common exit points of the program
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Exit {
    Halt,
    Wake,
    /// Unpause, reset the counters and ask for fresh network time
    RestartClock,
}

/// Everything the co-processor can touch besides shared memory
pub struct Peripherals<L, B, A, D> {
    pub lines: DriveLines<L>,
    /// Active low
    pub button: B,
    pub adc: A,
    pub delay: D,
}

pub struct Coprocessor<L, B, A, D> {
    io: Peripherals<L, B, A, D>,
    settings: Settings,
}

impl<L, B, A, D> Coprocessor<L, B, A, D>
where
    L: OutputPin<Error = Infallible>,
    B: InputPin<Error = Infallible>,
    A: SupplyAdc,
    D: DelayNs,
{
    pub fn new(io: Peripherals<L, B, A, D>, settings: Settings) -> Self {
        Self { io, settings }
    }

    pub fn peripherals(&mut self) -> &mut Peripherals<L, B, A, D> {
        &mut self.io
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Run one period against `mem`
    pub fn run_period(&mut self, mem: &mut SharedState) -> PeriodOutcome {
        if !mem.stack.is_empty() {
            warn!("call stack not empty on entry ({} words)", mem.stack.depth());
            mem.stack.clear();
        }

        let exit = match self.program(mem) {
            Ok(exit) if mem.stack.is_empty() => exit,
            Ok(_) => {
                error!(
                    "{}",
                    StackFault::Leaked {
                        depth: mem.stack.depth()
                    }
                );
                mem.stack.clear();
                Exit::Halt
            }
            Err(fault) => {
                error!("{}", fault);
                mem.stack.clear();
                Exit::Halt
            }
        };

        match exit {
            Exit::Halt => {
                mem.advance_call_count();
                PeriodOutcome::Halt
            }
            Exit::Wake => {
                mem.advance_call_count();
                PeriodOutcome::Wake
            }
            Exit::RestartClock => {
                restart_clock(mem);
                PeriodOutcome::Wake
            }
        }
    }

    fn program(&mut self, mem: &mut SharedState) -> Result<Exit, StackFault> {
        let settings = &self.settings;
        let io = &mut self.io;

        if let Some(exit) = power::check_supply(mem, settings, &mut io.adc) {
            return Ok(exit);
        }
        if let Some(exit) = button::check_button(mem, settings, &mut io.button, &mut io.delay) {
            return Ok(exit);
        }
        if mem.pause != PauseState::Running {
            return Ok(Exit::Halt);
        }

        let mut wave = tick::Waveform::new(&mut io.lines, &mut io.delay);
        let settling = mem.tick_delay > 0;
        if settling {
            mem.tick_delay -= 1;
            wave.idle(settings.profile.quantum_ms);
        } else {
            tick::run(mem, settings, &mut wave)?;
        }

        let mut wake = false;
        if mem.gate_open(settings.normal_mask) {
            wake = tick::second_elapsed(mem)?;
        }
        if settling {
            return Ok(if wake { Exit::Wake } else { Exit::Halt });
        }

        direction::evaluate(mem, settings)?;
        if check_tune(mem, settings) {
            wake = true;
        }
        Ok(if wake { Exit::Wake } else { Exit::Halt })
    }
}

/// Whether a drift tune is due
///
/// A tune that falls due while the hands are still catching up is
/// postponed by extending the interval instead.
fn check_tune(mem: &mut SharedState, settings: &Settings) -> bool {
    if mem.sleep_count < mem.sleep_interval {
        return false;
    }
    if mem.tick_action != TickAction::Normal {
        mem.sleep_interval = mem
            .sleep_interval
            .saturating_add(settings.catch_up_extension_secs);
        return false;
    }
    mem.sleep_count = 0;
    mem.wake_reason = WakeReason::TuneTimer;
    true
}

fn restart_clock(mem: &mut SharedState) {
    mem.pause = PauseState::Running;
    mem.call_count = 0;
    mem.sleep_count = 0;
    mem.wake_reason = WakeReason::UpdateNetTime;
}
