//! Tick engine
//!
//! Drives the Lavet motor through two lines. Consecutive pulses alternate
//! lines; a reverse step is a short pulse on one line then a long one on
//! the other. PWM is bit-banged as ten 100 µs slots per millisecond.

use core::convert::Infallible;

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::OutputPin;

use crate::settings::{Pulse, ReversePulse, Settings};
use crate::shared::{Cell, DriveLine, SharedState, TickAction, WakeReason};
use crate::stack::{Routine, StackFault};

/// PWM slot length
const SLOT_US: u32 = 100;
const SLOTS_PER_MS: u32 = 1000 / SLOT_US;

/// The two motor drive lines
#[derive(Debug)]
pub struct DriveLines<L> {
    pub a: L,
    pub b: L,
}

impl<L> DriveLines<L> {
    pub fn new(a: L, b: L) -> Self {
        Self { a, b }
    }

    fn line(&mut self, which: DriveLine) -> &mut L {
        match which {
            DriveLine::A => &mut self.a,
            DriveLine::B => &mut self.b,
        }
    }
}

/// Waveform output for one period
pub(crate) struct Waveform<'a, L, D> {
    lines: &'a mut DriveLines<L>,
    delay: &'a mut D,
}

impl<'a, L, D> Waveform<'a, L, D>
where
    L: OutputPin<Error = Infallible>,
    D: DelayNs,
{
    pub(crate) fn new(lines: &'a mut DriveLines<L>, delay: &'a mut D) -> Self {
        Self { lines, delay }
    }

    /// `ms` milliseconds of PWM at `duty` percent on `which`, ending low
    fn pulse(&mut self, which: DriveLine, duty: u32, ms: u32) {
        let on_us = duty.min(100) * SLOT_US / 100;
        let off_us = SLOT_US - on_us;
        let pin = self.lines.line(which);
        for _ in 0..ms * SLOTS_PER_MS {
            pin.set_high().unwrap_or_else(|e| match e {});
            if on_us > 0 {
                self.delay.delay_us(on_us);
            }
            pin.set_low().unwrap_or_else(|e| match e {});
            if off_us > 0 {
                self.delay.delay_us(off_us);
            }
        }
    }

    /// Filler
    pub(crate) fn idle(&mut self, ms: u32) {
        if ms > 0 {
            self.delay.delay_ms(ms);
        }
    }
}

/// Which time a clock routine steps
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Dial {
    Clock,
    Net,
}

impl Dial {
    /// Cell addresses passed as routine arguments, seconds first
    fn cells(self) -> [u16; 3] {
        let cells = match self {
            Dial::Clock => [Cell::ClkSs, Cell::ClkMm, Cell::ClkHh],
            Dial::Net => [Cell::NetSs, Cell::NetMm, Cell::NetHh],
        };
        cells.map(Cell::addr)
    }
}

/// One second forward on `dial`
pub(crate) fn advance(mem: &mut SharedState, dial: Dial) -> Result<(), StackFault> {
    let frame = mem.stack.call(Routine::IncClock, &dial.cells())?;
    match dial {
        Dial::Clock => mem.clk.increment(),
        Dial::Net => mem.net.increment(),
    }
    mem.stack.ret(frame)
}

/// One second back on `dial`
pub(crate) fn retreat(mem: &mut SharedState, dial: Dial) -> Result<(), StackFault> {
    let frame = mem.stack.call(Routine::DecClock, &dial.cells())?;
    match dial {
        Dial::Clock => mem.clk.decrement(),
        Dial::Net => mem.net.decrement(),
    }
    mem.stack.ret(frame)
}

/// Run the tick action for this period, consuming exactly one quantum
pub(crate) fn run<L, D>(
    mem: &mut SharedState,
    settings: &Settings,
    wave: &mut Waveform<'_, L, D>,
) -> Result<(), StackFault>
where
    L: OutputPin<Error = Infallible>,
    D: DelayNs,
{
    let profile = &settings.profile;
    match mem.tick_action {
        TickAction::None | TickAction::Normal if mem.gate_open(settings.normal_mask) => {
            step_forward(mem, wave, Routine::NormTick, profile.normal, profile.quantum_ms)
        }
        TickAction::Forward if mem.gate_open(settings.forward_mask) => {
            step_forward(mem, wave, Routine::FwdTick, profile.forward, profile.quantum_ms)
        }
        TickAction::Reverse if mem.gate_open(settings.reverse_mask) => {
            let second = mem.clk.ss();
            let routine = if profile.in_reverse_a(second) {
                Routine::RevTickA
            } else {
                Routine::RevTickB
            };
            let pulse = *profile.reverse_for(second);
            step_reverse(mem, wave, routine, pulse, profile.quantum_ms)
        }
        _ => {
            wave.idle(profile.quantum_ms);
            Ok(())
        }
    }
}

fn step_forward<L, D>(
    mem: &mut SharedState,
    wave: &mut Waveform<'_, L, D>,
    routine: Routine,
    pulse: Pulse,
    quantum_ms: u32,
) -> Result<(), StackFault>
where
    L: OutputPin<Error = Infallible>,
    D: DelayNs,
{
    let frame = mem.stack.call(routine, &[])?;
    wave.pulse(mem.tickpin, pulse.duty, pulse.ms);
    mem.tickpin.flip();
    wave.idle(quantum_ms.saturating_sub(pulse.ms));
    advance(mem, Dial::Clock)?;
    mem.stack.ret(frame)
}

fn step_reverse<L, D>(
    mem: &mut SharedState,
    wave: &mut Waveform<'_, L, D>,
    routine: Routine,
    pulse: ReversePulse,
    quantum_ms: u32,
) -> Result<(), StackFault>
where
    L: OutputPin<Error = Infallible>,
    D: DelayNs,
{
    let frame = mem.stack.call(routine, &[])?;
    wave.pulse(mem.tickpin, pulse.duty, pulse.short_ms);
    wave.idle(pulse.gap_ms);
    mem.tickpin.flip();
    wave.pulse(mem.tickpin, pulse.duty, pulse.long_ms);
    wave.idle(quantum_ms.saturating_sub(pulse.total_ms()));
    retreat(mem, Dial::Clock)?;
    mem.stack.ret(frame)
}

/// Once-per-second bookkeeping
///
/// Advances network time and the tuning counter, and counts down a
/// pending network time refresh. Returns whether the refresh fell due.
pub(crate) fn second_elapsed(mem: &mut SharedState) -> Result<bool, StackFault> {
    advance(mem, Dial::Net)?;
    mem.sleep_count = mem.sleep_count.saturating_add(1);
    if mem.update_pending == 0 {
        return Ok(false);
    }
    mem.update_pending -= 1;
    if mem.update_pending > 0 {
        return Ok(false);
    }
    mem.wake_reason = WakeReason::UpdateNetTime;
    Ok(true)
}
