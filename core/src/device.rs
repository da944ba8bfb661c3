//! Whole-device simulation
//!
//! [`Device`] owns the shared memory and both actors and plays the part of
//! the chip's power management: one [`Device::step`] is one co-processor
//! period, followed by a primary controller run when the period asks for
//! one. Every hand-over of shared memory goes through
//! [`SharedMemory::lease`], which keeps an audit trail of who held it and
//! which cells they changed.

use core::convert::Infallible;
use core::ops::{Deref, DerefMut};

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{InputPin, OutputPin};
use hal_abstractions::adc::SupplyAdc;
use heapless::HistoryBuffer;

use crate::primary::{Fatal, Platform, PrimaryController, SleepDirective, WakeupCause};
use crate::shared::SharedState;
use crate::ulp::{Coprocessor, PeriodOutcome};

/// Leases remembered by the audit trail
pub const AUDIT_DEPTH: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Actor {
    Coprocessor,
    Primary,
}

/// One completed lease
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LeaseRecord {
    /// Period (or boot) during which the lease was held
    pub period: u32,
    pub actor: Actor,
    /// [`crate::shared::Cell::bit`]s written
    pub changed: u32,
}

/// Shared memory with single-holder access
pub struct SharedMemory {
    state: SharedState,
    audit: HistoryBuffer<LeaseRecord, AUDIT_DEPTH>,
}

impl SharedMemory {
    pub fn new(state: SharedState) -> Self {
        Self {
            state,
            audit: HistoryBuffer::new(),
        }
    }

    pub fn state(&self) -> &SharedState {
        &self.state
    }

    /// Hand the memory to `actor` until the lease is dropped
    pub fn lease(&mut self, actor: Actor, period: u32) -> Lease<'_> {
        trace!("period {}: lease to {:?}", period, actor);
        Lease {
            before: self.state.clone(),
            memory: self,
            actor,
            period,
        }
    }

    /// Completed leases, oldest first
    pub fn audit(&self) -> impl Iterator<Item = &LeaseRecord> {
        self.audit.oldest_ordered()
    }

    /// Zero the memory, as a hardware reset does
    fn reset(&mut self) {
        self.state = SharedState::zeroed();
    }
}

/// Exclusive access to [`SharedState`] for one actor
pub struct Lease<'a> {
    memory: &'a mut SharedMemory,
    before: SharedState,
    actor: Actor,
    period: u32,
}

impl Deref for Lease<'_> {
    type Target = SharedState;

    fn deref(&self) -> &SharedState {
        &self.memory.state
    }
}

impl DerefMut for Lease<'_> {
    fn deref_mut(&mut self) -> &mut SharedState {
        &mut self.memory.state
    }
}

impl Drop for Lease<'_> {
    fn drop(&mut self) {
        let changed = self.before.changed_cells(&self.memory.state);
        self.memory.audit.write(LeaseRecord {
            period: self.period,
            actor: self.actor,
            changed,
        });
    }
}

/// Power state of the simulated chip
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DeviceState {
    /// Powered but not booted, or just reset
    Off,
    /// Co-processor running, primary in deep sleep
    Running,
    /// Deep sleep with no wake source
    Halted(Fatal),
}

/// What one step did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Step {
    /// Cold boot ran
    Boot(SleepDirective),
    /// A co-processor period ran; `Some` if it woke the primary
    Period(PeriodOutcome, Option<SleepDirective>),
    /// Nothing can run
    Inert,
}

pub struct Device<L, B, A, D, P> {
    coprocessor: Coprocessor<L, B, A, D>,
    primary: PrimaryController<P>,
    memory: SharedMemory,
    state: DeviceState,
    period: u32,
}

impl<L, B, A, D, P> Device<L, B, A, D, P>
where
    L: OutputPin<Error = Infallible>,
    B: InputPin<Error = Infallible>,
    A: SupplyAdc,
    D: DelayNs,
    P: Platform,
{
    pub fn new(coprocessor: Coprocessor<L, B, A, D>, primary: PrimaryController<P>) -> Self {
        Self {
            coprocessor,
            primary,
            memory: SharedMemory::new(SharedState::zeroed()),
            state: DeviceState::Off,
            period: 0,
        }
    }

    pub fn state(&self) -> DeviceState {
        self.state
    }

    pub fn memory(&self) -> &SharedMemory {
        &self.memory
    }

    /// Periods elapsed, a boot counting as one
    pub fn periods(&self) -> u32 {
        self.period
    }

    pub fn coprocessor(&mut self) -> &mut Coprocessor<L, B, A, D> {
        &mut self.coprocessor
    }

    pub fn primary(&mut self) -> &mut PrimaryController<P> {
        &mut self.primary
    }

    /// Cold boot, if not already running
    pub async fn power_on(&mut self) -> Step {
        if self.state != DeviceState::Off {
            return Step::Inert;
        }
        let directive = self.run_primary(WakeupCause::ColdBoot).await;
        self.period = self.period.wrapping_add(1);
        Step::Boot(directive)
    }

    /// Advance the device by one co-processor period
    ///
    /// A device that was reset boots instead.
    pub async fn step(&mut self) -> Step {
        match self.state {
            DeviceState::Off => return self.power_on().await,
            DeviceState::Halted(_) => return Step::Inert,
            DeviceState::Running => {}
        }

        let outcome = {
            let mut mem = self.memory.lease(Actor::Coprocessor, self.period);
            self.coprocessor.run_period(&mut mem)
        };
        let directive = match outcome {
            PeriodOutcome::Halt => None,
            PeriodOutcome::Wake => Some(self.run_primary(WakeupCause::Coprocessor).await),
        };
        self.period = self.period.wrapping_add(1);
        Step::Period(outcome, directive)
    }

    async fn run_primary(&mut self, cause: WakeupCause) -> SleepDirective {
        let directive = {
            let mut mem = self.memory.lease(Actor::Primary, self.period);
            self.primary.boot(cause, &mut mem).await
        };
        self.state = match directive {
            SleepDirective::StartCoprocessor | SleepDirective::ResumeCoprocessor => {
                DeviceState::Running
            }
            SleepDirective::Halt(fatal) => DeviceState::Halted(fatal),
            SleepDirective::HardwareReset => {
                self.memory.reset();
                DeviceState::Off
            }
        };
        directive
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::Settings;
    use crate::shared::{Cell, PauseState, TickAction, WakeReason};
    use crate::testing::{MockAdc, MockDelay, MockPin, MockPlatform};
    use crate::time::ClockTime;
    use crate::ulp::{DriveLines, Peripherals};
    use embassy_futures::block_on;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    type TestDevice = Device<MockPin, MockPin, MockAdc, MockDelay, MockPlatform>;

    struct Rig {
        device: TestDevice,
        button: MockPin,
        adc: MockAdc,
        platform: MockPlatform,
    }

    impl Rig {
        fn new() -> Self {
            let button = MockPin::released();
            let adc = MockAdc::new(3000);
            let io = Peripherals {
                lines: DriveLines::new(MockPin::new(), MockPin::new()),
                button: button.clone(),
                adc: adc.clone(),
                delay: MockDelay::new(),
            };
            let mut platform = MockPlatform::new();
            // the co-processor and the primary see the same button
            platform.button = button.clone();
            platform.wifi.set_reachable(true);
            platform.wifi.submit_form("013000", "UTC", "http://t.example/?tz=[tz]");
            let device = Device::new(
                Coprocessor::new(io, Settings::new()),
                PrimaryController::new(platform.clone(), Settings::new()),
            );
            Self {
                device,
                button,
                adc,
                platform,
            }
        }

        fn step(&mut self) -> Step {
            block_on(self.device.step())
        }

        fn mem(&self) -> &SharedState {
            self.device.memory().state()
        }

        /// Run until the co-processor wakes the primary
        fn run_until_wake(&mut self, max_periods: u32) -> Option<SleepDirective> {
            (0..max_periods).find_map(|_| match self.step() {
                Step::Period(_, directive) => directive,
                _ => None,
            })
        }
    }

    #[test]
    fn test_first_boot_then_first_tick() {
        let mut rig = Rig::new();
        assert_eq!(rig.step(), Step::Boot(SleepDirective::StartCoprocessor));
        assert_eq!(rig.device.state(), DeviceState::Running);
        assert_eq!(rig.mem().clk, ClockTime::at(1, 30, 0));
        assert_eq!(rig.mem().net, ClockTime::at(1, 30, 0));
        let wake_period = rig.device.coprocessor().settings().default_wake_period();
        assert_eq!(rig.device.primary().platform().timer.periods(), [wake_period]);

        assert_eq!(rig.step(), Step::Period(PeriodOutcome::Halt, None));
        assert_eq!(rig.mem().tick_action, TickAction::Normal);
        assert_eq!(rig.mem().clk, ClockTime::at(1, 30, 1));
    }

    #[test]
    fn test_boot_update_catches_up() {
        let mut rig = Rig::new();
        rig.step();
        rig.platform.http.respond(200, "13:31:10");

        // the refresh is due five seconds after boot
        assert_eq!(
            rig.run_until_wake(5 * 8),
            Some(SleepDirective::ResumeCoprocessor)
        );
        assert_eq!(rig.mem().net, ClockTime::at(1, 31, 10));
        assert_eq!(rig.mem().wake_reason, WakeReason::None);

        // 65 s behind: forward at eight steps per second
        for _ in 0..20 * 8 {
            rig.step();
        }
        assert_eq!(rig.mem().clk, rig.mem().net);
        assert_eq!(rig.mem().tick_action, TickAction::Normal);
    }

    #[test]
    fn test_pause_and_resume_with_button() {
        let mut rig = Rig::new();
        rig.step();
        for _ in 0..8 {
            rig.step();
        }

        rig.button.push_script(&[false, false, true]);
        assert_eq!(
            rig.step(),
            Step::Period(
                PeriodOutcome::Wake,
                Some(SleepDirective::ResumeCoprocessor)
            )
        );
        assert_eq!(rig.mem().pause, PauseState::ArmedForResume);

        let clk = rig.mem().clk;
        for _ in 0..16 {
            rig.step();
        }
        assert_eq!(rig.mem().clk, clk);

        rig.button.push_script(&[false, false, true]);
        assert!(matches!(
            rig.step(),
            Step::Period(PeriodOutcome::Wake, Some(_))
        ));
        assert_eq!(rig.mem().pause, PauseState::Running);
    }

    #[test]
    fn test_long_press_while_paused_resets_and_reprovisions() {
        let mut rig = Rig::new();
        rig.step();
        rig.button.press();
        assert_eq!(
            rig.step(),
            Step::Period(PeriodOutcome::Wake, Some(SleepDirective::HardwareReset))
        );
        assert_eq!(rig.device.state(), DeviceState::Off);
        assert_eq!(rig.platform.storage.record(), None);

        rig.button.release();
        assert_eq!(rig.step(), Step::Boot(SleepDirective::StartCoprocessor));
        assert_eq!(rig.platform.wifi.portals(), 2);
    }

    #[test]
    fn test_halted_device_is_inert() {
        let mut rig = Rig::new();
        rig.platform.storage.break_down();
        assert_eq!(
            rig.step(),
            Step::Boot(SleepDirective::Halt(Fatal::StorageUnavailable))
        );
        assert_eq!(rig.step(), Step::Inert);
    }

    #[test]
    fn test_lease_records_changes() {
        let mut memory = SharedMemory::new(SharedState::zeroed());
        {
            let mut mem = memory.lease(Actor::Primary, 7);
            mem.update_pending = 5;
        }
        {
            let _mem = memory.lease(Actor::Coprocessor, 8);
        }
        let audit: std::vec::Vec<_> = memory.audit().copied().collect();
        assert_eq!(
            audit,
            [
                LeaseRecord {
                    period: 7,
                    actor: Actor::Primary,
                    changed: Cell::UpdatePending.bit()
                },
                LeaseRecord {
                    period: 8,
                    actor: Actor::Coprocessor,
                    changed: 0
                },
            ]
        );
    }

    /// Random button presses, supply dips and server answers; within every
    /// period the co-processor holds the memory first and the primary at
    /// most once after it, and the memory always decodes.
    #[test]
    fn test_single_writer_per_period() {
        let mut rng = StdRng::seed_from_u64(0x5eed);
        let mut rig = Rig::new();
        rig.step();

        for _ in 0..4000 {
            match rng.gen_range(0..100) {
                0 => rig.button.push_script(&[false, false, true]),
                1 => rig.adc.set_level(rng.gen_range(1800..2400)),
                2 => rig.adc.set_level(3000),
                3 => {
                    let hh = rng.gen_range(0..24);
                    let mm = rng.gen_range(0..60);
                    let body = std::format!("{:02}:{:02}:00", hh, mm);
                    rig.platform.http.respond(200, &body);
                }
                4 => rig.platform.http.fail_next(),
                _ => {}
            }
            rig.platform.wifi.set_reachable(rng.gen_bool(0.8));

            let step = rig.step();
            if let Step::Boot(directive) = step {
                assert_eq!(directive, SleepDirective::StartCoprocessor);
            }
            assert_ne!(rig.device.state(), DeviceState::Halted(Fatal::StorageUnavailable));

            let words = rig.mem().to_words();
            assert_eq!(SharedState::from_words(&words).as_ref(), Ok(rig.mem()));
            assert!(rig.mem().stack.is_empty());

            let audit: std::vec::Vec<_> = rig.device.memory().audit().copied().collect();
            for pair in audit.windows(2) {
                let (a, b) = (pair[0], pair[1]);
                if a.period == b.period {
                    assert_eq!(a.actor, Actor::Coprocessor);
                    assert_eq!(b.actor, Actor::Primary);
                } else {
                    assert!(b.period > a.period);
                }
            }
        }
    }
}
