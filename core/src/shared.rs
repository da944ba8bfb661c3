//! Shared state memory
//!
//! The retained block both processors read and write. In Rust it is one
//! owned record with typed fields, passed by `&mut` to whichever actor is
//! running. [`SharedState::to_words`] and [`SharedState::from_words`] map it
//! onto the fixed layout of 16-bit cells the co-processor addresses.

use core::fmt;

use crate::settings::{Settings, CALL_CYCLE, TUNE_LEVELS};
use crate::stack::{CallStack, STACK_DEPTH};
use crate::time::ClockTime;

/// Tri-state pause protocol between button, power monitor and primary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u16)]
pub enum PauseState {
    #[default]
    Running = 0,
    /// Stopped; the primary controller decides what happens next
    PendingAck = 1,
    /// Stopped; the next button press restarts the clock
    ArmedForResume = 2,
}

/// What the tick engine does on its next invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u16)]
pub enum TickAction {
    #[default]
    None = 0,
    Normal = 1,
    Forward = 2,
    Reverse = 3,
}

/// Why the co-processor woke the primary controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u16)]
pub enum WakeReason {
    #[default]
    None = 0,
    ResetButton = 1,
    UpdateNetTime = 2,
    TuneTimer = 3,
}

/// Which of the two motor drive lines fires next
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u16)]
pub enum DriveLine {
    #[default]
    A = 0,
    B = 1,
}

impl DriveLine {
    pub const fn flipped(self) -> Self {
        match self {
            DriveLine::A => DriveLine::B,
            DriveLine::B => DriveLine::A,
        }
    }

    pub fn flip(&mut self) {
        *self = self.flipped();
    }
}

impl PauseState {
    pub const fn from_word(word: u16) -> Option<Self> {
        match word {
            0 => Some(Self::Running),
            1 => Some(Self::PendingAck),
            2 => Some(Self::ArmedForResume),
            _ => None,
        }
    }
}

impl TickAction {
    pub const fn from_word(word: u16) -> Option<Self> {
        match word {
            0 => Some(Self::None),
            1 => Some(Self::Normal),
            2 => Some(Self::Forward),
            3 => Some(Self::Reverse),
            _ => None,
        }
    }
}

impl WakeReason {
    pub const fn from_word(word: u16) -> Option<Self> {
        match word {
            0 => Some(Self::None),
            1 => Some(Self::ResetButton),
            2 => Some(Self::UpdateNetTime),
            3 => Some(Self::TuneTimer),
            _ => None,
        }
    }
}

impl DriveLine {
    pub const fn from_word(word: u16) -> Option<Self> {
        match word {
            0 => Some(Self::A),
            1 => Some(Self::B),
            _ => None,
        }
    }
}

/// Named cells of the fixed layout, in address order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u16)]
pub enum Cell {
    NetHh,
    NetMm,
    NetSs,
    PauseClock,
    PrevTickAction,
    TickAction,
    TickDelay,
    Tickpin,
    TuneLevel,
    SleepCount,
    SleepInterval,
    CallCount,
    TimerLo,
    TimerHi,
    ClkHh,
    ClkMm,
    ClkSs,
    AdcVdd,
    AdcVddl,
    AdcVddh,
    WakeReason,
    DiffHh,
    DiffMm,
    DiffSs,
    DiffPacked,
    UpdatePending,
    Debug,
    StackPtr,
    /// First word of the stack region
    StackRegion,
}

impl Cell {
    pub const ALL: [Cell; CELL_COUNT] = [
        Cell::NetHh,
        Cell::NetMm,
        Cell::NetSs,
        Cell::PauseClock,
        Cell::PrevTickAction,
        Cell::TickAction,
        Cell::TickDelay,
        Cell::Tickpin,
        Cell::TuneLevel,
        Cell::SleepCount,
        Cell::SleepInterval,
        Cell::CallCount,
        Cell::TimerLo,
        Cell::TimerHi,
        Cell::ClkHh,
        Cell::ClkMm,
        Cell::ClkSs,
        Cell::AdcVdd,
        Cell::AdcVddl,
        Cell::AdcVddh,
        Cell::WakeReason,
        Cell::DiffHh,
        Cell::DiffMm,
        Cell::DiffSs,
        Cell::DiffPacked,
        Cell::UpdatePending,
        Cell::Debug,
        Cell::StackPtr,
        Cell::StackRegion,
    ];

    pub const fn addr(self) -> u16 {
        self as u16
    }

    /// Bit for this cell in a changed-cell mask; the whole stack region shares one
    pub const fn bit(self) -> u32 {
        1 << (self as u32)
    }
}

/// Named cells, including the first word of the stack region
pub const CELL_COUNT: usize = Cell::StackRegion as usize + 1;

/// Total words: named cells plus the rest of the stack region
pub const LAYOUT_WORDS: usize = Cell::StackRegion as usize + STACK_DEPTH;

/// Raw shared memory image
pub type Words = [u16; LAYOUT_WORDS];

/// Why a raw memory image does not decode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LayoutError {
    /// Not a known enumeration value
    Enum(Cell),
    /// Outside the cell's range
    Range(Cell),
}

impl fmt::Display for LayoutError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LayoutError::Enum(cell) => write!(f, "bad enumeration value in {:?}", cell),
            LayoutError::Range(cell) => write!(f, "value out of range in {:?}", cell),
        }
    }
}

impl core::error::Error for LayoutError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SharedState {
    /// Network time, advanced by the co-processor between fetches
    pub net: ClockTime,
    /// Time shown by the hands
    pub clk: ClockTime,
    pub pause: PauseState,
    pub tick_action: TickAction,
    pub prev_tick_action: TickAction,
    /// Co-processor periods left to idle before ticking resumes
    pub tick_delay: u16,
    pub tickpin: DriveLine,
    pub tune_level: u8,
    /// Seconds since the last tuning wake
    pub sleep_count: u16,
    /// Seconds between tuning wakes
    pub sleep_interval: u16,
    /// Periods within the current second, always below [`CALL_CYCLE`]
    pub call_count: u8,
    /// Co-processor wake period in timer ticks
    pub wake_period: u32,
    pub adc_vdd: u16,
    pub adc_vddl: u16,
    pub adc_vddh: u16,
    pub wake_reason: WakeReason,
    /// Last computed distance from clock to network time
    pub diff: ClockTime,
    /// Seconds until a network time refresh is requested (0 = none)
    pub update_pending: u16,
    pub stack: CallStack,
}

impl SharedState {
    /// Everything zeroed
    pub const fn zeroed() -> Self {
        Self {
            net: ClockTime::ZERO,
            clk: ClockTime::ZERO,
            pause: PauseState::Running,
            tick_action: TickAction::None,
            prev_tick_action: TickAction::None,
            tick_delay: 0,
            tickpin: DriveLine::A,
            tune_level: 0,
            sleep_count: 0,
            sleep_interval: 0,
            call_count: 0,
            wake_period: 0,
            adc_vdd: 0,
            adc_vddl: 0,
            adc_vddh: 0,
            wake_reason: WakeReason::None,
            diff: ClockTime::ZERO,
            update_pending: 0,
            stack: CallStack::new(),
        }
    }

    /// Cold-start defaults, before calibration and the configuration record
    pub fn cold_start(settings: &Settings) -> Self {
        Self {
            sleep_interval: settings.tune_interval(0),
            wake_period: settings.default_wake_period(),
            adc_vddh: 4095,
            ..Self::zeroed()
        }
    }

    /// Whether this period's `call_count` passes `mask`
    pub const fn gate_open(&self, mask: u8) -> bool {
        self.call_count & mask == 0
    }

    pub fn advance_call_count(&mut self) {
        self.call_count = (self.call_count + 1) % CALL_CYCLE;
    }

    /// Set clock and network time together, as provisioning and loading do
    pub fn seed_time(&mut self, time: ClockTime) {
        self.clk = time;
        self.net = time;
    }

    /// Set the tune level and the matching tune interval
    pub fn set_tune_level(&mut self, level: u8, settings: &Settings) {
        let level = level.min(TUNE_LEVELS as u8 - 1);
        self.tune_level = level;
        self.sleep_interval = settings.tune_interval(level);
    }

    /// Encode into the fixed cell layout
    pub fn to_words(&self) -> Words {
        let mut words = [0; LAYOUT_WORDS];
        let mut set = |cell: Cell, value: u16| words[cell as usize] = value;

        set(Cell::NetHh, self.net.hh().into());
        set(Cell::NetMm, self.net.mm().into());
        set(Cell::NetSs, self.net.ss().into());
        set(Cell::PauseClock, self.pause as u16);
        set(Cell::PrevTickAction, self.prev_tick_action as u16);
        set(Cell::TickAction, self.tick_action as u16);
        set(Cell::TickDelay, self.tick_delay);
        set(Cell::Tickpin, self.tickpin as u16);
        set(Cell::TuneLevel, self.tune_level.into());
        set(Cell::SleepCount, self.sleep_count);
        set(Cell::SleepInterval, self.sleep_interval);
        set(Cell::CallCount, self.call_count.into());
        set(Cell::TimerLo, self.wake_period as u16);
        set(Cell::TimerHi, (self.wake_period >> 16) as u16);
        set(Cell::ClkHh, self.clk.hh().into());
        set(Cell::ClkMm, self.clk.mm().into());
        set(Cell::ClkSs, self.clk.ss().into());
        set(Cell::AdcVdd, self.adc_vdd);
        set(Cell::AdcVddl, self.adc_vddl);
        set(Cell::AdcVddh, self.adc_vddh);
        set(Cell::WakeReason, self.wake_reason as u16);
        set(Cell::DiffHh, self.diff.hh().into());
        set(Cell::DiffMm, self.diff.mm().into());
        set(Cell::DiffSs, self.diff.ss().into());
        set(Cell::DiffPacked, self.diff.pack());
        set(Cell::UpdatePending, self.update_pending);
        set(Cell::Debug, self.tick_action as u16);
        set(
            Cell::StackPtr,
            Cell::StackRegion.addr() + self.stack.depth() as u16,
        );

        let region = Cell::StackRegion as usize;
        words[region..region + self.stack.depth()].copy_from_slice(self.stack.words());
        words
    }

    /// Decode the fixed cell layout, checking every invariant
    pub fn from_words(words: &Words) -> Result<Self, LayoutError> {
        let get = |cell: Cell| words[cell as usize];
        let small = |cell: Cell, limit: u16| -> Result<u8, LayoutError> {
            let value = get(cell);
            if value < limit {
                Ok(value as u8)
            } else {
                Err(LayoutError::Range(cell))
            }
        };
        let time = |hh_cell: Cell, mm_cell: Cell, ss_cell: Cell| -> Result<ClockTime, LayoutError> {
            let hh = small(hh_cell, 12)?;
            let mm = small(mm_cell, 60)?;
            let ss = small(ss_cell, 60)?;
            ClockTime::new(hh, mm, ss).ok_or(LayoutError::Range(hh_cell))
        };

        let diff = time(Cell::DiffHh, Cell::DiffMm, Cell::DiffSs)?;
        if diff.pack() != get(Cell::DiffPacked) {
            return Err(LayoutError::Range(Cell::DiffPacked));
        }

        let region = Cell::StackRegion.addr();
        let ptr = get(Cell::StackPtr);
        if ptr < region || usize::from(ptr - region) > STACK_DEPTH {
            return Err(LayoutError::Range(Cell::StackPtr));
        }
        let start = usize::from(region);
        let stack = CallStack::from_words(&words[start..usize::from(ptr)])
            .ok_or(LayoutError::Range(Cell::StackPtr))?;

        Ok(Self {
            net: time(Cell::NetHh, Cell::NetMm, Cell::NetSs)?,
            clk: time(Cell::ClkHh, Cell::ClkMm, Cell::ClkSs)?,
            pause: PauseState::from_word(get(Cell::PauseClock))
                .ok_or(LayoutError::Enum(Cell::PauseClock))?,
            tick_action: TickAction::from_word(get(Cell::TickAction))
                .ok_or(LayoutError::Enum(Cell::TickAction))?,
            prev_tick_action: TickAction::from_word(get(Cell::PrevTickAction))
                .ok_or(LayoutError::Enum(Cell::PrevTickAction))?,
            tick_delay: get(Cell::TickDelay),
            tickpin: DriveLine::from_word(get(Cell::Tickpin))
                .ok_or(LayoutError::Enum(Cell::Tickpin))?,
            tune_level: small(Cell::TuneLevel, TUNE_LEVELS as u16)?,
            sleep_count: get(Cell::SleepCount),
            sleep_interval: get(Cell::SleepInterval),
            call_count: small(Cell::CallCount, CALL_CYCLE.into())?,
            wake_period: u32::from(get(Cell::TimerHi)) << 16 | u32::from(get(Cell::TimerLo)),
            adc_vdd: get(Cell::AdcVdd),
            adc_vddl: get(Cell::AdcVddl),
            adc_vddh: get(Cell::AdcVddh),
            wake_reason: WakeReason::from_word(get(Cell::WakeReason))
                .ok_or(LayoutError::Enum(Cell::WakeReason))?,
            diff,
            update_pending: get(Cell::UpdatePending),
            stack,
        })
    }

    /// Mask of [`Cell::bit`]s whose words differ between two states
    pub fn changed_cells(&self, other: &SharedState) -> u32 {
        let (a, b) = (self.to_words(), other.to_words());
        let region = Cell::StackRegion as usize;
        let mut mask = 0;
        for cell in Cell::ALL.iter().take(region) {
            if a[*cell as usize] != b[*cell as usize] {
                mask |= cell.bit();
            }
        }
        if a[region..] != b[region..] {
            mask |= Cell::StackRegion.bit();
        }
        mask
    }
}

impl Default for SharedState {
    fn default() -> Self {
        Self::zeroed()
    }
}

impl fmt::Display for SharedState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ct={} nt={} pause={:?} act={:?} prev={:?} delay={} pin={:?} tl={} sc={}/{} cc={} timer={} vdd={} [{},{}] wake={:?} up={}",
            self.clk,
            self.net,
            self.pause,
            self.tick_action,
            self.prev_tick_action,
            self.tick_delay,
            self.tickpin,
            self.tune_level,
            self.sleep_count,
            self.sleep_interval,
            self.call_count,
            self.wake_period,
            self.adc_vdd,
            self.adc_vddl,
            self.adc_vddh,
            self.wake_reason,
            self.update_pending,
        )
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for SharedState {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(
            f,
            "ct={} nt={} pause={} act={} prev={} delay={} pin={} tl={} sc={}/{} cc={} timer={} vdd={} [{},{}] wake={} up={}",
            self.clk,
            self.net,
            self.pause,
            self.tick_action,
            self.prev_tick_action,
            self.tick_delay,
            self.tickpin,
            self.tune_level,
            self.sleep_count,
            self.sleep_interval,
            self.call_count,
            self.wake_period,
            self.adc_vdd,
            self.adc_vddl,
            self.adc_vddh,
            self.wake_reason,
            self.update_pending
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stack::Routine;

    fn busy_state() -> SharedState {
        let settings = Settings::new();
        let mut state = SharedState::cold_start(&settings);
        state.net = ClockTime::at(9, 5, 2);
        state.clk = ClockTime::at(2, 0, 0);
        state.diff = state.clk.distance_to(state.net);
        state.pause = PauseState::ArmedForResume;
        state.tick_action = TickAction::Reverse;
        state.prev_tick_action = TickAction::Forward;
        state.tick_delay = 8;
        state.tickpin = DriveLine::B;
        state.set_tune_level(3, &settings);
        state.sleep_count = 1234;
        state.call_count = 7;
        state.wake_period = 0x0001_2345;
        state.adc_vdd = 2500;
        state.adc_vddl = 2400;
        state.adc_vddh = 2520;
        state.wake_reason = WakeReason::TuneTimer;
        state.update_pending = 3;
        let _ = state.stack.call(Routine::NormTick, &[]).unwrap();
        state
    }

    #[test]
    fn test_cold_start_defaults() {
        let state = SharedState::cold_start(&Settings::new());
        assert_eq!(state.sleep_interval, 300);
        assert_eq!(state.wake_period, 65_000);
        assert_eq!(state.adc_vddh, 4095);
        assert_eq!(state.pause, PauseState::Running);
        assert!(state.stack.is_empty());
    }

    #[test]
    fn test_layout_round_trip() {
        let state = busy_state();
        let words = state.to_words();
        assert_eq!(words[Cell::TimerLo as usize], 0x2345);
        assert_eq!(words[Cell::TimerHi as usize], 0x0001);
        assert_eq!(words[Cell::DiffPacked as usize], ClockTime::at(7, 5, 2).pack());
        assert_eq!(words[Cell::StackPtr as usize], Cell::StackRegion.addr() + 1);
        assert_eq!(SharedState::from_words(&words).unwrap(), state);
    }

    #[test]
    fn test_from_words_rejects_bad_enum() {
        let mut words = busy_state().to_words();
        words[Cell::PauseClock as usize] = 3;
        assert_eq!(
            SharedState::from_words(&words).unwrap_err(),
            LayoutError::Enum(Cell::PauseClock)
        );

        let mut words = busy_state().to_words();
        words[Cell::TickAction as usize] = 4;
        assert_eq!(
            SharedState::from_words(&words).unwrap_err(),
            LayoutError::Enum(Cell::TickAction)
        );
    }

    #[test]
    fn test_from_words_rejects_out_of_range() {
        let mut words = busy_state().to_words();
        words[Cell::ClkMm as usize] = 60;
        assert_eq!(
            SharedState::from_words(&words).unwrap_err(),
            LayoutError::Range(Cell::ClkMm)
        );

        let mut words = busy_state().to_words();
        words[Cell::CallCount as usize] = 8;
        assert_eq!(
            SharedState::from_words(&words).unwrap_err(),
            LayoutError::Range(Cell::CallCount)
        );

        let mut words = busy_state().to_words();
        words[Cell::StackPtr as usize] = 0;
        assert_eq!(
            SharedState::from_words(&words).unwrap_err(),
            LayoutError::Range(Cell::StackPtr)
        );
    }

    #[test]
    fn test_diff_packed_must_match_components() {
        let mut words = busy_state().to_words();
        words[Cell::DiffPacked as usize] ^= 1;
        assert_eq!(
            SharedState::from_words(&words).unwrap_err(),
            LayoutError::Range(Cell::DiffPacked)
        );
    }

    #[test]
    fn test_call_count_wraps() {
        let mut state = SharedState::zeroed();
        for expected in [1, 2, 3, 4, 5, 6, 7, 0, 1] {
            state.advance_call_count();
            assert_eq!(state.call_count, expected);
        }
    }

    #[test]
    fn test_gate() {
        let mut state = SharedState::zeroed();
        state.call_count = 2;
        assert!(state.gate_open(0));
        assert!(state.gate_open(1));
        assert!(!state.gate_open(7));
        state.call_count = 0;
        assert!(state.gate_open(7));
    }

    #[test]
    fn test_changed_cells() {
        let a = busy_state();
        let mut b = a.clone();
        assert_eq!(a.changed_cells(&b), 0);
        b.clk.increment();
        b.sleep_count += 1;
        assert_eq!(
            a.changed_cells(&b),
            Cell::ClkSs.bit() | Cell::SleepCount.bit()
        );
        b.stack.clear();
        assert_ne!(a.changed_cells(&b) & Cell::StackRegion.bit(), 0);
        assert_ne!(a.changed_cells(&b) & Cell::StackPtr.bit(), 0);
    }

    #[test]
    fn test_tune_level_clamps() {
        let settings = Settings::new();
        let mut state = SharedState::zeroed();
        state.set_tune_level(9, &settings);
        assert_eq!(state.tune_level, 4);
        assert_eq!(state.sleep_interval, 7200);
    }
}
