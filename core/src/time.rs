//! 12-hour wall-clock arithmetic
//!
//! The time shown by the hands and the network time are both kept as
//! 12-hour `HH:MM:SS` triples. The distance between them around the dial
//! packs into one 16-bit word as `hour << 12 | minute << 6 | second`.
//! Because every field is nested inside the bits of the next larger one,
//! comparing packed words compares the distances themselves.

use core::fmt;

/// Hours on the dial
pub const HOURS_PER_WHEEL: u8 = 12;

/// Seconds for one full turn of the hour hand
pub const SECS_PER_WHEEL: u32 = HOURS_PER_WHEEL as u32 * 3600;

/// A position on the 12-hour dial
///
/// Components are always in range: `hh < 12`, `mm < 60`, `ss < 60`.
/// Ordering is chronological from 0:00:00.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ClockTime {
    hh: u8,
    mm: u8,
    ss: u8,
}

impl ClockTime {
    /// 0:00:00
    pub const ZERO: ClockTime = ClockTime {
        hh: 0,
        mm: 0,
        ss: 0,
    };

    /// Create a dial position, rejecting out-of-range components
    pub const fn new(hh: u8, mm: u8, ss: u8) -> Option<Self> {
        if hh < HOURS_PER_WHEEL && mm < 60 && ss < 60 {
            Some(Self { hh, mm, ss })
        } else {
            None
        }
    }

    /// Create a dial position for a constant
    ///
    /// Panics (at compile time when used in a `const`) if out of range.
    pub const fn at(hh: u8, mm: u8, ss: u8) -> Self {
        assert!(hh < HOURS_PER_WHEEL && mm < 60 && ss < 60);
        Self { hh, mm, ss }
    }

    /// Fold a 24-hour reading onto the dial
    pub const fn from_24h(hh: u8, mm: u8, ss: u8) -> Option<Self> {
        if hh >= 24 {
            return None;
        }
        Self::new(hh % HOURS_PER_WHEEL, mm, ss)
    }

    /// Dial position `secs` seconds after 0:00:00 (taken modulo one turn)
    pub const fn from_secs(secs: u32) -> Self {
        let secs = secs % SECS_PER_WHEEL;
        Self {
            hh: (secs / 3600) as u8,
            mm: ((secs / 60) % 60) as u8,
            ss: (secs % 60) as u8,
        }
    }

    /// Seconds since 0:00:00
    pub const fn as_secs(self) -> u32 {
        self.hh as u32 * 3600 + self.mm as u32 * 60 + self.ss as u32
    }

    pub const fn hh(self) -> u8 {
        self.hh
    }

    pub const fn mm(self) -> u8 {
        self.mm
    }

    pub const fn ss(self) -> u8 {
        self.ss
    }

    /// Replace the hour, keeping minute and second
    pub const fn with_hour(self, hh: u8) -> Option<Self> {
        Self::new(hh, self.mm, self.ss)
    }

    /// Replace the minute, keeping hour and second
    pub const fn with_minute(self, mm: u8) -> Option<Self> {
        Self::new(self.hh, mm, self.ss)
    }

    /// Replace the second, keeping hour and minute
    pub const fn with_second(self, ss: u8) -> Option<Self> {
        Self::new(self.hh, self.mm, ss)
    }

    /// Advance by one second, wrapping 11:59:59 to 0:00:00
    pub fn increment(&mut self) {
        self.ss += 1;
        if self.ss < 60 {
            return;
        }
        self.ss = 0;
        self.mm += 1;
        if self.mm < 60 {
            return;
        }
        self.mm = 0;
        self.hh += 1;
        if self.hh >= HOURS_PER_WHEEL {
            self.hh = 0;
        }
    }

    /// Go back by one second, wrapping 0:00:00 to 11:59:59
    pub fn decrement(&mut self) {
        if self.ss > 0 {
            self.ss -= 1;
            return;
        }
        self.ss = 59;
        if self.mm > 0 {
            self.mm -= 1;
            return;
        }
        self.mm = 59;
        self.hh = if self.hh > 0 {
            self.hh - 1
        } else {
            HOURS_PER_WHEEL - 1
        };
    }

    /// Forward distance around the dial from `self` to `target`
    ///
    /// Borrow-propagating subtraction `target - self` across
    /// seconds → minutes → hours, with the hour folded back onto the dial.
    /// The result is itself a valid dial position (a non-negative distance).
    pub fn distance_to(self, target: ClockTime) -> ClockTime {
        let mut ss = target.ss as i8 - self.ss as i8;
        let mut borrow = 0;
        if ss < 0 {
            ss += 60;
            borrow = 1;
        }

        let mut mm = target.mm as i8 - self.mm as i8 - borrow;
        borrow = 0;
        if mm < 0 {
            mm += 60;
            borrow = 1;
        }

        let mut hh = target.hh as i8 - self.hh as i8 - borrow;
        if hh < 0 {
            hh += HOURS_PER_WHEEL as i8;
        }

        ClockTime {
            hh: hh as u8,
            mm: mm as u8,
            ss: ss as u8,
        }
    }

    /// Pack as `hour << 12 | minute << 6 | second`
    pub const fn pack(self) -> u16 {
        (self.hh as u16) << 12 | (self.mm as u16) << 6 | self.ss as u16
    }

    /// Unpack a word produced by [`ClockTime::pack`]
    pub const fn unpack(word: u16) -> Option<Self> {
        Self::new((word >> 12) as u8, ((word >> 6) & 0x3f) as u8, (word & 0x3f) as u8)
    }
}

impl fmt::Display for ClockTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}:{:02}", self.hh, self.mm, self.ss)
    }
}
