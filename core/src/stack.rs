//! Software call stack of the co-processor program
//!
//! The co-processor has no call/return instructions. A caller pushes the
//! routine's arguments followed by a return marker, and the callee pops
//! exactly `arity + 1` words before returning. Here the routines are
//! ordinary Rust functions; [`CallStack`] keeps the same words in shared
//! memory so the balance contract stays observable from the outside.

use core::fmt;

use heapless::Vec;

/// Words reserved for the stack region of shared memory
pub const STACK_DEPTH: usize = 16;

/// Marker bit distinguishing return markers from argument words
const MARKER: u16 = 0x8000;

/// Subroutines of the co-processor program
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u16)]
pub enum Routine {
    NormTick = 1,
    FwdTick = 2,
    RevTickA = 3,
    RevTickB = 4,
    IncClock = 5,
    DecClock = 6,
    CalcTimeDiff = 7,
}

impl Routine {
    /// Fixed number of argument words
    pub const fn arity(self) -> usize {
        match self {
            // SS, MM, HH cell addresses
            Routine::IncClock | Routine::DecClock => 3,
            _ => 0,
        }
    }

    const fn marker(self) -> u16 {
        MARKER | self as u16
    }
}

/// Call stack contract violations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StackFault {
    /// Stack region exhausted
    Overflow,
    /// Wrong number of arguments for the routine
    Arity(Routine),
    /// Return found something other than the routine's own frame on top
    Unbalanced(Routine),
    /// Stack not empty at the end of a period
    Leaked { depth: usize },
}

impl fmt::Display for StackFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StackFault::Overflow => write!(f, "call stack overflow"),
            StackFault::Arity(r) => write!(f, "wrong argument count for {:?}", r),
            StackFault::Unbalanced(r) => write!(f, "unbalanced return from {:?}", r),
            StackFault::Leaked { depth } => write!(f, "{} words left on call stack", depth),
        }
    }
}

impl core::error::Error for StackFault {}

/// An active call, returned by [`CallStack::call`] and consumed by [`CallStack::ret`]
#[must_use = "every call must be matched by a return"]
#[derive(Debug)]
pub struct Frame {
    routine: Routine,
    base: usize,
}

impl Frame {
    pub fn routine(&self) -> Routine {
        self.routine
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallStack {
    words: Vec<u16, STACK_DEPTH>,
}

impl CallStack {
    pub const fn new() -> Self {
        Self { words: Vec::new() }
    }

    /// Rebuild from the words of the stack region
    pub fn from_words(words: &[u16]) -> Option<Self> {
        Vec::from_slice(words).ok().map(|words| Self { words })
    }

    pub fn words(&self) -> &[u16] {
        &self.words
    }

    pub fn depth(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Push `args` and the return marker for `routine`
    pub fn call(&mut self, routine: Routine, args: &[u16]) -> Result<Frame, StackFault> {
        if args.len() != routine.arity() {
            return Err(StackFault::Arity(routine));
        }
        let base = self.words.len();
        if base + args.len() + 1 > STACK_DEPTH {
            return Err(StackFault::Overflow);
        }
        for &arg in args {
            self.words.push(arg).map_err(|_| StackFault::Overflow)?;
        }
        self.words
            .push(routine.marker())
            .map_err(|_| StackFault::Overflow)?;
        Ok(Frame { routine, base })
    }

    /// Argument `n` (0-based, in push order) of the active `frame`
    pub fn arg(&self, frame: &Frame, n: usize) -> Option<u16> {
        if n >= frame.routine.arity() {
            return None;
        }
        self.words.get(frame.base + n).copied()
    }

    /// Pop the return marker and exactly the routine's arguments
    pub fn ret(&mut self, frame: Frame) -> Result<(), StackFault> {
        let top = frame.base + frame.routine.arity() + 1;
        if self.words.len() != top || self.words.last() != Some(&frame.routine.marker()) {
            return Err(StackFault::Unbalanced(frame.routine));
        }
        self.words.truncate(frame.base);
        Ok(())
    }

    pub fn clear(&mut self) {
        self.words.clear();
    }
}
