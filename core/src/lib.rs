//! Platform-agnostic core logic for a network-synced analog clock
//!
//! Two actors share one small block of retained memory and never run at
//! the same time:
//!
//! - the co-processor program ([`ulp`]), woken every ~125 ms to drive the
//!   Lavet stepping motor, keep both clocks and decide which way to step;
//! - the primary controller ([`primary`]), woken rarely to fetch network
//!   time, retune the co-processor period and handle the button.
//!
//! [`device`] ties both to one [`shared::SharedState`] for simulation and
//! tests. This crate has NO hardware dependencies; boards implement the
//! `hal-abstractions` traits and `embedded-hal` pins and delays.

#![cfg_attr(not(test), no_std)]
#![deny(unsafe_code)]

mod fmt;

pub mod config;
pub mod device;
pub mod nettime;
pub mod primary;
pub mod settings;
pub mod shared;
pub mod stack;
pub mod time;
pub mod ulp;

#[cfg(test)]
mod testing;
