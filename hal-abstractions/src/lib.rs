//! Hardware abstraction traits for the analog clock firmware
//!
//! This crate defines the seams between the platform-agnostic clock logic
//! and the board. GPIO and delays come straight from `embedded-hal`; the
//! traits here cover the rest. BSPs implement these traits.

#![cfg_attr(not(test), no_std)]
#![deny(unsafe_code)]
#![deny(warnings)]

pub mod adc;
pub mod net;
pub mod storage;
pub mod timer;
