//! Provisioning portal form handling

use core::fmt::Write;

use hal_abstractions::net::{ProvisioningForm, CLOCK_FIELD_CAP};
use heapless::String;

use crate::config::{truncated, ConfigRecord};
use crate::shared::SharedState;
use crate::time::{ClockTime, HOURS_PER_WHEEL};

/// Digits of the clock field that are looked at
const CLOCK_DIGITS: usize = 6;

/// Access point / host name length: `ESPCLOCK4-` plus 12 hex digits
pub const DEVICE_NAME_CAP: usize = 24;

/// Read the time the hands show from the clock field
///
/// Takes the leading digits of the first six characters. Four or fewer
/// digits are `HMM`/`HHMM` without seconds; five or six are `HMMSS` /
/// `HHMMSS`. Out-of-range minutes or seconds read as zero and hours fold
/// onto the 12-hour dial, so any input gives some position.
pub fn parse_clock_field(text: &str) -> ClockTime {
    let mut clock: u32 = 0;
    for b in text.trim_start().bytes().take(CLOCK_DIGITS) {
        if !b.is_ascii_digit() {
            break;
        }
        clock = clock * 10 + u32::from(b - b'0');
    }
    if clock < 10_000 {
        clock *= 100;
    }

    let ss = match clock % 100 {
        ss if ss >= 60 => 0,
        ss => ss,
    };
    let mm = match (clock / 100) % 100 {
        mm if mm >= 60 => 0,
        mm => mm,
    };
    let hh = (clock / 10_000) % u32::from(HOURS_PER_WHEEL);
    ClockTime::new(hh as u8, mm as u8, ss as u8).unwrap_or_default()
}

/// Pre-fill for the portal from what is currently configured
pub fn form_defaults(record: &ConfigRecord, mem: &SharedState) -> ProvisioningForm {
    let mut clock_time: String<CLOCK_FIELD_CAP> = String::new();
    let _ = write!(
        clock_time,
        "{:02}{:02}{:02}",
        mem.clk.hh(),
        mem.clk.mm(),
        mem.clk.ss()
    );
    ProvisioningForm {
        clock_time,
        timezone: truncated(&record.tz),
        url: truncated(&record.url),
    }
}

/// Take over a submitted form: the typed time seeds both dials
pub fn apply_form(form: &ProvisioningForm, record: &mut ConfigRecord, mem: &mut SharedState) {
    record.tz = truncated(&form.timezone);
    record.url = truncated(&form.url);
    let time = parse_clock_field(&form.clock_time);
    mem.seed_time(time);
    info!("provisioned: ct={} tz={} url={}", time, record.tz.as_str(), record.url.as_str());
}

/// Portal access point name derived from the 48-bit chip id
pub fn device_name(chip_id: u64) -> String<DEVICE_NAME_CAP> {
    let mut name = String::new();
    let _ = write!(
        name,
        "ESPCLOCK4-{:04X}{:08X}",
        (chip_id >> 32) as u16,
        chip_id as u32
    );
    name
}
