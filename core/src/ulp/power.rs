//! Supply voltage monitor
//!
//! Once per second the co-processor averages eight conversions of the
//! supply divider. Falling below `adc_vddl` stops the clock without waking
//! anyone; only climbing back to `adc_vddh` restarts it. A paused clock
//! whose reading sits between the two thresholds is still treated as low.

use hal_abstractions::adc::SupplyAdc;

use super::Exit;
use crate::settings::Settings;
use crate::shared::{PauseState, SharedState};

/// Conversions averaged per reading
pub const SUPPLY_SAMPLES: u32 = 8;

pub(crate) fn check_supply<A: SupplyAdc>(
    mem: &mut SharedState,
    settings: &Settings,
    adc: &mut A,
) -> Option<Exit> {
    if !mem.gate_open(settings.normal_mask) {
        return None;
    }

    let sum: u32 = (0..SUPPLY_SAMPLES).map(|_| u32::from(adc.sample())).sum();
    let reading = (sum / SUPPLY_SAMPLES) as u16;
    let was_low = mem.adc_vdd < mem.adc_vddl
        || (mem.pause == PauseState::PendingAck && mem.adc_vdd < mem.adc_vddh);
    mem.adc_vdd = reading;

    if was_low {
        if reading >= mem.adc_vddh {
            debug!("supply restored ({} >= {})", reading, mem.adc_vddh);
            Some(Exit::RestartClock)
        } else {
            Some(Exit::Halt)
        }
    } else if reading < mem.adc_vddl {
        debug!("supply low ({} < {}), pausing", reading, mem.adc_vddl);
        mem.pause = PauseState::PendingAck;
        Some(Exit::Halt)
    } else {
        None
    }
}
