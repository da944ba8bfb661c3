//! Supply thresholds for the co-processor
//!
//! The supply reaches the ADC through a 1:2 divider. The co-processor can
//! only compare raw codes, so at cold boot the millivolt thresholds are
//! turned into codes once, through the chip's ADC characteristics.

use hal_abstractions::adc::AdcCharacteristics;

use crate::settings::Settings;
use crate::shared::SharedState;

/// Codes below this are never a usable supply
const SWEEP_START: u16 = 2000;
const SWEEP_END: u16 = 4096;

/// Raw codes matching the pause and restart voltages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SupplyThresholds {
    pub low: u16,
    pub high: u16,
}

/// First code at or above each threshold; a threshold out of reach
/// keeps `fallback`'s value
pub fn calibrate<A: AdcCharacteristics>(
    adc: &A,
    settings: &Settings,
    fallback: SupplyThresholds,
) -> SupplyThresholds {
    let first_at = |mv: u32| (SWEEP_START..SWEEP_END).find(|&raw| adc.raw_to_millivolts(raw) >= mv / 2);
    SupplyThresholds {
        low: first_at(settings.supply_low_mv).unwrap_or(fallback.low),
        high: first_at(settings.supply_high_mv).unwrap_or(fallback.high),
    }
}

/// Whether the last co-processor reading allows network work
pub fn supply_ok(mem: &SharedState) -> bool {
    mem.adc_vdd >= mem.adc_vddl
}
