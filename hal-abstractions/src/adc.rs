//! Supply voltage measurement

/// Supply-voltage divider channel as sampled by the co-processor
///
/// The co-processor ADC instruction cannot fail, so neither can this.
pub trait SupplyAdc {
    /// One raw 12-bit conversion (0..=4095)
    fn sample(&mut self) -> u16;
}

impl<T: SupplyAdc + ?Sized> SupplyAdc for &mut T {
    fn sample(&mut self) -> u16 {
        T::sample(self)
    }
}

/// Conversion from raw ADC codes to millivolts at the ADC pin
///
/// On the ESP32 this wraps the eFuse Vref characterisation. The primary
/// controller only needs it once per cold boot, to turn the millivolt
/// thresholds into raw codes the co-processor can compare against.
pub trait AdcCharacteristics {
    fn raw_to_millivolts(&self, raw: u16) -> u32;
}

/// Straight-line characteristic for boards without calibration data
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinearCharacteristics {
    /// Millivolts at code 0
    pub offset_mv: u32,
    /// Millivolts at code 4095, less the offset
    pub span_mv: u32,
}

impl LinearCharacteristics {
    /// 11 dB attenuation on an uncalibrated ESP32, roughly 150..3900 mV
    pub const ATTEN_11DB: Self = Self::new(150, 3750);

    pub const fn new(offset_mv: u32, span_mv: u32) -> Self {
        Self { offset_mv, span_mv }
    }
}

impl AdcCharacteristics for LinearCharacteristics {
    fn raw_to_millivolts(&self, raw: u16) -> u32 {
        self.offset_mv + u32::from(raw.min(4095)) * self.span_mv / 4095
    }
}
