//! The primary controller
//!
//! Runs once per deep-sleep wake-up, to completion, then tells the board
//! how to go back to sleep. A cold boot calibrates, loads or provisions the
//! configuration and starts the co-processor; a co-processor wake-up runs
//! the handler for the wake reason the co-processor left behind.
//!
//! Shared memory is borrowed for the whole run. Nothing here panics:
//! unrecoverable faults end in [`SleepDirective::Halt`].

mod dispatch;
pub mod power;
pub mod provision;
pub mod tuner;

use core::convert::Infallible;
use core::fmt;

use embedded_hal::digital::InputPin;
use embedded_hal_async::delay::DelayNs;
use hal_abstractions::adc::AdcCharacteristics;
use hal_abstractions::net::{HttpClient, WifiManager};
use hal_abstractions::storage::ConfigStorage;
use hal_abstractions::timer::WakeTimer;
use heapless::String;

use crate::config::{self, ConfigDocument, ConfigError, ConfigRecord};
use crate::nettime::{self, NetTimeError};
use crate::settings::Settings;
use crate::shared::SharedState;
use crate::time::ClockTime;

use self::power::SupplyThresholds;
use self::provision::DEVICE_NAME_CAP;

/// Everything the primary controller drives
pub trait Platform {
    type Storage: ConfigStorage;
    type Http: HttpClient;
    type Wifi: WifiManager;
    /// Active low
    type Button: InputPin<Error = Infallible>;
    type Delay: DelayNs;
    type Timer: WakeTimer;
    type Adc: AdcCharacteristics;

    fn storage(&mut self) -> &mut Self::Storage;
    fn http(&mut self) -> &mut Self::Http;
    fn wifi(&mut self) -> &mut Self::Wifi;
    fn button(&mut self) -> &mut Self::Button;
    fn delay(&mut self) -> &mut Self::Delay;
    fn timer(&mut self) -> &mut Self::Timer;
    fn adc(&self) -> &Self::Adc;
    /// Factory-programmed 48-bit id (the base MAC address)
    fn chip_id(&self) -> u64;
}

/// Why the primary controller is running
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum WakeupCause {
    /// Power-on or hardware reset
    ColdBoot,
    /// Woken by the co-processor program
    Coprocessor,
    /// Any other wake-up source
    Other,
}

/// How to leave the current run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SleepDirective {
    /// Load and start the co-processor program, then deep sleep
    StartCoprocessor,
    /// Deep sleep with the co-processor still running
    ResumeCoprocessor,
    /// Deep sleep with no wake-up source
    Halt(Fatal),
    /// Reset the whole chip, co-processor included
    HardwareReset,
}

/// Faults that leave the device inert until power-cycled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Fatal {
    StorageUnavailable,
    PersistFailed,
    /// The co-processor program could not be loaded
    ProgramLoad,
}

impl fmt::Display for Fatal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Fatal::StorageUnavailable => write!(f, "configuration storage unavailable"),
            Fatal::PersistFailed => write!(f, "failed to persist configuration"),
            Fatal::ProgramLoad => write!(f, "co-processor program does not load"),
        }
    }
}

impl core::error::Error for Fatal {}

pub struct PrimaryController<P> {
    platform: P,
    settings: Settings,
}

impl<P: Platform> PrimaryController<P> {
    pub fn new(platform: P, settings: Settings) -> Self {
        Self { platform, settings }
    }

    pub fn platform(&mut self) -> &mut P {
        &mut self.platform
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Handle one wake-up
    pub async fn boot(&mut self, cause: WakeupCause, mem: &mut SharedState) -> SleepDirective {
        let result = match cause {
            WakeupCause::ColdBoot => self.cold_boot(mem).await,
            WakeupCause::Coprocessor => self.resume(mem).await,
            WakeupCause::Other => {
                warn!("unexpected wake-up cause, back to sleep");
                Ok(SleepDirective::ResumeCoprocessor)
            }
        };
        result.unwrap_or_else(|fatal| {
            error!("{}, halting", fatal);
            SleepDirective::Halt(fatal)
        })
    }

    async fn cold_boot(&mut self, mem: &mut SharedState) -> Result<SleepDirective, Fatal> {
        let has_config = self
            .platform
            .storage()
            .exists()
            .map_err(|_| Fatal::StorageUnavailable)?;
        if self.button_held() && has_config {
            info!("button held at boot");
            return self.factory_reset().await;
        }

        let settings = &self.settings;
        *mem = SharedState::cold_start(settings);
        let mut record = ConfigRecord::new(settings);
        if let Some(doc) = self.load_config()? {
            doc.apply_record(&mut record);
            doc.apply_state(mem, &self.settings);
        }

        let fallback = SupplyThresholds {
            low: mem.adc_vddl,
            high: mem.adc_vddh,
        };
        let thresholds = power::calibrate(self.platform.adc(), &self.settings, fallback);
        mem.adc_vddl = thresholds.low;
        mem.adc_vddh = thresholds.high;
        mem.adc_vdd = thresholds.high;
        debug!("supply thresholds: low={} high={}", thresholds.low, thresholds.high);

        if power::supply_ok(mem) {
            if has_config {
                info!("cold boot: ct={}", mem.clk);
            } else {
                info!("cold boot without configuration, provisioning");
                self.provision(&mut record, mem).await;
                self.persist(&record, mem)?;
            }
            mem.update_pending = self.settings.boot_update_delay_secs;
        }

        if !self.settings.profile.is_valid() {
            return Err(Fatal::ProgramLoad);
        }
        self.platform.timer().set_wakeup_period(mem.wake_period);
        Ok(SleepDirective::StartCoprocessor)
    }

    fn button_held(&mut self) -> bool {
        self.platform
            .button()
            .is_low()
            .unwrap_or_else(|e| match e {})
    }

    /// Read the record; a damaged one counts as empty
    fn load_config(&mut self) -> Result<Option<ConfigDocument>, Fatal> {
        match config::load(self.platform.storage()) {
            Ok(doc) => Ok(doc),
            Err(ConfigError::Storage) => Err(Fatal::StorageUnavailable),
            Err(e) => {
                warn!("ignoring configuration: {}", e);
                Ok(None)
            }
        }
    }

    /// The record as stored, or the defaults
    fn load_record(&mut self) -> Result<ConfigRecord, Fatal> {
        let mut record = ConfigRecord::new(&self.settings);
        if let Some(doc) = self.load_config()? {
            doc.apply_record(&mut record);
        }
        Ok(record)
    }

    fn persist(&mut self, record: &ConfigRecord, mem: &SharedState) -> Result<(), Fatal> {
        let doc = ConfigDocument::snapshot(record, mem);
        config::save(self.platform.storage(), &doc).map_err(|_| Fatal::PersistFailed)?;
        debug!("saved: ct={} nt={}", mem.clk, mem.net);
        Ok(())
    }

    fn device_name(&self) -> String<DEVICE_NAME_CAP> {
        provision::device_name(self.platform.chip_id())
    }

    /// Run the portal and take over whatever was submitted
    async fn provision(&mut self, record: &mut ConfigRecord, mem: &mut SharedState) {
        let name = self.device_name();
        let defaults = provision::form_defaults(record, mem);
        match self.platform.wifi().start_portal(&name, &defaults).await {
            Some(form) => provision::apply_form(&form, record, mem),
            None => warn!("portal closed without a submission"),
        }
    }

    /// Join the stored network, offering the portal briefly if that fails
    async fn connect(&mut self) -> bool {
        let name = self.device_name();
        let timeout = self.settings.portal_timeout_secs;
        let connected = self.platform.wifi().auto_connect(&name, timeout).await;
        if !connected {
            warn!("Wi-Fi connection failed");
        }
        connected
    }

    /// Fetch network time into `mem.net`
    async fn sync_net_time(
        &mut self,
        record: &ConfigRecord,
        mem: &mut SharedState,
    ) -> Result<ClockTime, NetTimeError> {
        if !self.platform.wifi().is_connected() {
            return Err(NetTimeError::NotConnected);
        }
        let url = nettime::build_url(&record.url, &record.tz)?;
        let time = nettime::fetch(self.platform.http(), &url).await?;
        mem.net = time;
        Ok(time)
    }

    /// Erase the record and the network credentials, then reset the chip
    async fn factory_reset(&mut self) -> Result<SleepDirective, Fatal> {
        warn!("factory reset");
        self.platform
            .delay()
            .delay_ms(self.settings.reset_settle_ms)
            .await;
        self.platform
            .storage()
            .remove()
            .map_err(|_| Fatal::StorageUnavailable)?;
        self.platform.wifi().clear_credentials().await;
        Ok(SleepDirective::HardwareReset)
    }
}
