//! Wake dispatcher
//!
//! Each co-processor wake runs exactly one handler, picked by the wake
//! reason, and always persists the record before going back to sleep.

use embedded_hal_async::delay::DelayNs;
use hal_abstractions::net::WifiManager;
use hal_abstractions::timer::WakeTimer;

use super::tuner::{self, DriftSample, TuneOutcome};
use super::{power, Fatal, Platform, PrimaryController, SleepDirective};
use crate::config::ConfigRecord;
use crate::shared::{PauseState, SharedState, WakeReason};

impl<P: Platform> PrimaryController<P> {
    pub(super) async fn resume(&mut self, mem: &mut SharedState) -> Result<SleepDirective, Fatal> {
        let record = self.load_record()?;
        if !power::supply_ok(mem) {
            debug!("supply low ({} < {}), saving only", mem.adc_vdd, mem.adc_vddl);
            self.persist(&record, mem)?;
            return Ok(SleepDirective::ResumeCoprocessor);
        }

        let reason = core::mem::take(&mut mem.wake_reason);
        debug!("co-processor wake: {:?}", reason);
        match reason {
            WakeReason::UpdateNetTime => self.update_net_time(&record, mem).await?,
            WakeReason::TuneTimer => self.tune_timer(&record, mem).await?,
            WakeReason::ResetButton => return self.reset_button(&record, mem).await,
            WakeReason::None => self.persist(&record, mem)?,
        }
        Ok(SleepDirective::ResumeCoprocessor)
    }

    async fn update_net_time(
        &mut self,
        record: &ConfigRecord,
        mem: &mut SharedState,
    ) -> Result<(), Fatal> {
        let old = mem.net;
        if self.connect().await {
            match self.sync_net_time(record, mem).await {
                Ok(time) => info!("network time {} (was {})", time, old),
                Err(e) => warn!("network time update failed: {}", e),
            }
        }
        self.persist(record, mem)
    }

    async fn tune_timer(&mut self, record: &ConfigRecord, mem: &mut SharedState) -> Result<(), Fatal> {
        let outcome = self.tune(record, mem).await;
        info!("tune: {}", outcome);
        self.persist(record, mem)?;
        if !self.platform.wifi().is_connected() {
            mem.sleep_interval = self.settings.offline_interval_secs;
            debug!("offline, next tune in {}s", mem.sleep_interval);
        }
        Ok(())
    }

    /// Measure drift against a fresh fetch and reprogram the wake timer
    async fn tune(&mut self, record: &ConfigRecord, mem: &mut SharedState) -> TuneOutcome {
        let before = DriftSample::capture(mem);
        if !self.connect().await {
            return TuneOutcome::Unavailable;
        }
        if let Err(e) = self.sync_net_time(record, mem).await {
            warn!("network time update failed: {}", e);
            return TuneOutcome::Unavailable;
        }

        let outcome = tuner::retune(mem, before, &self.settings);
        match outcome {
            TuneOutcome::Retuned { old, new, .. } if old != new => {
                self.platform.timer().set_wakeup_period(new);
            }
            _ => {}
        }
        outcome
    }

    /// A long press while paused resets the device, a short one arms resume
    async fn reset_button(
        &mut self,
        record: &ConfigRecord,
        mem: &mut SharedState,
    ) -> Result<SleepDirective, Fatal> {
        self.persist(record, mem)?;
        if mem.pause != PauseState::PendingAck {
            return Ok(SleepDirective::ResumeCoprocessor);
        }

        let poll_ms = self.settings.long_press_poll_ms.max(1);
        let mut long_press = true;
        for _ in 0..self.settings.long_press_ms / poll_ms {
            if !self.button_held() {
                long_press = false;
                break;
            }
            self.platform.delay().delay_ms(poll_ms).await;
        }
        if long_press {
            return self.factory_reset().await;
        }

        if self.connect().await {
            info!("clock paused: {}", mem);
        }
        mem.pause = PauseState::ArmedForResume;
        Ok(SleepDirective::ResumeCoprocessor)
    }
}
