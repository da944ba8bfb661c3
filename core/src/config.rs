//! Persisted configuration record
//!
//! One small text document of `key=value` lines:
//!
//! ```text
//! tz=Europe/Berlin
//! url=http://espclock.randseq.org/now.php?tz=[tz]
//! hh=1
//! mm=30
//! ss=0
//! tickpin=1
//! tune_level=2
//! ulp_timer=65000
//! ```
//!
//! Every key is optional. Unknown keys are skipped and a bad value is
//! dropped with a warning, so an older or damaged record still loads.

use core::fmt::{self, Write};
use core::str::FromStr;

use hal_abstractions::net::{TZ_CAP, URL_CAP};
use hal_abstractions::storage::ConfigStorage;
use heapless::String;

use crate::settings::{Settings, TUNE_LEVELS};
use crate::shared::{DriveLine, SharedState};
use crate::time::{ClockTime, HOURS_PER_WHEEL};

/// Largest record accepted
pub const RECORD_CAP: usize = 512;

/// The part of the configuration that lives only in the record
///
/// Everything else is kept in shared memory between wakes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigRecord {
    pub tz: String<TZ_CAP>,
    /// Time server URL template
    pub url: String<URL_CAP>,
}

impl ConfigRecord {
    pub fn new(settings: &Settings) -> Self {
        Self {
            tz: truncated(settings.default_timezone),
            url: truncated(settings.default_url),
        }
    }
}

/// Copy as much of `s` as fits
pub(crate) fn truncated<const N: usize>(s: &str) -> String<N> {
    let mut out = String::new();
    for c in s.chars() {
        if out.push(c).is_err() {
            break;
        }
    }
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigError {
    /// The storage driver failed
    Storage,
    TooLarge,
    /// Not valid UTF-8
    Malformed,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Storage => write!(f, "config storage error"),
            ConfigError::TooLarge => write!(f, "config record larger than {} bytes", RECORD_CAP),
            ConfigError::Malformed => write!(f, "config record is not text"),
        }
    }
}

impl core::error::Error for ConfigError {}

/// Parsed record; `None` means the key was absent (or unusable)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigDocument {
    pub tz: Option<String<TZ_CAP>>,
    pub url: Option<String<URL_CAP>>,
    pub hh: Option<u8>,
    pub mm: Option<u8>,
    pub ss: Option<u8>,
    pub tickpin: Option<DriveLine>,
    pub tune_level: Option<u8>,
    pub ulp_timer: Option<u32>,
}

fn set_text<const N: usize>(slot: &mut Option<String<N>>, value: &str) -> bool {
    let mut text = String::new();
    if text.push_str(value).is_err() {
        return false;
    }
    *slot = Some(text);
    true
}

fn set_number<T: FromStr>(slot: &mut Option<T>, value: &str, valid: impl Fn(&T) -> bool) -> bool {
    match value.parse::<T>() {
        Ok(v) if valid(&v) => {
            *slot = Some(v);
            true
        }
        _ => false,
    }
}

impl ConfigDocument {
    pub fn parse(text: &str) -> Self {
        let mut doc = Self::default();
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                warn!("config: skipping line without '='");
                continue;
            };
            let (key, value) = (key.trim(), value.trim());
            let ok = match key {
                "tz" => set_text(&mut doc.tz, value),
                "url" => set_text(&mut doc.url, value),
                "hh" => set_number(&mut doc.hh, value, |&v| v < HOURS_PER_WHEEL),
                "mm" => set_number(&mut doc.mm, value, |&v| v < 60),
                "ss" => set_number(&mut doc.ss, value, |&v| v < 60),
                "tickpin" => match value.parse().ok().and_then(DriveLine::from_word) {
                    Some(pin) => {
                        doc.tickpin = Some(pin);
                        true
                    }
                    None => false,
                },
                "tune_level" => set_number(&mut doc.tune_level, value, |&v| {
                    usize::from(v) < TUNE_LEVELS
                }),
                "ulp_timer" => set_number(&mut doc.ulp_timer, value, |&v| v > 0),
                _ => {
                    trace!("config: unknown key {}", key);
                    true
                }
            };
            if !ok {
                warn!("config: bad value for {}", key);
            }
        }
        doc
    }

    /// Everything worth keeping across a power loss
    pub fn snapshot(record: &ConfigRecord, mem: &SharedState) -> Self {
        Self {
            tz: Some(record.tz.clone()),
            url: Some(record.url.clone()),
            hh: Some(mem.clk.hh()),
            mm: Some(mem.clk.mm()),
            ss: Some(mem.clk.ss()),
            tickpin: Some(mem.tickpin),
            tune_level: Some(mem.tune_level),
            ulp_timer: Some(mem.wake_period),
        }
    }

    pub fn render(&self) -> Result<String<RECORD_CAP>, ConfigError> {
        let mut out = String::new();
        self.write_lines(&mut out)
            .map_err(|_| ConfigError::TooLarge)?;
        Ok(out)
    }

    fn write_lines(&self, out: &mut impl Write) -> fmt::Result {
        if let Some(tz) = &self.tz {
            writeln!(out, "tz={}", tz)?;
        }
        if let Some(url) = &self.url {
            writeln!(out, "url={}", url)?;
        }
        if let Some(hh) = self.hh {
            writeln!(out, "hh={}", hh)?;
        }
        if let Some(mm) = self.mm {
            writeln!(out, "mm={}", mm)?;
        }
        if let Some(ss) = self.ss {
            writeln!(out, "ss={}", ss)?;
        }
        if let Some(pin) = self.tickpin {
            writeln!(out, "tickpin={}", pin as u16)?;
        }
        if let Some(level) = self.tune_level {
            writeln!(out, "tune_level={}", level)?;
        }
        if let Some(timer) = self.ulp_timer {
            writeln!(out, "ulp_timer={}", timer)?;
        }
        Ok(())
    }

    pub fn apply_record(&self, record: &mut ConfigRecord) {
        if let Some(tz) = &self.tz {
            record.tz = tz.clone();
        }
        if let Some(url) = &self.url {
            record.url = url.clone();
        }
    }

    /// Restore the shared-memory fields; the stored time seeds both dials
    pub fn apply_state(&self, mem: &mut SharedState, settings: &Settings) {
        if let Some(hh) = self.hh {
            set_both(mem, |t| t.with_hour(hh));
        }
        if let Some(mm) = self.mm {
            set_both(mem, |t| t.with_minute(mm));
        }
        if let Some(ss) = self.ss {
            set_both(mem, |t| t.with_second(ss));
        }
        if let Some(pin) = self.tickpin {
            mem.tickpin = pin;
        }
        if let Some(level) = self.tune_level {
            mem.set_tune_level(level, settings);
        }
        if let Some(timer) = self.ulp_timer {
            mem.wake_period = timer;
        }
    }
}

fn set_both(mem: &mut SharedState, f: impl Fn(ClockTime) -> Option<ClockTime>) {
    if let Some(t) = f(mem.clk) {
        mem.clk = t;
    }
    if let Some(t) = f(mem.net) {
        mem.net = t;
    }
}

/// Read and parse the record; `Ok(None)` if there is none
pub fn load<S: ConfigStorage>(storage: &mut S) -> Result<Option<ConfigDocument>, ConfigError> {
    let mut buf = [0u8; RECORD_CAP + 1];
    let Some(len) = storage.read(&mut buf).map_err(|_| ConfigError::Storage)? else {
        return Ok(None);
    };
    if len > RECORD_CAP {
        return Err(ConfigError::TooLarge);
    }
    let text = core::str::from_utf8(&buf[..len]).map_err(|_| ConfigError::Malformed)?;
    Ok(Some(ConfigDocument::parse(text)))
}

pub fn save<S: ConfigStorage>(storage: &mut S, doc: &ConfigDocument) -> Result<(), ConfigError> {
    let text = doc.render()?;
    storage
        .write(text.as_bytes())
        .map_err(|_| ConfigError::Storage)
}
