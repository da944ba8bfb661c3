//! In-test stand-ins for the hardware
//!
//! Every mock is a cheap handle onto shared state, so a test can hand one
//! clone to the code under test and keep another to inspect afterwards.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::convert::Infallible;
use std::rc::Rc;
use std::string::{String, ToString};
use std::vec::Vec;

use embedded_hal::digital::{ErrorType as PinErrorType, InputPin, OutputPin};
use embedded_io_async::{ErrorKind, ErrorType as IoErrorType, Read};
use hal_abstractions::adc::{LinearCharacteristics, SupplyAdc};
use hal_abstractions::net::{HttpClient, HttpResponse, ProvisioningForm, WifiManager};
use hal_abstractions::storage::ConfigStorage;
use hal_abstractions::timer::WakeTimer;

use crate::primary::Platform;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MockError;

#[derive(Debug, Default)]
struct PinState {
    high: bool,
    script: VecDeque<bool>,
    reads: usize,
    rising_edges: usize,
}

/// A GPIO usable as input or output
///
/// As an input it first plays back its script, one level per read, then
/// keeps returning the last level.
#[derive(Debug, Clone, Default)]
pub struct MockPin(Rc<RefCell<PinState>>);

impl MockPin {
    pub fn new() -> Self {
        Self::default()
    }

    /// An input idling high (button released)
    pub fn released() -> Self {
        let pin = Self::new();
        pin.0.borrow_mut().high = true;
        pin
    }

    pub fn script(levels: &[bool]) -> Self {
        let pin = Self::new();
        pin.push_script(levels);
        pin
    }

    pub fn push_script(&self, levels: &[bool]) {
        self.0.borrow_mut().script.extend(levels.iter().copied());
    }

    /// Hold the button down
    pub fn press(&self) {
        let mut state = self.0.borrow_mut();
        state.script.clear();
        state.high = false;
    }

    pub fn release(&self) {
        let mut state = self.0.borrow_mut();
        state.script.clear();
        state.high = true;
    }

    pub fn reads(&self) -> usize {
        self.0.borrow().reads
    }

    pub fn rising_edges(&self) -> usize {
        self.0.borrow().rising_edges
    }

    pub fn is_set_high(&self) -> bool {
        self.0.borrow().high
    }

    fn read(&self) -> bool {
        let mut state = self.0.borrow_mut();
        state.reads += 1;
        if let Some(level) = state.script.pop_front() {
            state.high = level;
        }
        state.high
    }

    fn drive(&self, high: bool) {
        let mut state = self.0.borrow_mut();
        if high && !state.high {
            state.rising_edges += 1;
        }
        state.high = high;
    }
}

impl PinErrorType for MockPin {
    type Error = Infallible;
}

impl InputPin for MockPin {
    fn is_high(&mut self) -> Result<bool, Self::Error> {
        Ok(self.read())
    }

    fn is_low(&mut self) -> Result<bool, Self::Error> {
        Ok(!self.read())
    }
}

impl OutputPin for MockPin {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.drive(false);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.drive(true);
        Ok(())
    }
}

/// A delay that only counts
#[derive(Debug, Clone, Default)]
pub struct MockDelay(Rc<Cell<u64>>);

impl MockDelay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn elapsed_us(&self) -> u64 {
        self.0.get() / 1000
    }

    fn add(&self, ns: u32) {
        self.0.set(self.0.get() + u64::from(ns));
    }
}

impl embedded_hal::delay::DelayNs for MockDelay {
    fn delay_ns(&mut self, ns: u32) {
        self.add(ns);
    }
}

impl embedded_hal_async::delay::DelayNs for MockDelay {
    async fn delay_ns(&mut self, ns: u32) {
        self.add(ns);
    }
}

#[derive(Debug, Default)]
struct AdcState {
    level: u16,
    sequence: VecDeque<u16>,
    taken: usize,
}

/// Supply divider reading a fixed level after an optional sequence
#[derive(Debug, Clone, Default)]
pub struct MockAdc(Rc<RefCell<AdcState>>);

impl MockAdc {
    pub fn new(level: u16) -> Self {
        let adc = Self::default();
        adc.set_level(level);
        adc
    }

    pub fn sequence(samples: &[u16]) -> Self {
        let adc = Self::new(samples.last().copied().unwrap_or_default());
        adc.0.borrow_mut().sequence.extend(samples.iter().copied());
        adc
    }

    pub fn set_level(&self, level: u16) {
        let mut state = self.0.borrow_mut();
        state.sequence.clear();
        state.level = level;
    }

    pub fn samples_taken(&self) -> usize {
        self.0.borrow().taken
    }
}

impl SupplyAdc for MockAdc {
    fn sample(&mut self) -> u16 {
        let mut state = self.0.borrow_mut();
        state.taken += 1;
        state.sequence.pop_front().unwrap_or(state.level)
    }
}

#[derive(Debug, Default)]
struct StorageState {
    record: Option<Vec<u8>>,
    broken: bool,
    read_only: bool,
    writes: usize,
}

/// Flash holding at most one record
#[derive(Debug, Clone, Default)]
pub struct MockStorage(Rc<RefCell<StorageState>>);

impl MockStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_record(text: &str) -> Self {
        let storage = Self::new();
        storage.0.borrow_mut().record = Some(text.as_bytes().to_vec());
        storage
    }

    /// Every operation fails
    pub fn break_down(&self) {
        self.0.borrow_mut().broken = true;
    }

    /// Writes fail, reads succeed
    pub fn make_read_only(&self) {
        self.0.borrow_mut().read_only = true;
    }

    pub fn record(&self) -> Option<String> {
        let state = self.0.borrow();
        state
            .record
            .as_ref()
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
    }

    pub fn writes(&self) -> usize {
        self.0.borrow().writes
    }

    fn check(&self) -> Result<(), MockError> {
        if self.0.borrow().broken {
            Err(MockError)
        } else {
            Ok(())
        }
    }
}

impl ConfigStorage for MockStorage {
    type Error = MockError;

    fn exists(&mut self) -> Result<bool, Self::Error> {
        self.check()?;
        Ok(self.0.borrow().record.is_some())
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<Option<usize>, Self::Error> {
        self.check()?;
        let state = self.0.borrow();
        Ok(state.record.as_ref().map(|record| {
            let n = record.len().min(buf.len());
            buf[..n].copy_from_slice(&record[..n]);
            n
        }))
    }

    fn write(&mut self, data: &[u8]) -> Result<(), Self::Error> {
        self.check()?;
        let mut state = self.0.borrow_mut();
        if state.read_only {
            return Err(MockError);
        }
        state.writes += 1;
        state.record = Some(data.to_vec());
        Ok(())
    }

    fn remove(&mut self) -> Result<(), Self::Error> {
        self.check()?;
        self.0.borrow_mut().record = None;
        Ok(())
    }
}

/// Response body served from memory
#[derive(Debug)]
pub struct MockBody {
    data: Vec<u8>,
    pos: usize,
}

impl IoErrorType for MockBody {
    type Error = ErrorKind;
}

impl Read for MockBody {
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        let rest = &self.data[self.pos..];
        let n = rest.len().min(buf.len());
        buf[..n].copy_from_slice(&rest[..n]);
        self.pos += n;
        Ok(n)
    }
}

#[derive(Debug, Default)]
struct HttpState {
    responses: VecDeque<Option<(u16, Vec<u8>)>>,
    requests: Vec<String>,
}

/// HTTP client answering from a queue; an empty queue is a transport error
#[derive(Debug, Clone, Default)]
pub struct MockHttp(Rc<RefCell<HttpState>>);

impl MockHttp {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, status: u16, body: &str) {
        self.0
            .borrow_mut()
            .responses
            .push_back(Some((status, body.as_bytes().to_vec())));
    }

    pub fn fail_next(&self) {
        self.0.borrow_mut().responses.push_back(None);
    }

    pub fn requests(&self) -> Vec<String> {
        self.0.borrow().requests.clone()
    }
}

impl HttpClient for MockHttp {
    type Error = MockError;
    type Body = MockBody;

    async fn get(&mut self, url: &str) -> Result<HttpResponse<Self::Body>, Self::Error> {
        let mut state = self.0.borrow_mut();
        state.requests.push(url.to_string());
        let (status, data) = state.responses.pop_front().flatten().ok_or(MockError)?;
        Ok(HttpResponse {
            status,
            body: MockBody { data, pos: 0 },
        })
    }
}

#[derive(Debug, Default)]
struct WifiState {
    reachable: bool,
    connected: bool,
    form: Option<ProvisioningForm>,
    connects: usize,
    portals: usize,
    cleared: bool,
    ap_name: String,
}

/// Wi-Fi whose network is either always or never reachable
#[derive(Debug, Clone, Default)]
pub struct MockWifi(Rc<RefCell<WifiState>>);

impl MockWifi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.0.borrow_mut().reachable = reachable;
    }

    /// What the user will type into the portal
    pub fn submit_form(&self, clock_time: &str, timezone: &str, url: &str) {
        let mut form = ProvisioningForm::default();
        let _ = form.clock_time.push_str(clock_time);
        let _ = form.timezone.push_str(timezone);
        let _ = form.url.push_str(url);
        self.0.borrow_mut().form = Some(form);
    }

    pub fn connects(&self) -> usize {
        self.0.borrow().connects
    }

    pub fn portals(&self) -> usize {
        self.0.borrow().portals
    }

    pub fn credentials_cleared(&self) -> bool {
        self.0.borrow().cleared
    }

    pub fn ap_name(&self) -> String {
        self.0.borrow().ap_name.clone()
    }
}

impl WifiManager for MockWifi {
    async fn auto_connect(&mut self, ap_name: &str, _portal_timeout_secs: u16) -> bool {
        let mut state = self.0.borrow_mut();
        state.connects += 1;
        state.ap_name = ap_name.to_string();
        state.connected = state.reachable;
        state.connected
    }

    async fn start_portal(
        &mut self,
        ap_name: &str,
        _defaults: &ProvisioningForm,
    ) -> Option<ProvisioningForm> {
        let mut state = self.0.borrow_mut();
        state.portals += 1;
        state.ap_name = ap_name.to_string();
        state.connected = state.reachable;
        state.form.clone()
    }

    fn is_connected(&self) -> bool {
        self.0.borrow().connected
    }

    async fn clear_credentials(&mut self) {
        let mut state = self.0.borrow_mut();
        state.cleared = true;
        state.connected = false;
    }
}

/// Records every wake period programmed
#[derive(Debug, Clone, Default)]
pub struct MockTimer(Rc<RefCell<Vec<u32>>>);

impl MockTimer {
    pub fn periods(&self) -> Vec<u32> {
        self.0.borrow().clone()
    }
}

impl WakeTimer for MockTimer {
    fn set_wakeup_period(&mut self, ticks: u32) {
        self.0.borrow_mut().push(ticks);
    }
}

/// Primary controller board built from the mocks above
#[derive(Debug, Clone)]
pub struct MockPlatform {
    pub storage: MockStorage,
    pub http: MockHttp,
    pub wifi: MockWifi,
    pub button: MockPin,
    pub delay: MockDelay,
    pub timer: MockTimer,
    pub adc: LinearCharacteristics,
    pub chip_id: u64,
}

impl MockPlatform {
    pub fn new() -> Self {
        Self {
            storage: MockStorage::new(),
            http: MockHttp::new(),
            wifi: MockWifi::new(),
            button: MockPin::released(),
            delay: MockDelay::new(),
            timer: MockTimer::default(),
            adc: LinearCharacteristics::ATTEN_11DB,
            chip_id: 0x24A1_60C3_D4E5,
        }
    }
}

impl Platform for MockPlatform {
    type Storage = MockStorage;
    type Http = MockHttp;
    type Wifi = MockWifi;
    type Button = MockPin;
    type Delay = MockDelay;
    type Timer = MockTimer;
    type Adc = LinearCharacteristics;

    fn storage(&mut self) -> &mut Self::Storage {
        &mut self.storage
    }

    fn http(&mut self) -> &mut Self::Http {
        &mut self.http
    }

    fn wifi(&mut self) -> &mut Self::Wifi {
        &mut self.wifi
    }

    fn button(&mut self) -> &mut Self::Button {
        &mut self.button
    }

    fn delay(&mut self) -> &mut Self::Delay {
        &mut self.delay
    }

    fn timer(&mut self) -> &mut Self::Timer {
        &mut self.timer
    }

    fn adc(&self) -> &Self::Adc {
        &self.adc
    }

    fn chip_id(&self) -> u64 {
        self.chip_id
    }
}
