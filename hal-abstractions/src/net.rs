//! Wi-Fi and HTTP collaborators
//!
//! Both are async; the primary controller runs them on whatever executor
//! the board brings up after wake-up.

use heapless::String;

/// Capacity of the time-of-day form field
pub const CLOCK_FIELD_CAP: usize = 8;
/// Capacity of the timezone form field
pub const TZ_CAP: usize = 48;
/// Capacity of the time server URL (template or expanded)
pub const URL_CAP: usize = 160;

/// Status line and streaming body of an HTTP response
#[derive(Debug)]
pub struct HttpResponse<B> {
    pub status: u16,
    pub body: B,
}

/// Minimal HTTP/1.1 client
#[allow(async_fn_in_trait)]
pub trait HttpClient {
    type Error: core::fmt::Debug;
    type Body: embedded_io_async::Read;

    /// Issue a GET request; any status code is a successful request
    async fn get(&mut self, url: &str) -> Result<HttpResponse<Self::Body>, Self::Error>;
}

/// The three fields of the provisioning portal
///
/// Values are as typed by the user; the core crate parses them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProvisioningForm {
    /// Clock face time as `HHMMSS` digits
    pub clock_time: String<CLOCK_FIELD_CAP>,
    /// Timezone name, e.g. `Europe/Berlin`
    pub timezone: String<TZ_CAP>,
    /// Time server URL template containing `[tz]`
    pub url: String<URL_CAP>,
}

/// Station-mode Wi-Fi with a captive provisioning portal
#[allow(async_fn_in_trait)]
pub trait WifiManager {
    /// Join the stored network
    ///
    /// If that fails a portal named `ap_name` may be offered for up to
    /// `portal_timeout_secs`. Returns whether the station is connected.
    async fn auto_connect(&mut self, ap_name: &str, portal_timeout_secs: u16) -> bool;

    /// Run the provisioning portal named `ap_name` until the user submits
    ///
    /// `defaults` pre-fills the form. Returns `None` if the portal was
    /// closed without a submission.
    async fn start_portal(
        &mut self,
        ap_name: &str,
        defaults: &ProvisioningForm,
    ) -> Option<ProvisioningForm>;

    fn is_connected(&self) -> bool;

    /// Forget the stored network credentials
    async fn clear_credentials(&mut self);
}
