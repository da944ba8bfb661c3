//! Network time over plain HTTP
//!
//! The time server answers a GET with a body starting `HH:MM:SS` in the
//! requested timezone, 24-hour. Only the first eight bytes are read.

use core::fmt;

use embedded_io_async::{Read, ReadExactError};
use hal_abstractions::net::{HttpClient, URL_CAP};
use heapless::String;

use crate::time::ClockTime;

/// Placeholder in the URL template replaced by the timezone
pub const TZ_PLACEHOLDER: &str = "[tz]";

const HTTP_OK: u16 = 200;

/// Length of `HH:MM:SS`
const BODY_LEN: usize = 8;

/// Why a network time fetch failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum NetTimeError {
    NotConnected,
    /// The expanded URL does not fit the request buffer
    UrlTooLong,
    /// Request or body read failed below HTTP
    Transport,
    Http(u16),
    ShortBody,
    Malformed,
}

impl fmt::Display for NetTimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetTimeError::NotConnected => write!(f, "Wi-Fi not connected"),
            NetTimeError::UrlTooLong => write!(f, "time server URL too long"),
            NetTimeError::Transport => write!(f, "transport error"),
            NetTimeError::Http(status) => write!(f, "HTTP status {}", status),
            NetTimeError::ShortBody => write!(f, "response body too short"),
            NetTimeError::Malformed => write!(f, "response body is not HH:MM:SS"),
        }
    }
}

impl core::error::Error for NetTimeError {}

/// Expand `template`, replacing every `[tz]` with `tz`
///
/// Slashes in the timezone are percent-encoded so `Europe/Berlin` stays one
/// query value.
pub fn build_url(template: &str, tz: &str) -> Result<String<URL_CAP>, NetTimeError> {
    let mut url = String::new();
    for (i, piece) in template.split(TZ_PLACEHOLDER).enumerate() {
        if i > 0 {
            for c in tz.chars() {
                let pushed = if c == '/' {
                    url.push_str("%2F")
                } else {
                    url.push(c)
                };
                pushed.map_err(|_| NetTimeError::UrlTooLong)?;
            }
        }
        url.push_str(piece)
            .map_err(|_| NetTimeError::UrlTooLong)?;
    }
    Ok(url)
}

fn two_digits(bytes: &[u8]) -> Option<u8> {
    match bytes {
        [hi @ b'0'..=b'9', lo @ b'0'..=b'9'] => Some((hi - b'0') * 10 + (lo - b'0')),
        _ => None,
    }
}

/// Parse the leading `HH:MM:SS` of a response body into 12-hour time
pub fn parse_body(body: &[u8]) -> Result<ClockTime, NetTimeError> {
    let head = body.get(..BODY_LEN).ok_or(NetTimeError::ShortBody)?;
    if head[2] != b':' || head[5] != b':' {
        return Err(NetTimeError::Malformed);
    }
    let hh = two_digits(&head[0..2]).ok_or(NetTimeError::Malformed)?;
    let mm = two_digits(&head[3..5]).ok_or(NetTimeError::Malformed)?;
    let ss = two_digits(&head[6..8]).ok_or(NetTimeError::Malformed)?;
    ClockTime::from_24h(hh, mm, ss).ok_or(NetTimeError::Malformed)
}

/// GET `url` and parse the time it returns
pub async fn fetch<H: HttpClient>(http: &mut H, url: &str) -> Result<ClockTime, NetTimeError> {
    trace!("GET {}", url);
    let mut response = http.get(url).await.map_err(|_| NetTimeError::Transport)?;
    if response.status != HTTP_OK {
        return Err(NetTimeError::Http(response.status));
    }

    let mut head = [0u8; BODY_LEN];
    response
        .body
        .read_exact(&mut head)
        .await
        .map_err(|e| match e {
            ReadExactError::UnexpectedEof => NetTimeError::ShortBody,
            ReadExactError::Other(_) => NetTimeError::Transport,
        })?;
    parse_body(&head)
}
