//! Button monitor
//!
//! Active-low, debounced by a second read 50 ms later. What a press means
//! depends on the pause state:
//!
//! | pause            | press                                        |
//! |------------------|----------------------------------------------|
//! | `Running`        | pause, wake primary with `ResetButton`       |
//! | `PendingAck`     | ignored, the primary owns the next step      |
//! | `ArmedForResume` | wait for release, then restart the clock     |

use core::convert::Infallible;

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::InputPin;

use super::Exit;
use crate::settings::Settings;
use crate::shared::{PauseState, SharedState, WakeReason};

fn pressed<B: InputPin<Error = Infallible>>(button: &mut B) -> bool {
    button.is_low().unwrap_or_else(|e| match e {})
}

pub(crate) fn check_button<B, D>(
    mem: &mut SharedState,
    settings: &Settings,
    button: &mut B,
    delay: &mut D,
) -> Option<Exit>
where
    B: InputPin<Error = Infallible>,
    D: DelayNs,
{
    if !pressed(button) {
        return None;
    }
    delay.delay_ms(settings.debounce_ms);
    if !pressed(button) {
        return None;
    }

    match mem.pause {
        PauseState::Running => {
            debug!("button pressed, pausing");
            mem.pause = PauseState::PendingAck;
            mem.wake_reason = WakeReason::ResetButton;
            Some(Exit::Wake)
        }
        PauseState::ArmedForResume => {
            loop {
                delay.delay_ms(settings.debounce_ms);
                if !pressed(button) {
                    break;
                }
            }
            debug!("button released, restarting clock");
            Some(Exit::RestartClock)
        }
        PauseState::PendingAck => Some(Exit::Halt),
    }
}
