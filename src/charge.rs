use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tokio::time::Duration;

use crate::config::Config;
use crate::decoder::{DecodeError, KeypadDecoder, KeypadSurface};
use crate::ocr::OcrEngine;
use crate::pin::{self, Pin, PinEntryError};

#[derive(Debug, Error)]
pub enum ChargeError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("keypad recognition incomplete: {recognized}/10 digits, need {required} (missing {missing:?})")]
    IncompleteKeypad {
        recognized: usize,
        required: usize,
        missing: Vec<char>,
    },

    #[error(transparent)]
    PinEntry(#[from] PinEntryError),

    #[error("keypad decode and PIN entry exceeded {0:?}")]
    TimedOut(Duration),
}

/// Caller-side policy for one keypad attempt.
#[derive(Debug, Clone)]
pub struct ChargeSettings {
    pub pin: Pin,
    pub min_digits: usize,
    pub click_delay: Duration,
    pub attempt_timeout: Duration,
}

impl From<&Config> for ChargeSettings {
    fn from(config: &Config) -> Self {
        Self {
            pin: config.charge_pin.clone(),
            min_digits: config.min_digits,
            click_delay: config.click_delay,
            attempt_timeout: config.attempt_timeout,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ChargeOutcome {
    pub digits_recognized: usize,
    pub pin_length: usize,
    pub elapsed_ms: u64,
    pub completed_at: DateTime<Utc>,
}

/// Decode the open keypad and type the PIN on it, within the attempt
/// budget. Never retries: a failed attempt needs a freshly opened keypad.
pub async fn enter_charge_pin<S, O>(
    surface: &S,
    decoder: &KeypadDecoder<O>,
    settings: &ChargeSettings,
) -> Result<ChargeOutcome, ChargeError>
where
    S: KeypadSurface,
    O: OcrEngine + 'static,
{
    let started = Instant::now();

    let attempt = async {
        let map = decoder.decode_keypad(surface).await?;
        let recognized = map.len();

        if recognized < settings.min_digits {
            return Err(ChargeError::IncompleteKeypad {
                recognized,
                required: settings.min_digits,
                missing: map.missing(),
            });
        }

        pin::enter_pin(surface, &settings.pin, map, settings.click_delay).await?;
        Ok::<_, ChargeError>(recognized)
    };

    let digits_recognized = tokio::time::timeout(settings.attempt_timeout, attempt)
        .await
        .map_err(|_| ChargeError::TimedOut(settings.attempt_timeout))??;

    let outcome = ChargeOutcome {
        digits_recognized,
        pin_length: settings.pin.digit_count(),
        elapsed_ms: started.elapsed().as_millis() as u64,
        completed_at: Utc::now(),
    };
    tracing::info!(
        "charge PIN entered in {}ms ({} digits recognized)",
        outcome.elapsed_ms,
        outcome.digits_recognized
    );
    Ok(outcome)
}
