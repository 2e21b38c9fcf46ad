use std::future::Future;
use std::sync::Arc;

use thiserror::Error;
use tokio::time::{Duration, sleep};

use crate::capture::KeypadImage;
use crate::digit_map::{self, DigitMap};
use crate::locator::{self, BoundingBox};
use crate::ocr::{OcrEngine, OcrError};

/// What the decoder needs from the browser-driving layer.
pub trait KeypadSurface: Sync {
    /// Clickable handle for one keypad button.
    type Element: Send + 'static;

    /// Box of the keypad container, `None` if it is not laid out.
    fn keypad_box(&self) -> impl Future<Output = anyhow::Result<Option<BoundingBox>>> + Send;

    /// Every button element in page order with its box, if it has one.
    fn buttons(
        &self,
    ) -> impl Future<Output = anyhow::Result<Vec<(Self::Element, Option<BoundingBox>)>>> + Send;

    /// PNG screenshot clipped to `region`.
    fn screenshot(&self, region: BoundingBox) -> impl Future<Output = anyhow::Result<Vec<u8>>> + Send;

    fn click(&self, element: &Self::Element) -> impl Future<Output = anyhow::Result<()>> + Send;
}

/// Conditions that abort the whole decode. A fresh keypad is needed to retry.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("no keypad buttons found")]
    NoButtons,

    #[error("keypad container has invalid size: {0:?}")]
    DegenerateKeypad(Option<BoundingBox>),

    #[error("OCR engine unavailable: {0}")]
    OcrUnavailable(String),

    #[error("OCR failed: {0}")]
    OcrFailed(String),

    #[error("keypad screenshot could not be decoded: {0}")]
    InvalidScreenshot(#[from] image::ImageError),

    #[error("automation layer failed: {0:#}")]
    Surface(anyhow::Error),

    #[error("recognition worker failed: {0}")]
    Worker(String),
}

impl From<OcrError> for DecodeError {
    fn from(e: OcrError) -> Self {
        match e {
            OcrError::Unavailable(msg) => DecodeError::OcrUnavailable(msg),
            OcrError::Failed(msg) => DecodeError::OcrFailed(msg),
        }
    }
}

/// Turns the rendered keypad into a digit map.
pub struct KeypadDecoder<O> {
    engine: Arc<O>,
    settle_delay: Duration,
}

impl<O: OcrEngine + 'static> KeypadDecoder<O> {
    pub fn new(engine: O, settle_delay: Duration) -> Self {
        Self {
            engine: Arc::new(engine),
            settle_delay,
        }
    }

    pub fn engine(&self) -> &O {
        &self.engine
    }

    /// Locate, capture and recognize the keypad currently on screen.
    ///
    /// Buttons are processed one at a time in `(y, x)` order. The returned
    /// map may be incomplete; deciding whether that is good enough is up to
    /// the caller. The keypad must already be visible.
    pub async fn decode_keypad<S: KeypadSurface>(
        &self,
        surface: &S,
    ) -> Result<DigitMap<S::Element>, DecodeError> {
        // Let the open animation finish so button and container boxes agree
        sleep(self.settle_delay).await;

        let raw = surface.buttons().await.map_err(DecodeError::Surface)?;
        let raw_count = raw.len();
        let candidates = locator::locate_buttons(raw).ok_or(DecodeError::NoButtons)?;
        tracing::debug!("{} of {raw_count} keypad buttons usable", candidates.len());

        let region = surface.keypad_box().await.map_err(DecodeError::Surface)?;
        let region = match region {
            Some(r) if !r.is_degenerate() => r,
            other => return Err(DecodeError::DegenerateKeypad(other)),
        };

        let png = surface.screenshot(region).await.map_err(DecodeError::Surface)?;
        let keypad = KeypadImage::from_png(&png, region)?;
        tracing::debug!(
            "captured keypad {}x{} at ({:.0}, {:.0})",
            keypad.width(),
            keypad.height(),
            region.x,
            region.y
        );

        // OCR shells out, keep it off the async workers
        let engine = self.engine.clone();
        let map = tokio::task::spawn_blocking(move || -> Result<_, OcrError> {
            engine.ensure_available()?;
            digit_map::build_digit_map(&keypad, candidates, engine.as_ref())
        })
        .await
        .map_err(|e| DecodeError::Worker(e.to_string()))??;

        if map.is_complete() {
            tracing::info!("keypad decoded: all 10 digits recognized");
        } else {
            tracing::warn!(
                "keypad decoded: {}/10 digits recognized, missing {:?}",
                map.len(),
                map.missing()
            );
        }

        Ok(map)
    }
}
