use std::collections::BTreeMap;

use crate::capture::KeypadImage;
use crate::locator::ButtonCandidate;
use crate::ocr::{self, OcrEngine, OcrError};

/// Digit -> clickable button, for one keypad render only.
///
/// Deliberately not `Clone`: the layout is reshuffled every time the keypad
/// opens, so a map must be built, consumed by PIN entry and dropped.
#[derive(Debug)]
pub struct DigitMap<E> {
    entries: BTreeMap<char, E>,
}

impl<E> Default for DigitMap<E> {
    fn default() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }
}

impl<E> DigitMap<E> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `digit` against `element` unless the digit is already mapped.
    /// Returns `false` for duplicates and non-digits.
    pub fn insert(&mut self, digit: char, element: E) -> bool {
        if !digit.is_ascii_digit() || self.entries.contains_key(&digit) {
            return false;
        }
        self.entries.insert(digit, element);
        true
    }

    pub fn get(&self, digit: char) -> Option<&E> {
        self.entries.get(&digit)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All ten digits present.
    pub fn is_complete(&self) -> bool {
        self.entries.len() == 10
    }

    pub fn missing(&self) -> Vec<char> {
        ('0'..='9').filter(|d| !self.entries.contains_key(d)).collect()
    }
}

/// Recognize every candidate in order and merge the results.
///
/// The first button read as a given digit keeps it; later buttons read as
/// the same digit are misreads and are dropped. The map is returned even
/// if incomplete. Only an unusable OCR engine aborts.
pub fn build_digit_map<E, O>(
    keypad: &KeypadImage,
    candidates: Vec<ButtonCandidate<E>>,
    engine: &O,
) -> Result<DigitMap<E>, OcrError>
where
    O: OcrEngine + ?Sized,
{
    let mut map = DigitMap::new();
    let total = candidates.len();

    for (idx, candidate) in candidates.into_iter().enumerate() {
        let Some(crop) = keypad.crop(&candidate.bounding_box) else {
            tracing::warn!(
                "button {}/{total} lies outside the keypad snapshot, skipping",
                idx + 1
            );
            continue;
        };

        match ocr::recognize_button(engine, &crop)? {
            Some(rec) => {
                if map.insert(rec.digit, candidate.element) {
                    tracing::debug!(
                        "button {}/{total}: recognized via {} (psm {})",
                        idx + 1,
                        rec.stage,
                        rec.mode.psm()
                    );
                } else {
                    tracing::debug!("button {}/{total}: duplicate digit, dropped", idx + 1);
                }
            }
            None => {
                tracing::debug!("button {}/{total}: no digit recognized", idx + 1);
            }
        }
    }

    Ok(map)
}
