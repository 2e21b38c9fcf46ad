use std::fmt;

use thiserror::Error;
use tokio::time::{Duration, sleep};

use crate::decoder::KeypadSurface;
use crate::digit_map::DigitMap;

/// Positions are 1-based. The digit itself is kept out of `Display` so the
/// PIN does not end up in logs.
#[derive(Debug, Error)]
pub enum PinEntryError {
    #[error("PIN is empty")]
    EmptyPin,

    #[error("PIN has a non-digit character at position {position}")]
    InvalidDigit { position: usize },

    #[error("PIN digit at position {position} is not on the keypad ({clicked} digit(s) entered)")]
    MissingDigit {
        digit: char,
        position: usize,
        clicked: usize,
    },

    #[error("click failed at position {position}: {cause:#}")]
    Click { position: usize, cause: anyhow::Error },
}

/// A validated secret PIN: non-empty, ASCII digits only.
#[derive(Clone, PartialEq, Eq)]
pub struct Pin(String);

impl Pin {
    pub fn parse(raw: &str) -> Result<Self, PinEntryError> {
        if raw.is_empty() {
            return Err(PinEntryError::EmptyPin);
        }
        if let Some(idx) = raw.chars().position(|c| !c.is_ascii_digit()) {
            return Err(PinEntryError::InvalidDigit { position: idx + 1 });
        }
        Ok(Self(raw.to_string()))
    }

    pub fn digit_count(&self) -> usize {
        self.0.len()
    }

    pub fn digits(&self) -> impl Iterator<Item = char> + '_ {
        self.0.chars()
    }
}

impl fmt::Debug for Pin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Pin(<{} digits>)", self.0.len())
    }
}

/// Click the PIN's digits in order, pausing `pacing` after each click.
///
/// Stops at the first digit missing from `map`. Clicks already made are
/// not undone: on failure the keypad must be reopened and decoded again.
pub async fn enter_pin<S: KeypadSurface>(
    surface: &S,
    pin: &Pin,
    map: DigitMap<S::Element>,
    pacing: Duration,
) -> Result<(), PinEntryError> {
    for (idx, digit) in pin.digits().enumerate() {
        let position = idx + 1;
        let Some(element) = map.get(digit) else {
            tracing::warn!("PIN digit {position}/{} missing from keypad map", pin.digit_count());
            return Err(PinEntryError::MissingDigit {
                digit,
                position,
                clicked: idx,
            });
        };

        surface
            .click(element)
            .await
            .map_err(|cause| PinEntryError::Click { position, cause })?;
        sleep(pacing).await;
    }

    tracing::info!("entered {} PIN digits", pin.digit_count());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::tests::FakeSurface;

    fn map_of(pairs: &[(char, usize)]) -> DigitMap<usize> {
        let mut map = DigitMap::new();
        for &(d, e) in pairs {
            map.insert(d, e);
        }
        map
    }

    #[test]
    fn test_pin_parse() {
        assert!(Pin::parse("0042").is_ok());
        assert!(matches!(Pin::parse(""), Err(PinEntryError::EmptyPin)));
        assert!(matches!(
            Pin::parse("12a4"),
            Err(PinEntryError::InvalidDigit { position: 3 })
        ));
        assert!(matches!(
            Pin::parse(" 123"),
            Err(PinEntryError::InvalidDigit { position: 1 })
        ));
    }

    #[test]
    fn test_pin_debug_is_redacted() {
        let pin = Pin::parse("918273").unwrap();
        let shown = format!("{pin:?}");
        assert!(!shown.contains("918273"));
        assert!(shown.contains('6'));
    }

    #[tokio::test(start_paused = true)]
    async fn test_enter_pin_clicks_in_order_with_pacing() {
        let surface = FakeSurface::with_labels(&[]);
        let map = map_of(&[('1', 10), ('2', 20), ('3', 30), ('4', 40), ('9', 90)]);
        let pin = Pin::parse("1234").unwrap();

        let start = tokio::time::Instant::now();
        enter_pin(&surface, &pin, map, Duration::from_millis(300))
            .await
            .unwrap();

        assert_eq!(surface.clicks(), vec![10, 20, 30, 40]);
        assert!(start.elapsed() >= Duration::from_millis(900));
    }

    #[tokio::test]
    async fn test_enter_pin_repeated_digits() {
        let surface = FakeSurface::with_labels(&[]);
        let map = map_of(&[('7', 1), ('0', 2)]);
        enter_pin(&surface, &Pin::parse("7007").unwrap(), map, Duration::ZERO)
            .await
            .unwrap();
        assert_eq!(surface.clicks(), vec![1, 2, 2, 1]);
    }

    #[tokio::test]
    async fn test_enter_pin_stops_at_missing_digit() {
        let surface = FakeSurface::with_labels(&[]);
        let map = map_of(&[('1', 10), ('2', 20), ('4', 40)]);
        let err = enter_pin(&surface, &Pin::parse("1234").unwrap(), map, Duration::ZERO)
            .await
            .unwrap_err();

        match err {
            PinEntryError::MissingDigit {
                digit,
                position,
                clicked,
            } => {
                assert_eq!(digit, '3');
                assert_eq!(position, 3);
                assert_eq!(clicked, 2);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(surface.clicks(), vec![10, 20]);
    }

    #[tokio::test]
    async fn test_enter_pin_surfaces_click_failure() {
        let mut surface = FakeSurface::with_labels(&[]);
        surface.fail_click_on = Some(20);
        let map = map_of(&[('1', 10), ('2', 20)]);
        let err = enter_pin(&surface, &Pin::parse("12").unwrap(), map, Duration::ZERO)
            .await
            .unwrap_err();
        assert!(matches!(err, PinEntryError::Click { position: 2, .. }));
        assert_eq!(surface.clicks(), vec![10]);
    }

    #[test]
    fn test_missing_digit_display_hides_digit() {
        let err = PinEntryError::MissingDigit {
            digit: '8',
            position: 3,
            clicked: 2,
        };
        let msg = err.to_string();
        assert!(msg.contains("position 3"));
        assert!(!msg.contains('8'));
    }
}
