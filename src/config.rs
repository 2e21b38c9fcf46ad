use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::pin::Pin;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing environment variable: {0}")]
    MissingEnv(String),

    #[error("invalid value for {name}: {reason}")]
    Invalid { name: String, reason: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Secret PIN typed on the randomized keypad. Redacted in `Debug`.
    pub charge_pin: Pin,
    /// Page that hosts the charge keypad.
    pub charge_url: String,
    /// Optional selector clicked to open the keypad.
    pub keypad_trigger: Option<String>,
    /// Keypad container selectors, tried in order; later ones are legacy layouts.
    pub keypad_selectors: Vec<String>,
    pub button_selector: String,
    pub tesseract_path: Option<PathBuf>,
    pub chromium_path: Option<String>,
    /// Run browser in headless mode (default false; use xvfb-run on servers)
    pub headless: bool,
    pub settle_delay: Duration,
    pub click_delay: Duration,
    pub keypad_timeout: Duration,
    pub attempt_timeout: Duration,
    /// Upper bound on waiting for the page to go quiet after the last click.
    pub submit_wait: Duration,
    /// Fewer recognized digits than this aborts before any click.
    pub min_digits: usize,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable source (tests pass a map).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let required = |name: &str| lookup(name).ok_or_else(|| ConfigError::MissingEnv(name.into()));

        let charge_pin = Pin::parse(required("LOTTO_CHARGE_PIN")?.trim()).map_err(|e| {
            ConfigError::Invalid {
                name: "LOTTO_CHARGE_PIN".into(),
                reason: e.to_string(),
            }
        })?;

        let charge_url = required("LOTTO_CHARGE_URL")?;

        let keypad_trigger = lookup("LOTTO_KEYPAD_TRIGGER").filter(|s| !s.trim().is_empty());

        let keypad_selectors: Vec<String> = lookup("LOTTO_KEYPAD_SELECTOR")
            .map(|v| {
                v.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_else(|| vec![".nppfs-keypad".into(), ".kpd-layer".into()]);
        if keypad_selectors.is_empty() {
            return Err(ConfigError::Invalid {
                name: "LOTTO_KEYPAD_SELECTOR".into(),
                reason: "no selectors given".into(),
            });
        }
        let button_selector =
            lookup("LOTTO_BUTTON_SELECTOR").unwrap_or_else(|| "img.kpd-data".into());

        let tesseract_path = lookup("LOTTO_TESSERACT_PATH")
            .or_else(|| lookup("TESSERACT_PATH"))
            .filter(|s| !s.is_empty())
            .map(PathBuf::from);

        let chromium_path = lookup("LOTTO_CHROMIUM_PATH");

        let headless = lookup("LOTTO_HEADLESS")
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        let millis = |name: &str, default: u64| -> Result<Duration, ConfigError> {
            match lookup(name) {
                Some(v) => v
                    .trim()
                    .parse::<u64>()
                    .map(Duration::from_millis)
                    .map_err(|e| ConfigError::Invalid {
                        name: name.into(),
                        reason: format!("{v}: {e}"),
                    }),
                None => Ok(Duration::from_millis(default)),
            }
        };

        let settle_delay = millis("LOTTO_SETTLE_DELAY_MS", 1000)?;
        let click_delay = millis("LOTTO_CLICK_DELAY_MS", 300)?;
        let keypad_timeout = millis("LOTTO_KEYPAD_TIMEOUT_MS", 10_000)?;
        let attempt_timeout = millis("LOTTO_ATTEMPT_TIMEOUT_MS", 30_000)?;
        let submit_wait = millis("LOTTO_SUBMIT_WAIT_MS", 10_000)?;

        let min_digits = match lookup("LOTTO_MIN_DIGITS") {
            Some(v) => match v.trim().parse::<usize>() {
                Ok(n) if (1..=10).contains(&n) => n,
                _ => {
                    return Err(ConfigError::Invalid {
                        name: "LOTTO_MIN_DIGITS".into(),
                        reason: format!("{v}: expected 1..=10"),
                    });
                }
            },
            None => 9,
        };

        Ok(Config {
            charge_pin,
            charge_url,
            keypad_trigger,
            keypad_selectors,
            button_selector,
            tesseract_path,
            chromium_path,
            headless,
            settle_delay,
            click_delay,
            keypad_timeout,
            attempt_timeout,
            submit_wait,
            min_digits,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let env: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|name| env.get(name).cloned())
    }

    const BASE: [(&str, &str); 2] = [
        ("LOTTO_CHARGE_PIN", "123456"),
        ("LOTTO_CHARGE_URL", "https://example.test/charge"),
    ];

    #[test]
    fn test_defaults() {
        let config = load(&BASE).unwrap();
        assert_eq!(config.charge_pin.digit_count(), 6);
        assert_eq!(config.keypad_selectors, [".nppfs-keypad", ".kpd-layer"]);
        assert_eq!(config.button_selector, "img.kpd-data");
        assert_eq!(config.settle_delay, Duration::from_millis(1000));
        assert_eq!(config.click_delay, Duration::from_millis(300));
        assert_eq!(config.keypad_timeout, Duration::from_secs(10));
        assert_eq!(config.submit_wait, Duration::from_secs(10));
        assert_eq!(config.min_digits, 9);
        assert!(!config.headless);
        assert!(config.tesseract_path.is_none());
        assert!(config.keypad_trigger.is_none());
    }

    #[test]
    fn test_missing_pin() {
        let err = load(&BASE[1..]).unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnv(ref n) if n == "LOTTO_CHARGE_PIN"));
    }

    #[test]
    fn test_invalid_pin() {
        let err = load(&[("LOTTO_CHARGE_PIN", "12x4"), BASE[1]]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
        assert!(!err.to_string().contains("12x4"));
    }

    #[test]
    fn test_tesseract_override_precedence() {
        let mut vars = BASE.to_vec();
        vars.push(("TESSERACT_PATH", "/usr/bin/tesseract"));
        assert_eq!(
            load(&vars).unwrap().tesseract_path,
            Some(PathBuf::from("/usr/bin/tesseract"))
        );

        vars.push(("LOTTO_TESSERACT_PATH", "/opt/tess/bin/tesseract"));
        assert_eq!(
            load(&vars).unwrap().tesseract_path,
            Some(PathBuf::from("/opt/tess/bin/tesseract"))
        );
    }

    #[test]
    fn test_numeric_overrides() {
        let mut vars = BASE.to_vec();
        vars.extend([
            ("LOTTO_CLICK_DELAY_MS", "150"),
            ("LOTTO_MIN_DIGITS", "10"),
            ("LOTTO_HEADLESS", "TRUE"),
        ]);
        let config = load(&vars).unwrap();
        assert_eq!(config.click_delay, Duration::from_millis(150));
        assert_eq!(config.min_digits, 10);
        assert!(config.headless);
    }

    #[test]
    fn test_keypad_selector_list() {
        let mut vars = BASE.to_vec();
        vars.push(("LOTTO_KEYPAD_SELECTOR", " #pad , .old-pad,,"));
        assert_eq!(load(&vars).unwrap().keypad_selectors, ["#pad", ".old-pad"]);

        let mut vars = BASE.to_vec();
        vars.push(("LOTTO_KEYPAD_SELECTOR", " , "));
        assert!(matches!(load(&vars), Err(ConfigError::Invalid { .. })));
    }

    #[test]
    fn test_rejects_bad_numbers() {
        let mut vars = BASE.to_vec();
        vars.push(("LOTTO_SETTLE_DELAY_MS", "soon"));
        assert!(matches!(load(&vars), Err(ConfigError::Invalid { .. })));

        let mut vars = BASE.to_vec();
        vars.push(("LOTTO_MIN_DIGITS", "11"));
        assert!(matches!(load(&vars), Err(ConfigError::Invalid { .. })));
    }

    #[test]
    fn test_debug_redacts_pin() {
        let config = load(&BASE).unwrap();
        assert!(!format!("{config:?}").contains("123456"));
    }
}
