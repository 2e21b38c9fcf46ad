use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

use lotto_keypad::browser::KeypadBrowser;
use lotto_keypad::charge::{self, ChargeSettings};
use lotto_keypad::config::Config;
use lotto_keypad::decoder::KeypadDecoder;
use lotto_keypad::ocr::{OcrEngine, Tesseract};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,chromiumoxide::conn=off,chromiumoxide::handler=off")),
        )
        .init();

    let config = Config::from_env().context("failed to load configuration")?;

    tracing::info!(
        "lotto-keypad starting, url: {}, pin length: {}, min digits: {}",
        config.charge_url,
        config.charge_pin.digit_count(),
        config.min_digits,
    );

    let engine = Tesseract::locate(config.tesseract_path.as_deref());
    engine
        .ensure_available()
        .context("tesseract is required for keypad recognition")?;
    tracing::info!("using tesseract at {}", engine.executable().display());

    let decoder = KeypadDecoder::new(engine, config.settle_delay);

    tracing::info!("launching browser");
    let browser = KeypadBrowser::launch(&config)
        .await
        .context("failed to launch browser")?;

    browser.goto(&config.charge_url).await?;

    if let Some(ref trigger) = config.keypad_trigger {
        tracing::info!("opening keypad via {trigger}");
        browser
            .click_selector(trigger)
            .await
            .context("failed to open keypad")?;
    }

    browser.wait_for_keypad(config.keypad_timeout).await?;

    let outcome = charge::enter_charge_pin(&browser, &decoder, &ChargeSettings::from(&config))
        .await
        .context("charge PIN entry failed")?;

    // The keypad submits itself; closing the browser early can cut that request off
    browser.wait_for_idle(config.submit_wait).await;

    println!("{}", serde_json::to_string(&outcome)?);

    Ok(())
}
