use anyhow::{Context, Result};
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::page::{CaptureScreenshotFormat, Viewport};
use chromiumoxide::element::Element;
use chromiumoxide::handler::viewport::Viewport as WindowViewport;
use chromiumoxide::page::ScreenshotParams;
use chromiumoxide::Page;
use futures::StreamExt;
use std::sync::atomic::{AtomicUsize, Ordering};
use thiserror::Error;
use tokio::time::{sleep, Duration, Instant};

use crate::config::Config;
use crate::decoder::KeypadSurface;
use crate::locator::BoundingBox;

#[derive(Debug, Error)]
pub enum BrowserError {
    #[error("browser launch failed: {0}")]
    LaunchFailed(String),

    #[error("element not found: {0}")]
    ElementNotFound(String),

    #[error("screenshot failed: {0}")]
    ScreenshotFailed(String),

    #[error("keypad ({selectors}) not visible after {timeout:?}")]
    KeypadTimeout { selectors: String, timeout: Duration },
}

/// Chromium page hosting the charge keypad.
pub struct KeypadBrowser {
    _browser: Browser,
    _profile_dir: tempfile::TempDir,
    page: Page,
    keypad_selectors: Vec<String>,
    /// Index into `keypad_selectors` of the container that became visible.
    active_keypad: AtomicUsize,
    button_selector: String,
}

impl KeypadBrowser {
    pub async fn launch(config: &Config) -> Result<Self> {
        // Use a fresh temp profile each launch so no cookies/state persist between runs
        let user_data_dir = tempfile::tempdir().context("failed to create temp profile dir")?;

        let mut builder = BrowserConfig::builder()
            .no_sandbox()
            .window_size(1920, 1080)
            .viewport(WindowViewport {
                width: 1920,
                height: 1080,
                device_scale_factor: Some(1.0),
                ..Default::default()
            })
            .arg("--disable-dev-shm-usage")
            .arg("--force-device-scale-factor=1")
            .arg("--user-agent=Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36")
            .user_data_dir(user_data_dir.path());

        if config.headless {
            // with_head() keeps chromiumoxide from adding the legacy --headless flag
            builder = builder.with_head().arg("--headless=new");
        } else {
            builder = builder.with_head();
        }

        if let Some(ref path) = config.chromium_path {
            builder = builder.chrome_executable(path);
        }

        let browser_config = builder
            .build()
            .map_err(|e| BrowserError::LaunchFailed(e.to_string()))?;

        let (browser, mut handler) = Browser::launch(browser_config)
            .await
            .map_err(|e| BrowserError::LaunchFailed(e.to_string()))?;

        tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                let _ = event;
            }
        });

        let page = browser
            .new_page("about:blank")
            .await
            .context("failed to create new page")?;

        Ok(KeypadBrowser {
            _browser: browser,
            _profile_dir: user_data_dir,
            page,
            keypad_selectors: config.keypad_selectors.clone(),
            active_keypad: AtomicUsize::new(0),
            button_selector: config.button_selector.clone(),
        })
    }

    pub async fn goto(&self, url: &str) -> Result<()> {
        tracing::info!("navigating to {url}");
        self.page
            .goto(url)
            .await
            .with_context(|| format!("failed to navigate to {url}"))?;
        Ok(())
    }

    pub async fn click_selector(&self, selector: &str) -> Result<()> {
        let js = format!(
            r#"
            (function() {{
                const el = document.querySelector('{selector}');
                if (el) {{
                    el.click();
                    return true;
                }}
                return false;
            }})()
            "#,
            selector = selector.replace('\'', "\\'"),
        );

        let result = self
            .page
            .evaluate(js)
            .await
            .with_context(|| format!("click_selector({selector}) failed"))?;

        let clicked = result.into_value::<bool>().unwrap_or(false);
        if !clicked {
            return Err(BrowserError::ElementNotFound(format!("selector: {selector}")).into());
        }
        Ok(())
    }

    /// Poll until one of the keypad containers has a non-empty box. The
    /// first one to show up is used for every later capture.
    pub async fn wait_for_keypad(&self, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        loop {
            let mut boxes = Vec::with_capacity(self.keypad_selectors.len());
            for selector in &self.keypad_selectors {
                boxes.push(self.box_of(selector).await);
            }

            if let Some(idx) = first_visible(&boxes)
                && let Some(bbox) = boxes[idx]
            {
                self.active_keypad.store(idx, Ordering::SeqCst);
                tracing::info!(
                    "keypad {} visible at ({:.0}, {:.0}) {:.0}x{:.0}",
                    self.keypad_selectors[idx],
                    bbox.x,
                    bbox.y,
                    bbox.width,
                    bbox.height
                );
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(BrowserError::KeypadTimeout {
                    selectors: self.keypad_selectors.join(", "),
                    timeout,
                }
                .into());
            }
            sleep(Duration::from_millis(250)).await;
        }
    }

    /// Wait for the PIN submission to settle: document loaded and no new
    /// resource fetched for `QUIET_WINDOW`. Gives up after `timeout` and
    /// reports whether the page went quiet.
    pub async fn wait_for_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut quiet = QuietWindow::new(QUIET_WINDOW);
        loop {
            // Evaluation fails while a navigation swaps the document
            let (complete, resources) = match self.page.evaluate(LOAD_STATE_JS.to_string()).await {
                Ok(v) => match v.into_value::<(String, usize)>() {
                    Ok((state, count)) => (state == "complete", count),
                    Err(_) => (false, 0),
                },
                Err(e) => {
                    tracing::debug!("load state unavailable: {e}");
                    (false, 0)
                }
            };

            let now = Instant::now();
            if quiet.observe(complete, resources, now) {
                tracing::info!("page idle after PIN entry");
                return true;
            }
            if now >= deadline {
                tracing::warn!("page still busy {timeout:?} after PIN entry");
                return false;
            }
            sleep(Duration::from_millis(250)).await;
        }
    }

    async fn box_of(&self, selector: &str) -> Option<BoundingBox> {
        let container = match self.page.find_element(selector).await {
            Ok(el) => el,
            Err(e) => {
                tracing::debug!("keypad {selector} not found: {e}");
                return None;
            }
        };
        // No box model means the element is not rendered
        container.bounding_box().await.ok().map(to_bounding_box)
    }
}

const LOAD_STATE_JS: &str =
    "[document.readyState, performance.getEntriesByType('resource').length]";

/// How long the resource count must stay put before the page counts as idle.
const QUIET_WINDOW: Duration = Duration::from_millis(500);

/// Index of the first laid-out, non-empty box.
fn first_visible(boxes: &[Option<BoundingBox>]) -> Option<usize> {
    boxes
        .iter()
        .position(|b| b.is_some_and(|b| !b.is_degenerate()))
}

/// Tracks load progress samples until nothing new has loaded for `window`.
struct QuietWindow {
    window: Duration,
    last_count: Option<usize>,
    since: Option<Instant>,
}

impl QuietWindow {
    fn new(window: Duration) -> Self {
        Self {
            window,
            last_count: None,
            since: None,
        }
    }

    fn observe(&mut self, complete: bool, resources: usize, now: Instant) -> bool {
        if !complete {
            self.last_count = None;
            self.since = None;
            return false;
        }
        if self.last_count != Some(resources) {
            self.last_count = Some(resources);
            self.since = Some(now);
            return false;
        }
        self.since
            .is_some_and(|since| now.duration_since(since) >= self.window)
    }
}

fn to_bounding_box(b: chromiumoxide::layout::BoundingBox) -> BoundingBox {
    BoundingBox::new(b.x, b.y, b.width, b.height)
}

impl KeypadSurface for KeypadBrowser {
    type Element = Element;

    async fn keypad_box(&self) -> Result<Option<BoundingBox>> {
        let idx = self.active_keypad.load(Ordering::SeqCst);
        match self.keypad_selectors.get(idx) {
            Some(selector) => Ok(self.box_of(selector).await),
            None => Ok(None),
        }
    }

    async fn buttons(&self) -> Result<Vec<(Element, Option<BoundingBox>)>> {
        let elements = self
            .page
            .find_elements(self.button_selector.as_str())
            .await
            .with_context(|| format!("failed to query {}", self.button_selector))?;

        let mut buttons = Vec::with_capacity(elements.len());
        for el in elements {
            let bbox = el.bounding_box().await.ok().map(to_bounding_box);
            buttons.push((el, bbox));
        }
        tracing::debug!("found {} {} elements", buttons.len(), self.button_selector);
        Ok(buttons)
    }

    async fn screenshot(&self, region: BoundingBox) -> Result<Vec<u8>> {
        let screenshot = self
            .page
            .screenshot(
                ScreenshotParams::builder()
                    .format(CaptureScreenshotFormat::Png)
                    .clip(Viewport {
                        x: region.x,
                        y: region.y,
                        width: region.width,
                        height: region.height,
                        scale: 1.0,
                    })
                    .build(),
            )
            .await
            .map_err(|e| BrowserError::ScreenshotFailed(e.to_string()))?;

        Ok(screenshot)
    }

    async fn click(&self, element: &Element) -> Result<()> {
        element.click().await.context("keypad button click failed")?;
        Ok(())
    }
}
