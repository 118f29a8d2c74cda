use anyhow::{Context, Result};
use async_trait::async_trait;
use fantoccini::elements::Element;
use fantoccini::error::CmdError;
use fantoccini::{Client, ClientBuilder, Locator};
use serde_json::{Value, json};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use tempfile::TempDir;
use tracing::{debug, info};

use crate::config::BrowserSettings;
use crate::errors::PageError;
use crate::page::{ElementDescription, Page};
use crate::selectors::{QueryLocator, SelectorQuery};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Attribute used to keep an element addressable across re-renders
const PIN_ATTRIBUTE: &str = "data-webassist-pin";

const DESCRIBE_SCRIPT: &str = r#"
    const el = arguments[0];
    const style = window.getComputedStyle(el);
    const rect = el.getBoundingClientRect();
    const visible = style.display !== 'none'
        && style.visibility !== 'hidden'
        && (rect.width > 0 || rect.height > 0 || el.getClientRects().length > 0);
    const attr = (name) => el.getAttribute(name) || '';
    return {
        tag: el.tagName.toLowerCase(),
        visible: visible,
        text: (el.innerText || el.value || '').trim(),
        id: el.id || '',
        name: attr('name'),
        type: attr('type'),
        placeholder: attr('placeholder'),
        aria_label: attr('aria-label'),
        class_name: typeof el.className === 'string' ? el.className : attr('class'),
        has_popup: el.hasAttribute('aria-haspopup')
            || !!el.closest('.p-dropdown, [role="combobox"], .dropdown')
    };
"#;

const IS_CHECKED_SCRIPT: &str = r#"
    const el = arguments[0];
    if (el.type === 'checkbox' || el.type === 'radio') return el.checked;
    const aria = el.getAttribute('aria-checked');
    if (aria !== null) return aria === 'true';
    const inner = el.querySelector('input[type="checkbox"], input[type="radio"]');
    if (inner) return inner.checked;
    const box = el.matches('.p-checkbox-box') ? el : el.querySelector('.p-checkbox-box');
    if (box) return box.classList.contains('p-highlight');
    return false;
"#;

const HOVER_SCRIPT: &str = r#"
    const el = arguments[0];
    el.scrollIntoView({block: 'center'});
    for (const type of ['mouseover', 'mouseenter', 'mousemove']) {
        el.dispatchEvent(new MouseEvent(type, {bubbles: true, cancelable: true, view: window}));
    }
    return true;
"#;

const SELECT_OPTION_SCRIPT: &str = r#"
    const el = arguments[0];
    el.selectedIndex = arguments[1];
    el.dispatchEvent(new Event('input', {bubbles: true}));
    el.dispatchEvent(new Event('change', {bubbles: true}));
    return el.selectedIndex;
"#;

const DISPLAYED_VALUE_SCRIPT: &str = r#"
    const el = arguments[0];
    if (el.tagName === 'SELECT') {
        const opt = el.options[el.selectedIndex];
        return opt ? opt.text : '';
    }
    const label = el.querySelector('.p-dropdown-label, [class*="singleValue"], .selected');
    if (label && (label.innerText || '').trim()) return label.innerText;
    const input = el.querySelector('input');
    if (input && input.value) return input.value;
    return el.innerText || el.value || '';
"#;

/// Browser instance driven over WebDriver
pub struct Browser {
    client: Client,
    browser_type: BrowserType,
    pins: AtomicUsize,
    // Removed when the browser is dropped
    _profile: TempDir,
}

/// Supported browser types
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum BrowserType {
    /// Mozilla Firefox
    Firefox,
    /// Google Chrome/Chromium
    Chrome,
}

impl std::str::FromStr for BrowserType {
    type Err = anyhow::Error;

    /// Parse browser type from string (case-insensitive)
    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "firefox" => Ok(BrowserType::Firefox),
            "chrome" | "chromium" => Ok(BrowserType::Chrome),
            _ => anyhow::bail!("Unsupported browser: {}", s),
        }
    }
}

impl BrowserType {
    /// Default WebDriver URL for this browser type
    pub fn get_webdriver_url(&self) -> String {
        match self {
            BrowserType::Firefox => "http://localhost:4444".to_string(),
            BrowserType::Chrome => "http://localhost:9515".to_string(),
        }
    }

    pub fn driver_name(&self) -> &'static str {
        match self {
            BrowserType::Firefox => "geckodriver",
            BrowserType::Chrome => "chromedriver",
        }
    }
}

impl Browser {
    /// Start a browser session on an already running WebDriver
    pub async fn new(settings: &BrowserSettings) -> Result<Self> {
        let browser_type = settings.browser_type()?;
        let viewport = settings.viewport_size()?;
        let webdriver_url = settings
            .webdriver_url
            .clone()
            .unwrap_or_else(|| browser_type.get_webdriver_url());

        info!("Connecting to {:?} WebDriver at {}", browser_type, webdriver_url);

        if !Self::is_webdriver_running(&webdriver_url).await {
            let driver = browser_type.driver_name();
            anyhow::bail!(
                "Cannot connect to {} WebDriver at {}.\n\
                Please ensure {} is running:\n\
                  For Firefox: geckodriver --port 4444\n\
                  For Chrome: chromedriver --port 9515",
                driver,
                webdriver_url,
                driver
            );
        }

        // A fresh profile per session keeps cookies from leaking between runs
        let profile = tempfile::Builder::new()
            .prefix(&format!("webassist-{}-", format!("{browser_type:?}").to_lowercase()))
            .tempdir()
            .context("Failed to create browser profile directory")?;

        let mut caps = serde_json::Map::new();
        match browser_type {
            BrowserType::Firefox => {
                let mut args = vec!["-profile".to_string(), profile.path().display().to_string()];
                if settings.headless {
                    args.push("--headless".to_string());
                }
                args.push(format!("--width={}", viewport.width));
                args.push(format!("--height={}", viewport.height));
                caps.insert("moz:firefoxOptions".to_string(), json!({ "args": args }));
            }
            BrowserType::Chrome => {
                let mut args = vec!["--no-sandbox".to_string()];
                if settings.headless {
                    args.push("--headless=new".to_string());
                    args.push("--disable-gpu".to_string());
                    args.push("--disable-dev-shm-usage".to_string());
                }
                args.push(format!("--window-size={},{}", viewport.width, viewport.height));
                args.push(format!("--user-data-dir={}", profile.path().display()));
                caps.insert("goog:chromeOptions".to_string(), json!({ "args": args }));
            }
        }

        let client = ClientBuilder::rustls()
            .capabilities(caps)
            .connect(&webdriver_url)
            .await
            .context("Failed to connect to WebDriver")?;

        if let Err(e) = client.set_window_size(viewport.width, viewport.height).await {
            // Window managers may refuse; the launch args already size it
            debug!("Could not set window size: {}", e);
        }

        Ok(Browser {
            client,
            browser_type,
            pins: AtomicUsize::new(0),
            _profile: profile,
        })
    }

    pub fn browser_type(&self) -> BrowserType {
        self.browser_type
    }

    async fn is_webdriver_running(url: &str) -> bool {
        let status_url = format!("{}/status", url.trim_end_matches('/'));

        match reqwest::get(&status_url).await {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }

    /// All elements matching a selector in the page's dialect
    async fn resolve(&self, selector: &str) -> Result<Vec<Element>> {
        let query = SelectorQuery::parse(selector);
        let found = match &query.locator {
            QueryLocator::Css(css) => self.client.find_all(Locator::Css(css)).await,
            QueryLocator::XPath(xpath) => self.client.find_all(Locator::XPath(xpath)).await,
        }
        .map_err(lift)?;

        let Some(filter) = query.text else {
            return Ok(found);
        };

        let mut kept = Vec::new();
        for element in found {
            let text = element.text().await.map_err(lift)?;
            if filter.matches(&text) {
                kept.push(element);
            }
        }
        Ok(kept)
    }

    async fn element_at(&self, selector: &str, index: usize) -> Result<Element> {
        let mut found = self.resolve(selector).await?;
        if index >= found.len() {
            return Err(PageError::NoSuchElement {
                selector: selector.to_string(),
                index,
            }
            .into());
        }
        Ok(found.swap_remove(index))
    }

    /// Run a script with the element as `arguments[0]`, followed by `extra`
    async fn run_on(
        &self,
        selector: &str,
        index: usize,
        script: &str,
        extra: Vec<Value>,
    ) -> Result<Value> {
        let element = self.element_at(selector, index).await?;
        let mut args = vec![serde_json::to_value(&element)?];
        args.extend(extra);
        self.client.execute(script, args).await.map_err(lift)
    }
}

#[async_trait]
impl Page for Browser {
    async fn count(&self, selector: &str) -> Result<usize> {
        Ok(self.resolve(selector).await?.len())
    }

    async fn click(&self, selector: &str, index: usize) -> Result<()> {
        let element = self.element_at(selector, index).await?;
        let arg = serde_json::to_value(&element)?;

        match element.click().await {
            Ok(_) => Ok(()),
            Err(CmdError::Lost(e)) => Err(PageError::SessionLost(e.to_string()).into()),
            Err(e) => {
                // Overlays and off-screen widgets reject native clicks
                debug!("Native click on '{}' failed, using script click: {}", selector, e);
                self.client
                    .execute(
                        "arguments[0].scrollIntoView({block: 'center'}); arguments[0].click(); return true;",
                        vec![arg],
                    )
                    .await
                    .map_err(lift)?;
                Ok(())
            }
        }
    }

    async fn fill(&self, selector: &str, index: usize, text: &str) -> Result<()> {
        let element = self.element_at(selector, index).await?;
        element.clear().await.map_err(lift)?;
        element.send_keys(text).await.map_err(lift)?;
        Ok(())
    }

    async fn hover(&self, selector: &str, index: usize) -> Result<()> {
        self.run_on(selector, index, HOVER_SCRIPT, vec![]).await?;
        Ok(())
    }

    async fn is_checked(&self, selector: &str, index: usize) -> Result<bool> {
        let value = self.run_on(selector, index, IS_CHECKED_SCRIPT, vec![]).await?;
        Ok(value.as_bool().unwrap_or(false))
    }

    async fn input_value(&self, selector: &str, index: usize) -> Result<String> {
        let element = self.element_at(selector, index).await?;
        Ok(element.prop("value").await.map_err(lift)?.unwrap_or_default())
    }

    async fn inner_text(&self, selector: &str, index: usize) -> Result<String> {
        let element = self.element_at(selector, index).await?;
        element.text().await.map_err(lift)
    }

    async fn describe(&self, selector: &str, index: usize) -> Result<ElementDescription> {
        let value = self.run_on(selector, index, DESCRIBE_SCRIPT, vec![]).await?;
        serde_json::from_value(value)
            .map_err(|e| PageError::Script(format!("unexpected element description: {e}")).into())
    }

    async fn native_options(&self, selector: &str, index: usize) -> Result<Vec<String>> {
        let value = self
            .run_on(
                selector,
                index,
                "return Array.from(arguments[0].options || []).map(o => o.text);",
                vec![],
            )
            .await?;
        serde_json::from_value(value)
            .map_err(|e| PageError::Script(format!("unexpected option list: {e}")).into())
    }

    async fn select_native_option(
        &self,
        selector: &str,
        index: usize,
        option_index: usize,
    ) -> Result<()> {
        self.run_on(selector, index, SELECT_OPTION_SCRIPT, vec![json!(option_index)])
            .await?;
        Ok(())
    }

    async fn displayed_value(&self, selector: &str, index: usize) -> Result<String> {
        let value = self
            .run_on(selector, index, DISPLAYED_VALUE_SCRIPT, vec![])
            .await?;
        Ok(value.as_str().unwrap_or_default().trim().to_string())
    }

    async fn pin(&self, selector: &str, index: usize) -> Result<String> {
        let id = self.pins.fetch_add(1, Ordering::Relaxed).to_string();
        self.run_on(
            selector,
            index,
            "arguments[0].setAttribute(arguments[1], arguments[2]); return true;",
            vec![json!(PIN_ATTRIBUTE), json!(id)],
        )
        .await?;
        Ok(format!("[{PIN_ATTRIBUTE}=\"{id}\"]"))
    }

    async fn wait_for_visible(&self, selector: &str, timeout: Duration) -> Result<()> {
        let started = Instant::now();
        loop {
            for element in self.resolve(selector).await? {
                if element.is_displayed().await.map_err(lift)? {
                    return Ok(());
                }
            }
            if started.elapsed() >= timeout {
                return Err(PageError::Timeout {
                    what: selector.to_string(),
                    after: timeout,
                }
                .into());
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    async fn goto(&self, url: &str) -> Result<()> {
        debug!("Loading {}", url);
        self.client.goto(url).await.map_err(lift)?;

        // Max 2 seconds for late scripts after the load event
        for _ in 0..20 {
            match self
                .client
                .execute("return document.readyState === 'complete';", vec![])
                .await
            {
                Ok(val) if val.as_bool().unwrap_or(false) => break,
                Err(CmdError::Lost(e)) => return Err(PageError::SessionLost(e.to_string()).into()),
                _ => tokio::time::sleep(POLL_INTERVAL).await,
            }
        }
        Ok(())
    }

    async fn evaluate(&self, script: &str, args: Vec<Value>) -> Result<Value> {
        self.client.execute(script, args).await.map_err(lift)
    }

    async fn current_url(&self) -> Result<String> {
        Ok(self.client.current_url().await.map_err(lift)?.to_string())
    }

    async fn title(&self) -> Result<String> {
        let value = self
            .client
            .execute("return document.title;", vec![])
            .await
            .map_err(lift)?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    async fn close(&self) -> Result<()> {
        self.client.clone().close().await.map_err(lift)
    }
}

/// Turn driver faults that end the session into `PageError::SessionLost`
fn lift(err: CmdError) -> anyhow::Error {
    let message = err.to_string();
    let lowered = message.to_lowercase();
    let lost = matches!(err, CmdError::Lost(_))
        || lowered.contains("invalid session id")
        || lowered.contains("no such window")
        || lowered.contains("chrome not reachable");

    if lost {
        PageError::SessionLost(message).into()
    } else {
        anyhow::Error::new(err)
    }
}
