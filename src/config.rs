//! Assistant configuration: built-in defaults, an optional JSON file, then
//! environment overrides.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

use crate::selectors::{FieldType, SelectorTables};
use crate::types::ViewportSize;
use crate::webdriver::BrowserType;

/// Complete assistant configuration
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssistantConfig {
    pub browser: BrowserSettings,
    pub execution: ExecutionSettings,
    pub context: ContextSettings,
    pub llm: LlmSettings,
    /// Fallback destinations for navigations that fail
    pub recovery_targets: Vec<RecoveryTarget>,
    /// Per-category replacements for the built-in selector tables
    pub selectors: BTreeMap<FieldType, Vec<String>>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserSettings {
    /// firefox or chrome
    pub browser: String,
    /// Overrides the default driver port for the browser
    pub webdriver_url: Option<String>,
    pub headless: bool,
    /// WIDTHxHEIGHT
    pub viewport: String,
    pub start_url: String,
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            browser: "chrome".to_string(),
            webdriver_url: None,
            headless: false,
            viewport: "1280x800".to_string(),
            start_url: "https://www.google.com".to_string(),
        }
    }
}

impl BrowserSettings {
    pub fn browser_type(&self) -> Result<BrowserType> {
        self.browser.parse()
    }

    pub fn viewport_size(&self) -> Result<ViewportSize> {
        ViewportSize::parse(&self.viewport)
    }
}

/// Retry and wait tuning for the executor
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionSettings {
    /// Attempts per matched selector
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    pub navigation_timeout_ms: u64,
    /// Bound for the single recovery navigation
    pub recovery_timeout_ms: u64,
    /// Wait for a dropdown's option panel
    pub dropdown_timeout_ms: u64,
    /// Pause between the actions of one command
    pub action_delay_ms: u64,
    pub verify_typed_values: bool,
}

impl Default for ExecutionSettings {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay_ms: 1000,
            navigation_timeout_ms: 20_000,
            recovery_timeout_ms: 30_000,
            dropdown_timeout_ms: 3000,
            action_delay_ms: 1000,
            verify_typed_values: true,
        }
    }
}

impl ExecutionSettings {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_millis(self.navigation_timeout_ms)
    }

    pub fn recovery_timeout(&self) -> Duration {
        Duration::from_millis(self.recovery_timeout_ms)
    }

    pub fn dropdown_timeout(&self) -> Duration {
        Duration::from_millis(self.dropdown_timeout_ms)
    }

    pub fn action_delay(&self) -> Duration {
        Duration::from_millis(self.action_delay_ms)
    }
}

/// Bounds on the page snapshot handed to the LLM
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextSettings {
    /// Pause before extraction so dynamic content can settle
    pub settle_delay_ms: u64,
    pub max_inputs: usize,
    pub max_buttons: usize,
    pub max_menu_items: usize,
    pub max_text_chars: usize,
    pub max_html_chars: usize,
    /// Elements probed per category before giving up on finding visible ones
    pub scan_limit: usize,
}

impl Default for ContextSettings {
    fn default() -> Self {
        Self {
            settle_delay_ms: 1000,
            max_inputs: 10,
            max_buttons: 10,
            max_menu_items: 20,
            max_text_chars: 1000,
            max_html_chars: 3000,
            scan_limit: 200,
        }
    }
}

impl ContextSettings {
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmSettings {
    pub api_key: Option<String>,
    pub model: String,
    /// Base URL of the Gemini REST API
    pub endpoint: Option<String>,
    pub max_selectors: usize,
    pub timeout_ms: u64,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            api_key: None,
            model: "gemini-1.5-flash".to_string(),
            endpoint: None,
            max_selectors: 5,
            timeout_ms: 30_000,
        }
    }
}

/// Navigation fallback: a failed target containing `pattern` is retried at `url`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RecoveryTarget {
    pub pattern: String,
    pub url: String,
}

impl RecoveryTarget {
    pub fn matches(&self, target: &str) -> bool {
        !self.pattern.is_empty() && target.to_lowercase().contains(&self.pattern.to_lowercase())
    }
}

pub fn default_recovery_targets() -> Vec<RecoveryTarget> {
    vec![RecoveryTarget {
        pattern: "signin".to_string(),
        url: "https://www.redberyltest.in/#/signin".to_string(),
    }]
}

impl AssistantConfig {
    /// Defaults plus the standard recovery targets
    pub fn new() -> Self {
        Self {
            recovery_targets: default_recovery_targets(),
            ..Default::default()
        }
    }

    /// `~/.webassist/config.json`
    pub fn default_path() -> Option<PathBuf> {
        dirs::home_dir().map(|h| h.join(".webassist").join("config.json"))
    }

    /// Load from `path`, or from the default path when it exists, then apply
    /// the process environment. Not validated, so later overrides can still
    /// fix a bad value; call [`AssistantConfig::validate`] after them.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None => match Self::default_path().filter(|p| p.exists()) {
                Some(p) => Self::from_file(&p)?,
                None => {
                    debug!("No config file, using defaults");
                    Self::new()
                }
            },
        };

        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let mut value: serde_json::Value = serde_json::from_str(&raw)
            .with_context(|| format!("Invalid JSON in config file {}", path.display()))?;

        // An absent table keeps the built-in recovery targets
        if let Some(obj) = value.as_object_mut()
            && !obj.contains_key("recovery_targets")
        {
            obj.insert(
                "recovery_targets".to_string(),
                serde_json::to_value(default_recovery_targets())?,
            );
        }

        let config: Self = serde_json::from_value(value)
            .with_context(|| format!("Invalid config file {}", path.display()))?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Apply environment overrides through `lookup`
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(key) = lookup("GEMINI_API_KEY").filter(|k| !k.is_empty()) {
            self.llm.api_key = Some(key);
        }
        if let Some(model) = lookup("LLM_MODEL").filter(|m| !m.is_empty()) {
            self.llm.model = model;
        }
        if let Some(headless) = lookup("BROWSER_HEADLESS") {
            self.browser.headless = matches!(
                headless.trim().to_lowercase().as_str(),
                "1" | "true" | "yes" | "on"
            );
        }

        let (mut width, mut height) = self
            .browser
            .viewport_size()
            .map(|v| (v.width, v.height))
            .unwrap_or((1280, 800));
        let mut resized = false;
        if let Some(w) = lookup("BROWSER_WIDTH").and_then(|w| w.trim().parse().ok()) {
            width = w;
            resized = true;
        }
        if let Some(h) = lookup("BROWSER_HEIGHT").and_then(|h| h.trim().parse().ok()) {
            height = h;
            resized = true;
        }
        if resized {
            self.browser.viewport = format!("{width}x{height}");
        }

        if let Some(url) = lookup("WEBASSIST_START_URL").filter(|u| !u.is_empty()) {
            self.browser.start_url = url;
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.browser.browser_type()?;
        self.browser.viewport_size()?;
        if self.execution.max_retries == 0 {
            anyhow::bail!("execution.max_retries must be at least 1");
        }
        Ok(())
    }

    /// Built-in selector tables with the configured overrides applied
    pub fn selector_tables(&self) -> SelectorTables {
        SelectorTables::default().with_overrides(&self.selectors)
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod config_test;
