use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::errors::ErrorKind;
use crate::selectors::FieldType;

/// Output format for CLI results
#[derive(Clone, Copy, Debug, Deserialize, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// JSON format for programmatic consumption
    Json,
    /// Human-readable simple format
    Simple,
}

/// Kind of browser operation an [`Action`] performs
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    Click,
    Type,
    Hover,
    Select,
    Check,
    Uncheck,
    Toggle,
    Navigate,
    /// Pause for `value` milliseconds
    Wait,
}

impl ActionKind {
    /// Whether the action needs a target element
    pub fn needs_selector(&self) -> bool {
        !matches!(self, ActionKind::Navigate | ActionKind::Wait)
    }
}

impl std::str::FromStr for ActionKind {
    type Err = anyhow::Error;

    /// Parse an action kind, accepting the synonyms LLMs tend to produce
    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "click" | "press" | "tap" => Ok(ActionKind::Click),
            "type" | "fill" | "input" | "enter" => Ok(ActionKind::Type),
            "hover" => Ok(ActionKind::Hover),
            "select" | "select_option" | "choose" => Ok(ActionKind::Select),
            "check" => Ok(ActionKind::Check),
            "uncheck" => Ok(ActionKind::Uncheck),
            "toggle" => Ok(ActionKind::Toggle),
            "navigate" | "goto" | "open" => Ok(ActionKind::Navigate),
            "wait" | "sleep" => Ok(ActionKind::Wait),
            other => anyhow::bail!("Unsupported action kind: {}", other),
        }
    }
}

/// One unit of browser work
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Action {
    pub kind: ActionKind,
    /// May be empty when the selectors come from resolution
    #[serde(default)]
    pub primary_selector: String,
    /// Tried in order after `primary_selector`
    #[serde(default)]
    pub fallback_selectors: Vec<String>,
    /// Text to type, option to select, URL to visit or milliseconds to wait
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    /// Human-readable description used in feedback, never for matching
    pub purpose: String,
    /// Field category used to fill in selectors before execution
    #[serde(skip)]
    pub field: Option<FieldType>,
    /// Element name substituted into templated selectors
    #[serde(skip)]
    pub target: Option<String>,
}

impl Action {
    pub fn new(kind: ActionKind, purpose: impl Into<String>) -> Self {
        Self {
            kind,
            primary_selector: String::new(),
            fallback_selectors: Vec::new(),
            value: None,
            purpose: purpose.into(),
            field: None,
            target: None,
        }
    }

    pub fn with_selector(mut self, selector: impl Into<String>) -> Self {
        self.primary_selector = selector.into();
        self
    }

    pub fn with_fallbacks<I, S>(mut self, selectors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fallback_selectors = selectors.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }

    /// Resolve selectors for this field category before execution
    pub fn for_field(mut self, field: FieldType) -> Self {
        self.field = Some(field);
        self
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    /// Non-empty, trimmed, de-duplicated selectors in trial order
    pub fn candidates(&self) -> Vec<String> {
        let all = std::iter::once(self.primary_selector.as_str())
            .chain(self.fallback_selectors.iter().map(String::as_str))
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);
        crate::selectors::dedup_preserving_order(all)
    }

    pub fn has_selectors(&self) -> bool {
        !self.candidates().is_empty()
    }
}

/// A visible form control
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct InputField {
    pub tag: String,
    #[serde(rename = "type")]
    pub input_type: String,
    pub id: String,
    pub name: String,
    pub placeholder: String,
    pub aria_label: String,
}

/// A visible button-like element
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ButtonInfo {
    pub text: String,
    pub id: String,
    pub class_name: String,
    #[serde(rename = "type")]
    pub button_type: String,
}

/// A visible navigation entry
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MenuItem {
    pub text: String,
    pub has_submenu: bool,
}

/// Point-in-time snapshot of the current page.
///
/// Every field is best effort. Empty collections are valid.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PageContext {
    pub url: String,
    pub title: String,
    /// Body text, truncated
    pub visible_text: String,
    pub input_fields: Vec<InputField>,
    pub buttons: Vec<ButtonInfo>,
    pub menu_items: Vec<MenuItem>,
    /// Body HTML without scripts, styles, hidden or empty elements, truncated
    pub filtered_html: String,
}

/// Record of one candidate selector tried by the executor
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SelectorAttempt {
    pub selector: String,
    /// Number of elements the selector matched
    pub matched: usize,
    /// Operation attempts spent on this selector
    pub attempts: u32,
    pub succeeded: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Diagnostic detail attached to an [`InteractionResult`]
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultDetails {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorKind>,
    /// Raw text of the last underlying fault
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cause: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attempts: Vec<SelectorAttempt>,
}

/// Outcome of one execution attempt
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InteractionResult {
    pub success: bool,
    /// User-facing text, names the purpose rather than selectors
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<ResultDetails>,
}

impl InteractionResult {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            details: None,
        }
    }

    pub fn failure(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            details: Some(ResultDetails {
                error: Some(kind),
                ..Default::default()
            }),
        }
    }

    pub fn with_cause(mut self, cause: impl Into<String>) -> Self {
        self.details.get_or_insert_with(Default::default).cause = Some(cause.into());
        self
    }

    pub fn with_attempts(mut self, attempts: Vec<SelectorAttempt>) -> Self {
        if !attempts.is_empty() {
            self.details.get_or_insert_with(Default::default).attempts = attempts;
        }
        self
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.details.as_ref().and_then(|d| d.error)
    }

    pub fn attempts(&self) -> &[SelectorAttempt] {
        self.details
            .as_ref()
            .map(|d| d.attempts.as_slice())
            .unwrap_or(&[])
    }
}

/// Browser viewport dimensions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewportSize {
    /// Viewport width in pixels
    pub width: u32,
    /// Viewport height in pixels
    pub height: u32,
}

impl Default for ViewportSize {
    fn default() -> Self {
        ViewportSize {
            width: 1280,
            height: 800,
        }
    }
}

impl ViewportSize {
    /// Parse viewport size from "WIDTHxHEIGHT" format (e.g., "1280x800")
    pub fn parse(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.split('x').collect();
        if parts.len() != 2 {
            anyhow::bail!("Invalid viewport format. Use WIDTHxHEIGHT (e.g., 1280x800)");
        }

        let width = parts[0]
            .parse::<u32>()
            .map_err(|_| anyhow::anyhow!("Invalid width in viewport size"))?;
        let height = parts[1]
            .parse::<u32>()
            .map_err(|_| anyhow::anyhow!("Invalid height in viewport size"))?;

        Ok(ViewportSize { width, height })
    }
}

#[cfg(test)]
#[path = "types_test.rs"]
mod types_test;
