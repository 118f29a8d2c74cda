use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

/// Live browser page the assistant drives.
///
/// Selectors use the dialect described in [`crate::selectors::SelectorQuery`].
/// Element methods address the `index`-th match of a selector. Failures are
/// `anyhow::Error`s, with [`crate::errors::PageError`] inside for the faults
/// callers branch on (timeouts, lost sessions, missing elements).
#[async_trait]
pub trait Page: Send + Sync {
    /// Number of elements the selector currently matches
    async fn count(&self, selector: &str) -> Result<usize>;

    async fn click(&self, selector: &str, index: usize) -> Result<()>;

    /// Clear the control and type `text` into it
    async fn fill(&self, selector: &str, index: usize, text: &str) -> Result<()>;

    async fn hover(&self, selector: &str, index: usize) -> Result<()>;

    /// Checked state of a native or widget checkbox
    async fn is_checked(&self, selector: &str, index: usize) -> Result<bool>;

    /// Current value of a form control
    async fn input_value(&self, selector: &str, index: usize) -> Result<String>;

    async fn inner_text(&self, selector: &str, index: usize) -> Result<String>;

    async fn describe(&self, selector: &str, index: usize) -> Result<ElementDescription>;

    /// Option labels of a native `<select>`
    async fn native_options(&self, selector: &str, index: usize) -> Result<Vec<String>>;

    async fn select_native_option(
        &self,
        selector: &str,
        index: usize,
        option_index: usize,
    ) -> Result<()>;

    /// Label a dropdown currently shows as its selected value
    async fn displayed_value(&self, selector: &str, index: usize) -> Result<String>;

    /// Tag the element and return a selector matching only it, so it stays
    /// addressable after its text changes
    async fn pin(&self, selector: &str, index: usize) -> Result<String>;

    /// Wait until some match of `selector` is visible.
    ///
    /// Fails with `PageError::Timeout` once `timeout` expires.
    async fn wait_for_visible(&self, selector: &str, timeout: Duration) -> Result<()>;

    /// Navigate and wait for the document to finish loading
    async fn goto(&self, url: &str) -> Result<()>;

    async fn evaluate(&self, script: &str, args: Vec<Value>) -> Result<Value>;

    async fn current_url(&self) -> Result<String>;

    async fn title(&self) -> Result<String>;

    /// End the browser session
    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// Attributes of one element, used to pick the right interaction
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ElementDescription {
    /// Lowercase tag name
    pub tag: String,
    pub visible: bool,
    pub text: String,
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub input_type: String,
    pub placeholder: String,
    pub aria_label: String,
    pub class_name: String,
    /// `aria-haspopup` is set, or the element sits inside a dropdown widget
    pub has_popup: bool,
}

impl ElementDescription {
    pub fn is_native_select(&self) -> bool {
        self.tag == "select"
    }
}
