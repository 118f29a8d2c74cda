use anyhow::{Context, Result};
use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use serde::Deserialize;
use serde_json::{Value, json};
use std::fmt::Write as _;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::LlmSettings;
use crate::errors::{ErrorKind, StepError};
use crate::selectors::sanitize;
use crate::types::{Action, ActionKind, PageContext};

/// Default Gemini REST endpoint
pub const DEFAULT_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta";

/// HTML passed to prompts is cut to this many characters
const PROMPT_HTML_CHARS: usize = 1000;

lazy_static! {
    static ref LIST_MARKER: Regex = Regex::new(r"^\s*(?:[-*•]|\d+[.)])\s*").unwrap();
}

/// Language model used for selector suggestions and free-form commands
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Ordered selector suggestions for `task` on the described page
    async fn get_selectors(&self, task: &str, context: &PageContext) -> Result<Vec<String>>;

    /// Validated action plan for a command no pattern understood
    async fn get_actions(&self, command: &str, context: &PageContext) -> Result<Vec<Action>>;

    /// Disabled clients are skipped instead of called
    fn is_available(&self) -> bool {
        true
    }
}

/// Build the configured client, falling back to [`DisabledLlm`] without a key
pub fn client_from_settings(settings: &LlmSettings) -> Box<dyn LlmClient> {
    match GeminiClient::new(settings.clone()) {
        Ok(client) => {
            info!("Using Gemini model {}", settings.model);
            Box::new(client)
        }
        Err(e) => {
            warn!("LLM disabled: {:#}", e);
            Box::new(DisabledLlm)
        }
    }
}

/// Client for the Gemini `generateContent` API
pub struct GeminiClient {
    http: reqwest::Client,
    api_key: String,
    settings: LlmSettings,
}

impl GeminiClient {
    pub fn new(settings: LlmSettings) -> Result<Self> {
        let api_key = settings
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .context("No Gemini API key configured (set GEMINI_API_KEY)")?;

        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(settings.timeout_ms))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            http,
            api_key,
            settings,
        })
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        let endpoint = self
            .settings
            .endpoint
            .as_deref()
            .unwrap_or(DEFAULT_ENDPOINT)
            .trim_end_matches('/');
        let url = format!(
            "{}/models/{}:generateContent",
            endpoint, self.settings.model
        );

        let body = json!({
            "contents": [{ "parts": [{ "text": prompt }] }],
            "generationConfig": { "temperature": 0.2 },
        });

        debug!("Sending {} char prompt to {}", prompt.len(), self.settings.model);
        let response = self
            .http
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .send()
            .await
            .map_err(|e| unavailable(format!("request failed: {}", e.without_url())))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(unavailable(format!("HTTP {status}: {text}")));
        }

        let json: Value = response
            .json()
            .await
            .map_err(|e| unavailable(format!("invalid response body: {}", e.without_url())))?;

        json.pointer("/candidates/0/content/parts/0/text")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| unavailable("response has no candidate text"))
    }
}

#[async_trait]
impl LlmClient for GeminiClient {
    async fn get_selectors(&self, task: &str, context: &PageContext) -> Result<Vec<String>> {
        let prompt = selector_prompt(task, context, self.settings.max_selectors);
        let text = self.generate(&prompt).await?;
        debug!("Selector response: {}", text);
        Ok(parse_selector_response(&text, self.settings.max_selectors))
    }

    async fn get_actions(&self, command: &str, context: &PageContext) -> Result<Vec<Action>> {
        let prompt = action_prompt(command, context);
        let text = self.generate(&prompt).await?;
        debug!("Action response: {}", text);
        parse_action_plan(&text)
    }
}

/// Stand-in used when no API key is configured
pub struct DisabledLlm;

#[async_trait]
impl LlmClient for DisabledLlm {
    async fn get_selectors(&self, _task: &str, _context: &PageContext) -> Result<Vec<String>> {
        Err(unavailable("LLM is not configured"))
    }

    async fn get_actions(&self, _command: &str, _context: &PageContext) -> Result<Vec<Action>> {
        Err(unavailable("LLM is not configured"))
    }

    fn is_available(&self) -> bool {
        false
    }
}

fn unavailable(message: impl Into<String>) -> anyhow::Error {
    StepError::new(ErrorKind::LlmUnavailable, message).into()
}

fn format_page(context: &PageContext) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Title: {}", context.title);
    let _ = writeln!(out, "URL: {}", context.url);

    out.push_str("\nInput Fields Found:\n");
    for (i, f) in context.input_fields.iter().enumerate() {
        let _ = writeln!(
            out,
            "{}. {} - type: {}, id: {}, name: {}, placeholder: {}, aria-label: {}",
            i + 1,
            f.tag,
            f.input_type,
            f.id,
            f.name,
            f.placeholder,
            f.aria_label
        );
    }

    out.push_str("\nButtons Found:\n");
    for (i, b) in context.buttons.iter().enumerate() {
        let _ = writeln!(
            out,
            "{}. {} - id: {}, class: {}, type: {}",
            i + 1,
            b.text,
            b.id,
            b.class_name,
            b.button_type
        );
    }

    out.push_str("\nMenu Items Found:\n");
    for (i, m) in context.menu_items.iter().enumerate() {
        let submenu = if m.has_submenu { " (has submenu)" } else { "" };
        let _ = writeln!(out, "{}. {}{}", i + 1, m.text, submenu);
    }

    let html: String = context.filtered_html.chars().take(PROMPT_HTML_CHARS).collect();
    let _ = write!(out, "\nRelevant HTML:\n{}\n", html);
    out
}

/// Prompt asking for a JSON array of selectors
pub fn selector_prompt(task: &str, context: &PageContext, max: usize) -> String {
    format!(
        "Based on the current web page context, generate the {max} most likely CSS selectors to {task}.\n\
         Focus on precise selectors that would uniquely identify the element.\n\n\
         Current Page:\n{page}\n\
         If this appears to be a PrimeNG page (classes like p-dropdown, p-component), prefer\n\
         .p-dropdown, .p-dropdown-panel, .p-dropdown-item and .p-dropdown-filter.\n\
         Use :has-text(\"...\") for text matching, never :contains.\n\n\
         Respond ONLY with a JSON array of selector strings, for example:\n\
         [\"selector1\", \"selector2\", \"selector3\"]\n",
        page = format_page(context)
    )
}

/// Prompt asking for a JSON action plan
pub fn action_prompt(command: &str, context: &PageContext) -> String {
    format!(
        "You control a web browser. Translate the user's command into browser actions.\n\n\
         Command: \"{command}\"\n\n\
         Current Page:\n{page}\n\
         Respond ONLY with JSON of this shape:\n\
         {{\"actions\": [{{\"action\": \"click|type|hover|select|check|uncheck|toggle|navigate|wait\",\n\
         \"selector\": \"primary CSS selector\", \"fallback_selectors\": [\"...\"],\n\
         \"text\": \"text to type\", \"value\": \"option to select or milliseconds to wait\",\n\
         \"url\": \"navigation target\", \"purpose\": \"short description\"}}]}}\n\
         Use :has-text(\"...\") for text matching, never :contains.\n",
        page = format_page(context)
    )
}

/// Selectors from a model reply.
///
/// Takes the last balanced JSON array of strings; failing that, one
/// selector per line with list markers and quotes removed.
pub fn parse_selector_response(text: &str, max: usize) -> Vec<String> {
    if let Some(list) = json_spans(text, b'[', b']')
        .find_map(|span| serde_json::from_str::<Vec<String>>(span).ok())
    {
        return list
            .into_iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .take(max)
            .collect();
    }

    debug!("Selector reply is not a JSON array, splitting lines");
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with("```") && *l != "[" && *l != "]")
        .map(|l| LIST_MARKER.replace(l, "").to_string())
        .map(|l| {
            l.trim()
                .trim_end_matches(',')
                .trim_matches(|c| c == '"' || c == '\'' || c == '`')
                .trim()
                .to_string()
        })
        .filter(|l| !l.is_empty())
        .take(max)
        .collect()
}

/// Balanced `open`/`close` spans of `text`, last first. Brackets inside
/// string literals do not count.
fn json_spans(text: &str, open: u8, close: u8) -> impl Iterator<Item = &str> {
    let bytes = text.as_bytes();
    let mut limit = bytes.len();
    std::iter::from_fn(move || {
        while let Some(end) = bytes[..limit].iter().rposition(|&b| b == close) {
            limit = end;
            if let Some(start) = matching_open(bytes, end, open, close) {
                limit = start;
                return Some(&text[start..=end]);
            }
        }
        None
    })
}

fn matching_open(bytes: &[u8], end: usize, open: u8, close: u8) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    for pos in (0..=end).rev() {
        let b = bytes[pos];
        if b == b'"' && !is_escaped(bytes, pos) {
            in_string = !in_string;
        } else if in_string {
            continue;
        } else if b == close {
            depth += 1;
        } else if b == open {
            depth -= 1;
            if depth == 0 {
                return Some(pos);
            }
        }
    }
    None
}

/// Odd run of backslashes before `pos`
fn is_escaped(bytes: &[u8], pos: usize) -> bool {
    bytes[..pos].iter().rev().take_while(|&&b| b == b'\\').count() % 2 == 1
}

#[derive(Debug, Deserialize)]
struct ActionPlan {
    actions: Vec<ActionDescriptor>,
}

/// One action as the model writes it; unknown fields are ignored
#[derive(Debug, Deserialize)]
struct ActionDescriptor {
    #[serde(alias = "type")]
    action: String,
    #[serde(default)]
    selector: Option<String>,
    #[serde(default)]
    fallback_selectors: Vec<String>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    value: Option<Value>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    purpose: Option<String>,
}

impl ActionDescriptor {
    fn into_action(self, position: usize) -> Result<Action> {
        let kind: ActionKind = self.action.parse()?;
        let value = match self.value {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => Some(s),
            Some(Value::Number(n)) => Some(n.to_string()),
            Some(other) => anyhow::bail!("action {}: unsupported value {}", position, other),
        };

        let value = match kind {
            ActionKind::Navigate => self.url.or(value),
            ActionKind::Type => self.text.or(value),
            _ => value,
        };

        let purpose = self
            .purpose
            .filter(|p| !p.trim().is_empty())
            .unwrap_or_else(|| format!("{} step {}", self.action.to_lowercase(), position + 1));

        let mut action = Action::new(kind, purpose)
            .with_selector(sanitize(&self.selector.unwrap_or_default()))
            .with_fallbacks(self.fallback_selectors.iter().map(|s| sanitize(s)));
        action.value = value;

        match kind {
            ActionKind::Navigate if action.value.is_none() => {
                anyhow::bail!("action {}: navigate without url", position)
            }
            ActionKind::Type if action.value.is_none() => {
                anyhow::bail!("action {}: type without text", position)
            }
            ActionKind::Select if action.value.is_none() => {
                anyhow::bail!("action {}: select without value", position)
            }
            ActionKind::Wait => {
                let ms = action.value.as_deref().unwrap_or("1000");
                ms.trim()
                    .parse::<u64>()
                    .with_context(|| format!("action {}: invalid wait '{}'", position, ms))?;
            }
            k if k.needs_selector() && !action.has_selectors() => {
                anyhow::bail!("action {}: {:?} without selector", position, k)
            }
            _ => {}
        }
        Ok(action)
    }
}

/// Strictly validate a model reply into actions.
///
/// Any malformed or incomplete descriptor rejects the whole plan.
pub fn parse_action_plan(text: &str) -> Result<Vec<Action>> {
    let mut plan = None;
    let mut parse_error = None;
    for span in json_spans(text, b'{', b'}') {
        match serde_json::from_str::<ActionPlan>(span) {
            Ok(parsed) => {
                plan = Some(parsed);
                break;
            }
            Err(e) => {
                parse_error.get_or_insert(e);
            }
        }
    }
    let plan = match (plan, parse_error) {
        (Some(plan), _) => plan,
        (None, Some(e)) => return Err(unavailable(format!("malformed action plan: {e}"))),
        (None, None) => return Err(unavailable("reply contains no JSON object")),
    };

    if plan.actions.is_empty() {
        return Err(unavailable("action plan is empty"));
    }

    plan.actions
        .into_iter()
        .enumerate()
        .map(|(i, d)| {
            d.into_action(i)
                .map_err(|e| unavailable(format!("invalid action plan: {e:#}")))
        })
        .collect()
}

#[cfg(test)]
#[path = "llm_test.rs"]
mod llm_test;
