// Common test doubles: an in-memory page, a scripted LLM and a recording speech channel
#![allow(dead_code)]

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use serde_json::{Value, json};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use webassist::config::{AssistantConfig, ExecutionSettings};
use webassist::errors::{ErrorKind, PageError, StepError};
use webassist::llm::parse_action_plan;
use webassist::selectors::{QueryLocator, SelectorQuery};
use webassist::{Action, ElementDescription, LlmClient, Page, PageContext, SpeechIo};

/// Something a click or hover does to another element
#[derive(Clone, Debug)]
pub enum Effect {
    Show(String),
    Hide(String),
    /// Flip visibility, like a dropdown trigger
    Toggle(String),
    SetText(String, String),
}

/// One element of the fake document
#[derive(Clone, Debug, Default)]
pub struct FakeElement {
    pub key: String,
    pub tag: String,
    /// CSS or XPath strings this element answers to, besides its tag
    pub selectors: Vec<String>,
    pub input_type: String,
    pub text: String,
    pub value: String,
    pub placeholder: String,
    pub visible: bool,
    pub checked: bool,
    pub options: Vec<String>,
    pub selected: Option<usize>,
    /// Clicks that raise before clicks start working
    pub failing_clicks: u32,
    /// Every click raises
    pub broken: bool,
    /// Clicks and selections leave state unchanged
    pub frozen: bool,
    pub has_popup: bool,
    pub on_click: Vec<Effect>,
    pub on_hover: Vec<Effect>,
}

impl FakeElement {
    pub fn new(key: &str, tag: &str) -> Self {
        Self {
            key: key.to_string(),
            tag: tag.to_string(),
            visible: true,
            ..Default::default()
        }
    }

    pub fn matching(mut self, selectors: &[&str]) -> Self {
        self.selectors.extend(selectors.iter().map(|s| s.to_string()));
        self
    }

    pub fn input(mut self, input_type: &str) -> Self {
        self.input_type = input_type.to_string();
        self
    }

    pub fn text(mut self, text: &str) -> Self {
        self.text = text.to_string();
        self
    }

    pub fn placeholder(mut self, placeholder: &str) -> Self {
        self.placeholder = placeholder.to_string();
        self
    }

    pub fn hidden(mut self) -> Self {
        self.visible = false;
        self
    }

    pub fn checked(mut self, checked: bool) -> Self {
        self.checked = checked;
        self
    }

    pub fn options(mut self, options: &[&str]) -> Self {
        self.options = options.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn failing_clicks(mut self, n: u32) -> Self {
        self.failing_clicks = n;
        self
    }

    pub fn broken(mut self) -> Self {
        self.broken = true;
        self
    }

    pub fn frozen(mut self) -> Self {
        self.frozen = true;
        self
    }

    pub fn popup(mut self) -> Self {
        self.has_popup = true;
        self
    }

    pub fn on_click(mut self, effect: Effect) -> Self {
        self.on_click.push(effect);
        self
    }

    pub fn on_hover(mut self, effect: Effect) -> Self {
        self.on_hover.push(effect);
        self
    }

    fn answers_to(&self, selector: &str) -> bool {
        let query = SelectorQuery::parse(selector);
        let located = match &query.locator {
            QueryLocator::Css(css) => css.split(',').map(str::trim).any(|part| {
                part == "*" || part == self.tag || self.selectors.iter().any(|s| s == part)
            }),
            QueryLocator::XPath(xpath) => self.selectors.iter().any(|s| s == xpath),
        };
        located && query.text.as_ref().is_none_or(|f| f.matches(&self.text))
    }

    fn is_checkbox(&self) -> bool {
        self.input_type == "checkbox" || self.selectors.iter().any(|s| s.contains("checkbox"))
    }
}

#[derive(Debug, Default)]
struct FakeDom {
    elements: Vec<FakeElement>,
    calls: Vec<String>,
    pins: usize,
    url: String,
    title: String,
    body_text: String,
    html: String,
    unreachable: HashSet<String>,
    slow: HashSet<String>,
    lost: bool,
}

/// In-memory [`Page`]; clones share one document
#[derive(Clone, Default)]
pub struct FakePage {
    dom: Arc<Mutex<FakeDom>>,
}

impl FakePage {
    pub fn new(elements: Vec<FakeElement>) -> Self {
        let page = Self::default();
        {
            let mut dom = page.dom.lock().unwrap();
            dom.elements = elements;
            dom.url = "https://example.com".to_string();
            dom.title = "Example".to_string();
        }
        page
    }

    pub fn with_body(self, text: &str, html: &str) -> Self {
        {
            let mut dom = self.dom.lock().unwrap();
            dom.body_text = text.to_string();
            dom.html = html.to_string();
        }
        self
    }

    pub fn unreachable(self, url: &str) -> Self {
        self.dom.lock().unwrap().unreachable.insert(url.to_string());
        self
    }

    pub fn slow(self, url: &str) -> Self {
        self.dom.lock().unwrap().slow.insert(url.to_string());
        self
    }

    /// Every later call fails as if the browser died
    pub fn lose_session(&self) {
        self.dom.lock().unwrap().lost = true;
    }

    pub fn calls(&self) -> Vec<String> {
        self.dom.lock().unwrap().calls.clone()
    }

    /// Number of click calls on exactly this selector
    pub fn clicks_on(&self, selector: &str) -> usize {
        let prefix = format!("click {selector} #");
        self.calls().iter().filter(|c| c.starts_with(&prefix)).count()
    }

    pub fn element(&self, key: &str) -> FakeElement {
        self.dom
            .lock()
            .unwrap()
            .elements
            .iter()
            .find(|e| e.key == key)
            .cloned()
            .unwrap_or_else(|| panic!("no element '{key}'"))
    }

    pub fn url(&self) -> String {
        self.dom.lock().unwrap().url.clone()
    }

    fn with_element<T>(
        &self,
        call: &str,
        selector: &str,
        index: usize,
        f: impl FnOnce(&mut FakeDom, usize) -> Result<T>,
    ) -> Result<T> {
        let mut dom = self.dom.lock().unwrap();
        dom.calls.push(format!("{call} {selector} #{index}"));
        if dom.lost {
            return Err(PageError::SessionLost("browser closed".to_string()).into());
        }
        let position = dom
            .elements
            .iter()
            .enumerate()
            .filter(|(_, e)| e.answers_to(selector))
            .map(|(i, _)| i)
            .nth(index)
            .ok_or_else(|| PageError::NoSuchElement {
                selector: selector.to_string(),
                index,
            })?;
        f(&mut dom, position)
    }
}

fn apply(dom: &mut FakeDom, effects: &[Effect]) {
    for effect in effects {
        let key = match effect {
            Effect::Show(key)
            | Effect::Hide(key)
            | Effect::Toggle(key)
            | Effect::SetText(key, _) => key,
        };
        let Some(el) = dom.elements.iter_mut().find(|e| &e.key == key) else {
            continue;
        };
        match effect {
            Effect::Show(_) => el.visible = true,
            Effect::Hide(_) => el.visible = false,
            Effect::Toggle(_) => el.visible = !el.visible,
            Effect::SetText(_, text) => el.text = text.clone(),
        }
    }
}

#[async_trait]
impl Page for FakePage {
    async fn count(&self, selector: &str) -> Result<usize> {
        let mut dom = self.dom.lock().unwrap();
        dom.calls.push(format!("count {selector}"));
        if dom.lost {
            return Err(PageError::SessionLost("browser closed".to_string()).into());
        }
        Ok(dom.elements.iter().filter(|e| e.answers_to(selector)).count())
    }

    async fn click(&self, selector: &str, index: usize) -> Result<()> {
        self.with_element("click", selector, index, |dom, i| {
            let el = &mut dom.elements[i];
            if el.broken {
                return Err(anyhow!("element click intercepted"));
            }
            if el.failing_clicks > 0 {
                el.failing_clicks -= 1;
                return Err(anyhow!("element click intercepted"));
            }
            if !el.visible {
                return Err(anyhow!("element not interactable"));
            }
            if el.is_checkbox() && !el.frozen {
                el.checked = !el.checked;
            }
            let effects = el.on_click.clone();
            apply(dom, &effects);
            Ok(())
        })
    }

    async fn fill(&self, selector: &str, index: usize, text: &str) -> Result<()> {
        self.with_element("fill", selector, index, |dom, i| {
            let el = &mut dom.elements[i];
            if !el.visible {
                return Err(anyhow!("element not interactable"));
            }
            if !el.frozen {
                el.value = text.to_string();
            }
            Ok(())
        })
    }

    async fn hover(&self, selector: &str, index: usize) -> Result<()> {
        self.with_element("hover", selector, index, |dom, i| {
            let effects = dom.elements[i].on_hover.clone();
            apply(dom, &effects);
            Ok(())
        })
    }

    async fn is_checked(&self, selector: &str, index: usize) -> Result<bool> {
        self.with_element("is_checked", selector, index, |dom, i| {
            Ok(dom.elements[i].checked)
        })
    }

    async fn input_value(&self, selector: &str, index: usize) -> Result<String> {
        self.with_element("input_value", selector, index, |dom, i| {
            Ok(dom.elements[i].value.clone())
        })
    }

    async fn inner_text(&self, selector: &str, index: usize) -> Result<String> {
        if selector == "body" {
            let dom = self.dom.lock().unwrap();
            return Ok(dom.body_text.clone());
        }
        self.with_element("inner_text", selector, index, |dom, i| {
            Ok(dom.elements[i].text.clone())
        })
    }

    async fn describe(&self, selector: &str, index: usize) -> Result<ElementDescription> {
        self.with_element("describe", selector, index, |dom, i| {
            let el = &dom.elements[i];
            Ok(ElementDescription {
                tag: el.tag.clone(),
                visible: el.visible,
                text: el.text.clone(),
                id: el.key.clone(),
                input_type: el.input_type.clone(),
                placeholder: el.placeholder.clone(),
                has_popup: el.has_popup,
                ..Default::default()
            })
        })
    }

    async fn native_options(&self, selector: &str, index: usize) -> Result<Vec<String>> {
        self.with_element("native_options", selector, index, |dom, i| {
            Ok(dom.elements[i].options.clone())
        })
    }

    async fn select_native_option(
        &self,
        selector: &str,
        index: usize,
        option_index: usize,
    ) -> Result<()> {
        self.with_element("select_native_option", selector, index, |dom, i| {
            let el = &mut dom.elements[i];
            if !el.frozen {
                el.selected = Some(option_index);
            }
            Ok(())
        })
    }

    async fn displayed_value(&self, selector: &str, index: usize) -> Result<String> {
        self.with_element("displayed_value", selector, index, |dom, i| {
            let el = &dom.elements[i];
            if el.options.is_empty() {
                Ok(el.text.clone())
            } else {
                Ok(el
                    .selected
                    .and_then(|s| el.options.get(s).cloned())
                    .unwrap_or_default())
            }
        })
    }

    async fn pin(&self, selector: &str, index: usize) -> Result<String> {
        self.with_element("pin", selector, index, |dom, i| {
            dom.pins += 1;
            let pinned = format!("[data-webassist-pin=\"{}\"]", dom.pins);
            dom.elements[i].selectors.push(pinned.clone());
            Ok(pinned)
        })
    }

    async fn wait_for_visible(&self, selector: &str, timeout: Duration) -> Result<()> {
        let visible = {
            let mut dom = self.dom.lock().unwrap();
            dom.calls.push(format!("wait_for_visible {selector}"));
            dom.elements
                .iter()
                .any(|e| e.visible && e.answers_to(selector))
        };
        if visible {
            return Ok(());
        }
        tokio::time::sleep(timeout).await;
        Err(PageError::Timeout {
            what: selector.to_string(),
            after: timeout,
        }
        .into())
    }

    async fn goto(&self, url: &str) -> Result<()> {
        let slow = {
            let mut dom = self.dom.lock().unwrap();
            dom.calls.push(format!("goto {url}"));
            if dom.lost {
                return Err(PageError::SessionLost("browser closed".to_string()).into());
            }
            if dom.unreachable.contains(url) {
                return Err(anyhow!("net::ERR_NAME_NOT_RESOLVED at {url}"));
            }
            dom.slow.contains(url)
        };
        if slow {
            tokio::time::sleep(Duration::from_secs(30)).await;
        }
        self.dom.lock().unwrap().url = url.to_string();
        Ok(())
    }

    async fn evaluate(&self, _script: &str, _args: Vec<Value>) -> Result<Value> {
        let dom = self.dom.lock().unwrap();
        Ok(json!(dom.html))
    }

    async fn current_url(&self) -> Result<String> {
        Ok(self.url())
    }

    async fn title(&self) -> Result<String> {
        Ok(self.dom.lock().unwrap().title.clone())
    }
}

/// Scripted LLM: fixed selector suggestions and a raw action-plan reply
#[derive(Clone, Default)]
pub struct FakeLlm {
    pub selectors: Vec<String>,
    /// Raw model text; `None` makes the call fail
    pub plan: Option<String>,
    pub fail_selectors: bool,
    pub tasks: Arc<Mutex<Vec<String>>>,
}

impl FakeLlm {
    pub fn suggesting(selectors: &[&str]) -> Self {
        Self {
            selectors: selectors.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    pub fn planning(reply: &str) -> Self {
        Self {
            plan: Some(reply.to_string()),
            ..Default::default()
        }
    }

    pub fn tasks(&self) -> Vec<String> {
        self.tasks.lock().unwrap().clone()
    }
}

#[async_trait]
impl LlmClient for FakeLlm {
    async fn get_selectors(&self, task: &str, _context: &PageContext) -> Result<Vec<String>> {
        self.tasks.lock().unwrap().push(task.to_string());
        if self.fail_selectors {
            return Err(StepError::new(ErrorKind::LlmUnavailable, "quota exceeded").into());
        }
        Ok(self.selectors.clone())
    }

    async fn get_actions(&self, command: &str, _context: &PageContext) -> Result<Vec<Action>> {
        self.tasks.lock().unwrap().push(command.to_string());
        match &self.plan {
            Some(reply) => parse_action_plan(reply),
            None => Err(StepError::new(ErrorKind::LlmUnavailable, "service unavailable").into()),
        }
    }
}

/// Speech channel that records what was said and replays queued input
#[derive(Clone, Default)]
pub struct RecordingSpeech {
    spoken: Arc<Mutex<Vec<String>>>,
    queued: Arc<Mutex<Vec<String>>>,
}

impl RecordingSpeech {
    pub fn with_input(lines: &[&str]) -> Self {
        let speech = Self::default();
        // Stored reversed so pop() yields them in order
        *speech.queued.lock().unwrap() = lines.iter().rev().map(|s| s.to_string()).collect();
        speech
    }

    pub fn spoken(&self) -> Vec<String> {
        self.spoken.lock().unwrap().clone()
    }

    pub fn last(&self) -> String {
        self.spoken().last().cloned().unwrap_or_default()
    }
}

#[async_trait]
impl SpeechIo for RecordingSpeech {
    async fn speak(&self, text: &str) {
        self.spoken.lock().unwrap().push(text.to_string());
    }

    async fn listen(&self) -> String {
        self.queued.lock().unwrap().pop().unwrap_or_default()
    }

    fn is_open(&self) -> bool {
        !self.queued.lock().unwrap().is_empty()
    }
}

/// Execution settings with millisecond waits
pub fn fast_execution() -> ExecutionSettings {
    ExecutionSettings {
        max_retries: 3,
        retry_delay_ms: 5,
        navigation_timeout_ms: 100,
        recovery_timeout_ms: 100,
        dropdown_timeout_ms: 30,
        action_delay_ms: 0,
        verify_typed_values: true,
    }
}

/// Default configuration with every wait shortened
pub fn fast_config() -> AssistantConfig {
    let mut config = AssistantConfig::new();
    config.execution = fast_execution();
    config.context.settle_delay_ms = 0;
    config
}
