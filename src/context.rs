use anyhow::Result;
use lazy_static::lazy_static;
use lol_html::html_content::ContentType;
use lol_html::{RewriteStrSettings, doc_comments, doc_text, element, rewrite_str};
use regex::Regex;
use tracing::{debug, warn};

use crate::config::ContextSettings;
use crate::page::Page;
use crate::types::{ButtonInfo, InputField, MenuItem, PageContext};

const INPUT_SELECTOR: &str = "input, textarea, select";
const BUTTON_SELECTOR: &str =
    "button, [role='button'], input[type='submit'], input[type='button']";
const MENU_SELECTOR: &str = "[role='menubar'] [role='menuitem'], .p-menuitem, nav a, \
                             .navigation a, .menu a, header a";

/// Elements dropped from prompt HTML along with their content
const STRIPPED_TAGS: &[&str] = &[
    "script", "style", "noscript", "svg", "link", "meta", "template",
];

/// Elements that end a line in prompt HTML
const INTERACTIVE_TAGS: &[&str] = &["input", "button", "select", "textarea", "a"];

/// Body HTML from a clone of the document, without hidden elements and
/// without elements that are empty after that
const FILTERED_BODY_SCRIPT: &str = r#"
    const live = Array.from(document.body.querySelectorAll('*'));
    const hidden = new Set();
    live.forEach((el, i) => {
        const style = window.getComputedStyle(el);
        if (style.display === 'none' || style.visibility === 'hidden' ||
            el.hidden || el.getAttribute('aria-hidden') === 'true') {
            hidden.add(i);
        }
    });
    const clone = document.body.cloneNode(true);
    const copies = Array.from(clone.querySelectorAll('*'));
    copies.forEach((el, i) => {
        if (hidden.has(i)) { el.remove(); }
    });
    const keep = new Set(['INPUT', 'TEXTAREA', 'BUTTON', 'SELECT', 'OPTION', 'IMG',
                          'IFRAME', 'CANVAS', 'TD', 'BR', 'HR']);
    let pruned = true;
    while (pruned) {
        pruned = false;
        clone.querySelectorAll('*').forEach(el => {
            if (!keep.has(el.tagName) && el.children.length === 0 &&
                el.textContent.trim() === '') {
                el.remove();
                pruned = true;
            }
        });
    }
    return clone.innerHTML;
"#;

lazy_static! {
    static ref WHITESPACE: Regex = Regex::new(r"\s+").unwrap();
}

/// Builds bounded [`PageContext`] snapshots
pub struct ContextExtractor {
    settings: ContextSettings,
}

impl ContextExtractor {
    pub fn new(settings: ContextSettings) -> Self {
        Self { settings }
    }

    /// Snapshot the page.
    ///
    /// Each part is collected independently; a part that fails is left empty.
    pub async fn extract(&self, page: &dyn Page) -> PageContext {
        let settle = self.settings.settle_delay();
        if !settle.is_zero() {
            tokio::time::sleep(settle).await;
        }

        let url = page.current_url().await.unwrap_or_else(|e| {
            warn!("Could not read page URL: {:#}", e);
            String::new()
        });
        let title = page.title().await.unwrap_or_else(|e| {
            warn!("Could not read page title: {:#}", e);
            String::new()
        });

        let input_fields = self.inputs(page).await.unwrap_or_else(|e| {
            warn!("Input field extraction failed: {:#}", e);
            Vec::new()
        });
        let buttons = self.buttons(page).await.unwrap_or_else(|e| {
            warn!("Button extraction failed: {:#}", e);
            Vec::new()
        });
        let menu_items = self.menu_items(page).await.unwrap_or_else(|e| {
            warn!("Menu extraction failed: {:#}", e);
            Vec::new()
        });

        let visible_text = match page.inner_text("body", 0).await {
            Ok(text) => truncate_chars(text.trim(), self.settings.max_text_chars),
            Err(e) => {
                warn!("Could not read body text: {:#}", e);
                String::new()
            }
        };

        let filtered_html = match page.evaluate(FILTERED_BODY_SCRIPT, vec![]).await {
            Ok(value) => filter_html(value.as_str().unwrap_or_default(), self.settings.max_html_chars),
            Err(e) => {
                warn!("Could not read page HTML: {:#}", e);
                String::new()
            }
        };

        debug!(
            "Context for {}: {} inputs, {} buttons, {} menu items",
            url,
            input_fields.len(),
            buttons.len(),
            menu_items.len()
        );

        PageContext {
            url,
            title,
            visible_text,
            input_fields,
            buttons,
            menu_items,
            filtered_html,
        }
    }

    async fn inputs(&self, page: &dyn Page) -> Result<Vec<InputField>> {
        let total = page.count(INPUT_SELECTOR).await?;
        let mut fields = Vec::new();

        for i in 0..total.min(self.settings.scan_limit) {
            if fields.len() >= self.settings.max_inputs {
                break;
            }
            let el = match page.describe(INPUT_SELECTOR, i).await {
                Ok(el) => el,
                Err(e) => {
                    debug!("Skipping input {}: {:#}", i, e);
                    continue;
                }
            };
            if !el.visible || el.input_type.eq_ignore_ascii_case("hidden") {
                continue;
            }
            fields.push(InputField {
                tag: el.tag,
                input_type: el.input_type,
                id: el.id,
                name: el.name,
                placeholder: el.placeholder,
                aria_label: el.aria_label,
            });
        }
        Ok(fields)
    }

    async fn buttons(&self, page: &dyn Page) -> Result<Vec<ButtonInfo>> {
        let total = page.count(BUTTON_SELECTOR).await?;
        let mut buttons = Vec::new();

        for i in 0..total.min(self.settings.scan_limit) {
            if buttons.len() >= self.settings.max_buttons {
                break;
            }
            let el = match page.describe(BUTTON_SELECTOR, i).await {
                Ok(el) => el,
                Err(e) => {
                    debug!("Skipping button {}: {:#}", i, e);
                    continue;
                }
            };
            if !el.visible {
                continue;
            }
            let text = if el.text.trim().is_empty() {
                el.aria_label.trim().to_string()
            } else {
                el.text.trim().to_string()
            };
            buttons.push(ButtonInfo {
                text,
                id: el.id,
                class_name: el.class_name,
                button_type: el.input_type,
            });
        }
        Ok(buttons)
    }

    async fn menu_items(&self, page: &dyn Page) -> Result<Vec<MenuItem>> {
        let total = page.count(MENU_SELECTOR).await?;
        let mut items: Vec<MenuItem> = Vec::new();

        for i in 0..total.min(self.settings.scan_limit) {
            if items.len() >= self.settings.max_menu_items {
                break;
            }
            let el = match page.describe(MENU_SELECTOR, i).await {
                Ok(el) => el,
                Err(e) => {
                    debug!("Skipping menu item {}: {:#}", i, e);
                    continue;
                }
            };
            let text = el.text.trim();
            if !el.visible || text.is_empty() || items.iter().any(|m| m.text == text) {
                continue;
            }
            items.push(MenuItem {
                text: text.to_string(),
                has_submenu: el.has_popup,
            });
        }
        Ok(items)
    }
}

/// Cut to at most `max` characters without splitting a code point
pub fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}

/// Strip scripts, styles and comments, collapse whitespace, put each
/// interactive element on its own line, and truncate
pub fn filter_html(html: &str, max_chars: usize) -> String {
    let mut element_content_handlers: Vec<_> = STRIPPED_TAGS
        .iter()
        .map(|tag| {
            element!(*tag, |el| {
                el.remove();
                Ok(())
            })
        })
        .collect();
    element_content_handlers.extend(INTERACTIVE_TAGS.iter().map(|tag| {
        element!(*tag, |el| {
            el.after("\n", ContentType::Html);
            Ok(())
        })
    }));

    let rewritten = rewrite_str(
        html,
        RewriteStrSettings {
            element_content_handlers,
            document_content_handlers: vec![
                doc_comments!(|c| {
                    c.remove();
                    Ok(())
                }),
                doc_text!(|t| {
                    let collapsed = WHITESPACE.replace_all(t.as_str(), " ").into_owned();
                    if collapsed != t.as_str() {
                        t.replace(&collapsed, ContentType::Html);
                    }
                    Ok(())
                }),
            ],
            ..RewriteStrSettings::new()
        },
    );

    match rewritten {
        Ok(out) => truncate_chars(out.trim(), max_chars),
        Err(e) => {
            warn!("Could not filter page HTML: {}", e);
            String::new()
        }
    }
}

#[cfg(test)]
#[path = "context_test.rs"]
mod context_test;
