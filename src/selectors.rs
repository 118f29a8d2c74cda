use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, warn};

use crate::llm::LlmClient;
use crate::types::PageContext;

/// Placeholder replaced with the element name the user spoke
pub const TARGET_PLACEHOLDER: &str = "{target}";

/// Category of UI element a command refers to
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Email,
    Password,
    SubmitButton,
    LoginLink,
    SearchInput,
    SearchButton,
    AddressLine1,
    AddressLine2,
    City,
    ZipCode,
    /// Any text control named by the user
    TextInput,
    StateDropdown,
    Dropdown,
    Checkbox,
    ProductCheckbox,
    ClickTarget,
    MenuItem,
}

impl FieldType {
    /// Guess the category from a free-form task description
    pub fn from_task(task: &str) -> Option<FieldType> {
        let task = task.to_lowercase();
        let has = |words: &[&str]| words.iter().any(|w| task.contains(w));

        let field = if has(&["password", "passcode"]) {
            FieldType::Password
        } else if has(&["email", "e-mail", "username"]) {
            FieldType::Email
        } else if has(&["zip", "postal"]) {
            FieldType::ZipCode
        } else if has(&["city"]) {
            FieldType::City
        } else if has(&["address line 2", "address 2", "line 2"]) {
            FieldType::AddressLine2
        } else if has(&["address"]) {
            FieldType::AddressLine1
        } else if has(&["state"]) {
            FieldType::StateDropdown
        } else if has(&["search"]) {
            if has(&["button", "submit", "icon"]) {
                FieldType::SearchButton
            } else {
                FieldType::SearchInput
            }
        } else if has(&["product"]) {
            FieldType::ProductCheckbox
        } else if has(&["checkbox"]) {
            FieldType::Checkbox
        } else if has(&["dropdown", "combobox"]) {
            FieldType::Dropdown
        } else if has(&["menu"]) {
            FieldType::MenuItem
        } else if has(&["login link", "sign in link", "signin link"]) {
            FieldType::LoginLink
        } else if has(&["login", "log in", "sign in", "submit"]) {
            FieldType::SubmitButton
        } else {
            return None;
        };
        Some(field)
    }

    pub fn all() -> &'static [FieldType] {
        &[
            FieldType::Email,
            FieldType::Password,
            FieldType::SubmitButton,
            FieldType::LoginLink,
            FieldType::SearchInput,
            FieldType::SearchButton,
            FieldType::AddressLine1,
            FieldType::AddressLine2,
            FieldType::City,
            FieldType::ZipCode,
            FieldType::TextInput,
            FieldType::StateDropdown,
            FieldType::Dropdown,
            FieldType::Checkbox,
            FieldType::ProductCheckbox,
            FieldType::ClickTarget,
            FieldType::MenuItem,
        ]
    }

    fn default_selectors(&self) -> &'static [&'static str] {
        match self {
            FieldType::Email => &[
                "#floating_outlined3",
                r#"input[id="floating_outlined3"]"#,
                r#"input[type="email"]"#,
                r#"input[name="email"]"#,
                r#"input[id*="email"]"#,
                r#"input[placeholder*="email" i]"#,
                r#"input[autocomplete="email"]"#,
                r#"input[autocomplete="username"]"#,
                r#"input[type="text"][name*="user"]"#,
            ],
            FieldType::Password => &[
                "#floating_outlined15",
                r#"input[type="password"]"#,
                r#"input[name="password"]"#,
                "#password",
                r#"[aria-label*="password" i]"#,
                r#"input[autocomplete="current-password"]"#,
            ],
            FieldType::SubmitButton => &[
                "#signInButton",
                r#"button[type="submit"]"#,
                r#"input[type="submit"]"#,
                r#"button:has-text("Login")"#,
                r#"button:has-text("Log in")"#,
                r#"button:has-text("Sign in")"#,
                ".login-button",
            ],
            FieldType::LoginLink => &[
                r#"a:has-text("Sign in")"#,
                r#"a:has-text("Login")"#,
                r#"a[href*="signin"]"#,
                r#"a[href*="login"]"#,
                r#"button:has-text("Sign in")"#,
            ],
            FieldType::SearchInput => &[
                r#"input[type="search"]"#,
                r#"input[name="q"]"#,
                r#"textarea[name="q"]"#,
                r#"input[name="search"]"#,
                r#"[role="searchbox"]"#,
                r#"input[placeholder*="search" i]"#,
                r#"input[aria-label*="search" i]"#,
            ],
            FieldType::SearchButton => &[
                r#"button[type="submit"]"#,
                r#"input[type="submit"]"#,
                r#"button[aria-label*="search" i]"#,
                r#"button:has-text("Search")"#,
            ],
            FieldType::AddressLine1 => &[
                "#floating_outlined2100",
                r#"input[name="addressLine1"]"#,
                r#"input[name*="address1" i]"#,
                r#"input[placeholder*="Address Line 1" i]"#,
                r#"input[aria-label*="Address Line 1" i]"#,
            ],
            FieldType::AddressLine2 => &[
                "#floating_outlined22",
                r#"input[name="addressLine2"]"#,
                r#"input[name*="address2" i]"#,
                r#"input[placeholder*="Address Line 2" i]"#,
                r#"input[aria-label*="Address Line 2" i]"#,
            ],
            FieldType::City => &[
                "#floating_outlined2401",
                r#"input[name="city"]"#,
                r#"input[id*="city" i]"#,
                r#"input[placeholder*="City" i]"#,
                r#"input[aria-label*="City" i]"#,
            ],
            FieldType::ZipCode => &[
                "#floating_outlined2601",
                r#"input[name="zipCode"]"#,
                r#"input[name*="zip" i]"#,
                r#"input[name*="postal" i]"#,
                r#"input[placeholder*="Zip" i]"#,
            ],
            FieldType::TextInput => &[
                r#"input[name*="{target}" i]"#,
                r#"input[placeholder*="{target}" i]"#,
                r#"input[aria-label*="{target}" i]"#,
                r#"input[id*="{target}" i]"#,
                r#"textarea[name*="{target}" i]"#,
                r#"textarea[placeholder*="{target}" i]"#,
            ],
            FieldType::StateDropdown => &[
                r#".p-dropdown:has-text("Select State")"#,
                r#"select[name*="state" i]"#,
                r#"select[id*="state" i]"#,
                r#"[role="combobox"][aria-label*="State"]"#,
                ".p-dropdown >> nth=1",
            ],
            FieldType::Dropdown => &[
                r#"select[name*="{target}" i]"#,
                r#"select[id*="{target}" i]"#,
                r#"select[aria-label*="{target}" i]"#,
                r#".p-dropdown:has-text("{target}")"#,
                r#"[role="combobox"][aria-label*="{target}" i]"#,
            ],
            FieldType::Checkbox => &[
                r#"input[type="checkbox"][name*="{target}" i]"#,
                r#"input[type="checkbox"][id*="{target}" i]"#,
                r#"input[type="checkbox"][aria-label*="{target}" i]"#,
                r#"[role="checkbox"][aria-label*="{target}" i]"#,
                r#"//label[contains(normalize-space(.), '{target}')]//div[contains(@class, 'p-checkbox')]"#,
            ],
            FieldType::ProductCheckbox => &[
                "//div[contains(@class, 'wizard-card-checkbox-text1')]//div[contains(text(), '{target}')]/ancestor::div[contains(@class, 'wizard-card-checkbox-container')]//div[contains(@class, 'p-checkbox')]",
                r#"//div[contains(@class, 'p-checkbox')][following-sibling::label[contains(normalize-space(.), '{target}')]]"#,
            ],
            FieldType::ClickTarget => &[
                r#"button:has-text("{target}")"#,
                r#"a:has-text("{target}")"#,
                r#"[role="button"]:has-text("{target}")"#,
                r#"input[type="submit"][value*="{target}" i]"#,
                r#"[aria-label*="{target}" i]"#,
                "//*[normalize-space(text())='{target}']",
            ],
            FieldType::MenuItem => &[
                r#"[role="menuitem"]:has-text("{target}")"#,
                r#".p-menuitem-link:has-text("{target}")"#,
                r#"nav a:has-text("{target}")"#,
                r#".menu a:has-text("{target}")"#,
                r#"header a:has-text("{target}")"#,
            ],
        }
    }
}

impl std::fmt::Display for FieldType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = serde_json::to_value(self)
            .ok()
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_default();
        f.write_str(&name)
    }
}

const DROPDOWN_PANELS: &[&str] = &[".p-dropdown-panel", r#"[role="listbox"]"#, ".dropdown-menu.show"];
const DROPDOWN_OPTIONS: &[&str] = &[".p-dropdown-item", r#"[role="option"]"#, ".dropdown-item"];
const DROPDOWN_FILTERS: &[&str] = &[".p-dropdown-filter", r#"[role="listbox"] input[type="text"]"#];

/// Curated selector lists, keyed by field category.
///
/// Read-only once a session starts.
#[derive(Clone, Debug, PartialEq)]
pub struct SelectorTables {
    fields: BTreeMap<FieldType, Vec<String>>,
    pub dropdown_panels: Vec<String>,
    pub dropdown_options: Vec<String>,
    pub dropdown_filters: Vec<String>,
}

impl Default for SelectorTables {
    fn default() -> Self {
        let to_owned = |list: &[&str]| list.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        let fields = FieldType::all()
            .iter()
            .map(|f| (*f, to_owned(f.default_selectors())))
            .collect();

        Self {
            fields,
            dropdown_panels: to_owned(DROPDOWN_PANELS),
            dropdown_options: to_owned(DROPDOWN_OPTIONS),
            dropdown_filters: to_owned(DROPDOWN_FILTERS),
        }
    }
}

impl SelectorTables {
    /// Replace the built-in list of every category present in `overrides`
    pub fn with_overrides(mut self, overrides: &BTreeMap<FieldType, Vec<String>>) -> Self {
        for (field, selectors) in overrides {
            debug!("Overriding {} selectors ({} entries)", field, selectors.len());
            self.fields.insert(*field, selectors.clone());
        }
        self
    }

    /// Selectors for a category with `{target}` substituted.
    ///
    /// Templated entries are dropped when no target is known.
    pub fn selectors_for(&self, field: FieldType, target: Option<&str>) -> Vec<String> {
        let Some(list) = self.fields.get(&field) else {
            return Vec::new();
        };
        let target = target.map(|t| t.replace(['"', '\''], "").trim().to_string());

        list.iter()
            .filter_map(|entry| {
                if !entry.contains(TARGET_PLACEHOLDER) {
                    return Some(entry.clone());
                }
                match target.as_deref() {
                    Some(t) if !t.is_empty() => Some(entry.replace(TARGET_PLACEHOLDER, t)),
                    _ => None,
                }
            })
            .collect()
    }
}

/// Rewrite selector idioms the backend does not understand
pub fn sanitize(selector: &str) -> String {
    selector.trim().replace(":contains(", ":has-text(")
}

/// Drop repeated entries, keeping the first occurrence
pub fn dedup_preserving_order<I>(selectors: I) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    let mut seen = HashSet::new();
    selectors
        .into_iter()
        .filter(|s| seen.insert(s.clone()))
        .collect()
}

/// Produces ordered candidate selectors for an intent
pub struct SelectorSource<'a> {
    llm: &'a dyn LlmClient,
    tables: &'a SelectorTables,
}

impl<'a> SelectorSource<'a> {
    pub fn new(llm: &'a dyn LlmClient, tables: &'a SelectorTables) -> Self {
        Self { llm, tables }
    }

    /// Curated selectors for a category; no I/O, never fails
    pub fn static_selectors(&self, field: FieldType, target: Option<&str>) -> Vec<String> {
        dedup_preserving_order(
            self.tables
                .selectors_for(field, target)
                .iter()
                .map(|s| sanitize(s))
                .filter(|s| !s.is_empty()),
        )
    }

    /// Selectors suggested by the LLM for this page.
    ///
    /// Any failure yields an empty list.
    pub async fn dynamic_selectors(&self, task: &str, context: &PageContext) -> Vec<String> {
        if !self.llm.is_available() {
            debug!("LLM disabled, no dynamic selectors for '{}'", task);
            return Vec::new();
        }

        match self.llm.get_selectors(task, context).await {
            Ok(selectors) => {
                let selectors = dedup_preserving_order(
                    selectors
                        .iter()
                        .map(|s| sanitize(s))
                        .filter(|s| !s.is_empty()),
                );
                debug!("LLM suggested {} selectors for '{}'", selectors.len(), task);
                selectors
            }
            Err(e) => {
                warn!("Dynamic selector lookup failed for '{}': {:#}", task, e);
                Vec::new()
            }
        }
    }

    /// LLM selectors first, then curated fallbacks for the recognized category
    pub async fn combined_selectors(&self, task: &str, context: &PageContext) -> Vec<String> {
        self.combined_selectors_for(task, context, FieldType::from_task(task), None)
            .await
    }

    pub async fn combined_selectors_for(
        &self,
        task: &str,
        context: &PageContext,
        field: Option<FieldType>,
        target: Option<&str>,
    ) -> Vec<String> {
        let mut selectors = self.dynamic_selectors(task, context).await;
        if let Some(field) = field {
            selectors.extend(self.static_selectors(field, target));
        }
        dedup_preserving_order(selectors)
    }
}

/// A candidate selector with an optional positional `>> nth=N` suffix
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Candidate {
    pub selector: String,
    pub nth: usize,
    pub positional: bool,
}

impl Candidate {
    pub fn parse(raw: &str) -> Self {
        if let Some((base, suffix)) = raw.rsplit_once(">>")
            && let Some(n) = suffix.trim().strip_prefix("nth=")
            && let Ok(nth) = n.trim().parse::<usize>()
        {
            return Candidate {
                selector: base.trim().to_string(),
                nth,
                positional: true,
            };
        }
        Candidate {
            selector: raw.trim().to_string(),
            nth: 0,
            positional: false,
        }
    }
}

/// How the backend locates elements for a selector string
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum QueryLocator {
    Css(String),
    XPath(String),
}

/// Client-side text filter applied after locating
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TextFilter {
    pub text: String,
    /// `:text-is` needs the trimmed text to be equal, `:has-text` a
    /// case-insensitive substring
    pub exact: bool,
}

impl TextFilter {
    pub fn matches(&self, element_text: &str) -> bool {
        let element_text = element_text.trim();
        if self.exact {
            element_text == self.text
        } else {
            element_text
                .to_lowercase()
                .contains(&self.text.to_lowercase())
        }
    }
}

/// Decoded selector dialect: CSS, XPath (`//…` or `xpath=…`), and a
/// trailing `:has-text("…")` or `:text-is("…")` pseudo-class
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SelectorQuery {
    pub locator: QueryLocator,
    pub text: Option<TextFilter>,
}

impl SelectorQuery {
    pub fn parse(selector: &str) -> Self {
        let selector = selector.trim();

        if let Some(xpath) = selector.strip_prefix("xpath=") {
            return Self {
                locator: QueryLocator::XPath(xpath.trim().to_string()),
                text: None,
            };
        }
        if selector.starts_with("//") || selector.starts_with("(//") {
            return Self {
                locator: QueryLocator::XPath(selector.to_string()),
                text: None,
            };
        }

        for (pseudo, exact) in [(":has-text(", false), (":text-is(", true)] {
            if let Some(pos) = selector.rfind(pseudo)
                && selector.ends_with(')')
            {
                let inner = &selector[pos + pseudo.len()..selector.len() - 1];
                let text = inner.trim().trim_matches(['"', '\'']).to_string();
                let mut base = selector[..pos].trim_end().to_string();
                if base.is_empty() || base.ends_with('>') {
                    base.push('*');
                }
                return Self {
                    locator: QueryLocator::Css(base),
                    text: Some(TextFilter { text, exact }),
                };
            }
        }

        Self {
            locator: QueryLocator::Css(selector.to_string()),
            text: None,
        }
    }
}

#[cfg(test)]
#[path = "selectors_test.rs"]
mod selectors_test;
