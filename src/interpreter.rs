use lazy_static::lazy_static;
use regex::{Captures, Regex};
use std::collections::HashMap;
use std::ops::Range;
use tracing::debug;

use crate::selectors::FieldType;
use crate::types::{Action, ActionKind};

/// Supported command forms, spoken or printed on `help`
pub const HELP_TEXT: &str = "\
Available commands:
  go to <website>                         open a page (https:// is added)
  navigate to <item> under <menu>         open a submenu entry
  click [on] <element>                    click a button, link or text
  click menu item <name>                  click a navigation entry
  hover over <element>                    hover an element
  search for <query>                      type into the search box and submit
  login with email <email> and password <password>
  enter email <email> [and password <password>]
  enter password <password>
  enter <address line 1|address line 2|city|zip code> <value>
  type <text> into <field>                fill any named field
  select <option> from state dropdown
  select <option> from <name> dropdown
  check|uncheck|toggle <checkbox>
  check|uncheck product <name>
  help                                    show this text
  exit | quit                             end the session
Anything else is sent to the language model.";

/// Result of matching one command
#[derive(Clone, Debug, PartialEq)]
pub enum Interpretation {
    Exit,
    Help,
    /// Actions built from a matched pattern
    Actions(Vec<Action>),
    /// No pattern matched; carries the corrected command for the LLM path
    Unmatched(String),
}

type Handler = fn(&Slots<'_>) -> Interpretation;

fn rule(pattern: impl Into<String>, handler: Handler) -> (String, Handler) {
    (pattern.into(), handler)
}

/// Loose spellings of "click" seen in speech transcripts
const CLICK: &str = r"(?:cl[ick]{1,4}|tap|press|hit)";
const FILL: &str = r"(?:enter|type|input|fill(?:\s+in)?|set)";

lazy_static! {
    static ref CORRECTIONS: HashMap<&'static str, &'static str> = HashMap::from([
        ("oassword", "password"),
        ("passward", "password"),
        ("pasword", "password"),
        ("passwd", "password"),
        ("wth", "with"),
        ("emaol", "email"),
        ("e-mail", "email"),
        ("clcik", "click"),
        ("clikc", "click"),
        ("clik", "click"),
        ("clck", "click"),
        ("clk", "click"),
        ("selct", "select"),
        ("slect", "select"),
        ("navigat", "navigate"),
        ("navigte", "navigate"),
        ("serch", "search"),
        ("srch", "search"),
        ("buttn", "button"),
        ("buton", "button"),
        ("logn", "login"),
        ("loign", "login"),
        ("signin", "sign in"),
        ("sign-in", "sign in"),
        ("stat", "state"),
        ("stte", "state"),
        ("conty", "county"),
        ("counti", "county"),
    ]);

    static ref CORRECTION_WORD: Regex = {
        let mut words: Vec<&str> = CORRECTIONS.keys().copied().collect();
        // Longest first so "clikc" wins over "clik"
        words.sort_by_key(|w| std::cmp::Reverse(w.len()));
        let alternation = words
            .iter()
            .map(|w| regex::escape(w))
            .collect::<Vec<_>>()
            .join("|");
        Regex::new(&format!(r"(?i)\b(?:{alternation})\b")).unwrap()
    };

    /// Matched top to bottom; the first hit wins
    static ref PATTERNS: Vec<(Regex, Handler)> = {
        let table = vec![
            rule(r"^(?:exit|quit|bye|goodbye)$", exit),
            rule(r"^(?:help|commands|what can you do)$", help),
            rule(
                r"^(?:log\s*in|sign\s+in)\s+(?:with\s+)?(?:email|username|user)\s+(?:as\s+)?(\S+)\s+and\s+password\s+(?:as\s+)?(\S+)$",
                login,
            ),
            rule(
                format!(r"^{FILL}\s+(?:my\s+|the\s+)?email\s+(?:as\s+|with\s+)?(\S+)(?:\s+and\s+password\s+(?:as\s+|with\s+)?(\S+))?$"),
                enter_credentials,
            ),
            rule(
                format!(r"^{FILL}\s+(?:my\s+|the\s+)?password\s+(?:as\s+|with\s+)?(\S+)$"),
                enter_password,
            ),
            rule(
                format!(r"^{FILL}\s+(?:the\s+)?(address\s+line\s+[12]|address\s+[12]|address|street|city|zip(?:\s*code)?|postal\s+code)\s+(?:as\s+|to\s+|with\s+)?(.+)$"),
                address_field,
            ),
            rule(
                r"^(?:select|choose|pick)\s+(.+?)\s+(?:from|in)\s+(?:the\s+)?state(?:\s+of\s+formation)?(?:\s+dropdown)?$",
                select_state,
            ),
            rule(
                format!(r"^(?:open|expand|{CLICK}(?:\s+on)?)\s+(?:the\s+)?state\s+dropdown$"),
                open_state_dropdown,
            ),
            rule(
                r"^(check|uncheck|select|deselect)\s+(?:the\s+)?product\s+(.+)$",
                product_checkbox,
            ),
            rule(r"^(check|uncheck|toggle)\s+(?:the\s+)?(.+?)(?:\s+checkbox)?$", checkbox),
            rule(
                r"^(?:select|choose|pick)\s+(.+?)\s+(?:from|in)\s+(?:the\s+)?(.+?)(?:\s+dropdown|\s+list)?$",
                select_from_dropdown,
            ),
            rule(
                r"^(?:type|enter|input|write)\s+(.+?)\s+(?:in|into)\s+(?:the\s+)?(.+?)(?:\s+field|\s+box|\s+input)?$",
                type_into,
            ),
            rule(
                r"^(?:navigate|go)\s+to\s+(.+?)\s+(?:under|in)\s+(?:the\s+)?(.+?)(?:\s+menu)?$",
                submenu,
            ),
            rule(
                r"^(?:go\s+to|navigate\s+to|open|visit|browse\s+to)\s+(\S+://\S*|\S+\.\S+|localhost\S*)$",
                navigate,
            ),
            rule(r"^search(?:\s+for)?\s+(.+)$", search),
            rule(format!(r"^{CLICK}(?:\s+on)?\s+(?:the\s+)?menu\s+item\s+(.+)$"), menu_item),
            rule(
                format!(r"^{CLICK}(?:\s+on)?\s+(?:the\s+)?(.+?)(?:\s+(button|link|tab))?$"),
                click,
            ),
            rule(r"^(?:hover|mouse)(?:\s+over|\s+on)?\s+(?:the\s+)?(.+)$", hover),
        ];

        table
            .into_iter()
            .map(|(pattern, handler)| (Regex::new(&format!("(?i){pattern}")).unwrap(), handler))
            .collect()
    };
}

/// Maps raw command text to actions through a prioritized pattern table
#[derive(Default)]
pub struct CommandInterpreter;

impl CommandInterpreter {
    pub fn new() -> Self {
        Self
    }

    pub fn interpret(&self, text: &str) -> Interpretation {
        let transcript = Transcript::new(text);
        if transcript.text.is_empty() {
            return Interpretation::Unmatched(transcript.text);
        }

        for (index, (pattern, handler)) in PATTERNS.iter().enumerate() {
            if let Some(caps) = pattern.captures(&transcript.text) {
                debug!("Command '{}' matched pattern {}", transcript.text, index);
                return handler(&Slots {
                    caps,
                    transcript: &transcript,
                });
            }
        }

        debug!("No pattern matched '{}'", transcript.text);
        Interpretation::Unmatched(transcript.text)
    }
}

/// Command text with typos fixed, remembering each word as it was dictated
struct Transcript {
    text: String,
    /// Span of every word in `text` and its original spelling
    words: Vec<(Range<usize>, String)>,
}

impl Transcript {
    fn new(raw: &str) -> Self {
        let trimmed = raw.trim().trim_end_matches(['.', '!', '?', ',']);
        let mut text = String::new();
        let mut words = Vec::new();

        for token in trimmed.split_whitespace() {
            if !text.is_empty() {
                text.push(' ');
            }
            let start = text.len();
            text.push_str(&correct_token(token));
            words.push((start..text.len(), token.to_string()));
        }

        Self { text, words }
    }
}

/// Capture groups of a matched pattern
struct Slots<'t> {
    caps: Captures<'t>,
    transcript: &'t Transcript,
}

impl Slots<'_> {
    fn has(&self, i: usize) -> bool {
        self.caps.get(i).is_some()
    }

    /// An element or field name, typo fixes included
    fn name(&self, i: usize) -> String {
        self.caps
            .get(i)
            .map(|m| m.as_str().trim().to_string())
            .unwrap_or_default()
    }

    /// A dictated value (text to type, option, query), exactly as spoken
    fn value(&self, i: usize) -> String {
        let Some(m) = self.caps.get(i) else {
            return String::new();
        };
        self.transcript
            .words
            .iter()
            .filter(|(span, _)| span.start < m.end() && m.start() < span.end)
            .map(|(_, word)| word.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Trim, collapse whitespace, drop trailing punctuation and fix common
/// transcription typos. Tokens that look like URLs or emails are untouched.
pub fn normalize_command(text: &str) -> String {
    Transcript::new(text).text
}

fn correct_token(token: &str) -> String {
    if token.contains(['/', '.', '@', ':']) {
        return token.to_string();
    }
    CORRECTION_WORD
        .replace_all(token, |caps: &Captures| {
            CORRECTIONS
                .get(caps[0].to_lowercase().as_str())
                .copied()
                .unwrap_or_default()
                .to_string()
        })
        .into_owned()
}

fn exit(_slots: &Slots) -> Interpretation {
    Interpretation::Exit
}

fn help(_slots: &Slots) -> Interpretation {
    Interpretation::Help
}

fn type_field(field: FieldType, value: String, purpose: &str) -> Action {
    Action::new(ActionKind::Type, purpose)
        .for_field(field)
        .with_value(value)
}

fn login(s: &Slots) -> Interpretation {
    Interpretation::Actions(vec![
        type_field(FieldType::Email, s.value(1), "email field"),
        type_field(FieldType::Password, s.value(2), "password field"),
        Action::new(ActionKind::Click, "login button").for_field(FieldType::SubmitButton),
    ])
}

fn enter_credentials(s: &Slots) -> Interpretation {
    let mut actions = vec![type_field(FieldType::Email, s.value(1), "email field")];
    if s.has(2) {
        actions.push(type_field(FieldType::Password, s.value(2), "password field"));
    }
    Interpretation::Actions(actions)
}

fn enter_password(s: &Slots) -> Interpretation {
    Interpretation::Actions(vec![type_field(
        FieldType::Password,
        s.value(1),
        "password field",
    )])
}

fn address_field(s: &Slots) -> Interpretation {
    let name = s.name(1).to_lowercase();
    let (field, purpose) = if name.ends_with('2') {
        (FieldType::AddressLine2, "address line 2")
    } else if name.starts_with("address") || name == "street" {
        (FieldType::AddressLine1, "address line 1")
    } else if name == "city" {
        (FieldType::City, "city field")
    } else {
        (FieldType::ZipCode, "zip code field")
    };
    Interpretation::Actions(vec![type_field(field, s.value(2), purpose)])
}

fn select_state(s: &Slots) -> Interpretation {
    Interpretation::Actions(vec![
        Action::new(ActionKind::Select, "state dropdown")
            .for_field(FieldType::StateDropdown)
            .with_value(s.value(1)),
    ])
}

fn open_state_dropdown(_slots: &Slots) -> Interpretation {
    Interpretation::Actions(vec![
        Action::new(ActionKind::Click, "state dropdown").for_field(FieldType::StateDropdown),
    ])
}

fn checkbox_kind(verb: &str) -> ActionKind {
    match verb.to_lowercase().as_str() {
        "uncheck" | "deselect" => ActionKind::Uncheck,
        "toggle" => ActionKind::Toggle,
        _ => ActionKind::Check,
    }
}

fn product_checkbox(s: &Slots) -> Interpretation {
    let product = s.name(2);
    Interpretation::Actions(vec![
        Action::new(checkbox_kind(&s.name(1)), format!("{} product", product))
            .for_field(FieldType::ProductCheckbox)
            .with_target(product),
    ])
}

fn checkbox(s: &Slots) -> Interpretation {
    let name = s.name(2);
    Interpretation::Actions(vec![
        Action::new(checkbox_kind(&s.name(1)), format!("{} checkbox", name))
            .for_field(FieldType::Checkbox)
            .with_target(name),
    ])
}

fn select_from_dropdown(s: &Slots) -> Interpretation {
    let dropdown = s.name(2);
    Interpretation::Actions(vec![
        Action::new(ActionKind::Select, format!("{} dropdown", dropdown))
            .for_field(FieldType::Dropdown)
            .with_target(dropdown)
            .with_value(s.value(1)),
    ])
}

fn type_into(s: &Slots) -> Interpretation {
    let name = s.name(2);
    let field = match FieldType::from_task(&name) {
        Some(f @ (FieldType::Email
        | FieldType::Password
        | FieldType::SearchInput
        | FieldType::AddressLine1
        | FieldType::AddressLine2
        | FieldType::City
        | FieldType::ZipCode)) => f,
        _ => FieldType::TextInput,
    };
    Interpretation::Actions(vec![
        Action::new(ActionKind::Type, format!("{} field", name))
            .for_field(field)
            .with_target(name)
            .with_value(s.value(1)),
    ])
}

fn submenu(s: &Slots) -> Interpretation {
    let item = s.name(1);
    let menu = s.name(2);
    Interpretation::Actions(vec![
        Action::new(ActionKind::Hover, format!("{} menu", menu))
            .for_field(FieldType::MenuItem)
            .with_target(menu),
        Action::new(ActionKind::Click, format!("{} menu item", item))
            .for_field(FieldType::MenuItem)
            .with_target(item),
    ])
}

fn navigate(s: &Slots) -> Interpretation {
    Interpretation::Actions(vec![
        Action::new(ActionKind::Navigate, "requested page").with_value(s.value(1)),
    ])
}

fn search(s: &Slots) -> Interpretation {
    Interpretation::Actions(vec![
        type_field(FieldType::SearchInput, s.value(1), "search box"),
        Action::new(ActionKind::Click, "search button").for_field(FieldType::SearchButton),
    ])
}

fn menu_item(s: &Slots) -> Interpretation {
    let item = s.name(1);
    Interpretation::Actions(vec![
        Action::new(ActionKind::Click, format!("{} menu item", item))
            .for_field(FieldType::MenuItem)
            .with_target(item),
    ])
}

fn click(s: &Slots) -> Interpretation {
    let target = s.name(1);
    let purpose = if s.has(2) {
        format!("{} {}", target, s.name(2).to_lowercase())
    } else {
        target.clone()
    };
    Interpretation::Actions(vec![
        Action::new(ActionKind::Click, purpose)
            .for_field(FieldType::ClickTarget)
            .with_target(target),
    ])
}

fn hover(s: &Slots) -> Interpretation {
    let target = s.name(1);
    Interpretation::Actions(vec![
        Action::new(ActionKind::Hover, target.clone())
            .for_field(FieldType::ClickTarget)
            .with_target(target),
    ])
}

#[cfg(test)]
#[path = "interpreter_test.rs"]
mod interpreter_test;
