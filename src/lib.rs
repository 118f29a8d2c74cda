//! # webassist
#![allow(clippy::uninlined_format_args)]
//!
//! Voice- or text-driven browser assistant built on WebDriver.
//!
//! A spoken command such as "select California from state dropdown" is turned
//! into [`Action`]s, each with an ordered list of candidate selectors. The
//! [`ActionExecutor`] tries candidates in priority order with bounded retries,
//! verifies what it can read back, and reports an [`InteractionResult`].
//!
//! ## CLI Usage
//!
//! ```bash
//! # Interactive session (type commands, answers are printed)
//! webassist run --start-url https://www.redberyltest.in/#/signin
//!
//! # One-shot commands with JSON output
//! webassist exec "login with email a@b.com and password secret" --url example.com
//!
//! # Dump the page context the LLM sees
//! webassist context --url https://example.com
//! ```
//!
//! A WebDriver must be running (`chromedriver --port 9515` or
//! `geckodriver --port 4444`). Set `GEMINI_API_KEY` to enable LLM-backed
//! selector suggestions and free-form commands.
//!
//! ## Library Usage
//!
//! ```no_run
//! use webassist::{AssistantConfig, Browser, Session, SilentSpeech, client_from_settings};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = AssistantConfig::load(None)?;
//! config.validate()?;
//! let browser = Browser::new(&config.browser).await?;
//! let llm = client_from_settings(&config.llm);
//! let mut session = Session::new(Box::new(browser), llm, Box::new(SilentSpeech), config);
//!
//! session.process_command("go to example.com").await;
//! session.process_command("click More information").await;
//! session.close().await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod context;
pub mod errors;
pub mod executor;
pub mod interpreter;
pub mod llm;
pub mod page;
pub mod selectors;
pub mod session;
pub mod speech;
pub mod types;
pub mod webdriver;

pub use config::AssistantConfig;
pub use context::ContextExtractor;
pub use errors::{ErrorKind, PageError, WebassistError};
pub use executor::ActionExecutor;
pub use interpreter::{CommandInterpreter, Interpretation};
pub use llm::{DisabledLlm, GeminiClient, LlmClient, client_from_settings};
pub use page::{ElementDescription, Page};
pub use selectors::{FieldType, SelectorSource, SelectorTables};
pub use session::{CommandRecord, Session};
pub use speech::{ConsoleSpeech, SilentSpeech, SpeechIo};
pub use types::{Action, ActionKind, InteractionResult, PageContext};
pub use webdriver::{Browser, BrowserType};
