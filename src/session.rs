use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::AssistantConfig;
use crate::context::ContextExtractor;
use crate::errors::ErrorKind;
use crate::executor::ActionExecutor;
use crate::interpreter::{CommandInterpreter, HELP_TEXT, Interpretation};
use crate::llm::LlmClient;
use crate::page::Page;
use crate::selectors::{SelectorSource, SelectorTables};
use crate::speech::SpeechIo;
use crate::types::{Action, InteractionResult, PageContext};

/// Spoken when a free-form command cannot be planned
pub const NOT_COMPLETED: &str = "Action could not be completed";

/// One processed command and what came of it
#[derive(Clone, Debug, Serialize)]
pub struct CommandRecord {
    pub command: String,
    pub at: DateTime<Utc>,
    pub results: Vec<InteractionResult>,
}

impl CommandRecord {
    pub fn succeeded(&self) -> bool {
        !self.results.is_empty() && self.results.iter().all(|r| r.success)
    }
}

/// Owns the page and its collaborators for one assistant session.
///
/// Commands are processed one at a time; the page is never shared between
/// two commands in flight.
pub struct Session {
    page: Box<dyn Page>,
    llm: Box<dyn LlmClient>,
    speech: Box<dyn SpeechIo>,
    tables: SelectorTables,
    config: AssistantConfig,
    interpreter: CommandInterpreter,
    extractor: ContextExtractor,
    history: Vec<CommandRecord>,
}

impl Session {
    pub fn new(
        page: Box<dyn Page>,
        llm: Box<dyn LlmClient>,
        speech: Box<dyn SpeechIo>,
        config: AssistantConfig,
    ) -> Self {
        Self {
            page,
            llm,
            speech,
            tables: config.selector_tables(),
            extractor: ContextExtractor::new(config.context.clone()),
            interpreter: CommandInterpreter::new(),
            config,
            history: Vec::new(),
        }
    }

    pub fn page(&self) -> &dyn Page {
        self.page.as_ref()
    }

    pub fn config(&self) -> &AssistantConfig {
        &self.config
    }

    pub fn history(&self) -> &[CommandRecord] {
        &self.history
    }

    /// Fresh snapshot of the current page
    pub async fn context(&self) -> PageContext {
        self.extractor.extract(self.page.as_ref()).await
    }

    /// Read commands until the user exits, input ends or the browser is lost
    pub async fn run(&mut self) -> Result<()> {
        self.speech
            .speak("Web assistant ready. Say 'help' to hear the commands.")
            .await;

        while self.speech.is_open() {
            let command = self.speech.listen().await;
            if command.trim().is_empty() {
                continue;
            }
            if !self.process_command(&command).await {
                break;
            }
        }

        info!("Session ended after {} command(s)", self.history.len());
        Ok(())
    }

    /// Handle one command. Returns whether the command loop should continue.
    pub async fn process_command(&mut self, text: &str) -> bool {
        let command = text.trim();
        if command.is_empty() {
            return true;
        }
        info!("Processing command: {}", command);

        let mut results = Vec::new();
        let keep_going = match self.interpreter.interpret(command) {
            Interpretation::Exit => {
                self.speech.speak("Goodbye!").await;
                false
            }
            Interpretation::Help => {
                self.speech.speak(HELP_TEXT).await;
                true
            }
            Interpretation::Actions(actions) => self.run_actions(actions, &mut results).await,
            Interpretation::Unmatched(command) => {
                let context = self.context().await;
                match self.llm.get_actions(&command, &context).await {
                    Ok(actions) => {
                        debug!("LLM planned {} action(s)", actions.len());
                        self.run_actions(actions, &mut results).await
                    }
                    Err(e) => {
                        warn!("Could not plan '{}': {:#}", command, e);
                        let result = InteractionResult::failure(ErrorKind::LlmUnavailable, NOT_COMPLETED)
                            .with_cause(format!("{e:#}"));
                        self.speech.speak(&result.message).await;
                        results.push(result);
                        true
                    }
                }
            }
        };

        self.history.push(CommandRecord {
            command: command.to_string(),
            at: Utc::now(),
            results,
        });
        keep_going
    }

    /// Run actions in order, stopping at the first failure.
    ///
    /// Returns false only when the browser session is gone.
    async fn run_actions(&self, actions: Vec<Action>, results: &mut Vec<InteractionResult>) -> bool {
        for (i, action) in actions.iter().enumerate() {
            if i > 0 {
                tokio::time::sleep(self.config.execution.action_delay()).await;
            }

            let result = self.execute_action(action).await;
            let success = result.success;
            let fatal = result.error_kind().is_some_and(|k| k.is_fatal());
            results.push(result);

            if fatal {
                return false;
            }
            if !success {
                debug!("Stopping after failed step {} of {}", i + 1, actions.len());
                break;
            }
        }
        true
    }

    /// Resolve selectors when needed, execute, and speak the outcome
    pub async fn execute_action(&self, action: &Action) -> InteractionResult {
        let action = self.resolve(action).await;
        let executor = ActionExecutor::new(
            self.page.as_ref(),
            &self.config.execution,
            &self.config.recovery_targets,
            &self.tables,
        );

        let result = executor.execute(&action).await;
        if result.error_kind() == Some(ErrorKind::SessionLost) {
            self.speech
                .speak("Lost connection to the browser. Ending the session.")
                .await;
        } else {
            self.speech.speak(&result.message).await;
        }
        result
    }

    /// Fill in selectors for actions that only name a field category
    async fn resolve(&self, action: &Action) -> Action {
        let mut action = action.clone();
        let Some(field) = action.field else {
            return action;
        };
        if action.has_selectors() || !action.kind.needs_selector() {
            return action;
        }

        let context = if self.llm.is_available() {
            self.context().await
        } else {
            PageContext::default()
        };

        let source = SelectorSource::new(self.llm.as_ref(), &self.tables);
        let task = format!("find the {}", action.purpose);
        let mut selectors = source
            .combined_selectors_for(&task, &context, Some(field), action.target.as_deref())
            .await
            .into_iter();

        debug!("Resolved {} candidate(s) for {}", selectors.len(), action.purpose);
        action.primary_selector = selectors.next().unwrap_or_default();
        action.fallback_selectors = selectors.collect();
        action
    }

    /// Close the underlying browser
    pub async fn close(self) -> Result<()> {
        self.page.close().await
    }
}
