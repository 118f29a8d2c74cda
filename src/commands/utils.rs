use anyhow::Result;
use clap::Args;
use std::path::PathBuf;
use tracing::{debug, info};

use webassist::errors::StepError;
use webassist::{
    Action, ActionKind, AssistantConfig, Browser, ErrorKind, InteractionResult, Session, SpeechIo,
    client_from_settings,
};

/// Browser and config options shared by every subcommand
#[derive(Args, Clone, Debug, Default)]
pub struct SessionOptions {
    /// Config file (defaults to ~/.webassist/config.json when present)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Browser to use (chrome or firefox)
    #[arg(short, long, global = true)]
    pub browser: Option<String>,

    /// WebDriver URL, overriding the browser's default port
    #[arg(long, global = true)]
    pub webdriver_url: Option<String>,

    /// Run the browser without a window
    #[arg(long, global = true)]
    pub headless: bool,

    /// Viewport size (WIDTHxHEIGHT, e.g., 1920x1080)
    #[arg(long, global = true)]
    pub viewport: Option<String>,
}

impl SessionOptions {
    /// File and environment configuration with these flags on top
    pub fn load_config(&self) -> Result<AssistantConfig> {
        let mut config = AssistantConfig::load(self.config.as_deref())?;
        self.apply(&mut config);
        config.validate()?;
        Ok(config)
    }

    pub fn apply(&self, config: &mut AssistantConfig) {
        if let Some(browser) = &self.browser {
            config.browser.browser = browser.clone();
        }
        if let Some(url) = &self.webdriver_url {
            config.browser.webdriver_url = Some(url.clone());
        }
        if self.headless {
            config.browser.headless = true;
        }
        if let Some(viewport) = &self.viewport {
            config.browser.viewport = viewport.clone();
        }
    }
}

/// Connect to the browser and assemble a session around it
pub async fn open_session(config: AssistantConfig, speech: Box<dyn SpeechIo>) -> Result<Session> {
    let browser = Browser::new(&config.browser).await?;
    let llm = client_from_settings(&config.llm);
    if !llm.is_available() {
        info!("No LLM configured, using built-in selectors only");
    }
    Ok(Session::new(Box::new(browser), llm, speech, config))
}

/// Load the page a command runs against
pub async fn open_url(session: &Session, url: &str) -> InteractionResult {
    let action = Action::new(ActionKind::Navigate, "start page").with_value(url);
    session.execute_action(&action).await
}

/// Failed results become errors so the process exits with their code
pub fn into_outcome(result: &InteractionResult) -> Result<()> {
    if result.success {
        return Ok(());
    }
    let kind = result.error_kind().unwrap_or(ErrorKind::ActionFailed);
    Err(StepError::new(kind, result.message.clone()).into())
}

pub async fn close_quietly(session: Session) {
    if let Err(e) = session.close().await {
        debug!("Browser did not close cleanly: {:#}", e);
    }
}
