use anyhow::Result;
use tracing::info;

use webassist::ConsoleSpeech;

use super::utils::{SessionOptions, close_quietly, open_session, open_url};

pub async fn handle_run(options: &SessionOptions, start_url: Option<String>) -> Result<()> {
    let mut config = options.load_config()?;
    if let Some(url) = start_url {
        config.browser.start_url = url;
    }
    let start = config.browser.start_url.clone();

    let mut session = open_session(config, Box::new(ConsoleSpeech::new())).await?;

    // A start page that fails to load still leaves the browser usable
    let opened = open_url(&session, &start).await;
    let outcome = if opened.error_kind().is_some_and(|k| k.is_fatal()) {
        super::utils::into_outcome(&opened)
    } else {
        session.run().await
    };

    info!("Closing browser");
    close_quietly(session).await;
    outcome
}
