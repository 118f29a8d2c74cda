use anyhow::Result;
use tracing::info;

use webassist::types::OutputFormat;
use webassist::{CommandRecord, Session, SilentSpeech};

use super::utils::{SessionOptions, close_quietly, into_outcome, open_session, open_url};

pub async fn handle_exec(
    options: &SessionOptions,
    commands: Vec<String>,
    url: Option<String>,
    format: OutputFormat,
) -> Result<()> {
    let config = options.load_config()?;
    let start = url.unwrap_or_else(|| config.browser.start_url.clone());

    let mut session = open_session(config, Box::new(SilentSpeech)).await?;
    let outcome = run_commands(&mut session, &start, &commands).await;

    print_history(session.history(), format)?;
    close_quietly(session).await;
    outcome
}

async fn run_commands(session: &mut Session, start: &str, commands: &[String]) -> Result<()> {
    into_outcome(&open_url(session, start).await)?;

    for command in commands {
        info!("Running '{}'", command);
        let keep_going = session.process_command(command).await;

        if let Some(failed) = session
            .history()
            .last()
            .and_then(|record| record.results.iter().find(|r| !r.success))
        {
            return into_outcome(failed);
        }
        if !keep_going {
            break;
        }
    }
    Ok(())
}

fn print_history(history: &[CommandRecord], format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(history)?);
        }
        OutputFormat::Simple => {
            for record in history {
                let mark = if record.succeeded() { "ok" } else { "failed" };
                println!("[{}] {} ({})", record.at.format("%H:%M:%S"), record.command, mark);
                for result in &record.results {
                    println!("  {}", result.message);
                }
            }
        }
    }
    Ok(())
}
