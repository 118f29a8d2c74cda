use anyhow::Result;

use webassist::types::OutputFormat;
use webassist::{PageContext, SilentSpeech};

use super::utils::{SessionOptions, close_quietly, into_outcome, open_session, open_url};

pub async fn handle_context(
    options: &SessionOptions,
    url: Option<String>,
    format: OutputFormat,
) -> Result<()> {
    let config = options.load_config()?;
    let start = url.unwrap_or_else(|| config.browser.start_url.clone());

    let session = open_session(config, Box::new(SilentSpeech)).await?;
    let outcome = match into_outcome(&open_url(&session, &start).await) {
        Ok(()) => print_context(&session.context().await, format),
        Err(e) => Err(e),
    };

    close_quietly(session).await;
    outcome
}

fn print_context(context: &PageContext, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(context)?);
        }
        OutputFormat::Simple => {
            println!("{} ({})", context.title, context.url);
            println!("\nInputs:");
            for field in &context.input_fields {
                let label = [&field.placeholder, &field.aria_label, &field.name, &field.id]
                    .into_iter()
                    .find(|s| !s.is_empty())
                    .cloned()
                    .unwrap_or_default();
                println!("  <{} type={}> {}", field.tag, field.input_type, label);
            }
            println!("\nButtons:");
            for button in &context.buttons {
                println!("  {}", button.text);
            }
            println!("\nMenu items:");
            for item in &context.menu_items {
                let marker = if item.has_submenu { " >" } else { "" };
                println!("  {}{}", item.text, marker);
            }
        }
    }
    Ok(())
}
