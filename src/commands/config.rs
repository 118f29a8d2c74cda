use anyhow::Result;

use webassist::AssistantConfig;

use super::utils::SessionOptions;

pub fn handle_config(options: &SessionOptions) -> Result<()> {
    let config = options.load_config()?;
    let source = options
        .config
        .clone()
        .or_else(|| AssistantConfig::default_path().filter(|p| p.exists()));

    match source {
        Some(path) => eprintln!("Configuration from {}", path.display()),
        None => eprintln!("Built-in configuration"),
    }
    println!("{}", serde_json::to_string_pretty(&redacted(config))?);
    Ok(())
}

/// Configuration safe to print
pub fn redacted(mut config: AssistantConfig) -> AssistantConfig {
    if config.llm.api_key.is_some() {
        config.llm.api_key = Some("********".to_string());
    }
    config
}
