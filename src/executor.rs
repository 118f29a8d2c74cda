use anyhow::Result;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::{ExecutionSettings, RecoveryTarget};
use crate::errors::{ErrorKind, PageError, StepError, classify};
use crate::page::Page;
use crate::selectors::{Candidate, SelectorTables};
use crate::types::{Action, ActionKind, InteractionResult, SelectorAttempt};

/// Runs one [`Action`] against the page.
///
/// Candidates are tried strictly in order. A candidate matching nothing costs
/// no retries; a matched one gets `max_retries` attempts. The first success
/// ends the action.
pub struct ActionExecutor<'a> {
    page: &'a dyn Page,
    settings: &'a ExecutionSettings,
    recovery: &'a [RecoveryTarget],
    tables: &'a SelectorTables,
}

impl<'a> ActionExecutor<'a> {
    pub fn new(
        page: &'a dyn Page,
        settings: &'a ExecutionSettings,
        recovery: &'a [RecoveryTarget],
        tables: &'a SelectorTables,
    ) -> Self {
        Self {
            page,
            settings,
            recovery,
            tables,
        }
    }

    pub async fn execute(&self, action: &Action) -> InteractionResult {
        match action.kind {
            ActionKind::Navigate => return self.navigate(action).await,
            ActionKind::Wait => return self.wait(action).await,
            _ => {}
        }

        let candidates = action.candidates();
        if candidates.is_empty() {
            debug!("No selector candidates for {:?} '{}'", action.kind, action.purpose);
            return InteractionResult::failure(
                ErrorKind::NoSelector,
                format!("No selector available to {}", action.purpose),
            );
        }

        if matches!(action.kind, ActionKind::Type | ActionKind::Select) && action.value.is_none() {
            return InteractionResult::failure(
                ErrorKind::ActionFailed,
                format!("No value given for {}", action.purpose),
            );
        }

        let max_retries = self.settings.max_retries.max(1);
        let mut log = Vec::with_capacity(candidates.len());
        let mut last_failure: Option<(ErrorKind, String)> = None;

        for raw in &candidates {
            let candidate = Candidate::parse(raw);
            let matched = match self.page.count(&candidate.selector).await {
                Ok(n) => n,
                Err(e) => {
                    let kind = classify(&e);
                    if kind.is_fatal() {
                        return session_lost(&e).with_attempts(log);
                    }
                    debug!("Selector '{}' could not be evaluated: {:#}", raw, e);
                    log.push(SelectorAttempt {
                        selector: raw.clone(),
                        matched: 0,
                        attempts: 0,
                        succeeded: false,
                        error: Some(format!("{e:#}")),
                    });
                    continue;
                }
            };

            if matched <= candidate.nth {
                debug!("Selector '{}' matched {} element(s), skipping", raw, matched);
                log.push(SelectorAttempt {
                    selector: raw.clone(),
                    matched,
                    attempts: 0,
                    succeeded: false,
                    error: None,
                });
                continue;
            }

            if candidate.positional {
                warn!(
                    "Using positional fallback '{}' for {}; layout changes will break it",
                    raw, action.purpose
                );
            }

            let mut attempt = SelectorAttempt {
                selector: raw.clone(),
                matched,
                attempts: 0,
                succeeded: false,
                error: None,
            };

            for n in 1..=max_retries {
                attempt.attempts = n;
                match self.perform(action, &candidate).await {
                    Ok(message) => {
                        attempt.succeeded = true;
                        log.push(attempt);
                        info!("{} (via '{}')", message, raw);
                        return InteractionResult::success(message).with_attempts(log);
                    }
                    Err(e) => {
                        let kind = classify(&e);
                        debug!(
                            "Attempt {}/{} on '{}' for {} failed: {:#}",
                            n, max_retries, raw, action.purpose, e
                        );
                        attempt.error = Some(format!("{e:#}"));
                        if kind.is_fatal() {
                            log.push(attempt);
                            return session_lost(&e).with_attempts(log);
                        }
                        last_failure = Some((kind, format!("{e:#}")));
                        if n < max_retries {
                            tokio::time::sleep(self.settings.retry_delay()).await;
                        }
                    }
                }
            }

            warn!(
                "Selector '{}' failed {} times for {}, trying next candidate",
                raw, max_retries, action.purpose
            );
            log.push(attempt);
        }

        let result = match last_failure {
            None => InteractionResult::failure(
                ErrorKind::ElementNotFound,
                format!("Could not find element to {}", action.purpose),
            ),
            Some((ErrorKind::VerificationFailed, cause)) => InteractionResult::failure(
                ErrorKind::VerificationFailed,
                format!("Could not confirm {}", action.purpose),
            )
            .with_cause(cause),
            Some((kind, cause)) => InteractionResult::failure(
                kind,
                format!("Could not find element to {}", action.purpose),
            )
            .with_cause(cause),
        };
        result.with_attempts(log)
    }

    async fn perform(&self, action: &Action, candidate: &Candidate) -> Result<String> {
        let selector = candidate.selector.as_str();
        let nth = candidate.nth;
        let purpose = &action.purpose;
        let value = action.value.as_deref().unwrap_or_default();

        match action.kind {
            ActionKind::Click => {
                self.page.click(selector, nth).await?;
                Ok(format!("Clicked {}", purpose))
            }
            ActionKind::Type => {
                self.page.fill(selector, nth, value).await?;
                if self.settings.verify_typed_values {
                    let actual = self.page.input_value(selector, nth).await?;
                    if actual.trim() != value.trim() {
                        return Err(StepError::new(
                            ErrorKind::VerificationFailed,
                            format!("{} holds '{}' after typing", purpose, actual),
                        )
                        .into());
                    }
                }
                Ok(format!("Entered {}", purpose))
            }
            ActionKind::Hover => {
                self.page.hover(selector, nth).await?;
                Ok(format!("Hovering over {}", purpose))
            }
            ActionKind::Check | ActionKind::Uncheck | ActionKind::Toggle => {
                self.set_checked(action.kind, selector, nth, purpose).await
            }
            ActionKind::Select => self.select(selector, nth, value, purpose).await,
            ActionKind::Navigate | ActionKind::Wait => {
                anyhow::bail!("{:?} does not target an element", action.kind)
            }
        }
    }

    async fn set_checked(
        &self,
        kind: ActionKind,
        selector: &str,
        nth: usize,
        purpose: &str,
    ) -> Result<String> {
        let before = self.page.is_checked(selector, nth).await?;
        let desired = match kind {
            ActionKind::Check => true,
            ActionKind::Uncheck => false,
            _ => !before,
        };

        if kind != ActionKind::Toggle && before == desired {
            return Ok(format!("{} already {}", purpose, checked_word(desired)));
        }

        self.page.click(selector, nth).await?;
        let after = self.page.is_checked(selector, nth).await?;
        if after != desired {
            return Err(StepError::new(
                ErrorKind::VerificationFailed,
                format!("{} is still {}", purpose, checked_word(after)),
            )
            .into());
        }
        Ok(format!("{} is now {}", purpose, checked_word(after)))
    }

    async fn select(&self, selector: &str, nth: usize, value: &str, purpose: &str) -> Result<String> {
        let element = self.page.describe(selector, nth).await?;
        // The trigger's text changes once an option is picked
        let pinned = self.page.pin(selector, nth).await?;

        let chosen = if element.is_native_select() {
            let options = self.page.native_options(&pinned, 0).await?;
            let index = match_option(&options, value).ok_or_else(|| {
                StepError::new(
                    ErrorKind::ElementNotFound,
                    format!("no option matching '{}' among {} options", value, options.len()),
                )
            })?;
            self.page.select_native_option(&pinned, 0, index).await?;
            options[index].trim().to_string()
        } else {
            self.pick_from_panel(&pinned, value).await?
        };

        let shown = self.page.displayed_value(&pinned, 0).await?;
        if !shown.to_lowercase().contains(&value.trim().to_lowercase()) {
            return Err(StepError::new(
                ErrorKind::VerificationFailed,
                format!("{} shows '{}' after choosing '{}'", purpose, shown.trim(), chosen),
            )
            .into());
        }
        Ok(format!("Selected {} from {}", chosen, purpose))
    }

    /// Open a list-based dropdown and click the best matching option
    async fn pick_from_panel(&self, trigger: &str, value: &str) -> Result<String> {
        let panels = self.tables.dropdown_panels.join(", ");
        // A retry may find the panel still open; clicking would close it
        if self.panel_open(&panels).await {
            debug!("Dropdown panel already open");
        } else {
            self.page.click(trigger, 0).await?;
        }

        self.page
            .wait_for_visible(&panels, self.settings.dropdown_timeout())
            .await?;

        for filter in &self.tables.dropdown_filters {
            if self.page.count(filter).await.unwrap_or(0) == 0 {
                continue;
            }
            match self.page.describe(filter, 0).await {
                Ok(el) if el.visible => {
                    debug!("Filtering dropdown options with '{}'", value);
                    self.page.fill(filter, 0, value).await?;
                    break;
                }
                _ => {}
            }
        }

        for option_selector in &self.tables.dropdown_options {
            let total = self.page.count(option_selector).await?;
            if total == 0 {
                continue;
            }

            let mut texts = Vec::with_capacity(total);
            for i in 0..total {
                let text = match self.page.describe(option_selector, i).await {
                    Ok(el) if el.visible => el.text,
                    Ok(_) => String::new(),
                    Err(e) => {
                        debug!("Skipping option {} of '{}': {:#}", i, option_selector, e);
                        String::new()
                    }
                };
                texts.push(text);
            }

            if let Some(index) = match_option(&texts, value) {
                self.page.click(option_selector, index).await?;
                return Ok(texts[index].trim().to_string());
            }
        }

        Err(StepError::new(
            ErrorKind::ElementNotFound,
            format!("no dropdown option matching '{}'", value),
        )
        .into())
    }

    async fn panel_open(&self, panels: &str) -> bool {
        let total = self.page.count(panels).await.unwrap_or(0);
        for i in 0..total {
            if let Ok(el) = self.page.describe(panels, i).await
                && el.visible
            {
                return true;
            }
        }
        false
    }

    async fn navigate(&self, action: &Action) -> InteractionResult {
        let target = action
            .value
            .clone()
            .unwrap_or_else(|| action.primary_selector.clone());

        match normalize_url(&target) {
            Ok(url) => {
                info!("Navigating to {}", url);
                match self.goto_bounded(&url, self.settings.navigation_timeout()).await {
                    Ok(()) => InteractionResult::success(format!("Navigated to {}", url)),
                    Err(e) => {
                        let kind = classify(&e);
                        if kind.is_fatal() {
                            return session_lost(&e);
                        }
                        warn!("Navigation to {} failed: {:#}", url, e);
                        self.recover(&target, kind, format!("{e:#}")).await
                    }
                }
            }
            Err(e) => {
                warn!("Rejected navigation target '{}': {}", target, e.message);
                self.recover(&target, ErrorKind::InvalidUrl, e.message).await
            }
        }
    }

    /// One attempt at the first configured recovery target matching `target`
    async fn recover(&self, target: &str, kind: ErrorKind, cause: String) -> InteractionResult {
        if let Some(recovery) = self.recovery.iter().find(|r| r.matches(target)) {
            info!("Trying recovery URL {} for {}", recovery.url, target);
            match self
                .goto_bounded(&recovery.url, self.settings.recovery_timeout())
                .await
            {
                Ok(()) => {
                    return InteractionResult::success(format!("Navigated to {}", recovery.url));
                }
                Err(e) => {
                    if classify(&e).is_fatal() {
                        return session_lost(&e);
                    }
                    warn!("Recovery navigation to {} failed: {:#}", recovery.url, e);
                }
            }
        }

        let message = match kind {
            ErrorKind::InvalidUrl => format!("Invalid URL: {}", target.trim()),
            ErrorKind::NavigationTimeout => format!("Timed out loading {}", target.trim()),
            _ => format!("Could not navigate to {}", target.trim()),
        };
        InteractionResult::failure(kind, message).with_cause(cause)
    }

    async fn goto_bounded(&self, url: &str, timeout: Duration) -> Result<()> {
        match tokio::time::timeout(timeout, self.page.goto(url)).await {
            Ok(result) => result,
            Err(_) => Err(PageError::Timeout {
                what: format!("navigation to {url}"),
                after: timeout,
            }
            .into()),
        }
    }

    async fn wait(&self, action: &Action) -> InteractionResult {
        let ms = action
            .value
            .as_deref()
            .and_then(|v| v.trim().parse::<u64>().ok())
            .unwrap_or(1000);
        tokio::time::sleep(Duration::from_millis(ms)).await;
        InteractionResult::success(format!("Waited {} ms", ms))
    }
}

fn checked_word(checked: bool) -> &'static str {
    if checked { "checked" } else { "unchecked" }
}

fn session_lost(err: &anyhow::Error) -> InteractionResult {
    InteractionResult::failure(ErrorKind::SessionLost, "Lost connection to the browser")
        .with_cause(format!("{err:#}"))
}

/// Normalize a navigation target.
///
/// Adds `https://` when no scheme is given and rejects targets without a host.
/// A bare root path loses its trailing slash.
pub fn normalize_url(raw: &str) -> std::result::Result<String, StepError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(StepError::new(ErrorKind::InvalidUrl, "empty URL"));
    }

    let candidate = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("https://{}", trimmed)
    };

    let parsed = Url::parse(&candidate)
        .map_err(|e| StepError::new(ErrorKind::InvalidUrl, format!("'{}': {}", trimmed, e)))?;
    if parsed.host_str().is_none_or(str::is_empty) {
        return Err(StepError::new(
            ErrorKind::InvalidUrl,
            format!("'{}' has no host", trimmed),
        ));
    }

    let bare_root = parsed.path() == "/" && parsed.query().is_none() && parsed.fragment().is_none();
    let normalized = parsed.as_str();
    Ok(if bare_root {
        normalized.trim_end_matches('/').to_string()
    } else {
        normalized.to_string()
    })
}

/// Index of the option best matching `wanted`: exact text, then
/// case-insensitive prefix, then case-insensitive substring
pub fn match_option(options: &[String], wanted: &str) -> Option<usize> {
    let wanted = wanted.trim();
    if wanted.is_empty() {
        return None;
    }
    let lower = wanted.to_lowercase();

    options
        .iter()
        .position(|o| o.trim() == wanted)
        .or_else(|| {
            options
                .iter()
                .position(|o| !o.trim().is_empty() && o.trim().to_lowercase().starts_with(&lower))
        })
        .or_else(|| {
            options
                .iter()
                .position(|o| o.to_lowercase().contains(&lower))
        })
}

#[cfg(test)]
#[path = "executor_test.rs"]
mod executor_test;
