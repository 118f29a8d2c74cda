use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Failure categories reported in `InteractionResult` details
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// The action carried no usable selector
    NoSelector,
    /// Every candidate selector matched zero elements
    ElementNotFound,
    /// An element was found but the operation kept failing
    ActionFailed,
    /// Navigation target has no resolvable host
    InvalidUrl,
    /// A bounded wait (navigation, dropdown panel, visibility) expired
    NavigationTimeout,
    /// The LLM call failed or returned unusable content
    #[serde(rename = "LLMUnavailable")]
    LlmUnavailable,
    /// The operation ran but the read-back did not match
    VerificationFailed,
    /// The browser or its driver is gone; the session cannot continue
    SessionLost,
}

impl ErrorKind {
    /// Only a lost session aborts the command loop
    pub fn is_fatal(&self) -> bool {
        matches!(self, ErrorKind::SessionLost)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NoSelector => "NoSelector",
            ErrorKind::ElementNotFound => "ElementNotFound",
            ErrorKind::ActionFailed => "ActionFailed",
            ErrorKind::InvalidUrl => "InvalidUrl",
            ErrorKind::NavigationTimeout => "NavigationTimeout",
            ErrorKind::LlmUnavailable => "LLMUnavailable",
            ErrorKind::VerificationFailed => "VerificationFailed",
            ErrorKind::SessionLost => "SessionLost",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Typed faults raised by `Page` implementations.
///
/// They travel inside `anyhow::Error` and are recovered with
/// [`classify`].
#[derive(Debug, thiserror::Error)]
pub enum PageError {
    #[error("timed out after {after:?} waiting for {what}")]
    Timeout { what: String, after: Duration },
    #[error("browser session lost: {0}")]
    SessionLost(String),
    #[error("no element at index {index} for selector '{selector}'")]
    NoSuchElement { selector: String, index: usize },
    #[error("script evaluation failed: {0}")]
    Script(String),
}

/// A typed step failure used inside the executor
#[derive(Debug, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct StepError {
    pub kind: ErrorKind,
    pub message: String,
}

impl StepError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// Map an arbitrary fault onto the error taxonomy
pub fn classify(err: &anyhow::Error) -> ErrorKind {
    if let Some(step) = err.downcast_ref::<StepError>() {
        return step.kind;
    }
    if let Some(page) = err.downcast_ref::<PageError>() {
        return match page {
            PageError::Timeout { .. } => ErrorKind::NavigationTimeout,
            PageError::SessionLost(_) => ErrorKind::SessionLost,
            PageError::NoSuchElement { .. } => ErrorKind::ElementNotFound,
            PageError::Script(_) => ErrorKind::ActionFailed,
        };
    }
    if err.downcast_ref::<tokio::time::error::Elapsed>().is_some() {
        return ErrorKind::NavigationTimeout;
    }

    // Fall back to the message for errors we do not own
    let msg = err.to_string().to_lowercase();
    if msg.contains("invalid session id")
        || msg.contains("session deleted")
        || msg.contains("chrome not reachable")
    {
        ErrorKind::SessionLost
    } else if msg.contains("timeout") || msg.contains("timed out") {
        ErrorKind::NavigationTimeout
    } else {
        ErrorKind::ActionFailed
    }
}

/// Custom error type that includes exit codes
#[derive(Debug)]
pub enum WebassistError {
    /// Element not found (exit code 2)
    ElementNotFound(String),
    /// WebDriver connection failed or browser lost (exit code 4)
    WebDriverFailed(String),
    /// Operation timeout (exit code 5)
    Timeout(String),
    /// Navigation target could not be parsed (exit code 6)
    InvalidUrl(String),
    /// Generic error (exit code 1)
    Other(anyhow::Error),
}

impl WebassistError {
    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            WebassistError::ElementNotFound(_) => 2,
            WebassistError::WebDriverFailed(_) => 4,
            WebassistError::Timeout(_) => 5,
            WebassistError::InvalidUrl(_) => 6,
            WebassistError::Other(_) => 1,
        }
    }
}

impl fmt::Display for WebassistError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WebassistError::ElementNotFound(msg) => write!(f, "Element not found: {}", msg),
            WebassistError::WebDriverFailed(msg) => {
                write!(f, "WebDriver connection failed: {}", msg)
            }
            WebassistError::Timeout(msg) => write!(f, "Operation timed out: {}", msg),
            WebassistError::InvalidUrl(msg) => write!(f, "Invalid URL: {}", msg),
            WebassistError::Other(err) => write!(f, "{}", err),
        }
    }
}

impl std::error::Error for WebassistError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            WebassistError::Other(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

impl From<anyhow::Error> for WebassistError {
    fn from(err: anyhow::Error) -> Self {
        let msg = err.to_string();

        if msg.contains("Failed to connect to WebDriver")
            || msg.contains("WebDriver")
            || msg.contains("geckodriver")
            || msg.contains("chromedriver")
        {
            return WebassistError::WebDriverFailed(msg);
        }

        match classify(&err) {
            ErrorKind::ElementNotFound => WebassistError::ElementNotFound(msg),
            ErrorKind::SessionLost => WebassistError::WebDriverFailed(msg),
            ErrorKind::NavigationTimeout => WebassistError::Timeout(msg),
            ErrorKind::InvalidUrl => WebassistError::InvalidUrl(msg),
            _ => WebassistError::Other(err),
        }
    }
}

#[cfg(test)]
#[path = "errors_test.rs"]
mod errors_test;
