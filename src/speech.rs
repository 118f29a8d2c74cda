use async_trait::async_trait;
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Voice or text channel to the user
#[async_trait]
pub trait SpeechIo: Send + Sync {
    /// Best effort; failures are logged, never returned
    async fn speak(&self, text: &str);

    /// Next utterance, or an empty string when nothing was understood
    async fn listen(&self) -> String;

    /// False once the input side is exhausted
    fn is_open(&self) -> bool {
        true
    }
}

/// Text-mode channel over stdin and stdout
pub struct ConsoleSpeech {
    lines: Mutex<Lines<BufReader<Stdin>>>,
    closed: AtomicBool,
    prompt: String,
}

impl ConsoleSpeech {
    pub fn new() -> Self {
        Self {
            lines: Mutex::new(BufReader::new(tokio::io::stdin()).lines()),
            closed: AtomicBool::new(false),
            prompt: "Enter command: ".to_string(),
        }
    }
}

impl Default for ConsoleSpeech {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SpeechIo for ConsoleSpeech {
    async fn speak(&self, text: &str) {
        println!("ASSISTANT: {}", text);
    }

    async fn listen(&self) -> String {
        print!("{}", self.prompt);
        if let Err(e) = std::io::stdout().flush() {
            debug!("Could not flush prompt: {}", e);
        }

        let mut lines = self.lines.lock().await;
        match lines.next_line().await {
            Ok(Some(line)) => line.trim().to_string(),
            Ok(None) => {
                self.closed.store(true, Ordering::SeqCst);
                String::new()
            }
            Err(e) => {
                warn!("Failed to read command: {}", e);
                String::new()
            }
        }
    }

    fn is_open(&self) -> bool {
        !self.closed.load(Ordering::SeqCst)
    }
}

/// Channel for one-shot runs: speech goes to the log, nothing is heard
pub struct SilentSpeech;

#[async_trait]
impl SpeechIo for SilentSpeech {
    async fn speak(&self, text: &str) {
        tracing::info!("{}", text);
    }

    async fn listen(&self) -> String {
        String::new()
    }

    fn is_open(&self) -> bool {
        false
    }
}
