//! Console front end: prompts, commands and the stdin reader

use std::io::BufRead;

use outpost_core::{Prompt, PromptAction, Prompter};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Something typed at the console
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Say(String),
    Connect,
    Disconnect,
    Reconnect,
    Status,
    Help,
    Quit,
    Unknown(String),
}

impl Command {
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }

        let (word, rest) = match line.split_once(char::is_whitespace) {
            Some((word, rest)) => (word, rest.trim()),
            None => (line, ""),
        };

        let command = match word.to_ascii_lowercase().as_str() {
            "say" if !rest.is_empty() => Command::Say(rest.to_string()),
            "connect" => Command::Connect,
            "disconnect" => Command::Disconnect,
            "reconnect" => Command::Reconnect,
            "status" => Command::Status,
            "help" | "?" => Command::Help,
            "quit" | "exit" => Command::Quit,
            _ => Command::Unknown(line.to_string()),
        };
        Some(command)
    }
}

pub const HELP: &str = "\
Commands:
  say <text>   send a chat message
  connect      connect to the configured server
  disconnect   leave the server
  reconnect    drop the connection and connect again
  status       show the session state
  quit         exit";

/// Prints prompts and holds the one awaiting an answer
#[derive(Default)]
pub struct ConsolePrompter {
    pending: Mutex<Option<Prompt>>,
}

impl ConsolePrompter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_pending(&self) -> bool {
        self.pending.lock().is_some()
    }

    /// Resolve the pending prompt from user input.
    ///
    /// Accepts an action label (any case) or its 1-based number. The
    /// returned action must be invoked after this call, outside the lock.
    pub fn choose(&self, input: &str) -> Option<PromptAction> {
        let input = input.trim();
        let mut pending = self.pending.lock();
        let prompt = pending.as_mut()?;

        let index = match input.parse::<usize>() {
            Ok(n) if (1..=prompt.actions.len()).contains(&n) => n - 1,
            _ => prompt
                .actions
                .iter()
                .position(|a| a.label.eq_ignore_ascii_case(input))?,
        };

        let mut prompt = pending.take()?;
        Some(prompt.actions.swap_remove(index))
    }
}

impl Prompter for ConsolePrompter {
    fn show(&self, prompt: Prompt) {
        println!();
        println!("== {} ==", prompt.title);
        println!("{}", prompt.message);
        for (i, label) in prompt.labels().iter().enumerate() {
            println!("  [{}] {}", i + 1, label);
        }

        if let Some(previous) = self.pending.lock().replace(prompt) {
            debug!(title = %previous.title, "Replacing unanswered prompt");
        }
    }

    fn return_to_menu(&self) {
        println!("Back at the main menu. Type 'connect' to try again.");
    }
}

/// Read stdin lines on a dedicated thread. The channel closes on EOF.
pub fn spawn_reader() -> std::io::Result<mpsc::UnboundedReceiver<String>> {
    let (tx, rx) = mpsc::unbounded_channel();

    std::thread::Builder::new()
        .name("stdin".into())
        .spawn(move || {
            for line in std::io::stdin().lock().lines() {
                match line {
                    Ok(line) => {
                        if tx.send(line).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "Failed to read stdin");
                        break;
                    }
                }
            }
        })?;

    Ok(rx)
}
