//! User prompts raised by the session
//!
//! Prompts are built on the network context but only ever shown on the
//! consumer context, through the [`Prompter`] collaborator.

use std::fmt;

/// Why a prompt was raised
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptKind {
    /// Connection dropped while in an active world
    ConnectionLost,
    /// Connection dropped before a world was ever joined
    ServerUnavailable,
}

/// A selectable choice on a prompt
pub struct PromptAction {
    pub label: String,
    run: Box<dyn FnOnce() + Send + 'static>,
}

impl PromptAction {
    pub fn new<F>(label: impl Into<String>, run: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            label: label.into(),
            run: Box::new(run),
        }
    }

    /// Execute the action. Must be called on the consumer context.
    pub fn invoke(self) {
        (self.run)()
    }
}

impl fmt::Debug for PromptAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PromptAction")
            .field("label", &self.label)
            .finish_non_exhaustive()
    }
}

/// A warning popup with one or more actions
#[derive(Debug)]
pub struct Prompt {
    pub kind: PromptKind,
    pub title: String,
    pub message: String,
    pub actions: Vec<PromptAction>,
}

impl Prompt {
    /// Take the action with the given label, if present
    pub fn take_action(&mut self, label: &str) -> Option<PromptAction> {
        let index = self.actions.iter().position(|a| a.label == label)?;
        Some(self.actions.remove(index))
    }

    pub fn labels(&self) -> Vec<&str> {
        self.actions.iter().map(|a| a.label.as_str()).collect()
    }
}

/// Presentation collaborator for prompts and menu navigation
pub trait Prompter: Send + Sync {
    /// Display a prompt; its actions run when the user picks one
    fn show(&self, prompt: Prompt);

    /// Return control to the menu shown before connecting
    fn return_to_menu(&self);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_take_action_by_label() {
        let hit = Arc::new(AtomicBool::new(false));
        let hit_clone = hit.clone();

        let mut prompt = Prompt {
            kind: PromptKind::ConnectionLost,
            title: "Connection Lost".into(),
            message: String::new(),
            actions: vec![
                PromptAction::new("Quit", || {}),
                PromptAction::new("Reconnect", move || hit_clone.store(true, Ordering::SeqCst)),
            ],
        };

        assert_eq!(prompt.labels(), vec!["Quit", "Reconnect"]);
        assert!(prompt.take_action("Missing").is_none());

        prompt.take_action("Reconnect").unwrap().invoke();
        assert!(hit.load(Ordering::SeqCst));
        assert_eq!(prompt.labels(), vec!["Quit"]);
    }
}
