//! Outpost Core Library
//!
//! Consumer-side collaborators of the client session: configuration,
//! the consumer-context dispatch queue, world state and prompts.

pub mod config;
pub mod dispatch;
pub mod error;
pub mod prompt;
pub mod world;

pub use config::{ClientConfig, ClientSection, LogSection, ServerSection};
pub use dispatch::{DispatchQueue, Dispatcher};
pub use error::{Error, Result};
pub use prompt::{Prompt, PromptAction, PromptKind, Prompter};
pub use world::{SimulatedWorld, World};
