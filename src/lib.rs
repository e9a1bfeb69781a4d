//! bopher library root.

pub mod bot;
pub mod chat;
pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod logging;
pub mod mascot;

#[cfg(test)]
pub(crate) mod test_support;

pub use bot::{Bot, BotState};
pub use cli::Commands;
pub use config::{load_settings, Settings};
pub use crate::core::{BotSession, Command, CommandRouter, ReplySender, RetryPolicy};
pub use error::{Error, Result};
pub use mascot::{MascotController, MascotHost, MascotProcess, SpawnOutcome, SystemHost};
