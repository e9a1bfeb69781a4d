//! Command routing for bopher.
//!
//! Handles:
//! - Event filtering (monitored channel, posted events, not our own posts)
//! - Mapping message text to a [`Command`] with ordered, first-match-wins rules

use regex::Regex;

use crate::chat::{ChatEvent, EventKind};
use crate::core::session::BotSession;
use crate::error::{Error, Result};

/// Recognized intent of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    QueryStatus,
    Shutdown,
    Greet,
    Jump,
    Spawn,
    SpawnThenGreet,
    Unrecognized,
}

/// Phrases checked in order. Multi-word phrases containing "gopher" must come
/// before the bare `gopher` rule, which would otherwise shadow them.
pub const DEFAULT_RULES: &[(&str, Command)] = &[
    ("alive", Command::QueryStatus),
    ("bye gopher", Command::Shutdown),
    ("hello gopher", Command::Greet),
    ("jump gopher", Command::Jump),
    ("whats gopher", Command::SpawnThenGreet),
    ("gopher", Command::Spawn),
];

/// One phrase and the command it selects.
#[derive(Debug, Clone)]
pub struct Rule {
    phrase: String,
    pattern: Regex,
    command: Command,
}

impl Rule {
    /// Word-bounded, case-sensitive match on `phrase`.
    pub fn new(phrase: &str, command: Command) -> Result<Self> {
        let pattern = Regex::new(&format!(r"(?:^|\W){}(?:$|\W)", regex::escape(phrase)))
            .map_err(|e| Error::Config(format!("Bad command phrase '{}': {}", phrase, e)))?;
        Ok(Self {
            phrase: phrase.to_string(),
            pattern,
            command,
        })
    }

    pub fn phrase(&self) -> &str {
        &self.phrase
    }

    pub fn command(&self) -> Command {
        self.command
    }

    pub fn matches(&self, text: &str) -> bool {
        self.pattern.is_match(text)
    }
}

/// Ordered rule list.
#[derive(Debug, Clone)]
pub struct CommandRouter {
    rules: Vec<Rule>,
}

impl CommandRouter {
    pub fn new(rules: &[(&str, Command)]) -> Result<Self> {
        let rules = rules
            .iter()
            .map(|(phrase, command)| Rule::new(phrase, *command))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { rules })
    }

    /// Router over [`DEFAULT_RULES`].
    pub fn standard() -> Result<Self> {
        Self::new(DEFAULT_RULES)
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// Command of the first rule matching `text`.
    pub fn route(&self, text: &str) -> Command {
        self.rules
            .iter()
            .find(|rule| rule.matches(text))
            .map(Rule::command)
            .unwrap_or(Command::Unrecognized)
    }
}

/// Whether `event` is something the bot should answer: a new post on the
/// monitored channel written by someone else.
pub fn accepts(session: &BotSession, event: &ChatEvent) -> bool {
    if event.channel_id != session.channel_id() {
        return false;
    }
    if event.kind != EventKind::Posted {
        return false;
    }
    event.author_id != session.self_id()
}
