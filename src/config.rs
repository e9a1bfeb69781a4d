//! Configuration loading for bopher.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

use crate::core::reply::RetryPolicy;
use crate::error::{Error, Result};

/// Get the bopher home directory (~/.bopher).
pub fn get_home_dir() -> Result<PathBuf> {
    let home = directories::UserDirs::new()
        .ok_or_else(|| Error::Config("Could not determine home directory".to_string()))?;

    Ok(home.home_dir().join(".bopher"))
}

/// Get the default settings file path.
pub fn get_settings_path() -> Result<PathBuf> {
    Ok(get_home_dir()?.join("settings.json"))
}

/// Load settings from `path`, or from ~/.bopher/settings.json when `None`.
pub fn load_settings(path: Option<&Path>) -> Result<Settings> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => get_settings_path()?,
    };

    if !path.exists() {
        return Err(Error::Config(format!(
            "Settings file not found at {}. Run 'bopher init' first.",
            path.display()
        )));
    }

    let content = std::fs::read_to_string(&path)?;
    let settings: Settings = serde_json::from_str(&content)?;
    validate_settings(&settings)?;

    tracing::debug!("Loaded settings from {}", path.display());
    Ok(settings)
}

/// Write a settings template to `path`. Refuses to clobber unless `force`.
pub fn write_default_settings(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        return Err(Error::Config(format!(
            "{} already exists (use --force to overwrite)",
            path.display()
        )));
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, serde_json::to_string_pretty(&Settings::default())?)?;
    Ok(())
}

fn validate_settings(settings: &Settings) -> Result<()> {
    settings.server.http_url()?;
    settings.server.ws_url()?;

    if settings.bot.email.trim().is_empty() {
        return Err(Error::Config("bot.email must be set".to_string()));
    }
    if settings.bot.username.trim().is_empty() {
        return Err(Error::Config("bot.username must be set".to_string()));
    }
    if settings.team.trim().is_empty() {
        return Err(Error::Config("team must be set".to_string()));
    }
    if settings.channel.name.trim().is_empty() {
        return Err(Error::Config("channel.name must be set".to_string()));
    }
    if settings.mascot.program.trim().is_empty() {
        return Err(Error::Config("mascot.program must be set".to_string()));
    }
    if settings.mascot.max_instances == 0 {
        return Err(Error::Config(
            "mascot.max_instances must be at least 1".to_string(),
        ));
    }
    if settings.replies.backoff_ms == 0 {
        return Err(Error::Config("replies.backoff_ms must be positive".to_string()));
    }
    Ok(())
}

/// Top-level settings file.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Settings {
    pub server: ServerConfig,
    pub bot: BotConfig,
    pub team: String,
    pub channel: ChannelConfig,
    #[serde(default)]
    pub mascot: MascotConfig,
    #[serde(default)]
    pub replies: ReplyConfig,
    #[serde(default = "default_greeting_delay_ms")]
    pub greeting_delay_ms: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            bot: BotConfig::default(),
            team: String::new(),
            channel: ChannelConfig::default(),
            mascot: MascotConfig::default(),
            replies: ReplyConfig::default(),
            greeting_delay_ms: default_greeting_delay_ms(),
        }
    }
}

impl Settings {
    pub fn greeting_delay(&self) -> Duration {
        Duration::from_millis(self.greeting_delay_ms)
    }
}

fn default_greeting_delay_ms() -> u64 {
    5000
}

/// Chat server location.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ServerConfig {
    /// Base HTTP(S) URL, e.g. `https://chat.example.com`.
    pub url: String,
    /// Websocket endpoint; derived from `url` when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ws_url: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8065".to_string(),
            ws_url: None,
        }
    }
}

impl ServerConfig {
    pub fn http_url(&self) -> Result<Url> {
        let url = Url::parse(self.url.trim_end_matches('/'))?;
        match url.scheme() {
            "http" | "https" => Ok(url),
            other => Err(Error::Config(format!(
                "server.url must be http or https, got '{}'",
                other
            ))),
        }
    }

    pub fn ws_url(&self) -> Result<Url> {
        if let Some(ws) = &self.ws_url {
            return Ok(Url::parse(ws)?);
        }

        let mut url = self.http_url()?;
        let scheme = if url.scheme() == "https" { "wss" } else { "ws" };
        url.set_scheme(scheme)
            .map_err(|_| Error::Config(format!("Cannot derive websocket URL from {}", self.url)))?;
        let path = format!("{}/api/v4/websocket", url.path().trim_end_matches('/'));
        url.set_path(&path);
        Ok(url)
    }
}

/// The bot account and the profile it should carry.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct BotConfig {
    pub email: String,
    #[serde(default)]
    pub password: String,
    pub username: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
}

/// The monitored channel, created on first run if missing.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ChannelConfig {
    pub name: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub purpose: String,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            name: "gophers".to_string(),
            display_name: "Gophers".to_string(),
            purpose: "Talk to the desktop gophers".to_string(),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct MascotConfig {
    /// Mascot executable; `$VAR` and `~` are expanded.
    pub program: String,
    #[serde(default = "default_max_instances")]
    pub max_instances: usize,
}

impl Default for MascotConfig {
    fn default() -> Self {
        Self {
            program: "$HOME/go/bin/gopher".to_string(),
            max_instances: default_max_instances(),
        }
    }
}

impl MascotConfig {
    pub fn program_path(&self) -> Result<PathBuf> {
        let expanded = shellexpand::full(&self.program)
            .map_err(|e| Error::Config(format!("mascot.program: {}", e)))?;
        Ok(PathBuf::from(expanded.as_ref()))
    }
}

fn default_max_instances() -> usize {
    10
}

/// Delivery policy for outgoing chat replies.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ReplyConfig {
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_attempts: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline_ms: Option<u64>,
}

impl Default for ReplyConfig {
    fn default() -> Self {
        Self {
            backoff_ms: default_backoff_ms(),
            max_attempts: None,
            deadline_ms: None,
        }
    }
}

impl ReplyConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            backoff: Duration::from_millis(self.backoff_ms),
            max_attempts: self.max_attempts,
            deadline: self.deadline_ms.map(Duration::from_millis),
        }
    }
}

fn default_backoff_ms() -> u64 {
    200
}
