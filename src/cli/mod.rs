//! CLI commands for bopher using clap.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

use crate::bot::Bot;
use crate::chat::{ChatApi, ChatClient};
use crate::config::{get_settings_path, load_settings, write_default_settings, Settings};
use crate::mascot::{MascotHost, SystemHost};

/// bopher - summon desktop gophers from your team chat.
#[derive(Parser, Debug)]
#[command(name = "bopher")]
#[command(version)]
#[command(about = "Mattermost bot that summons, jumps and dismisses desktop gophers", long_about = None)]
pub struct Commands {
    /// Settings file (default: ~/.bopher/settings.json)
    #[arg(long, short, global = true, env = "BOPHER_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log filter such as `debug` or `info,bopher::chat=trace` (overrides RUST_LOG)
    #[arg(long, global = true, env = "BOPHER_LOG")]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Connect to the chat server and answer commands until interrupted
    Run {
        /// Bot password, overriding the settings file
        #[arg(long, env = "BOPHER_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },

    /// Check that the chat server is up
    Ping,

    /// List running gophers
    Gophers,

    /// Write a settings template
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

impl Commands {
    /// Run the command.
    pub async fn run(&self) -> Result<()> {
        match &self.command {
            Command::Run { password } => cmd_run(self.config.as_deref(), password.as_deref()).await,
            Command::Ping => cmd_ping(self.config.as_deref()).await,
            Command::Gophers => cmd_gophers(self.config.as_deref()),
            Command::Init { force } => cmd_init(self.config.as_deref(), *force),
        }
    }
}

fn settings_with_password(
    config: Option<&std::path::Path>,
    password: Option<&str>,
) -> Result<Settings> {
    let mut settings = load_settings(config)?;
    if let Some(password) = password {
        settings.bot.password = password.to_string();
    }
    Ok(settings)
}

fn mascot_host(settings: &Settings) -> Result<Arc<dyn MascotHost>> {
    let program = settings.mascot.program_path()?;
    tracing::debug!("Gopher program: {}", program.display());
    Ok(Arc::new(SystemHost::new(program)))
}

async fn cmd_run(config: Option<&std::path::Path>, password: Option<&str>) -> Result<()> {
    let settings = settings_with_password(config, password)?;
    tracing::info!("Ping: {}", settings.server.url);

    let api: Arc<dyn ChatApi> = Arc::new(ChatClient::new(settings.server.http_url()?));
    let host = mascot_host(&settings)?;

    let bot = Bot::start(&settings, api, host)
        .await
        .context("Startup failed")?;

    bot.run(async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for interrupt: {}", e);
            std::future::pending::<()>().await;
        }
        tracing::info!("Interrupt received");
    })
    .await?;

    Ok(())
}

async fn cmd_ping(config: Option<&std::path::Path>) -> Result<()> {
    let settings = load_settings(config)?;
    let client = ChatClient::new(settings.server.http_url()?);

    let version = client
        .ping()
        .await
        .context("There was a problem pinging the chat server. Are you sure it's running?")?;
    println!("Server detected and is running version {}", version);
    Ok(())
}

fn cmd_gophers(config: Option<&std::path::Path>) -> Result<()> {
    let settings = load_settings(config)?;
    let gophers = mascot_host(&settings)?.lookup();

    if gophers.is_empty() {
        println!("No gophers running.");
        return Ok(());
    }

    println!(
        "{} gopher(s) running (max {}):",
        gophers.len(),
        settings.mascot.max_instances
    );
    for gopher in gophers {
        println!(
            "  pid {:<8} since {}",
            gopher.pid,
            gopher.started_at.format("%Y-%m-%d %H:%M:%S UTC")
        );
    }
    Ok(())
}

fn cmd_init(config: Option<&std::path::Path>, force: bool) -> Result<()> {
    let path = match config {
        Some(p) => p.to_path_buf(),
        None => get_settings_path()?,
    };
    write_default_settings(&path, force)?;
    println!("Wrote settings template to {}", path.display());
    println!("Fill in bot.email, bot.password, bot.username and team, then run 'bopher run'.");
    Ok(())
}
