//! The bot controller: startup handshake, event loop and shutdown.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, RwLock};

use crate::chat::{
    ChatApi, ChatEvent, Channel, EventListener, NewChannel, Post, Team, User, UserPatch,
    CHANNEL_OPEN,
};
use crate::config::{BotConfig, ChannelConfig, Settings};
use crate::core::{accepts, BotSession, Command, CommandRouter, ReplySender};
use crate::error::{Error, Result};
use crate::mascot::{MascotController, MascotHost};

pub const STARTED_MESSAGE: &str = "_Bot has **started** running_";
pub const STOPPED_MESSAGE: &str = "_Bot has **stopped** running_";
pub const ALIVE_REPLY: &str = "I'm alive";
pub const GREETING: &str = "Hello!";
pub const INTRODUCTION: &str = "Hi! I'm Gopher!";
pub const NOT_UNDERSTOOD: &str = "I did not understand you!";

/// Gophers started by "whats gopher".
const SPAWN_BURST: usize = 5;

/// Lifecycle of the bot. `Stopped` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BotState {
    Starting,
    Connected,
    Listening,
    ShuttingDown,
    Stopped,
}

impl fmt::Display for BotState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BotState::Starting => "starting",
            BotState::Connected => "connected",
            BotState::Listening => "listening",
            BotState::ShuttingDown => "shutting down",
            BotState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

async fn set_state(state: &RwLock<BotState>, next: BotState) {
    let mut current = state.write().await;
    if *current != next {
        tracing::info!("Bot {} -> {}", *current, next);
        *current = next;
    }
}

/// Profile changes needed to make `user` match the configured bot identity.
fn profile_patch(user: &User, bot: &BotConfig) -> Option<UserPatch> {
    if user.username == bot.username
        && user.first_name == bot.first_name
        && user.last_name == bot.last_name
    {
        return None;
    }
    Some(UserPatch {
        username: Some(bot.username.clone()),
        first_name: Some(bot.first_name.clone()),
        last_name: Some(bot.last_name.clone()),
    })
}

async fn find_or_create_channel(
    api: &dyn ChatApi,
    team: &Team,
    wanted: &ChannelConfig,
) -> Result<Channel> {
    let channels = api.my_channels(&team.id).await?;
    if let Some(channel) = channels.into_iter().find(|c| c.name == wanted.name) {
        return Ok(channel);
    }

    let display_name = if wanted.display_name.is_empty() {
        wanted.name.clone()
    } else {
        wanted.display_name.clone()
    };
    let channel = api
        .create_channel(&NewChannel {
            team_id: team.id.clone(),
            name: wanted.name.clone(),
            display_name,
            purpose: wanted.purpose.clone(),
            channel_type: CHANNEL_OPEN.to_string(),
        })
        .await?;
    tracing::info!(
        "Looks like this might be the first run so we've created the channel {}",
        wanted.name
    );
    Ok(channel)
}

/// Health check, login, profile sync, team and channel discovery.
///
/// Any failure here is fatal for the bot.
pub async fn handshake(settings: &Settings, api: &dyn ChatApi) -> Result<BotSession> {
    let version = api.ping().await?;
    tracing::info!("Server detected and is running version {}", version);

    let mut user = api
        .login(&settings.bot.email, &settings.bot.password)
        .await?;
    tracing::info!(user_id = %user.id, "Logged in as {}", user.username);

    if let Some(patch) = profile_patch(&user, &settings.bot) {
        user = api.patch_user(&user.id, &patch).await?;
        tracing::info!("Looks like this might be the first run so we've updated the bot's account settings");
    }

    let team = api
        .my_teams()
        .await?
        .into_iter()
        .find(|t| t.name == settings.team)
        .ok_or_else(|| {
            Error::NotFound(format!(
                "We do not appear to be a member of the team '{}'",
                settings.team
            ))
        })?;

    let channel = find_or_create_channel(api, &team, &settings.channel).await?;

    let token = api
        .token()
        .ok_or_else(|| Error::other("No session token after login"))?;

    Ok(BotSession {
        user,
        team,
        channel,
        token,
        ws_url: settings.server.ws_url()?,
    })
}

pub struct Bot {
    session: BotSession,
    router: CommandRouter,
    replies: Arc<ReplySender>,
    mascots: MascotController,
    greeting_delay: Duration,
    state: Arc<RwLock<BotState>>,
}

impl Bot {
    /// Wire the components around an established session.
    pub fn new(
        session: BotSession,
        api: Arc<dyn ChatApi>,
        host: Arc<dyn MascotHost>,
        settings: &Settings,
    ) -> Result<Self> {
        let policy = settings.replies.retry_policy();
        if policy.is_unbounded() {
            tracing::debug!("Replies are retried until the server accepts them");
        }
        let replies = Arc::new(ReplySender::new(api, session.channel_id(), policy));
        let mascots = MascotController::new(host, replies.clone(), settings.mascot.max_instances);

        Ok(Self {
            session,
            router: CommandRouter::standard()?,
            replies,
            mascots,
            greeting_delay: settings.greeting_delay(),
            state: Arc::new(RwLock::new(BotState::Starting)),
        })
    }

    /// Run the startup handshake and announce the bot in its channel.
    pub async fn start(
        settings: &Settings,
        api: Arc<dyn ChatApi>,
        host: Arc<dyn MascotHost>,
    ) -> Result<Self> {
        let session = handshake(settings, api.as_ref()).await?;
        tracing::info!(
            channel = %session.channel.name,
            team = %session.team.name,
            "Watching channel"
        );

        let bot = Self::new(session, api, host, settings)?;
        bot.reply(STARTED_MESSAGE, None).await;
        Ok(bot)
    }

    pub async fn state(&self) -> BotState {
        *self.state.read().await
    }

    /// Connect the event stream and process events until `shutdown` resolves.
    pub async fn run<F>(&self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = EventListener::connect(&self.session.ws_url, &self.session.token).await?;
        set_state(&self.state, BotState::Connected).await;
        self.listen(listener, shutdown).await
    }

    /// Process events from `listener` one at a time.
    ///
    /// When `shutdown` resolves, a separate task closes the connection and
    /// posts the stopped announcement; the loop then returns, dropping any
    /// action still in flight. A connection that ends on its own is an error.
    pub async fn listen<F>(&self, mut listener: EventListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let handle = listener.handle();
        let (stopped_tx, mut stopped_rx) = oneshot::channel::<()>();

        let watcher = {
            let handle = handle.clone();
            let replies = self.replies.clone();
            let state = self.state.clone();
            tokio::spawn(async move {
                shutdown.await;
                set_state(&state, BotState::ShuttingDown).await;
                handle.close();
                if let Err(e) = replies.send(STOPPED_MESSAGE, None).await {
                    tracing::warn!("Failed to announce shutdown: {}", e);
                }
                let _ = stopped_tx.send(());
            })
        };

        set_state(&self.state, BotState::Listening).await;

        let result = loop {
            tokio::select! {
                biased;
                _ = &mut stopped_rx => break Ok(()),
                more = self.step(&mut listener) => {
                    if more {
                        continue;
                    }
                    if handle.is_closed() {
                        let _ = (&mut stopped_rx).await;
                        break Ok(());
                    }
                    watcher.abort();
                    break Err(Error::ConnectionClosed);
                }
            }
        };

        set_state(&self.state, BotState::Stopped).await;
        result
    }

    async fn step(&self, listener: &mut EventListener) -> bool {
        match listener.next_event().await {
            Some(event) => {
                self.handle_event(&event).await;
                true
            }
            None => false,
        }
    }

    /// Filter, route and execute one event. Returns the command that ran, or
    /// `None` if the event was not for us.
    pub async fn handle_event(&self, event: &ChatEvent) -> Option<Command> {
        if !accepts(&self.session, event) {
            return None;
        }

        tracing::debug!(seq = event.seq, "Responding to channel message");
        let Some(post) = event.post() else {
            tracing::warn!(seq = event.seq, "Posted event without a readable post");
            self.reply(NOT_UNDERSTOOD, None).await;
            return Some(Command::Unrecognized);
        };

        let command = self.router.route(&post.message);
        self.execute(command, &post).await;
        Some(command)
    }

    async fn execute(&self, command: Command, post: &Post) {
        let thread = Some(post.id.as_str()).filter(|id| !id.is_empty());
        match command {
            Command::QueryStatus => self.reply(ALIVE_REPLY, thread).await,
            Command::Shutdown => {
                self.mascots.terminate();
            }
            Command::Greet => self.reply(GREETING, None).await,
            Command::Jump => {
                self.mascots.jump();
            }
            Command::SpawnThenGreet => {
                // Launch failures are ignored.
                for _ in 0..SPAWN_BURST {
                    let _ = self.mascots.spawn().await;
                }
                tokio::time::sleep(self.greeting_delay).await;
                self.reply(INTRODUCTION, None).await;
            }
            Command::Spawn => {
                let _ = self.mascots.spawn().await;
            }
            Command::Unrecognized => self.reply(NOT_UNDERSTOOD, thread).await,
        }
    }

    async fn reply(&self, message: &str, thread: Option<&str>) {
        match self.replies.send(message, thread).await {
            Ok(delivery) => {
                tracing::debug!(post_id = %delivery.post.id, attempts = delivery.attempts, "Reply delivered")
            }
            Err(e) => tracing::warn!("Dropping reply '{}': {}", message, e),
        }
    }
}
