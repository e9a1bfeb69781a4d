//! Bot session established at startup.

use url::Url;

use crate::chat::{Channel, Team, User};

/// Who the bot is, where it listens, and how it reaches the server.
///
/// Built once by the startup handshake and read-only afterwards.
#[derive(Debug, Clone)]
pub struct BotSession {
    pub user: User,
    pub team: Team,
    pub channel: Channel,
    pub token: String,
    pub ws_url: Url,
}

impl BotSession {
    /// Id of the monitored channel.
    pub fn channel_id(&self) -> &str {
        &self.channel.id
    }

    /// Author id of the bot's own posts.
    pub fn self_id(&self) -> &str {
        &self.user.id
    }
}
