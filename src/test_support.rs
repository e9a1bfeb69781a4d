//! In-memory stand-ins for the chat server and the mascot host.

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use tokio::time::Instant;
use url::Url;

use crate::chat::{
    ChatApi, ChatEvent, Channel, EventKind, ListenerHandle, NewChannel, NewPost, Post, Team, User,
    UserPatch,
};
use crate::core::BotSession;
use crate::error::{ApiError, Error, Result};
use crate::mascot::{MascotHost, MascotProcess};

fn unavailable() -> Error {
    Error::Api(ApiError {
        id: "api.context.unavailable".to_string(),
        message: "Service unavailable".to_string(),
        detailed_error: String::new(),
        status_code: 503,
    })
}

#[derive(Default)]
struct ChatState {
    posts: Vec<NewPost>,
    attempt_times: Vec<Instant>,
    failing_posts: usize,
    created_channels: Vec<NewChannel>,
    patches: Vec<UserPatch>,
    listener: Option<ListenerHandle>,
    closed_at_attempt: Vec<bool>,
}

/// Records everything the bot sends.
pub struct FakeChat {
    pub user: User,
    pub teams: Vec<Team>,
    pub channels: Vec<Channel>,
    pub ping_ok: bool,
    state: Mutex<ChatState>,
}

impl FakeChat {
    pub fn new() -> Self {
        Self {
            user: User {
                id: "bot-1".to_string(),
                username: "bopher".to_string(),
                email: "bot@example.com".to_string(),
                first_name: "Bo".to_string(),
                last_name: "Pher".to_string(),
            },
            teams: vec![Team {
                id: "team-1".to_string(),
                name: "gophers".to_string(),
                display_name: "Gophers".to_string(),
            }],
            channels: vec![Channel {
                id: "chan-1".to_string(),
                team_id: "team-1".to_string(),
                name: "burrow".to_string(),
                ..Channel::default()
            }],
            ping_ok: true,
            state: Mutex::new(ChatState::default()),
        }
    }

    /// Make the next `n` post attempts fail.
    pub fn fail_next_posts(&self, n: usize) {
        self.state.lock().unwrap().failing_posts = n;
    }

    /// Posts the server accepted, in order.
    pub fn posts(&self) -> Vec<NewPost> {
        self.state.lock().unwrap().posts.clone()
    }

    pub fn messages(&self) -> Vec<String> {
        self.posts().into_iter().map(|p| p.message).collect()
    }

    pub fn post_attempts(&self) -> usize {
        self.state.lock().unwrap().attempt_times.len()
    }

    pub fn attempt_times(&self) -> Vec<Instant> {
        self.state.lock().unwrap().attempt_times.clone()
    }

    /// Record whether `handle` was closed at each later post attempt.
    pub fn observe_listener(&self, handle: ListenerHandle) {
        self.state.lock().unwrap().listener = Some(handle);
    }

    pub fn listener_closed_at_attempts(&self) -> Vec<bool> {
        self.state.lock().unwrap().closed_at_attempt.clone()
    }

    pub fn created_channels(&self) -> Vec<NewChannel> {
        self.state.lock().unwrap().created_channels.clone()
    }

    pub fn patches(&self) -> Vec<UserPatch> {
        self.state.lock().unwrap().patches.clone()
    }
}

#[async_trait]
impl ChatApi for FakeChat {
    async fn ping(&self) -> Result<String> {
        if self.ping_ok {
            Ok("9.11.0".to_string())
        } else {
            Err(unavailable())
        }
    }

    async fn login(&self, _login_id: &str, _password: &str) -> Result<User> {
        Ok(self.user.clone())
    }

    fn token(&self) -> Option<String> {
        Some("token-1".to_string())
    }

    async fn patch_user(&self, user_id: &str, patch: &UserPatch) -> Result<User> {
        self.state.lock().unwrap().patches.push(patch.clone());
        let mut user = self.user.clone();
        user.id = user_id.to_string();
        if let Some(username) = &patch.username {
            user.username = username.clone();
        }
        if let Some(first) = &patch.first_name {
            user.first_name = first.clone();
        }
        if let Some(last) = &patch.last_name {
            user.last_name = last.clone();
        }
        Ok(user)
    }

    async fn my_teams(&self) -> Result<Vec<Team>> {
        Ok(self.teams.clone())
    }

    async fn my_channels(&self, team_id: &str) -> Result<Vec<Channel>> {
        Ok(self
            .channels
            .iter()
            .filter(|c| c.team_id == team_id)
            .cloned()
            .collect())
    }

    async fn create_channel(&self, channel: &NewChannel) -> Result<Channel> {
        self.state
            .lock()
            .unwrap()
            .created_channels
            .push(channel.clone());
        Ok(Channel {
            id: "chan-new".to_string(),
            team_id: channel.team_id.clone(),
            name: channel.name.clone(),
            display_name: channel.display_name.clone(),
            purpose: channel.purpose.clone(),
            channel_type: channel.channel_type.clone(),
        })
    }

    async fn create_post(&self, post: &NewPost) -> Result<Post> {
        let mut state = self.state.lock().unwrap();
        state.attempt_times.push(Instant::now());
        if let Some(closed) = state.listener.as_ref().map(ListenerHandle::is_closed) {
            state.closed_at_attempt.push(closed);
        }
        if state.failing_posts > 0 {
            state.failing_posts -= 1;
            return Err(unavailable());
        }
        state.posts.push(post.clone());
        Ok(Post {
            id: format!("post-{}", state.posts.len()),
            channel_id: post.channel_id.clone(),
            user_id: self.user.id.clone(),
            root_id: post.root_id.clone(),
            message: post.message.clone(),
            create_at: 0,
        })
    }
}

/// Mascot host with a configurable live count.
#[derive(Default)]
pub struct FakeHost {
    live: AtomicUsize,
    launches: AtomicUsize,
    grow_on_launch: AtomicBool,
    fail_launches: AtomicBool,
    jumped: Mutex<Vec<u32>>,
    terminated: Mutex<Vec<u32>>,
}

impl FakeHost {
    pub fn with_live(live: usize) -> Self {
        let host = Self::default();
        host.live.store(live, Ordering::SeqCst);
        host
    }

    /// Count each launch as a new live mascot.
    pub fn grow_on_launch(&self, grow: bool) {
        self.grow_on_launch.store(grow, Ordering::SeqCst);
    }

    pub fn fail_launches(&self, fail: bool) {
        self.fail_launches.store(fail, Ordering::SeqCst);
    }

    pub fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }

    pub fn jumped(&self) -> Vec<u32> {
        self.jumped.lock().unwrap().clone()
    }

    pub fn terminated(&self) -> Vec<u32> {
        self.terminated.lock().unwrap().clone()
    }
}

impl MascotHost for FakeHost {
    fn lookup(&self) -> Vec<MascotProcess> {
        (0..self.live.load(Ordering::SeqCst))
            .map(|i| MascotProcess {
                pid: 1000 + i as u32,
                started_at: chrono::Utc::now(),
            })
            .collect()
    }

    fn launch(&self) -> std::io::Result<()> {
        if self.fail_launches.load(Ordering::SeqCst) {
            return Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "gopher: no such file",
            ));
        }
        self.launches.fetch_add(1, Ordering::SeqCst);
        if self.grow_on_launch.load(Ordering::SeqCst) {
            self.live.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    fn jump(&self, mascot: &MascotProcess) -> bool {
        self.jumped.lock().unwrap().push(mascot.pid);
        true
    }

    fn terminate(&self, mascot: &MascotProcess) -> bool {
        self.terminated.lock().unwrap().push(mascot.pid);
        true
    }
}

/// Session for bot `bot-1` watching channel `chan-1`.
pub fn session() -> BotSession {
    BotSession {
        user: User {
            id: "bot-1".to_string(),
            username: "bopher".to_string(),
            ..User::default()
        },
        team: Team {
            id: "team-1".to_string(),
            name: "gophers".to_string(),
            display_name: String::new(),
        },
        channel: Channel {
            id: "chan-1".to_string(),
            team_id: "team-1".to_string(),
            name: "burrow".to_string(),
            ..Channel::default()
        },
        token: "token-1".to_string(),
        ws_url: Url::parse("ws://localhost:8065/api/v4/websocket").unwrap(),
    }
}

/// A `posted` event carrying `message`.
pub fn posted_event(channel_id: &str, author_id: &str, message: &str) -> ChatEvent {
    let post = json!({
        "id": "p1",
        "channel_id": channel_id,
        "user_id": author_id,
        "message": message,
    });
    let mut payload = Map::new();
    payload.insert("post".to_string(), Value::String(post.to_string()));
    ChatEvent {
        channel_id: channel_id.to_string(),
        kind: EventKind::Posted,
        author_id: author_id.to_string(),
        seq: 1,
        payload,
    }
}
