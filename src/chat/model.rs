//! Wire types for the chat server's REST and websocket APIs.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Channel type for a public ("open") channel.
pub const CHANNEL_OPEN: &str = "O";

/// Websocket event name for a new post.
pub const EVENT_POSTED: &str = "posted";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    pub id: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
}

/// Partial profile update; `None` fields are left untouched by the server.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct UserPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Team {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub display_name: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Channel {
    pub id: String,
    #[serde(default)]
    pub team_id: String,
    pub name: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub purpose: String,
    #[serde(default, rename = "type")]
    pub channel_type: String,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct NewChannel {
    pub team_id: String,
    pub name: String,
    pub display_name: String,
    pub purpose: String,
    #[serde(rename = "type")]
    pub channel_type: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Post {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub channel_id: String,
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub root_id: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub create_at: i64,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct NewPost {
    pub channel_id: String,
    pub message: String,
    /// Thread parent; empty for a top-level post.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub root_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    Posted,
    Other(String),
}

impl From<&str> for EventKind {
    fn from(name: &str) -> Self {
        match name {
            EVENT_POSTED => EventKind::Posted,
            other => EventKind::Other(other.to_string()),
        }
    }
}

/// One inbound real-time notification.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatEvent {
    pub channel_id: String,
    pub kind: EventKind,
    pub author_id: String,
    pub seq: i64,
    pub payload: Map<String, Value>,
}

impl ChatEvent {
    /// Decode the post embedded in a `posted` event. The server ships it as a
    /// JSON string under `data.post`.
    pub fn post(&self) -> Option<Post> {
        let raw = self.payload.get("post")?.as_str()?;
        serde_json::from_str(raw).ok()
    }
}

#[derive(Debug, Default, Deserialize)]
struct Broadcast {
    #[serde(default)]
    channel_id: String,
    #[serde(default)]
    user_id: String,
}

#[derive(Debug, Deserialize)]
struct WireEvent {
    event: String,
    #[serde(default)]
    seq: i64,
    #[serde(default)]
    channel_id: String,
    #[serde(default)]
    user_id: String,
    #[serde(default)]
    data: Map<String, Value>,
    #[serde(default)]
    broadcast: Broadcast,
}

/// Parse one websocket text frame. Returns `None` for action replies
/// (`{"status": "OK", "seq_reply": 1}`) and anything that is not an event.
pub fn parse_frame(text: &str) -> Option<ChatEvent> {
    let wire: WireEvent = serde_json::from_str(text).ok()?;

    let channel_id = first_non_empty([wire.channel_id, wire.broadcast.channel_id]);

    let post_author = wire
        .data
        .get("post")
        .and_then(Value::as_str)
        .and_then(|raw| serde_json::from_str::<Post>(raw).ok())
        .map(|p| p.user_id)
        .unwrap_or_default();
    let author_id = first_non_empty([wire.user_id, post_author, wire.broadcast.user_id]);

    Some(ChatEvent {
        channel_id,
        kind: EventKind::from(wire.event.as_str()),
        author_id,
        seq: wire.seq,
        payload: wire.data,
    })
}

fn first_non_empty<const N: usize>(candidates: [String; N]) -> String {
    candidates
        .into_iter()
        .find(|s| !s.is_empty())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn posted_frame(channel: &str, author: &str, message: &str) -> String {
        let post = json!({
            "id": "post1",
            "channel_id": channel,
            "user_id": author,
            "message": message,
        });
        json!({
            "event": "posted",
            "seq": 7,
            "data": {"post": post.to_string(), "channel_type": "O"},
            "broadcast": {"channel_id": channel, "user_id": "", "team_id": "t1"},
        })
        .to_string()
    }

    #[test]
    fn test_parse_posted_frame() {
        let event = parse_frame(&posted_frame("c1", "u1", "hello gopher")).unwrap();
        assert_eq!(event.kind, EventKind::Posted);
        assert_eq!(event.channel_id, "c1");
        assert_eq!(event.author_id, "u1");
        assert_eq!(event.seq, 7);

        let post = event.post().unwrap();
        assert_eq!(post.id, "post1");
        assert_eq!(post.message, "hello gopher");
    }

    #[test]
    fn test_parse_flat_frame() {
        let frame = json!({
            "event": "typing",
            "channel_id": "c9",
            "user_id": "u9",
            "data": {},
        })
        .to_string();

        let event = parse_frame(&frame).unwrap();
        assert_eq!(event.kind, EventKind::Other("typing".to_string()));
        assert_eq!(event.channel_id, "c9");
        assert_eq!(event.author_id, "u9");
        assert!(event.post().is_none());
    }

    #[test]
    fn test_action_reply_is_not_an_event() {
        assert!(parse_frame(r#"{"status":"OK","seq_reply":1}"#).is_none());
        assert!(parse_frame("not json").is_none());
    }

    #[test]
    fn test_malformed_post_payload() {
        let frame = json!({
            "event": "posted",
            "broadcast": {"channel_id": "c1", "user_id": "u2"},
            "data": {"post": "{broken"},
        })
        .to_string();

        let event = parse_frame(&frame).unwrap();
        assert_eq!(event.author_id, "u2");
        assert!(event.post().is_none());
    }

    #[test]
    fn test_new_post_omits_empty_root() {
        let post = NewPost {
            channel_id: "c1".to_string(),
            message: "hi".to_string(),
            root_id: String::new(),
        };
        let value = serde_json::to_value(&post).unwrap();
        assert!(value.get("root_id").is_none());
    }
}
