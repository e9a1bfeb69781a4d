//! Chat server integration: REST client, wire model and event stream.

pub mod client;
pub mod listener;
pub mod model;

pub use client::{ChatApi, ChatClient};
pub use listener::{EventListener, ListenerHandle};
pub use model::{
    parse_frame, Channel, ChatEvent, EventKind, NewChannel, NewPost, Post, Team, User, UserPatch,
    CHANNEL_OPEN,
};
