//! Core module - session, command routing and reply delivery.
//!
//! This module contains the heart of bopher's message processing:
//! - The session value shared by every component
//! - Ordered command routing
//! - Reply delivery with retry

pub mod reply;
pub mod routing;
pub mod session;

pub use reply::{Delivery, ReplySender, RetryPolicy};
pub use routing::{accepts, Command, CommandRouter};
pub use session::BotSession;
