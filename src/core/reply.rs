//! Outgoing chat replies with retry.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use crate::chat::{ChatApi, NewPost, Post};
use crate::error::{Error, Result};

/// How hard [`ReplySender::send`] tries before giving up.
///
/// The default has no attempt limit and no deadline: a reply is retried every
/// 200ms until the server takes it, which blocks the caller for as long as the
/// server is unreachable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub backoff: Duration,
    pub max_attempts: Option<u32>,
    pub deadline: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            backoff: Duration::from_millis(200),
            max_attempts: None,
            deadline: None,
        }
    }
}

impl RetryPolicy {
    pub fn is_unbounded(&self) -> bool {
        self.max_attempts.is_none() && self.deadline.is_none()
    }
}

/// Result of an accepted post.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub attempts: u32,
    pub post: Post,
}

/// Posts messages to the monitored channel.
pub struct ReplySender {
    api: Arc<dyn ChatApi>,
    channel_id: String,
    policy: RetryPolicy,
}

impl ReplySender {
    pub fn new(api: Arc<dyn ChatApi>, channel_id: impl Into<String>, policy: RetryPolicy) -> Self {
        Self {
            api,
            channel_id: channel_id.into(),
            policy,
        }
    }

    /// Post `message`, threaded under `reply_to` when given.
    ///
    /// Failed attempts are retried after `policy.backoff`. Under an unbounded
    /// policy this only returns once the post is accepted.
    pub async fn send(&self, message: &str, reply_to: Option<&str>) -> Result<Delivery> {
        let post = NewPost {
            channel_id: self.channel_id.clone(),
            message: message.to_string(),
            root_id: reply_to.unwrap_or_default().to_string(),
        };

        let started = Instant::now();
        let mut attempts = 0u32;
        loop {
            attempts += 1;
            match self.api.create_post(&post).await {
                Ok(created) => {
                    tracing::debug!(attempts, "Posted reply: {}", message);
                    return Ok(Delivery {
                        attempts,
                        post: created,
                    });
                }
                Err(e) => {
                    tracing::warn!(attempts, "Failed to post reply, retrying: {}", e);
                }
            }

            if self.policy.max_attempts.is_some_and(|max| attempts >= max) {
                return Err(Error::DeliveryAbandoned { attempts });
            }
            if let Some(deadline) = self.policy.deadline {
                if started.elapsed() + self.policy.backoff >= deadline {
                    return Err(Error::DeliveryAbandoned { attempts });
                }
            }

            tokio::time::sleep(self.policy.backoff).await;
        }
    }
}
