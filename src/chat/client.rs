//! REST client for the chat server.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::Serialize;
use std::sync::RwLock;
use url::Url;

use super::model::{Channel, NewChannel, NewPost, Post, Team, User, UserPatch};
use crate::error::{ApiError, Error, Result};

/// Calls the bot makes against the chat server.
#[async_trait]
pub trait ChatApi: Send + Sync {
    /// Health check. Returns the server version when it reports one.
    async fn ping(&self) -> Result<String>;

    /// Log in and remember the session token for later calls.
    async fn login(&self, login_id: &str, password: &str) -> Result<User>;

    /// Session token from the last successful login.
    fn token(&self) -> Option<String>;

    async fn patch_user(&self, user_id: &str, patch: &UserPatch) -> Result<User>;

    /// Teams the logged-in user belongs to.
    async fn my_teams(&self) -> Result<Vec<Team>>;

    /// Channels of `team_id` the logged-in user is a member of.
    async fn my_channels(&self, team_id: &str) -> Result<Vec<Channel>>;

    async fn create_channel(&self, channel: &NewChannel) -> Result<Channel>;

    async fn create_post(&self, post: &NewPost) -> Result<Post>;
}

/// `ChatApi` over the server's v4 HTTP API.
pub struct ChatClient {
    client: Client,
    base_url: Url,
    token: RwLock<Option<String>>,
}

#[derive(Serialize)]
struct LoginRequest<'a> {
    login_id: &'a str,
    password: &'a str,
}

impl ChatClient {
    pub fn new(base_url: Url) -> Self {
        Self {
            client: Client::new(),
            base_url,
            token: RwLock::new(None),
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/api/v4{}",
            self.base_url.as_str().trim_end_matches('/'),
            path
        )
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match self.token() {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response> {
        let response = self.authorized(request).send().await?;
        check_status(response).await
    }
}

/// Turn a non-2xx response into `Error::Api`, keeping whatever detail the
/// server put in the body.
async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let mut err: ApiError = serde_json::from_str(&body).unwrap_or_else(|_| ApiError {
        message: body.clone(),
        ..ApiError::default()
    });
    if err.status_code == 0 {
        err.status_code = status.as_u16();
    }
    if err.message.is_empty() {
        err.message = status.canonical_reason().unwrap_or("request failed").to_string();
    }
    Err(Error::Api(err))
}

#[async_trait]
impl ChatApi for ChatClient {
    async fn ping(&self) -> Result<String> {
        let response = self
            .send(self.client.get(self.endpoint("/system/ping")))
            .await?;

        let version = response
            .headers()
            .get("X-Version-Id")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let body: serde_json::Value = response.json().await?;
        if body.get("status").and_then(|s| s.as_str()) != Some("OK") {
            return Err(Error::other(format!("Server reported unhealthy status: {}", body)));
        }

        Ok(version
            .or_else(|| body.get("version").and_then(|v| v.as_str()).map(str::to_string))
            .unwrap_or_else(|| "unknown".to_string()))
    }

    async fn login(&self, login_id: &str, password: &str) -> Result<User> {
        let request = self
            .client
            .post(self.endpoint("/users/login"))
            .json(&LoginRequest { login_id, password });
        let response = check_status(request.send().await?).await?;

        let token = response
            .headers()
            .get("Token")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| Error::other("Login response carried no session token"))?;

        let user: User = response.json().await?;
        if let Ok(mut slot) = self.token.write() {
            *slot = Some(token);
        }
        Ok(user)
    }

    fn token(&self) -> Option<String> {
        self.token.read().ok().and_then(|t| t.clone())
    }

    async fn patch_user(&self, user_id: &str, patch: &UserPatch) -> Result<User> {
        let request = self
            .client
            .put(self.endpoint(&format!("/users/{}/patch", user_id)))
            .json(patch);
        Ok(self.send(request).await?.json().await?)
    }

    async fn my_teams(&self) -> Result<Vec<Team>> {
        let request = self.client.get(self.endpoint("/users/me/teams"));
        Ok(self.send(request).await?.json().await?)
    }

    async fn my_channels(&self, team_id: &str) -> Result<Vec<Channel>> {
        let request = self
            .client
            .get(self.endpoint(&format!("/users/me/teams/{}/channels", team_id)));
        Ok(self.send(request).await?.json().await?)
    }

    async fn create_channel(&self, channel: &NewChannel) -> Result<Channel> {
        let request = self.client.post(self.endpoint("/channels")).json(channel);
        Ok(self.send(request).await?.json().await?)
    }

    async fn create_post(&self, post: &NewPost) -> Result<Post> {
        let request = self.client.post(self.endpoint("/posts")).json(post);
        Ok(self.send(request).await?.json().await?)
    }
}
