//! Discord REST client.
//!
//! Only the handful of endpoints the publisher needs are covered. Requests
//! that hit a rate limit are retried after the delay Discord asks for.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use reqwest::{Client, Method, Response, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use super::{
    thread_name, Channel, ChannelKind, Message, MessageRef, OutgoingMessage, Platform,
    ThreadHandle,
};
use crate::error::{Result, SlapperError};

/// Default REST API root.
pub const DEFAULT_API_BASE_URL: &str = "https://discord.com/api/v10";

/// Connect timeout in seconds.
const CONNECT_TIMEOUT_SECS: u64 = 10;

/// Total timeout in seconds.
const TOTAL_TIMEOUT_SECS: u64 = 30;

/// Retries after a 429 before giving up.
const MAX_RATE_LIMIT_RETRIES: u32 = 3;

/// Page size of the guild member listing (API maximum).
const MEMBER_PAGE_SIZE: usize = 1000;

/// Minutes of inactivity before a new thread is archived (one week).
const AUTO_ARCHIVE_MINUTES: u32 = 10080;

const USER_AGENT: &str = concat!("DiscordBot (threadslapper, ", env!("CARGO_PKG_VERSION"), ")");

// Channel type codes.
const GUILD_TEXT: u8 = 0;
const GUILD_ANNOUNCEMENT: u8 = 5;
const GUILD_FORUM: u8 = 15;
const GUILD_MEDIA: u8 = 16;

#[derive(Debug, Deserialize)]
struct ChannelPayload {
    id: String,
    #[serde(rename = "type")]
    kind: u8,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    guild_id: Option<String>,
    #[serde(default)]
    parent_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MessagePayload {
    id: String,
    channel_id: String,
    #[serde(default)]
    content: String,
}

#[derive(Debug, Deserialize)]
struct ActiveThreadsPayload {
    #[serde(default)]
    threads: Vec<ChannelPayload>,
}

#[derive(Debug, Deserialize)]
struct MemberPayload {
    #[serde(default)]
    user: Option<UserPayload>,
    #[serde(default)]
    roles: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct UserPayload {
    id: String,
}

#[derive(Debug, Deserialize)]
struct RateLimitPayload {
    retry_after: f64,
}

fn parse_id(raw: &str) -> Result<u64> {
    raw.parse()
        .map_err(|_| SlapperError::Platform(format!("invalid snowflake: {:?}", raw)))
}

fn parse_optional_id(raw: Option<&str>) -> Result<Option<u64>> {
    raw.map(parse_id).transpose()
}

fn channel_kind(code: u8) -> ChannelKind {
    match code {
        GUILD_TEXT | GUILD_ANNOUNCEMENT => ChannelKind::Linear,
        GUILD_FORUM | GUILD_MEDIA => ChannelKind::Forum,
        other => ChannelKind::Unsupported(other),
    }
}

impl MessagePayload {
    fn into_message(self) -> Result<Message> {
        Ok(Message {
            id: parse_id(&self.id)?,
            channel_id: parse_id(&self.channel_id)?,
            content: self.content,
        })
    }
}

impl ChannelPayload {
    fn into_thread(self, fallback_guild: Option<u64>, parent_kind: ChannelKind) -> Result<ThreadHandle> {
        let id = parse_id(&self.id)?;
        let parent = parse_optional_id(self.parent_id.as_deref())?;
        // The starter message shares the thread's id. Forum posts keep it
        // inside the thread, text threads in the parent channel.
        let starting_message = match (parent_kind, parent) {
            (ChannelKind::Forum, _) => Some(MessageRef {
                channel_id: id,
                message_id: id,
            }),
            (_, Some(parent)) => Some(MessageRef {
                channel_id: parent,
                message_id: id,
            }),
            _ => None,
        };
        Ok(ThreadHandle {
            id,
            name: self.name.unwrap_or_default(),
            guild_id: parse_optional_id(self.guild_id.as_deref())?.or(fallback_guild),
            starting_message,
        })
    }
}

fn message_body(message: &OutgoingMessage) -> Value {
    let mut body = json!({ "content": message.content });
    if let Some(embed) = &message.embed {
        body["embeds"] = json!([embed]);
    }
    if let Some(reference) = message.reference {
        body["message_reference"] = json!({
            "message_id": reference.message_id.to_string(),
            "channel_id": reference.channel_id.to_string(),
            "fail_if_not_exists": false,
        });
    }
    body
}

/// Discord REST API client authenticated as a bot.
pub struct DiscordClient {
    client: Client,
    base_url: String,
    token: SecretString,
}

impl DiscordClient {
    /// Create a client for the API rooted at `base_url`.
    pub fn new(token: SecretString, base_url: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .timeout(Duration::from_secs(TOTAL_TIMEOUT_SECS))
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| {
                SlapperError::Platform(format!("failed to create HTTP client: {}", e))
            })?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
        })
    }

    /// Send a request, waiting out rate limits.
    async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
        reason: Option<&str>,
    ) -> Result<Response> {
        let url = format!("{}{}", self.base_url, path);
        let mut attempt = 0;

        loop {
            let mut request = self
                .client
                .request(method.clone(), &url)
                .header(AUTHORIZATION, format!("Bot {}", self.token.expose_secret()));
            if let Some(reason) = reason {
                request = request.header("X-Audit-Log-Reason", urlencoding::encode(reason).into_owned());
            }
            if let Some(body) = body {
                request = request.json(body);
            }

            let response = request
                .send()
                .await
                .map_err(|e| SlapperError::Platform(format!("{} {}: {}", method, path, e)))?;

            if response.status() != StatusCode::TOO_MANY_REQUESTS || attempt >= MAX_RATE_LIMIT_RETRIES {
                return Ok(response);
            }

            attempt += 1;
            let wait = response
                .json::<RateLimitPayload>()
                .await
                .map(|r| Duration::from_secs_f64(r.retry_after.max(0.0)))
                .unwrap_or(Duration::from_secs(1));
            warn!(
                "{} {}: rate limited, retrying in {:.2}s ({}/{})",
                method,
                path,
                wait.as_secs_f64(),
                attempt,
                MAX_RATE_LIMIT_RETRIES
            );
            tokio::time::sleep(wait).await;
        }
    }

    /// Send a request and fail on any non-success status.
    async fn execute(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
        reason: Option<&str>,
    ) -> Result<Response> {
        let response = self.request(method.clone(), path, body, reason).await?;
        ensure_success(response, &method, path).await
    }

    async fn execute_json<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
        reason: Option<&str>,
    ) -> Result<T> {
        self.execute(method.clone(), path, body, reason)
            .await?
            .json()
            .await
            .map_err(|e| SlapperError::Platform(format!("{} {}: bad response body: {}", method, path, e)))
    }
}

async fn ensure_success(response: Response, method: &Method, path: &str) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(SlapperError::Platform(format!(
        "{} {} failed with {}: {}",
        method, path, status, body
    )))
}

#[async_trait]
impl Platform for DiscordClient {
    async fn get_channel(&self, id: u64) -> Result<Option<Channel>> {
        let path = format!("/channels/{}", id);
        let response = self.request(Method::GET, &path, None, None).await?;
        if matches!(
            response.status(),
            StatusCode::NOT_FOUND | StatusCode::FORBIDDEN
        ) {
            debug!("channel {} is not visible ({})", id, response.status());
            return Ok(None);
        }

        let payload: ChannelPayload = ensure_success(response, &Method::GET, &path)
            .await?
            .json()
            .await
            .map_err(|e| SlapperError::Platform(format!("GET {}: bad response body: {}", path, e)))?;

        Ok(Some(Channel {
            id: parse_id(&payload.id)?,
            name: payload.name.unwrap_or_default(),
            guild_id: parse_optional_id(payload.guild_id.as_deref())?,
            kind: channel_kind(payload.kind),
        }))
    }

    async fn list_threads(&self, channel: &Channel) -> Result<Vec<ThreadHandle>> {
        let Some(guild_id) = channel.guild_id else {
            return Ok(Vec::new());
        };
        let path = format!("/guilds/{}/threads/active", guild_id);
        let payload: ActiveThreadsPayload =
            self.execute_json(Method::GET, &path, None, None).await?;

        let parent = channel.id.to_string();
        payload
            .threads
            .into_iter()
            .filter(|t| t.parent_id.as_deref() == Some(parent.as_str()))
            .map(|t| t.into_thread(Some(guild_id), channel.kind))
            .collect()
    }

    async fn send_message(&self, channel_id: u64, message: &OutgoingMessage) -> Result<Message> {
        let path = format!("/channels/{}/messages", channel_id);
        let payload: MessagePayload = self
            .execute_json(Method::POST, &path, Some(&message_body(message)), None)
            .await?;
        payload.into_message()
    }

    async fn start_thread(
        &self,
        channel: &Channel,
        message_id: u64,
        name: &str,
        reason: &str,
    ) -> Result<ThreadHandle> {
        let path = format!("/channels/{}/messages/{}/threads", channel.id, message_id);
        let body = json!({ "name": thread_name(name), "auto_archive_duration": AUTO_ARCHIVE_MINUTES });
        let payload: ChannelPayload = self
            .execute_json(Method::POST, &path, Some(&body), Some(reason))
            .await?;

        let mut thread = payload.into_thread(channel.guild_id, channel.kind)?;
        thread.starting_message = Some(MessageRef {
            channel_id: channel.id,
            message_id,
        });
        Ok(thread)
    }

    async fn create_forum_post(
        &self,
        channel: &Channel,
        name: &str,
        message: &OutgoingMessage,
        reason: &str,
    ) -> Result<ThreadHandle> {
        let path = format!("/channels/{}/threads", channel.id);
        let body = json!({
            "name": thread_name(name),
            "auto_archive_duration": AUTO_ARCHIVE_MINUTES,
            "message": message_body(message),
        });
        let payload: ChannelPayload = self
            .execute_json(Method::POST, &path, Some(&body), Some(reason))
            .await?;
        payload.into_thread(channel.guild_id, ChannelKind::Forum)
    }

    async fn join_thread(&self, thread_id: u64) -> Result<()> {
        let path = format!("/channels/{}/thread-members/@me", thread_id);
        self.execute(Method::PUT, &path, None, None).await?;
        Ok(())
    }

    async fn pin_message(&self, message: MessageRef) -> Result<()> {
        let path = format!("/channels/{}/pins/{}", message.channel_id, message.message_id);
        self.execute(Method::PUT, &path, None, None).await?;
        Ok(())
    }

    async fn crosspost_message(&self, message: MessageRef) -> Result<()> {
        let path = format!(
            "/channels/{}/messages/{}/crosspost",
            message.channel_id, message.message_id
        );
        self.execute(Method::POST, &path, None, None).await?;
        Ok(())
    }

    async fn last_message(&self, channel_id: u64) -> Result<Option<Message>> {
        let path = format!("/channels/{}/messages?limit=1", channel_id);
        let payload: Vec<MessagePayload> = self.execute_json(Method::GET, &path, None, None).await?;
        payload.into_iter().next().map(MessagePayload::into_message).transpose()
    }

    async fn role_members(&self, guild_id: u64, role_id: u64) -> Result<Vec<u64>> {
        let role = role_id.to_string();
        let mut members = Vec::new();
        let mut after = 0u64;

        loop {
            let path = format!(
                "/guilds/{}/members?limit={}&after={}",
                guild_id, MEMBER_PAGE_SIZE, after
            );
            let page: Vec<MemberPayload> = self.execute_json(Method::GET, &path, None, None).await?;
            let page_len = page.len();

            for member in page {
                let Some(user) = member.user else { continue };
                let user_id = parse_id(&user.id)?;
                after = after.max(user_id);
                if member.roles.iter().any(|r| *r == role) {
                    members.push(user_id);
                }
            }

            if page_len < MEMBER_PAGE_SIZE {
                return Ok(members);
            }
        }
    }

    async fn add_thread_member(&self, thread_id: u64, user_id: u64) -> Result<()> {
        let path = format!("/channels/{}/thread-members/{}", thread_id, user_id);
        self.execute(Method::PUT, &path, None, None).await?;
        Ok(())
    }
}
