//! Discord REST API v10 client.
//!
//! Only the calls the bot needs: user lookup, guild member search, DM
//! channels, and sending or editing channel messages.

use anyhow::Context;
use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

/// Discord REST endpoint
const API_BASE: &str = "https://discord.com/api/v10";

pub const COLOR_BLURPLE: u32 = 0x5865f2;
pub const COLOR_GOLD: u32 = 0xf1c40f;

lazy_static! {
    static ref MENTION_RE: Regex = Regex::new(r"^<@!?(\d+)>$").unwrap();
    static ref SNOWFLAKE_RE: Regex = Regex::new(r"^\d{17,20}$").unwrap();
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ChatUser {
    pub id: String,
    pub username: String,
    #[serde(default)]
    pub global_name: Option<String>,
    #[serde(default)]
    pub discriminator: Option<String>,
}

impl ChatUser {
    /// Lowercased names a handle may refer to this user by.
    fn handles(&self) -> Vec<String> {
        let mut handles = vec![self.username.to_lowercase()];
        if let Some(global) = &self.global_name {
            handles.push(global.to_lowercase());
        }
        if let Some(discriminator) = self.discriminator.as_deref().filter(|d| *d != "0") {
            handles.push(format!("{}#{}", self.username, discriminator).to_lowercase());
        }
        handles
    }

    pub fn matches_handle(&self, normalized: &str) -> bool {
        self.handles().iter().any(|handle| handle == normalized)
    }

    pub fn mention(&self) -> String {
        format!("<@{}>", self.id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct GuildMember {
    pub user: ChatUser,
    #[serde(default)]
    pub nick: Option<String>,
}

impl GuildMember {
    pub fn display_name(&self) -> &str {
        self.nick
            .as_deref()
            .or(self.user.global_name.as_deref())
            .unwrap_or(&self.user.username)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Message {
    pub id: String,
    pub channel_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MessagePayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    pub embeds: Vec<Embed>,
    pub components: Vec<ActionRow>,
}

impl MessagePayload {
    pub fn embed(embed: Embed) -> Self {
        Self {
            content: None,
            embeds: vec![embed],
            components: Vec::new(),
        }
    }

    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Embed {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<u32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<EmbedField>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub footer: Option<EmbedFooter>,
    /// ISO-8601
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

impl Embed {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            ..Default::default()
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn color(mut self, color: u32) -> Self {
        self.color = Some(color);
        self
    }

    pub fn field(mut self, name: impl Into<String>, value: impl Into<String>, inline: bool) -> Self {
        self.fields.push(EmbedField {
            name: name.into(),
            value: value.into(),
            inline,
        });
        self
    }

    pub fn footer(mut self, text: impl Into<String>) -> Self {
        self.footer = Some(EmbedFooter { text: text.into() });
        self
    }

    pub fn timestamp(mut self, at: chrono::DateTime<chrono::Utc>) -> Self {
        self.timestamp = Some(at.to_rfc3339());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmbedFooter {
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonStyle {
    Primary = 1,
    Secondary = 2,
    Success = 3,
    Danger = 4,
}

impl Serialize for ButtonStyle {
    fn serialize<S: serde::Serializer>(&self, ser: S) -> Result<S::Ok, S::Error> {
        ser.serialize_u8(*self as u8)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Button {
    #[serde(rename = "type")]
    kind: u8,
    pub style: ButtonStyle,
    pub label: String,
    pub custom_id: String,
}

impl Button {
    pub fn new(style: ButtonStyle, label: impl Into<String>, custom_id: impl Into<String>) -> Self {
        Self {
            kind: 2,
            style,
            label: label.into(),
            custom_id: custom_id.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActionRow {
    #[serde(rename = "type")]
    kind: u8,
    pub components: Vec<Button>,
}

impl ActionRow {
    pub fn new(components: Vec<Button>) -> Self {
        Self { kind: 1, components }
    }
}

/// Outgoing side of the chat platform.
#[async_trait]
pub trait ChatPlatform: Send + Sync {
    async fn get_user(&self, user_id: &str) -> anyhow::Result<Option<ChatUser>>;

    /// Members of the configured guild whose name starts with `query`.
    async fn search_guild_members(&self, query: &str, limit: usize) -> anyhow::Result<Vec<GuildMember>>;

    /// Opens (or reuses) a DM channel and returns its id.
    async fn open_dm(&self, user_id: &str) -> anyhow::Result<String>;

    async fn create_message(&self, channel_id: &str, message: &MessagePayload) -> anyhow::Result<Message>;

    /// `Ok(None)` when the message no longer exists.
    async fn edit_message(
        &self,
        channel_id: &str,
        message_id: &str,
        message: &MessagePayload,
    ) -> anyhow::Result<Option<Message>>;

    async fn send_dm(&self, user_id: &str, message: &MessagePayload) -> anyhow::Result<Message> {
        let channel_id = self.open_dm(user_id).await?;
        self.create_message(&channel_id, message).await
    }
}

pub struct DiscordClient {
    http: reqwest::Client,
    token: String,
    guild_id: Option<String>,
}

impl DiscordClient {
    pub fn new(token: String, guild_id: Option<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            token,
            guild_id,
        }
    }

    /// `None` when no bot token is configured.
    pub fn from_config(config: &crate::config::Discord) -> Option<Self> {
        config
            .resolve_token()
            .map(|token| Self::new(token, config.guild_id.clone()))
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.http
            .request(method, format!("{}{}", API_BASE, path))
            .header(reqwest::header::AUTHORIZATION, format!("Bot {}", self.token))
    }
}

async fn error_for(response: reqwest::Response, what: &str) -> anyhow::Error {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    anyhow::anyhow!("Discord {} failed: {} - {}", what, status, body)
}

#[async_trait]
impl ChatPlatform for DiscordClient {
    async fn get_user(&self, user_id: &str) -> anyhow::Result<Option<ChatUser>> {
        let response = self
            .request(reqwest::Method::GET, &format!("/users/{}", user_id))
            .send()
            .await
            .context("could not fetch discord user")?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => Ok(Some(response.json().await?)),
            _ => Err(error_for(response, "user lookup").await),
        }
    }

    async fn search_guild_members(&self, query: &str, limit: usize) -> anyhow::Result<Vec<GuildMember>> {
        let Some(guild_id) = &self.guild_id else {
            return Ok(Vec::new());
        };

        let query: String = query.chars().take(32).collect();
        let response = self
            .request(
                reqwest::Method::GET,
                &format!("/guilds/{}/members/search", guild_id),
            )
            .query(&[("query", query), ("limit", limit.to_string())])
            .send()
            .await
            .context("could not search guild members")?;

        if !response.status().is_success() {
            return Err(error_for(response, "member search").await);
        }

        Ok(response.json().await?)
    }

    async fn open_dm(&self, user_id: &str) -> anyhow::Result<String> {
        #[derive(Deserialize)]
        struct Channel {
            id: String,
        }

        let response = self
            .request(reqwest::Method::POST, "/users/@me/channels")
            .json(&serde_json::json!({ "recipient_id": user_id }))
            .send()
            .await
            .context("could not open dm channel")?;

        if !response.status().is_success() {
            return Err(error_for(response, "dm channel").await);
        }

        let channel: Channel = response.json().await?;
        Ok(channel.id)
    }

    async fn create_message(&self, channel_id: &str, message: &MessagePayload) -> anyhow::Result<Message> {
        let response = self
            .request(
                reqwest::Method::POST,
                &format!("/channels/{}/messages", channel_id),
            )
            .json(message)
            .send()
            .await
            .context("could not send message")?;

        if !response.status().is_success() {
            return Err(error_for(response, "send message").await);
        }

        Ok(response.json().await?)
    }

    async fn edit_message(
        &self,
        channel_id: &str,
        message_id: &str,
        message: &MessagePayload,
    ) -> anyhow::Result<Option<Message>> {
        let response = self
            .request(
                reqwest::Method::PATCH,
                &format!("/channels/{}/messages/{}", channel_id, message_id),
            )
            .json(message)
            .send()
            .await
            .context("could not edit message")?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => Ok(Some(response.json().await?)),
            _ => Err(error_for(response, "edit message").await),
        }
    }
}

pub fn parse_mention(value: &str) -> Option<&str> {
    MENTION_RE
        .captures(value)
        .and_then(|caps| caps.get(1))
        .map(|id| id.as_str())
}

pub fn is_snowflake(value: &str) -> bool {
    SNOWFLAKE_RE.is_match(value)
}

pub fn normalize_handle(handle: &str) -> String {
    handle.trim().trim_start_matches('@').trim().to_lowercase()
}

/// Finds the Discord user a free-form handle refers to: a mention, a raw id,
/// or a name matched against members of the configured guild.
pub async fn resolve_user(chat: &dyn ChatPlatform, handle: &str) -> anyhow::Result<Option<ChatUser>> {
    let handle = handle.trim();
    if handle.is_empty() {
        return Ok(None);
    }

    if let Some(id) = parse_mention(handle) {
        match chat.get_user(id).await {
            Ok(Some(user)) => return Ok(Some(user)),
            Ok(None) => {}
            Err(e) => tracing::warn!("could not fetch mentioned user {}: {:?}", id, e),
        }
    }

    if is_snowflake(handle) {
        if let Ok(Some(user)) = chat.get_user(handle).await {
            return Ok(Some(user));
        }
    }

    let normalized = normalize_handle(handle);
    if normalized.is_empty() {
        return Ok(None);
    }

    let members = chat.search_guild_members(&normalized, 25).await?;
    let found = members
        .iter()
        .find(|member| member.user.matches_handle(&normalized))
        .or_else(|| {
            members
                .iter()
                .find(|member| member.display_name().to_lowercase() == normalized)
        })
        .map(|member| member.user.clone());

    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test::RecordingChat;

    #[test]
    fn mentions_and_snowflakes() {
        assert_eq!(parse_mention("<@123456>"), Some("123456"));
        assert_eq!(parse_mention("<@!123456>"), Some("123456"));
        assert_eq!(parse_mention("@someone"), None);

        assert!(is_snowflake("123456789012345678"));
        assert!(!is_snowflake("1234"));
        assert!(!is_snowflake("12345678901234567a"));

        assert_eq!(normalize_handle("  @Sniper "), "sniper");
    }

    #[test]
    fn handles_include_legacy_discriminator() {
        let user = ChatUser {
            id: "1".into(),
            username: "Sniper".into(),
            global_name: Some("The Sniper".into()),
            discriminator: Some("0420".into()),
        };
        assert!(user.matches_handle("sniper"));
        assert!(user.matches_handle("the sniper"));
        assert!(user.matches_handle("sniper#0420"));
        assert!(!user.matches_handle("medic"));
    }

    #[test]
    fn payload_serializes_discord_component_types() {
        let payload = MessagePayload {
            content: None,
            embeds: vec![Embed::new("Title").color(COLOR_BLURPLE).footer("id")],
            components: vec![ActionRow::new(vec![Button::new(
                ButtonStyle::Success,
                "Confirm",
                "discord-link:confirm:abc",
            )])],
        };

        let json = serde_json::to_value(&payload).unwrap();
        assert!(json.get("content").is_none());
        assert_eq!(json["embeds"][0]["title"], "Title");
        assert!(json["embeds"][0].get("fields").is_none());
        assert_eq!(json["components"][0]["type"], 1);
        assert_eq!(json["components"][0]["components"][0]["type"], 2);
        assert_eq!(json["components"][0]["components"][0]["style"], 3);
    }

    #[tokio::test]
    async fn resolves_by_mention_then_member_search() {
        let chat = RecordingChat::default();
        chat.add_user("111111111111111111", "sniper", None);
        chat.add_member("222222222222222222", "medic", Some("Doc"));

        let by_mention = resolve_user(&chat, "<@111111111111111111>").await.unwrap();
        assert_eq!(by_mention.map(|u| u.username), Some("sniper".to_string()));

        let by_id = resolve_user(&chat, "111111111111111111").await.unwrap();
        assert!(by_id.is_some());

        let by_name = resolve_user(&chat, "@Medic").await.unwrap();
        assert_eq!(by_name.map(|u| u.id), Some("222222222222222222".to_string()));

        let by_nick = resolve_user(&chat, "doc").await.unwrap();
        assert!(by_nick.is_some());

        assert!(resolve_user(&chat, "nobody").await.unwrap().is_none());
        assert!(resolve_user(&chat, "   ").await.unwrap().is_none());
    }
}
