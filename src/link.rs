//! Linking a Discord account to an in-game player.
//!
//! The game server asks for a link over HTTP, the Discord user receives a DM
//! with confirm/cancel buttons, and their answer settles the request.

use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use warp::http::StatusCode;

use crate::discord::{ActionRow, Button, ButtonStyle, ChatUser, Embed, MessagePayload, COLOR_BLURPLE};
use crate::store::{LinkRequest, LinkStatus, Store};

const CUSTOM_ID_PREFIX: &str = "discord-link";

#[derive(Debug, Error)]
pub enum LinkError {
    #[error("player not found")]
    PlayerNotFound,

    #[error("player is already linked to another user")]
    PlayerAlreadyLinked,

    #[error("you are already linked to player {0}")]
    DiscordAlreadyLinked(String),

    #[error("a pending request already exists for this player")]
    PendingRequestExists,

    #[error("request not found or expired")]
    RequestNotFound,

    #[error("request was already handled")]
    RequestAlreadyHandled,

    #[error("you cannot answer this request")]
    NotAuthorized,

    #[error(transparent)]
    Upstream(#[from] anyhow::Error),
}

impl LinkError {
    pub fn status(&self) -> StatusCode {
        match self {
            LinkError::PlayerNotFound => StatusCode::NOT_FOUND,
            LinkError::PlayerAlreadyLinked
            | LinkError::DiscordAlreadyLinked(_)
            | LinkError::PendingRequestExists => StatusCode::CONFLICT,
            LinkError::RequestNotFound
            | LinkError::RequestAlreadyHandled
            | LinkError::NotAuthorized => StatusCode::BAD_REQUEST,
            LinkError::Upstream(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkAction {
    Confirm,
    Cancel,
}

/// Reads a `discord-link:<action>:<request id>` button id.
pub fn parse_custom_id(custom_id: &str) -> Option<(LinkAction, &str)> {
    let mut parts = custom_id.splitn(3, ':');
    if parts.next()? != CUSTOM_ID_PREFIX {
        return None;
    }

    let action = match parts.next()? {
        "confirm" => LinkAction::Confirm,
        "cancel" => LinkAction::Cancel,
        _ => return None,
    };

    let request_id = parts.next().filter(|id| !id.is_empty())?;
    Some((action, request_id))
}

pub fn custom_id(action: LinkAction, request_id: &str) -> String {
    let action = match action {
        LinkAction::Confirm => "confirm",
        LinkAction::Cancel => "cancel",
    };
    format!("{}:{}:{}", CUSTOM_ID_PREFIX, action, request_id)
}

/// DM asking the user to confirm a link request.
pub fn confirmation_message(user: &ChatUser, request: &LinkRequest) -> MessagePayload {
    let embed = Embed::new("Confirm the link with your player")
        .description(format!(
            "Requested player: **{}**\n\nPress **Confirm** to link this player to your Discord account.\nIf this was not you, press **Cancel**.",
            request.player_name
        ))
        .color(COLOR_BLURPLE)
        .footer(format!("Request id: {}", request.request_id));

    MessagePayload {
        content: Some(format!(
            "Hi {}, we received a request to link your account to player **{}**.",
            user.mention(),
            request.player_name
        )),
        embeds: vec![embed],
        components: vec![ActionRow::new(vec![
            Button::new(
                ButtonStyle::Success,
                "Confirm",
                custom_id(LinkAction::Confirm, &request.request_id),
            ),
            Button::new(
                ButtonStyle::Secondary,
                "Cancel",
                custom_id(LinkAction::Cancel, &request.request_id),
            ),
        ])],
    }
}

pub struct LinkService {
    store: Arc<dyn Store>,
}

impl LinkService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Validates and stores a pending request. The stored player name is the
    /// name as written in the store, not as typed.
    pub async fn create_link_request(
        &self,
        discord_user_id: &str,
        raw_player_name: &str,
    ) -> Result<LinkRequest, LinkError> {
        let player_name = raw_player_name.trim();
        if discord_user_id.is_empty() || player_name.is_empty() {
            return Err(LinkError::PlayerNotFound);
        }

        let player = self
            .store
            .find_player_by_exact_name(player_name)
            .await?
            .ok_or(LinkError::PlayerNotFound)?;

        if player
            .discord_user_id
            .as_deref()
            .is_some_and(|linked| linked != discord_user_id)
        {
            return Err(LinkError::PlayerAlreadyLinked);
        }

        if let Some(existing) = self.store.find_player_by_discord(discord_user_id).await? {
            if existing.hash != player.hash {
                return Err(LinkError::DiscordAlreadyLinked(existing.name));
            }
        }

        if self
            .store
            .find_pending_link(discord_user_id, &player.name)
            .await?
            .is_some()
        {
            return Err(LinkError::PendingRequestExists);
        }

        let request = LinkRequest {
            request_id: uuid::Uuid::new_v4().simple().to_string(),
            discord_user_id: discord_user_id.to_string(),
            player_name: player.name,
            status: LinkStatus::Pending,
            created_at: Utc::now(),
            resolved_at: None,
            reason: None,
        };
        self.store.insert_link_request(&request).await?;

        tracing::info!(
            "link request {} created for discord user {} and player {}",
            request.request_id,
            discord_user_id,
            request.player_name
        );
        Ok(request)
    }

    async fn pending_request(&self, request_id: &str, discord_user_id: &str) -> Result<LinkRequest, LinkError> {
        let request = self
            .store
            .find_link_request(request_id)
            .await?
            .ok_or(LinkError::RequestNotFound)?;

        if request.discord_user_id != discord_user_id {
            return Err(LinkError::NotAuthorized);
        }
        if request.status != LinkStatus::Pending {
            return Err(LinkError::RequestAlreadyHandled);
        }

        Ok(request)
    }

    /// Links the player and returns its name.
    pub async fn confirm(&self, request_id: &str, discord_user_id: &str) -> Result<String, LinkError> {
        let request = self.pending_request(request_id, discord_user_id).await?;

        let Some(player) = self
            .store
            .find_player_by_exact_name(&request.player_name)
            .await?
        else {
            self.store
                .update_link_status(request_id, LinkStatus::PlayerNotFound, None)
                .await?;
            return Err(LinkError::PlayerNotFound);
        };

        self.store
            .set_discord_user(&player.hash, discord_user_id)
            .await?;
        self.store
            .update_link_status(request_id, LinkStatus::Confirmed, None)
            .await?;

        tracing::info!("discord user {} linked to player {}", discord_user_id, player.name);
        Ok(player.name)
    }

    pub async fn cancel(&self, request_id: &str, discord_user_id: &str) -> Result<String, LinkError> {
        let request = self.pending_request(request_id, discord_user_id).await?;
        self.store
            .update_link_status(request_id, LinkStatus::Cancelled, None)
            .await?;
        Ok(request.player_name)
    }

    /// Button dispatch: routes a `discord-link:*` custom id to confirm or cancel.
    pub async fn handle_button(&self, custom_id: &str, discord_user_id: &str) -> Result<(LinkAction, String), LinkError> {
        let (action, request_id) = parse_custom_id(custom_id).ok_or(LinkError::RequestNotFound)?;
        let player_name = match action {
            LinkAction::Confirm => self.confirm(request_id, discord_user_id).await?,
            LinkAction::Cancel => self.cancel(request_id, discord_user_id).await?,
        };
        Ok((action, player_name))
    }

    pub async fn mark_failed(&self, request_id: &str, reason: &str) -> Result<(), LinkError> {
        self.store
            .update_link_status(request_id, LinkStatus::Failed, Some(reason))
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::player::PlayerRecord;
    use crate::store::memory::MemoryStore;

    fn service() -> (Arc<MemoryStore>, LinkService) {
        let mut linked = PlayerRecord::new("h2", "ROTA tank", 5);
        linked.discord_user_id = Some("999".into());
        let store = Arc::new(MemoryStore::with_players(vec![
            PlayerRecord::new("h1", "BOPE sniper", 10),
            linked,
        ]));
        let service = LinkService::new(store.clone());
        (store, service)
    }

    #[test]
    fn custom_ids_round_trip() {
        let id = custom_id(LinkAction::Confirm, "abc123");
        assert_eq!(id, "discord-link:confirm:abc123");
        assert_eq!(parse_custom_id(&id), Some((LinkAction::Confirm, "abc123")));
        assert_eq!(
            parse_custom_id("discord-link:cancel:xyz"),
            Some((LinkAction::Cancel, "xyz"))
        );
        assert_eq!(parse_custom_id("discord-link:explode:xyz"), None);
        assert_eq!(parse_custom_id("other:confirm:xyz"), None);
        assert_eq!(parse_custom_id("discord-link:confirm:"), None);
    }

    #[tokio::test]
    async fn confirm_links_the_player() {
        let (store, service) = service();
        let request = service
            .create_link_request("123", "  bope SNIPER ")
            .await
            .unwrap();
        assert_eq!(request.player_name, "BOPE sniper");
        assert_eq!(request.status, LinkStatus::Pending);

        assert!(matches!(
            service.create_link_request("123", "BOPE sniper").await,
            Err(LinkError::PendingRequestExists)
        ));

        assert!(matches!(
            service.confirm(&request.request_id, "456").await,
            Err(LinkError::NotAuthorized)
        ));

        let name = service.confirm(&request.request_id, "123").await.unwrap();
        assert_eq!(name, "BOPE sniper");
        assert_eq!(store.player("h1").unwrap().discord_user_id.as_deref(), Some("123"));
        let stored = store.link(&request.request_id).unwrap();
        assert_eq!(stored.status, LinkStatus::Confirmed);
        assert!(stored.resolved_at.is_some());

        assert!(matches!(
            service.cancel(&request.request_id, "123").await,
            Err(LinkError::RequestAlreadyHandled)
        ));
    }

    #[tokio::test]
    async fn conflicting_links_are_rejected() {
        let (_, service) = service();

        let err = service.create_link_request("123", "ROTA tank").await.unwrap_err();
        assert!(matches!(err, LinkError::PlayerAlreadyLinked));
        assert_eq!(err.status(), StatusCode::CONFLICT);

        let err = service.create_link_request("999", "BOPE sniper").await.unwrap_err();
        assert!(matches!(err, LinkError::DiscordAlreadyLinked(ref name) if name == "ROTA tank"));

        let err = service.create_link_request("123", "nobody").await.unwrap_err();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);

        // relinking the same pair is allowed
        assert!(service.create_link_request("999", "ROTA tank").await.is_ok());
    }

    #[tokio::test]
    async fn cancel_and_failure_are_recorded() {
        let (store, service) = service();
        let request = service.create_link_request("123", "BOPE sniper").await.unwrap();

        let (action, name) = service
            .handle_button(&custom_id(LinkAction::Cancel, &request.request_id), "123")
            .await
            .unwrap();
        assert_eq!(action, LinkAction::Cancel);
        assert_eq!(name, "BOPE sniper");
        assert_eq!(store.link(&request.request_id).unwrap().status, LinkStatus::Cancelled);
        assert!(store.player("h1").unwrap().discord_user_id.is_none());

        let again = service.create_link_request("123", "BOPE sniper").await.unwrap();
        service.mark_failed(&again.request_id, "dm closed").await.unwrap();
        let failed = store.link(&again.request_id).unwrap();
        assert_eq!(failed.status, LinkStatus::Failed);
        assert_eq!(failed.reason.as_deref(), Some("dm closed"));

        assert!(matches!(
            service.confirm("missing", "123").await,
            Err(LinkError::RequestNotFound)
        ));
    }

    #[tokio::test]
    async fn confirm_after_player_vanished() {
        let (store, service) = service();
        let request = service.create_link_request("123", "BOPE sniper").await.unwrap();
        store.users.lock().unwrap().retain(|p| p.hash.as_str() != "h1");

        assert!(matches!(
            service.confirm(&request.request_id, "123").await,
            Err(LinkError::PlayerNotFound)
        ));
        assert_eq!(
            store.link(&request.request_id).unwrap().status,
            LinkStatus::PlayerNotFound
        );
    }

    #[test]
    fn confirmation_dm_carries_both_buttons() {
        let request = LinkRequest {
            request_id: "abc".into(),
            discord_user_id: "123".into(),
            player_name: "BOPE sniper".into(),
            status: LinkStatus::Pending,
            created_at: Utc::now(),
            resolved_at: None,
            reason: None,
        };
        let user = ChatUser {
            id: "123".into(),
            username: "sniper".into(),
            global_name: None,
            discriminator: None,
        };
        let payload = confirmation_message(&user, &request);
        let buttons = &payload.components[0].components;
        assert_eq!(buttons[0].custom_id, "discord-link:confirm:abc");
        assert_eq!(buttons[1].custom_id, "discord-link:cancel:abc");
        assert!(payload.content.unwrap().contains("<@123>"));
    }
}
