use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::clan::ClanMetadata;
use crate::patent::PatentTier;
use crate::player::{FavoriteMap, PlayerHash, PlayerRecord};

pub mod mongo;
#[cfg(test)]
pub mod memory;

pub use self::mongo::MongoStore;

pub const USER_COLLECTION: &str = "user";
pub const MONTHLY_USER_COLLECTION: &str = "monthly_user";
pub const CLAN_COLLECTION: &str = "clan";
pub const PATENTS_COLLECTION: &str = "patents";
pub const LINK_COLLECTION: &str = "discord_link_requests";

/// Which player collection a leaderboard reads from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Board {
    AllTime,
    Monthly,
}

impl Board {
    pub fn collection_name(self) -> &'static str {
        match self {
            Board::AllTime => USER_COLLECTION,
            Board::Monthly => MONTHLY_USER_COLLECTION,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkStatus {
    Pending,
    Confirmed,
    Cancelled,
    Failed,
    PlayerNotFound,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkRequest {
    pub request_id: String,
    pub discord_user_id: String,
    pub player_name: String,
    pub status: LinkStatus,
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
    #[serde(
        default,
        with = "optional_datetime",
        skip_serializing_if = "Option::is_none"
    )]
    pub resolved_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Everything the bot reads from or writes to the document store.
///
/// Player lists come back in leaderboard order (score descending, hash
/// ascending). Documents that fail to decode are skipped.
#[async_trait]
pub trait Store: Send + Sync {
    async fn top_players(&self, board: Board, limit: Option<usize>) -> anyhow::Result<Vec<PlayerRecord>>;

    /// Case-insensitive substring match on the display name.
    async fn find_players_by_name(&self, name: &str) -> anyhow::Result<Vec<PlayerRecord>>;

    /// Case-insensitive whole-name match.
    async fn find_player_by_exact_name(&self, name: &str) -> anyhow::Result<Option<PlayerRecord>>;

    async fn find_player_by_hash(&self, hash: &PlayerHash) -> anyhow::Result<Option<PlayerRecord>>;

    async fn find_player_by_discord(&self, discord_user_id: &str) -> anyhow::Result<Option<PlayerRecord>>;

    /// Linked players holding `map` among their favorites.
    async fn players_with_favorite(&self, map: &FavoriteMap) -> anyhow::Result<Vec<PlayerRecord>>;

    async fn set_discord_user(&self, hash: &PlayerHash, discord_user_id: &str) -> anyhow::Result<()>;

    async fn set_favorite_maps(&self, discord_user_id: &str, maps: &[FavoriteMap]) -> anyhow::Result<()>;

    async fn clan_metadata(&self) -> anyhow::Result<Vec<ClanMetadata>>;

    async fn patents(&self) -> anyhow::Result<Vec<PatentTier>>;

    async fn insert_link_request(&self, request: &LinkRequest) -> anyhow::Result<()>;

    async fn find_link_request(&self, request_id: &str) -> anyhow::Result<Option<LinkRequest>>;

    async fn find_pending_link(&self, discord_user_id: &str, player_name: &str) -> anyhow::Result<Option<LinkRequest>>;

    async fn update_link_status(
        &self,
        request_id: &str,
        status: LinkStatus,
        reason: Option<&str>,
    ) -> anyhow::Result<()>;
}

mod optional_datetime {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<DateTime<Utc>>, ser: S) -> Result<S::Ok, S::Error> {
        value
            .map(mongodb::bson::DateTime::from_chrono)
            .serialize(ser)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<Option<DateTime<Utc>>, D::Error> {
        let value: Option<mongodb::bson::DateTime> = Deserialize::deserialize(de)?;
        Ok(value.map(|dt| dt.to_chrono()))
    }
}
