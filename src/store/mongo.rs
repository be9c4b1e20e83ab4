use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use futures_util::StreamExt;
use mongodb::bson::{doc, Bson, Document};
use mongodb::options::{FindOptions, IndexOptions};
use mongodb::{Client as MongoClient, Collection, IndexModel};
use serde::de::DeserializeOwned;

use super::{
    Board, LinkRequest, LinkStatus, Store, CLAN_COLLECTION, LINK_COLLECTION, PATENTS_COLLECTION,
    USER_COLLECTION,
};
use crate::clan::ClanMetadata;
use crate::patent::PatentTier;
use crate::player::{FavoriteMap, PlayerHash, PlayerRecord};

pub struct MongoStore {
    mongo: MongoClient,
    database: String,
}

impl MongoStore {
    pub async fn connect(config: &crate::config::Mongo) -> Result<Self> {
        let mongo = MongoClient::with_uri_str(&config.url)
            .await
            .context("could not create mongodb client")?;

        let store = Self {
            mongo,
            database: config.database.clone(),
        };
        store.ensure_indexes().await?;

        Ok(store)
    }

    async fn ensure_indexes(&self) -> Result<()> {
        self.link_collection()
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "requestId": 1 })
                    .options(IndexOptions::builder().unique(true).build())
                    .build(),
                None,
            )
            .await
            .context("could not create link request index")?;

        self.link_collection()
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "discordUserId": 1, "playerName": 1, "status": 1 })
                    .build(),
                None,
            )
            .await
            .context("could not create pending link index")?;

        Ok(())
    }

    fn players(&self, board: Board) -> Collection<PlayerRecord> {
        self.mongo
            .database(&self.database)
            .collection(board.collection_name())
    }

    fn users(&self) -> Collection<PlayerRecord> {
        self.mongo.database(&self.database).collection(USER_COLLECTION)
    }

    fn clan_collection(&self) -> Collection<ClanMetadata> {
        self.mongo.database(&self.database).collection(CLAN_COLLECTION)
    }

    fn patents_collection(&self) -> Collection<PatentTier> {
        self.mongo.database(&self.database).collection(PATENTS_COLLECTION)
    }

    fn link_collection(&self) -> Collection<LinkRequest> {
        self.mongo.database(&self.database).collection(LINK_COLLECTION)
    }
}

/// Runs `find` and keeps every document that decodes.
async fn collect<T>(
    collection: Collection<T>,
    filter: Document,
    options: Option<FindOptions>,
) -> Result<Vec<T>>
where
    T: DeserializeOwned + Unpin + Send + Sync,
{
    let name = collection.name().to_string();
    let cursor = collection
        .find(filter, options)
        .await
        .with_context(|| format!("could not query {}", name))?;

    let name = name.as_str();
    let records = cursor
        .filter_map(move |res| async move {
            match res {
                Ok(record) => Some(record),
                Err(e) => {
                    tracing::warn!("skipping undecodable document in {}: {:?}", name, e);
                    None
                }
            }
        })
        .collect::<Vec<_>>()
        .await;

    Ok(records)
}

/// Driver limit for at most `limit` rows. The driver reads 0 as "no limit"
/// and a negative value as "one batch", so 0 is answered without a query
/// and oversized limits saturate.
fn find_limit(limit: Option<usize>) -> Option<i64> {
    limit.map(|limit| i64::try_from(limit).unwrap_or(i64::MAX))
}

fn leaderboard_sort() -> Document {
    doc! { "score": -1, "hash": 1 }
}

/// `^name$`, case-insensitive, with the name taken literally.
fn exact_name_filter(name: &str) -> Document {
    doc! {
        "name": {
            "$regex": format!("^{}$", regex::escape(name)),
            "$options": "i",
        }
    }
}

fn contains_name_filter(name: &str) -> Document {
    doc! {
        "name": {
            "$regex": regex::escape(name),
            "$options": "i",
        }
    }
}

#[async_trait]
impl Store for MongoStore {
    async fn top_players(&self, board: Board, limit: Option<usize>) -> Result<Vec<PlayerRecord>> {
        if limit == Some(0) {
            return Ok(Vec::new());
        }

        let options = FindOptions::builder()
            .sort(leaderboard_sort())
            .limit(find_limit(limit))
            .build();

        collect(self.players(board), doc! {}, Some(options)).await
    }

    async fn find_players_by_name(&self, name: &str) -> Result<Vec<PlayerRecord>> {
        let options = FindOptions::builder().sort(leaderboard_sort()).build();
        collect(self.users(), contains_name_filter(name), Some(options)).await
    }

    async fn find_player_by_exact_name(&self, name: &str) -> Result<Option<PlayerRecord>> {
        self.users()
            .find_one(exact_name_filter(name), None)
            .await
            .context("could not query player by name")
    }

    async fn find_player_by_hash(&self, hash: &PlayerHash) -> Result<Option<PlayerRecord>> {
        self.users()
            .find_one(doc! { "hash": hash.as_str() }, None)
            .await
            .context("could not query player by hash")
    }

    async fn find_player_by_discord(&self, discord_user_id: &str) -> Result<Option<PlayerRecord>> {
        self.users()
            .find_one(doc! { "discordUserId": discord_user_id }, None)
            .await
            .context("could not query player by discord id")
    }

    async fn players_with_favorite(&self, map: &FavoriteMap) -> Result<Vec<PlayerRecord>> {
        let filter = doc! {
            "discordUserId": { "$exists": true, "$ne": Bson::Null },
            "favoriteMaps": {
                "$elemMatch": {
                    "name": map.name.as_str(),
                    "mode": map.mode.as_str(),
                }
            },
        };

        collect(self.users(), filter, None).await
    }

    async fn set_discord_user(&self, hash: &PlayerHash, discord_user_id: &str) -> Result<()> {
        self.users()
            .update_one(
                doc! { "hash": hash.as_str() },
                doc! { "$set": { "discordUserId": discord_user_id } },
                None,
            )
            .await
            .context("could not link discord user")?;

        Ok(())
    }

    async fn set_favorite_maps(&self, discord_user_id: &str, maps: &[FavoriteMap]) -> Result<()> {
        let maps = mongodb::bson::to_bson(maps)?;
        self.users()
            .update_one(
                doc! { "discordUserId": discord_user_id },
                doc! { "$set": { "favoriteMaps": maps } },
                None,
            )
            .await
            .context("could not update favorite maps")?;

        Ok(())
    }

    async fn clan_metadata(&self) -> Result<Vec<ClanMetadata>> {
        collect(self.clan_collection(), doc! {}, None).await
    }

    async fn patents(&self) -> Result<Vec<PatentTier>> {
        let options = FindOptions::builder().sort(doc! { "score": 1 }).build();
        collect(self.patents_collection(), doc! {}, Some(options)).await
    }

    async fn insert_link_request(&self, request: &LinkRequest) -> Result<()> {
        self.link_collection()
            .insert_one(request, None)
            .await
            .context("could not insert link request")?;

        Ok(())
    }

    async fn find_link_request(&self, request_id: &str) -> Result<Option<LinkRequest>> {
        self.link_collection()
            .find_one(doc! { "requestId": request_id }, None)
            .await
            .context("could not query link request")
    }

    async fn find_pending_link(
        &self,
        discord_user_id: &str,
        player_name: &str,
    ) -> Result<Option<LinkRequest>> {
        self.link_collection()
            .find_one(
                doc! {
                    "discordUserId": discord_user_id,
                    "playerName": player_name,
                    "status": "pending",
                },
                None,
            )
            .await
            .context("could not query pending link request")
    }

    async fn update_link_status(
        &self,
        request_id: &str,
        status: LinkStatus,
        reason: Option<&str>,
    ) -> Result<()> {
        let mut set = doc! {
            "status": mongodb::bson::to_bson(&status)?,
            "resolvedAt": Utc::now(),
        };
        if let Some(reason) = reason {
            set.insert("reason", reason);
        }

        self.link_collection()
            .update_one(doc! { "requestId": request_id }, doc! { "$set": set }, None)
            .await
            .context("could not update link request")?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limits_never_reach_the_driver_as_zero_or_negative() {
        assert_eq!(find_limit(None), None);
        assert_eq!(find_limit(Some(25)), Some(25));
        assert_eq!(find_limit(Some(usize::MAX)), Some(i64::MAX));
    }

    #[test]
    fn name_filters_escape_regex_metacharacters() {
        let filter = exact_name_filter("[BOPE] a.b");
        let name = filter.get_document("name").unwrap();
        assert_eq!(name.get_str("$regex").unwrap(), r"^\[BOPE\] a\.b$");
        assert_eq!(name.get_str("$options").unwrap(), "i");

        let filter = contains_name_filter("x+y");
        assert_eq!(
            filter.get_document("name").unwrap().get_str("$regex").unwrap(),
            r"x\+y"
        );
    }
}
