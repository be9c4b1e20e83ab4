use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Mutex;

use super::{Board, LinkRequest, LinkStatus, Store};
use crate::clan::ClanMetadata;
use crate::patent::PatentTier;
use crate::player::{FavoriteMap, PlayerHash, PlayerRecord};
use crate::rank::sort_leaderboard;

/// In-process store with the same query semantics as `MongoStore`.
#[derive(Default)]
pub struct MemoryStore {
    pub users: Mutex<Vec<PlayerRecord>>,
    pub monthly: Mutex<Vec<PlayerRecord>>,
    pub clans: Mutex<Vec<ClanMetadata>>,
    pub patents: Mutex<Vec<PatentTier>>,
    pub links: Mutex<Vec<LinkRequest>>,
    /// Makes every call fail, to exercise upstream error paths.
    pub broken: std::sync::atomic::AtomicBool,
}

impl MemoryStore {
    pub fn with_players(players: Vec<PlayerRecord>) -> Self {
        let store = Self::default();
        *store.users.lock().unwrap() = players;
        store
    }

    pub fn player(&self, hash: &str) -> Option<PlayerRecord> {
        self.users
            .lock()
            .unwrap()
            .iter()
            .find(|p| p.hash.as_str() == hash)
            .cloned()
    }

    pub fn link(&self, request_id: &str) -> Option<LinkRequest> {
        self.links
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.request_id == request_id)
            .cloned()
    }

    fn check(&self) -> Result<()> {
        if self.broken.load(std::sync::atomic::Ordering::SeqCst) {
            anyhow::bail!("store unavailable");
        }
        Ok(())
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn top_players(&self, board: Board, limit: Option<usize>) -> Result<Vec<PlayerRecord>> {
        self.check()?;
        let mut players = match board {
            Board::AllTime => self.users.lock().unwrap().clone(),
            Board::Monthly => self.monthly.lock().unwrap().clone(),
        };
        sort_leaderboard(&mut players);
        if let Some(limit) = limit {
            players.truncate(limit);
        }
        Ok(players)
    }

    async fn find_players_by_name(&self, name: &str) -> Result<Vec<PlayerRecord>> {
        self.check()?;
        let needle = name.to_lowercase();
        let mut players: Vec<PlayerRecord> = self
            .users
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.name.to_lowercase().contains(&needle))
            .cloned()
            .collect();
        sort_leaderboard(&mut players);
        Ok(players)
    }

    async fn find_player_by_exact_name(&self, name: &str) -> Result<Option<PlayerRecord>> {
        self.check()?;
        let needle = name.to_lowercase();
        Ok(self
            .users
            .lock()
            .unwrap()
            .iter()
            .find(|p| p.name.to_lowercase() == needle)
            .cloned())
    }

    async fn find_player_by_hash(&self, hash: &PlayerHash) -> Result<Option<PlayerRecord>> {
        self.check()?;
        Ok(self
            .users
            .lock()
            .unwrap()
            .iter()
            .find(|p| &p.hash == hash)
            .cloned())
    }

    async fn find_player_by_discord(&self, discord_user_id: &str) -> Result<Option<PlayerRecord>> {
        self.check()?;
        Ok(self
            .users
            .lock()
            .unwrap()
            .iter()
            .find(|p| p.discord_user_id.as_deref() == Some(discord_user_id))
            .cloned())
    }

    async fn players_with_favorite(&self, map: &FavoriteMap) -> Result<Vec<PlayerRecord>> {
        self.check()?;
        Ok(self
            .users
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.discord_user_id.is_some() && p.favorite_maps.contains(map))
            .cloned()
            .collect())
    }

    async fn set_discord_user(&self, hash: &PlayerHash, discord_user_id: &str) -> Result<()> {
        self.check()?;
        for player in self.users.lock().unwrap().iter_mut() {
            if &player.hash == hash {
                player.discord_user_id = Some(discord_user_id.to_string());
            }
        }
        Ok(())
    }

    async fn set_favorite_maps(&self, discord_user_id: &str, maps: &[FavoriteMap]) -> Result<()> {
        self.check()?;
        for player in self.users.lock().unwrap().iter_mut() {
            if player.discord_user_id.as_deref() == Some(discord_user_id) {
                player.favorite_maps = maps.to_vec();
                break;
            }
        }
        Ok(())
    }

    async fn clan_metadata(&self) -> Result<Vec<ClanMetadata>> {
        self.check()?;
        Ok(self.clans.lock().unwrap().clone())
    }

    async fn patents(&self) -> Result<Vec<PatentTier>> {
        self.check()?;
        Ok(self.patents.lock().unwrap().clone())
    }

    async fn insert_link_request(&self, request: &LinkRequest) -> Result<()> {
        self.check()?;
        self.links.lock().unwrap().push(request.clone());
        Ok(())
    }

    async fn find_link_request(&self, request_id: &str) -> Result<Option<LinkRequest>> {
        self.check()?;
        Ok(self.link(request_id))
    }

    async fn find_pending_link(
        &self,
        discord_user_id: &str,
        player_name: &str,
    ) -> Result<Option<LinkRequest>> {
        self.check()?;
        Ok(self
            .links
            .lock()
            .unwrap()
            .iter()
            .find(|r| {
                r.discord_user_id == discord_user_id
                    && r.player_name == player_name
                    && r.status == LinkStatus::Pending
            })
            .cloned())
    }

    async fn update_link_status(
        &self,
        request_id: &str,
        status: LinkStatus,
        reason: Option<&str>,
    ) -> Result<()> {
        self.check()?;
        for request in self.links.lock().unwrap().iter_mut() {
            if request.request_id == request_id {
                request.status = status;
                request.resolved_at = Some(Utc::now());
                if let Some(reason) = reason {
                    request.reason = Some(reason.to_string());
                }
            }
        }
        Ok(())
    }
}
