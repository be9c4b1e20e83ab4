//! Ranking operations composed over the store, with clan and patent results
//! memoized in the aggregation cache.

use serde::Serialize;
use std::str::FromStr;
use std::sync::Arc;
use tokio::time::Instant;

use crate::cache::{keys, AggregateCache, CachedAggregate};
use crate::clan::{self, ClanAggregate, ClanLookup, ClanMember, ClanSummary};
use crate::config::Ranking as RankingConfig;
use crate::cursor::{self, Cursor, Navigation, SessionRegistry, Snapshot};
use crate::error::{RankingError, Result};
use crate::patent::{PatentTier, TierTable};
use crate::player::{format_online_time, PlayerHash, PlayerRecord};
use crate::progress::{ProgressDescriptor, DEFAULT_BAR_SIZE};
use crate::rank::resolve_rank;
use crate::store::{Board, Store};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RankingView {
    Players,
    Season,
    Clans,
}

impl FromStr for RankingView {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "players" => Ok(Self::Players),
            "season" => Ok(Self::Season),
            "clans" => Ok(Self::Clans),
            _ => Err(()),
        }
    }
}

/// One line of a paged ranking.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RankingRow {
    pub position: usize,
    pub name: String,
    pub score: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hash: Option<PlayerHash>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub member_count: Option<usize>,
}

impl RankingRow {
    fn player(position: usize, player: &PlayerRecord) -> Self {
        Self {
            position,
            name: player.name.clone(),
            score: player.score,
            hash: Some(player.hash.clone()),
            member_count: None,
        }
    }

    fn clan(position: usize, clan: &ClanAggregate, field: clan::ClanRankField) -> Self {
        Self {
            position,
            name: clan.name.clone(),
            score: clan.rank_value(field),
            hash: None,
            member_count: Some(clan.member_count),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RankingPage {
    pub session_id: String,
    pub view: RankingView,
    pub page: usize,
    pub total_pages: usize,
    pub has_previous: bool,
    pub has_next: bool,
    pub highlight: Option<usize>,
    pub rows: Vec<RankingRow>,
}

struct RankingSnapshot {
    view: RankingView,
    rows: Vec<RankingRow>,
}

impl Snapshot for RankingSnapshot {
    type Item = RankingRow;

    fn items(&self) -> &[RankingRow] {
        &self.rows
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub player: PlayerRecord,
    pub clan: Option<String>,
    pub rank: Option<usize>,
    pub kd_ratio: f64,
    pub online_time: String,
    /// `None` when no patent table is configured.
    pub patent: Option<PatentTier>,
    pub next_patent: Option<PatentTier>,
    pub progress: Option<ProgressDescriptor>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClanDetail {
    pub clan: Arc<ClanAggregate>,
    pub rank: Option<usize>,
    pub kd_ratio: f64,
    pub online_time: String,
    pub last_activity: Option<chrono::DateTime<chrono::Utc>>,
    pub cursor: Cursor,
    pub members: Vec<ClanMember>,
}

pub struct RankingService {
    store: Arc<dyn Store>,
    cache: Arc<dyn AggregateCache>,
    config: RankingConfig,
    sessions: SessionRegistry<RankingSnapshot>,
}

impl RankingService {
    pub fn new(store: Arc<dyn Store>, cache: Arc<dyn AggregateCache>, config: RankingConfig) -> Self {
        let sessions = SessionRegistry::new(config.session_timeout());
        Self {
            store,
            cache,
            config,
            sessions,
        }
    }

    pub fn config(&self) -> &RankingConfig {
        &self.config
    }

    pub async fn top_players(&self, limit: usize) -> Result<Vec<PlayerRecord>> {
        self.store
            .top_players(Board::AllTime, Some(limit))
            .await
            .map_err(RankingError::upstream("top players"))
    }

    pub async fn season_top_players(&self, limit: usize) -> Result<Vec<PlayerRecord>> {
        self.store
            .top_players(Board::Monthly, Some(limit))
            .await
            .map_err(RankingError::upstream("monthly top players"))
    }

    /// Every clan, best first.
    pub async fn all_clans(&self) -> Result<Arc<[ClanAggregate]>> {
        self.stamped_clans().await.map(|(clans, _)| clans)
    }

    /// Every clan with the instant the underlying players were read. Values
    /// derived from it are cached under the same instant so they expire
    /// together with it.
    async fn stamped_clans(&self) -> Result<(Arc<[ClanAggregate]>, Instant)> {
        if let Some((CachedAggregate::Clans(clans), read_at)) = self.cache.get_stamped(keys::ALL_CLANS) {
            return Ok((clans, read_at));
        }

        let read_at = Instant::now();
        let population = self
            .store
            .top_players(Board::AllTime, None)
            .await
            .map_err(RankingError::upstream("clan population"))?;
        let metadata = self
            .store
            .clan_metadata()
            .await
            .map_err(RankingError::upstream("clan metadata"))?;

        let clans: Arc<[ClanAggregate]> =
            clan::aggregate_clans(&population, Some(metadata.as_slice()), self.config.clan_rank_field).into();
        tracing::debug!("aggregated {} clans from {} players", clans.len(), population.len());

        self.cache.set_at(
            keys::ALL_CLANS.to_string(),
            CachedAggregate::Clans(Arc::clone(&clans)),
            read_at,
        );
        Ok((clans, read_at))
    }

    pub async fn top_clans(&self, limit: usize) -> Result<Arc<[ClanAggregate]>> {
        let key = keys::top_clans(limit);
        if let Some(CachedAggregate::Clans(clans)) = self.cache.get(&key) {
            return Ok(clans);
        }

        let (all, read_at) = self.stamped_clans().await?;
        let top: Arc<[ClanAggregate]> = all.iter().take(limit).cloned().collect();
        self.cache
            .set_at(key, CachedAggregate::Clans(Arc::clone(&top)), read_at);
        Ok(top)
    }

    /// Exact match first, then a unique substring match. Several candidates
    /// are reported back instead of guessing.
    pub async fn clan_by_name(&self, name: &str) -> Result<ClanLookup> {
        let key = keys::clan(name.trim());
        if let Some(CachedAggregate::Clan(clan)) = self.cache.get(&key) {
            return Ok(ClanLookup::Found((*clan).clone()));
        }

        let (all, read_at) = self.stamped_clans().await?;
        let lookup = clan::lookup_clan(name, &all);
        if let ClanLookup::Found(clan) = &lookup {
            self.cache
                .set_at(key, CachedAggregate::Clan(Arc::new(clan.clone())), read_at);
        }

        Ok(lookup)
    }

    pub async fn find_similar_clans(&self, name: &str, limit: usize) -> Result<Arc<[ClanSummary]>> {
        let key = keys::similar(name.trim(), limit);
        if let Some(CachedAggregate::Summaries(similar)) = self.cache.get(&key) {
            return Ok(similar);
        }

        let (all, read_at) = self.stamped_clans().await?;
        let similar: Arc<[ClanSummary]> = clan::similar_clans(name, &all, limit).into();
        self.cache
            .set_at(key, CachedAggregate::Summaries(Arc::clone(&similar)), read_at);
        Ok(similar)
    }

    pub async fn clan_rank(&self, name: &str) -> Result<Option<usize>> {
        let all = self.all_clans().await?;
        Ok(clan::clan_rank(name, &all))
    }

    /// Clan stats with one page of its members.
    pub async fn clan_detail(&self, name: &str, page: usize) -> Result<ClanDetail> {
        let clan = match self.clan_by_name(name).await? {
            ClanLookup::Found(clan) => Arc::new(clan),
            ClanLookup::Ambiguous(candidates) => {
                return Err(RankingError::AmbiguousMatch(
                    candidates.into_iter().map(|c| c.name).collect(),
                ))
            }
            ClanLookup::NotFound => return Err(RankingError::NotFound(format!("clan {}", name))),
        };

        let rank = self.clan_rank(&clan.name).await?;
        let page_size = self.config.clan_members_per_page;
        let cursor = Cursor::new(clan.members.len(), page_size).at(page);
        let members = cursor::paginate(&clan.members, page_size, cursor.page).to_vec();

        Ok(ClanDetail {
            rank,
            kd_ratio: clan.kd_ratio(),
            online_time: format_online_time(clan.total_time_online),
            last_activity: clan.last_activity(),
            cursor,
            members,
            clan,
        })
    }

    pub async fn user_rank(&self, hash: &PlayerHash) -> Result<Option<usize>> {
        let population = self
            .store
            .top_players(Board::AllTime, None)
            .await
            .map_err(RankingError::upstream("rank population"))?;
        Ok(resolve_rank(hash, &population))
    }

    /// Looks a player up by name, falling back to the hash.
    ///
    /// A single name match wins. With several, an exact (case-insensitive)
    /// name among them is taken, otherwise the input is tried as a hash.
    pub async fn user_profile(&self, name_or_hash: &str) -> Result<UserProfile> {
        let query = name_or_hash.trim();
        if query.is_empty() {
            return Err(RankingError::NotFound("player".to_string()));
        }

        let matches = self
            .store
            .find_players_by_name(query)
            .await
            .map_err(RankingError::upstream("player by name"))?;

        let found = match matches.as_slice() {
            [only] => Some(only.clone()),
            many => many
                .iter()
                .find(|p| p.name.eq_ignore_ascii_case(query))
                .cloned(),
        };

        let player = match found {
            Some(player) => player,
            None => self
                .store
                .find_player_by_hash(&PlayerHash::from(query))
                .await
                .map_err(RankingError::upstream("player by hash"))?
                .ok_or_else(|| RankingError::NotFound(format!("player {}", query)))?,
        };

        let rank = self.user_rank(&player.hash).await?;
        let (patent, next_patent, progress) = match self.tier_table().await {
            Ok(table) => {
                let resolution = table.resolve(player.score);
                (
                    Some(resolution.current.clone()),
                    resolution.next.cloned(),
                    Some(table.progress(player.score, DEFAULT_BAR_SIZE)?),
                )
            }
            Err(e @ (RankingError::EmptyTierTable | RankingError::DuplicateTier(_))) => {
                tracing::warn!("patent table unusable, showing profile without it: {}", e);
                (None, None, None)
            }
            Err(e) => return Err(e),
        };

        Ok(UserProfile {
            clan: player.clan_name().map(str::to_string),
            kd_ratio: player.kd_ratio(),
            online_time: format_online_time(player.total_time),
            rank,
            patent,
            next_patent,
            progress,
            player,
        })
    }

    pub async fn tier_table(&self) -> Result<Arc<TierTable>> {
        if let Some(CachedAggregate::Tiers(table)) = self.cache.get(keys::PATENTS) {
            return Ok(table);
        }

        let tiers = self
            .store
            .patents()
            .await
            .map_err(RankingError::upstream("patents"))?;
        let table = Arc::new(TierTable::new(tiers)?);
        self.cache
            .set(keys::PATENTS.to_string(), CachedAggregate::Tiers(Arc::clone(&table)));
        Ok(table)
    }

    pub async fn patent(&self, score: i64) -> Result<PatentTier> {
        let table = self.tier_table().await?;
        let current = table.resolve(score).current.clone();
        Ok(current)
    }

    pub async fn patent_progress(&self, score: i64) -> Result<ProgressDescriptor> {
        self.tier_table()
            .await?
            .progress(score, DEFAULT_BAR_SIZE)
    }

    pub fn clear_cache(&self) {
        let dropped = self.cache.len();
        self.cache.clear();
        tracing::info!("cleared {} cached aggregates", dropped);
    }

    /// Snapshots a ranking and opens a paged session over it. With `search`,
    /// the session starts on the page holding the first matching name.
    pub async fn open_ranking(
        &self,
        view: RankingView,
        owner: Option<String>,
        limit: Option<usize>,
        search: Option<&str>,
    ) -> Result<RankingPage> {
        let limit = limit.unwrap_or(self.config.default_limit);
        let rows: Vec<RankingRow> = match view {
            RankingView::Players => self
                .top_players(limit)
                .await?
                .iter()
                .enumerate()
                .map(|(idx, player)| RankingRow::player(idx + 1, player))
                .collect(),
            RankingView::Season => self
                .season_top_players(limit)
                .await?
                .iter()
                .enumerate()
                .map(|(idx, player)| RankingRow::player(idx + 1, player))
                .collect(),
            RankingView::Clans => self
                .top_clans(limit)
                .await?
                .iter()
                .enumerate()
                .map(|(idx, clan)| RankingRow::clan(idx + 1, clan, self.config.clan_rank_field))
                .collect(),
        };

        let page_size = self.config.players_per_page;
        let highlight = match search.map(str::trim).filter(|term| !term.is_empty()) {
            Some(term) => {
                let located = cursor::locate(&rows, term, page_size, |row| row.name.as_str())
                    .ok_or_else(|| RankingError::NotFound(format!("{} in ranking", term)))?;
                Some(located.index)
            }
            None => None,
        };

        let session = self
            .sessions
            .open(owner, RankingSnapshot { view, rows }, page_size, highlight)
            .await;
        let guard = session.lock().await;
        Ok(page_of(&guard))
    }

    pub async fn navigate_ranking(
        &self,
        session_id: &str,
        requester: Option<&str>,
        nav: Navigation,
    ) -> Result<RankingPage> {
        self.sessions
            .navigate(session_id, requester, nav, page_of)
            .await
    }
}

fn page_of(session: &cursor::Session<RankingSnapshot>) -> RankingPage {
    RankingPage {
        session_id: session.id.clone(),
        view: session.snapshot.view,
        page: session.cursor.page,
        total_pages: session.cursor.total_pages,
        has_previous: session.cursor.has_previous(),
        has_next: session.cursor.has_next(),
        highlight: session.highlight,
        rows: session.current_page().to_vec(),
    }
}
