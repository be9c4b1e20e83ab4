//! Clan aggregation over the player population.
//!
//! A clan is either declared in the `clan` collection (with an explicit roster
//! of player hashes, or by name only) or inferred from the tag players carry
//! in front of their display names.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::{Ordering, Reverse};
use std::collections::{BTreeMap, HashSet};

use crate::player::{extract_clan_name, kd_ratio, PlayerHash, PlayerRecord};

/// Override record from the `clan` collection.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClanMetadata {
    pub name: String,
    #[serde(default)]
    pub points: Option<i64>,
    #[serde(default)]
    pub members_hash: Option<Vec<PlayerHash>>,
}

/// How a clan's members were found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Membership {
    Roster,
    NameDerived,
}

/// Field that orders the clan leaderboard.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ClanRankField {
    #[default]
    Points,
    TotalScore,
}

/// Projection of a member kept on the aggregate.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClanMember {
    pub hash: PlayerHash,
    pub name: String,
    pub score: i64,
    pub kills: i64,
    pub deaths: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl From<&PlayerRecord> for ClanMember {
    fn from(player: &PlayerRecord) -> Self {
        Self {
            hash: player.hash.clone(),
            name: player.name.clone(),
            score: player.score,
            kills: player.kills,
            deaths: player.deaths,
            updated_at: player.updated_at,
        }
    }
}

impl ClanMember {
    pub fn kd_ratio(&self) -> f64 {
        kd_ratio(self.kills, self.deaths)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClanAggregate {
    pub name: String,
    pub membership: Membership,
    pub member_count: usize,
    pub points: i64,
    pub total_score: i64,
    pub total_team_work_score: i64,
    pub total_kills: i64,
    pub total_deaths: i64,
    pub total_time_online: i64,
    /// Sorted by score, best first.
    pub members: Vec<ClanMember>,
}

impl ClanAggregate {
    fn from_members(
        name: String,
        membership: Membership,
        points: i64,
        members: &[&PlayerRecord],
    ) -> Self {
        let mut aggregate = Self {
            name,
            membership,
            member_count: members.len(),
            points,
            total_score: 0,
            total_team_work_score: 0,
            total_kills: 0,
            total_deaths: 0,
            total_time_online: 0,
            members: Vec::with_capacity(members.len()),
        };

        for player in members {
            aggregate.total_score += player.score;
            aggregate.total_team_work_score += player.team_work_score;
            aggregate.total_kills += player.kills;
            aggregate.total_deaths += player.deaths;
            aggregate.total_time_online += player.total_time;
            aggregate.members.push(ClanMember::from(*player));
        }

        aggregate
            .members
            .sort_by(|a, b| (Reverse(a.score), &a.hash).cmp(&(Reverse(b.score), &b.hash)));
        aggregate
    }

    pub fn rank_value(&self, field: ClanRankField) -> i64 {
        match field {
            ClanRankField::Points => self.points,
            ClanRankField::TotalScore => self.total_score,
        }
    }

    pub fn kd_ratio(&self) -> f64 {
        kd_ratio(self.total_kills, self.total_deaths)
    }

    /// Most recent `updatedAt` among members.
    pub fn last_activity(&self) -> Option<DateTime<Utc>> {
        self.members.iter().filter_map(|m| m.updated_at).max()
    }

    pub fn summary(&self) -> ClanSummary {
        ClanSummary {
            name: self.name.clone(),
            member_count: self.member_count,
            points: self.points,
        }
    }
}

/// Lightweight row for suggestion lists.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClanSummary {
    pub name: String,
    pub member_count: usize,
    pub points: i64,
}

/// Outcome of a single-clan lookup. Ambiguity is surfaced, never resolved.
#[derive(Debug, Clone, PartialEq)]
pub enum ClanLookup {
    Found(ClanAggregate),
    Ambiguous(Vec<ClanSummary>),
    NotFound,
}

pub fn clan_order(field: ClanRankField) -> impl Fn(&ClanAggregate, &ClanAggregate) -> Ordering {
    move |a, b| {
        (Reverse(a.rank_value(field)), &a.name).cmp(&(Reverse(b.rank_value(field)), &b.name))
    }
}

/// Builds every clan from the population, ordered best first.
///
/// With metadata, one aggregate per metadata record: its roster when it has
/// one, otherwise the players whose tag matches its name. Without metadata,
/// clans are grouped by name tag and carry zero points.
pub fn aggregate_clans(
    population: &[PlayerRecord],
    roster: Option<&[ClanMetadata]>,
    rank_by: ClanRankField,
) -> Vec<ClanAggregate> {
    let mut clans = match roster {
        Some(metadata) if !metadata.is_empty() => metadata
            .iter()
            .map(|meta| aggregate_declared(population, meta))
            .collect(),
        _ => aggregate_by_tag(population),
    };

    clans.sort_by(clan_order(rank_by));
    clans
}

fn aggregate_declared(population: &[PlayerRecord], meta: &ClanMetadata) -> ClanAggregate {
    let points = meta.points.unwrap_or(0);
    match &meta.members_hash {
        Some(hashes) => {
            let roster: HashSet<&PlayerHash> = hashes.iter().collect();
            let members: Vec<&PlayerRecord> = population
                .iter()
                .filter(|player| roster.contains(&player.hash))
                .collect();
            ClanAggregate::from_members(meta.name.clone(), Membership::Roster, points, &members)
        }
        None => {
            let wanted = meta.name.to_lowercase();
            let members: Vec<&PlayerRecord> = population
                .iter()
                .filter(|player| {
                    player
                        .clan_name()
                        .is_some_and(|tag| tag.to_lowercase() == wanted)
                })
                .collect();
            ClanAggregate::from_members(meta.name.clone(), Membership::NameDerived, points, &members)
        }
    }
}

fn aggregate_by_tag(population: &[PlayerRecord]) -> Vec<ClanAggregate> {
    let mut groups: BTreeMap<&str, Vec<&PlayerRecord>> = BTreeMap::new();
    for player in population {
        if let Some(tag) = extract_clan_name(&player.name) {
            groups.entry(tag).or_default().push(player);
        }
    }

    groups
        .into_iter()
        .map(|(tag, members)| {
            ClanAggregate::from_members(tag.to_string(), Membership::NameDerived, 0, &members)
        })
        .collect()
}

/// Exact case-insensitive match first, then substring candidates.
pub fn lookup_clan(name: &str, clans: &[ClanAggregate]) -> ClanLookup {
    let needle = name.trim().to_lowercase();
    if needle.is_empty() {
        return ClanLookup::NotFound;
    }

    if let Some(clan) = clans.iter().find(|c| c.name.to_lowercase() == needle) {
        return ClanLookup::Found(clan.clone());
    }

    let candidates: Vec<&ClanAggregate> = clans
        .iter()
        .filter(|c| c.name.to_lowercase().contains(&needle))
        .collect();

    match candidates.as_slice() {
        [] => ClanLookup::NotFound,
        [only] => ClanLookup::Found((*only).clone()),
        many => ClanLookup::Ambiguous(many.iter().map(|c| c.summary()).collect()),
    }
}

/// Substring matches in leaderboard order, at most `limit`.
pub fn similar_clans(name: &str, clans: &[ClanAggregate], limit: usize) -> Vec<ClanSummary> {
    let needle = name.trim().to_lowercase();
    clans
        .iter()
        .filter(|c| c.name.to_lowercase().contains(&needle))
        .take(limit)
        .map(ClanAggregate::summary)
        .collect()
}

/// 1-based position in an already ordered clan list.
pub fn clan_rank(name: &str, clans: &[ClanAggregate]) -> Option<usize> {
    clans.iter().position(|c| c.name == name).map(|idx| idx + 1)
}
