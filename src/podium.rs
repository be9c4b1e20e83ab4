//! Leaderboard messages kept up to date in fixed channels.

use std::collections::BTreeMap;
use tokio::sync::RwLock;

use crate::clan::{ClanAggregate, ClanRankField};
use crate::discord::{ChatPlatform, Embed, Message, MessagePayload, COLOR_GOLD};
use crate::patent::{render_progress, TierTable};
use crate::player::PlayerRecord;
use crate::ranking::RankingService;

/// Embeds hold at most 25 fields.
const MAX_FIELDS: usize = 25;
const TOP_PLAYERS_SIZE: usize = 6;
const MEDALS: [&str; 3] = ["👑", "🥈", "🥉"];
const NO_PATENT: &str = "-";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PodiumKind {
    TopPlayers,
    TopClans,
    MonthlyTopPlayers,
    PatentsInfo,
}

impl PodiumKind {
    pub fn name(self) -> &'static str {
        match self {
            PodiumKind::TopPlayers => "top players",
            PodiumKind::TopClans => "top clans",
            PodiumKind::MonthlyTopPlayers => "monthly top players",
            PodiumKind::PatentsInfo => "patents info",
        }
    }

    /// Patents info is posted once at startup; the rest refresh on a timer.
    pub fn is_recurring(self) -> bool {
        !matches!(self, PodiumKind::PatentsInfo)
    }
}

/// One podium message. Remembers the id of the message it posted so later
/// refreshes edit it in place.
pub struct Podium {
    kind: PodiumKind,
    channel_id: String,
    size: usize,
    message_id: RwLock<Option<String>>,
}

impl Podium {
    pub fn new(kind: PodiumKind, channel_id: impl Into<String>, size: usize) -> Self {
        let size = match kind {
            PodiumKind::TopPlayers => TOP_PLAYERS_SIZE,
            _ => size.clamp(1, MAX_FIELDS),
        };

        Self {
            kind,
            channel_id: channel_id.into(),
            size,
            message_id: RwLock::new(None),
        }
    }

    pub fn kind(&self) -> PodiumKind {
        self.kind
    }

    /// `None` when there is nothing to show yet.
    pub async fn render(&self, ranking: &RankingService) -> anyhow::Result<Option<MessagePayload>> {
        let tiers = match ranking.tier_table().await {
            Ok(table) => Some(table),
            Err(e) => {
                tracing::warn!("rendering {} without patents: {}", self.kind.name(), e);
                None
            }
        };

        let payload = match self.kind {
            PodiumKind::TopPlayers => {
                let players = ranking.top_players(self.size).await?;
                render_top_players(&players, tiers.as_deref())
            }
            PodiumKind::MonthlyTopPlayers => {
                let players = ranking.season_top_players(self.size).await?;
                render_monthly_players(&players)
            }
            PodiumKind::TopClans => {
                let clans = ranking.top_clans(self.size).await?;
                render_top_clans(&clans, ranking.config().clan_rank_field)
            }
            PodiumKind::PatentsInfo => tiers.as_deref().map(render_patents_info),
        };

        Ok(payload)
    }

    pub async fn refresh(&self, ranking: &RankingService, chat: &dyn ChatPlatform) -> anyhow::Result<()> {
        match self.render(ranking).await? {
            Some(payload) => {
                self.publish(chat, &payload).await?;
            }
            None => tracing::info!("nothing to show on the {} podium yet", self.kind.name()),
        }
        Ok(())
    }

    /// Edits the previous message, or sends a new one when there is none or
    /// it was deleted.
    pub async fn publish(&self, chat: &dyn ChatPlatform, payload: &MessagePayload) -> anyhow::Result<Message> {
        let previous = self.message_id.read().await.clone();
        if let Some(message_id) = previous {
            match chat.edit_message(&self.channel_id, &message_id, payload).await? {
                Some(message) => return Ok(message),
                None => tracing::info!(
                    "{} podium message {} is gone, sending a new one",
                    self.kind.name(),
                    message_id
                ),
            }
        }

        let message = chat.create_message(&self.channel_id, payload).await?;
        *self.message_id.write().await = Some(message.id.clone());
        Ok(message)
    }
}

/// Podiums for every channel present in the config.
pub fn from_config(config: &crate::config::Podium) -> Vec<Podium> {
    [
        (PodiumKind::TopPlayers, &config.top_players_channel),
        (PodiumKind::TopClans, &config.top_clans_channel),
        (PodiumKind::MonthlyTopPlayers, &config.monthly_top_players_channel),
        (PodiumKind::PatentsInfo, &config.patents_info_channel),
    ]
    .into_iter()
    .filter_map(|(kind, channel)| {
        channel
            .as_ref()
            .map(|channel| Podium::new(kind, channel.clone(), config.size))
    })
    .collect()
}

fn place_label(position: usize, name: &str) -> String {
    match MEDALS.get(position - 1) {
        Some(medal) => format!("{} {}. {}", medal, position, name),
        None => format!("{}. {}", position, name),
    }
}

fn patent_label(tiers: Option<&TierTable>, score: i64) -> String {
    tiers
        .map(|table| table.resolve(score).current.display())
        .unwrap_or_else(|| NO_PATENT.to_string())
}

/// Rows run from the last place up so the leader sits at the bottom, next to
/// the newest chat messages.
fn bottom_up<T>(items: &[T]) -> impl Iterator<Item = (usize, &T)> {
    items.iter().enumerate().rev().map(|(idx, item)| (idx + 1, item))
}

pub fn render_top_players(players: &[PlayerRecord], tiers: Option<&TierTable>) -> Option<MessagePayload> {
    if players.is_empty() {
        return None;
    }

    let mut embed = Embed::new(format!("🏆 Top {} players", players.len()))
        .description("Best players on the server.")
        .color(0x2b2d31);

    for (position, player) in bottom_up(players) {
        let mut value = format!(
            "> Patent: **{}**\n> Score: **{}**\n> TWS: **{}**\n> K/D: **{}/{}**",
            patent_label(tiers, player.score),
            player.score,
            player.team_work_score,
            player.kills,
            player.deaths,
        );
        if position == 1 {
            if let Some(progress) = tiers.and_then(|t| render_progress(player.score, t).ok()) {
                value.push_str(&format!("\n> {}", progress));
            }
        }
        embed = embed.field(place_label(position, &player.name), value, false);
    }

    Some(MessagePayload::embed(embed.timestamp(chrono::Utc::now())))
}

pub fn render_monthly_players(players: &[PlayerRecord]) -> Option<MessagePayload> {
    if players.is_empty() {
        return None;
    }

    let mut embed = Embed::new(format!("🏅 Monthly top {} - score", players.len())).color(COLOR_GOLD);
    for (position, player) in bottom_up(players) {
        embed = embed.field(
            place_label(position, &player.name),
            format!(
                "> Score: **{}**\n> K/D: **{}/{}** ({:.2})",
                player.score,
                player.kills,
                player.deaths,
                player.kd_ratio(),
            ),
            false,
        );
    }

    Some(MessagePayload::embed(embed.timestamp(chrono::Utc::now())))
}

pub fn render_top_clans(clans: &[ClanAggregate], field: ClanRankField) -> Option<MessagePayload> {
    if clans.is_empty() {
        return None;
    }

    let ranked_by = match field {
        ClanRankField::Points => "clan points",
        ClanRankField::TotalScore => "total score",
    };
    let mut embed = Embed::new(format!("🏆 Top {} clans", clans.len()))
        .description(format!("Clans ranked by {}.", ranked_by))
        .color(0xffd700);

    for (position, clan) in bottom_up(clans) {
        let last_activity = clan
            .last_activity()
            .map(|at| at.format("%d/%m/%Y").to_string())
            .unwrap_or_else(|| "N/A".to_string());

        embed = embed.field(
            place_label(position, &clan.name),
            format!(
                "> Members: {}\n> Points: {}\n> Score: {}\n> Teamwork: {}\n> K/D: {} / {} ({:.2})\n> Last activity: {}",
                clan.member_count,
                clan.points,
                clan.total_score,
                clan.total_team_work_score,
                clan.total_kills,
                clan.total_deaths,
                clan.kd_ratio(),
                last_activity,
            ),
            false,
        );
    }

    Some(MessagePayload::embed(embed.timestamp(chrono::Utc::now())))
}

/// Every tier with its score range, grouped by tier type.
pub fn render_patents_info(table: &TierTable) -> MessagePayload {
    let mut groups: BTreeMap<&str, Vec<String>> = BTreeMap::new();
    for range in table.ranges() {
        let group = range.tier.kind.as_deref().unwrap_or("Default");
        let line = match range.to {
            Some(to) => format!("**{}** - {} to {} points", range.tier.text, range.from, to),
            None => format!("**{}** - {}+ points", range.tier.text, range.from),
        };
        groups.entry(group).or_default().push(line);
    }

    let mut embed = Embed::new("🏆 Patent system")
        .description("Every patent on the server and the score it takes to reach it.")
        .color(0x1abc9c);
    for (group, lines) in groups {
        embed = embed.field(format!("📈 {} patents", group), lines.join("\n"), false);
    }

    MessagePayload::embed(embed.timestamp(chrono::Utc::now()))
}
