use serde::Deserialize;
use std::net::SocketAddr;
use std::time::Duration;

use crate::clan::ClanRankField;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub web: Web,
    pub mongo: Mongo,
    #[serde(default)]
    pub discord: Discord,
    #[serde(default)]
    pub podium: Podium,
    #[serde(default)]
    pub cache: Cache,
    #[serde(default)]
    pub ranking: Ranking,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Web {
    pub host: SocketAddr,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Mongo {
    pub url: String,
    #[serde(default = "default_database")]
    pub database: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Discord {
    /// Falls back to the `DISCORD_TOKEN` environment variable.
    #[serde(default)]
    pub token: Option<String>,
    /// Guild searched when a link request names a user instead of an id.
    #[serde(default)]
    pub guild_id: Option<String>,
}

impl Discord {
    pub fn resolve_token(&self) -> Option<String> {
        self.token
            .clone()
            .or_else(|| std::env::var("DISCORD_TOKEN").ok())
            .filter(|token| !token.trim().is_empty())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Podium {
    #[serde(default)]
    pub top_players_channel: Option<String>,
    #[serde(default)]
    pub top_clans_channel: Option<String>,
    #[serde(default)]
    pub monthly_top_players_channel: Option<String>,
    #[serde(default)]
    pub patents_info_channel: Option<String>,
    #[serde(default = "default_podium_interval")]
    pub interval_secs: u64,
    #[serde(default = "default_podium_size")]
    pub size: usize,
}

impl Default for Podium {
    fn default() -> Self {
        Self {
            top_players_channel: None,
            top_clans_channel: None,
            monthly_top_players_channel: None,
            patents_info_channel: None,
            interval_secs: default_podium_interval(),
            size: default_podium_size(),
        }
    }
}

impl Podium {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Cache {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_cache_ttl")]
    pub ttl_secs: u64,
    #[serde(default = "default_cache_entries")]
    pub max_entries: usize,
}

impl Default for Cache {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_secs: default_cache_ttl(),
            max_entries: default_cache_entries(),
        }
    }
}

impl Cache {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Ranking {
    #[serde(default)]
    pub clan_rank_field: ClanRankField,
    #[serde(default = "default_limit")]
    pub default_limit: usize,
    #[serde(default = "default_players_per_page")]
    pub players_per_page: usize,
    #[serde(default = "default_members_per_page")]
    pub clan_members_per_page: usize,
    #[serde(default = "default_session_timeout")]
    pub session_timeout_secs: u64,
}

impl Default for Ranking {
    fn default() -> Self {
        Self {
            clan_rank_field: ClanRankField::default(),
            default_limit: default_limit(),
            players_per_page: default_players_per_page(),
            clan_members_per_page: default_members_per_page(),
            session_timeout_secs: default_session_timeout(),
        }
    }
}

impl Ranking {
    pub fn session_timeout(&self) -> Duration {
        Duration::from_secs(self.session_timeout_secs)
    }
}

fn default_database() -> String {
    "database".to_string()
}

fn default_podium_interval() -> u64 {
    60
}

fn default_podium_size() -> usize {
    25
}

fn default_true() -> bool {
    true
}

fn default_cache_ttl() -> u64 {
    5 * 60
}

fn default_cache_entries() -> usize {
    100
}

fn default_limit() -> usize {
    500
}

fn default_players_per_page() -> usize {
    6
}

fn default_members_per_page() -> usize {
    5
}

fn default_session_timeout() -> u64 {
    5 * 60
}
