use chrono::{DateTime, Utc};
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Content-derived player identity, the join key for every aggregation.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize)]
#[serde(transparent)]
pub struct PlayerHash(pub String);

impl PlayerHash {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PlayerHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PlayerHash {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Player statistics as written by the game server ingestion.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PlayerRecord {
    pub hash: PlayerHash,
    /// Display name, possibly prefixed with a clan tag. Never used as a key.
    #[serde(default)]
    pub name: String,
    #[serde(default, deserialize_with = "lenient_i64")]
    pub score: i64,
    #[serde(default, deserialize_with = "lenient_i64")]
    pub team_work_score: i64,
    #[serde(default, deserialize_with = "lenient_i64")]
    pub kills: i64,
    #[serde(default, deserialize_with = "lenient_i64")]
    pub deaths: i64,
    #[serde(default, deserialize_with = "lenient_i64")]
    pub rounds: i64,
    /// Seconds online.
    #[serde(default, deserialize_with = "lenient_i64")]
    pub total_time: i64,
    #[serde(
        default,
        deserialize_with = "optional_bson_datetime",
        skip_serializing_if = "Option::is_none"
    )]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discord_user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub favorite_maps: Vec<FavoriteMap>,
}

impl PlayerRecord {
    pub fn new(hash: impl Into<String>, name: impl Into<String>, score: i64) -> Self {
        Self {
            hash: PlayerHash(hash.into()),
            name: name.into(),
            score,
            team_work_score: 0,
            kills: 0,
            deaths: 0,
            rounds: 0,
            total_time: 0,
            updated_at: None,
            discord_user_id: None,
            favorite_maps: Vec::new(),
        }
    }

    pub fn clan_name(&self) -> Option<&str> {
        extract_clan_name(&self.name)
    }

    pub fn kd_ratio(&self) -> f64 {
        kd_ratio(self.kills, self.deaths)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct FavoriteMap {
    pub name: String,
    pub mode: String,
}

impl FavoriteMap {
    pub fn new(name: impl Into<String>, mode: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            mode: mode.into(),
        }
    }
}

impl fmt::Display for FavoriteMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {}", self.name, self.mode)
    }
}

/// Clan tag from a `"TAG player"` display name. A leading space or a name
/// without any space means the player has no clan.
pub fn extract_clan_name(name: &str) -> Option<&str> {
    if name.starts_with(' ') {
        return None;
    }

    let trimmed = name.trim();
    match trimmed.find(' ') {
        Some(idx) if idx > 0 => Some(&trimmed[..idx]),
        _ => None,
    }
}

pub fn kd_ratio(kills: i64, deaths: i64) -> f64 {
    if deaths > 0 {
        kills as f64 / deaths as f64
    } else {
        kills as f64
    }
}

/// `"{days}d {hours}h {minutes}m"` for a duration in seconds.
pub fn format_online_time(seconds: i64) -> String {
    let seconds = seconds.max(0);
    let days = seconds / (3600 * 24);
    let hours = (seconds % (3600 * 24)) / 3600;
    let minutes = (seconds % 3600) / 60;

    format!("{}d {}h {}m", days, hours, minutes)
}

/// Stats written by different game server versions come back as int32,
/// int64 or double; missing and null values count as zero.
fn lenient_i64<'de, D>(de: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    struct NumberVisitor;

    impl<'de> Visitor<'de> for NumberVisitor {
        type Value = i64;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("a number or null")
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<i64, E> {
            Ok(v)
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<i64, E> {
            i64::try_from(v).map_err(|_| E::custom("number out of range"))
        }

        fn visit_f64<E: de::Error>(self, v: f64) -> Result<i64, E> {
            if v.is_finite() {
                Ok(v as i64)
            } else {
                Err(E::custom("number is not finite"))
            }
        }

        fn visit_unit<E: de::Error>(self) -> Result<i64, E> {
            Ok(0)
        }

        fn visit_none<E: de::Error>(self) -> Result<i64, E> {
            Ok(0)
        }

        fn visit_some<D: Deserializer<'de>>(self, de: D) -> Result<i64, D::Error> {
            lenient_i64(de)
        }
    }

    de.deserialize_any(NumberVisitor)
}

fn optional_bson_datetime<'de, D>(de: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let value: Option<mongodb::bson::DateTime> = Deserialize::deserialize(de)?;
    Ok(value.map(|dt| dt.to_chrono()))
}
