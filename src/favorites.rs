use std::sync::Arc;
use thiserror::Error;
use warp::http::StatusCode;

use crate::discord::{ChatPlatform, Embed, MessagePayload, COLOR_GOLD};
use crate::player::FavoriteMap;
use crate::store::Store;

/// Map names from the community map gallery.
pub const AVAILABLE_MAPS: [&str; 82] = [
    "Al Basrah",
    "Andromeda",
    "Asad Khal",
    "Adak - BETA",
    "Ascheberg",
    "Assault on Grozny",
    "Assault on Mestia",
    "Bamyan",
    "Battle of Debrecen",
    "Battle of Ia Drang",
    "Battle of Kerch",
    "Beirut",
    "Belyaevo",
    "Black Gold",
    "Brecourt Assault",
    "Burning Sands",
    "Carentan",
    "Charlies Point",
    "Deagle5",
    "Donbas",
    "Dovre",
    "Dovre Winter",
    "Dragon Fly",
    "Fallujah West",
    "Fields of Kassel",
    "Fools Road",
    "Gaza",
    "Goose Green",
    "Grostok",
    "Hades Peak",
    "Hill 488",
    "Iron Ridge",
    "Kafr Halab",
    "Karbala",
    "Kashan Desert",
    "Khamisiyah",
    "Kokan",
    "Korbach Offensive - BETA",
    "Korengal Valley",
    "Kozelsk",
    "Krivaja Valley",
    "Kunar Province - BETA",
    "Lashkar Valley",
    "Masirah",
    "Merville",
    "Musa Qala - BETA",
    "Muttrah City",
    "Nuijamaa",
    "Omaha Beach",
    "Operation Barracuda",
    "Operation Bobcat",
    "Operation Brunswick",
    "Operation Falcon",
    "Operation Marlin",
    "Operation Soul Rebel",
    "Operation Thunder - BETA",
    "Outpost",
    "Pavlovsk Bay",
    "Ramiel",
    "Ras el Masri",
    "Reichswald",
    "Road to Damascus - BETA",
    "Route E-106",
    "Rzhev",
    "Saaremaa",
    "Sahel",
    "Sbeneh Outskirts",
    "Shahadah",
    "Shijia Valley",
    "Shipment",
    "Silent Eagle",
    "Stalingrad",
    "Stalingrad Summer",
    "Tad Sae Offensive",
    "The Falklands",
    "Ulyanovsk",
    "Vadso City",
    "Vung Ro",
    "Wanda Shan",
    "Xiangshan",
    "Yamalia",
    "Zakho - BETA",
];

pub const MODES: [&str; 4] = ["AAS", "Insurgency", "Skirmish", "Gungame"];

/// Discord caps autocomplete answers at 25 choices.
const AUTOCOMPLETE_LIMIT: usize = 25;

#[derive(Debug, Error)]
pub enum FavoriteError {
    #[error("unknown map {0}")]
    UnknownMap(String),

    #[error("unknown mode {0}")]
    UnknownMode(String),

    #[error("discord account is not linked to a player")]
    NotLinked,

    #[error("{0} is already a favorite")]
    AlreadyFavorite(FavoriteMap),

    #[error("{0} is not a favorite")]
    NotFavorite(FavoriteMap),

    #[error("invalid format, expected \"Map - Mode\"")]
    InvalidFormat,

    #[error(transparent)]
    Upstream(#[from] anyhow::Error),
}

impl FavoriteError {
    pub fn status(&self) -> StatusCode {
        match self {
            FavoriteError::UnknownMap(_)
            | FavoriteError::UnknownMode(_)
            | FavoriteError::InvalidFormat => StatusCode::BAD_REQUEST,
            FavoriteError::NotLinked | FavoriteError::NotFavorite(_) => StatusCode::NOT_FOUND,
            FavoriteError::AlreadyFavorite(_) => StatusCode::CONFLICT,
            FavoriteError::Upstream(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

pub fn validate(name: &str, mode: &str) -> Result<FavoriteMap, FavoriteError> {
    if !AVAILABLE_MAPS.iter().any(|map| *map == name) {
        return Err(FavoriteError::UnknownMap(name.to_string()));
    }
    if !MODES.iter().any(|known| *known == mode) {
        return Err(FavoriteError::UnknownMode(mode.to_string()));
    }
    Ok(FavoriteMap::new(name, mode))
}

/// Splits `"Map - Mode"`. Map names may contain `" - "` themselves, so the
/// mode is whatever follows the last separator.
pub fn parse_combination(value: &str) -> Result<FavoriteMap, FavoriteError> {
    let (name, mode) = value
        .rsplit_once(" - ")
        .ok_or(FavoriteError::InvalidFormat)?;
    let (name, mode) = (name.trim(), mode.trim());
    if name.is_empty() || mode.is_empty() {
        return Err(FavoriteError::InvalidFormat);
    }
    Ok(FavoriteMap::new(name, mode))
}

/// Map names containing `query`, ignoring case.
pub fn autocomplete_maps(query: &str) -> Vec<&'static str> {
    let query = query.to_lowercase();
    AVAILABLE_MAPS
        .iter()
        .copied()
        .filter(|map| map.to_lowercase().contains(&query))
        .take(AUTOCOMPLETE_LIMIT)
        .collect()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct NotifySummary {
    pub notified: usize,
    pub failed: usize,
    pub total: usize,
}

pub struct FavoriteService {
    store: Arc<dyn Store>,
}

impl FavoriteService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    async fn favorites_of(&self, discord_user_id: &str) -> Result<Vec<FavoriteMap>, FavoriteError> {
        let player = self
            .store
            .find_player_by_discord(discord_user_id)
            .await?
            .ok_or(FavoriteError::NotLinked)?;
        Ok(player.favorite_maps)
    }

    pub async fn list(&self, discord_user_id: &str) -> Result<Vec<FavoriteMap>, FavoriteError> {
        self.favorites_of(discord_user_id).await
    }

    pub async fn add(&self, discord_user_id: &str, name: &str, mode: &str) -> Result<Vec<FavoriteMap>, FavoriteError> {
        let map = validate(name, mode)?;
        let mut favorites = self.favorites_of(discord_user_id).await?;
        if favorites.contains(&map) {
            return Err(FavoriteError::AlreadyFavorite(map));
        }

        favorites.push(map);
        self.store
            .set_favorite_maps(discord_user_id, &favorites)
            .await?;
        Ok(favorites)
    }

    pub async fn remove(&self, discord_user_id: &str, map: &FavoriteMap) -> Result<Vec<FavoriteMap>, FavoriteError> {
        let mut favorites = self.favorites_of(discord_user_id).await?;
        let Some(idx) = favorites.iter().position(|fav| fav == map) else {
            return Err(FavoriteError::NotFavorite(map.clone()));
        };

        favorites.remove(idx);
        self.store
            .set_favorite_maps(discord_user_id, &favorites)
            .await?;
        Ok(favorites)
    }

    /// Removes a `"Map - Mode"` combination as shown by autocomplete.
    pub async fn remove_combination(&self, discord_user_id: &str, combination: &str) -> Result<Vec<FavoriteMap>, FavoriteError> {
        let map = parse_combination(combination)?;
        self.remove(discord_user_id, &map).await
    }

    /// The user's favorites as `"Map - Mode"` strings containing `query`.
    pub async fn autocomplete_favorites(&self, discord_user_id: &str, query: &str) -> Result<Vec<String>, FavoriteError> {
        let query = query.to_lowercase();
        let favorites = match self.favorites_of(discord_user_id).await {
            Ok(favorites) => favorites,
            Err(FavoriteError::NotLinked) => Vec::new(),
            Err(e) => return Err(e),
        };

        Ok(favorites
            .iter()
            .map(FavoriteMap::to_string)
            .filter(|combo| combo.to_lowercase().contains(&query))
            .take(AUTOCOMPLETE_LIMIT)
            .collect())
    }

    /// DMs every linked player who favorited the map that is about to start.
    pub async fn notify(
        &self,
        chat: &dyn ChatPlatform,
        map: &FavoriteMap,
        author: Option<&str>,
    ) -> Result<NotifySummary, FavoriteError> {
        let players = self.store.players_with_favorite(map).await?;
        let mut summary = NotifySummary {
            total: players.len(),
            ..Default::default()
        };

        let message = notification_message(map, author);
        for player in &players {
            let Some(discord_user_id) = player.discord_user_id.as_deref() else {
                continue;
            };

            match chat.send_dm(discord_user_id, &message).await {
                Ok(_) => summary.notified += 1,
                Err(e) => {
                    summary.failed += 1;
                    tracing::warn!("could not notify {} about {}: {:?}", discord_user_id, map, e);
                }
            }
        }

        tracing::info!(
            "favorite map {} notified {}/{} players",
            map,
            summary.notified,
            summary.total
        );
        Ok(summary)
    }
}

pub fn notification_message(map: &FavoriteMap, author: Option<&str>) -> MessagePayload {
    let mut embed = Embed::new("🗺️ Your favorite map is up")
        .description(format!("**{}** ({}) is starting on the server.", map.name, map.mode))
        .color(COLOR_GOLD)
        .timestamp(chrono::Utc::now());
    if let Some(author) = author.filter(|a| !a.trim().is_empty()) {
        embed = embed.footer(format!("Requested by {}", author));
    }
    MessagePayload::embed(embed)
}
