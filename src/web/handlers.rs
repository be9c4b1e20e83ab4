use std::{convert::Infallible, sync::Arc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use warp::http::StatusCode;
use warp::reply::Response;
use warp::Reply;

use crate::cursor::Navigation;
use crate::discord::resolve_user;
use crate::error::RankingError;
use crate::favorites::{self, FavoriteError};
use crate::link::{confirmation_message, LinkError};
use crate::player::FavoriteMap;
use crate::ranking::RankingView;
use super::State;

fn json_reply<T: Serialize>(body: &T, status: StatusCode) -> Response {
    warp::reply::with_status(warp::reply::json(body), status).into_response()
}

fn error_reply(status: StatusCode, message: impl ToString) -> Response {
    json_reply(&json!({ "error": message.to_string() }), status)
}

fn chat_unavailable() -> Response {
    error_reply(StatusCode::SERVICE_UNAVAILABLE, "discord client is not configured")
}

fn ranking_error(e: RankingError) -> Response {
    let status = match &e {
        RankingError::NotFound(_) => StatusCode::NOT_FOUND,
        RankingError::AmbiguousMatch(candidates) => {
            return json_reply(
                &json!({ "error": e.to_string(), "candidates": candidates }),
                StatusCode::CONFLICT,
            );
        }
        RankingError::SessionExpired => StatusCode::GONE,
        RankingError::NotSessionOwner => StatusCode::FORBIDDEN,
        RankingError::InvalidRange { .. }
        | RankingError::EmptyTierTable
        | RankingError::DuplicateTier(_)
        | RankingError::Upstream { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    };

    if !e.is_user_facing() {
        tracing::error!("ranking request failed: {:?}", e);
    }
    error_reply(status, e)
}

fn link_error(e: LinkError) -> Response {
    let status = e.status();
    if status.is_server_error() {
        tracing::error!("link request failed: {:?}", e);
    }
    error_reply(status, e)
}

fn favorite_error(e: FavoriteError) -> Response {
    let status = e.status();
    if status.is_server_error() {
        tracing::error!("favorite request failed: {:?}", e);
    }
    error_reply(status, e)
}

pub async fn health_handler() -> std::result::Result<impl Reply, Infallible> {
    Ok(warp::reply::json(&json!({ "status": "ok" })))
}

/// Resolves the Discord user, stores a pending request and asks the user to
/// confirm by DM.
pub async fn link_handler(
    state: Arc<State>,
    discord_handle: String,
    player_name: String,
) -> std::result::Result<Response, Infallible> {
    let discord_handle = discord_handle.trim();
    let player_name = player_name.trim();
    if discord_handle.is_empty() || player_name.is_empty() {
        return Ok(error_reply(
            StatusCode::BAD_REQUEST,
            "discord user and player name are required",
        ));
    }

    let Some(chat) = state.chat.as_deref() else {
        return Ok(chat_unavailable());
    };

    let user = match resolve_user(chat, discord_handle).await {
        Ok(Some(user)) => user,
        Ok(None) => {
            return Ok(error_reply(
                StatusCode::NOT_FOUND,
                format!("discord user {} not found", discord_handle),
            ))
        }
        Err(e) => {
            tracing::error!("error resolving discord user {}: {:?}", discord_handle, e);
            return Ok(error_reply(StatusCode::BAD_GATEWAY, "could not reach discord"));
        }
    };

    let request = match state.links.create_link_request(&user.id, player_name).await {
        Ok(request) => request,
        Err(e) => return Ok(link_error(e)),
    };

    let message = confirmation_message(&user, &request);
    if let Err(e) = chat.send_dm(&user.id, &message).await {
        tracing::error!("could not DM link request {} to {}: {:?}", request.request_id, user.id, e);
        if let Err(e) = state.links.mark_failed(&request.request_id, &e.to_string()).await {
            tracing::error!("could not mark link request {} as failed: {:?}", request.request_id, e);
        }
        return Ok(error_reply(
            StatusCode::BAD_GATEWAY,
            "could not send the confirmation DM, the user may have DMs disabled",
        ));
    }

    Ok(json_reply(
        &json!({
            "message": format!("confirmation sent to {}", user.username),
            "requestId": request.request_id,
        }),
        StatusCode::OK,
    ))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkButton {
    pub custom_id: String,
    pub user_id: String,
}

pub async fn link_button_handler(
    state: Arc<State>,
    button: LinkButton,
) -> std::result::Result<Response, Infallible> {
    Ok(match state.links.handle_button(&button.custom_id, &button.user_id).await {
        Ok((action, player_name)) => json_reply(
            &json!({ "action": action, "playerName": player_name }),
            StatusCode::OK,
        ),
        Err(e) => link_error(e),
    })
}

#[derive(Debug, Deserialize)]
pub struct MapNotification {
    pub name: Option<String>,
    pub mode: Option<String>,
    pub author: Option<String>,
}

pub async fn notify_handler(
    state: Arc<State>,
    body: MapNotification,
) -> std::result::Result<Response, Infallible> {
    let (Some(name), Some(mode)) = (
        body.name.filter(|n| !n.trim().is_empty()),
        body.mode.filter(|m| !m.trim().is_empty()),
    ) else {
        return Ok(error_reply(StatusCode::BAD_REQUEST, "name and mode are required"));
    };

    let Some(chat) = state.chat.as_deref() else {
        return Ok(chat_unavailable());
    };

    let map = FavoriteMap::new(name.trim(), mode.trim());
    Ok(match state.favorites.notify(chat, &map, body.author.as_deref()).await {
        Ok(summary) => json_reply(&summary, StatusCode::OK),
        Err(e) => favorite_error(e),
    })
}

pub async fn player_handler(
    state: Arc<State>,
    name_or_hash: String,
) -> std::result::Result<Response, Infallible> {
    Ok(match state.ranking.user_profile(&name_or_hash).await {
        Ok(profile) => json_reply(&profile, StatusCode::OK),
        Err(e) => ranking_error(e),
    })
}

#[derive(Debug, Default, Deserialize)]
pub struct LimitQuery {
    pub limit: Option<usize>,
}

pub async fn clans_handler(
    state: Arc<State>,
    query: LimitQuery,
) -> std::result::Result<Response, Infallible> {
    let limit = query.limit.unwrap_or(state.ranking.config().default_limit);
    Ok(match state.ranking.top_clans(limit).await {
        Ok(clans) => json_reply(&clans, StatusCode::OK),
        Err(e) => ranking_error(e),
    })
}

#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<usize>,
}

pub async fn clan_handler(
    state: Arc<State>,
    name: String,
    query: PageQuery,
) -> std::result::Result<Response, Infallible> {
    Ok(match state.ranking.clan_detail(&name, query.page.unwrap_or(0)).await {
        Ok(detail) => json_reply(&detail, StatusCode::OK),
        Err(e) => ranking_error(e),
    })
}

#[derive(Debug, Default, Deserialize)]
pub struct SimilarQuery {
    pub limit: Option<usize>,
}

pub async fn similar_clans_handler(
    state: Arc<State>,
    name: String,
    query: SimilarQuery,
) -> std::result::Result<Response, Infallible> {
    let limit = query.limit.unwrap_or(10);
    Ok(match state.ranking.find_similar_clans(&name, limit).await {
        Ok(similar) => json_reply(&similar, StatusCode::OK),
        Err(e) => ranking_error(e),
    })
}

pub async fn patents_handler(state: Arc<State>) -> std::result::Result<Response, Infallible> {
    Ok(match state.ranking.tier_table().await {
        Ok(table) => json_reply(&table.tiers(), StatusCode::OK),
        Err(e) => ranking_error(e),
    })
}

pub async fn patent_progress_handler(
    state: Arc<State>,
    score: i64,
) -> std::result::Result<Response, Infallible> {
    let patent = match state.ranking.patent(score).await {
        Ok(patent) => patent,
        Err(e) => return Ok(ranking_error(e)),
    };

    Ok(match state.ranking.patent_progress(score).await {
        Ok(progress) => json_reply(&json!({ "patent": patent, "progress": progress }), StatusCode::OK),
        Err(e) => ranking_error(e),
    })
}

#[derive(Debug, Default, Deserialize)]
pub struct OpenRanking {
    pub owner: Option<String>,
    pub limit: Option<usize>,
    pub search: Option<String>,
}

pub async fn open_ranking_handler(
    state: Arc<State>,
    view: String,
    body: OpenRanking,
) -> std::result::Result<Response, Infallible> {
    let Ok(view) = view.parse::<RankingView>() else {
        return Ok(error_reply(
            StatusCode::BAD_REQUEST,
            format!("unknown ranking {}, expected players, season or clans", view),
        ));
    };

    Ok(match state
        .ranking
        .open_ranking(view, body.owner, body.limit, body.search.as_deref())
        .await
    {
        Ok(page) => json_reply(&page, StatusCode::OK),
        Err(e) => ranking_error(e),
    })
}

#[derive(Debug, Default, Deserialize)]
pub struct NavigateRanking {
    pub owner: Option<String>,
}

pub async fn navigate_ranking_handler(
    state: Arc<State>,
    session_id: String,
    action: String,
    body: NavigateRanking,
) -> std::result::Result<Response, Infallible> {
    let Ok(nav) = action.parse::<Navigation>() else {
        return Ok(error_reply(
            StatusCode::BAD_REQUEST,
            format!("unknown action {}, expected first, previous, next or last", action),
        ));
    };

    Ok(match state
        .ranking
        .navigate_ranking(&session_id, body.owner.as_deref(), nav)
        .await
    {
        Ok(page) => json_reply(&page, StatusCode::OK),
        Err(e) => ranking_error(e),
    })
}

pub async fn list_favorites_handler(
    state: Arc<State>,
    discord_user_id: String,
) -> std::result::Result<Response, Infallible> {
    Ok(match state.favorites.list(&discord_user_id).await {
        Ok(maps) => json_reply(&json!({ "favorites": maps }), StatusCode::OK),
        Err(e) => favorite_error(e),
    })
}

#[derive(Debug, Default, Deserialize)]
pub struct FavoriteBody {
    pub name: Option<String>,
    pub mode: Option<String>,
    /// `"<map> - <mode>"`, as offered by autocomplete.
    pub combination: Option<String>,
}

pub async fn add_favorite_handler(
    state: Arc<State>,
    discord_user_id: String,
    body: FavoriteBody,
) -> std::result::Result<Response, Infallible> {
    let (Some(name), Some(mode)) = (body.name, body.mode) else {
        return Ok(error_reply(StatusCode::BAD_REQUEST, "name and mode are required"));
    };

    Ok(match state.favorites.add(&discord_user_id, &name, &mode).await {
        Ok(maps) => json_reply(&json!({ "favorites": maps }), StatusCode::OK),
        Err(e) => favorite_error(e),
    })
}

pub async fn remove_favorite_handler(
    state: Arc<State>,
    discord_user_id: String,
    body: FavoriteBody,
) -> std::result::Result<Response, Infallible> {
    let result = match (body.combination, body.name, body.mode) {
        (Some(combination), _, _) => {
            state
                .favorites
                .remove_combination(&discord_user_id, &combination)
                .await
        }
        (None, Some(name), Some(mode)) => {
            state
                .favorites
                .remove(&discord_user_id, &FavoriteMap::new(name, mode))
                .await
        }
        _ => {
            return Ok(error_reply(
                StatusCode::BAD_REQUEST,
                "combination, or name and mode, are required",
            ))
        }
    };

    Ok(match result {
        Ok(maps) => json_reply(&json!({ "favorites": maps }), StatusCode::OK),
        Err(e) => favorite_error(e),
    })
}

#[derive(Debug, Default, Deserialize)]
pub struct AutocompleteQuery {
    #[serde(default)]
    pub q: String,
}

pub async fn favorites_autocomplete_handler(
    state: Arc<State>,
    discord_user_id: String,
    query: AutocompleteQuery,
) -> std::result::Result<Response, Infallible> {
    Ok(match state
        .favorites
        .autocomplete_favorites(&discord_user_id, &query.q)
        .await
    {
        Ok(choices) => json_reply(&choices, StatusCode::OK),
        Err(e) => favorite_error(e),
    })
}

pub async fn maps_autocomplete_handler(
    query: AutocompleteQuery,
) -> std::result::Result<impl Reply, Infallible> {
    Ok(warp::reply::json(&favorites::autocomplete_maps(&query.q)))
}

pub async fn clear_cache_handler(state: Arc<State>) -> std::result::Result<impl Reply, Infallible> {
    state.ranking.clear_cache();
    Ok(warp::reply::json(&json!({ "status": "cleared" })))
}
