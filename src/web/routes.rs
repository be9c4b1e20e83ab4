use std::sync::Arc;
use warp::{filters::BoxedFilter, Filter, Reply};

use super::handlers;
use super::State;

pub fn router(state: Arc<State>) -> BoxedFilter<(impl Reply,)> {
    health()
        .or(discord_link(Arc::clone(&state)))
        .or(discord_link_button(Arc::clone(&state)))
        .or(favorite_map_notify(Arc::clone(&state)))
        .or(player(Arc::clone(&state)))
        .or(clans(Arc::clone(&state)))
        .or(similar_clans(Arc::clone(&state)))
        .or(clan(Arc::clone(&state)))
        .or(patents(Arc::clone(&state)))
        .or(patent_progress(Arc::clone(&state)))
        .or(open_ranking(Arc::clone(&state)))
        .or(navigate_ranking(Arc::clone(&state)))
        .or(favorites_autocomplete(Arc::clone(&state)))
        .or(list_favorites(Arc::clone(&state)))
        .or(add_favorite(Arc::clone(&state)))
        .or(remove_favorite(Arc::clone(&state)))
        .or(maps_autocomplete())
        .or(clear_cache(state))
        .boxed()
}

fn health() -> BoxedFilter<(impl Reply,)> {
    let route = warp::path("health")
        .and(warp::path::end())
        .and_then(handlers::health_handler);
    warp::get().and(route).boxed()
}

fn discord_link(state: Arc<State>) -> BoxedFilter<(impl Reply,)> {
    let route = warp::path!("api" / "discord" / "link" / String / String)
        .and_then(move |discord: String, player: String| {
            handlers::link_handler(Arc::clone(&state), decode(&discord), decode(&player))
        });
    warp::get().and(route).boxed()
}

fn discord_link_button(state: Arc<State>) -> BoxedFilter<(impl Reply,)> {
    let route = warp::path!("api" / "discord" / "link" / "button")
        .and(warp::body::json())
        .and_then(move |button: handlers::LinkButton| {
            handlers::link_button_handler(Arc::clone(&state), button)
        });
    warp::post().and(route).boxed()
}

fn favorite_map_notify(state: Arc<State>) -> BoxedFilter<(impl Reply,)> {
    let route = warp::path!("api" / "favorite-map" / "notify")
        .and(warp::body::json())
        .and_then(move |body: handlers::MapNotification| {
            handlers::notify_handler(Arc::clone(&state), body)
        });
    warp::post().and(route).boxed()
}

fn player(state: Arc<State>) -> BoxedFilter<(impl Reply,)> {
    let route = warp::path!("api" / "players" / String)
        .and_then(move |query: String| handlers::player_handler(Arc::clone(&state), decode(&query)));
    warp::get().and(route).boxed()
}

fn clans(state: Arc<State>) -> BoxedFilter<(impl Reply,)> {
    let route = warp::path!("api" / "clans")
        .and(warp::query::<handlers::LimitQuery>())
        .and_then(move |query: handlers::LimitQuery| handlers::clans_handler(Arc::clone(&state), query));
    warp::get().and(route).boxed()
}

fn similar_clans(state: Arc<State>) -> BoxedFilter<(impl Reply,)> {
    let route = warp::path!("api" / "clans" / String / "similar")
        .and(warp::query::<handlers::SimilarQuery>())
        .and_then(move |name: String, query: handlers::SimilarQuery| {
            handlers::similar_clans_handler(Arc::clone(&state), decode(&name), query)
        });
    warp::get().and(route).boxed()
}

fn clan(state: Arc<State>) -> BoxedFilter<(impl Reply,)> {
    let route = warp::path!("api" / "clans" / String)
        .and(warp::query::<handlers::PageQuery>())
        .and_then(move |name: String, query: handlers::PageQuery| {
            handlers::clan_handler(Arc::clone(&state), decode(&name), query)
        });
    warp::get().and(route).boxed()
}

fn patents(state: Arc<State>) -> BoxedFilter<(impl Reply,)> {
    let route = warp::path!("api" / "patents")
        .and_then(move || handlers::patents_handler(Arc::clone(&state)));
    warp::get().and(route).boxed()
}

fn patent_progress(state: Arc<State>) -> BoxedFilter<(impl Reply,)> {
    let route = warp::path!("api" / "patents" / i64)
        .and_then(move |score: i64| handlers::patent_progress_handler(Arc::clone(&state), score));
    warp::get().and(route).boxed()
}

fn open_ranking(state: Arc<State>) -> BoxedFilter<(impl Reply,)> {
    let route = warp::path!("api" / "rankings" / String)
        .and(optional_json::<handlers::OpenRanking>())
        .and_then(move |view: String, body: handlers::OpenRanking| {
            handlers::open_ranking_handler(Arc::clone(&state), view, body)
        });
    warp::post().and(route).boxed()
}

fn navigate_ranking(state: Arc<State>) -> BoxedFilter<(impl Reply,)> {
    let route = warp::path!("api" / "rankings" / "sessions" / String / String)
        .and(optional_json::<handlers::NavigateRanking>())
        .and_then(move |id: String, action: String, body: handlers::NavigateRanking| {
            handlers::navigate_ranking_handler(Arc::clone(&state), id, action, body)
        });
    warp::post().and(route).boxed()
}

fn favorites_autocomplete(state: Arc<State>) -> BoxedFilter<(impl Reply,)> {
    let route = warp::path!("api" / "favorites" / String / "autocomplete")
        .and(warp::query::<handlers::AutocompleteQuery>())
        .and_then(move |discord: String, query: handlers::AutocompleteQuery| {
            handlers::favorites_autocomplete_handler(Arc::clone(&state), discord, query)
        });
    warp::get().and(route).boxed()
}

fn list_favorites(state: Arc<State>) -> BoxedFilter<(impl Reply,)> {
    let route = warp::path!("api" / "favorites" / String)
        .and_then(move |discord: String| handlers::list_favorites_handler(Arc::clone(&state), discord));
    warp::get().and(route).boxed()
}

fn add_favorite(state: Arc<State>) -> BoxedFilter<(impl Reply,)> {
    let route = warp::path!("api" / "favorites" / String)
        .and(warp::body::json())
        .and_then(move |discord: String, body: handlers::FavoriteBody| {
            handlers::add_favorite_handler(Arc::clone(&state), discord, body)
        });
    warp::post().and(route).boxed()
}

fn remove_favorite(state: Arc<State>) -> BoxedFilter<(impl Reply,)> {
    let route = warp::path!("api" / "favorites" / String)
        .and(warp::body::json())
        .and_then(move |discord: String, body: handlers::FavoriteBody| {
            handlers::remove_favorite_handler(Arc::clone(&state), discord, body)
        });
    warp::delete().and(route).boxed()
}

fn maps_autocomplete() -> BoxedFilter<(impl Reply,)> {
    let route = warp::path!("api" / "maps" / "autocomplete")
        .and(warp::query::<handlers::AutocompleteQuery>())
        .and_then(handlers::maps_autocomplete_handler);
    warp::get().and(route).boxed()
}

fn clear_cache(state: Arc<State>) -> BoxedFilter<(impl Reply,)> {
    let route = warp::path!("api" / "cache")
        .and_then(move || handlers::clear_cache_handler(Arc::clone(&state)));
    warp::delete().and(route).boxed()
}

/// JSON body that may be left out entirely.
fn optional_json<T>() -> BoxedFilter<(T,)>
where
    T: serde::de::DeserializeOwned + Default + Send + 'static,
{
    warp::body::bytes()
        .and_then(|body: warp::hyper::body::Bytes| async move {
            if body.iter().all(u8::is_ascii_whitespace) {
                return Ok(T::default());
            }
            serde_json::from_slice(&body).map_err(|_| warp::reject::not_found())
        })
        .boxed()
}

/// Path segments arrive percent-encoded; names carry spaces and clan tags.
fn decode(segment: &str) -> String {
    percent_decode(segment).unwrap_or_else(|| segment.to_string())
}

fn percent_decode(segment: &str) -> Option<String> {
    let bytes = segment.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut idx = 0;
    while idx < bytes.len() {
        match bytes[idx] {
            b'%' => {
                let hex = bytes.get(idx + 1..idx + 3)?;
                if !hex.iter().all(u8::is_ascii_hexdigit) {
                    return None;
                }
                out.push(u8::from_str_radix(std::str::from_utf8(hex).ok()?, 16).ok()?);
                idx += 3;
            }
            byte => {
                out.push(byte);
                idx += 1;
            }
        }
    }
    String::from_utf8(out).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_percent_escapes() {
        assert_eq!(decode("BOPE%20sniper"), "BOPE sniper");
        assert_eq!(decode("%5BTAG%5D"), "[TAG]");
        assert_eq!(decode("plain"), "plain");
        assert_eq!(decode("broken%2"), "broken%2");
        assert_eq!(decode("Jo%C3%A3o"), "João");
        assert_eq!(decode("%+F"), "%+F");
        assert_eq!(decode("a%-1b"), "a%-1b");
    }
}
