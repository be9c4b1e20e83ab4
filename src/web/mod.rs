use std::sync::Arc;
use anyhow::Result;

use crate::config::Config;
use crate::discord::{ChatPlatform, DiscordClient};
use crate::favorites::FavoriteService;
use crate::link::LinkService;
use crate::podium::{self, Podium};
use crate::ranking::RankingService;
use crate::store::{MongoStore, Store};

pub mod routes;
pub mod handlers;
pub mod background;

pub async fn start(config: Arc<Config>) -> Result<()> {
    let store = MongoStore::connect(&config.mongo).await?;
    tracing::info!("connected to mongodb database {}", config.mongo.database);

    let chat = DiscordClient::from_config(&config.discord)
        .map(|client| Arc::new(client) as Arc<dyn ChatPlatform>);
    if chat.is_none() {
        tracing::warn!("no discord token configured, podiums and DMs are disabled");
    }

    let state = State::new(Arc::clone(&config), Arc::new(store), chat);

    // Background tasks
    background::spawn_podium_tasks(Arc::clone(&state));

    tracing::info!("listening at {}", config.web.host);
    warp::serve(routes::router(state)).run(config.web.host).await;
    Ok(())
}

pub struct State {
    pub config: Arc<Config>,
    pub ranking: RankingService,
    pub links: LinkService,
    pub favorites: FavoriteService,
    /// `None` when the bot has no token; chat-backed routes answer 503.
    pub chat: Option<Arc<dyn ChatPlatform>>,
    pub podiums: Vec<Podium>,
}

impl State {
    pub fn new(
        config: Arc<Config>,
        store: Arc<dyn Store>,
        chat: Option<Arc<dyn ChatPlatform>>,
    ) -> Arc<Self> {
        let cache = crate::cache::from_config(&config.cache);
        let podiums = podium::from_config(&config.podium);

        Arc::new(Self {
            ranking: RankingService::new(Arc::clone(&store), cache, config.ranking.clone()),
            links: LinkService::new(Arc::clone(&store)),
            favorites: FavoriteService::new(store),
            chat,
            podiums,
            config,
        })
    }
}
