use std::{sync::Arc, time::Duration};

use crate::discord::ChatPlatform;
use crate::podium::Podium;
use crate::ranking::RankingService;
use super::State;

pub fn spawn_podium_tasks(state: Arc<State>) {
    let Some(chat) = state.chat.clone() else {
        if !state.podiums.is_empty() {
            tracing::info!("discord client not configured, skipping podiums.");
        }
        return;
    };

    let interval = state.config.podium.interval();
    for idx in 0..state.podiums.len() {
        let podium_state = Arc::clone(&state);
        let chat = Arc::clone(&chat);
        tokio::task::spawn(async move {
            let podium = &podium_state.podiums[idx];
            tracing::info!("starting {} podium...", podium.kind().name());
            run_podium(podium, &podium_state.ranking, chat.as_ref(), interval).await;
        });
    }
}

/// Refreshes one podium until the process exits. A refresh finishes before
/// the next sleep starts, so one podium never overlaps itself. One-shot
/// podiums return after their first attempt.
pub async fn run_podium(
    podium: &Podium,
    ranking: &RankingService,
    chat: &dyn ChatPlatform,
    interval: Duration,
) {
    loop {
        if let Err(e) = podium.refresh(ranking, chat).await {
            tracing::error!("error refreshing {} podium: {:?}", podium.kind().name(), e);
        }

        if !podium.kind().is_recurring() {
            return;
        }

        tokio::time::sleep(interval).await;
    }
}
