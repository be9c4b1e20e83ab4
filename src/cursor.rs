//! Paged views over ranking snapshots, and the sessions that hold them.

use serde::Serialize;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;

use crate::error::{RankingError, Result};

pub fn total_pages(len: usize, page_size: usize) -> usize {
    let page_size = page_size.max(1);
    len.div_ceil(page_size).max(1)
}

/// Items on `page` (0-based); out-of-range pages come back empty.
pub fn paginate<T>(items: &[T], page_size: usize, page: usize) -> &[T] {
    let page_size = page_size.max(1);
    let start = page.saturating_mul(page_size).min(items.len());
    let end = start.saturating_add(page_size).min(items.len());
    &items[start..end]
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Located {
    pub index: usize,
    pub page: usize,
}

/// First item whose display text contains `needle`, ignoring case.
pub fn locate<T, F>(items: &[T], needle: &str, page_size: usize, display: F) -> Option<Located>
where
    F: Fn(&T) -> &str,
{
    let needle = needle.trim().to_lowercase();
    if needle.is_empty() {
        return None;
    }

    items
        .iter()
        .position(|item| display(item).to_lowercase().contains(&needle))
        .map(|index| Located {
            index,
            page: index / page_size.max(1),
        })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Navigation {
    First,
    Previous,
    Next,
    Last,
}

impl FromStr for Navigation {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "first" => Ok(Self::First),
            "previous" => Ok(Self::Previous),
            "next" => Ok(Self::Next),
            "last" => Ok(Self::Last),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Cursor {
    pub page: usize,
    pub total_pages: usize,
}

impl Cursor {
    pub fn new(len: usize, page_size: usize) -> Self {
        Self {
            page: 0,
            total_pages: total_pages(len, page_size),
        }
    }

    pub fn at(mut self, page: usize) -> Self {
        self.page = page.min(self.last_page());
        self
    }

    fn last_page(&self) -> usize {
        self.total_pages.saturating_sub(1)
    }

    pub fn navigate(&mut self, nav: Navigation) {
        self.page = match nav {
            Navigation::First => 0,
            Navigation::Previous => self.page.saturating_sub(1),
            Navigation::Next => (self.page + 1).min(self.last_page()),
            Navigation::Last => self.last_page(),
        };
    }

    pub fn has_previous(&self) -> bool {
        self.page > 0
    }

    pub fn has_next(&self) -> bool {
        self.page < self.last_page()
    }
}

/// Rows captured when a view is opened. Navigation pages over the snapshot so
/// rows do not shift while the game server keeps writing.
pub trait Snapshot {
    type Item;

    fn items(&self) -> &[Self::Item];
}

impl<T> Snapshot for Vec<T> {
    type Item = T;

    fn items(&self) -> &[T] {
        self
    }
}

pub struct Session<S> {
    pub id: String,
    pub owner: Option<String>,
    pub snapshot: S,
    pub page_size: usize,
    pub cursor: Cursor,
    pub highlight: Option<usize>,
    created_at: Instant,
}

impl<S: Snapshot> Session<S> {
    pub fn current_page(&self) -> &[S::Item] {
        paginate(self.snapshot.items(), self.page_size, self.cursor.page)
    }
}

pub struct SessionRegistry<S> {
    timeout: Duration,
    sessions: RwLock<HashMap<String, Arc<Mutex<Session<S>>>>>,
}

impl<S: Snapshot> SessionRegistry<S> {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Opens a session at page 0, or at the page holding `highlight`.
    pub async fn open(
        &self,
        owner: Option<String>,
        snapshot: S,
        page_size: usize,
        highlight: Option<usize>,
    ) -> Arc<Mutex<Session<S>>> {
        let id = uuid::Uuid::new_v4().simple().to_string();
        let page = highlight.map(|idx| idx / page_size.max(1)).unwrap_or(0);
        let cursor = Cursor::new(snapshot.items().len(), page_size).at(page);

        let session = Arc::new(Mutex::new(Session {
            id: id.clone(),
            owner,
            snapshot,
            page_size,
            cursor,
            highlight,
            created_at: Instant::now(),
        }));

        let mut sessions = self.sessions.write().await;
        let timeout = self.timeout;
        let mut expired = Vec::new();
        for (key, existing) in sessions.iter() {
            if let Ok(guard) = existing.try_lock() {
                if guard.created_at.elapsed() >= timeout {
                    expired.push(key.clone());
                }
            }
        }
        for key in expired {
            sessions.remove(&key);
        }
        sessions.insert(id, Arc::clone(&session));
        tracing::debug!("{} ranking sessions open", sessions.len());

        session
    }

    /// Moves the session's cursor and hands the moved session to `view`
    /// before the lock is released, so the caller sees the page its own
    /// move produced. Calls on one session are serialized.
    pub async fn navigate<R>(
        &self,
        id: &str,
        requester: Option<&str>,
        nav: Navigation,
        view: impl FnOnce(&Session<S>) -> R,
    ) -> Result<R> {
        let session = self
            .sessions
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or(RankingError::SessionExpired)?;

        let mut guard = session.lock().await;
        if guard.created_at.elapsed() >= self.timeout {
            drop(guard);
            self.sessions.write().await.remove(id);
            return Err(RankingError::SessionExpired);
        }

        if let Some(owner) = guard.owner.as_deref() {
            if requester != Some(owner) {
                return Err(RankingError::NotSessionOwner);
            }
        }

        guard.cursor.navigate(nav);
        Ok(view(&*guard))
    }
}
