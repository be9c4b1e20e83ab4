use thiserror::Error;

pub type Result<T, E = RankingError> = std::result::Result<T, E>;

/// Errors raised by the ranking core.
#[derive(Debug, Error)]
pub enum RankingError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("ambiguous match, candidates: {}", .0.join(", "))]
    AmbiguousMatch(Vec<String>),

    #[error("invalid progress range: current={current} target={target} bar_size={bar_size}")]
    InvalidRange {
        current: i64,
        target: i64,
        bar_size: usize,
    },

    #[error("patent table is empty")]
    EmptyTierTable,

    #[error("patent table has two tiers at score {0}")]
    DuplicateTier(i64),

    #[error("store query failed: {context}")]
    Upstream {
        context: &'static str,
        #[source]
        source: anyhow::Error,
    },

    #[error("ranking session expired or unknown")]
    SessionExpired,

    #[error("ranking session belongs to another user")]
    NotSessionOwner,
}

impl RankingError {
    /// Tags a store failure with the query that produced it.
    pub fn upstream(context: &'static str) -> impl FnOnce(anyhow::Error) -> Self {
        move |source| Self::Upstream { context, source }
    }

    /// Recoverable errors are shown to users; the rest are logged as internal.
    pub fn is_user_facing(&self) -> bool {
        matches!(
            self,
            Self::NotFound(_)
                | Self::AmbiguousMatch(_)
                | Self::SessionExpired
                | Self::NotSessionOwner
        )
    }
}
