use serde::Serialize;
use std::fmt;

use crate::error::{RankingError, Result};

pub const DEFAULT_BAR_SIZE: usize = 13;

const FILLED: char = '▰';
const EMPTY: char = '▱';

/// Fixed-width bar for `current / target`, e.g. `"[▰▰▱▱] (50/100 <:cabo:2>)"`.
pub fn render_progress(
    current: i64,
    target: i64,
    bar_size: usize,
    next_label: Option<&str>,
) -> Result<String> {
    let bar = render_bar(current, target, bar_size)?;
    Ok(format_progress(&bar, current, target, next_label))
}

/// Output for the highest tier, where there is no target to measure against.
pub fn render_max_level(bar_size: usize) -> String {
    format!("[{}] (Max Level)", FILLED.to_string().repeat(bar_size))
}

/// Just the glyphs, exactly `bar_size` of them.
pub fn render_bar(current: i64, target: i64, bar_size: usize) -> Result<String> {
    if current < 0 || current > target || target <= 0 || bar_size == 0 {
        return Err(RankingError::InvalidRange {
            current,
            target,
            bar_size,
        });
    }

    let filled = (current as i128 * bar_size as i128 / target as i128) as usize;
    let mut bar = String::with_capacity(bar_size * FILLED.len_utf8());
    for i in 0..bar_size {
        bar.push(if i < filled { FILLED } else { EMPTY });
    }

    Ok(bar)
}

fn format_progress(bar: &str, current: i64, target: i64, next_label: Option<&str>) -> String {
    match next_label {
        Some(label) if !label.is_empty() => {
            format!("[{}] ({}/{} {})", bar, current, target, label)
        }
        _ => format!("[{}] ({}/{})", bar, current, target),
    }
}

/// Computed progress handed to the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProgressDescriptor {
    Progress {
        current: i64,
        target: i64,
        next_icon: Option<String>,
        bar: String,
    },
    MaxLevel {
        bar: String,
    },
}

impl ProgressDescriptor {
    pub fn towards(
        current: i64,
        target: i64,
        bar_size: usize,
        next_icon: Option<String>,
    ) -> Result<Self> {
        let bar = render_bar(current, target, bar_size)?;
        Ok(Self::Progress {
            current,
            target,
            next_icon,
            bar,
        })
    }

    pub fn max_level(bar_size: usize) -> Self {
        Self::MaxLevel {
            bar: FILLED.to_string().repeat(bar_size),
        }
    }
}

impl fmt::Display for ProgressDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Progress {
                current,
                target,
                next_icon,
                bar,
            } => f.write_str(&format_progress(bar, *current, *target, next_icon.as_deref())),
            Self::MaxLevel { bar } => write!(f, "[{}] (Max Level)", bar),
        }
    }
}
