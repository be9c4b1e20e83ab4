//! Patent (rank title) resolution over a score threshold table.

use serde::{Deserialize, Serialize};

use crate::error::{RankingError, Result};
use crate::progress::{self, ProgressDescriptor};

/// One row of the `patents` collection.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct PatentTier {
    /// Label followed by an icon token, e.g. `"Cabo <:cabo:1207363543>"`.
    pub text: String,
    /// Minimum score, inclusive.
    pub score: i64,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

impl PatentTier {
    pub fn new(text: impl Into<String>, score: i64) -> Self {
        Self {
            text: text.into(),
            score,
            kind: None,
        }
    }

    pub fn label(&self) -> &str {
        match self.text.split_once(" <") {
            Some((label, _)) => label,
            None => &self.text,
        }
    }

    pub fn icon(&self) -> Option<String> {
        self.text
            .split_once(" <")
            .map(|(_, icon)| format!("<{}", icon))
    }

    /// Icon first, the way embeds show it.
    pub fn display(&self) -> String {
        match self.icon() {
            Some(icon) => format!("{} {}", icon, self.label()),
            None => self.label().to_string(),
        }
    }
}

/// Tiers sorted ascending with strictly increasing thresholds.
#[derive(Debug, Clone, PartialEq)]
pub struct TierTable {
    tiers: Vec<PatentTier>,
}

impl TierTable {
    pub fn new(mut tiers: Vec<PatentTier>) -> Result<Self> {
        if tiers.is_empty() {
            return Err(RankingError::EmptyTierTable);
        }

        tiers.sort_by_key(|tier| tier.score);
        if let Some(pair) = tiers.windows(2).find(|pair| pair[0].score == pair[1].score) {
            return Err(RankingError::DuplicateTier(pair[0].score));
        }

        Ok(Self { tiers })
    }

    pub fn tiers(&self) -> &[PatentTier] {
        &self.tiers
    }

    pub fn resolve(&self, score: i64) -> TierResolution<'_> {
        let next_idx = self.tiers.partition_point(|tier| tier.score <= score);
        // scores under the lowest threshold clamp to the lowest tier
        let current_idx = next_idx.saturating_sub(1);
        let current = &self.tiers[current_idx];
        let next = if next_idx == 0 {
            self.tiers.get(1)
        } else {
            self.tiers.get(next_idx)
        };

        TierResolution {
            current,
            next,
            floor_score: current.score,
            ceil_score: next.map(|tier| tier.score),
        }
    }

    /// Progress from the current tier's floor towards the next threshold.
    pub fn progress(&self, score: i64, bar_size: usize) -> Result<ProgressDescriptor> {
        let resolution = self.resolve(score);
        match (resolution.next, resolution.step(score, bar_size)?) {
            (Some(next), Some((current, target))) => {
                ProgressDescriptor::towards(current, target, bar_size, next.icon())
            }
            _ => Ok(ProgressDescriptor::max_level(bar_size)),
        }
    }

    /// Score ranges for each tier grouped by `type`, for the patents podium.
    pub fn ranges(&self) -> Vec<TierRange<'_>> {
        self.tiers
            .iter()
            .enumerate()
            .map(|(idx, tier)| TierRange {
                tier,
                from: tier.score,
                to: self.tiers.get(idx + 1).map(|next| next.score - 1),
            })
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TierResolution<'a> {
    pub current: &'a PatentTier,
    pub next: Option<&'a PatentTier>,
    pub floor_score: i64,
    pub ceil_score: Option<i64>,
}

impl TierResolution<'_> {
    /// `(current, target)` inside the current tier, or `None` at the top
    /// tier. Scores under the floor count as no progress.
    fn step(&self, score: i64, bar_size: usize) -> Result<Option<(i64, i64)>> {
        let Some(ceil) = self.ceil_score else {
            return Ok(None);
        };
        let target = ceil
            .checked_sub(self.floor_score)
            .ok_or(RankingError::InvalidRange {
                current: score,
                target: ceil,
                bar_size,
            })?;
        let current = score.saturating_sub(self.floor_score).clamp(0, target);
        Ok(Some((current, target)))
    }
}

#[derive(Debug, Clone, Copy)]
pub struct TierRange<'a> {
    pub tier: &'a PatentTier,
    pub from: i64,
    pub to: Option<i64>,
}

/// Progress line shown under a player, e.g. on the podium leader.
pub fn render_progress(score: i64, table: &TierTable) -> Result<String> {
    let resolution = table.resolve(score);
    match (resolution.next, resolution.step(score, progress::DEFAULT_BAR_SIZE)?) {
        (Some(next), Some((current, target))) => progress::render_progress(
            current,
            target,
            progress::DEFAULT_BAR_SIZE,
            next.icon().as_deref(),
        ),
        _ => Ok(progress::render_max_level(progress::DEFAULT_BAR_SIZE)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> TierTable {
        TierTable::new(vec![
            PatentTier::new("Sargento <:sargento:3>", 10_000),
            PatentTier::new("Novato <:novato:1>", 0),
            PatentTier::new("Cabo <:cabo:2>", 5_000),
        ])
        .unwrap()
    }

    #[test]
    fn resolves_just_below_and_at_threshold() {
        let table = table();

        let below = table.resolve(4_999);
        assert_eq!(below.current.label(), "Novato");
        assert_eq!(below.next.map(|t| t.label()), Some("Cabo"));
        assert_eq!(below.floor_score, 0);
        assert_eq!(below.ceil_score, Some(5_000));

        let at = table.resolve(5_000);
        assert_eq!(at.current.label(), "Cabo");
    }

    #[test]
    fn max_tier_has_no_ceiling_for_any_larger_score() {
        let table = table();
        for score in [10_000, 10_001, 99_999, i64::MAX] {
            let resolution = table.resolve(score);
            assert_eq!(Some(resolution.current), table.tiers().last());
            assert!(resolution.next.is_none());
            assert!(resolution.ceil_score.is_none());
        }
    }

    #[test]
    fn negative_scores_clamp_to_lowest_tier() {
        let table = table();
        let resolution = table.resolve(-250);
        assert_eq!(resolution.current.label(), "Novato");
        assert_eq!(resolution.next.map(|t| t.label()), Some("Cabo"));
    }

    #[test]
    fn tier_lookup_is_monotonic() {
        let table = table();
        let mut last = i64::MIN;
        for score in (-1_000..20_000).step_by(250) {
            let current = table.resolve(score).current.score;
            assert!(current >= last, "tier went down at score {}", score);
            last = current;
        }
    }

    #[test]
    fn empty_and_duplicate_tables_are_configuration_errors() {
        assert!(matches!(TierTable::new(vec![]), Err(RankingError::EmptyTierTable)));
        assert!(matches!(
            TierTable::new(vec![PatentTier::new("A", 10), PatentTier::new("B", 10)]),
            Err(RankingError::DuplicateTier(10))
        ));
    }

    #[test]
    fn label_and_icon_split() {
        let tier = PatentTier::new("Cabo <:cabo:2>", 5_000);
        assert_eq!(tier.label(), "Cabo");
        assert_eq!(tier.icon().as_deref(), Some("<:cabo:2>"));
        assert_eq!(tier.display(), "<:cabo:2> Cabo");

        let plain = PatentTier::new("Lendário", 100_000);
        assert_eq!(plain.label(), "Lendário");
        assert!(plain.icon().is_none());
    }

    #[test]
    fn progress_measures_from_the_tier_floor() {
        let table = table();
        assert_eq!(
            render_progress(7_500, &table).unwrap(),
            "[▰▰▰▰▰▰▱▱▱▱▱▱▱] (2500/5000 <:sargento:3>)"
        );
        assert_eq!(
            render_progress(12_000, &table).unwrap(),
            "[▰▰▰▰▰▰▰▰▰▰▰▰▰] (Max Level)"
        );
        // below the floor counts as no progress rather than an invalid range
        assert_eq!(
            render_progress(-10, &table).unwrap(),
            "[▱▱▱▱▱▱▱▱▱▱▱▱▱] (0/5000 <:cabo:2>)"
        );
    }

    #[test]
    fn extreme_scores_saturate_instead_of_overflowing() {
        let table = TierTable::new(vec![
            PatentTier::new("Cabo <:cabo:2>", 100),
            PatentTier::new("Sargento <:sargento:3>", 200),
        ])
        .unwrap();

        assert!(matches!(
            table.progress(i64::MIN, 13).unwrap(),
            ProgressDescriptor::Progress { current: 0, target: 100, .. }
        ));
        assert_eq!(
            render_progress(i64::MIN, &table).unwrap(),
            "[▱▱▱▱▱▱▱▱▱▱▱▱▱] (0/100 <:sargento:3>)"
        );

        let wide = TierTable::new(vec![
            PatentTier::new("Bottom", i64::MIN),
            PatentTier::new("Top", i64::MAX),
        ])
        .unwrap();
        assert!(matches!(
            wide.progress(0, 13),
            Err(RankingError::InvalidRange { .. })
        ));
        assert!(render_progress(0, &wide).is_err());
    }

    #[test]
    fn ranges_cover_the_table() {
        let table = table();
        let ranges = table.ranges();
        assert_eq!(ranges.len(), 3);
        assert_eq!((ranges[0].from, ranges[0].to), (0, Some(4_999)));
        assert_eq!((ranges[2].from, ranges[2].to), (10_000, None));
    }
}
