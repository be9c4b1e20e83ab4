use std::cmp::{Ordering, Reverse};

use crate::player::{PlayerHash, PlayerRecord};

/// Leaderboard order: score descending, then hash ascending so tied players
/// land in the same order on every fetch.
pub fn leaderboard_order(a: &PlayerRecord, b: &PlayerRecord) -> Ordering {
    (Reverse(a.score), &a.hash).cmp(&(Reverse(b.score), &b.hash))
}

pub fn sort_leaderboard(population: &mut [PlayerRecord]) {
    population.sort_by(leaderboard_order);
}

/// 1-based position of `target` in the population, `None` when absent.
pub fn resolve_rank(target: &PlayerHash, population: &[PlayerRecord]) -> Option<usize> {
    let mut sorted: Vec<&PlayerRecord> = population.iter().collect();
    sorted.sort_by(|a, b| leaderboard_order(a, b));
    sorted
        .iter()
        .position(|player| &player.hash == target)
        .map(|idx| idx + 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_place() {
        let population = vec![
            PlayerRecord::new("a", "alpha", 100),
            PlayerRecord::new("b", "bravo", 50),
        ];
        assert_eq!(resolve_rank(&"b".into(), &population), Some(2));
        assert_eq!(resolve_rank(&"a".into(), &population), Some(1));
    }

    #[test]
    fn missing_player_has_no_rank() {
        let population = vec![PlayerRecord::new("a", "alpha", 100)];
        assert_eq!(resolve_rank(&"zzz".into(), &population), None);
        assert_eq!(resolve_rank(&"a".into(), &[]), None);
    }

    #[test]
    fn higher_score_always_ranks_better() {
        let population: Vec<PlayerRecord> = (0..40)
            .map(|i| PlayerRecord::new(format!("h{:02}", i), format!("p{}", i), (i * 37 % 11) as i64))
            .collect();

        for a in &population {
            for b in &population {
                if a.score > b.score {
                    let rank_a = resolve_rank(&a.hash, &population).unwrap();
                    let rank_b = resolve_rank(&b.hash, &population).unwrap();
                    assert!(rank_a < rank_b);
                }
            }
        }
    }

    #[test]
    fn ties_break_on_hash_regardless_of_input_order() {
        let forward = vec![
            PlayerRecord::new("b", "bravo", 10),
            PlayerRecord::new("a", "alpha", 10),
            PlayerRecord::new("c", "charlie", 10),
        ];
        let mut backward = forward.clone();
        backward.reverse();

        for population in [&forward, &backward] {
            assert_eq!(resolve_rank(&"a".into(), population), Some(1));
            assert_eq!(resolve_rank(&"b".into(), population), Some(2));
            assert_eq!(resolve_rank(&"c".into(), population), Some(3));
        }
    }
}
