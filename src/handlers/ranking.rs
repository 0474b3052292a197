//! Ranking Handler (§4.8): the ELO-style rating update.
//!
//! Holds no state of its own beyond the `Store` and `WeaponCatalog` it is
//! constructed with — all rating math is pure and covered directly by tests.

use std::sync::Arc;

use crate::catalog::WeaponCatalog;
use crate::error::StoreError;
use crate::store::{PlayerId, PlayerStats, PlayerStatsPatch, Store};
use crate::util::time::unix_secs;

pub const MIN_RATING: i32 = 100;
pub const MAX_RATING: i32 = 3000;
const BASE_K: f64 = 32.0;
const KILL_DELTA_CAP: i32 = 50;
const VICTIM_DELTA_FLOOR: i32 = -40;

/// One rating movement, ready to be logged or persisted by the caller (§4.8)
#[derive(Debug, Clone, PartialEq)]
pub struct RatingChange {
    pub player_id: PlayerId,
    pub old_rating: i32,
    pub new_rating: i32,
    pub change: i32,
    pub reason: String,
}

pub struct RankingHandler {
    store: Arc<dyn Store>,
    catalog: Arc<WeaponCatalog>,
}

fn clamp_rating(rating: i32) -> i32 {
    rating.clamp(MIN_RATING, MAX_RATING)
}

fn k_factor(games_played: u32, rating: i32) -> f64 {
    let mut k = BASE_K;
    if games_played < 10 {
        k *= 1.5;
    } else if games_played < 50 {
        k *= 1.2;
    }
    if rating > 2000 {
        k *= 0.8;
    }
    k
}

impl RankingHandler {
    pub fn new(store: Arc<dyn Store>, catalog: Arc<WeaponCatalog>) -> Self {
        Self { store, catalog }
    }

    /// `E_k = 1 / (1 + 10^((R_v - R_k)/400))` (§4.8, §8 testable property)
    pub fn calculate_expected_score(rating_a: i32, rating_b: i32) -> f64 {
        1.0 / (1.0 + 10f64.powf((rating_b - rating_a) as f64 / 400.0))
    }

    /// `clamp(prev + K_adj * (actual - expected), 100, 3000)` (§4.8 test helper)
    pub fn update_player_rating(prev_rating: i32, actual: f64, expected: f64, k: f64) -> i32 {
        clamp_rating(prev_rating + (k * (actual - expected)).round() as i32)
    }

    /// Computes the killer/victim rating deltas for a single KILL (§4.8).
    pub async fn apply_kill_rating(
        &self,
        killer: &PlayerStats,
        victim: &PlayerStats,
        game: &str,
        weapon: &str,
        headshot: bool,
    ) -> Result<(RatingChange, RatingChange), StoreError> {
        let expected_killer = Self::calculate_expected_score(killer.skill, victim.skill);

        let k_killer = k_factor(killer.games_played, killer.skill);
        let k_victim = k_factor(victim.games_played, victim.skill);

        let weapon_multiplier = self.catalog.skill_multiplier(game, weapon).await?;
        let headshot_bonus = if headshot { 1.2 } else { 1.0 };

        let raw_killer_delta =
            k_killer * (1.0 - expected_killer) * weapon_multiplier * headshot_bonus;
        let killer_delta = (raw_killer_delta.round() as i32).min(KILL_DELTA_CAP);

        let raw_victim_delta = k_victim * (0.0 - (1.0 - expected_killer)) * 0.8;
        let victim_delta = (raw_victim_delta.round() as i32).max(VICTIM_DELTA_FLOOR);

        let reason_suffix = if headshot { " (headshot)" } else { "" };

        let killer_new = clamp_rating(killer.skill + killer_delta);
        let victim_new = clamp_rating(victim.skill + victim_delta);

        Ok((
            RatingChange {
                player_id: killer.player_id,
                old_rating: killer.skill,
                new_rating: killer_new,
                change: killer_new - killer.skill,
                reason: format!("kill with {weapon}{reason_suffix}"),
            },
            RatingChange {
                player_id: victim.player_id,
                old_rating: victim.skill,
                new_rating: victim_new,
                change: victim_new - victim.skill,
                reason: format!("killed with {weapon}{reason_suffix}"),
            },
        ))
    }

    /// Small participation bonus applied to round winners (§4.8 "Round rating update").
    ///
    /// `participants` is empty when no player has events on this server within the
    /// round's duration; that is not an error. Unlike `apply_kill_rating`, there is
    /// no other handler to write the resulting patch back, so this persists directly.
    pub async fn apply_round_rating(
        &self,
        participants: &[PlayerId],
    ) -> Result<Vec<RatingChange>, StoreError> {
        const ROUND_BONUS: i32 = 3;
        let mut changes = Vec::new();
        for &player_id in participants {
            let Some(stats) = self.store.get_player_stats(player_id).await? else {
                continue;
            };
            let new_rating = clamp_rating(stats.skill + ROUND_BONUS);
            self.store
                .update_player_stats(
                    player_id,
                    PlayerStatsPatch {
                        skill: Some(new_rating),
                        games_played_delta: 1,
                        last_skill_change: Some(unix_secs()),
                        ..Default::default()
                    },
                )
                .await?;
            changes.push(RatingChange {
                player_id,
                old_rating: stats.skill,
                new_rating,
                change: new_rating - stats.skill,
                reason: "clean round".to_string(),
            });
        }
        Ok(changes)
    }

    pub fn timestamp_now() -> i64 {
        unix_secs()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::InMemoryStore;

    fn stats(player_id: PlayerId, skill: i32, games_played: u32) -> PlayerStats {
        let mut s = PlayerStats::new(player_id, "p", "cstrike");
        s.skill = skill;
        s.games_played = games_played;
        s
    }

    #[test]
    fn expected_score_of_equal_ratings_is_one_half() {
        let e = RankingHandler::calculate_expected_score(1000, 1000);
        assert!((e - 0.5).abs() < 1e-9);
    }

    #[test]
    fn expected_score_is_monotone_in_rating_gap_and_bounded() {
        let low = RankingHandler::calculate_expected_score(900, 1100);
        let mid = RankingHandler::calculate_expected_score(1000, 1000);
        let high = RankingHandler::calculate_expected_score(1100, 900);
        assert!(low < mid);
        assert!(mid < high);
        assert!((0.0..=1.0).contains(&low));
        assert!((0.0..=1.0).contains(&high));
    }

    #[tokio::test]
    async fn equal_ratings_default_weapon_kill_favors_killer() {
        let store = Arc::new(InMemoryStore::new());
        let catalog = Arc::new(WeaponCatalog::new(store.clone()));
        let handler = RankingHandler::new(store, catalog);

        let killer = stats(1, 1000, 20);
        let victim = stats(2, 1000, 20);
        let (k_change, v_change) = handler
            .apply_kill_rating(&killer, &victim, "cstrike", "unknown", false)
            .await
            .unwrap();

        assert!(k_change.change > 0);
        assert!(v_change.change < 0);
        assert!(v_change.change.unsigned_abs() as f64 <= k_change.change as f64 * 1.25);
    }

    #[tokio::test]
    async fn rating_sanity_scenario_from_spec() {
        let store = Arc::new(InMemoryStore::new());
        let catalog = Arc::new(WeaponCatalog::new(store.clone()));
        let handler = RankingHandler::new(store, catalog);

        let killer = stats(1, 1200, 10);
        let victim = stats(2, 1000, 5);
        let (k_change, v_change) = handler
            .apply_kill_rating(&killer, &victim, "cstrike", "ak47", true)
            .await
            .unwrap();

        assert!(k_change.change > 0 && k_change.change <= 50);
        assert!(v_change.change < 0 && v_change.change >= -40);
        assert!(k_change.reason.contains("ak47"));
        assert!(k_change.reason.contains("headshot"));
    }

    #[test]
    fn update_player_rating_respects_clamp() {
        let new_rating = RankingHandler::update_player_rating(95, 1.0, 0.5, 32.0);
        assert!(new_rating >= MIN_RATING);
        let new_rating = RankingHandler::update_player_rating(2990, 1.0, 0.0, 64.0);
        assert!(new_rating <= MAX_RATING);
    }
}
