//! Match Handler (§4.9): per-server round/map state machine.
//!
//! `MatchStats` is owned exclusively by this handler (§9, "locked maps with
//! clear ownership") — no other component mutates the map.

use std::collections::HashMap;

use dashmap::DashMap;
use tracing::{info, warn};

use crate::error::CollectorError;
use crate::store::{MapChangeData, PlayerId, RoundEndData, ServerId};

/// Transient per-server aggregate of the current map's rounds (§3 MatchStats)
#[derive(Debug, Clone, Default)]
pub struct MatchStats {
    pub current_map: Option<String>,
    pub total_rounds: u32,
    pub duration_secs: u32,
    pub team_scores: HashMap<String, u32>,
    recent_participants: Vec<(PlayerId, Option<String>, i64)>,
}

impl MatchStats {
    fn record_participant(&mut self, player_id: PlayerId, team: Option<String>, now: i64) {
        self.recent_participants.retain(|(_, _, ts)| *ts > 0);
        self.recent_participants.push((player_id, team, now));
    }

    /// Players on `winning_team` with an event in the last `duration_secs` (§4.8:
    /// "apply a small participation bonus to the winners"). A participant with
    /// no known team (e.g. from a CONNECT or CHAT) never qualifies.
    fn participants_within(&self, duration_secs: u32, now: i64, winning_team: &str) -> Vec<PlayerId> {
        let cutoff = now - duration_secs as i64;
        let mut seen = Vec::new();
        for (player_id, team, ts) in self.recent_participants.iter().rev() {
            if *ts >= cutoff
                && team.as_deref() == Some(winning_team)
                && !seen.contains(player_id)
            {
                seen.push(*player_id);
            }
        }
        seen
    }
}

pub struct MatchHandler {
    stats: DashMap<ServerId, MatchStats>,
}

impl MatchHandler {
    pub fn new() -> Self {
        Self {
            stats: DashMap::new(),
        }
    }

    /// Records that `player_id` (on `team`, when known) produced an event on
    /// `server_id` at `now`, so the Ranking Handler's round-end participation
    /// bonus has a window to query.
    pub fn record_participant(&self, server_id: ServerId, player_id: PlayerId, team: Option<String>, now: i64) {
        self.stats
            .entry(server_id)
            .or_default()
            .record_participant(player_id, team, now);
    }

    /// Players on `winning_team` for `server_id` with a recorded event in the
    /// last `duration_secs` (§4.8 round rating update).
    pub fn participants_within(
        &self,
        server_id: ServerId,
        duration_secs: u32,
        now: i64,
        winning_team: &str,
    ) -> Vec<PlayerId> {
        self.stats
            .get(&server_id)
            .map(|s| s.participants_within(duration_secs, now, winning_team))
            .unwrap_or_default()
    }

    /// Current map for `server_id`, or empty string if unknown (§4.5 step 3).
    pub fn current_map(&self, server_id: ServerId) -> String {
        self.stats
            .get(&server_id)
            .and_then(|s| s.current_map.clone())
            .unwrap_or_default()
    }

    pub fn round_start(&self, server_id: ServerId) -> Result<(), CollectorError> {
        self.stats.entry(server_id).or_default();
        Ok(())
    }

    pub fn round_end(&self, server_id: ServerId, data: &RoundEndData) -> Result<(), CollectorError> {
        let Some(mut entry) = self.stats.get_mut(&server_id) else {
            warn!(server_id, "ROUND_END with no active MatchStats; ignoring");
            return Ok(());
        };
        entry.total_rounds += 1;
        entry.duration_secs += data.duration_secs;
        *entry.team_scores.entry(data.winning_team.clone()).or_insert(0) += 1;
        Ok(())
    }

    /// Finalizes and clears the per-server state on MAP_CHANGE (§4.9).
    ///
    /// Persisting the final summary is delegated to the observability stream —
    /// the re-aggregation job outside this crate's scope consumes it.
    pub fn map_change(&self, server_id: ServerId, data: &MapChangeData) -> Result<(), CollectorError> {
        if data.previous_map.is_some() {
            if let Some((_, stats)) = self.stats.remove(&server_id) {
                info!(
                    server_id,
                    previous_map = ?data.previous_map,
                    total_rounds = stats.total_rounds,
                    duration_secs = stats.duration_secs,
                    team_scores = ?stats.team_scores,
                    "finalized match stats on map change"
                );
            }
        }
        self.stats.entry(server_id).or_default().current_map = Some(data.new_map.clone());
        Ok(())
    }

    /// §9 Open Question (c): persist the tail of a map rather than dropping it silently.
    pub fn server_shutdown(&self, server_id: ServerId) -> Result<(), CollectorError> {
        if let Some((_, stats)) = self.stats.remove(&server_id) {
            info!(
                server_id,
                total_rounds = stats.total_rounds,
                duration_secs = stats.duration_secs,
                team_scores = ?stats.team_scores,
                "finalized match stats on server shutdown"
            );
        }
        Ok(())
    }

    #[cfg(test)]
    fn snapshot(&self, server_id: ServerId) -> Option<MatchStats> {
        self.stats.get(&server_id).map(|s| s.clone())
    }
}

impl Default for MatchHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_start_creates_stats_once() {
        let handler = MatchHandler::new();
        handler.round_start(1).unwrap();
        handler.round_start(1).unwrap();
        assert_eq!(handler.snapshot(1).unwrap().total_rounds, 0);
    }

    #[test]
    fn match_rounds_scenario_from_spec() {
        let handler = MatchHandler::new();
        handler.round_start(1).unwrap();
        handler
            .round_end(1, &RoundEndData { winning_team: "T".into(), duration_secs: 120, score: "1-0".into() })
            .unwrap();
        handler
            .round_end(1, &RoundEndData { winning_team: "CT".into(), duration_secs: 115, score: "1-1".into() })
            .unwrap();

        let snapshot = handler.snapshot(1).unwrap();
        assert_eq!(snapshot.total_rounds, 2);
        assert_eq!(snapshot.duration_secs, 235);
        assert_eq!(snapshot.team_scores.get("T"), Some(&1));
        assert_eq!(snapshot.team_scores.get("CT"), Some(&1));

        handler
            .map_change(
                1,
                &MapChangeData {
                    previous_map: Some("de_dust2".into()),
                    new_map: "de_inferno".into(),
                    player_count: 10,
                },
            )
            .unwrap();

        let after = handler.snapshot(1).unwrap();
        assert_eq!(after.total_rounds, 0);
        assert_eq!(after.current_map.as_deref(), Some("de_inferno"));
    }

    #[test]
    fn round_end_without_active_match_is_a_warn_not_an_error() {
        let handler = MatchHandler::new();
        let result = handler.round_end(
            99,
            &RoundEndData { winning_team: "T".into(), duration_secs: 10, score: "1-0".into() },
        );
        assert!(result.is_ok());
    }
}
