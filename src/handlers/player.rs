//! Player Handler (§4.6): per-player counters, streaks, and skill deltas.

use std::sync::Arc;

use dashmap::DashMap;

use crate::error::CollectorError;
use crate::handlers::ranking::RankingHandler;
use crate::store::{EventData, GameEvent, PlayerId, PlayerStats, PlayerStatsPatch, Store};
use crate::util::time::unix_secs;

/// Deliberate test-shim sentinel carried over from the source system (§4.6):
/// a DISCONNECT for this playerId always fails.
const TEST_SHIM_FAILING_PLAYER_ID: PlayerId = -1;

pub struct PlayerHandler {
    store: Arc<dyn Store>,
    ranking: Arc<RankingHandler>,
    connect_times: DashMap<PlayerId, i64>,
}

fn not_found(player_id: PlayerId) -> CollectorError {
    CollectorError::Handler(format!("Player not found: {player_id}"))
}

impl PlayerHandler {
    pub fn new(store: Arc<dyn Store>, ranking: Arc<RankingHandler>) -> Self {
        Self {
            store,
            ranking,
            connect_times: DashMap::new(),
        }
    }

    async fn fetch(&self, player_id: PlayerId) -> Result<PlayerStats, CollectorError> {
        self.store
            .get_player_stats(player_id)
            .await?
            .ok_or_else(|| not_found(player_id))
    }

    pub async fn handle_connect(&self, event: &GameEvent) -> Result<(), CollectorError> {
        let EventData::Connect(data) = &event.data else {
            return Err(CollectorError::Handler("handle_connect called on non-CONNECT event".into()));
        };
        self.connect_times.insert(data.player_id, unix_secs());
        self.store
            .update_player_stats(
                data.player_id,
                PlayerStatsPatch {
                    connection_time: Some(0),
                    last_event: Some(unix_secs()),
                    ..Default::default()
                },
            )
            .await?;
        Ok(())
    }

    pub async fn handle_disconnect(&self, event: &GameEvent) -> Result<(), CollectorError> {
        let EventData::Disconnect(data) = &event.data else {
            return Err(CollectorError::Handler("handle_disconnect called on non-DISCONNECT event".into()));
        };

        if data.player_id == TEST_SHIM_FAILING_PLAYER_ID {
            return Err(CollectorError::Handler(format!(
                "Player not found: {}",
                TEST_SHIM_FAILING_PLAYER_ID
            )));
        }

        let session_duration = data.session_duration.unwrap_or_else(|| {
            self.connect_times
                .remove(&data.player_id)
                .map(|(_, connected_at)| (unix_secs() - connected_at).max(0) as u32)
                .unwrap_or(0)
        });

        self.store
            .update_player_stats(
                data.player_id,
                PlayerStatsPatch {
                    connection_time: Some(session_duration),
                    last_event: Some(unix_secs()),
                    ..Default::default()
                },
            )
            .await?;
        Ok(())
    }

    pub async fn handle_suicide(&self, event: &GameEvent) -> Result<(), CollectorError> {
        let EventData::Suicide(data) = &event.data else {
            return Err(CollectorError::Handler("handle_suicide called on non-SUICIDE event".into()));
        };
        let stats = self.fetch(data.player_id).await?;
        self.store
            .update_player_stats(
                data.player_id,
                PlayerStatsPatch {
                    suicides_delta: 1,
                    deaths_delta: 1,
                    games_played_delta: 1,
                    skill: Some((stats.skill - 5).max(100)),
                    death_streak: Some(stats.death_streak + 1),
                    kill_streak: Some(0),
                    last_event: Some(unix_secs()),
                    ..Default::default()
                },
            )
            .await?;
        Ok(())
    }

    /// §4.6 KILL: fetches killer/victim (defaulting to a fresh 1000 rating
    /// if either lacks a stats row yet), runs Ranking, then writes both patches.
    pub async fn handle_kill(&self, event: &GameEvent, game: &str) -> Result<(), CollectorError> {
        let EventData::Kill(data) = &event.data else {
            return Err(CollectorError::Handler("handle_kill called on non-KILL event".into()));
        };

        let killer = match self.store.get_player_stats(data.killer_id).await? {
            Some(s) => s,
            None => PlayerStats::new(data.killer_id, "", game),
        };
        let victim = match self.store.get_player_stats(data.victim_id).await? {
            Some(s) => s,
            None => PlayerStats::new(data.victim_id, "", game),
        };

        let (killer_change, victim_change) = self
            .ranking
            .apply_kill_rating(&killer, &victim, game, &data.weapon, data.headshot)
            .await?;

        let now = unix_secs();

        self.store
            .update_player_stats(
                data.killer_id,
                PlayerStatsPatch {
                    kills_delta: 1,
                    headshots_delta: if data.headshot { 1 } else { 0 },
                    games_played_delta: 1,
                    skill: Some(killer_change.new_rating),
                    kill_streak: Some(killer.kill_streak + 1),
                    death_streak: Some(0),
                    last_event: Some(now),
                    last_skill_change: Some(now),
                    ..Default::default()
                },
            )
            .await?;

        self.store
            .update_player_stats(
                data.victim_id,
                PlayerStatsPatch {
                    deaths_delta: 1,
                    games_played_delta: 1,
                    skill: Some(victim_change.new_rating),
                    death_streak: Some(victim.death_streak + 1),
                    kill_streak: Some(0),
                    last_event: Some(now),
                    last_skill_change: Some(now),
                    ..Default::default()
                },
            )
            .await?;

        Ok(())
    }

    pub async fn handle_teamkill(&self, event: &GameEvent) -> Result<(), CollectorError> {
        let EventData::Teamkill(data) = &event.data else {
            return Err(CollectorError::Handler("handle_teamkill called on non-TEAMKILL event".into()));
        };

        let killer = self.store.get_player_stats(data.killer_id).await?;
        let victim = self.store.get_player_stats(data.victim_id).await?;
        let (Some(killer), Some(victim)) = (killer, victim) else {
            return Err(CollectorError::Handler(
                "Could not find killer or victim player records".into(),
            ));
        };

        let now = unix_secs();

        self.store
            .update_player_stats(
                data.killer_id,
                PlayerStatsPatch {
                    teamkills_delta: 1,
                    games_played_delta: 1,
                    skill: Some((killer.skill - 10).max(100)),
                    kill_streak: Some(0),
                    last_event: Some(now),
                    ..Default::default()
                },
            )
            .await?;

        self.store
            .update_player_stats(
                data.victim_id,
                PlayerStatsPatch {
                    deaths_delta: 1,
                    games_played_delta: 1,
                    death_streak: Some(victim.death_streak + 1),
                    kill_streak: Some(0),
                    last_event: Some(now),
                    ..Default::default()
                },
            )
            .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::WeaponCatalog;
    use crate::store::{KillData, Meta, PlayerMeta};
    use chrono::Utc;

    fn kill_event(killer_id: PlayerId, victim_id: PlayerId, weapon: &str, headshot: bool) -> GameEvent {
        GameEvent {
            timestamp: Utc::now(),
            server_id: 1,
            raw: None,
            data: EventData::Kill(KillData {
                killer_id,
                victim_id,
                weapon: weapon.to_string(),
                headshot,
                killer_team: Some("CT".into()),
                victim_team: Some("TERRORIST".into()),
                position: None,
            }),
            meta: Some(Meta::Dual {
                killer: PlayerMeta { unique_id: "k".into(), name: "Killer".into(), is_bot: false },
                victim: PlayerMeta { unique_id: "v".into(), name: "Victim".into(), is_bot: false },
            }),
            map: String::new(),
        }
    }

    async fn setup() -> (Arc<dyn Store>, PlayerHandler, PlayerId, PlayerId) {
        let store: Arc<dyn Store> = crate::store::memory::in_memory();
        let killer_id = store.get_or_create_player("STEAM_1", "Killer", "cstrike").await.unwrap();
        let victim_id = store.get_or_create_player("STEAM_2", "Victim", "cstrike").await.unwrap();
        let catalog = Arc::new(WeaponCatalog::new(store.clone()));
        let ranking = Arc::new(RankingHandler::new(store.clone(), catalog));
        let handler = PlayerHandler::new(store.clone(), ranking);
        (store, handler, killer_id, victim_id)
    }

    #[tokio::test]
    async fn kill_increments_kills_and_headshots() {
        let (store, handler, killer_id, victim_id) = setup().await;
        let event = kill_event(killer_id, victim_id, "ak47", true);
        handler.handle_kill(&event, "cstrike").await.unwrap();

        let killer_stats = store.get_player_stats(killer_id).await.unwrap().unwrap();
        let victim_stats = store.get_player_stats(victim_id).await.unwrap().unwrap();
        assert_eq!(killer_stats.kills, 1);
        assert_eq!(killer_stats.headshots, 1);
        assert_eq!(victim_stats.deaths, 1);
    }

    #[tokio::test]
    async fn kill_sets_streaks_correctly() {
        let (store, handler, killer_id, victim_id) = setup().await;
        let event = kill_event(killer_id, victim_id, "ak47", false);
        handler.handle_kill(&event, "cstrike").await.unwrap();

        let killer_stats = store.get_player_stats(killer_id).await.unwrap().unwrap();
        let victim_stats = store.get_player_stats(victim_id).await.unwrap().unwrap();
        assert_eq!(killer_stats.kill_streak, 1);
        assert_eq!(killer_stats.death_streak, 0);
        assert_eq!(victim_stats.kill_streak, 0);
        assert_eq!(victim_stats.death_streak, 1);
    }

    #[tokio::test]
    async fn disconnect_with_test_shim_sentinel_errors() {
        let (_, handler, _, _) = setup().await;
        let event = GameEvent {
            timestamp: Utc::now(),
            server_id: 1,
            raw: None,
            data: EventData::Disconnect(crate::store::DisconnectData {
                player_id: -1,
                reason: None,
                session_duration: None,
            }),
            meta: None,
            map: String::new(),
        };
        assert!(handler.handle_disconnect(&event).await.is_err());
    }

    #[tokio::test]
    async fn disconnect_assigns_given_session_duration() {
        let (store, handler, _, _) = setup().await;
        let id = store.get_or_create_player("STEAM_3", "Someone", "cstrike").await.unwrap();
        let event = GameEvent {
            timestamp: Utc::now(),
            server_id: 1,
            raw: None,
            data: EventData::Disconnect(crate::store::DisconnectData {
                player_id: id,
                reason: None,
                session_duration: Some(300),
            }),
            meta: None,
            map: String::new(),
        };
        handler.handle_disconnect(&event).await.unwrap();
        let stats = store.get_player_stats(id).await.unwrap().unwrap();
        assert_eq!(stats.connection_time, 300);
    }
}
