//! An in-memory `Store` implementation backing handler and processor tests.
//!
//! Mirrors the teacher's `MatchRegistry`-style use of `DashMap` for shared,
//! lock-free-ish state instead of a single `Mutex<HashMap>`.

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::net::IpAddr;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use crate::error::StoreError;

use super::{
    GameEvent, PlayerId, PlayerStats, PlayerStatsPatch, Server, ServerId, Store, TxBody,
    WeaponUsageRow,
};

#[derive(Default)]
pub struct InMemoryStore {
    servers_by_address: DashMap<(IpAddr, u16), Server>,
    servers_by_id: DashMap<ServerId, Server>,
    /// Keyed by `(unique_id, game)` per §3: the same Steam id in two
    /// different games (e.g. `cstrike` and `css`) must resolve to two
    /// distinct players.
    players_by_unique_id: DashMap<(String, String), PlayerId>,
    player_stats: DashMap<PlayerId, PlayerStats>,
    events: Mutex<Vec<GameEvent>>,
    weapon_modifiers: DashMap<(String, String), f64>,
    weapon_usage: Mutex<Vec<WeaponUsageRow>>,
    next_server_id: AtomicI64,
    next_player_id: AtomicI64,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            next_server_id: AtomicI64::new(1),
            next_player_id: AtomicI64::new(1),
            ..Default::default()
        }
    }

    /// Seeds a known server, as would already exist in the relational store (§4.4 step 1)
    pub fn seed_server(&self, ip: IpAddr, port: u16, game: &str, name: &str) -> ServerId {
        let id = self.next_server_id.fetch_add(1, Ordering::SeqCst);
        let server = Server {
            id,
            ip,
            port,
            game: game.to_string(),
            name: name.to_string(),
        };
        self.servers_by_address.insert((ip, port), server.clone());
        self.servers_by_id.insert(id, server);
        id
    }

    /// Seeds a weapon modifier override (§4.1 Store-backed overrides)
    pub fn seed_weapon_modifier(&self, game: &str, weapon: &str, modifier: f64) {
        self.weapon_modifiers
            .insert((game.to_string(), weapon.to_string()), modifier);
    }

    pub fn events(&self) -> Vec<GameEvent> {
        self.events.lock().clone()
    }

    pub fn player_count(&self) -> usize {
        self.player_stats.len()
    }

    /// The weapon-usage rows recorded via `record_weapon_usage` (§4.7), for test assertions.
    pub fn weapon_usage(&self) -> Vec<WeaponUsageRow> {
        self.weapon_usage.lock().clone()
    }
}

fn apply_patch(stats: &mut PlayerStats, patch: PlayerStatsPatch) {
    stats.kills = (stats.kills as i64 + patch.kills_delta).max(0) as u32;
    stats.deaths = (stats.deaths as i64 + patch.deaths_delta).max(0) as u32;
    stats.suicides = (stats.suicides as i64 + patch.suicides_delta).max(0) as u32;
    stats.teamkills = (stats.teamkills as i64 + patch.teamkills_delta).max(0) as u32;
    stats.headshots = (stats.headshots as i64 + patch.headshots_delta).max(0) as u32;
    stats.shots = (stats.shots as i64 + patch.shots_delta).max(0) as u32;
    stats.hits = (stats.hits as i64 + patch.hits_delta).max(0) as u32;
    stats.games_played = (stats.games_played as i64 + patch.games_played_delta).max(0) as u32;

    if let Some(name) = patch.last_name {
        stats.last_name = name;
    }
    if let Some(skill) = patch.skill {
        stats.skill = skill;
    }
    if let Some(v) = patch.kill_streak {
        stats.kill_streak = v;
    }
    if let Some(v) = patch.death_streak {
        stats.death_streak = v;
    }
    if let Some(v) = patch.connection_time {
        stats.connection_time = v;
    }
    if let Some(v) = patch.last_event {
        stats.last_event = v;
    }
    if let Some(v) = patch.last_skill_change {
        stats.last_skill_change = v;
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn get_server_by_address(
        &self,
        ip: IpAddr,
        port: u16,
    ) -> Result<Option<(ServerId, String)>, StoreError> {
        Ok(self
            .servers_by_address
            .get(&(ip, port))
            .map(|s| (s.id, s.game.clone())))
    }

    async fn auto_register_dev_server(
        &self,
        ip: IpAddr,
        port: u16,
    ) -> Result<ServerId, StoreError> {
        if let Some(existing) = self.servers_by_address.get(&(ip, port)) {
            return Ok(existing.id);
        }
        let id = self.next_server_id.fetch_add(1, Ordering::SeqCst);
        let server = Server {
            id,
            ip,
            port,
            game: "valve".to_string(),
            name: format!("dev-auto:{ip}:{port}"),
        };
        self.servers_by_address
            .entry((ip, port))
            .or_insert_with(|| server.clone());
        self.servers_by_id.insert(id, server);
        Ok(self.servers_by_address.get(&(ip, port)).unwrap().id)
    }

    async fn get_or_create_player(
        &self,
        unique_id: &str,
        player_name: &str,
        game: &str,
    ) -> Result<PlayerId, StoreError> {
        let key = (unique_id.to_string(), game.to_string());
        if let Some(id) = self.players_by_unique_id.get(&key) {
            return Ok(*id);
        }
        let id = self.next_player_id.fetch_add(1, Ordering::SeqCst);
        self.players_by_unique_id.entry(key.clone()).or_insert(id);
        let id = *self.players_by_unique_id.get(&key).unwrap();
        self.player_stats
            .entry(id)
            .or_insert_with(|| PlayerStats::new(id, player_name, game));
        Ok(id)
    }

    async fn get_player_stats(
        &self,
        player_id: PlayerId,
    ) -> Result<Option<PlayerStats>, StoreError> {
        Ok(self.player_stats.get(&player_id).map(|s| s.clone()))
    }

    async fn update_player_stats(
        &self,
        player_id: PlayerId,
        patch: PlayerStatsPatch,
    ) -> Result<(), StoreError> {
        let mut entry = self
            .player_stats
            .get_mut(&player_id)
            .ok_or_else(|| StoreError::Io(format!("no such player {player_id}")))?;
        apply_patch(&mut entry, patch);
        Ok(())
    }

    async fn create_game_event(&self, event: &GameEvent) -> Result<(), StoreError> {
        self.events.lock().push(event.clone());
        Ok(())
    }

    async fn weapon_modifier(&self, game: &str, weapon: &str) -> Result<Option<f64>, StoreError> {
        Ok(self
            .weapon_modifiers
            .get(&(game.to_string(), weapon.to_string()))
            .map(|v| *v))
    }

    async fn transaction(&self, body: TxBody) -> Result<(), StoreError> {
        body(self).await
    }

    async fn record_weapon_usage(&self, row: WeaponUsageRow) -> Result<(), StoreError> {
        self.weapon_usage.lock().push(row);
        Ok(())
    }
}

/// Convenience constructor for tests that need a `Arc<dyn Store>`
pub fn in_memory() -> Arc<dyn Store> {
    Arc::new(InMemoryStore::new())
}
