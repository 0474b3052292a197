//! The Store port (§4.2) and the data model it persists (§3).
//!
//! This module defines the *consumed* interface only — the relational schema
//! and its driver are an external collaborator (§1). `memory` provides an
//! in-memory double used by the processor/handler tests; a production
//! adapter backed by a real database lives outside this crate's scope.

pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::net::IpAddr;

use crate::error::StoreError;

/// Numeric server identity (§3 Server)
pub type ServerId = i64;
/// Numeric player identity (§3 Player)
pub type PlayerId = i64;

/// Sentinel written into an event's player-id fields before identity resolution runs
pub const UNRESOLVED: PlayerId = 0;

/// A sending endpoint's identity (§3 Server)
#[derive(Debug, Clone, PartialEq)]
pub struct Server {
    pub id: ServerId,
    pub ip: IpAddr,
    pub port: u16,
    pub game: String,
    pub name: String,
}

/// Per-player, per-game mutable aggregate (§3 Player)
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerStats {
    pub player_id: PlayerId,
    pub last_name: String,
    pub game: String,
    pub skill: i32,
    pub kills: u32,
    pub deaths: u32,
    pub suicides: u32,
    pub teamkills: u32,
    pub headshots: u32,
    pub shots: u32,
    pub hits: u32,
    pub connection_time: u32,
    pub kill_streak: u32,
    pub death_streak: u32,
    /// Count of rating-affecting events (kills, deaths, round participations);
    /// drives the Ranking K-factor scaling and SkillRating.gamesPlayed (§4.8).
    pub games_played: u32,
    pub last_event: i64,
    pub last_skill_change: i64,
}

impl PlayerStats {
    /// A freshly-created player's baseline (§4.8: "initial rating for an unknown player is 1000")
    pub fn new(player_id: PlayerId, last_name: &str, game: &str) -> Self {
        Self {
            player_id,
            last_name: last_name.to_string(),
            game: game.to_string(),
            skill: 1000,
            kills: 0,
            deaths: 0,
            suicides: 0,
            teamkills: 0,
            headshots: 0,
            shots: 0,
            hits: 0,
            connection_time: 0,
            kill_streak: 0,
            death_streak: 0,
            games_played: 0,
            last_event: 0,
            last_skill_change: 0,
        }
    }
}

/// A partial update to `PlayerStats` (§4.2).
///
/// Numeric `*_delta` fields are increments; the `Option` fields are
/// assignments applied only when `Some`.
#[derive(Debug, Clone, Default)]
pub struct PlayerStatsPatch {
    pub kills_delta: i64,
    pub deaths_delta: i64,
    pub suicides_delta: i64,
    pub teamkills_delta: i64,
    pub headshots_delta: i64,
    pub shots_delta: i64,
    pub hits_delta: i64,
    pub games_played_delta: i64,
    pub last_name: Option<String>,
    pub skill: Option<i32>,
    pub kill_streak: Option<u32>,
    pub death_streak: Option<u32>,
    pub connection_time: Option<u32>,
    pub last_event: Option<i64>,
    pub last_skill_change: Option<i64>,
}

/// The tag identifying a `GameEvent`'s variant (§3 GameEvent)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    PlayerConnect,
    PlayerDisconnect,
    PlayerKill,
    PlayerDeath,
    PlayerSuicide,
    PlayerTeamkill,
    ChatMessage,
    RoundStart,
    RoundEnd,
    MapChange,
    ServerShutdown,
    AdminAction,
}

/// Identity envelope carried by player-oriented events (§3 "Meta block")
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerMeta {
    pub unique_id: String,
    pub name: String,
    pub is_bot: bool,
}

/// Optional identity block attached to a `GameEvent` (§4.5 step 2)
#[derive(Debug, Clone, PartialEq)]
pub enum Meta {
    Single(PlayerMeta),
    Dual { killer: PlayerMeta, victim: PlayerMeta },
}

impl Meta {
    /// §3 invariant 6: an event is bot-authored if either identity it carries is a bot
    pub fn is_bot(&self) -> bool {
        match self {
            Meta::Single(p) => p.is_bot,
            Meta::Dual { killer, victim } => killer.is_bot || victim.is_bot,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ConnectData {
    pub player_id: PlayerId,
    pub ip: Option<IpAddr>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct DisconnectData {
    pub player_id: PlayerId,
    pub reason: Option<String>,
    /// Session length in seconds, when the caller already knows it; otherwise
    /// the Player Handler derives it from its own connect-time tracking.
    pub session_duration: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct SuicideData {
    pub player_id: PlayerId,
}

/// Shared shape for KILL, PLAYER_DEATH (the victim-side record) and TEAMKILL
#[derive(Debug, Clone, PartialEq, Default)]
pub struct KillData {
    pub killer_id: PlayerId,
    pub victim_id: PlayerId,
    pub weapon: String,
    pub headshot: bool,
    pub killer_team: Option<String>,
    pub victim_team: Option<String>,
    /// `[x y z]` position, when the line carries one (§4.3)
    pub position: Option<(f32, f32, f32)>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ChatData {
    pub player_id: PlayerId,
    pub message: String,
    /// messageMode = 1 if dead chat, 0 otherwise (§4.3)
    pub message_mode: u8,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct RoundEndData {
    pub winning_team: String,
    pub duration_secs: u32,
    pub score: String,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct MapChangeData {
    pub previous_map: Option<String>,
    pub new_map: String,
    pub player_count: u32,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct AdminActionData {
    pub description: String,
}

/// Variant-specific payload of a `GameEvent` (§3)
#[derive(Debug, Clone, PartialEq)]
pub enum EventData {
    Connect(ConnectData),
    Disconnect(DisconnectData),
    Kill(KillData),
    Death(KillData),
    Suicide(SuicideData),
    Teamkill(KillData),
    Chat(ChatData),
    RoundStart,
    RoundEnd(RoundEndData),
    MapChange(MapChangeData),
    ServerShutdown,
    AdminAction(AdminActionData),
}

impl EventData {
    pub fn event_type(&self) -> EventType {
        match self {
            EventData::Connect(_) => EventType::PlayerConnect,
            EventData::Disconnect(_) => EventType::PlayerDisconnect,
            EventData::Kill(_) => EventType::PlayerKill,
            EventData::Death(_) => EventType::PlayerDeath,
            EventData::Suicide(_) => EventType::PlayerSuicide,
            EventData::Teamkill(_) => EventType::PlayerTeamkill,
            EventData::Chat(_) => EventType::ChatMessage,
            EventData::RoundStart => EventType::RoundStart,
            EventData::RoundEnd(_) => EventType::RoundEnd,
            EventData::MapChange(_) => EventType::MapChange,
            EventData::ServerShutdown => EventType::ServerShutdown,
            EventData::AdminAction(_) => EventType::AdminAction,
        }
    }
}

/// A single, tagged telemetry event (§3 GameEvent)
#[derive(Debug, Clone, PartialEq)]
pub struct GameEvent {
    pub timestamp: DateTime<Utc>,
    pub server_id: ServerId,
    pub raw: Option<String>,
    pub data: EventData,
    pub meta: Option<Meta>,
    /// Current map for `server_id`, filled in by the Processor from Match
    /// Handler state before persistence; empty until map tracking has seen a
    /// MAP_CHANGE for this server (§4.5 step 3).
    pub map: String,
}

impl GameEvent {
    pub fn event_type(&self) -> EventType {
        self.data.event_type()
    }
}

/// A single per-weapon usage row (§4.7): one per KILL/TEAMKILL, keyed by the
/// tuple the Weapon Handler is required to persist against.
#[derive(Debug, Clone, PartialEq)]
pub struct WeaponUsageRow {
    pub game: String,
    pub weapon: String,
    pub killer_id: PlayerId,
    pub victim_id: PlayerId,
    pub headshot: bool,
    pub damage: f64,
}

/// A boxed, once-callable transaction body (§4.2 `Transaction`)
pub type TxFuture<'a> = futures::future::BoxFuture<'a, Result<(), StoreError>>;
pub type TxBody = Box<dyn for<'c> FnOnce(&'c dyn Store) -> TxFuture<'c> + Send>;

/// The narrow, typed interface the core consumes from the relational store (§4.2).
///
/// All operations may fail with a transient I/O error, which propagates as
/// `StoreError` (§7 StoreError).
#[async_trait]
pub trait Store: Send + Sync {
    async fn get_server_by_address(
        &self,
        ip: IpAddr,
        port: u16,
    ) -> Result<Option<(ServerId, String)>, StoreError>;

    async fn auto_register_dev_server(
        &self,
        ip: IpAddr,
        port: u16,
    ) -> Result<ServerId, StoreError>;

    async fn get_or_create_player(
        &self,
        unique_id: &str,
        player_name: &str,
        game: &str,
    ) -> Result<PlayerId, StoreError>;

    async fn get_player_stats(&self, player_id: PlayerId)
        -> Result<Option<PlayerStats>, StoreError>;

    async fn update_player_stats(
        &self,
        player_id: PlayerId,
        patch: PlayerStatsPatch,
    ) -> Result<(), StoreError>;

    async fn create_game_event(&self, event: &GameEvent) -> Result<(), StoreError>;

    async fn weapon_modifier(&self, game: &str, weapon: &str) -> Result<Option<f64>, StoreError>;

    /// Runs `body` in an atomic context exposing the same operations (§4.2, §5).
    ///
    /// Implementations must not allow a nested call to `transaction` inside `body`.
    async fn transaction(&self, body: TxBody) -> Result<(), StoreError>;

    /// Persists one per-weapon usage row for a KILL/TEAMKILL (§4.7: "final
    /// persistence of per-weapon aggregates is performed here").
    async fn record_weapon_usage(&self, row: WeaponUsageRow) -> Result<(), StoreError>;
}
