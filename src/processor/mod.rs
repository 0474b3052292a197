//! Event Processor (§4.5, C9): bot gating, identity resolution, persistence,
//! and handler fan-out.

use std::sync::Arc;

use tracing::{info, warn};

use crate::error::{CollectorError, IdentityError};
use crate::handlers::{MatchHandler, PlayerHandler, RankingHandler, WeaponHandler};
use crate::store::{EventData, EventType, GameEvent, Meta, Store};
use crate::util::time::unix_secs;

/// §9 Design Note: the processor's per-type dispatch table, not a switch ladder.
pub struct Processor {
    store: Arc<dyn Store>,
    player: Arc<PlayerHandler>,
    weapon: Arc<WeaponHandler>,
    match_handler: Arc<MatchHandler>,
    ranking: Arc<RankingHandler>,
    log_bots: bool,
}

impl Processor {
    pub fn new(
        store: Arc<dyn Store>,
        player: Arc<PlayerHandler>,
        weapon: Arc<WeaponHandler>,
        match_handler: Arc<MatchHandler>,
        ranking: Arc<RankingHandler>,
        log_bots: bool,
    ) -> Self {
        Self {
            store,
            player,
            weapon,
            match_handler,
            ranking,
            log_bots,
        }
    }

    /// §4.5 `ProcessEvent`. `game` is the canonical game code for the sending server.
    pub async fn process_event(&self, mut event: GameEvent, game: &str) -> Result<(), CollectorError> {
        // Step 1: bot gate.
        if let Some(meta) = &event.meta {
            if meta.is_bot() && !self.log_bots {
                return Ok(());
            }
        }

        // Step 2: identity resolution.
        self.resolve_identities(&mut event, game).await?;

        // Step 3: persist. Missing map is empty string until the Match
        // Handler has seen a MAP_CHANGE for this server.
        event.map = self.match_handler.current_map(event.server_id);
        self.store.create_game_event(&event).await?;

        let now = unix_secs();
        self.record_participants(&event, now);

        // Step 4: dispatch, per §4.5.
        let result = self.dispatch(&event, game).await;

        let success = result.is_ok();
        info!(
            success,
            event_type = ?event.event_type(),
            server_id = event.server_id,
            error = result.as_ref().err().map(|e| e.to_string()),
            "eventProcessed"
        );

        // Step 5: any handler error propagates to Ingress, which drops the datagram.
        result
    }

    async fn resolve_identities(&self, event: &mut GameEvent, game: &str) -> Result<(), CollectorError> {
        let event_type = event.data.event_type();
        let meta = event.meta.clone();

        match &mut event.data {
            EventData::Connect(data) => {
                let resolved = require_single(&meta, event_type)?;
                data.player_id = self
                    .store
                    .get_or_create_player(&resolved.unique_id, &resolved.name, game)
                    .await?;
            }
            EventData::Chat(data) => {
                let resolved = require_single(&meta, event_type)?;
                data.player_id = self
                    .store
                    .get_or_create_player(&resolved.unique_id, &resolved.name, game)
                    .await?;
            }
            EventData::Suicide(data) => {
                let resolved = require_single(&meta, event_type)?;
                data.player_id = self
                    .store
                    .get_or_create_player(&resolved.unique_id, &resolved.name, game)
                    .await?;
            }
            EventData::Kill(data) | EventData::Teamkill(data) => {
                let (killer, victim) = require_dual(&meta, event_type)?;
                data.killer_id = self
                    .store
                    .get_or_create_player(&killer.unique_id, &killer.name, game)
                    .await?;
                data.victim_id = self
                    .store
                    .get_or_create_player(&victim.unique_id, &victim.name, game)
                    .await?;
            }
            // §9 Open Question (b): DISCONNECT is a no-op when meta is absent and
            // no pre-resolved playerId is present; it is never re-resolved from meta.
            EventData::Disconnect(_) => {}
            EventData::Death(_)
            | EventData::RoundStart
            | EventData::RoundEnd(_)
            | EventData::MapChange(_)
            | EventData::ServerShutdown
            | EventData::AdminAction(_) => {}
        }
        Ok(())
    }

    fn record_participants(&self, event: &GameEvent, now: i64) {
        let server_id = event.server_id;
        match &event.data {
            EventData::Connect(d) => self.match_handler.record_participant(server_id, d.player_id, None, now),
            EventData::Suicide(d) => self.match_handler.record_participant(server_id, d.player_id, None, now),
            EventData::Chat(d) => self.match_handler.record_participant(server_id, d.player_id, None, now),
            EventData::Kill(d) | EventData::Teamkill(d) => {
                self.match_handler
                    .record_participant(server_id, d.killer_id, d.killer_team.clone(), now);
                self.match_handler
                    .record_participant(server_id, d.victim_id, d.victim_team.clone(), now);
            }
            _ => {}
        }
    }

    async fn dispatch(&self, event: &GameEvent, game: &str) -> Result<(), CollectorError> {
        match &event.data {
            EventData::Connect(_) => self.player.handle_connect(event).await,
            EventData::Disconnect(_) => self.player.handle_disconnect(event).await,
            EventData::Suicide(_) => self.player.handle_suicide(event).await,
            EventData::Teamkill(_) => self.player.handle_teamkill(event).await,
            EventData::Kill(_) => {
                let (player_result, weapon_result) = tokio::join!(
                    self.player.handle_kill(event, game),
                    self.weapon.handle_kill(event, game),
                );
                player_result?;
                weapon_result?;
                Ok(())
            }
            EventData::Chat(_) => Ok(()),
            EventData::RoundStart => self.match_handler.round_start(event.server_id),
            EventData::RoundEnd(data) => {
                self.match_handler.round_end(event.server_id, data)?;
                // §4.8: the participation bonus goes to the round's winners only.
                let participants = self.match_handler.participants_within(
                    event.server_id,
                    data.duration_secs,
                    unix_secs(),
                    &data.winning_team,
                );
                self.ranking.apply_round_rating(&participants).await?;
                Ok(())
            }
            EventData::MapChange(data) => self.match_handler.map_change(event.server_id, data),
            EventData::ServerShutdown => self.match_handler.server_shutdown(event.server_id),
            EventData::Death(_) | EventData::AdminAction(_) => {
                warn!(event_type = ?event.event_type(), "event type has no registered handler");
                Ok(())
            }
        }
    }
}

fn require_single<'a>(meta: &'a Option<Meta>, event_type: EventType) -> Result<&'a crate::store::PlayerMeta, CollectorError> {
    match meta {
        Some(Meta::Single(m)) => Ok(m),
        _ => Err(IdentityError::MissingMeta(event_type).into()),
    }
}

fn require_dual<'a>(
    meta: &'a Option<Meta>,
    event_type: EventType,
) -> Result<(&'a crate::store::PlayerMeta, &'a crate::store::PlayerMeta), CollectorError> {
    match meta {
        Some(Meta::Dual { killer, victim }) => Ok((killer, victim)),
        _ => Err(IdentityError::MissingMeta(event_type).into()),
    }
}
