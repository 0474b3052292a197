//! Weapon Handler (§4.7): derives per-weapon outcomes from KILL events.

use std::sync::Arc;

use crate::catalog::WeaponCatalog;
use crate::error::CollectorError;
use crate::store::{EventData, GameEvent, Store, WeaponUsageRow};

/// Result of handling a single KILL's weapon-usage bookkeeping
#[derive(Debug, Clone, PartialEq)]
pub struct WeaponOutcome {
    pub success: bool,
    pub weapons_affected: Vec<String>,
}

pub struct WeaponHandler {
    store: Arc<dyn Store>,
    catalog: Arc<WeaponCatalog>,
}

impl WeaponHandler {
    pub fn new(store: Arc<dyn Store>, catalog: Arc<WeaponCatalog>) -> Self {
        Self { store, catalog }
    }

    /// `baseDamage(weapon) * (4.0 if headshot else 1.0)` (§4.1 DamageMultiplier)
    pub fn damage_multiplier(&self, weapon: &str, headshot: bool) -> f64 {
        let base = self.catalog.base_damage(weapon) as f64;
        base * if headshot { 4.0 } else { 1.0 }
    }

    /// The raw event is already persisted into the frag table by the Processor
    /// (§4.5 step 3); this records a usage row keyed by (weapon, killerId,
    /// victimId, headshot) — final persistence of per-weapon aggregates (§4.7).
    pub async fn handle_kill(&self, event: &GameEvent, game: &str) -> Result<WeaponOutcome, CollectorError> {
        let data = match &event.data {
            EventData::Kill(d) | EventData::Teamkill(d) => d,
            _ => {
                return Err(CollectorError::Handler(
                    "handle_kill called on a non-kill event".into(),
                ))
            }
        };

        let damage = self.damage_multiplier(&data.weapon, data.headshot);

        self.store
            .record_weapon_usage(WeaponUsageRow {
                game: game.to_string(),
                weapon: data.weapon.clone(),
                killer_id: data.killer_id,
                victim_id: data.victim_id,
                headshot: data.headshot,
                damage,
            })
            .await?;

        Ok(WeaponOutcome {
            success: true,
            weapons_affected: vec![data.weapon.clone()],
        })
    }
}
