//! Weapon Catalog (§4.1): resolves a raw weapon token to a damage baseline
//! and a skill multiplier, memoizing `Store`-backed overrides.

use dashmap::DashMap;
use std::sync::Arc;

use crate::error::StoreError;
use crate::store::Store;

/// Base damage and skill multiplier for a single weapon (§4.1)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WeaponProfile {
    pub base_damage: u32,
    pub skill_multiplier: f64,
}

const DEFAULT_PROFILE: WeaponProfile = WeaponProfile {
    base_damage: 20,
    skill_multiplier: 1.0,
};

/// Built-in table for the games this collector ships support for out of the box (§4.1)
fn builtin_profile(weapon: &str) -> WeaponProfile {
    match weapon {
        "ak47" => WeaponProfile { base_damage: 36, skill_multiplier: 1.0 },
        "m4a4" => WeaponProfile { base_damage: 33, skill_multiplier: 1.0 },
        "m4a1" => WeaponProfile { base_damage: 33, skill_multiplier: 1.0 },
        "m4a1_silencer" => WeaponProfile { base_damage: 33, skill_multiplier: 1.0 },
        "awp" => WeaponProfile { base_damage: 115, skill_multiplier: 1.3 },
        "ssg08" => WeaponProfile { base_damage: 88, skill_multiplier: 1.2 },
        "aug" => WeaponProfile { base_damage: 33, skill_multiplier: 1.0 },
        "famas" => WeaponProfile { base_damage: 33, skill_multiplier: 1.0 },
        "galil" | "galilar" => WeaponProfile { base_damage: 33, skill_multiplier: 1.0 },
        "deagle" => WeaponProfile { base_damage: 53, skill_multiplier: 1.1 },
        "glock" => WeaponProfile { base_damage: 28, skill_multiplier: 0.9 },
        "usp" | "usp_silencer" => WeaponProfile { base_damage: 35, skill_multiplier: 0.95 },
        "ump45" => WeaponProfile { base_damage: 35, skill_multiplier: 0.8 },
        "mp5" | "mp5navy" | "mp5sd" => WeaponProfile { base_damage: 26, skill_multiplier: 0.8 },
        "p90" => WeaponProfile { base_damage: 26, skill_multiplier: 0.8 },
        "knife" => WeaponProfile { base_damage: 42, skill_multiplier: 2.0 },
        "hegrenade" | "grenade" => WeaponProfile { base_damage: 140, skill_multiplier: 1.1 },
        "world" | "unknown" => WeaponProfile { base_damage: 30, skill_multiplier: 1.0 },
        _ => DEFAULT_PROFILE,
    }
}

/// Caches per-(game, weapon) overrides fetched from the `Store` so that a
/// hot kill-feed never round-trips to the database twice for the same pair.
pub struct WeaponCatalog {
    store: Arc<dyn Store>,
    overrides: DashMap<(String, String), f64>,
}

impl WeaponCatalog {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            overrides: DashMap::new(),
        }
    }

    /// Base damage for a weapon token, normalized to lowercase (§4.1)
    pub fn base_damage(&self, weapon: &str) -> u32 {
        builtin_profile(&weapon.to_ascii_lowercase()).base_damage
    }

    /// Skill multiplier for a weapon, consulting the memoized `Store` override
    /// before falling back to the built-in table.
    pub async fn skill_multiplier(&self, game: &str, weapon: &str) -> Result<f64, StoreError> {
        let weapon = weapon.to_ascii_lowercase();
        let key = (game.to_string(), weapon.clone());

        if let Some(cached) = self.overrides.get(&key) {
            return Ok(*cached);
        }

        let resolved = match self.store.weapon_modifier(game, &weapon).await? {
            Some(modifier) => modifier,
            None => builtin_profile(&weapon).skill_multiplier,
        };

        self.overrides.insert(key, resolved);
        Ok(resolved)
    }

    /// Drops all memoized overrides, forcing the next lookup back to the `Store`
    pub fn clear(&self) {
        self.overrides.clear();
    }

    /// Number of memoized (game, weapon) entries
    pub fn size(&self) -> usize {
        self.overrides.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::InMemoryStore;

    #[test]
    fn known_weapons_resolve_from_builtin_table() {
        let catalog = WeaponCatalog::new(Arc::new(InMemoryStore::new()));
        assert_eq!(catalog.base_damage("AK47"), 36);
        assert_eq!(catalog.base_damage("awp"), 115);
    }

    #[test]
    fn unknown_weapon_falls_back_to_default() {
        let catalog = WeaponCatalog::new(Arc::new(InMemoryStore::new()));
        assert_eq!(catalog.base_damage("some_future_gun"), 20);
    }

    #[tokio::test]
    async fn store_override_wins_over_builtin_table() {
        let store = InMemoryStore::new();
        store.seed_weapon_modifier("cstrike", "ak47", 1.5);
        let catalog = WeaponCatalog::new(Arc::new(store));
        let multiplier = catalog.skill_multiplier("cstrike", "ak47").await.unwrap();
        assert_eq!(multiplier, 1.5);
    }

    #[tokio::test]
    async fn lookup_is_memoized_after_first_resolution() {
        let store = Arc::new(InMemoryStore::new());
        let catalog = WeaponCatalog::new(store.clone());
        assert_eq!(catalog.size(), 0);
        catalog.skill_multiplier("cstrike", "deagle").await.unwrap();
        assert_eq!(catalog.size(), 1);
        // Seeding after the first lookup must not affect the cached value.
        store.seed_weapon_modifier("cstrike", "deagle", 9.9);
        let multiplier = catalog.skill_multiplier("cstrike", "deagle").await.unwrap();
        assert_eq!(multiplier, 1.1);
    }
}
