//! Composition root: builds the `Store`, `WeaponCatalog`, handler set, and
//! `Processor` once and threads them through the Ingress (§9 Design Note,
//! "Global singletons → context-passed services").

use std::sync::Arc;

use crate::catalog::WeaponCatalog;
use crate::config::Settings;
use crate::handlers::{MatchHandler, PlayerHandler, RankingHandler, WeaponHandler};
use crate::processor::Processor;
use crate::store::memory::InMemoryStore;
use crate::store::Store;

/// Shared application state, constructed once at startup
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub store: Arc<dyn Store>,
    pub processor: Arc<Processor>,
}

impl AppState {
    /// Wires the production dependency graph.
    ///
    /// `store` is an external collaborator (§1); this crate only depends on
    /// the `Store` trait, so tests and this constructor both go through it.
    pub fn new(settings: Settings, store: Arc<dyn Store>) -> Self {
        let settings = Arc::new(settings);
        let catalog = Arc::new(WeaponCatalog::new(store.clone()));
        let ranking = Arc::new(RankingHandler::new(store.clone(), catalog.clone()));
        let player = Arc::new(PlayerHandler::new(store.clone(), ranking.clone()));
        let weapon = Arc::new(WeaponHandler::new(store.clone(), catalog));
        let match_handler = Arc::new(MatchHandler::new());

        let processor = Arc::new(Processor::new(
            store.clone(),
            player,
            weapon,
            match_handler,
            ranking,
            settings.log_bots,
        ));

        Self {
            settings,
            store,
            processor,
        }
    }

    /// Convenience constructor for local/dev runs with no external database.
    pub fn in_memory(settings: Settings) -> Self {
        Self::new(settings, Arc::new(InMemoryStore::new()))
    }
}
