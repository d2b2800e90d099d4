//! Application state: connection registry, live game sessions, jingle streams.

/// Connection registry for the console and buzzer peers.
pub mod registry;
/// In-memory game session state and buzz arbitration rules.
pub mod session;

use std::sync::Arc;

use dashmap::{DashMap, DashSet};
use tokio::sync::Mutex;

use crate::{
    config::AppConfig,
    dao::store::{CatalogStore, ResultStore},
    state::{registry::ConnectionRegistry, session::GameSession},
};

/// Shared reference to application state, safe to clone across tasks.
pub type SharedState = Arc<AppState>;

/// Central application state storing peers, sessions, and store handles.
pub struct AppState {
    config: Arc<AppConfig>,
    registry: ConnectionRegistry,
    games: DashMap<String, Arc<Mutex<GameSession>>>,
    active_jingle_streams: DashSet<String>,
    catalog: Arc<dyn CatalogStore>,
    results: Arc<dyn ResultStore>,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`] so it can be cloned cheaply.
    pub fn new(
        config: AppConfig,
        catalog: Arc<dyn CatalogStore>,
        results: Arc<dyn ResultStore>,
    ) -> SharedState {
        Arc::new(Self {
            config: Arc::new(config),
            registry: ConnectionRegistry::new(),
            games: DashMap::new(),
            active_jingle_streams: DashSet::new(),
            catalog,
            results,
        })
    }

    /// Access the immutable application configuration.
    pub fn config(&self) -> Arc<AppConfig> {
        Arc::clone(&self.config)
    }

    /// Registry of connected peers.
    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    /// Question and jingle lookup handle.
    pub fn catalog(&self) -> Arc<dyn CatalogStore> {
        Arc::clone(&self.catalog)
    }

    /// Durable result writer handle.
    pub fn results(&self) -> Arc<dyn ResultStore> {
        Arc::clone(&self.results)
    }

    /// Buzzer ids with a jingle stream currently in flight.
    ///
    /// Membership here is what serializes streams per buzzer: an id is
    /// inserted before the first chunk and removed when the stream ends,
    /// aborts, or the buzzer disconnects.
    pub fn jingle_streams(&self) -> &DashSet<String> {
        &self.active_jingle_streams
    }

    /// Fetch the session for `game_id`, creating it on first reference.
    ///
    /// The console is the only source of game ids, so an unknown id means a
    /// session this process has not seen yet, not a client error.
    pub fn game_or_create(&self, game_id: &str) -> Arc<Mutex<GameSession>> {
        self.games
            .entry(game_id.to_string())
            .or_insert_with(|| {
                Arc::new(Mutex::new(GameSession::new(
                    game_id.to_string(),
                    game_id.to_string(),
                    self.config.game_settings.clone(),
                )))
            })
            .clone()
    }

    /// Fetch the session for `game_id` if it exists.
    pub fn find_game(&self, game_id: &str) -> Option<Arc<Mutex<GameSession>>> {
        self.games.get(game_id).map(|entry| entry.clone())
    }

    /// Number of in-memory sessions.
    pub fn game_count(&self) -> usize {
        self.games.len()
    }

    /// Propagate a player rename into every in-memory session.
    pub async fn rename_player(&self, buzzer_id: &str, name: &str) {
        let games: Vec<Arc<Mutex<GameSession>>> =
            self.games.iter().map(|entry| entry.value().clone()).collect();
        for game in games {
            game.lock().await.rename_player(buzzer_id, name);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dao::file::{FileCatalog, JsonlResultLog};

    fn state() -> SharedState {
        AppState::new(
            AppConfig::default(),
            Arc::new(FileCatalog::default()),
            Arc::new(JsonlResultLog::new(std::env::temp_dir().join("unused.jsonl"))),
        )
    }

    #[tokio::test]
    async fn game_or_create_returns_the_same_session() {
        let state = state();
        let first = state.game_or_create("g1");
        let second = state.game_or_create("g1");
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(state.game_count(), 1);

        first.lock().await.name = "renamed".into();
        assert_eq!(second.lock().await.name, "renamed");
    }

    #[test]
    fn find_game_misses_unknown_ids() {
        let state = state();
        assert!(state.find_game("nope").is_none());
        state.game_or_create("g1");
        assert!(state.find_game("g1").is_some());
    }
}
