mod answer;
pub mod export;
mod identity;
mod leaderboard;
mod player;
mod round;
mod session;

pub use round::{biased_slots, pick_round, RoundPick};

use crate::catalog::Catalog;
use crate::config::EngineConfig;
use crate::ranking::{MemoryRankStore, RankStore};
use crate::types::*;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Shared application state
///
/// Lock order when more than one map is held: `sessions`, `owner_sessions`,
/// `rounds`, then `profiles`. The rank store is never called while a map lock
/// is held.
#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<RwLock<HashMap<SessionId, Session>>>,
    /// Session ids per owner, only written under the `sessions` write lock
    pub owner_sessions: Arc<RwLock<HashMap<OwnerId, Vec<SessionId>>>>,
    pub rounds: Arc<RwLock<HashMap<RoundId, Round>>>,
    pub profiles: Arc<RwLock<HashMap<OwnerId, Profile>>>,
    pub rankings: Arc<dyn RankStore>,
    pub catalog: Arc<Catalog>,
    pub config: EngineConfig,
}

impl AppState {
    pub fn new(catalog: Catalog, config: EngineConfig) -> Self {
        Self::with_rank_store(catalog, config, Arc::new(MemoryRankStore::new()))
    }

    pub fn with_rank_store(
        catalog: Catalog,
        config: EngineConfig,
        rankings: Arc<dyn RankStore>,
    ) -> Self {
        tracing::debug!(store = rankings.name(), "Rank store attached");
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            owner_sessions: Arc::new(RwLock::new(HashMap::new())),
            rounds: Arc::new(RwLock::new(HashMap::new())),
            profiles: Arc::new(RwLock::new(HashMap::new())),
            rankings,
            catalog: Arc::new(catalog),
            config,
        }
    }
}

/// Owner index over a full session map
pub(crate) fn index_owners(sessions: &HashMap<SessionId, Session>) -> HashMap<OwnerId, Vec<SessionId>> {
    let mut owners: HashMap<OwnerId, Vec<SessionId>> = HashMap::new();
    for session in sessions.values() {
        owners
            .entry(session.owner_id.clone())
            .or_default()
            .push(session.id.clone());
    }
    owners
}
