use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;

use super::{OrderTree, RankKey, RankStore, RankedValue};
use crate::error::EngineResult;
use crate::types::{Board, OwnerId};

/// One board: the ordered keys plus a lookup from owner to current key
#[derive(Debug, Default)]
struct RankedSet {
    tree: OrderTree<RankKey>,
    entries: HashMap<OwnerId, RankKey>,
}

impl RankedSet {
    fn upsert_if_greater(&mut self, owner_id: &str, value: u32, achieved_at: DateTime<Utc>) -> bool {
        let replace = match self.entries.get(owner_id) {
            None => true,
            Some(current) if value > current.value => true,
            // Same value achieved earlier moves the owner up among ties, never down
            Some(current) => value == current.value && achieved_at < current.achieved_at,
        };
        if !replace {
            return false;
        }

        let key = RankKey {
            value,
            achieved_at,
            owner_id: owner_id.to_string(),
        };
        if let Some(old) = self.entries.insert(owner_id.to_string(), key.clone()) {
            self.tree.remove(&old);
        }
        self.tree.insert(key);
        true
    }

    fn remove(&mut self, owner_id: &str) -> bool {
        match self.entries.remove(owner_id) {
            Some(old) => self.tree.remove(&old),
            None => false,
        }
    }

    fn rank(&self, owner_id: &str) -> Option<usize> {
        self.entries.get(owner_id).and_then(|key| self.tree.rank(key))
    }
}

/// In-process rank store; both boards sit behind one lock so every
/// operation observes a consistent snapshot
#[derive(Debug, Default)]
pub struct MemoryRankStore {
    boards: RwLock<HashMap<Board, RankedSet>>,
}

impl MemoryRankStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RankStore for MemoryRankStore {
    async fn upsert_if_greater(
        &self,
        board: Board,
        owner_id: &str,
        value: u32,
        achieved_at: DateTime<Utc>,
    ) -> EngineResult<bool> {
        let mut boards = self.boards.write().await;
        Ok(boards
            .entry(board)
            .or_default()
            .upsert_if_greater(owner_id, value, achieved_at))
    }

    async fn remove(&self, board: Board, owner_id: &str) -> EngineResult<bool> {
        let mut boards = self.boards.write().await;
        let Some(set) = boards.get_mut(&board) else {
            return Ok(false);
        };
        let removed = set.remove(owner_id);
        if set.tree.is_empty() {
            boards.remove(&board);
        }
        Ok(removed)
    }

    async fn value(&self, board: Board, owner_id: &str) -> EngineResult<Option<RankedValue>> {
        let boards = self.boards.read().await;
        Ok(boards
            .get(&board)
            .and_then(|set| set.entries.get(owner_id))
            .map(|key| RankedValue {
                value: key.value,
                achieved_at: key.achieved_at,
            }))
    }

    async fn rev_rank(&self, board: Board, owner_id: &str) -> EngineResult<Option<usize>> {
        let boards = self.boards.read().await;
        Ok(boards.get(&board).and_then(|set| set.rank(owner_id)))
    }

    async fn rev_range(
        &self,
        board: Board,
        start: usize,
        count: usize,
    ) -> EngineResult<Vec<(OwnerId, u32)>> {
        let boards = self.boards.read().await;
        Ok(boards
            .get(&board)
            .map(|set| {
                set.tree
                    .range(start, count)
                    .into_iter()
                    .map(|key| (key.owner_id.clone(), key.value))
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn len(&self, board: Board) -> EngineResult<usize> {
        let boards = self.boards.read().await;
        Ok(boards.get(&board).map(|set| set.entries.len()).unwrap_or(0))
    }

    async fn clear(&self) -> EngineResult<()> {
        self.boards.write().await.clear();
        Ok(())
    }

    fn name(&self) -> &str {
        "memory"
    }
}
