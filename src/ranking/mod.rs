mod memory;
mod tree;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::cmp::Ordering;

use crate::error::EngineResult;
use crate::types::{Board, OwnerId};

pub use memory::MemoryRankStore;
pub use tree::OrderTree;

/// A stored best value together with when it was achieved
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RankedValue {
    pub value: u32,
    pub achieved_at: DateTime<Utc>,
}

/// Sort key of a ranked set.
///
/// Orders best-first: higher value, then earlier achievement, then owner id,
/// so position 0 is the top of the board and no two owners ever compare equal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RankKey {
    pub value: u32,
    pub achieved_at: DateTime<Utc>,
    pub owner_id: OwnerId,
}

impl Ord for RankKey {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .value
            .cmp(&self.value)
            .then_with(|| self.achieved_at.cmp(&other.achieved_at))
            .then_with(|| self.owner_id.cmp(&other.owner_id))
    }
}

impl PartialOrd for RankKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Backing store for the score and streak leaderboards.
///
/// Each board maps an owner to a single best value. Every method is atomic
/// on its own; callers compose them without holding locks across calls.
#[async_trait]
pub trait RankStore: Send + Sync {
    /// Store `value` for `owner_id` unless the stored value is higher.
    /// Returns true if the stored entry changed.
    async fn upsert_if_greater(
        &self,
        board: Board,
        owner_id: &str,
        value: u32,
        achieved_at: DateTime<Utc>,
    ) -> EngineResult<bool>;

    /// Remove an owner's entry, returning whether one existed
    async fn remove(&self, board: Board, owner_id: &str) -> EngineResult<bool>;

    async fn value(&self, board: Board, owner_id: &str) -> EngineResult<Option<RankedValue>>;

    /// Zero-based position from the top, None if the owner is not ranked
    async fn rev_rank(&self, board: Board, owner_id: &str) -> EngineResult<Option<usize>>;

    /// Up to `count` entries from position `start`, best first
    async fn rev_range(
        &self,
        board: Board,
        start: usize,
        count: usize,
    ) -> EngineResult<Vec<(OwnerId, u32)>>;

    async fn len(&self, board: Board) -> EngineResult<usize>;

    /// Drop every entry on every board
    async fn clear(&self) -> EngineResult<()>;

    /// Name of this store for logging
    fn name(&self) -> &str;
}
