use super::AppState;
use crate::config::MAX_PAGE_SIZE;
use crate::error::{require_id, EngineError, EngineResult};
use crate::protocol::RebuildReport;
use crate::types::*;
use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// Owners shown on each side of the player in the relative window
const RELATIVE_RADIUS: usize = 2;

const ANONYMOUS_DISPLAY_NAME: &str = "Anonymous player";

impl AppState {
    /// Close a session and feed its score and longest streak into the boards.
    ///
    /// Only sessions the anti-abuse gate marked valid are ranked. Repeating
    /// the call re-applies the same values, which the boards ignore.
    pub async fn finalize_session(&self, session_id: &str) -> EngineResult<Vec<RankedEntry>> {
        require_id("sessionId", session_id)?;

        let session = {
            let mut sessions = self.sessions.write().await;
            let session = sessions
                .get_mut(session_id)
                .ok_or_else(|| EngineError::NotFound(format!("Session '{}'", session_id)))?;

            if !session.valid {
                tracing::warn!(session_id, owner_id = %session.owner_id, "Refusing to rank unverified session");
                return Err(EngineError::Forbidden(format!(
                    "Session '{}' has not been verified",
                    session_id
                )));
            }

            session.complete = true;
            session.finalized_at = Some(Utc::now());
            session.clone()
        };

        self.rank_values(&session.owner_id, session.score, session.longest_streak, session.start_time)
            .await?;

        tracing::info!(
            session_id,
            owner_id = %session.owner_id,
            score = session.score,
            longest_streak = session.longest_streak,
            "Session finalized"
        );

        self.relative_leaderboard(&session.owner_id, Board::Scores).await
    }

    async fn rank_values(
        &self,
        owner_id: &str,
        score: u32,
        longest_streak: u32,
        achieved_at: DateTime<Utc>,
    ) -> EngineResult<()> {
        for (board, value) in [(Board::Scores, score), (Board::Streaks, longest_streak)] {
            let changed = self
                .rankings
                .upsert_if_greater(board, owner_id, value, achieved_at)
                .await?;
            if changed {
                tracing::debug!(owner_id, board = board.as_str(), value, "Best value raised");
            }
        }
        Ok(())
    }

    /// Up to five entries centered on `owner_id`, empty when unranked
    pub async fn relative_leaderboard(
        &self,
        owner_id: &str,
        board: Board,
    ) -> EngineResult<Vec<RankedEntry>> {
        require_id("ownerId", owner_id)?;

        let Some(rank) = self.rankings.rev_rank(board, owner_id).await? else {
            return Ok(Vec::new());
        };

        let start = rank.saturating_sub(RELATIVE_RADIUS);
        let count = rank + RELATIVE_RADIUS - start + 1;
        let rows = self.rankings.rev_range(board, start, count).await?;

        // Ranks anchor on the owner's own row; the board may move between the two calls
        let first_rank = match rows.iter().position(|(id, _)| id == owner_id) {
            Some(index) => rank.saturating_sub(index),
            None => start,
        };

        Ok(self.resolve_entries(rows, first_rank).await)
    }

    /// One page of a board, `offset` counted from the top
    pub async fn leaderboard_page(
        &self,
        board: Board,
        offset: usize,
        page_size: usize,
    ) -> EngineResult<Vec<RankedEntry>> {
        if page_size == 0 || page_size > MAX_PAGE_SIZE {
            return Err(EngineError::InvalidInput(format!(
                "pageSize must be between 1 and {}",
                MAX_PAGE_SIZE
            )));
        }

        let rows = self.rankings.rev_range(board, offset, page_size).await?;
        Ok(self.resolve_entries(rows, offset).await)
    }

    async fn resolve_entries(&self, rows: Vec<(OwnerId, u32)>, first_rank: usize) -> Vec<RankedEntry> {
        let profiles = self.profiles.read().await;
        rows.into_iter()
            .enumerate()
            .map(|(index, (owner_id, value))| {
                let profile = profiles.get(&owner_id);
                RankedEntry {
                    rank: first_rank + index + 1,
                    display_name: profile
                        .map(|p| p.display_name.clone())
                        .unwrap_or_else(|| fallback_display_name(&owner_id)),
                    image: profile.and_then(|p| p.image.clone()),
                    owner_id,
                    value,
                }
            })
            .collect()
    }

    /// Recompute both boards from every valid finalized session.
    ///
    /// Each board keeps an owner's best value, dated by the earliest session
    /// that reached it, so ties order the same way as live finalization.
    pub async fn rebuild_rankings(&self) -> EngineResult<RebuildReport> {
        let (best, considered) = {
            let sessions = self.sessions.read().await;
            let mut best: HashMap<(Board, OwnerId), BestValue> = HashMap::new();
            let mut considered = 0;

            for session in sessions
                .values()
                .filter(|s| s.valid && s.finalized_at.is_some())
            {
                considered += 1;
                for (board, value) in [
                    (Board::Scores, session.score),
                    (Board::Streaks, session.longest_streak),
                ] {
                    let candidate = BestValue {
                        value,
                        achieved_at: session.start_time,
                    };
                    best.entry((board, session.owner_id.clone()))
                        .and_modify(|current| {
                            if candidate.beats(current) {
                                *current = candidate;
                            }
                        })
                        .or_insert(candidate);
                }
            }
            (best, considered)
        };

        self.rankings.clear().await?;
        for ((board, owner_id), best) in &best {
            self.rankings
                .upsert_if_greater(*board, owner_id, best.value, best.achieved_at)
                .await?;
        }

        let owners_ranked = best.keys().filter(|(board, _)| *board == Board::Scores).count();
        tracing::info!(
            sessions = considered,
            owners = owners_ranked,
            store = self.rankings.name(),
            "Rankings rebuilt"
        );

        Ok(RebuildReport {
            sessions_considered: considered,
            owners_ranked,
        })
    }
}

#[derive(Debug, Clone, Copy)]
struct BestValue {
    value: u32,
    achieved_at: DateTime<Utc>,
}

impl BestValue {
    /// Higher value wins; an equal value reached earlier wins too
    fn beats(&self, other: &BestValue) -> bool {
        self.value > other.value
            || (self.value == other.value && self.achieved_at < other.achieved_at)
    }
}

fn fallback_display_name(owner_id: &str) -> String {
    if owner_id.starts_with(ANONYMOUS_PREFIX) {
        ANONYMOUS_DISPLAY_NAME.to_string()
    } else {
        owner_id.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::fixtures::sample_catalog;
    use crate::config::EngineConfig;
    use crate::state::test_support::*;
    use chrono::TimeDelta;
    use std::sync::Arc;

    /// Insert a finished, verified session straight into the map
    async fn seed_session(state: &AppState, owner: &str, score: u32, streak: u32, age: i64) -> SessionId {
        let start = Utc::now() - TimeDelta::seconds(age);
        let session = Session {
            id: ulid::Ulid::new().to_string(),
            owner_id: owner.to_string(),
            start_time: start,
            expires_at: start + TimeDelta::seconds(30),
            score,
            streak: 0,
            longest_streak: streak,
            complete: true,
            valid: true,
            validated_at: Some(start),
            finalized_at: None,
            round_ids: Vec::new(),
        };
        let id = session.id.clone();
        state.sessions.write().await.insert(id.clone(), session);
        id
    }

    #[tokio::test]
    async fn test_finalize_ranks_higher_score_first() {
        let state = test_state();
        let a = seed_session(&state, "owner-a", 50, 4, 100).await;
        let b = seed_session(&state, "owner-b", 80, 2, 90).await;

        state.finalize_session(&a).await.unwrap();
        state.finalize_session(&b).await.unwrap();

        let page = state.leaderboard_page(Board::Scores, 0, 10).await.unwrap();
        let ranked: Vec<(&str, usize, u32)> = page
            .iter()
            .map(|e| (e.owner_id.as_str(), e.rank, e.value))
            .collect();
        assert_eq!(ranked, vec![("owner-b", 1, 80), ("owner-a", 2, 50)]);

        let streaks = state.leaderboard_page(Board::Streaks, 0, 10).await.unwrap();
        assert_eq!(streaks[0].owner_id, "owner-a");
        assert_eq!(streaks[0].value, 4);
    }

    #[tokio::test]
    async fn test_finalize_requires_valid_session() {
        let state = test_state();
        let created = state.new_session(None).await.unwrap();

        let err = state
            .finalize_session(&created.session.id)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Forbidden(_)));

        for board in Board::ALL {
            assert_eq!(state.rankings.len(board).await.unwrap(), 0);
        }
        let session = state.get_session(&created.session.id).await.unwrap();
        assert!(!session.complete);
        assert!(session.finalized_at.is_none());
    }

    #[tokio::test]
    async fn test_finalize_returns_relative_window_and_repeats_safely() {
        let state = test_state();
        let id = seed_session(&state, "owner-a", 20, 1, 10).await;

        let first = state.finalize_session(&id).await.unwrap();
        let second = state.finalize_session(&id).await.unwrap();

        assert_eq!(first.len(), 1);
        assert_eq!(first[0].rank, 1);
        assert_eq!(first[0].display_name, "owner-a");
        assert_eq!(first, second);
        assert_eq!(state.rankings.len(Board::Scores).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_best_value_never_decreases() {
        let state = test_state();
        let high = seed_session(&state, "owner-a", 70, 6, 50).await;
        let low = seed_session(&state, "owner-a", 30, 9, 40).await;

        state.finalize_session(&high).await.unwrap();
        state.finalize_session(&low).await.unwrap();

        let score = state.rankings.value(Board::Scores, "owner-a").await.unwrap();
        assert_eq!(score.map(|v| v.value), Some(70));
        let streak = state.rankings.value(Board::Streaks, "owner-a").await.unwrap();
        assert_eq!(streak.map(|v| v.value), Some(9));
    }

    #[tokio::test]
    async fn test_relative_window_matches_page_ranks() {
        let state = test_state();
        for i in 0..9u32 {
            let id = seed_session(&state, &format!("owner-{}", i), 10 * (i + 1), 0, 100).await;
            state.finalize_session(&id).await.unwrap();
        }
        let page = state.leaderboard_page(Board::Scores, 0, 100).await.unwrap();

        // owner-8 tops the board, owner-0 sits at the bottom
        let top = state.relative_leaderboard("owner-8", Board::Scores).await.unwrap();
        assert_eq!(top.len(), 3);
        assert_eq!(top[0].rank, 1);

        let bottom = state.relative_leaderboard("owner-0", Board::Scores).await.unwrap();
        assert_eq!(bottom.len(), 3);
        assert_eq!(bottom.last().unwrap().rank, 9);

        let middle = state.relative_leaderboard("owner-4", Board::Scores).await.unwrap();
        assert_eq!(middle.len(), 5);
        assert_eq!(middle[2].owner_id, "owner-4");

        for entry in top.iter().chain(&bottom).chain(&middle) {
            let paged = page.iter().find(|p| p.owner_id == entry.owner_id).unwrap();
            assert_eq!(paged.rank, entry.rank);
        }

        assert!(state
            .relative_leaderboard("nobody", Board::Scores)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_tied_scores_get_distinct_sequential_ranks() {
        let state = test_state();
        for (owner, age) in [("owner-late", 10), ("owner-early", 50), ("owner-mid", 30)] {
            let id = seed_session(&state, owner, 40, 0, age).await;
            state.finalize_session(&id).await.unwrap();
        }

        let page = state.leaderboard_page(Board::Scores, 0, 10).await.unwrap();
        let ranks: Vec<usize> = page.iter().map(|e| e.rank).collect();
        assert_eq!(ranks, vec![1, 2, 3]);
        let owners: Vec<&str> = page.iter().map(|e| e.owner_id.as_str()).collect();
        assert_eq!(owners, vec!["owner-early", "owner-mid", "owner-late"]);
    }

    #[tokio::test]
    async fn test_page_offsets_and_size_limits() {
        let state = test_state();
        for i in 0..5u32 {
            let id = seed_session(&state, &format!("owner-{}", i), i + 1, 0, 10).await;
            state.finalize_session(&id).await.unwrap();
        }

        let second = state.leaderboard_page(Board::Scores, 2, 2).await.unwrap();
        assert_eq!(second.iter().map(|e| e.rank).collect::<Vec<_>>(), vec![3, 4]);
        assert!(state
            .leaderboard_page(Board::Scores, 10, 2)
            .await
            .unwrap()
            .is_empty());

        for size in [0, MAX_PAGE_SIZE + 1] {
            let err = state
                .leaderboard_page(Board::Scores, 0, size)
                .await
                .unwrap_err();
            assert!(matches!(err, EngineError::InvalidInput(_)));
        }
    }

    #[tokio::test]
    async fn test_entries_resolve_profiles() {
        let state = test_state();
        state.profiles.write().await.insert(
            "user-1".to_string(),
            Profile {
                display_name: "Ada".to_string(),
                image: Some("https://img.example/ada.png".to_string()),
            },
        );
        for owner in ["user-1", "anon-x", "user-2"] {
            let id = seed_session(&state, owner, 10, 0, 10).await;
            state.finalize_session(&id).await.unwrap();
        }

        let page = state.leaderboard_page(Board::Scores, 0, 10).await.unwrap();
        let name = |owner: &str| {
            page.iter()
                .find(|e| e.owner_id == owner)
                .map(|e| e.display_name.clone())
                .unwrap()
        };
        assert_eq!(name("user-1"), "Ada");
        assert_eq!(name("anon-x"), ANONYMOUS_DISPLAY_NAME);
        assert_eq!(name("user-2"), "user-2");
    }

    #[tokio::test]
    async fn test_store_outage_surfaces_as_unavailable() {
        let state = AppState::with_rank_store(
            sample_catalog(),
            EngineConfig::default(),
            Arc::new(DownStore),
        );
        let id = seed_session(&state, "owner-a", 10, 1, 10).await;

        let err = state.finalize_session(&id).await.unwrap_err();
        assert!(matches!(err, EngineError::Unavailable(_)));
        let err = state
            .leaderboard_page(Board::Scores, 0, 10)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Unavailable(_)));
        let err = state
            .relative_leaderboard("owner-a", Board::Scores)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Unavailable(_)));
    }

    #[tokio::test]
    async fn test_rebuild_keeps_live_tie_order() {
        let state = test_state();
        let a_old = seed_session(&state, "owner-a", 40, 6, 100).await;
        let b = seed_session(&state, "owner-b", 60, 3, 50).await;
        let a_new = seed_session(&state, "owner-a", 60, 3, 10).await;
        for id in [&a_old, &b, &a_new] {
            state.finalize_session(id).await.unwrap();
        }

        let owners = |page: Vec<RankedEntry>| -> Vec<String> {
            page.into_iter().map(|e| e.owner_id).collect()
        };
        let live_scores = owners(state.leaderboard_page(Board::Scores, 0, 10).await.unwrap());
        let live_streaks = owners(state.leaderboard_page(Board::Streaks, 0, 10).await.unwrap());
        assert_eq!(live_scores, vec!["owner-b", "owner-a"]);

        state.rebuild_rankings().await.unwrap();

        let rebuilt_scores = owners(state.leaderboard_page(Board::Scores, 0, 10).await.unwrap());
        let rebuilt_streaks = owners(state.leaderboard_page(Board::Streaks, 0, 10).await.unwrap());
        assert_eq!(rebuilt_scores, live_scores);
        assert_eq!(rebuilt_streaks, live_streaks);

        // The streak board dates owner-a by the older session, not the newer score
        let streak = state.rankings.value(Board::Streaks, "owner-a").await.unwrap().unwrap();
        let score = state.rankings.value(Board::Scores, "owner-a").await.unwrap().unwrap();
        assert!(streak.achieved_at < score.achieved_at);
    }

    #[tokio::test]
    async fn test_rebuild_uses_only_valid_finalized_sessions() {
        let state = test_state();
        let a1 = seed_session(&state, "owner-a", 40, 3, 100).await;
        let a2 = seed_session(&state, "owner-a", 60, 2, 50).await;
        let b = seed_session(&state, "owner-b", 90, 5, 40).await;
        // Never finalized: must not count
        seed_session(&state, "owner-c", 999, 99, 30).await;

        for id in [&a1, &a2, &b] {
            state.finalize_session(id).await.unwrap();
        }
        // Tamper with the boards, then rebuild from sessions
        state.rankings.clear().await.unwrap();
        state
            .rankings
            .upsert_if_greater(Board::Scores, "ghost", 1000, Utc::now())
            .await
            .unwrap();

        let report = state.rebuild_rankings().await.unwrap();
        assert_eq!(report.sessions_considered, 3);
        assert_eq!(report.owners_ranked, 2);

        let page = state.leaderboard_page(Board::Scores, 0, 10).await.unwrap();
        let values: Vec<(&str, u32)> = page
            .iter()
            .map(|e| (e.owner_id.as_str(), e.value))
            .collect();
        assert_eq!(values, vec![("owner-b", 90), ("owner-a", 60)]);

        let streak = state.rankings.value(Board::Streaks, "owner-a").await.unwrap();
        assert_eq!(streak.map(|v| v.value), Some(3));
    }
}
