use super::AppState;
use crate::error::{require_id, EngineError, EngineResult};
use crate::protocol::MergeReport;
use crate::types::*;

impl AppState {
    /// Fold `from_id` into `to_id`: sessions move over, each board keeps the
    /// better of the two values under `to_id`, and `from_id` leaves the boards.
    ///
    /// Steps are not atomic with each other, but every step can be re-run, so
    /// a failed merge is finished by calling it again.
    pub async fn merge_identity(&self, from_id: &str, to_id: &str) -> EngineResult<MergeReport> {
        require_id("fromId", from_id)?;
        require_id("toId", to_id)?;
        if from_id == to_id {
            return Err(EngineError::InvalidInput(
                "Cannot merge an identity into itself".to_string(),
            ));
        }

        let sessions_moved = {
            let mut sessions = self.sessions.write().await;
            let mut owner_sessions = self.owner_sessions.write().await;
            let moved = owner_sessions.remove(from_id).unwrap_or_default();
            for session_id in &moved {
                if let Some(session) = sessions.get_mut(session_id) {
                    session.owner_id = to_id.to_string();
                }
            }
            let count = moved.len();
            owner_sessions
                .entry(to_id.to_string())
                .or_default()
                .extend(moved);
            count
        };

        let mut adopted = Vec::new();
        for board in Board::ALL {
            if let Some(best) = self.rankings.value(board, from_id).await? {
                if self
                    .rankings
                    .upsert_if_greater(board, to_id, best.value, best.achieved_at)
                    .await?
                {
                    adopted.push(board);
                }
                self.rankings.remove(board, from_id).await?;
            }
        }

        {
            let mut profiles = self.profiles.write().await;
            if let Some(profile) = profiles.remove(from_id) {
                profiles.entry(to_id.to_string()).or_insert(profile);
            }
        }

        tracing::info!(
            from_id,
            to_id,
            sessions_moved,
            adopted = ?adopted,
            "Identity merged"
        );

        Ok(MergeReport {
            sessions_moved,
            adopted,
        })
    }
}
