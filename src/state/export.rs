//! State export/import for backup and restoration.
//!
//! A snapshot carries sessions, rounds and profiles. Leaderboards are not
//! part of it: they are derived data and get rebuilt from the sessions on
//! import.

use super::{index_owners, AppState};
use crate::error::{EngineError, EngineResult};
use crate::protocol::RebuildReport;
use crate::types::*;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Schema version for export format compatibility
/// Version 1: sessions, rounds (with stored results) and profiles
pub const EXPORT_SCHEMA_VERSION: u32 = 1;

/// A serializable snapshot of the engine state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateSnapshot {
    /// Schema version for forward compatibility
    pub schema_version: u32,
    /// Export timestamp (ISO8601)
    pub exported_at: String,
    pub sessions: HashMap<SessionId, Session>,
    pub rounds: HashMap<RoundId, Round>,
    #[serde(default)]
    pub profiles: HashMap<OwnerId, Profile>,
}

impl StateSnapshot {
    pub fn new(
        sessions: HashMap<SessionId, Session>,
        rounds: HashMap<RoundId, Round>,
        profiles: HashMap<OwnerId, Profile>,
    ) -> Self {
        Self {
            schema_version: EXPORT_SCHEMA_VERSION,
            exported_at: chrono::Utc::now().to_rfc3339(),
            sessions,
            rounds,
            profiles,
        }
    }

    /// Validate the snapshot before import
    pub fn validate(&self) -> Result<(), String> {
        if self.schema_version > EXPORT_SCHEMA_VERSION {
            return Err(format!(
                "Export schema version {} is newer than supported version {}. \
                 Please update the server.",
                self.schema_version, EXPORT_SCHEMA_VERSION
            ));
        }

        for (session_id, session) in &self.sessions {
            if *session_id != session.id {
                return Err(format!(
                    "Session keyed '{}' carries id '{}'",
                    session_id, session.id
                ));
            }
            if session.streak > session.longest_streak {
                return Err(format!(
                    "Session '{}' has streak {} above its longest streak {}",
                    session_id, session.streak, session.longest_streak
                ));
            }

            let mut seen = HashSet::new();
            let last = session.round_ids.len().saturating_sub(1);
            for (position, round_id) in session.round_ids.iter().enumerate() {
                if !seen.insert(round_id) {
                    return Err(format!(
                        "Session '{}' lists round '{}' twice",
                        session_id, round_id
                    ));
                }
                let round = self
                    .rounds
                    .get(round_id)
                    .filter(|r| r.session_id == *session_id)
                    .ok_or_else(|| {
                        format!(
                            "Session '{}' lists round '{}' which doesn't exist",
                            session_id, round_id
                        )
                    })?;
                // Only the latest round of a session can still be open
                if position != last && !round.is_answered() {
                    return Err(format!(
                        "Session '{}' has more than one open round",
                        session_id
                    ));
                }
            }
        }

        for (round_id, round) in &self.rounds {
            let Some(session) = self.sessions.get(&round.session_id) else {
                return Err(format!(
                    "Round '{}' references session '{}' which doesn't exist",
                    round_id, round.session_id
                ));
            };
            if !session.round_ids.contains(round_id) {
                return Err(format!(
                    "Round '{}' is missing from session '{}'",
                    round_id, round.session_id
                ));
            }
            if let Some(next) = round.result.as_ref().and_then(|r| r.next_round_id.as_ref()) {
                if !self.rounds.contains_key(next) {
                    return Err(format!(
                        "Round '{}' references next round '{}' which doesn't exist",
                        round_id, next
                    ));
                }
            }
        }

        Ok(())
    }
}

impl AppState {
    pub async fn export_state(&self) -> StateSnapshot {
        let sessions = self.sessions.read().await;
        let rounds = self.rounds.read().await;
        let profiles = self.profiles.read().await;

        StateSnapshot::new(sessions.clone(), rounds.clone(), profiles.clone())
    }

    /// Replace all state with a snapshot and rebuild the leaderboards from it
    pub async fn import_state(&self, snapshot: StateSnapshot) -> EngineResult<RebuildReport> {
        snapshot.validate().map_err(EngineError::InvalidInput)?;

        // Rounds must point at answers the running catalog still knows
        if let Some(round) = snapshot.rounds.values().find(|r| {
            std::iter::once(&r.answer_id)
                .chain(&r.choice_ids)
                .any(|id| self.catalog.get(id).is_none())
        }) {
            return Err(EngineError::InvalidInput(format!(
                "Round '{}' references a resource missing from the catalog",
                round.id
            )));
        }

        {
            let mut sessions = self.sessions.write().await;
            let mut owner_sessions = self.owner_sessions.write().await;
            let mut rounds = self.rounds.write().await;
            let mut profiles = self.profiles.write().await;
            *owner_sessions = index_owners(&snapshot.sessions);
            *sessions = snapshot.sessions;
            *rounds = snapshot.rounds;
            *profiles = snapshot.profiles;

            tracing::info!(
                schema_version = snapshot.schema_version,
                exported_at = %snapshot.exported_at,
                sessions = sessions.len(),
                rounds = rounds.len(),
                profiles = profiles.len(),
                "State imported"
            );
        }

        self.rebuild_rankings().await
    }
}
