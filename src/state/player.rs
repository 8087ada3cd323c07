use super::AppState;
use crate::error::{require_id, EngineError, EngineResult};
use crate::protocol::PlayerHistory;
use crate::types::*;
use rand::Rng;

/// Unambiguous characters for generated name suffixes (no 0/O, 1/I/L)
const CODE_CHARS: &[u8] = b"ABCDEFGHJKMNPQRSTUVWXYZ23456789";
const CODE_LENGTH: usize = 5;
const MAX_DISPLAY_NAME_CHARS: usize = 64;

/// Two-word name like "gentle-otter", or "player-K7Q2M" if no words are available
fn generate_display_name() -> String {
    petname::petname(2, "-").unwrap_or_else(|| {
        let mut rng = rand::rng();
        let code: String = (0..CODE_LENGTH)
            .map(|_| CODE_CHARS[rng.random_range(0..CODE_CHARS.len())] as char)
            .collect();
        format!("player-{}", code)
    })
}

impl AppState {
    /// Store the display identity of an owner, replacing any previous one
    pub async fn upsert_profile(&self, owner_id: &str, profile: Profile) -> EngineResult<Profile> {
        require_id("ownerId", owner_id)?;

        let display_name = profile.display_name.trim();
        if display_name.is_empty() {
            return Err(EngineError::InvalidInput(
                "displayName must not be empty".to_string(),
            ));
        }
        if display_name.chars().count() > MAX_DISPLAY_NAME_CHARS {
            return Err(EngineError::InvalidInput(format!(
                "displayName must be at most {} characters",
                MAX_DISPLAY_NAME_CHARS
            )));
        }

        let profile = Profile {
            display_name: display_name.to_string(),
            image: profile.image.filter(|url| !url.trim().is_empty()),
        };
        self.profiles
            .write()
            .await
            .insert(owner_id.to_string(), profile.clone());

        tracing::info!(owner_id, display_name = %profile.display_name, "Profile updated");
        Ok(profile)
    }

    pub async fn get_profile(&self, owner_id: &str) -> Option<Profile> {
        self.profiles.read().await.get(owner_id).cloned()
    }

    /// Give an anonymous owner a generated name unless it already has one
    pub(crate) async fn ensure_anonymous_profile(&self, owner_id: &str) {
        let mut profiles = self.profiles.write().await;
        if profiles.contains_key(owner_id) {
            return;
        }
        let display_name = generate_display_name();
        tracing::debug!(owner_id, display_name = %display_name, "Anonymous name assigned");
        profiles.insert(
            owner_id.to_string(),
            Profile {
                display_name,
                image: None,
            },
        );
    }

    /// An owner's profile, sessions and standing on both boards
    pub async fn player_history(&self, owner_id: &str) -> EngineResult<PlayerHistory> {
        require_id("ownerId", owner_id)?;

        let mut sessions: Vec<Session> = {
            let sessions = self.sessions.read().await;
            let owner_sessions = self.owner_sessions.read().await;
            owner_sessions
                .get(owner_id)
                .into_iter()
                .flatten()
                .filter_map(|id| sessions.get(id).cloned())
                .collect()
        };
        let profile = self.get_profile(owner_id).await;

        if sessions.is_empty() && profile.is_none() {
            return Err(EngineError::NotFound(format!("Player '{}'", owner_id)));
        }
        sessions.sort_by(|a, b| b.start_time.cmp(&a.start_time).then(b.id.cmp(&a.id)));

        let best_score = self.rankings.value(Board::Scores, owner_id).await?;
        let best_streak = self.rankings.value(Board::Streaks, owner_id).await?;
        let score_rank = self.rankings.rev_rank(Board::Scores, owner_id).await?;
        let streak_rank = self.rankings.rev_rank(Board::Streaks, owner_id).await?;

        Ok(PlayerHistory {
            owner_id: owner_id.to_string(),
            profile,
            sessions,
            best_score: best_score.map(|v| v.value),
            best_streak: best_streak.map(|v| v.value),
            score_rank: score_rank.map(|r| r + 1),
            streak_rank: streak_rank.map(|r| r + 1),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::test_support::*;

    #[test]
    fn test_generated_names_are_not_empty() {
        for _ in 0..20 {
            let name = generate_display_name();
            assert!(!name.is_empty());
            assert!(name.contains('-'));
        }
    }

    #[tokio::test]
    async fn test_upsert_profile_validates_and_trims() {
        let state = test_state();

        let profile = state
            .upsert_profile(
                "user-1",
                Profile {
                    display_name: "  Ada  ".to_string(),
                    image: Some(String::new()),
                },
            )
            .await
            .unwrap();
        assert_eq!(profile.display_name, "Ada");
        assert!(profile.image.is_none());
        assert_eq!(state.get_profile("user-1").await, Some(profile));

        let err = state
            .upsert_profile(
                "user-1",
                Profile {
                    display_name: " ".to_string(),
                    image: None,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidInput(_)));

        let err = state
            .upsert_profile(
                "user-1",
                Profile {
                    display_name: "x".repeat(MAX_DISPLAY_NAME_CHARS + 1),
                    image: None,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_anonymous_profile_is_kept_once_assigned() {
        let state = test_state();
        state.ensure_anonymous_profile("anon-1").await;
        let first = state.get_profile("anon-1").await.unwrap();
        state.ensure_anonymous_profile("anon-1").await;
        assert_eq!(state.get_profile("anon-1").await.unwrap(), first);
    }

    #[tokio::test]
    async fn test_player_history() {
        let state = test_state();
        let older = state
            .new_session(Some("user-1".to_string()))
            .await
            .unwrap();
        let newer = state
            .new_session(Some("user-1".to_string()))
            .await
            .unwrap();
        state.set_validity(&older.session.id, true).await.unwrap();
        state.finalize_session(&older.session.id).await.unwrap();

        let history = state.player_history("user-1").await.unwrap();
        assert_eq!(history.sessions.len(), 2);
        assert_eq!(history.sessions[0].id, newer.session.id);
        assert_eq!(history.best_score, Some(0));
        assert_eq!(history.score_rank, Some(1));
        assert_eq!(history.streak_rank, Some(1));
        assert!(history.profile.is_none());

        let err = state.player_history("nobody").await.unwrap_err();
        assert!(matches!(err, EngineError::NotFound(_)));
    }
}
