use super::round::choice_view;
use super::AppState;
use crate::error::{require_id, EngineError, EngineResult};
use crate::protocol::{NewSessionResponse, RoundRecap, SessionRecap};
use crate::types::*;
use chrono::Utc;

impl AppState {
    /// Start a new play-through for `owner_id`, or for a fresh anonymous
    /// identity when none is given. Returns the session and its first round.
    pub async fn new_session(&self, owner_id: Option<OwnerId>) -> EngineResult<NewSessionResponse> {
        let owner_id = match owner_id {
            Some(id) => {
                require_id("ownerId", &id)?;
                id
            }
            None => format!("{}{}", ANONYMOUS_PREFIX, ulid::Ulid::new()),
        };

        let now = Utc::now();
        let mut session = Session {
            id: ulid::Ulid::new().to_string(),
            owner_id: owner_id.clone(),
            start_time: now,
            // The first round's render buffer counts toward the budget like every later one
            expires_at: now + self.config.game_length() + self.config.round_delay(),
            score: 0,
            streak: 0,
            longest_streak: 0,
            complete: false,
            valid: false,
            validated_at: None,
            finalized_at: None,
            round_ids: Vec::new(),
        };

        let round = {
            let mut sessions = self.sessions.write().await;
            let mut owner_sessions = self.owner_sessions.write().await;
            let mut rounds = self.rounds.write().await;
            let round = self.insert_round(&mut rounds, &mut session, 0, now);
            owner_sessions
                .entry(owner_id.clone())
                .or_default()
                .push(session.id.clone());
            sessions.insert(session.id.clone(), session.clone());
            round
        };

        if owner_id.starts_with(ANONYMOUS_PREFIX) {
            self.ensure_anonymous_profile(&owner_id).await;
        }

        tracing::info!(
            session_id = %session.id,
            owner_id = %session.owner_id,
            expires_at = %session.expires_at,
            "Session started"
        );

        Ok(NewSessionResponse {
            round: self.round_view(&round)?,
            session,
        })
    }

    pub async fn get_session(&self, session_id: &str) -> EngineResult<Session> {
        self.sessions
            .read()
            .await
            .get(session_id)
            .cloned()
            .ok_or_else(|| EngineError::NotFound(format!("Session '{}'", session_id)))
    }

    /// Record the anti-abuse verdict for a session. The verdict can be set
    /// exactly once.
    pub async fn set_validity(&self, session_id: &str, valid: bool) -> EngineResult<Session> {
        require_id("sessionId", session_id)?;

        let mut sessions = self.sessions.write().await;
        let session = sessions
            .get_mut(session_id)
            .ok_or_else(|| EngineError::NotFound(format!("Session '{}'", session_id)))?;

        if session.validated_at.is_some() {
            return Err(EngineError::Conflict(format!(
                "Validity of session '{}' is already set",
                session_id
            )));
        }

        session.valid = valid;
        session.validated_at = Some(Utc::now());
        tracing::info!(session_id, valid, "Session validity recorded");
        Ok(session.clone())
    }

    /// A session with its rounds in play order. Answers of rounds still in
    /// play stay hidden.
    pub async fn session_recap(&self, session_id: &str) -> EngineResult<SessionRecap> {
        require_id("sessionId", session_id)?;

        let session = self.get_session(session_id).await?;
        let rounds: Vec<Round> = {
            let rounds = self.rounds.read().await;
            session
                .round_ids
                .iter()
                .filter_map(|id| rounds.get(id).cloned())
                .collect()
        };

        let rounds = rounds
            .into_iter()
            .map(|round| {
                let revealed = round.is_answered() || session.complete;
                RoundRecap {
                    answer: revealed
                        .then(|| self.catalog.get(&round.answer_id).map(choice_view))
                        .flatten(),
                    choice: round
                        .choice_id
                        .as_deref()
                        .and_then(|id| self.catalog.get(id))
                        .map(choice_view),
                    correct: round.result.as_ref().map(|r| r.correct),
                    score_delta: round.result.as_ref().map(|r| r.score_delta),
                    id: round.id,
                    start_time: round.start_time,
                    end_time: round.end_time,
                }
            })
            .collect();

        Ok(SessionRecap { session, rounds })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::test_support::*;
    use chrono::TimeDelta;

    #[tokio::test]
    async fn test_new_session_defaults() {
        let state = test_state();
        let created = state.new_session(None).await.unwrap();
        let session = created.session;

        assert!(session.owner_id.starts_with(ANONYMOUS_PREFIX));
        assert_eq!(session.score, 0);
        assert_eq!(session.streak, 0);
        assert!(!session.complete);
        assert!(!session.valid);
        assert_eq!(
            session.expires_at - session.start_time,
            TimeDelta::seconds(31)
        );
        assert_eq!(created.round.session_id, session.id);
        assert_eq!(session.round_ids, vec![created.round.id.clone()]);

        // Anonymous players get a generated display name
        let profile = state.get_profile(&session.owner_id).await.unwrap();
        assert!(!profile.display_name.is_empty());
    }

    #[tokio::test]
    async fn test_new_session_with_owner() {
        let state = test_state();
        let created = state
            .new_session(Some("user-1".to_string()))
            .await
            .unwrap();
        assert_eq!(created.session.owner_id, "user-1");
        assert!(state.get_profile("user-1").await.is_none());

        let err = state.new_session(Some(String::new())).await.unwrap_err();
        assert!(matches!(err, EngineError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_validity_is_set_once() {
        let state = test_state();
        let created = state.new_session(None).await.unwrap();
        let id = created.session.id;

        let session = state.set_validity(&id, true).await.unwrap();
        assert!(session.valid);
        assert!(session.validated_at.is_some());

        let err = state.set_validity(&id, false).await.unwrap_err();
        assert!(matches!(err, EngineError::Conflict(_)));
        assert!(state.get_session(&id).await.unwrap().valid);

        let err = state.set_validity("missing", true).await.unwrap_err();
        assert!(matches!(err, EngineError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_recap_hides_open_round_answer() {
        let state = test_state();
        let created = state.new_session(None).await.unwrap();
        let first = created.round.id.clone();

        let outcome = answer_open_round(&state, &first, true).await;
        let next = outcome.next_round.unwrap();

        let recap = state.session_recap(&created.session.id).await.unwrap();
        assert_eq!(recap.rounds.len(), 2);

        let answered = recap.rounds.iter().find(|r| r.id == first).unwrap();
        assert_eq!(answered.correct, Some(true));
        assert_eq!(answered.score_delta, Some(1));
        assert_eq!(
            answered.answer.as_ref().map(|a| &a.id),
            Some(&outcome.answer_id)
        );

        let open = recap.rounds.iter().find(|r| r.id == next.id).unwrap();
        assert!(open.answer.is_none());
        assert!(open.choice.is_none());
        assert!(open.correct.is_none());
    }
}
