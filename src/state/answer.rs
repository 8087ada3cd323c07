//! Answer evaluation
//!
//! Scores a submitted choice against its round and advances the session.
//! The whole check-and-mutate runs under the sessions and rounds write locks,
//! so a round is answered at most once and the round, session and next-round
//! writes land together or not at all.

use super::AppState;
use crate::error::{require_id, EngineError, EngineResult};
use crate::protocol::Outcome;
use crate::types::*;
use chrono::{DateTime, TimeDelta, Utc};

/// Score and clock changes of one answer, before they are applied
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Scoring {
    pub correct: bool,
    pub expired: bool,
    pub streak: u32,
    pub longest_streak: u32,
    pub score_delta: u32,
    pub time_delta_seconds: i64,
}

impl AppState {
    pub(crate) fn score_answer(&self, session: &Session, correct: bool, expired: bool) -> Scoring {
        let streak = if correct { session.streak + 1 } else { 0 };
        let rewarded = correct && !expired;

        Scoring {
            correct,
            expired,
            streak,
            longest_streak: session.longest_streak.max(streak),
            score_delta: if rewarded {
                streak.min(self.config.max_streak_bonus)
            } else {
                0
            },
            time_delta_seconds: if rewarded {
                self.config.correct_bonus_seconds
            } else {
                -self.config.incorrect_penalty_seconds
            },
        }
    }

    /// New deadline after an in-time answer. The round delay is folded in so
    /// the timer shows the transition buffer; the deadline never drops below
    /// the moment of the answer.
    fn next_deadline(&self, expires_at: DateTime<Utc>, time_delta_seconds: i64, end: DateTime<Utc>) -> DateTime<Utc> {
        let moved = expires_at + TimeDelta::seconds(time_delta_seconds) + self.config.round_delay();
        moved.max(end)
    }

    /// Submit a choice for a round.
    ///
    /// Answering an already answered round returns the stored outcome without
    /// applying anything again.
    pub async fn submit_answer(&self, round_id: &str, choice_id: &str) -> EngineResult<Outcome> {
        require_id("roundId", round_id)?;
        require_id("choiceId", choice_id)?;

        let mut sessions = self.sessions.write().await;
        let mut rounds = self.rounds.write().await;

        let round = rounds
            .get(round_id)
            .cloned()
            .ok_or_else(|| EngineError::NotFound(format!("Round '{}'", round_id)))?;

        if !round.choice_ids.iter().any(|id| id == choice_id) {
            return Err(EngineError::InvalidInput(format!(
                "'{}' is not a choice of round '{}'",
                choice_id, round_id
            )));
        }

        let session = sessions
            .get_mut(&round.session_id)
            .ok_or_else(|| EngineError::NotFound(format!("Session '{}'", round.session_id)))?;

        if let Some(result) = &round.result {
            tracing::debug!(round_id, "Round already answered, replaying stored outcome");
            let next_round = match &result.next_round_id {
                Some(id) => rounds.get(id).map(|r| self.round_view(r)).transpose()?,
                None => None,
            };
            return Ok(Outcome {
                correct: result.correct,
                answer_id: round.answer_id.clone(),
                expired: result.expired,
                session: result.session.clone(),
                score_delta: result.score_delta,
                time_delta_seconds: result.time_delta_seconds,
                next_round,
            });
        }

        let end = Utc::now();
        let was_complete = session.complete;
        let expired = was_complete || end >= session.expires_at;
        let correct = round.answer_id == choice_id;
        let scoring = self.score_answer(session, correct, expired);

        // A session that already ended only gets the answer on record
        if !was_complete {
            session.score += scoring.score_delta;
            session.streak = scoring.streak;
            session.longest_streak = scoring.longest_streak;
            if expired {
                session.complete = true;
            } else {
                session.expires_at =
                    self.next_deadline(session.expires_at, scoring.time_delta_seconds, end);
            }
        }

        let next_round = if expired {
            None
        } else {
            Some(self.insert_round(&mut rounds, session, scoring.streak, end))
        };
        let session = session.clone();

        if let Some(stored) = rounds.get_mut(round_id) {
            stored.choice_id = Some(choice_id.to_string());
            stored.end_time = Some(end);
            stored.result = Some(RoundResult {
                correct,
                expired,
                score_delta: scoring.score_delta,
                time_delta_seconds: scoring.time_delta_seconds,
                next_round_id: next_round.as_ref().map(|r| r.id.clone()),
                session: session.clone(),
            });
        }

        drop(rounds);
        drop(sessions);

        tracing::info!(
            round_id,
            session_id = %session.id,
            correct,
            expired,
            score = session.score,
            streak = session.streak,
            "Answer recorded"
        );

        Ok(Outcome {
            correct,
            answer_id: round.answer_id,
            expired,
            session,
            score_delta: scoring.score_delta,
            time_delta_seconds: scoring.time_delta_seconds,
            next_round: next_round.map(|r| self.round_view(&r)).transpose()?,
        })
    }
}
