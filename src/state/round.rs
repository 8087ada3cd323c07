use super::AppState;
use crate::catalog::{Catalog, CHOICES_PER_ROUND};
use crate::error::{require_id, EngineError, EngineResult};
use crate::protocol::{ChoiceView, RoundView};
use crate::types::*;
use chrono::{DateTime, Utc};
use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::HashMap;

/// Answer and presentation order chosen for a round
#[derive(Debug, Clone, PartialEq)]
pub struct RoundPick {
    pub answer_id: ResourceId,
    pub choice_ids: Vec<ResourceId>,
}

/// How many distractor slots draw from the answer's own group, stepping up
/// every four streak points until all slots are biased
pub fn biased_slots(prior_streak: u32) -> usize {
    match prior_streak {
        0..=3 => 0,
        4..=7 => 1,
        8..=11 => 2,
        12..=15 => 3,
        _ => CHOICES_PER_ROUND,
    }
}

/// Pick an answer plus distractors and shuffle them into presentation order.
///
/// Needs a catalog of at least `CHOICES_PER_ROUND` resources, which
/// `Catalog::new` guarantees.
pub fn pick_round<R: Rng>(catalog: &Catalog, prior_streak: u32, rng: &mut R) -> RoundPick {
    let resources = catalog.resources();
    let answer = &resources[rng.random_range(0..resources.len())];
    let biased = biased_slots(prior_streak);

    let mut chosen: Vec<&Resource> = Vec::with_capacity(CHOICES_PER_ROUND);
    chosen.push(answer);

    for slot in 0..CHOICES_PER_ROUND - 1 {
        let is_free = |r: &Resource| !chosen.iter().any(|c| c.id == r.id);

        let mut pool: Vec<&Resource> = if slot < biased {
            resources
                .iter()
                .filter(|r| answer.shares_group(r) && is_free(*r))
                .collect()
        } else {
            Vec::new()
        };
        if pool.is_empty() {
            pool = resources.iter().filter(|r| is_free(*r)).collect();
        }

        let pick = pool[rng.random_range(0..pool.len())];
        chosen.push(pick);
    }

    chosen.shuffle(rng);

    RoundPick {
        answer_id: answer.id.clone(),
        choice_ids: chosen.into_iter().map(|r| r.id.clone()).collect(),
    }
}

pub(crate) fn choice_view(resource: &Resource) -> ChoiceView {
    ChoiceView {
        id: resource.id.clone(),
        name: resource.name.clone(),
        prefix: resource.prefix.clone(),
    }
}

impl AppState {
    /// Draw the next round of `session`, store it and append it to the
    /// session's rounds. The caller must hold the sessions and rounds write
    /// locks.
    pub(crate) fn insert_round(
        &self,
        rounds: &mut HashMap<RoundId, Round>,
        session: &mut Session,
        prior_streak: u32,
        now: DateTime<Utc>,
    ) -> Round {
        let pick = pick_round(&self.catalog, prior_streak, &mut rand::rng());

        let round = Round {
            id: ulid::Ulid::new().to_string(),
            session_id: session.id.clone(),
            answer_id: pick.answer_id,
            choice_ids: pick.choice_ids,
            choice_id: None,
            start_time: now + self.config.round_delay(),
            end_time: None,
            result: None,
        };

        rounds.insert(round.id.clone(), round.clone());
        session.round_ids.push(round.id.clone());
        tracing::debug!(
            round_id = %round.id,
            session_id = %session.id,
            prior_streak,
            "Round generated"
        );
        round
    }

    pub(crate) fn resource(&self, id: &str) -> EngineResult<&Resource> {
        self.catalog
            .get(id)
            .ok_or_else(|| EngineError::NotFound(format!("Resource '{}'", id)))
    }

    /// Render data for a round, without revealing the answer
    pub fn round_view(&self, round: &Round) -> EngineResult<RoundView> {
        let answer = self.resource(&round.answer_id)?;
        let choices = round
            .choice_ids
            .iter()
            .map(|id| self.resource(id).map(choice_view))
            .collect::<EngineResult<Vec<_>>>()?;

        Ok(RoundView {
            id: round.id.clone(),
            session_id: round.session_id.clone(),
            start_time: round.start_time,
            icon: answer.icon.clone(),
            choices,
        })
    }

    /// Generate the next round of a session.
    ///
    /// Refused while the session still has an open round, and once the
    /// session is complete or its deadline has passed.
    pub async fn generate_round(
        &self,
        session_id: &str,
        prior_streak: u32,
    ) -> EngineResult<RoundView> {
        require_id("sessionId", session_id)?;

        let mut sessions = self.sessions.write().await;
        let session = sessions
            .get_mut(session_id)
            .ok_or_else(|| EngineError::NotFound(format!("Session '{}'", session_id)))?;

        let now = Utc::now();
        if session.complete || now >= session.expires_at {
            return Err(EngineError::Conflict(format!(
                "Session '{}' is over",
                session_id
            )));
        }

        let mut rounds = self.rounds.write().await;
        if let Some(open) = session
            .round_ids
            .last()
            .filter(|id| rounds.get(*id).is_some_and(|r| !r.is_answered()))
        {
            return Err(EngineError::Conflict(format!(
                "Session '{}' already has an open round '{}'",
                session_id, open
            )));
        }

        let round = self.insert_round(&mut rounds, session, prior_streak, now);
        self.round_view(&round)
    }
}
