//! Request and response bodies exchanged with the presentation layer

use crate::types::*;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A choice as shown to the player
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChoiceView {
    pub id: ResourceId,
    pub name: String,
    pub prefix: Option<String>,
}

/// Render data of a round. Deliberately carries no marker of which choice
/// is correct.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RoundView {
    pub id: RoundId,
    pub session_id: SessionId,
    pub start_time: DateTime<Utc>,
    pub icon: IconSpec,
    pub choices: Vec<ChoiceView>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewSessionRequest {
    #[serde(default)]
    pub owner_id: Option<OwnerId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewSessionResponse {
    pub session: Session,
    pub round: RoundView,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerRequest {
    pub choice_id: ResourceId,
}

/// Result of submitting an answer
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Outcome {
    pub correct: bool,
    /// The correct resource, revealed once the round is answered
    pub answer_id: ResourceId,
    pub expired: bool,
    pub session: Session,
    pub score_delta: u32,
    pub time_delta_seconds: i64,
    pub next_round: Option<RoundView>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LeaderboardQuery {
    pub owner_id: Option<OwnerId>,
    /// 1-based page number
    pub page: Option<usize>,
    pub page_size: Option<usize>,
    #[serde(default)]
    pub board: Board,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidityRequest {
    pub valid: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeRequest {
    pub from_id: OwnerId,
    pub to_id: OwnerId,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MergeReport {
    pub sessions_moved: usize,
    /// Boards on which the target adopted the merged-away owner's value
    pub adopted: Vec<Board>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RebuildReport {
    pub sessions_considered: usize,
    pub owners_ranked: usize,
}

/// One round in a session's timeline
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RoundRecap {
    pub id: RoundId,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    /// Hidden while the round is still in play
    pub answer: Option<ChoiceView>,
    pub choice: Option<ChoiceView>,
    pub correct: Option<bool>,
    pub score_delta: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionRecap {
    pub session: Session,
    pub rounds: Vec<RoundRecap>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PlayerHistory {
    pub owner_id: OwnerId,
    pub profile: Option<Profile>,
    /// Newest first
    pub sessions: Vec<Session>,
    pub best_score: Option<u32>,
    pub best_streak: Option<u32>,
    /// 1-based rank on each board, when ranked
    pub score_rank: Option<usize>,
    pub streak_rank: Option<usize>,
}
