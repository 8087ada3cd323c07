use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Opaque ID types for type safety
pub type SessionId = String;
pub type RoundId = String;
pub type ResourceId = String;
pub type OwnerId = String;

/// Prefix for identities handed out to players who have not signed in
pub const ANONYMOUS_PREFIX: &str = "anon-";

/// One gradient stop of an icon
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ColorStop {
    pub offset: f32,
    pub color: String,
}

/// Everything needed to draw an icon without fetching it
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct IconSpec {
    pub view_box: String,
    #[serde(default)]
    pub stops: Vec<ColorStop>,
    pub paths: Vec<String>,
}

/// An answerable catalog item
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Resource {
    pub id: ResourceId,
    pub name: String,
    pub category: String,
    #[serde(default)]
    pub subcategory: Option<String>,
    /// Brand prefix shown before the name ("AWS", "Amazon")
    #[serde(default)]
    pub prefix: Option<String>,
    pub icon: IconSpec,
}

impl Resource {
    /// Whether `other` belongs to this resource's distractor bias group:
    /// the same subcategory, or the same category when this one has none
    pub fn shares_group(&self, other: &Resource) -> bool {
        match &self.subcategory {
            Some(sub) => other.subcategory.as_deref() == Some(sub.as_str()),
            None => other.category == self.category,
        }
    }
}

/// One play-through
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: SessionId,
    pub owner_id: OwnerId,
    pub start_time: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub score: u32,
    pub streak: u32,
    pub longest_streak: u32,
    pub complete: bool,
    pub valid: bool,
    pub validated_at: Option<DateTime<Utc>>,
    pub finalized_at: Option<DateTime<Utc>>,
    /// Rounds in play order; only the last one can still be open
    #[serde(default)]
    pub round_ids: Vec<RoundId>,
}

/// Stored result of answering a round, replayed on repeated answers
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RoundResult {
    pub correct: bool,
    pub expired: bool,
    pub score_delta: u32,
    pub time_delta_seconds: i64,
    pub next_round_id: Option<RoundId>,
    /// The session as it stood right after this answer
    pub session: Session,
}

/// One question instance within a session
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Round {
    pub id: RoundId,
    pub session_id: SessionId,
    pub answer_id: ResourceId,
    /// Presented resource ids, in presentation order
    pub choice_ids: Vec<ResourceId>,
    pub choice_id: Option<ResourceId>,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub result: Option<RoundResult>,
}

impl Round {
    pub fn is_answered(&self) -> bool {
        self.choice_id.is_some()
    }
}

/// Display identity of a player, pushed by the sign-in collaborator
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub display_name: String,
    #[serde(default)]
    pub image: Option<String>,
}

/// Which ranked set a query targets
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum Board {
    #[default]
    Scores,
    Streaks,
}

impl Board {
    pub const ALL: [Board; 2] = [Board::Scores, Board::Streaks];

    pub fn as_str(&self) -> &'static str {
        match self {
            Board::Scores => "scores",
            Board::Streaks => "streaks",
        }
    }
}

/// One leaderboard row with its resolved display identity
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RankedEntry {
    /// 1-based position on the board
    pub rank: usize,
    pub owner_id: OwnerId,
    pub display_name: String,
    pub image: Option<String>,
    pub value: u32,
}
