use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// FSRS-5 default weight vector (19 entries).
pub const DEFAULT_WEIGHTS: [f64; 19] = [
    0.4072, 1.1829, 3.1262, 15.4722, 7.2102, 0.5316, 1.0651, 0.0, 1.5546, 0.1192, 1.0101, 1.9395,
    0.1100, 0.2939, 2.0091, 0.2415, 2.9898, 0.5100, 0.6000,
];

/// Default desired recall probability at the scheduled review time.
pub const DEFAULT_TARGET_RETENTION: f64 = 0.9;

/// Review grade on the 4-point FSRS scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Rating {
    Again = 1,
    Hard = 2,
    Good = 3,
    Easy = 4,
}

impl Rating {
    pub fn as_u8(&self) -> u8 {
        *self as u8
    }

    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(Rating::Again),
            2 => Some(Rating::Hard),
            3 => Some(Rating::Good),
            4 => Some(Rating::Easy),
            _ => None,
        }
    }

    /// Map a normalised score onto a grade. Unscored responses rate Good.
    pub fn from_score(score: Option<f64>) -> Self {
        match score {
            None => Rating::Good,
            Some(s) if s >= 0.9 => Rating::Easy,
            Some(s) if s >= 0.7 => Rating::Good,
            Some(s) if s >= 0.4 => Rating::Hard,
            Some(_) => Rating::Again,
        }
    }
}

/// Memory phase of a card.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CardState {
    New,
    Learning,
    Review,
    Relearning,
}

impl CardState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CardState::New => "new",
            CardState::Learning => "learning",
            CardState::Review => "review",
            CardState::Relearning => "relearning",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "new" => Some(CardState::New),
            "learning" => Some(CardState::Learning),
            "review" => Some(CardState::Review),
            "relearning" => Some(CardState::Relearning),
            _ => None,
        }
    }
}

impl std::fmt::Display for CardState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Memory state of one reviewable item for one learner.
///
/// Invariant: `state == New` iff `review_count == 0 && last_review.is_none()`.
/// A new card stores stability/difficulty 0.0; both enter their working
/// ranges on the first rating.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FsrsCard {
    /// Days until retrievability decays to 90%.
    pub stability: f64,
    /// Item difficulty in [1, 10] once reviewed.
    pub difficulty: f64,
    /// Recall probability snapshot at last computation.
    pub retrievability: f64,
    pub state: CardState,
    pub last_review: Option<DateTime<Utc>>,
    pub review_count: u32,
    pub lapse_count: u32,
}

impl FsrsCard {
    /// A card that has never been reviewed.
    pub fn new() -> Self {
        Self {
            stability: 0.0,
            difficulty: 0.0,
            retrievability: 1.0,
            state: CardState::New,
            last_review: None,
            review_count: 0,
            lapse_count: 0,
        }
    }

    pub fn is_new(&self) -> bool {
        self.state == CardState::New
    }
}

impl Default for FsrsCard {
    fn default() -> Self {
        Self::new()
    }
}

/// Result of rating a card: the successor memory state plus the next review.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FsrsSchedule {
    pub next_due: DateTime<Utc>,
    /// Always >= 1.
    pub interval_days: u32,
    pub stability: f64,
    pub difficulty: f64,
    /// Retrievability at the moment the rating was given.
    pub retrievability: f64,
    pub state: CardState,
}
