use serde::{Deserialize, Serialize};

/// How hard the learner found an item. Sent with every answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DifficultyTier {
    Easy,
    Medium,
    Hard,
}

impl DifficultyTier {
    /// Parses the single-letter or full-word form used by terminal prompts.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "e" | "easy" => Some(Self::Easy),
            "m" | "medium" => Some(Self::Medium),
            "h" | "hard" => Some(Self::Hard),
            _ => None,
        }
    }
}

/// Server response to a submitted answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerOutcome {
    pub xp_gained: u32,
    #[serde(default)]
    pub new_level: Option<u32>,
    #[serde(default)]
    pub leveled_up: bool,
}

/// Summary statistics fetched once a practice session completes.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStats {
    pub items_reviewed: u32,
    pub total_xp: u64,
    pub level: u32,
    #[serde(default)]
    pub streak_days: u32,
}
