use chrono::{DateTime, Utc};

use drill_core::model::{ResourceId, SessionStats};

/// Presentation-agnostic summary of a finished practice session.
///
/// The UI may format timestamps (e.g., relative time, locale) as needed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSummary {
    pub resource_id: ResourceId,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,

    pub items_answered: u32,
    pub xp_earned: u64,
    pub level_ups: u32,
    /// Latest level reported by an answer, if any answer levelled up.
    pub level: Option<u32>,

    /// Server-side statistics fetched once at completion.
    pub stats: SessionStats,
}
