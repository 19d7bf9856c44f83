use serde::{Deserialize, Serialize};
use std::hash::{Hash, Hasher};

use crate::model::ids::ItemId;

//
// ─── REVIEW ITEM ───────────────────────────────────────────────────────────────
//

/// A single flashcard-like item served to a practice session.
///
/// Identity is the `id`: two items with the same id compare equal even when the
/// server re-sends them with edited text.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewItem {
    pub id: ItemId,
    pub front: String,
    pub back: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_index: Option<u32>,
}

impl ReviewItem {
    #[must_use]
    pub fn new(id: impl Into<ItemId>, front: impl Into<String>, back: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            front: front.into(),
            back: back.into(),
            hint: None,
            group_index: None,
        }
    }

    #[must_use]
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    #[must_use]
    pub fn with_group(mut self, group_index: u32) -> Self {
        self.group_index = Some(group_index);
        self
    }
}

impl PartialEq for ReviewItem {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ReviewItem {}

impl Hash for ReviewItem {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

//
// ─── PAGE ──────────────────────────────────────────────────────────────────────
//

/// One page of items returned by a paginated item source.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemPage {
    pub items: Vec<ReviewItem>,
    /// Total number of items behind the paginated endpoint, when the server knows it.
    #[serde(default)]
    pub total_count: Option<u32>,
    pub has_more: bool,
}
