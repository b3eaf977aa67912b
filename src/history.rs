use super::classifier::Classification;
use super::rules::DEFAULT_HISTORY_LIMIT;
use super::types::{CapturedRequest, Category};

/// Captured requests, most recent first.
pub type History = Vec<CapturedRequest>;

/// How a new record is folded into the history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeHint {
    /// The record starts a new session: the history becomes just this record.
    ReplaceAll,
    /// Drop any entry of this category, then insert at the front.
    ReplaceCategory(Category),
    /// Insert at the front and evict from the tail past `limit`.
    AppendBounded(usize),
}

impl MergeHint {
    pub fn for_category(category: Category, limit: usize) -> Self {
        match category {
            Category::HeaderView => Self::ReplaceAll,
            Category::WorkOrdersList => Self::ReplaceCategory(Category::WorkOrdersList),
            Category::PiiDetails => Self::ReplaceCategory(Category::PiiDetails),
            Category::Uncategorized => Self::AppendBounded(limit),
        }
    }

    pub fn is_replace_all(&self) -> bool {
        matches!(self, Self::ReplaceAll)
    }
}

/// Fold a classification into the history with the default 20-entry bound.
pub fn merge(history: &[CapturedRequest], classification: &Classification) -> History {
    merge_with_limit(history, classification, DEFAULT_HISTORY_LIMIT)
}

/// Fold a classification into the history. Out-of-scope and ignored calls
/// leave it unchanged.
pub fn merge_with_limit(
    history: &[CapturedRequest],
    classification: &Classification,
    limit: usize,
) -> History {
    match classification {
        Classification::Captured(record) => {
            let hint = MergeHint::for_category(record.category, limit);
            apply(history, record.clone(), hint)
        }
        Classification::OutOfScope | Classification::Ignored(_) => history.to_vec(),
    }
}

/// Insert `record` into `history` following `hint`.
pub fn apply(history: &[CapturedRequest], record: CapturedRequest, hint: MergeHint) -> History {
    match hint {
        MergeHint::ReplaceAll => vec![record],
        MergeHint::ReplaceCategory(category) => {
            let mut merged = Vec::with_capacity(history.len() + 1);
            merged.push(record);
            merged.extend(history.iter().filter(|r| r.category != category).cloned());
            merged
        }
        MergeHint::AppendBounded(limit) => {
            let mut merged = Vec::with_capacity(history.len() + 1);
            merged.push(record);
            merged.extend(history.iter().cloned());
            merged.truncate(limit);
            merged
        }
    }
}

/// Most recent entry of `category`, if any.
pub fn latest(history: &[CapturedRequest], category: Category) -> Option<&CapturedRequest> {
    history.iter().find(|r| r.category == category)
}
