use chrono::Local;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::broadcast::{self, error::TryRecvError};
use tracing::{debug, warn};

use super::history::History;
use super::settings::keys;
use super::store::StoreChange;
use super::types::{CapturedRequest, Category, ChecklistState};

/// Toolbar icon shown for the checklist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IconState {
    /// At least one required capture is missing (red).
    Incomplete,
    /// All three captures are present (green).
    Complete,
}

impl IconState {
    pub fn from_checklist(state: &ChecklistState) -> Self {
        if state.is_complete() {
            Self::Complete
        } else {
            Self::Incomplete
        }
    }

    /// `(size, path)` pairs for the extension action icon.
    pub fn icon_paths(&self) -> [(u32, &'static str); 3] {
        match self {
            Self::Incomplete => [
                (16, "icons/icon16-red.png"),
                (48, "icons/icon48-red.png"),
                (128, "icons/icon128-red.png"),
            ],
            Self::Complete => [
                (16, "icons/icon16-green.png"),
                (48, "icons/icon48-green.png"),
                (128, "icons/icon128-green.png"),
            ],
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Incomplete => "incomplete",
            Self::Complete => "complete",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub icon: &'static str,
    pub title: String,
    pub message: String,
}

impl Notification {
    pub fn for_record(record: &CapturedRequest) -> Self {
        let at = record
            .timestamp
            .with_timezone(&Local)
            .format("%H:%M:%S")
            .to_string();
        match record.category {
            Category::HeaderView => Self {
                icon: "icons/icon128-green.png",
                title: "HEADER Intercepted!".to_string(),
                message: format!("Technician Work Order List View captured at {at}"),
            },
            Category::WorkOrdersList => Self {
                icon: "icons/icon128-blue.png",
                title: "Work Orders List Intercepted!".to_string(),
                message: format!("RecordGvp.getRecord request captured at {at}"),
            },
            Category::PiiDetails => Self {
                icon: "icons/icon128-orange.png",
                title: "PII Details Intercepted!".to_string(),
                message: format!("PII Work Order Details captured at {at}"),
            },
            Category::Uncategorized => Self {
                icon: "icons/icon128.png",
                title: "Aura Request Intercepted!".to_string(),
                message: format!("Request captured at {at}"),
            },
        }
    }
}

/// Notification for a history change, raised only when the history grew.
pub fn capture_notification(
    previous: &[CapturedRequest],
    current: &[CapturedRequest],
) -> Option<Notification> {
    if current.len() > previous.len() {
        current.first().map(Notification::for_record)
    } else {
        None
    }
}

fn decode<T: DeserializeOwned + Default>(value: Option<&Value>) -> Option<T> {
    match value {
        None => Some(T::default()),
        Some(v) => serde_json::from_value(v.clone())
            .map_err(|e| debug!(error = %e, "unreadable store value"))
            .ok(),
    }
}

/// Notification for a change of the stored history, if it grew.
pub fn change_notification(change: &StoreChange) -> Option<Notification> {
    if change.key != keys::HISTORY {
        return None;
    }
    let previous: History = decode(change.old_value.as_ref())?;
    let current: History = decode(change.new_value.as_ref())?;
    capture_notification(&previous, &current)
}

/// New icon state for a change of the stored checklist.
pub fn change_icon(change: &StoreChange) -> Option<IconState> {
    if change.key != keys::CHECKLIST {
        return None;
    }
    let state: ChecklistState = decode(change.new_value.as_ref())?;
    Some(IconState::from_checklist(&state))
}

/// Changes queued on `changes` so far. Lagged changes are skipped.
pub fn pending_changes(changes: &mut broadcast::Receiver<StoreChange>) -> Vec<StoreChange> {
    let mut pending = Vec::new();
    loop {
        match changes.try_recv() {
            Ok(change) => pending.push(change),
            Err(TryRecvError::Lagged(skipped)) => warn!(skipped, "missed store changes"),
            Err(TryRecvError::Empty | TryRecvError::Closed) => break,
        }
    }
    pending
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;

    fn record(category: Category) -> CapturedRequest {
        CapturedRequest {
            category,
            url: String::new(),
            method: "POST".to_string(),
            body: String::new(),
            referer: String::new(),
            user_agent: String::new(),
            accept_language: String::new(),
            timestamp: DateTime::from_timestamp_millis(0).unwrap(),
            list_view_id: None,
        }
    }

    #[test]
    fn icon_follows_completion() {
        let mut state = ChecklistState {
            has_header_view: true,
            has_work_orders_list: true,
            has_pii_details: false,
        };
        assert_eq!(IconState::from_checklist(&state), IconState::Incomplete);
        state.has_pii_details = true;
        assert_eq!(IconState::from_checklist(&state), IconState::Complete);
        assert!(IconState::Complete.icon_paths()[2].1.ends_with("green.png"));
    }

    #[test]
    fn notification_only_when_history_grows() {
        let one = vec![record(Category::WorkOrdersList)];
        let two = vec![record(Category::PiiDetails), record(Category::WorkOrdersList)];
        let n = capture_notification(&one, &two).unwrap();
        assert_eq!(n.title, "PII Details Intercepted!");

        // Replacing a header view with a new one keeps the length.
        let replaced = vec![record(Category::HeaderView)];
        assert!(capture_notification(&replaced, &replaced).is_none());
    }

    #[test]
    fn generic_title_for_general_captures() {
        let n = Notification::for_record(&record(Category::Uncategorized));
        assert_eq!(n.icon, "icons/icon128.png");
        assert!(n.message.starts_with("Request captured at "));
    }

    #[test]
    fn store_changes_drive_notifications_and_icon() {
        use crate::store::{JsonStore, Store, StoreExt};

        let store = JsonStore::in_memory();
        let mut changes = store.subscribe();
        store.put(keys::HISTORY, &vec![record(Category::WorkOrdersList)]).unwrap();
        store
            .put(
                keys::CHECKLIST,
                &ChecklistState {
                    has_work_orders_list: true,
                    ..Default::default()
                },
            )
            .unwrap();
        // Same length: a replacement, not a new capture.
        store.put(keys::HISTORY, &vec![record(Category::WorkOrdersList)]).unwrap();
        store.set(keys::SERVER_URL, serde_json::json!("http://h")).unwrap();

        let pending = pending_changes(&mut changes);
        assert_eq!(pending.len(), 4);
        let notes: Vec<Notification> = pending.iter().filter_map(change_notification).collect();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].title, "Work Orders List Intercepted!");
        let icons: Vec<IconState> = pending.iter().filter_map(change_icon).collect();
        assert_eq!(icons, vec![IconState::Incomplete]);
        assert!(pending_changes(&mut changes).is_empty());
    }
}
