use serde::{Deserialize, Serialize};

/// Completion state of the three required captures.
///
/// Always a projection of the history; see [`crate::checklist::project`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ChecklistState {
    #[serde(rename = "header")]
    pub has_header_view: bool,
    #[serde(rename = "workOrdersList")]
    pub has_work_orders_list: bool,
    #[serde(rename = "piiDetails")]
    pub has_pii_details: bool,
}

impl ChecklistState {
    pub fn is_complete(&self) -> bool {
        self.has_header_view && self.has_work_orders_list && self.has_pii_details
    }
}
