use super::types::{CapturedRequest, Category, ChecklistState};

/// Derive the checklist from the categories present in `history`.
pub fn project(history: &[CapturedRequest]) -> ChecklistState {
    let has = |category: Category| history.iter().any(|r| r.is(category));
    ChecklistState {
        has_header_view: has(Category::HeaderView),
        has_work_orders_list: has(Category::WorkOrdersList),
        has_pii_details: has(Category::PiiDetails),
    }
}
