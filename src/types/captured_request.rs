use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Category;

fn default_method() -> String {
    "POST".to_string()
}

/// One intercepted Aura call together with the client environment it was
/// sent from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapturedRequest {
    #[serde(rename = "name", default, skip_serializing_if = "Category::is_uncategorized")]
    pub category: Category,
    pub url: String,
    #[serde(default = "default_method")]
    pub method: String,
    pub body: String,
    #[serde(default)]
    pub referer: String,
    #[serde(default)]
    pub user_agent: String,
    #[serde(default)]
    pub accept_language: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
    /// Only set for [`Category::HeaderView`].
    #[serde(rename = "listView", default, skip_serializing_if = "Option::is_none")]
    pub list_view_id: Option<String>,
}

impl CapturedRequest {
    pub fn is(&self, category: Category) -> bool {
        self.category == category
    }
}
