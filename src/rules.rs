use std::path::Path;

use serde::Deserialize;

use crate::error::Result;

// ---------------------------------------------------------------------------
// Signature rules
//
// Format (every key optional, defaults shown by `Rules::default()`):
//
//   scope: ["/s/sfsites/aura", "/aura?"]
//   pii_details:
//     url_marker: "aura.FlowRuntimeConnect.startFlow=1"
//     body_marker: "PII_Display_Work_Order_Details_Screen"
//   work_orders_list:
//     url_marker: "ui-force-components-controllers-recordGlobalValueProvider.RecordGvp.getRecord=1"
//   header_view:
//     list_view: "Technician_Work_Order_List_View"
//   history_limit: 20
//   general_capture: false
// ---------------------------------------------------------------------------

pub const DEFAULT_HISTORY_LIMIT: usize = 20;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Rules {
    /// URL substrings identifying the Aura endpoint; any one puts a call in scope.
    pub scope: Vec<String>,
    pub pii_details: PiiDetailsRule,
    pub work_orders_list: WorkOrdersListRule,
    pub header_view: HeaderViewRule,
    /// Maximum history length after a general capture.
    pub history_limit: usize,
    /// Record in-scope calls that match no named signature as `Uncategorized`
    /// instead of dropping them.
    pub general_capture: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PiiDetailsRule {
    pub url_marker: String,
    pub body_marker: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct WorkOrdersListRule {
    pub url_marker: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct HeaderViewRule {
    pub list_view: String,
}

impl Default for Rules {
    fn default() -> Self {
        Self {
            scope: vec!["/s/sfsites/aura".to_string(), "/aura?".to_string()],
            pii_details: PiiDetailsRule::default(),
            work_orders_list: WorkOrdersListRule::default(),
            header_view: HeaderViewRule::default(),
            history_limit: DEFAULT_HISTORY_LIMIT,
            general_capture: false,
        }
    }
}

impl Default for PiiDetailsRule {
    fn default() -> Self {
        Self {
            url_marker: "aura.FlowRuntimeConnect.startFlow=1".to_string(),
            body_marker: "PII_Display_Work_Order_Details_Screen".to_string(),
        }
    }
}

impl Default for WorkOrdersListRule {
    fn default() -> Self {
        Self {
            url_marker:
                "ui-force-components-controllers-recordGlobalValueProvider.RecordGvp.getRecord=1"
                    .to_string(),
        }
    }
}

impl Default for HeaderViewRule {
    fn default() -> Self {
        Self {
            list_view: "Technician_Work_Order_List_View".to_string(),
        }
    }
}

impl Rules {
    pub fn from_yaml_str(s: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(s)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml_str(&content)
    }
}
