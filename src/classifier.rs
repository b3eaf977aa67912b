use std::path::Path;

use chrono::{DateTime, Utc};
use rayon::prelude::*;
use tracing::{debug, info};

use super::error::Result;
use super::markers::MarkerSet;
use super::params::{decode_component, AuraParams};
use super::rules::Rules;
use super::types::*;

/// JSON pointer to the list view a `message` payload refers to.
const LIST_VIEW_POINTER: &str = "/actions/0/params/listReference/listViewIdOrName";

/// Outcome of classifying one observed call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    /// Not an Aura call, or a body that is not text.
    OutOfScope,
    /// An Aura call that matches no signature and is silently dropped.
    Ignored(IgnoreReason),
    Captured(CapturedRequest),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IgnoreReason {
    /// The body has no `message` parameter.
    MissingMessage,
    /// The `message` payload names a different list view, or none.
    ListViewMismatch(Option<String>),
}

impl Classification {
    pub fn captured(&self) -> Option<&CapturedRequest> {
        match self {
            Self::Captured(record) => Some(record),
            Self::OutOfScope | Self::Ignored(_) => None,
        }
    }

    pub fn category(&self) -> Option<Category> {
        self.captured().map(|r| r.category)
    }
}

/// Decides whether an observed call is in scope and which capture category
/// it belongs to.
pub struct Classifier {
    rules: Rules,
    scope: MarkerSet,
    params: AuraParams,
}

impl Classifier {
    pub fn new(rules: Rules) -> Result<Self> {
        let scope = MarkerSet::build(&rules.scope)?;
        let params = AuraParams::compile()?;
        Ok(Self {
            rules,
            scope,
            params,
        })
    }

    /// Build a classifier from a YAML rules file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        Self::new(Rules::from_file(path)?)
    }

    pub fn rules(&self) -> &Rules {
        &self.rules
    }

    /// Classify one observed call.
    ///
    /// Pure given its inputs: the page snapshot and `captured_at` are only
    /// copied into the resulting record. The call's own timestamp, when the
    /// hook provided one, takes precedence over `captured_at`.
    pub fn classify(
        &self,
        page: &PageContext,
        call: &ObservedCall,
        captured_at: DateTime<Utc>,
    ) -> Classification {
        let Some(body) = call.body.as_text() else {
            debug!(url = %call.url, "body is not text, ignoring");
            return Classification::OutOfScope;
        };

        let url = page.absolute_url(&call.url);
        if !self.scope.matches(&url) {
            debug!(%url, "not an Aura request, ignoring");
            return Classification::OutOfScope;
        }

        let (category, list_view_id) = match self.categorize(&url, body) {
            Ok(matched) => matched,
            Err(reason) if self.rules.general_capture => {
                debug!(%url, ?reason, "no signature matched, keeping as general capture");
                (Category::Uncategorized, None)
            }
            Err(reason) => {
                debug!(%url, ?reason, "no signature matched, ignoring");
                return Classification::Ignored(reason);
            }
        };

        let method = call
            .method
            .as_deref()
            .filter(|m| !m.is_empty())
            .unwrap_or("POST");

        info!(
            %category,
            %url,
            method,
            body_len = body.len(),
            "captured Aura request"
        );

        Classification::Captured(CapturedRequest {
            category,
            url,
            method: method.to_string(),
            body: body.to_string(),
            referer: page.location.to_string(),
            user_agent: page.user_agent.clone(),
            accept_language: page.accept_language.clone(),
            timestamp: call.observed_at.unwrap_or(captured_at),
            list_view_id,
        })
    }

    /// Classify many calls in parallel. The output order matches `calls`.
    pub fn classify_batch(
        &self,
        page: &PageContext,
        calls: &[ObservedCall],
        captured_at: DateTime<Utc>,
    ) -> Vec<Classification> {
        calls
            .par_iter()
            .map(|call| self.classify(page, call, captured_at))
            .collect()
    }

    /// Signature checks in priority order; the first match wins.
    fn categorize(
        &self,
        url: &str,
        body: &str,
    ) -> std::result::Result<(Category, Option<String>), IgnoreReason> {
        let pii = &self.rules.pii_details;
        if url.contains(&pii.url_marker) && body.contains(&pii.body_marker) {
            return Ok((Category::PiiDetails, None));
        }

        if url.contains(&self.rules.work_orders_list.url_marker) {
            return Ok((Category::WorkOrdersList, None));
        }

        let message = self
            .params
            .message(body)
            .ok_or(IgnoreReason::MissingMessage)?;
        match list_view_id(message) {
            Some(id) if id == self.rules.header_view.list_view => {
                Ok((Category::HeaderView, Some(id)))
            }
            other => Err(IgnoreReason::ListViewMismatch(other)),
        }
    }
}

/// Read the list view identifier out of a raw `message=...` pair. Any decode
/// or parse failure counts as absent.
fn list_view_id(message_pair: &str) -> Option<String> {
    let (_, encoded) = message_pair.split_once('=')?;
    let json = decode_component(encoded)?;
    let payload: serde_json::Value = serde_json::from_str(&json).ok()?;
    payload
        .pointer(LIST_VIEW_POINTER)?
        .as_str()
        .filter(|id| !id.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use url::Url;

    const AURA: &str = "https://portal.example.com/s/sfsites/aura?r=7";

    fn page() -> PageContext {
        PageContext::new(
            Url::parse("https://portal.example.com/s/work-orders").unwrap(),
            "Mozilla/5.0 Test",
            "en-US,en",
        )
    }

    fn at() -> DateTime<Utc> {
        DateTime::from_timestamp_millis(1_700_000_000_000).unwrap()
    }

    fn classifier() -> Classifier {
        Classifier::new(Rules::default()).unwrap()
    }

    fn list_view_body(list_view: &str) -> String {
        let message = format!(
            r#"{{"actions":[{{"params":{{"listReference":{{"listViewIdOrName":"{list_view}"}}}}}}]}}"#
        );
        format!(
            "message={}&aura.token=abc",
            urlencoding::encode(&message)
        )
    }

    fn classify(url: &str, body: &str) -> Classification {
        classifier().classify(&page(), &ObservedCall::new(url, "POST", body), at())
    }

    #[test]
    fn outside_aura_is_out_of_scope() {
        let c = classify(
            "https://portal.example.com/api/data",
            "message=%7B%22x%22%3A1%7D&aura.token=abc",
        );
        assert_eq!(c, Classification::OutOfScope);
    }

    #[test]
    fn non_text_body_is_out_of_scope() {
        let call = ObservedCall {
            url: AURA.to_string(),
            method: Some("POST".to_string()),
            body: CallBody::Other(serde_json::json!({"form": true})),
            observed_at: None,
        };
        assert_eq!(
            classifier().classify(&page(), &call, at()),
            Classification::OutOfScope
        );
    }

    #[test]
    fn relative_url_is_resolved_against_origin() {
        let c = classify("/s/sfsites/aura?r=1", &list_view_body("Technician_Work_Order_List_View"));
        let record = c.captured().unwrap();
        assert_eq!(record.url, "https://portal.example.com/s/sfsites/aura?r=1");
    }

    #[test]
    fn pii_details_needs_url_and_body_markers() {
        let url = format!("{AURA}&aura.FlowRuntimeConnect.startFlow=1");
        let c = classify(&url, "message=x&flow=PII_Display_Work_Order_Details_Screen");
        assert_eq!(c.category(), Some(Category::PiiDetails));

        // URL marker alone falls through to the message check.
        let c = classify(&url, "message=x");
        assert!(matches!(c, Classification::Ignored(_)));
    }

    #[test]
    fn pii_details_wins_over_work_orders_list() {
        let url = format!(
            "{AURA}&aura.FlowRuntimeConnect.startFlow=1&ui-force-components-controllers-recordGlobalValueProvider.RecordGvp.getRecord=1"
        );
        let c = classify(&url, "PII_Display_Work_Order_Details_Screen");
        assert_eq!(c.category(), Some(Category::PiiDetails));
    }

    #[test]
    fn work_orders_list_by_url_marker() {
        let url = format!(
            "{AURA}&ui-force-components-controllers-recordGlobalValueProvider.RecordGvp.getRecord=1"
        );
        let c = classify(&url, "anything");
        assert_eq!(c.category(), Some(Category::WorkOrdersList));
    }

    #[test]
    fn header_view_records_list_view() {
        let c = classify(AURA, &list_view_body("Technician_Work_Order_List_View"));
        let record = c.captured().unwrap();
        assert_eq!(record.category, Category::HeaderView);
        assert_eq!(
            record.list_view_id.as_deref(),
            Some("Technician_Work_Order_List_View")
        );
        assert_eq!(record.method, "POST");
        assert_eq!(record.referer, "https://portal.example.com/s/work-orders");
        assert_eq!(record.user_agent, "Mozilla/5.0 Test");
        assert_eq!(record.accept_language, "en-US,en");
        assert_eq!(record.timestamp, at());
    }

    #[test]
    fn missing_message_is_ignored() {
        assert_eq!(
            classify(AURA, "aura.token=abc"),
            Classification::Ignored(IgnoreReason::MissingMessage)
        );
    }

    #[test]
    fn other_list_view_is_ignored() {
        assert_eq!(
            classify(AURA, &list_view_body("All_Open")),
            Classification::Ignored(IgnoreReason::ListViewMismatch(Some("All_Open".into())))
        );
    }

    #[test]
    fn unparseable_message_is_ignored() {
        assert_eq!(
            classify(AURA, "message=%7Bnot-json"),
            Classification::Ignored(IgnoreReason::ListViewMismatch(None))
        );
    }

    #[test]
    fn general_capture_keeps_unmatched_calls() {
        let rules = Rules {
            general_capture: true,
            ..Rules::default()
        };
        let c = Classifier::new(rules)
            .unwrap()
            .classify(&page(), &ObservedCall::new(AURA, "POST", "aura.token=1"), at());
        assert_eq!(c.category(), Some(Category::Uncategorized));
    }

    #[test]
    fn absent_method_defaults_to_post() {
        let call = ObservedCall {
            url: AURA.to_string(),
            method: None,
            body: CallBody::Text(list_view_body("Technician_Work_Order_List_View")),
            observed_at: None,
        };
        let c = classifier().classify(&page(), &call, at());
        assert_eq!(c.captured().unwrap().method, "POST");
    }

    #[test]
    fn batch_preserves_order() {
        let calls = vec![
            ObservedCall::new("https://elsewhere.example/x", "POST", "a=1"),
            ObservedCall::new(AURA, "POST", list_view_body("Technician_Work_Order_List_View")),
            ObservedCall::new(AURA, "POST", "a=1"),
        ];
        let out = classifier().classify_batch(&page(), &calls, at());
        assert_eq!(out.len(), 3);
        assert_eq!(out[0], Classification::OutOfScope);
        assert_eq!(out[1].category(), Some(Category::HeaderView));
        assert!(matches!(out[2], Classification::Ignored(_)));
    }
}
