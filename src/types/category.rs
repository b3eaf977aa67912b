use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Capture category assigned by the classifier.
///
/// The serialized names are the ones the browser extension stores under the
/// `name` field of a captured request, so histories written by either side
/// stay readable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Category {
    #[serde(rename = "HEADER")]
    HeaderView,
    #[serde(rename = "Work Orders List")]
    WorkOrdersList,
    #[serde(rename = "PII Details")]
    PiiDetails,
    #[default]
    #[serde(rename = "Uncategorized")]
    Uncategorized,
}

impl Category {
    /// The three categories tracked by the checklist, in sync order.
    pub const NAMED: [Category; 3] = [
        Category::HeaderView,
        Category::WorkOrdersList,
        Category::PiiDetails,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::HeaderView => "HEADER",
            Self::WorkOrdersList => "Work Orders List",
            Self::PiiDetails => "PII Details",
            Self::Uncategorized => "Uncategorized",
        }
    }

    pub fn is_uncategorized(&self) -> bool {
        matches!(self, Self::Uncategorized)
    }

    /// Credential slot the external service fills from a request of this
    /// category. General captures have none.
    pub fn credential_type(&self) -> Option<CredentialType> {
        match self {
            Self::HeaderView => Some(CredentialType::Header),
            Self::WorkOrdersList => Some(CredentialType::First),
            Self::PiiDetails => Some(CredentialType::Pii),
            Self::Uncategorized => None,
        }
    }
}

impl std::str::FromStr for Category {
    type Err = Error;

    /// Accepts the stored names (`HEADER`, `Work Orders List`, ...).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "HEADER" => Ok(Self::HeaderView),
            "Work Orders List" => Ok(Self::WorkOrdersList),
            "PII Details" => Ok(Self::PiiDetails),
            "Uncategorized" => Ok(Self::Uncategorized),
            _ => Err(Error::UnknownCategory(s.to_string())),
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CredentialType {
    Header,
    First,
    Pii,
}

impl CredentialType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Header => "HEADER",
            Self::First => "FIRST",
            Self::Pii => "PII",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stored_names_parse_back() {
        for category in Category::NAMED.into_iter().chain([Category::Uncategorized]) {
            assert_eq!(category.as_str().parse::<Category>().unwrap(), category);
        }
        assert!(matches!(
            "header".parse::<Category>(),
            Err(Error::UnknownCategory(_))
        ));
    }
}
