pub mod capture;
pub mod checklist;
mod classifier;
pub mod curl;
mod error;
pub mod history;
mod markers;
pub mod params;
mod rules;
pub mod settings;
pub mod status;
pub mod store;
pub mod sync;
mod types;

pub use capture::{Applied, CaptureMessage, CaptureSession, HistoryOwner};
pub use classifier::{Classification, Classifier, IgnoreReason};
pub use curl::CurlSynthesizer;
pub use error::{Error, Result};
pub use history::{History, MergeHint};
pub use rules::{HeaderViewRule, PiiDetailsRule, Rules, WorkOrdersListRule, DEFAULT_HISTORY_LIMIT};
pub use settings::Settings;
pub use store::{JsonStore, Store, StoreExt};
pub use sync::{CredentialService, Forwarder, HttpCredentialService, SyncReport, SyncStatus};
pub use types::*;
