//! Forwarding captured requests to the credential-extraction service.
//!
//! Each record takes two calls: `/api/parse-request` turns the synthesized
//! cURL command into a credential map, and `/api/update-credentials` saves
//! that map. Records are forwarded one at a time.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use url::Url;

use super::curl::CurlSynthesizer;
use super::error::{Error, Result};
use super::history::latest;
use super::settings::Settings;
use super::types::{CapturedRequest, Category, CredentialType};

/// Pause between records of one batch.
pub const BATCH_PAUSE: Duration = Duration::from_millis(500);

/// Credential map returned by the parse call, passed back verbatim to the
/// save call.
pub type Credentials = serde_json::Map<String, serde_json::Value>;

#[async_trait]
pub trait CredentialService: Send + Sync {
    async fn parse_request(
        &self,
        request_text: &str,
        credential_type: CredentialType,
    ) -> Result<Credentials>;

    async fn update_credentials(&self, credentials: &Credentials) -> Result<()>;
}

#[derive(Debug, Serialize)]
struct ParseRequestBody<'a> {
    request_text: &'a str,
    credential_type: CredentialType,
}

#[derive(Debug, Serialize)]
struct UpdateCredentialsBody<'a> {
    credentials: &'a Credentials,
}

#[derive(Debug, Default, Deserialize)]
struct ParseResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    credentials: Option<Credentials>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct UpdateResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// The credential service over HTTP.
pub struct HttpCredentialService {
    http: Client,
    base: String,
}

impl HttpCredentialService {
    pub fn new(server_url: &str) -> Result<Self> {
        Url::parse(server_url).map_err(|_| Error::InvalidServerUrl(server_url.to_string()))?;
        // No request timeout: a slow extraction only holds up its own record.
        let http = Client::builder().build()?;
        Ok(Self {
            http,
            base: server_url.trim_end_matches('/').to_string(),
        })
    }

    /// Client for the server URL saved in `settings`. There is no fallback
    /// address: forwarding without a configured server is an error.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        Self::new(settings.server_url()?)
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    /// POST a JSON body and decode the JSON reply, whatever the status code.
    async fn post<B: Serialize + ?Sized, R: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<(reqwest::StatusCode, R)> {
        let response = self
            .http
            .post(self.endpoint(path))
            .json(body)
            .send()
            .await?;
        let status = response.status();
        let reply = response.json::<R>().await?;
        Ok((status, reply))
    }
}

fn failure_reason(
    status: reqwest::StatusCode,
    error: Option<String>,
    message: Option<String>,
) -> String {
    error
        .or(message)
        .unwrap_or_else(|| format!("HTTP {status}"))
}

#[async_trait]
impl CredentialService for HttpCredentialService {
    async fn parse_request(
        &self,
        request_text: &str,
        credential_type: CredentialType,
    ) -> Result<Credentials> {
        let (status, reply): (_, ParseResponse) = self
            .post(
                "/api/parse-request",
                &ParseRequestBody {
                    request_text,
                    credential_type,
                },
            )
            .await?;
        if !status.is_success() || !reply.success {
            return Err(Error::Service(failure_reason(
                status,
                reply.error,
                reply.message,
            )));
        }
        reply
            .credentials
            .ok_or_else(|| Error::Service("parse response carried no credentials".to_string()))
    }

    async fn update_credentials(&self, credentials: &Credentials) -> Result<()> {
        let (status, reply): (_, UpdateResponse) = self
            .post(
                "/api/update-credentials",
                &UpdateCredentialsBody { credentials },
            )
            .await?;
        if !status.is_success() || !reply.success {
            return Err(Error::Service(failure_reason(
                status,
                reply.error,
                reply.message,
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncStatus {
    Syncing,
    Synced,
    Failed(String),
}

impl SyncStatus {
    pub fn is_synced(&self) -> bool {
        matches!(self, Self::Synced)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncOutcome {
    pub category: Category,
    pub status: SyncStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub outcomes: Vec<SyncOutcome>,
}

impl SyncReport {
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.status.is_synced()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }

    pub fn status_of(&self, category: Category) -> Option<&SyncStatus> {
        self.outcomes
            .iter()
            .find(|o| o.category == category)
            .map(|o| &o.status)
    }
}

/// Serial forwarding pipeline over a [`CredentialService`].
pub struct Forwarder<C> {
    service: C,
    synthesizer: CurlSynthesizer,
    pause: Duration,
}

impl<C: CredentialService> Forwarder<C> {
    pub fn new(service: C) -> Result<Self> {
        Ok(Self {
            service,
            synthesizer: CurlSynthesizer::new()?,
            pause: BATCH_PAUSE,
        })
    }

    pub fn with_pause(mut self, pause: Duration) -> Self {
        self.pause = pause;
        self
    }

    pub fn service(&self) -> &C {
        &self.service
    }

    /// Parse then save one record. The save call only happens after a
    /// successful parse.
    pub async fn forward(&self, record: &CapturedRequest, credential: &str) -> Result<Credentials> {
        let credential_type = record
            .category
            .credential_type()
            .ok_or_else(|| Error::UnknownCredentialType(record.category.to_string()))?;
        if credential.is_empty() {
            return Err(Error::MissingCredential);
        }

        let curl = self.synthesizer.synthesize(record, credential);
        let credentials = self.service.parse_request(&curl, credential_type).await?;
        self.service.update_credentials(&credentials).await?;
        info!(
            category = %record.category,
            credential_type = credential_type.as_str(),
            keys = credentials.len(),
            "credentials synced"
        );
        Ok(credentials)
    }

    /// Forward one record, folding any failure into its status.
    pub async fn forward_status(&self, record: &CapturedRequest, credential: &str) -> SyncStatus {
        match self.forward(record, credential).await {
            Ok(_) => SyncStatus::Synced,
            Err(e) => {
                warn!(category = %record.category, error = %e, "sync failed");
                SyncStatus::Failed(e.to_string())
            }
        }
    }

    pub async fn forward_all(
        &self,
        history: &[CapturedRequest],
        credential: &str,
    ) -> Result<SyncReport> {
        self.forward_all_with(history, credential, |_, _| {}).await
    }

    /// Forward the latest record of each named category, in checklist order.
    ///
    /// `on_status` sees every status transition. A failed record does not
    /// stop the batch.
    pub async fn forward_all_with<F>(
        &self,
        history: &[CapturedRequest],
        credential: &str,
        mut on_status: F,
    ) -> Result<SyncReport>
    where
        F: FnMut(Category, &SyncStatus) + Send,
    {
        if credential.is_empty() {
            return Err(Error::MissingCredential);
        }
        let targets: Vec<&CapturedRequest> = Category::NAMED
            .iter()
            .filter_map(|&category| latest(history, category))
            .collect();
        if targets.is_empty() {
            return Err(Error::NoRecords);
        }

        let mut report = SyncReport::default();
        for (i, record) in targets.iter().enumerate() {
            if i > 0 && !self.pause.is_zero() {
                tokio::time::sleep(self.pause).await;
            }
            on_status(record.category, &SyncStatus::Syncing);
            let status = self.forward_status(record, credential).await;
            on_status(record.category, &status);
            report.outcomes.push(SyncOutcome {
                category: record.category,
                status,
            });
        }

        info!(
            succeeded = report.succeeded(),
            failed = report.failed(),
            "sync batch finished"
        );
        Ok(report)
    }
}
