use url::Url;

use super::error::{Error, Result};
use super::store::{Store, StoreExt};

/// Store keys, named as the browser extension names them.
pub mod keys {
    pub const HISTORY: &str = "auraRequests";
    pub const CHECKLIST: &str = "checklistState";
    pub const CREDENTIAL: &str = "auraCookie";
    pub const SERVER_URL: &str = "serverUrl";
    pub const AUTO_FORWARD: &str = "autoUpdateEnabled";
}

pub const DEFAULT_SERVER_URL: &str = "http://localhost:8080";

/// Operator settings kept in the store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Settings {
    pub credential: Option<String>,
    pub server_url: Option<String>,
    pub auto_forward: bool,
}

impl Settings {
    pub fn load<S: Store + ?Sized>(store: &S) -> Result<Self> {
        let credential = store
            .get_as::<String>(keys::CREDENTIAL)?
            .map(|(c, _)| c)
            .filter(|c| !c.is_empty());
        let server_url = store
            .get_as::<String>(keys::SERVER_URL)?
            .map(|(u, _)| u)
            .filter(|u| !u.is_empty());
        let auto_forward = store
            .get_as::<bool>(keys::AUTO_FORWARD)?
            .map_or(false, |(flag, _)| flag);
        Ok(Self {
            credential,
            server_url,
            auto_forward,
        })
    }

    pub fn credential(&self) -> Result<&str> {
        self.credential.as_deref().ok_or(Error::MissingCredential)
    }

    pub fn server_url(&self) -> Result<&str> {
        self.server_url.as_deref().ok_or(Error::MissingServerUrl)
    }

    /// Server base URL, or the local default when none is saved.
    pub fn server_url_or_default(&self) -> &str {
        self.server_url.as_deref().unwrap_or(DEFAULT_SERVER_URL)
    }

    pub fn viewer_url(&self) -> String {
        viewer_url(self.server_url_or_default())
    }
}

/// Save the credential after trimming. Blank credentials are rejected.
pub fn save_credential<S: Store + ?Sized>(store: &S, raw: &str) -> Result<String> {
    let credential = raw.trim();
    if credential.is_empty() {
        return Err(Error::MissingCredential);
    }
    store.put(keys::CREDENTIAL, &credential)?;
    Ok(credential.to_string())
}

/// Save the server base URL and auto-forward flag together.
pub fn save_server_config<S: Store + ?Sized>(
    store: &S,
    server_url: &str,
    auto_forward: bool,
) -> Result<()> {
    let server_url = validate_server_url(server_url)?;
    store.put(keys::SERVER_URL, &server_url)?;
    store.put(keys::AUTO_FORWARD, &auto_forward)?;
    Ok(())
}

pub fn set_auto_forward<S: Store + ?Sized>(store: &S, enabled: bool) -> Result<()> {
    store.put(keys::AUTO_FORWARD, &enabled)?;
    Ok(())
}

pub fn validate_server_url(raw: &str) -> Result<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(Error::MissingServerUrl);
    }
    Url::parse(trimmed).map_err(|_| Error::InvalidServerUrl(trimmed.to_string()))?;
    Ok(trimmed.to_string())
}

/// `{base}/viewer`, without doubling a trailing slash.
pub fn viewer_url(base: &str) -> String {
    if base.ends_with('/') {
        format!("{base}viewer")
    } else {
        format!("{base}/viewer")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::JsonStore;

    #[test]
    fn empty_store_has_defaults() {
        let settings = Settings::load(&JsonStore::in_memory()).unwrap();
        assert_eq!(settings, Settings::default());
        assert!(matches!(settings.credential(), Err(Error::MissingCredential)));
        assert!(matches!(settings.server_url(), Err(Error::MissingServerUrl)));
        assert_eq!(settings.viewer_url(), "http://localhost:8080/viewer");
    }

    #[test]
    fn credential_is_trimmed_and_required() {
        let store = JsonStore::in_memory();
        assert!(matches!(save_credential(&store, "   "), Err(Error::MissingCredential)));
        save_credential(&store, "  sid=abc \n").unwrap();
        assert_eq!(Settings::load(&store).unwrap().credential().unwrap(), "sid=abc");
    }

    #[test]
    fn server_url_must_parse() {
        let store = JsonStore::in_memory();
        assert!(matches!(
            save_server_config(&store, "not a url", true),
            Err(Error::InvalidServerUrl(_))
        ));
        save_server_config(&store, "http://10.0.0.2:8080/", true).unwrap();
        let settings = Settings::load(&store).unwrap();
        assert_eq!(settings.server_url().unwrap(), "http://10.0.0.2:8080/");
        assert!(settings.auto_forward);
        assert_eq!(settings.viewer_url(), "http://10.0.0.2:8080/viewer");
    }

    #[test]
    fn viewer_url_joins_once() {
        assert_eq!(viewer_url("http://h:1"), "http://h:1/viewer");
        assert_eq!(viewer_url("http://h:1/"), "http://h:1/viewer");
    }
}
