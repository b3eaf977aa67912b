#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    IO(#[from] std::io::Error),
    #[error(transparent)]
    YAML(#[from] serde_yaml::Error),
    #[error(transparent)]
    JSON(#[from] serde_json::Error),
    #[error(transparent)]
    Regex(#[from] fancy_regex::Error),
    #[error(transparent)]
    AhoCorasick(#[from] aho_corasick::BuildError),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error("store key `{key}` changed concurrently (expected version {expected:?})")]
    Conflict { key: String, expected: Option<u64> },
    #[error("invalid server URL `{0}`")]
    InvalidServerUrl(String),
    #[error("no credential configured")]
    MissingCredential,
    #[error("no server URL configured")]
    MissingServerUrl,
    #[error("unknown request category `{0}`")]
    UnknownCategory(String),
    #[error("request category `{0}` has no credential type")]
    UnknownCredentialType(String),
    #[error("credential service: {0}")]
    Service(String),
    #[error("no captured requests to sync")]
    NoRecords,
    #[error("capture channel closed")]
    ChannelClosed,
}

pub type Result<T> = std::result::Result<T, Error>;
