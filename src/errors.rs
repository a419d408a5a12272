use thiserror::Error;

#[derive(Error, Debug)]
pub enum WhoisError {
    #[error("Unsupported TLD: {0}")]
    UnsupportedTld(String),

    #[error("Fetch failed for {domain}: {source}")]
    Fetch {
        domain: String,
        #[source]
        source: TransportError,
    },

    #[error("Failed to load TLD rules: {0}")]
    Load(#[from] LoadError),

    #[error("Configuration error: {0}")]
    ConfigError(#[from] config::ConfigError),
}

/// Errors raised while building a [`crate::RuleRegistry`]. Any of these aborts the whole load.
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("Rules directory not found: {path}")]
    DirectoryNotFound { path: String },

    #[error("IO error reading rules: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse rule file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: config::ConfigError,
    },

    #[error("Invalid {field} pattern for .{tld}: {source}")]
    InvalidPattern {
        tld: String,
        field: &'static str,
        #[source]
        source: regex::Error,
    },

    #[error("Expiration pattern for .{tld} has no capturing group")]
    MissingCaptureGroup { tld: String },

    #[error("Rule file name is not valid UTF-8: {path}")]
    InvalidFileName { path: String },

    #[error("Duplicate rule for .{tld}: {path}")]
    DuplicateTld { tld: String, path: String },
}

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("No whois server known for .{0}")]
    NoServer(String),

    #[error("Network timeout")]
    Timeout,

    #[error("IO error: {0}")]
    IoError(#[from] tokio::io::Error),

    #[error("Response too large")]
    ResponseTooLarge,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<tokio::time::error::Elapsed> for TransportError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        TransportError::Timeout
    }
}

/// The expiration pattern matched but its capture did not parse. Never fatal.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("could not parse expiration {captured:?} with format {format:?}: {source}")]
pub struct ExpirationParseFailure {
    pub captured: String,
    pub format: String,
    #[source]
    pub source: chrono::ParseError,
}
