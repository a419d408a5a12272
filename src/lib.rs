//! # multiwhois
//!
//! Domain availability and expiration lookups driven by per-TLD extraction rules.
//!
//! ## Features
//!
//! - One YAML rule file per TLD: an availability pattern, an expiration pattern and
//!   the timestamp format of its capture
//! - Rules are loaded once into an immutable [`RuleRegistry`] shared by every lookup
//! - Unsupported TLDs are rejected before any network access
//! - Pluggable [`WhoisTransport`], with a port-43 [`TcpTransport`] out of the box
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use multiwhois::WhoisClient;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = WhoisClient::new()?;
//!     let info = client.query_domain_info("google.com").await?;
//!
//!     println!("Available: {}", info.is_available);
//!     println!("Expires: {:?}", info.expiration);
//!
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod errors;
pub mod parser;
pub mod rules;
pub mod tld_mappings;
pub mod whois;

// Re-export main types for easy access
pub use config::Config;
pub use errors::{ExpirationParseFailure, LoadError, TransportError, WhoisError};
pub use parser::{extract, Extraction};
pub use rules::{Rule, RuleDefinition, RuleRegistry};
pub use whois::{TcpTransport, WhoisTransport};

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use tracing::debug;

/// Outcome of a single lookup.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct DomainInfo {
    pub domain: String,
    pub expiration: Option<DateTime<Utc>>, // None when available or unknown
    pub is_available: bool,
    pub raw_response: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

/// Rule-driven whois client.
///
/// Cheap to clone; clones share the registry and the transport.
#[derive(Clone)]
pub struct WhoisClient {
    registry: Arc<RuleRegistry>,
    transport: Arc<dyn WhoisTransport>,
    concurrency: usize,
}

impl WhoisClient {
    /// Create a client from the environment: config via [`Config::load`], rules from
    /// `rules_dir`, and a [`TcpTransport`].
    pub fn new() -> Result<Self, WhoisError> {
        let config = Arc::new(Config::load()?);
        Self::new_with_config(config)
    }

    /// Create a client with custom configuration.
    pub fn new_with_config(config: Arc<Config>) -> Result<Self, WhoisError> {
        let registry = Arc::new(RuleRegistry::load(&config.rules_dir)?);
        let concurrency = config.concurrent_whois_queries;
        let transport = Arc::new(TcpTransport::new(config));

        Ok(Self::with_transport(registry, transport).with_concurrency(concurrency))
    }

    /// Create a client around an existing registry and transport.
    pub fn with_transport(registry: Arc<RuleRegistry>, transport: Arc<dyn WhoisTransport>) -> Self {
        Self {
            registry,
            transport,
            concurrency: 1,
        }
    }

    /// Upper bound on in-flight lookups for [`WhoisClient::query_many`].
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn registry(&self) -> &RuleRegistry {
        &self.registry
    }

    /// Look up `domain` and report whether it is free and, if not, when it expires.
    ///
    /// Fails with [`WhoisError::UnsupportedTld`] before touching the network when no
    /// rule exists for the domain's suffix, and with [`WhoisError::Fetch`] when the
    /// transport fails. An unparseable expiration is not an error; it is reported in
    /// [`DomainInfo::warnings`].
    pub async fn query_domain_info(&self, domain: &str) -> Result<DomainInfo, WhoisError> {
        let suffix = domain_suffix(domain);

        let rule = self
            .registry
            .get(&suffix)
            .ok_or_else(|| WhoisError::UnsupportedTld(suffix.clone()))?;

        let raw_response =
            self.transport
                .fetch(domain)
                .await
                .map_err(|source| WhoisError::Fetch {
                    domain: domain.to_string(),
                    source,
                })?;

        let extraction = extract(&raw_response, rule);
        debug!(
            "{}: available={} expiration={:?}",
            domain, extraction.is_available, extraction.expiration
        );

        Ok(DomainInfo {
            domain: domain.to_string(),
            expiration: extraction.expiration,
            is_available: extraction.is_available,
            raw_response,
            warnings: extraction
                .expiration_error
                .map(|e| vec![e.to_string()])
                .unwrap_or_default(),
        })
    }

    /// Run independent lookups concurrently. Results come back in input order.
    pub async fn query_many<I, S>(&self, domains: I) -> Vec<Result<DomainInfo, WhoisError>>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let domains: Vec<String> = domains.into_iter().map(|d| d.as_ref().to_string()).collect();

        stream::iter(domains.iter())
            .map(|domain| self.query_domain_info(domain))
            .buffered(self.concurrency)
            .collect()
            .await
    }
}

/// Text after the last `.`, lowercased. No validation: a name without a dot yields `""`.
pub fn domain_suffix(domain: &str) -> String {
    domain
        .rsplit_once('.')
        .map(|(_, suffix)| suffix.to_lowercase())
        .unwrap_or_default()
}
