//! Per-TLD extraction rules and the registry that holds them.
//!
//! Rules live in a directory of YAML files, one per TLD, named after the suffix
//! they apply to (`com.yml`, `co.uk.yml`). Each file carries three fields:
//!
//! ```yaml
//! availability: '^No match for'
//! expiration: 'Registry Expiry Date:\s*(\S+)'
//! expiration_format: RFC3339
//! ```

use crate::errors::LoadError;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};
use tracing::{debug, info};

const RULE_EXTENSIONS: [&str; 2] = ["yml", "yaml"];

/// Raw rule as written in a rule file, before its patterns are compiled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleDefinition {
    pub availability: String,
    pub expiration: String,
    pub expiration_format: String,
}

/// Compiled extraction rule for one TLD.
///
/// The availability pattern is checked before the expiration pattern, and only the
/// first capturing group of the expiration pattern is used as the timestamp.
#[derive(Debug, Clone)]
pub struct Rule {
    tld: String,
    availability: Regex,
    expiration: Regex,
    expiration_format: String,
}

impl Rule {
    pub fn compile(tld: &str, definition: &RuleDefinition) -> Result<Self, LoadError> {
        let tld = normalize_tld(tld);

        let availability =
            Regex::new(&definition.availability).map_err(|source| LoadError::InvalidPattern {
                tld: tld.clone(),
                field: "availability",
                source,
            })?;

        let expiration =
            Regex::new(&definition.expiration).map_err(|source| LoadError::InvalidPattern {
                tld: tld.clone(),
                field: "expiration",
                source,
            })?;

        // captures_len counts the implicit whole-match group
        if expiration.captures_len() < 2 {
            return Err(LoadError::MissingCaptureGroup { tld });
        }

        Ok(Self {
            tld,
            availability,
            expiration,
            expiration_format: definition.expiration_format.clone(),
        })
    }

    pub fn tld(&self) -> &str {
        &self.tld
    }

    pub fn availability(&self) -> &Regex {
        &self.availability
    }

    pub fn expiration(&self) -> &Regex {
        &self.expiration
    }

    pub fn expiration_format(&self) -> &str {
        &self.expiration_format
    }
}

/// Immutable mapping from lowercase TLD suffix to its [`Rule`].
///
/// Built once and shared read-only (usually behind an `Arc`) by every lookup.
#[derive(Debug, Clone, Default)]
pub struct RuleRegistry {
    rules: HashMap<String, Rule>,
}

impl RuleRegistry {
    /// Load every `*.yml` / `*.yaml` rule file in `dir`.
    ///
    /// The TLD key is the file stem, lowercased. One unreadable or invalid file fails
    /// the whole load.
    pub fn load(dir: impl AsRef<Path>) -> Result<Self, LoadError> {
        let dir = dir.as_ref();

        if !dir.is_dir() {
            return Err(LoadError::DirectoryNotFound {
                path: dir.display().to_string(),
            });
        }

        let mut paths = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if path.is_file() && is_rule_file(&path) {
                paths.push(path);
            } else {
                debug!("Skipping non-rule entry: {}", path.display());
            }
        }
        paths.sort();

        let mut rules = HashMap::with_capacity(paths.len());
        for path in paths {
            let tld = path
                .file_stem()
                .and_then(|s| s.to_str())
                .map(normalize_tld)
                .ok_or_else(|| LoadError::InvalidFileName {
                    path: path.display().to_string(),
                })?;

            let definition = read_definition(&path)?;
            let rule = Rule::compile(&tld, &definition)?;

            if rules.insert(tld.clone(), rule).is_some() {
                return Err(LoadError::DuplicateTld {
                    tld,
                    path: path.display().to_string(),
                });
            }
            debug!("Loaded rule for .{} from {}", tld, path.display());
        }

        info!("Loaded {} TLD rules from {}", rules.len(), dir.display());
        Ok(Self { rules })
    }

    /// Build a registry from in-memory definitions, applying the same validation as [`RuleRegistry::load`].
    pub fn from_definitions<I, S>(definitions: I) -> Result<Self, LoadError>
    where
        I: IntoIterator<Item = (S, RuleDefinition)>,
        S: AsRef<str>,
    {
        let mut rules = HashMap::new();

        for (tld, definition) in definitions {
            let rule = Rule::compile(tld.as_ref(), &definition)?;
            let key = rule.tld().to_string();
            if rules.contains_key(&key) {
                return Err(LoadError::DuplicateTld {
                    tld: key,
                    path: "<inline>".to_string(),
                });
            }
            rules.insert(key, rule);
        }

        Ok(Self { rules })
    }

    /// Exact, case-insensitive lookup. `co.uk` and `uk` are unrelated keys.
    pub fn get(&self, suffix: &str) -> Option<&Rule> {
        self.rules.get(&normalize_tld(suffix))
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Supported suffixes, sorted.
    pub fn tlds(&self) -> Vec<&str> {
        let mut tlds: Vec<&str> = self.rules.keys().map(String::as_str).collect();
        tlds.sort_unstable();
        tlds
    }
}

fn normalize_tld(tld: &str) -> String {
    tld.trim().trim_start_matches('.').to_lowercase()
}

fn is_rule_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| RULE_EXTENSIONS.iter().any(|e| ext.eq_ignore_ascii_case(e)))
        .unwrap_or(false)
}

fn read_definition(path: &Path) -> Result<RuleDefinition, LoadError> {
    let parse_error = |source: config::ConfigError| LoadError::Parse {
        path: path.display().to_string(),
        source,
    };

    config::Config::builder()
        .add_source(config::File::from(PathBuf::from(path)).format(config::FileFormat::Yaml))
        .build()
        .map_err(parse_error)?
        .try_deserialize()
        .map_err(parse_error)
}
