use serde::{Deserialize, Serialize};
use std::path::PathBuf;

const DEFAULT_RULES_DIR: &str = "tlds";
const DEFAULT_WHOIS_PORT: u16 = 43;
const DEFAULT_ROOT_WHOIS_SERVER: &str = "whois.iana.org";

#[derive(Debug, Clone)]
pub struct Config {
    pub rules_dir: PathBuf,
    pub whois_port: u16,
    pub root_whois_server: String, // Asked for the whois server of unknown TLDs
    pub whois_timeout_seconds: u64,
    pub max_response_size: usize,
    pub discovery_timeout_seconds: u64,
    pub concurrent_whois_queries: usize,
    pub max_referrals: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ConfigData {
    pub rules_dir: String,
    pub whois_port: u16,
    pub root_whois_server: String,
    pub whois_timeout_seconds: u64,
    pub max_response_size: usize,
    pub discovery_timeout_seconds: u64,
    pub concurrent_whois_queries: usize,
    pub max_referrals: usize,
}

impl Config {
    /// Build the configuration from defaults, a `.env` file if present, and environment overrides.
    pub fn load() -> Result<Self, config::ConfigError> {
        dotenvy::dotenv().ok();

        let defaults = Defaults::detect(Self::is_production_environment());

        let mut settings = config::Config::builder()
            .set_default("rules_dir", DEFAULT_RULES_DIR)?
            .set_default("whois_port", DEFAULT_WHOIS_PORT as i64)?
            .set_default("root_whois_server", DEFAULT_ROOT_WHOIS_SERVER)?
            .set_default("whois_timeout_seconds", defaults.whois_timeout)?
            .set_default("max_response_size", defaults.max_response_size as i64)?
            .set_default("discovery_timeout_seconds", defaults.discovery_timeout)?
            .set_default("concurrent_whois_queries", defaults.concurrent_whois_queries as i64)?
            .set_default("max_referrals", defaults.max_referrals as i64)?;

        settings = Self::apply_env_overrides(settings)?;

        let data: ConfigData = settings.build()?.try_deserialize()?;

        Ok(Config {
            rules_dir: PathBuf::from(data.rules_dir),
            whois_port: data.whois_port,
            root_whois_server: data.root_whois_server,
            whois_timeout_seconds: data.whois_timeout_seconds,
            max_response_size: data.max_response_size,
            discovery_timeout_seconds: data.discovery_timeout_seconds,
            concurrent_whois_queries: data.concurrent_whois_queries.max(1),
            max_referrals: data.max_referrals,
        })
    }

    fn is_production_environment() -> bool {
        std::env::var("ENVIRONMENT")
            .or_else(|_| std::env::var("ENV"))
            .map(|env| env.to_lowercase() == "production" || env.to_lowercase() == "prod")
            .unwrap_or(false)
    }

    fn apply_env_overrides(
        mut settings: config::ConfigBuilder<config::builder::DefaultState>,
    ) -> Result<config::ConfigBuilder<config::builder::DefaultState>, config::ConfigError> {
        let env_mappings = [
            ("RULES_DIR", "rules_dir"),
            ("TLD_RULES_DIR", "rules_dir"),
            ("WHOIS_PORT", "whois_port"),
            ("ROOT_WHOIS_SERVER", "root_whois_server"),
            ("WHOIS_TIMEOUT", "whois_timeout_seconds"),
            ("WHOIS_TIMEOUT_SECONDS", "whois_timeout_seconds"),
            ("MAX_RESPONSE_SIZE", "max_response_size"),
            ("DISCOVERY_TIMEOUT_SECONDS", "discovery_timeout_seconds"),
            ("CONCURRENT_WHOIS_QUERIES", "concurrent_whois_queries"),
            ("MAX_REFERRALS", "max_referrals"),
        ];

        // Later entries win, so the more specific variable names come second.
        for (env_var, config_key) in env_mappings {
            if let Ok(value) = std::env::var(env_var) {
                settings = settings.set_override(config_key, value)?;
            }
        }

        Ok(settings)
    }
}

impl Default for Config {
    fn default() -> Self {
        let defaults = Defaults::detect(false);
        Config {
            rules_dir: PathBuf::from(DEFAULT_RULES_DIR),
            whois_port: DEFAULT_WHOIS_PORT,
            root_whois_server: DEFAULT_ROOT_WHOIS_SERVER.to_string(),
            whois_timeout_seconds: defaults.whois_timeout,
            max_response_size: defaults.max_response_size,
            discovery_timeout_seconds: defaults.discovery_timeout,
            concurrent_whois_queries: defaults.concurrent_whois_queries,
            max_referrals: defaults.max_referrals,
        }
    }
}

struct Defaults {
    whois_timeout: u64,
    max_response_size: usize,
    discovery_timeout: u64,
    concurrent_whois_queries: usize,
    max_referrals: usize,
}

impl Defaults {
    fn detect(is_production: bool) -> Self {
        let cpu_cores = std::thread::available_parallelism()
            .map(|p| p.get())
            .unwrap_or(4);

        Defaults {
            whois_timeout: if is_production { 30 } else { 15 },
            max_response_size: 1024 * 1024,
            discovery_timeout: if is_production { 20 } else { 10 },
            concurrent_whois_queries: cpu_cores.min(8), // Cap at 8 to stay polite to registries
            max_referrals: 0,
        }
    }
}
