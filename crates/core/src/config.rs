//! Run configuration.
//!
//! Per-SEP settings are a sum type, one typed record per protocol, validated
//! once when the configuration is built instead of inside each test body.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::OnceLock;
use std::time::Duration;
use url::Url;

use crate::id::Sep;

/// Default timeout applied to each request a test body makes.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Errors raised while loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// No SEPs were requested
    #[error("at least one SEP must be selected")]
    NoSeps,

    /// Home domain is not http(s)
    #[error("home domain must use http or https, got '{0}'")]
    UnsupportedScheme(String),

    /// Home domain could not be parsed
    #[error("invalid home domain: {0}")]
    InvalidHomeDomain(#[from] url::ParseError),

    /// A selected SEP needs configuration that was not supplied
    #[error("{0} requires additional configuration")]
    MissingSepConfig(Sep),

    /// A SEP config key is not a supported SEP
    #[error("unknown SEP in configuration: '{0}'")]
    UnknownSep(String),

    /// A SEP config record did not match its schema
    #[error("invalid configuration for {sep}: {source}")]
    InvalidSepConfig {
        /// The SEP whose record was invalid
        sep: Sep,
        /// Underlying parse error
        source: serde_json::Error,
    },

    /// An account is not a valid Stellar public key
    #[error("{sep}: '{account}' is not a valid Stellar public key")]
    InvalidAccount {
        /// The SEP whose record holds the account
        sep: Sep,
        /// The rejected value
        account: String,
    },

    /// A referenced SEP-12 customer is not defined
    #[error("{sep}: customer '{name}' is not defined in the SEP-12 configuration")]
    UnknownCustomer {
        /// The SEP that references the customer
        sep: Sep,
        /// The missing customer name
        name: String,
    },

    /// A SEP-38 quote context is not one SEP-38 defines
    #[error("SEP-38: unknown quote context '{0}'")]
    UnknownQuoteContext(String),

    /// A search string is blank
    #[error("search strings must not be empty")]
    EmptySearchString,

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// SEP-6 settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Sep6Config {
    /// Asset expected to be listed by `/info`
    pub asset_code: Option<String>,

    /// Withdrawal types expected to be supported
    pub withdraw_types: Vec<String>,
}

/// SEP-10 settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Sep10Config {
    /// Client accounts used to request challenges
    pub client_accounts: Vec<String>,
}

/// SEP-12 settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Sep12Config {
    /// Customer records by name, each a map of SEP-9 fields
    pub customers: BTreeMap<String, BTreeMap<String, String>>,

    /// Customer to create during the run
    pub create_customer: String,

    /// Customer to delete during the run
    pub delete_customer: String,
}

/// SEP-24 settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Sep24Config {
    /// Asset expected to be listed by `/info`
    pub asset_code: Option<String>,
}

/// SEP-31 settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Sep31Config {
    /// SEP-12 customer acting as sender
    pub sending_client_name: String,

    /// SEP-12 customer acting as receiver
    pub receiving_client_name: String,

    /// Asset to send
    #[serde(default)]
    pub asset_code: Option<String>,
}

/// Quote contexts SEP-38 defines.
pub const QUOTE_CONTEXTS: [&str; 3] = ["sep6", "sep24", "sep31"];

/// SEP-38 settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Sep38Config {
    /// Contexts prices are requested for, from [`QUOTE_CONTEXTS`]
    pub contexts: Vec<String>,
}

/// Typed configuration for one SEP.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SepConfig {
    /// SEP-6 settings
    Sep6(Sep6Config),
    /// SEP-10 settings
    Sep10(Sep10Config),
    /// SEP-12 settings
    Sep12(Sep12Config),
    /// SEP-24 settings
    Sep24(Sep24Config),
    /// SEP-31 settings
    Sep31(Sep31Config),
    /// SEP-38 settings
    Sep38(Sep38Config),
}

impl SepConfig {
    /// The SEP this record configures.
    pub fn sep(&self) -> Sep {
        match self {
            SepConfig::Sep6(_) => Sep::Sep6,
            SepConfig::Sep10(_) => Sep::Sep10,
            SepConfig::Sep12(_) => Sep::Sep12,
            SepConfig::Sep24(_) => Sep::Sep24,
            SepConfig::Sep31(_) => Sep::Sep31,
            SepConfig::Sep38(_) => Sep::Sep38,
        }
    }

    /// Parse a SEP config document.
    ///
    /// The document is a JSON object keyed by SEP number (`"10"`), each value
    /// being that SEP's record.
    pub fn parse_document(json: &str) -> Result<Vec<SepConfig>, ConfigError> {
        let document: BTreeMap<String, serde_json::Value> = serde_json::from_str(json)?;
        let mut configs = Vec::with_capacity(document.len());

        for (key, value) in document {
            let sep: Sep = key.parse().map_err(|_| ConfigError::UnknownSep(key.clone()))?;
            let invalid = |source: serde_json::Error| ConfigError::InvalidSepConfig { sep, source };
            let config = match sep {
                Sep::Sep1 => return Err(ConfigError::UnknownSep(key)),
                Sep::Sep6 => SepConfig::Sep6(serde_json::from_value(value).map_err(invalid)?),
                Sep::Sep10 => SepConfig::Sep10(serde_json::from_value(value).map_err(invalid)?),
                Sep::Sep12 => SepConfig::Sep12(serde_json::from_value(value).map_err(invalid)?),
                Sep::Sep24 => SepConfig::Sep24(serde_json::from_value(value).map_err(invalid)?),
                Sep::Sep31 => SepConfig::Sep31(serde_json::from_value(value).map_err(invalid)?),
                Sep::Sep38 => SepConfig::Sep38(serde_json::from_value(value).map_err(invalid)?),
            };
            configs.push(config);
        }

        Ok(configs)
    }

    /// Load a SEP config document from a file.
    pub fn load(path: &Path) -> Result<Vec<SepConfig>, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        Self::parse_document(&json)
    }
}

/// Configuration for one run.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server under test
    pub home_domain: Url,

    /// SEPs to test, in the order their tests are selected
    pub seps: Vec<Sep>,

    /// Free-text filters over group and assertion names
    pub search_strings: Option<Vec<String>>,

    /// Per-SEP settings
    pub sep_configs: Vec<SepConfig>,

    /// Timeout for each request made by a test body
    pub request_timeout: Duration,
}

impl Config {
    /// Create a configuration for a home domain and a set of SEPs.
    pub fn new(home_domain: Url, seps: impl IntoIterator<Item = Sep>) -> Self {
        Self {
            home_domain,
            seps: seps.into_iter().collect(),
            search_strings: None,
            sep_configs: Vec::new(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    /// Parse the home domain, adding `https://` when no scheme is given.
    pub fn parse_home_domain(raw: &str) -> Result<Url, ConfigError> {
        let trimmed = raw.trim().trim_end_matches('/');
        let url = if trimmed.contains("://") {
            Url::parse(trimmed)?
        } else {
            Url::parse(&format!("https://{}", trimmed))?
        };
        Ok(url)
    }

    /// Set search strings.
    pub fn with_search_strings(mut self, search_strings: Vec<String>) -> Self {
        self.search_strings = Some(search_strings);
        self
    }

    /// Add SEP configuration.
    pub fn with_sep_config(mut self, config: SepConfig) -> Self {
        self.sep_configs.retain(|existing| existing.sep() != config.sep());
        self.sep_configs.push(config);
        self
    }

    /// Set the request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// SEP-6 settings, if configured.
    pub fn sep6(&self) -> Option<&Sep6Config> {
        self.sep_configs.iter().find_map(|c| match c {
            SepConfig::Sep6(c) => Some(c),
            _ => None,
        })
    }

    /// SEP-10 settings, if configured.
    pub fn sep10(&self) -> Option<&Sep10Config> {
        self.sep_configs.iter().find_map(|c| match c {
            SepConfig::Sep10(c) => Some(c),
            _ => None,
        })
    }

    /// SEP-12 settings, if configured.
    pub fn sep12(&self) -> Option<&Sep12Config> {
        self.sep_configs.iter().find_map(|c| match c {
            SepConfig::Sep12(c) => Some(c),
            _ => None,
        })
    }

    /// SEP-24 settings, if configured.
    pub fn sep24(&self) -> Option<&Sep24Config> {
        self.sep_configs.iter().find_map(|c| match c {
            SepConfig::Sep24(c) => Some(c),
            _ => None,
        })
    }

    /// SEP-31 settings, if configured.
    pub fn sep31(&self) -> Option<&Sep31Config> {
        self.sep_configs.iter().find_map(|c| match c {
            SepConfig::Sep31(c) => Some(c),
            _ => None,
        })
    }

    /// SEP-38 settings, if configured.
    pub fn sep38(&self) -> Option<&Sep38Config> {
        self.sep_configs.iter().find_map(|c| match c {
            SepConfig::Sep38(c) => Some(c),
            _ => None,
        })
    }

    /// Check the configuration before anything runs.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.seps.is_empty() {
            return Err(ConfigError::NoSeps);
        }

        match self.home_domain.scheme() {
            "http" | "https" => {}
            other => return Err(ConfigError::UnsupportedScheme(other.to_string())),
        }

        if let Some(search_strings) = &self.search_strings {
            if search_strings.iter().any(|s| s.trim().is_empty()) {
                return Err(ConfigError::EmptySearchString);
            }
        }

        if let Some(sep10) = self.sep10() {
            for account in &sep10.client_accounts {
                if !is_public_key(account) {
                    return Err(ConfigError::InvalidAccount {
                        sep: Sep::Sep10,
                        account: account.clone(),
                    });
                }
            }
        }

        if self.seps.contains(&Sep::Sep12) {
            let sep12 = self.sep12().ok_or(ConfigError::MissingSepConfig(Sep::Sep12))?;
            for name in [&sep12.create_customer, &sep12.delete_customer] {
                if !sep12.customers.contains_key(name) {
                    return Err(ConfigError::UnknownCustomer {
                        sep: Sep::Sep12,
                        name: name.clone(),
                    });
                }
            }
        }

        if self.seps.contains(&Sep::Sep31) {
            let sep31 = self.sep31().ok_or(ConfigError::MissingSepConfig(Sep::Sep31))?;
            let customers = self
                .sep12()
                .map(|c| &c.customers)
                .ok_or(ConfigError::MissingSepConfig(Sep::Sep12))?;
            for name in [&sep31.sending_client_name, &sep31.receiving_client_name] {
                if !customers.contains_key(name) {
                    return Err(ConfigError::UnknownCustomer {
                        sep: Sep::Sep31,
                        name: name.clone(),
                    });
                }
            }
        }

        if let Some(sep38) = self.sep38() {
            let unknown = sep38
                .contexts
                .iter()
                .find(|c| !QUOTE_CONTEXTS.contains(&c.as_str()));
            if let Some(context) = unknown {
                return Err(ConfigError::UnknownQuoteContext(context.clone()));
            }
        }

        Ok(())
    }
}

/// Whether `value` looks like a Stellar account public key (strkey `G...`).
pub fn is_public_key(value: &str) -> bool {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^G[A-Z2-7]{55}$").expect("static pattern"))
        .is_match(value)
}
