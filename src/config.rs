//! Engine configuration
//!
//! Everything a store needs besides its key-value environment and schema:
//! the suffix it serves, record size limits, IDL sizing, the attributes it
//! indexes, multi-value thresholds and substring key parameters.
//!
//! Error codes:
//! - DIR_CONFIG_PARSE (ERROR)
//! - DIR_CONFIG_INVALID (ERROR)

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::dn::Dn;
use crate::error::{ErrorKind, Severity};
use crate::idl::IDL_DB_SIZE;
use crate::index::IndexSpec;
use crate::record::MultivalPolicy;
use crate::schema::SubstrParams;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("configuration does not parse: {0}")]
    Parse(String),

    #[error("configuration field {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl ConfigError {
    fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            field,
            reason: reason.into(),
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ConfigError::Parse(_) => "DIR_CONFIG_PARSE",
            ConfigError::Invalid { .. } => "DIR_CONFIG_INVALID",
        }
    }

    pub fn severity(&self) -> Severity {
        Severity::Error
    }

    pub fn kind(&self) -> ErrorKind {
        ErrorKind::InvalidRequest
    }
}

/// Store configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// DN of the top record this store serves
    pub suffix: String,

    /// Largest encoded record in bytes (default: 16 MiB)
    #[serde(default = "default_max_record_size")]
    pub max_record_size: usize,

    /// Identifiers per index key before it becomes a range (default: 65536)
    #[serde(default = "default_idl_db_max")]
    pub idl_db_max: usize,

    /// Attribute whose assertions are answered from the name tree
    #[serde(default = "default_entry_dn_attr")]
    pub entry_dn_attr: String,

    /// Indexed attributes
    #[serde(default)]
    pub indexes: Vec<IndexSpec>,

    /// Out-of-line thresholds for multi-valued attributes
    #[serde(default)]
    pub multival: MultivalPolicy,

    /// Substring index key parameters
    #[serde(default)]
    pub substr: SubstrParams,
}

fn default_max_record_size() -> usize {
    1 << 24
}

fn default_idl_db_max() -> usize {
    IDL_DB_SIZE
}

fn default_entry_dn_attr() -> String {
    "entryDN".to_string()
}

impl EngineConfig {
    /// Configuration for `suffix` with every other field defaulted
    pub fn new(suffix: impl Into<String>) -> Self {
        Self {
            suffix: suffix.into(),
            max_record_size: default_max_record_size(),
            idl_db_max: default_idl_db_max(),
            entry_dn_attr: default_entry_dn_attr(),
            indexes: Vec::new(),
            multival: MultivalPolicy::default(),
            substr: SubstrParams::default(),
        }
    }

    /// Adds an index on `attr`
    pub fn with_index(mut self, attr: &str, kinds: &[&str]) -> Self {
        self.indexes.push(IndexSpec::new(attr, kinds));
        self
    }

    /// Parses and validates a JSON document
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String, ConfigError> {
        serde_json::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Parsed suffix DN
    pub fn suffix_dn(&self) -> Result<Dn, ConfigError> {
        let dn = Dn::parse(&self.suffix).map_err(|e| ConfigError::invalid("suffix", e.to_string()))?;
        if dn.is_root() {
            return Err(ConfigError::invalid("suffix", "must not be empty"));
        }
        Ok(dn)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.suffix_dn()?;
        if self.max_record_size < 16 {
            return Err(ConfigError::invalid("max_record_size", "must hold at least a header"));
        }
        if self.idl_db_max < 2 {
            return Err(ConfigError::invalid("idl_db_max", "must be at least 2"));
        }
        if self.entry_dn_attr.trim().is_empty() {
            return Err(ConfigError::invalid("entry_dn_attr", "must not be empty"));
        }
        for spec in &self.indexes {
            if let Err(kind) = spec.mask() {
                return Err(ConfigError::invalid(
                    "indexes",
                    format!("unknown kind {kind} for {}", spec.attr),
                ));
            }
        }
        let thresholds = std::iter::once((self.multival.default.hi, self.multival.default.lo))
            .chain(self.multival.attrs.iter().map(|t| (t.hi, t.lo)));
        for (hi, lo) in thresholds {
            if lo > hi {
                return Err(ConfigError::invalid("multival", format!("lo {lo} above hi {hi}")));
            }
        }
        let s = &self.substr;
        if s.initial_min_len == 0 || s.initial_min_len > s.initial_max_len {
            return Err(ConfigError::invalid("substr", "initial lengths out of order"));
        }
        if s.any_len == 0 || s.any_step == 0 {
            return Err(ConfigError::invalid("substr", "any length and step must be positive"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_minimal_json() {
        let config = EngineConfig::from_json(r#"{ "suffix": "dc=example,dc=com" }"#).unwrap();
        assert_eq!(config.max_record_size, 1 << 24);
        assert_eq!(config.idl_db_max, IDL_DB_SIZE);
        assert_eq!(config.entry_dn_attr, "entryDN");
        assert_eq!(config.substr, SubstrParams::default());
        assert_eq!(config.multival.threshold("member").hi, usize::MAX);
    }

    #[test]
    fn test_full_json() {
        let json = r#"{
            "suffix": "dc=example,dc=com",
            "idl_db_max": 64,
            "indexes": [{ "attr": "cn", "kinds": ["pres", "eq", "sub"] }],
            "multival": { "default": { "hi": 100, "lo": 50 },
                          "attrs": [{ "attr": "member", "hi": 10, "lo": 5 }] },
            "substr": { "any_len": 3 }
        }"#;
        let config = EngineConfig::from_json(json).unwrap();
        assert_eq!(config.indexes[0].attr, "cn");
        assert_eq!(config.multival.threshold("MEMBER").hi, 10);
        assert_eq!(config.multival.threshold("cn").lo, 50);
        assert_eq!(config.substr.any_len, 3);
        assert_eq!(config.substr.any_step, 2);

        let again = EngineConfig::from_json(&config.to_json().unwrap()).unwrap();
        assert_eq!(again, config);
    }

    #[test]
    fn test_rejects_bad_values() {
        let err = EngineConfig::from_json(r#"{ "suffix": "" }"#).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "suffix", .. }));

        let err = EngineConfig::new("dc=com").with_index("cn", &["bogus"]).validate().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "indexes", .. }));

        let mut config = EngineConfig::new("dc=com");
        config.multival.default.lo = 10;
        config.multival.default.hi = 5;
        assert!(config.validate().is_err());

        let err = EngineConfig::from_json("{ not json").unwrap_err();
        assert_eq!(err.code(), "DIR_CONFIG_PARSE");
    }
}
