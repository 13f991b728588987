//! Extension settings.
//!
//! The host keeps one settings object for all extensions, keyed by
//! extension name. [`Settings::load`] reads that object once and picks the
//! `vhelas-status-line` entry; the resulting struct is passed by reference
//! into everything that needs it.
//!
//! ```json
//! {
//!   "vhelas-status-line": {
//!     "enabled": true,
//!     "parser_augmentation": "rules",
//!     "output_augmentation": "disabled",
//!     "api_key": ""
//!   }
//! }
//! ```

use std::path::Path;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

/// Key of this extension in the host-wide settings object.
pub const EXTENSION_NAME: &str = "vhelas-status-line";

/// Environment variable that overrides [`Settings::api_key`].
pub const API_KEY_ENV: &str = "VHELAS_API_KEY";

/// How player input is pre-parsed before it reaches the game service.
#[derive(Serialize, Deserialize, JsonSchema, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ParserAugmentation {
    #[default]
    Disabled,
    Rules,
    Nlp,
    Llm,
}

/// How game output is post-processed before display.
#[derive(Serialize, Deserialize, JsonSchema, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OutputAugmentation {
    #[default]
    Disabled,
    Rewrite,
    WorldStateModification,
}

/// Recognized options of this extension.
#[derive(Serialize, Deserialize, JsonSchema, Clone, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct Settings {
    /// Master switch. When off, nothing is scanned and the bar stays hidden.
    pub enabled: bool,
    pub parser_augmentation: ParserAugmentation,
    pub output_augmentation: OutputAugmentation,
    /// Credential for LLM-backed augmentation.
    pub api_key: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            enabled: true,
            parser_augmentation: ParserAugmentation::Disabled,
            output_augmentation: OutputAugmentation::Disabled,
            api_key: String::new(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read settings file '{path}': {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid settings: {0}")]
    Parse(#[from] serde_json::Error),
}

impl Settings {
    /// Extract this extension's entry from the host-wide settings object.
    ///
    /// A missing entry yields the defaults.
    pub fn from_host_settings(host: &Value) -> Result<Self, ConfigError> {
        match host.get(EXTENSION_NAME) {
            Some(entry) => Ok(serde_json::from_value(entry.clone())?),
            None => Ok(Self::default()),
        }
    }

    /// Read the host-wide settings file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let host: Value = serde_json::from_str(&contents)?;
        Self::from_host_settings(&host)
    }

    /// Load settings, falling back to defaults when the file is missing or
    /// unreadable, then apply the environment override.
    pub fn load(path: Option<&Path>) -> Self {
        let mut settings = match path {
            Some(p) if p.exists() => Self::from_file(p).unwrap_or_else(|e| {
                warn!("{e}; using default settings");
                Self::default()
            }),
            Some(p) => {
                debug!("settings file {} not found, using defaults", p.display());
                Self::default()
            }
            None => Self::default(),
        };
        if let Ok(key) = std::env::var(API_KEY_ENV)
            && !key.is_empty()
        {
            settings.api_key = key;
        }
        settings
    }

    /// Whether the configured parser augmentation lacks its credential.
    pub fn missing_api_key(&self) -> bool {
        self.parser_augmentation == ParserAugmentation::Llm && self.api_key.trim().is_empty()
    }

    /// JSON Schema of the host-wide settings entry.
    pub fn json_schema() -> Value {
        let schema = schemars::schema_for!(Settings);
        serde_json::to_value(schema)
            .unwrap_or_else(|_| serde_json::json!({"type": "object", "properties": {}}))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;

    #[test]
    fn defaults_enable_extension_without_augmentation() {
        let s = Settings::default();
        assert!(s.enabled);
        assert_eq!(s.parser_augmentation, ParserAugmentation::Disabled);
        assert_eq!(s.output_augmentation, OutputAugmentation::Disabled);
        assert!(s.api_key.is_empty());
    }

    #[test]
    fn host_settings_entry_is_parsed() {
        let host = json!({
            "other-extension": {"enabled": false},
            "vhelas-status-line": {
                "enabled": false,
                "parser_augmentation": "nlp",
                "output_augmentation": "worldstatemodification"
            }
        });
        let s = Settings::from_host_settings(&host).unwrap();
        assert!(!s.enabled);
        assert_eq!(s.parser_augmentation, ParserAugmentation::Nlp);
        assert_eq!(s.output_augmentation, OutputAugmentation::WorldStateModification);
        assert!(s.api_key.is_empty());
    }

    #[test]
    fn missing_entry_yields_defaults() {
        let s = Settings::from_host_settings(&json!({})).unwrap();
        assert_eq!(s, Settings::default());
    }

    #[test]
    fn unknown_enum_value_is_an_error() {
        let host = json!({"vhelas-status-line": {"parser_augmentation": "magic"}});
        assert!(matches!(
            Settings::from_host_settings(&host),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn load_from_file_and_fallbacks() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"vhelas-status-line": {{"output_augmentation": "rewrite"}}}}"#
        )
        .unwrap();
        let s = Settings::from_file(file.path()).unwrap();
        assert_eq!(s.output_augmentation, OutputAugmentation::Rewrite);
        assert!(s.enabled);

        let missing = Settings::load(Some(Path::new("/nonexistent/settings.json")));
        assert!(missing.enabled);

        let mut broken = tempfile::NamedTempFile::new().unwrap();
        write!(broken, "{{ not json").unwrap();
        assert!(Settings::from_file(broken.path()).is_err());
        assert!(Settings::load(Some(broken.path())).enabled);
    }

    #[test]
    fn llm_parser_requires_api_key() {
        let mut s = Settings {
            parser_augmentation: ParserAugmentation::Llm,
            ..Default::default()
        };
        assert!(s.missing_api_key());
        s.api_key = "sk-test".into();
        assert!(!s.missing_api_key());
        s.parser_augmentation = ParserAugmentation::Rules;
        s.api_key.clear();
        assert!(!s.missing_api_key());
    }

    #[test]
    fn schema_lists_settings_fields() {
        let schema = Settings::json_schema();
        let props = &schema["properties"];
        assert!(props.get("enabled").is_some());
        assert!(props.get("parser_augmentation").is_some());
        assert!(props.get("api_key").is_some());
    }
}
