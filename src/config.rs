//! File-based settings
//!
//! `StoreSettings` is read from a JSON file. Every field is optional:
//!
//! ```json
//! {
//!   "ledger_dir": "./ledger",
//!   "manage_draft": true,
//!   "signing_context": "MyApp",
//!   "time_slice_ms": 20,
//!   "log_level": "info",
//!   "fallback_salt": "00112233445566778899aabbccddeeff",
//!   "passphrase_env": "LEDGER_PASSPHRASE"
//! }
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::crypto::{DigestAuth, PassphraseEncryption};
use crate::store::StoreConfig;

pub type SettingsResult<T> = Result<T, SettingsError>;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to read settings {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid settings JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid setting {field}: {message}")]
    Invalid { field: &'static str, message: String },

    #[error("environment variable {0} holding the passphrase is not set")]
    MissingPassphrase(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSettings {
    /// Root of the file ledger
    pub ledger_dir: PathBuf,

    /// Persist uncommitted changes for crash recovery
    pub manage_draft: bool,

    /// Enables signing with this context name
    pub signing_context: Option<String>,

    pub time_slice_ms: u64,

    pub log_level: String,

    /// Salt for legacy ciphertexts that carry none
    pub fallback_salt: String,

    /// Enables encryption with the passphrase held in this variable
    pub passphrase_env: Option<String>,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            ledger_dir: PathBuf::from("./ledger"),
            manage_draft: false,
            signing_context: None,
            time_slice_ms: 20,
            log_level: "info".to_string(),
            fallback_salt: String::new(),
            passphrase_env: None,
        }
    }
}

impl StoreSettings {
    pub fn load(path: &Path) -> SettingsResult<Self> {
        let content = fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let settings: StoreSettings = serde_json::from_str(&content)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Loads `path` if given, defaults otherwise.
    pub fn load_or_default(path: Option<&Path>) -> SettingsResult<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> SettingsResult<()> {
        if self.time_slice_ms == 0 {
            return Err(SettingsError::Invalid {
                field: "time_slice_ms",
                message: "must be > 0".to_string(),
            });
        }
        if self.log_level.trim().is_empty() {
            return Err(SettingsError::Invalid {
                field: "log_level",
                message: "must not be empty".to_string(),
            });
        }
        if !self.fallback_salt.is_empty() && hex::decode(&self.fallback_salt).is_err() {
            return Err(SettingsError::Invalid {
                field: "fallback_salt",
                message: "must be hex".to_string(),
            });
        }
        if self.signing_context.as_deref().is_some_and(|c| c.trim().is_empty()) {
            return Err(SettingsError::Invalid {
                field: "signing_context",
                message: "must not be empty".to_string(),
            });
        }
        Ok(())
    }

    pub fn time_slice(&self) -> Duration {
        Duration::from_millis(self.time_slice_ms)
    }

    /// Builds the programmatic store configuration. The passphrase is read
    /// from the environment here.
    pub fn to_store_config(&self) -> SettingsResult<StoreConfig> {
        let mut config = StoreConfig::default()
            .with_draft(self.manage_draft)
            .with_time_slice(self.time_slice());

        if let Some(context) = &self.signing_context {
            config = config.with_auth(DigestAuth::new(context.clone()));
        }
        if let Some(var) = &self.passphrase_env {
            let passphrase =
                std::env::var(var).map_err(|_| SettingsError::MissingPassphrase(var.clone()))?;
            config = config.with_encryption(PassphraseEncryption::with_passphrase(
                self.fallback_salt.clone(),
                passphrase,
            ));
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn write_settings(dir: &TempDir, value: serde_json::Value) -> PathBuf {
        let path = dir.path().join("settings.json");
        fs::write(&path, value.to_string()).unwrap();
        path
    }

    #[test]
    fn test_defaults() {
        let dir = TempDir::new().unwrap();
        let path = write_settings(&dir, json!({}));

        let settings = StoreSettings::load(&path).unwrap();
        assert_eq!(settings, StoreSettings::default());
        assert_eq!(settings.time_slice(), Duration::from_millis(20));
        assert_eq!(settings.log_level, "info");
    }

    #[test]
    fn test_zero_time_slice_rejected() {
        let dir = TempDir::new().unwrap();
        let path = write_settings(&dir, json!({ "time_slice_ms": 0 }));

        let err = StoreSettings::load(&path).unwrap_err();
        assert!(matches!(err, SettingsError::Invalid { field: "time_slice_ms", .. }));
    }

    #[test]
    fn test_non_hex_salt_rejected() {
        let dir = TempDir::new().unwrap();
        let path = write_settings(&dir, json!({ "fallback_salt": "not hex" }));
        assert!(StoreSettings::load(&path).is_err());
    }

    #[test]
    fn test_missing_file_and_bad_json() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            StoreSettings::load(&dir.path().join("absent.json")),
            Err(SettingsError::Read { .. })
        ));

        let path = dir.path().join("broken.json");
        fs::write(&path, "{").unwrap();
        assert!(matches!(StoreSettings::load(&path), Err(SettingsError::Parse(_))));
    }

    #[test]
    fn test_store_config_from_settings() {
        let settings = StoreSettings {
            manage_draft: true,
            signing_context: Some("MockApp".to_string()),
            time_slice_ms: 5,
            ..Default::default()
        };
        let config = settings.to_store_config().unwrap();
        assert!(config.manage_draft);
        assert!(config.auth.is_some());
        assert!(config.encryption.is_none());
        assert_eq!(config.time_slice, Duration::from_millis(5));
    }

    #[test]
    fn test_unset_passphrase_variable() {
        let settings = StoreSettings {
            passphrase_env: Some("ENTITY_LEDGER_TEST_UNSET_PASSPHRASE".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            settings.to_store_config(),
            Err(SettingsError::MissingPassphrase(_))
        ));
    }
}
