//! Engine configuration for skinmgr
//!
//! Everything the engine needs to know about its host that is not part of
//! the skin documents themselves: storage key names, the plugin id used with
//! the configuration store, timing for the version poll and the verification
//! retry loop, and the navigation views that trigger a re-apply.
//!
//! # Configuration
//!
//! ```json
//! {
//!     "plugin_id": "e9ca8b8e-ca6d-40e7-85dc-58e536df8eb3",
//!     "retry_limit": 10,
//!     "navigation_views": ["home", "details", "userpreferences"]
//! }
//! ```
//!
//! Missing fields fall back to [`EngineConfig::default`].

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Result, SkinError};

const ENV_RETRY_LIMIT: &str = "SKINMGR_RETRY_LIMIT";
const ENV_PLUGIN_ID: &str = "SKINMGR_PLUGIN_ID";

/// Per-user storage key names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageKeys {
    /// JSON document `{ "optionalIncludes": [...] }`.
    pub optional_includes: String,
    /// Selected skin name.
    pub selected_skin: String,
    /// Selected theme name.
    pub selected_theme: String,
    /// Selected color scheme name.
    pub selected_color_scheme: String,
}

impl Default for StorageKeys {
    fn default() -> Self {
        Self {
            optional_includes: "skinManager.optionalIncludes".to_string(),
            selected_skin: "skinManager.selectedSkin".to_string(),
            selected_theme: "skinManager.selectedTheme".to_string(),
            selected_color_scheme: "skinManager.selectedColorScheme".to_string(),
        }
    }
}

/// A historical admin entry shape that is always pruned on sight.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegacyOneOff {
    /// Skin name the entry was stored under.
    pub name: String,
    /// Exact flat URL string the entry carried.
    pub url: String,
}

/// Engine configuration.
///
/// # Defaults
///
/// - `version_poll_interval_ms`: 500
/// - `version_poll_timeout_ms`: 10000
/// - `retry_limit`: 10
/// - `retry_backoff_ms`: 500
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Id of the admin document in the configuration store.
    pub plugin_id: String,
    /// Id of the shipped defaults document.
    pub defaults_id: String,
    /// Id of the legacy defaults snapshot used for duplicate detection.
    pub legacy_defaults_id: String,
    /// Per-user storage key names.
    pub storage_keys: StorageKeys,
    /// App name reported by the bundled web client. When the host reports
    /// this name the app version is read, otherwise the server version.
    pub web_client_app_name: String,
    /// Path segment before `/skins/` that marks a mirrored skin stylesheet.
    pub product_segment: String,
    /// Admin entries pruned regardless of the legacy snapshot.
    pub legacy_one_offs: Vec<LegacyOneOff>,
    /// Delay between version probes.
    pub version_poll_interval_ms: u64,
    /// Give up on version detection after this long.
    pub version_poll_timeout_ms: u64,
    /// Maximum verification attempts after the first apply.
    pub retry_limit: u32,
    /// Fixed delay between verification attempts.
    pub retry_backoff_ms: u64,
    /// Views whose navigation event triggers a re-apply. Empty = all views.
    pub navigation_views: Vec<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            plugin_id: "e9ca8b8e-ca6d-40e7-85dc-58e536df8eb3".to_string(),
            defaults_id: "skin-manager.defaults".to_string(),
            legacy_defaults_id: "skin-manager.legacy-defaults".to_string(),
            storage_keys: StorageKeys::default(),
            web_client_app_name: "Jellyfin Web".to_string(),
            product_segment: "jellyfin".to_string(),
            legacy_one_offs: vec![LegacyOneOff {
                name: "Default".to_string(),
                url: String::new(),
            }],
            version_poll_interval_ms: 500,
            version_poll_timeout_ms: 10_000,
            retry_limit: 10,
            retry_backoff_ms: 500,
            navigation_views: vec![
                "home".to_string(),
                "details".to_string(),
                "userpreferences".to_string(),
                "mypreferencesdisplay".to_string(),
            ],
        }
    }
}

impl EngineConfig {
    /// Default config directory (`~/.config/skinmgr`).
    pub fn dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("skinmgr")
    }

    /// Default config file path.
    pub fn path() -> PathBuf {
        Self::dir().join("config.json")
    }

    /// Load from a JSON file, then apply environment overrides.
    ///
    /// A missing file is not an error: defaults are used.
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path).map_err(|e| {
                SkinError::Config(format!("Failed to read {}: {}", path.display(), e))
            })?;
            serde_json::from_str(&content)?
        } else {
            debug!(path = %path.display(), "No config file, using defaults");
            Self::default()
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Apply `SKINMGR_*` environment overrides.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(value) = std::env::var(ENV_RETRY_LIMIT) {
            match value.parse::<u32>() {
                Ok(limit) => self.retry_limit = limit,
                Err(_) => warn!(value = %value, "Ignoring invalid {}", ENV_RETRY_LIMIT),
            }
        }
        if let Ok(id) = std::env::var(ENV_PLUGIN_ID) {
            if !id.trim().is_empty() {
                self.plugin_id = id;
            }
        }
    }

    /// Reject configurations the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.plugin_id.trim().is_empty() {
            return Err(SkinError::Config("plugin_id must not be empty".to_string()));
        }
        if self.version_poll_interval_ms == 0 {
            return Err(SkinError::Config(
                "version_poll_interval_ms must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn version_poll_interval(&self) -> Duration {
        Duration::from_millis(self.version_poll_interval_ms)
    }

    pub fn version_poll_timeout(&self) -> Duration {
        Duration::from_millis(self.version_poll_timeout_ms)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    /// Whether a navigation to `view_id` should trigger a re-apply.
    pub fn watches_view(&self, view_id: &str) -> bool {
        self.navigation_views.is_empty() || self.navigation_views.iter().any(|v| v == view_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_timings() {
        let config = EngineConfig::default();
        assert_eq!(config.version_poll_interval(), Duration::from_millis(500));
        assert_eq!(config.version_poll_timeout(), Duration::from_secs(10));
        assert_eq!(config.retry_limit, 10);
        assert_eq!(config.retry_backoff(), Duration::from_millis(500));
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: EngineConfig = serde_json::from_str(r#"{"retry_limit": 3}"#).unwrap();
        assert_eq!(config.retry_limit, 3);
        assert_eq!(config.storage_keys, StorageKeys::default());
        assert_eq!(config.product_segment, "jellyfin");
    }

    #[test]
    fn test_load_missing_file_is_default() {
        let temp = tempfile::tempdir().unwrap();
        let config = EngineConfig::load(&temp.path().join("absent.json")).unwrap();
        assert_eq!(config.retry_backoff_ms, 500);
    }

    #[test]
    fn test_load_from_file() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("config.json");
        std::fs::write(&path, r#"{"navigation_views": ["home"]}"#).unwrap();
        let config = EngineConfig::load(&path).unwrap();
        assert!(config.watches_view("home"));
        assert!(!config.watches_view("details"));
    }

    #[test]
    fn test_validate_rejects_empty_plugin_id() {
        let config = EngineConfig {
            plugin_id: "  ".to_string(),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(SkinError::Config(_))));
    }

    #[test]
    fn test_empty_view_list_watches_everything() {
        let config = EngineConfig {
            navigation_views: vec![],
            ..Default::default()
        };
        assert!(config.watches_view("anything"));
    }
}
