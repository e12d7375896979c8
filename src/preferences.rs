//! Per-user selections and include overrides.
//!
//! Wraps a [`UserStore`] with the four keys the engine reads: the selected
//! skin, theme and color scheme names, and the JSON document holding
//! optional-include overrides.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::StorageKeys;
use crate::error::Result;
use crate::includes::upsert_preference;
use crate::skins::{IncludePreference, StoredPreference};
use crate::storage::UserStore;

/// Stored shape of the include override document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredIncludes {
    #[serde(default)]
    optional_includes: Vec<StoredPreference>,
}

/// Typed access to per-user preferences.
pub struct UserPreferences<'a> {
    store: &'a dyn UserStore,
    keys: &'a StorageKeys,
}

impl<'a> UserPreferences<'a> {
    pub fn new(store: &'a dyn UserStore, keys: &'a StorageKeys) -> Self {
        Self { store, keys }
    }

    pub fn selected_skin(&self) -> Option<String> {
        non_empty(self.store.get(&self.keys.selected_skin))
    }

    pub fn selected_theme(&self) -> Option<String> {
        non_empty(self.store.get(&self.keys.selected_theme))
    }

    pub fn selected_color_scheme(&self) -> Option<String> {
        non_empty(self.store.get(&self.keys.selected_color_scheme))
    }

    pub fn set_selected_skin(&self, name: Option<&str>) -> Result<()> {
        self.write_optional(&self.keys.selected_skin, name)
    }

    pub fn set_selected_theme(&self, name: Option<&str>) -> Result<()> {
        self.write_optional(&self.keys.selected_theme, name)
    }

    pub fn set_selected_color_scheme(&self, name: Option<&str>) -> Result<()> {
        self.write_optional(&self.keys.selected_color_scheme, name)
    }

    /// Read include overrides, migrating legacy bare-key entries.
    ///
    /// Legacy entries are treated as enabled. When any are found the list is
    /// written back in object form; a failed write is logged and the migrated
    /// list is still returned.
    pub fn include_preferences(&self) -> Vec<IncludePreference> {
        let stored = self.read_stored_includes();
        let has_legacy = stored.optional_includes.iter().any(StoredPreference::is_legacy);
        let migrated: Vec<IncludePreference> = stored
            .optional_includes
            .into_iter()
            .map(StoredPreference::into_entry)
            .collect();

        if has_legacy {
            match self.write_includes(&migrated) {
                Ok(()) => info!(
                    entries = migrated.len(),
                    "Migrated legacy optional-include preferences"
                ),
                Err(e) => warn!(error = %e, "Failed to persist migrated include preferences"),
            }
        }
        migrated
    }

    /// Persist a single include toggle.
    ///
    /// The stored list is re-read and only `key` is updated or appended, so
    /// entries for scopes that are not currently loaded survive.
    pub fn persist_include(&self, key: &str, enabled: bool) -> Result<Vec<IncludePreference>> {
        let mut current = self.include_preferences();
        upsert_preference(&mut current, key, enabled);
        self.write_includes(&current)?;
        Ok(current)
    }

    fn read_stored_includes(&self) -> StoredIncludes {
        let Some(raw) = self.store.get(&self.keys.optional_includes) else {
            return StoredIncludes::default();
        };
        match serde_json::from_str(&raw) {
            Ok(stored) => stored,
            Err(e) => {
                warn!(error = %e, "Ignoring unreadable include preferences");
                StoredIncludes::default()
            }
        }
    }

    fn write_includes(&self, entries: &[IncludePreference]) -> Result<()> {
        let stored = StoredIncludes {
            optional_includes: entries
                .iter()
                .cloned()
                .map(StoredPreference::Entry)
                .collect(),
        };
        let raw = serde_json::to_string(&stored)?;
        self.store.set(&self.keys.optional_includes, &raw)
    }

    fn write_optional(&self, key: &str, value: Option<&str>) -> Result<()> {
        match value {
            Some(v) => self.store.set(key, v),
            None => self.store.remove(key),
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
