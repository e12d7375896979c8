//! One-time cleanup of duplicate and legacy admin skin entries.
//!
//! Before the pruned admin document is written, the current document is
//! archived to the config store as a disabled, timestamp-named backup. If the
//! backup cannot be written the prune is abandoned; duplicates are harmless
//! because the merger already ignores them.

use std::sync::Arc;

use chrono::Utc;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::error::Result;
use crate::skins::{AdminDocument, LegacyClassifier};
use crate::storage::ConfigStore;

/// What a cleanup pass did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CleanupOutcome {
    /// Nothing to prune; no writes.
    Clean,
    /// Backup written, pruned document persisted.
    Pruned { backup_id: String, removed: usize },
    /// Backup written but the pruned document could not be saved.
    PrunedInMemory { backup_id: String, removed: usize },
    /// Backup failed; the stored document was left untouched.
    Aborted,
}

/// Result of [`CleanupUnit::cleanup_if_needed`].
#[derive(Debug, Clone)]
pub struct CleanupReport {
    /// The admin document to use for the rest of the session.
    pub document: AdminDocument,
    pub outcome: CleanupOutcome,
}

/// Write-ahead backup and prune of the admin document.
pub struct CleanupUnit {
    store: Arc<dyn ConfigStore>,
    plugin_id: String,
}

impl CleanupUnit {
    pub fn new(store: Arc<dyn ConfigStore>, plugin_id: impl Into<String>) -> Self {
        Self {
            store,
            plugin_id: plugin_id.into(),
        }
    }

    /// Id under which a backup taken now is stored.
    pub fn backup_id(&self) -> String {
        format!(
            "{}.backup.{}",
            self.plugin_id,
            Utc::now().format("%Y%m%dT%H%M%S%.3fZ")
        )
    }

    /// Prune legacy duplicates from `admin`, backing it up first.
    pub async fn cleanup_if_needed(
        &self,
        admin: &AdminDocument,
        classifier: &LegacyClassifier,
    ) -> CleanupReport {
        let mut pruned = admin.clone();
        pruned.skins.retain(|skin| !classifier.is_prunable(skin));
        let removed = admin.skins.len() - pruned.skins.len();

        if removed == 0 {
            return CleanupReport {
                document: admin.clone(),
                outcome: CleanupOutcome::Clean,
            };
        }

        let backup_id = match self.write_backup(admin).await {
            Ok(id) => id,
            Err(e) => {
                warn!(
                    error = %e,
                    duplicates = removed,
                    "Backup of admin configuration failed, skipping cleanup"
                );
                return CleanupReport {
                    document: admin.clone(),
                    outcome: CleanupOutcome::Aborted,
                };
            }
        };

        let outcome = match self.write_document(&pruned).await {
            Ok(()) => {
                info!(
                    removed,
                    backup = %backup_id,
                    "Pruned duplicate skins from admin configuration"
                );
                CleanupOutcome::Pruned { backup_id, removed }
            }
            Err(e) => {
                warn!(
                    error = %e,
                    backup = %backup_id,
                    "Failed to save pruned admin configuration"
                );
                CleanupOutcome::PrunedInMemory { backup_id, removed }
            }
        };

        CleanupReport {
            document: pruned,
            outcome,
        }
    }

    async fn write_backup(&self, admin: &AdminDocument) -> Result<String> {
        let snapshot: Value = serde_json::to_value(admin)?;
        let created_at = Utc::now();
        let backup_id = self.backup_id();
        let backup = json!({
            "name": format!("Backup {}", created_at.format("%Y-%m-%d %H:%M:%S UTC")),
            "enabled": false,
            "createdAt": created_at.to_rfc3339(),
            "backupOf": self.plugin_id,
            "document": snapshot,
        });
        self.store.put(&backup_id, &backup).await?;
        Ok(backup_id)
    }

    async fn write_document(&self, document: &AdminDocument) -> Result<()> {
        let value = serde_json::to_value(document)?;
        self.store.put(&self.plugin_id, &value).await
    }
}
