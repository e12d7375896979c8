//! Configuration merger.
//!
//! Combines shipped defaults with the administrator's skin list. The admin
//! list wins by name (whole-entry replacement, never a field merge), legacy
//! duplicates are set aside for pruning, disabled entries are dropped and the
//! result is filtered by the host major version.

use std::collections::HashMap;

use tracing::{debug, info, warn};

use super::canonical::LegacyClassifier;
use super::selector::passes_version_filter;
use super::types::{Provenance, ResolvedSkin, SkinEntry};
use crate::includes::GLOBAL_SCOPE;

/// Result of a merge.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergeOutcome {
    /// Working skin set, defaults first, then admin additions.
    pub resolved: Vec<ResolvedSkin>,
    /// Names of admin entries to prune from the admin document.
    pub to_prune: Vec<String>,
}

impl MergeOutcome {
    pub fn get(&self, name: &str) -> Option<&ResolvedSkin> {
        self.resolved.iter().find(|s| s.name() == name)
    }

    pub fn needs_cleanup(&self) -> bool {
        !self.to_prune.is_empty()
    }
}

/// Merge default and administrator skins.
///
/// When `major_version` is `None` the version filter is skipped entirely.
pub fn merge_skins(
    defaults: &[SkinEntry],
    admin: &[SkinEntry],
    classifier: &LegacyClassifier,
    major_version: Option<u32>,
) -> MergeOutcome {
    let mut to_prune: Vec<String> = Vec::new();
    let mut overlay: Vec<&SkinEntry> = Vec::with_capacity(admin.len());
    for entry in admin {
        if classifier.is_prunable(entry) {
            if !to_prune.contains(&entry.name) {
                to_prune.push(entry.name.clone());
            }
        } else {
            overlay.push(entry);
        }
    }

    let mut merged: Vec<ResolvedSkin> = Vec::with_capacity(defaults.len() + overlay.len());
    let mut index: HashMap<String, usize> = HashMap::new();

    for entry in defaults {
        match index.get(&entry.name) {
            Some(&i) => merged[i].entry = entry.clone(),
            None => {
                index.insert(entry.name.clone(), merged.len());
                merged.push(ResolvedSkin {
                    entry: entry.clone(),
                    provenance: Provenance::Default,
                });
            }
        }
    }

    for entry in overlay {
        match index.get(&entry.name) {
            Some(&i) => {
                let provenance = match merged[i].provenance {
                    Provenance::Custom => Provenance::Custom,
                    _ => Provenance::Overridden,
                };
                merged[i] = ResolvedSkin {
                    entry: entry.clone(),
                    provenance,
                };
            }
            None => {
                index.insert(entry.name.clone(), merged.len());
                merged.push(ResolvedSkin {
                    entry: entry.clone(),
                    provenance: Provenance::Custom,
                });
            }
        }
    }

    merged.retain(|skin| {
        if !skin.entry.enabled {
            debug!(skin = %skin.name(), "Dropping disabled skin");
        }
        skin.entry.enabled
    });

    // The global include scope shares the skin namespace.
    merged.retain(|skin| {
        let reserved = skin.name() == GLOBAL_SCOPE;
        if reserved {
            warn!(skin = %skin.name(), "Skin name is reserved for global includes, dropping");
        }
        !reserved
    });

    if merged.is_empty() {
        info!("No enabled skins configured, using stylesheet-less fallback");
        merged.push(ResolvedSkin {
            entry: SkinEntry::fallback(),
            provenance: Provenance::Default,
        });
    }

    if major_version.is_some() {
        merged.retain(|skin| {
            let keep = passes_version_filter(&skin.entry, major_version);
            if !keep {
                debug!(
                    skin = %skin.name(),
                    major_version = ?major_version,
                    "Skin not available for this host version"
                );
            }
            keep
        });
    }

    info!(
        resolved = merged.len(),
        pruned = to_prune.len(),
        "Merged skin configuration"
    );

    MergeOutcome {
        resolved: merged,
        to_prune,
    }
}
