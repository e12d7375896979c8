//! Skin engine orchestration.
//!
//! [`SkinEngine`] owns every collaborator and all mutable state: the loaded
//! documents, the merge result, the include resolver and the injector. It is
//! meant to be shared as `Arc<tokio::sync::Mutex<SkinEngine>>` between the
//! navigation listener and user actions, which serializes all writes.
//!
//! Initialization order:
//!
//! 1. detect the host major version
//! 2. load defaults, legacy snapshot and admin documents
//! 3. merge, then prune legacy duplicates from the admin document
//! 4. apply theme, skin, color scheme and optional includes
//! 5. verify the document, retrying with back-off
//! 6. start handling navigation events

use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cleanup::{CleanupOutcome, CleanupUnit};
use crate::config::EngineConfig;
use crate::document::{StyleDocument, INIT_MARKER};
use crate::error::{Result, SkinError};
use crate::includes::{IncludeResolver, ResolvedInclude, GLOBAL_SCOPE};
use crate::injector::{Injector, ResolvedSelection};
use crate::preferences::UserPreferences;
use crate::skins::{
    merge_skins, parse_admin_document, resolve_urls, AdminDocument, DefaultsDocument,
    LegacyClassifier, LegacyDocument, MergeOutcome, OptionalInclude, ResolvedSkin,
    StoredPreference,
};
use crate::storage::{ConfigStore, UserStore};
use crate::supervisor::{
    self, ExpectedSelection, Settle, SettleOutcome, Supervisor, VerificationIssue,
};
use crate::version::{HostInfo, VersionResolver};

/// A client-side navigation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavigationEvent {
    pub view_id: String,
    /// Container element the view was rendered into, if known.
    pub container: Option<String>,
}

impl NavigationEvent {
    pub fn new(view_id: impl Into<String>) -> Self {
        Self {
            view_id: view_id.into(),
            container: None,
        }
    }
}

/// Result of [`SkinEngine::init`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InitOutcome {
    /// The document was already initialized; nothing was done.
    AlreadyInitialized,
    Completed(SettleOutcome),
}

/// The skin, theme and include engine for one document.
pub struct SkinEngine {
    config: EngineConfig,
    config_store: Arc<dyn ConfigStore>,
    user_store: Arc<dyn UserStore>,
    version: VersionResolver,
    document: Box<dyn StyleDocument>,
    supervisor: Supervisor,
    injector: Injector,
    defaults: DefaultsDocument,
    legacy: LegacyDocument,
    admin: AdminDocument,
    merged: MergeOutcome,
    includes: IncludeResolver,
    major_version: Option<u32>,
    cleanup: Option<CleanupOutcome>,
    handlers_registered: bool,
}

impl SkinEngine {
    pub fn new(
        config: EngineConfig,
        config_store: Arc<dyn ConfigStore>,
        user_store: Arc<dyn UserStore>,
        host: Arc<dyn HostInfo>,
        document: Box<dyn StyleDocument>,
    ) -> Self {
        Self {
            version: VersionResolver::new(host, &config),
            supervisor: Supervisor::from_config(&config),
            config,
            config_store,
            user_store,
            document,
            injector: Injector::new(),
            defaults: DefaultsDocument::default(),
            legacy: LegacyDocument::default(),
            admin: AdminDocument::default(),
            merged: MergeOutcome::default(),
            includes: IncludeResolver::default(),
            major_version: None,
            cleanup: None,
            handlers_registered: false,
        }
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Initialize the engine on its document.
    ///
    /// Never fails: every error along the way is logged and degraded. A
    /// second call on an already-initialized document does nothing.
    pub async fn init(&mut self) -> InitOutcome {
        if self.document.has_marker(INIT_MARKER) {
            debug!("Document already initialized, skipping");
            return InitOutcome::AlreadyInitialized;
        }
        self.document.set_marker(INIT_MARKER);

        self.major_version = self.version.major_version().await;
        self.refresh().await;

        let supervisor = self.supervisor;
        let outcome = supervisor.verify_and_settle(&mut *self).await;
        self.handlers_registered = true;

        info!(
            skin = ?self.injector.selection().skin,
            major_version = ?self.major_version,
            skins = self.merged.resolved.len(),
            settled = outcome.is_settled(),
            "Skin engine initialized"
        );
        InitOutcome::Completed(outcome)
    }

    /// Reload documents, merge and re-apply the current selection.
    async fn refresh(&mut self) {
        self.load_documents().await;
        self.merge_and_clean().await;
        self.apply_current_selection();
    }

    async fn fetch<T: DeserializeOwned>(&self, id: &str) -> Result<Option<T>> {
        match self.config_store.get(id).await? {
            Some(value) => serde_json::from_value(value)
                .map(Some)
                .map_err(|e| SkinError::Parse(format!("{}: {}", id, e))),
            None => Ok(None),
        }
    }

    async fn load_documents(&mut self) {
        match self.fetch::<DefaultsDocument>(&self.config.defaults_id).await {
            Ok(Some(defaults)) => self.defaults = defaults,
            Ok(None) => debug!(id = %self.config.defaults_id, "No defaults document"),
            Err(e) => warn!(error = %e, "Defaults unavailable, keeping last loaded"),
        }

        match self.fetch::<LegacyDocument>(&self.config.legacy_defaults_id).await {
            Ok(Some(legacy)) => self.legacy = legacy,
            Ok(None) => debug!(id = %self.config.legacy_defaults_id, "No legacy snapshot"),
            Err(e) => warn!(error = %e, "Legacy snapshot unavailable"),
        }

        let admin = match self.config_store.get(&self.config.plugin_id).await {
            Ok(Some(value)) => parse_admin_document(&value.to_string()),
            Ok(None) => Ok(AdminDocument::default()),
            Err(e) => Err(e),
        };
        match admin {
            Ok(_) if matches!(self.cleanup, Some(CleanupOutcome::PrunedInMemory { .. })) => {
                debug!("Keeping pruned admin configuration that could not be saved")
            }
            Ok(admin) => self.admin = admin,
            Err(e) if matches!(e, SkinError::Parse(_) | SkinError::Json(_)) => {
                warn!(error = %e, "Admin configuration unreadable, keeping last known good")
            }
            Err(e) => {
                warn!(error = %e, "Admin configuration unavailable, using defaults only");
                self.admin = AdminDocument::default();
            }
        }
    }

    async fn merge_and_clean(&mut self) {
        let classifier = LegacyClassifier::new(&self.legacy.skins, &self.config);
        self.merged = merge_skins(
            &self.defaults.skins,
            &self.admin.skins,
            &classifier,
            self.major_version,
        );

        if self.merged.needs_cleanup() && !self.pruned_this_session() {
            let unit = CleanupUnit::new(self.config_store.clone(), self.config.plugin_id.clone());
            let report = unit.cleanup_if_needed(&self.admin, &classifier).await;
            self.admin = report.document;
            self.cleanup = Some(report.outcome);
        }

        let admin_layer = self
            .admin
            .optional_includes
            .iter()
            .cloned()
            .map(StoredPreference::into_entry)
            .collect();
        let user_layer =
            UserPreferences::new(self.user_store.as_ref(), &self.config.storage_keys)
                .include_preferences();
        self.includes = IncludeResolver::new(user_layer, admin_layer);
    }

    /// Pruning runs at most once per session, even if the pruned document
    /// could not be saved.
    fn pruned_this_session(&self) -> bool {
        matches!(
            self.cleanup,
            Some(CleanupOutcome::Pruned { .. } | CleanupOutcome::PrunedInMemory { .. })
        )
    }

    // ========================================================================
    // Selection
    // ========================================================================

    /// Stored skin, else the admin default, else the first resolved skin.
    fn preferred_skin(&self) -> Option<&ResolvedSkin> {
        let stored = UserPreferences::new(self.user_store.as_ref(), &self.config.storage_keys)
            .selected_skin();
        stored
            .as_deref()
            .and_then(|name| self.merged.get(name))
            .or_else(|| {
                self.admin
                    .default_skin
                    .as_deref()
                    .and_then(|name| self.merged.get(name))
            })
            .or_else(|| self.merged.resolved.first())
    }

    /// The applied skin if it still exists, else the preferred one.
    pub fn current_skin(&self) -> Option<&ResolvedSkin> {
        self.injector
            .selection()
            .skin
            .as_deref()
            .and_then(|name| self.merged.get(name))
            .or_else(|| self.preferred_skin())
    }

    fn apply_current_selection(&mut self) {
        match self.current_skin().cloned() {
            Some(skin) => self.apply_selection(&skin),
            None => warn!(
                major_version = ?self.major_version,
                "No skins available for this host version"
            ),
        }
    }

    fn apply_selection(&mut self, skin: &ResolvedSkin) {
        let prefs = UserPreferences::new(self.user_store.as_ref(), &self.config.storage_keys);

        let theme = prefs.selected_theme().and_then(|name| {
            let theme = self.admin.theme(&name).cloned();
            if theme.is_none() {
                debug!(theme = %name, "Stored theme is no longer configured");
            }
            theme
        });
        let theme = theme.filter(|t| !t.url.trim().is_empty());

        let stored_scheme = prefs.selected_color_scheme();
        let scheme = stored_scheme
            .as_deref()
            .and_then(|name| skin.entry.color_scheme(name).cloned())
            .filter(|c| !c.url.trim().is_empty());
        if let (Some(name), None) = (&stored_scheme, &scheme) {
            info!(
                color_scheme = %name,
                skin = %skin.name(),
                "Clearing color scheme the skin does not offer"
            );
            if let Err(e) = prefs.set_selected_color_scheme(None) {
                warn!(error = %e, "Failed to clear stored color scheme");
            }
        }

        let doc = self.document.as_mut();
        self.injector.apply_theme(doc, theme.as_ref());
        self.injector.apply_skin(doc, skin, self.major_version);
        self.injector.apply_color_scheme(doc, skin.name(), scheme.as_ref());
        self.apply_includes(skin);
    }

    fn apply_includes(&mut self, skin: &ResolvedSkin) {
        let global = self.includes.resolve_scope(
            GLOBAL_SCOPE,
            None,
            &self.defaults.global_optional_includes,
        );
        let scoped = self.includes.resolve_scope(
            skin.name(),
            skin.entry.author.as_deref(),
            &skin.entry.optional_includes,
        );

        let doc = self.document.as_mut();
        self.injector
            .apply_optional_includes(doc, GLOBAL_SCOPE, &global);
        self.injector
            .apply_optional_includes(doc, skin.name(), &scoped);
    }

    fn scope_definitions(&self, scope: &str) -> Result<(Option<String>, Vec<OptionalInclude>)> {
        if scope == GLOBAL_SCOPE {
            return Ok((None, self.defaults.global_optional_includes.clone()));
        }
        self.merged
            .get(scope)
            .map(|s| (s.entry.author.clone(), s.entry.optional_includes.clone()))
            .ok_or_else(|| SkinError::NotFound(format!("include scope '{}'", scope)))
    }

    // ========================================================================
    // User actions
    // ========================================================================

    /// Switch to the skin called `name` and remember it for the user.
    ///
    /// A failed write to the user store is logged; the visual switch stays.
    pub fn switch_skin(&mut self, name: &str) -> Result<()> {
        let skin = self
            .merged
            .get(name)
            .cloned()
            .ok_or_else(|| SkinError::NotFound(format!("skin '{}'", name)))?;

        let prefs = UserPreferences::new(self.user_store.as_ref(), &self.config.storage_keys);
        if let Err(e) = prefs.set_selected_skin(Some(name)) {
            warn!(skin = %name, error = %e, "Failed to persist skin selection");
        }

        self.apply_selection(&skin);
        info!(skin = %name, "Switched skin");
        Ok(())
    }

    /// Select a theme from the admin document, or clear it with `None`.
    pub fn switch_theme(&mut self, name: Option<&str>) -> Result<()> {
        let theme = match name {
            Some(name) => Some(
                self.admin
                    .theme(name)
                    .cloned()
                    .ok_or_else(|| SkinError::NotFound(format!("theme '{}'", name)))?,
            ),
            None => None,
        };

        let prefs = UserPreferences::new(self.user_store.as_ref(), &self.config.storage_keys);
        if let Err(e) = prefs.set_selected_theme(name) {
            warn!(theme = ?name, error = %e, "Failed to persist theme selection");
        }

        let theme = theme.filter(|t| !t.url.trim().is_empty());
        self.injector
            .apply_theme(self.document.as_mut(), theme.as_ref());
        Ok(())
    }

    /// Select one of the active skin's color schemes, or clear it.
    pub fn switch_color_scheme(&mut self, name: Option<&str>) -> Result<()> {
        let skin = self
            .current_skin()
            .cloned()
            .ok_or_else(|| SkinError::NotFound("active skin".to_string()))?;
        let scheme = match name {
            Some(name) => Some(skin.entry.color_scheme(name).cloned().ok_or_else(|| {
                SkinError::NotFound(format!(
                    "color scheme '{}' of skin '{}'",
                    name,
                    skin.name()
                ))
            })?),
            None => None,
        };

        let prefs = UserPreferences::new(self.user_store.as_ref(), &self.config.storage_keys);
        if let Err(e) = prefs.set_selected_color_scheme(name) {
            warn!(color_scheme = ?name, error = %e, "Failed to persist color scheme");
        }

        let scheme = scheme.filter(|c| !c.url.trim().is_empty());
        self.injector
            .apply_color_scheme(self.document.as_mut(), skin.name(), scheme.as_ref());
        Ok(())
    }

    /// Turn one optional include on or off for the user.
    ///
    /// Only `key` is written to the user store. The scope is re-applied if it
    /// is currently active (global, or the applied skin).
    pub fn toggle_include(&mut self, scope: &str, key: &str, enabled: bool) -> Result<()> {
        let (author, definitions) = self.scope_definitions(scope)?;
        let known = self
            .includes
            .resolve_scope(scope, author.as_deref(), &definitions)
            .iter()
            .any(|i| i.key == key);
        if !known {
            return Err(SkinError::NotFound(format!(
                "include '{}' in scope '{}'",
                key, scope
            )));
        }

        let prefs = UserPreferences::new(self.user_store.as_ref(), &self.config.storage_keys);
        match prefs.persist_include(key, enabled) {
            Ok(entries) => self.includes.set_user_preferences(entries),
            Err(e) => {
                warn!(include = %key, error = %e, "Failed to persist include toggle");
                self.includes.set_user_preference(key, enabled);
            }
        }

        let active = scope == GLOBAL_SCOPE
            || self.injector.selection().skin.as_deref() == Some(scope);
        if active {
            let resolved = self
                .includes
                .resolve_scope(scope, author.as_deref(), &definitions);
            self.injector
                .apply_optional_includes(self.document.as_mut(), scope, &resolved);
        }
        info!(include = %key, scope = %scope, enabled, "Toggled optional include");
        Ok(())
    }

    /// Re-apply the current selection after navigating to a watched view.
    ///
    /// Returns whether the event was handled.
    pub fn handle_navigation(&mut self, event: &NavigationEvent) -> bool {
        if !self.handlers_registered {
            return false;
        }
        if !self.config.watches_view(&event.view_id) {
            debug!(view = %event.view_id, "Ignoring navigation to unwatched view");
            return false;
        }
        debug!(
            view = %event.view_id,
            container = ?event.container,
            "Re-applying selection after navigation"
        );
        self.apply_current_selection();
        true
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    /// Resolved skins a user can pick from.
    pub fn available_skins(&self) -> Vec<&ResolvedSkin> {
        self.merged
            .resolved
            .iter()
            .filter(|s| !s.entry.is_hidden())
            .collect()
    }

    /// Optional includes of `scope` with their resolved state.
    pub fn include_listing(&self, scope: &str) -> Result<Vec<ResolvedInclude>> {
        let (author, definitions) = self.scope_definitions(scope)?;
        Ok(self
            .includes
            .resolve_scope(scope, author.as_deref(), &definitions))
    }

    pub fn selection(&self) -> &ResolvedSelection {
        self.injector.selection()
    }

    pub fn document(&self) -> &dyn StyleDocument {
        self.document.as_ref()
    }

    pub fn merge_outcome(&self) -> &MergeOutcome {
        &self.merged
    }

    pub fn admin_document(&self) -> &AdminDocument {
        &self.admin
    }

    pub fn major_version(&self) -> Option<u32> {
        self.major_version
    }

    pub fn cleanup_outcome(&self) -> Option<&CleanupOutcome> {
        self.cleanup.as_ref()
    }

    pub fn handlers_registered(&self) -> bool {
        self.handlers_registered
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn expected_selection(&self) -> ExpectedSelection {
        let selection = self.injector.selection();
        let skin_declares_urls = selection
            .skin
            .as_deref()
            .and_then(|name| self.merged.get(name))
            .and_then(|skin| resolve_urls(&skin.entry, self.major_version))
            .is_some_and(|urls| urls.iter().any(|u| !u.trim().is_empty()));
        ExpectedSelection {
            skin: selection.skin.clone(),
            skin_declares_urls,
            theme: selection.theme.clone(),
            color_scheme: selection.color_scheme.clone(),
        }
    }
}

#[async_trait]
impl Settle for SkinEngine {
    fn verify(&self) -> Vec<VerificationIssue> {
        supervisor::verify(self.document.as_ref(), &self.expected_selection())
    }

    async fn reapply(&mut self) {
        self.injector.rebuild_from_document(self.document.as_ref());
        self.refresh().await;
    }
}

/// Feed navigation events into a shared engine until the channel closes.
pub fn spawn_navigation_listener(
    engine: Arc<Mutex<SkinEngine>>,
    mut events: mpsc::Receiver<NavigationEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            engine.lock().await.handle_navigation(&event);
        }
        debug!("Navigation channel closed");
    })
}
