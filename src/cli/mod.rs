//! CLI commands: resolve, apply, toggle, version.
//!
//! State lives in one directory: config documents under `documents/` (one
//! `<id>.json` per document) and the user store in `user.json`.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context as _, Result};
use serde::de::DeserializeOwned;
use serde_json::json;

use skinmgr::config::EngineConfig;
use skinmgr::document::HeadDocument;
use skinmgr::engine::{InitOutcome, SkinEngine};
use skinmgr::skins::{
    merge_skins, parse_admin_document, AdminDocument, DefaultsDocument, LegacyClassifier,
    LegacyDocument,
};
use skinmgr::storage::{ConfigStore, FileConfigStore, FileUserStore};
use skinmgr::supervisor::SettleOutcome;
use skinmgr::version::{parse_major_version, HostInfo, StaticHost};

/// Resolved CLI settings.
pub(crate) struct Context {
    config: EngineConfig,
    state_dir: PathBuf,
}

/// Selection changes requested on the command line.
pub(crate) struct Switches {
    pub skin: Option<String>,
    pub theme: Option<String>,
    pub color_scheme: Option<String>,
}

impl Context {
    pub(crate) fn load(config_path: Option<PathBuf>, state_dir: Option<PathBuf>) -> Result<Self> {
        let path = config_path.unwrap_or_else(EngineConfig::path);
        let config = EngineConfig::load(&path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?;
        let state_dir = state_dir.unwrap_or_else(|| EngineConfig::dir().join("state"));
        Ok(Self { config, state_dir })
    }

    fn config_store(&self) -> FileConfigStore {
        FileConfigStore::new(self.state_dir.join("documents"))
    }

    fn user_store(&self) -> Result<FileUserStore> {
        let path = self.state_dir.join("user.json");
        FileUserStore::open(path.clone())
            .with_context(|| format!("Failed to open user store {}", path.display()))
    }

    /// Build and initialize an engine on a fresh document.
    async fn engine(&self, server_version: Option<String>) -> Result<SkinEngine> {
        let mut config = self.config.clone();
        let host: Arc<dyn HostInfo> = match server_version {
            Some(version) => Arc::new(StaticHost::server(version)),
            None => {
                // Nothing to poll for; skip straight to ungated mode.
                config.version_poll_timeout_ms = 0;
                Arc::new(StaticHost::default())
            }
        };

        let mut engine = SkinEngine::new(
            config,
            Arc::new(self.config_store()),
            Arc::new(self.user_store()?),
            host,
            Box::new(HeadDocument::new()),
        );
        if let InitOutcome::Completed(SettleOutcome::GaveUp { issues, .. }) = engine.init().await {
            for issue in issues {
                eprintln!("warning: {}", issue);
            }
        }
        Ok(engine)
    }
}

async fn read_document<T: DeserializeOwned>(store: &FileConfigStore, id: &str) -> Result<Option<T>> {
    let Some(value) = store
        .get(id)
        .await
        .with_context(|| format!("Failed to read document '{}'", id))?
    else {
        return Ok(None);
    };
    let document = serde_json::from_value(value)
        .with_context(|| format!("Invalid document '{}'", id))?;
    Ok(Some(document))
}

fn print_document(engine: &SkinEngine) {
    println!(
        "Skin: {}",
        engine.selection().skin.as_deref().unwrap_or("(none)")
    );
    if let Some(major) = engine.major_version() {
        println!("Major version: {}", major);
    }
    if let Some(outcome) = engine.cleanup_outcome() {
        println!("Cleanup: {:?}", outcome);
    }
    println!();
    for link in engine.document().engine_links() {
        let category = link.category.map(|c| c.to_string()).unwrap_or_default();
        println!(
            "{:<16} {:<24} {}",
            category,
            link.owner.as_deref().unwrap_or("-"),
            link.href
        );
    }
}

pub(crate) async fn cmd_resolve(ctx: &Context, server_version: Option<String>) -> Result<()> {
    let store = ctx.config_store();
    let defaults: DefaultsDocument = read_document(&store, &ctx.config.defaults_id)
        .await?
        .unwrap_or_default();
    let legacy: LegacyDocument = read_document(&store, &ctx.config.legacy_defaults_id)
        .await?
        .unwrap_or_default();
    let admin = match store
        .get(&ctx.config.plugin_id)
        .await
        .with_context(|| "Failed to read admin document")?
    {
        Some(value) => parse_admin_document(&value.to_string())?,
        None => AdminDocument::default(),
    };

    let major = server_version.as_deref().and_then(parse_major_version);
    let classifier = LegacyClassifier::new(&legacy.skins, &ctx.config);
    let outcome = merge_skins(&defaults.skins, &admin.skins, &classifier, major);

    let report = json!({
        "majorVersion": major,
        "skins": outcome.resolved,
        "toPrune": outcome.to_prune,
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

pub(crate) async fn cmd_apply(
    ctx: &Context,
    server_version: Option<String>,
    switches: Switches,
) -> Result<()> {
    let mut engine = ctx.engine(server_version).await?;

    if let Some(theme) = switches.theme.as_deref() {
        engine
            .switch_theme(Some(theme))
            .with_context(|| format!("Cannot switch to theme '{}'", theme))?;
    }
    if let Some(skin) = switches.skin.as_deref() {
        engine
            .switch_skin(skin)
            .with_context(|| format!("Cannot switch to skin '{}'", skin))?;
    }
    if let Some(scheme) = switches.color_scheme.as_deref() {
        engine
            .switch_color_scheme(Some(scheme))
            .with_context(|| format!("Cannot switch to color scheme '{}'", scheme))?;
    }

    print_document(&engine);
    Ok(())
}

pub(crate) async fn cmd_toggle(
    ctx: &Context,
    server_version: Option<String>,
    scope: &str,
    key: &str,
    enabled: bool,
) -> Result<()> {
    let mut engine = ctx.engine(server_version).await?;
    engine
        .toggle_include(scope, key, enabled)
        .with_context(|| format!("Cannot toggle '{}'", key))?;

    for include in engine.include_listing(scope)? {
        println!(
            "[{}] {:<40} {:?}",
            if include.enabled { "x" } else { " " },
            include.key,
            include.source
        );
    }
    Ok(())
}

pub(crate) fn cmd_version(version: &str) -> Result<()> {
    match parse_major_version(version) {
        Some(major) => {
            println!("{}", major);
            Ok(())
        }
        None => bail!("No major version in '{}'", version),
    }
}
