//! End-to-end engine behaviour against in-memory stores.

use std::sync::Arc;

use serde_json::{json, Value};
use tokio_test::assert_ok;

use skinmgr::cleanup::CleanupOutcome;
use skinmgr::config::EngineConfig;
use skinmgr::document::{HeadDocument, LinkCategory};
use skinmgr::engine::{InitOutcome, SkinEngine};
use skinmgr::includes::{derive_key, GLOBAL_SCOPE};
use skinmgr::storage::{ConfigStore, MemoryConfigStore, MemoryUserStore, UserStore};
use skinmgr::version::{HostInfo, StaticHost};

const OVERLAY_KEY: &str = "global-acme-overlay.css";

fn store(defaults: Value, admin: Option<Value>, legacy: Option<Value>) -> Arc<MemoryConfigStore> {
    let config = EngineConfig::default();
    let mut documents = vec![(config.defaults_id.clone(), defaults)];
    if let Some(admin) = admin {
        documents.push((config.plugin_id.clone(), admin));
    }
    if let Some(legacy) = legacy {
        documents.push((config.legacy_defaults_id.clone(), legacy));
    }
    Arc::new(MemoryConfigStore::with_documents(documents))
}

fn engine_on(
    store: &Arc<MemoryConfigStore>,
    user: &Arc<MemoryUserStore>,
    host: Arc<dyn HostInfo>,
) -> SkinEngine {
    SkinEngine::new(
        EngineConfig::default(),
        store.clone(),
        user.clone(),
        host,
        Box::new(HeadDocument::new()),
    )
}

fn server(version: &str) -> Arc<dyn HostInfo> {
    Arc::new(StaticHost::server(version))
}

fn links_of(engine: &SkinEngine, category: LinkCategory) -> Vec<String> {
    engine
        .document()
        .links()
        .into_iter()
        .filter(|l| l.is(category))
        .map(|l| l.href)
        .collect()
}

fn two_skin_defaults() -> Value {
    json!({
        "skins": [
            {"name": "A", "url": "https://cdn.example/a1.css"},
            {"name": "B", "url": "https://cdn.example/b.css"}
        ],
        "globalOptionalIncludes": [
            {"name": "Overlay", "url": "https://cdn.example/x/overlay.css?v=2", "author": "acme", "enabled": true}
        ]
    })
}

#[tokio::test]
async fn admin_replacement_yields_single_skin_link() {
    let store = store(
        two_skin_defaults(),
        Some(json!({"skins": [{"name": "A", "url": "https://cdn.example/a2.css"}]})),
        None,
    );
    let user = Arc::new(MemoryUserStore::new());
    user.set(&EngineConfig::default().storage_keys.selected_skin, "A")
        .unwrap();

    let mut engine = engine_on(&store, &user, server("10.10.3"));
    assert!(matches!(engine.init().await, InitOutcome::Completed(ref o) if o.is_settled()));

    let skins = links_of(&engine, LinkCategory::Skin);
    assert_eq!(skins.len(), 1);
    assert!(skins[0].ends_with("a2.css"));
}

#[tokio::test]
async fn toggled_off_include_survives_skin_switches() {
    let store = store(two_skin_defaults(), None, None);
    let user = Arc::new(MemoryUserStore::new());
    let mut engine = engine_on(&store, &user, server("10.10.3"));
    engine.init().await;

    assert_eq!(
        links_of(&engine, LinkCategory::OptionalInclude),
        vec!["https://cdn.example/x/overlay.css?v=2"]
    );

    assert_ok!(engine.toggle_include(GLOBAL_SCOPE, OVERLAY_KEY, false));
    assert!(links_of(&engine, LinkCategory::OptionalInclude).is_empty());

    assert_ok!(engine.switch_skin("B"));
    assert_ok!(engine.switch_skin("A"));
    assert!(links_of(&engine, LinkCategory::OptionalInclude).is_empty());
    assert_eq!(
        links_of(&engine, LinkCategory::Skin),
        vec!["https://cdn.example/a1.css"]
    );

    let stored = user
        .get(&EngineConfig::default().storage_keys.optional_includes)
        .unwrap();
    let stored: Value = serde_json::from_str(&stored).unwrap();
    assert_eq!(
        stored,
        json!({"optionalIncludes": [{"key": OVERLAY_KEY, "enabled": false}]})
    );

    // A fresh session reads the same preference.
    let mut reloaded = engine_on(&store, &user, server("10.10.3"));
    reloaded.init().await;
    assert!(links_of(&reloaded, LinkCategory::OptionalInclude).is_empty());
}

#[tokio::test]
async fn user_preference_beats_admin_preference() {
    let store = store(
        two_skin_defaults(),
        Some(json!({
            "optionalIncludes": [{"key": OVERLAY_KEY, "enabled": false}]
        })),
        None,
    );
    let user = Arc::new(MemoryUserStore::new());
    let mut engine = engine_on(&store, &user, server("10.10.3"));
    engine.init().await;
    assert!(links_of(&engine, LinkCategory::OptionalInclude).is_empty());

    assert_ok!(engine.toggle_include(GLOBAL_SCOPE, OVERLAY_KEY, true));
    assert_eq!(links_of(&engine, LinkCategory::OptionalInclude).len(), 1);

    let listing = engine.include_listing(GLOBAL_SCOPE).unwrap();
    assert!(listing[0].enabled);
}

#[tokio::test]
async fn legacy_user_preferences_are_migrated() {
    let store = store(
        two_skin_defaults(),
        Some(json!({
            "optionalIncludes": [{"key": OVERLAY_KEY, "enabled": false}]
        })),
        None,
    );
    let user = Arc::new(MemoryUserStore::new());
    let key = EngineConfig::default().storage_keys.optional_includes;
    user.set(&key, &json!({"optionalIncludes": [OVERLAY_KEY]}).to_string())
        .unwrap();

    let mut engine = engine_on(&store, &user, server("10.10.3"));
    engine.init().await;

    assert_eq!(links_of(&engine, LinkCategory::OptionalInclude).len(), 1);
    let stored: Value = serde_json::from_str(&user.get(&key).unwrap()).unwrap();
    assert_eq!(
        stored,
        json!({"optionalIncludes": [{"key": OVERLAY_KEY, "enabled": true}]})
    );
}

#[test]
fn include_keys_are_stable_across_mirrors() {
    let jsdelivr = derive_key(
        GLOBAL_SCOPE,
        Some("acme"),
        "https://cdn.jsdelivr.net/gh/acme/jellyfin/overlay.css",
    );
    let pages = derive_key(
        GLOBAL_SCOPE,
        Some("acme"),
        "@import url('https://acme.github.io/jellyfin/overlay.css?v=3');",
    );
    assert_eq!(jsdelivr, OVERLAY_KEY);
    assert_eq!(jsdelivr, pages);
}

fn versioned_defaults() -> Value {
    json!({
        "skins": [
            {
                "name": "Modern",
                "url": [
                    {"majorServerVersions": [10], "urls": ["m10.css"]},
                    {"majorServerVersions": [11], "urls": ["m11a.css", "m11b.css"]}
                ]
            },
            {"name": "Old", "url": "old.css", "majorServerVersions": [10]}
        ]
    })
}

#[tokio::test]
async fn version_gating_selects_matching_urls() {
    let store = store(versioned_defaults(), None, None);
    let user = Arc::new(MemoryUserStore::new());

    let mut eleven = engine_on(&store, &user, server("10.11.2"));
    eleven.init().await;
    let names: Vec<&str> = eleven.available_skins().iter().map(|s| s.name()).collect();
    assert_eq!(names, vec!["Modern"]);
    assert_eq!(
        links_of(&eleven, LinkCategory::Skin),
        vec!["m11a.css", "m11b.css"]
    );

    let mut ten = engine_on(&store, &user, server("10.10.0"));
    ten.init().await;
    assert_eq!(ten.available_skins().len(), 2);
    assert_eq!(links_of(&ten, LinkCategory::Skin), vec!["m10.css"]);
}

#[tokio::test(start_paused = true)]
async fn unknown_version_lists_everything_but_injects_no_versioned_urls() {
    let store = store(versioned_defaults(), None, None);
    let user = Arc::new(MemoryUserStore::new());

    let mut engine = engine_on(&store, &user, Arc::new(StaticHost::default()));
    let outcome = engine.init().await;

    assert!(matches!(outcome, InitOutcome::Completed(ref o) if o.is_settled()));
    assert_eq!(engine.major_version(), None);
    assert_eq!(engine.available_skins().len(), 2);
    assert_eq!(engine.selection().skin.as_deref(), Some("Modern"));
    assert!(links_of(&engine, LinkCategory::Skin).is_empty());

    assert_ok!(engine.switch_skin("Old"));
    assert_eq!(links_of(&engine, LinkCategory::Skin), vec!["old.css"]);
}

#[tokio::test]
async fn pruning_is_backed_up_and_idempotent() {
    let legacy = json!({
        "skins": [{
            "name": "Ultrachromic",
            "url": "https://cdn.jsdelivr.net/gh/acme/jellyfin/skins/ultrachromic.css"
        }]
    });
    let admin = json!({
        "skins": [
            {"name": "Ultrachromic", "url": "https://acme.github.io/jellyfin/skins/Ultrachromic.css?v=1"},
            {"name": "Default", "url": ""},
            {"name": "Mine", "url": "mine.css"}
        ],
        "customField": 42
    });
    let store = store(two_skin_defaults(), Some(admin), Some(legacy));
    let user = Arc::new(MemoryUserStore::new());
    let plugin_id = EngineConfig::default().plugin_id;

    let mut first = engine_on(&store, &user, server("10.10.3"));
    first.init().await;
    assert!(matches!(
        first.cleanup_outcome(),
        Some(CleanupOutcome::Pruned { removed: 2, .. })
    ));

    let ids = store.list().await.unwrap();
    let backups: Vec<&String> = ids
        .iter()
        .filter(|id| id.starts_with(&format!("{}.backup.", plugin_id)))
        .collect();
    assert_eq!(backups.len(), 1);
    let backup = store.get(backups[0]).await.unwrap().unwrap();
    assert_eq!(backup["enabled"], json!(false));
    assert_eq!(backup["document"]["skins"].as_array().unwrap().len(), 3);

    let pruned = store.get(&plugin_id).await.unwrap().unwrap();
    let remaining = pruned["skins"].as_array().unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0]["name"], json!("Mine"));
    assert_eq!(pruned["customField"], json!(42));

    let mut second = engine_on(&store, &user, server("10.10.3"));
    second.init().await;
    assert!(second.cleanup_outcome().is_none());
    assert_eq!(store.list().await.unwrap(), ids);
    assert_eq!(store.get(&plugin_id).await.unwrap().unwrap(), pruned);
}
