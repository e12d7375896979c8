//! skinmgr - skin, theme and optional-include engine for media server web clients
//!
//! Merges shipped default skins with an administrator's configuration,
//! prunes legacy duplicates, selects stylesheets for the host's major
//! version and keeps a document's stylesheet links in cascade order.

pub mod cleanup;
pub mod config;
pub mod document;
pub mod engine;
pub mod error;
pub mod includes;
pub mod injector;
pub mod preferences;
pub mod skins;
pub mod storage;
pub mod supervisor;
pub mod version;

pub use config::EngineConfig;
pub use document::{HeadDocument, LinkCategory, StyleDocument};
pub use engine::{spawn_navigation_listener, InitOutcome, NavigationEvent, SkinEngine};
pub use error::{Result, SkinError};
pub use skins::{merge_skins, MergeOutcome, ResolvedSkin, SkinEntry};
pub use storage::{ConfigStore, FileConfigStore, FileUserStore, UserStore};
pub use version::{HostInfo, StaticHost, VersionResolver};
