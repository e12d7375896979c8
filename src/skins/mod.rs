//! Skin definitions, merging and URL selection.
//!
//! # Architecture
//!
//! - **types**: Document models (`SkinEntry`, `AdminDocument`, ...)
//! - **canonical**: Normalize-then-compare duplicate detection
//! - **merge**: Defaults + admin overlay + version filter
//! - **selector**: Per-version URL resolution

pub mod canonical;
pub mod merge;
pub mod selector;
pub mod types;

pub use canonical::{Canonicalizer, LegacyClassifier};
pub use merge::{merge_skins, MergeOutcome};
pub use selector::{passes_version_filter, resolve_urls, unwrap_import};
pub use types::{
    parse_admin_document, AdminDocument, ColorScheme, DefaultsDocument, IncludePreference,
    LegacyDocument, OptionalInclude, Provenance, ResolvedSkin, SkinEntry, SkinUrl,
    StoredPreference, Theme, UrlList, VersionedUrls, FALLBACK_SKIN_NAME,
};
