//! URL/version selection.
//!
//! Two related but deliberately different version checks live here:
//!
//! - [`passes_version_filter`] decides whether a whole skin is offered for
//!   selection. A skin that declares no version constraint at all passes.
//! - [`resolve_urls`] picks the stylesheets for a skin. A versioned URL group
//!   that does not list the current major version contributes nothing, and an
//!   unknown major version matches no group.

use once_cell::sync::Lazy;
use regex::Regex;

use super::types::{SkinEntry, SkinUrl};

static IMPORT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)^\s*@import\s+url\(\s*['"]?([^'")]+?)['"]?\s*\)\s*;?\s*$"#)
        .expect("static regex")
});

/// Select the stylesheet URLs for `skin` under `major_version`.
///
/// Returns `None` when the skin uses the versioned schema and no group
/// matches (including when the version is unknown).
pub fn resolve_urls(skin: &SkinEntry, major_version: Option<u32>) -> Option<Vec<String>> {
    match &skin.url {
        SkinUrl::Single(url) if url.is_empty() => Some(Vec::new()),
        SkinUrl::Single(url) => Some(vec![url.clone()]),
        SkinUrl::Flat(urls) => Some(urls.clone()),
        SkinUrl::Versioned(groups) => {
            let major = major_version?;
            let mut matched = false;
            let mut urls = Vec::new();
            for group in groups {
                if group.major_server_versions.contains(&major) {
                    matched = true;
                    urls.extend(group.urls.to_vec());
                }
            }
            matched.then_some(urls)
        }
    }
}

/// Whether the skin declares any version constraint.
pub fn is_version_constrained(skin: &SkinEntry) -> bool {
    let top_level = skin
        .major_server_versions
        .as_ref()
        .is_some_and(|versions| !versions.is_empty());
    let grouped = match &skin.url {
        SkinUrl::Versioned(groups) => groups.iter().any(|g| !g.major_server_versions.is_empty()),
        _ => false,
    };
    top_level || grouped
}

/// Whether the skin is available under `major_version`.
///
/// Unconstrained skins and an unknown version both pass.
pub fn passes_version_filter(skin: &SkinEntry, major_version: Option<u32>) -> bool {
    let Some(major) = major_version else {
        return true;
    };
    if !is_version_constrained(skin) {
        return true;
    }

    let top_level = skin
        .major_server_versions
        .as_ref()
        .is_some_and(|versions| versions.contains(&major));
    let grouped = match &skin.url {
        SkinUrl::Versioned(groups) => groups
            .iter()
            .any(|g| g.major_server_versions.contains(&major)),
        _ => false,
    };
    top_level || grouped
}

/// Unwrap `@import url(...)` to the bare URL. Other input is returned trimmed.
pub fn unwrap_import(url: &str) -> String {
    match IMPORT_RE.captures(url).and_then(|c| c.get(1)) {
        Some(inner) => inner.as_str().trim().to_string(),
        None => url.trim().to_string(),
    }
}
