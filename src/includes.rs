//! Optional-include resolution.
//!
//! Every optional include is identified by a derived key,
//! `{scope}-{author}-{filename}`, which joins the shipped definition with the
//! administrator and per-user override lists. The key only depends on the
//! last path segment of the URL, so moving a stylesheet between hosts keeps
//! every stored toggle.
//!
//! Resolution order, first match wins:
//!
//! 1. per-user preference
//! 2. administrator preference
//! 3. shipped default

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use crate::skins::{unwrap_import, IncludePreference, OptionalInclude};

/// Scope name for includes that apply to every skin.
pub const GLOBAL_SCOPE: &str = "global";

const UNKNOWN_AUTHOR: &str = "unknown";

static WHITESPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("static regex"));

/// Replace whitespace runs with `_`. Case is preserved.
pub fn normalize_key_segment(segment: &str) -> String {
    WHITESPACE_RE.replace_all(segment, "_").into_owned()
}

/// Final path segment of `url`, without query or fragment.
pub fn filename_from_url(url: &str) -> String {
    let url = unwrap_import(url);
    let without_fragment = url.split('#').next().unwrap_or_default();
    let without_query = without_fragment.split('?').next().unwrap_or_default();
    without_query
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or_default()
        .to_string()
}

/// Derive the stable identity of an optional include.
pub fn derive_key(scope: &str, author: Option<&str>, url: &str) -> String {
    let author = author
        .map(str::trim)
        .filter(|a| !a.is_empty())
        .unwrap_or(UNKNOWN_AUTHOR);
    format!(
        "{}-{}-{}",
        normalize_key_segment(scope),
        normalize_key_segment(author),
        filename_from_url(url)
    )
}

/// Look `key` up in ordered layers; the first layer that mentions it wins.
pub fn resolve(key: &str, layers: &[&[IncludePreference]]) -> Option<bool> {
    layers
        .iter()
        .find_map(|layer| layer.iter().find(|p| p.key == key).map(|p| p.enabled))
}

/// Which layer decided an include's state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PreferenceSource {
    User,
    Admin,
    Default,
}

/// An include definition annotated with its key and resolved state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedInclude {
    pub key: String,
    pub name: String,
    /// Stylesheet URL with any `@import url(...)` wrapper removed.
    pub url: String,
    pub scope: String,
    pub enabled: bool,
    pub source: PreferenceSource,
}

/// Three-layer precedence over optional includes.
#[derive(Debug, Clone, Default)]
pub struct IncludeResolver {
    user: Vec<IncludePreference>,
    admin: Vec<IncludePreference>,
}

impl IncludeResolver {
    pub fn new(user: Vec<IncludePreference>, admin: Vec<IncludePreference>) -> Self {
        Self { user, admin }
    }

    pub fn user_preferences(&self) -> &[IncludePreference] {
        &self.user
    }

    /// Replace the user layer, e.g. after re-reading the store.
    pub fn set_user_preferences(&mut self, user: Vec<IncludePreference>) {
        self.user = user;
    }

    /// Update one user entry in place, or append it.
    pub fn set_user_preference(&mut self, key: &str, enabled: bool) {
        upsert_preference(&mut self.user, key, enabled);
    }

    pub fn is_enabled(&self, key: &str, default_enabled: bool) -> bool {
        self.lookup(key, default_enabled).0
    }

    fn lookup(&self, key: &str, default_enabled: bool) -> (bool, PreferenceSource) {
        if let Some(enabled) = resolve(key, &[&self.user]) {
            return (enabled, PreferenceSource::User);
        }
        if let Some(enabled) = resolve(key, &[&self.admin]) {
            return (enabled, PreferenceSource::Admin);
        }
        (default_enabled, PreferenceSource::Default)
    }

    /// Resolve every definition in `scope`.
    ///
    /// `author` is used for definitions that do not name their own author.
    pub fn resolve_scope(
        &self,
        scope: &str,
        author: Option<&str>,
        definitions: &[OptionalInclude],
    ) -> Vec<ResolvedInclude> {
        definitions
            .iter()
            .map(|def| {
                let def_author = def.author.as_deref().or(author);
                let key = derive_key(scope, def_author, &def.url);
                let (enabled, source) = self.lookup(&key, def.enabled);
                ResolvedInclude {
                    key,
                    name: def.name.clone(),
                    url: unwrap_import(&def.url),
                    scope: scope.to_string(),
                    enabled,
                    source,
                }
            })
            .collect()
    }
}

/// Update `key` in place or append it, leaving every other entry untouched.
pub fn upsert_preference(list: &mut Vec<IncludePreference>, key: &str, enabled: bool) {
    match list.iter_mut().find(|p| p.key == key) {
        Some(existing) => existing.enabled = enabled,
        None => list.push(IncludePreference {
            key: key.to_string(),
            enabled,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pref(key: &str, enabled: bool) -> IncludePreference {
        IncludePreference {
            key: key.to_string(),
            enabled,
        }
    }

    fn include(name: &str, url: &str, enabled: bool) -> OptionalInclude {
        OptionalInclude {
            name: name.to_string(),
            url: url.to_string(),
            enabled,
            author: None,
        }
    }

    #[test]
    fn test_derive_key_format() {
        assert_eq!(
            derive_key("global", Some("acme"), "https://cdn.example/overlay.css?v=1#x"),
            "global-acme-overlay.css"
        );
        assert_eq!(
            derive_key("Kaleido Chromic", Some("Some  Author"), "a/b/c.css"),
            "Kaleido_Chromic-Some_Author-c.css"
        );
        assert_eq!(derive_key("global", None, "x.css"), "global-unknown-x.css");
    }

    #[test]
    fn test_key_stable_across_hosts() {
        let urls = [
            "https://cdn.jsdelivr.net/gh/acme/jellyfin/skins/overlay.css",
            "https://acme.github.io/jellyfin/skins/overlay.css",
            "https://media.local/static/jellyfin/skins/overlay.css?rev=9",
            "@import url('https://elsewhere.net/jellyfin/skins/overlay.css');",
        ];
        let keys: Vec<String> = urls
            .iter()
            .map(|u| derive_key("global", Some("acme"), u))
            .collect();
        assert!(keys.iter().all(|k| k == "global-acme-overlay.css"));
    }

    #[test]
    fn test_scope_distinguishes_keys() {
        let global = derive_key(GLOBAL_SCOPE, Some("acme"), "overlay.css");
        let scoped = derive_key("Ultrachromic", Some("acme"), "overlay.css");
        assert_ne!(global, scoped);
    }

    #[test]
    fn test_resolve_first_layer_wins() {
        let user = vec![pref("k", false)];
        let admin = vec![pref("k", true), pref("other", true)];
        assert_eq!(resolve("k", &[&user, &admin]), Some(false));
        assert_eq!(resolve("other", &[&user, &admin]), Some(true));
        assert_eq!(resolve("missing", &[&user, &admin]), None);
    }

    #[test]
    fn test_user_beats_admin_beats_default() {
        let resolver = IncludeResolver::new(vec![pref("a", false)], vec![pref("a", true), pref("b", false)]);
        assert!(!resolver.is_enabled("a", true));
        assert!(!resolver.is_enabled("b", true));
        assert!(resolver.is_enabled("c", true));
        assert!(!resolver.is_enabled("c", false));
    }

    #[test]
    fn test_resolve_scope_annotates() {
        let resolver = IncludeResolver::new(vec![pref("Skin-acme-b.css", true)], vec![]);
        let defs = vec![
            include("A", "@import url(\"https://x/a.css\");", true),
            include("B", "https://x/b.css", false),
        ];
        let resolved = resolver.resolve_scope("Skin", Some("acme"), &defs);
        assert_eq!(resolved[0].key, "Skin-acme-a.css");
        assert_eq!(resolved[0].url, "https://x/a.css");
        assert_eq!(resolved[0].source, PreferenceSource::Default);
        assert!(resolved[0].enabled);
        assert!(resolved[1].enabled);
        assert_eq!(resolved[1].source, PreferenceSource::User);
    }

    #[test]
    fn test_definition_author_overrides_scope_author() {
        let resolver = IncludeResolver::default();
        let mut def = include("Overlay", "overlay.css", false);
        def.author = Some("acme".to_string());
        let resolved = resolver.resolve_scope(GLOBAL_SCOPE, Some("someone"), &[def]);
        assert_eq!(resolved[0].key, "global-acme-overlay.css");
    }

    #[test]
    fn test_upsert_preserves_other_entries() {
        let mut list = vec![pref("a", true), pref("b", true)];
        upsert_preference(&mut list, "b", false);
        upsert_preference(&mut list, "c", true);
        assert_eq!(list, vec![pref("a", true), pref("b", false), pref("c", true)]);
    }
}
