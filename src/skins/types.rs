//! Skin document type definitions.
//!
//! These mirror the JSON documents exchanged with the configuration store:
//! the shipped defaults, the administrator document and the legacy snapshot.
//! Unknown fields on skins and on the admin document are kept in `extra` so
//! that a pruned document can be written back without losing data.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

use crate::error::{Result, SkinError};

fn default_true() -> bool {
    true
}

/// One or more URLs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UrlList {
    One(String),
    Many(Vec<String>),
}

impl Default for UrlList {
    fn default() -> Self {
        Self::Many(Vec::new())
    }
}

impl UrlList {
    /// Flatten to an owned list, preserving order.
    pub fn to_vec(&self) -> Vec<String> {
        match self {
            Self::One(url) => vec![url.clone()],
            Self::Many(urls) => urls.clone(),
        }
    }
}

/// URLs valid for a set of host major versions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionedUrls {
    #[serde(default)]
    pub major_server_versions: Vec<u32>,
    #[serde(default)]
    pub urls: UrlList,
}

/// The `url` field of a skin, in any of its three schemas.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SkinUrl {
    /// A single stylesheet URL.
    Single(String),
    /// Legacy flat list.
    Flat(Vec<String>),
    /// Version-gated URL groups.
    Versioned(Vec<VersionedUrls>),
}

impl Default for SkinUrl {
    fn default() -> Self {
        Self::Single(String::new())
    }
}

impl SkinUrl {
    /// Every URL regardless of version, in declared order.
    pub fn all_urls(&self) -> Vec<String> {
        match self {
            Self::Single(url) if url.is_empty() => Vec::new(),
            Self::Single(url) => vec![url.clone()],
            Self::Flat(urls) => urls.clone(),
            Self::Versioned(groups) => groups.iter().flat_map(|g| g.urls.to_vec()).collect(),
        }
    }
}

/// A palette variant within a skin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColorScheme {
    pub name: String,
    /// May be wrapped as `@import url(...)`.
    pub url: String,
}

/// An independently toggleable stylesheet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionalInclude {
    pub name: String,
    pub url: String,
    /// Shipped default state.
    #[serde(default)]
    pub enabled: bool,
    /// Global includes name their author; skin includes inherit the skin's.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
}

/// A skin definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkinEntry {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default)]
    pub url: SkinUrl,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub color_schemes: Vec<ColorScheme>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub optional_includes: Vec<OptionalInclude>,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hidden: Option<bool>,
    /// Legacy top-level version gate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub major_server_versions: Option<Vec<u32>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl SkinEntry {
    /// Convenience constructor for a single-URL skin.
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            author: None,
            url: SkinUrl::Single(url.into()),
            color_schemes: Vec::new(),
            optional_includes: Vec::new(),
            enabled: true,
            hidden: None,
            major_server_versions: None,
            extra: Map::new(),
        }
    }

    /// The stylesheet-less skin used when nothing else is configured.
    pub fn fallback() -> Self {
        Self::new(FALLBACK_SKIN_NAME, "")
    }

    pub fn is_hidden(&self) -> bool {
        self.hidden.unwrap_or(false)
    }

    pub fn color_scheme(&self, name: &str) -> Option<&ColorScheme> {
        self.color_schemes.iter().find(|c| c.name == name)
    }
}

/// Name of the synthesized fallback skin.
pub const FALLBACK_SKIN_NAME: &str = "Default";

/// Where a resolved skin came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provenance {
    /// Shipped default, untouched.
    Default,
    /// Administrator addition.
    Custom,
    /// Administrator replacement of a shipped default.
    Overridden,
}

/// A skin after merging, tagged with its provenance.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedSkin {
    #[serde(flatten)]
    pub entry: SkinEntry,
    pub provenance: Provenance,
}

impl ResolvedSkin {
    pub fn name(&self) -> &str {
        &self.entry.name
    }
}

/// A selectable custom theme.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Theme {
    pub name: String,
    pub url: String,
}

/// A `{key, enabled}` override for one optional include.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncludePreference {
    pub key: String,
    pub enabled: bool,
}

/// A stored override, in either the current or the legacy bare-key form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StoredPreference {
    Entry(IncludePreference),
    /// Legacy: presence of the key meant "enabled".
    Key(String),
}

impl StoredPreference {
    /// Normalize to the object form.
    pub fn into_entry(self) -> IncludePreference {
        match self {
            Self::Entry(entry) => entry,
            Self::Key(key) => IncludePreference { key, enabled: true },
        }
    }

    pub fn is_legacy(&self) -> bool {
        matches!(self, Self::Key(_))
    }
}

/// Administrator-owned configuration document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminDocument {
    #[serde(default)]
    pub skins: Vec<SkinEntry>,
    #[serde(default)]
    pub themes: Vec<Theme>,
    #[serde(default)]
    pub default_skin: Option<String>,
    #[serde(default)]
    pub optional_includes: Vec<StoredPreference>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl AdminDocument {
    pub fn theme(&self, name: &str) -> Option<&Theme> {
        self.themes.iter().find(|t| t.name == name)
    }
}

/// Shipped, read-only defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DefaultsDocument {
    #[serde(default)]
    pub skins: Vec<SkinEntry>,
    #[serde(default)]
    pub global_optional_includes: Vec<OptionalInclude>,
}

/// Canonical historical snapshot, only used for duplicate detection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LegacyDocument {
    #[serde(default)]
    pub skins: Vec<SkinEntry>,
}

/// Parse an administrator document on a best-effort basis.
///
/// The top level must be a JSON object. Skin entries that fail to parse are
/// skipped with a warning rather than failing the whole document; any other
/// malformed field is a [`SkinError::Parse`].
pub fn parse_admin_document(raw: &str) -> Result<AdminDocument> {
    let value: Value =
        serde_json::from_str(raw).map_err(|e| SkinError::Parse(format!("admin document: {}", e)))?;
    let Value::Object(mut object) = value else {
        return Err(SkinError::Parse(
            "admin document must be a JSON object".to_string(),
        ));
    };

    let raw_skins = match object.remove("skins") {
        Some(Value::Array(items)) => items,
        Some(Value::Null) | None => Vec::new(),
        Some(_) => {
            return Err(SkinError::Parse("'skins' must be an array".to_string()));
        }
    };

    let mut document: AdminDocument = serde_json::from_value(Value::Object(object))
        .map_err(|e| SkinError::Parse(format!("admin document: {}", e)))?;

    for (index, item) in raw_skins.into_iter().enumerate() {
        match serde_json::from_value::<SkinEntry>(item) {
            Ok(skin) => document.skins.push(skin),
            Err(e) => warn!(index, error = %e, "Skipping unparseable admin skin entry"),
        }
    }

    Ok(document)
}
