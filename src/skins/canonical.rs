//! Canonical skin comparison for duplicate detection.
//!
//! Two entries are structurally equal when their stylesheet URLs and color
//! schemes match after normalization. `enabled`, `hidden` and every other
//! field are ignored. Normalization strips query and fragment, case-folds,
//! and reduces mirrored `.../<product>/skins/<file>.css` URLs to
//! `<file>.css` so jsDelivr, GitHub Pages and self-hosted copies compare
//! equal.

use std::collections::HashMap;

use serde::Serialize;
use tracing::debug;

use crate::config::{EngineConfig, LegacyOneOff};

use super::selector::unwrap_import;
use super::types::{SkinEntry, SkinUrl};

/// URL normalizer bound to a product path segment.
#[derive(Debug, Clone)]
pub struct Canonicalizer {
    product: String,
}

#[derive(Serialize)]
struct CanonicalSkin {
    urls: Vec<String>,
    color_schemes: Vec<(String, String)>,
}

impl Canonicalizer {
    pub fn new(product_segment: &str) -> Self {
        Self {
            product: product_segment.to_lowercase(),
        }
    }

    /// Normalize one URL for comparison.
    pub fn normalize_url(&self, url: &str) -> String {
        let without_fragment = url.split('#').next().unwrap_or_default();
        let without_query = without_fragment.split('?').next().unwrap_or_default();
        let folded = without_query.trim().to_lowercase();

        let mut segments = folded.rsplit('/');
        if let (Some(file), Some("skins"), Some(product)) =
            (segments.next(), segments.next(), segments.next())
        {
            if product == self.product && file.len() > ".css".len() && file.ends_with(".css") {
                return file.to_string();
            }
        }
        folded
    }

    /// Deterministic string form of the comparable parts of a skin.
    pub fn canonicalize(&self, skin: &SkinEntry) -> String {
        let mut urls: Vec<String> = skin
            .url
            .all_urls()
            .iter()
            .map(|u| self.normalize_url(u))
            .collect();
        urls.sort();

        let mut color_schemes: Vec<(String, String)> = skin
            .color_schemes
            .iter()
            .map(|c| (c.name.clone(), self.normalize_url(&unwrap_import(&c.url))))
            .collect();
        color_schemes.sort();

        serde_json::to_string(&CanonicalSkin {
            urls,
            color_schemes,
        })
        .unwrap_or_default()
    }

    pub fn structurally_equal(&self, a: &SkinEntry, b: &SkinEntry) -> bool {
        self.canonicalize(a) == self.canonicalize(b)
    }
}

/// Decides which administrator entries are legacy duplicates.
#[derive(Debug, Clone)]
pub struct LegacyClassifier {
    canonicalizer: Canonicalizer,
    legacy: HashMap<String, Vec<String>>,
    one_offs: Vec<LegacyOneOff>,
}

impl LegacyClassifier {
    pub fn new(legacy_skins: &[SkinEntry], config: &EngineConfig) -> Self {
        let canonicalizer = Canonicalizer::new(&config.product_segment);
        let mut legacy: HashMap<String, Vec<String>> = HashMap::new();
        for skin in legacy_skins {
            legacy
                .entry(skin.name.clone())
                .or_default()
                .push(canonicalizer.canonicalize(skin));
        }
        Self {
            canonicalizer,
            legacy,
            one_offs: config.legacy_one_offs.clone(),
        }
    }

    /// Whether `entry` should be removed from the admin document.
    pub fn is_prunable(&self, entry: &SkinEntry) -> bool {
        if self.is_one_off(entry) {
            debug!(skin = %entry.name, "Admin entry matches a legacy one-off format");
            return true;
        }
        let Some(candidates) = self.legacy.get(&entry.name) else {
            return false;
        };
        let canonical = self.canonicalizer.canonicalize(entry);
        let duplicate = candidates.iter().any(|c| *c == canonical);
        if duplicate {
            debug!(skin = %entry.name, "Admin entry duplicates a legacy default");
        }
        duplicate
    }

    fn is_one_off(&self, entry: &SkinEntry) -> bool {
        self.one_offs.iter().any(|one_off| {
            one_off.name == entry.name
                && matches!(&entry.url, SkinUrl::Single(url) if *url == one_off.url)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::skins::types::ColorScheme;
    use serde_json::json;

    fn canon() -> Canonicalizer {
        Canonicalizer::new("jellyfin")
    }

    #[test]
    fn test_normalize_strips_query_fragment_and_case() {
        assert_eq!(
            canon().normalize_url("HTTPS://Host/Theme.CSS?v=2#top"),
            "https://host/theme.css"
        );
    }

    #[test]
    fn test_normalize_reduces_mirrored_hosts() {
        let c = canon();
        let jsdelivr = "https://cdn.jsdelivr.net/gh/acme/jellyfin/skins/Ultrachromic.css";
        let pages = "https://acme.github.io/jellyfin/skins/ultrachromic.css?v=3";
        assert_eq!(c.normalize_url(jsdelivr), "ultrachromic.css");
        assert_eq!(c.normalize_url(pages), "ultrachromic.css");
        assert_eq!(
            c.normalize_url("https://other.host/product/skins/ultrachromic.css"),
            "https://other.host/product/skins/ultrachromic.css"
        );
    }

    #[test]
    fn test_canonical_ignores_order_and_enabled() {
        let c = canon();
        let mut a: SkinEntry =
            serde_json::from_value(json!({"name": "A", "url": ["x.css", "y.css"]})).unwrap();
        a.color_schemes = vec![
            ColorScheme {
                name: "Red".into(),
                url: "@import url('red.css');".into(),
            },
            ColorScheme {
                name: "Blue".into(),
                url: "blue.css".into(),
            },
        ];
        let mut b: SkinEntry = serde_json::from_value(
            json!({"name": "A", "url": ["Y.css", "x.css?cache=1"], "enabled": false, "hidden": true}),
        )
        .unwrap();
        b.color_schemes = vec![
            ColorScheme {
                name: "Blue".into(),
                url: "BLUE.css".into(),
            },
            ColorScheme {
                name: "Red".into(),
                url: "red.css".into(),
            },
        ];
        assert!(c.structurally_equal(&a, &b));
    }

    #[test]
    fn test_canonical_detects_difference() {
        let c = canon();
        let a = SkinEntry::new("A", "a.css");
        let b = SkinEntry::new("A", "a2.css");
        assert!(!c.structurally_equal(&a, &b));
    }

    #[test]
    fn test_classifier_legacy_duplicate() {
        let legacy = vec![SkinEntry::new(
            "Ultrachromic",
            "https://cdn.jsdelivr.net/gh/acme/jellyfin/skins/ultrachromic.css",
        )];
        let classifier = LegacyClassifier::new(&legacy, &EngineConfig::default());

        let mirrored = SkinEntry::new(
            "Ultrachromic",
            "https://acme.github.io/jellyfin/skins/ultrachromic.css",
        );
        assert!(classifier.is_prunable(&mirrored));

        let customized = SkinEntry::new("Ultrachromic", "https://self.host/custom.css");
        assert!(!classifier.is_prunable(&customized));

        let other_name = SkinEntry::new(
            "Mine",
            "https://acme.github.io/jellyfin/skins/ultrachromic.css",
        );
        assert!(!classifier.is_prunable(&other_name));
    }

    #[test]
    fn test_classifier_one_off() {
        let classifier = LegacyClassifier::new(&[], &EngineConfig::default());
        assert!(classifier.is_prunable(&SkinEntry::new("Default", "")));
        assert!(!classifier.is_prunable(&SkinEntry::new("Default", "d.css")));
    }
}
