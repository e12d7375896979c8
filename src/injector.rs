//! Resource injection.
//!
//! Applies theme, skin, color scheme and optional-include stylesheets to a
//! [`StyleDocument`] while keeping the cascade order
//! `theme -> skin -> color scheme -> optional includes`.
//!
//! Every operation re-reads the document before deciding what to insert or
//! remove, so a newer request always supersedes an older one. New links are
//! inserted before stale ones are removed; the two sets never share a URL.

use std::collections::{BTreeSet, HashSet};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::document::{InsertPosition, LinkCategory, LinkId, NewLink, StyleDocument, StyleLink};
use crate::error::SkinError;
use crate::includes::ResolvedInclude;
use crate::skins::{resolve_urls, unwrap_import, ColorScheme, ResolvedSkin, Theme};

/// A URL the engine currently has in the document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InjectedUrl {
    pub url: String,
    pub category: LinkCategory,
    pub owner: Option<String>,
}

/// What is currently applied.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ResolvedSelection {
    pub skin: Option<String>,
    pub color_scheme: Option<String>,
    pub theme: Option<String>,
    pub enabled_includes: BTreeSet<String>,
    /// Mirrors the engine-owned links of the document, in order.
    pub injected: Vec<InjectedUrl>,
}

impl ResolvedSelection {
    pub fn urls(&self, category: LinkCategory) -> Vec<&str> {
        self.injected
            .iter()
            .filter(|i| i.category == category)
            .map(|i| i.url.as_str())
            .collect()
    }
}

/// Result of [`Injector::apply_skin`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkinApplication {
    /// Skin already applied; nothing touched.
    Unchanged,
    /// Links switched to the new skin.
    Applied,
    /// No URLs for the current host version; previous links removed.
    NoResources,
}

/// Where a link of `category` should go so that cascade order holds.
///
/// After the last link of the same or the nearest preceding category,
/// otherwise before the first link of a later category, otherwise appended.
pub fn insertion_point(links: &[StyleLink], category: LinkCategory) -> InsertPosition {
    for candidate in LinkCategory::ORDER[..=category.rank()].iter().rev() {
        if let Some(last) = links.iter().rev().find(|l| l.is(*candidate)) {
            return InsertPosition::After(last.id);
        }
    }
    links
        .iter()
        .find(|l| l.category.is_some_and(|c| c.rank() > category.rank()))
        .map(|l| InsertPosition::Before(l.id))
        .unwrap_or(InsertPosition::Append)
}

fn dedup_preserving_order(urls: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    urls.into_iter()
        .filter(|u| !u.trim().is_empty() && seen.insert(u.clone()))
        .collect()
}

/// Applies selections to a document and tracks what is injected.
#[derive(Debug, Default)]
pub struct Injector {
    selection: ResolvedSelection,
}

impl Injector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn selection(&self) -> &ResolvedSelection {
        &self.selection
    }

    /// Rebuild the tracked URL set from the document.
    pub fn rebuild_from_document(&mut self, doc: &dyn StyleDocument) {
        self.selection.injected = doc
            .engine_links()
            .into_iter()
            .filter_map(|l| {
                l.category.map(|category| InjectedUrl {
                    url: l.href,
                    category,
                    owner: l.owner,
                })
            })
            .collect();
    }

    /// Forget everything, including which skin is selected.
    pub fn reset(&mut self, doc: &dyn StyleDocument) {
        self.selection = ResolvedSelection::default();
        self.rebuild_from_document(doc);
    }

    /// Apply (or clear) the custom theme.
    pub fn apply_theme(&mut self, doc: &mut dyn StyleDocument, theme: Option<&Theme>) {
        let target = theme.map(|t| unwrap_import(&t.url)).filter(|u| !u.is_empty());
        self.replace_single(doc, LinkCategory::Theme, None, target.as_deref());
        self.selection.theme = theme.map(|t| t.name.clone());
        self.rebuild_from_document(doc);
    }

    /// Apply (or clear) the color scheme of `skin_name`.
    pub fn apply_color_scheme(
        &mut self,
        doc: &mut dyn StyleDocument,
        skin_name: &str,
        scheme: Option<&ColorScheme>,
    ) {
        let target = scheme.map(|c| unwrap_import(&c.url)).filter(|u| !u.is_empty());
        self.replace_single(doc, LinkCategory::ColorScheme, Some(skin_name), target.as_deref());
        self.selection.color_scheme = scheme.map(|c| c.name.clone());
        self.rebuild_from_document(doc);
    }

    /// Switch the document to `skin`.
    ///
    /// Re-applying the skin that is already in place is a no-op that keeps
    /// the existing link elements. Switching away removes the previous
    /// skin's links and its skin-scoped optional includes.
    pub fn apply_skin(
        &mut self,
        doc: &mut dyn StyleDocument,
        skin: &ResolvedSkin,
        major_version: Option<u32>,
    ) -> SkinApplication {
        let name = skin.name().to_string();
        let links = doc.links();
        let current: Vec<&StyleLink> = links.iter().filter(|l| l.is(LinkCategory::Skin)).collect();

        let Some(urls) = resolve_urls(&skin.entry, major_version) else {
            let e = SkinError::VersionMismatch {
                skin: name.clone(),
                version: major_version,
            };
            warn!(error = %e, "Removing skin stylesheets");
            let stale: Vec<LinkId> = current.iter().map(|l| l.id).collect();
            self.remove_previous_skin(doc, &stale, &name);
            self.selection.skin = Some(name);
            self.rebuild_from_document(doc);
            return SkinApplication::NoResources;
        };
        let urls = dedup_preserving_order(urls);

        let up_to_date = self.selection.skin.as_deref() == Some(name.as_str())
            && current.len() == urls.len()
            && current
                .iter()
                .zip(&urls)
                .all(|(link, url)| link.owned_by(&name) && link.href == *url);
        if up_to_date {
            debug!(skin = %name, "Skin already applied");
            self.rebuild_from_document(doc);
            return SkinApplication::Unchanged;
        }

        // Reuse links of this skin that are already in the right order.
        let mut kept: Vec<(usize, LinkId)> = Vec::new();
        let mut last_index = None;
        for (index, url) in urls.iter().enumerate() {
            if let Some(link) = current
                .iter()
                .find(|l| l.owned_by(&name) && l.href == *url && !kept.iter().any(|(_, id)| *id == l.id))
            {
                let doc_index = links.iter().position(|l| l.id == link.id);
                if doc_index > last_index {
                    kept.push((index, link.id));
                    last_index = doc_index;
                }
            }
        }

        let mut placed: Vec<LinkId> = Vec::with_capacity(urls.len());
        for (index, url) in urls.iter().enumerate() {
            if let Some((_, id)) = kept.iter().find(|(i, _)| *i == index) {
                placed.push(*id);
                continue;
            }
            let position = match placed.last() {
                Some(previous) => InsertPosition::After(*previous),
                None => match kept.first() {
                    Some((_, first_kept)) => InsertPosition::Before(*first_kept),
                    None => insertion_point(&doc.links(), LinkCategory::Skin),
                },
            };
            let id = doc.insert(
                NewLink {
                    href: url.clone(),
                    category: LinkCategory::Skin,
                    owner: Some(name.clone()),
                },
                position,
            );
            placed.push(id);
        }

        let stale: Vec<LinkId> = current
            .iter()
            .map(|l| l.id)
            .filter(|id| !placed.contains(id))
            .collect();
        self.remove_previous_skin(doc, &stale, &name);

        info!(skin = %name, stylesheets = urls.len(), "Applied skin");
        self.selection.skin = Some(name);
        self.rebuild_from_document(doc);
        SkinApplication::Applied
    }

    /// Bring the optional includes of `scope` in line with `includes`.
    pub fn apply_optional_includes(
        &mut self,
        doc: &mut dyn StyleDocument,
        scope: &str,
        includes: &[ResolvedInclude],
    ) {
        let desired = dedup_preserving_order(
            includes
                .iter()
                .filter(|i| i.enabled)
                .map(|i| i.url.clone())
                .collect(),
        );

        let existing: Vec<StyleLink> = doc
            .links()
            .into_iter()
            .filter(|l| l.is(LinkCategory::OptionalInclude) && l.owned_by(scope))
            .collect();

        let mut present: HashSet<&str> = HashSet::new();
        let mut stale: Vec<LinkId> = Vec::new();
        for link in &existing {
            if desired.contains(&link.href) && present.insert(link.href.as_str()) {
                continue;
            }
            stale.push(link.id);
        }

        for url in &desired {
            if present.contains(url.as_str()) {
                continue;
            }
            let position = insertion_point(&doc.links(), LinkCategory::OptionalInclude);
            doc.insert(
                NewLink {
                    href: url.clone(),
                    category: LinkCategory::OptionalInclude,
                    owner: Some(scope.to_string()),
                },
                position,
            );
        }
        for id in stale {
            doc.remove(id);
        }

        let scope_keys: HashSet<&str> = includes.iter().map(|i| i.key.as_str()).collect();
        self.selection
            .enabled_includes
            .retain(|k| !scope_keys.contains(k.as_str()));
        self.selection.enabled_includes.extend(
            includes
                .iter()
                .filter(|i| i.enabled)
                .map(|i| i.key.clone()),
        );
        self.rebuild_from_document(doc);
    }

    /// Remove every optional include owned by `scope`.
    pub fn remove_scope_includes(&mut self, doc: &mut dyn StyleDocument, scope: &str) {
        let ids: Vec<LinkId> = doc
            .links()
            .into_iter()
            .filter(|l| l.is(LinkCategory::OptionalInclude) && l.owned_by(scope))
            .map(|l| l.id)
            .collect();
        for id in ids {
            doc.remove(id);
        }
        self.rebuild_from_document(doc);
    }

    fn remove_previous_skin(&mut self, doc: &mut dyn StyleDocument, stale: &[LinkId], name: &str) {
        let links = doc.links();
        let mut previous: BTreeSet<String> = links
            .iter()
            .filter(|l| stale.contains(&l.id))
            .filter_map(|l| l.owner.clone())
            .collect();
        if let Some(selected) = &self.selection.skin {
            previous.insert(selected.clone());
        }
        previous.remove(name);

        for id in stale {
            doc.remove(*id);
        }
        for owner in &previous {
            debug!(skin = %owner, "Removing includes of previous skin");
            self.remove_scope_includes(doc, owner);
        }
    }

    /// Keep at most one link in `category`, pointing at `target`.
    fn replace_single(
        &mut self,
        doc: &mut dyn StyleDocument,
        category: LinkCategory,
        owner: Option<&str>,
        target: Option<&str>,
    ) {
        let existing: Vec<StyleLink> = doc
            .links()
            .into_iter()
            .filter(|l| l.is(category))
            .collect();

        let keep = target.and_then(|url| {
            existing
                .iter()
                .find(|l| l.href == url && owner.map_or(true, |o| l.owned_by(o)))
                .map(|l| l.id)
        });

        if let (Some(url), None) = (target, keep) {
            let position = insertion_point(&doc.links(), category);
            doc.insert(
                NewLink {
                    href: url.to_string(),
                    category,
                    owner: owner.map(str::to_string),
                },
                position,
            );
            debug!(category = %category, url = %url, "Inserted stylesheet");
        }

        for link in existing.iter().filter(|l| Some(l.id) != keep) {
            doc.remove(link.id);
        }
    }
}
