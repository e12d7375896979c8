//! Style-link document model.
//!
//! The engine only touches the ordered list of stylesheet links in the
//! document head. Links it owns carry a category marker and an owner (the
//! skin or include scope); links without a category belong to the host page
//! and are never modified.

use std::collections::HashSet;
use std::fmt;

use serde::Serialize;

/// Marker the engine sets once it has initialized on a document.
pub const INIT_MARKER: &str = "skin-manager-initialized";

/// Engine-owned link categories, in cascade order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum LinkCategory {
    Theme,
    Skin,
    ColorScheme,
    OptionalInclude,
}

impl LinkCategory {
    /// Cascade order: earlier categories are overridden by later ones.
    pub const ORDER: [LinkCategory; 4] = [
        LinkCategory::Theme,
        LinkCategory::Skin,
        LinkCategory::ColorScheme,
        LinkCategory::OptionalInclude,
    ];

    pub fn rank(self) -> usize {
        match self {
            Self::Theme => 0,
            Self::Skin => 1,
            Self::ColorScheme => 2,
            Self::OptionalInclude => 3,
        }
    }

    /// Reserved boolean attribute identifying the category on a link.
    pub fn marker(self) -> &'static str {
        match self {
            Self::Theme => "custom-theme",
            Self::Skin => "skin",
            Self::ColorScheme => "color-schemes",
            Self::OptionalInclude => "optional-include",
        }
    }
}

impl fmt::Display for LinkCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.marker())
    }
}

/// Stable identity of a link element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct LinkId(pub u64);

/// A stylesheet link in the document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StyleLink {
    pub id: LinkId,
    pub href: String,
    /// `None` for host-owned links.
    pub category: Option<LinkCategory>,
    /// Skin or scope name that owns the link.
    pub owner: Option<String>,
}

impl StyleLink {
    pub fn is(&self, category: LinkCategory) -> bool {
        self.category == Some(category)
    }

    pub fn owned_by(&self, owner: &str) -> bool {
        self.owner.as_deref() == Some(owner)
    }
}

/// A link about to be inserted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewLink {
    pub href: String,
    pub category: LinkCategory,
    pub owner: Option<String>,
}

/// Where to insert a link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertPosition {
    After(LinkId),
    Before(LinkId),
    Append,
}

/// The part of the host document the engine reads and writes.
pub trait StyleDocument: Send + Sync {
    /// All stylesheet links in document order.
    fn links(&self) -> Vec<StyleLink>;
    /// Insert a link; an unknown anchor appends.
    fn insert(&mut self, link: NewLink, position: InsertPosition) -> LinkId;
    /// Remove a link. Returns whether it was present.
    fn remove(&mut self, id: LinkId) -> bool;
    fn has_marker(&self, marker: &str) -> bool;
    fn set_marker(&mut self, marker: &str);

    /// Engine-owned links only, in document order.
    fn engine_links(&self) -> Vec<StyleLink> {
        self.links()
            .into_iter()
            .filter(|l| l.category.is_some())
            .collect()
    }
}

/// In-memory document head.
#[derive(Debug, Default)]
pub struct HeadDocument {
    links: Vec<StyleLink>,
    markers: HashSet<String>,
    next_id: u64,
}

impl HeadDocument {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a host-owned stylesheet.
    pub fn add_host_link(&mut self, href: impl Into<String>) -> LinkId {
        let id = self.allocate();
        self.links.push(StyleLink {
            id,
            href: href.into(),
            category: None,
            owner: None,
        });
        id
    }

    /// Hrefs of engine-owned links, in order.
    pub fn engine_hrefs(&self) -> Vec<String> {
        self.links
            .iter()
            .filter(|l| l.category.is_some())
            .map(|l| l.href.clone())
            .collect()
    }

    fn allocate(&mut self) -> LinkId {
        self.next_id += 1;
        LinkId(self.next_id)
    }

    fn index_of(&self, id: LinkId) -> Option<usize> {
        self.links.iter().position(|l| l.id == id)
    }
}

impl StyleDocument for HeadDocument {
    fn links(&self) -> Vec<StyleLink> {
        self.links.clone()
    }

    fn insert(&mut self, link: NewLink, position: InsertPosition) -> LinkId {
        let id = self.allocate();
        let element = StyleLink {
            id,
            href: link.href,
            category: Some(link.category),
            owner: link.owner,
        };
        let index = match position {
            InsertPosition::After(anchor) => self.index_of(anchor).map(|i| i + 1),
            InsertPosition::Before(anchor) => self.index_of(anchor),
            InsertPosition::Append => None,
        }
        .unwrap_or(self.links.len());
        self.links.insert(index, element);
        id
    }

    fn remove(&mut self, id: LinkId) -> bool {
        match self.index_of(id) {
            Some(index) => {
                self.links.remove(index);
                true
            }
            None => false,
        }
    }

    fn has_marker(&self, marker: &str) -> bool {
        self.markers.contains(marker)
    }

    fn set_marker(&mut self, marker: &str) {
        self.markers.insert(marker.to_string());
    }
}
