//! Host document model consumed by the dark rendering engine.
//!
//! The crate provides an arena-backed document tree with shadow-encapsulated
//! tree scopes, attribute and inline-style access, a small selector engine and
//! cascade for computed-style inspection, host-supplied layout boxes, and a
//! mutation-record stream that observers drain at their own pace.
//!
//! Everything here is single-threaded: documents are shared through
//! [`SharedDocument`] (`Rc<RefCell<Document>>`) and never cross threads.

use core::cell::RefCell;
use indextree::NodeId;
use std::rc::Rc;

/// Style cascade over `<style>` sheets and inline declarations.
pub mod cascade;
/// CSS colour parsing into 8-bit channels.
pub mod color;
/// The document tree itself.
pub mod document;
/// Mutation records and observers.
pub mod mutation;
/// Selector parsing, matching, and specificity.
pub mod selectors;
/// `style="..."` attribute parsing.
pub mod style_attr;
/// Sheet and declaration-list parsing on `cssparser`.
pub mod syntax;

pub use cascade::ComputedStyle;
pub use color::{Rgba, parse_css_color};
pub use document::{Document, LayoutRect, ReadyState};
pub use mutation::{MutationFilter, MutationObserver, MutationRecord};
pub use selectors::{SelectorList, Specificity};
pub use style_attr::{Declaration, parse_style_attribute, parse_style_attribute_into_map};
pub use syntax::{StyleRule, parse_stylesheet};

/// A document shared between the host and the engine on one thread.
pub type SharedDocument = Rc<RefCell<Document>>;

/// A stable key for a node in a [`Document`].
///
/// Keys stay valid after a node is detached, so observers can correlate
/// records with nodes that have since left the tree.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct NodeKey(NodeId);

impl NodeKey {
    /// Wrap an arena id.
    #[inline]
    pub(crate) const fn from_id(id: NodeId) -> Self {
        Self(id)
    }

    /// The underlying arena id.
    #[inline]
    pub(crate) const fn id(self) -> NodeId {
        self.0
    }
}

/// The kind of a node in the document tree.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum NodeKind {
    /// The document node; parent of the root element.
    #[default]
    Document,
    /// An element with a lowercase tag name.
    Element { tag: String },
    /// A text node.
    Text { text: String },
    /// The root of a shadow tree attached to `host`.
    ShadowRoot { host: NodeKey },
}

/// Per-node payload stored in the arena.
#[derive(Debug, Clone, Default)]
pub struct DomNode {
    /// What this node is.
    pub kind: NodeKind,
    /// Attributes in insertion order; names are lowercase.
    pub attrs: Vec<(String, String)>,
    /// Shadow root attached to this element, if any.
    pub(crate) shadow_root: Option<NodeKey>,
}

impl DomNode {
    /// Lowercase tag name when this node is an element.
    #[inline]
    pub fn tag(&self) -> Option<&str> {
        match &self.kind {
            NodeKind::Element { tag } => Some(tag.as_str()),
            _ => None,
        }
    }

    /// Attribute value by (lowercase) name.
    #[inline]
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(attr_name, _)| attr_name == name)
            .map(|(_, value)| value.as_str())
    }
}
