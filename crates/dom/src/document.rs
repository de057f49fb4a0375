//! The document tree.
//!
//! An [`indextree`] arena holds every node ever created; detaching a node
//! keeps it in the arena so its [`NodeKey`] stays meaningful. Shadow roots
//! live in the same arena but are never children of their host, which keeps
//! light-tree walks from crossing encapsulation boundaries.

use crate::cascade::{self, ComputedStyle};
use crate::mutation::{MUTATION_CHANNEL_CAPACITY, MutationFilter, MutationObserver, MutationRecord};
use crate::selectors::{ElementView, SelectorList};
use crate::style_attr::{Declaration, parse_style_attribute, serialize_declarations};
use crate::{DomNode, NodeKey, NodeKind, SharedDocument};
use anyhow::{Result, anyhow, bail};
use core::any::{Any, TypeId};
use indextree::{Arena, Node};
use log::{debug, trace, warn};
use std::collections::{HashMap, HashSet};
use tokio::sync::{broadcast, watch};

/// Document loading progress, mirroring `document.readyState`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ReadyState {
    /// Still parsing.
    #[default]
    Loading,
    /// Parsed; subresources may still be loading.
    Interactive,
    /// Fully loaded.
    Complete,
}

/// A border box in viewport coordinates, as reported by the host's layout.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct LayoutRect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl LayoutRect {
    /// Construct a rect from origin and size.
    #[inline]
    #[must_use]
    pub const fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }
}

/// An in-memory document with the inspection surface the engine consumes.
pub struct Document {
    /// Every node ever created.
    arena: Arena<DomNode>,
    /// The document node (parent of `<html>`).
    document_node: NodeKey,
    /// Host name of the document's URL, lowercase.
    hostname: String,
    /// Host-supplied layout boxes.
    layout: HashMap<NodeKey, LayoutRect>,
    /// Nodes whose style and geometry cannot be read (cross-origin frames and the like).
    restricted: HashSet<NodeKey>,
    /// `<style>` elements whose sheet is disabled.
    disabled_sheets: HashSet<NodeKey>,
    /// Mutation record stream.
    mutations: broadcast::Sender<MutationRecord>,
    /// `document.readyState`.
    ready_state: watch::Sender<ReadyState>,
    /// `prefers-color-scheme: dark`.
    prefers_dark: watch::Sender<bool>,
    /// Per-document singletons keyed by type.
    extensions: HashMap<TypeId, Box<dyn Any>>,
}

impl Document {
    /// Create `<html><head></head><body></body></html>` for `hostname`.
    #[must_use]
    pub fn new(hostname: &str) -> Self {
        let mut arena = Arena::new();
        let document_node = NodeKey::from_id(arena.new_node(DomNode::default()));
        let (mutations, _) = broadcast::channel(MUTATION_CHANNEL_CAPACITY);
        let (ready_state, _) = watch::channel(ReadyState::Loading);
        let (prefers_dark, _) = watch::channel(false);
        let mut document = Self {
            arena,
            document_node,
            hostname: hostname.trim().to_ascii_lowercase(),
            layout: HashMap::new(),
            restricted: HashSet::new(),
            disabled_sheets: HashSet::new(),
            mutations,
            ready_state,
            prefers_dark,
            extensions: HashMap::new(),
        };
        let html = document.create_element("html");
        let head = document.create_element("head");
        let body = document.create_element("body");
        for (parent, child) in [(document_node, html), (html, head), (html, body)] {
            if let Err(err) = document.append_child(parent, child) {
                warn!("failed to build document skeleton: {err}");
            }
        }
        document
    }

    /// Wrap this document for sharing with an engine on the same thread.
    #[must_use]
    pub fn into_shared(self) -> SharedDocument {
        SharedDocument::new(self.into())
    }

    /// Host name of the document's URL, lowercase.
    #[inline]
    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    /// The document node.
    #[inline]
    pub const fn document_node(&self) -> NodeKey {
        self.document_node
    }

    /// The root element (`<html>`).
    pub fn document_element(&self) -> Option<NodeKey> {
        self.children(self.document_node)
            .into_iter()
            .find(|child| self.tag(*child).is_some())
    }

    /// The first `<head>` child of the root element.
    pub fn head(&self) -> Option<NodeKey> {
        self.root_child("head")
    }

    /// The first `<body>` child of the root element.
    pub fn body(&self) -> Option<NodeKey> {
        self.root_child("body")
    }

    fn root_child(&self, tag: &str) -> Option<NodeKey> {
        let root = self.document_element()?;
        self.children(root)
            .into_iter()
            .find(|child| self.tag(*child) == Some(tag))
    }

    // ----------------------------------------------------------------
    // Node access
    // ----------------------------------------------------------------

    /// The node payload, if the key belongs to this document.
    #[inline]
    pub fn node(&self, key: NodeKey) -> Option<&DomNode> {
        self.arena.get(key.id()).map(Node::get)
    }

    fn node_mut(&mut self, key: NodeKey) -> Option<&mut DomNode> {
        self.arena.get_mut(key.id()).map(Node::get_mut)
    }

    /// Lowercase tag name when `key` is an element.
    #[inline]
    pub fn tag(&self, key: NodeKey) -> Option<&str> {
        self.node(key).and_then(DomNode::tag)
    }

    /// Whether `key` is an element.
    #[inline]
    pub fn is_element(&self, key: NodeKey) -> bool {
        self.tag(key).is_some()
    }

    /// Create a detached element.
    pub fn create_element(&mut self, tag: &str) -> NodeKey {
        NodeKey::from_id(self.arena.new_node(DomNode {
            kind: NodeKind::Element {
                tag: tag.to_ascii_lowercase(),
            },
            ..DomNode::default()
        }))
    }

    /// Create a detached text node.
    pub fn create_text(&mut self, text: &str) -> NodeKey {
        NodeKey::from_id(self.arena.new_node(DomNode {
            kind: NodeKind::Text {
                text: text.to_owned(),
            },
            ..DomNode::default()
        }))
    }

    // ----------------------------------------------------------------
    // Tree structure
    // ----------------------------------------------------------------

    /// Append `child` as the last child of `parent`, moving it if attached elsewhere.
    ///
    /// # Errors
    ///
    /// Returns an error when `parent` cannot have children, `child` is a
    /// document or shadow root, or the move would create a cycle.
    pub fn append_child(&mut self, parent: NodeKey, child: NodeKey) -> Result<()> {
        self.insert_before(parent, child, None)
    }

    /// Insert `child` under `parent` before `reference` (append when `None`).
    ///
    /// # Errors
    ///
    /// Returns an error under the same conditions as [`Self::append_child`],
    /// or when `reference` is not a child of `parent`.
    pub fn insert_before(
        &mut self,
        parent: NodeKey,
        child: NodeKey,
        reference: Option<NodeKey>,
    ) -> Result<()> {
        match self.node(parent).map(|node| &node.kind) {
            Some(NodeKind::Element { .. } | NodeKind::Document | NodeKind::ShadowRoot { .. }) => {}
            Some(NodeKind::Text { .. }) => bail!("text nodes cannot have children"),
            None => bail!("parent {parent:?} does not belong to this document"),
        }
        match self.node(child).map(|node| &node.kind) {
            Some(NodeKind::Element { .. } | NodeKind::Text { .. }) => {}
            Some(_) => bail!("{child:?} cannot be inserted into a tree"),
            None => bail!("child {child:?} does not belong to this document"),
        }
        if let Some(reference) = reference
            && self.parent(reference) != Some(parent)
        {
            bail!("reference {reference:?} is not a child of {parent:?}");
        }
        if parent.id().ancestors(&self.arena).any(|ancestor| ancestor == child.id()) {
            bail!("inserting {child:?} under {parent:?} would create a cycle");
        }
        self.remove(child);
        match reference {
            Some(reference) => reference
                .id()
                .checked_insert_before(child.id(), &mut self.arena)
                .map_err(|err| anyhow!("cannot insert {child:?}: {err}"))?,
            None => parent
                .id()
                .checked_append(child.id(), &mut self.arena)
                .map_err(|err| anyhow!("cannot append {child:?}: {err}"))?,
        }
        self.publish(MutationRecord::ChildList {
            target: parent,
            added: vec![child],
            removed: Vec::new(),
        });
        Ok(())
    }

    /// Detach `node` from its parent. Detached nodes keep their subtree.
    pub fn remove(&mut self, node: NodeKey) {
        let Some(parent) = self.parent(node) else {
            return;
        };
        node.id().detach(&mut self.arena);
        self.publish(MutationRecord::ChildList {
            target: parent,
            added: Vec::new(),
            removed: vec![node],
        });
    }

    /// Light-tree parent.
    #[inline]
    pub fn parent(&self, node: NodeKey) -> Option<NodeKey> {
        self.arena
            .get(node.id())
            .and_then(Node::parent)
            .map(NodeKey::from_id)
    }

    /// Parent in the flat tree: the light parent, or the host when the light
    /// parent is a shadow root. `None` at the document node.
    pub fn flat_parent(&self, node: NodeKey) -> Option<NodeKey> {
        let parent = self.parent(node)?;
        match self.node(parent).map(|parent_node| &parent_node.kind) {
            Some(NodeKind::ShadowRoot { host }) => Some(*host),
            _ => Some(parent),
        }
    }

    /// Children in order.
    pub fn children(&self, node: NodeKey) -> Vec<NodeKey> {
        node.id()
            .children(&self.arena)
            .map(NodeKey::from_id)
            .collect()
    }

    /// Light-tree descendants of `node` in tree order, excluding `node`.
    pub fn descendants(&self, node: NodeKey) -> Vec<NodeKey> {
        node.id()
            .descendants(&self.arena)
            .skip(1)
            .map(NodeKey::from_id)
            .collect()
    }

    /// Element descendants of `node` in tree order, excluding `node`.
    pub fn element_descendants(&self, node: NodeKey) -> Vec<NodeKey> {
        node.id()
            .descendants(&self.arena)
            .skip(1)
            .map(NodeKey::from_id)
            .filter(|key| self.is_element(*key))
            .collect()
    }

    /// Whether `node` is `ancestor` or one of its light-tree descendants.
    pub fn contains(&self, ancestor: NodeKey, node: NodeKey) -> bool {
        node.id()
            .ancestors(&self.arena)
            .any(|candidate| candidate == ancestor.id())
    }

    /// Root of the light tree `node` belongs to: the document node, a shadow
    /// root, or the top of a detached subtree.
    pub fn tree_scope(&self, node: NodeKey) -> NodeKey {
        node.id()
            .ancestors(&self.arena)
            .last()
            .map_or(node, NodeKey::from_id)
    }

    /// Whether `node` is reachable from the document, through shadow hosts if needed.
    pub fn is_connected(&self, node: NodeKey) -> bool {
        let mut current = node;
        loop {
            let scope = self.tree_scope(current);
            if scope == self.document_node {
                return true;
            }
            match self.node(scope).map(|scope_node| &scope_node.kind) {
                Some(NodeKind::ShadowRoot { host }) => current = *host,
                _ => return false,
            }
        }
    }

    /// Attach an open shadow root to `host`.
    ///
    /// # Errors
    ///
    /// Returns an error if `host` is not an element or already has a shadow root.
    pub fn attach_shadow(&mut self, host: NodeKey) -> Result<NodeKey> {
        let Some(host_node) = self.node(host) else {
            bail!("host {host:?} does not belong to this document");
        };
        if host_node.tag().is_none() {
            bail!("only elements can host a shadow root");
        }
        if host_node.shadow_root.is_some() {
            bail!("{host:?} already hosts a shadow root");
        }
        let root = NodeKey::from_id(self.arena.new_node(DomNode {
            kind: NodeKind::ShadowRoot { host },
            ..DomNode::default()
        }));
        if let Some(host_node) = self.node_mut(host) {
            host_node.shadow_root = Some(root);
        }
        debug!("attached shadow root {root:?} to {host:?}");
        Ok(root)
    }

    /// The shadow root hosted by `host`, if any.
    #[inline]
    pub fn shadow_root(&self, host: NodeKey) -> Option<NodeKey> {
        self.node(host).and_then(|node| node.shadow_root)
    }

    /// The host of a shadow root.
    pub fn shadow_host(&self, root: NodeKey) -> Option<NodeKey> {
        match self.node(root).map(|node| &node.kind) {
            Some(NodeKind::ShadowRoot { host }) => Some(*host),
            _ => None,
        }
    }

    // ----------------------------------------------------------------
    // Attributes
    // ----------------------------------------------------------------

    /// Attribute value by name (case-insensitive).
    pub fn attribute(&self, node: NodeKey, name: &str) -> Option<&str> {
        let lowered = name.to_ascii_lowercase();
        self.node(node)?.attr(&lowered)
    }

    /// Set an attribute, publishing an attribute record.
    ///
    /// # Errors
    ///
    /// Returns an error if `node` is not an element.
    pub fn set_attribute(&mut self, node: NodeKey, name: &str, value: &str) -> Result<()> {
        let lowered = name.to_ascii_lowercase();
        let Some(element) = self.node_mut(node).filter(|element| element.tag().is_some()) else {
            bail!("cannot set attribute {lowered} on non-element {node:?}");
        };
        if let Some(slot) = element
            .attrs
            .iter_mut()
            .find(|(attr_name, _)| *attr_name == lowered)
        {
            value.clone_into(&mut slot.1);
        } else {
            element.attrs.push((lowered.clone(), value.to_owned()));
        }
        self.publish(MutationRecord::Attributes {
            target: node,
            name: lowered,
        });
        Ok(())
    }

    /// Remove an attribute; publishes only when it existed.
    pub fn remove_attribute(&mut self, node: NodeKey, name: &str) {
        let lowered = name.to_ascii_lowercase();
        let Some(element) = self.node_mut(node) else {
            return;
        };
        let before = element.attrs.len();
        element.attrs.retain(|(attr_name, _)| *attr_name != lowered);
        if element.attrs.len() != before {
            self.publish(MutationRecord::Attributes {
                target: node,
                name: lowered,
            });
        }
    }

    /// The `id` attribute.
    #[inline]
    pub fn id(&self, node: NodeKey) -> Option<&str> {
        self.attribute(node, "id")
    }

    /// Whether the class list of `node` contains `class`.
    pub fn has_class(&self, node: NodeKey, class: &str) -> bool {
        self.attribute(node, "class")
            .is_some_and(|classes| classes.split_ascii_whitespace().any(|token| token == class))
    }

    /// Add `class` to the class list (no-op when present).
    ///
    /// # Errors
    ///
    /// Returns an error if `node` is not an element.
    pub fn add_class(&mut self, node: NodeKey, class: &str) -> Result<()> {
        if self.has_class(node, class) {
            return Ok(());
        }
        let mut classes = self.attribute(node, "class").unwrap_or_default().to_owned();
        if !classes.trim().is_empty() {
            classes.push(' ');
        }
        classes.push_str(class);
        self.set_attribute(node, "class", classes.trim())
    }

    /// Remove `class` from the class list (no-op when absent).
    ///
    /// # Errors
    ///
    /// Returns an error if `node` is not an element.
    pub fn remove_class(&mut self, node: NodeKey, class: &str) -> Result<()> {
        if !self.has_class(node, class) {
            return Ok(());
        }
        let remaining: Vec<&str> = self
            .attribute(node, "class")
            .unwrap_or_default()
            .split_ascii_whitespace()
            .filter(|token| *token != class)
            .collect();
        let joined = remaining.join(" ");
        self.set_attribute(node, "class", &joined)
    }

    /// First element in `scope` (light tree) with the given id.
    pub fn element_by_id(&self, scope: NodeKey, id: &str) -> Option<NodeKey> {
        self.element_descendants(scope)
            .into_iter()
            .find(|candidate| self.id(*candidate) == Some(id))
    }

    // ----------------------------------------------------------------
    // Inline style
    // ----------------------------------------------------------------

    /// Declarations of the `style` attribute.
    pub fn inline_style(&self, node: NodeKey) -> Vec<Declaration> {
        self.attribute(node, "style")
            .map(parse_style_attribute)
            .unwrap_or_default()
    }

    /// Value of one inline style property.
    pub fn style_property(&self, node: NodeKey, property: &str) -> Option<String> {
        let lowered = property.to_ascii_lowercase();
        self.inline_style(node)
            .into_iter()
            .rev()
            .find(|decl| decl.property == lowered)
            .map(|decl| decl.value)
    }

    /// Set one inline style property, keeping the others.
    ///
    /// # Errors
    ///
    /// Returns an error if `node` is not an element.
    pub fn set_style_property(&mut self, node: NodeKey, property: &str, value: &str) -> Result<()> {
        let lowered = property.to_ascii_lowercase();
        let mut declarations = self.inline_style(node);
        declarations.retain(|decl| decl.property != lowered);
        declarations.push(Declaration {
            property: lowered,
            value: value.trim().to_owned(),
            important: false,
        });
        self.set_attribute(node, "style", &serialize_declarations(&declarations))
    }

    /// Replace the whole `style` attribute.
    ///
    /// # Errors
    ///
    /// Returns an error if `node` is not an element.
    #[inline]
    pub fn set_style_text(&mut self, node: NodeKey, text: &str) -> Result<()> {
        self.set_attribute(node, "style", text)
    }

    /// Remove one inline style property; drops the attribute when nothing remains.
    ///
    /// # Errors
    ///
    /// Returns an error if `node` is not an element.
    pub fn remove_style_property(&mut self, node: NodeKey, property: &str) -> Result<()> {
        let lowered = property.to_ascii_lowercase();
        let mut declarations = self.inline_style(node);
        let before = declarations.len();
        declarations.retain(|decl| decl.property != lowered);
        if declarations.len() == before {
            return Ok(());
        }
        if declarations.is_empty() {
            self.remove_attribute(node, "style");
            return Ok(());
        }
        self.set_attribute(node, "style", &serialize_declarations(&declarations))
    }

    // ----------------------------------------------------------------
    // Text
    // ----------------------------------------------------------------

    /// Replace all children of `node` with a single text node.
    ///
    /// # Errors
    ///
    /// Returns an error if `node` cannot have children.
    pub fn set_text_content(&mut self, node: NodeKey, text: &str) -> Result<()> {
        if !matches!(
            self.node(node).map(|target| &target.kind),
            Some(NodeKind::Element { .. } | NodeKind::ShadowRoot { .. })
        ) {
            bail!("cannot set text content of {node:?}");
        }
        let removed = self.children(node);
        for child in &removed {
            child.id().detach(&mut self.arena);
        }
        let mut added = Vec::new();
        if !text.is_empty() {
            let text_node = self.create_text(text);
            node.id()
                .checked_append(text_node.id(), &mut self.arena)
                .map_err(|err| anyhow!("cannot append text: {err}"))?;
            added.push(text_node);
        }
        self.publish(MutationRecord::ChildList {
            target: node,
            added,
            removed,
        });
        Ok(())
    }

    /// Concatenated text of all descendant text nodes.
    pub fn text_content(&self, node: NodeKey) -> String {
        let mut out = String::new();
        for key in node.id().descendants(&self.arena) {
            if let Some(NodeKind::Text { text }) =
                self.arena.get(key).map(|entry| &entry.get().kind)
            {
                out.push_str(text);
            }
        }
        out
    }

    /// Rendered text approximation: text outside `<style>`, `<script>`,
    /// `<noscript>`, and `<template>`, one space between text runs.
    pub fn inner_text(&self, node: NodeKey) -> String {
        const HIDDEN: [&str; 4] = ["style", "script", "noscript", "template"];
        let mut runs: Vec<&str> = Vec::new();
        for key in node.id().descendants(&self.arena) {
            let Some(NodeKind::Text { text }) = self.arena.get(key).map(|entry| &entry.get().kind)
            else {
                continue;
            };
            let hidden = key
                .ancestors(&self.arena)
                .filter_map(|ancestor| self.tag(NodeKey::from_id(ancestor)))
                .any(|tag| HIDDEN.contains(&tag));
            let trimmed = text.trim();
            if !hidden && !trimmed.is_empty() {
                runs.push(trimmed);
            }
        }
        runs.join(" ")
    }

    // ----------------------------------------------------------------
    // Selectors
    // ----------------------------------------------------------------

    /// Elements under `scope` (light tree, excluding `scope`) matching `selectors`.
    pub fn query_selector_all(&self, scope: NodeKey, selectors: &SelectorList) -> Vec<NodeKey> {
        self.element_descendants(scope)
            .into_iter()
            .filter(|candidate| selectors.matches_with(*candidate, self))
            .collect()
    }

    /// First element under `scope` matching `selectors`.
    pub fn query_selector(&self, scope: NodeKey, selectors: &SelectorList) -> Option<NodeKey> {
        self.element_descendants(scope)
            .into_iter()
            .find(|candidate| selectors.matches_with(*candidate, self))
    }

    /// Parse `selectors` and run [`Self::query_selector_all`]; empty on parse failure.
    pub fn select_all(&self, scope: NodeKey, selectors: &str) -> Vec<NodeKey> {
        SelectorList::parse(selectors)
            .map(|list| self.query_selector_all(scope, &list))
            .unwrap_or_default()
    }

    /// Whether the element `node` matches `selectors`.
    pub fn matches(&self, node: NodeKey, selectors: &SelectorList) -> bool {
        selectors.matches_with(node, self)
    }

    // ----------------------------------------------------------------
    // Style and geometry
    // ----------------------------------------------------------------

    /// Enabled `<style>` elements of the tree scope rooted at `scope`, in tree order.
    pub fn style_sheets(&self, scope: NodeKey) -> Vec<NodeKey> {
        self.element_descendants(scope)
            .into_iter()
            .filter(|candidate| self.tag(*candidate) == Some("style"))
            .filter(|candidate| !self.disabled_sheets.contains(candidate))
            .collect()
    }

    /// Enable or disable the sheet of a `<style>` element.
    pub fn set_sheet_disabled(&mut self, style: NodeKey, disabled: bool) {
        if disabled {
            self.disabled_sheets.insert(style);
        } else {
            self.disabled_sheets.remove(&style);
        }
    }

    /// Whether the sheet of a `<style>` element is disabled.
    #[inline]
    pub fn is_sheet_disabled(&self, style: NodeKey) -> bool {
        self.disabled_sheets.contains(&style)
    }

    /// Resolved style of an element.
    ///
    /// # Errors
    ///
    /// Returns an error for non-elements, detached nodes, and nodes the host
    /// marked as restricted.
    pub fn computed_style(&self, node: NodeKey) -> Result<ComputedStyle> {
        self.check_measurable(node)?;
        Ok(cascade::compute(self, node))
    }

    /// The host-supplied layout box of an element (zero-sized when none).
    ///
    /// # Errors
    ///
    /// Returns an error for non-elements, detached nodes, and restricted nodes.
    pub fn bounding_rect(&self, node: NodeKey) -> Result<LayoutRect> {
        self.check_measurable(node)?;
        Ok(self.layout.get(&node).copied().unwrap_or_default())
    }

    fn check_measurable(&self, node: NodeKey) -> Result<()> {
        if !self.is_element(node) {
            bail!("{node:?} is not an element");
        }
        if self.restricted.contains(&node) {
            bail!("{node:?} is not accessible from this origin");
        }
        if !self.is_connected(node) {
            bail!("{node:?} is detached");
        }
        Ok(())
    }

    /// Record the layout box the host computed for `node`.
    pub fn set_layout_rect(&mut self, node: NodeKey, rect: LayoutRect) {
        self.layout.insert(node, rect);
    }

    /// Mark `node` as unreadable (style and geometry access fail).
    pub fn set_restricted(&mut self, node: NodeKey, restricted: bool) {
        if restricted {
            self.restricted.insert(node);
        } else {
            self.restricted.remove(&node);
        }
    }

    // ----------------------------------------------------------------
    // Observation and signals
    // ----------------------------------------------------------------

    /// Connect a mutation observer. Records published before this call are not delivered.
    pub fn observe(&self, filter: MutationFilter) -> MutationObserver {
        MutationObserver::new(self.mutations.subscribe(), filter)
    }

    fn publish(&self, record: MutationRecord) {
        if self.mutations.receiver_count() == 0 {
            return;
        }
        if let Err(err) = self.mutations.send(record) {
            trace!("dropped mutation record: {err}");
        }
    }

    /// Current `document.readyState`.
    #[inline]
    pub fn ready_state(&self) -> ReadyState {
        *self.ready_state.borrow()
    }

    /// Advance the ready state, waking anyone waiting for parsing to finish.
    pub fn set_ready_state(&mut self, state: ReadyState) {
        debug!("document ready state -> {state:?}");
        self.ready_state.send_replace(state);
    }

    /// A watcher over the ready state.
    pub fn ready_watcher(&self) -> watch::Receiver<ReadyState> {
        self.ready_state.subscribe()
    }

    /// Wait until the document has finished parsing (`Interactive` or later).
    pub async fn wait_until_parsed(document: &SharedDocument) {
        let mut watcher = document.borrow().ready_watcher();
        if watcher
            .wait_for(|state| *state != ReadyState::Loading)
            .await
            .is_err()
        {
            debug!("document dropped while waiting for parsing");
        }
    }

    /// Whether the environment prefers a dark colour scheme.
    #[inline]
    pub fn prefers_dark_scheme(&self) -> bool {
        *self.prefers_dark.borrow()
    }

    /// Update the colour-scheme preference.
    pub fn set_prefers_dark_scheme(&mut self, dark: bool) {
        self.prefers_dark.send_replace(dark);
    }

    /// A watcher over the colour-scheme preference.
    pub fn color_scheme_watcher(&self) -> watch::Receiver<bool> {
        self.prefers_dark.subscribe()
    }

    // ----------------------------------------------------------------
    // Extensions
    // ----------------------------------------------------------------

    /// The per-document singleton of type `T`, if one was inserted.
    pub fn extension<T: 'static>(&self) -> Option<&T> {
        self.extensions
            .get(&TypeId::of::<T>())
            .and_then(|value| value.downcast_ref::<T>())
    }

    /// Insert (or replace) the per-document singleton of type `T`.
    pub fn insert_extension<T: 'static>(&mut self, value: T) {
        self.extensions.insert(TypeId::of::<T>(), Box::new(value));
    }

    /// Remove the per-document singleton of type `T`.
    pub fn remove_extension<T: 'static>(&mut self) {
        self.extensions.remove(&TypeId::of::<T>());
    }
}

impl ElementView for Document {
    fn local_name(&self, node: NodeKey) -> Option<&str> {
        self.tag(node)
    }

    fn attr(&self, node: NodeKey, name: &str) -> Option<&str> {
        self.node(node)?.attr(name)
    }

    fn scoped_parent(&self, node: NodeKey) -> Option<NodeKey> {
        self.parent(node).filter(|parent| self.is_element(*parent))
    }

    fn is_root(&self, node: NodeKey) -> bool {
        self.parent(node) == Some(self.document_node)
    }
}
