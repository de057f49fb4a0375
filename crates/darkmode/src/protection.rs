//! Media protection.
//!
//! Images, video, vector graphics, canvas (unless exempt), and elements
//! painting a raster background are counter-inverted so they keep their true
//! colours under the page-wide inversion. Background elements are tagged with
//! [`BACKGROUND_MARK_ATTR`]; shadow roots get their own scoped sheet because
//! document-level rules do not reach into them.

use crate::compositor::shadow_style;
use anyhow::Result;
use dom::{Document, NodeKey, SelectorList};
use log::{debug, trace, warn};
use std::collections::{HashSet, VecDeque};

/// Attribute marking an element whose raster background is counter-inverted.
pub const BACKGROUND_MARK_ATTR: &str = "data-dm-bg-fixed";

/// Interactive surfaces that can dominate the viewport.
const INTERACTIVE_MEDIA: &str = "video, canvas";
/// Candidates of the eager background pass.
const BACKGROUND_CANDIDATES: &str = "[style], div, section, article, a, span";
/// Candidates below a freshly inserted subtree root.
const SUBTREE_CANDIDATES: &str = "[style], [class]";

/// Whether a visible video or canvas larger than `min_size` on both sides is
/// in the document. Nodes that cannot be measured are skipped.
pub fn has_visible_media_surface(document: &Document, min_size: f32) -> bool {
    document
        .select_all(document.document_node(), INTERACTIVE_MEDIA)
        .into_iter()
        .any(|node| {
            let measured = document.computed_style(node).and_then(|style| {
                document
                    .bounding_rect(node)
                    .map(|rect| (style, rect))
            });
            match measured {
                Ok((style, rect)) => {
                    style.display != "none"
                        && style.visibility != "hidden"
                        && rect.width > min_size
                        && rect.height > min_size
                }
                Err(err) => {
                    trace!("skipping unmeasurable media {node:?}: {err}");
                    false
                }
            }
        })
}

/// Whether `node` is, or contains, a video or canvas.
pub fn involves_interactive_media(document: &Document, node: NodeKey) -> bool {
    let Some(selectors) = SelectorList::parse(INTERACTIVE_MEDIA) else {
        return false;
    };
    document.is_element(node)
        && (document.matches(node, &selectors)
            || document.query_selector(node, &selectors).is_some())
}

fn has_raster_background(document: &Document, node: NodeKey) -> Result<bool> {
    let inline = document.attribute(node, "style").unwrap_or_default();
    if inline.contains("background-image") && inline.contains("url(") {
        return Ok(true);
    }
    let image = document.computed_style(node)?.background_image;
    Ok(image != "none" && image.contains("url("))
}

/// Tracks background marks and styled shadow roots for one engine.
#[derive(Debug, Default)]
pub struct MediaProtection {
    /// Elements this engine tagged with [`BACKGROUND_MARK_ATTR`].
    marked: Vec<NodeKey>,
    /// Shadow roots already visited, with the sheet injected into each.
    shadow_sheets: Vec<(NodeKey, NodeKey)>,
    visited_roots: HashSet<NodeKey>,
}

/// Counters of one shadow scan.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ScanSummary {
    pub nodes_visited: usize,
    pub sheets_injected: usize,
    pub truncated: bool,
}

impl MediaProtection {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Elements currently carrying the background mark.
    #[inline]
    #[must_use]
    pub fn marked(&self) -> &[NodeKey] {
        &self.marked
    }

    /// Tag `node` when it paints a raster background and holds no
    /// video/canvas of its own. Idempotent.
    ///
    /// # Returns
    ///
    /// `true` when the node was newly marked.
    pub fn mark_background_node(&mut self, document: &mut Document, node: NodeKey) -> bool {
        if !document.is_element(node)
            || document.attribute(node, BACKGROUND_MARK_ATTR) == Some("true")
            || SelectorList::parse(INTERACTIVE_MEDIA)
                .is_some_and(|media| document.matches(node, &media))
        {
            return false;
        }
        match has_raster_background(document, node) {
            Ok(true) => {}
            Ok(false) => return false,
            Err(err) => {
                trace!("background lookup failed for {node:?}: {err}");
                return false;
            }
        }
        if involves_interactive_media(document, node) {
            return false;
        }
        if let Err(err) = document.set_attribute(node, BACKGROUND_MARK_ATTR, "true") {
            warn!("could not mark {node:?}: {err}");
            return false;
        }
        self.marked.push(node);
        true
    }

    /// Eager pass over the whole document.
    pub fn initial_pass(&mut self, document: &mut Document) -> usize {
        let candidates = document.select_all(document.document_node(), BACKGROUND_CANDIDATES);
        let marked = candidates
            .into_iter()
            .filter(|node| self.mark_background_node(document, *node))
            .count();
        debug!("background pass marked {marked} elements");
        marked
    }

    /// Cheap pass over a freshly inserted subtree.
    pub fn scan_subtree(&mut self, document: &mut Document, root: NodeKey) -> usize {
        let mut marked = usize::from(self.mark_background_node(document, root));
        for node in document.select_all(root, SUBTREE_CANDIDATES) {
            marked += usize::from(self.mark_background_node(document, node));
        }
        marked
    }

    /// Breadth-first walk from `start`, descending into shadow trees,
    /// injecting the scoped sheet into every shadow root not seen before.
    /// Stops after `cap` nodes.
    pub fn scan_shadow_roots(
        &mut self,
        document: &mut Document,
        start: NodeKey,
        cap: usize,
        sheet_id: &str,
    ) -> ScanSummary {
        let mut summary = ScanSummary::default();
        let mut queue = VecDeque::from([start]);
        while let Some(node) = queue.pop_front() {
            if summary.nodes_visited >= cap {
                summary.truncated = true;
                break;
            }
            summary.nodes_visited += 1;
            if let Some(root) = document.shadow_root(node) {
                if self.visited_roots.insert(root) {
                    match inject_shadow_sheet(document, root, sheet_id) {
                        Ok(Some(sheet)) => {
                            self.shadow_sheets.push((root, sheet));
                            summary.sheets_injected += 1;
                        }
                        Ok(None) => {}
                        Err(err) => warn!("could not style shadow root {root:?}: {err}"),
                    }
                }
                queue.extend(
                    document
                        .children(root)
                        .into_iter()
                        .filter(|child| document.is_element(*child)),
                );
            }
            queue.extend(
                document
                    .children(node)
                    .into_iter()
                    .filter(|child| document.is_element(*child)),
            );
        }
        trace!(
            "shadow scan visited {} nodes, injected {} sheets",
            summary.nodes_visited,
            summary.sheets_injected
        );
        summary
    }

    /// Remove every mark and shadow sheet this engine added.
    pub fn clear(&mut self, document: &mut Document) {
        for node in self.marked.drain(..) {
            document.remove_attribute(node, BACKGROUND_MARK_ATTR);
        }
        for (_, sheet) in self.shadow_sheets.drain(..) {
            document.remove(sheet);
        }
        self.visited_roots.clear();
    }

    /// Whether `node` is a shadow sheet this engine injected.
    pub fn owns_sheet(&self, node: NodeKey) -> bool {
        self.shadow_sheets.iter().any(|(_, sheet)| *sheet == node)
    }
}

/// Append the scoped sheet unless the root already carries one.
fn inject_shadow_sheet(
    document: &mut Document,
    root: NodeKey,
    sheet_id: &str,
) -> Result<Option<NodeKey>> {
    if document.element_by_id(root, sheet_id).is_some() {
        return Ok(None);
    }
    let sheet = document.create_element("style");
    document.set_attribute(sheet, "id", sheet_id)?;
    document.set_text_content(sheet, &shadow_style())?;
    document.append_child(root, sheet)?;
    Ok(Some(sheet))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compositor::BASE_FILTER;
    use dom::LayoutRect;

    fn attach(document: &mut Document, parent: NodeKey, tag: &str) -> NodeKey {
        let node = document.create_element(tag);
        document.append_child(parent, node).unwrap();
        node
    }

    #[test]
    fn small_or_hidden_media_is_not_dominant() {
        let mut document = Document::new("example.com");
        let body = document.body().unwrap();
        let video = attach(&mut document, body, "video");
        document.set_layout_rect(video, LayoutRect::new(0.0, 0.0, 48.0, 300.0));
        assert!(!has_visible_media_surface(&document, 48.0));
        document.set_layout_rect(video, LayoutRect::new(0.0, 0.0, 640.0, 360.0));
        assert!(has_visible_media_surface(&document, 48.0));
        document.set_style_text(video, "visibility: hidden").unwrap();
        assert!(!has_visible_media_surface(&document, 48.0));
    }

    #[test]
    fn background_marking_skips_media_containers() {
        let mut document = Document::new("example.com");
        let body = document.body().unwrap();
        let hero = attach(&mut document, body, "div");
        document
            .set_style_text(hero, "background-image: url(hero.jpg)")
            .unwrap();
        let player = attach(&mut document, body, "div");
        document
            .set_style_text(player, "background-image: url(poster.jpg)")
            .unwrap();
        attach(&mut document, player, "video");

        let mut protection = MediaProtection::new();
        assert_eq!(protection.initial_pass(&mut document), 1);
        assert_eq!(document.attribute(hero, BACKGROUND_MARK_ATTR), Some("true"));
        assert_eq!(document.attribute(player, BACKGROUND_MARK_ATTR), None);
        assert!(!protection.mark_background_node(&mut document, hero));

        protection.clear(&mut document);
        assert_eq!(document.attribute(hero, BACKGROUND_MARK_ATTR), None);
    }

    #[test]
    fn computed_backgrounds_from_sheets_are_marked() {
        let mut document = Document::new("example.com");
        let head = document.head().unwrap();
        let body = document.body().unwrap();
        let sheet = attach(&mut document, head, "style");
        document
            .set_text_content(sheet, ".banner { background: #333 url(banner.png) }")
            .unwrap();
        let banner = attach(&mut document, body, "section");
        document.set_attribute(banner, "class", "banner").unwrap();
        let mut protection = MediaProtection::new();
        assert_eq!(protection.scan_subtree(&mut document, body), 1);
        assert_eq!(protection.marked(), &[banner]);
    }

    #[test]
    fn shadow_scan_injects_once_per_root_and_respects_the_cap() {
        let mut document = Document::new("example.com");
        let body = document.body().unwrap();
        let host = attach(&mut document, body, "x-player");
        let shadow = document.attach_shadow(host).unwrap();
        let nested_host = attach(&mut document, shadow, "x-inner");
        let nested = document.attach_shadow(nested_host).unwrap();

        let mut protection = MediaProtection::new();
        let summary = protection.scan_shadow_roots(&mut document, body, 600, "dm-shadow");
        assert_eq!(summary.sheets_injected, 2);
        assert!(document.element_by_id(shadow, "dm-shadow").is_some());
        assert!(document.element_by_id(nested, "dm-shadow").is_some());

        let again = protection.scan_shadow_roots(&mut document, body, 600, "dm-shadow");
        assert_eq!(again.sheets_injected, 0);

        for _ in 0..10 {
            attach(&mut document, body, "div");
        }
        let capped = protection.scan_shadow_roots(&mut document, body, 3, "dm-shadow");
        assert_eq!(capped.nodes_visited, 3);
        assert!(capped.truncated);
    }

    #[test]
    fn shadow_sheets_counter_invert_inner_media() {
        let mut document = Document::new("example.com");
        let body = document.body().unwrap();
        let host = attach(&mut document, body, "x-card");
        let shadow = document.attach_shadow(host).unwrap();
        let img = attach(&mut document, shadow, "img");
        let mut protection = MediaProtection::new();
        protection.scan_shadow_roots(&mut document, body, 600, "dm-shadow");
        assert_eq!(
            document.computed_style(img).unwrap().filter,
            BASE_FILTER
        );
        protection.clear(&mut document);
        assert_eq!(document.computed_style(img).unwrap().filter, "none");
    }
}
