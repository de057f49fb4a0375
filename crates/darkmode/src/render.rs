//! Render primitives: the artifacts a render writes into the document.
//!
//! One main `<style>` element, one pending-guard sheet, and two overlay
//! `<div>`s per document, all located by id and updated in place.

use crate::compositor::{RenderPlan, pending_style};
use crate::config::{EngineConfig, PENDING_CLASS, ROOT_MARKER_ATTR};
use anyhow::{Result, anyhow};
use dom::{Document, NodeKey};
use log::trace;

#[derive(Debug)]
pub struct Renderer {
    style_id: String,
    mask_id: String,
    tone_mask_id: String,
    pending_id: String,
    preboot_id: String,
    /// Inline `min-height` of the root before the guard replaced it.
    previous_min_height: Option<String>,
    /// Root `class` and `style` as the guard writes last left them.
    root_echo: Vec<(&'static str, Option<String>)>,
}

/// Root attributes the pending guard writes to.
const GUARDED_ROOT_ATTRS: [&str; 2] = ["class", "style"];

impl Renderer {
    #[must_use]
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            style_id: config.style_id().to_owned(),
            mask_id: config.mask_id(),
            tone_mask_id: config.tone_mask_id(),
            pending_id: config.pending_style_id(),
            preboot_id: config.preboot_style_id(),
            previous_min_height: None,
            root_echo: Vec::new(),
        }
    }

    fn find(document: &Document, id: &str) -> Option<NodeKey> {
        document.element_by_id(document.document_node(), id)
    }

    fn root(document: &Document) -> Result<NodeKey> {
        document
            .document_element()
            .ok_or_else(|| anyhow!("document has no root element"))
    }

    /// The `<style>` element with `id`, created in `<head>` (or the root) when missing.
    fn ensure_sheet(document: &mut Document, id: &str) -> Result<NodeKey> {
        if let Some(existing) = Self::find(document, id) {
            return Ok(existing);
        }
        let parent = match document.head() {
            Some(head) => head,
            None => Self::root(document)?,
        };
        let sheet = document.create_element("style");
        document.set_attribute(sheet, "id", id)?;
        document.append_child(parent, sheet)?;
        Ok(sheet)
    }

    fn write_sheet(document: &mut Document, sheet: NodeKey, text: &str) -> Result<()> {
        if document.text_content(sheet) != text {
            document.set_text_content(sheet, text)?;
        }
        Ok(())
    }

    fn remember_root(&mut self, document: &Document, root: NodeKey) {
        self.root_echo = GUARDED_ROOT_ATTRS
            .into_iter()
            .map(|name| (name, document.attribute(root, name).map(str::to_owned)))
            .collect();
    }

    fn remove_by_id(document: &mut Document, id: &str) {
        if let Some(node) = Self::find(document, id) {
            document.remove(node);
        }
    }

    /// Apply the flicker guard: root class, `min-height: 100vh`, and the
    /// pending sheet.
    ///
    /// # Errors
    ///
    /// Returns an error if the document has no root element or rejects a write.
    pub fn mount_pending(&mut self, document: &mut Document, media: &str) -> Result<()> {
        let root = Self::root(document)?;
        if self.previous_min_height.is_none() {
            self.previous_min_height =
                Some(document.style_property(root, "min-height").unwrap_or_default());
        }
        document.add_class(root, PENDING_CLASS)?;
        document.set_style_property(root, "min-height", "100vh")?;
        let sheet = Self::ensure_sheet(document, &self.pending_id)?;
        Self::write_sheet(document, sheet, &pending_style(PENDING_CLASS, media))?;
        self.remember_root(document, root);
        trace!("pending guard mounted");
        Ok(())
    }

    /// Remove the guard (and any external preboot sheet), restoring the root's
    /// previous `min-height`.
    ///
    /// # Errors
    ///
    /// Returns an error if the root rejects a write.
    pub fn unmount_pending(&mut self, document: &mut Document) -> Result<()> {
        let root = Self::root(document)?;
        document.remove_class(root, PENDING_CLASS)?;
        Self::remove_by_id(document, &self.pending_id);
        Self::remove_by_id(document, &self.preboot_id);
        if let Some(previous) = self.previous_min_height.take() {
            if previous.is_empty() {
                document.remove_style_property(root, "min-height")?;
            } else {
                document.set_style_property(root, "min-height", &previous)?;
            }
        }
        self.remember_root(document, root);
        Ok(())
    }

    /// Write the root marker and main sheet of `plan`.
    ///
    /// # Errors
    ///
    /// Returns an error if the document rejects a write.
    pub fn apply_sheet(&self, document: &mut Document, plan: &RenderPlan) -> Result<()> {
        let root = Self::root(document)?;
        match plan.root_marker {
            Some(marker) => {
                if document.attribute(root, ROOT_MARKER_ATTR) != Some(marker) {
                    document.set_attribute(root, ROOT_MARKER_ATTR, marker)?;
                }
            }
            None => document.remove_attribute(root, ROOT_MARKER_ATTR),
        }
        let sheet = Self::ensure_sheet(document, &self.style_id)?;
        Self::write_sheet(document, sheet, &plan.style_text)
    }

    /// Create, update, or remove the two overlays per `plan`.
    ///
    /// # Errors
    ///
    /// Returns an error if the document rejects a write.
    pub fn apply_overlays(&self, document: &mut Document, plan: &RenderPlan) -> Result<()> {
        Self::apply_overlay(document, &self.mask_id, plan.mask_style.as_deref())?;
        Self::apply_overlay(document, &self.tone_mask_id, plan.tone_style.as_deref())
    }

    fn apply_overlay(document: &mut Document, id: &str, style: Option<&str>) -> Result<()> {
        let existing = Self::find(document, id);
        let Some(style) = style else {
            if let Some(node) = existing {
                document.remove(node);
            }
            return Ok(());
        };
        let overlay = match existing {
            Some(node) => node,
            None => {
                let root = Self::root(document)?;
                let node = document.create_element("div");
                document.set_attribute(node, "id", id)?;
                document.append_child(root, node)?;
                node
            }
        };
        if document.attribute(overlay, "style") != Some(style) {
            document.set_style_text(overlay, style)?;
        }
        Ok(())
    }

    /// Full render of a resolved state: marker, sheet, guard removal, overlays.
    ///
    /// # Errors
    ///
    /// Returns an error if the document rejects a write.
    pub fn render(&mut self, document: &mut Document, plan: &RenderPlan) -> Result<()> {
        self.apply_sheet(document, plan)?;
        self.unmount_pending(document)?;
        self.apply_overlays(document, plan)
    }

    /// Strip every artifact: marker, guard, main sheet, overlays.
    ///
    /// # Errors
    ///
    /// Returns an error if the root rejects a write.
    pub fn cleanup(&mut self, document: &mut Document) -> Result<()> {
        if let Some(root) = document.document_element() {
            document.remove_attribute(root, ROOT_MARKER_ATTR);
        }
        self.unmount_pending(document)?;
        for id in [&self.style_id, &self.mask_id, &self.tone_mask_id] {
            Self::remove_by_id(document, id);
        }
        Ok(())
    }

    /// Whether attribute `name` of the root still holds what this renderer
    /// wrote there, so a change record for it echoes the renderer's own write.
    pub fn is_own_root_write(&self, document: &Document, root: NodeKey, name: &str) -> bool {
        name == ROOT_MARKER_ATTR
            || self
                .root_echo
                .iter()
                .any(|(attr, value)| {
                    *attr == name && document.attribute(root, attr) == value.as_deref()
                })
    }

    /// Whether `node` is one of this renderer's artifacts (or text inside one).
    pub fn is_artifact(&self, document: &Document, node: NodeKey) -> bool {
        let owned = |candidate: NodeKey| {
            document.id(candidate).is_some_and(|id| {
                [
                    &self.style_id,
                    &self.mask_id,
                    &self.tone_mask_id,
                    &self.pending_id,
                ]
                .into_iter()
                .any(|own| own == id)
            })
        };
        owned(node) || (!document.is_element(node) && document.parent(node).is_some_and(owned))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compositor::{MEDIA_SELECTOR, compose};
    use crate::settings::{SettingsPatch, SiteVisualState};
    use crate::state::RenderState;

    fn enabled() -> SiteVisualState {
        SiteVisualState {
            enabled: true,
            ..SiteVisualState::DEFAULTS
        }
    }

    #[test]
    fn pending_guard_restores_min_height() {
        let config = EngineConfig::default();
        let mut renderer = Renderer::new(&config);
        let mut document = Document::new("example.com");
        let root = document.document_element().unwrap();
        document.set_style_text(root, "min-height: 50vh").unwrap();

        renderer.mount_pending(&mut document, MEDIA_SELECTOR).unwrap();
        renderer.mount_pending(&mut document, MEDIA_SELECTOR).unwrap();
        assert!(document.has_class(root, PENDING_CLASS));
        assert_eq!(document.style_property(root, "min-height").as_deref(), Some("100vh"));
        assert_eq!(document.computed_style(root).unwrap().background_color, "rgb(255, 255, 255)");

        renderer.unmount_pending(&mut document).unwrap();
        assert!(!document.has_class(root, PENDING_CLASS));
        assert_eq!(document.style_property(root, "min-height").as_deref(), Some("50vh"));
        assert!(Renderer::find(&document, "darkmode-pro-pending").is_none());
    }

    #[test]
    fn render_updates_artifacts_in_place() {
        let config = EngineConfig::default();
        let mut renderer = Renderer::new(&config);
        let mut document = Document::new("example.com");
        let plan = compose(RenderState::ResolvedOn, &enabled(), false, MEDIA_SELECTOR, &config);
        renderer.render(&mut document, &plan).unwrap();
        let sheet = Renderer::find(&document, "darkmode-pro").unwrap();
        let mask = Renderer::find(&document, "darkmode-pro-mask").unwrap();

        let dimmer = enabled().patched(&SettingsPatch::new().brightness(60));
        let plan = compose(RenderState::ResolvedOn, &dimmer, false, MEDIA_SELECTOR, &config);
        renderer.render(&mut document, &plan).unwrap();
        assert_eq!(Renderer::find(&document, "darkmode-pro"), Some(sheet));
        assert_eq!(Renderer::find(&document, "darkmode-pro-mask"), Some(mask));
        assert!(document.attribute(mask, "style").unwrap().contains("rgba(0,0,0,0.4)"));
        assert!(renderer.is_artifact(&document, mask));
        assert!(renderer.is_artifact(&document, document.children(sheet)[0]));
    }

    #[test]
    fn root_echo_tells_guard_writes_from_page_writes() {
        let config = EngineConfig::default();
        let mut renderer = Renderer::new(&config);
        let mut document = Document::new("example.com");
        let root = document.document_element().unwrap();
        assert!(!renderer.is_own_root_write(&document, root, "class"));

        renderer.mount_pending(&mut document, MEDIA_SELECTOR).unwrap();
        assert!(renderer.is_own_root_write(&document, root, "class"));
        assert!(renderer.is_own_root_write(&document, root, "style"));
        renderer.unmount_pending(&mut document).unwrap();
        assert!(renderer.is_own_root_write(&document, root, "class"));
        assert!(renderer.is_own_root_write(&document, root, ROOT_MARKER_ATTR));

        document.add_class(root, "theater").unwrap();
        assert!(!renderer.is_own_root_write(&document, root, "class"));
        assert!(renderer.is_own_root_write(&document, root, "style"));
    }

    #[test]
    fn preboot_sheet_is_removed_with_the_guard() {
        let config = EngineConfig::default();
        let mut renderer = Renderer::new(&config);
        let mut document = Document::new("example.com");
        let head = document.head().unwrap();
        let preboot = document.create_element("style");
        document.set_attribute(preboot, "id", "darkmode-pro-preboot").unwrap();
        document.append_child(head, preboot).unwrap();
        renderer.unmount_pending(&mut document).unwrap();
        assert!(!document.is_connected(preboot));
    }

    #[test]
    fn cleanup_strips_everything() {
        let config = EngineConfig::default();
        let mut renderer = Renderer::new(&config);
        let mut document = Document::new("example.com");
        let plan = compose(RenderState::ResolvedOn, &enabled(), false, MEDIA_SELECTOR, &config);
        renderer.render(&mut document, &plan).unwrap();
        renderer.cleanup(&mut document).unwrap();
        let root = document.document_element().unwrap();
        assert_eq!(document.attribute(root, ROOT_MARKER_ATTR), None);
        for id in ["darkmode-pro", "darkmode-pro-mask", "darkmode-pro-tone-mask"] {
            assert!(Renderer::find(&document, id).is_none());
        }
    }
}
