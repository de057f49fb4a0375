//! A small author-level cascade.
//!
//! Rules come from the enabled `<style>` elements of the element's own tree
//! scope; declarations from other scopes never apply. Candidates are ordered
//! by (important, inline, specificity, source order) and applied in turn.
//! `color`, `visibility`, and `color-scheme` inherit through the flat tree.

use crate::NodeKey;
use crate::color::parse_css_color;
use crate::document::Document;
use crate::selectors::Specificity;
use crate::style_attr::{Declaration, split_top_level};
use crate::syntax::{StyleRule, parse_stylesheet};

/// Resolved values of the properties the engine inspects.
///
/// Colours are serialised as `rgb()`/`rgba()`; other values are reported as
/// specified.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ComputedStyle {
    pub background_color: String,
    pub background_image: String,
    pub color: String,
    pub color_scheme: String,
    pub display: String,
    pub visibility: String,
    pub filter: String,
    pub mix_blend_mode: String,
    pub min_height: String,
}

impl ComputedStyle {
    /// Initial values for an element with tag `tag`.
    fn initial(tag: &str) -> Self {
        Self {
            background_color: "rgba(0, 0, 0, 0)".to_owned(),
            background_image: "none".to_owned(),
            color: "rgb(0, 0, 0)".to_owned(),
            color_scheme: "normal".to_owned(),
            display: default_display(tag).to_owned(),
            visibility: "visible".to_owned(),
            filter: "none".to_owned(),
            mix_blend_mode: "normal".to_owned(),
            min_height: "auto".to_owned(),
        }
    }

    /// Initial values with inherited properties taken from `parent`.
    fn inheriting(tag: &str, parent: &Self) -> Self {
        Self {
            color: parent.color.clone(),
            color_scheme: parent.color_scheme.clone(),
            visibility: parent.visibility.clone(),
            ..Self::initial(tag)
        }
    }
}

fn default_display(tag: &str) -> &'static str {
    match tag {
        "head" | "style" | "script" | "template" | "noscript" | "meta" | "link" | "title" => {
            "none"
        }
        "html" | "body" | "div" | "section" | "article" | "main" | "header" | "footer" | "nav"
        | "aside" | "p" | "ul" | "ol" | "form" | "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
            "block"
        }
        "li" => "list-item",
        _ => "inline",
    }
}

struct Candidate<'decl> {
    important: bool,
    inline: bool,
    specificity: Specificity,
    order: usize,
    declaration: &'decl Declaration,
}

/// Compute the style of a connected element. Access checks are the caller's.
pub(crate) fn compute(document: &Document, node: NodeKey) -> ComputedStyle {
    let tag = document.tag(node).unwrap_or_default();
    let parent_style = document
        .flat_parent(node)
        .filter(|parent| document.is_element(*parent))
        .map(|parent| compute(document, parent));
    let mut style = parent_style.as_ref().map_or_else(
        || ComputedStyle::initial(tag),
        |parent| ComputedStyle::inheriting(tag, parent),
    );

    let scope = document.tree_scope(node);
    let sheets: Vec<Vec<StyleRule>> = document
        .style_sheets(scope)
        .into_iter()
        .map(|sheet| parse_stylesheet(&document.text_content(sheet)))
        .collect();
    let inline = document.inline_style(node);

    let mut candidates = Vec::new();
    let mut order = 0usize;
    for rule in sheets.iter().flatten() {
        let Some(specificity) = rule.selectors.matching_specificity(node, document) else {
            continue;
        };
        for declaration in &rule.declarations {
            candidates.push(Candidate {
                important: declaration.important,
                inline: false,
                specificity,
                order,
                declaration,
            });
            order += 1;
        }
    }
    for declaration in &inline {
        candidates.push(Candidate {
            important: declaration.important,
            inline: true,
            specificity: Specificity::default(),
            order,
            declaration,
        });
        order += 1;
    }
    candidates.sort_by_key(|candidate| {
        (
            candidate.important,
            candidate.inline,
            candidate.specificity,
            candidate.order,
        )
    });

    for candidate in candidates {
        apply_declaration(&mut style, candidate.declaration, parent_style.as_ref());
    }
    style
}

fn apply_declaration(
    style: &mut ComputedStyle,
    decl: &Declaration,
    parent: Option<&ComputedStyle>,
) {
    let value = decl.value.trim();
    let inherit = value.eq_ignore_ascii_case("inherit");
    match decl.property.as_str() {
        "background-color" => {
            if inherit {
                if let Some(parent) = parent {
                    style.background_color.clone_from(&parent.background_color);
                }
            } else if let Some(color) = parse_css_color(value) {
                style.background_color = color.to_string();
            }
        }
        "background" => apply_background_shorthand(style, value),
        "background-image" => value.clone_into(&mut style.background_image),
        "color" => {
            if inherit {
                if let Some(parent) = parent {
                    style.color.clone_from(&parent.color);
                }
            } else if let Some(color) = parse_css_color(value) {
                style.color = color.to_string();
            }
        }
        "color-scheme" => value.to_ascii_lowercase().clone_into(&mut style.color_scheme),
        "display" => value.to_ascii_lowercase().clone_into(&mut style.display),
        "visibility" => value.to_ascii_lowercase().clone_into(&mut style.visibility),
        "filter" => value.clone_into(&mut style.filter),
        "mix-blend-mode" => value.to_ascii_lowercase().clone_into(&mut style.mix_blend_mode),
        "min-height" => value.clone_into(&mut style.min_height),
        _ => {}
    }
}

/// `background` resets colour and image, then picks them out of its tokens.
fn apply_background_shorthand(style: &mut ComputedStyle, value: &str) {
    "rgba(0, 0, 0, 0)".clone_into(&mut style.background_color);
    "none".clone_into(&mut style.background_image);
    for token in split_top_level(value, ' ') {
        let token = token.trim();
        if token.is_empty() {
            continue;
        }
        let lowered = token.to_ascii_lowercase();
        if lowered.starts_with("url(") || lowered.contains("gradient(") {
            token.clone_into(&mut style.background_image);
        } else if let Some(color) = parse_css_color(token) {
            style.background_color = color.to_string();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn background_shorthand_splits_colour_and_image() {
        let mut style = ComputedStyle::initial("div");
        apply_background_shorthand(&mut style, "rgb(32, 64, 96) url(a.png) no-repeat");
        assert_eq!(style.background_color, "rgb(32, 64, 96)");
        assert_eq!(style.background_image, "url(a.png)");
    }
}
