//! Dark-page heuristic.
//!
//! Decides whether a page is already dark, in which case inverting it would
//! make it light. Checks run in order and the first hit wins:
//!
//! 1. an explicit theme signal (`color-scheme: dark`, or a theme-style
//!    attribute containing "dark") on the root or `<body>`;
//! 2. both sampled backgrounds darker than the background threshold;
//! 3. a dark content background carrying light text.
//!
//! Measurement failures count as "not dark".

use crate::config::{DarkThresholds, EngineConfig, PENDING_CLASS};
use anyhow::{Result, anyhow};
use core::{fmt, iter};
use dom::{Document, NodeKey, Rgba, parse_css_color};
use log::{debug, trace, warn};

/// Attributes pages commonly use to declare a theme.
pub const THEME_ATTRIBUTES: [&str; 4] = ["data-theme", "theme", "data-mode", "data-color-mode"];

/// What made the heuristic classify a page as dark.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DarkSignal {
    /// `color-scheme` resolves to dark.
    ColorScheme,
    /// A theme attribute mentions "dark".
    ThemeAttribute(String),
    /// Root and content backgrounds are both dark.
    DarkBackground,
    /// Light text on a dark content background.
    LightTextOnDark,
}

impl fmt::Display for DarkSignal {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ColorScheme => formatter.write_str("color-scheme"),
            Self::ThemeAttribute(name) => write!(formatter, "theme attribute {name}"),
            Self::DarkBackground => formatter.write_str("dark background"),
            Self::LightTextOnDark => formatter.write_str("light text on dark background"),
        }
    }
}

/// Broadcast-luma luminance in `[0, 1]`.
#[inline]
#[must_use]
pub fn luminance(color: Rgba) -> f64 {
    (0.299 * f64::from(color.red) + 0.587 * f64::from(color.green) + 0.114 * f64::from(color.blue))
        / 255.0
}

fn is_transparent(color: Option<Rgba>) -> bool {
    color.is_none_or(Rgba::is_transparent)
}

fn declares_dark_scheme(value: &str) -> bool {
    let mut tokens = value.split_ascii_whitespace().map(str::to_ascii_lowercase);
    tokens.any(|token| token == "dark") && !value.to_ascii_lowercase().contains("light")
}

/// Classify the document, reporting the deciding signal for dark pages.
///
/// Reads the live computed styles; the caller is responsible for disabling
/// anything the engine itself applied.
pub fn detect_already_dark(document: &Document, thresholds: &DarkThresholds) -> Option<DarkSignal> {
    match classify(document, thresholds) {
        Ok(signal) => signal,
        Err(err) => {
            debug!("dark-page heuristic could not measure the page: {err}");
            None
        }
    }
}

fn classify(document: &Document, thresholds: &DarkThresholds) -> Result<Option<DarkSignal>> {
    let root = document
        .document_element()
        .ok_or_else(|| anyhow!("document has no root element"))?;
    let body = document.body();
    let root_style = document.computed_style(root)?;
    let body_style = body.map(|node| document.computed_style(node)).transpose()?;

    if declares_dark_scheme(&root_style.color_scheme)
        || body_style
            .as_ref()
            .is_some_and(|style| declares_dark_scheme(&style.color_scheme))
    {
        return Ok(Some(DarkSignal::ColorScheme));
    }

    let holders: Vec<NodeKey> = iter::once(root).chain(body).collect();
    for name in THEME_ATTRIBUTES {
        let mentions_dark = holders.iter().any(|node| {
            document
                .attribute(*node, name)
                .is_some_and(|value| value.to_ascii_lowercase().contains("dark"))
        });
        if mentions_dark {
            return Ok(Some(DarkSignal::ThemeAttribute(name.to_owned())));
        }
    }

    let root_bg = parse_css_color(&root_style.background_color);
    let body_bg = body_style
        .as_ref()
        .and_then(|style| parse_css_color(&style.background_color));
    if is_transparent(root_bg) && is_transparent(body_bg) {
        trace!("both backgrounds transparent; cannot assess");
        return Ok(None);
    }

    let root_lum = root_bg.map_or(1.0, luminance);
    let content_bg = if is_transparent(body_bg) { root_bg } else { body_bg };
    let body_lum = content_bg.map_or(root_lum, luminance);
    let text_lum = body_style
        .as_ref()
        .and_then(|style| parse_css_color(&style.color))
        .map(luminance);
    trace!("luminance root={root_lum:.3} content={body_lum:.3} text={text_lum:?}");

    if root_lum < thresholds.background && body_lum < thresholds.background {
        return Ok(Some(DarkSignal::DarkBackground));
    }
    if body_lum < thresholds.contrast_background
        && text_lum.is_some_and(|lum| lum > thresholds.contrast_text)
    {
        return Ok(Some(DarkSignal::LightTextOnDark));
    }
    Ok(None)
}

/// Run the heuristic with the pending guard lifted, so it sees the page's own
/// styling, then restore the guard exactly as it was.
pub fn detect_without_guard(document: &mut Document, config: &EngineConfig) -> Option<DarkSignal> {
    let root = document.document_element();
    let had_pending_class = root.is_some_and(|node| document.has_class(node, PENDING_CLASS));
    let pending_sheet =
        document.element_by_id(document.document_node(), &config.pending_style_id());
    let was_disabled = pending_sheet.is_some_and(|sheet| document.is_sheet_disabled(sheet));

    if let Some(node) = root.filter(|_| had_pending_class)
        && let Err(err) = document.remove_class(node, PENDING_CLASS)
    {
        warn!("could not lift pending class: {err}");
    }
    if let Some(sheet) = pending_sheet {
        document.set_sheet_disabled(sheet, true);
    }

    let verdict = detect_already_dark(document, &config.thresholds);

    if let Some(sheet) = pending_sheet {
        document.set_sheet_disabled(sheet, was_disabled);
    }
    if let Some(node) = root.filter(|_| had_pending_class)
        && let Err(err) = document.add_class(node, PENDING_CLASS)
    {
        warn!("could not restore pending class: {err}");
    }
    verdict
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(root_style: &str, body_style: &str) -> Document {
        let mut document = Document::new("example.com");
        let root = document.document_element().unwrap();
        let body = document.body().unwrap();
        document.set_style_text(root, root_style).unwrap();
        document.set_style_text(body, body_style).unwrap();
        document
    }

    #[test]
    fn luma_weights() {
        assert!((luminance(Rgba::BLACK) - 0.0).abs() < f64::EPSILON);
        let white = parse_css_color("#fff").unwrap();
        assert!((luminance(white) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn white_page_is_not_dark() {
        let document = page("background-color: rgb(255, 255, 255)", "");
        assert_eq!(detect_already_dark(&document, &DarkThresholds::default()), None);
    }

    #[test]
    fn transparent_backgrounds_cannot_be_assessed() {
        let document = page("", "color: white");
        assert_eq!(detect_already_dark(&document, &DarkThresholds::default()), None);
    }

    #[test]
    fn dark_body_with_transparent_root_is_dark() {
        let document = page("", "background: rgb(10, 10, 10); color: rgb(230, 230, 230)");
        assert_eq!(
            detect_already_dark(&document, &DarkThresholds::default()),
            Some(DarkSignal::DarkBackground)
        );
    }

    #[test]
    fn light_text_on_mid_dark_background_is_dark() {
        let document = page(
            "background-color: rgb(255, 255, 255)",
            "background-color: rgb(50, 50, 50); color: rgb(240, 240, 240)",
        );
        assert_eq!(
            detect_already_dark(&document, &DarkThresholds::default()),
            Some(DarkSignal::LightTextOnDark)
        );
    }

    #[test]
    fn theme_signals_win_over_backgrounds() {
        let mut document = page("background-color: #fff", "");
        let root = document.document_element().unwrap();
        document.set_attribute(root, "data-color-mode", "Dark").unwrap();
        assert_eq!(
            detect_already_dark(&document, &DarkThresholds::default()),
            Some(DarkSignal::ThemeAttribute("data-color-mode".to_owned()))
        );

        let scheme = page("background-color: #fff; color-scheme: dark", "");
        assert_eq!(
            detect_already_dark(&scheme, &DarkThresholds::default()),
            Some(DarkSignal::ColorScheme)
        );
    }

    #[test]
    fn restricted_root_counts_as_not_dark() {
        let mut document = page("background: #000", "background: #000");
        let root = document.document_element().unwrap();
        document.set_restricted(root, true);
        assert_eq!(detect_already_dark(&document, &DarkThresholds::default()), None);
    }
}
