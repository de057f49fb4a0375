//! Filter composition.
//!
//! Turns settings plus a render state into a [`RenderPlan`]: the root marker,
//! the text of the main style sheet, and the two overlays. Brightness is an
//! overlay rather than a filter, and sepia is a multiply-blended warm overlay
//! that is dropped while a dominant video or canvas is on screen.

use crate::config::{EngineConfig, ROOT_MARKER_ATTR};
use crate::protection::BACKGROUND_MARK_ATTR;
use crate::settings::SiteVisualState;
use crate::site::host_in_list;
use crate::state::RenderState;
use core::fmt::Write as _;

/// Page-wide inversion; applied twice it cancels out.
pub const BASE_FILTER: &str = "invert(1) hue-rotate(180deg)";

/// Media selector when canvas is protected.
pub const MEDIA_SELECTOR: &str = "img, video, canvas, svg";
/// Media selector on canvas-exempt sites.
pub const MEDIA_SELECTOR_NO_CANVAS: &str = "img, video, svg";

/// Filters after the dominant-media adjustment.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EffectiveFilters {
    pub brightness: u16,
    pub contrast: u16,
    pub sepia: u16,
    pub grayscale: u16,
}

/// Everything a render writes to the document.
#[derive(Clone, Debug, PartialEq)]
pub struct RenderPlan {
    pub state: RenderState,
    /// Value of the root marker attribute; `None` removes it.
    pub root_marker: Option<&'static str>,
    /// Text of the main style element.
    pub style_text: String,
    /// Inline style of the brightness overlay; `None` removes it.
    pub mask_style: Option<String>,
    /// Inline style of the tone overlay; `None` removes it.
    pub tone_style: Option<String>,
}

/// The media selector for `hostname`.
#[must_use]
pub fn media_selector(hostname: &str, canvas_exempt_sites: &[String]) -> &'static str {
    if host_in_list(hostname, canvas_exempt_sites) {
        MEDIA_SELECTOR_NO_CANVAS
    } else {
        MEDIA_SELECTOR
    }
}

/// Neutralise colour adjustments while media is visible; brightness stays.
#[must_use]
pub const fn effective_filters(
    settings: &SiteVisualState,
    media_visible: bool,
) -> EffectiveFilters {
    if media_visible {
        EffectiveFilters {
            brightness: settings.brightness,
            contrast: 100,
            sepia: 0,
            grayscale: 0,
        }
    } else {
        EffectiveFilters {
            brightness: settings.brightness,
            contrast: settings.contrast,
            sepia: settings.sepia,
            grayscale: settings.grayscale,
        }
    }
}

/// Contrast and grayscale functions appended to the base filter. Neutral
/// values are omitted.
#[must_use]
pub fn user_filter_chain(filters: &EffectiveFilters) -> String {
    let mut parts: Vec<String> = Vec::new();
    if filters.contrast != 100 {
        parts.push(format!("contrast({}%)", filters.contrast));
    }
    if filters.grayscale != 0 {
        parts.push(format!("grayscale({}%)", filters.grayscale));
    }
    parts.join(" ")
}

/// Brightness overlay opacity: `(100 - brightness) / 100`, never negative.
#[must_use]
pub fn mask_opacity(brightness: u16) -> f64 {
    ((100.0 - f64::from(brightness)) / 100.0).max(0.0)
}

/// Tone overlay opacity, linear in sepia and capped at `cap`.
#[must_use]
pub fn sepia_overlay_opacity(sepia: u16, cap: f64) -> f64 {
    (f64::from(sepia.min(100)) / 100.0 * cap).min(cap)
}

/// Four decimal places, trailing zeros trimmed.
fn format_opacity(value: f64) -> String {
    let rounded = (value * 10_000.0).round() / 10_000.0;
    format!("{rounded}")
}

/// Inline style of the brightness overlay.
#[must_use]
pub fn mask_style(opacity: f64) -> String {
    format!(
        "position:fixed;inset:0;background:rgba(0,0,0,{});pointer-events:none;z-index:2147483647",
        format_opacity(opacity)
    )
}

/// Inline style of the tone overlay.
#[must_use]
pub fn tone_style(opacity: f64) -> String {
    format!(
        "position:fixed;inset:0;background:rgba(255,214,170,{});mix-blend-mode:multiply;pointer-events:none;z-index:2147483646",
        format_opacity(opacity)
    )
}

/// Sheet of the pending guard.
#[must_use]
pub fn pending_style(pending_class: &str, media: &str) -> String {
    format!(
        "html.{pending_class} {{ background-color: #fff !important; filter: {BASE_FILTER} !important; }}\n\
         html.{pending_class} :is({media}) {{ filter: {BASE_FILTER} !important; }}\n"
    )
}

/// Sheet injected into every shadow root.
#[must_use]
pub fn shadow_style() -> String {
    format!(
        ":is(img, video, svg, canvas) {{ filter: {BASE_FILTER} !important; }}\n\
         :is([style*=\"background-image\"], [{BACKGROUND_MARK_ATTR}=\"true\"]) {{ filter: {BASE_FILTER} !important; }}\n"
    )
}

fn mask_rule(out: &mut String, mask_id: &str, opacity: f64) {
    let _ignored = writeln!(
        out,
        "#{mask_id} {{ position: fixed; inset: 0; background: rgba(0, 0, 0, {}); pointer-events: none; z-index: 2147483647; }}",
        format_opacity(opacity)
    );
}

/// Build the main sheet text for `state`.
#[must_use]
pub fn main_style(
    state: RenderState,
    filters: &EffectiveFilters,
    media: &str,
    mask_id: &str,
) -> String {
    let mut out = String::new();
    let opacity = mask_opacity(filters.brightness);
    match state {
        RenderState::ResolvedOn => {
            let chain = user_filter_chain(filters);
            let page_filter = if chain.is_empty() {
                BASE_FILTER.to_owned()
            } else {
                format!("{BASE_FILTER} {chain}")
            };
            let on = format!("html[{ROOT_MARKER_ATTR}=\"on\"]");
            let _ignored = writeln!(
                out,
                "{on} {{ background-color: #fff !important; filter: {page_filter} !important; }}"
            );
            let _ignored = writeln!(
                out,
                "{on} :is({media}), {on} [{BACKGROUND_MARK_ATTR}=\"true\"], {on} [style*=\"background-image\"] {{ filter: {BASE_FILTER} !important; mix-blend-mode: normal !important; }}"
            );
            let _ignored = writeln!(
                out,
                "{on} [{BACKGROUND_MARK_ATTR}=\"true\"] :is(img, video, svg, canvas) {{ filter: none !important; }}"
            );
            mask_rule(&mut out, mask_id, opacity);
        }
        RenderState::ResolvedAlreadyDark => {
            let _ignored = writeln!(
                out,
                "html[{ROOT_MARKER_ATTR}=\"already-dark\"] body :is({media}) {{ filter: none !important; }}"
            );
            mask_rule(&mut out, mask_id, opacity);
        }
        RenderState::Init | RenderState::Pending | RenderState::Disabled => {}
    }
    out
}

/// Compose the full plan for `state`.
///
/// # Arguments
///
/// * `state` - State to render
/// * `settings` - Current site settings
/// * `media_visible` - Whether a dominant video/canvas surface is on screen
/// * `media` - Media selector for the current host
/// * `config` - Ids and the sepia cap
#[must_use]
pub fn compose(
    state: RenderState,
    settings: &SiteVisualState,
    media_visible: bool,
    media: &str,
    config: &EngineConfig,
) -> RenderPlan {
    let filters = effective_filters(settings, media_visible);
    let overlays_allowed = state.is_terminal();
    let mask_style_text = (overlays_allowed && filters.brightness < 100)
        .then(|| mask_style(mask_opacity(filters.brightness)));
    let tone_style_text = (overlays_allowed && filters.sepia > 0 && !media_visible)
        .then(|| tone_style(sepia_overlay_opacity(filters.sepia, config.sepia_overlay_cap)));
    RenderPlan {
        state,
        root_marker: overlays_allowed.then(|| state.as_str()),
        style_text: main_style(state, &filters, media, &config.mask_id()),
        mask_style: mask_style_text,
        tone_style: tone_style_text,
    }
}
