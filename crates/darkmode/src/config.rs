//! Engine configuration.
//!
//! Identifiers, the canvas exemption list, timing policy, and the heuristic
//! thresholds. Everything tunable is a named field so hosts can override it;
//! [`EngineConfig::from_env`] reads the common ones from `DARKMODE_*`
//! variables.

use core::time::Duration;
use std::env;

/// Identifier used when none is configured.
pub const DEFAULT_ID: &str = "darkmode-pro";
/// Key prefix of the boolean-only record format.
pub const LEGACY_STATE_PREFIX: &str = "darkmode_pro_cache_";
/// Class placed on the root element while the pending guard is mounted.
pub const PENDING_CLASS: &str = "darkmode-pro-pending";
/// Root attribute carrying the resolved state.
pub const ROOT_MARKER_ATTR: &str = "data-darkmode-pro";

/// Luminance cut-offs of the dark-page heuristic.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DarkThresholds {
    /// Root and content backgrounds both below this are dark.
    pub background: f64,
    /// Content background below this ...
    pub contrast_background: f64,
    /// ... with text luminance above this is dark.
    pub contrast_text: f64,
}

impl Default for DarkThresholds {
    fn default() -> Self {
        Self {
            background: 0.2,
            contrast_background: 0.24,
            contrast_text: 0.72,
        }
    }
}

/// Runtime configuration of one engine instance.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Installation id; all element ids and the storage prefix derive from it.
    pub id: String,
    /// Sites (exact host or parent domain) where canvas is not counter-inverted.
    pub canvas_exempt_sites: Vec<String>,
    /// Length of one animation frame in milliseconds.
    pub frame_interval_ms: u64,
    /// How long to wait for single-page-app content before resolving anyway.
    pub spa_timeout_ms: u64,
    /// Poll interval while waiting for single-page-app content.
    pub spa_poll_ms: u64,
    /// Final settle delay before the heuristic runs.
    pub settle_ms: u64,
    /// Debounce of the shadow-tree rescan after child-list changes.
    pub rescan_delay_ms: u64,
    /// Debounce of the visual refresh after media-related changes.
    pub refresh_delay_ms: u64,
    /// Maximum nodes visited by one shadow-tree scan.
    pub scan_node_cap: usize,
    /// Video/canvas larger than this (both sides, px) is a dominant surface.
    pub media_min_size: f32,
    /// Opacity of the tone overlay at sepia 100.
    pub sepia_overlay_cap: f64,
    /// Rendered text length that counts as meaningful content.
    pub meaningful_text_len: usize,
    pub thresholds: DarkThresholds,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new(DEFAULT_ID, Vec::new())
    }
}

impl EngineConfig {
    /// Construct a configuration with default timings and thresholds.
    ///
    /// # Arguments
    ///
    /// * `id` - Installation id (blank falls back to [`DEFAULT_ID`])
    /// * `canvas_exempt_sites` - Sites where canvas keeps the page filter
    #[must_use]
    pub fn new(id: &str, canvas_exempt_sites: Vec<String>) -> Self {
        let trimmed = id.trim();
        Self {
            id: if trimmed.is_empty() {
                DEFAULT_ID.to_owned()
            } else {
                trimmed.to_owned()
            },
            canvas_exempt_sites,
            frame_interval_ms: 16,
            spa_timeout_ms: 1200,
            spa_poll_ms: 80,
            settle_ms: 24,
            rescan_delay_ms: 100,
            refresh_delay_ms: 80,
            scan_node_cap: 600,
            media_min_size: 48.0,
            sepia_overlay_cap: 0.24,
            meaningful_text_len: 180,
            thresholds: DarkThresholds::default(),
        }
    }

    /// Load configuration from environment variables.
    ///
    /// Reads the following environment variables:
    /// - `DARKMODE_ID`: installation id (default: `darkmode-pro`)
    /// - `DARKMODE_CANVAS_EXEMPT`: comma-separated site list
    /// - `DARKMODE_FRAME_MS`, `DARKMODE_SPA_TIMEOUT_MS`, `DARKMODE_SETTLE_MS`,
    ///   `DARKMODE_RESCAN_MS`, `DARKMODE_REFRESH_MS`: timings in milliseconds
    /// - `DARKMODE_SCAN_CAP`: node cap of one shadow scan (minimum 1)
    ///
    /// Unset or unparsable variables keep their defaults.
    #[must_use]
    pub fn from_env() -> Self {
        let id = env::var("DARKMODE_ID").unwrap_or_default();
        let canvas_exempt_sites = env::var("DARKMODE_CANVAS_EXEMPT")
            .map(|list| {
                list.split(',')
                    .map(str::trim)
                    .filter(|site| !site.is_empty())
                    .map(str::to_owned)
                    .collect()
            })
            .unwrap_or_default();
        let mut config = Self::new(&id, canvas_exempt_sites);
        let millis = |name: &str, default: u64| {
            env::var(name)
                .ok()
                .and_then(|val| val.trim().parse::<u64>().ok())
                .unwrap_or(default)
        };
        config.frame_interval_ms = millis("DARKMODE_FRAME_MS", config.frame_interval_ms);
        config.spa_timeout_ms = millis("DARKMODE_SPA_TIMEOUT_MS", config.spa_timeout_ms);
        config.settle_ms = millis("DARKMODE_SETTLE_MS", config.settle_ms);
        config.rescan_delay_ms = millis("DARKMODE_RESCAN_MS", config.rescan_delay_ms);
        config.refresh_delay_ms = millis("DARKMODE_REFRESH_MS", config.refresh_delay_ms);
        config.scan_node_cap = env::var("DARKMODE_SCAN_CAP")
            .ok()
            .and_then(|val| val.trim().parse::<usize>().ok())
            .unwrap_or(config.scan_node_cap)
            .max(1);
        config
    }

    /// Id of the main injected `<style>` element.
    #[inline]
    #[must_use]
    pub fn style_id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn mask_id(&self) -> String {
        format!("{}-mask", self.id)
    }

    #[must_use]
    pub fn tone_mask_id(&self) -> String {
        format!("{}-tone-mask", self.id)
    }

    #[must_use]
    pub fn pending_style_id(&self) -> String {
        format!("{}-pending", self.id)
    }

    /// Sheet left behind by an external first-paint guard.
    #[must_use]
    pub fn preboot_style_id(&self) -> String {
        format!("{}-preboot", self.id)
    }

    #[must_use]
    pub fn shadow_style_id(&self) -> String {
        format!("{}-shadow", self.id)
    }

    /// Key prefix of the current record format.
    #[must_use]
    pub fn state_prefix(&self) -> String {
        format!("{}_state_", self.id)
    }

    #[inline]
    #[must_use]
    pub const fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms)
    }

    #[inline]
    #[must_use]
    pub const fn spa_timeout(&self) -> Duration {
        Duration::from_millis(self.spa_timeout_ms)
    }

    #[inline]
    #[must_use]
    pub const fn spa_poll(&self) -> Duration {
        Duration::from_millis(self.spa_poll_ms)
    }

    #[inline]
    #[must_use]
    pub const fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    #[inline]
    #[must_use]
    pub const fn rescan_delay(&self) -> Duration {
        Duration::from_millis(self.rescan_delay_ms)
    }

    #[inline]
    #[must_use]
    pub const fn refresh_delay(&self) -> Duration {
        Duration::from_millis(self.refresh_delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_derive_from_the_installation_id() {
        let config = EngineConfig::new("dm", Vec::new());
        assert_eq!(config.style_id(), "dm");
        assert_eq!(config.mask_id(), "dm-mask");
        assert_eq!(config.tone_mask_id(), "dm-tone-mask");
        assert_eq!(config.pending_style_id(), "dm-pending");
        assert_eq!(config.preboot_style_id(), "dm-preboot");
        assert_eq!(config.shadow_style_id(), "dm-shadow");
        assert_eq!(config.state_prefix(), "dm_state_");
    }

    #[test]
    fn blank_id_uses_default() {
        let config = EngineConfig::new("  ", Vec::new());
        assert_eq!(config.id, DEFAULT_ID);
        assert_eq!(config.spa_timeout(), Duration::from_millis(1200));
        assert_eq!(config.scan_node_cap, 600);
    }
}
