//! Device-wide defaults applied to sites without a record of their own.

use crate::engine::DarkModeEngine;
use crate::settings::{
    DEFAULT_BRIGHTNESS, DEFAULT_CONTRAST, DEFAULT_GRAYSCALE, DEFAULT_SEPIA, SettingsPatch, Snapshot,
    deserialize_truthy,
};
use crate::site::host_in_list;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The all-neutral filter set older installs stored as their global default.
const LEGACY_GLOBAL_FILTERS: [f64; 4] = [100.0, 100.0, 0.0, 0.0];

/// Device-wide preferences, as stored by the settings page.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GlobalDefaults {
    /// Enable on sites without a record when the system prefers dark.
    #[serde(deserialize_with = "deserialize_truthy")]
    pub auto_follow_system: bool,
    /// Enable on every site without a record.
    #[serde(deserialize_with = "deserialize_truthy")]
    pub default_enabled: bool,
    /// Sites (exact host or parent domain) that are always off.
    pub exclude_sites: Vec<String>,
    #[serde(rename = "globalBrightness", skip_serializing_if = "Option::is_none")]
    pub brightness: Option<Value>,
    #[serde(rename = "globalContrast", skip_serializing_if = "Option::is_none")]
    pub contrast: Option<Value>,
    #[serde(rename = "globalSepia", skip_serializing_if = "Option::is_none")]
    pub sepia: Option<Value>,
    #[serde(rename = "globalGrayscale", skip_serializing_if = "Option::is_none")]
    pub grayscale: Option<Value>,
}

/// Loose numeric reading: `null` and booleans count as numbers, blank
/// strings as zero.
fn loose_number(value: Option<&Value>) -> Option<f64> {
    match value? {
        Value::Null => Some(0.0),
        Value::Bool(flag) => Some(if *flag { 1.0 } else { 0.0 }),
        Value::Number(number) => number.as_f64(),
        Value::String(text) => {
            let trimmed = text.trim();
            if trimmed.is_empty() {
                Some(0.0)
            } else {
                trimmed.parse().ok()
            }
        }
        Value::Array(_) | Value::Object(_) => None,
    }
}

impl GlobalDefaults {
    /// Whether the stored filters are the legacy all-neutral set.
    #[must_use]
    pub fn uses_legacy_filters(&self) -> bool {
        [&self.brightness, &self.contrast, &self.sepia, &self.grayscale]
            .into_iter()
            .zip(LEGACY_GLOBAL_FILTERS)
            .all(|(value, legacy)| loose_number(value.as_ref()) == Some(legacy))
    }

    /// Filters to seed a site with; the legacy set is upgraded to the
    /// eye-care defaults.
    #[must_use]
    pub fn filter_patch(&self) -> SettingsPatch {
        if self.uses_legacy_filters() {
            return SettingsPatch::new()
                .brightness(i64::from(DEFAULT_BRIGHTNESS))
                .contrast(i64::from(DEFAULT_CONTRAST))
                .sepia(i64::from(DEFAULT_SEPIA))
                .grayscale(i64::from(DEFAULT_GRAYSCALE));
        }
        SettingsPatch {
            brightness: self.brightness.clone(),
            contrast: self.contrast.clone(),
            sepia: self.sepia.clone(),
            grayscale: self.grayscale.clone(),
        }
    }

    #[must_use]
    pub fn excludes(&self, hostname: &str) -> bool {
        host_in_list(hostname, &self.exclude_sites)
    }
}

impl DarkModeEngine {
    /// Apply device-wide defaults: excluded sites are switched off, sites
    /// with a record keep it, and everything else is seeded from `defaults`.
    pub async fn apply_global_defaults(&self, defaults: &GlobalDefaults) -> Snapshot {
        let (hostname, prefers_dark) = {
            let shared = self.document();
            let document = shared.borrow();
            (document.hostname().to_owned(), document.prefers_dark_scheme())
        };
        if defaults.excludes(&hostname) {
            info!("{hostname} is excluded; switching off");
            self.set_enabled(false).await;
            return self.snapshot();
        }
        if self.has_site_record() {
            debug!("{hostname} has its own record; global defaults skipped");
            return self.snapshot();
        }
        self.update(&defaults.filter_patch());
        if defaults.default_enabled || (defaults.auto_follow_system && prefers_dark) {
            self.set_enabled(true).await;
        }
        self.snapshot()
    }

    /// Follow the system colour-scheme preference for as long as the future
    /// is polled. Only active with `auto_follow_system` and without
    /// `default_enabled`; excluded sites are left alone.
    pub async fn follow_color_scheme(&self, defaults: &GlobalDefaults) {
        if !defaults.auto_follow_system || defaults.default_enabled {
            return;
        }
        let (hostname, mut watcher) = {
            let shared = self.document();
            let document = shared.borrow();
            (document.hostname().to_owned(), document.color_scheme_watcher())
        };
        if defaults.excludes(&hostname) {
            return;
        }
        while watcher.changed().await.is_ok() {
            let dark = *watcher.borrow_and_update();
            debug!("system colour scheme changed (dark={dark})");
            self.set_enabled(dark).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn wire_names_are_camel_case() {
        let defaults: GlobalDefaults = serde_json::from_value(json!({
            "autoFollowSystem": 1,
            "defaultEnabled": false,
            "excludeSites": ["bank.example"],
            "globalBrightness": 80,
            "globalSepia": "5"
        }))
        .unwrap();
        assert!(defaults.auto_follow_system);
        assert!(!defaults.default_enabled);
        assert!(defaults.excludes("www.bank.example"));
        assert!(!defaults.excludes("notbank.example"));
        assert_eq!(defaults.brightness, Some(json!(80)));
        assert_eq!(defaults.contrast, None);
    }

    #[test]
    fn legacy_neutral_filters_upgrade_to_eye_care() {
        let legacy: GlobalDefaults = serde_json::from_value(json!({
            "globalBrightness": "100",
            "globalContrast": 100,
            "globalSepia": 0,
            "globalGrayscale": "0"
        }))
        .unwrap();
        assert!(legacy.uses_legacy_filters());
        assert_eq!(
            legacy.filter_patch(),
            SettingsPatch::new().brightness(92).contrast(95).sepia(12).grayscale(0)
        );

        let custom: GlobalDefaults = serde_json::from_value(json!({
            "globalBrightness": 100,
            "globalContrast": 100,
            "globalSepia": 10
        }))
        .unwrap();
        assert!(!custom.uses_legacy_filters());
        assert_eq!(custom.filter_patch().sepia, Some(json!(10)));
        assert_eq!(custom.filter_patch().grayscale, None);
    }
}
