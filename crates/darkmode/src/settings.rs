//! Per-site visual settings and their normalisation.
//!
//! Everything read from storage or received from a caller passes through
//! [`coerce`], so out-of-range or malformed values can never reach the
//! compositor.

use crate::state::RenderState;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Default brightness (percent).
pub const DEFAULT_BRIGHTNESS: u16 = 92;
/// Default contrast (percent).
pub const DEFAULT_CONTRAST: u16 = 95;
/// Default sepia (percent).
pub const DEFAULT_SEPIA: u16 = 12;
/// Default grayscale (percent).
pub const DEFAULT_GRAYSCALE: u16 = 0;

pub const BRIGHTNESS_RANGE: (u16, u16) = (0, 100);
pub const CONTRAST_RANGE: (u16, u16) = (50, 200);
pub const SEPIA_RANGE: (u16, u16) = (0, 100);
pub const GRAYSCALE_RANGE: (u16, u16) = (0, 100);

/// The persisted per-site record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteVisualState {
    pub enabled: bool,
    pub brightness: u16,
    pub contrast: u16,
    pub sepia: u16,
    pub grayscale: u16,
}

impl Default for SiteVisualState {
    fn default() -> Self {
        Self::DEFAULTS
    }
}

impl SiteVisualState {
    /// Device defaults: the eye-care filter set, disabled.
    pub const DEFAULTS: Self = Self {
        enabled: false,
        brightness: DEFAULT_BRIGHTNESS,
        contrast: DEFAULT_CONTRAST,
        sepia: DEFAULT_SEPIA,
        grayscale: DEFAULT_GRAYSCALE,
    };

    /// Normalise an arbitrary JSON record. Missing or malformed fields take
    /// their defaults; `enabled` follows JavaScript truthiness.
    #[must_use]
    pub fn from_value(raw: &Value) -> Self {
        Self {
            enabled: raw.get("enabled").is_some_and(truthy),
            brightness: coerce(raw.get("brightness"), BRIGHTNESS_RANGE, DEFAULT_BRIGHTNESS),
            contrast: coerce(raw.get("contrast"), CONTRAST_RANGE, DEFAULT_CONTRAST),
            sepia: coerce(raw.get("sepia"), SEPIA_RANGE, DEFAULT_SEPIA),
            grayscale: coerce(raw.get("grayscale"), GRAYSCALE_RANGE, DEFAULT_GRAYSCALE),
        }
    }

    /// Apply `patch` on top of this record. `enabled` is never touched.
    #[must_use]
    pub fn patched(self, patch: &SettingsPatch) -> Self {
        let pick = |value: Option<&Value>, current: u16, range: (u16, u16), fallback: u16| {
            value.map_or(current, |raw| coerce(Some(raw), range, fallback))
        };
        Self {
            enabled: self.enabled,
            brightness: pick(
                patch.brightness.as_ref(),
                self.brightness,
                BRIGHTNESS_RANGE,
                DEFAULT_BRIGHTNESS,
            ),
            contrast: pick(
                patch.contrast.as_ref(),
                self.contrast,
                CONTRAST_RANGE,
                DEFAULT_CONTRAST,
            ),
            sepia: pick(patch.sepia.as_ref(), self.sepia, SEPIA_RANGE, DEFAULT_SEPIA),
            grayscale: pick(
                patch.grayscale.as_ref(),
                self.grayscale,
                GRAYSCALE_RANGE,
                DEFAULT_GRAYSCALE,
            ),
        }
    }

    /// The snapshot reported to callers.
    #[must_use]
    pub const fn snapshot(&self, state: RenderState) -> Snapshot {
        Snapshot {
            enabled: self.enabled,
            brightness: self.brightness,
            contrast: self.contrast,
            sepia: self.sepia,
            grayscale: self.grayscale,
            state,
        }
    }
}

/// A partial settings update. Values stay untyped until normalisation so
/// that malformed input degrades to defaults instead of failing to decode.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SettingsPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub brightness: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contrast: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sepia: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grayscale: Option<Value>,
}

impl SettingsPatch {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn brightness(mut self, value: i64) -> Self {
        self.brightness = Some(Value::from(value));
        self
    }

    #[must_use]
    pub fn contrast(mut self, value: i64) -> Self {
        self.contrast = Some(Value::from(value));
        self
    }

    #[must_use]
    pub fn sepia(mut self, value: i64) -> Self {
        self.sepia = Some(Value::from(value));
        self
    }

    #[must_use]
    pub fn grayscale(mut self, value: i64) -> Self {
        self.grayscale = Some(Value::from(value));
        self
    }

    /// A patch carrying every filter of `state`.
    #[must_use]
    pub fn from_state(state: &SiteVisualState) -> Self {
        Self::new()
            .brightness(i64::from(state.brightness))
            .contrast(i64::from(state.contrast))
            .sepia(i64::from(state.sepia))
            .grayscale(i64::from(state.grayscale))
    }
}

/// Settings plus render state, as reported by every public operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub enabled: bool,
    pub brightness: u16,
    pub contrast: u16,
    pub sepia: u16,
    pub grayscale: u16,
    pub state: RenderState,
}

/// Round and clamp a number (or numeric string) into `range`; anything else
/// yields `fallback`.
///
/// # Arguments
///
/// * `value` - The raw value, if present.
/// * `range` - Inclusive `(min, max)`.
/// * `fallback` - Returned for missing, non-numeric, or non-finite input.
#[must_use]
pub fn coerce(value: Option<&Value>, range: (u16, u16), fallback: u16) -> u16 {
    let number = match value {
        Some(Value::Number(number)) => number.as_f64(),
        Some(Value::String(text)) => text.trim().parse::<f64>().ok(),
        _ => None,
    };
    let Some(number) = number.filter(|candidate| candidate.is_finite()) else {
        return fallback;
    };
    let (min, max) = range;
    number.round().clamp(f64::from(min), f64::from(max)) as u16
}

/// JavaScript truthiness of a JSON value.
#[must_use]
pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().is_some_and(|num| num != 0.0 && !num.is_nan()),
        Value::String(text) => !text.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Deserialize any JSON value as a boolean by JavaScript truthiness.
///
/// # Errors
///
/// Returns an error only if the input is not valid JSON.
pub fn deserialize_truthy<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    Value::deserialize(deserializer).map(|value| truthy(&value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn coercion_rounds_clamps_and_falls_back() {
        assert_eq!(coerce(Some(&json!(250)), CONTRAST_RANGE, 95), 200);
        assert_eq!(coerce(Some(&json!(10)), CONTRAST_RANGE, 95), 50);
        assert_eq!(coerce(Some(&json!(49.6)), BRIGHTNESS_RANGE, 92), 50);
        assert_eq!(coerce(Some(&json!(" 77 ")), BRIGHTNESS_RANGE, 92), 77);
        assert_eq!(coerce(Some(&json!("bright")), BRIGHTNESS_RANGE, 92), 92);
        assert_eq!(coerce(Some(&json!(null)), SEPIA_RANGE, 12), 12);
        assert_eq!(coerce(Some(&json!(true)), SEPIA_RANGE, 12), 12);
        assert_eq!(coerce(None, GRAYSCALE_RANGE, 0), 0);
        assert_eq!(coerce(Some(&json!(-4)), GRAYSCALE_RANGE, 0), 0);
    }

    #[test]
    fn records_normalise_field_by_field() {
        let state = SiteVisualState::from_value(&json!({
            "enabled": 1,
            "brightness": "300",
            "contrast": [],
            "grayscale": 30.4
        }));
        assert_eq!(
            state,
            SiteVisualState {
                enabled: true,
                brightness: 100,
                contrast: DEFAULT_CONTRAST,
                sepia: DEFAULT_SEPIA,
                grayscale: 30,
            }
        );
        assert_eq!(SiteVisualState::from_value(&json!("garbage")), SiteVisualState::DEFAULTS);
    }

    #[test]
    fn patches_keep_enabled_and_absent_fields() {
        let base = SiteVisualState {
            enabled: true,
            ..SiteVisualState::DEFAULTS
        };
        let patch: SettingsPatch =
            serde_json::from_value(json!({ "sepia": 50, "contrast": "oops", "enabled": false }))
                .unwrap();
        let next = base.patched(&patch);
        assert!(next.enabled);
        assert_eq!(next.sepia, 50);
        assert_eq!(next.contrast, DEFAULT_CONTRAST);
        assert_eq!(next.brightness, base.brightness);
    }

    #[test]
    fn snapshot_serialises_state_name() {
        let snapshot = SiteVisualState::DEFAULTS.snapshot(RenderState::ResolvedOn);
        let value = serde_json::to_value(snapshot).unwrap();
        assert_eq!(value["state"], "on");
        assert_eq!(value["brightness"], 92);
    }
}
