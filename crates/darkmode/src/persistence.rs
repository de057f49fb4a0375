//! Best-effort persistence of [`SiteVisualState`] across a site's candidate keys.
//!
//! Reads return the first record found in candidate order, trying the
//! current format before the boolean-only legacy one. Writes fan out to every
//! candidate in both formats. Storage and decoding failures are logged and
//! swallowed; the in-memory state stays authoritative.

use crate::config::LEGACY_STATE_PREFIX;
use crate::settings::SiteVisualState;
use crate::site::domain_candidates;
use crate::storage::KeyValueStore;
use anyhow::Result;
use log::{debug, trace, warn};
use serde_json::{Value, json};

pub struct Persistence {
    store: Box<dyn KeyValueStore>,
    state_prefix: String,
    candidates: Vec<String>,
}

impl Persistence {
    /// # Arguments
    ///
    /// * `store` - Origin storage
    /// * `state_prefix` - Key prefix of the current format (`<id>_state_`)
    /// * `hostname` - Host whose candidate set is read and written
    #[must_use]
    pub fn new(store: Box<dyn KeyValueStore>, state_prefix: String, hostname: &str) -> Self {
        Self {
            store,
            state_prefix,
            candidates: domain_candidates(hostname),
        }
    }

    /// Load the site record, falling back to legacy data and then defaults.
    pub fn load(&self) -> SiteVisualState {
        match self.find_record(&self.state_prefix) {
            Ok(Some(record)) => return SiteVisualState::from_value(&record),
            Ok(None) => {}
            Err(err) => debug!("ignoring unreadable site record: {err}"),
        }
        match self.find_record(LEGACY_STATE_PREFIX) {
            Ok(Some(record)) => {
                if let Some(enabled) = record.get("enabled").and_then(Value::as_bool) {
                    trace!("migrating legacy record (enabled={enabled})");
                    return SiteVisualState {
                        enabled,
                        ..SiteVisualState::DEFAULTS
                    };
                }
            }
            Ok(None) => {}
            Err(err) => debug!("ignoring unreadable legacy record: {err}"),
        }
        SiteVisualState::DEFAULTS
    }

    /// Write `state` (and its legacy shadow copy) to every candidate key.
    pub fn save(&self, state: &SiteVisualState) {
        if let Err(err) = self.try_save(state) {
            warn!("failed to persist site state: {err}");
        }
    }

    fn try_save(&self, state: &SiteVisualState) -> Result<()> {
        let payload = serde_json::to_string(state)?;
        let legacy_payload = json!({ "enabled": state.enabled }).to_string();
        for candidate in &self.candidates {
            self.store
                .set(&format!("{}{candidate}", self.state_prefix), &payload)?;
            self.store
                .set(&format!("{LEGACY_STATE_PREFIX}{candidate}"), &legacy_payload)?;
        }
        trace!("persisted site state to {} keys", self.candidates.len());
        Ok(())
    }

    /// Whether any candidate holds a record in either format.
    pub fn has_site_record(&self) -> bool {
        for prefix in [self.state_prefix.as_str(), LEGACY_STATE_PREFIX] {
            for candidate in &self.candidates {
                match self.store.get(&format!("{prefix}{candidate}")) {
                    Ok(Some(raw)) if !raw.is_empty() => return true,
                    Ok(_) => {}
                    Err(err) => {
                        debug!("storage unreadable while probing for site record: {err}");
                        return false;
                    }
                }
            }
        }
        false
    }

    /// First candidate value under `prefix` that decodes to a JSON object.
    fn find_record(&self, prefix: &str) -> Result<Option<Value>> {
        for candidate in &self.candidates {
            let Some(raw) = self.store.get(&format!("{prefix}{candidate}"))? else {
                continue;
            };
            match serde_json::from_str::<Value>(&raw) {
                Ok(record @ Value::Object(_)) => return Ok(Some(record)),
                Ok(_) => trace!("skipping non-object record for {candidate}"),
                Err(err) => trace!("skipping malformed record for {candidate}: {err}"),
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::OriginStorage;

    fn persistence(store: &OriginStorage, host: &str) -> Persistence {
        Persistence::new(Box::new(store.clone()), "dm_state_".to_owned(), host)
    }

    #[test]
    fn missing_records_load_disabled_defaults() {
        let store = OriginStorage::in_memory("https://example.com");
        let loaded = persistence(&store, "example.com").load();
        assert_eq!(loaded, SiteVisualState::DEFAULTS);
        assert!(!loaded.enabled);
    }

    #[test]
    fn saved_records_are_visible_from_every_alias() {
        let store = OriginStorage::in_memory("https://example.com");
        let state = SiteVisualState {
            enabled: true,
            brightness: 70,
            contrast: 120,
            sepia: 0,
            grayscale: 10,
        };
        persistence(&store, "www.example.com").save(&state);
        assert_eq!(persistence(&store, "example.com").load(), state);
        assert_eq!(persistence(&store, "www.example.com").load(), state);
        let legacy = store.get("darkmode_pro_cache_example.com").unwrap().unwrap();
        assert_eq!(legacy, r#"{"enabled":true}"#);
    }

    #[test]
    fn legacy_records_only_carry_enabled() {
        let store = OriginStorage::in_memory("https://example.com");
        store
            .set("darkmode_pro_cache_example.com", r#"{"enabled":true,"brightness":10}"#)
            .unwrap();
        let loaded = persistence(&store, "example.com").load();
        assert_eq!(
            loaded,
            SiteVisualState {
                enabled: true,
                ..SiteVisualState::DEFAULTS
            }
        );
    }

    #[test]
    fn malformed_records_fall_through_to_the_next_candidate() {
        let store = OriginStorage::in_memory("https://example.com");
        store.set("dm_state_example.com", "{not json").unwrap();
        store
            .set("dm_state_www.example.com", r#"{"enabled":true,"sepia":40}"#)
            .unwrap();
        let loaded = persistence(&store, "example.com").load();
        assert!(loaded.enabled);
        assert_eq!(loaded.sepia, 40);
    }

    #[test]
    fn storage_failures_are_swallowed() {
        let store = OriginStorage::in_memory("https://example.com");
        store
            .registry()
            .lock()
            .unwrap()
            .set_unavailable("https://example.com", true);
        let layer = persistence(&store, "example.com");
        layer.save(&SiteVisualState::DEFAULTS);
        assert_eq!(layer.load(), SiteVisualState::DEFAULTS);
        assert!(!layer.has_site_record());
    }
}
