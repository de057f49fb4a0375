//! Typed command surface for toolbar and menu relays.
//!
//! Wire shape: `{"action": "<name>", "data": {...}}`. Every command answers
//! with a [`CommandResponse`] carrying the engine snapshot.

use crate::engine::DarkModeEngine;
use crate::settings::{SettingsPatch, Snapshot};
use anyhow::{Result, bail};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Actions that carry no payload.
const UNIT_ACTIONS: [&str; 3] = ["toggle", "getState", "reset"];
/// Actions whose payload is an object.
const DATA_ACTIONS: [&str; 3] = ["setState", "updateFilters", "update"];

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", content = "data", rename_all = "camelCase")]
pub enum Command {
    Toggle,
    GetState,
    SetState {
        #[serde(default, deserialize_with = "crate::settings::deserialize_truthy")]
        enabled: bool,
    },
    UpdateFilters(SettingsPatch),
    /// Alias of [`Command::UpdateFilters`] kept for older relays.
    Update(SettingsPatch),
    Reset,
}

impl Command {
    /// Decode a wire message. A missing or `null` payload counts as empty.
    ///
    /// # Errors
    ///
    /// Returns `Unknown action: <name>` for anything outside the command set,
    /// or the decode error of a malformed payload.
    pub fn from_value(mut raw: Value) -> Result<Self> {
        let Some(message) = raw.as_object_mut() else {
            bail!("Unknown action: empty");
        };
        let action = match message.get("action") {
            Some(Value::String(action)) if !action.is_empty() => action.clone(),
            _ => bail!("Unknown action: empty"),
        };
        if UNIT_ACTIONS.contains(&action.as_str()) {
            message.remove("data");
        } else if DATA_ACTIONS.contains(&action.as_str()) {
            let has_object = message.get("data").is_some_and(Value::is_object);
            if !has_object {
                message.insert("data".to_owned(), Value::Object(Map::new()));
            }
        } else {
            bail!("Unknown action: {action}");
        }
        Ok(serde_json::from_value(raw)?)
    }

    /// # Errors
    ///
    /// Returns an error if `text` is not JSON or not a known command.
    pub fn from_json(text: &str) -> Result<Self> {
        Self::from_value(serde_json::from_str(text)?)
    }
}

/// Result of a command.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CommandResponse {
    pub success: bool,
    #[serde(flatten, skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<Snapshot>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CommandResponse {
    #[must_use]
    pub const fn success(snapshot: Snapshot) -> Self {
        Self {
            success: true,
            snapshot: Some(snapshot),
            error: None,
        }
    }

    #[must_use]
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            snapshot: None,
            error: Some(message.into()),
        }
    }
}

impl DarkModeEngine {
    /// Run `command` and report the resulting snapshot.
    pub async fn dispatch(&self, command: Command) -> CommandResponse {
        debug!("dispatching {command:?}");
        let snapshot = match command {
            Command::Toggle => {
                self.toggle().await;
                self.snapshot()
            }
            Command::GetState => self.snapshot(),
            Command::SetState { enabled } => {
                self.set_enabled(enabled).await;
                self.snapshot()
            }
            Command::UpdateFilters(patch) | Command::Update(patch) => self.update(&patch),
            Command::Reset => self.reset(),
        };
        CommandResponse::success(snapshot)
    }

    /// Decode and run a wire message; decode failures become failure
    /// responses.
    pub async fn dispatch_json(&self, text: &str) -> CommandResponse {
        match Command::from_json(text) {
            Ok(command) => self.dispatch(command).await,
            Err(err) => {
                warn!("rejected command: {err}");
                CommandResponse::failure(err.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::RenderState;
    use serde_json::json;

    #[test]
    fn wire_messages_decode() {
        assert_eq!(Command::from_json(r#"{"action":"toggle"}"#).unwrap(), Command::Toggle);
        assert_eq!(
            Command::from_json(r#"{"action":"getState","data":{"ignored":1}}"#).unwrap(),
            Command::GetState
        );
        assert_eq!(
            Command::from_json(r#"{"action":"setState","data":{"enabled":1}}"#).unwrap(),
            Command::SetState { enabled: true }
        );
        assert_eq!(
            Command::from_json(r#"{"action":"setState"}"#).unwrap(),
            Command::SetState { enabled: false }
        );
        assert_eq!(
            Command::from_json(r#"{"action":"updateFilters","data":null}"#).unwrap(),
            Command::UpdateFilters(SettingsPatch::new())
        );
        assert_eq!(
            Command::from_value(json!({"action": "update", "data": {"sepia": "40"}})).unwrap(),
            Command::Update(SettingsPatch {
                sepia: Some(json!("40")),
                ..SettingsPatch::new()
            })
        );
    }

    #[test]
    fn unknown_actions_are_named() {
        let err = Command::from_json(r#"{"action":"explode"}"#).unwrap_err();
        assert_eq!(err.to_string(), "Unknown action: explode");
        let err = Command::from_json("{}").unwrap_err();
        assert_eq!(err.to_string(), "Unknown action: empty");
        let err = Command::from_json("[1]").unwrap_err();
        assert_eq!(err.to_string(), "Unknown action: empty");
    }

    #[test]
    fn responses_flatten_the_snapshot() {
        let snapshot = Snapshot {
            enabled: true,
            brightness: 92,
            contrast: 95,
            sepia: 12,
            grayscale: 0,
            state: RenderState::ResolvedOn,
        };
        assert_eq!(
            serde_json::to_value(CommandResponse::success(snapshot)).unwrap(),
            json!({
                "success": true,
                "enabled": true,
                "brightness": 92,
                "contrast": 95,
                "sepia": 12,
                "grayscale": 0,
                "state": "on"
            })
        );
        assert_eq!(
            serde_json::to_value(CommandResponse::failure("Unknown action: x")).unwrap(),
            json!({"success": false, "error": "Unknown action: x"})
        );
    }
}
