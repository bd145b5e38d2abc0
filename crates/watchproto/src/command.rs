//! Command and response envelopes.
//!
//! A [`Command`] carries a `callback_id` generated at construction. The
//! executor echoes it in the [`CommandResponse`] so the host can correlate
//! replies. Responses without a `callback_id` are out-of-band pushes
//! (lifecycle signals such as "initialized").

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::unix_timestamp;

/// Status value pushed once the executor is ready to accept commands.
pub const STATUS_INITIALIZED: &str = "initialized";

/// Status value pushed once the executor has drained and is about to exit.
pub const STATUS_EXIT_READY: &str = "exit_ready";

/// Action requested by a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandAction {
    /// Process a captured HTTP event (`params` is a `NormalizedHttpEvent`)
    Event,
    /// Register a subscriber (`params` is a `Webhook`)
    AddWebhook,
    /// Remove a subscriber (`params` is `{"guid": ...}`)
    RemoveWebhook,
    /// Begin draining the executor
    Shutdown,
    /// Liveness probe
    Ping,
    /// Raise log verbosity inside the executor
    Verbose,
    /// Return the accumulated graph in `data`
    Snapshot,
    /// Any action string this build does not know
    #[serde(other)]
    Unknown,
}

impl CommandAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommandAction::Event => "event",
            CommandAction::AddWebhook => "add_webhook",
            CommandAction::RemoveWebhook => "remove_webhook",
            CommandAction::Shutdown => "shutdown",
            CommandAction::Ping => "ping",
            CommandAction::Verbose => "verbose",
            CommandAction::Snapshot => "snapshot",
            CommandAction::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for CommandAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

fn new_callback_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Host → executor envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    pub action: CommandAction,
    #[serde(default)]
    pub params: Map<String, Value>,
    #[serde(default = "new_callback_id")]
    pub callback_id: String,
    pub execution_id: String,
    #[serde(default = "unix_timestamp")]
    pub timestamp: f64,
}

impl Command {
    /// Build a command with a fresh callback id.
    pub fn new(
        execution_id: impl Into<String>,
        action: CommandAction,
        params: Option<Map<String, Value>>,
    ) -> Self {
        Self {
            action,
            params: params.unwrap_or_default(),
            callback_id: new_callback_id(),
            execution_id: execution_id.into(),
            timestamp: unix_timestamp(),
        }
    }

    /// Build a command whose params are any serializable value.
    ///
    /// The value must serialize to a JSON object.
    pub fn with_payload<T: Serialize>(
        execution_id: impl Into<String>,
        action: CommandAction,
        payload: &T,
    ) -> Result<Self, serde_json::Error> {
        let params = match serde_json::to_value(payload)? {
            Value::Object(map) => map,
            other => {
                return Err(serde::ser::Error::custom(format!(
                    "command params must be a JSON object, got {}",
                    json_kind(&other)
                )))
            }
        };
        Ok(Self::new(execution_id, action, Some(params)))
    }

    /// Decode `params` into a typed payload.
    pub fn params_as<T: serde::de::DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(Value::Object(self.params.clone()))
    }

    /// Reply to this command.
    pub fn reply(&self, success: bool) -> CommandResponse {
        CommandResponse {
            success,
            data: None,
            error: None,
            callback_id: Some(self.callback_id.clone()),
            timestamp: unix_timestamp(),
        }
    }
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Command({}, callback_id={})", self.action, self.callback_id)
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Executor → host envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub callback_id: Option<String>,
    #[serde(default = "unix_timestamp")]
    pub timestamp: f64,
}

/// Lifecycle signal carried by an out-of-band response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutOfBandStatus {
    Initialized,
    ExitReady,
}

impl CommandResponse {
    /// An out-of-band push announcing a lifecycle status.
    pub fn status_push(status: OutOfBandStatus) -> Self {
        let status = match status {
            OutOfBandStatus::Initialized => STATUS_INITIALIZED,
            OutOfBandStatus::ExitReady => STATUS_EXIT_READY,
        };
        Self {
            success: true,
            data: Some(serde_json::json!({ "status": status })),
            error: None,
            callback_id: None,
            timestamp: unix_timestamp(),
        }
    }

    /// Attach a data payload.
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Attach an error message.
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    /// True when this response was not produced in reply to a command.
    pub fn is_out_of_band(&self) -> bool {
        self.callback_id.is_none()
    }

    /// Lifecycle status of an out-of-band push, if it carries one.
    pub fn out_of_band_status(&self) -> Option<OutOfBandStatus> {
        if !self.is_out_of_band() {
            return None;
        }
        match self.data.as_ref()?.get("status")?.as_str()? {
            STATUS_INITIALIZED => Some(OutOfBandStatus::Initialized),
            STATUS_EXIT_READY => Some(OutOfBandStatus::ExitReady),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn command_roundtrip_preserves_every_field() {
        let mut params = Map::new();
        params.insert("url".to_string(), json!("http://localhost"));
        params.insert("nested".to_string(), json!({"a": [1, 2.5, null]}));
        let cmd = Command::new("exec-1", CommandAction::Event, Some(params));

        let json = serde_json::to_string(&cmd).unwrap();
        let decoded: Command = serde_json::from_str(&json).unwrap();
        assert_eq!(cmd, decoded);
    }

    #[test]
    fn callback_ids_are_unique() {
        let a = Command::new("exec", CommandAction::Ping, None);
        let b = Command::new("exec", CommandAction::Ping, None);
        assert_ne!(a.callback_id, b.callback_id);
    }

    #[test]
    fn action_wire_names() {
        assert_eq!(serde_json::to_value(CommandAction::AddWebhook).unwrap(), json!("add_webhook"));
        assert_eq!(serde_json::to_value(CommandAction::Event).unwrap(), json!("event"));
        let parsed: CommandAction = serde_json::from_value(json!("rewind")).unwrap();
        assert_eq!(parsed, CommandAction::Unknown);
    }

    #[test]
    fn response_omits_unset_optionals() {
        let resp = CommandResponse {
            success: true,
            data: None,
            error: None,
            callback_id: None,
            timestamp: 1.5,
        };
        let value = serde_json::to_value(&resp).unwrap();
        assert_eq!(value, json!({"success": true, "timestamp": 1.5}));
    }

    #[test]
    fn reply_carries_callback_id() {
        let cmd = Command::new("exec", CommandAction::Ping, None);
        let resp = cmd.reply(true);
        assert_eq!(resp.callback_id.as_deref(), Some(cmd.callback_id.as_str()));
        assert!(!resp.is_out_of_band());
        assert_eq!(resp.out_of_band_status(), None);
    }

    #[test]
    fn status_push_is_out_of_band() {
        let push = CommandResponse::status_push(OutOfBandStatus::Initialized);
        assert!(push.is_out_of_band());
        assert_eq!(push.out_of_band_status(), Some(OutOfBandStatus::Initialized));

        let json = serde_json::to_string(&push).unwrap();
        assert!(!json.contains("callback_id"));
        assert!(!json.contains("null"));
    }

    #[test]
    fn with_payload_rejects_non_objects() {
        let err = Command::with_payload("exec", CommandAction::Event, &vec![1, 2, 3]);
        assert!(err.is_err());
    }

    #[test]
    fn command_defaults_fill_missing_fields() {
        let cmd: Command =
            serde_json::from_value(json!({"action": "ping", "execution_id": "e"})).unwrap();
        assert!(cmd.params.is_empty());
        assert!(!cmd.callback_id.is_empty());
        assert!(cmd.timestamp > 0.0);
    }
}
