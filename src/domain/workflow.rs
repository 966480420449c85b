//! Workflow data model: action trees executed when a station is reached

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::journey::new_id;

/// How a workflow schedules its actions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// Strict list order; each action's `delay_after_ms` is waited out
    /// after it completes and before the next starts.
    #[default]
    Sequential,
    /// Every action is scheduled independently. `delay_after_ms` values
    /// accumulate into start offsets from workflow start.
    Parallel,
}

impl ExecutionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionMode::Sequential => "sequential",
            ExecutionMode::Parallel => "parallel",
        }
    }
}

/// Command bytes are stored as hex strings in config and JSON.
pub(crate) mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(deserializer)?;
        hex::decode(text.trim()).map_err(serde::de::Error::custom)
    }
}

/// The payload of a single action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ActionKind {
    /// Send raw protocol bytes to the command station.
    Command {
        #[serde(with = "hex_bytes")]
        bytes: Vec<u8>,
    },
    /// Spoken announcement. Template placeholders are substituted from
    /// the execution context before speaking.
    Announcement { text: String },
    /// Play a named audio file.
    Audio { file: String },
    /// Play the fixed station chime.
    Gong,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Command { .. } => "command",
            ActionKind::Announcement { .. } => "announcement",
            ActionKind::Audio { .. } => "audio",
            ActionKind::Gong => "gong",
        }
    }
}

/// One node of a workflow's action tree. Child actions are dispatched
/// recursively with the same mode semantics as their parent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    pub id: Uuid,
    pub name: String,
    /// Ordinal within the parent's list, for display and logging.
    #[serde(default)]
    pub number: u32,
    /// Sequential: wait after completion. Parallel: offset contribution.
    #[serde(default)]
    pub delay_after_ms: u64,
    #[serde(flatten)]
    pub kind: ActionKind,
    #[serde(default)]
    pub children: Vec<Action>,
}

impl Action {
    pub fn new(name: &str, kind: ActionKind) -> Self {
        Self {
            id: new_id(),
            name: name.to_string(),
            number: 0,
            delay_after_ms: 0,
            kind,
            children: Vec::new(),
        }
    }

    pub fn command(name: &str, bytes: Vec<u8>) -> Self {
        Self::new(name, ActionKind::Command { bytes })
    }

    pub fn announcement(name: &str, text: &str) -> Self {
        Self::new(name, ActionKind::Announcement { text: text.to_string() })
    }

    pub fn audio(name: &str, file: &str) -> Self {
        Self::new(name, ActionKind::Audio { file: file.to_string() })
    }

    pub fn gong() -> Self {
        Self::new("Gong", ActionKind::Gong)
    }

    pub fn with_delay(mut self, delay_after_ms: u64) -> Self {
        self.delay_after_ms = delay_after_ms;
        self
    }

    pub fn with_number(mut self, number: u32) -> Self {
        self.number = number;
        self
    }

    pub fn with_children(mut self, children: Vec<Action>) -> Self {
        self.children = children;
        self
    }
}

/// A configured action set attached to a station or feedback channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workflow {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub mode: ExecutionMode,
    pub actions: Vec<Action>,
    /// Feedback channel triggering this workflow directly, independent
    /// of any journey. None for station-attached workflows.
    #[serde(default)]
    pub channel: Option<u16>,
    /// Ignore repeated trigger feedbacks within this many seconds.
    #[serde(default)]
    pub feedback_debounce_secs: Option<f64>,
}

impl Workflow {
    pub fn new(name: &str, actions: Vec<Action>) -> Self {
        Self {
            id: new_id(),
            name: name.to_string(),
            description: String::new(),
            mode: ExecutionMode::Sequential,
            actions,
            channel: None,
            feedback_debounce_secs: None,
        }
    }

    pub fn with_mode(mut self, mode: ExecutionMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_channel(mut self, channel: u16) -> Self {
        self.channel = Some(channel);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_workflow_defaults() {
        let workflow = Workflow::new("Arrival", vec![]);

        assert!(!workflow.id.is_nil());
        assert_eq!(workflow.mode, ExecutionMode::Sequential);
        assert!(workflow.actions.is_empty());
        assert!(workflow.channel.is_none());
    }

    #[test]
    fn test_action_tree_construction() {
        let action = Action::announcement("Arrival call", "Now arriving")
            .with_delay(500)
            .with_number(1)
            .with_children(vec![Action::gong(), Action::audio("Bell", "bell.wav")]);

        assert_eq!(action.delay_after_ms, 500);
        assert_eq!(action.children.len(), 2);
        assert_eq!(action.children[0].kind, ActionKind::Gong);
    }

    #[test]
    fn test_command_bytes_serialize_as_hex() {
        let action = Action::command("Power off", vec![0x07, 0x00, 0x40, 0x00, 0x21, 0x80, 0xA1]);

        let json = serde_json::to_string(&action).unwrap();
        assert!(json.contains("\"type\":\"Command\""));
        assert!(json.contains("070040002180a1"));

        let parsed: Action = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, action);
    }

    #[test]
    fn test_action_kind_tag_round_trip() {
        let workflow = Workflow::new(
            "Station stop",
            vec![
                Action::gong(),
                Action::announcement("Call", "Next stop {StationName}"),
                Action::audio("Departure", "whistle.wav").with_delay(1500),
            ],
        )
        .with_mode(ExecutionMode::Parallel)
        .with_channel(12);

        let json = serde_json::to_string(&workflow).unwrap();
        let parsed: Workflow = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed, workflow);
        assert!(json.contains("\"mode\":\"parallel\""));
        assert!(json.contains("\"type\":\"Gong\""));
    }
}
