use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt;
use thiserror::Error;

pub mod framing;

/// One line of a remote log batch.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct LogEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,
    pub message: String,
}

/// Inbound command as carried on the wire: `{"command": "<KIND>", ...}`.
///
/// Serializes to the canonical upper-case form. Decode with [`parse`], which
/// also accepts any casing of the discriminator.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "command", rename_all = "UPPERCASE")]
pub enum Command {
    Shutdown,
    Resume,
    Heartbeat {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        version: Option<String>,
    },
    Log {
        entries: Vec<LogEntry>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    Shutdown,
    Resume,
    Heartbeat,
    Log,
}

impl CommandKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommandKind::Shutdown => "SHUTDOWN",
            CommandKind::Resume => "RESUME",
            CommandKind::Heartbeat => "HEARTBEAT",
            CommandKind::Log => "LOG",
        }
    }

    fn from_discriminator(raw: &str) -> Option<Self> {
        match raw.to_ascii_uppercase().as_str() {
            "SHUTDOWN" => Some(CommandKind::Shutdown),
            "RESUME" => Some(CommandKind::Resume),
            "HEARTBEAT" => Some(CommandKind::Heartbeat),
            "LOG" => Some(CommandKind::Log),
            _ => None,
        }
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Command {
    pub fn kind(&self) -> CommandKind {
        match self {
            Command::Shutdown => CommandKind::Shutdown,
            Command::Resume => CommandKind::Resume,
            Command::Heartbeat { .. } => CommandKind::Heartbeat,
            Command::Log { .. } => CommandKind::Log,
        }
    }
}

/// Why an inbound message was dropped before reaching the controller.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RejectionReason {
    #[error("malformed input: {0}")]
    MalformedInput(String),
    #[error("unknown command: {0}")]
    UnknownCommand(String),
    #[error("missing field: {0}")]
    MissingField(String),
}

/// Decodes one raw message into a [`Command`].
///
/// The discriminator is matched case-insensitively and unknown extra fields
/// are ignored. Nothing is partially constructed: either every required field
/// of the selected kind is present and well typed, or the message is rejected.
pub fn parse(raw: &[u8]) -> Result<Command, RejectionReason> {
    let value: Value = serde_json::from_slice(raw)
        .map_err(|err| RejectionReason::MalformedInput(err.to_string()))?;
    parse_value(&value)
}

/// Same as [`parse`] for input that was already decoded into JSON.
pub fn parse_value(value: &Value) -> Result<Command, RejectionReason> {
    let object = value
        .as_object()
        .ok_or_else(|| RejectionReason::MalformedInput("expected a JSON object".to_string()))?;
    let discriminator = object
        .get("command")
        .ok_or_else(|| RejectionReason::MissingField("command".to_string()))?;
    let kind = discriminator
        .as_str()
        .and_then(CommandKind::from_discriminator)
        .ok_or_else(|| RejectionReason::UnknownCommand(discriminator_label(discriminator)))?;

    match kind {
        CommandKind::Shutdown => Ok(Command::Shutdown),
        CommandKind::Resume => Ok(Command::Resume),
        CommandKind::Heartbeat => Ok(Command::Heartbeat {
            version: optional_string(object, "version", "version")?,
        }),
        CommandKind::Log => Ok(Command::Log {
            entries: parse_log_entries(object)?,
        }),
    }
}

fn parse_log_entries(object: &Map<String, Value>) -> Result<Vec<LogEntry>, RejectionReason> {
    let raw_entries = object
        .get("entries")
        .ok_or_else(|| RejectionReason::MissingField("entries".to_string()))?
        .as_array()
        .ok_or_else(|| RejectionReason::MalformedInput("entries must be an array".to_string()))?;

    let mut entries = Vec::with_capacity(raw_entries.len());
    for (index, raw) in raw_entries.iter().enumerate() {
        let entry = raw.as_object().ok_or_else(|| {
            RejectionReason::MalformedInput(format!("entries[{index}] must be an object"))
        })?;
        let path = |field: &str| format!("entries[{index}].{field}");
        let message = match entry.get("message") {
            None | Some(Value::Null) => return Err(RejectionReason::MissingField(path("message"))),
            Some(Value::String(message)) => message.clone(),
            Some(_) => {
                return Err(RejectionReason::MalformedInput(format!(
                    "{} must be a string",
                    path("message")
                )))
            }
        };
        entries.push(LogEntry {
            timestamp: optional_string(entry, "timestamp", &path("timestamp"))?,
            level: optional_string(entry, "level", &path("level"))?,
            message,
        });
    }
    Ok(entries)
}

fn optional_string(
    object: &Map<String, Value>,
    key: &str,
    path: &str,
) -> Result<Option<String>, RejectionReason> {
    match object.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(value)) => Ok(Some(value.clone())),
        Some(_) => Err(RejectionReason::MalformedInput(format!(
            "{path} must be a string"
        ))),
    }
}

fn discriminator_label(value: &Value) -> String {
    match value {
        Value::String(raw) => raw.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn parse_json(value: Value) -> Result<Command, RejectionReason> {
        parse(value.to_string().as_bytes())
    }

    #[test]
    fn parses_each_kind() {
        assert_eq!(parse_json(json!({"command": "SHUTDOWN"})), Ok(Command::Shutdown));
        assert_eq!(parse_json(json!({"command": "RESUME"})), Ok(Command::Resume));
        assert_eq!(
            parse_json(json!({"command": "HEARTBEAT", "version": "1.0.0"})),
            Ok(Command::Heartbeat {
                version: Some("1.0.0".to_string())
            })
        );
        assert_eq!(
            parse_json(json!({"command": "HEARTBEAT"})),
            Ok(Command::Heartbeat { version: None })
        );
    }

    #[test]
    fn discriminator_is_case_insensitive() {
        assert_eq!(parse_json(json!({"command": "shutdown"})), Ok(Command::Shutdown));
        assert_eq!(parse_json(json!({"command": "Resume"})), Ok(Command::Resume));
    }

    #[test]
    fn parses_log_entries_with_optional_fields() {
        let command = parse_json(json!({
            "command": "LOG",
            "entries": [
                {"timestamp": "2024-05-01T10:00:00Z", "level": "ERROR", "message": "disk full"},
                {"message": "bare"}
            ]
        }))
        .expect("log command");
        assert_eq!(
            command,
            Command::Log {
                entries: vec![
                    LogEntry {
                        timestamp: Some("2024-05-01T10:00:00Z".to_string()),
                        level: Some("ERROR".to_string()),
                        message: "disk full".to_string(),
                    },
                    LogEntry {
                        timestamp: None,
                        level: None,
                        message: "bare".to_string(),
                    },
                ]
            }
        );
    }

    #[test]
    fn rejects_non_json_bytes() {
        assert!(matches!(
            parse(b"not json at all"),
            Err(RejectionReason::MalformedInput(_))
        ));
        assert!(matches!(
            parse(&[0xff, 0xfe, 0x00]),
            Err(RejectionReason::MalformedInput(_))
        ));
        assert!(matches!(
            parse_json(json!(["SHUTDOWN"])),
            Err(RejectionReason::MalformedInput(_))
        ));
    }

    #[test]
    fn rejects_unknown_discriminator() {
        assert_eq!(
            parse_json(json!({"command": "BOGUS"})),
            Err(RejectionReason::UnknownCommand("BOGUS".to_string()))
        );
        assert_eq!(
            parse_json(json!({"command": 7})),
            Err(RejectionReason::UnknownCommand("7".to_string()))
        );
        assert_eq!(
            parse_json(json!({"state": "shutdown"})),
            Err(RejectionReason::MissingField("command".to_string()))
        );
    }

    #[test]
    fn rejects_missing_log_fields() {
        assert_eq!(
            parse_json(json!({"command": "LOG"})),
            Err(RejectionReason::MissingField("entries".to_string()))
        );
        assert_eq!(
            parse_json(json!({
                "command": "LOG",
                "entries": [{"message": "ok"}, {"level": "INFO"}]
            })),
            Err(RejectionReason::MissingField("entries[1].message".to_string()))
        );
    }

    #[test]
    fn rejects_wrongly_typed_fields() {
        assert!(matches!(
            parse_json(json!({"command": "HEARTBEAT", "version": 5})),
            Err(RejectionReason::MalformedInput(_))
        ));
        assert!(matches!(
            parse_json(json!({"command": "LOG", "entries": "oops"})),
            Err(RejectionReason::MalformedInput(_))
        ));
    }

    #[test]
    fn serialized_command_parses_back_unchanged() {
        let command = Command::Log {
            entries: vec![LogEntry {
                timestamp: None,
                level: Some("WARN".to_string()),
                message: "battery low".to_string(),
            }],
        };
        let json = serde_json::to_string(&command).expect("serialize");
        assert_eq!(
            serde_json::from_str::<Value>(&json).expect("json"),
            json!({"command": "LOG", "entries": [{"level": "WARN", "message": "battery low"}]})
        );
        assert_eq!(parse(json.as_bytes()), Ok(command));

        let heartbeat = Command::Heartbeat { version: None };
        let json = serde_json::to_string(&heartbeat).expect("serialize");
        assert_eq!(json, r#"{"command":"HEARTBEAT"}"#);
        assert_eq!(parse(json.as_bytes()), Ok(heartbeat));
    }

    fn arb_log_entry() -> impl Strategy<Value = LogEntry> {
        (
            any::<Option<String>>(),
            any::<Option<String>>(),
            any::<String>(),
        )
            .prop_map(|(timestamp, level, message)| LogEntry {
                timestamp,
                level,
                message,
            })
    }

    fn arb_command() -> impl Strategy<Value = Command> {
        prop_oneof![
            Just(Command::Shutdown),
            Just(Command::Resume),
            any::<Option<String>>().prop_map(|version| Command::Heartbeat { version }),
            prop::collection::vec(arb_log_entry(), 0..4)
                .prop_map(|entries| Command::Log { entries }),
        ]
    }

    proptest! {
        #[test]
        fn prop_every_command_survives_serialization(command in arb_command()) {
            let raw = serde_json::to_vec(&command).expect("serialize");
            prop_assert_eq!(parse(&raw), Ok(command));
        }
    }

    #[test]
    fn every_variant_serializes_to_wire_shape() {
        let cases = [
            (Command::Shutdown, json!({"command": "SHUTDOWN"})),
            (Command::Resume, json!({"command": "RESUME"})),
            (
                Command::Heartbeat {
                    version: Some("2.1.0".to_string()),
                },
                json!({"command": "HEARTBEAT", "version": "2.1.0"}),
            ),
            (
                Command::Log { entries: vec![] },
                json!({"command": "LOG", "entries": []}),
            ),
            (
                Command::Log {
                    entries: vec![LogEntry {
                        timestamp: Some("2024-05-01T10:00:00Z".to_string()),
                        level: Some("ERROR".to_string()),
                        message: "disk full".to_string(),
                    }],
                },
                json!({"command": "LOG", "entries": [{
                    "timestamp": "2024-05-01T10:00:00Z",
                    "level": "ERROR",
                    "message": "disk full"
                }]}),
            ),
        ];
        for (command, expected) in cases {
            assert_eq!(serde_json::to_value(&command).expect("serialize"), expected);
            assert_eq!(parse_value(&expected), Ok(command));
        }
    }

    #[test]
    fn kind_display_matches_wire_tag() {
        assert_eq!(Command::Resume.kind().to_string(), "RESUME");
        assert_eq!(
            Command::Log { entries: vec![] }.kind().to_string(),
            "LOG"
        );
    }
}
