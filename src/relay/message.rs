//! JSON frames exchanged with the dialer listener.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Reply text for a well-formed frame the listener does not act on.
pub const UNSUPPORTED_COMMAND: &str = "Unsupported command received";
/// Reply text for a dial whose number is blank after trimming.
pub const EMPTY_NUMBER: &str = "Dial command requires a non-empty number";

/// One relay frame, discriminated by its `type` field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum RelayMessage {
    /// Ask the remote device to open its dialer with `number`
    Dial { number: String },
    /// Successful dispatch of a command
    Ack {
        action: String,
        number: String,
        status: String,
    },
    /// A command could not be handled
    Error { message: String },
    Ping,
    Pong,
    Hangup,
    Dtmf { digit: String },
    Clear,
}

/// Why an inbound text frame could not be turned into a [`RelayMessage`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("Invalid JSON payload: {0}")]
    InvalidJson(String),

    #[error("Unsupported command received")]
    Unsupported,
}

impl RelayMessage {
    /// Parse a frame in two steps so that malformed JSON and an unknown or
    /// ill-typed command produce different replies.
    pub fn decode(text: &str) -> Result<Self, DecodeError> {
        let value: serde_json::Value =
            serde_json::from_str(text).map_err(|e| DecodeError::InvalidJson(e.to_string()))?;
        serde_json::from_value(value).map_err(|_| DecodeError::Unsupported)
    }

    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    /// The acknowledgement sent after a dial was dispatched.
    pub fn accepted(number: impl Into<String>) -> Self {
        Self::Ack {
            action: "dial".to_string(),
            number: number.into(),
            status: "accepted".to_string(),
        }
    }

    /// The `type` tag, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Dial { .. } => "dial",
            Self::Ack { .. } => "ack",
            Self::Error { .. } => "error",
            Self::Ping => "ping",
            Self::Pong => "pong",
            Self::Hangup => "hangup",
            Self::Dtmf { .. } => "dtmf",
            Self::Clear => "clear",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn wire_shapes() {
        let ack = serde_json::to_value(RelayMessage::accepted("0612345678")).unwrap();
        assert_eq!(
            ack,
            json!({"type": "ack", "action": "dial", "number": "0612345678", "status": "accepted"})
        );
        assert_eq!(
            serde_json::to_value(RelayMessage::Ping).unwrap(),
            json!({"type": "ping"})
        );
        assert_eq!(
            serde_json::to_value(RelayMessage::Dtmf {
                digit: "5".to_string()
            })
            .unwrap(),
            json!({"type": "dtmf", "digit": "5"})
        );
    }

    #[test]
    fn decodes_known_commands() {
        assert_eq!(
            RelayMessage::decode(r#"{"type":"dial","number":" 112 "}"#),
            Ok(RelayMessage::Dial {
                number: " 112 ".to_string()
            })
        );
        assert_eq!(
            RelayMessage::decode(r#"{"type":"ping"}"#),
            Ok(RelayMessage::Ping)
        );
    }

    #[test]
    fn malformed_json_and_unknown_commands_are_distinguished() {
        let invalid = RelayMessage::decode("not json").unwrap_err();
        assert!(matches!(invalid, DecodeError::InvalidJson(_)));
        assert!(invalid.to_string().starts_with("Invalid JSON payload: "));

        for text in [
            r#"{"type":"reboot"}"#,
            r#"{"type":"dial"}"#,
            r#"{"type":"dial","number":42}"#,
            r#"[1,2,3]"#,
            r#""dial""#,
        ] {
            assert_eq!(
                RelayMessage::decode(text),
                Err(DecodeError::Unsupported),
                "{text}"
            );
        }
        assert_eq!(DecodeError::Unsupported.to_string(), UNSUPPORTED_COMMAND);
    }
}
