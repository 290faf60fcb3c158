//! Dial-pad handler: forwards keypad actions to the remote dialer.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{rejection::BytesRejection, State},
    http::StatusCode,
    response::Json,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::read_json;
use crate::error::ApiError;
use crate::relay::RelayMessage;
use crate::server::AppState;

#[derive(Deserialize)]
pub struct DialpadRequest {
    pub action: String,
    #[serde(default)]
    pub number: Option<String>,
}

#[derive(Serialize)]
pub struct DialpadResponse {
    pub status: &'static str,
}

impl DialpadRequest {
    /// Map the keypad action onto a relay frame. `dtmf` carries its digit in
    /// `number`.
    pub fn into_message(self) -> Result<RelayMessage, ApiError> {
        let number = self.number.unwrap_or_default();
        match self.action.as_str() {
            "dial" if number.trim().is_empty() => {
                Err(ApiError::bad_request("dial requires a non-empty number"))
            },
            "dial" => Ok(RelayMessage::Dial {
                number: number.trim().to_string(),
            }),
            "dtmf" if number.is_empty() => Err(ApiError::bad_request("dtmf requires a digit")),
            "dtmf" => Ok(RelayMessage::Dtmf { digit: number }),
            "hangup" => Ok(RelayMessage::Hangup),
            "clear" => Ok(RelayMessage::Clear),
            other => Err(ApiError::bad_request(format!(
                "Unknown dialpad action '{other}'"
            ))),
        }
    }
}

pub async fn send(
    State(state): State<Arc<AppState>>,
    body: Result<Bytes, BytesRejection>,
) -> Result<(StatusCode, Json<DialpadResponse>), ApiError> {
    let request: DialpadRequest = read_json(body)?;
    let message = request.into_message()?;
    let relay = state.relay.as_ref().ok_or_else(|| {
        ApiError::new(StatusCode::SERVICE_UNAVAILABLE, "relay client disabled")
    })?;
    relay.send(&message)?;
    info!(action = message.kind(), "Dialpad action forwarded");
    Ok((StatusCode::ACCEPTED, Json(DialpadResponse { status: "sent" })))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(action: &str, number: Option<&str>) -> DialpadRequest {
        DialpadRequest {
            action: action.to_string(),
            number: number.map(str::to_string),
        }
    }

    #[test]
    fn actions_map_to_frames() {
        assert_eq!(
            request("dial", Some(" 112 ")).into_message().unwrap(),
            RelayMessage::Dial {
                number: "112".to_string()
            }
        );
        assert_eq!(
            request("dtmf", Some("#")).into_message().unwrap(),
            RelayMessage::Dtmf {
                digit: "#".to_string()
            }
        );
        assert_eq!(request("hangup", None).into_message().unwrap(), RelayMessage::Hangup);
        assert_eq!(request("clear", Some("ignored")).into_message().unwrap(), RelayMessage::Clear);
    }

    #[test]
    fn bad_actions_are_client_errors() {
        for (action, number) in [("dial", None), ("dial", Some("  ")), ("dtmf", None), ("reboot", None)] {
            let err = request(action, number).into_message().unwrap_err();
            assert_eq!(err.status(), StatusCode::BAD_REQUEST, "{action}");
        }
    }
}
