//! Remote dialer listener, run on the phone that places calls.
//!
//! Accepts WebSocket connections on any path, answers `ping` with `pong`,
//! dispatches `dial` through a [`Dialer`] and replies with an `ack` or an
//! `error` frame. A bad frame never closes the connection. Each connection
//! carries its own [`Heartbeat`].

use std::future::Future;
use std::net::SocketAddr;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    body::Bytes,
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        ConnectInfo, State,
    },
    response::IntoResponse,
    Router,
};
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::process::Command;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::heartbeat::{Heartbeat, HeartbeatAction};
use crate::config::DIAL_TIMEOUT;
use super::message::{RelayMessage, EMPTY_NUMBER, UNSUPPORTED_COMMAND};

#[derive(Debug, Error)]
pub enum DialError {
    #[error("failed to spawn '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("'{program}' exited with {status}: {stderr}")]
    Failed {
        program: String,
        status: std::process::ExitStatus,
        stderr: String,
    },

    #[error("dialer did not finish within {0:?}")]
    Timeout(Duration),
}

/// Something that can place a call.
#[async_trait]
pub trait Dialer: Send + Sync {
    /// `number` is already trimmed and non-empty.
    async fn dial(&self, number: &str) -> Result<(), DialError>;
}

/// Opens the Android dialer through an activity-manager intent.
#[derive(Debug, Clone)]
pub struct AndroidIntentDialer {
    program: String,
}

impl Default for AndroidIntentDialer {
    fn default() -> Self {
        Self {
            program: "am".to_string(),
        }
    }
}

impl AndroidIntentDialer {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

#[async_trait]
impl Dialer for AndroidIntentDialer {
    async fn dial(&self, number: &str) -> Result<(), DialError> {
        let output = Command::new(&self.program)
            .args(["start", "-a", "android.intent.action.DIAL", "-d"])
            .arg(format!("tel:{number}"))
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| DialError::Spawn {
                program: self.program.clone(),
                source,
            })?;
        if !output.status.success() {
            return Err(DialError::Failed {
                program: self.program.clone(),
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(())
    }
}

/// Build the reply for one inbound text frame. A dial that outlasts
/// [`DIAL_TIMEOUT`] is abandoned and reported as failed.
pub async fn respond(text: &str, dialer: &dyn Dialer) -> RelayMessage {
    let message = match RelayMessage::decode(text) {
        Ok(message) => message,
        Err(e) => return RelayMessage::error(e.to_string()),
    };
    match message {
        RelayMessage::Ping => RelayMessage::Pong,
        RelayMessage::Dial { number } => {
            let number = number.trim();
            if number.is_empty() {
                return RelayMessage::error(EMPTY_NUMBER);
            }
            let dispatched = tokio::time::timeout(DIAL_TIMEOUT, dialer.dial(number))
                .await
                .unwrap_or(Err(DialError::Timeout(DIAL_TIMEOUT)));
            match dispatched {
                Ok(()) => {
                    info!(number, "Dial intent dispatched");
                    RelayMessage::accepted(number)
                },
                Err(e) => {
                    warn!(number, error = %e, "Dial intent failed");
                    RelayMessage::error(format!("Failed to execute dial intent: {e}"))
                },
            }
        },
        other => {
            debug!(kind = other.kind(), "Ignoring unsupported command");
            RelayMessage::error(UNSUPPORTED_COMMAND)
        },
    }
}

#[derive(Clone)]
struct ListenerState {
    dialer: Arc<dyn Dialer>,
    ping_interval: Duration,
}

/// Router accepting dialer connections on any path.
pub fn router(dialer: Arc<dyn Dialer>, ping_interval: Duration) -> Router {
    Router::new()
        .fallback(upgrade)
        .with_state(ListenerState {
            dialer,
            ping_interval,
        })
}

/// Serve the listener on an already-bound socket until `shutdown` resolves.
pub async fn serve<F>(
    listener: TcpListener,
    dialer: Arc<dyn Dialer>,
    ping_interval: Duration,
    shutdown: F,
) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    if let Ok(addr) = listener.local_addr() {
        info!("Dialer listener waiting on ws://{}", addr);
    }
    axum::serve(
        listener,
        router(dialer, ping_interval).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await
}

async fn upgrade(
    ws: WebSocketUpgrade,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(state): State<ListenerState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, addr, state))
}

async fn handle_socket(mut socket: WebSocket, addr: SocketAddr, state: ListenerState) {
    info!(peer = %addr, "Dialer peer connected");
    let mut heartbeat = Heartbeat::new();
    let mut ticker = interval_at(Instant::now() + state.ping_interval, state.ping_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        // Frames first: pongs that queued up while a dial was in flight must
        // count before an overdue tick is judged.
        tokio::select! {
            biased;

            frame = socket.recv() => {
                let text = match frame {
                    Some(Ok(Message::Text(text))) => text.as_str().to_string(),
                    Some(Ok(Message::Binary(bytes))) => String::from_utf8_lossy(&bytes).into_owned(),
                    Some(Ok(Message::Pong(_))) => {
                        heartbeat.on_pong();
                        continue;
                    },
                    Some(Ok(Message::Ping(_))) => continue,
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                };
                let reply = respond(&text, state.dialer.as_ref()).await;
                let Ok(encoded) = reply.encode() else { continue };
                if socket.send(Message::Text(encoded.into())).await.is_err() {
                    break;
                }
            },
            _ = ticker.tick() => match heartbeat.tick() {
                HeartbeatAction::Ping => {
                    if socket.send(Message::Ping(Bytes::new())).await.is_err() {
                        break;
                    }
                },
                HeartbeatAction::Terminate => {
                    warn!(peer = %addr, "Peer missed heartbeat, terminating");
                    break;
                },
            },
        }
    }

    info!(peer = %addr, "Dialer peer disconnected");
}
