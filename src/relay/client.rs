//! Outbound bridge from the kiosk to the remote dialer.
//!
//! A single supervisor task owns the connection. It walks the
//! [`ConnectionState`] machine: connect, serve the socket until it closes or
//! errors, wait a fixed delay, connect again. There is no backoff and no
//! retry limit. While connected, a `{"type":"ping"}` keep-alive is sent
//! every `keepalive_interval`.

use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::AbortHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};

use super::message::RelayMessage;

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("relay not connected")]
    NotConnected,

    #[error("relay connection closed")]
    Closed,

    #[error("failed to encode relay frame: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Inputs to the connection state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientEvent {
    /// The handshake completed
    Opened,
    /// An established connection closed
    Closed,
    /// Connecting failed or the socket errored
    Failed,
    /// The reconnect delay elapsed
    RetryElapsed,
}

impl ConnectionState {
    /// Next state for `event`. Events that make no sense in the current
    /// state leave it unchanged.
    pub fn on(self, event: ClientEvent) -> Self {
        use ClientEvent::*;
        use ConnectionState::*;
        match (self, event) {
            (Connecting, Opened) => Connected,
            (Connecting | Connected, Closed | Failed) => Disconnected,
            (Disconnected, RetryElapsed) => Connecting,
            (state, _) => state,
        }
    }
}

/// Where and how the client connects.
#[derive(Debug, Clone)]
pub struct RelayClientConfig {
    pub url: String,
    pub reconnect_delay: Duration,
    pub keepalive_interval: Duration,
}

type Link = Arc<Mutex<Option<mpsc::UnboundedSender<Message>>>>;

/// Cloneable handle to the running client.
#[derive(Debug, Clone)]
pub struct RelayClientHandle {
    link: Link,
    state: watch::Receiver<ConnectionState>,
    inbound: broadcast::Sender<RelayMessage>,
    supervisor: AbortHandle,
}

impl RelayClientHandle {
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    /// Decoded frames received from the remote side.
    pub fn subscribe(&self) -> broadcast::Receiver<RelayMessage> {
        self.inbound.subscribe()
    }

    /// Queue a frame on the live connection.
    pub fn send(&self, message: &RelayMessage) -> Result<(), RelayError> {
        let text = message.encode()?;
        let link = self.link.lock();
        let Some(tx) = link.as_ref() else {
            warn!(action = message.kind(), "Relay not ready");
            return Err(RelayError::NotConnected);
        };
        tx.send(Message::Text(text.into()))
            .map_err(|_| RelayError::Closed)
    }

    pub fn dial(&self, number: impl Into<String>) -> Result<(), RelayError> {
        self.send(&RelayMessage::Dial {
            number: number.into(),
        })
    }

    pub fn hangup(&self) -> Result<(), RelayError> {
        self.send(&RelayMessage::Hangup)
    }

    pub fn dtmf(&self, digit: impl Into<String>) -> Result<(), RelayError> {
        self.send(&RelayMessage::Dtmf {
            digit: digit.into(),
        })
    }

    pub fn clear(&self) -> Result<(), RelayError> {
        self.send(&RelayMessage::Clear)
    }

    /// Stop the supervisor. The current connection, if any, is dropped.
    pub fn shutdown(&self) {
        self.supervisor.abort();
        self.link.lock().take();
    }
}

/// Spawn the supervisor on the current runtime.
pub fn spawn(config: RelayClientConfig) -> RelayClientHandle {
    let link: Link = Arc::new(Mutex::new(None));
    let (state_tx, state_rx) = watch::channel(ConnectionState::Connecting);
    let (inbound, _) = broadcast::channel(64);

    let task = tokio::spawn(supervise(
        config,
        Arc::clone(&link),
        state_tx,
        inbound.clone(),
    ));

    RelayClientHandle {
        link,
        state: state_rx,
        inbound,
        supervisor: task.abort_handle(),
    }
}

async fn supervise(
    config: RelayClientConfig,
    link: Link,
    state_tx: watch::Sender<ConnectionState>,
    inbound: broadcast::Sender<RelayMessage>,
) {
    let advance = |event: ClientEvent| {
        state_tx.send_modify(|state| *state = state.on(event));
    };

    loop {
        info!(url = %config.url, "Connecting to relay");
        match connect_async(config.url.as_str()).await {
            Ok((stream, _)) => {
                info!(url = %config.url, "Relay connected");
                let (tx, rx) = mpsc::unbounded_channel();
                *link.lock() = Some(tx);
                advance(ClientEvent::Opened);

                let event = run_connection(stream, rx, &config, &inbound).await;
                link.lock().take();
                advance(event);
            },
            Err(e) => {
                warn!(url = %config.url, error = %e, "Relay connection failed");
                advance(ClientEvent::Failed);
            },
        }

        info!(delay = ?config.reconnect_delay, "Relay closed, reconnecting");
        tokio::time::sleep(config.reconnect_delay).await;
        advance(ClientEvent::RetryElapsed);
    }
}

/// Pump one established connection until it ends. Returns the event that
/// ended it.
async fn run_connection<S>(
    stream: S,
    mut outbound: mpsc::UnboundedReceiver<Message>,
    config: &RelayClientConfig,
    inbound: &broadcast::Sender<RelayMessage>,
) -> ClientEvent
where
    S: futures::Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>>
        + futures::Sink<Message, Error = tokio_tungstenite::tungstenite::Error>
        + Unpin,
{
    let (mut sink, mut source) = stream.split();
    let mut keepalive = interval_at(
        Instant::now() + config.keepalive_interval,
        config.keepalive_interval,
    );
    keepalive.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = keepalive.tick() => {
                let Ok(text) = RelayMessage::Ping.encode() else { continue };
                if let Err(e) = sink.send(Message::Text(text.into())).await {
                    warn!(error = %e, "Relay keep-alive failed");
                    return ClientEvent::Failed;
                }
                debug!("Sent relay keep-alive ping");
            },
            Some(frame) = outbound.recv() => {
                if let Err(e) = sink.send(frame).await {
                    warn!(error = %e, "Relay send failed");
                    return ClientEvent::Failed;
                }
            },
            frame = source.next() => match frame {
                Some(Ok(Message::Text(text))) => match RelayMessage::decode(text.as_str()) {
                    Ok(message) => {
                        info!(kind = message.kind(), "Relay message received");
                        let _ = inbound.send(message);
                    },
                    Err(_) => info!(raw = %text.as_str(), "Relay message received"),
                },
                Some(Ok(Message::Binary(bytes))) => {
                    info!(raw = %String::from_utf8_lossy(&bytes), "Relay message received");
                },
                Some(Ok(Message::Close(_))) | None => return ClientEvent::Closed,
                Some(Ok(_)) => {},
                Some(Err(e)) => {
                    warn!(error = %e, "Relay socket error");
                    return ClientEvent::Failed;
                },
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ClientEvent::*;
    use ConnectionState::*;

    #[test]
    fn full_reconnect_cycle() {
        let mut state = Connecting;
        for (event, expected) in [
            (Opened, Connected),
            (Closed, Disconnected),
            (RetryElapsed, Connecting),
            (Failed, Disconnected),
            (RetryElapsed, Connecting),
            (Opened, Connected),
            (Failed, Disconnected),
        ] {
            state = state.on(event);
            assert_eq!(state, expected, "after {event:?}");
        }
    }

    #[test]
    fn irrelevant_events_are_ignored() {
        assert_eq!(Disconnected.on(Opened), Disconnected);
        assert_eq!(Disconnected.on(Closed), Disconnected);
        assert_eq!(Connected.on(RetryElapsed), Connected);
        assert_eq!(Connected.on(Opened), Connected);
        assert_eq!(Connecting.on(RetryElapsed), Connecting);
    }

    #[tokio::test]
    async fn send_without_connection_is_rejected() {
        let handle = spawn(RelayClientConfig {
            // Port 9 on loopback is closed in the test environment.
            url: "ws://127.0.0.1:9".to_string(),
            reconnect_delay: Duration::from_secs(60),
            keepalive_interval: Duration::from_secs(60),
        });
        assert!(matches!(handle.dial("112"), Err(RelayError::NotConnected)));
        assert!(matches!(handle.clear(), Err(RelayError::NotConnected)));
        handle.shutdown();
    }
}
