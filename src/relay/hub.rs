//! Kiosk-hosted fan-out relay.
//!
//! Every text or binary frame received from one peer is forwarded unchanged
//! to every other open peer. Each peer has a bounded outbound queue; a peer
//! whose queue is full misses the frame instead of growing the hub. The peer
//! set is only locked for the duration of a map operation, never across an
//! await.

use std::collections::HashMap;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        ConnectInfo, State,
    },
    response::IntoResponse,
    Router,
};
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::net::TcpListener;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, info, warn};

/// Frames queued for one peer before further frames to it are dropped.
pub const PEER_QUEUE_CAPACITY: usize = 64;

struct Peer {
    addr: SocketAddr,
    tx: mpsc::Sender<Message>,
}

/// Shared set of connected relay peers.
#[derive(Default)]
pub struct RelayHub {
    peers: Mutex<HashMap<u64, Peer>>,
    next_id: AtomicU64,
}

impl std::fmt::Debug for RelayHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayHub")
            .field("peers", &self.peer_count())
            .finish()
    }
}

impl RelayHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn peer_count(&self) -> usize {
        self.peers.lock().len()
    }

    fn join(&self, addr: SocketAddr, tx: mpsc::Sender<Message>) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.peers.lock().insert(id, Peer { addr, tx });
        id
    }

    fn leave(&self, id: u64) {
        self.peers.lock().remove(&id);
    }

    /// Queue `frame` for every peer except `from`. Peers whose writer has
    /// already gone away, or whose queue is full, are skipped. Returns how
    /// many peers were reached.
    pub fn broadcast(&self, from: u64, frame: &Message) -> usize {
        let peers = self.peers.lock();
        peers
            .iter()
            .filter(|(id, _)| **id != from)
            .filter(|(_, peer)| match peer.tx.try_send(frame.clone()) {
                Ok(()) => true,
                Err(TrySendError::Full(_)) => {
                    warn!(peer = %peer.addr, "Relay peer is not keeping up, dropping frame");
                    false
                },
                Err(TrySendError::Closed(_)) => {
                    debug!(peer = %peer.addr, "Skipping closed relay peer");
                    false
                },
            })
            .count()
    }
}

/// Router accepting relay connections on any path.
pub fn router(hub: Arc<RelayHub>) -> Router {
    Router::new().fallback(upgrade).with_state(hub)
}

/// Serve the relay on an already-bound listener until `shutdown` resolves.
pub async fn serve<F>(listener: TcpListener, hub: Arc<RelayHub>, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    if let Ok(addr) = listener.local_addr() {
        info!("Relay server listening on ws://{}", addr);
    }
    axum::serve(
        listener,
        router(hub).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await
}

async fn upgrade(
    ws: WebSocketUpgrade,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(hub): State<Arc<RelayHub>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, addr, hub))
}

async fn handle_socket(socket: WebSocket, addr: SocketAddr, hub: Arc<RelayHub>) {
    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::channel::<Message>(PEER_QUEUE_CAPACITY);
    let id = hub.join(addr, tx);
    info!(peer = %addr, peers = hub.peer_count(), "Relay peer connected");

    let writer = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if sender.send(frame).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(frame)) = receiver.next().await {
        match frame {
            Message::Text(_) | Message::Binary(_) => {
                let reached = hub.broadcast(id, &frame);
                debug!(peer = %addr, reached, "Relayed frame");
            },
            Message::Close(_) => break,
            Message::Ping(_) | Message::Pong(_) => {},
        }
    }

    hub.leave(id);
    writer.abort();
    info!(peer = %addr, peers = hub.peer_count(), "Relay peer disconnected");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], port))
    }

    #[test]
    fn broadcast_skips_sender_and_closed_peers() {
        let hub = RelayHub::new();
        let (tx_a, mut rx_a) = mpsc::channel(PEER_QUEUE_CAPACITY);
        let (tx_b, mut rx_b) = mpsc::channel(PEER_QUEUE_CAPACITY);
        let (tx_c, rx_c) = mpsc::channel(PEER_QUEUE_CAPACITY);
        let a = hub.join(addr(1), tx_a);
        hub.join(addr(2), tx_b);
        hub.join(addr(3), tx_c);
        drop(rx_c);

        let reached = hub.broadcast(a, &Message::Text("hello".into()));
        assert_eq!(reached, 1);
        assert!(rx_a.try_recv().is_err());
        match rx_b.try_recv().unwrap() {
            Message::Text(text) => assert_eq!(text.as_str(), "hello"),
            other => panic!("unexpected frame {other:?}"),
        }
    }

    #[test]
    fn stalled_peer_misses_frames_once_its_queue_is_full() {
        let hub = RelayHub::new();
        let (tx_sender, _rx_sender) = mpsc::channel(PEER_QUEUE_CAPACITY);
        let (tx_stalled, mut rx_stalled) = mpsc::channel(PEER_QUEUE_CAPACITY);
        let (tx_live, mut rx_live) = mpsc::channel(PEER_QUEUE_CAPACITY);
        let sender = hub.join(addr(1), tx_sender);
        hub.join(addr(2), tx_stalled);
        hub.join(addr(3), tx_live);

        for n in 0..PEER_QUEUE_CAPACITY {
            assert_eq!(hub.broadcast(sender, &Message::Text(n.to_string().into())), 2);
            // The live peer drains its queue; the stalled one never does.
            rx_live.try_recv().unwrap();
        }
        assert_eq!(hub.broadcast(sender, &Message::Text("overflow".into())), 1);
        match rx_live.try_recv().unwrap() {
            Message::Text(text) => assert_eq!(text.as_str(), "overflow"),
            other => panic!("unexpected frame {other:?}"),
        }

        let mut queued = 0;
        while rx_stalled.try_recv().is_ok() {
            queued += 1;
        }
        assert_eq!(queued, PEER_QUEUE_CAPACITY);
    }

    #[test]
    fn leave_removes_peer() {
        let hub = RelayHub::new();
        let (tx, _rx) = mpsc::channel(PEER_QUEUE_CAPACITY);
        let id = hub.join(addr(1), tx);
        assert_eq!(hub.peer_count(), 1);
        hub.leave(id);
        assert_eq!(hub.peer_count(), 0);
    }
}
