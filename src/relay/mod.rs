//! WebSocket relay between the kiosk and the remote dialer device.
//!
//! - [`hub`]: fan-out server hosted by the kiosk
//! - [`client`]: the kiosk's reconnecting connection to the dialer
//! - [`listener`]: the dialer side, with heartbeat dead-peer detection

pub mod client;
pub mod heartbeat;
pub mod hub;
pub mod listener;
pub mod message;

pub use client::{
    ClientEvent, ConnectionState, RelayClientConfig, RelayClientHandle, RelayError,
};
pub use heartbeat::{Heartbeat, HeartbeatAction};
pub use hub::RelayHub;
pub use listener::{respond, AndroidIntentDialer, DialError, Dialer};
pub use message::{DecodeError, RelayMessage};
