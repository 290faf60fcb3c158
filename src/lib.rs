//! Kiosk Service
//!
//! The local service layer of a wall-mounted kiosk. It serves the kiosk UI
//! and a small JSON API over HTTP, keeps tasks and browser session cookies
//! on disk, reports device status, and bridges dial-pad actions to a phone
//! over a WebSocket relay.
//!
//! # Usage
//!
//! ```bash
//! kiosk-service serve --content-dir renderer --data-dir data
//! kiosk-service dialer --port 5001
//! kiosk-service seed
//! ```
//!
//! # Components
//!
//! - [`paths::PathResolver`]: sandboxed request-path to file mapping
//! - [`server::ContentServer`]: static content, task, status, session and dial-pad routes
//! - [`service::KioskService`]: the `serve` lifecycle, ending in a forced cookie flush
//! - [`tasks::TaskStore`]: lazily loaded task collection, persisted on every change
//! - [`cookies::CookiePersistence`]: debounced cookie snapshots
//! - [`status::SystemProbe`]: port liveness, uptime and battery
//! - [`relay`]: fan-out hub, reconnecting client and the dialer listener

pub mod config;
pub mod cookies;
pub mod error;
pub mod handlers;
pub mod paths;
pub mod relay;
pub mod seed;
pub mod server;
pub mod service;
pub mod status;
pub mod tasks;

pub use config::{DialerConfig, KioskConfig};
pub use error::ApiError;
pub use paths::{PathResolver, ResolveError};
pub use server::{router, AppState, ContentServer};
pub use service::KioskService;
