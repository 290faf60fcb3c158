//! Browser session cookies that survive restarts.
//!
//! The snapshot is restored once at startup, before the content server
//! accepts its first request, and written back after every quiet period
//! following a burst of changes.

pub mod persist;
pub mod record;
pub mod store;

pub use persist::{CookiePersistence, RestoreSummary};
pub use record::{Cookie, CookieRecord, SameSite};
pub use store::{CookieChange, CookieError, CookieStore, MemoryCookieStore};
