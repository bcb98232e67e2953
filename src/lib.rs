//! Conversation state and response reuse for LLM-backed chat ordering.
//!
//! Two independent components, both built once at startup and shared with
//! whatever serves requests:
//!
//! - [`SessionStore`] keeps per-session message history and the order in
//!   progress, with an inactivity sweep.
//! - [`ResponseCache`] maps a request fingerprint to a previously generated
//!   response, bounded by size (LRU) and age (TTL).
//!
//! ```no_run
//! use std::sync::Arc;
//! use convostate::{ResponseCache, Role, SessionStore, StateConfig};
//!
//! let config = StateConfig::load().unwrap_or_default();
//! let sessions = Arc::new(SessionStore::new(config.session.clone()));
//! let cache = Arc::new(ResponseCache::from_config(&config.cache));
//!
//! let session_id = SessionStore::new_session_id();
//! let key = ResponseCache::make_key("What's popular?", "qwen/qwen3-coder:free", 80, 0.7);
//! let reply = match cache.get(&key) {
//!     Some(hit) => hit,
//!     None => {
//!         let generated = String::from("Our Peri Peri Pizza."); // upstream call
//!         cache.set(key, generated.clone());
//!         generated
//!     }
//! };
//! sessions.append_message(&session_id, Role::User, "What's popular?");
//! sessions.append_message(&session_id, Role::Assistant, reply);
//! ```

pub mod cache;
pub mod config;
pub mod error;
pub mod logging;
pub mod session;

pub use cache::{CacheStats, ResponseCache};
pub use config::{CacheConfig, SessionConfig, StateConfig};
pub use error::{Result, StateError};
pub use session::{
    spawn_sweeper, Message, OrderContext, OrderContextUpdate, OrderItem, Role, SessionStats,
    SessionStore, SessionSummary,
};
