//! Concurrent in-memory session store.
//!
//! The top-level map is a sharded [`DashMap`] from session ID to a per-session
//! [`Mutex`]. Map guards are always released before a session lock is taken,
//! so operations on different sessions never wait on each other and writes to
//! the same session are applied in lock-acquisition order.
//!
//! Sessions are created implicitly by writes. Reads never create: most return
//! [`StateError::NotFound`] for unknown IDs, while [`SessionStore::get_messages`]
//! returns an empty history.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, TimeDelta, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::{debug, info, warn};

use crate::config::SessionConfig;
use crate::error::{Result, StateError};
use crate::session::types::{
    Message, OrderContext, OrderContextUpdate, OrderItem, Role, SessionStats, SessionSummary,
};

struct Session {
    created_at: DateTime<Utc>,
    last_activity: DateTime<Utc>,
    messages: VecDeque<Message>,
    order: OrderContext,
    metadata: HashMap<String, serde_json::Value>,
    /// Set under the session lock when the session leaves the map. Writers
    /// holding a stale handle retry against a fresh entry.
    removed: bool,
}

impl Session {
    fn new(now: DateTime<Utc>) -> Self {
        Self {
            created_at: now,
            last_activity: now,
            messages: VecDeque::new(),
            order: OrderContext::default(),
            metadata: HashMap::new(),
            removed: false,
        }
    }
}

type SessionHandle = Arc<Mutex<Session>>;

/// Per-session conversation history and order state.
///
/// Construct once at startup and share behind an `Arc`.
pub struct SessionStore {
    sessions: DashMap<String, SessionHandle>,
    config: SessionConfig,
    /// Unix millis of the last sweep. Writers race on it with
    /// `compare_exchange`; exactly one wins each interval.
    last_sweep_ms: AtomicI64,
}

impl SessionStore {
    /// Create an empty store. `max_messages_per_session` is clamped to at least 1.
    pub fn new(mut config: SessionConfig) -> Self {
        config.max_messages_per_session = config.max_messages_per_session.max(1);
        Self {
            sessions: DashMap::new(),
            config,
            last_sweep_ms: AtomicI64::new(Utc::now().timestamp_millis()),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Generate a fresh session ID. No state is created until the first write.
    pub fn new_session_id() -> String {
        uuid::Uuid::new_v4().to_string()
    }

    // -- conversation history ----------------------------------------------

    /// Append a message, creating the session if needed, and trim history to
    /// the newest `max_messages_per_session` entries.
    pub fn append_message(&self, session_id: &str, role: Role, content: impl Into<String>) {
        self.append_message_with_metadata(session_id, role, content, HashMap::new());
    }

    /// Like [`append_message`](Self::append_message), attaching `metadata`
    /// when this call creates the session. Existing sessions keep theirs.
    pub fn append_message_with_metadata(
        &self,
        session_id: &str,
        role: Role,
        content: impl Into<String>,
        metadata: HashMap<String, serde_json::Value>,
    ) {
        let limit = self.config.max_messages_per_session;
        let content = content.into();
        self.write(session_id, |session, created| {
            if created {
                session.metadata = metadata;
            }
            // Stamped under the session lock so timestamps follow history order.
            session.messages.push_back(Message::new(role, content));
            while session.messages.len() > limit {
                session.messages.pop_front();
            }
        });
    }

    /// Full history in insertion order, or empty if the session is unknown.
    pub fn get_messages(&self, session_id: &str) -> Vec<Message> {
        self.read(session_id, true, |session| {
            session.messages.iter().cloned().collect()
        })
        .unwrap_or_default()
    }

    /// The newest `limit` messages, oldest first.
    pub fn recent_messages(&self, session_id: &str, limit: usize) -> Vec<Message> {
        self.read(session_id, true, |session| {
            let skip = session.messages.len().saturating_sub(limit);
            session.messages.iter().skip(skip).cloned().collect()
        })
        .unwrap_or_default()
    }

    /// Number of stored messages, 0 for unknown sessions.
    pub fn message_count(&self, session_id: &str) -> usize {
        self.read(session_id, false, |session| session.messages.len())
            .unwrap_or(0)
    }

    // -- order context -----------------------------------------------------

    pub fn get_order_context(&self, session_id: &str) -> Result<OrderContext> {
        self.read(session_id, false, |session| session.order.clone())
            .ok_or_else(|| StateError::NotFound(session_id.to_string()))
    }

    /// Merge `update` into the stored context and return the result.
    pub fn update_order_context(
        &self,
        session_id: &str,
        update: OrderContextUpdate,
    ) -> OrderContext {
        self.write(session_id, |session, _| {
            session.order.apply(update);
            session.order.clone()
        })
    }

    /// Append a line item and return the updated context.
    pub fn add_order_item(&self, session_id: &str, item: OrderItem) -> OrderContext {
        self.write(session_id, |session, _| {
            session.order.push_item(item);
            session.order.clone()
        })
    }

    /// Remove and return the line item at `index`.
    pub fn remove_order_item(&self, session_id: &str, index: usize) -> Result<OrderItem> {
        let result = self
            .modify(session_id, |session| -> Result<OrderItem> {
                let removed = session.order.remove_item(index)?;
                session.last_activity = Utc::now();
                Ok(removed)
            })
            .ok_or_else(|| StateError::NotFound(session_id.to_string()))?;
        self.maybe_sweep();
        result
    }

    /// Drop all line items and reset the total to zero.
    pub fn clear_order(&self, session_id: &str) -> OrderContext {
        self.write(session_id, |session, _| {
            session.order.clear_items();
            session.order.clone()
        })
    }

    // -- metadata / lifecycle ----------------------------------------------

    pub fn set_metadata(&self, session_id: &str, key: impl Into<String>, value: serde_json::Value) {
        let key = key.into();
        self.write(session_id, |session, _| {
            session.metadata.insert(key, value);
        });
    }

    pub fn get_summary(&self, session_id: &str) -> Result<SessionSummary> {
        self.read(session_id, false, |session| SessionSummary {
            session_id: session_id.to_string(),
            created_at: session.created_at,
            last_activity: session.last_activity,
            message_count: session.messages.len(),
            order_context: session.order.clone(),
            metadata: session.metadata.clone(),
        })
        .ok_or_else(|| StateError::NotFound(session_id.to_string()))
    }

    /// Remove a session. Unknown IDs are ignored.
    pub fn delete_session(&self, session_id: &str) {
        if let Some((_, handle)) = self.sessions.remove(session_id) {
            lock(&handle).removed = true;
            debug!(session_id = %session_id, "Session deleted");
        }
    }

    pub fn exists(&self, session_id: &str) -> bool {
        self.sessions.contains_key(session_id)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn session_ids(&self) -> Vec<String> {
        self.sessions.iter().map(|entry| entry.key().clone()).collect()
    }

    pub fn stats(&self) -> SessionStats {
        let handles: Vec<SessionHandle> = self
            .sessions
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        let total_messages: usize = handles
            .iter()
            .map(|handle| lock(handle).messages.len())
            .sum();
        SessionStats {
            active_sessions: handles.len(),
            total_messages,
        }
    }

    // -- sweep -------------------------------------------------------------

    /// Remove sessions idle past the inactivity cutoff, at most once per
    /// sweep interval. Returns how many sessions were removed.
    pub fn sweep_at(&self, now: DateTime<Utc>) -> usize {
        let now_ms = now.timestamp_millis();
        let interval_ms = secs(self.config.sweep_interval_secs).num_milliseconds();
        let mut last = self.last_sweep_ms.load(Ordering::Acquire);
        loop {
            if now_ms.saturating_sub(last) < interval_ms {
                return 0;
            }
            match self.last_sweep_ms.compare_exchange_weak(
                last,
                now_ms,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => break,
                Err(current) => last = current,
            }
        }
        self.remove_inactive(now)
    }

    /// Remove idle sessions regardless of when the last sweep ran.
    pub fn purge_inactive(&self, now: DateTime<Utc>) -> usize {
        self.last_sweep_ms
            .store(now.timestamp_millis(), Ordering::Release);
        self.remove_inactive(now)
    }

    fn remove_inactive(&self, now: DateTime<Utc>) -> usize {
        let Some(cutoff) = now.checked_sub_signed(secs(self.config.inactivity_cutoff_secs)) else {
            return 0;
        };

        let mut removed = 0;
        self.sessions.retain(|_, handle| {
            let mut session = lock(handle);
            if session.last_activity < cutoff {
                session.removed = true;
                removed += 1;
                false
            } else {
                true
            }
        });
        let remaining = self.sessions.len();

        info!(removed, remaining, "Swept inactive sessions");
        if remaining > self.config.max_sessions {
            warn!(
                remaining,
                max_sessions = self.config.max_sessions,
                "Live sessions exceed configured soft limit"
            );
        }
        removed
    }

    fn maybe_sweep(&self) {
        self.sweep_at(Utc::now());
    }

    // -- private helpers ---------------------------------------------------

    /// Run `f` against the session, creating it first if absent. `f` also
    /// receives whether this call created the session.
    fn write<R>(&self, session_id: &str, f: impl FnOnce(&mut Session, bool) -> R) -> R {
        let now = Utc::now();
        let mut f = Some(f);
        let result = loop {
            let (handle, created) = match self.sessions.entry(session_id.to_string()) {
                Entry::Occupied(entry) => (Arc::clone(entry.get()), false),
                Entry::Vacant(entry) => {
                    let handle = Arc::new(Mutex::new(Session::new(now)));
                    entry.insert(Arc::clone(&handle));
                    debug!(session_id = %session_id, "Session created");
                    (handle, true)
                }
            };

            let mut session = lock(&handle);
            if session.removed {
                continue;
            }
            session.last_activity = Utc::now();
            if let Some(f) = f.take() {
                break f(&mut *session, created);
            }
        };
        self.maybe_sweep();
        result
    }

    /// Run `f` against an existing session without creating it.
    fn modify<R>(&self, session_id: &str, f: impl FnOnce(&mut Session) -> R) -> Option<R> {
        let handle = self
            .sessions
            .get(session_id)
            .map(|entry| Arc::clone(entry.value()))?;
        let mut session = lock(&handle);
        if session.removed {
            return None;
        }
        Some(f(&mut *session))
    }

    fn read<R>(&self, session_id: &str, touch: bool, f: impl FnOnce(&Session) -> R) -> Option<R> {
        self.modify(session_id, |session| {
            if touch {
                session.last_activity = Utc::now();
            }
            f(&*session)
        })
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new(SessionConfig::default())
    }
}

// A panicking writer can only poison a lock after its mutation completed or
// before it started; the session stays structurally valid either way.
fn lock(handle: &Mutex<Session>) -> MutexGuard<'_, Session> {
    handle.lock().unwrap_or_else(PoisonError::into_inner)
}

fn secs(n: u64) -> TimeDelta {
    i64::try_from(n)
        .ok()
        .and_then(TimeDelta::try_seconds)
        .unwrap_or(TimeDelta::MAX)
}
