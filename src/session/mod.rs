//! Per-session conversation history and order context.

pub mod store;
pub mod sweeper;
pub mod types;

pub use store::SessionStore;
pub use sweeper::{spawn_sweeper, spawn_sweeper_every};
pub use types::{
    Message, OrderContext, OrderContextUpdate, OrderItem, Role, SessionStats, SessionSummary,
};
