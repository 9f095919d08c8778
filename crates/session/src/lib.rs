//! Per-conversation state and its persistence contract. The in-memory map
//! is authoritative for the process lifetime; an optional remote store
//! receives a write-through copy on every save and hydrates cold sessions.

mod manager;
mod state;
mod store;

pub use manager::SessionManager;
pub use state::{ChatRole, ChatTurn, SessionIntent, SessionState, Stage, StepIntent};
pub use store::{RemoteSessionStore, SessionStore, StoreError};
