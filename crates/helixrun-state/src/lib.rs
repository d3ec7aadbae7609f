//! HelixRun-State: session storage for the HelixRun agent runtime
//!
//! ## Layer 0 - Data
//!
//! Focus: conversation history keyed by `(app, user, session)` and the
//! per-session exclusivity contract the execution engine relies on.
//!
//! ## Key Components
//!
//! - `SessionStore`: backend-agnostic async contract
//! - `InMemorySessionStore`: process-wide, non-persistent implementation
//! - `SessionLease`: RAII guard serializing runs on one session

mod error;
pub mod memory;
pub mod storage_traits;

pub use error::StoreError;
pub use memory::InMemorySessionStore;
pub use storage_traits::{
    new_session_id, Session, SessionKey, SessionLease, SessionStore, SessionTurn, StoreResult,
    TurnRole,
};
