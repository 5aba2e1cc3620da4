//! Session management core module.
//!
//! This module holds the bounded history of scan events, the operator's current regime and
//! the completeness classification derived from both.

/// Submodule for scan event data structures and classification.
pub mod session;
/// Submodule for the fixed-capacity event ring buffer.
pub mod session_log;
/// Submodule for the session store implementation.
pub mod session_store;

pub use session::{
    classify, manual_entry_offered, parse_regime, CodeEntry, Completeness, Corner, EventKind,
    ScanEvent,
};
pub use session_log::{SessionLog, DEFAULT_CAPACITY};
pub use session_store::SessionStore;
