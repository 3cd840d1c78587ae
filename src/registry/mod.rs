//! Pending-request bookkeeping.
//!
//! # Data Flow
//! ```text
//! Correlation engine:
//!     register(id) → PendingHandle
//!     enqueue OUT envelope
//!     handle.wait(timeout) ──────────────┐
//!                                        │ (suspended)
//! Inbound router:                        │
//!     IN envelope → resolve(id, payload) ┘ → waiter resumes
//! ```
//!
//! # Design Decisions
//! - The registry is the only state mutated from many tasks
//! - Entries are removed atomically on resolve, timeout, or handle drop
//! - Late replies find no entry and are reported as `NotFound`

pub mod pending;

pub use pending::{PendingHandle, PendingRegistry};
