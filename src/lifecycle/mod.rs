//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (supervisor.rs):
//!     registry + dispatcher + router (+ ingress server) per role → spawned
//!
//! Shutdown (shutdown.rs):
//!     Ctrl-C, external trigger, or any task exit
//!         → broadcast to every task
//!         → pending requests cancelled (waiters see Shutdown)
//!         → remaining tasks drained, then aborted after a deadline
//! ```
//!
//! # Design Decisions
//! - A task exiting on its own is fatal: the process cannot tunnel without it
//! - The first task error becomes the process result

pub mod shutdown;
pub mod supervisor;

pub use shutdown::Shutdown;
pub use supervisor::Supervisor;
