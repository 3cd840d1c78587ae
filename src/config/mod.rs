//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML, optional)
//!     → loader.rs (parse & deserialize)
//!     → loader.rs (environment overrides: relay URL, chat id, token)
//!     → validation.rs (semantic checks)
//!     → TunnelConfig (validated, immutable)
//!     → sections handed to each subsystem at startup
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use schema::TunnelConfig;
pub use schema::{
    CorrelationConfig, EgressConfig, IngressConfig, ListenerConfig, ObservabilityConfig, Role,
    TransportConfig,
};
