//! # Core Runtime Module
//!
//! Foundational runtime infrastructure for the Tika client core:
//! - Logging and tracing infrastructure
//! - Configuration management
//! - Event bus system
//!
//! Every other `core-*` crate depends on this one for its configuration
//! types and for publishing session and payment events.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use config::{ApiConfig, AuthConfig, CoreConfig, CoreConfigBuilder, PaymentConfig};
pub use error::{Error, Result};
pub use events::{AuthEvent, CoreEvent, EventBus, PaymentEvent};
