//! Observability for the secrets bridge
//!
//! Structured logging setup and the span macros used across the crate.

pub mod logging;

pub use logging::{init_default_logging, init_logging, LogFormat};

// Span macros for structured logging
pub use logging::{lifecycle_span, mqtt_span, secrets_span};
