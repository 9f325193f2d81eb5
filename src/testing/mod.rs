//! Testing utilities and mock implementations
//!
//! This module provides mock implementations for testing the secrets bridge
//! without requiring external dependencies like AWS or an MQTT broker.

pub mod mocks;

pub use mocks::*;
