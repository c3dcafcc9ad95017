//! Testing utilities
//!
//! A loopback mock of the vMix endpoint plus an event recorder, so the client
//! can be exercised end to end without a real vMix instance.

pub mod mocks;

pub use mocks::*;
