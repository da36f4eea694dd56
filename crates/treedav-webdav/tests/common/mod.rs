//! Common test utilities for WebDAV integration tests.
#![allow(dead_code)]

pub mod assertions;
pub mod generators;
pub mod harness;

pub use assertions::*;
pub use generators::*;
pub use harness::*;
