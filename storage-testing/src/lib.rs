// SPDX-License-Identifier: GPL-3.0-only

//! Test support for the storage action planner
//!
//! A scripted in-process backend, device fixtures and TOML scenarios that
//! seed both.

pub mod errors;
pub mod fixtures;
pub mod scenario;
pub mod scripted;

pub use errors::{Result, TestingError};
pub use scenario::Scenario;
pub use scripted::ScriptedBackend;
