// SPDX-License-Identifier: GPL-3.0-only

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TestingError {
    #[error("scenario not found for '{name}' in resources/scenarios")]
    ScenarioNotFound { name: String },
    #[error("scenario io error for {path:?}: {reason}")]
    ScenarioIo { path: PathBuf, reason: String },
    #[error("invalid scenario '{name}': {reason}")]
    ScenarioInvalid { name: String, reason: String },
}

pub type Result<T> = std::result::Result<T, TestingError>;
