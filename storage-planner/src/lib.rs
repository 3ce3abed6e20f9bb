// SPDX-License-Identifier: GPL-3.0-only

//! Device-action planning engine
//!
//! Keeps a snapshot of the storage graph, validates what a caller wants to
//! create, change or remove, queues the accepted actions and applies them
//! through the privileged backend as one transaction.

pub mod catalog;
pub mod config;
pub mod error;
pub mod executor;
pub mod logging;
pub mod model;
pub mod offer;
pub mod queue;
mod remote;
pub mod session;
pub mod validation;

pub use catalog::{AddAnchor, ParentRole, TargetSet};
pub use config::{LoggingLevel, PlannerConfig};
pub use error::{ConfigError, EngineError, ExecutorError, ModelError, QueueError, Result};
pub use executor::{ApplyOutcome, ExecutorState};
pub use model::{DeviceGraph, DeviceModel};
pub use offer::{AddContext, SizeLimits, SizePlan, SupportedTypes};
pub use queue::ActionQueue;
pub use session::{OperationOutcome, PlanningSession};
pub use validation::{Rejection, ValidationContext};
