// SPDX-License-Identifier: GPL-3.0-only

use serde::{Deserialize, Serialize};

/// RAID level as reported by the backend for one device type
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RaidLevel {
    pub name: String,
    pub min_members: u32,
}

impl RaidLevel {
    pub fn new(name: impl Into<String>, min_members: u32) -> Self {
        Self {
            name: name.into(),
            min_members,
        }
    }

    /// Levels that concatenate members instead of striping or mirroring
    pub fn is_linear(&self) -> bool {
        is_linear_level(&self.name)
    }

    /// Pseudo level for MD containers, never offered to callers
    pub fn is_container(&self) -> bool {
        self.name == "container"
    }
}

pub fn is_linear_level(name: &str) -> bool {
    matches!(name, "linear" | "single")
}
