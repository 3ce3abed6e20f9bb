// SPDX-License-Identifier: GPL-3.0-only

use std::fmt;

use uuid::Uuid;

/// Shared secret authenticating the planner to the privileged backend
#[derive(Clone, PartialEq, Eq)]
pub struct SessionSecret(String);

impl SessionSecret {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    /// Fresh random secret, handed to the backend when spawning it
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    /// Read the secret from an environment variable; unset reads as empty
    pub fn from_env(var: &str) -> Self {
        Self(std::env::var(var).unwrap_or_default())
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SessionSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SessionSecret(***)")
    }
}
