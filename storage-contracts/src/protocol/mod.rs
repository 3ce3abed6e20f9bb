// SPDX-License-Identifier: GPL-3.0-only

pub mod method;
pub mod result;
pub mod secret;

pub use method::{APPLY_ALL, RemoteMethod};
pub use result::{RemoteFailure, RemoteFault, RemoteResult};
pub use secret::SessionSecret;
