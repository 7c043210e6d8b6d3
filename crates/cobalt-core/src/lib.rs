//! Cobalt Core
//!
//! Shared vocabulary for the Cobalt Azure base library: the error
//! taxonomy, the access-token record, static credential values, and
//! telemetry event types. This crate has minimal dependencies and is
//! consumed by every other crate in the workspace.

pub mod credentials;
pub mod error;
pub mod events;
pub mod token;

pub use credentials::{ApiKeyCredential, NamedKeyCredential, SasCredential};
pub use error::{Error, HttpError, Result};
pub use token::{AccessToken, ExpiresIn};
