//! Cobalt Agent
//!
//! Long-lived credential agents and the registry that makes them
//! discoverable by name. Consumers call [`Registry::fetch`]; the owning
//! agent keeps the token fresh in the background.

pub mod agent;
pub mod config;
pub mod registry;

pub use agent::{AgentHandle, CredentialAgent};
pub use config::{AgentConfig, Prefetch, RetryDelay};
pub use registry::Registry;
