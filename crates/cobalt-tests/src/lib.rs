//! Integration test infrastructure for Cobalt.

pub mod helpers;
