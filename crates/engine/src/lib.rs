//! Reconciliation engine: resolves group mappings, diffs directory input
//! against the remote identity service, and applies or simulates changes.

pub mod cache;
pub mod client;
pub mod diff;
pub mod executor;
pub mod names;
pub mod resolver;
pub mod service;
pub mod store;
pub mod validate;
