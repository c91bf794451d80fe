//! dirsync core — configuration, domain models, and input parsing for the
//! directory-to-identity-service reconciliation engine.

pub mod config;
pub mod csv;
pub mod error;
pub mod models;
