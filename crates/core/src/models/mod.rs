//! Domain models shared across dirsync crates.

pub mod action;
pub mod finding;
pub mod mapping;
pub mod report;
pub mod user;
