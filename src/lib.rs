//! Sync a mailbox locally and apply declarative rules to it.

pub mod config;
pub mod error;
pub mod mailbox;
pub mod provider;
pub mod rules;
pub mod store;
pub mod sync;
