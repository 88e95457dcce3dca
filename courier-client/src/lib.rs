//! courier-client: the update client
//!
//! Connects an agent to the release registry, compares the running
//! version against the registry's latest approved version, and stages
//! verified downloads for the host process to swap in.

pub mod config;
pub mod updater;

pub use config::ClientConfig;
pub use updater::{UpdateOutcome, UpdateReport, Updater};
