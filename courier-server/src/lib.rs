//! courier-server: the release registry
//!
//! Owns the on-disk directory of Build Records, answers the registry
//! commands over courier-net, and provides the offline build/approve
//! administration used by the `courier-server` binary.

pub mod builder;
pub mod config;
pub mod handlers;
pub mod store;

pub use builder::{Builder, DirPackager, Packager};
pub use config::ServerConfig;
pub use handlers::register_commands;
pub use store::ReleaseStore;
