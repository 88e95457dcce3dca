//! Common utilities for courier
//!
//! Shared error type, logging setup, checksum helpers, and default
//! filesystem paths used by every courier crate.

pub mod checksum;
pub mod error;
pub mod logging;
pub mod paths;

pub use error::{CourierError, ErrorKind, Result};
pub use logging::{init_logging, init_logging_with_config, LogConfig, LogOutput};
