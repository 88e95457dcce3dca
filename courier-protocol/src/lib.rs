//! courier-protocol: Wire format and shared protocol definitions
//!
//! This crate defines the length-prefixed frame codec, the command
//! envelope carried by text frames, and the data types exchanged between
//! update clients and the release registry.

pub mod build;
pub mod codec;
pub mod envelope;
pub mod messages;
pub mod version;

// Re-export main types at crate root
pub use build::{BuildRecord, BuildStatus, ManifestEntry};
pub use codec::{CodecError, Frame, FrameCodec};
pub use envelope::{Envelope, EnvelopeKind, ErrorBody, ErrorCode};
pub use version::Version;

/// Default size of one file-chunk frame payload (excluding the chunk header)
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;
