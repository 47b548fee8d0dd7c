//! Tag message model and radio link abstractions for cradle.
//!
//! Passive tags expose a small writable message over an unreliable
//! radio link. This crate owns the message model ([`Record`],
//! [`Message`]), the capability traits a platform layer implements per
//! discovered tag ([`TagLink`], [`FormatableLink`], [`Radio`]), and an
//! in-memory simulated tag ([`MemoryTag`]) used by tests and
//! radio-less development hosts.

mod link;
mod memory;
mod message;

pub use link::{DiscoveredTag, FormatableLink, NullRadio, Radio, StaticRadio, TagId, TagLink};
pub use memory::{MemoryFormatable, MemoryLink, MemoryTag};
pub use message::{Message, Record, RecordKind};

/// Errors reported by a tag link.
#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    /// The tag left the field mid-operation.
    #[error("tag left the field")]
    TagLost,
    /// Transient radio or I/O failure.
    #[error("radio i/o failure: {0}")]
    Io(String),
    /// The tag does not offer this capability.
    #[error("operation not supported by this tag")]
    Unsupported,
}

pub type Result<T> = std::result::Result<T, LinkError>;
