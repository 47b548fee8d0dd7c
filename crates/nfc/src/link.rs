//! Capability traits over a physical tag connection.
//!
//! These traits are what a platform boundary implements per discovered
//! tag; the presence engine never touches the radio except through
//! them.

use crate::{Message, Result};

/// Opaque byte identity of a physical tag instance.
///
/// Valid only while the tag stays in range. Some tags expose no
/// identity; those are treated as never equal to any other tag,
/// including themselves.
pub type TagId = Vec<u8>;

/// Connection to a discovered tag's message store.
///
/// Mirrors what passive tag hardware actually offers: an explicit
/// connection, a message cached by the radio at connect time, and a
/// live read/write path that can fail the moment the tag leaves the
/// field.
pub trait TagLink: Send {
    /// Establish the radio connection. A no-op when already connected.
    fn connect(&mut self) -> Result<()>;

    /// Whether the link currently reports a connection.
    fn is_connected(&self) -> bool;

    /// Message captured when the link last connected. No radio I/O.
    fn cached_message(&self) -> Option<Message>;

    /// Read the message over the radio. Requires a connection.
    fn read(&mut self) -> Result<Option<Message>>;

    /// Write a message to the tag. Returns
    /// [`LinkError::Unsupported`](crate::LinkError::Unsupported) when
    /// the tag has no native write path.
    fn write(&mut self, message: &Message) -> Result<()>;

    /// Writable capacity in bytes.
    fn capacity(&self) -> usize;

    /// Release the connection. Safe to call more than once.
    fn close(&mut self) -> Result<()>;
}

/// Fallback write capability for tags without a native write path:
/// formats the tag with an initial message in one step.
pub trait FormatableLink: Send {
    fn format(&mut self, message: &Message) -> Result<()>;
}

/// Raw discovery payload handed to the presence engine each time the
/// radio reports a tag in the field.
///
/// `link` is `None` when the tag exposes no supported technology.
pub struct DiscoveredTag {
    pub id: Option<TagId>,
    pub link: Option<Box<dyn TagLink>>,
    pub formatable: Option<Box<dyn FormatableLink>>,
}

impl std::fmt::Debug for DiscoveredTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscoveredTag")
            .field("id", &self.id)
            .field("has_link", &self.link.is_some())
            .field("has_formatable", &self.formatable.is_some())
            .finish()
    }
}

/// Radio adapter status.
pub trait Radio: Send + Sync {
    /// Whether the host has tag hardware at all.
    fn is_supported(&self) -> bool;

    /// Whether the radio is currently switched on.
    fn is_enabled(&self) -> bool;
}

/// Radio for hosts without tag hardware.
pub struct NullRadio;

impl Radio for NullRadio {
    fn is_supported(&self) -> bool {
        false
    }

    fn is_enabled(&self) -> bool {
        false
    }
}

/// Radio with fixed answers, for hosts that track adapter state
/// elsewhere and for tests.
#[derive(Debug, Clone, Copy)]
pub struct StaticRadio {
    pub supported: bool,
    pub enabled: bool,
}

impl StaticRadio {
    /// A radio that is present and switched on.
    pub fn on() -> Self {
        Self {
            supported: true,
            enabled: true,
        }
    }

    /// A radio that is present but switched off.
    pub fn off() -> Self {
        Self {
            supported: true,
            enabled: false,
        }
    }
}

impl Radio for StaticRadio {
    fn is_supported(&self) -> bool {
        self.supported
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }
}
