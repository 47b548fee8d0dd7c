//! In-memory simulated tag.
//!
//! Backs tests and radio-less development hosts. One [`MemoryTag`] is
//! the physical tag; any number of [`MemoryLink`] views share its
//! state, so taking the tag out of range flips every outstanding link
//! to disconnected at once.

use std::sync::{Arc, Mutex};

use crate::{DiscoveredTag, FormatableLink, LinkError, Message, Result, TagId, TagLink};

#[derive(Debug, Default)]
struct Inner {
    message: Option<Message>,
    capacity: usize,
    in_range: bool,
    fail_connect: bool,
    fail_reads: bool,
    read_only: bool,
    writes: u32,
}

/// A simulated physical tag.
///
/// Cheap to clone; clones share the same underlying state, so a test
/// can keep one handle while the engine holds links to the same tag.
#[derive(Clone)]
pub struct MemoryTag {
    id: Option<TagId>,
    inner: Arc<Mutex<Inner>>,
}

impl MemoryTag {
    /// An empty in-range tag.
    pub fn new(id: Option<TagId>, capacity: usize) -> Self {
        Self {
            id,
            inner: Arc::new(Mutex::new(Inner {
                capacity,
                in_range: true,
                ..Inner::default()
            })),
        }
    }

    /// A tag pre-loaded with a message.
    pub fn with_message(id: Option<TagId>, capacity: usize, message: Message) -> Self {
        let tag = Self::new(id, capacity);
        tag.inner.lock().unwrap().message = Some(message);
        tag
    }

    pub fn id(&self) -> Option<&TagId> {
        self.id.as_ref()
    }

    /// Current on-tag message.
    pub fn message(&self) -> Option<Message> {
        self.inner.lock().unwrap().message.clone()
    }

    /// Number of completed writes (native or format path).
    pub fn write_count(&self) -> u32 {
        self.inner.lock().unwrap().writes
    }

    /// Move the tag in or out of the radio field. Out of range, every
    /// link reports disconnected and all radio operations fail.
    pub fn set_in_range(&self, in_range: bool) {
        self.inner.lock().unwrap().in_range = in_range;
    }

    /// Make subsequent connect attempts fail.
    pub fn set_fail_connect(&self, fail: bool) {
        self.inner.lock().unwrap().fail_connect = fail;
    }

    /// Make subsequent live reads fail.
    pub fn set_fail_reads(&self, fail: bool) {
        self.inner.lock().unwrap().fail_reads = fail;
    }

    /// Drop the native write capability. The format path still works:
    /// read-only here models a missing write technology, not a
    /// physically unwritable tag.
    pub fn set_read_only(&self, read_only: bool) {
        self.inner.lock().unwrap().read_only = read_only;
    }

    /// A fresh link view onto this tag.
    pub fn link(&self) -> MemoryLink {
        MemoryLink {
            inner: Arc::clone(&self.inner),
            connected: false,
            cache: None,
        }
    }

    /// A fresh format-capability view onto this tag.
    pub fn formatable(&self) -> MemoryFormatable {
        MemoryFormatable {
            inner: Arc::clone(&self.inner),
        }
    }

    /// The discovery payload a platform boundary would hand to the
    /// engine for this tag.
    pub fn discovered(&self) -> DiscoveredTag {
        DiscoveredTag {
            id: self.id.clone(),
            link: Some(Box::new(self.link())),
            formatable: Some(Box::new(self.formatable())),
        }
    }

    /// Discovery payload for a tag with no supported technology.
    pub fn discovered_without_link(&self) -> DiscoveredTag {
        DiscoveredTag {
            id: self.id.clone(),
            link: None,
            formatable: None,
        }
    }
}

/// [`TagLink`] view onto a [`MemoryTag`].
pub struct MemoryLink {
    inner: Arc<Mutex<Inner>>,
    connected: bool,
    cache: Option<Message>,
}

impl TagLink for MemoryLink {
    fn connect(&mut self) -> Result<()> {
        let inner = self.inner.lock().unwrap();
        if !inner.in_range {
            return Err(LinkError::TagLost);
        }
        if inner.fail_connect {
            return Err(LinkError::Io("simulated connect failure".to_string()));
        }
        self.cache = inner.message.clone();
        self.connected = true;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected && self.inner.lock().unwrap().in_range
    }

    fn cached_message(&self) -> Option<Message> {
        self.cache.clone()
    }

    fn read(&mut self) -> Result<Option<Message>> {
        let inner = self.inner.lock().unwrap();
        if !self.connected || !inner.in_range {
            return Err(LinkError::TagLost);
        }
        if inner.fail_reads {
            return Err(LinkError::Io("simulated read failure".to_string()));
        }
        Ok(inner.message.clone())
    }

    fn write(&mut self, message: &Message) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if inner.read_only {
            return Err(LinkError::Unsupported);
        }
        if !self.connected || !inner.in_range {
            return Err(LinkError::TagLost);
        }
        if message.encoded_len() > inner.capacity {
            return Err(LinkError::Io("message larger than tag".to_string()));
        }
        inner.message = Some(message.clone());
        inner.writes += 1;
        self.cache = inner.message.clone();
        Ok(())
    }

    fn capacity(&self) -> usize {
        self.inner.lock().unwrap().capacity
    }

    fn close(&mut self) -> Result<()> {
        self.connected = false;
        Ok(())
    }
}

/// [`FormatableLink`] view onto a [`MemoryTag`].
pub struct MemoryFormatable {
    inner: Arc<Mutex<Inner>>,
}

impl FormatableLink for MemoryFormatable {
    fn format(&mut self, message: &Message) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if !inner.in_range {
            return Err(LinkError::TagLost);
        }
        if message.encoded_len() > inner.capacity {
            return Err(LinkError::Io("message larger than tag".to_string()));
        }
        inner.message = Some(message.clone());
        inner.writes += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Record;

    #[test]
    fn test_connect_fills_cache() {
        let tag = MemoryTag::with_message(None, 64, Message::from(Record::uri("a://b")));
        let mut link = tag.link();
        assert!(link.cached_message().is_none());

        link.connect().unwrap();
        assert_eq!(link.cached_message(), tag.message());
    }

    #[test]
    fn test_read_requires_connection() {
        let tag = MemoryTag::new(None, 64);
        let mut link = tag.link();
        assert!(matches!(link.read(), Err(LinkError::TagLost)));

        link.connect().unwrap();
        assert_eq!(link.read().unwrap(), None);
    }

    #[test]
    fn test_out_of_range_disconnects_all_links() {
        let tag = MemoryTag::new(None, 64);
        let mut a = tag.link();
        let mut b = tag.link();
        a.connect().unwrap();
        b.connect().unwrap();

        tag.set_in_range(false);
        assert!(!a.is_connected());
        assert!(!b.is_connected());
        assert!(matches!(a.read(), Err(LinkError::TagLost)));
    }

    #[test]
    fn test_write_updates_shared_state() {
        let tag = MemoryTag::new(None, 64);
        let mut link = tag.link();
        link.connect().unwrap();

        let message = Message::from(Record::uri("a://b"));
        link.write(&message).unwrap();
        assert_eq!(tag.message(), Some(message));
        assert_eq!(tag.write_count(), 1);
    }

    #[test]
    fn test_read_only_write_is_unsupported_but_format_works() {
        let tag = MemoryTag::new(None, 64);
        tag.set_read_only(true);

        let mut link = tag.link();
        link.connect().unwrap();
        let message = Message::from(Record::uri("a://b"));
        assert!(matches!(link.write(&message), Err(LinkError::Unsupported)));

        tag.formatable().format(&message).unwrap();
        assert_eq!(tag.message(), Some(message));
    }

    #[test]
    fn test_write_respects_capacity() {
        let tag = MemoryTag::new(None, 4);
        let mut link = tag.link();
        link.connect().unwrap();

        let message = Message::from(Record::uri("viewer://cfg/v1"));
        assert!(matches!(link.write(&message), Err(LinkError::Io(_))));
        assert!(tag.message().is_none());
    }
}
