//! Tag message model.
//!
//! A tag carries one [`Message`]: an ordered sequence of typed
//! [`Record`]s. Messages are immutable once read from a tag; updating
//! a tag always constructs a new message rather than mutating one in
//! place.

/// Fixed per-record wire overhead: flags, type length, type.
const RECORD_HEADER_LEN: usize = 3;

/// Payloads longer than this pay an extended length field.
const SHORT_RECORD_MAX: usize = 0xff;

/// Kind of a record's typed payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordKind {
    /// Well-known URI record.
    Uri,
    /// Plain text record.
    Text,
    /// MIME-typed record.
    Mime(String),
    /// Anything the reader did not recognize.
    Unknown,
}

/// One typed entry within a tag's [`Message`].
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    kind: RecordKind,
    payload: Vec<u8>,
}

impl Record {
    pub fn new(kind: RecordKind, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            kind,
            payload: payload.into(),
        }
    }

    /// A URI record.
    pub fn uri(uri: impl Into<String>) -> Self {
        Self::new(RecordKind::Uri, uri.into().into_bytes())
    }

    /// A plain text record.
    pub fn text(text: impl Into<String>) -> Self {
        Self::new(RecordKind::Text, text.into().into_bytes())
    }

    pub fn kind(&self) -> &RecordKind {
        &self.kind
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// URI-shaped view of the payload, if this record carries one.
    pub fn as_uri(&self) -> Option<&str> {
        match self.kind {
            RecordKind::Uri => std::str::from_utf8(&self.payload).ok(),
            _ => None,
        }
    }

    /// Encoded size of this record on the wire.
    pub fn encoded_len(&self) -> usize {
        let length_field = if self.payload.len() <= SHORT_RECORD_MAX {
            1
        } else {
            4
        };
        RECORD_HEADER_LEN + length_field + self.payload.len()
    }
}

/// Ordered, immutable sequence of records read from (or written to) a
/// tag.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Message {
    records: Vec<Record>,
}

impl Message {
    pub fn new(records: Vec<Record>) -> Self {
        Self { records }
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Total encoded size in bytes, compared against a tag's capacity
    /// before a write.
    pub fn encoded_len(&self) -> usize {
        self.records.iter().map(Record::encoded_len).sum()
    }
}

impl From<Record> for Message {
    fn from(record: Record) -> Self {
        Self {
            records: vec![record],
        }
    }
}
