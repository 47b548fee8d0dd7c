//! Viewer-configuration payload codec.
//!
//! A viewer's tag announces itself with a single URI record in the
//! `viewer://cfg` namespace; the URI embeds a compact JSON body
//! describing the holder's optics. This crate owns that wire format:
//! the namespace predicate, encode/decode, and the record-rewrite rule
//! applied when a tag is updated in place.
//!
//! The presence engine never looks inside the payload except through
//! these functions.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use cradle_nfc::{Message, Record};
use serde::{Deserialize, Serialize};

/// URI namespace marking a record as viewer configuration.
pub const VIEWER_URI_PREFIX: &str = "viewer://cfg";

/// Wire version segment emitted by [`encode_record`].
const WIRE_VERSION: &str = "v1";

/// Decoded viewer configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewerParams {
    /// Manufacturer name.
    pub vendor: String,

    /// Holder model.
    pub model: String,

    /// Distance between lens centers, millimeters.
    pub inter_lens_mm: f32,

    /// Distance from the device screen to the lenses, millimeters.
    pub screen_to_lens_mm: f32,

    /// Whether the holder carries a magnet input switch.
    #[serde(default)]
    pub has_magnet: bool,
}

impl Default for ViewerParams {
    fn default() -> Self {
        Self {
            vendor: String::new(),
            model: String::new(),
            inter_lens_mm: 60.0,
            screen_to_lens_mm: 42.0,
            has_magnet: false,
        }
    }
}

/// Errors from decoding a viewer-configuration record.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// The record does not carry a URI in the viewer namespace.
    #[error("record is not in the viewer namespace")]
    NotViewerUri,

    /// The URI carries no payload body.
    #[error("viewer uri carries no payload body")]
    MissingBody,

    /// The URI's wire version is not understood.
    #[error("unsupported wire version: {0:?}")]
    Version(String),

    /// The payload body is not valid base64/JSON.
    #[error("malformed payload body: {0}")]
    Body(String),
}

/// True iff `record` carries a URI in the viewer-configuration
/// namespace.
pub fn is_viewer_record(record: &Record) -> bool {
    record
        .as_uri()
        .is_some_and(|uri| uri.starts_with(VIEWER_URI_PREFIX))
}

/// True iff at least one record of `message` is viewer configuration.
pub fn is_viewer_message(message: &Message) -> bool {
    message.records().iter().any(is_viewer_record)
}

/// Encode `params` as a single viewer-configuration URI record.
pub fn encode_record(params: &ViewerParams) -> Record {
    // A plain struct with string keys cannot fail JSON serialization.
    let body = serde_json::to_vec(params).expect("ViewerParams serializes");
    let uri = format!(
        "{VIEWER_URI_PREFIX}/{WIRE_VERSION}?p={}",
        URL_SAFE_NO_PAD.encode(body)
    );
    Record::uri(uri)
}

/// Decode viewer configuration from a single record.
pub fn decode_record(record: &Record) -> Result<ViewerParams, DecodeError> {
    let uri = record
        .as_uri()
        .filter(|uri| uri.starts_with(VIEWER_URI_PREFIX))
        .ok_or(DecodeError::NotViewerUri)?;

    let rest = uri[VIEWER_URI_PREFIX.len()..].trim_start_matches('/');
    let (version, query) = rest.split_once('?').unwrap_or((rest, ""));
    if version != WIRE_VERSION {
        return Err(DecodeError::Version(version.to_string()));
    }

    let body = query
        .split('&')
        .find_map(|pair| pair.strip_prefix("p="))
        .ok_or(DecodeError::MissingBody)?;
    let bytes = URL_SAFE_NO_PAD
        .decode(body)
        .map_err(|e| DecodeError::Body(e.to_string()))?;
    serde_json::from_slice(&bytes).map_err(|e| DecodeError::Body(e.to_string()))
}

/// Decode the first viewer-configuration record of `message`.
pub fn decode_message(message: &Message) -> Result<ViewerParams, DecodeError> {
    let record = message
        .records()
        .iter()
        .find(|record| is_viewer_record(record))
        .ok_or(DecodeError::NotViewerUri)?;
    decode_record(record)
}

/// Build the message that replaces a tag's viewer configuration.
///
/// Keeps every non-viewer record verbatim and in order, substitutes
/// `record` for the first viewer record in place, and drops any
/// further viewer records (a tag carries at most one). With no viewer
/// record present the new record is appended; with no existing message
/// at all the result is the single-record message.
pub fn updated_message(existing: Option<&Message>, record: Record) -> Message {
    let Some(existing) = existing else {
        return Message::from(record);
    };

    let mut records = Vec::with_capacity(existing.len() + 1);
    let mut replaced = false;
    for old in existing.records() {
        if is_viewer_record(old) {
            if !replaced {
                records.push(record.clone());
                replaced = true;
            }
        } else {
            records.push(old.clone());
        }
    }
    if !replaced {
        records.push(record);
    }
    Message::new(records)
}
