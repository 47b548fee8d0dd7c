//! Tag-presence state machine for viewer insertion detection.
//!
//! The radio only ever says "a tag was seen" (repeatedly, for the
//! same tag, on its own schedule) and never says that a tag left.
//! This crate turns that edge-triggered noise into a level-triggered
//! inserted/removed signal: same-tag re-announcements are absorbed,
//! swaps emit a removal before the new classification, and a periodic
//! liveness probe stands in for the missing "link lost" notification.
//!
//! ```text
//! platform boundary ──discovery──▶ PresenceEngine ──events──▶ ListenerRegistry ──▶ workers
//!                                     │      ▲
//!                                 arm │      │ tick
//!                                     ▼      │
//!                                   LivenessPoller
//! ```
//!
//! # Example
//!
//! ```ignore
//! use cradle_nfc::StaticRadio;
//! use cradle_presence::PresenceEngine;
//! use std::sync::Arc;
//!
//! let engine = PresenceEngine::new(Arc::new(StaticRadio::on()));
//! engine.register_listener(Arc::new(MyListener));
//! // Platform boundary feeds raw discoveries:
//! // engine.on_tag_discovered(tag);
//! ```

mod config;
mod engine;
mod listeners;
mod liveness;

pub use config::PresenceConfig;
pub use engine::{PresenceEngine, PresenceState};
pub use listeners::{ListenerRegistry, ViewerListener, ViewerListenerRef};

// Re-export the event payload so listener implementations only need
// this crate.
pub use cradle_viewer::ViewerParams;

use cradle_nfc::LinkError;

/// Errors surfaced by caller-initiated engine operations.
///
/// Link failures on the passive paths (discovery, liveness probes) are
/// never surfaced here; they are logged and folded into removal or
/// `NoTag` transitions.
#[derive(Debug, thiserror::Error)]
pub enum PresenceError {
    /// The operation needs a current tag and none is present.
    #[error("no tag present")]
    NoTagPresent,

    /// The new message does not fit the tag. Nothing was written.
    #[error("not enough capacity on tag: {capacity} bytes available, {required} required")]
    CapacityExceeded { capacity: usize, required: usize },

    /// The radio link failed mid-operation.
    #[error("tag link error: {0}")]
    Link(#[from] LinkError),
}

pub type Result<T> = std::result::Result<T, PresenceError>;
