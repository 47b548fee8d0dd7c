//! The tag-presence state machine.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use cradle_nfc::{DiscoveredTag, FormatableLink, LinkError, Message, Radio, TagId, TagLink};
use cradle_viewer::{
    decode_message, encode_record, updated_message, DecodeError, ViewerParams,
};

use crate::listeners::{ListenerRegistry, ViewerListenerRef};
use crate::liveness::LivenessPoller;
use crate::{PresenceConfig, PresenceError};

/// Point-in-time presence classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresenceState {
    /// No tag current.
    NoTag,
    /// A tag is current but carries no viewer configuration.
    TagPresentNonViewer,
    /// A viewer-configuration tag is current.
    TagPresentViewer,
}

/// The currently connected tag. Created wholesale per discovery and
/// replaced wholesale, never mutated field-by-field while current.
struct TagSnapshot {
    id: Option<TagId>,
    link: Box<dyn TagLink>,
    formatable: Option<Box<dyn FormatableLink>>,
    cached: Option<Message>,
    is_viewer: bool,
}

/// Everything behind the tag lock.
#[derive(Default)]
struct TagState {
    snapshot: Option<TagSnapshot>,
    failures: u32,
    poller: Option<LivenessPoller>,
}

struct Shared {
    radio: Arc<dyn Radio>,
    config: PresenceConfig,
    tag: Mutex<TagState>,
    listeners: ListenerRegistry,
}

/// Detects insertion into (and removal from) an NFC-tagged viewer.
///
/// The radio delivers an edge-triggered, noisy signal: "a tag was
/// seen", repeated every poll interval for a tag that simply stays in
/// range, and never a notification that a tag left. The engine
/// normalizes that into a level-triggered inserted/removed stream:
/// same-tag re-announcements are absorbed, tag swaps emit a removal
/// before the new classification, and a periodic liveness probe infers
/// silent removal.
///
/// Cheap to clone; clones share state. All mutation and classification
/// is serialized behind one lock (the tag lock), so the discovery
/// callback, the liveness probe and caller threads never interleave
/// mid-classification. Listener callbacks run on their own worker
/// threads and never under the tag lock.
#[derive(Clone)]
pub struct PresenceEngine {
    shared: Arc<Shared>,
}

impl PresenceEngine {
    /// Engine with the default liveness policy.
    pub fn new(radio: Arc<dyn Radio>) -> Self {
        Self::with_config(radio, PresenceConfig::default())
    }

    pub fn with_config(radio: Arc<dyn Radio>, config: PresenceConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                radio,
                config,
                tag: Mutex::new(TagState::default()),
                listeners: ListenerRegistry::new(),
            }),
        }
    }

    /// Whether the host has tag hardware at all.
    pub fn is_supported(&self) -> bool {
        self.shared.radio.is_supported()
    }

    /// Whether the radio is present and switched on.
    pub fn is_enabled(&self) -> bool {
        self.is_supported() && self.shared.radio.is_enabled()
    }

    /// True iff the device currently sits in a viewer.
    pub fn is_present(&self) -> bool {
        self.presence() == PresenceState::TagPresentViewer
    }

    /// Current classification.
    pub fn presence(&self) -> PresenceState {
        let state = self.shared.tag.lock().unwrap();
        match &state.snapshot {
            None => PresenceState::NoTag,
            Some(snapshot) if snapshot.is_viewer => PresenceState::TagPresentViewer,
            Some(_) => PresenceState::TagPresentNonViewer,
        }
    }

    /// Message cached at the last classification. No radio I/O.
    pub fn current_message(&self) -> Option<Message> {
        let state = self.shared.tag.lock().unwrap();
        state.snapshot.as_ref().and_then(|s| s.cached.clone())
    }

    /// Read the current tag's message over the radio, reconnecting if
    /// needed.
    pub fn read_live_message(&self) -> crate::Result<Option<Message>> {
        let mut state = self.shared.tag.lock().unwrap();
        let snapshot = state.snapshot.as_mut().ok_or(PresenceError::NoTagPresent)?;
        if !snapshot.link.is_connected() {
            snapshot.link.connect()?;
        }
        Ok(snapshot.link.read()?)
    }

    /// Writable capacity of the current tag in bytes.
    pub fn capacity(&self) -> crate::Result<usize> {
        let state = self.shared.tag.lock().unwrap();
        let snapshot = state.snapshot.as_ref().ok_or(PresenceError::NoTagPresent)?;
        Ok(snapshot.link.capacity())
    }

    /// Add a listener. Idempotent by reference identity.
    pub fn register_listener(&self, listener: ViewerListenerRef) {
        self.shared.listeners.register(listener);
    }

    /// Remove a listener. Events already posted may still arrive.
    pub fn unregister_listener(&self, listener: &ViewerListenerRef) {
        self.shared.listeners.unregister(listener);
    }

    /// Platform entry point: the radio saw a tag in the field.
    ///
    /// Fires repeatedly for a tag that stays in range; the engine
    /// absorbs re-announcements and emits at most one insertion per
    /// physical insertion. Ignored while the radio is off.
    pub fn on_tag_discovered(&self, tag: DiscoveredTag) {
        if !self.is_enabled() {
            tracing::debug!(?tag, "radio disabled, ignoring discovery");
            return;
        }
        let mut state = self.shared.tag.lock().unwrap();
        self.shared.process_discovery(&mut state, tag);
    }

    /// Replace the viewer configuration on the current tag.
    ///
    /// Reads the existing message (live, falling back to cached),
    /// rewrites it around the new record, guards capacity before
    /// touching the tag, writes (falling back to the format path when
    /// the tag has no native write), then re-runs classification so
    /// listeners hear about the new content without any caller-side
    /// notification.
    pub fn write_params(&self, params: &ViewerParams) -> crate::Result<()> {
        let mut state = self.shared.tag.lock().unwrap();
        let snapshot = state.snapshot.as_mut().ok_or(PresenceError::NoTagPresent)?;

        let existing = match snapshot.link.read() {
            Ok(message) => message,
            Err(e) => {
                tracing::debug!(error = %e, "live read before write failed, using cached message");
                snapshot.cached.clone()
            }
        };

        let message = updated_message(existing.as_ref(), encode_record(params));

        if !snapshot.link.is_connected() {
            snapshot.link.connect()?;
        }
        let required = message.encoded_len();
        let capacity = snapshot.link.capacity();
        if capacity < required {
            return Err(PresenceError::CapacityExceeded { capacity, required });
        }

        match snapshot.link.write(&message) {
            Ok(()) => {}
            Err(LinkError::Unsupported) => {
                tracing::warn!("native write unsupported, formatting tag instead");
                match snapshot.formatable.as_mut() {
                    Some(formatable) => formatable.format(&message)?,
                    None => return Err(PresenceError::Link(LinkError::Unsupported)),
                }
            }
            Err(e) => return Err(e.into()),
        }

        // Content changed: re-run the discovery pass against the same
        // physical tag. Taking the snapshot out first makes the pass
        // see a fresh tag, so a viewer classification posts the
        // insertion event with the new params.
        if let Some(snapshot) = state.snapshot.take() {
            let tag = DiscoveredTag {
                id: snapshot.id,
                link: Some(snapshot.link),
                formatable: snapshot.formatable,
            };
            self.shared.process_discovery(&mut state, tag);
        }
        Ok(())
    }
}

impl Shared {
    /// The discovery algorithm. The caller holds the tag lock.
    fn process_discovery(self: &Arc<Self>, state: &mut TagState, tag: DiscoveredTag) {
        let previous = state.snapshot.take();
        let had_previous = previous.is_some();
        let previous_was_viewer = previous.as_ref().is_some_and(|s| s.is_viewer);
        let previous_id = previous.as_ref().and_then(|s| s.id.clone());
        Self::close_snapshot(state, previous);

        let DiscoveredTag {
            id,
            link,
            formatable,
        } = tag;

        let Some(mut link) = link else {
            tracing::debug!("discovered tag offers no supported link");
            if previous_was_viewer {
                self.listeners.notify_removed();
            }
            return;
        };

        // Same physical tag re-announced, or a swap? Absent identities
        // never match.
        let is_same_tag =
            had_previous && matches!((&previous_id, &id), (Some(a), Some(b)) if a == b);

        if !is_same_tag && previous_was_viewer {
            self.listeners.notify_removed();
        }

        let cached = match link.connect() {
            Ok(()) => link.cached_message(),
            Err(e) => {
                tracing::error!(error = %e, "error reading tag");
                if is_same_tag && previous_was_viewer {
                    // Present by identity but unreadable: treat as lost.
                    self.listeners.notify_removed();
                }
                return;
            }
        };

        let params = classify(cached.as_ref());
        let is_viewer = params.is_some();
        tracing::debug!(is_same_tag, is_viewer, "classified discovered tag");

        state.snapshot = Some(TagSnapshot {
            id,
            link,
            formatable,
            cached,
            is_viewer,
        });

        if !is_same_tag {
            if let Some(params) = &params {
                self.listeners.notify_inserted(params);
            }
        }

        if is_viewer {
            state.failures = 0;
            state.poller = Some(self.spawn_poller());
        }
    }

    /// Cancel the poller and release the previous link. Close errors
    /// are not actionable and only logged.
    fn close_snapshot(state: &mut TagState, snapshot: Option<TagSnapshot>) {
        if let Some(poller) = state.poller.take() {
            poller.cancel();
        }
        if let Some(mut snapshot) = snapshot {
            if let Err(e) = snapshot.link.close() {
                tracing::warn!(error = %e, "error closing tag link");
            }
        }
    }

    fn spawn_poller(self: &Arc<Self>) -> LivenessPoller {
        let weak = Arc::downgrade(self);
        LivenessPoller::spawn(self.config.poll_interval, move |token| {
            if let Some(shared) = weak.upgrade() {
                shared.on_liveness_tick(token);
            }
        })
    }

    /// Liveness probe, on the poller thread.
    fn on_liveness_tick(self: &Arc<Self>, token: &AtomicBool) {
        let mut state = self.tag.lock().unwrap();
        // A new discovery may have superseded this poller while the
        // tick waited on the lock.
        if token.load(Ordering::SeqCst) {
            return;
        }
        let Some(snapshot) = state.snapshot.as_ref() else {
            return;
        };
        if snapshot.link.is_connected() {
            // Connected probes do not reset the counter; only a full
            // reclassification does.
            return;
        }

        state.failures += 1;
        tracing::debug!(
            failures = state.failures,
            "tag link disconnected on liveness probe"
        );
        if state.failures > self.config.failure_threshold {
            let snapshot = state.snapshot.take();
            Self::close_snapshot(&mut state, snapshot);
            self.listeners.notify_removed();
        }
    }
}

/// Viewer classification: the first namespace-matching record must
/// also decode. A matching but undecodable record classifies the tag
/// as non-viewer rather than failing.
fn classify(message: Option<&Message>) -> Option<ViewerParams> {
    let message = message?;
    match decode_message(message) {
        Ok(params) => Some(params),
        Err(DecodeError::NotViewerUri) => None,
        Err(e) => {
            tracing::debug!(error = %e, "viewer record failed to decode, classifying as non-viewer");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cradle_nfc::{MemoryTag, Record, StaticRadio};
    use std::time::Duration;

    fn params() -> ViewerParams {
        ViewerParams {
            vendor: "Acme Optics".to_string(),
            model: "Fold v2".to_string(),
            inter_lens_mm: 60.0,
            screen_to_lens_mm: 42.0,
            has_magnet: false,
        }
    }

    fn viewer_tag(id: &[u8]) -> MemoryTag {
        MemoryTag::with_message(
            Some(id.to_vec()),
            1024,
            Message::from(encode_record(&params())),
        )
    }

    /// Engine whose real poller is effectively inert, so tests drive
    /// ticks deterministically through `tick`.
    fn engine_with_manual_ticks(threshold: u32) -> PresenceEngine {
        PresenceEngine::with_config(
            Arc::new(StaticRadio::on()),
            PresenceConfig {
                poll_interval: Duration::from_secs(3600),
                failure_threshold: threshold,
            },
        )
    }

    fn tick(engine: &PresenceEngine) {
        let token = AtomicBool::new(false);
        engine.shared.on_liveness_tick(&token);
    }

    #[test]
    fn test_classify_requires_decodable_record() {
        assert!(classify(None).is_none());

        let viewer = Message::from(encode_record(&params()));
        assert_eq!(classify(Some(&viewer)), Some(params()));

        let plain = Message::from(Record::uri("https://example.com"));
        assert!(classify(Some(&plain)).is_none());

        let broken = Message::from(Record::uri("viewer://cfg/v1?p=%%%"));
        assert!(classify(Some(&broken)).is_none());
    }

    #[test]
    fn test_single_failed_probe_keeps_tag() {
        let engine = engine_with_manual_ticks(1);
        let tag = viewer_tag(b"id");
        engine.on_tag_discovered(tag.discovered());
        assert_eq!(engine.presence(), PresenceState::TagPresentViewer);

        tag.set_in_range(false);
        tick(&engine);
        assert_eq!(engine.presence(), PresenceState::TagPresentViewer);

        tick(&engine);
        assert_eq!(engine.presence(), PresenceState::NoTag);
    }

    #[test]
    fn test_connected_probe_does_not_reset_counter() {
        let engine = engine_with_manual_ticks(3);
        let tag = viewer_tag(b"id");
        engine.on_tag_discovered(tag.discovered());

        tag.set_in_range(false);
        tick(&engine);
        tick(&engine);
        tag.set_in_range(true);
        tick(&engine);
        assert_eq!(engine.presence(), PresenceState::TagPresentViewer);

        tag.set_in_range(false);
        tick(&engine);
        tick(&engine);
        assert_eq!(engine.presence(), PresenceState::NoTag);
    }

    #[test]
    fn test_rediscovery_resets_counter() {
        let engine = engine_with_manual_ticks(3);
        let tag = viewer_tag(b"id");
        engine.on_tag_discovered(tag.discovered());

        tag.set_in_range(false);
        tick(&engine);
        tick(&engine);
        tick(&engine);
        assert_eq!(engine.presence(), PresenceState::TagPresentViewer);

        tag.set_in_range(true);
        engine.on_tag_discovered(tag.discovered());

        tag.set_in_range(false);
        tick(&engine);
        tick(&engine);
        tick(&engine);
        assert_eq!(engine.presence(), PresenceState::TagPresentViewer);
        tick(&engine);
        assert_eq!(engine.presence(), PresenceState::NoTag);
    }

    #[test]
    fn test_stale_tick_token_is_ignored() {
        let engine = engine_with_manual_ticks(0);
        let tag = viewer_tag(b"id");
        engine.on_tag_discovered(tag.discovered());
        tag.set_in_range(false);

        let cancelled = AtomicBool::new(true);
        engine.shared.on_liveness_tick(&cancelled);
        assert_eq!(engine.presence(), PresenceState::TagPresentViewer);
    }
}
