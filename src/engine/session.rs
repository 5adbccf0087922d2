use std::collections::VecDeque;
use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::debug;

use super::PlaybackEvent;
use crate::{
    common::types::SessionId,
    resolver::{CachedUrl, TrackMetadata},
    sink::AudioSink,
};

/// Volume ceiling in percent.
pub const MAX_VOLUME: u16 = 150;

/// One queued track.
#[derive(Debug, Clone)]
pub struct QueueItem {
    /// Per-session generation counter; prefetch write-backs check it so a
    /// result for a departed item is discarded instead of misapplied.
    pub(crate) id: u64,
    pub metadata: TrackMetadata,
    pub requested_by: String,
    /// Direct-media URL populated asynchronously by prefetch. Reads must
    /// tolerate absence.
    pub cached_url: Option<CachedUrl>,
    pub(crate) prefetch_started: bool,
}

/// A read-only snapshot of one queue entry.
#[derive(Debug, Clone)]
pub struct QueuedTrack {
    pub metadata: TrackMetadata,
    pub requested_by: String,
}

impl From<&QueueItem> for QueuedTrack {
    fn from(item: &QueueItem) -> Self {
        Self {
            metadata: item.metadata.clone(),
            requested_by: item.requested_by.clone(),
        }
    }
}

/// Read-only snapshot of a session.
#[derive(Debug, Clone)]
pub struct SessionView {
    pub current: Option<QueuedTrack>,
    pub pending: Vec<QueuedTrack>,
    pub playing: bool,
    pub volume: u16,
}

/// The mutable half of a session, guarded by one mutex so the command path
/// and the sink-event path are mutually exclusive.
pub struct SessionState {
    pub(crate) queue: VecDeque<QueueItem>,
    pub(crate) current: Option<QueueItem>,
    pub(crate) playing: bool,
    pub(crate) volume: u16,
    next_item_id: u64,
}

impl SessionState {
    fn new(volume: u16) -> Self {
        Self {
            queue: VecDeque::new(),
            current: None,
            playing: false,
            volume,
            next_item_id: 0,
        }
    }

    /// Append a new item; returns its 1-based queue position.
    pub(crate) fn push_item(&mut self, metadata: TrackMetadata, requested_by: String) -> usize {
        let id = self.next_item_id;
        self.next_item_id += 1;
        self.queue.push_back(QueueItem {
            id,
            metadata,
            requested_by,
            cached_url: None,
            prefetch_started: false,
        });
        self.queue.len()
    }

    /// Find a live item by id, current slot included.
    pub(crate) fn item_mut(&mut self, id: u64) -> Option<&mut QueueItem> {
        if let Some(current) = self.current.as_mut() {
            if current.id == id {
                return Some(current);
            }
        }
        self.queue.iter_mut().find(|item| item.id == id)
    }

    pub(crate) fn view(&self) -> SessionView {
        SessionView {
            current: self.current.as_ref().map(QueuedTrack::from),
            pending: self.queue.iter().map(QueuedTrack::from).collect(),
            playing: self.playing,
            volume: self.volume,
        }
    }
}

/// One playback context: queue state, sink and the outbound event channel.
pub struct Session {
    pub id: SessionId,
    pub(crate) sink: Arc<dyn AudioSink>,
    pub(crate) state: tokio::sync::Mutex<SessionState>,
    events_tx: flume::Sender<PlaybackEvent>,
    events_rx: flume::Receiver<PlaybackEvent>,
    /// Task draining the sink's event channel. Aborted on teardown.
    pub(crate) event_task: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

impl Session {
    pub(crate) fn new(id: SessionId, sink: Arc<dyn AudioSink>, volume: u16) -> Self {
        let (events_tx, events_rx) = flume::unbounded();
        Self {
            id,
            sink,
            state: tokio::sync::Mutex::new(SessionState::new(volume)),
            events_tx,
            events_rx,
            event_task: parking_lot::Mutex::new(None),
        }
    }

    /// Emit a playback event; nobody listening is fine.
    pub(crate) fn send_event(&self, event: PlaybackEvent) {
        let _ = self.events_tx.send(event);
    }

    /// Subscribe to this session's playback events.
    pub fn events(&self) -> flume::Receiver<PlaybackEvent> {
        self.events_rx.clone()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        debug!("dropping session: {}", self.id);
        if let Some(task) = self.event_task.lock().take() {
            task.abort();
        }
    }
}
