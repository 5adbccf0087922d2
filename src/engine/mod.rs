//! The queue/playback state machine.
//!
//! One [`Engine`] per process. It owns the session registry and drives the
//! stream pipeline from enqueue commands on one side and sink lifecycle
//! events on the other. Per session there is exactly one active stream, one
//! state mutex, and one event-drain task; cross-session state is fully
//! independent.

use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tracing::{debug, info};

use crate::{
    common::{
        errors::{EnqueueError, SinkError},
        types::SessionId,
    },
    config::PlaybackConfig,
    pipeline::{Pipeline, StreamFactory},
    resolver::{TrackMetadata, TrackResolver},
    sink::{AudioSink, SinkConnector},
};

mod playback;
mod session;

pub use session::{MAX_VOLUME, QueueItem, QueuedTrack, Session, SessionState, SessionView};

/// Outcome of a successful enqueue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Enqueued {
    /// The session was idle; playback started for this item.
    Started { metadata: TrackMetadata },
    /// Appended behind the active track at the given 1-based position.
    Queued { position: usize, metadata: TrackMetadata },
}

/// What a session announces to whoever is listening (the control surface
/// renders these; failures to deliver are ignored).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackEvent {
    TrackStart {
        metadata: TrackMetadata,
        requested_by: String,
        /// Whether the stream came up over a direct-media URL.
        fast_path: bool,
    },
    TrackError {
        metadata: TrackMetadata,
        message: String,
    },
    QueueFinished,
}

pub struct Engine {
    sessions: DashMap<SessionId, Arc<Session>>,
    resolver: Arc<dyn TrackResolver>,
    pipeline: Arc<Pipeline>,
    connector: Arc<dyn SinkConnector>,
    config: PlaybackConfig,
}

impl Engine {
    pub fn new(
        resolver: Arc<dyn TrackResolver>,
        factory: Arc<dyn StreamFactory>,
        connector: Arc<dyn SinkConnector>,
        config: PlaybackConfig,
    ) -> Self {
        let pipeline = Arc::new(Pipeline::new(factory, resolver.clone()));
        Self {
            sessions: DashMap::new(),
            resolver,
            pipeline,
            connector,
            config,
        }
    }

    /// Resolve a query and append it to the session's queue, creating the
    /// session (sink connection included) if this is its first track.
    ///
    /// Resolution happens before any session state is touched, so a failed
    /// enqueue mutates nothing.
    pub async fn enqueue(
        &self,
        session_id: &SessionId,
        query: &str,
        requested_by: &str,
    ) -> Result<Enqueued, EnqueueError> {
        let metadata = self.resolver.resolve_metadata(query).await?;
        debug!(session = %session_id, title = %metadata.title, "resolved track");

        let session = self.obtain_session(session_id).await?;
        let mut state = session.state.lock().await;

        if state.queue.len() >= self.config.max_queue_size {
            return Err(EnqueueError::QueueFull(state.queue.len()));
        }

        let position = state.push_item(metadata.clone(), requested_by.to_string());

        if state.current.is_none() && !state.playing {
            playback::start_head(&session, &self.pipeline, &mut state).await;
            Ok(Enqueued::Started { metadata })
        } else {
            // One ahead of the playing track: resolve its URL early so the
            // handoff is instant.
            if position == 1 {
                playback::spawn_prefetch(&session, self.pipeline.resolver(), &mut state);
            }
            Ok(Enqueued::Queued { position, metadata })
        }
    }

    /// Stop the current stream; the sink's idle event advances the queue.
    /// Returns true iff a stop signal was issued.
    pub async fn skip(&self, session_id: &SessionId) -> bool {
        let Some(session) = self.get(session_id) else {
            return false;
        };
        let state = session.state.lock().await;
        if !state.playing {
            return false;
        }
        session.sink.stop()
    }

    pub async fn pause(&self, session_id: &SessionId) -> bool {
        let Some(session) = self.get(session_id) else {
            return false;
        };
        let state = session.state.lock().await;
        if !state.playing {
            return false;
        }
        session.sink.pause()
    }

    pub async fn resume(&self, session_id: &SessionId) -> bool {
        let Some(session) = self.get(session_id) else {
            return false;
        };
        session.sink.unpause()
    }

    /// Read-only snapshot of a session's queue.
    pub async fn get_queue(&self, session_id: &SessionId) -> Option<SessionView> {
        let session = self.get(session_id)?;
        let state = session.state.lock().await;
        Some(state.view())
    }

    /// Set the session volume in percent, clamped to [`MAX_VOLUME`].
    /// Takes effect at the next stream start.
    pub async fn set_volume(&self, session_id: &SessionId, volume: u16) -> bool {
        let Some(session) = self.get(session_id) else {
            return false;
        };
        let mut state = session.state.lock().await;
        state.volume = volume.min(MAX_VOLUME);
        true
    }

    /// Subscribe to a session's playback events.
    pub fn events(&self, session_id: &SessionId) -> Option<flume::Receiver<PlaybackEvent>> {
        self.get(session_id).map(|session| session.events())
    }

    /// Stop everything, tear down every sink, clear the registry. Idempotent.
    pub async fn shutdown(&self) {
        let sessions: Vec<Arc<Session>> = self
            .sessions
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        self.sessions.clear();

        for session in &sessions {
            let mut state = session.state.lock().await;
            state.queue.clear();
            state.current = None;
            state.playing = false;
            session.sink.stop();
            if let Some(task) = session.event_task.lock().take() {
                task.abort();
            }
        }
        futures::future::join_all(sessions.iter().map(|s| s.sink.disconnect())).await;

        info!("engine shut down, {} sessions dropped", sessions.len());
    }

    fn get(&self, session_id: &SessionId) -> Option<Arc<Session>> {
        self.sessions
            .get(session_id)
            .map(|entry| entry.value().clone())
    }

    /// Get the session, or connect a sink and register a fresh one.
    ///
    /// The sink is acquired before touching the registry so a connect failure
    /// leaves no half-registered session. When two first-enqueues race, the
    /// first insert wins and the loser's sink is torn down again.
    async fn obtain_session(&self, session_id: &SessionId) -> Result<Arc<Session>, EnqueueError> {
        if let Some(existing) = self.get(session_id) {
            return Ok(existing);
        }

        let handle = tokio::time::timeout(
            self.config.connect_timeout(),
            self.connector.connect(session_id),
        )
        .await
        .map_err(|_| {
            SinkError::ConnectFailure(format!(
                "sink not ready within {:?}",
                self.config.connect_timeout()
            ))
        })?
        .map_err(EnqueueError::Connect)?;

        let mut lost_sink: Option<Arc<dyn AudioSink>> = None;
        let session = match self.sessions.entry(session_id.clone()) {
            Entry::Occupied(entry) => {
                lost_sink = Some(handle.sink);
                entry.get().clone()
            }
            Entry::Vacant(entry) => {
                let session = Arc::new(Session::new(
                    session_id.clone(),
                    handle.sink,
                    self.config.default_volume,
                ));
                entry.insert(session.clone());
                let task = tokio::spawn(playback::run_sink_events(
                    session.clone(),
                    self.pipeline.clone(),
                    handle.events,
                ));
                *session.event_task.lock() = Some(task);
                info!(session = %session_id, "session created");
                session
            }
        };

        if let Some(sink) = lost_sink {
            debug!(session = %session_id, "lost session creation race, attaching to winner");
            sink.disconnect().await;
        }
        Ok(session)
    }
}
