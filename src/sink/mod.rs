//! Seam to the external audio output destination.
//!
//! The transport (joining a voice channel, shipping PCM frames) lives outside
//! this crate; the engine only needs the small contract below. The sink must
//! emit [`SinkEvent::Idle`] exactly once when a stream finishes or is
//! stopped, and [`SinkEvent::Error`] on a decode/playback failure. Both make
//! the queue advance.

use std::sync::Arc;

use async_trait::async_trait;

use crate::{
    common::{errors::SinkError, types::SessionId},
    pipeline::AudioStream,
};

/// Lifecycle signals from the output side, one channel per session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkEvent {
    /// The active stream finished or was stopped.
    Idle,
    /// Decode or playback failure; treated like `Idle` plus a log line.
    Error(String),
}

/// An attached audio output for one session.
#[async_trait]
pub trait AudioSink: Send + Sync {
    /// Start consuming a decoded stream, replacing any active one.
    async fn play(&self, stream: AudioStream, volume: f32) -> Result<(), SinkError>;

    /// Stop the active stream. The sink emits `Idle` as a consequence.
    fn stop(&self) -> bool;

    fn pause(&self) -> bool;

    fn unpause(&self) -> bool;

    /// Tear down the underlying connection.
    async fn disconnect(&self);
}

/// A connected sink plus its event channel.
pub struct SinkHandle {
    pub sink: Arc<dyn AudioSink>,
    pub events: flume::Receiver<SinkEvent>,
}

/// Acquires a sink connection for a session.
///
/// Connecting is the precondition for registering a session; implementations
/// are expected to wait for output readiness themselves, and the engine
/// additionally bounds the whole call with its configured timeout.
#[async_trait]
pub trait SinkConnector: Send + Sync {
    async fn connect(&self, session_id: &SessionId) -> Result<SinkHandle, SinkError>;
}
