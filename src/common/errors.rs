use std::time::Duration;

use thiserror::Error;

/// Failures while resolving a query or URL into track data.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("no results for query")]
    NotFound,

    #[error("resolver process failed: {0}")]
    ProcessFailure(String),

    #[error("resolver returned malformed metadata: {0}")]
    ParseFailure(String),

    #[error("resolver timed out after {0:?}")]
    Timeout(Duration),
}

/// Failures while building the fetch/transcode stream for a track.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("failed to spawn {process}: {source}")]
    SpawnFailure {
        process: &'static str,
        source: std::io::Error,
    },

    #[error("{process} exited abnormally: {status}")]
    AbnormalExit {
        process: &'static str,
        status: String,
    },

    #[error("broken pipe on transcoder input: {0}")]
    BrokenPipe(String),
}

/// Failures reported by the audio output destination.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("failed to connect audio sink: {0}")]
    ConnectFailure(String),

    #[error("sink playback error: {0}")]
    PlaybackError(String),
}

/// Everything `Engine::enqueue` can surface to the control surface.
///
/// Mid-playback failures never show up here; those are recovered locally by
/// dropping the offending item and advancing the queue.
#[derive(Debug, Error)]
pub enum EnqueueError {
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error("sink connection failed: {0}")]
    Connect(#[from] SinkError),

    #[error("queue is full ({0} items pending)")]
    QueueFull(usize),
}
