use std::sync::Arc;

use tracing::{debug, info, warn};

use super::PlaybackEvent;
use super::session::{Session, SessionState};
use crate::{
    pipeline::Pipeline,
    resolver::{CachedUrl, TrackResolver, cache::DIRECT_URL_TTL},
    sink::SinkEvent,
};

/// Drains one session's sink events for its whole lifetime.
///
/// This task is the only consumer of end-of-stream signals, which is what
/// makes the advance step single-entrant: a `skip` merely stops the sink and
/// the resulting idle event lands here, once.
pub(crate) async fn run_sink_events(
    session: Arc<Session>,
    pipeline: Arc<Pipeline>,
    events: flume::Receiver<SinkEvent>,
) {
    while let Ok(event) = events.recv_async().await {
        if let SinkEvent::Error(message) = &event {
            let current = session.state.lock().await.current.clone();
            if let Some(item) = current {
                warn!(
                    session = %session.id,
                    track = %item.metadata.title,
                    "sink reported playback error: {message}"
                );
                session.send_event(PlaybackEvent::TrackError {
                    metadata: item.metadata,
                    message: message.clone(),
                });
            }
        }
        on_stream_end(&session, &pipeline).await;
    }
}

/// Advance after the active stream ended, for whatever reason.
pub(crate) async fn on_stream_end(session: &Arc<Session>, pipeline: &Arc<Pipeline>) {
    let mut state = session.state.lock().await;
    if state.current.is_none() && !state.playing {
        // Stray idle, e.g. a stop racing teardown.
        return;
    }
    state.current = None;
    state.playing = false;
    start_head(session, pipeline, &mut state).await;
}

/// Pop the queue head into the current slot and start its stream.
///
/// A failed start drops the item and tries the next one; the session ends up
/// idle when the queue runs out. Callers hold the state lock, so no other
/// command or sink event can interleave with the start.
pub(crate) async fn start_head(
    session: &Arc<Session>,
    pipeline: &Arc<Pipeline>,
    state: &mut SessionState,
) {
    loop {
        let Some(item) = state.queue.pop_front() else {
            state.current = None;
            state.playing = false;
            info!(session = %session.id, "queue finished");
            session.send_event(PlaybackEvent::QueueFinished);
            return;
        };
        state.current = Some(item.clone());

        // The upcoming track resolves while this one plays.
        spawn_prefetch(session, pipeline.resolver(), state);

        match pipeline.open(&item.metadata.url, item.cached_url.as_ref()).await {
            Ok(stream) => {
                let fast_path = stream.fast_path();
                let volume = f32::from(state.volume) / 100.0;
                match session.sink.play(stream, volume).await {
                    Ok(()) => {
                        state.playing = true;
                        info!(
                            session = %session.id,
                            track = %item.metadata.title,
                            fast_path,
                            "playback started"
                        );
                        session.send_event(PlaybackEvent::TrackStart {
                            metadata: item.metadata.clone(),
                            requested_by: item.requested_by.clone(),
                            fast_path,
                        });
                        return;
                    }
                    Err(e) => {
                        warn!(
                            session = %session.id,
                            track = %item.metadata.title,
                            "sink rejected stream: {e}"
                        );
                        session.send_event(PlaybackEvent::TrackError {
                            metadata: item.metadata.clone(),
                            message: e.to_string(),
                        });
                    }
                }
            }
            Err(e) => {
                warn!(
                    session = %session.id,
                    track = %item.metadata.title,
                    "pipeline failed to start: {e}"
                );
                session.send_event(PlaybackEvent::TrackError {
                    metadata: item.metadata.clone(),
                    message: e.to_string(),
                });
            }
        }
        // No retry for a dead source; the next item gets its shot.
    }
}

/// Kick off background direct-URL resolution for the queue head.
///
/// At most one task per item (`prefetch_started`), fire-and-forget. The
/// write-back re-checks the item id so results for departed items are
/// discarded; last write wins otherwise, both results being equivalent.
pub(crate) fn spawn_prefetch(
    session: &Arc<Session>,
    resolver: &Arc<dyn TrackResolver>,
    state: &mut SessionState,
) {
    let Some(head) = state.queue.front_mut() else {
        return;
    };
    if head.prefetch_started || head.cached_url.is_some() {
        return;
    }
    head.prefetch_started = true;

    let item_id = head.id;
    let canonical_url = head.metadata.url.clone();
    let session = Arc::clone(session);
    let resolver = Arc::clone(resolver);

    tokio::spawn(async move {
        let Some(url) = resolver.resolve_direct_url(&canonical_url).await else {
            debug!(session = %session.id, "prefetch yielded no direct url");
            return;
        };
        let mut state = session.state.lock().await;
        match state.item_mut(item_id) {
            Some(item) => {
                debug!(session = %session.id, item = item_id, "prefetched direct url");
                item.cached_url = Some(CachedUrl::new(url, DIRECT_URL_TTL, "web"));
            }
            None => {
                debug!(
                    session = %session.id,
                    item = item_id,
                    "discarding prefetch result for departed item"
                );
            }
        }
    });
}
