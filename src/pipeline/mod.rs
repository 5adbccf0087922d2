//! Turns a queued track into a decoded audio byte stream.
//!
//! Two transcode topologies exist: a direct path reading a short-lived
//! direct-media URL, and a piped fallback where the fetch tool's output is
//! fed into the transcoder. [`Pipeline::open`] walks the decision tree
//! (cached URL, fresh resolution, piped fallback) and returns at the first
//! stream that comes up.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use async_trait::async_trait;
use tokio::io::{AsyncRead, ReadBuf};
use tokio::process::Child;
use tracing::{debug, warn};

use crate::{
    common::errors::PipelineError,
    resolver::{CachedUrl, TrackResolver},
};

pub mod transcode;

pub use transcode::FfmpegFactory;

/// A live decoded audio stream: 48 kHz stereo s16le PCM.
///
/// Owns the subprocesses behind the stream; dropping it kills them.
pub struct AudioStream {
    reader: Box<dyn AsyncRead + Send + Unpin>,
    children: Vec<Child>,
    fast_path: bool,
}

impl AudioStream {
    pub fn new(
        reader: Box<dyn AsyncRead + Send + Unpin>,
        children: Vec<Child>,
        fast_path: bool,
    ) -> Self {
        Self {
            reader,
            children,
            fast_path,
        }
    }

    /// True when the stream reads a direct-media URL instead of the piped
    /// fallback.
    pub fn fast_path(&self) -> bool {
        self.fast_path
    }
}

impl AsyncRead for AudioStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.reader).poll_read(cx, buf)
    }
}

impl std::fmt::Debug for AudioStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioStream")
            .field("children", &self.children.len())
            .field("fast_path", &self.fast_path)
            .finish()
    }
}

/// Builds the two transcode topologies.
#[async_trait]
pub trait StreamFactory: Send + Sync {
    /// Transcode straight from a direct-media URL.
    async fn direct(&self, direct_url: &str) -> Result<AudioStream, PipelineError>;

    /// Fetch-and-pipe fallback from the canonical URL.
    async fn piped(&self, canonical_url: &str) -> Result<AudioStream, PipelineError>;
}

pub struct Pipeline {
    factory: Arc<dyn StreamFactory>,
    resolver: Arc<dyn TrackResolver>,
}

impl Pipeline {
    pub fn new(factory: Arc<dyn StreamFactory>, resolver: Arc<dyn TrackResolver>) -> Self {
        Self { factory, resolver }
    }

    pub(crate) fn resolver(&self) -> &Arc<dyn TrackResolver> {
        &self.resolver
    }

    /// Open a stream for a track.
    ///
    /// Ordered attempts, first success wins:
    /// 1. an unexpired cached direct URL,
    /// 2. a freshly resolved direct URL (resolver-bounded),
    /// 3. the piped fallback.
    ///
    /// Exactly one topology ends up active per stream.
    pub async fn open(
        &self,
        canonical_url: &str,
        cached: Option<&CachedUrl>,
    ) -> Result<AudioStream, PipelineError> {
        if let Some(cached) = cached.filter(|c| !c.is_expired()) {
            match self.factory.direct(&cached.url).await {
                Ok(stream) => {
                    debug!("streaming from cached direct url");
                    return Ok(stream);
                }
                Err(e) => warn!("cached direct url failed, re-resolving: {e}"),
            }
        }

        if let Some(url) = self.resolver.resolve_direct_url(canonical_url).await {
            match self.factory.direct(&url).await {
                Ok(stream) => return Ok(stream),
                Err(e) => warn!("direct path failed, falling back to piped transcode: {e}"),
            }
        }

        self.factory.piped(canonical_url).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;
    use crate::common::errors::ResolveError;
    use crate::resolver::{TrackMetadata, cache::DIRECT_URL_TTL};

    fn test_stream(fast_path: bool) -> AudioStream {
        AudioStream::new(Box::new(tokio::io::empty()), Vec::new(), fast_path)
    }

    #[derive(Default)]
    struct RecordingFactory {
        direct_fails: AtomicBool,
        attempts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl StreamFactory for RecordingFactory {
        async fn direct(&self, direct_url: &str) -> Result<AudioStream, PipelineError> {
            self.attempts
                .lock()
                .unwrap()
                .push(format!("direct:{direct_url}"));
            if self.direct_fails.load(Ordering::SeqCst) {
                Err(PipelineError::SpawnFailure {
                    process: "ffmpeg",
                    source: std::io::Error::new(std::io::ErrorKind::NotFound, "missing binary"),
                })
            } else {
                Ok(test_stream(true))
            }
        }

        async fn piped(&self, canonical_url: &str) -> Result<AudioStream, PipelineError> {
            self.attempts
                .lock()
                .unwrap()
                .push(format!("piped:{canonical_url}"));
            Ok(test_stream(false))
        }
    }

    struct StaticResolver {
        direct_url: Option<String>,
        calls: AtomicUsize,
    }

    impl StaticResolver {
        fn new(direct_url: Option<&str>) -> Self {
            Self {
                direct_url: direct_url.map(str::to_string),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl TrackResolver for StaticResolver {
        async fn resolve_metadata(&self, _query: &str) -> Result<TrackMetadata, ResolveError> {
            Err(ResolveError::NotFound)
        }

        async fn resolve_direct_url(&self, _canonical_url: &str) -> Option<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.direct_url.clone()
        }
    }

    const CANONICAL: &str = "https://www.youtube.com/watch?v=dQw4w9WgXcQ";

    #[tokio::test]
    async fn cached_url_short_circuits() {
        let factory = Arc::new(RecordingFactory::default());
        let resolver = Arc::new(StaticResolver::new(Some("https://cdn.example/fresh")));
        let pipeline = Pipeline::new(factory.clone(), resolver.clone());

        let cached = CachedUrl::new("https://cdn.example/cached".into(), DIRECT_URL_TTL, "web");
        let stream = pipeline.open(CANONICAL, Some(&cached)).await.unwrap();

        assert!(stream.fast_path());
        assert_eq!(
            *factory.attempts.lock().unwrap(),
            vec!["direct:https://cdn.example/cached"]
        );
        assert_eq!(resolver.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn expired_cache_forces_fresh_resolution() {
        let factory = Arc::new(RecordingFactory::default());
        let resolver = Arc::new(StaticResolver::new(Some("https://cdn.example/fresh")));
        let pipeline = Pipeline::new(factory.clone(), resolver.clone());

        let cached = CachedUrl::new("https://cdn.example/stale".into(), Duration::ZERO, "web");
        let stream = pipeline.open(CANONICAL, Some(&cached)).await.unwrap();

        assert!(stream.fast_path());
        assert_eq!(
            *factory.attempts.lock().unwrap(),
            vec!["direct:https://cdn.example/fresh"]
        );
        assert_eq!(resolver.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn falls_back_to_piped_when_direct_fails() {
        let factory = Arc::new(RecordingFactory::default());
        factory.direct_fails.store(true, Ordering::SeqCst);
        let resolver = Arc::new(StaticResolver::new(Some("https://cdn.example/fresh")));
        let pipeline = Pipeline::new(factory.clone(), resolver.clone());

        let cached = CachedUrl::new("https://cdn.example/cached".into(), DIRECT_URL_TTL, "web");
        let stream = pipeline.open(CANONICAL, Some(&cached)).await.unwrap();

        assert!(!stream.fast_path());
        assert_eq!(
            *factory.attempts.lock().unwrap(),
            vec![
                "direct:https://cdn.example/cached".to_string(),
                "direct:https://cdn.example/fresh".to_string(),
                format!("piped:{CANONICAL}"),
            ]
        );
    }

    #[tokio::test]
    async fn piped_when_no_direct_url_available() {
        let factory = Arc::new(RecordingFactory::default());
        let resolver = Arc::new(StaticResolver::new(None));
        let pipeline = Pipeline::new(factory.clone(), resolver.clone());

        let stream = pipeline.open(CANONICAL, None).await.unwrap();

        assert!(!stream.fast_path());
        assert_eq!(
            *factory.attempts.lock().unwrap(),
            vec![format!("piped:{CANONICAL}")]
        );
        assert_eq!(resolver.calls.load(Ordering::SeqCst), 1);
    }
}
