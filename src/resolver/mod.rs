use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::common::errors::ResolveError;

pub mod cache;
pub mod ytdlp;

pub use cache::{CachedUrl, UrlCache};
pub use ytdlp::YtDlpResolver;

/// Immutable track description, as produced by the external resolver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackMetadata {
    pub title: String,
    /// Track length in seconds.
    pub duration: u64,
    /// Canonical page URL, the stable handle for the track.
    pub url: String,
    pub thumbnail: String,
    pub uploader: String,
}

/// External metadata and direct-URL resolution.
///
/// Implementations wrap an opaque extraction tool (a subprocess in
/// production). Both calls may suspend for external completion; nothing else
/// in the crate does.
#[async_trait]
pub trait TrackResolver: Send + Sync {
    /// Resolve a user query into track metadata.
    ///
    /// URLs are resolved directly; anything else is treated as a search and
    /// the first result wins.
    async fn resolve_metadata(&self, query: &str) -> Result<TrackMetadata, ResolveError>;

    /// Resolve a canonical URL into a short-lived direct-media URL.
    ///
    /// Always opportunistic: returns `None` on any failure, never errors.
    /// Successful resolutions are cached process-wide with a fixed TTL.
    async fn resolve_direct_url(&self, canonical_url: &str) -> Option<String>;
}
