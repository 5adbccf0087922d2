use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;
use tracing::debug;

use super::{TrackMetadata, TrackResolver, UrlCache};
use crate::{common::errors::ResolveError, config::Config};

const SOURCE_CLIENT: &str = "web";

/// Resolver backed by the `yt-dlp` extraction tool.
pub struct YtDlpResolver {
    ytdlp_path: String,
    timeout: Duration,
    cache: Arc<UrlCache>,
    cache_ttl: Duration,
}

impl YtDlpResolver {
    pub fn new(config: &Config) -> Self {
        Self::with_cache(config, Arc::new(UrlCache::new()))
    }

    /// Build a resolver sharing an existing URL cache.
    pub fn with_cache(config: &Config, cache: Arc<UrlCache>) -> Self {
        Self {
            ytdlp_path: config.tools.ytdlp_path.clone(),
            timeout: config.resolver.timeout(),
            cache,
            cache_ttl: config.resolver.cache_ttl(),
        }
    }

    pub fn cache(&self) -> &Arc<UrlCache> {
        &self.cache
    }

    async fn run(&self, args: &[&str]) -> Result<std::process::Output, ResolveError> {
        let output = Command::new(&self.ytdlp_path)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();

        match tokio::time::timeout(self.timeout, output).await {
            Err(_) => Err(ResolveError::Timeout(self.timeout)),
            Ok(Err(e)) => Err(ResolveError::ProcessFailure(e.to_string())),
            Ok(Ok(output)) => Ok(output),
        }
    }
}

#[async_trait]
impl TrackResolver for YtDlpResolver {
    async fn resolve_metadata(&self, query: &str) -> Result<TrackMetadata, ResolveError> {
        let target = search_target(query);
        let output = self
            .run(&["--dump-json", "--no-playlist", "--skip-download", target.as_str()])
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ResolveError::ProcessFailure(stderr.trim().to_string()));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let Some(line) = stdout.lines().map(str::trim).find(|l| !l.is_empty()) else {
            return Err(ResolveError::NotFound);
        };

        let raw: RawInfo =
            serde_json::from_str(line).map_err(|e| ResolveError::ParseFailure(e.to_string()))?;
        Ok(raw.into_metadata(query))
    }

    async fn resolve_direct_url(&self, canonical_url: &str) -> Option<String> {
        if let Some(hit) = self.cache.get(canonical_url) {
            debug!("direct url cache hit for {canonical_url}");
            return Some(hit);
        }

        let output = match self.run(&["--get-url", "-f", "bestaudio", canonical_url]).await {
            Ok(output) => output,
            Err(e) => {
                debug!("direct url resolution failed for {canonical_url}: {e}");
                return None;
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            debug!(
                "direct url extraction exited with {}: {}",
                output.status,
                stderr.trim()
            );
            return None;
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let url = stdout.lines().map(str::trim).find(|l| !l.is_empty())?.to_string();

        self.cache
            .put(canonical_url, url.clone(), self.cache_ttl, SOURCE_CLIENT);
        debug!("cached direct url for {canonical_url}");
        Some(url)
    }
}

/// URLs resolve as-is; anything else becomes a first-result search.
fn search_target(query: &str) -> String {
    if query.starts_with("http://") || query.starts_with("https://") {
        query.to_string()
    } else {
        format!("ytsearch1:{query}")
    }
}

/// The subset of the extractor's JSON output we care about.
#[derive(Deserialize)]
struct RawInfo {
    title: Option<String>,
    duration: Option<f64>,
    webpage_url: Option<String>,
    url: Option<String>,
    thumbnail: Option<String>,
    uploader: Option<String>,
}

impl RawInfo {
    fn into_metadata(self, query: &str) -> TrackMetadata {
        TrackMetadata {
            title: self.title.unwrap_or_else(|| "Unknown".to_string()),
            duration: self.duration.unwrap_or(0.0).max(0.0) as u64,
            url: self
                .webpage_url
                .or(self.url)
                .unwrap_or_else(|| query.to_string()),
            thumbnail: self.thumbnail.unwrap_or_default(),
            uploader: self.uploader.unwrap_or_else(|| "Unknown".to_string()),
        }
    }
}
