use std::time::{Duration, Instant};

use dashmap::DashMap;
use regex::Regex;

/// How long a resolved direct-media URL stays servable.
pub const DIRECT_URL_TTL: Duration = Duration::from_secs(5 * 60 * 60);

/// A resolved direct-media URL with its absolute expiry.
#[derive(Debug, Clone)]
pub struct CachedUrl {
    pub url: String,
    pub expires_at: Instant,
    /// Which extractor client produced the URL.
    pub client: String,
}

impl CachedUrl {
    pub fn new(url: String, ttl: Duration, client: impl Into<String>) -> Self {
        Self {
            url,
            expires_at: Instant::now() + ttl,
            client: client.into(),
        }
    }

    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

/// Process-wide cache of direct-media URLs, keyed by media id.
///
/// Keying by media id rather than session means a popular track resolved in
/// one session benefits every other. Expired entries are evicted lazily on
/// lookup; stale overwrites are harmless (values are idempotent per key).
pub struct UrlCache {
    entries: DashMap<String, CachedUrl>,
    media_id: Regex,
}

impl UrlCache {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            // 11-char video id embedded in watch/short URLs
            media_id: Regex::new(r"(?:v=|/|youtu\.be/)([A-Za-z0-9_-]{11})").unwrap(),
        }
    }

    /// Stable cache key for a canonical URL: the extracted media id, or the
    /// whole URL when no id can be found.
    pub fn key_for(&self, canonical_url: &str) -> String {
        self.media_id
            .captures(canonical_url)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
            .unwrap_or_else(|| canonical_url.to_string())
    }

    pub fn get(&self, canonical_url: &str) -> Option<String> {
        self.get_at(canonical_url, Instant::now())
    }

    fn get_at(&self, canonical_url: &str, now: Instant) -> Option<String> {
        let key = self.key_for(canonical_url);
        {
            let entry = self.entries.get(&key)?;
            if now < entry.expires_at {
                return Some(entry.url.clone());
            }
        }
        self.entries.remove(&key);
        None
    }

    pub fn put(&self, canonical_url: &str, url: String, ttl: Duration, client: &str) {
        let key = self.key_for(canonical_url);
        self.entries.insert(key, CachedUrl::new(url, ttl, client));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for UrlCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WATCH_URL: &str = "https://www.youtube.com/watch?v=dQw4w9WgXcQ";

    #[test]
    fn extracts_media_id_from_common_url_shapes() {
        let cache = UrlCache::new();
        assert_eq!(cache.key_for(WATCH_URL), "dQw4w9WgXcQ");
        assert_eq!(cache.key_for("https://youtu.be/dQw4w9WgXcQ"), "dQw4w9WgXcQ");
    }

    #[test]
    fn falls_back_to_full_url_as_key() {
        let cache = UrlCache::new();
        let url = "https://radio.example/live";
        assert_eq!(cache.key_for(url), url);
    }

    #[test]
    fn serves_identical_value_before_expiry() {
        let cache = UrlCache::new();
        cache.put(WATCH_URL, "https://cdn.example/a.webm".into(), DIRECT_URL_TTL, "web");

        assert_eq!(
            cache.get(WATCH_URL).as_deref(),
            Some("https://cdn.example/a.webm")
        );
        // same key through a different URL shape
        assert_eq!(
            cache.get("https://youtu.be/dQw4w9WgXcQ").as_deref(),
            Some("https://cdn.example/a.webm")
        );
    }

    #[test]
    fn expired_entries_are_evicted_on_lookup() {
        let cache = UrlCache::new();
        cache.put(WATCH_URL, "https://cdn.example/a.webm".into(), DIRECT_URL_TTL, "web");

        let after_ttl = Instant::now() + DIRECT_URL_TTL + Duration::from_secs(1);
        assert_eq!(cache.get_at(WATCH_URL, after_ttl), None);
        assert!(cache.is_empty(), "expired entry should be gone");
    }
}
