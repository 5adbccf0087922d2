use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub tools: ToolsConfig,
    pub resolver: ResolverConfig,
    pub playback: PlaybackConfig,
    pub logging: Option<LoggingConfig>,
}

/// Paths to the external fetch and transcode binaries.
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct ToolsConfig {
    pub ytdlp_path: String,
    pub ffmpeg_path: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct ResolverConfig {
    /// Deadline for a single resolver subprocess invocation.
    pub timeout_secs: u64,
    /// How long a resolved direct-media URL stays servable.
    pub cache_ttl_secs: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Volume applied to new sessions, in percent.
    pub default_volume: u16,
    /// Maximum number of pending items per session.
    pub max_queue_size: usize,
    /// How long to wait for the sink to become ready when creating a session.
    pub connect_timeout_secs: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    pub level: Option<String>,
    pub filters: Option<String>,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            ytdlp_path: "yt-dlp".to_string(),
            ffmpeg_path: "ffmpeg".to_string(),
        }
    }
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 20,
            cache_ttl_secs: 5 * 60 * 60,
        }
    }
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            default_volume: 80,
            max_queue_size: 100,
            connect_timeout_secs: 30,
        }
    }
}

impl ResolverConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}

impl PlaybackConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

impl Config {
    pub fn load() -> Result<Self, Box<dyn std::error::Error>> {
        let config_str = std::fs::read_to_string("config.toml").unwrap_or_else(|_| "".to_string());
        if config_str.is_empty() {
            return Err("config.toml not found or empty".into());
        }
        let config: Config = toml::from_str(&config_str)?;
        Ok(config)
    }

    /// Like [`Config::load`], but falls back to defaults when no file exists.
    pub fn load_or_default() -> Self {
        Self::load().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_to_missing_sections() {
        let config: Config = toml::from_str(
            r#"
            [playback]
            default_volume = 50
            "#,
        )
        .expect("partial config should parse");

        assert_eq!(config.playback.default_volume, 50);
        assert_eq!(config.playback.max_queue_size, 100);
        assert_eq!(config.tools.ytdlp_path, "yt-dlp");
        assert_eq!(config.resolver.cache_ttl(), Duration::from_secs(18_000));
    }
}
