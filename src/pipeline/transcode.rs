use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{ChildStderr, Command};
use tracing::{debug, warn};

use super::{AudioStream, StreamFactory};
use crate::{common::errors::PipelineError, config::Config};

/// Transcoder output: 48 kHz stereo s16le PCM on stdout, quiet stderr.
const OUTPUT_ARGS: &[&str] = &[
    "-analyzeduration",
    "0",
    "-loglevel",
    "0",
    "-f",
    "s16le",
    "-ar",
    "48000",
    "-ac",
    "2",
    "pipe:1",
];

/// Production factory spawning the external fetch and transcode processes.
pub struct FfmpegFactory {
    ffmpeg_path: String,
    ytdlp_path: String,
}

impl FfmpegFactory {
    pub fn new(config: &Config) -> Self {
        Self {
            ffmpeg_path: config.tools.ffmpeg_path.clone(),
            ytdlp_path: config.tools.ytdlp_path.clone(),
        }
    }
}

#[async_trait]
impl StreamFactory for FfmpegFactory {
    async fn direct(&self, direct_url: &str) -> Result<AudioStream, PipelineError> {
        debug!("spawning transcoder for direct url");
        let mut transcoder = Command::new(&self.ffmpeg_path)
            .args([
                "-reconnect",
                "1",
                "-reconnect_streamed",
                "1",
                "-reconnect_delay_max",
                "5",
                "-i",
                direct_url,
            ])
            .args(OUTPUT_ARGS)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| PipelineError::SpawnFailure {
                process: "ffmpeg",
                source: e,
            })?;

        if let Ok(Some(status)) = transcoder.try_wait() {
            if !status.success() {
                return Err(PipelineError::AbnormalExit {
                    process: "ffmpeg",
                    status: status.to_string(),
                });
            }
        }

        let stdout = transcoder
            .stdout
            .take()
            .ok_or_else(|| PipelineError::BrokenPipe("ffmpeg stdout closed".to_string()))?;
        spawn_stderr_logger("ffmpeg", transcoder.stderr.take());

        Ok(AudioStream::new(Box::new(stdout), vec![transcoder], true))
    }

    async fn piped(&self, canonical_url: &str) -> Result<AudioStream, PipelineError> {
        debug!("spawning fetch-and-pipe fallback for {canonical_url}");
        let mut fetcher = Command::new(&self.ytdlp_path)
            .args(["-f", "bestaudio", "-o", "-", canonical_url])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| PipelineError::SpawnFailure {
                process: "yt-dlp",
                source: e,
            })?;

        let mut transcoder = Command::new(&self.ffmpeg_path)
            .args(["-i", "pipe:0"])
            .args(OUTPUT_ARGS)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| PipelineError::SpawnFailure {
                process: "ffmpeg",
                source: e,
            })?;

        let mut fetched = fetcher
            .stdout
            .take()
            .ok_or_else(|| PipelineError::BrokenPipe("yt-dlp stdout closed".to_string()))?;
        let mut transcoder_in = transcoder
            .stdin
            .take()
            .ok_or_else(|| PipelineError::BrokenPipe("ffmpeg stdin closed".to_string()))?;
        spawn_stderr_logger("yt-dlp", fetcher.stderr.take());
        spawn_stderr_logger("ffmpeg", transcoder.stderr.take());

        // Feed task: dropping transcoder_in on exit closes ffmpeg's stdin so
        // it can flush and finish.
        tokio::spawn(async move {
            match tokio::io::copy(&mut fetched, &mut transcoder_in).await {
                Ok(bytes) => debug!("piped {bytes} bytes into the transcoder"),
                Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => {
                    debug!("transcoder input closed early")
                }
                Err(e) => warn!("pipe feed failed: {e}"),
            }
        });

        let stdout = transcoder
            .stdout
            .take()
            .ok_or_else(|| PipelineError::BrokenPipe("ffmpeg stdout closed".to_string()))?;

        Ok(AudioStream::new(
            Box::new(stdout),
            vec![fetcher, transcoder],
            false,
        ))
    }
}

/// Drain a child's stderr into debug logs; tool chatter is never a playback
/// failure by itself.
fn spawn_stderr_logger(tag: &'static str, stderr: Option<ChildStderr>) {
    let Some(stderr) = stderr else { return };
    tokio::spawn(async move {
        let mut lines = BufReader::new(stderr).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            debug!("[{tag}] {line}");
        }
    });
}
