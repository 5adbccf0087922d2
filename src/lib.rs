//! Per-session audio playback scheduler.
//!
//! Each session (one voice channel, one listening room, ...) owns an ordered
//! queue of resolved tracks and at most one active audio stream. The
//! [`engine::Engine`] drives the queue state machine, the
//! [`pipeline::Pipeline`] turns a queued track into a decoded PCM byte
//! stream via external fetch/transcode processes, and the
//! [`resolver`] resolves user queries into track metadata and short-lived
//! direct-media URLs (cached process-wide).
//!
//! The control surface, the actual audio transport and presentation are
//! external collaborators reached through the [`sink`] traits and the
//! per-session [`engine::PlaybackEvent`] channel.

pub mod common;
pub mod config;
pub mod engine;
pub mod pipeline;
pub mod resolver;
pub mod sink;

pub use config::Config;
pub use engine::{Engine, Enqueued, PlaybackEvent, SessionView};
