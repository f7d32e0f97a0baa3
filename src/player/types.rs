use bytes::Bytes;
use serde::Serialize;
use std::sync::Arc;

use crate::provider::params::StreamType;

/// What a player graph is built for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlayerType {
    /// Audio and video decode to the renderers, clocked
    Normal,
    /// Reader only: probing and metadata
    Metadata,
    /// Video only, into a frame extractor instead of a renderer
    FrameExtraction,
    /// Still image through the JPEG decoder
    Image,
}

impl PlayerType {
    /// Only playback graphs carry a clock
    pub fn uses_clock(&self) -> bool {
        matches!(self, PlayerType::Normal)
    }

    pub fn label(&self) -> &'static str {
        match self {
            PlayerType::Normal => "normal",
            PlayerType::Metadata => "metadata",
            PlayerType::FrameExtraction => "frame extraction",
            PlayerType::Image => "image",
        }
    }
}

/// Pushed to the registered [`PlayerCallback`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerNotification {
    EndOfStream,
    StreamChanged,
}

pub type PlayerCallback = Arc<dyn Fn(PlayerNotification) + Send + Sync>;

/// Last buffering report from the reader
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferingEvent {
    pub need_pause: bool,
    pub percent: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct VideoInfo {
    pub stream: StreamType,
    pub width: u32,
    pub height: u32,
    pub bitrate: u32,
    /// Q16 fixed point frames per second
    pub framerate_q16: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AudioInfo {
    pub stream: StreamType,
    pub sample_rate: u32,
    pub channels: u32,
    pub bitrate: u32,
    pub bits_per_sample: u32,
}

/// Everything the reader declared about the source
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MediaInfo {
    pub stream_count: u32,
    pub duration_ms: i64,
    pub video: Option<VideoInfo>,
    pub audio: Option<AudioInfo>,
}

/// Size of a frame held by the extractor, returned by the first half of
/// the extraction protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameInfo {
    pub len: usize,
    pub width: u32,
    pub height: u32,
}

/// Normalised metadata value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Metadata {
    Text(String),
    Binary(Bytes),
}

impl Metadata {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Metadata::Text(s) => Some(s),
            Metadata::Binary(_) => None,
        }
    }
}
