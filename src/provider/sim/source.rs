//! Media sources the simulated reader can open

use std::collections::HashMap;

use bytes::Bytes;

use crate::provider::params::{AudioStreamInfo, Charset, StreamType, to_q16};
use crate::provider::{MetadataKind, MetadataValue, PortDefinition};

#[derive(Debug, Clone, PartialEq)]
pub struct SimVideo {
    pub stream: StreamType,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub bitrate: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SimAudio {
    pub stream: StreamType,
    pub sample_rate: u32,
    pub channels: u32,
    pub bitrate: u32,
    pub bits_per_sample: u32,
}

impl SimAudio {
    pub fn info(&self) -> AudioStreamInfo {
        AudioStreamInfo {
            sample_rate: self.sample_rate,
            channels: self.channels,
            bitrate: self.bitrate,
            bits_per_sample: self.bits_per_sample,
        }
    }
}

/// What a reader finds behind a URI
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SimSource {
    pub video: Option<SimVideo>,
    pub audio: Option<SimAudio>,
    pub duration_ms: i64,
    pub metadata: HashMap<MetadataKind, MetadataValue>,
    /// Seeks land on the next key frame of this spacing, even past the end
    pub key_frame_ms: Option<i64>,
}

impl SimSource {
    /// 1280x720 H.264 at 30 fps with 44.1 kHz stereo AAC
    pub fn h264_aac(duration_ms: i64) -> Self {
        SimSource {
            video: Some(SimVideo {
                stream: StreamType::H264,
                width: 1280,
                height: 720,
                fps: 30,
                bitrate: 4_000_000,
            }),
            audio: Some(SimAudio {
                stream: StreamType::Aac,
                sample_rate: 44100,
                channels: 2,
                bitrate: 128_000,
                bits_per_sample: 16,
            }),
            duration_ms,
            metadata: HashMap::new(),
            key_frame_ms: None,
        }
    }

    pub fn audio_only(stream: StreamType, duration_ms: i64) -> Self {
        SimSource {
            video: None,
            audio: Some(SimAudio {
                stream,
                sample_rate: 44100,
                channels: 2,
                bitrate: 128_000,
                bits_per_sample: 16,
            }),
            duration_ms,
            metadata: HashMap::new(),
            key_frame_ms: None,
        }
    }

    pub fn with_metadata(mut self, kind: MetadataKind, charset: Charset, data: impl Into<Bytes>) -> Self {
        self.metadata.insert(
            kind,
            MetadataValue {
                charset,
                data: data.into(),
            },
        );
        self
    }

    pub fn with_key_frames(mut self, interval_ms: i64) -> Self {
        self.key_frame_ms = Some(interval_ms).filter(|ms| *ms > 0);
        self
    }

    pub fn stream_count(&self) -> u32 {
        u32::from(self.video.is_some()) + u32::from(self.audio.is_some())
    }

    /// Stream type a reader declares on `port`
    pub fn stream_on(&self, port: u32) -> StreamType {
        match port {
            0 => self.video.as_ref().map_or(StreamType::None, |v| v.stream),
            1 => self.audio.as_ref().map_or(StreamType::None, |a| a.stream),
            _ => StreamType::None,
        }
    }

    /// Length of one video frame, when there is video
    pub fn frame_us(&self) -> Option<i64> {
        self.video
            .as_ref()
            .filter(|v| v.fps > 0)
            .map(|v| 1_000_000 / i64::from(v.fps))
    }

    /// Position the reader lands on when asked for `requested_us`: clamped
    /// to the stream and snapped down to a frame boundary, or rounded up to
    /// the next key frame when the source only seeks to key frames
    pub fn landing_position(&self, requested_us: i64) -> i64 {
        if let Some(key_ms) = self.key_frame_ms {
            let key_us = key_ms.saturating_mul(1000);
            let requested = requested_us.max(0);
            let keys = requested.saturating_add(key_us - 1) / key_us;
            return keys.saturating_mul(key_us);
        }
        let clamped = requested_us.clamp(0, self.duration_ms.max(0).saturating_mul(1000));
        match self.frame_us() {
            Some(frame) => clamped - clamped % frame,
            None => clamped,
        }
    }

    /// Fills in what the reader's output ports declare about this source
    pub(crate) fn describe_port(&self, def: &mut PortDefinition) {
        if def.index == 0 {
            if let Some(v) = &self.video {
                def.frame_width = v.width;
                def.frame_height = v.height;
                def.bitrate = v.bitrate;
                def.framerate_q16 = to_q16(v.fps as f32);
            }
        } else if def.index == 1 {
            if let Some(a) = &self.audio {
                def.bitrate = a.bitrate;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_landing_position_snaps_to_frames() {
        let src = SimSource::h264_aac(10_000);
        let frame = src.frame_us().unwrap();
        assert_eq!(frame, 33_333);
        let pos = src.landing_position(1_000_000);
        assert!(pos <= 1_000_000 && 1_000_000 - pos < frame);
        assert_eq!(src.landing_position(-5), 0);
        let end = src.landing_position(99_000_000);
        assert!(end <= 10_000_000);
    }

    #[test]
    fn test_key_frame_seek_can_pass_the_end() {
        let src = SimSource::h264_aac(10_000).with_key_frames(4000);
        assert_eq!(src.landing_position(0), 0);
        assert_eq!(src.landing_position(1_000_000), 4_000_000);
        assert_eq!(src.landing_position(8_000_000), 8_000_000);
        assert_eq!(src.landing_position(9_000_000), 12_000_000);
        assert_eq!(SimSource::h264_aac(10).with_key_frames(0).key_frame_ms, None);
    }

    #[test]
    fn test_audio_only_declares_nothing_on_video_port() {
        let src = SimSource::audio_only(StreamType::Mp3, 3000);
        assert_eq!(src.stream_on(0), StreamType::None);
        assert_eq!(src.stream_on(1), StreamType::Mp3);
        assert_eq!(src.stream_count(), 1);
        assert_eq!(src.landing_position(1234), 1234);
    }
}
