//! Recorder parameter blocks, their partial-update patches and the
//! derivation tables that fill whatever the caller left unset

use serde::{Deserialize, Serialize};

use crate::provider::params::{
    AacProfile, ApplicationType, CodecLevel, ErrorResiliency, Mirror, RateControlMode,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VideoCodec {
    H264,
    Mpeg4,
    H263,
}

impl VideoCodec {
    pub fn encoder(&self) -> &'static str {
        match self {
            VideoCodec::H264 => "OMX.Nvidia.h264.encoder",
            VideoCodec::Mpeg4 => "OMX.Nvidia.mp4.encoder",
            VideoCodec::H263 => "OMX.Nvidia.h263.encoder",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AudioCodec {
    Aac,
    Amr,
    Pcm,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImageCodec {
    Jpeg,
}

impl ImageCodec {
    pub fn encoder(&self) -> &'static str {
        match self {
            ImageCodec::Jpeg => "OMX.Nvidia.jpeg.encoder",
        }
    }
}

/// Container the writer produces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutputFormat {
    Mp4,
    ThreeGpp,
    RawAmr,
    Jpeg,
}

/// Where the recorded media comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InputType {
    /// Camera and microphone
    Capture,
    /// Elementary stream files read back through file readers
    File,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Quality {
    Low,
    Medium,
    High,
}

impl Quality {
    /// Encoder quality factor in percent
    pub fn q_factor(&self) -> u32 {
        match self {
            Quality::Low => 33,
            Quality::Medium => 66,
            Quality::High => 100,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoParams {
    pub width: u32,
    pub height: u32,
    pub codec: VideoCodec,
    /// Derived from the width when unset
    pub bitrate: Option<u32>,
    pub frame_rate: u32,
    /// Index into the codec's level table
    pub level: usize,
    pub i_frame_interval: u32,
    pub rotation: i32,
    pub mirror: Mirror,
    /// (min, max) quantizer for I frames and P frames
    pub qp_range: Option<((u32, u32), (u32, u32))>,
    /// Initial quantizer for I and P frames
    pub initial_qp: Option<(u32, u32)>,
    pub rate_control: RateControlMode,
    pub application: ApplicationType,
    pub resiliency: ErrorResiliency,
    pub quality: Quality,
    pub stringent_bitrate: bool,
    pub temporal_tradeoff: u32,
    pub use_platform_buffers: bool,
}

impl Default for VideoParams {
    fn default() -> Self {
        VideoParams {
            width: 1280,
            height: 720,
            codec: VideoCodec::H264,
            bitrate: None,
            frame_rate: 30,
            level: H264_LEVELS.len() - 1,
            i_frame_interval: 30,
            rotation: 0,
            mirror: Mirror::None,
            qp_range: None,
            initial_qp: None,
            rate_control: RateControlMode::Variable,
            application: ApplicationType::Camcorder,
            resiliency: ErrorResiliency::None,
            quality: Quality::High,
            stringent_bitrate: false,
            temporal_tradeoff: 0,
            use_platform_buffers: false,
        }
    }
}

impl VideoParams {
    pub fn bitrate(&self) -> u32 {
        self.bitrate.unwrap_or_else(|| bitrate_for_width(self.width))
    }

    /// Level the encoder is configured with, `None` for codecs without one
    pub fn codec_level(&self) -> Option<CodecLevel> {
        match self.codec {
            VideoCodec::H264 => Some(CodecLevel::H264(clamped(H264_LEVELS, self.level))),
            VideoCodec::Mpeg4 => Some(CodecLevel::Mpeg4(clamped(MPEG4_LEVELS, self.level))),
            VideoCodec::H263 => None,
        }
    }
}

/// Default target bitrate for a picture width
pub fn bitrate_for_width(width: u32) -> u32 {
    match width {
        w if w >= 1280 => 10_000_000,
        w if w >= 720 => 6_000_000,
        w if w >= 480 => 4_000_000,
        w if w >= 352 => 1_000_000,
        w if w >= 320 => 512_000,
        _ => 192_000,
    }
}

pub const MPEG4_LEVELS: &[u8] = &[0, 1, 2, 3];
/// H.264 levels times ten, 1 through 5.1
pub const H264_LEVELS: &[u8] = &[10, 11, 12, 13, 20, 21, 22, 30, 31, 32, 40, 41, 42, 50, 51];

fn clamped(table: &[u8], index: usize) -> u8 {
    table[index.min(table.len() - 1)]
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioParams {
    pub codec: AudioCodec,
    pub aac_profile: AacProfile,
    pub sample_rate: Option<u32>,
    pub bitrate: Option<u32>,
    pub channels: Option<u32>,
    /// Capture device selector handed to the capturer
    pub source: i32,
}

impl Default for AudioParams {
    fn default() -> Self {
        AudioParams {
            codec: AudioCodec::Aac,
            aac_profile: AacProfile::Lc,
            sample_rate: Some(44100),
            bitrate: Some(128_000),
            channels: Some(2),
            source: 1,
        }
    }
}

/// Audio settings with every field decided
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedAudio {
    pub codec: AudioCodec,
    pub aac_profile: AacProfile,
    pub sample_rate: u32,
    pub bitrate: u32,
    pub channels: u32,
}

impl ResolvedAudio {
    pub fn is_wideband(&self) -> bool {
        self.sample_rate == 16000
    }

    pub fn encoder(&self) -> &'static str {
        match self.codec {
            AudioCodec::Aac => "OMX.Nvidia.aac.encoder",
            AudioCodec::Amr if self.is_wideband() => "OMX.Nvidia.amrwb.encoder",
            AudioCodec::Amr => "OMX.Nvidia.amr.encoder",
            AudioCodec::Pcm => "OMX.Nvidia.wav.encoder",
        }
    }
}

impl AudioParams {
    /// Fills unset fields from the codec's defaults
    pub fn resolve(&self) -> ResolvedAudio {
        let (rate, bitrate, channels) = match self.codec {
            AudioCodec::Aac if self.aac_profile == AacProfile::HePs => (44100, 64_000, 2),
            AudioCodec::Aac | AudioCodec::Pcm => (44100, 128_000, 2),
            AudioCodec::Amr if self.sample_rate == Some(16000) => (16000, AMR_WB_BITRATE, 1),
            AudioCodec::Amr => (8000, AMR_NB_BITRATE, 1),
        };
        ResolvedAudio {
            codec: self.codec,
            aac_profile: self.aac_profile,
            sample_rate: self.sample_rate.unwrap_or(rate),
            bitrate: self.bitrate.unwrap_or(bitrate),
            channels: self.channels.unwrap_or(channels),
        }
    }
}

/// AMR bitrates, indexed by band mode
pub const AMR_BITRATES: &[u32] = &[
    0, 4750, 5150, 5900, 6700, 7400, 7950, 10200, 12200, 6600, 8850, 12650, 14250, 15850, 18250,
    19850, 23050, 23850,
];

pub const AMR_NB_BITRATE: u32 = 12_200;
pub const AMR_WB_BITRATE: u32 = 23_850;

/// Band mode carrying `bitrate`
pub fn amr_band_mode(bitrate: u32) -> Option<u8> {
    AMR_BITRATES
        .iter()
        .position(|b| *b == bitrate && bitrate != 0)
        .map(|i| i as u8)
}

/// Band mode and bitrate the encoder runs with. A rate outside the table
/// keeps the band's default mode and rate.
pub fn amr_band(bitrate: u32, wideband: bool) -> (u8, u32) {
    if let Some(mode) = amr_band_mode(bitrate) {
        return (mode, bitrate);
    }
    let fallback = if wideband { AMR_WB_BITRATE } else { AMR_NB_BITRATE };
    (amr_band_mode(fallback).unwrap_or_default(), fallback)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageParams {
    pub width: u32,
    pub height: u32,
    pub codec: ImageCodec,
    pub rotation: i32,
}

impl Default for ImageParams {
    fn default() -> Self {
        ImageParams {
            width: 1280,
            height: 720,
            codec: ImageCodec::Jpeg,
            rotation: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreviewParams {
    pub width: u32,
    pub height: u32,
    pub x: i32,
    pub y: i32,
    pub rotation: i32,
    pub keep_aspect: bool,
}

impl Default for PreviewParams {
    fn default() -> Self {
        PreviewParams {
            width: 720,
            height: 480,
            x: 0,
            y: 0,
            rotation: 0,
            keep_aspect: true,
        }
    }
}

// ── Patches ────────────────────────────────────────────────────────────

macro_rules! apply_fields {
    ($patch:expr, $target:expr, [$($field:ident),* $(,)?]) => {
        $(
            if let Some(value) = $patch.$field.clone() {
                $target.$field = value;
            }
        )*
    };
}

/// Partial update of [`VideoParams`]; `None` keeps the current value
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoPatch {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub codec: Option<VideoCodec>,
    pub bitrate: Option<u32>,
    pub frame_rate: Option<u32>,
    pub level: Option<usize>,
    pub i_frame_interval: Option<u32>,
    pub rotation: Option<i32>,
    pub mirror: Option<Mirror>,
    pub qp_range: Option<((u32, u32), (u32, u32))>,
    pub initial_qp: Option<(u32, u32)>,
    pub rate_control: Option<RateControlMode>,
    pub application: Option<ApplicationType>,
    pub resiliency: Option<ErrorResiliency>,
    pub quality: Option<Quality>,
    pub stringent_bitrate: Option<bool>,
    pub temporal_tradeoff: Option<u32>,
    pub use_platform_buffers: Option<bool>,
}

impl VideoPatch {
    pub fn apply(&self, params: &mut VideoParams) {
        apply_fields!(self, params, [
            width,
            height,
            codec,
            frame_rate,
            level,
            i_frame_interval,
            rotation,
            mirror,
            rate_control,
            application,
            resiliency,
            quality,
            stringent_bitrate,
            temporal_tradeoff,
            use_platform_buffers,
        ]);
        if self.bitrate.is_some() {
            params.bitrate = self.bitrate;
        }
        if self.qp_range.is_some() {
            params.qp_range = self.qp_range;
        }
        if self.initial_qp.is_some() {
            params.initial_qp = self.initial_qp;
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioPatch {
    pub codec: Option<AudioCodec>,
    pub aac_profile: Option<AacProfile>,
    pub sample_rate: Option<u32>,
    pub bitrate: Option<u32>,
    pub channels: Option<u32>,
    pub source: Option<i32>,
}

impl AudioPatch {
    /// A codec change drops the rate, bitrate and channel count the patch
    /// does not restate, so they are derived for the new codec
    pub fn apply(&self, params: &mut AudioParams) {
        if let Some(codec) = self.codec
            && codec != params.codec
        {
            params.codec = codec;
            params.sample_rate = None;
            params.bitrate = None;
            params.channels = None;
        }
        apply_fields!(self, params, [aac_profile, source]);
        if self.sample_rate.is_some() {
            params.sample_rate = self.sample_rate;
        }
        if self.bitrate.is_some() {
            params.bitrate = self.bitrate;
        }
        if self.channels.is_some() {
            params.channels = self.channels;
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImagePatch {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub codec: Option<ImageCodec>,
    pub rotation: Option<i32>,
}

impl ImagePatch {
    pub fn apply(&self, params: &mut ImageParams) {
        apply_fields!(self, params, [width, height, codec, rotation]);
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreviewPatch {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub x: Option<i32>,
    pub y: Option<i32>,
    pub rotation: Option<i32>,
    pub keep_aspect: Option<bool>,
}

impl PreviewPatch {
    pub fn apply(&self, params: &mut PreviewParams) {
        apply_fields!(self, params, [width, height, x, y, rotation, keep_aspect]);
    }
}

// ── Writer selection ───────────────────────────────────────────────────

/// Writer component and the ports each stream lands on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriterLayout {
    pub name: &'static str,
    /// Container tag handed to the writer, if it takes one
    pub format: Option<&'static str>,
    pub video_port: Option<u32>,
    pub audio_port: Option<u32>,
    pub image_port: Option<u32>,
}

/// Directory muxers keep their scratch files in
pub const TEMP_FILE_PATH: &str = "/data/";

impl WriterLayout {
    pub fn select(format: OutputFormat, audio: AudioCodec) -> WriterLayout {
        match (format, audio) {
            (OutputFormat::Jpeg, _) => WriterLayout {
                name: "OMX.Nvidia.image.write",
                format: None,
                video_port: None,
                audio_port: None,
                image_port: Some(0),
            },
            (_, AudioCodec::Pcm) => WriterLayout {
                name: "OMX.Nvidia.wav.write",
                format: None,
                video_port: None,
                audio_port: Some(0),
                image_port: None,
            },
            (OutputFormat::RawAmr, _) => WriterLayout {
                name: "OMX.Nvidia.amr.write",
                format: Some("amr"),
                video_port: None,
                audio_port: Some(0),
                image_port: None,
            },
            (OutputFormat::Mp4, _) => WriterLayout::muxer("mp4"),
            (OutputFormat::ThreeGpp, _) => WriterLayout::muxer("3gp"),
        }
    }

    fn muxer(tag: &'static str) -> WriterLayout {
        WriterLayout {
            name: "OMX.Nvidia.mp4.write",
            format: Some(tag),
            video_port: Some(0),
            audio_port: Some(1),
            image_port: None,
        }
    }

    pub fn is_muxer(&self) -> bool {
        self.video_port.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bitrate_by_width() {
        assert_eq!(bitrate_for_width(1920), 10_000_000);
        assert_eq!(bitrate_for_width(720), 6_000_000);
        assert_eq!(bitrate_for_width(640), 4_000_000);
        assert_eq!(bitrate_for_width(352), 1_000_000);
        assert_eq!(bitrate_for_width(320), 512_000);
        assert_eq!(bitrate_for_width(176), 192_000);

        let params = VideoParams {
            bitrate: Some(3_000_000),
            ..Default::default()
        };
        assert_eq!(params.bitrate(), 3_000_000);
    }

    #[test]
    fn test_amr_derivation() {
        let amr = AudioParams {
            codec: AudioCodec::Amr,
            sample_rate: None,
            bitrate: None,
            channels: None,
            ..Default::default()
        }
        .resolve();
        assert_eq!((amr.sample_rate, amr.bitrate, amr.channels), (8000, 12_200, 1));
        assert_eq!(amr.encoder(), "OMX.Nvidia.amr.encoder");
        assert_eq!(amr_band_mode(amr.bitrate), Some(8));

        let wb = AudioParams {
            codec: AudioCodec::Amr,
            sample_rate: Some(16000),
            bitrate: None,
            channels: None,
            ..Default::default()
        }
        .resolve();
        assert_eq!((wb.bitrate, wb.channels), (23_850, 1));
        assert_eq!(wb.encoder(), "OMX.Nvidia.amrwb.encoder");
        assert_eq!(amr_band_mode(23_850), Some(17));
        assert_eq!(amr_band_mode(12_345), None);
        assert_eq!(amr_band_mode(0), None);
        assert_eq!(amr_band(6_600, true), (9, 6_600));
        assert_eq!(amr_band(12_345, false), (8, AMR_NB_BITRATE));
        assert_eq!(amr_band(0, true), (17, AMR_WB_BITRATE));
    }

    #[test]
    fn test_aac_derivation_keeps_explicit_fields() {
        let heps = AudioParams {
            aac_profile: AacProfile::HePs,
            sample_rate: Some(32000),
            bitrate: None,
            channels: None,
            ..Default::default()
        }
        .resolve();
        assert_eq!((heps.sample_rate, heps.bitrate, heps.channels), (32000, 64_000, 2));
    }

    #[test]
    fn test_levels_clamped() {
        let params = VideoParams {
            level: 99,
            ..Default::default()
        };
        assert_eq!(params.codec_level(), Some(CodecLevel::H264(51)));
        let params = VideoParams {
            codec: VideoCodec::Mpeg4,
            level: 2,
            ..Default::default()
        };
        assert_eq!(params.codec_level(), Some(CodecLevel::Mpeg4(2)));
        let params = VideoParams {
            codec: VideoCodec::H263,
            ..Default::default()
        };
        assert_eq!(params.codec_level(), None);
    }

    #[test]
    fn test_patches_keep_unset_fields() {
        let mut video = VideoParams::default();
        VideoPatch {
            width: Some(640),
            height: Some(480),
            ..Default::default()
        }
        .apply(&mut video);
        assert_eq!((video.width, video.height), (640, 480));
        assert_eq!(video.frame_rate, 30);
        assert_eq!(video.bitrate(), 4_000_000);

        let mut audio = AudioParams::default();
        AudioPatch {
            channels: Some(1),
            ..Default::default()
        }
        .apply(&mut audio);
        assert_eq!(audio.resolve().channels, 1);
        assert_eq!(audio.resolve().sample_rate, 44100);

        AudioPatch {
            codec: Some(AudioCodec::Amr),
            ..Default::default()
        }
        .apply(&mut audio);
        assert_eq!(audio.resolve().bitrate, 12_200);

        let patch: PreviewPatch = serde_json::from_str(r#"{"width": 320}"#).unwrap();
        let mut preview = PreviewParams::default();
        patch.apply(&mut preview);
        assert_eq!((preview.width, preview.height), (320, 480));
    }

    #[test]
    fn test_writer_selection() {
        let wav = WriterLayout::select(OutputFormat::Mp4, AudioCodec::Pcm);
        assert_eq!((wav.name, wav.audio_port), ("OMX.Nvidia.wav.write", Some(0)));
        let amr = WriterLayout::select(OutputFormat::RawAmr, AudioCodec::Amr);
        assert_eq!((amr.name, amr.audio_port, amr.format), ("OMX.Nvidia.amr.write", Some(0), Some("amr")));
        let mp4 = WriterLayout::select(OutputFormat::Mp4, AudioCodec::Aac);
        assert!(mp4.is_muxer());
        assert_eq!((mp4.video_port, mp4.audio_port), (Some(0), Some(1)));
        let jpeg = WriterLayout::select(OutputFormat::Jpeg, AudioCodec::Aac);
        assert_eq!(jpeg.image_port, Some(0));
    }
}
