//! Typed parameter and config values exchanged with components
//!
//! Parameters are static settings normally applied while a component is
//! Loaded; configs may change at any time. Both carry a port argument at
//! the call site which component-wide values ignore.

use crate::indexed_values;
use serde::{Deserialize, Serialize};

// ── Ports ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Input,
    Output,
}

/// Media domain of a port
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Domain {
    Audio,
    Video,
    Image,
    /// Clock / time-base port
    Time,
    Other,
}

/// Side of a tunnel that owns the buffers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BufferSupplier {
    #[default]
    Unspecified,
    Input,
    Output,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PortDefinition {
    pub index: u32,
    pub direction: Direction,
    pub domain: Domain,
    pub enabled: bool,
    pub populated: bool,
    pub buffer_count_min: u32,
    pub buffer_count_actual: u32,
    pub buffer_size: usize,
    pub frame_width: u32,
    pub frame_height: u32,
    pub bitrate: u32,
    /// Frames per second in Q16 fixed point
    pub framerate_q16: u32,
}

impl PortDefinition {
    pub fn new(index: u32, direction: Direction, domain: Domain) -> Self {
        PortDefinition {
            index,
            direction,
            domain,
            enabled: true,
            populated: false,
            buffer_count_min: 0,
            buffer_count_actual: 0,
            buffer_size: 0,
            frame_width: 0,
            frame_height: 0,
            bitrate: 0,
            framerate_q16: 0,
        }
    }

    pub fn with_buffers(mut self, count: u32, size: usize) -> Self {
        self.buffer_count_min = count;
        self.buffer_count_actual = count;
        self.buffer_size = size;
        self
    }

    pub fn with_frame(mut self, width: u32, height: u32) -> Self {
        self.frame_width = width;
        self.frame_height = height;
        self
    }
}

// ── Streams ────────────────────────────────────────────────────────────

/// Elementary stream type declared by a reader port
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StreamType {
    None,
    Mpeg4,
    H263,
    Wmv,
    WmvSecure,
    H264,
    H264Secure,
    Mpeg2V,
    Vp6,
    Mjpeg,
    Theora,
    Mp2,
    Mp3,
    Wav,
    Aac,
    AacSbr,
    Bsac,
    Wma,
    WmaPro,
    WmaLossless,
    AmrWb,
    AmrNb,
    Vorbis,
}

impl StreamType {
    pub fn is_video(&self) -> bool {
        use StreamType::*;
        matches!(
            self,
            Mpeg4 | H263 | Wmv | WmvSecure | H264 | H264Secure | Mpeg2V | Vp6 | Mjpeg | Theora
        )
    }

    pub fn is_audio(&self) -> bool {
        use StreamType::*;
        matches!(
            self,
            Mp2 | Mp3 | Wav | Aac | AacSbr | Bsac | Wma | WmaPro | WmaLossless | AmrWb | AmrNb | Vorbis
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AudioStreamInfo {
    pub sample_rate: u32,
    pub channels: u32,
    pub bitrate: u32,
    pub bits_per_sample: u32,
}

// ── Encoding ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CodecLevel {
    Mpeg4(u8),
    /// H.264 level times ten (51 is level 5.1)
    H264(u8),
    H263(u8),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GopParams {
    pub p_frames: u32,
    pub b_frames: u32,
}

/// Min/max quantizer for I and P frames
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QpRange {
    pub min_i: u32,
    pub max_i: u32,
    pub min_p: u32,
    pub max_p: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InitialQp {
    pub i: u32,
    pub p: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RateControlMode {
    Constant,
    Variable,
    ConstantSkipFrames,
    VariableSkipFrames,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bitrate {
    pub mode: RateControlMode,
    pub target: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApplicationType {
    Camcorder,
    VideoTelephony,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorResiliency {
    None,
    Low,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncoderProperties {
    pub application: ApplicationType,
    pub resiliency: ErrorResiliency,
    /// Quality factor in percent
    pub quality: u32,
    pub stringent_bitrate: bool,
    pub temporal_tradeoff: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PcmParams {
    pub sample_rate: u32,
    pub channels: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AacProfile {
    Lc,
    /// HE-AAC v1 (SBR)
    He,
    /// HE-AAC v2 (SBR + parametric stereo)
    HePs,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AacParams {
    pub profile: AacProfile,
    pub sample_rate: u32,
    pub channels: u32,
    pub bitrate: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AmrParams {
    pub wideband: bool,
    /// Index into the AMR bitrate table
    pub band_mode: u8,
    pub bitrate: u32,
    pub channels: u32,
    pub dtx: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SensorMode {
    pub one_shot: bool,
}

// ── Clock and rendering ────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockRunState {
    Running,
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockState {
    pub state: ClockRunState,
    pub start_time_us: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceClock {
    None,
    Audio,
    Video,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mirror {
    None,
    Horizontal,
    Vertical,
    Both,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Scale {
    pub x: f32,
    pub y: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    pub left: i32,
    pub top: i32,
    pub width: u32,
    pub height: u32,
}

// ── Metadata ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MetadataKind {
    Title,
    Artist,
    Album,
    AlbumArtist,
    Composer,
    Genre,
    Year,
    TrackNumber,
    Comment,
    Copyright,
    Encoder,
    CoverArt,
    /// Preferred thumbnail position in 100 ns units, raw u64
    ThumbnailSeekTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Charset {
    Ascii,
    Utf8,
    Utf16Le,
    U32,
    U64,
    Binary,
    Unknown,
}

/// Raw metadata reply before normalisation
#[derive(Debug, Clone, PartialEq)]
pub struct MetadataValue {
    pub charset: Charset,
    pub data: bytes::Bytes,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CapturedFrame {
    pub width: u32,
    pub height: u32,
    pub data: bytes::Bytes,
}

// ── Values ─────────────────────────────────────────────────────────────

indexed_values! {
    /// Static component parameters
    pub enum Param => ParamIndex {
        PortDefinition(PortDefinition),
        BufferSupplier(BufferSupplier),
        Filename(String),
        UserAgent(String),
        StreamCount(u32),
        /// Microseconds
        Duration(i64),
        StreamType(StreamType),
        AudioStreamInfo(AudioStreamInfo),
        LowResourceMode(bool),
        OutputFormat(String),
        TempFilePath(String),
        FileSizeLimit(u64),
        /// Microseconds
        DurationLimit(u64),
        UsePlatformBuffers(bool),
        CodecLevel(CodecLevel),
        Gop(GopParams),
        QpRange(QpRange),
        InitialQp(InitialQp),
        RateControl(RateControlMode),
        EncoderProperties(EncoderProperties),
        Pcm(PcmParams),
        Aac(AacParams),
        Amr(AmrParams),
        AudioSource(i32),
        StereoMode(u32),
        SensorId(u32),
        SensorMode(SensorMode),
    }
}

indexed_values! {
    /// Runtime component configs
    pub enum Config => ConfigIndex {
        ClockState(ClockState),
        TimeScale(f32),
        /// Microseconds
        CurrentMediaTime(i64),
        ReferenceClock(ReferenceClock),
        /// Microseconds
        Position(i64),
        FileCacheSize(u32),
        AudioOnlyHint(bool),
        DisableTimestampUpdates(bool),
        /// Linear volume, 0..=100
        Volume(u32),
        Mute(bool),
        Rotation(i32),
        Mirror(Mirror),
        Scale(Scale),
        /// ARGB
        BackgroundColor(u32),
        ExternalOverlay(u64),
        Capturing(bool),
        PreviewEnable(bool),
        StereoCapable(bool),
        Crop(Rect),
        OutputPosition(Rect),
        KeepAspect(bool),
        /// Q16 fixed point
        Framerate(u32),
        Bitrate(Bitrate),
        NalSize(u32),
    }
}

/// Converts a speed factor to the Q16 fixed point the components use
pub fn to_q16(value: f32) -> u32 {
    (value.max(0.0) * 65536.0).round() as u32
}

pub fn from_q16(value: u32) -> f32 {
    value as f32 / 65536.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_matches_variant() {
        assert_eq!(Param::Duration(10).index(), ParamIndex::Duration);
        assert_eq!(Config::Mute(true).index(), ConfigIndex::Mute);
        assert_ne!(Config::Volume(3).index(), ConfigIndex::Mute);
    }

    #[test]
    fn test_unpack() {
        let reply = Param::StreamCount(2);
        let count: crate::error::Result<u32> = crate::unpack!(reply, Param::StreamCount);
        assert_eq!(count.unwrap(), 2);

        let reply = Param::Duration(5);
        let count: crate::error::Result<u32> = crate::unpack!(reply, Param::StreamCount);
        assert!(count.is_err());
    }

    #[test]
    fn test_q16() {
        assert_eq!(to_q16(30.0), 30 << 16);
        assert_eq!(from_q16(to_q16(1.5)), 1.5);
        assert_eq!(to_q16(-2.0), 0);
    }

    #[test]
    fn test_stream_kinds() {
        assert!(StreamType::H264.is_video());
        assert!(!StreamType::H264.is_audio());
        assert!(StreamType::AmrNb.is_audio());
        assert!(!StreamType::None.is_video() && !StreamType::None.is_audio());
    }
}
