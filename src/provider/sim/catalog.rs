//! Built-in component set of the simulated provider

use crate::provider::{Direction, Domain, PortDefinition};

/// Vendor prefix shared by every built-in name
pub const VENDOR_PREFIX: &str = "OMX.Nvidia.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    Clock,
    /// Container demuxer, video on port 0 and audio on port 1
    Reader,
    /// Raw elementary stream reader with a single output
    FileReader,
    VideoDecoder,
    AudioDecoder,
    VideoRenderer,
    FrameExtractor,
    AudioRenderer,
    VideoEncoder,
    ImageEncoder,
    AudioEncoder,
    Writer,
    AudioCapturer,
    Camera,
}

impl Kind {
    /// Components that show pictures and report a first frame
    pub fn displays_frames(&self) -> bool {
        matches!(self, Kind::VideoRenderer | Kind::FrameExtractor)
    }

    /// Components that forward picture dimensions from input to output
    pub fn forwards_format(&self) -> bool {
        matches!(
            self,
            Kind::VideoDecoder | Kind::VideoEncoder | Kind::ImageEncoder
        )
    }
}

const VIDEO_DECODERS: &[&str] = &[
    "mp4.decode",
    "mpeg2v.decode",
    "vp6.decode",
    "h264.decode",
    "h264.decode.secure",
    "vc1.decode",
    "vc1.decode.secure",
    "mjpeg.decoder",
    "theora.decoder",
    "h263.decode",
    "jpeg.decoder",
];

const AUDIO_DECODERS: &[&str] = &[
    "aac.decoder",
    "eaacp.decoder",
    "bsac.decoder",
    "mp3.decoder",
    "wav.decoder",
    "wma.decoder",
    "wmapro.decoder",
    "wmalossless.decoder",
    "vorbis.decoder",
    "amr.decoder",
    "amrwb.decoder",
    "mp2.decoder",
];

pub fn kind_of(name: &str) -> Option<Kind> {
    let short = name.strip_prefix(VENDOR_PREFIX)?;
    let kind = match short {
        "clock.component" => Kind::Clock,
        "reader" | "image.read" => Kind::Reader,
        "video.read.large" | "audio.read" => Kind::FileReader,
        "audio.render" => Kind::AudioRenderer,
        "video.extractor" => Kind::FrameExtractor,
        "camera" => Kind::Camera,
        "audio.capturer" => Kind::AudioCapturer,
        "jpeg.encoder" => Kind::ImageEncoder,
        "h264.encoder" | "mp4.encoder" | "h263.encoder" => Kind::VideoEncoder,
        "aac.encoder" | "amr.encoder" | "amrwb.encoder" | "wav.encoder" => Kind::AudioEncoder,
        "mp4.write" | "wav.write" | "amr.write" | "image.write" => Kind::Writer,
        s if s.starts_with("std.iv_renderer") => Kind::VideoRenderer,
        s if VIDEO_DECODERS.contains(&s) => Kind::VideoDecoder,
        s if AUDIO_DECODERS.contains(&s) => Kind::AudioDecoder,
        _ => return None,
    };
    Some(kind)
}

/// Number of time-base outputs on the clock
pub const CLOCK_PORTS: u32 = 6;

/// Raw picture size the video encoder input starts with
const DEFAULT_CAPTURE: (u32, u32) = (1280, 720);

fn input(index: u32, domain: Domain) -> PortDefinition {
    PortDefinition::new(index, Direction::Input, domain)
}

fn output(index: u32, domain: Domain) -> PortDefinition {
    PortDefinition::new(index, Direction::Output, domain)
}

/// Port layout of a built-in component
pub fn ports_of(kind: Kind, name: &str) -> Vec<PortDefinition> {
    let short = name.strip_prefix(VENDOR_PREFIX).unwrap_or(name);
    match kind {
        Kind::Clock => (0..CLOCK_PORTS).map(|i| output(i, Domain::Time)).collect(),
        Kind::Reader if short == "image.read" => vec![output(0, Domain::Image)],
        Kind::Reader => vec![output(0, Domain::Video), output(1, Domain::Audio)],
        Kind::FileReader if short == "audio.read" => vec![output(0, Domain::Audio)],
        Kind::FileReader => vec![output(0, Domain::Video)],
        Kind::VideoDecoder if short == "jpeg.decoder" => {
            vec![input(0, Domain::Image), output(1, Domain::Image)]
        }
        Kind::VideoDecoder => vec![
            input(0, Domain::Video),
            output(1, Domain::Video),
            input(2, Domain::Time),
        ],
        Kind::AudioDecoder | Kind::AudioEncoder => {
            vec![input(0, Domain::Audio), output(1, Domain::Audio)]
        }
        Kind::VideoRenderer | Kind::FrameExtractor => {
            vec![input(0, Domain::Video), input(1, Domain::Time)]
        }
        Kind::AudioRenderer => vec![input(0, Domain::Audio), input(1, Domain::Time)],
        Kind::VideoEncoder => {
            let (w, h) = DEFAULT_CAPTURE;
            vec![
                input(0, Domain::Video)
                    .with_buffers(4, (w * h * 3 / 2) as usize)
                    .with_frame(w, h),
                output(1, Domain::Video),
            ]
        }
        Kind::ImageEncoder => vec![input(0, Domain::Image), output(1, Domain::Image)],
        Kind::Writer => match short {
            "mp4.write" => vec![input(0, Domain::Video), input(1, Domain::Audio)],
            "image.write" => vec![input(0, Domain::Image)],
            _ => vec![input(0, Domain::Audio)],
        },
        Kind::AudioCapturer => vec![output(0, Domain::Audio), input(1, Domain::Time)],
        Kind::Camera => vec![
            output(0, Domain::Video),
            output(1, Domain::Video),
            input(2, Domain::Time),
        ],
    }
}

/// Built-in names implementing a standard role, preferred first
pub fn builtin_role(role: &str) -> &'static [&'static str] {
    match role {
        "clock.binary" => &["OMX.Nvidia.clock.component"],
        "container_demuxer" => &["OMX.Nvidia.reader"],
        "video_decoder.avc" => &["OMX.Nvidia.h264.decode"],
        "video_decoder.mpeg4" => &["OMX.Nvidia.mp4.decode"],
        "audio_decoder.aac" => &["OMX.Nvidia.aac.decoder", "OMX.Nvidia.eaacp.decoder"],
        "audio_decoder.mp3" => &["OMX.Nvidia.mp3.decoder"],
        "audio_renderer.pcm" => &["OMX.Nvidia.audio.render"],
        "iv_renderer.yuv.overlay" => &["OMX.Nvidia.std.iv_renderer.overlay.yuv420"],
        "video_encoder.avc" => &["OMX.Nvidia.h264.encoder"],
        "audio_encoder.aac" => &["OMX.Nvidia.aac.encoder"],
        "container_muxer" => &["OMX.Nvidia.mp4.write"],
        _ => &[],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_lookup() {
        assert_eq!(kind_of("OMX.Nvidia.h264.decode"), Some(Kind::VideoDecoder));
        assert_eq!(kind_of("OMX.Nvidia.amrwb.decoder"), Some(Kind::AudioDecoder));
        assert_eq!(
            kind_of("OMX.Nvidia.std.iv_renderer.overlay.yuv420"),
            Some(Kind::VideoRenderer)
        );
        assert_eq!(kind_of("OMX.Nvidia.wav.write"), Some(Kind::Writer));
        assert_eq!(kind_of("OMX.Other.h264.decode"), None);
        assert_eq!(kind_of("OMX.Nvidia.nothing"), None);
    }

    #[test]
    fn test_port_layouts() {
        let reader = ports_of(Kind::Reader, "OMX.Nvidia.reader");
        assert_eq!(reader.len(), 2);
        assert_eq!(reader[1].domain, Domain::Audio);

        let clock = ports_of(Kind::Clock, "OMX.Nvidia.clock.component");
        assert_eq!(clock.len() as u32, CLOCK_PORTS);
        assert!(clock.iter().all(|p| p.direction == Direction::Output));

        let wav = ports_of(Kind::Writer, "OMX.Nvidia.wav.write");
        assert_eq!(wav.len(), 1);
        assert_eq!(wav[0].domain, Domain::Audio);

        let enc = ports_of(Kind::VideoEncoder, "OMX.Nvidia.h264.encoder");
        assert!(enc[0].buffer_count_min > 0 && enc[0].buffer_size > 0);
    }

    #[test]
    fn test_roles() {
        assert_eq!(builtin_role("clock.binary"), &["OMX.Nvidia.clock.component"]);
        assert!(builtin_role("unknown").is_empty());
    }
}
