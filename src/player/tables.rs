//! Component names the player builds with, and the stream type to
//! decoder mapping

use crate::provider::params::StreamType;

pub const READER: &str = "OMX.Nvidia.reader";
pub const IMAGE_READER: &str = "OMX.Nvidia.image.read";
pub const AUDIO_RENDERER: &str = "OMX.Nvidia.audio.render";
pub const VIDEO_RENDERER: &str = "OMX.Nvidia.std.iv_renderer.overlay.yuv420";
pub const FRAME_EXTRACTOR: &str = "OMX.Nvidia.video.extractor";
pub const JPEG_DECODER: &str = "OMX.Nvidia.jpeg.decoder";

pub fn video_decoder(stream: StreamType) -> Option<&'static str> {
    let name = match stream {
        StreamType::Mpeg4 => "OMX.Nvidia.mp4.decode",
        StreamType::H263 => "OMX.Nvidia.h263.decode",
        StreamType::Wmv => "OMX.Nvidia.vc1.decode",
        StreamType::WmvSecure => "OMX.Nvidia.vc1.decode.secure",
        StreamType::H264 => "OMX.Nvidia.h264.decode",
        StreamType::H264Secure => "OMX.Nvidia.h264.decode.secure",
        StreamType::Mpeg2V => "OMX.Nvidia.mpeg2v.decode",
        StreamType::Vp6 => "OMX.Nvidia.vp6.decode",
        StreamType::Mjpeg => "OMX.Nvidia.mjpeg.decoder",
        StreamType::Theora => "OMX.Nvidia.theora.decoder",
        _ => return None,
    };
    Some(name)
}

pub fn audio_decoder(stream: StreamType) -> Option<&'static str> {
    let name = match stream {
        StreamType::Mp2 => "OMX.Nvidia.mp2.decoder",
        StreamType::Mp3 => "OMX.Nvidia.mp3.decoder",
        StreamType::Wav => "OMX.Nvidia.wav.decoder",
        StreamType::Aac => "OMX.Nvidia.aac.decoder",
        StreamType::AacSbr => "OMX.Nvidia.eaacp.decoder",
        StreamType::Bsac => "OMX.Nvidia.bsac.decoder",
        StreamType::Wma => "OMX.Nvidia.wma.decoder",
        StreamType::WmaPro => "OMX.Nvidia.wmapro.decoder",
        StreamType::WmaLossless => "OMX.Nvidia.wmalossless.decoder",
        StreamType::AmrWb => "OMX.Nvidia.amrwb.decoder",
        StreamType::AmrNb => "OMX.Nvidia.amr.decoder",
        StreamType::Vorbis => "OMX.Nvidia.vorbis.decoder",
        _ => return None,
    };
    Some(name)
}
