use super::*;
use std::sync::atomic::{AtomicUsize, Ordering};

use bytes::Bytes;

use crate::provider::params::{AacProfile, AmrParams, CodecLevel, GopParams, SensorMode, to_q16};
use crate::provider::sim::SimProvider;
use crate::provider::{BufferDone, ComponentEvent, ConfigIndex, Param, ParamIndex};

fn setup() -> (Arc<SimProvider>, Arc<Framework>) {
    let provider = SimProvider::new();
    let fw = Framework::init(provider.clone()).unwrap();
    (provider, fw)
}

fn recorder(fw: &Arc<Framework>) -> RecorderGraph {
    let mut rec = RecorderGraph::init(fw.clone());
    rec.set_output_file("/tmp/out.mp4");
    rec
}

fn amr(sample_rate: u32, bitrate: u32) -> AudioPatch {
    AudioPatch {
        codec: Some(AudioCodec::Amr),
        sample_rate: Some(sample_rate),
        bitrate: Some(bitrate),
        ..Default::default()
    }
}

#[test]
fn test_amr_narrowband_band_mode() {
    let (provider, fw) = setup();
    let mut rec = recorder(&fw);
    rec.set_output_format(OutputFormat::RawAmr);
    rec.set_audio_params(&amr(8000, 12_200));
    rec.create(false).unwrap();
    assert_eq!(rec.state(), RecorderState::Prepared);

    let expected = Param::Amr(AmrParams {
        wideband: false,
        band_mode: 8,
        bitrate: 12_200,
        channels: 1,
        dtx: false,
    });
    let enc = provider.instance("OMX.Nvidia.amr.encoder").unwrap();
    assert_eq!(enc.param(1, ParamIndex::Amr), Some(expected.clone()));
    let writer = provider.instance("OMX.Nvidia.amr.write").unwrap();
    assert_eq!(writer.param(0, ParamIndex::Amr), Some(expected));
    assert_eq!(
        writer.param(0, ParamIndex::OutputFormat),
        Some(Param::OutputFormat("amr".into()))
    );

    let capturer = provider.instance(names::AUDIO_CAPTURER).unwrap();
    assert_eq!(
        capturer.tunnel_peer(0),
        Some(("OMX.Nvidia.amr.encoder".to_string(), 0))
    );
    assert_eq!(capturer.param(0, ParamIndex::AudioSource), Some(Param::AudioSource(1)));
    assert!(capturer.tunnel_peer(1).is_some());
    assert_eq!(rec.graph().unwrap().state(), ComponentState::Idle);
    assert_eq!(rec.video_encoder_buffer_count(), 0);
}

#[test]
fn test_amr_wideband_at_16k() {
    let (provider, fw) = setup();
    let mut rec = recorder(&fw);
    rec.set_output_format(OutputFormat::RawAmr);
    rec.set_audio_params(&AudioPatch {
        codec: Some(AudioCodec::Amr),
        sample_rate: Some(16000),
        ..Default::default()
    });
    rec.create(false).unwrap();

    let enc = provider.instance("OMX.Nvidia.amrwb.encoder").unwrap();
    match enc.param(1, ParamIndex::Amr) {
        Some(Param::Amr(p)) => {
            assert!(p.wideband);
            assert_eq!((p.band_mode, p.bitrate, p.channels), (17, 23_850, 1));
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn test_unknown_amr_bitrate_keeps_default_band() {
    let (provider, fw) = setup();
    let mut rec = recorder(&fw);
    rec.set_output_format(OutputFormat::RawAmr);
    rec.set_audio_params(&amr(8000, 12_345));
    rec.create(false).unwrap();
    assert_eq!(rec.state(), RecorderState::Prepared);

    let expected = Param::Amr(AmrParams {
        wideband: false,
        band_mode: 8,
        bitrate: 12_200,
        channels: 1,
        dtx: false,
    });
    let enc = provider.instance("OMX.Nvidia.amr.encoder").unwrap();
    assert_eq!(enc.param(1, ParamIndex::Amr), Some(expected.clone()));
    let writer = provider.instance("OMX.Nvidia.amr.write").unwrap();
    assert_eq!(writer.param(0, ParamIndex::Amr), Some(expected));
}

#[test]
fn test_pcm_goes_to_wav_writer() {
    let (provider, fw) = setup();
    let mut rec = recorder(&fw);
    rec.set_audio_params(&AudioPatch {
        codec: Some(AudioCodec::Pcm),
        ..Default::default()
    });
    rec.create(false).unwrap();

    let enc = provider.instance("OMX.Nvidia.wav.encoder").unwrap();
    assert_eq!(
        enc.tunnel_peer(1),
        Some(("OMX.Nvidia.wav.write".to_string(), 0))
    );
    assert!(provider.instance("OMX.Nvidia.mp4.write").is_none());
}

#[test]
fn test_explicit_pool_and_submission() {
    let (provider, fw) = setup();
    let returned = Arc::new(AtomicUsize::new(0));
    let counter = returned.clone();

    let mut rec = recorder(&fw);
    rec.set_video_params(&VideoPatch {
        width: Some(640),
        height: Some(480),
        ..Default::default()
    });
    rec.set_callbacks(RecorderCallbacks {
        on_event: None,
        on_buffer_done: Some(Arc::new(move |done| {
            if matches!(done, BufferDone::Emptied(_)) {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        })),
    });
    rec.create(false).unwrap();

    assert_eq!(rec.video_encoder_buffer_count(), 4);
    let first = rec.video_encoder_buffer(0).unwrap();
    assert_eq!(first.alloc_len, 640 * 480 * 2);
    assert!(rec.video_encoder_buffer(4).is_err());

    let enc = provider.instance("OMX.Nvidia.h264.encoder").unwrap();
    assert_eq!(
        enc.config(1, ConfigIndex::Bitrate),
        Some(Config::Bitrate(crate::provider::params::Bitrate {
            mode: crate::provider::params::RateControlMode::Variable,
            target: 4_000_000,
        }))
    );
    assert_eq!(
        enc.param(1, ParamIndex::Gop),
        Some(Param::Gop(GopParams {
            p_frames: 29,
            b_frames: 0
        }))
    );
    assert_eq!(
        enc.param(1, ParamIndex::CodecLevel),
        Some(Param::CodecLevel(CodecLevel::H264(51)))
    );
    assert_eq!(
        enc.config(0, ConfigIndex::Framerate),
        Some(Config::Framerate(to_q16(30.0)))
    );
    assert_eq!(
        enc.tunnel_peer(1),
        Some(("OMX.Nvidia.mp4.write".to_string(), 0))
    );
    // nothing feeds the muxer's audio input
    let writer = provider.instance("OMX.Nvidia.mp4.write").unwrap();
    assert_eq!(writer.port_enabled(1), Some(false));

    rec.change_state(RecorderState::Started).unwrap();
    assert_eq!(rec.state(), RecorderState::Started);
    let frame = first.filled(Bytes::from_static(b"frame"), 0).unwrap();
    rec.empty_video_buffer(frame).unwrap();
    assert_eq!(returned.load(Ordering::SeqCst), 1);

    rec.change_state(RecorderState::Stopped).unwrap();
    assert_eq!(rec.state(), RecorderState::Stopped);
    assert!(rec.graph().is_none());
    assert_eq!(rec.video_encoder_buffer_count(), 0);
    assert_eq!(enc.outstanding_buffers(), 0);
}

#[test]
fn test_platform_buffers_keep_encoder_size() {
    let (provider, fw) = setup();
    let mut rec = recorder(&fw);
    rec.set_video_params(&VideoPatch {
        use_platform_buffers: Some(true),
        ..Default::default()
    });
    rec.create(false).unwrap();

    assert_eq!(rec.video_encoder_buffer(0).unwrap().alloc_len, 1280 * 720 * 3 / 2);
    let enc = provider.instance("OMX.Nvidia.h264.encoder").unwrap();
    assert_eq!(
        enc.param(0, ParamIndex::UsePlatformBuffers),
        Some(Param::UsePlatformBuffers(true))
    );
}

#[test]
fn test_tunneled_camera_capture() {
    let (provider, fw) = setup();
    let mut rec = recorder(&fw);
    rec.set_video_params(&VideoPatch::default());
    rec.set_audio_params(&AudioPatch {
        aac_profile: Some(AacProfile::He),
        ..Default::default()
    });
    rec.set_preview_params(&PreviewPatch {
        width: Some(320),
        height: Some(240),
        ..Default::default()
    });
    rec.create(true).unwrap();
    assert!(rec.is_tunneled());

    let camera = provider.instance(names::CAMERA).unwrap();
    assert_eq!(
        camera.tunnel_peer(1),
        Some(("OMX.Nvidia.h264.encoder".to_string(), 0))
    );
    assert_eq!(
        camera.tunnel_peer(0),
        Some((names::PREVIEW_RENDERER.to_string(), 0))
    );
    assert_eq!(
        camera.config(0, ConfigIndex::PreviewEnable),
        Some(Config::PreviewEnable(true))
    );
    assert!(camera.tunnel_peer(2).is_some());
    let aac = provider.instance("OMX.Nvidia.aac.encoder").unwrap();
    assert_eq!(
        aac.tunnel_peer(1),
        Some(("OMX.Nvidia.mp4.write".to_string(), 1))
    );
    assert_eq!(rec.video_encoder_buffer_count(), 0);

    rec.change_state(RecorderState::Started).unwrap();
    let capturer = provider.instance(names::AUDIO_CAPTURER).unwrap();
    assert_eq!(
        capturer.config(0, ConfigIndex::Capturing),
        Some(Config::Capturing(true))
    );
    assert_eq!(
        camera.config(1, ConfigIndex::Capturing),
        Some(Config::Capturing(true))
    );
    assert!(matches!(
        rec.empty_video_buffer(crate::provider::BufferHeader::new(1, 0, 16)),
        Err(GraphError::InvalidState(_))
    ));

    rec.change_state(RecorderState::Stopped).unwrap();
    assert_eq!(rec.state(), RecorderState::Stopped);
    assert_eq!(
        capturer.config(0, ConfigIndex::Capturing),
        Some(Config::Capturing(false))
    );
    assert_eq!(
        camera.config(0, ConfigIndex::PreviewEnable),
        Some(Config::PreviewEnable(false))
    );
    assert_eq!(rec.graph().unwrap().state(), ComponentState::Idle);
}

#[test]
fn test_tunneled_rebuild_keeps_camera() {
    let (_provider, fw) = setup();
    let mut rec = recorder(&fw);
    rec.set_video_params(&VideoPatch::default());
    rec.create(true).unwrap();
    let graph = rec.graph().unwrap();
    let camera = graph.lookup_component(ids::CAMERA).unwrap();
    let clock = graph.clock().unwrap();

    rec.change_state(RecorderState::Started).unwrap();
    rec.change_state(RecorderState::Stopped).unwrap();

    rec.set_video_params(&VideoPatch {
        codec: Some(VideoCodec::Mpeg4),
        ..Default::default()
    });
    rec.create(true).unwrap();
    assert_eq!(rec.state(), RecorderState::Prepared);
    let graph = rec.graph().unwrap();
    assert_eq!(graph.lookup_component(ids::CAMERA), Some(camera));
    assert_eq!(graph.clock(), Some(clock));
    let enc = graph.lookup_component(ids::VIDEO_ENCODER).unwrap();
    assert_eq!(
        graph.component_info(enc).unwrap().name,
        "OMX.Nvidia.mp4.encoder"
    );
    assert_eq!(graph.state(), ComponentState::Idle);

    rec.release_components();
    let graph = rec.graph().unwrap();
    assert_eq!(graph.component_count(), 2);
    assert_eq!(rec.state(), RecorderState::Initialized);
}

#[test]
fn test_tunneled_file_input() {
    let (provider, fw) = setup();
    let mut rec = recorder(&fw);
    rec.set_input_type(InputType::File);
    rec.set_video_params(&VideoPatch::default());
    rec.set_audio_params(&AudioPatch::default());
    rec.set_video_input_file("/tmp/in.h264");
    rec.set_audio_input_file("/tmp/in.pcm");
    rec.create(true).unwrap();

    let reader = provider.instance(names::VIDEO_FILE_READER).unwrap();
    assert_eq!(
        reader.param(0, ParamIndex::Filename),
        Some(Param::Filename("/tmp/in.h264".into()))
    );
    assert_eq!(reader.config(0, ConfigIndex::NalSize), Some(Config::NalSize(4)));
    assert_eq!(
        reader.tunnel_peer(0),
        Some(("OMX.Nvidia.h264.encoder".to_string(), 0))
    );
    let audio = provider.instance(names::AUDIO_FILE_READER).unwrap();
    assert_eq!(
        audio.tunnel_peer(0),
        Some(("OMX.Nvidia.aac.encoder".to_string(), 0))
    );
    assert!(provider.instance(names::CAMERA).is_none());
    assert!(provider.instance(names::AUDIO_CAPTURER).is_none());

    rec.change_state(RecorderState::Started).unwrap();
    assert_eq!(rec.graph().unwrap().state(), ComponentState::Executing);
}

#[test]
fn test_file_input_needs_a_file() {
    let (_provider, fw) = setup();
    let mut rec = recorder(&fw);
    rec.set_input_type(InputType::File);
    rec.set_video_params(&VideoPatch::default());
    assert!(matches!(rec.create(true), Err(GraphError::BadParameter(_))));
    assert!(rec.graph().is_none());
}

#[test]
fn test_image_capture_to_jpeg() {
    let (provider, fw) = setup();
    let mut rec = recorder(&fw);
    rec.set_output_format(OutputFormat::Jpeg);
    rec.set_image_params(&ImagePatch {
        width: Some(640),
        height: Some(480),
        ..Default::default()
    });
    rec.create(true).unwrap();

    let camera = provider.instance(names::CAMERA).unwrap();
    assert_eq!(
        camera.tunnel_peer(1),
        Some(("OMX.Nvidia.jpeg.encoder".to_string(), 0))
    );
    assert_eq!(
        camera.param(1, ParamIndex::SensorMode),
        Some(Param::SensorMode(SensorMode { one_shot: true }))
    );
    assert_eq!(camera.port_enabled(0), Some(false));
    let enc = provider.instance("OMX.Nvidia.jpeg.encoder").unwrap();
    assert_eq!(
        enc.tunnel_peer(1),
        Some(("OMX.Nvidia.image.write".to_string(), 0))
    );
}

#[test]
fn test_camera_cannot_feed_video_and_image() {
    let (_provider, fw) = setup();
    let mut rec = recorder(&fw);
    rec.set_video_params(&VideoPatch::default());
    rec.set_image_params(&ImagePatch::default());
    assert!(matches!(rec.create(true), Err(GraphError::BadParameter(_))));
}

#[test]
fn test_missing_output_and_empty_request() {
    let (_provider, fw) = setup();
    let mut rec = RecorderGraph::init(fw.clone());
    rec.set_video_params(&VideoPatch::default());
    assert!(matches!(rec.create(false), Err(GraphError::BadParameter(_))));

    let mut rec = recorder(&fw);
    assert!(matches!(rec.create(false), Err(GraphError::BadParameter(_))));
    assert!(matches!(rec.create(true), Err(GraphError::BadParameter(_))));
}

#[test]
fn test_bad_qp_range_rejected() {
    let (_provider, fw) = setup();
    let mut rec = recorder(&fw);
    rec.set_video_params(&VideoPatch {
        qp_range: Some(((30, 10), (10, 40))),
        ..Default::default()
    });
    assert!(matches!(rec.create(false), Err(GraphError::BadParameter(_))));
}

#[test]
fn test_missing_capturer_tolerated_when_tunneled() {
    let (provider, fw) = setup();
    let mut rec = recorder(&fw);
    rec.set_video_params(&VideoPatch::default());
    rec.set_audio_params(&AudioPatch::default());
    rec.set_external_audio_source("OMX.Vendor.missing.capturer");
    rec.create(true).unwrap();
    assert!(provider.instance("OMX.Nvidia.aac.encoder").is_none());
    let writer = provider.instance("OMX.Nvidia.mp4.write").unwrap();
    assert_eq!(writer.port_enabled(1), Some(false));
    rec.release();

    let mut rec = recorder(&fw);
    rec.set_audio_params(&AudioPatch::default());
    rec.set_external_audio_source("OMX.Vendor.missing.capturer");
    assert!(rec.create(false).is_err());
}

#[test]
fn test_other_edges_are_noops() {
    let (_provider, fw) = setup();
    let mut rec = recorder(&fw);
    rec.change_state(RecorderState::Started).unwrap();
    assert_eq!(rec.state(), RecorderState::Initialized);

    rec.set_audio_params(&AudioPatch::default());
    rec.create(false).unwrap();
    rec.change_state(RecorderState::Stopped).unwrap();
    assert_eq!(rec.state(), RecorderState::Prepared);
    assert!(matches!(rec.create(false), Err(GraphError::InvalidState(_))));

    rec.release();
    rec.release();
    assert_eq!(rec.state(), RecorderState::Initialized);
    assert!(rec.graph().is_none());
}

#[test]
fn test_failed_start_releases_explicit_graph() {
    let (provider, fw) = setup();
    let config = GraphConfig {
        clock_retry_interval_ms: 1,
        clock_retry_limit: 2,
        ..GraphConfig::default()
    };
    let mut rec = RecorderGraph::with_config(fw, config);
    rec.set_output_file("/tmp/out.mp4");
    rec.set_audio_params(&AudioPatch::default());
    rec.create(false).unwrap();

    provider.clock_not_ready(100);
    assert!(matches!(
        rec.change_state(RecorderState::Started),
        Err(GraphError::Timeout(_))
    ));
    assert_eq!(rec.state(), RecorderState::Initialized);
    assert!(rec.graph().is_none());
}

#[test]
fn test_huge_duration_limit_saturates() {
    let (provider, fw) = setup();
    let mut rec = recorder(&fw);
    rec.set_audio_params(&AudioPatch::default());
    rec.set_max_duration(u64::MAX);
    rec.create(false).unwrap();

    let writer = provider.instance("OMX.Nvidia.mp4.write").unwrap();
    assert_eq!(
        writer.param(0, ParamIndex::DurationLimit),
        Some(Param::DurationLimit(u64::MAX))
    );
}

#[test]
fn test_writer_limits_events_and_eos() {
    let (provider, fw) = setup();
    let seen = Arc::new(AtomicUsize::new(0));
    let counter = seen.clone();

    let mut rec = recorder(&fw);
    rec.set_audio_params(&AudioPatch::default());
    rec.set_output_file_size(1_000_000);
    rec.set_max_duration(5000);
    rec.set_callbacks(RecorderCallbacks {
        on_event: Some(Arc::new(move |event| {
            if matches!(event, ComponentEvent::PortSettingsChanged(_)) {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        })),
        on_buffer_done: None,
    });
    rec.create(false).unwrap();

    let writer = provider.instance("OMX.Nvidia.mp4.write").unwrap();
    assert_eq!(
        writer.param(0, ParamIndex::FileSizeLimit),
        Some(Param::FileSizeLimit(1_000_000))
    );
    assert_eq!(
        writer.param(0, ParamIndex::DurationLimit),
        Some(Param::DurationLimit(5_000_000))
    );
    assert_eq!(
        writer.param(0, ParamIndex::TempFilePath),
        Some(Param::TempFilePath("/data/".into()))
    );
    assert_eq!(writer.port_enabled(0), Some(false));

    writer.emit(ComponentEvent::PortSettingsChanged(1));
    assert_eq!(seen.load(Ordering::SeqCst), 1);

    assert!(rec.wait_for_end_of_stream(0).is_err());
    writer.emit(ComponentEvent::BufferFlag {
        port: 1,
        end_of_stream: true,
    });
    rec.wait_for_end_of_stream(1000).unwrap();
}
