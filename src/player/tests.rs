use super::*;
use crate::provider::params::Charset;
use crate::provider::sim::catalog::Kind;
use crate::provider::sim::source::SimVideo;
use crate::provider::sim::{SimComponent, SimProvider, SimSource};
use crate::error::ErrorCode;
use crate::provider::{ComponentDescriptor, ComponentFactory};

const CLIP: &str = "clip.mp4";

fn setup(source: SimSource) -> (Arc<SimProvider>, Arc<Framework>) {
    let provider = SimProvider::new();
    provider.add_source(CLIP, source);
    let fw = Framework::init(provider.clone()).unwrap();
    (provider, fw)
}

fn created(fw: &Arc<Framework>, kind: PlayerType) -> PlayerGraph {
    let player = PlayerGraph::init(fw.clone(), kind, CLIP, None).unwrap();
    player.create().unwrap();
    player
}

fn eos() -> ComponentEvent {
    ComponentEvent::BufferFlag {
        port: 0,
        end_of_stream: true,
    }
}

#[test]
fn test_create_reads_h264_aac() {
    let (provider, fw) = setup(SimSource::h264_aac(10_000));
    let player = created(&fw, PlayerType::Normal);

    let info = player.media_info();
    assert_eq!(info.stream_count, 2);
    assert_eq!(info.duration_ms, 10_000);
    let video = info.video.unwrap();
    assert_eq!((video.width, video.height), (1280, 720));
    assert_eq!(video.stream, StreamType::H264);
    let audio = info.audio.unwrap();
    assert_eq!((audio.sample_rate, audio.channels), (44100, 2));

    let graph = player.graph();
    let dec = graph.lookup_component(ids::VIDEO_DECODER).unwrap();
    assert_eq!(graph.component_info(dec).unwrap().name, "OMX.Nvidia.h264.decode");
    let dec = graph.lookup_component(ids::AUDIO_DECODER).unwrap();
    assert_eq!(graph.component_info(dec).unwrap().name, "OMX.Nvidia.aac.decoder");

    let reader = provider.instance(tables::READER).unwrap();
    assert_eq!(reader.port_enabled(0), Some(true));
    assert_eq!(reader.port_enabled(1), Some(true));
    assert_eq!(graph.state(), ComponentState::Idle);

    let rend = provider.instance(tables::VIDEO_RENDERER).unwrap();
    assert_eq!(
        rend.tunnel_peer(0),
        Some(("OMX.Nvidia.h264.decode".to_string(), 1))
    );
}

#[test]
fn test_audio_only_disables_video_port() {
    let (provider, fw) = setup(SimSource::audio_only(StreamType::Mp3, 3000));
    let player = created(&fw, PlayerType::Normal);

    let reader = provider.instance(tables::READER).unwrap();
    assert_eq!(reader.port_enabled(0), Some(false));
    assert_eq!(reader.port_enabled(1), Some(true));
    assert!(player.graph().lookup_component(ids::VIDEO_DECODER).is_none());

    let dec = provider.instance("OMX.Nvidia.mp3.decoder").unwrap();
    assert_eq!(
        dec.config(0, ConfigIndex::AudioOnlyHint),
        Some(Config::AudioOnlyHint(true))
    );
    let rend = provider.instance(tables::AUDIO_RENDERER).unwrap();
    assert_eq!(
        rend.config(0, ConfigIndex::DisableTimestampUpdates),
        Some(Config::DisableTimestampUpdates(true))
    );
}

#[test]
fn test_no_usable_stream() {
    let (provider, fw) = setup(SimSource::default());
    let player = PlayerGraph::init(fw.clone(), PlayerType::Normal, CLIP, None).unwrap();
    assert_eq!(player.create(), Err(GraphError::NoUsableStream));

    // extraction excludes audio, so an audio-only source has nothing left
    provider.add_source("song.mp3", SimSource::audio_only(StreamType::Mp3, 3000));
    let player =
        PlayerGraph::init(fw.clone(), PlayerType::FrameExtraction, "song.mp3", None).unwrap();
    assert_eq!(player.create(), Err(GraphError::NoUsableStream));
}

#[test]
fn test_unknown_codec_is_unusable() {
    let source = SimSource {
        video: Some(SimVideo {
            stream: StreamType::None,
            width: 640,
            height: 480,
            fps: 25,
            bitrate: 1_000_000,
        }),
        ..SimSource::default()
    };
    let (_provider, fw) = setup(source);
    let player = PlayerGraph::init(fw, PlayerType::Normal, CLIP, None).unwrap();
    assert_eq!(player.create(), Err(GraphError::NoUsableStream));
}

#[test]
fn test_empty_uri_rejected() {
    let (_provider, fw) = setup(SimSource::default());
    let err = PlayerGraph::init(fw, PlayerType::Normal, "", None).unwrap_err();
    assert!(matches!(err, GraphError::BadParameter(_)));
}

#[test]
fn test_user_agent_reaches_reader() {
    let (provider, fw) = setup(SimSource::h264_aac(1000));
    let player =
        PlayerGraph::init(fw, PlayerType::Metadata, CLIP, Some("castkit/1.0")).unwrap();
    player.create().unwrap();
    let reader = provider.instance(tables::READER).unwrap();
    assert_eq!(
        reader.param(0, ParamIndex::UserAgent),
        Some(Param::UserAgent("castkit/1.0".into()))
    );
    assert_eq!(
        reader.config(0, ConfigIndex::FileCacheSize),
        Some(Config::FileCacheSize(0))
    );
}

#[test]
fn test_seek_round_trip() {
    let (_provider, fw) = setup(SimSource::h264_aac(10_000));
    let player = created(&fw, PlayerType::Normal);

    for target in [0, 1000, 4321, 9000] {
        let landed = player.seek(target).unwrap();
        assert!((target - landed).abs() <= 34, "{} landed on {}", target, landed);
        let position = player.get_position();
        assert!(
            (landed..=landed + 5).contains(&position),
            "{} reported at {}",
            landed,
            position
        );
    }
}

#[test]
fn test_seek_while_playing_resumes() {
    let (_provider, fw) = setup(SimSource::h264_aac(10_000));
    let player = created(&fw, PlayerType::Normal);
    player.start_playback().unwrap();

    let landed = player.seek(2000).unwrap();
    assert!((1966..=2000).contains(&landed));
    assert_eq!(player.graph().state(), ComponentState::Executing);
    assert!(player.get_position() >= landed);
    assert!(!player.graph().is_at_end_of_stream());
}

#[test]
fn test_seek_far_past_the_end() {
    let (_provider, fw) = setup(SimSource::h264_aac(10_000));
    let player = created(&fw, PlayerType::Normal);

    let landed = player.seek(i64::MAX).unwrap();
    assert!((9_966..=10_000).contains(&landed), "{}", landed);
    player.start_playback().unwrap();
    let landed = player.seek(i64::MAX).unwrap();
    assert!((9_966..=10_000).contains(&landed), "{}", landed);
    player.stop().unwrap();
}

#[test]
fn test_refused_seek_forces_end_of_stream() {
    let (provider, fw) = setup(SimSource::h264_aac(10_000));
    let player = created(&fw, PlayerType::Normal);
    player.start_playback().unwrap();
    provider.fail_config(tables::READER, ConfigIndex::Position);

    let err = player.seek(2000).unwrap_err();
    assert!(matches!(err, GraphError::Undefined(_)), "{:?}", err);
    assert!(player.graph().is_at_end_of_stream());
    assert!(player.graph().wait_for_end_of_stream(0).is_ok());

    player.stop().unwrap();
    assert_eq!(player.graph().state(), ComponentState::Idle);
}

#[test]
fn test_seek_without_reader() {
    let (_provider, fw) = setup(SimSource::h264_aac(1000));
    let player = PlayerGraph::init(fw, PlayerType::Normal, CLIP, None).unwrap();
    assert!(matches!(player.seek(10), Err(GraphError::BadParameter(_))));
}

#[test]
fn test_pause_stop_cycle() {
    let (provider, fw) = setup(SimSource::h264_aac(10_000));
    let player = created(&fw, PlayerType::Normal);
    let graph = player.graph();

    player.start_playback().unwrap();
    assert_eq!(graph.state(), ComponentState::Executing);
    player.pause(true).unwrap();
    assert_eq!(graph.state(), ComponentState::Pause);
    player.pause(false).unwrap();
    assert_eq!(graph.state(), ComponentState::Executing);

    player.set_rate(2.0).unwrap();
    assert_eq!(graph.state(), ComponentState::Pause);
    let rend = provider.instance(tables::AUDIO_RENDERER).unwrap();
    assert_eq!(
        rend.config(0, ConfigIndex::TimeScale),
        Some(Config::TimeScale(2.0))
    );
    assert!(player.set_rate(f32::NAN).is_err());

    player.stop().unwrap();
    assert_eq!(graph.state(), ComponentState::Idle);
    assert!(graph.is_at_end_of_stream());

    // nothing to do once stopped
    player.stop().unwrap();
    player.pause(false).unwrap();
    assert_eq!(graph.state(), ComponentState::Idle);
}

#[test]
fn test_to_idle_rewinds_reader() {
    let (provider, fw) = setup(SimSource::h264_aac(10_000));
    let player = created(&fw, PlayerType::Normal);
    player.seek(5000).unwrap();
    player.start_playback().unwrap();

    player.to_idle().unwrap();
    assert_eq!(player.graph().state(), ComponentState::Idle);
    let reader = provider.instance(tables::READER).unwrap();
    assert_eq!(
        reader.config(0, ConfigIndex::Position),
        Some(Config::Position(0))
    );
}

#[test]
fn test_buffering_event_latched_once() {
    let (provider, fw) = setup(SimSource::h264_aac(1000));
    let player = created(&fw, PlayerType::Metadata);
    assert_eq!(player.has_buffering_event(), None);

    provider
        .instance(tables::READER)
        .unwrap()
        .emit(ComponentEvent::ForBuffering {
            need_pause: true,
            percent: 42,
        });
    assert_eq!(
        player.has_buffering_event(),
        Some(BufferingEvent {
            need_pause: true,
            percent: 42,
        })
    );
    assert_eq!(player.has_buffering_event(), None);
}

#[test]
fn test_end_of_stream_notified_once() {
    let (provider, fw) = setup(SimSource::h264_aac(1000));
    let player = created(&fw, PlayerType::Normal);
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    player.set_callback(Arc::new(move |n| sink.lock().unwrap().push(n)));

    provider.instance(tables::VIDEO_RENDERER).unwrap().emit(eos());
    assert!(seen.lock().unwrap().is_empty());
    provider.instance(tables::AUDIO_RENDERER).unwrap().emit(eos());
    provider
        .instance(tables::READER)
        .unwrap()
        .emit(ComponentEvent::StreamChange);

    assert_eq!(
        *seen.lock().unwrap(),
        vec![
            PlayerNotification::EndOfStream,
            PlayerNotification::StreamChanged
        ]
    );
    assert!(player.graph().wait_for_end_of_stream(0).is_ok());
}

#[test]
fn test_extract_frame() {
    let (provider, fw) = setup(SimSource::h264_aac(10_000));
    let player = created(&fw, PlayerType::FrameExtraction);
    assert!(player.graph().clock().is_none());
    assert!(player.graph().lookup_component(ids::AUDIO_DECODER).is_none());
    let reader = provider.instance(tables::READER).unwrap();
    assert_eq!(reader.port_enabled(1), Some(false));

    let frame = player.extract_frame(1000).unwrap();
    let len = 1280 * 720 * 3 / 2;
    assert_eq!(
        frame,
        FrameInfo {
            len,
            width: 1280,
            height: 720,
        }
    );

    let mut buf = vec![0u8; len];
    assert_eq!(player.get_frame(&mut buf).unwrap(), len);
    assert_eq!(buf[0], 0x10);
    assert_eq!(buf[len - 1], 0x80);
    assert!(matches!(
        player.get_frame(&mut []),
        Err(GraphError::BadParameter(_))
    ));
}

#[test]
fn test_extract_frame_prefers_thumbnail_time() {
    // 3 s in 100 ns units
    let ticks: u64 = 30_000_000;
    let source = SimSource::h264_aac(10_000).with_metadata(
        MetadataKind::ThumbnailSeekTime,
        Charset::U64,
        ticks.to_le_bytes().to_vec(),
    );
    let (provider, fw) = setup(source);
    let player = created(&fw, PlayerType::FrameExtraction);

    player.extract_frame(8000).unwrap();
    let reader = provider.instance(tables::READER).unwrap();
    let Some(Config::Position(us)) = reader.config(0, ConfigIndex::Position) else {
        panic!("reader was never positioned");
    };
    assert!((2_966_667..=3_000_000).contains(&us), "{}", us);
}

fn impatient_extractor(fw: Arc<Framework>) -> PlayerGraph {
    let config = GraphConfig {
        first_frame_timeout_ms: 50,
        player_state_timeout_ms: 100,
        recorder_state_timeout_ms: 100,
        teardown_timeout_ms: 100,
        ..GraphConfig::default()
    };
    let player =
        PlayerGraph::with_config(fw, PlayerType::FrameExtraction, CLIP, None, config).unwrap();
    player.create().unwrap();
    player
}

#[test]
fn test_extract_frame_fails_when_decoder_stalls() {
    let (provider, fw) = setup(SimSource::h264_aac(10_000));
    let player = impatient_extractor(fw);
    // a stalled decoder never lets the graph reach Executing
    provider.stall("OMX.Nvidia.h264.decode", true);
    let err = player.extract_frame(1000).unwrap_err();
    assert_eq!(err, GraphError::Timeout(100));
    assert_eq!(player.graph().get_error(), Some(GraphError::Timeout(100)));
}

#[test]
fn test_extract_frame_times_out_without_picture() {
    let (provider, fw) = setup(SimSource::h264_aac(10_000));
    let player = impatient_extractor(fw);
    // the decoder runs but nothing ever reaches the extractor
    provider.silence("OMX.Nvidia.h264.decode");

    let err = player.extract_frame(1000).unwrap_err();
    assert_eq!(err, GraphError::Timeout(50));
    assert_eq!(player.graph().state(), ComponentState::Idle);
    assert!(player.graph().get_error().is_none());
    assert!(matches!(
        player.get_frame(&mut [0u8; 16]),
        Err(GraphError::InvalidState(_))
    ));
}

#[test]
fn test_extract_frame_reopens_after_stream_error() {
    let (provider, fw) = setup(SimSource::h264_aac(10_000));
    let player = created(&fw, PlayerType::FrameExtraction);
    let reader = provider.instance(tables::READER).unwrap();
    reader.emit(ComponentEvent::Error(ErrorCode::StreamCorrupt));
    assert!(player.graph().get_error().is_some());

    // without reopening the source the stored error would fail the start
    let frame = player.extract_frame(2000).unwrap();
    assert_eq!((frame.width, frame.height), (1280, 720));
    assert!(player.graph().get_error().is_none());
    assert_eq!(player.media_info().duration_ms, 10_000);

    let Ok(Config::Position(us)) = ComponentHandle::get_config(reader.as_ref(), 0, ConfigIndex::Position)
    else {
        panic!("reader lost its position");
    };
    assert!((1_966_667..=2_000_000).contains(&us), "{}", us);
}

#[test]
fn test_extract_frame_past_the_end_rewinds() {
    // key frames every 4 s: asking for 9 s lands on 12 s
    let (provider, fw) = setup(SimSource::h264_aac(10_000).with_key_frames(4000));
    let player = created(&fw, PlayerType::FrameExtraction);

    player.extract_frame(9000).unwrap();
    let reader = provider.instance(tables::READER).unwrap();
    assert_eq!(
        ComponentHandle::get_config(reader.as_ref(), 0, ConfigIndex::Position).unwrap(),
        Config::Position(0)
    );
}

#[test]
fn test_extract_frame_needs_video() {
    let (_provider, fw) = setup(SimSource::audio_only(StreamType::Aac, 1000));
    let player = created(&fw, PlayerType::Normal);
    assert!(matches!(
        player.extract_frame(0),
        Err(GraphError::BadParameter(_))
    ));
}

#[test]
fn test_metadata_extraction() {
    let source = SimSource::h264_aac(1000)
        .with_metadata(MetadataKind::Title, Charset::Utf8, &b"Song\0"[..])
        .with_metadata(MetadataKind::Year, Charset::U32, 2001u32.to_le_bytes().to_vec());
    let (_provider, fw) = setup(source);
    let player = created(&fw, PlayerType::Metadata);

    assert_eq!(
        player.extract_metadata(MetadataKind::Title).unwrap(),
        Some(Metadata::Text("Song".into()))
    );
    assert_eq!(
        player.extract_metadata(MetadataKind::Year).unwrap(),
        Some(Metadata::Text("2001".into()))
    );
    assert_eq!(player.extract_metadata(MetadataKind::Album).unwrap(), None);
}

#[test]
fn test_oversized_metadata() {
    let source = SimSource::h264_aac(1000)
        .with_metadata(MetadataKind::Comment, Charset::Utf8, vec![b'a'; 20_000])
        .with_metadata(MetadataKind::CoverArt, Charset::Binary, vec![0xffu8; 20_000]);
    let (_provider, fw) = setup(source);
    let player = created(&fw, PlayerType::Metadata);

    assert!(matches!(
        player.extract_metadata(MetadataKind::Comment),
        Err(GraphError::InsufficientResources(_))
    ));
    match player.extract_metadata(MetadataKind::CoverArt).unwrap() {
        Some(Metadata::Binary(data)) => assert_eq!(data.len(), 20_000),
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn test_meta_switch_to_track() {
    let (provider, fw) = setup(SimSource::h264_aac(1000));
    provider.add_source("next.mp3", SimSource::audio_only(StreamType::Mp3, 4000));
    let player = created(&fw, PlayerType::Metadata);

    player.meta_switch_to_track("next.mp3").unwrap();
    let info = player.media_info();
    assert_eq!(info.duration_ms, 4000);
    assert!(info.video.is_none());
    assert_eq!(info.audio.unwrap().stream, StreamType::Mp3);
    assert_eq!(player.uri(), "next.mp3");

    let normal = created(&fw, PlayerType::Normal);
    assert!(matches!(
        normal.meta_switch_to_track("next.mp3"),
        Err(GraphError::BadParameter(_))
    ));
}

#[test]
fn test_renderer_controls() {
    let (provider, fw) = setup(SimSource::h264_aac(1000));
    let player = created(&fw, PlayerType::Normal);

    player.set_volume(40).unwrap();
    assert_eq!(player.get_volume().unwrap(), 40);
    assert!(matches!(
        player.set_volume(101),
        Err(GraphError::BadParameter(_))
    ));
    player.set_mute(true).unwrap();
    assert!(player.get_mute().unwrap());

    player.set_rotate_angle(90).unwrap();
    player.set_mirror(Mirror::Horizontal).unwrap();
    player.set_background_color(0xff00_00ff).unwrap();
    let rend = provider.instance(tables::VIDEO_RENDERER).unwrap();
    assert_eq!(
        rend.config(0, ConfigIndex::Rotation),
        Some(Config::Rotation(90))
    );
    assert_eq!(
        rend.config(0, ConfigIndex::Mirror),
        Some(Config::Mirror(Mirror::Horizontal))
    );
}

#[test]
fn test_controls_need_renderer() {
    let (_provider, fw) = setup(SimSource::audio_only(StreamType::Aac, 1000));
    let player = created(&fw, PlayerType::Normal);
    assert!(matches!(
        player.set_rotate_angle(90),
        Err(GraphError::BadParameter(_))
    ));
    assert!(matches!(
        player.set_video_scale(2.0),
        Err(GraphError::BadParameter(_))
    ));
    assert!(matches!(
        player.set_renderer_overlay(7),
        Err(GraphError::BadParameter(_))
    ));
    player.set_volume(10).unwrap();

    let metadata = created(&fw, PlayerType::Metadata);
    assert!(matches!(
        metadata.set_volume(10),
        Err(GraphError::BadParameter(_))
    ));
}

#[test]
fn test_external_audio_renderer() {
    let (provider, fw) = setup(SimSource::audio_only(StreamType::Aac, 1000));
    let shared = provider.shared();
    let factory: ComponentFactory = Arc::new(move |_| {
        let comp: Arc<dyn ComponentHandle> =
            SimComponent::spawn("OMX.Custom.sink", Kind::AudioRenderer, shared.clone())?;
        Ok(comp)
    });
    fw.register_component(ComponentDescriptor {
        name: "OMX.Custom.sink".into(),
        roles: vec!["audio_renderer.pcm".into()],
        factory,
    })
    .unwrap();

    let player = PlayerGraph::init(fw, PlayerType::Normal, CLIP, None).unwrap();
    player.use_external_audio_renderer("OMX.Custom.sink");
    player.create().unwrap();
    let graph = player.graph();
    let rend = graph.lookup_component(ids::AUDIO_RENDERER).unwrap();
    assert_eq!(graph.component_info(rend).unwrap().name, "OMX.Custom.sink");
}

#[test]
fn test_image_player() {
    let (provider, fw) = setup(SimSource::h264_aac(1000));
    let player = created(&fw, PlayerType::Image);
    let graph = player.graph();
    assert!(graph.clock().is_none());
    let dec = graph.lookup_component(ids::VIDEO_DECODER).unwrap();
    assert_eq!(graph.component_info(dec).unwrap().name, tables::JPEG_DECODER);
    assert!(provider.instance(tables::IMAGE_READER).is_some());
    assert!(graph.lookup_component(ids::AUDIO_DECODER).is_none());
}

#[test]
fn test_create_twice_rejected() {
    let (_provider, fw) = setup(SimSource::h264_aac(1000));
    let player = created(&fw, PlayerType::Metadata);
    assert!(matches!(player.create(), Err(GraphError::InvalidState(_))));
}
