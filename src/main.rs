use anyhow::{Context, Result, bail};
use clap::{Arg, ArgAction, ArgMatches, Command, value_parser};
use log::{info, warn};
use std::sync::Arc;
use std::time::Duration;
use std::{panic, process};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use bytes::Bytes;
use mediagraph::config::{app_name, version};
use mediagraph::graph::{GraphHealth, HealthMonitor};
use mediagraph::provider::params::StreamType;
use mediagraph::provider::sim::{SimProvider, SimSource};
use mediagraph::recorder::{
    AudioCodec, AudioPatch, OutputFormat, RecorderGraph, RecorderState, VideoPatch,
};
use mediagraph::{Framework, GraphConfig, PlayerGraph, PlayerType};

fn cli() -> Command {
    let duration = Arg::new("duration")
        .long("duration")
        .value_name("MS")
        .help("Length of the simulated source")
        .value_parser(value_parser!(i64))
        .default_value("10000");

    Command::new(app_name())
        .version(version())
        .author(env!("CARGO_PKG_AUTHORS"))
        .about(env!("CARGO_PKG_DESCRIPTION"))
        .subcommand_required(true)
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("JSON file overriding timeouts and limits")
                .global(true),
        )
        .subcommand(
            Command::new("probe")
                .about("Opens a source and prints what the reader declares")
                .arg(Arg::new("uri").required(true))
                .arg(duration.clone())
                .arg(
                    Arg::new("audio-only")
                        .long("audio-only")
                        .help("Simulate an MP3 source without video")
                        .action(ArgAction::SetTrue),
                ),
        )
        .subcommand(
            Command::new("play")
                .about("Plays a simulated source for a while, then stops")
                .arg(Arg::new("uri").required(true))
                .arg(duration)
                .arg(
                    Arg::new("seconds")
                        .short('s')
                        .long("seconds")
                        .value_parser(value_parser!(u64))
                        .default_value("2"),
                )
                .arg(
                    Arg::new("seek")
                        .long("seek")
                        .value_name("MS")
                        .value_parser(value_parser!(i64)),
                ),
        )
        .subcommand(
            Command::new("record")
                .about("Records from the simulated camera and microphone")
                .arg(Arg::new("output").required(true))
                .arg(
                    Arg::new("format")
                        .short('f')
                        .long("format")
                        .value_parser(["mp4", "3gp", "amr"])
                        .default_value("mp4"),
                )
                .arg(
                    Arg::new("audio-codec")
                        .long("audio-codec")
                        .value_parser(["aac", "amr", "pcm"])
                        .default_value("aac"),
                )
                .arg(
                    Arg::new("width")
                        .long("width")
                        .value_parser(value_parser!(u32))
                        .default_value("1280"),
                )
                .arg(
                    Arg::new("height")
                        .long("height")
                        .value_parser(value_parser!(u32))
                        .default_value("720"),
                )
                .arg(
                    Arg::new("no-video")
                        .long("no-video")
                        .action(ArgAction::SetTrue),
                )
                .arg(
                    Arg::new("no-audio")
                        .long("no-audio")
                        .action(ArgAction::SetTrue),
                )
                .arg(
                    Arg::new("tunneled")
                        .short('t')
                        .long("tunneled")
                        .help("Feed the encoder from the camera instead of caller buffers")
                        .action(ArgAction::SetTrue),
                )
                .arg(
                    Arg::new("seconds")
                        .short('s')
                        .long("seconds")
                        .value_parser(value_parser!(u64))
                        .default_value("2"),
                ),
        )
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    // kill the process as soon as a component thread panics
    let orig_hook = panic::take_hook();
    panic::set_hook(Box::new(move |panic_info| {
        orig_hook(panic_info);
        process::exit(105);
    }));

    let matches = cli().get_matches();
    let config = match matches.get_one::<String>("config") {
        Some(path) => GraphConfig::from_json_file(path)
            .with_context(|| format!("loading config from {}", path))?,
        None => GraphConfig::default(),
    };

    let provider = SimProvider::new();
    let framework = Framework::init(provider.clone()).context("loading the component provider")?;

    match matches.subcommand() {
        Some(("probe", sub)) => probe(&provider, &framework, config, sub)?,
        Some(("play", sub)) => play(&provider, &framework, config, sub)?,
        Some(("record", sub)) => record(&framework, config, sub)?,
        Some((other, _)) => bail!("unknown command {}", other),
        None => bail!("no command given"),
    }

    framework.deinit().context("unloading the component provider")?;
    Ok(())
}

fn register_source(provider: &SimProvider, sub: &ArgMatches) -> Result<String> {
    let uri = sub
        .get_one::<String>("uri")
        .context("missing uri")?
        .clone();
    let duration = sub.get_one::<i64>("duration").copied().unwrap_or(10_000);
    let audio_only = sub.try_get_one::<bool>("audio-only").ok().flatten().copied().unwrap_or(false);
    let source = if audio_only {
        SimSource::audio_only(StreamType::Mp3, duration)
    } else {
        SimSource::h264_aac(duration)
    };
    provider.add_source(uri.clone(), source);
    Ok(uri)
}

fn probe(
    provider: &SimProvider,
    framework: &Arc<Framework>,
    config: GraphConfig,
    sub: &ArgMatches,
) -> Result<()> {
    let uri = register_source(provider, sub)?;
    let player = PlayerGraph::with_config(framework.clone(), PlayerType::Metadata, &uri, None, config)?;
    player.create().with_context(|| format!("probing {}", uri))?;
    println!("{}", serde_json::to_string_pretty(&player.media_info())?);
    player.deinit();
    Ok(())
}

/// Logs health alerts of a graph until cancelled
fn spawn_monitor(
    runtime: &tokio::runtime::Runtime,
    health: Arc<GraphHealth>,
    cancel: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    let (tx, mut rx) = mpsc::channel(16);
    let monitor = HealthMonitor::new(health, tx).with_check_interval(Duration::from_millis(500));
    // the sender goes away with the monitor, which ends the report loop
    runtime.spawn(async move { monitor.run(cancel).await });
    runtime.spawn(async move {
        while let Some(alert) = rx.recv().await {
            warn!("Health: {}", alert);
        }
    })
}

fn play(
    provider: &SimProvider,
    framework: &Arc<Framework>,
    config: GraphConfig,
    sub: &ArgMatches,
) -> Result<()> {
    let uri = register_source(provider, sub)?;
    let seconds = sub.get_one::<u64>("seconds").copied().unwrap_or(2);

    let player = PlayerGraph::with_config(framework.clone(), PlayerType::Normal, &uri, None, config)?;
    player.create().with_context(|| format!("building playback of {}", uri))?;
    info!("{}", serde_json::to_string(&player.media_info())?);

    let runtime = tokio::runtime::Runtime::new()?;
    let cancel = CancellationToken::new();
    let monitor = spawn_monitor(&runtime, player.graph().health(), cancel.clone());

    if let Some(ms) = sub.get_one::<i64>("seek") {
        let landed = player.seek(*ms)?;
        info!("Seeked to {} ms, landed at {} ms", ms, landed);
    }
    player.start_playback()?;
    std::thread::sleep(Duration::from_secs(seconds));
    info!(
        "Position {} ms of {} ms",
        player.get_position(),
        player.get_duration()
    );
    player.stop()?;

    cancel.cancel();
    runtime.block_on(monitor)?;
    println!("{}", player.graph().health().summary());
    player.deinit();
    Ok(())
}

fn record(framework: &Arc<Framework>, config: GraphConfig, sub: &ArgMatches) -> Result<()> {
    let output = sub.get_one::<String>("output").context("missing output")?;
    let seconds = sub.get_one::<u64>("seconds").copied().unwrap_or(2);
    let tunneled = sub.get_flag("tunneled");

    let mut recorder = RecorderGraph::with_config(framework.clone(), config);
    recorder.set_output_file(output);
    recorder.set_output_format(match sub.get_one::<String>("format").map(String::as_str) {
        Some("3gp") => OutputFormat::ThreeGpp,
        Some("amr") => OutputFormat::RawAmr,
        _ => OutputFormat::Mp4,
    });
    if !sub.get_flag("no-video") {
        recorder.set_video_params(&VideoPatch {
            width: sub.get_one::<u32>("width").copied(),
            height: sub.get_one::<u32>("height").copied(),
            ..Default::default()
        });
    }
    if !sub.get_flag("no-audio") {
        let codec = match sub.get_one::<String>("audio-codec").map(String::as_str) {
            Some("amr") => AudioCodec::Amr,
            Some("pcm") => AudioCodec::Pcm,
            _ => AudioCodec::Aac,
        };
        recorder.set_audio_params(&AudioPatch {
            codec: Some(codec),
            ..Default::default()
        });
    }

    recorder.create(tunneled).context("building the recorder")?;
    recorder.change_state(RecorderState::Started)?;

    let frames = seconds * 30;
    let count = recorder.video_encoder_buffer_count();
    if count > 0 {
        for n in 0..frames {
            let buffer = recorder.video_encoder_buffer(n as usize % count)?;
            let frame = Bytes::from(vec![0x80u8; buffer.alloc_len]);
            recorder.empty_video_buffer(buffer.filled(frame, (n * 33_333) as i64)?)?;
            std::thread::sleep(Duration::from_millis(33));
        }
        info!("Submitted {} frame(s) through {} buffer(s)", frames, count);
    } else {
        std::thread::sleep(Duration::from_secs(seconds));
    }

    recorder.change_state(RecorderState::Stopped)?;
    recorder.release();
    println!("Recorded {}", output);
    Ok(())
}
