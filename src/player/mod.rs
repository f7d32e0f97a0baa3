//! Playback, probing and thumbnail graphs built on [`Graph`]
//!
//! A player owns one graph. `create` probes the source through the reader
//! and builds the decode chains the probe allows. Start, stop, pause and
//! seek compose several graph operations and are serialised by the
//! player's own control lock.

pub mod metadata;
pub mod tables;
pub mod types;

use log::{debug, error, info, warn};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use crate::config::GraphConfig;
use crate::error::{GraphError, Result};
use crate::framework::Framework;
use crate::graph::{Capability, ComponentId, ComponentSpec, ComponentState, Graph};
use crate::provider::params::{Mirror, Scale, StreamType};
use crate::provider::{
    ComponentEvent, ComponentHandle, Config, ConfigIndex, MetadataKind, Param, ParamIndex,
};
use crate::utils::Signal;

pub use types::{
    AudioInfo, BufferingEvent, FrameInfo, MediaInfo, Metadata, PlayerCallback,
    PlayerNotification, PlayerType, VideoInfo,
};

/// Symbolic ids of the player's components
pub mod ids {
    pub const READER: &str = "READER";
    pub const VIDEO_DECODER: &str = "VIDDEC";
    pub const VIDEO_RENDERER: &str = "VIDREND";
    pub const AUDIO_DECODER: &str = "AUDDEC";
    pub const AUDIO_RENDERER: &str = "AUDREND";
}

/// Highest volume the renderer accepts
pub const MAX_VOLUME: u32 = 100;

/// Player state reached from component callback threads
struct PlayerEvents {
    graph: Weak<Graph>,
    first_frame: Signal,
    buffering: Mutex<Option<BufferingEvent>>,
    callback: Mutex<Option<PlayerCallback>>,
}

impl PlayerEvents {
    fn notify(&self, notification: PlayerNotification) {
        let callback = self
            .callback
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        if let Some(callback) = callback {
            callback(notification);
        }
    }

    fn on_event(&self, event: &ComponentEvent) {
        match event {
            ComponentEvent::Error(_) | ComponentEvent::FirstFrameDisplayed => {
                self.first_frame.raise();
            }
            ComponentEvent::BufferFlag {
                end_of_stream: true,
                ..
            } => {
                if let Some(graph) = self.graph.upgrade()
                    && graph.is_at_end_of_stream()
                {
                    info!("PlayerGraph: end of stream");
                    self.first_frame.raise();
                    self.notify(PlayerNotification::EndOfStream);
                }
            }
            ComponentEvent::ForBuffering { need_pause, percent } => {
                *self.buffering.lock().unwrap_or_else(|e| e.into_inner()) = Some(BufferingEvent {
                    need_pause: *need_pause,
                    percent: *percent,
                });
                if let Some(graph) = self.graph.upgrade() {
                    graph.signal_end_of_stream_event();
                }
            }
            ComponentEvent::StreamChange => self.notify(PlayerNotification::StreamChanged),
            _ => {}
        }
    }
}

/// Values guarded by the control lock
#[derive(Debug, Default)]
struct Playback {
    start_time_ms: i64,
}

#[derive(Debug, Default)]
struct Probe {
    info: MediaInfo,
    video_decoder: Option<&'static str>,
    audio_decoder: Option<&'static str>,
}

pub struct PlayerGraph {
    graph: Arc<Graph>,
    kind: PlayerType,
    uri: Mutex<String>,
    user_agent: Option<String>,
    events: Arc<PlayerEvents>,
    control: Mutex<Playback>,
    info: Mutex<MediaInfo>,
    audio_renderer: Mutex<Option<String>>,
}

impl PlayerGraph {
    pub fn init(
        framework: Arc<Framework>,
        kind: PlayerType,
        uri: &str,
        user_agent: Option<&str>,
    ) -> Result<PlayerGraph> {
        Self::with_config(framework, kind, uri, user_agent, GraphConfig::default())
    }

    pub fn with_config(
        framework: Arc<Framework>,
        kind: PlayerType,
        uri: &str,
        user_agent: Option<&str>,
        config: GraphConfig,
    ) -> Result<PlayerGraph> {
        if uri.is_empty() {
            return Err(GraphError::BadParameter("empty source uri".into()));
        }
        let user_agent = user_agent
            .map(str::to_string)
            .or_else(|| config.user_agent.clone());
        if let Some(agent) = &user_agent {
            info!("PlayerGraph: user agent {}", agent);
        }

        let graph = Arc::new(Graph::with_config(framework, kind.uses_clock(), config)?);
        let events = Arc::new(PlayerEvents {
            graph: Arc::downgrade(&graph),
            first_frame: Signal::new(),
            buffering: Mutex::new(None),
            callback: Mutex::new(None),
        });
        let sink = events.clone();
        graph.set_graph_event_handler(Arc::new(move |_, event| sink.on_event(event)));

        info!("PlayerGraph: initialized ({})", kind.label());
        Ok(PlayerGraph {
            graph,
            kind,
            uri: Mutex::new(uri.to_string()),
            user_agent,
            events,
            control: Mutex::new(Playback::default()),
            info: Mutex::new(MediaInfo::default()),
            audio_renderer: Mutex::new(None),
        })
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn player_type(&self) -> PlayerType {
        self.kind
    }

    pub fn uri(&self) -> String {
        self.uri.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn media_info(&self) -> MediaInfo {
        self.lock_info().clone()
    }

    fn lock_info(&self) -> MutexGuard<'_, MediaInfo> {
        self.info.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_control(&self) -> MutexGuard<'_, Playback> {
        self.control.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn state_timeout(&self) -> u64 {
        self.graph.config().player_state_timeout_ms
    }

    pub fn set_callback(&self, callback: PlayerCallback) {
        *self
            .events
            .callback
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = Some(callback);
    }

    /// Renders audio through `name` instead of the built-in renderer.
    /// Takes effect at [`PlayerGraph::create`].
    pub fn use_external_audio_renderer(&self, name: &str) {
        *self
            .audio_renderer
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = Some(name.to_string());
    }

    /// Buffering report since the last call, consumed on read
    pub fn has_buffering_event(&self) -> Option<BufferingEvent> {
        self.events
            .buffering
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
    }

    // ── Building ───────────────────────────────────────────────────────

    /// Builds the pipeline for the player's type and brings it to Idle
    pub fn create(&self) -> Result<()> {
        if self.graph.lookup_component(ids::READER).is_some() {
            return Err(GraphError::InvalidState("player already created".into()));
        }
        let built = match self.kind {
            PlayerType::Normal | PlayerType::Image => self.build_playback(false),
            PlayerType::FrameExtraction => self.build_playback(true),
            PlayerType::Metadata => self.build_metadata(),
        };
        if let Err(e) = built {
            error!("PlayerGraph: create failed: {}", e);
            return Err(e);
        }

        self.graph
            .transition_all_or_unload(ComponentState::Idle, self.state_timeout())?;
        info!(
            "PlayerGraph: created ({}, {} component(s))",
            self.kind.label(),
            self.graph.component_count()
        );
        Ok(())
    }

    fn create_reader(&self, name: &str) -> Result<(ComponentId, Arc<dyn ComponentHandle>)> {
        let id = self
            .graph
            .create_component(&ComponentSpec::new(name, Capability::Reader), ids::READER)?;
        let reader = self.graph.handle(id)?;

        if let Some(agent) = &self.user_agent {
            reader.set_parameter(0, Param::UserAgent(agent.clone()))?;
        }
        let cache = match self.kind {
            PlayerType::Metadata | PlayerType::FrameExtraction => Some(0),
            _ => Some(self.graph.config().file_cache_size).filter(|size| *size > 0),
        };
        if let Some(size) = cache
            && let Err(e) = reader.set_config(0, Config::FileCacheSize(size))
        {
            debug!("PlayerGraph: reader keeps its cache size: {}", e);
        }

        reader.set_parameter(0, Param::Filename(self.uri()))?;
        Ok((id, reader))
    }

    fn probe(&self, reader: &dyn ComponentHandle, no_audio: bool) -> Probe {
        let mut probe = Probe::default();

        let Ok(count) = reader
            .get_parameter(0, ParamIndex::StreamCount)
            .and_then(|reply| crate::unpack!(reply, Param::StreamCount))
        else {
            warn!("PlayerGraph: reader reports no streams");
            return probe;
        };
        probe.info.stream_count = count;

        if let Ok(us) = reader
            .get_parameter(0, ParamIndex::Duration)
            .and_then(|reply| crate::unpack!(reply, Param::Duration))
        {
            probe.info.duration_ms = us / 1000;
        }

        let video = stream_on(reader, 0);
        if video != StreamType::None {
            probe.video_decoder = tables::video_decoder(video);
            if let Ok(def) = reader
                .get_parameter(0, ParamIndex::PortDefinition)
                .and_then(|reply| crate::unpack!(reply, Param::PortDefinition))
            {
                probe.info.video = Some(VideoInfo {
                    stream: video,
                    width: def.frame_width,
                    height: def.frame_height,
                    bitrate: def.bitrate,
                    framerate_q16: def.framerate_q16,
                });
            }
        }

        let audio = stream_on(reader, 1);
        if audio != StreamType::None {
            if !no_audio {
                probe.audio_decoder = tables::audio_decoder(audio);
            }
            if let Ok(a) = reader
                .get_parameter(1, ParamIndex::AudioStreamInfo)
                .and_then(|reply| crate::unpack!(reply, Param::AudioStreamInfo))
            {
                probe.info.audio = Some(AudioInfo {
                    stream: audio,
                    sample_rate: a.sample_rate,
                    channels: a.channels,
                    bitrate: a.bitrate,
                    bits_per_sample: a.bits_per_sample,
                });
            }
        }

        debug!(
            "PlayerGraph: probed {:?} / {:?}, {} ms",
            video, audio, probe.info.duration_ms
        );
        probe
    }

    fn build_metadata(&self) -> Result<()> {
        let (_, reader) = self.create_reader(tables::READER)?;
        let probe = self.probe(reader.as_ref(), false);
        *self.lock_info() = probe.info;
        Ok(())
    }

    fn build_playback(&self, extract: bool) -> Result<()> {
        let (reader_id, video, audio) = if self.kind == PlayerType::Image {
            let (id, _) = self.create_reader(tables::IMAGE_READER)?;
            (id, Some(tables::JPEG_DECODER), None)
        } else {
            let (id, reader) = self.create_reader(tables::READER)?;
            let probe = self.probe(reader.as_ref(), extract);
            *self.lock_info() = probe.info;
            (id, probe.video_decoder, probe.audio_decoder)
        };

        let reader_ports = self.graph.component_info(reader_id)?;
        if video.is_none() && reader_ports.port(0).is_some() {
            self.graph.enable_port(reader_id, 0, false)?;
        }
        if audio.is_none() && reader_ports.port(1).is_some() {
            self.graph.enable_port(reader_id, 1, false)?;
        }
        if video.is_none() && audio.is_none() {
            return Err(GraphError::NoUsableStream);
        }

        if let Some(decoder) = video {
            let renderer = if extract {
                tables::FRAME_EXTRACTOR
            } else {
                tables::VIDEO_RENDERER
            };
            let dec = self.graph.create_component(
                &ComponentSpec::new(decoder, Capability::Decoder),
                ids::VIDEO_DECODER,
            )?;
            let rend = self.graph.create_component(
                &ComponentSpec::new(renderer, Capability::Renderer),
                ids::VIDEO_RENDERER,
            )?;
            if !extract {
                self.attach_clock(rend)?;
            }
            self.graph.connect_tunneled(reader_id, 0, dec, 0)?;
            self.graph.connect_tunneled(dec, 1, rend, 0)?;
            self.graph.set_component_as_endpoint(rend)?;
        }

        if let Some(decoder) = audio {
            let renderer = self
                .audio_renderer
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .clone()
                .unwrap_or_else(|| tables::AUDIO_RENDERER.to_string());
            let dec = self.graph.create_component(
                &ComponentSpec::new(decoder, Capability::Decoder),
                ids::AUDIO_DECODER,
            )?;
            let rend = self.graph.create_component(
                &ComponentSpec::new(renderer, Capability::Renderer),
                ids::AUDIO_RENDERER,
            )?;
            if video.is_none() {
                self.set_audio_only(dec, rend)?;
            }
            self.attach_clock(rend)?;
            self.graph.connect_tunneled(reader_id, 1, dec, 0)?;
            self.graph.connect_tunneled(dec, 1, rend, 0)?;
            self.graph.set_component_as_endpoint(rend)?;
        }
        Ok(())
    }

    /// Ties a renderer to the clock when the graph has one. Components
    /// without a clock port are left alone.
    fn attach_clock(&self, id: ComponentId) -> Result<()> {
        if self.graph.clock().is_none() {
            return Ok(());
        }
        match self.graph.connect_component_to_clock(id) {
            Err(GraphError::NotImplemented(reason)) => {
                debug!("PlayerGraph: {}", reason);
                Ok(())
            }
            other => other,
        }
    }

    fn set_audio_only(&self, decoder: ComponentId, renderer: ComponentId) -> Result<()> {
        if let Err(e) = self
            .graph
            .handle(decoder)?
            .set_config(0, Config::AudioOnlyHint(true))
        {
            debug!("PlayerGraph: decoder ignores audio-only hint: {}", e);
        }
        if let Err(e) = self
            .graph
            .handle(renderer)?
            .set_config(0, Config::DisableTimestampUpdates(true))
        {
            debug!("PlayerGraph: renderer keeps timestamp updates: {}", e);
        }
        Ok(())
    }

    fn handle_of(&self, label: &str) -> Option<Arc<dyn ComponentHandle>> {
        self.graph
            .lookup_component(label)
            .and_then(|id| self.graph.handle(id).ok())
    }

    /// Handle of a component the operation cannot do without
    fn required(&self, label: &str) -> Result<Arc<dyn ComponentHandle>> {
        self.handle_of(label)
            .ok_or_else(|| GraphError::BadParameter(format!("no {} in this graph", label)))
    }

    // ── Playback control ───────────────────────────────────────────────

    pub fn start_playback(&self) -> Result<()> {
        let control = self.lock_control();
        if let Err(e) = self.graph.start_clock(control.start_time_ms) {
            warn!("PlayerGraph: clock start failed: {}", e);
        }
        if let Err(e) = self
            .graph
            .transition_all(ComponentState::Executing, self.state_timeout())
        {
            error!("PlayerGraph: start failed: {}", e);
            return Err(e);
        }
        info!("PlayerGraph: started at {} ms", control.start_time_ms);
        Ok(())
    }

    /// Forces end of stream, then brings a running graph back to Idle
    pub fn stop(&self) -> Result<()> {
        let _control = self.lock_control();
        self.graph.set_end_of_stream(true);
        self.graph.clear_error();

        if matches!(
            self.graph.state(),
            ComponentState::Executing | ComponentState::Pause
        ) {
            if let Err(e) = self.graph.stop_clock() {
                warn!("PlayerGraph: clock stop failed: {}", e);
            }
            let result = self
                .graph
                .transition_all(ComponentState::Idle, self.state_timeout());
            self.graph.clear_error();
            if let Err(e) = result {
                error!("PlayerGraph: stop failed: {}", e);
                return Err(e);
            }
        }
        info!("PlayerGraph: stopped");
        Ok(())
    }

    pub fn pause(&self, pause: bool) -> Result<()> {
        let _control = self.lock_control();
        let state = self.graph.state();
        let timeout = self.state_timeout();

        if pause {
            if matches!(state, ComponentState::Executing | ComponentState::Idle) {
                if let Err(e) = self.graph.pause_clock(true) {
                    warn!("PlayerGraph: clock pause failed: {}", e);
                }
                self.graph
                    .transition_all(ComponentState::Pause, timeout)
                    .inspect_err(|e| error!("PlayerGraph: pause failed: {}", e))?;
                info!("PlayerGraph: paused");
            }
        } else if state == ComponentState::Pause {
            let result = self.graph.transition_all(ComponentState::Executing, timeout);
            if let Err(e) = self.graph.pause_clock(false) {
                warn!("PlayerGraph: clock resume failed: {}", e);
            }
            result.inspect_err(|e| error!("PlayerGraph: resume failed: {}", e))?;
            info!("PlayerGraph: resumed");
        }
        Ok(())
    }

    /// Brings the graph to Idle and rewinds the reader. A failed
    /// transition drops everything to Loaded and is reported; a reader
    /// that refuses the rewind is not.
    pub fn to_idle(&self) -> Result<()> {
        let mut control = self.lock_control();
        let timeout = self.state_timeout();
        if let Err(e) = self.graph.transition_all_or_unload(ComponentState::Idle, timeout) {
            warn!("PlayerGraph: to Idle failed: {}", e);
            return Err(e);
        }
        if let Some(reader) = self.handle_of(ids::READER)
            && let Err(e) = reader.set_config(0, Config::Position(0))
        {
            debug!("PlayerGraph: reader rewind ignored: {}", e);
        }
        control.start_time_ms = 0;
        Ok(())
    }

    /// Moves playback to `time_ms` and returns where the reader actually
    /// landed. Before the first start this only records the start time.
    pub fn seek(&self, time_ms: i64) -> Result<i64> {
        let mut control = self.lock_control();
        let reader = self.required(ids::READER)?;
        let state = self.graph.state();
        let at_start = !matches!(state, ComponentState::Executing | ComponentState::Pause);
        let timeout = self.state_timeout();

        self.graph.set_end_of_stream(false);
        if !at_start {
            if let Err(e) = self.graph.transition_all(ComponentState::Pause, timeout) {
                warn!("PlayerGraph: pause before seek failed: {}", e);
            }
            if let Err(e) = self.graph.stop_clock() {
                warn!("PlayerGraph: clock stop before seek failed: {}", e);
            }
        }

        if let Err(e) = reader.set_config(0, Config::Position(time_ms.saturating_mul(1000))) {
            self.graph.set_end_of_stream(true);
            error!("PlayerGraph: seek to {} ms failed: {}", time_ms, e);
            return Err(e);
        }
        let landed_ms = reader
            .get_config(0, ConfigIndex::Position)
            .and_then(|reply| crate::unpack!(reply, Config::Position))
            .map(|us| us / 1000)
            .unwrap_or(time_ms);

        if at_start {
            control.start_time_ms = landed_ms;
            if let Err(e) = self
                .graph
                .start_clock(landed_ms)
                .and_then(|_| self.graph.stop_clock())
            {
                warn!("PlayerGraph: clock preset failed: {}", e);
            }
            debug!("PlayerGraph: start position {} ms", landed_ms);
            return Ok(landed_ms);
        }

        if let Err(e) = self
            .graph
            .flush_all_components(self.graph.config().flush_timeout_ms)
        {
            warn!("PlayerGraph: flush after seek failed: {}", e);
        }
        if let Err(e) = self.graph.start_clock(landed_ms) {
            warn!("PlayerGraph: clock restart failed: {}", e);
        }
        if state == ComponentState::Executing
            && let Err(e) = self.graph.transition_all(ComponentState::Executing, timeout)
        {
            warn!("PlayerGraph: resume after seek failed: {}", e);
        }
        info!("PlayerGraph: seeked to {} ms", landed_ms);
        Ok(landed_ms)
    }

    /// Pushes a new speed and leaves the graph paused. Playback resumes
    /// only on an explicit `pause(false)`.
    pub fn set_rate(&self, speed: f32) -> Result<()> {
        if !speed.is_finite() || speed < 0.0 {
            return Err(GraphError::BadParameter(format!("rate {}", speed)));
        }
        self.pause(true)?;
        if let Err(e) = self.graph.stop_clock() {
            warn!("PlayerGraph: clock stop failed: {}", e);
        }
        self.graph.set_rate(speed)?;
        self.pause(true)
    }

    pub fn get_duration(&self) -> i64 {
        self.lock_info().duration_ms
    }

    /// Current media time in ms
    pub fn get_position(&self) -> i64 {
        self.graph.get_clock_time()
    }

    // ── Metadata ───────────────────────────────────────────────────────

    /// Reads one metadata key from the reader. A key the source does not
    /// carry is `Ok(None)`.
    pub fn extract_metadata(&self, kind: MetadataKind) -> Result<Option<Metadata>> {
        let reader = self
            .handle_of(ids::READER)
            .ok_or_else(|| GraphError::Undefined("no reader".into()))?;
        let max_len = self.graph.config().metadata_max_len;

        let value = match reader.query_metadata(kind, 0) {
            Ok(value) => value,
            Err(GraphError::InsufficientBuffer { required }) => {
                if required == 0 || (kind != MetadataKind::CoverArt && required > max_len) {
                    return Err(GraphError::InsufficientResources(format!(
                        "{:?} needs {} bytes",
                        kind, required
                    )));
                }
                match reader.query_metadata(kind, required + 4) {
                    Ok(value) => value,
                    Err(e) => {
                        debug!("PlayerGraph: {:?} vanished between queries: {}", kind, e);
                        return Ok(None);
                    }
                }
            }
            Err(e) => {
                debug!("PlayerGraph: no {:?}: {}", kind, e);
                return Ok(None);
            }
        };
        Ok(metadata::normalise(kind, value))
    }

    /// Points a metadata player at another source and probes it again
    pub fn meta_switch_to_track(&self, uri: &str) -> Result<()> {
        if self.kind != PlayerType::Metadata {
            return Err(GraphError::BadParameter(format!(
                "{} player cannot switch tracks",
                self.kind.label()
            )));
        }
        self.switch_source(uri)
    }

    fn switch_source(&self, uri: &str) -> Result<()> {
        let reader = self
            .handle_of(ids::READER)
            .ok_or_else(|| GraphError::Undefined("no reader".into()))?;
        reader.set_parameter(0, Param::Filename(uri.to_string()))?;
        let probe = self.probe(reader.as_ref(), false);
        *self.lock_info() = probe.info;
        *self.uri.lock().unwrap_or_else(|e| e.into_inner()) = uri.to_string();
        info!("PlayerGraph: switched to {}", uri);
        Ok(())
    }

    /// Preferred thumbnail position declared by the source, in ms
    fn thumbnail_seek_time(&self) -> Option<i64> {
        let value = self.extract_metadata(MetadataKind::ThumbnailSeekTime).ok()??;
        let ticks: u64 = value.as_text()?.parse().ok()?;
        // 100 ns units
        i64::try_from(ticks / 10_000).ok()
    }

    // ── Frame extraction ───────────────────────────────────────────────

    /// First half of thumbnail extraction: decodes the frame at `time_ms`
    /// (or the source's preferred thumbnail time) and reports its size.
    /// A negative time selects the configured default.
    pub fn extract_frame(&self, time_ms: i64) -> Result<FrameInfo> {
        let renderer = self.required(ids::VIDEO_RENDERER)?;
        let decoder = self.required(ids::VIDEO_DECODER)?;

        let mut time_ms = self.thumbnail_seek_time().unwrap_or(time_ms);
        if time_ms < 0 {
            time_ms = self.graph.config().default_thumbnail_time_ms;
        }

        if let Err(e) = decoder.set_parameter(0, Param::LowResourceMode(true)) {
            debug!("PlayerGraph: decoder ignores low resource mode: {}", e);
        }
        if let Err(e) = self.to_idle() {
            warn!("PlayerGraph: extraction continues after: {}", e);
        }

        let duration = self.get_duration();
        if duration > time_ms {
            let landed = self.seek(time_ms).unwrap_or_else(|e| {
                warn!("PlayerGraph: thumbnail seek failed: {}", e);
                time_ms
            });
            // landing past the end clamps to the start, not to the end
            if landed >= duration
                && let Err(e) = self.seek(0)
            {
                warn!("PlayerGraph: rewind failed: {}", e);
            }
            if let Some(stored) = self.graph.get_error() {
                warn!("PlayerGraph: seek left {}, probing the source again", stored);
                self.graph.clear_error();
                self.graph.set_end_of_stream(false);
                let uri = self.uri();
                match self.switch_source(&uri) {
                    Ok(()) => {
                        if let Err(e) = self.seek(time_ms) {
                            warn!("PlayerGraph: retried seek failed: {}", e);
                        }
                    }
                    Err(e) => warn!("PlayerGraph: re-probe failed: {}", e),
                }
            }
        }

        self.events.first_frame.reset();
        self.start_playback()?;

        let timeout_ms = self.graph.config().first_frame_timeout_ms;
        let shown = self
            .events
            .first_frame
            .wait_timeout(Duration::from_millis(timeout_ms));
        if let Some(stored) = self.graph.get_error() {
            self.stop_quietly();
            return Err(stored);
        }
        if !shown {
            self.stop_quietly();
            return Err(GraphError::Timeout(timeout_ms));
        }

        let len = match renderer.capture_frame(0) {
            Err(GraphError::InsufficientBuffer { required }) if required > 0 => required,
            Err(e) => return Err(e),
            Ok(_) => {
                return Err(GraphError::Undefined(
                    "extractor returned a frame to a size query".into(),
                ));
            }
        };
        let def = crate::unpack!(
            renderer.get_parameter(0, ParamIndex::PortDefinition)?,
            Param::PortDefinition
        )?;
        info!(
            "PlayerGraph: frame at {} ms is {}x{}, {} bytes",
            time_ms, def.frame_width, def.frame_height, len
        );
        Ok(FrameInfo {
            len,
            width: def.frame_width,
            height: def.frame_height,
        })
    }

    /// Second half of thumbnail extraction: copies the decoded frame
    /// into `buf`, which must hold at least [`FrameInfo::len`] bytes
    pub fn get_frame(&self, buf: &mut [u8]) -> Result<usize> {
        let renderer = self.required(ids::VIDEO_RENDERER)?;
        if buf.is_empty() {
            return Err(GraphError::BadParameter("empty frame buffer".into()));
        }
        let frame = renderer.capture_frame(buf.len())?;
        let copied = frame.data.len().min(buf.len());
        buf[..copied].copy_from_slice(&frame.data[..copied]);
        Ok(copied)
    }

    fn stop_quietly(&self) {
        if let Err(e) = self.stop() {
            warn!("PlayerGraph: stop after failed extraction: {}", e);
        }
    }

    // ── Renderer controls ──────────────────────────────────────────────

    /// Linear volume, 0..=100
    pub fn set_volume(&self, volume: u32) -> Result<()> {
        if volume > MAX_VOLUME {
            return Err(GraphError::BadParameter(format!("volume {}", volume)));
        }
        self.required(ids::AUDIO_RENDERER)?
            .set_config(0, Config::Volume(volume))
    }

    pub fn get_volume(&self) -> Result<u32> {
        let reply = self
            .required(ids::AUDIO_RENDERER)?
            .get_config(0, ConfigIndex::Volume)?;
        crate::unpack!(reply, Config::Volume)
    }

    pub fn set_mute(&self, mute: bool) -> Result<()> {
        self.required(ids::AUDIO_RENDERER)?
            .set_config(0, Config::Mute(mute))
    }

    pub fn get_mute(&self) -> Result<bool> {
        let reply = self
            .required(ids::AUDIO_RENDERER)?
            .get_config(0, ConfigIndex::Mute)?;
        crate::unpack!(reply, Config::Mute)
    }

    pub fn set_rotate_angle(&self, degrees: i32) -> Result<()> {
        self.required(ids::VIDEO_RENDERER)?
            .set_config(0, Config::Rotation(degrees))
    }

    pub fn set_mirror(&self, mirror: Mirror) -> Result<()> {
        self.required(ids::VIDEO_RENDERER)?
            .set_config(0, Config::Mirror(mirror))
    }

    pub fn set_video_scale(&self, scale: f32) -> Result<()> {
        self.required(ids::VIDEO_RENDERER)?
            .set_config(0, Config::Scale(Scale { x: scale, y: scale }))
    }

    /// ARGB
    pub fn set_background_color(&self, argb: u32) -> Result<()> {
        self.required(ids::VIDEO_RENDERER)?
            .set_config(0, Config::BackgroundColor(argb))
    }

    pub fn set_renderer_overlay(&self, overlay: u64) -> Result<()> {
        self.required(ids::VIDEO_RENDERER)?
            .set_config(0, Config::ExternalOverlay(overlay))
    }

    pub fn teardown(&self) {
        self.graph.teardown();
    }

    pub fn deinit(self) {
        drop(self);
    }
}

impl Drop for PlayerGraph {
    fn drop(&mut self) {
        info!("PlayerGraph: deinitialized");
    }
}

impl std::fmt::Debug for PlayerGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlayerGraph")
            .field("type", &self.kind)
            .field("uri", &self.uri())
            .field("graph", &self.graph)
            .finish()
    }
}

fn stream_on(reader: &dyn ComponentHandle, port: u32) -> StreamType {
    reader
        .get_parameter(port, ParamIndex::StreamType)
        .and_then(|reply| crate::unpack!(reply, Param::StreamType))
        .unwrap_or(StreamType::None)
}

#[cfg(test)]
mod tests;
