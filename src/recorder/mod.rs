//! Capture graphs: camera, microphone or files through encoders into a
//! writer
//!
//! A recorder collects its settings first, then builds either a fully
//! tunneled graph or one whose video encoder input is fed by the caller
//! through an explicit buffer pool. The recorder's own lifecycle runs
//! Initialized, Prepared, Started, Stopped.

mod chains;
mod explicit;
pub mod params;
mod tunneled;

use log::{debug, error, info, warn};
use std::sync::Arc;

use crate::config::GraphConfig;
use crate::error::{GraphError, Result};
use crate::framework::Framework;
use crate::graph::{BufferHandler, ComponentState, EventHandler, Graph};
use crate::provider::{BufferHeader, ComponentHandle, Config};

use chains::Builder;
pub use params::{
    AudioCodec, AudioParams, AudioPatch, ImageCodec, ImageParams, ImagePatch, InputType,
    OutputFormat, PreviewParams, PreviewPatch, Quality, VideoCodec, VideoParams, VideoPatch,
    WriterLayout,
};

/// Symbolic ids of the recorder's components
pub mod ids {
    pub const WRITER: &str = "AVWriter";
    pub const VIDEO_ENCODER: &str = "VideoEncoder";
    pub const AUDIO_CAPTURE: &str = "AudioCapture";
    pub const AUDIO_ENCODER: &str = "AudioEncoder";
    pub const FILE_READER: &str = "FileReader";
    pub const AUDIO_FILE_READER: &str = "AudioFileReader";
    pub const IMAGE_FILE_READER: &str = "ImageFileReader";
    pub const IMAGE_ENCODER: &str = "ImageEncoder";
    pub const PREVIEW: &str = "PreviewRenderer";
    pub const CAMERA: &str = "Camera";
}

/// Provider names of the sources and sinks the recorder builds with
pub mod names {
    pub const CAMERA: &str = "OMX.Nvidia.camera";
    pub const AUDIO_CAPTURER: &str = "OMX.Nvidia.audio.capturer";
    pub const VIDEO_FILE_READER: &str = "OMX.Nvidia.video.read.large";
    pub const AUDIO_FILE_READER: &str = "OMX.Nvidia.audio.read";
    pub const PREVIEW_RENDERER: &str = crate::player::tables::VIDEO_RENDERER;
}

/// Most input buffers an explicit graph hands out
pub const MAX_INPUT_BUFFERS: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecorderState {
    Initialized,
    Prepared,
    Started,
    Stopped,
}

/// Hooks installed on the writer (events) and the video encoder
/// (events and returned input buffers)
#[derive(Clone, Default)]
pub struct RecorderCallbacks {
    pub on_event: Option<EventHandler>,
    pub on_buffer_done: Option<BufferHandler>,
}

impl std::fmt::Debug for RecorderCallbacks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecorderCallbacks")
            .field("on_event", &self.on_event.is_some())
            .field("on_buffer_done", &self.on_buffer_done.is_some())
            .finish()
    }
}

/// Everything a build reads
#[derive(Debug, Clone)]
pub struct RecorderSettings {
    pub video: VideoParams,
    pub audio: AudioParams,
    pub image: ImageParams,
    pub preview: PreviewParams,
    pub video_enabled: bool,
    pub audio_enabled: bool,
    pub image_enabled: bool,
    pub preview_enabled: bool,
    pub output_file: Option<String>,
    pub output_format: OutputFormat,
    /// Bytes, 0 for no limit
    pub max_file_size: u64,
    /// Milliseconds, 0 for no limit
    pub max_duration_ms: u64,
    pub input: InputType,
    pub video_input_file: Option<String>,
    pub audio_input_file: Option<String>,
    pub image_input_file: Option<String>,
    /// Capturer to use instead of the built-in one
    pub audio_capturer: Option<String>,
}

impl Default for RecorderSettings {
    fn default() -> Self {
        RecorderSettings {
            video: VideoParams::default(),
            audio: AudioParams::default(),
            image: ImageParams::default(),
            preview: PreviewParams::default(),
            video_enabled: false,
            audio_enabled: false,
            image_enabled: false,
            preview_enabled: false,
            output_file: None,
            output_format: OutputFormat::Mp4,
            max_file_size: 0,
            max_duration_ms: 0,
            input: InputType::Capture,
            video_input_file: None,
            audio_input_file: None,
            image_input_file: None,
            audio_capturer: None,
        }
    }
}

pub struct RecorderGraph {
    framework: Arc<Framework>,
    config: GraphConfig,
    settings: RecorderSettings,
    callbacks: RecorderCallbacks,
    graph: Option<Graph>,
    tunneled: bool,
    state: RecorderState,
    input_buffers: Vec<BufferHeader>,
}

impl RecorderGraph {
    pub fn init(framework: Arc<Framework>) -> RecorderGraph {
        Self::with_config(framework, GraphConfig::default())
    }

    pub fn with_config(framework: Arc<Framework>, config: GraphConfig) -> RecorderGraph {
        RecorderGraph {
            framework,
            config,
            settings: RecorderSettings::default(),
            callbacks: RecorderCallbacks::default(),
            graph: None,
            tunneled: false,
            state: RecorderState::Initialized,
            input_buffers: Vec::new(),
        }
    }

    pub fn state(&self) -> RecorderState {
        self.state
    }

    pub fn settings(&self) -> &RecorderSettings {
        &self.settings
    }

    /// The graph of the current build, if one exists
    pub fn graph(&self) -> Option<&Graph> {
        self.graph.as_ref()
    }

    pub fn is_tunneled(&self) -> bool {
        self.tunneled
    }

    // ── Settings ───────────────────────────────────────────────────────

    pub fn set_video_params(&mut self, patch: &VideoPatch) {
        patch.apply(&mut self.settings.video);
        self.settings.video_enabled = true;
    }

    pub fn set_audio_params(&mut self, patch: &AudioPatch) {
        patch.apply(&mut self.settings.audio);
        self.settings.audio_enabled = true;
    }

    pub fn set_image_params(&mut self, patch: &ImagePatch) {
        patch.apply(&mut self.settings.image);
        self.settings.image_enabled = true;
    }

    pub fn set_preview_params(&mut self, patch: &PreviewPatch) {
        patch.apply(&mut self.settings.preview);
        self.settings.preview_enabled = true;
    }

    pub fn set_output_file(&mut self, path: &str) {
        self.settings.output_file = Some(path.to_string());
    }

    pub fn set_output_format(&mut self, format: OutputFormat) {
        self.settings.output_format = format;
    }

    /// Size limit in bytes, 0 removes it
    pub fn set_output_file_size(&mut self, bytes: u64) {
        self.settings.max_file_size = bytes;
    }

    /// Duration limit in milliseconds, 0 removes it
    pub fn set_max_duration(&mut self, ms: u64) {
        self.settings.max_duration_ms = ms;
    }

    pub fn set_input_type(&mut self, input: InputType) {
        self.settings.input = input;
    }

    pub fn set_video_input_file(&mut self, path: &str) {
        self.settings.video_input_file = Some(path.to_string());
    }

    pub fn set_audio_input_file(&mut self, path: &str) {
        self.settings.audio_input_file = Some(path.to_string());
    }

    pub fn set_image_input_file(&mut self, path: &str) {
        self.settings.image_input_file = Some(path.to_string());
    }

    /// Captures audio through `name` instead of the built-in capturer
    pub fn set_external_audio_source(&mut self, name: &str) {
        self.settings.audio_capturer = Some(name.to_string());
    }

    pub fn set_callbacks(&mut self, callbacks: RecorderCallbacks) {
        self.callbacks = callbacks;
    }

    // ── Building ───────────────────────────────────────────────────────

    /// Builds the pipeline and brings it to Idle. A tunneled rebuild
    /// reuses the camera and clock kept by the previous one.
    pub fn create(&mut self, all_tunneled: bool) -> Result<()> {
        if matches!(self.state, RecorderState::Prepared | RecorderState::Started) {
            return Err(GraphError::InvalidState(format!(
                "recorder is {:?}, release it first",
                self.state
            )));
        }
        if self.graph.is_some() {
            if self.tunneled && all_tunneled {
                self.release_components();
            } else {
                self.release();
            }
        }

        let graph = match self.graph.take() {
            Some(graph) => graph,
            None => Graph::with_config(self.framework.clone(), true, self.config.clone())?,
        };
        let builder = Builder {
            graph: &graph,
            settings: &self.settings,
            callbacks: &self.callbacks,
        };
        let built = if all_tunneled {
            builder.build_tunneled().map(|()| Vec::new())
        } else {
            builder.build_explicit()
        };

        match built {
            Ok(buffers) => {
                self.input_buffers = buffers;
                self.graph = Some(graph);
                self.tunneled = all_tunneled;
                self.state = RecorderState::Prepared;
                info!(
                    "RecorderGraph: prepared ({})",
                    if all_tunneled { "tunneled" } else { "explicit" }
                );
                Ok(())
            }
            Err(e) => {
                error!("RecorderGraph: create failed: {}", e);
                graph.teardown();
                self.state = RecorderState::Initialized;
                Err(e)
            }
        }
    }

    // ── Lifecycle ──────────────────────────────────────────────────────

    /// Moves the recorder along Prepared to Started to Stopped. Any other
    /// request leaves the recorder as it is and succeeds.
    pub fn change_state(&mut self, target: RecorderState) -> Result<()> {
        match (self.state, target) {
            (RecorderState::Prepared, RecorderState::Started) => self.start(),
            (RecorderState::Started, RecorderState::Stopped) => {
                self.stop();
                Ok(())
            }
            (from, to) => {
                debug!("RecorderGraph: {:?} -> {:?} ignored", from, to);
                Ok(())
            }
        }
    }

    fn start(&mut self) -> Result<()> {
        let started = self.run();
        match started {
            Ok(()) => {
                self.state = RecorderState::Started;
                info!("RecorderGraph: started");
                Ok(())
            }
            Err(e) => {
                error!("RecorderGraph: start failed: {}", e);
                if !self.tunneled {
                    self.release();
                }
                Err(e)
            }
        }
    }

    fn run(&self) -> Result<()> {
        let graph = self
            .graph
            .as_ref()
            .ok_or_else(|| GraphError::InvalidState("recorder has no graph".into()))?;
        graph.transition_all(ComponentState::Executing, self.config.recorder_state_timeout_ms)?;
        graph.start_clock(0)?;
        if let Some(capturer) = self.capturer() {
            capturer.set_config(0, Config::Capturing(true))?;
        }
        if self.settings.video_enabled || self.settings.image_enabled {
            if let Some(camera) = self.handle_of(ids::CAMERA) {
                camera.set_config(1, Config::Capturing(true))?;
            }
        }
        Ok(())
    }

    /// Stops capture and the clock. An explicit graph is released at
    /// once; a tunneled one goes back to Idle with the camera kept.
    fn stop(&mut self) {
        if let Some(capturer) = self.capturer()
            && let Err(e) = capturer.set_config(0, Config::Capturing(false))
        {
            warn!("RecorderGraph: stopping audio capture: {}", e);
        }
        if let Some(camera) = self.handle_of(ids::CAMERA) {
            if let Err(e) = camera.set_config(1, Config::Capturing(false)) {
                warn!("RecorderGraph: stopping camera capture: {}", e);
            }
            if let Err(e) = camera.set_config(0, Config::PreviewEnable(false)) {
                warn!("RecorderGraph: stopping preview: {}", e);
            }
        }

        if let Some(graph) = &self.graph {
            if let Err(e) = graph.stop_clock() {
                warn!("RecorderGraph: stopping clock: {}", e);
            }
            if self.tunneled
                && let Err(e) =
                    graph.transition_all(ComponentState::Idle, self.config.recorder_state_timeout_ms)
            {
                warn!("RecorderGraph: back to Idle: {}", e);
            }
        }
        if !self.tunneled {
            self.release();
        }
        self.state = RecorderState::Stopped;
        info!("RecorderGraph: stopped");
    }

    /// Audio capturer to switch on and off, only for live input
    fn capturer(&self) -> Option<Arc<dyn ComponentHandle>> {
        if self.settings.input != InputType::Capture || !self.settings.audio_enabled {
            return None;
        }
        self.handle_of(ids::AUDIO_CAPTURE)
    }

    fn handle_of(&self, label: &str) -> Option<Arc<dyn ComponentHandle>> {
        let graph = self.graph.as_ref()?;
        let id = graph.lookup_component(label)?;
        graph.handle(id).ok()
    }

    /// Tears the whole graph down and frees the explicit input pool.
    /// Safe to call any number of times; failures are logged and the
    /// teardown carries on.
    pub fn release(&mut self) {
        let Some(graph) = self.graph.take() else {
            self.state = RecorderState::Initialized;
            return;
        };
        if graph.state().is_active()
            && let Err(e) =
                graph.transition_all(ComponentState::Idle, self.config.teardown_timeout_ms)
        {
            warn!("RecorderGraph: release to Idle: {}", e);
        }
        if !self.input_buffers.is_empty()
            && let Some(enc) = graph.lookup_component(ids::VIDEO_ENCODER)
            && let Err(e) = graph.free_buffers_for_port(enc, 0)
        {
            warn!("RecorderGraph: freeing input pool: {}", e);
        }
        self.input_buffers.clear();
        graph.teardown();
        self.state = RecorderState::Initialized;
        info!("RecorderGraph: released");
    }

    /// Removes every component but the camera and the clock, so a
    /// tunneled graph can be rebuilt without reopening the sensor.
    pub fn release_components(&mut self) {
        let Some(graph) = &self.graph else {
            return;
        };
        let timeout = self.config.teardown_timeout_ms;
        graph.clear_error();
        if graph.state().is_active() {
            if let Err(e) = graph.stop_clock() {
                warn!("RecorderGraph: stopping clock: {}", e);
            }
            if let Err(e) = graph.transition_all(ComponentState::Idle, timeout) {
                warn!("RecorderGraph: release to Idle: {}", e);
            }
        }
        if graph.state() == ComponentState::Idle
            && let Err(e) = graph.transition_all(ComponentState::Loaded, timeout)
        {
            warn!("RecorderGraph: release to Loaded: {}", e);
        }

        let keep = [graph.clock(), graph.lookup_component(ids::CAMERA)];
        for id in graph.component_ids() {
            if keep.contains(&Some(id)) {
                continue;
            }
            if let Err(e) = untie(graph, id).and_then(|()| graph.remove_component(id)) {
                warn!("RecorderGraph: removing {}: {}", id, e);
            }
        }
        self.input_buffers.clear();
        self.state = RecorderState::Initialized;
        info!(
            "RecorderGraph: components released, {} kept",
            graph.component_count()
        );
    }

    /// Waits until the writer has seen end of stream
    pub fn wait_for_end_of_stream(&self, timeout_ms: u64) -> Result<()> {
        self.graph
            .as_ref()
            .ok_or_else(|| GraphError::InvalidState("recorder has no graph".into()))?
            .wait_for_end_of_stream(timeout_ms)
    }

    // ── Explicit input ─────────────────────────────────────────────────

    pub fn video_encoder_buffer_count(&self) -> usize {
        self.input_buffers.len()
    }

    pub fn video_encoder_buffer(&self, index: usize) -> Result<BufferHeader> {
        self.input_buffers.get(index).cloned().ok_or_else(|| {
            GraphError::BadParameter(format!(
                "input buffer {} of {}",
                index,
                self.input_buffers.len()
            ))
        })
    }

    /// Hands a filled input buffer to the video encoder
    pub fn empty_video_buffer(&self, buffer: BufferHeader) -> Result<()> {
        if self.tunneled {
            return Err(GraphError::InvalidState(
                "a tunneled recorder feeds its encoder itself".into(),
            ));
        }
        self.handle_of(ids::VIDEO_ENCODER)
            .ok_or_else(|| GraphError::ComponentNotFound(ids::VIDEO_ENCODER.into()))?
            .empty_this_buffer(buffer)
    }
}

/// Drops every tunnel of `id`, both sides, and its clock attachment
fn untie(graph: &Graph, id: crate::graph::ComponentId) -> Result<()> {
    let info = graph.component_info(id)?;
    for port in &info.ports {
        let Some(peer) = port.tunnel else {
            continue;
        };
        if Some(peer.component) == graph.clock() {
            graph.disconnect_component_from_clock(id)?;
        } else {
            graph.set_untunneled(id, port.index)?;
            graph.set_untunneled(peer.component, peer.port)?;
        }
    }
    Ok(())
}

impl Drop for RecorderGraph {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for RecorderGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecorderGraph")
            .field("state", &self.state)
            .field("tunneled", &self.tunneled)
            .field("graph", &self.graph)
            .field("input_buffers", &self.input_buffers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests;
