//! Pieces both recorder builders assemble: the writer, the encoders and
//! the audio source

use log::{debug, info, warn};

use crate::error::{GraphError, Result};
use crate::graph::{Capability, ComponentId, ComponentSpec, Graph};
use crate::provider::params::{
    AacParams, AmrParams, Bitrate, EncoderProperties, GopParams, InitialQp, Mirror, PcmParams,
    QpRange, Rect, to_q16,
};
use crate::provider::{ComponentHandle, Config, Param, ParamIndex, PortDefinition};

use super::params::{AudioCodec, TEMP_FILE_PATH, VideoCodec, WriterLayout, amr_band};
use super::{InputType, RecorderCallbacks, RecorderSettings, ids, names};

/// Assembles one recorder pipeline into a graph
pub(super) struct Builder<'a> {
    pub graph: &'a Graph,
    pub settings: &'a RecorderSettings,
    pub callbacks: &'a RecorderCallbacks,
}

impl Builder<'_> {
    pub fn state_timeout(&self) -> u64 {
        self.graph.config().recorder_state_timeout_ms
    }

    fn create(&self, name: &str, capability: Capability, label: &str) -> Result<ComponentId> {
        self.graph
            .create_component(&ComponentSpec::new(name, capability), label)
    }

    fn port_definition(handle: &dyn ComponentHandle, port: u32) -> Result<PortDefinition> {
        crate::unpack!(
            handle.get_parameter(port, ParamIndex::PortDefinition)?,
            Param::PortDefinition
        )
    }

    /// Sets the picture size (and optionally rate) a port works with
    pub fn set_picture(
        handle: &dyn ComponentHandle,
        port: u32,
        width: u32,
        height: u32,
        framerate_q16: Option<u32>,
    ) -> Result<()> {
        let mut def = Self::port_definition(handle, port)?;
        def.frame_width = width;
        def.frame_height = height;
        if let Some(q16) = framerate_q16 {
            def.framerate_q16 = q16;
        }
        handle.set_parameter(port, Param::PortDefinition(def))
    }

    /// Tunnels the component to the clock. Components without a time
    /// port have nothing to attach.
    pub fn attach_clock(&self, id: ComponentId) -> Result<()> {
        match self.graph.connect_component_to_clock(id) {
            Ok(()) | Err(GraphError::NotImplemented(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }

    // ── Writer ─────────────────────────────────────────────────────────

    pub fn writer(&self) -> Result<(ComponentId, WriterLayout)> {
        let s = self.settings;
        let file = s
            .output_file
            .as_deref()
            .filter(|f| !f.is_empty())
            .ok_or_else(|| GraphError::BadParameter("no output file".into()))?;
        let layout = WriterLayout::select(s.output_format, s.audio.codec);

        let id = self.create(layout.name, Capability::Writer, ids::WRITER)?;
        let writer = self.graph.handle(id)?;
        writer.set_parameter(0, Param::Filename(file.to_string()))?;
        if let Some(tag) = layout.format {
            writer.set_parameter(0, Param::OutputFormat(tag.to_string()))?;
        }
        if layout.is_muxer() {
            writer.set_parameter(0, Param::TempFilePath(TEMP_FILE_PATH.to_string()))?;
        }
        if s.max_file_size > 0 {
            writer.set_parameter(0, Param::FileSizeLimit(s.max_file_size))?;
        }
        if s.max_duration_ms > 0 {
            writer.set_parameter(0, Param::DurationLimit(s.max_duration_ms.saturating_mul(1000)))?;
        }
        if let Some(handler) = &self.callbacks.on_event {
            self.graph.set_event_handler(id, handler.clone())?;
        }
        self.graph.set_component_as_endpoint(id)?;

        info!("RecorderGraph: writing {} through {}", file, layout.name);
        Ok((id, layout))
    }

    // ── Video ──────────────────────────────────────────────────────────

    pub fn video_encoder(&self) -> Result<ComponentId> {
        let v = &self.settings.video;
        if v.width == 0 || v.height == 0 || v.frame_rate == 0 {
            return Err(GraphError::BadParameter(format!(
                "video {}x{} @ {} fps",
                v.width, v.height, v.frame_rate
            )));
        }
        let qp_range = match v.qp_range {
            Some(((min_i, max_i), (min_p, max_p))) if min_i > max_i || min_p > max_p => {
                return Err(GraphError::BadParameter(format!(
                    "QP range I {}..{} P {}..{}",
                    min_i, max_i, min_p, max_p
                )));
            }
            Some(((min_i, max_i), (min_p, max_p))) => Some(QpRange {
                min_i,
                max_i,
                min_p,
                max_p,
            }),
            None => None,
        };

        let id = self.create(v.codec.encoder(), Capability::Encoder, ids::VIDEO_ENCODER)?;
        let enc = self.graph.handle(id)?;
        let framerate = to_q16(v.frame_rate as f32);
        let bitrate = v.bitrate();

        Self::set_picture(enc.as_ref(), 0, v.width, v.height, Some(framerate))?;
        let mut out = Self::port_definition(enc.as_ref(), 1)?;
        out.frame_width = v.width;
        out.frame_height = v.height;
        out.bitrate = bitrate;
        enc.set_parameter(1, Param::PortDefinition(out))?;

        if let Some(level) = v.codec_level() {
            enc.set_parameter(1, Param::CodecLevel(level))?;
        }
        enc.set_parameter(
            1,
            Param::Gop(GopParams {
                p_frames: v.i_frame_interval.saturating_sub(1),
                b_frames: 0,
            }),
        )?;
        if v.codec == VideoCodec::H264 {
            enc.set_config(
                0,
                Config::Crop(Rect {
                    left: 0,
                    top: 0,
                    width: v.width,
                    height: v.height,
                }),
            )?;
        }
        enc.set_parameter(
            1,
            Param::EncoderProperties(EncoderProperties {
                application: v.application,
                resiliency: v.resiliency,
                quality: v.quality.q_factor(),
                stringent_bitrate: v.stringent_bitrate,
                temporal_tradeoff: v.temporal_tradeoff,
            }),
        )?;
        if let Some(range) = qp_range {
            enc.set_parameter(1, Param::QpRange(range))?;
        }
        if let Some((i, p)) = v.initial_qp {
            enc.set_parameter(1, Param::InitialQp(InitialQp { i, p }))?;
        }
        enc.set_parameter(1, Param::RateControl(v.rate_control))?;
        enc.set_config(
            1,
            Config::Bitrate(Bitrate {
                mode: v.rate_control,
                target: bitrate,
            }),
        )?;
        enc.set_config(0, Config::Framerate(framerate))?;
        if v.rotation != 0 {
            enc.set_config(0, Config::Rotation(v.rotation))?;
        }
        if v.mirror != Mirror::None {
            enc.set_config(0, Config::Mirror(v.mirror))?;
        }

        if let Some(handler) = &self.callbacks.on_event {
            self.graph.set_event_handler(id, handler.clone())?;
        }
        if let Some(handler) = &self.callbacks.on_buffer_done {
            self.graph.set_buffer_handler(id, handler.clone())?;
        }
        debug!(
            "RecorderGraph: {:?} {}x{} @ {} fps, {} bps",
            v.codec, v.width, v.height, v.frame_rate, bitrate
        );
        Ok(id)
    }

    // ── Audio ──────────────────────────────────────────────────────────

    pub fn audio_capturer(&self) -> Result<ComponentId> {
        let s = self.settings;
        let audio = s.audio.resolve();
        let name = s.audio_capturer.as_deref().unwrap_or(names::AUDIO_CAPTURER);
        let id = self.create(name, Capability::Source, ids::AUDIO_CAPTURE)?;
        let capturer = self.graph.handle(id)?;
        capturer.set_parameter(
            0,
            Param::Pcm(PcmParams {
                sample_rate: audio.sample_rate,
                channels: audio.channels,
            }),
        )?;
        capturer.set_parameter(0, Param::AudioSource(s.audio.source))?;
        self.attach_clock(id)?;
        Ok(id)
    }

    /// Reader of a raw elementary stream file
    pub fn file_reader(&self, name: &str, label: &str, file: Option<&str>) -> Result<ComponentId> {
        let file = file
            .filter(|f| !f.is_empty())
            .ok_or_else(|| GraphError::BadParameter(format!("{} needs an input file", label)))?;
        let id = self.create(name, Capability::Reader, label)?;
        self.graph
            .handle(id)?
            .set_parameter(0, Param::Filename(file.to_string()))?;
        Ok(id)
    }

    /// Capturer for live input, file reader otherwise
    pub fn audio_source(&self) -> Result<ComponentId> {
        match self.settings.input {
            InputType::Capture => self.audio_capturer(),
            InputType::File => self.file_reader(
                names::AUDIO_FILE_READER,
                ids::AUDIO_FILE_READER,
                self.settings.audio_input_file.as_deref(),
            ),
        }
    }

    /// Encoder between `source:port` and the writer's audio input. AMR
    /// picks the wideband encoder at 16 kHz.
    pub fn audio_chain(
        &self,
        source: ComponentId,
        source_port: u32,
        writer: ComponentId,
        layout: &WriterLayout,
    ) -> Result<ComponentId> {
        let audio = self.settings.audio.resolve();
        let writer_port = layout
            .audio_port
            .ok_or_else(|| GraphError::BadParameter(format!("{} takes no audio", layout.name)))?;
        let encoded = match audio.codec {
            AudioCodec::Aac => Param::Aac(AacParams {
                profile: audio.aac_profile,
                sample_rate: audio.sample_rate,
                channels: audio.channels,
                bitrate: audio.bitrate,
            }),
            AudioCodec::Amr => {
                let (band_mode, bitrate) = amr_band(audio.bitrate, audio.is_wideband());
                if bitrate != audio.bitrate {
                    warn!(
                        "RecorderGraph: no AMR band carries {} bps, keeping {} bps",
                        audio.bitrate, bitrate
                    );
                }
                Param::Amr(AmrParams {
                    wideband: audio.is_wideband(),
                    band_mode,
                    bitrate,
                    channels: audio.channels,
                    dtx: false,
                })
            }
            AudioCodec::Pcm => Param::Pcm(PcmParams {
                sample_rate: audio.sample_rate,
                channels: audio.channels,
            }),
        };

        let id = self.create(audio.encoder(), Capability::Encoder, ids::AUDIO_ENCODER)?;
        let enc = self.graph.handle(id)?;
        enc.set_parameter(
            0,
            Param::Pcm(PcmParams {
                sample_rate: audio.sample_rate,
                channels: audio.channels,
            }),
        )?;
        enc.set_parameter(1, encoded.clone())?;
        self.graph
            .handle(writer)?
            .set_parameter(writer_port, encoded)?;

        self.graph.connect_tunneled(source, source_port, id, 0)?;
        self.graph.connect_tunneled(id, 1, writer, writer_port)?;
        debug!(
            "RecorderGraph: {:?} {} Hz x{} @ {} bps into writer port {}",
            audio.codec, audio.sample_rate, audio.channels, audio.bitrate, writer_port
        );
        Ok(id)
    }

    /// Disables the ports of `id` nothing is connected to, so the
    /// component does not wait for buffers on them
    pub fn disable_unused_ports(&self, id: ComponentId) -> Result<()> {
        let info = self.graph.component_info(id)?;
        for port in info.ports.iter().filter(|p| p.enabled && !p.is_tunneled()) {
            debug!("RecorderGraph: disabling {} port {}", info.label, port.index);
            self.graph.enable_port(id, port.index, false)?;
        }
        Ok(())
    }
}
