//! Builder where every stream flows through tunnels, from the camera,
//! the capturer or file readers down to the writer

use log::{debug, info, warn};

use crate::error::{GraphError, Result};
use crate::graph::{Capability, ComponentId, ComponentSpec, ComponentState};
use crate::provider::params::{Rect, SensorMode};
use crate::provider::{Config, ConfigIndex, Param};

use super::chains::Builder;
use super::params::VideoCodec;
use super::{InputType, ids, names};

/// Length prefix the H.264 file reader splits NAL units on
const NAL_SIZE_BYTES: u32 = 4;

impl Builder<'_> {
    pub fn build_tunneled(&self) -> Result<()> {
        let s = self.settings;
        let capture = s.input == InputType::Capture;
        if !(s.video_enabled || s.audio_enabled || s.image_enabled || s.preview_enabled) {
            return Err(GraphError::BadParameter("nothing to record or preview".into()));
        }
        if capture && s.video_enabled && s.image_enabled {
            return Err(GraphError::BadParameter(
                "the camera capture port feeds either video or still images".into(),
            ));
        }

        let writer = if s.video_enabled || s.audio_enabled || s.image_enabled {
            Some(self.writer()?)
        } else {
            None
        };

        let camera = if capture && (s.video_enabled || s.image_enabled || s.preview_enabled) {
            Some(self.camera()?)
        } else {
            None
        };

        if s.preview_enabled {
            match camera {
                Some(camera) => self.preview(camera)?,
                None => warn!("RecorderGraph: preview needs camera input, skipped"),
            }
        }

        if let Some((writer, layout)) = &writer {
            if s.audio_enabled {
                let source = match s.input {
                    InputType::Capture => match self.audio_capturer() {
                        Ok(id) => Some(id),
                        Err(e) => {
                            warn!("RecorderGraph: no audio capture, recording without: {}", e);
                            None
                        }
                    },
                    InputType::File => Some(self.audio_source()?),
                };
                if let Some(source) = source {
                    self.audio_chain(source, 0, *writer, layout)?;
                }
            }

            if s.video_enabled {
                let video_port = layout.video_port.ok_or_else(|| {
                    GraphError::BadParameter(format!("{} takes no video", layout.name))
                })?;
                let (source, port) =
                    self.picture_source(camera, ids::FILE_READER, s.video_input_file.as_deref())?;
                if s.input == InputType::File && s.video.codec == VideoCodec::H264 {
                    self.graph
                        .handle(source)?
                        .set_config(0, Config::NalSize(NAL_SIZE_BYTES))?;
                }
                let enc = self.video_encoder()?;
                self.graph.connect_tunneled(source, port, enc, 0)?;
                self.graph.connect_tunneled(enc, 1, *writer, video_port)?;
            }

            if s.image_enabled {
                let image_port = layout.image_port.ok_or_else(|| {
                    GraphError::BadParameter(format!("{} takes no images", layout.name))
                })?;
                let (source, port) =
                    self.picture_source(camera, ids::IMAGE_FILE_READER, s.image_input_file.as_deref())?;
                let enc = self.image_encoder()?;
                self.graph.connect_tunneled(source, port, enc, 0)?;
                self.graph.connect_tunneled(enc, 1, *writer, image_port)?;
            }

            self.disable_unused_ports(*writer)?;
        }
        if let Some(camera) = camera {
            self.disable_unused_ports(camera)?;
        }

        self.graph
            .transition_all_or_unload(ComponentState::Idle, self.state_timeout())?;
        info!(
            "RecorderGraph: tunneled graph ready, {} component(s)",
            self.graph.component_count()
        );
        Ok(())
    }

    /// Camera capture port, or a raw stream reader for file input
    fn picture_source(
        &self,
        camera: Option<ComponentId>,
        reader_label: &str,
        file: Option<&str>,
    ) -> Result<(ComponentId, u32)> {
        match camera {
            Some(camera) => Ok((camera, 1)),
            None => Ok((
                self.file_reader(names::VIDEO_FILE_READER, reader_label, file)?,
                0,
            )),
        }
    }

    /// Creates the camera or reuses the one kept from an earlier build,
    /// then applies the current preview and capture settings
    fn camera(&self) -> Result<ComponentId> {
        let s = self.settings;
        let id = match self.graph.lookup_component(ids::CAMERA) {
            Some(id) => {
                debug!("RecorderGraph: reusing camera");
                let info = self.graph.component_info(id)?;
                for port in info.ports.iter().filter(|p| !p.enabled && !p.is_tunneled()) {
                    self.graph.enable_port(id, port.index, true)?;
                }
                id
            }
            None => {
                let id = self.graph.create_component(
                    &ComponentSpec::new(names::CAMERA, Capability::Source),
                    ids::CAMERA,
                )?;
                self.graph.handle(id)?.set_parameter(0, Param::SensorId(0))?;
                self.attach_clock(id)?;
                id
            }
        };
        let camera = self.graph.handle(id)?;

        let stereo = matches!(
            camera.get_config(0, ConfigIndex::StereoCapable),
            Ok(Config::StereoCapable(true))
        );
        debug!("RecorderGraph: camera stereo capable: {}", stereo);

        if s.preview_enabled {
            let p = &s.preview;
            Self::set_picture(camera.as_ref(), 0, p.width, p.height, None)?;
            camera.set_config(0, Config::Rotation(p.rotation))?;
        }

        let (width, height, rotation) = if s.video_enabled {
            (s.video.width, s.video.height, s.video.rotation)
        } else {
            (s.image.width, s.image.height, s.image.rotation)
        };
        if s.video_enabled || s.image_enabled {
            Self::set_picture(camera.as_ref(), 1, width, height, None)?;
            camera.set_config(1, Config::Rotation(rotation))?;
        }
        camera.set_parameter(
            1,
            Param::SensorMode(SensorMode {
                one_shot: s.image_enabled,
            }),
        )?;
        Ok(id)
    }

    /// Renderer fed from the camera's preview port
    fn preview(&self, camera: ComponentId) -> Result<()> {
        let p = &self.settings.preview;
        let id = self.graph.create_component(
            &ComponentSpec::new(names::PREVIEW_RENDERER, Capability::Renderer),
            ids::PREVIEW,
        )?;
        let renderer = self.graph.handle(id)?;
        renderer.set_config(
            0,
            Config::OutputPosition(Rect {
                left: p.x,
                top: p.y,
                width: p.width,
                height: p.height,
            }),
        )?;
        renderer.set_config(0, Config::KeepAspect(p.keep_aspect))?;
        self.graph.connect_tunneled(camera, 0, id, 0)?;
        self.attach_clock(id)?;
        self.graph
            .handle(camera)?
            .set_config(0, Config::PreviewEnable(true))?;
        debug!("RecorderGraph: preview {}x{} at ({}, {})", p.width, p.height, p.x, p.y);
        Ok(())
    }

    fn image_encoder(&self) -> Result<ComponentId> {
        let i = &self.settings.image;
        if i.width == 0 || i.height == 0 {
            return Err(GraphError::BadParameter(format!("image {}x{}", i.width, i.height)));
        }
        let id = self.graph.create_component(
            &ComponentSpec::new(i.codec.encoder(), Capability::Encoder),
            ids::IMAGE_ENCODER,
        )?;
        let enc = self.graph.handle(id)?;
        Self::set_picture(enc.as_ref(), 0, i.width, i.height, None)?;
        Self::set_picture(enc.as_ref(), 1, i.width, i.height, None)?;
        if let Some(handler) = &self.callbacks.on_event {
            self.graph.set_event_handler(id, handler.clone())?;
        }
        Ok(id)
    }
}
