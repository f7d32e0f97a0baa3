//! Builder that leaves the video encoder's input to the caller
//!
//! The encoder's input pool is allocated here and handed out, so frames
//! produced outside the graph can be submitted without a tunnel.

use log::{info, warn};

use crate::error::{GraphError, Result};
use crate::graph::{ComponentId, ComponentState};
use crate::provider::{BufferHeader, Param, ParamIndex};

use super::MAX_INPUT_BUFFERS;
use super::chains::Builder;

impl Builder<'_> {
    pub fn build_explicit(&self) -> Result<Vec<BufferHeader>> {
        let s = self.settings;
        if !s.video_enabled && !s.audio_enabled {
            return Err(GraphError::BadParameter("neither audio nor video enabled".into()));
        }

        let (writer, layout) = self.writer()?;

        let mut pool = Vec::new();
        if s.video_enabled {
            let video_port = layout.video_port.ok_or_else(|| {
                GraphError::BadParameter(format!("{} takes no video", layout.name))
            })?;
            let enc = self.video_encoder()?;
            self.graph.connect_tunneled(enc, 1, writer, video_port)?;
            pool = self.input_pool(enc)?;
        }

        if s.audio_enabled {
            let source = self.audio_source()?;
            self.audio_chain(source, 0, writer, &layout)?;
        }

        self.disable_unused_ports(writer)?;
        self.graph
            .transition_all_or_unload(ComponentState::Idle, self.state_timeout())?;
        info!(
            "RecorderGraph: explicit graph ready, {} input buffer(s)",
            pool.len()
        );
        Ok(pool)
    }

    /// Allocates the encoder's input buffers. Raw frames take two bytes
    /// per pixel unless the platform supplies its own buffers.
    fn input_pool(&self, enc: ComponentId) -> Result<Vec<BufferHeader>> {
        let v = &self.settings.video;
        let handle = self.graph.handle(enc)?;
        if v.use_platform_buffers {
            handle.set_parameter(0, Param::UsePlatformBuffers(true))?;
        } else {
            let mut def = crate::unpack!(
                handle.get_parameter(0, ParamIndex::PortDefinition)?,
                Param::PortDefinition
            )?;
            def.buffer_size = (v.width as usize) * (v.height as usize) * 2;
            handle.set_parameter(0, Param::PortDefinition(def))?;
        }

        let count = self.graph.allocate_buffers_for_port(enc, 0)?;
        if count > MAX_INPUT_BUFFERS {
            if let Err(e) = self.graph.free_buffers_for_port(enc, 0) {
                warn!("RecorderGraph: returning oversized pool: {}", e);
            }
            return Err(GraphError::InsufficientResources(format!(
                "encoder wants {} input buffers, at most {} are tracked",
                count, MAX_INPUT_BUFFERS
            )));
        }
        self.graph.get_allocated_buffers(enc, 0, count)
    }
}
