//! Buffer pools for ports driven by the caller instead of a tunnel

use log::{debug, warn};

use crate::error::{GraphError, Result};
use crate::provider::{BufferHeader, Param, ParamIndex};

use super::Graph;
use super::component::ComponentId;
use super::port::PortRef;

impl Graph {
    /// Allocates the port's minimum buffer count at its declared size and
    /// keeps them on the port. Returns how many were allocated.
    pub fn allocate_buffers_for_port(&self, id: ComponentId, port: u32) -> Result<usize> {
        let at = PortRef::new(id, port);
        let handle = {
            let inner = self.core.lock();
            let p = inner.port(at)?;
            if p.is_tunneled() {
                return Err(GraphError::InvalidState(format!(
                    "{} is tunneled, its buffers belong to the tunnel",
                    at
                )));
            }
            if !p.buffers.is_empty() {
                return Err(GraphError::InvalidState(format!(
                    "{} already holds {} buffer(s)",
                    at,
                    p.buffers.len()
                )));
            }
            inner.component(id)?.handle.clone()
        };

        let def = crate::unpack!(
            handle.get_parameter(port, ParamIndex::PortDefinition)?,
            Param::PortDefinition
        )?;
        let count = def.buffer_count_min.max(def.buffer_count_actual);
        if count == 0 || def.buffer_size == 0 {
            return Err(GraphError::BadParameter(format!(
                "{} declares {} buffer(s) of {} bytes",
                at, count, def.buffer_size
            )));
        }

        let mut buffers = Vec::with_capacity(count as usize);
        for _ in 0..count {
            match handle.allocate_buffer(port, def.buffer_size) {
                Ok(buffer) => buffers.push(buffer),
                Err(e) => {
                    warn!("Graph: allocation on {} failed after {}: {}", at, buffers.len(), e);
                    for buffer in buffers {
                        let _ = handle.free_buffer(port, buffer);
                    }
                    return Err(e);
                }
            }
        }

        let allocated = buffers.len();
        let mut inner = self.core.lock();
        let p = inner.port_mut(at)?;
        p.buffer_count_min = def.buffer_count_min;
        p.buffer_size = def.buffer_size;
        p.buffers = buffers;
        debug!("Graph: {} buffers of {} bytes on {}", allocated, def.buffer_size, at);
        Ok(allocated)
    }

    /// Copies of the buffers held on a port. `count` must match what was
    /// allocated.
    pub fn get_allocated_buffers(
        &self,
        id: ComponentId,
        port: u32,
        count: usize,
    ) -> Result<Vec<BufferHeader>> {
        let inner = self.core.lock();
        let p = inner.port(PortRef::new(id, port))?;
        if p.buffers.len() != count {
            return Err(GraphError::BadParameter(format!(
                "asked for {} buffer(s), port holds {}",
                count,
                p.buffers.len()
            )));
        }
        Ok(p.buffers.clone())
    }

    pub fn buffer_count(&self, id: ComponentId, port: u32) -> Result<usize> {
        Ok(self.core.lock().port(PortRef::new(id, port))?.buffers.len())
    }

    /// Returns every buffer of the port to its component. All buffers are
    /// attempted; the first failure is reported.
    pub fn free_buffers_for_port(&self, id: ComponentId, port: u32) -> Result<()> {
        let at = PortRef::new(id, port);
        let (handle, buffers) = {
            let mut inner = self.core.lock();
            let buffers = std::mem::take(&mut inner.port_mut(at)?.buffers);
            (inner.component(id)?.handle.clone(), buffers)
        };

        let mut first_error = None;
        for buffer in buffers {
            if let Err(e) = handle.free_buffer(port, buffer) {
                warn!("Graph: freeing buffer on {}: {}", at, e);
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}
