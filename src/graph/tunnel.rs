//! Tunnels, port enable/disable and clock attachment

use log::{debug, info, warn};
use std::sync::Arc;

use crate::error::{GraphError, Result};
use crate::provider::{
    BufferSupplier, Command, ComponentHandle, Direction, Param, ParamIndex, PortSelector,
    TunnelPeer,
};

use super::component::ComponentId;
use super::port::{PortRef, domains_compatible};
use super::{Graph, deadline_after};

impl Graph {
    /// Tunnels output `port_a` of `a` into input `port_b` of `b`. On any
    /// negotiation failure both ports are left untunneled.
    pub fn connect_tunneled(
        &self,
        a: ComponentId,
        port_a: u32,
        b: ComponentId,
        port_b: u32,
    ) -> Result<()> {
        let out_ref = PortRef::new(a, port_a);
        let in_ref = PortRef::new(b, port_b);

        let (out_handle, in_handle) = {
            let inner = self.core.lock();
            let out = inner.port(out_ref)?;
            let inp = inner.port(in_ref)?;
            if out.direction != Direction::Output {
                return Err(GraphError::PortMismatch(format!("{} is not an output", out_ref)));
            }
            if inp.direction != Direction::Input {
                return Err(GraphError::PortMismatch(format!("{} is not an input", in_ref)));
            }
            if !domains_compatible(out.domain, inp.domain) {
                return Err(GraphError::PortMismatch(format!(
                    "{} carries {:?}, {} carries {:?}",
                    out_ref, out.domain, in_ref, inp.domain
                )));
            }
            if out.is_tunneled() || inp.is_tunneled() {
                return Err(GraphError::InvalidState(format!(
                    "{} or {} is already tunneled",
                    out_ref, in_ref
                )));
            }
            (
                inner.component(a)?.handle.clone(),
                inner.component(b)?.handle.clone(),
            )
        };

        let negotiated = self.framework.provider().setup_tunnel(
            Some(TunnelPeer {
                handle: out_handle.clone(),
                port: port_a,
            }),
            Some(TunnelPeer {
                handle: in_handle.clone(),
                port: port_b,
            }),
        );
        if let Err(e) = negotiated {
            warn!("Graph: tunnel {} -> {} refused: {}", out_ref, in_ref, e);
            if let Err(undo) = out_handle.tunnel_request(port_a, None) {
                warn!("Graph: reverting tunnel on {}: {}", out_ref, undo);
            }
            if let Err(undo) = in_handle.tunnel_request(port_b, None) {
                warn!("Graph: reverting tunnel on {}: {}", in_ref, undo);
            }
            return Err(e);
        }

        let supplier = out_handle
            .get_parameter(port_a, ParamIndex::BufferSupplier)
            .ok()
            .and_then(|reply| match reply {
                Param::BufferSupplier(s) => Some(s),
                _ => None,
            })
            .unwrap_or(BufferSupplier::Unspecified);

        let mut inner = self.core.lock();
        for (at, peer) in [(out_ref, in_ref), (in_ref, out_ref)] {
            let port = inner.port_mut(at)?;
            port.tunnel = Some(peer);
            port.supplier = supplier;
        }
        debug!("Graph: tunneled {} -> {} ({:?} supplies)", out_ref, in_ref, supplier);
        Ok(())
    }

    /// Drops this side of a tunnel. The peer keeps its reference until it
    /// is untunneled too; calling this on an untunneled port does nothing.
    pub fn set_untunneled(&self, id: ComponentId, port: u32) -> Result<()> {
        let at = PortRef::new(id, port);
        let handle = {
            let inner = self.core.lock();
            if !inner.port(at)?.is_tunneled() {
                return Ok(());
            }
            inner.component(id)?.handle.clone()
        };

        self.framework
            .provider()
            .setup_tunnel(Some(TunnelPeer { handle, port }), None)?;

        let mut inner = self.core.lock();
        let p = inner.port_mut(at)?;
        p.tunnel = None;
        p.supplier = BufferSupplier::Unspecified;
        Ok(())
    }

    /// Enables or disables one untunneled port and waits for confirmation
    pub fn enable_port(&self, id: ComponentId, port: u32, enable: bool) -> Result<()> {
        let at = PortRef::new(id, port);
        let handle = {
            let inner = self.core.lock();
            let p = inner.port(at)?;
            if p.is_tunneled() {
                return Err(GraphError::InvalidState(format!(
                    "{} is tunneled, use enable_tunneled_port",
                    at
                )));
            }
            if p.enabled == enable {
                return Ok(());
            }
            inner.component(id)?.handle.clone()
        };
        handle.send_command(port_command(port, enable))?;
        self.wait_for_port_state(id, port, enable, self.config.port_timeout_ms)
    }

    /// Blocks until the port reports the requested enabled flag
    pub fn wait_for_port_state(
        &self,
        id: ComponentId,
        port: u32,
        enabled: bool,
        timeout_ms: u64,
    ) -> Result<()> {
        let at = PortRef::new(id, port);
        self.core
            .wait_until(deadline_after(timeout_ms), timeout_ms, |inner| {
                match inner.port(at) {
                    Err(e) => Some(Err(e)),
                    Ok(p) if p.enabled == enabled => Some(Ok(())),
                    Ok(_) => inner.watched_error().map(Err),
                }
            })
    }

    /// Enables or disables both ends of a tunnel. Disabling starts with the
    /// buffer supplier, enabling with the other side.
    pub fn enable_tunneled_port(&self, id: ComponentId, port: u32, enable: bool) -> Result<()> {
        let here = PortRef::new(id, port);
        let (peer, here_handle, peer_handle, here_supplies, in_place) = {
            let inner = self.core.lock();
            let p = inner.port(here)?;
            let peer = p.tunnel.ok_or_else(|| {
                GraphError::InvalidState(format!("{} is not tunneled", here))
            })?;
            let in_place = p.enabled == enable && inner.port(peer)?.enabled == enable;
            (
                peer,
                inner.component(id)?.handle.clone(),
                inner.component(peer.component)?.handle.clone(),
                p.is_supplier(),
                in_place,
            )
        };
        if in_place {
            return Ok(());
        }

        let here_first = if enable { !here_supplies } else { here_supplies };
        let ordered: [(PortRef, &Arc<dyn ComponentHandle>); 2] = if here_first {
            [(here, &here_handle), (peer, &peer_handle)]
        } else {
            [(peer, &peer_handle), (here, &here_handle)]
        };
        for (at, handle) in ordered {
            handle.send_command(port_command(at.port, enable))?;
        }

        let timeout_ms = self.config.tunneled_port_timeout_ms;
        let deadline = deadline_after(timeout_ms);
        for at in [here, peer] {
            self.core.wait_until(deadline, timeout_ms, |inner| match inner.port(at) {
                Err(e) => Some(Err(e)),
                Ok(p) if p.enabled == enable => Some(Ok(())),
                Ok(_) => inner.watched_error().map(Err),
            })?;
        }
        Ok(())
    }

    /// Tunnels the component's time-base input to the next free clock
    /// port. Fails with `NotImplemented` when the component has no such
    /// port, which callers treat as nothing to do.
    pub fn connect_component_to_clock(&self, id: ComponentId) -> Result<()> {
        let (clock_id, clock_port, comp_port, comp_enabled) = {
            let inner = self.core.lock();
            let clock_id = inner
                .clock
                .ok_or_else(|| GraphError::InvalidState("graph has no clock".into()))?;
            let comp = inner.component(id)?;
            let port = comp.clock_input().ok_or_else(|| {
                GraphError::NotImplemented(format!("{} has no clock port", comp.label))
            })?;
            if let Some(peer) = port.tunnel {
                if peer.component == clock_id {
                    return Ok(());
                }
                return Err(GraphError::InvalidState(format!(
                    "{} clock port is tunneled elsewhere",
                    comp.label
                )));
            }
            let clock = inner.component(clock_id)?;
            let free = clock
                .ports
                .iter()
                .find(|p| !p.enabled && !p.is_tunneled())
                .ok_or_else(|| GraphError::NoMore("clock ports".into()))?;
            (clock_id, free.index, port.index, port.enabled)
        };

        self.connect_tunneled(clock_id, clock_port, id, comp_port)?;

        self.handle(clock_id)?
            .send_command(Command::PortEnable(PortSelector::Port(clock_port)))?;
        self.core
            .lock()
            .port_mut(PortRef::new(clock_id, clock_port))?
            .enabled = true;

        if !comp_enabled {
            self.handle(id)?
                .send_command(Command::PortEnable(PortSelector::Port(comp_port)))?;
            self.core.lock().port_mut(PortRef::new(id, comp_port))?.enabled = true;
        }
        info!("Graph: {} attached to clock port {}", id, clock_port);
        Ok(())
    }

    /// Undoes [`Graph::connect_component_to_clock`] and disables both ports
    pub fn disconnect_component_from_clock(&self, id: ComponentId) -> Result<()> {
        let (clock_id, comp_port, peer) = {
            let inner = self.core.lock();
            let Some(clock_id) = inner.clock else {
                return Ok(());
            };
            let comp = inner.component(id)?;
            let port = comp.clock_input().ok_or_else(|| {
                GraphError::NotImplemented(format!("{} has no clock port", comp.label))
            })?;
            (clock_id, port.index, port.tunnel)
        };

        if let Some(peer) = peer {
            if peer.component != clock_id {
                return Err(GraphError::InvalidState(format!(
                    "{} clock port is not tunneled to the clock",
                    id
                )));
            }
            self.set_untunneled(id, comp_port)?;
            self.set_untunneled(clock_id, peer.port)?;
            self.disable_quietly(clock_id, peer.port)?;
        }
        self.disable_quietly(id, comp_port)
    }

    /// Sends a disable without waiting, marking the port disabled
    fn disable_quietly(&self, id: ComponentId, port: u32) -> Result<()> {
        let at = PortRef::new(id, port);
        let (handle, enabled) = {
            let inner = self.core.lock();
            (inner.component(id)?.handle.clone(), inner.port(at)?.enabled)
        };
        if enabled {
            handle.send_command(port_command(port, false))?;
            self.core.lock().port_mut(at)?.enabled = false;
        }
        Ok(())
    }
}

fn port_command(port: u32, enable: bool) -> Command {
    if enable {
        Command::PortEnable(PortSelector::Port(port))
    } else {
        Command::PortDisable(PortSelector::Port(port))
    }
}
