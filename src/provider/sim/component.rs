//! Simulated component: a worker thread that executes commands in order
//! and reports completions through the registered callbacks

use log::{debug, warn};
use std::collections::HashMap;
use std::sync::mpsc;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;

use bytes::Bytes;

use crate::error::{ErrorCode, GraphError, Result};
use crate::graph::state::ComponentState;
use crate::provider::params::ClockRunState;
use crate::provider::{
    BufferDone, BufferHeader, BufferSupplier, CapturedFrame, Command, Completion,
    ComponentCallbacks, ComponentEvent, ComponentHandle, Config, ConfigIndex, Direction, Domain,
    MetadataKind, MetadataValue, Param, ParamIndex, PortDefinition, TunnelPeer,
};

use super::SimShared;
use super::catalog::{Kind, ports_of};
use super::clock::SimClock;
use super::source::SimSource;

struct SimState {
    state: ComponentState,
    ports: Vec<PortDefinition>,
    /// Peer name and port per tunneled port
    tunnels: HashMap<u32, (String, u32)>,
    params: HashMap<(u32, ParamIndex), Param>,
    configs: HashMap<(u32, ConfigIndex), Config>,
    source: Option<SimSource>,
    position_us: i64,
    clock: SimClock,
    /// Picture size of the last frame shown
    rendered: Option<(u32, u32)>,
    next_buffer: u64,
    /// Buffer id to port
    outstanding: HashMap<u64, u32>,
}

impl SimState {
    fn port(&self, index: u32) -> Result<&PortDefinition> {
        self.ports
            .iter()
            .find(|p| p.index == index)
            .ok_or_else(|| GraphError::BadParameter(format!("no port {}", index)))
    }

    fn port_mut(&mut self, index: u32) -> Result<&mut PortDefinition> {
        self.ports
            .iter_mut()
            .find(|p| p.index == index)
            .ok_or_else(|| GraphError::BadParameter(format!("no port {}", index)))
    }

    fn opened(&self) -> Result<&SimSource> {
        self.source
            .as_ref()
            .ok_or_else(|| GraphError::InvalidState("no source opened".into()))
    }

    /// Picture arriving on a tunneled input 0
    fn incoming_picture(&self) -> Option<(u32, u32)> {
        let port = self.port(0).ok()?;
        if !self.tunnels.contains_key(&0) || port.frame_width == 0 || port.frame_height == 0 {
            return None;
        }
        Some((port.frame_width, port.frame_height))
    }

    fn adopt_picture(&mut self, input: u32, width: u32, height: u32, forward: bool) {
        for port in self.ports.iter_mut() {
            let outgoing =
                forward && port.direction == Direction::Output && port.domain != Domain::Time;
            if port.index == input || outgoing {
                port.frame_width = width;
                port.frame_height = height;
            }
        }
    }
}

struct SimCore {
    state: Mutex<SimState>,
    callbacks: Mutex<Option<Arc<dyn ComponentCallbacks>>>,
}

impl SimCore {
    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn sink(&self) -> Option<Arc<dyn ComponentCallbacks>> {
        self.callbacks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn deliver(&self, event: ComponentEvent) {
        if let Some(sink) = self.sink() {
            sink.on_event(event);
        }
    }

    fn deliver_buffer(&self, done: BufferDone) {
        if let Some(sink) = self.sink() {
            sink.on_buffer_done(done);
        }
    }
}

/// Command executor running on the component's own thread
struct Worker {
    name: String,
    kind: Kind,
    shared: Arc<SimShared>,
    core: Arc<SimCore>,
}

impl Worker {
    fn run(self, commands: mpsc::Receiver<Command>) {
        for command in commands {
            for event in self.execute(command) {
                self.core.deliver(event);
            }
        }
        debug!("Sim: {} worker stopped", self.name);
    }

    fn execute(&self, command: Command) -> Vec<ComponentEvent> {
        let mut st = self.core.lock();
        match command {
            Command::StateSet(target) => {
                if self.shared.is_stalled(&self.name) {
                    debug!("Sim: {} sits on {:?}", self.name, command);
                    return Vec::new();
                }
                if !st.state.can_transition_to(&target) {
                    warn!("Sim: {} cannot go {} -> {}", self.name, st.state, target);
                    return vec![ComponentEvent::Error(ErrorCode::InvalidState)];
                }
                st.state = target;
                let mut events = vec![ComponentEvent::CommandComplete(Completion::State(target))];
                if target == ComponentState::Executing && self.kind.displays_frames() {
                    let starved = st
                        .tunnels
                        .get(&0)
                        .is_some_and(|(peer, _)| self.shared.is_silent(peer));
                    if starved {
                        debug!("Sim: {} runs without a picture", self.name);
                    } else if let Some(picture) = st.incoming_picture() {
                        st.rendered = Some(picture);
                        events.push(ComponentEvent::FirstFrameDisplayed);
                    }
                }
                events
            }
            Command::Flush(selector) => {
                vec![ComponentEvent::CommandComplete(Completion::Flush(selector))]
            }
            Command::PortEnable(selector) | Command::PortDisable(selector) => {
                let enable = matches!(command, Command::PortEnable(_));
                st.ports
                    .iter_mut()
                    .filter(|p| selector.matches(p.index))
                    .map(|p| {
                        p.enabled = enable;
                        ComponentEvent::CommandComplete(if enable {
                            Completion::PortEnabled(p.index)
                        } else {
                            Completion::PortDisabled(p.index)
                        })
                    })
                    .collect()
            }
            Command::MarkBuffer(mark) => {
                vec![ComponentEvent::CommandComplete(Completion::Mark(mark))]
            }
        }
    }
}

pub struct SimComponent {
    name: String,
    kind: Kind,
    shared: Arc<SimShared>,
    core: Arc<SimCore>,
    commands: mpsc::Sender<Command>,
}

impl SimComponent {
    pub(crate) fn spawn(name: &str, kind: Kind, shared: Arc<SimShared>) -> Result<Arc<SimComponent>> {
        let core = Arc::new(SimCore {
            state: Mutex::new(SimState {
                state: ComponentState::Loaded,
                ports: ports_of(kind, name),
                tunnels: HashMap::new(),
                params: HashMap::new(),
                configs: HashMap::new(),
                source: None,
                position_us: 0,
                clock: SimClock::new(),
                rendered: None,
                next_buffer: 0,
                outstanding: HashMap::new(),
            }),
            callbacks: Mutex::new(None),
        });

        let (tx, rx) = mpsc::channel();
        let worker = Worker {
            name: name.to_string(),
            kind,
            shared: shared.clone(),
            core: core.clone(),
        };
        thread::Builder::new()
            .name(format!("sim:{}", name))
            .spawn(move || worker.run(rx))
            .map_err(|e| GraphError::InsufficientResources(format!("{}: {}", name, e)))?;

        Ok(Arc::new(SimComponent {
            name: name.to_string(),
            kind,
            shared,
            core,
            commands: tx,
        }))
    }

    pub fn kind(&self) -> Kind {
        self.kind
    }

    /// Raises an event as if the component produced it
    pub fn emit(&self, event: ComponentEvent) {
        self.core.deliver(event);
    }

    pub fn sim_state(&self) -> ComponentState {
        self.core.lock().state
    }

    /// Last value stored through `set_parameter`
    pub fn param(&self, port: u32, index: ParamIndex) -> Option<Param> {
        self.core.lock().params.get(&(port, index)).cloned()
    }

    /// Last value stored through `set_config`
    pub fn config(&self, port: u32, index: ConfigIndex) -> Option<Config> {
        self.core.lock().configs.get(&(port, index)).cloned()
    }

    pub fn tunnel_peer(&self, port: u32) -> Option<(String, u32)> {
        self.core.lock().tunnels.get(&port).cloned()
    }

    pub fn port_enabled(&self, port: u32) -> Option<bool> {
        self.core.lock().port(port).ok().map(|p| p.enabled)
    }

    pub fn outstanding_buffers(&self) -> usize {
        self.core.lock().outstanding.len()
    }

    fn is_reader(&self) -> bool {
        self.kind == Kind::Reader
    }

    fn open(&self, st: &mut SimState, uri: &str) -> Result<()> {
        let source = self
            .shared
            .source(uri)
            .ok_or_else(|| GraphError::BadParameter(format!("{}: cannot open {}", self.name, uri)))?;
        for port in st.ports.iter_mut() {
            port.frame_width = 0;
            port.frame_height = 0;
            port.bitrate = 0;
            port.framerate_q16 = 0;
            source.describe_port(port);
        }
        debug!("Sim: {} opened {}", self.name, uri);
        st.source = Some(source);
        st.position_us = 0;
        Ok(())
    }

    fn returned(&self, buffer: BufferHeader, done: BufferDone) -> Result<()> {
        {
            let st = self.core.lock();
            if !st.state.is_active() {
                return Err(GraphError::InvalidState(format!(
                    "{} is {}, not processing",
                    self.name, st.state
                )));
            }
            if !st.outstanding.contains_key(&buffer.id) {
                return Err(GraphError::BadParameter(format!(
                    "{}: unknown buffer {}",
                    self.name, buffer.id
                )));
            }
        }
        self.core.deliver_buffer(done);
        if buffer.end_of_stream {
            self.core.deliver(ComponentEvent::BufferFlag {
                port: buffer.port,
                end_of_stream: true,
            });
        }
        Ok(())
    }
}

impl ComponentHandle for SimComponent {
    fn name(&self) -> &str {
        &self.name
    }

    fn get_parameter(&self, port: u32, index: ParamIndex) -> Result<Param> {
        let st = self.core.lock();
        match index {
            ParamIndex::PortDefinition => st.port(port).cloned().map(Param::PortDefinition),
            ParamIndex::BufferSupplier => {
                st.port(port)?;
                Ok(Param::BufferSupplier(if st.tunnels.contains_key(&port) {
                    BufferSupplier::Output
                } else {
                    BufferSupplier::Unspecified
                }))
            }
            ParamIndex::StreamType if self.is_reader() => {
                Ok(Param::StreamType(st.opened()?.stream_on(port)))
            }
            ParamIndex::StreamCount if self.is_reader() => {
                Ok(Param::StreamCount(st.opened()?.stream_count()))
            }
            ParamIndex::Duration if self.is_reader() => {
                Ok(Param::Duration(st.opened()?.duration_ms.saturating_mul(1000)))
            }
            ParamIndex::AudioStreamInfo if self.is_reader() => st
                .opened()?
                .audio
                .as_ref()
                .map(|a| Param::AudioStreamInfo(a.info()))
                .ok_or_else(|| GraphError::BadParameter(format!("{}: no audio stream", self.name))),
            other => st.params.get(&(port, other)).cloned().ok_or_else(|| {
                GraphError::BadParameter(format!("{}: {:?} not set on port {}", self.name, other, port))
            }),
        }
    }

    fn set_parameter(&self, port: u32, value: Param) -> Result<()> {
        let mut st = self.core.lock();
        match &value {
            Param::PortDefinition(def) => {
                let p = st.port_mut(port)?;
                p.buffer_count_actual = def.buffer_count_actual.max(p.buffer_count_min);
                p.buffer_size = def.buffer_size;
                p.frame_width = def.frame_width;
                p.frame_height = def.frame_height;
                p.bitrate = def.bitrate;
                p.framerate_q16 = def.framerate_q16;
                return Ok(());
            }
            Param::Filename(uri) if self.is_reader() => self.open(&mut st, uri)?,
            _ => {}
        }
        st.params.insert((port, value.index()), value);
        Ok(())
    }

    fn get_config(&self, port: u32, index: ConfigIndex) -> Result<Config> {
        if self.shared.config_fails(&self.name, index) {
            return Err(GraphError::Undefined(format!("{}: {:?} refused", self.name, index)));
        }
        let st = self.core.lock();
        match index {
            ConfigIndex::CurrentMediaTime if self.kind == Kind::Clock => {
                Ok(Config::CurrentMediaTime(st.clock.media_time_us()))
            }
            ConfigIndex::Position if self.is_reader() => {
                st.opened()?;
                Ok(Config::Position(st.position_us))
            }
            ConfigIndex::Framerate => st.port(port).map(|p| Config::Framerate(p.framerate_q16)),
            other => st.configs.get(&(port, other)).cloned().ok_or_else(|| {
                GraphError::BadParameter(format!("{}: {:?} not set on port {}", self.name, other, port))
            }),
        }
    }

    fn set_config(&self, port: u32, value: Config) -> Result<()> {
        if self.shared.config_fails(&self.name, value.index()) {
            return Err(GraphError::Undefined(format!(
                "{}: {:?} refused",
                self.name,
                value.index()
            )));
        }
        let mut st = self.core.lock();
        match (self.kind, &value) {
            (Kind::Clock, Config::ClockState(clock)) => match clock.state {
                ClockRunState::Running => {
                    if self.shared.take_not_ready() {
                        return Err(GraphError::NotReady);
                    }
                    st.clock.start(clock.start_time_us);
                }
                ClockRunState::Stopped => st.clock.stop(),
            },
            (Kind::Clock, Config::TimeScale(scale)) => st.clock.set_scale(*scale),
            (Kind::Reader, Config::Position(requested)) => {
                let landing = st.opened()?.landing_position(*requested);
                st.position_us = landing;
            }
            (_, Config::Framerate(q16)) => st.port_mut(port)?.framerate_q16 = *q16,
            _ => {}
        }
        st.configs.insert((port, value.index()), value);
        Ok(())
    }

    fn send_command(&self, command: Command) -> Result<()> {
        self.commands
            .send(command)
            .map_err(|_| GraphError::InvalidState(format!("{}: worker stopped", self.name)))
    }

    fn state(&self) -> Result<ComponentState> {
        Ok(self.core.lock().state)
    }

    fn tunnel_request(&self, port: u32, peer: Option<TunnelPeer>) -> Result<()> {
        let direction = self.core.lock().port(port)?.direction;
        let Some(peer) = peer else {
            self.core.lock().tunnels.remove(&port);
            return Ok(());
        };
        if self.shared.rejects_tunnels(&self.name) {
            return Err(GraphError::PortMismatch(format!("{} refuses tunnels", self.name)));
        }

        // Inputs take the picture size of whatever feeds them
        let upstream = if direction == Direction::Input {
            match peer.handle.get_parameter(peer.port, ParamIndex::PortDefinition) {
                Ok(Param::PortDefinition(def)) => Some(def),
                _ => None,
            }
        } else {
            None
        };

        let mut st = self.core.lock();
        st.tunnels
            .insert(port, (peer.handle.name().to_string(), peer.port));
        if let Some(def) = upstream.filter(|d| d.frame_width > 0 && d.frame_height > 0) {
            st.adopt_picture(port, def.frame_width, def.frame_height, self.kind.forwards_format());
            if def.framerate_q16 > 0 {
                st.port_mut(port)?.framerate_q16 = def.framerate_q16;
            }
        }
        Ok(())
    }

    fn allocate_buffer(&self, port: u32, size: usize) -> Result<BufferHeader> {
        let mut st = self.core.lock();
        st.port(port)?;
        if st.tunnels.contains_key(&port) {
            return Err(GraphError::InvalidState(format!(
                "{}: port {} is tunneled",
                self.name, port
            )));
        }
        if size == 0 {
            return Err(GraphError::BadParameter("zero sized buffer".into()));
        }
        st.next_buffer += 1;
        let id = st.next_buffer;
        st.outstanding.insert(id, port);
        Ok(BufferHeader::new(id, port, size))
    }

    fn free_buffer(&self, port: u32, buffer: BufferHeader) -> Result<()> {
        let mut st = self.core.lock();
        match st.outstanding.get(&buffer.id) {
            Some(owner) if *owner == port => {
                st.outstanding.remove(&buffer.id);
                Ok(())
            }
            Some(owner) => Err(GraphError::BadParameter(format!(
                "{}: buffer {} belongs to port {}",
                self.name, buffer.id, owner
            ))),
            None => Err(GraphError::BadParameter(format!(
                "{}: unknown buffer {}",
                self.name, buffer.id
            ))),
        }
    }

    fn empty_this_buffer(&self, buffer: BufferHeader) -> Result<()> {
        self.returned(buffer.clone(), BufferDone::Emptied(buffer))
    }

    fn fill_this_buffer(&self, buffer: BufferHeader) -> Result<()> {
        self.returned(buffer.clone(), BufferDone::Filled(buffer))
    }

    fn set_callbacks(&self, callbacks: Arc<dyn ComponentCallbacks>) -> Result<()> {
        *self.core.callbacks.lock().unwrap_or_else(|e| e.into_inner()) = Some(callbacks);
        Ok(())
    }

    fn query_metadata(&self, kind: MetadataKind, capacity: usize) -> Result<MetadataValue> {
        if !self.is_reader() {
            return Err(GraphError::NotImplemented(format!("{}: metadata", self.name)));
        }
        let st = self.core.lock();
        let value = st
            .opened()?
            .metadata
            .get(&kind)
            .cloned()
            .ok_or_else(|| GraphError::NotImplemented(format!("{}: no {:?}", self.name, kind)))?;
        if capacity < value.data.len() {
            return Err(GraphError::InsufficientBuffer {
                required: value.data.len(),
            });
        }
        Ok(value)
    }

    fn capture_frame(&self, capacity: usize) -> Result<CapturedFrame> {
        if !self.kind.displays_frames() {
            return Err(GraphError::NotImplemented(format!("{}: frame capture", self.name)));
        }
        let (width, height) = self
            .core
            .lock()
            .rendered
            .ok_or_else(|| GraphError::InvalidState(format!("{}: nothing rendered", self.name)))?;
        let luma = (width * height) as usize;
        let required = luma * 3 / 2;
        if capacity < required {
            return Err(GraphError::InsufficientBuffer { required });
        }
        let mut data = vec![0x10u8; luma];
        data.resize(required, 0x80);
        Ok(CapturedFrame {
            width,
            height,
            data: Bytes::from(data),
        })
    }
}

impl std::fmt::Debug for SimComponent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimComponent")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("state", &self.sim_state())
            .finish()
    }
}
