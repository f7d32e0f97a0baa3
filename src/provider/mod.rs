//! Component provider boundary
//!
//! A provider resolves component names or roles to handles. Everything
//! the orchestration layer knows about a component goes through
//! [`ComponentHandle`]; everything a component reports back goes through
//! the [`ComponentCallbacks`] the graph registers on it. Callbacks may
//! arrive on any thread, including synchronously from inside a call on
//! the handle.

pub mod params;
pub mod sim;

use std::sync::Arc;

use bytes::Bytes;
use log::warn;

use crate::error::{ErrorCode, GraphError, Result};
use crate::graph::state::ComponentState;

pub use params::{
    BufferSupplier, CapturedFrame, Config, ConfigIndex, Direction, Domain, MetadataKind,
    MetadataValue, Param, ParamIndex, PortDefinition,
};

/// Longest component name a provider accepts
pub const MAX_NAME_LEN: usize = 127;

/// Target of a port command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortSelector {
    All,
    Port(u32),
}

impl PortSelector {
    pub fn matches(&self, port: u32) -> bool {
        match self {
            PortSelector::All => true,
            PortSelector::Port(p) => *p == port,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    StateSet(ComponentState),
    Flush(PortSelector),
    PortDisable(PortSelector),
    PortEnable(PortSelector),
    MarkBuffer(u32),
}

/// Completion payload of a previously sent [`Command`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    State(ComponentState),
    Flush(PortSelector),
    PortDisabled(u32),
    PortEnabled(u32),
    Mark(u32),
}

/// Asynchronous notification from a component
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ComponentEvent {
    CommandComplete(Completion),
    Error(ErrorCode),
    BufferFlag { port: u32, end_of_stream: bool },
    PortSettingsChanged(u32),
    FirstFrameDisplayed,
    ForBuffering { need_pause: bool, percent: u32 },
    StreamChange,
}

/// A buffer owned by a component and lent to the caller
#[derive(Debug, Clone, PartialEq)]
pub struct BufferHeader {
    pub id: u64,
    pub port: u32,
    pub alloc_len: usize,
    pub payload: Bytes,
    pub timestamp_us: i64,
    pub end_of_stream: bool,
}

impl BufferHeader {
    pub fn new(id: u64, port: u32, alloc_len: usize) -> Self {
        BufferHeader {
            id,
            port,
            alloc_len,
            payload: Bytes::new(),
            timestamp_us: 0,
            end_of_stream: false,
        }
    }

    /// Same buffer carrying new data
    pub fn filled(&self, payload: Bytes, timestamp_us: i64) -> Result<Self> {
        if payload.len() > self.alloc_len {
            return Err(GraphError::BadParameter(format!(
                "payload of {} bytes exceeds buffer of {}",
                payload.len(),
                self.alloc_len
            )));
        }
        Ok(BufferHeader {
            payload,
            timestamp_us,
            ..self.clone()
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum BufferDone {
    Emptied(BufferHeader),
    Filled(BufferHeader),
}

/// Sink a component reports into
pub trait ComponentCallbacks: Send + Sync {
    fn on_event(&self, event: ComponentEvent);
    fn on_buffer_done(&self, done: BufferDone);
}

/// Peer side handed to a tunnel request
#[derive(Clone)]
pub struct TunnelPeer {
    pub handle: Arc<dyn ComponentHandle>,
    pub port: u32,
}

/// One instantiated component
pub trait ComponentHandle: Send + Sync {
    fn name(&self) -> &str;

    fn get_parameter(&self, port: u32, index: ParamIndex) -> Result<Param>;
    fn set_parameter(&self, port: u32, value: Param) -> Result<()>;
    fn get_config(&self, port: u32, index: ConfigIndex) -> Result<Config>;
    fn set_config(&self, port: u32, value: Config) -> Result<()>;

    fn send_command(&self, command: Command) -> Result<()>;
    fn state(&self) -> Result<ComponentState>;

    /// Accepts or drops a tunnel on one port; `None` removes it
    fn tunnel_request(&self, port: u32, peer: Option<TunnelPeer>) -> Result<()>;

    fn allocate_buffer(&self, port: u32, size: usize) -> Result<BufferHeader>;
    fn free_buffer(&self, port: u32, buffer: BufferHeader) -> Result<()>;
    fn empty_this_buffer(&self, buffer: BufferHeader) -> Result<()>;
    fn fill_this_buffer(&self, buffer: BufferHeader) -> Result<()>;

    fn set_callbacks(&self, callbacks: Arc<dyn ComponentCallbacks>) -> Result<()>;

    /// Two-phase metadata query. Fails with `InsufficientBuffer` when
    /// `capacity` is too small for the value.
    fn query_metadata(&self, kind: MetadataKind, capacity: usize) -> Result<MetadataValue> {
        let _ = (kind, capacity);
        Err(GraphError::NotImplemented(format!("{}: metadata", self.name())))
    }

    /// Copies the last rendered frame. Fails with `InsufficientBuffer`
    /// when `capacity` is too small.
    fn capture_frame(&self, capacity: usize) -> Result<CapturedFrame> {
        let _ = capacity;
        Err(GraphError::NotImplemented(format!("{}: frame capture", self.name())))
    }
}

/// Factory for a custom component
pub type ComponentFactory = Arc<dyn Fn(u32) -> Result<Arc<dyn ComponentHandle>> + Send + Sync>;

/// Registration record for a component outside the provider's own set
#[derive(Clone)]
pub struct ComponentDescriptor {
    pub name: String,
    pub roles: Vec<String>,
    pub factory: ComponentFactory,
}

impl ComponentDescriptor {
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() || self.name.len() > MAX_NAME_LEN {
            return Err(GraphError::BadParameter(format!(
                "component name must be 1..={} bytes",
                MAX_NAME_LEN
            )));
        }
        if self.roles.iter().any(|r| r.is_empty() || r.len() > MAX_NAME_LEN) {
            return Err(GraphError::BadParameter(format!(
                "{}: malformed role",
                self.name
            )));
        }
        Ok(())
    }
}

impl std::fmt::Debug for ComponentDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentDescriptor")
            .field("name", &self.name)
            .field("roles", &self.roles)
            .finish()
    }
}

/// Loader and factory of components
pub trait ComponentProvider: Send + Sync {
    fn interface_version(&self) -> u32;

    fn load(&self) -> Result<()>;
    fn unload(&self) -> Result<()>;

    fn register_component(&self, descriptor: ComponentDescriptor) -> Result<()>;

    /// Instantiates a component for a caller speaking `version`
    fn create(&self, name: &str, version: u32) -> Result<Arc<dyn ComponentHandle>>;

    /// Names of the components implementing `role`, preferred first
    fn components_of_role(&self, role: &str) -> Result<Vec<String>>;

    /// Negotiates a tunnel between an output and an input port. Passing
    /// `None` on one side tears the other side down.
    fn setup_tunnel(
        &self,
        output: Option<TunnelPeer>,
        input: Option<TunnelPeer>,
    ) -> Result<()> {
        match (output, input) {
            (Some(out), Some(inp)) => {
                out.handle.tunnel_request(out.port, Some(inp.clone()))?;
                if let Err(e) = inp.handle.tunnel_request(inp.port, Some(out.clone())) {
                    if let Err(undo) = out.handle.tunnel_request(out.port, None) {
                        warn!("Provider: reverting tunnel on {}:{}: {}", out.handle.name(), out.port, undo);
                    }
                    return Err(e);
                }
                Ok(())
            }
            (Some(out), None) => out.handle.tunnel_request(out.port, None),
            (None, Some(inp)) => inp.handle.tunnel_request(inp.port, None),
            (None, None) => Err(GraphError::BadParameter("tunnel without ends".into())),
        }
    }
}
