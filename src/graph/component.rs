//! Components as the graph tracks them

use std::sync::Arc;

use crate::provider::{BufferDone, ComponentEvent, ComponentHandle, Direction, Domain};

use super::port::Port;
use super::state::ComponentState;

/// Graph-assigned identity, never reused inside one graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComponentId(pub(crate) u64);

impl std::fmt::Display for ComponentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// What a component is for, independent of the vendor name behind it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    Reader,
    Decoder,
    Encoder,
    Renderer,
    Writer,
    Clock,
    Source,
    Other,
}

/// Typed request for a component: the provider name plus its role in
/// the pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentSpec {
    pub name: String,
    pub capability: Capability,
}

impl ComponentSpec {
    pub fn new(name: impl Into<String>, capability: Capability) -> Self {
        ComponentSpec {
            name: name.into(),
            capability,
        }
    }
}

/// Per-component event hook, called after the graph has applied the event
pub type EventHandler = Arc<dyn Fn(&ComponentEvent) + Send + Sync>;

/// Per-component buffer-done hook
pub type BufferHandler = Arc<dyn Fn(&BufferDone) + Send + Sync>;

/// Graph-wide event hook
pub type GraphEventHandler = Arc<dyn Fn(ComponentId, &ComponentEvent) + Send + Sync>;

pub(crate) struct Component {
    pub id: ComponentId,
    pub label: String,
    pub capability: Capability,
    pub handle: Arc<dyn ComponentHandle>,
    pub state: ComponentState,
    pub ports: Vec<Port>,
    pub is_endpoint: bool,
    pub eos_seen: bool,
    pub flush_pending: bool,
    pub event_handler: Option<EventHandler>,
    pub buffer_handler: Option<BufferHandler>,
}

impl Component {
    pub fn port(&self, index: u32) -> Option<&Port> {
        self.ports.iter().find(|p| p.index == index)
    }

    pub fn port_mut(&mut self, index: u32) -> Option<&mut Port> {
        self.ports.iter_mut().find(|p| p.index == index)
    }

    /// Input port carrying the time base, if the component has one
    pub fn clock_input(&self) -> Option<&Port> {
        self.ports
            .iter()
            .find(|p| p.domain == Domain::Time && p.direction == Direction::Input)
    }

    pub fn is_untunneled(&self) -> bool {
        self.ports.iter().all(|p| !p.is_tunneled())
    }

    pub fn info(&self) -> ComponentInfo {
        ComponentInfo {
            id: self.id,
            label: self.label.clone(),
            name: self.handle.name().to_string(),
            capability: self.capability,
            state: self.state,
            ports: self.ports.clone(),
            is_endpoint: self.is_endpoint,
        }
    }
}

/// Snapshot of one component, for callers and diagnostics
#[derive(Debug, Clone)]
pub struct ComponentInfo {
    pub id: ComponentId,
    pub label: String,
    pub name: String,
    pub capability: Capability,
    pub state: ComponentState,
    pub ports: Vec<Port>,
    pub is_endpoint: bool,
}

impl ComponentInfo {
    pub fn port(&self, index: u32) -> Option<&Port> {
        self.ports.iter().find(|p| p.index == index)
    }
}

/// Longest symbolic id accepted for a component
pub const MAX_LABEL_LEN: usize = 63;

pub(crate) fn validate_label(label: &str) -> bool {
    !label.is_empty() && label.len() <= MAX_LABEL_LEN && !label.chars().any(char::is_control)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_validation() {
        assert!(validate_label("READER"));
        assert!(!validate_label(""));
        assert!(!validate_label("bad\nlabel"));
        assert!(!validate_label(&"x".repeat(MAX_LABEL_LEN + 1)));
    }

    #[test]
    fn test_id_display() {
        assert_eq!(ComponentId(7).to_string(), "#7");
    }
}
