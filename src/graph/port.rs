//! Ports and tunnel references

use crate::provider::{BufferHeader, BufferSupplier, Direction, Domain, PortDefinition};

use super::component::ComponentId;

/// Arena reference to one port of one component in the same graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PortRef {
    pub component: ComponentId,
    pub port: u32,
}

impl PortRef {
    pub fn new(component: ComponentId, port: u32) -> Self {
        PortRef { component, port }
    }
}

impl std::fmt::Display for PortRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.component, self.port)
    }
}

/// One endpoint of a component as the graph tracks it
#[derive(Debug, Clone)]
pub struct Port {
    pub index: u32,
    pub direction: Direction,
    pub domain: Domain,
    pub enabled: bool,
    pub tunnel: Option<PortRef>,
    pub supplier: BufferSupplier,
    pub buffer_count_min: u32,
    pub buffer_size: usize,
    pub(crate) buffers: Vec<BufferHeader>,
}

impl Port {
    pub(crate) fn from_definition(def: &PortDefinition) -> Self {
        Port {
            index: def.index,
            direction: def.direction,
            domain: def.domain,
            enabled: def.enabled,
            tunnel: None,
            supplier: BufferSupplier::Unspecified,
            buffer_count_min: def.buffer_count_min,
            buffer_size: def.buffer_size,
            buffers: Vec::new(),
        }
    }

    pub fn is_tunneled(&self) -> bool {
        self.tunnel.is_some()
    }

    pub fn is_clock_port(&self) -> bool {
        self.domain == Domain::Time
    }

    /// Whether this side owns the buffers of its tunnel
    pub fn is_supplier(&self) -> bool {
        matches!(
            (self.supplier, self.direction),
            (BufferSupplier::Input, Direction::Input) | (BufferSupplier::Output, Direction::Output)
        )
    }

    pub fn buffer_count(&self) -> usize {
        self.buffers.len()
    }
}

/// Domains that may be tunneled together
pub fn domains_compatible(a: Domain, b: Domain) -> bool {
    match (a, b) {
        (x, y) if x == y => true,
        // raw pictures flow between video and still-image ports
        (Domain::Video, Domain::Image) | (Domain::Image, Domain::Video) => true,
        _ => false,
    }
}
