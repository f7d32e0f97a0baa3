//! Process-level handle on the component provider
//!
//! A `Framework` is an explicit context object: create one, pass it to
//! every graph, and call [`Framework::deinit`] after the last graph is
//! gone. Several frameworks may coexist, which is what the tests do.

use log::{info, warn};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crate::error::{GraphError, Result};
use crate::provider::{ComponentDescriptor, ComponentHandle, ComponentProvider};

pub struct Framework {
    provider: Arc<dyn ComponentProvider>,
    version: u32,
    loaded: AtomicBool,
    live_graphs: AtomicUsize,
}

impl Framework {
    /// Loads the provider. Calling this twice on the same provider is
    /// left to the provider to reject.
    pub fn init(provider: Arc<dyn ComponentProvider>) -> Result<Arc<Framework>> {
        provider
            .load()
            .map_err(|e| GraphError::ResourceError(e.to_string()))?;
        let version = provider.interface_version();
        info!("Framework: provider loaded, interface version 0x{:08x}", version);

        Ok(Arc::new(Framework {
            provider,
            version,
            loaded: AtomicBool::new(true),
            live_graphs: AtomicUsize::new(0),
        }))
    }

    /// Unloads the provider. Fails while any graph created on this
    /// framework is still alive.
    pub fn deinit(&self) -> Result<()> {
        let graphs = self.live_graphs.load(Ordering::Acquire);
        if graphs > 0 {
            return Err(GraphError::InvalidState(format!(
                "{} graph(s) still reference the framework",
                graphs
            )));
        }
        if self.loaded.swap(false, Ordering::AcqRel) {
            self.provider.unload()?;
            info!("Framework: provider unloaded");
        }
        Ok(())
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded.load(Ordering::Acquire)
    }

    pub fn interface_version(&self) -> u32 {
        self.version
    }

    pub fn register_component(&self, descriptor: ComponentDescriptor) -> Result<()> {
        descriptor.validate()?;
        info!("Framework: registering {}", descriptor.name);
        self.provider.register_component(descriptor)
    }

    pub fn provider(&self) -> &Arc<dyn ComponentProvider> {
        &self.provider
    }

    pub(crate) fn create_component(&self, name: &str) -> Result<Arc<dyn ComponentHandle>> {
        if !self.is_loaded() {
            return Err(GraphError::InvalidState("framework is not loaded".into()));
        }
        self.provider.create(name, self.version)
    }

    /// First component name implementing `role`
    pub(crate) fn resolve_role(&self, role: &str) -> Result<String> {
        self.provider
            .components_of_role(role)?
            .into_iter()
            .next()
            .ok_or_else(|| GraphError::ComponentNotFound(format!("role {}", role)))
    }

    pub(crate) fn graph_created(&self) {
        self.live_graphs.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn graph_dropped(&self) {
        self.live_graphs.fetch_sub(1, Ordering::AcqRel);
    }

    pub fn live_graphs(&self) -> usize {
        self.live_graphs.load(Ordering::Acquire)
    }
}

impl Drop for Framework {
    fn drop(&mut self) {
        if self.loaded.swap(false, Ordering::AcqRel) {
            if let Err(e) = self.provider.unload() {
                warn!("Framework: unload on drop failed: {}", e);
            }
        }
    }
}

impl std::fmt::Debug for Framework {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Framework")
            .field("version", &self.version)
            .field("loaded", &self.is_loaded())
            .field("live_graphs", &self.live_graphs())
            .finish()
    }
}
