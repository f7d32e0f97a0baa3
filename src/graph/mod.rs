//! Graph of components: creation, aggregate state transitions,
//! end-of-stream aggregation and error capture
//!
//! One lock guards everything the graph knows about its components. Component
//! callbacks update that state under the lock and wake waiters through the
//! condition variable; the caller's blocking operations sleep on it with a
//! deadline. Provider calls are never made while the lock is held.

pub mod component;
pub mod health;
pub mod port;
pub mod state;

mod buffers;
mod clock;
mod events;
mod tunnel;

use log::{debug, info, warn};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crate::config::GraphConfig;
use crate::error::{GraphError, Result};
use crate::framework::Framework;
use crate::provider::{
    Command, ComponentHandle, Config, Param, ParamIndex, PortSelector, params::ReferenceClock,
};

pub use component::{
    BufferHandler, Capability, ComponentId, ComponentInfo, ComponentSpec, EventHandler,
    GraphEventHandler,
};
pub use health::{GraphHealth, HealthAlert, HealthMonitor, HealthSummary};
pub use port::{Port, PortRef};
pub use state::ComponentState;

use component::{Component, validate_label};
use events::ComponentSink;

/// Role resolved to create a graph's clock
pub const CLOCK_ROLE: &str = "clock.binary";
/// Symbolic id of the clock inside its graph
pub const CLOCK_LABEL: &str = "clock";

pub(crate) struct GraphInner {
    components: Vec<Component>,
    next_id: u64,
    state: ComponentState,
    clock: Option<ComponentId>,
    error: Option<GraphError>,
    at_eos: bool,
    need_eos: u32,
    max_eos: u32,
    watch_errors: bool,
    event_handler: Option<GraphEventHandler>,
}

impl GraphInner {
    fn new() -> Self {
        GraphInner {
            components: Vec::new(),
            next_id: 1,
            state: ComponentState::Loaded,
            clock: None,
            error: None,
            at_eos: false,
            need_eos: 0,
            max_eos: 0,
            watch_errors: true,
            event_handler: None,
        }
    }

    fn find(&self, id: ComponentId) -> Option<&Component> {
        self.components.iter().find(|c| c.id == id)
    }

    fn find_mut(&mut self, id: ComponentId) -> Option<&mut Component> {
        self.components.iter_mut().find(|c| c.id == id)
    }

    fn component(&self, id: ComponentId) -> Result<&Component> {
        self.find(id)
            .ok_or_else(|| GraphError::ComponentNotFound(id.to_string()))
    }

    fn component_mut(&mut self, id: ComponentId) -> Result<&mut Component> {
        self.find_mut(id)
            .ok_or_else(|| GraphError::ComponentNotFound(id.to_string()))
    }

    fn port(&self, at: PortRef) -> Result<&Port> {
        let comp = self.component(at.component)?;
        comp.port(at.port).ok_or_else(|| {
            GraphError::BadParameter(format!("{} has no port {}", comp.label, at.port))
        })
    }

    fn port_mut(&mut self, at: PortRef) -> Result<&mut Port> {
        let comp = self.component_mut(at.component)?;
        let label = comp.label.clone();
        comp.port_mut(at.port)
            .ok_or_else(|| GraphError::BadParameter(format!("{} has no port {}", label, at.port)))
    }

    /// Stored error as seen by a state or port wait
    fn watched_error(&self) -> Option<GraphError> {
        if self.watch_errors {
            self.error.clone()
        } else {
            None
        }
    }

    fn clear_endpoint(&mut self, comp: &Component) {
        if comp.is_endpoint {
            if !comp.eos_seen {
                self.need_eos = self.need_eos.saturating_sub(1);
            }
            self.max_eos = self.max_eos.saturating_sub(1);
        }
    }
}

pub(crate) struct GraphCore {
    inner: Mutex<GraphInner>,
    cond: Condvar,
    health: Arc<GraphHealth>,
}

impl GraphCore {
    fn lock(&self) -> MutexGuard<'_, GraphInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn wake(&self) {
        self.cond.notify_all();
    }

    /// Re-evaluates `check` on every wake-up until it yields a result or
    /// the deadline passes. The check runs at least once, so a deadline
    /// already in the past still observes a condition that holds.
    fn wait_until<T>(
        &self,
        deadline: Instant,
        timeout_ms: u64,
        mut check: impl FnMut(&GraphInner) -> Option<Result<T>>,
    ) -> Result<T> {
        let mut guard = self.lock();
        loop {
            if let Some(result) = check(&guard) {
                return result;
            }
            let now = Instant::now();
            if now >= deadline {
                self.health.record_timeout();
                return Err(GraphError::Timeout(timeout_ms));
            }
            guard = match self.cond.wait_timeout(guard, deadline - now) {
                Ok((g, _)) => g,
                Err(e) => e.into_inner().0,
            };
        }
    }
}

fn deadline_after(timeout_ms: u64) -> Instant {
    Instant::now() + Duration::from_millis(timeout_ms)
}

pub struct Graph {
    core: Arc<GraphCore>,
    framework: Arc<Framework>,
    config: GraphConfig,
}

impl Graph {
    pub fn init(framework: Arc<Framework>, create_clock: bool) -> Result<Graph> {
        Self::with_config(framework, create_clock, GraphConfig::default())
    }

    pub fn with_config(
        framework: Arc<Framework>,
        create_clock: bool,
        config: GraphConfig,
    ) -> Result<Graph> {
        if !framework.is_loaded() {
            return Err(GraphError::InvalidState("framework is not loaded".into()));
        }
        framework.graph_created();
        let graph = Graph {
            core: Arc::new(GraphCore {
                inner: Mutex::new(GraphInner::new()),
                cond: Condvar::new(),
                health: Arc::new(GraphHealth::new()),
            }),
            framework,
            config,
        };

        if create_clock {
            graph.create_clock()?;
        }
        Ok(graph)
    }

    fn create_clock(&self) -> Result<()> {
        let name = self.framework.resolve_role(CLOCK_ROLE)?;
        let id = self.create_component(&ComponentSpec::new(name, Capability::Clock), CLOCK_LABEL)?;
        let handle = self.handle(id)?;

        // Clock ports are handed out one by one as components attach
        handle.send_command(Command::PortDisable(PortSelector::All))?;
        {
            let mut inner = self.core.lock();
            let clock = inner.component_mut(id)?;
            for port in clock.ports.iter_mut() {
                port.enabled = false;
            }
            inner.clock = Some(id);
        }

        if let Err(e) = handle.set_config(0, Config::ReferenceClock(ReferenceClock::Audio)) {
            warn!("Graph: clock refused audio reference: {}", e);
        }
        Ok(())
    }

    pub fn framework(&self) -> &Arc<Framework> {
        &self.framework
    }

    pub fn config(&self) -> &GraphConfig {
        &self.config
    }

    pub fn health(&self) -> Arc<GraphHealth> {
        self.core.health.clone()
    }

    /// Aggregate state, updated by successful all-component transitions
    pub fn state(&self) -> ComponentState {
        self.core.lock().state
    }

    pub fn clock(&self) -> Option<ComponentId> {
        self.core.lock().clock
    }

    // ── Components ─────────────────────────────────────────────────────

    pub fn create_component_by_name(&self, name: &str, label: &str) -> Result<ComponentId> {
        self.create_component(&ComponentSpec::new(name, Capability::Other), label)
    }

    pub fn create_component_by_role(&self, role: &str, label: &str) -> Result<ComponentId> {
        let name = self.framework.resolve_role(role)?;
        self.create_component(&ComponentSpec::new(name, Capability::Other), label)
    }

    /// Instantiates `spec`, discovers its ports and inserts it at the head
    /// of the component list
    pub fn create_component(&self, spec: &ComponentSpec, label: &str) -> Result<ComponentId> {
        if !validate_label(label) {
            return Err(GraphError::BadParameter(format!("malformed id {:?}", label)));
        }
        let handle = self.framework.create_component(&spec.name)?;

        let mut ports = Vec::new();
        for index in 0..self.config.max_ports {
            let def = handle
                .get_parameter(index, ParamIndex::PortDefinition)
                .and_then(|reply| crate::unpack!(reply, Param::PortDefinition));
            match def {
                Ok(def) => ports.push(Port::from_definition(&def)),
                Err(_) => break,
            }
        }
        let state = handle.state().unwrap_or(ComponentState::Loaded);

        let id = {
            let mut inner = self.core.lock();
            let id = ComponentId(inner.next_id);
            inner.next_id += 1;
            id
        };

        handle.set_callbacks(Arc::new(ComponentSink::new(Arc::downgrade(&self.core), id)))?;

        debug!(
            "Graph: created {} as {} ({} ports, {:?})",
            spec.name,
            label,
            ports.len(),
            spec.capability
        );

        let component = Component {
            id,
            label: label.to_string(),
            capability: spec.capability,
            handle,
            state,
            ports,
            is_endpoint: false,
            eos_seen: false,
            flush_pending: false,
            event_handler: None,
            buffer_handler: None,
        };
        self.core.lock().components.insert(0, component);
        Ok(id)
    }

    /// Most recently created component carrying `label`. Absence is a
    /// legitimate answer, not a fault.
    pub fn lookup_component(&self, label: &str) -> Option<ComponentId> {
        self.core
            .lock()
            .components
            .iter()
            .find(|c| c.label == label)
            .map(|c| c.id)
    }

    pub fn component_ids(&self) -> Vec<ComponentId> {
        self.core.lock().components.iter().map(|c| c.id).collect()
    }

    pub fn component_count(&self) -> usize {
        self.core.lock().components.len()
    }

    pub fn component_info(&self, id: ComponentId) -> Result<ComponentInfo> {
        Ok(self.core.lock().component(id)?.info())
    }

    pub fn component_state(&self, id: ComponentId) -> Result<ComponentState> {
        Ok(self.core.lock().component(id)?.state)
    }

    /// Provider handle of a component, for parameter and config calls
    pub fn handle(&self, id: ComponentId) -> Result<Arc<dyn ComponentHandle>> {
        Ok(self.core.lock().component(id)?.handle.clone())
    }

    /// Removes a Loaded component that has no tunnel left
    pub fn remove_component(&self, id: ComponentId) -> Result<()> {
        let removed = {
            let mut inner = self.core.lock();
            let pos = inner
                .components
                .iter()
                .position(|c| c.id == id)
                .ok_or_else(|| GraphError::ComponentNotFound(id.to_string()))?;
            let comp = &inner.components[pos];
            if comp.state != ComponentState::Loaded {
                return Err(GraphError::InvalidState(format!(
                    "{} is {}, not Loaded",
                    comp.label, comp.state
                )));
            }
            if !comp.is_untunneled() {
                return Err(GraphError::InvalidState(format!("{} is still tunneled", comp.label)));
            }
            let comp = inner.components.remove(pos);
            inner.clear_endpoint(&comp);
            if inner.clock == Some(id) {
                inner.clock = None;
            }
            comp
        };
        self.release(removed);
        Ok(())
    }

    /// Frees whatever buffers a component still holds, then drops it
    fn release(&self, mut comp: Component) {
        for port in comp.ports.iter_mut() {
            if port.buffers.is_empty() {
                continue;
            }
            let leaked = std::mem::take(&mut port.buffers);
            warn!(
                "Graph: {} port {} still holds {} buffer(s) at release",
                comp.label,
                port.index,
                leaked.len()
            );
            self.core.health.record_leaked_buffers(leaked.len());
            for buffer in leaked {
                if let Err(e) = comp.handle.free_buffer(port.index, buffer) {
                    warn!("Graph: freeing buffer on {}:{} failed: {}", comp.label, port.index, e);
                }
            }
        }
        debug!("Graph: released {}", comp.label);
    }

    // ── Handlers ───────────────────────────────────────────────────────

    pub fn set_event_handler(&self, id: ComponentId, handler: EventHandler) -> Result<()> {
        self.core.lock().component_mut(id)?.event_handler = Some(handler);
        Ok(())
    }

    pub fn set_buffer_handler(&self, id: ComponentId, handler: BufferHandler) -> Result<()> {
        self.core.lock().component_mut(id)?.buffer_handler = Some(handler);
        Ok(())
    }

    pub fn set_graph_event_handler(&self, handler: GraphEventHandler) {
        self.core.lock().event_handler = Some(handler);
    }

    // ── State transitions ──────────────────────────────────────────────

    /// Blocks until `id` reports `target`, enters Invalid, or (with error
    /// watching on) the graph stores an error
    fn wait_for_state(
        &self,
        id: ComponentId,
        target: ComponentState,
        deadline: Instant,
        timeout_ms: u64,
        watch_errors: bool,
    ) -> Result<()> {
        self.core.wait_until(deadline, timeout_ms, |inner| {
            let comp = match inner.component(id) {
                Ok(c) => c,
                Err(e) => return Some(Err(e)),
            };
            if comp.state == target {
                return Some(Ok(()));
            }
            if comp.state == ComponentState::Invalid {
                return Some(Err(GraphError::InvalidState(format!(
                    "{} went Invalid",
                    comp.label
                ))));
            }
            if watch_errors {
                inner.watched_error().map(Err)
            } else {
                None
            }
        })
    }

    /// Reads the component's own view of its state and requests `target`
    /// when it differs. Returns whether a command was sent.
    fn request_state(&self, id: ComponentId, target: ComponentState) -> Result<bool> {
        let handle = self.handle(id)?;
        let current = handle.state()?;
        self.core.lock().component_mut(id)?.state = current;
        if current == target {
            return Ok(false);
        }
        handle.send_command(Command::StateSet(target))?;
        Ok(true)
    }

    pub fn transition_component(
        &self,
        id: ComponentId,
        target: ComponentState,
        timeout_ms: u64,
    ) -> Result<()> {
        let deadline = deadline_after(timeout_ms);
        let watch = self.core.lock().watch_errors;
        self.request_state(id, target)?;
        if let Err(e) = self.wait_for_state(id, target, deadline, timeout_ms, watch) {
            self.store_transition_error(&e);
            return Err(e);
        }
        self.core.health.record_transition();
        Ok(())
    }

    /// A transition that ran out of time becomes the graph error unless
    /// an earlier one is already stored
    fn store_transition_error(&self, error: &GraphError) {
        if !error.is_timeout() {
            return;
        }
        {
            let mut inner = self.core.lock();
            if inner.error.is_some() {
                return;
            }
            inner.error = Some(error.clone());
        }
        self.core.wake();
    }

    /// Requests `target` from every component, then waits on all of them
    /// against one shared deadline
    pub fn transition_all(&self, target: ComponentState, timeout_ms: u64) -> Result<()> {
        let watch = self.core.lock().watch_errors;
        self.transition_all_inner(target, timeout_ms, watch)
    }

    fn transition_all_inner(
        &self,
        target: ComponentState,
        timeout_ms: u64,
        watch_errors: bool,
    ) -> Result<()> {
        let deadline = deadline_after(timeout_ms);
        let ids = self.component_ids();
        info!("Graph: transition {} component(s) to {}", ids.len(), target);

        for id in &ids {
            self.request_state(*id, target)?;
        }
        for id in &ids {
            if let Err(e) = self.wait_for_state(*id, target, deadline, timeout_ms, watch_errors) {
                let label = self
                    .component_info(*id)
                    .map(|c| c.label)
                    .unwrap_or_default();
                warn!("Graph: {} did not reach {}: {}", label, target, e);
                self.store_transition_error(&e);
                return Err(e);
            }
        }

        self.core.lock().state = target;
        self.core.health.record_transition();
        Ok(())
    }

    /// Like [`Graph::transition_all`], but on failure drives every
    /// component back to Loaded before returning the original error
    pub fn transition_all_or_unload(&self, target: ComponentState, timeout_ms: u64) -> Result<()> {
        match self.transition_all(target, timeout_ms) {
            Ok(()) => Ok(()),
            Err(e) => {
                if let Err(fallback) =
                    self.transition_all_inner(ComponentState::Loaded, timeout_ms, false)
                {
                    warn!("Graph: fallback to Loaded failed: {}", fallback);
                }
                Err(e)
            }
        }
    }

    /// Flushes every port of every component and waits for each to confirm
    pub fn flush_all_components(&self, timeout_ms: u64) -> Result<()> {
        let deadline = deadline_after(timeout_ms);
        let targets: Vec<(ComponentId, Arc<dyn ComponentHandle>)> = {
            let mut inner = self.core.lock();
            inner
                .components
                .iter_mut()
                .map(|c| {
                    c.flush_pending = true;
                    (c.id, c.handle.clone())
                })
                .collect()
        };

        for (id, handle) in &targets {
            if let Err(e) = handle.send_command(Command::Flush(PortSelector::All)) {
                if let Some(c) = self.core.lock().find_mut(*id) {
                    c.flush_pending = false;
                }
                return Err(e);
            }
        }
        for (id, _) in &targets {
            self.core.wait_until(deadline, timeout_ms, |inner| match inner.find(*id) {
                Some(c) if c.flush_pending => inner.watched_error().map(Err),
                _ => Some(Ok(())),
            })?;
        }
        Ok(())
    }

    // ── End of stream ──────────────────────────────────────────────────

    /// Makes `id` one of the components whose EOS completes the graph
    pub fn set_component_as_endpoint(&self, id: ComponentId) -> Result<()> {
        let mut inner = self.core.lock();
        let comp = inner.component_mut(id)?;
        if comp.is_endpoint {
            return Ok(());
        }
        comp.is_endpoint = true;
        comp.eos_seen = false;
        inner.need_eos += 1;
        inner.max_eos += 1;
        Ok(())
    }

    pub fn is_at_end_of_stream(&self) -> bool {
        self.core.lock().at_eos
    }

    /// `false` re-arms every endpoint without waking anyone; `true` forces
    /// the graph to EOS and releases waiters
    pub fn set_end_of_stream(&self, at_eos: bool) {
        let mut inner = self.core.lock();
        if at_eos {
            inner.at_eos = true;
            inner.need_eos = 0;
            drop(inner);
            self.core.wake();
        } else {
            inner.at_eos = false;
            inner.need_eos = inner.max_eos;
            for comp in inner.components.iter_mut() {
                comp.eos_seen = false;
            }
        }
    }

    /// Wakes EOS waiters so they re-check the aggregate condition
    pub fn signal_end_of_stream_event(&self) {
        let _guard = self.core.lock();
        self.core.wake();
    }

    /// Blocks until every endpoint reported EOS (or EOS was forced). A
    /// stored component error ends the wait with that error.
    pub fn wait_for_end_of_stream(&self, timeout_ms: u64) -> Result<()> {
        self.core
            .wait_until(deadline_after(timeout_ms), timeout_ms, |inner| {
                if inner.at_eos {
                    Some(Ok(()))
                } else {
                    inner.error.clone().map(Err)
                }
            })
    }

    // ── Errors ─────────────────────────────────────────────────────────

    pub fn get_error(&self) -> Option<GraphError> {
        self.core.lock().error.clone()
    }

    pub fn clear_error(&self) {
        self.core.lock().error = None;
    }

    /// Whether state and port waits end early on a stored error
    pub fn set_wait_for_errors_on_state(&self, watch: bool) {
        self.core.lock().watch_errors = watch;
    }

    // ── Teardown ───────────────────────────────────────────────────────

    /// Brings every component down to Loaded, unties all tunnels and frees
    /// every component. Failures are logged and never stop the teardown.
    pub fn teardown(&self) {
        let state = {
            let mut inner = self.core.lock();
            if inner.components.is_empty() {
                return;
            }
            inner.at_eos = true;
            inner.error = None;
            inner.state
        };
        self.core.wake();
        let timeout = self.config.teardown_timeout_ms;

        let mut state = state;
        if matches!(state, ComponentState::Executing | ComponentState::Pause) {
            if let Err(e) = self.stop_clock() {
                warn!("Graph: stopping clock during teardown: {}", e);
            }
            match self.transition_all_inner(ComponentState::Idle, timeout, false) {
                Ok(()) => state = ComponentState::Idle,
                Err(e) => warn!("Graph: teardown to Idle: {}", e),
            }
            self.clear_error();
        }
        if state == ComponentState::Idle {
            if let Err(e) = self.transition_all_inner(ComponentState::Loaded, timeout, false) {
                warn!("Graph: teardown to Loaded: {}", e);
            }
        }

        let tunneled: Vec<PortRef> = {
            let inner = self.core.lock();
            inner
                .components
                .iter()
                .flat_map(|c| {
                    c.ports
                        .iter()
                        .filter(|p| p.is_tunneled())
                        .map(move |p| PortRef::new(c.id, p.index))
                })
                .collect()
        };
        for at in tunneled {
            if let Err(e) = self.set_untunneled(at.component, at.port) {
                warn!("Graph: untunnel {} during teardown: {}", at, e);
            }
        }

        let components = {
            let mut inner = self.core.lock();
            inner.clock = None;
            inner.need_eos = 0;
            inner.max_eos = 0;
            inner.state = ComponentState::Loaded;
            std::mem::take(&mut inner.components)
        };
        info!("Graph: freeing {} component(s)", components.len());
        for comp in components {
            self.release(comp);
        }
    }

    /// Tears the graph down and releases its hold on the framework
    pub fn deinit(self) {
        drop(self);
    }
}

impl Drop for Graph {
    fn drop(&mut self) {
        self.teardown();
        self.framework.graph_dropped();
    }
}

impl std::fmt::Debug for Graph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.core.lock();
        f.debug_struct("Graph")
            .field("state", &inner.state)
            .field("components", &inner.components.len())
            .field("clock", &inner.clock)
            .field("at_eos", &inner.at_eos)
            .field("error", &inner.error)
            .finish()
    }
}
