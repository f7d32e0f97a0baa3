//! Component callbacks: applying events to graph state and fanning them
//! out to the registered handlers

use log::{debug, error};
use std::sync::Weak;

use crate::error::{ErrorCode, GraphError};
use crate::provider::{BufferDone, ComponentCallbacks, ComponentEvent, Completion, PortSelector};

use super::component::ComponentId;
use super::{GraphCore, GraphInner};

/// Callback sink registered on each component. Holds the graph weakly so
/// a late callback after teardown is simply dropped.
pub(crate) struct ComponentSink {
    core: Weak<GraphCore>,
    id: ComponentId,
}

impl ComponentSink {
    pub(crate) fn new(core: Weak<GraphCore>, id: ComponentId) -> Self {
        ComponentSink { core, id }
    }
}

impl ComponentCallbacks for ComponentSink {
    fn on_event(&self, event: ComponentEvent) {
        if let Some(core) = self.core.upgrade() {
            core.dispatch_event(self.id, event);
        }
    }

    fn on_buffer_done(&self, done: BufferDone) {
        if let Some(core) = self.core.upgrade() {
            core.dispatch_buffer(self.id, done);
        }
    }
}

impl GraphCore {
    fn dispatch_event(&self, id: ComponentId, event: ComponentEvent) {
        self.health.record_event();
        let (component_handler, graph_handler) = {
            let mut inner = self.lock();
            if self.apply_event(&mut inner, id, &event) {
                self.wake();
            }
            (
                inner.find(id).and_then(|c| c.event_handler.clone()),
                inner.event_handler.clone(),
            )
        };

        if let Some(handler) = component_handler {
            handler(&event);
        }
        if let Some(handler) = graph_handler {
            handler(id, &event);
        }
    }

    fn dispatch_buffer(&self, id: ComponentId, done: BufferDone) {
        let handler = self.lock().find(id).and_then(|c| c.buffer_handler.clone());
        match handler {
            Some(handler) => handler(&done),
            None => debug!("Graph: unhandled buffer from {}", id),
        }
    }

    /// Updates graph state for one event. Returns whether waiters should
    /// re-check their condition.
    fn apply_event(&self, inner: &mut GraphInner, id: ComponentId, event: &ComponentEvent) -> bool {
        match event {
            ComponentEvent::CommandComplete(completion) => {
                let Some(comp) = inner.find_mut(id) else {
                    return false;
                };
                match completion {
                    Completion::State(state) => {
                        debug!("Graph: {} is {}", comp.label, state);
                        comp.state = *state;
                        true
                    }
                    // A flush only counts once every port has drained
                    Completion::Flush(PortSelector::All) => {
                        comp.flush_pending = false;
                        true
                    }
                    Completion::Flush(PortSelector::Port(_)) => false,
                    Completion::PortEnabled(index) | Completion::PortDisabled(index) => {
                        let enabled = matches!(completion, Completion::PortEnabled(_));
                        match comp.port_mut(*index) {
                            Some(port) => {
                                port.enabled = enabled;
                                true
                            }
                            None => false,
                        }
                    }
                    Completion::Mark(_) => false,
                }
            }
            ComponentEvent::Error(code) if code.is_benign() => {
                debug!("Graph: ignoring {} from {}", code, id);
                false
            }
            ComponentEvent::Error(ErrorCode::None) => {
                debug!("Graph: {} reported end of stream through its error channel", id);
                inner.at_eos = true;
                inner.need_eos = 0;
                true
            }
            ComponentEvent::Error(code) => {
                let label = inner.find(id).map(|c| c.label.as_str()).unwrap_or("?");
                error!("Graph: {} reported {}", label, code);
                self.health.record_component_error();
                inner.error = Some(GraphError::ComponentError(*code));
                true
            }
            ComponentEvent::BufferFlag {
                end_of_stream: true,
                ..
            } => {
                let Some(comp) = inner.find_mut(id) else {
                    return false;
                };
                if !comp.is_endpoint || comp.eos_seen {
                    return false;
                }
                comp.eos_seen = true;
                debug!("Graph: endpoint {} reached end of stream", comp.label);
                self.health.record_eos();
                inner.need_eos = inner.need_eos.saturating_sub(1);
                if inner.need_eos == 0 {
                    inner.at_eos = true;
                }
                true
            }
            _ => false,
        }
    }
}
