//! In-process component provider
//!
//! Every built-in component runs a worker thread that confirms commands
//! asynchronously, the way hardware-backed components do. Sources are
//! registered by URI and opened by the reader through its filename
//! parameter. Faults can be injected per component name to exercise
//! timeouts, refused tunnels and failing configs.

pub mod catalog;
pub mod clock;
pub mod component;
pub mod source;

use log::{debug, info};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use crate::error::{GraphError, Result};
use crate::provider::{ComponentDescriptor, ComponentHandle, ComponentProvider, ConfigIndex};

pub use catalog::Kind;
pub use component::SimComponent;
pub use source::{SimAudio, SimSource, SimVideo};

/// Interface version spoken by the simulated components (1.1.2.0)
pub const SIM_INTERFACE_VERSION: u32 = 0x0101_0200;

#[derive(Default)]
struct Faults {
    stalled: HashSet<String>,
    reject_tunnels: HashSet<String>,
    failing_configs: HashSet<(String, ConfigIndex)>,
    silent: HashSet<String>,
}

/// State every simulated component of one provider can see
pub(crate) struct SimShared {
    sources: Mutex<HashMap<String, SimSource>>,
    faults: Mutex<Faults>,
    clock_not_ready: AtomicU32,
}

impl SimShared {
    fn faults(&self) -> MutexGuard<'_, Faults> {
        self.faults.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub(crate) fn source(&self, uri: &str) -> Option<SimSource> {
        self.sources
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(uri)
            .cloned()
    }

    pub(crate) fn is_stalled(&self, name: &str) -> bool {
        self.faults().stalled.contains(name)
    }

    pub(crate) fn is_silent(&self, name: &str) -> bool {
        self.faults().silent.contains(name)
    }

    pub(crate) fn rejects_tunnels(&self, name: &str) -> bool {
        self.faults().reject_tunnels.contains(name)
    }

    pub(crate) fn config_fails(&self, name: &str, index: ConfigIndex) -> bool {
        self.faults()
            .failing_configs
            .contains(&(name.to_string(), index))
    }

    /// Consumes one pending "clock not ready" answer
    pub(crate) fn take_not_ready(&self) -> bool {
        self.clock_not_ready
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .is_ok()
    }
}

pub struct SimProvider {
    shared: Arc<SimShared>,
    loaded: AtomicBool,
    fail_load: AtomicBool,
    custom: Mutex<Vec<ComponentDescriptor>>,
    instances: Mutex<HashMap<String, Weak<SimComponent>>>,
}

impl SimProvider {
    pub fn new() -> Arc<SimProvider> {
        Arc::new(SimProvider {
            shared: Arc::new(SimShared {
                sources: Mutex::new(HashMap::new()),
                faults: Mutex::new(Faults::default()),
                clock_not_ready: AtomicU32::new(0),
            }),
            loaded: AtomicBool::new(false),
            fail_load: AtomicBool::new(false),
            custom: Mutex::new(Vec::new()),
            instances: Mutex::new(HashMap::new()),
        })
    }

    pub(crate) fn shared(&self) -> Arc<SimShared> {
        self.shared.clone()
    }

    /// Makes `uri` openable by the reader
    pub fn add_source(&self, uri: impl Into<String>, source: SimSource) {
        self.shared
            .sources
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(uri.into(), source);
    }

    pub fn fail_load(&self, fail: bool) {
        self.fail_load.store(fail, Ordering::Release);
    }

    /// Components named `name` stop confirming state changes
    pub fn stall(&self, name: &str, stalled: bool) {
        let mut faults = self.shared.faults();
        if stalled {
            faults.stalled.insert(name.to_string());
        } else {
            faults.stalled.remove(name);
        }
    }

    /// Components named `name` run but never pass a picture downstream
    pub fn silence(&self, name: &str) {
        self.shared.faults().silent.insert(name.to_string());
    }

    pub fn reject_tunnels(&self, name: &str) {
        self.shared.faults().reject_tunnels.insert(name.to_string());
    }

    pub fn accept_tunnels(&self, name: &str) {
        self.shared.faults().reject_tunnels.remove(name);
    }

    /// `get_config`/`set_config` of `index` on `name` fail
    pub fn fail_config(&self, name: &str, index: ConfigIndex) {
        self.shared
            .faults()
            .failing_configs
            .insert((name.to_string(), index));
    }

    /// The clock answers `NotReady` to its next `times` start requests
    pub fn clock_not_ready(&self, times: u32) {
        self.shared.clock_not_ready.store(times, Ordering::Release);
    }

    /// Most recent live built-in instance created under `name`
    pub fn instance(&self, name: &str) -> Option<Arc<SimComponent>> {
        self.instances
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(name)
            .and_then(Weak::upgrade)
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded.load(Ordering::Acquire)
    }
}

impl ComponentProvider for SimProvider {
    fn interface_version(&self) -> u32 {
        SIM_INTERFACE_VERSION
    }

    fn load(&self) -> Result<()> {
        if self.fail_load.load(Ordering::Acquire) {
            return Err(GraphError::ResourceError("simulated load failure".into()));
        }
        if self.loaded.swap(true, Ordering::AcqRel) {
            return Err(GraphError::InvalidState("provider already loaded".into()));
        }
        info!("Sim: provider loaded");
        Ok(())
    }

    fn unload(&self) -> Result<()> {
        if !self.loaded.swap(false, Ordering::AcqRel) {
            return Err(GraphError::InvalidState("provider not loaded".into()));
        }
        info!("Sim: provider unloaded");
        Ok(())
    }

    fn register_component(&self, descriptor: ComponentDescriptor) -> Result<()> {
        let mut custom = self.custom.lock().unwrap_or_else(|e| e.into_inner());
        if custom.iter().any(|d| d.name == descriptor.name) {
            return Err(GraphError::InvalidState(format!(
                "{} is already registered",
                descriptor.name
            )));
        }
        custom.push(descriptor);
        Ok(())
    }

    fn create(&self, name: &str, version: u32) -> Result<Arc<dyn ComponentHandle>> {
        if !self.is_loaded() {
            return Err(GraphError::InvalidState("provider not loaded".into()));
        }
        if version != SIM_INTERFACE_VERSION {
            return Err(GraphError::VersionMismatch {
                expected: SIM_INTERFACE_VERSION,
                actual: version,
            });
        }

        let factory = self
            .custom
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .find(|d| d.name == name)
            .map(|d| d.factory.clone());
        if let Some(factory) = factory {
            debug!("Sim: creating custom {}", name);
            return factory(version);
        }

        let kind = catalog::kind_of(name)
            .ok_or_else(|| GraphError::ComponentNotFound(name.to_string()))?;
        let component = SimComponent::spawn(name, kind, self.shared.clone())?;
        self.instances
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(name.to_string(), Arc::downgrade(&component));
        debug!("Sim: created {} ({:?})", name, kind);
        Ok(component)
    }

    fn components_of_role(&self, role: &str) -> Result<Vec<String>> {
        let mut names: Vec<String> = self
            .custom
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|d| d.roles.iter().any(|r| r == role))
            .map(|d| d.name.clone())
            .collect();
        names.extend(catalog::builtin_role(role).iter().map(|s| s.to_string()));
        Ok(names)
    }
}

impl std::fmt::Debug for SimProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimProvider")
            .field("loaded", &self.is_loaded())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::ComponentFactory;

    #[test]
    fn test_version_checked_on_create() {
        let provider = SimProvider::new();
        provider.load().unwrap();
        let err = provider.create("OMX.Nvidia.reader", 1).err().unwrap();
        assert!(matches!(err, GraphError::VersionMismatch { actual: 1, .. }));
        assert!(provider
            .create("OMX.Nvidia.reader", SIM_INTERFACE_VERSION)
            .is_ok());
    }

    #[test]
    fn test_unknown_name() {
        let provider = SimProvider::new();
        provider.load().unwrap();
        let err = provider
            .create("OMX.Nvidia.teleporter", SIM_INTERFACE_VERSION)
            .err()
            .unwrap();
        assert!(matches!(err, GraphError::ComponentNotFound(_)));
    }

    #[test]
    fn test_double_load_rejected() {
        let provider = SimProvider::new();
        provider.load().unwrap();
        assert!(provider.load().is_err());
        provider.unload().unwrap();
        assert!(provider.unload().is_err());
    }

    #[test]
    fn test_custom_component_roles() {
        let provider = SimProvider::new();
        provider.load().unwrap();
        let shared = provider.shared();
        let factory: ComponentFactory = Arc::new(move |_| {
            let comp: Arc<dyn ComponentHandle> =
                SimComponent::spawn("OMX.Custom.tone", Kind::AudioCapturer, shared.clone())?;
            Ok(comp)
        });
        provider
            .register_component(ComponentDescriptor {
                name: "OMX.Custom.tone".into(),
                roles: vec!["audio_renderer.pcm".into()],
                factory,
            })
            .unwrap();

        let names = provider.components_of_role("audio_renderer.pcm").unwrap();
        assert_eq!(names[0], "OMX.Custom.tone");
        assert_eq!(names[1], "OMX.Nvidia.audio.render");

        let comp = provider
            .create("OMX.Custom.tone", SIM_INTERFACE_VERSION)
            .unwrap();
        assert_eq!(comp.name(), "OMX.Custom.tone");
    }

    #[test]
    fn test_clock_not_ready_countdown() {
        let provider = SimProvider::new();
        provider.clock_not_ready(2);
        assert!(provider.shared.take_not_ready());
        assert!(provider.shared.take_not_ready());
        assert!(!provider.shared.take_not_ready());
    }

    #[test]
    fn test_instance_tracks_latest() {
        let provider = SimProvider::new();
        provider.load().unwrap();
        let handle = provider
            .create("OMX.Nvidia.audio.render", SIM_INTERFACE_VERSION)
            .unwrap();
        assert!(provider.instance("OMX.Nvidia.audio.render").is_some());
        drop(handle);
        assert!(provider.instance("OMX.Nvidia.audio.render").is_none());
    }
}
