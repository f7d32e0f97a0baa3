//! Component graph orchestration for tunneled media pipelines
//!
//! A [`Framework`] wraps a component provider. [`Graph`] builds pipelines
//! of provider components, tunnels their ports and drives them through
//! coordinated state changes. [`PlayerGraph`] and [`RecorderGraph`] are
//! the playback and capture policies built on top of it.

pub mod xmacro;

pub mod config;
pub mod error;
pub mod framework;
pub mod graph;
pub mod player;
pub mod provider;
pub mod recorder;
pub mod utils;

pub use config::GraphConfig;
pub use error::{ErrorCode, GraphError, Result};
pub use framework::Framework;
pub use graph::{ComponentId, ComponentState, Graph};
pub use player::{PlayerGraph, PlayerType};
pub use recorder::{RecorderGraph, RecorderState};
