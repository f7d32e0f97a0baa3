//! Pass-through to the graph's clock component

use log::{debug, warn};
use std::sync::Arc;
use std::time::Duration;

use crate::error::{GraphError, Result};
use crate::provider::ComponentHandle;
use crate::provider::params::{ClockRunState, ClockState};
use crate::provider::{Config, ConfigIndex};

use super::Graph;

impl Graph {
    fn clock_handle(&self) -> Option<Arc<dyn ComponentHandle>> {
        let inner = self.core.lock();
        let id = inner.clock?;
        inner.find(id).map(|c| c.handle.clone())
    }

    /// Starts the clock at `start_ms`. A clock that is not ready yet is
    /// retried on a fixed interval, a bounded number of times.
    pub fn start_clock(&self, start_ms: i64) -> Result<()> {
        let Some(clock) = self.clock_handle() else {
            return Ok(());
        };
        let value = Config::ClockState(ClockState {
            state: ClockRunState::Running,
            start_time_us: start_ms.saturating_mul(1000),
        });

        let interval = self.config.clock_retry_interval_ms;
        for _ in 0..=self.config.clock_retry_limit {
            match clock.set_config(0, value.clone()) {
                Ok(()) => {
                    debug!("Graph: clock running from {} ms", start_ms);
                    return Ok(());
                }
                Err(GraphError::NotReady) => std::thread::sleep(Duration::from_millis(interval)),
                Err(e) => return Err(e),
            }
        }
        warn!("Graph: clock never became ready");
        Err(GraphError::Timeout(
            interval.saturating_mul(u64::from(self.config.clock_retry_limit)),
        ))
    }

    pub fn stop_clock(&self) -> Result<()> {
        let Some(clock) = self.clock_handle() else {
            return Ok(());
        };
        clock.set_config(
            0,
            Config::ClockState(ClockState {
                state: ClockRunState::Stopped,
                start_time_us: 0,
            }),
        )
    }

    /// Freezes (`true`) or resumes (`false`) media time
    pub fn pause_clock(&self, pause: bool) -> Result<()> {
        let Some(clock) = self.clock_handle() else {
            return Ok(());
        };
        clock.set_config(0, Config::TimeScale(if pause { 0.0 } else { 1.0 }))
    }

    /// Current media time in ms, 0 without a clock or when it cannot be read
    pub fn get_clock_time(&self) -> i64 {
        let Some(clock) = self.clock_handle() else {
            return 0;
        };
        match clock
            .get_config(0, ConfigIndex::CurrentMediaTime)
            .and_then(|reply| crate::unpack!(reply, Config::CurrentMediaTime))
        {
            Ok(us) => us / 1000,
            Err(e) => {
                debug!("Graph: clock time unavailable: {}", e);
                0
            }
        }
    }

    /// Pushes a playback speed to every component. Refusals are logged,
    /// components that do not scale time simply ignore it.
    pub fn set_rate(&self, speed: f32) -> Result<()> {
        let targets: Vec<(String, Arc<dyn ComponentHandle>)> = {
            let inner = self.core.lock();
            inner
                .components
                .iter()
                .map(|c| (c.label.clone(), c.handle.clone()))
                .collect()
        };
        for (label, handle) in targets {
            if let Err(e) = handle.set_config(0, Config::TimeScale(speed)) {
                debug!("Graph: {} ignores rate {}: {}", label, speed, e);
            }
        }
        Ok(())
    }
}
