//! Component lifecycle state

/// Lifecycle state of a component, mirrored at graph level
///
/// `Loaded → Idle → {Executing, Pause} → Idle → Loaded`, with
/// `Pause ⇄ Executing` reversible. Every edge must be confirmed by the
/// component before the graph treats it as complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComponentState {
    /// Component failed and must be torn down
    Invalid,

    /// Created, no resources held
    Loaded,

    /// Resources allocated, not processing
    Idle,

    /// Processing buffers
    Executing,

    /// Holding buffers without processing
    Pause,

    /// Waiting for the provider to grant resources
    WaitForResources,
}

impl ComponentState {
    /// Check if this state transition is valid
    pub fn can_transition_to(&self, target: &ComponentState) -> bool {
        use ComponentState::*;

        match (self, target) {
            (Loaded, Idle) => true,
            (Loaded, WaitForResources) => true,
            (WaitForResources, Loaded) => true,
            (WaitForResources, Idle) => true,

            (Idle, Loaded) => true,
            (Idle, Executing) => true,
            (Idle, Pause) => true,

            (Executing, Idle) => true,
            (Executing, Pause) => true,

            (Pause, Idle) => true,
            (Pause, Executing) => true,

            // Any state may fall into Invalid, nothing leaves it
            (_, Invalid) => true,
            (Invalid, _) => false,

            (a, b) if a == b => true,

            _ => false,
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            ComponentState::Invalid => "Invalid",
            ComponentState::Loaded => "Loaded",
            ComponentState::Idle => "Idle",
            ComponentState::Executing => "Executing",
            ComponentState::Pause => "Pause",
            ComponentState::WaitForResources => "WaitForResources",
        }
    }

    /// Executing or paused
    pub fn is_active(&self) -> bool {
        matches!(self, ComponentState::Executing | ComponentState::Pause)
    }

    pub fn is_running(&self) -> bool {
        matches!(self, ComponentState::Executing)
    }

    /// States in which a graph has never started producing
    pub fn is_inactive(&self) -> bool {
        matches!(self, ComponentState::Loaded | ComponentState::Idle)
    }
}

impl std::fmt::Display for ComponentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.description())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_transitions() {
        use ComponentState::*;

        assert!(Loaded.can_transition_to(&Idle));
        assert!(Idle.can_transition_to(&Executing));
        assert!(Idle.can_transition_to(&Pause));
        assert!(Executing.can_transition_to(&Pause));
        assert!(Pause.can_transition_to(&Executing));
        assert!(Executing.can_transition_to(&Idle));
        assert!(Idle.can_transition_to(&Loaded));

        assert!(Idle.can_transition_to(&Idle));
        assert!(Executing.can_transition_to(&Invalid));
    }

    #[test]
    fn test_invalid_transitions() {
        use ComponentState::*;

        assert!(!Loaded.can_transition_to(&Executing));
        assert!(!Loaded.can_transition_to(&Pause));
        assert!(!Executing.can_transition_to(&Loaded));
        assert!(!Invalid.can_transition_to(&Loaded));
    }

    #[test]
    fn test_state_checks() {
        assert!(ComponentState::Executing.is_active());
        assert!(ComponentState::Executing.is_running());
        assert!(ComponentState::Pause.is_active());
        assert!(!ComponentState::Pause.is_running());
        assert!(ComponentState::Idle.is_inactive());
        assert!(!ComponentState::Idle.is_active());
        assert_eq!(ComponentState::WaitForResources.to_string(), "WaitForResources");
    }
}
