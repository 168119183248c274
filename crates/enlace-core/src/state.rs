//! Component lifecycle state machine.
//!
//! States follow the pipeline's walk: `Ready → Prepare → Active ⇄ Paused`,
//! with `Reset` returning a component to its pre-prepare shape. Transitions
//! are requested through [`TriggerCommand`]s; an already-satisfied request
//! is reported as [`StateStatus::AlreadySet`] rather than an error so the
//! caller can short-circuit chain propagation.

use crate::error::AdapterError;

/// Lifecycle state of a pipeline component.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentState {
    /// Instantiated, buffers not yet prepared.
    Ready,
    /// Buffers and geometry prepared, not yet streaming.
    Prepare,
    /// Streaming; `copy()` runs every period.
    Active,
    /// Streaming suspended, resources kept.
    Paused,
    /// Returned to a pre-prepare state after `reset()`.
    Reset,
}

/// Command requesting a lifecycle transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerCommand {
    /// Allocate buffers and compute geometry.
    Prepare,
    /// Begin streaming.
    Start,
    /// Stop streaming.
    Stop,
    /// Suspend streaming, keep resources.
    Pause,
    /// Resume from pause.
    Release,
    /// Drop prepared resources.
    Reset,
}

/// Whether a transition changed anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateStatus {
    /// The state moved to the requested target.
    Changed,
    /// The component was already in the requested state; nothing done.
    AlreadySet,
}

impl ComponentState {
    /// Apply `cmd`, returning the new state and whether it changed.
    ///
    /// Rejected transitions leave the state untouched.
    pub fn transition(
        self,
        cmd: TriggerCommand,
    ) -> Result<(ComponentState, StateStatus), AdapterError> {
        use ComponentState as S;
        use TriggerCommand as T;

        let target = match (self, cmd) {
            (S::Prepare, T::Prepare) => return Ok((self, StateStatus::AlreadySet)),
            (S::Active, T::Start) => return Ok((self, StateStatus::AlreadySet)),
            (S::Paused, T::Pause) => return Ok((self, StateStatus::AlreadySet)),

            (S::Ready | S::Reset, T::Prepare) => S::Prepare,
            (S::Prepare | S::Paused, T::Start) => S::Active,
            (S::Paused, T::Release) => S::Active,
            (S::Active, T::Pause) => S::Paused,
            (S::Active | S::Paused, T::Stop) => S::Prepare,
            (_, T::Reset) => S::Reset,

            (state, cmd) => return Err(AdapterError::InvalidTransition { state, cmd }),
        };
        Ok((target, StateStatus::Changed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nominal_walk() {
        let s = ComponentState::Ready;
        let (s, st) = s.transition(TriggerCommand::Prepare).unwrap();
        assert_eq!((s, st), (ComponentState::Prepare, StateStatus::Changed));
        let (s, _) = s.transition(TriggerCommand::Start).unwrap();
        assert_eq!(s, ComponentState::Active);
        let (s, _) = s.transition(TriggerCommand::Pause).unwrap();
        assert_eq!(s, ComponentState::Paused);
        let (s, _) = s.transition(TriggerCommand::Release).unwrap();
        assert_eq!(s, ComponentState::Active);
        let (s, _) = s.transition(TriggerCommand::Stop).unwrap();
        assert_eq!(s, ComponentState::Prepare);
    }

    #[test]
    fn double_prepare_reports_already_set() {
        let (s, _) = ComponentState::Ready
            .transition(TriggerCommand::Prepare)
            .unwrap();
        let (s2, st) = s.transition(TriggerCommand::Prepare).unwrap();
        assert_eq!(s2, ComponentState::Prepare);
        assert_eq!(st, StateStatus::AlreadySet);
    }

    #[test]
    fn reset_allowed_from_anywhere() {
        for s in [
            ComponentState::Ready,
            ComponentState::Prepare,
            ComponentState::Active,
            ComponentState::Paused,
            ComponentState::Reset,
        ] {
            let (next, _) = s.transition(TriggerCommand::Reset).unwrap();
            assert_eq!(next, ComponentState::Reset);
        }
    }

    #[test]
    fn start_from_ready_is_rejected_without_mutation() {
        let s = ComponentState::Ready;
        let err = s.transition(TriggerCommand::Start).unwrap_err();
        assert!(matches!(
            err,
            AdapterError::InvalidTransition {
                state: ComponentState::Ready,
                cmd: TriggerCommand::Start
            }
        ));
        assert_eq!(s, ComponentState::Ready);
    }

    #[test]
    fn prepare_after_reset_is_allowed() {
        let (s, _) = ComponentState::Active
            .transition(TriggerCommand::Reset)
            .unwrap();
        let (s, st) = s.transition(TriggerCommand::Prepare).unwrap();
        assert_eq!((s, st), (ComponentState::Prepare, StateStatus::Changed));
    }
}
