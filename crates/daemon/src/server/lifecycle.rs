//! Mount lifecycle as an explicit state machine.
//!
//! [`transition`] is pure: given the current stage and an event it returns
//! the next stage and the effects the orchestrator must carry out. Each
//! mount's stage lives behind its own lock, so two triggers racing to stop
//! the same mount (an unmount request and the driver exiting) are ordered
//! there and only one of them gets the teardown effect.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MountStage {
    Requested,
    ConfigLoaded,
    StoreResolved,
    ObjectStoreBuilt,
    /// Registered; the driver has not confirmed it is serving yet.
    DriverStarting {
        unmount_pending: bool,
    },
    Running,
    Stopping {
        teardown_started: bool,
    },
    Done,
    Failed {
        during: &'static str,
    },
}

impl MountStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            MountStage::Requested => "requested",
            MountStage::ConfigLoaded => "config_loaded",
            MountStage::StoreResolved => "store_resolved",
            MountStage::ObjectStoreBuilt => "object_store_built",
            MountStage::DriverStarting { .. } => "driver_starting",
            MountStage::Running => "running",
            MountStage::Stopping { .. } => "stopping",
            MountStage::Done => "done",
            MountStage::Failed { .. } => "failed",
        }
    }

    /// What the pipeline is doing while in this stage, for error messages.
    pub fn activity(&self) -> &'static str {
        match self {
            MountStage::Requested => "loading config",
            MountStage::ConfigLoaded => "resolving backing store",
            MountStage::StoreResolved => "building object store",
            MountStage::ObjectStoreBuilt => "registering mount",
            MountStage::DriverStarting { .. } => "starting filesystem driver",
            MountStage::Running => "serving",
            MountStage::Stopping { .. } => "stopping",
            MountStage::Done => "stopped",
            MountStage::Failed { .. } => "failed",
        }
    }

    pub fn is_pre_registration(&self) -> bool {
        matches!(
            self,
            MountStage::Requested
                | MountStage::ConfigLoaded
                | MountStage::StoreResolved
                | MountStage::ObjectStoreBuilt
        )
    }
}

impl fmt::Display for MountStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MountEvent {
    ConfigLoaded,
    StoreResolved,
    ObjectStoreBuilt { rehydrated: bool },
    Registered,
    StageFailed,
    UnmountRequested,
    DriverStarted,
    DriverFailed,
    UnmountFailed,
    DriverExited,
    TeardownComplete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    WarnRehydrateFailed,
    Register,
    StartDriver,
    WatchCompletion,
    RegisterStats,
    UnmountDriver,
    /// Unregister stats, shut the object store down, unregister the mount
    /// and fulfill its completion signal.
    Teardown,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub next: MountStage,
    pub effects: Vec<Effect>,
}

impl Transition {
    fn to(next: MountStage) -> Self {
        Self {
            next,
            effects: Vec::new(),
        }
    }

    fn with(next: MountStage, effects: &[Effect]) -> Self {
        Self {
            next,
            effects: effects.to_vec(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid mount transition: {event:?} while {from}")]
pub struct InvalidTransition {
    pub from: MountStage,
    pub event: MountEvent,
}

pub fn transition(from: MountStage, event: MountEvent) -> Result<Transition, InvalidTransition> {
    use MountEvent as E;
    use MountStage as S;

    let transition = match (from, event) {
        (S::Requested, E::ConfigLoaded) => Transition::to(S::ConfigLoaded),
        (S::ConfigLoaded, E::StoreResolved) => Transition::to(S::StoreResolved),
        (S::StoreResolved, E::ObjectStoreBuilt { rehydrated: true }) => {
            Transition::with(S::ObjectStoreBuilt, &[Effect::Register])
        }
        (S::StoreResolved, E::ObjectStoreBuilt { rehydrated: false }) => Transition::with(
            S::ObjectStoreBuilt,
            &[Effect::WarnRehydrateFailed, Effect::Register],
        ),
        (S::ObjectStoreBuilt, E::Registered) => Transition::with(
            S::DriverStarting {
                unmount_pending: false,
            },
            &[Effect::StartDriver],
        ),
        (stage, E::StageFailed) if stage.is_pre_registration() => Transition::to(S::Failed {
            during: stage.activity(),
        }),

        (S::DriverStarting { .. }, E::UnmountRequested) => Transition::to(S::DriverStarting {
            unmount_pending: true,
        }),
        (
            S::DriverStarting {
                unmount_pending: false,
            },
            E::DriverStarted,
        ) => Transition::with(
            S::Running,
            &[Effect::WatchCompletion, Effect::RegisterStats],
        ),
        (
            S::DriverStarting {
                unmount_pending: true,
            },
            E::DriverStarted,
        ) => Transition::with(
            S::Stopping {
                teardown_started: false,
            },
            &[
                Effect::WatchCompletion,
                Effect::RegisterStats,
                Effect::UnmountDriver,
            ],
        ),
        (S::DriverStarting { .. }, E::DriverFailed) => Transition::with(
            S::Stopping {
                teardown_started: true,
            },
            &[Effect::Teardown],
        ),

        (S::Running, E::UnmountRequested) => Transition::with(
            S::Stopping {
                teardown_started: false,
            },
            &[Effect::UnmountDriver],
        ),
        (S::Running, E::DriverExited)
        | (
            S::Stopping {
                teardown_started: false,
            },
            E::DriverExited,
        ) => Transition::with(
            S::Stopping {
                teardown_started: true,
            },
            &[Effect::Teardown],
        ),
        (
            S::Stopping {
                teardown_started: false,
            },
            E::UnmountFailed,
        ) => Transition::to(S::Running),
        // Coalesced: someone is already stopping this mount.
        (stage @ S::Stopping { .. }, E::UnmountRequested)
        | (
            stage @ S::Stopping {
                teardown_started: true,
            },
            E::DriverExited,
        ) => Transition::to(stage),
        (
            S::Stopping {
                teardown_started: true,
            },
            E::TeardownComplete,
        ) => Transition::to(S::Done),

        (from, event) => return Err(InvalidTransition { from, event }),
    };

    Ok(transition)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(mut stage: MountStage, events: &[MountEvent]) -> (MountStage, Vec<Effect>) {
        let mut effects = Vec::new();
        for event in events {
            let t = transition(stage, *event).unwrap();
            stage = t.next;
            effects.extend(t.effects);
        }
        (stage, effects)
    }

    #[test]
    fn test_happy_path() {
        let (stage, effects) = run(
            MountStage::Requested,
            &[
                MountEvent::ConfigLoaded,
                MountEvent::StoreResolved,
                MountEvent::ObjectStoreBuilt { rehydrated: true },
                MountEvent::Registered,
                MountEvent::DriverStarted,
            ],
        );
        assert_eq!(stage, MountStage::Running);
        assert_eq!(
            effects,
            [
                Effect::Register,
                Effect::StartDriver,
                Effect::WatchCompletion,
                Effect::RegisterStats
            ]
        );
    }

    #[test]
    fn test_rehydrate_failure_only_warns() {
        let t = transition(
            MountStage::StoreResolved,
            MountEvent::ObjectStoreBuilt { rehydrated: false },
        )
        .unwrap();
        assert_eq!(t.next, MountStage::ObjectStoreBuilt);
        assert_eq!(t.effects, [Effect::WarnRehydrateFailed, Effect::Register]);
    }

    #[test]
    fn test_pre_registration_failure_has_no_effects() {
        for stage in [
            MountStage::Requested,
            MountStage::ConfigLoaded,
            MountStage::StoreResolved,
            MountStage::ObjectStoreBuilt,
        ] {
            let t = transition(stage, MountEvent::StageFailed).unwrap();
            assert!(matches!(t.next, MountStage::Failed { .. }));
            assert!(t.effects.is_empty());
        }
    }

    #[test]
    fn test_failure_after_registration_is_not_a_stage_failure() {
        let starting = MountStage::DriverStarting {
            unmount_pending: false,
        };
        assert!(transition(starting, MountEvent::StageFailed).is_err());
        assert!(transition(MountStage::Running, MountEvent::StageFailed).is_err());
    }

    #[test]
    fn test_driver_start_failure_tears_down() {
        let (stage, effects) = run(
            MountStage::DriverStarting {
                unmount_pending: false,
            },
            &[MountEvent::DriverFailed, MountEvent::TeardownComplete],
        );
        assert_eq!(stage, MountStage::Done);
        assert_eq!(effects, [Effect::Teardown]);
    }

    #[test]
    fn test_unmount_during_start_is_deferred() {
        let (stage, effects) = run(
            MountStage::DriverStarting {
                unmount_pending: false,
            },
            &[MountEvent::UnmountRequested, MountEvent::DriverStarted],
        );
        assert_eq!(
            stage,
            MountStage::Stopping {
                teardown_started: false
            }
        );
        assert_eq!(
            effects,
            [
                Effect::WatchCompletion,
                Effect::RegisterStats,
                Effect::UnmountDriver
            ]
        );
    }

    #[test]
    fn test_explicit_unmount_then_exit() {
        let (stage, effects) = run(
            MountStage::Running,
            &[
                MountEvent::UnmountRequested,
                MountEvent::UnmountRequested,
                MountEvent::DriverExited,
                MountEvent::DriverExited,
                MountEvent::TeardownComplete,
            ],
        );
        assert_eq!(stage, MountStage::Done);
        assert_eq!(effects, [Effect::UnmountDriver, Effect::Teardown]);
    }

    #[test]
    fn test_driver_exit_then_unmount_coalesces() {
        let (stage, effects) = run(
            MountStage::Running,
            &[MountEvent::DriverExited, MountEvent::UnmountRequested],
        );
        assert_eq!(
            stage,
            MountStage::Stopping {
                teardown_started: true
            }
        );
        assert_eq!(effects, [Effect::Teardown]);
    }

    #[test]
    fn test_failed_unmount_returns_to_running() {
        let (stage, _) = run(
            MountStage::Running,
            &[MountEvent::UnmountRequested, MountEvent::UnmountFailed],
        );
        assert_eq!(stage, MountStage::Running);
    }

    #[test]
    fn test_done_is_terminal() {
        for event in [
            MountEvent::UnmountRequested,
            MountEvent::DriverExited,
            MountEvent::Registered,
        ] {
            let err = transition(MountStage::Done, event).unwrap_err();
            assert_eq!(err.from, MountStage::Done);
        }
    }
}
