use crate::engine::focus::PanelState;
use crate::engine::registry::{ControlHandle, ControlRegistry};
use crate::engine::scheduler::RevealScheduler;
use crate::model::Node;
use crate::nav::flatten::branch_chain;
use tracing::debug;

/// The rendering surface as seen by the navigator.
pub trait ViewportHost {
    /// Scroll so the control sits in the middle of its viewport.
    fn center(&mut self, handle: ControlHandle);
    /// Current laid-out content size; stable across two checks means the
    /// layout has settled.
    fn extent(&self) -> (u16, u16);
    fn focus(&mut self, path: &str);
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum Phase {
    Idle,
    Waiting {
        target: String,
        attempts: u32,
    },
    Settling {
        target: String,
        last: (u16, u16),
        stable: u32,
        attempts: u32,
    },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NavStatus {
    Idle,
    Pending,
    Focused(String),
    GaveUp(String),
}

/// Reveals and focuses the first invalid control after a failed submit.
#[derive(Clone, Debug)]
pub struct ErrorNavigator {
    phase: Phase,
    max_attempts: u32,
    settle_checks: u32,
}

impl ErrorNavigator {
    pub fn new(max_attempts: u32, settle_checks: u32) -> Self {
        Self {
            phase: Phase::Idle,
            max_attempts: max_attempts.max(1),
            settle_checks: settle_checks.max(1),
        }
    }

    pub fn target(&self) -> Option<&str> {
        match &self.phase {
            Phase::Idle => None,
            Phase::Waiting { target, .. } | Phase::Settling { target, .. } => Some(target),
        }
    }

    pub fn is_active(&self) -> bool {
        self.phase != Phase::Idle
    }

    pub fn cancel(&mut self) {
        self.phase = Phase::Idle;
    }

    /// Open the tab/sections holding `first` and start waiting for its
    /// control to mount.
    pub fn start(
        &mut self,
        first: &str,
        nodes: &[Node],
        panels: &mut PanelState,
        reveal: &mut RevealScheduler,
    ) {
        let chain = branch_chain(nodes, first);
        panels.reveal(&chain);
        reveal.demand(first);
        debug!(path = first, branches = chain.len(), "navigating to invalid field");
        self.phase = Phase::Waiting {
            target: first.to_string(),
            attempts: 0,
        };
    }

    /// One frame of work. Never fails; an unreachable control is dropped.
    pub fn tick(
        &mut self,
        registry: &ControlRegistry,
        host: &mut dyn ViewportHost,
        reveal: &mut RevealScheduler,
    ) -> NavStatus {
        let phase = std::mem::replace(&mut self.phase, Phase::Idle);
        match phase {
            Phase::Idle => NavStatus::Idle,
            Phase::Waiting { target, attempts } => match registry.get(&target) {
                Some(handle) => {
                    host.center(handle);
                    self.phase = Phase::Settling {
                        last: host.extent(),
                        target,
                        stable: 0,
                        attempts: attempts + 1,
                    };
                    NavStatus::Pending
                }
                None if attempts + 1 >= self.max_attempts => {
                    debug!(path = %target, attempts, "control never mounted; giving up");
                    NavStatus::GaveUp(target)
                }
                None => {
                    reveal.demand(target.as_str());
                    self.phase = Phase::Waiting {
                        target,
                        attempts: attempts + 1,
                    };
                    NavStatus::Pending
                }
            },
            Phase::Settling {
                target,
                last,
                stable,
                attempts,
            } => {
                let now = host.extent();
                let stable = if now == last { stable + 1 } else { 0 };
                if stable >= self.settle_checks {
                    if let Some(handle) = registry.get(&target) {
                        host.center(handle);
                    }
                    host.focus(&target);
                    return NavStatus::Focused(target);
                }
                if attempts + 1 >= self.max_attempts {
                    debug!(path = %target, "layout never settled; giving up");
                    return NavStatus::GaveUp(target);
                }
                self.phase = Phase::Settling {
                    target,
                    last: now,
                    stable,
                    attempts: attempts + 1,
                };
                NavStatus::Pending
            }
        }
    }
}
