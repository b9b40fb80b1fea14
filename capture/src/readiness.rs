//! Readiness bookkeeping for the preparation actions of one job
//!
//! Each action carries a tri-state readiness plus a flag that swallows the next
//! reading, for devices that echo a freshly set value back as if it were measured.
//! Whether an action has ever received a real reading is tracked separately in the
//! shared [`CameraState`](crate::camera_state::CameraState), since it does not
//! depend on which job asked.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Actions that have to be completed before a capture may start
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActionKind {
    Filter,
    Temperature,
    Rotator,
    GuiderDrift,
    Autofocus,
}

impl ActionKind {
    pub const ALL: [ActionKind; 5] = [
        ActionKind::Filter,
        ActionKind::Temperature,
        ActionKind::Rotator,
        ActionKind::GuiderDrift,
        ActionKind::Autofocus,
    ];

    fn index(self) -> usize {
        match self {
            ActionKind::Filter => 0,
            ActionKind::Temperature => 1,
            ActionKind::Rotator => 2,
            ActionKind::GuiderDrift => 3,
            ActionKind::Autofocus => 4,
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ActionKind::Filter => "filter",
            ActionKind::Temperature => "temperature",
            ActionKind::Rotator => "rotator",
            ActionKind::GuiderDrift => "guider drift",
            ActionKind::Autofocus => "autofocus",
        };
        f.write_str(name)
    }
}

/// Readiness of a single action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Readiness {
    /// Waiting for the first real reading of the current value
    NotYetKnown,
    /// Current value known to be off target, waiting for the device
    Pending,
    Ready,
}

#[derive(Debug, Clone, Copy)]
struct ActionSlot {
    readiness: Readiness,
    suppress_next_echo: bool,
    /// Became ready during the running cycle
    satisfied: bool,
}

impl Default for ActionSlot {
    fn default() -> Self {
        Self {
            readiness: Readiness::Ready,
            suppress_next_echo: false,
            satisfied: false,
        }
    }
}

/// Readiness of all actions of one job
#[derive(Debug, Clone, Default)]
pub struct ReadinessMap {
    slots: [ActionSlot; 5],
}

impl ReadinessMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark every action ready and start a new preparation cycle
    pub fn set_all_ready(&mut self) {
        self.slots = Default::default();
    }

    /// Start a new cycle without touching the readiness values
    pub fn begin_cycle(&mut self) {
        for slot in self.slots.iter_mut() {
            slot.satisfied = false;
        }
    }

    pub fn readiness(&self, kind: ActionKind) -> Readiness {
        self.slots[kind.index()].readiness
    }

    pub fn is_ready(&self, kind: ActionKind) -> bool {
        self.readiness(kind) == Readiness::Ready
    }

    pub fn all_ready(&self) -> bool {
        self.slots.iter().all(|slot| slot.readiness == Readiness::Ready)
    }

    /// Actions still blocking the capture
    pub fn pending(&self) -> Vec<ActionKind> {
        ActionKind::ALL
            .into_iter()
            .filter(|kind| !self.is_ready(*kind))
            .collect()
    }

    /// Arm an action. An action that already became ready in this cycle stays
    /// ready; returns whether the action is armed afterwards.
    pub fn arm(&mut self, kind: ActionKind, readiness: Readiness) -> bool {
        let slot = &mut self.slots[kind.index()];
        if slot.satisfied {
            tracing::debug!("Not re-arming {} action, already satisfied in this cycle", kind);
            return false;
        }
        slot.readiness = readiness;
        slot.readiness != Readiness::Ready
    }

    pub fn mark_ready(&mut self, kind: ActionKind) {
        let slot = &mut self.slots[kind.index()];
        if slot.readiness != Readiness::Ready {
            slot.readiness = Readiness::Ready;
            slot.satisfied = true;
        }
    }

    /// Swallow the next reading of this action
    pub fn suppress_next_echo(&mut self, kind: ActionKind) {
        self.slots[kind.index()].suppress_next_echo = true;
    }

    /// Consume a pending echo suppression, returns true if the reading is to be dropped
    pub fn take_echo_suppression(&mut self, kind: ActionKind) -> bool {
        std::mem::replace(&mut self.slots[kind.index()].suppress_next_echo, false)
    }
}
