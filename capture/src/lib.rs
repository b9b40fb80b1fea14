//! Capture Preparation
//!
//! Decides for a single exposure job whether every physical precondition is met
//! before the exposure may begin: CCD temperature, filter, rotator angle, guiding
//! drift, calibration light source, scope and dome parking, shutter knowledge and
//! flat focus synchronisation.
//!
//! ## Structure
//!
//! - [`SequenceJobState`] is the per job state machine. It never talks to hardware
//!   itself; it queues abstract [`DeviceCommand`]s and caller [`JobNotice`]s and
//!   re-evaluates its complete readiness on every incoming [`DeviceEvent`].
//! - [`CameraState`] is shared by all jobs of a [`CaptureSequence`].
//! - [`DeviceAdaptor`] turns commands into device calls, and the
//!   [`PreparationDriver`] runs the single threaded dispatch loop on a tokio task.

pub mod adaptor;
pub mod angle;
pub mod camera_state;
pub mod commands;
pub mod device;
pub mod driver;
pub mod error;
pub mod job_state;
pub mod logging;
pub mod options;
pub mod readiness;
pub mod sequence;
pub mod sim;

pub use adaptor::{execute_command, DeviceAdaptor, NullDeviceAdaptor, SharedDeviceAdaptor};
pub use angle::{PierSide, RotatorAngles};
pub use camera_state::CameraState;
pub use commands::{DeviceCommand, DeviceEvent, JobNotice, Outgoing};
pub use device::*;
pub use driver::{DriverCommand, DriverHandle, PreparationDriver, PreparationNotice};
pub use error::{PrepareError, PrepareResult};
pub use job_state::{PrepareContext, SequenceJobState};
pub use options::{PrepareOptions, RotatorOptions};
pub use readiness::{ActionKind, Readiness, ReadinessMap};
pub use sequence::CaptureSequence;
pub use sim::{SimulatedAdaptor, SimulatedDevices};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{BitAnd, BitOr, Not};

/// Index of a job inside a [`CaptureSequence`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct JobId(pub usize);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "job#{}", self.0)
    }
}

/// Overall status of a capture job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum JobStatus {
    #[default]
    Idle,
    Busy,
    Error,
    Aborted,
    /// Set by the caller after the exposure, preparation never finishes a job
    Done,
}

/// Phase of the preparation cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum PreparationState {
    #[default]
    None,
    /// Preparing the frame capture
    Busy,
    /// Terminal, all further events are ignored
    Completed,
    /// Selecting the filter right before the exposure
    InitCapture,
}

/// What the captured image is going to be used for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum CaptureMode {
    #[default]
    Normal,
    Calibrate,
    Focus,
    Guide,
    Align,
}

/// Preparation steps reported to the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CaptureStep {
    ChangingFilter,
    SettingTemperature,
    SettingRotator,
    GuiderDrift,
    Focusing,
}

/// Defines a bitmask newtype with named flags
macro_rules! bitmask {
    ($(#[$meta:meta])* $name:ident { $($(#[$fmeta:meta])* $flag:ident = $value:expr),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
        pub struct $name(u8);

        impl $name {
            pub const NONE: $name = $name(0);
            $($(#[$fmeta])* pub const $flag: $name = $name($value);)+

            pub fn bits(self) -> u8 {
                self.0
            }

            pub fn contains(self, other: $name) -> bool {
                self.0 & other.0 == other.0
            }

            pub fn is_empty(self) -> bool {
                self.0 == 0
            }
        }

        impl BitOr for $name {
            type Output = $name;
            fn bitor(self, rhs: $name) -> $name {
                $name(self.0 | rhs.0)
            }
        }

        impl BitAnd for $name {
            type Output = $name;
            fn bitand(self, rhs: $name) -> $name {
                $name(self.0 & rhs.0)
            }
        }

        impl Not for $name {
            type Output = $name;
            fn not(self) -> $name {
                $name(!self.0)
            }
        }
    };
}

bitmask! {
    /// What the filter manager does around a filter change
    FilterPolicy {
        CHANGE = 1,
        /// Apply the focus offset of the new filter
        OFFSET = 2,
        /// Run autofocus after the change if the filter requests it
        AUTOFOCUS = 4,
    }
}

impl FilterPolicy {
    pub const ALL: FilterPolicy = FilterPolicy(1 | 2 | 4);
}

bitmask! {
    /// Actions executed before calibration frames are captured
    CalibrationPreActions {
        /// Slew to the flat wall position
        WALL = 1,
        PARK_MOUNT = 2,
        PARK_DOME = 4,
    }
}

/// Sub-phase of the slew to the flat wall
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
pub enum WallPositionState {
    #[default]
    None,
    Slewing,
    SlewCompleted,
    /// Tracking stop requested
    TrackingBusy,
    TrackingOff,
}

/// Synchronisation of the focuser to the flat focus position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum FlatSyncStatus {
    #[default]
    None,
    Busy,
    Completed,
}
