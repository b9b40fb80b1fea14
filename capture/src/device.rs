//! Device status vocabulary shared by the state machine and the device adaptor

use serde::{Deserialize, Serialize};

/// Exposure classification, each with its own precondition set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum FrameType {
    Light,
    Flat,
    Dark,
    Bias,
    /// No frame type assigned yet
    #[default]
    None,
}

/// State of a device property as reported by the driver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum PropertyState {
    #[default]
    Idle,
    Ok,
    Busy,
    Alert,
}

/// Dust cap (motorized scope cover) state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum DustCapState {
    /// Unparked, the cover is open
    Idle,
    Parking,
    Unparking,
    /// Parked, the cover is closed
    Parked,
    Error,
    #[default]
    Unknown,
}

/// Light of a light box or flat panel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum LightState {
    Off,
    On,
    #[default]
    Unknown,
    /// Switching requested, waiting for the device
    Busy,
}

/// Mount motion status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum MountStatus {
    #[default]
    Idle,
    Moving,
    Slewing,
    Tracking,
    Parking,
    Parked,
    Error,
}

/// Park state of a mount
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ParkState {
    #[default]
    Unknown,
    Parked,
    Parking,
    Unparking,
    Unparked,
    Error,
}

/// Dome status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum DomeState {
    #[default]
    Idle,
    Moving,
    Tracking,
    Parking,
    Unparking,
    Parked,
    Error,
}

/// Result of an autofocus run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FocusState {
    Idle,
    InProgress,
    Complete,
    Failed,
    Aborted,
}

/// Transitions reported by the filter manager
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterState {
    Idle,
    Change,
    Offset,
    /// A filter change triggered an autofocus run
    Autofocus,
}

/// Whether the camera has a mechanical shutter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ShutterStatus {
    #[default]
    Unknown,
    /// Query running
    Busy,
    Yes,
    No,
}

/// Manual scope cover as confirmed by the user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ManualCoverState {
    #[default]
    Open,
    /// Covered with a flat light source
    ClosedLight,
    /// Covered light tight
    ClosedDark,
}

/// Horizontal coordinates (degrees), used for the flat wall position
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HorizontalCoord {
    pub altitude: f64,
    pub azimuth: f64,
}

impl Default for HorizontalCoord {
    fn default() -> Self {
        // pointing straight up is the usual flat panel position
        Self {
            altitude: 90.0,
            azimuth: 0.0,
        }
    }
}
