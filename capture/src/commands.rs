//! Message contract between the state machine, the device adaptor and the caller

use crate::device::{
    DomeState, DustCapState, FilterState, FocusState, FrameType, HorizontalCoord, MountStatus,
    ParkState, PropertyState,
};
use crate::{CaptureMode, CaptureStep, FilterPolicy};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Abstract hardware commands emitted by a job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", content = "args", rename_all = "snake_case")]
pub enum DeviceCommand {
    SetCcdTemperature(f64),
    /// Batch mode is off for previews
    SetCcdBatchMode(bool),
    /// Raw rotator angle in [0, 360)
    SetRotatorAngle(f64),
    ChangeFilterPosition {
        filter_id: i32,
        policy: FilterPolicy,
    },
    ReadFilterPosition,
    /// Ask the device to report its current value for this step
    ReadCurrentState(CaptureStep),
    SlewTelescope(HorizontalCoord),
    SetScopeTracking(bool),
    SetScopeParked(bool),
    ReadMountParkState,
    SetDomeParked(bool),
    ParkDustCap(bool),
    SetLightBoxLight(bool),
    AskManualScopeCover {
        question: String,
        title: String,
        light_source: bool,
    },
    AskManualScopeOpen {
        light_source: bool,
    },
    FlatSyncFocus {
        filter_id: i32,
    },
    QueryHasShutter,
    AbortCapture,
    /// Human readable message for the capture log
    Log(String),
}

impl DeviceCommand {
    /// Short name used in logs and error messages
    pub fn name(&self) -> &'static str {
        match self {
            DeviceCommand::SetCcdTemperature(_) => "set_ccd_temperature",
            DeviceCommand::SetCcdBatchMode(_) => "set_ccd_batch_mode",
            DeviceCommand::SetRotatorAngle(_) => "set_rotator_angle",
            DeviceCommand::ChangeFilterPosition { .. } => "change_filter_position",
            DeviceCommand::ReadFilterPosition => "read_filter_position",
            DeviceCommand::ReadCurrentState(_) => "read_current_state",
            DeviceCommand::SlewTelescope(_) => "slew_telescope",
            DeviceCommand::SetScopeTracking(_) => "set_scope_tracking",
            DeviceCommand::SetScopeParked(_) => "set_scope_parked",
            DeviceCommand::ReadMountParkState => "read_mount_park_state",
            DeviceCommand::SetDomeParked(_) => "set_dome_parked",
            DeviceCommand::ParkDustCap(_) => "park_dust_cap",
            DeviceCommand::SetLightBoxLight(_) => "set_light_box_light",
            DeviceCommand::AskManualScopeCover { .. } => "ask_manual_scope_cover",
            DeviceCommand::AskManualScopeOpen { .. } => "ask_manual_scope_open",
            DeviceCommand::FlatSyncFocus { .. } => "flat_sync_focus",
            DeviceCommand::QueryHasShutter => "query_has_shutter",
            DeviceCommand::AbortCapture => "abort_capture",
            DeviceCommand::Log(_) => "log",
        }
    }

    /// Commands that change device state, as opposed to reads and messages
    pub fn is_set_command(&self) -> bool {
        matches!(
            self,
            DeviceCommand::SetCcdTemperature(_)
                | DeviceCommand::SetRotatorAngle(_)
                | DeviceCommand::ChangeFilterPosition { .. }
                | DeviceCommand::SlewTelescope(_)
                | DeviceCommand::SetScopeTracking(_)
                | DeviceCommand::SetScopeParked(_)
                | DeviceCommand::SetDomeParked(_)
                | DeviceCommand::ParkDustCap(_)
                | DeviceCommand::SetLightBoxLight(_)
                | DeviceCommand::FlatSyncFocus { .. }
        )
    }
}

/// Notifications for the caller of a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobNotice {
    /// A preparation step has been started
    PrepareState(CaptureStep),
    PrepareComplete { success: bool },
    InitCaptureComplete(CaptureMode),
}

/// Everything a job hands to the outside world, in emission order
#[derive(Debug, Clone, PartialEq)]
pub enum Outgoing {
    Command(DeviceCommand),
    /// Command to be issued once the delay has passed
    Delayed(Duration, DeviceCommand),
    Notice(JobNotice),
}

impl Outgoing {
    pub fn command(&self) -> Option<&DeviceCommand> {
        match self {
            Outgoing::Command(cmd) | Outgoing::Delayed(_, cmd) => Some(cmd),
            Outgoing::Notice(_) => None,
        }
    }

    pub fn notice(&self) -> Option<JobNotice> {
        match self {
            Outgoing::Notice(notice) => Some(*notice),
            _ => None,
        }
    }
}

/// Input events raised by the device adaptor or the caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DeviceEvent {
    PrepareCapture {
        frame_type: FrameType,
        enforce_temperature: bool,
        enforce_guider_drift: bool,
        preview: bool,
    },
    CurrentFilterId { value: i32 },
    CurrentCcdTemperature { value: f64 },
    CurrentGuiderDrift { value: f64 },
    GuiderActive { active: bool },
    /// Raw rotator angle and the state of the rotator property
    CurrentRotatorAngle { angle: f64, state: PropertyState },
    FocusStatus { state: FocusState },
    ManualScopeCoverUpdated {
        closed: bool,
        success: bool,
        light_source: bool,
    },
    LightBoxLight { on: bool },
    DustCapStateChanged { state: DustCapState },
    ScopeStatusChanged { status: MountStatus },
    ScopeParkStatusChanged { status: ParkState },
    DomeStatusChanged { status: DomeState },
    FlatSyncFocusChanged { completed: bool },
    HasShutter { present: bool },
    FilterStatusChanged { state: FilterState },
}
