//! State shared by all capture jobs of a sequence
//!
//! Capability flags and the last known device status live here, together with
//! the per action "initialized" flags. Only the job currently reconciling mutates
//! this record; every job may read it.

use crate::device::{
    DomeState, DustCapState, LightState, ManualCoverState, MountStatus, ParkState, ShutterStatus,
};
use crate::readiness::ActionKind;
use std::collections::HashSet;

/// Shared camera and device state of one capture sequence
#[derive(Debug, Clone, Default)]
pub struct CameraState {
    /// Name of the camera, used to look up cached shutter knowledge
    pub camera_name: Option<String>,

    // device capabilities
    pub has_dust_cap: bool,
    pub has_light_box: bool,
    pub has_dome: bool,
    pub has_telescope: bool,

    // last known current values
    pub current_filter_id: Option<i32>,
    pub current_temperature: Option<f64>,
    pub current_position_angle: Option<f64>,
    pub current_guider_drift: Option<f64>,
    pub guider_active: bool,
    /// Autofocus has run at least once, so per filter focus positions exist
    pub autofocus_ready: bool,

    // last known device status
    pub shutter_status: ShutterStatus,
    pub dust_cap_state: DustCapState,
    pub light_box_light: LightState,
    pub dome_state: DomeState,
    pub scope_status: MountStatus,
    pub scope_park_state: ParkState,
    pub manual_cover: ManualCoverState,

    /// Actions for which at least one real reading has been received
    initialized: HashSet<ActionKind>,
}

impl CameraState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_camera_name(mut self, name: impl Into<String>) -> Self {
        self.camera_name = Some(name.into());
        self
    }

    pub fn is_initialized(&self, kind: ActionKind) -> bool {
        self.initialized.contains(&kind)
    }

    pub fn set_initialized(&mut self, kind: ActionKind, initialized: bool) {
        if initialized {
            self.initialized.insert(kind);
        } else {
            self.initialized.remove(&kind);
        }
    }

    /// Forget the readings of the given actions so that they are read again
    pub fn reset_initialized(&mut self, kinds: &[ActionKind]) {
        for kind in kinds {
            self.initialized.remove(kind);
        }
    }

    /// Switch to another camera: shutter knowledge belongs to the device
    pub fn set_camera_name(&mut self, name: impl Into<String>) {
        let name = name.into();
        if self.camera_name.as_deref() != Some(name.as_str()) {
            self.shutter_status = ShutterStatus::Unknown;
        }
        self.camera_name = Some(name);
    }
}
