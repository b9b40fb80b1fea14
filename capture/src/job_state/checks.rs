//! Precondition checks run once all readiness actions of a job are satisfied
//!
//! Every check is a small state machine of its own: it inspects the shared
//! device state, issues at most one command per step and reports whether the
//! job may proceed.

use super::{PrepareContext, SequenceJobState};
use crate::commands::DeviceCommand;
use crate::device::{
    DomeState, DustCapState, FrameType, LightState, ManualCoverState, ParkState, ShutterStatus,
};
use crate::{CalibrationPreActions, FlatSyncStatus, WallPositionState};

/// Outcome of a precondition check
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum CheckResult {
    Ready,
    /// A command is outstanding, re-check on the next event
    Busy,
    /// The job has to be aborted
    Fatal(String),
}

impl CheckResult {
    fn fatal(message: &str) -> Self {
        CheckResult::Fatal(message.to_string())
    }
}

/// Bail out of a check chain on the first result that is not ready
macro_rules! require_ready {
    ($check:expr) => {
        match $check {
            CheckResult::Ready => {}
            other => return other,
        }
    };
}

/// Manual cover requests still waiting for an answer, one per combination of
/// covering or opening and with or without light source
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct CoverQueries {
    light_cover: bool,
    dark_cover: bool,
    light_open: bool,
    dark_open: bool,
}

impl CoverQueries {
    fn flag(&mut self, closing: bool, light_source: bool) -> &mut bool {
        match (closing, light_source) {
            (true, true) => &mut self.light_cover,
            (true, false) => &mut self.dark_cover,
            (false, true) => &mut self.light_open,
            (false, false) => &mut self.dark_open,
        }
    }

    /// Registers a request; false if the same request is still unanswered
    pub(crate) fn ask(&mut self, closing: bool, light_source: bool) -> bool {
        let flag = self.flag(closing, light_source);
        if *flag {
            return false;
        }
        *flag = true;
        true
    }

    pub(crate) fn answered(&mut self, closing: bool, light_source: bool) {
        *self.flag(closing, light_source) = false;
    }
}

impl SequenceJobState {
    pub(super) fn check_flat_preconditions(&mut self, ctx: &mut PrepareContext<'_>) -> CheckResult {
        require_ready!(self.check_calibration_pre_actions_ready(ctx));
        require_ready!(self.check_flats_light_source_ready(ctx));
        self.check_flat_sync_focus(ctx)
    }

    pub(super) fn check_dark_preconditions(&mut self, ctx: &mut PrepareContext<'_>) -> CheckResult {
        require_ready!(self.check_has_shutter(ctx));
        self.check_darks_cover_ready(ctx)
    }

    /// Wall slew, mount park and dome park, in this order. Slewing to the wall
    /// and parking the mount exclude each other; the wall wins.
    fn check_calibration_pre_actions_ready(&mut self, ctx: &mut PrepareContext<'_>) -> CheckResult {
        if self.pre_actions.contains(CalibrationPreActions::WALL) {
            require_ready!(self.check_wall_position_ready(ctx, self.frame_type));
        } else if self.pre_actions.contains(CalibrationPreActions::PARK_MOUNT) {
            require_ready!(self.check_pre_mount_park_ready(ctx));
        }

        if self.pre_actions.contains(CalibrationPreActions::PARK_DOME) {
            require_ready!(self.check_pre_dome_park_ready(ctx));
        }
        CheckResult::Ready
    }

    fn check_wall_position_ready(&mut self, ctx: &mut PrepareContext<'_>, frame_type: FrameType) -> CheckResult {
        if !ctx.camera.has_telescope {
            return CheckResult::Ready;
        }

        // the mount has to be unparked before it can slew
        match ctx.camera.scope_park_state {
            ParkState::Unparked => {}
            ParkState::Error => return CheckResult::fatal("Unparking mount failed, aborting..."),
            ParkState::Parking | ParkState::Unparking => return CheckResult::Busy,
            ParkState::Unknown => {
                if !self.mount_park_state_requested {
                    self.mount_park_state_requested = true;
                    self.send(DeviceCommand::ReadMountParkState);
                }
                return CheckResult::Busy;
            }
            ParkState::Parked => {
                ctx.camera.scope_park_state = ParkState::Unparking;
                self.send(DeviceCommand::SetScopeParked(false));
                self.log("Unparking mount...");
                return CheckResult::Busy;
            }
        }

        match self.wall_state {
            WallPositionState::None => {
                let Some(wall) = ctx.options.wall_position else {
                    return CheckResult::fatal("No flat wall position configured, aborting...");
                };
                self.wall_state = WallPositionState::Slewing;
                self.send(DeviceCommand::SlewTelescope(wall));
                self.log("Mount slewing to wall position...");
                return CheckResult::Busy;
            }
            WallPositionState::Slewing | WallPositionState::TrackingBusy => return CheckResult::Busy,
            WallPositionState::SlewCompleted => {
                self.wall_state = WallPositionState::TrackingBusy;
                self.send(DeviceCommand::SetScopeTracking(false));
                self.log("Slew to wall position complete, stop tracking.");
                return CheckResult::Busy;
            }
            WallPositionState::TrackingOff => {}
        }

        // at the wall, a light box is on for flats and off otherwise
        if ctx.camera.has_light_box {
            return self.switch_light_box(ctx, frame_type == FrameType::Flat);
        }
        CheckResult::Ready
    }

    fn check_pre_mount_park_ready(&mut self, ctx: &mut PrepareContext<'_>) -> CheckResult {
        if !ctx.camera.has_telescope {
            return CheckResult::Ready;
        }

        match ctx.camera.scope_park_state {
            ParkState::Parked => CheckResult::Ready,
            ParkState::Error => CheckResult::fatal("Parking mount failed, aborting..."),
            ParkState::Parking => CheckResult::Busy,
            _ => {
                ctx.camera.scope_park_state = ParkState::Parking;
                self.send(DeviceCommand::SetScopeParked(true));
                self.log("Parking mount prior to calibration frames capture...");
                CheckResult::Busy
            }
        }
    }

    fn check_pre_dome_park_ready(&mut self, ctx: &mut PrepareContext<'_>) -> CheckResult {
        if !ctx.camera.has_dome {
            return CheckResult::Ready;
        }

        match ctx.camera.dome_state {
            DomeState::Parked => CheckResult::Ready,
            DomeState::Error => CheckResult::fatal("Parking dome failed, aborting..."),
            DomeState::Parking => CheckResult::Busy,
            _ => {
                ctx.camera.dome_state = DomeState::Parking;
                self.send(DeviceCommand::SetDomeParked(true));
                self.log("Parking dome prior to calibration frames capture...");
                CheckResult::Busy
            }
        }
    }

    fn check_flats_light_source_ready(&mut self, ctx: &mut PrepareContext<'_>) -> CheckResult {
        if ctx.camera.has_dust_cap && ctx.camera.has_light_box {
            self.check_dust_cap_ready(ctx, FrameType::Flat)
        } else if self.pre_actions.contains(CalibrationPreActions::WALL) {
            // the wall itself is the light source
            CheckResult::Ready
        } else if ctx.camera.has_light_box {
            self.switch_light_box(ctx, true)
        } else {
            self.check_manual_cover_ready(ctx, true)
        }
    }

    fn check_darks_cover_ready(&mut self, ctx: &mut PrepareContext<'_>) -> CheckResult {
        require_ready!(self.check_calibration_pre_actions_ready(ctx));

        if ctx.camera.has_dust_cap {
            self.check_dust_cap_ready(ctx, self.frame_type)
        } else if self.pre_actions.contains(CalibrationPreActions::WALL) {
            CheckResult::Ready
        } else {
            self.check_manual_cover_ready(ctx, false)
        }
    }

    /// Closes the dust cap for calibration frames and opens it for lights, then
    /// switches the light box on for flats only
    fn check_dust_cap_ready(&mut self, ctx: &mut PrepareContext<'_>, frame_type: FrameType) -> CheckResult {
        if ctx.camera.light_box_light == LightState::Busy
            || matches!(ctx.camera.dust_cap_state, DustCapState::Parking | DustCapState::Unparking)
        {
            return CheckResult::Busy;
        }
        if ctx.camera.dust_cap_state == DustCapState::Error {
            return CheckResult::fatal("Dust cap error, aborting...");
        }

        let capture_lights = frame_type == FrameType::Light;
        let target = if capture_lights {
            DustCapState::Idle
        } else {
            DustCapState::Parked
        };
        if ctx.camera.has_dust_cap && ctx.camera.dust_cap_state != target {
            ctx.camera.dust_cap_state = if capture_lights {
                DustCapState::Unparking
            } else {
                DustCapState::Parking
            };
            self.send(DeviceCommand::ParkDustCap(!capture_lights));
            self.log(if capture_lights {
                "Unparking dust cap..."
            } else {
                "Parking dust cap..."
            });
            return CheckResult::Busy;
        }

        if ctx.camera.has_light_box {
            return self.switch_light_box(ctx, frame_type == FrameType::Flat);
        }
        CheckResult::Ready
    }

    fn switch_light_box(&mut self, ctx: &mut PrepareContext<'_>, on: bool) -> CheckResult {
        let target = if on { LightState::On } else { LightState::Off };
        if ctx.camera.light_box_light == target {
            return CheckResult::Ready;
        }

        if ctx.camera.light_box_light != LightState::Busy {
            ctx.camera.light_box_light = LightState::Busy;
            self.send(DeviceCommand::SetLightBoxLight(on));
            self.log(if on {
                "Turn light box light on..."
            } else {
                "Turn light box light off..."
            });
        }
        CheckResult::Busy
    }

    /// Asks the user to cover the scope, with a flat light source or light tight.
    /// Shutterless cameras are the only ones that need a cover for darks.
    fn check_manual_cover_ready(&mut self, ctx: &mut PrepareContext<'_>, light_source: bool) -> CheckResult {
        let (question, title) = if light_source {
            if ctx.camera.manual_cover == ManualCoverState::ClosedLight {
                return CheckResult::Ready;
            }
            ("Cover the telescope with an evenly illuminated light source.", "Flat Frame")
        } else {
            if ctx.camera.manual_cover == ManualCoverState::ClosedDark
                || ctx.camera.shutter_status != ShutterStatus::No
            {
                return CheckResult::Ready;
            }
            ("Cover the telescope in order to take a dark exposure.", "Dark Exposure")
        };

        if self.cover_queries.ask(true, light_source) {
            self.send(DeviceCommand::AskManualScopeCover {
                question: question.to_string(),
                title: title.to_string(),
                light_source,
            });
        }
        CheckResult::Busy
    }

    fn check_has_shutter(&mut self, ctx: &mut PrepareContext<'_>) -> CheckResult {
        match ctx.camera.shutter_status {
            ShutterStatus::Yes | ShutterStatus::No => CheckResult::Ready,
            ShutterStatus::Busy => CheckResult::Busy,
            ShutterStatus::Unknown => {
                ctx.camera.shutter_status = ShutterStatus::Busy;
                self.send(DeviceCommand::QueryHasShutter);
                CheckResult::Busy
            }
        }
    }

    fn check_flat_sync_focus(&mut self, ctx: &mut PrepareContext<'_>) -> CheckResult {
        let Some(filter_id) = self.target_filter_id else {
            return CheckResult::Ready;
        };

        if self.flat_sync == FlatSyncStatus::Busy {
            // poll again once the retry interval has passed
            if !self.flat_sync_retry_pending {
                self.flat_sync_retry_pending = true;
                self.send_delayed(ctx.options.flat_sync_retry(), DeviceCommand::FlatSyncFocus { filter_id });
            }
            return CheckResult::Busy;
        }

        if self.frame_type == FrameType::Flat
            && ctx.options.flat_sync_focus
            && ctx.camera.autofocus_ready
            && self.flat_sync != FlatSyncStatus::Completed
        {
            self.flat_sync = FlatSyncStatus::Busy;
            self.send(DeviceCommand::FlatSyncFocus { filter_id });
            self.log("Moving focuser to the flat focus position...");
            return CheckResult::Busy;
        }
        CheckResult::Ready
    }

    /// Before light frames: light box off, dust cap open, manual cover removed
    pub(super) fn check_light_frame_scope_cover_open(&mut self, ctx: &mut PrepareContext<'_>) -> CheckResult {
        if ctx.camera.has_light_box && ctx.camera.light_box_light != LightState::Off {
            return self.switch_light_box(ctx, false);
        }

        if ctx.camera.has_dust_cap {
            return match ctx.camera.dust_cap_state {
                DustCapState::Idle => CheckResult::Ready,
                DustCapState::Error => CheckResult::fatal("Dust cap error, aborting..."),
                DustCapState::Parking | DustCapState::Unparking => CheckResult::Busy,
                DustCapState::Parked | DustCapState::Unknown => {
                    ctx.camera.dust_cap_state = DustCapState::Unparking;
                    self.send(DeviceCommand::ParkDustCap(false));
                    self.log("Unparking dust cap...");
                    CheckResult::Busy
                }
            };
        }

        if ctx.camera.manual_cover != ManualCoverState::Open {
            let light_source = ctx.camera.manual_cover == ManualCoverState::ClosedLight;
            if self.cover_queries.ask(false, light_source) {
                self.send(DeviceCommand::AskManualScopeOpen { light_source });
            }
            return CheckResult::Busy;
        }
        CheckResult::Ready
    }
}
