//! Preparation state machine of a single capture job
//!
//! A job compares current against target values and queues commands until every
//! action its frame type requires is satisfied. Progress is level triggered: each
//! event handler updates one value and then re-evaluates the complete readiness,
//! so duplicate or reordered device events are harmless.
//!
//! The job does not own the shared [`CameraState`]; every operation receives it
//! through a [`PrepareContext`] together with the options and the rotator angle
//! converter.

mod checks;

use crate::angle::{diff_pa, RotatorAngles};
use crate::camera_state::CameraState;
use crate::commands::{DeviceCommand, DeviceEvent, JobNotice, Outgoing};
use crate::device::{
    DomeState, DustCapState, FilterState, FocusState, FrameType, LightState, ManualCoverState,
    MountStatus, ParkState, PropertyState, ShutterStatus,
};
use crate::options::PrepareOptions;
use crate::readiness::{ActionKind, Readiness, ReadinessMap};
use crate::{
    CalibrationPreActions, CaptureMode, CaptureStep, FilterPolicy, FlatSyncStatus, JobId, JobStatus,
    PreparationState, WallPositionState,
};
use checks::{CheckResult, CoverQueries};
use std::time::Duration;

/// Actions whose readings are discarded whenever a new preparation starts.
/// Guider drift and autofocus keep theirs.
const RESET_ON_PREPARE: [ActionKind; 3] = [ActionKind::Filter, ActionKind::Rotator, ActionKind::Temperature];

/// Everything outside the job that a preparation step reads or updates
pub struct PrepareContext<'a> {
    pub camera: &'a mut CameraState,
    pub options: &'a PrepareOptions,
    pub angles: &'a RotatorAngles,
}

impl<'a> PrepareContext<'a> {
    pub fn new(camera: &'a mut CameraState, options: &'a PrepareOptions, angles: &'a RotatorAngles) -> Self {
        Self {
            camera,
            options,
            angles,
        }
    }
}

/// Preparation state of one capture job
#[derive(Debug, Clone)]
pub struct SequenceJobState {
    id: JobId,
    frame_type: FrameType,
    status: JobStatus,
    preparation: PreparationState,
    preview: bool,
    capture_mode: CaptureMode,

    enforce_temperature: bool,
    enforce_guider_drift: bool,
    target_temperature: f64,
    target_filter_id: Option<i32>,
    target_position_angle: Option<f64>,
    target_guider_drift: f64,

    filter_policy: FilterPolicy,
    pre_actions: CalibrationPreActions,
    wall_state: WallPositionState,
    mount_park_state_requested: bool,
    flat_sync: FlatSyncStatus,
    flat_sync_retry_pending: bool,
    cover_queries: CoverQueries,

    actions: ReadinessMap,
    outbox: Vec<Outgoing>,
}

impl SequenceJobState {
    pub fn new(id: JobId, frame_type: FrameType) -> Self {
        Self {
            id,
            frame_type,
            status: JobStatus::Idle,
            preparation: PreparationState::None,
            preview: false,
            capture_mode: CaptureMode::Normal,
            enforce_temperature: false,
            enforce_guider_drift: false,
            target_temperature: 0.0,
            target_filter_id: None,
            target_position_angle: None,
            target_guider_drift: 0.0,
            filter_policy: FilterPolicy::ALL,
            pre_actions: CalibrationPreActions::NONE,
            wall_state: WallPositionState::None,
            mount_park_state_requested: false,
            flat_sync: FlatSyncStatus::None,
            flat_sync_retry_pending: false,
            cover_queries: CoverQueries::default(),
            actions: ReadinessMap::new(),
            outbox: Vec::new(),
        }
    }

    // =========================================================================
    // ACCESSORS
    // =========================================================================

    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn frame_type(&self) -> FrameType {
        self.frame_type
    }

    /// Changing the frame type ends any running preparation
    pub fn set_frame_type(&mut self, frame_type: FrameType) {
        if self.frame_type != frame_type {
            self.frame_type = frame_type;
            self.preparation = PreparationState::None;
            if self.status == JobStatus::Busy {
                self.status = JobStatus::Idle;
            }
        }
    }

    pub fn status(&self) -> JobStatus {
        self.status
    }

    /// Transitions owned by the caller, e.g. [`JobStatus::Done`] once the
    /// exposure has been stored
    pub fn set_status(&mut self, status: JobStatus) {
        self.status = status;
    }

    pub fn preparation_state(&self) -> PreparationState {
        self.preparation
    }

    pub fn preparation_completed(&self) -> bool {
        self.preparation == PreparationState::Completed
    }

    pub fn is_preview(&self) -> bool {
        self.preview
    }

    pub fn capture_mode(&self) -> CaptureMode {
        self.capture_mode
    }

    pub fn readiness(&self) -> &ReadinessMap {
        &self.actions
    }

    pub fn filter_policy(&self) -> FilterPolicy {
        self.filter_policy
    }

    pub fn calibration_pre_actions(&self) -> CalibrationPreActions {
        self.pre_actions
    }

    pub fn set_calibration_pre_actions(&mut self, actions: CalibrationPreActions) {
        self.pre_actions = actions;
    }

    pub fn wall_state(&self) -> WallPositionState {
        self.wall_state
    }

    pub fn flat_sync_status(&self) -> FlatSyncStatus {
        self.flat_sync
    }

    pub fn set_target_ccd_temperature(&mut self, value: f64) {
        self.target_temperature = value;
    }

    pub fn set_target_start_guider_drift(&mut self, value: f64) {
        self.target_guider_drift = value;
    }

    /// Target camera position angle in degrees
    pub fn set_target_rotator_angle(&mut self, position_angle: f64) {
        self.target_position_angle = Some(position_angle);
    }

    pub fn set_target_filter_id(&mut self, filter_id: i32) {
        self.target_filter_id = Some(filter_id);
    }

    /// Drain the commands and notices queued since the last call
    pub fn take_outgoing(&mut self) -> Vec<Outgoing> {
        std::mem::take(&mut self.outbox)
    }

    /// Back to idle, e.g. after the exposure finished or was aborted
    pub fn reset(&mut self) {
        self.status = JobStatus::Idle;
        self.preparation = PreparationState::None;
        self.cover_queries = CoverQueries::default();
        self.reset_flat_sync();
        tracing::debug!("{}: reset to idle", self.id);
    }

    // =========================================================================
    // PREPARATION
    // =========================================================================

    /// Start preparing a capture of the given frame type
    pub fn prepare_capture(
        &mut self,
        ctx: &mut PrepareContext<'_>,
        frame_type: FrameType,
        enforce_temperature: bool,
        enforce_guider_drift: bool,
        preview: bool,
    ) {
        match frame_type {
            FrameType::Light => {
                self.prepare_light_frame_capture(ctx, enforce_temperature, enforce_guider_drift, preview)
            }
            FrameType::Flat => self.prepare_flat_frame_capture(ctx, enforce_temperature, preview),
            FrameType::Dark => self.prepare_dark_frame_capture(ctx, enforce_temperature, preview),
            FrameType::Bias => self.prepare_bias_frame_capture(ctx, enforce_temperature, preview),
            FrameType::None => {
                if self.is_repeated_request(FrameType::None, enforce_temperature, false) {
                    return;
                }
                self.begin_preparation(ctx, FrameType::None, preview);
                self.enforce_temperature = enforce_temperature;
                self.enforce_guider_drift = false;
                self.preparation = PreparationState::Busy;
                self.check_all_actions_ready(ctx);
            }
        }
    }

    pub fn prepare_light_frame_capture(
        &mut self,
        ctx: &mut PrepareContext<'_>,
        enforce_temperature: bool,
        enforce_guider_drift: bool,
        preview: bool,
    ) {
        if self.is_repeated_request(FrameType::Light, enforce_temperature, enforce_guider_drift) {
            return;
        }

        self.begin_preparation(ctx, FrameType::Light, preview);
        self.prepare_temperature_check(ctx, enforce_temperature);
        self.prepare_rotator_check(ctx);
        self.prepare_guider_drift_check(ctx, enforce_guider_drift);

        self.preparation = PreparationState::Busy;
        self.check_all_actions_ready(ctx);
    }

    pub fn prepare_flat_frame_capture(&mut self, ctx: &mut PrepareContext<'_>, enforce_temperature: bool, preview: bool) {
        self.prepare_calibration_frame_capture(ctx, FrameType::Flat, enforce_temperature, preview);
    }

    pub fn prepare_dark_frame_capture(&mut self, ctx: &mut PrepareContext<'_>, enforce_temperature: bool, preview: bool) {
        self.prepare_calibration_frame_capture(ctx, FrameType::Dark, enforce_temperature, preview);
    }

    pub fn prepare_bias_frame_capture(&mut self, ctx: &mut PrepareContext<'_>, enforce_temperature: bool, preview: bool) {
        self.prepare_calibration_frame_capture(ctx, FrameType::Bias, enforce_temperature, preview);
    }

    fn prepare_calibration_frame_capture(
        &mut self,
        ctx: &mut PrepareContext<'_>,
        frame_type: FrameType,
        enforce_temperature: bool,
        preview: bool,
    ) {
        if self.is_repeated_request(frame_type, enforce_temperature, false) {
            return;
        }

        self.begin_preparation(ctx, frame_type, preview);
        self.prepare_temperature_check(ctx, enforce_temperature);
        self.enforce_guider_drift = false;

        self.preparation = PreparationState::Busy;
        self.check_all_actions_ready(ctx);
    }

    /// Select the filter right before the exposure starts. Returns true if
    /// nothing has to be waited for.
    pub fn init_capture(
        &mut self,
        ctx: &mut PrepareContext<'_>,
        frame_type: FrameType,
        preview: bool,
        autofocus_ready: bool,
        mode: CaptureMode,
    ) -> bool {
        self.preparation = PreparationState::InitCapture;
        self.capture_mode = mode;
        ctx.camera.autofocus_ready = autofocus_ready;
        self.actions.begin_cycle();

        self.prepare_target_filter(ctx, frame_type, preview);
        self.check_all_actions_ready(ctx);

        self.actions.all_ready()
    }

    /// A repeated call while busy with unchanged enforcement flags
    fn is_repeated_request(&self, frame_type: FrameType, enforce_temperature: bool, enforce_guider_drift: bool) -> bool {
        let repeated = self.status == JobStatus::Busy
            && self.frame_type == frame_type
            && self.enforce_temperature == enforce_temperature
            && self.enforce_guider_drift == enforce_guider_drift;
        if repeated {
            tracing::debug!("{}: {:?} frame preparation already running", self.id, frame_type);
        }
        repeated
    }

    fn begin_preparation(&mut self, ctx: &mut PrepareContext<'_>, frame_type: FrameType, preview: bool) {
        tracing::info!(
            "{}: preparing {:?} frame capture{}",
            self.id,
            frame_type,
            if preview { " (preview)" } else { "" }
        );

        self.frame_type = frame_type;
        self.status = JobStatus::Busy;
        self.preview = preview;
        self.wall_state = WallPositionState::None;
        self.mount_park_state_requested = false;
        self.cover_queries = CoverQueries::default();
        self.reset_flat_sync();
        self.set_all_actions_ready(ctx);

        // previews are not part of a batch
        self.send(DeviceCommand::SetCcdBatchMode(!preview));
    }

    /// Flat sync starts over with every cycle, a retry still in flight is forgotten
    fn reset_flat_sync(&mut self) {
        self.flat_sync = FlatSyncStatus::None;
        self.flat_sync_retry_pending = false;
    }

    fn set_all_actions_ready(&mut self, ctx: &mut PrepareContext<'_>) {
        self.actions.set_all_ready();
        ctx.camera.reset_initialized(&RESET_ON_PREPARE);
    }

    fn prepare_target_filter(&mut self, ctx: &mut PrepareContext<'_>, frame_type: FrameType, preview: bool) {
        let Some(target) = self.target_filter_id else {
            return;
        };

        // no autofocus on previews, calibration frames or before the first autofocus run
        self.filter_policy = if preview || frame_type != FrameType::Light || !ctx.camera.autofocus_ready {
            FilterPolicy::ALL & !FilterPolicy::AUTOFOCUS
        } else {
            FilterPolicy::ALL
        };

        if !ctx.camera.is_initialized(ActionKind::Filter) {
            if self.actions.arm(ActionKind::Filter, Readiness::NotYetKnown) {
                self.send(DeviceCommand::ReadFilterPosition);
            }
        } else if ctx.camera.current_filter_id != Some(target) {
            self.request_filter_change(target);
        }
    }

    fn request_filter_change(&mut self, target: i32) {
        if self.actions.arm(ActionKind::Filter, Readiness::Pending) {
            self.notify(JobNotice::PrepareState(CaptureStep::ChangingFilter));
            self.send(DeviceCommand::ChangeFilterPosition {
                filter_id: target,
                policy: self.filter_policy,
            });
        }
    }

    fn temperature_on_target(&self, ctx: &PrepareContext<'_>, value: f64) -> bool {
        !self.enforce_temperature || (self.target_temperature - value).abs() <= ctx.options.max_temperature_diff
    }

    fn prepare_temperature_check(&mut self, ctx: &mut PrepareContext<'_>, enforce_temperature: bool) {
        self.enforce_temperature = enforce_temperature;
        if !enforce_temperature {
            return;
        }

        if !ctx.camera.is_initialized(ActionKind::Temperature) {
            // read the current value first, it may already be on target
            if self.actions.arm(ActionKind::Temperature, Readiness::NotYetKnown) {
                self.send(DeviceCommand::ReadCurrentState(CaptureStep::SettingTemperature));
            }
            return;
        }

        if let Some(current) = ctx.camera.current_temperature {
            if self.temperature_on_target(ctx, current) {
                self.actions.mark_ready(ActionKind::Temperature);
                return;
            }
        }

        if self.actions.arm(ActionKind::Temperature, Readiness::Pending) {
            // the camera reports the new set point back as if it had been measured
            self.actions.suppress_next_echo(ActionKind::Temperature);
            self.send(DeviceCommand::SetCcdTemperature(self.target_temperature));
            self.notify(JobNotice::PrepareState(CaptureStep::SettingTemperature));
        }
    }

    fn rotator_on_target(&self, ctx: &PrepareContext<'_>, position_angle: f64) -> bool {
        match self.target_position_angle {
            Some(target) => diff_pa(position_angle, target).abs() * 60.0 <= ctx.options.astrometry_rotator_threshold,
            None => true,
        }
    }

    fn prepare_rotator_check(&mut self, ctx: &mut PrepareContext<'_>) {
        let Some(target) = self.target_position_angle else {
            return;
        };

        if !ctx.camera.is_initialized(ActionKind::Rotator) {
            if self.actions.arm(ActionKind::Rotator, Readiness::NotYetKnown) {
                self.send(DeviceCommand::ReadCurrentState(CaptureStep::SettingRotator));
            }
            return;
        }

        if let Some(current) = ctx.camera.current_position_angle {
            if self.rotator_on_target(ctx, current) {
                self.actions.mark_ready(ActionKind::Rotator);
                return;
            }
        }

        if self.actions.arm(ActionKind::Rotator, Readiness::Pending) {
            let raw_angle = ctx.angles.rotator_angle_from_position_angle(target);
            self.notify(JobNotice::PrepareState(CaptureStep::SettingRotator));
            self.send(DeviceCommand::SetRotatorAngle(raw_angle));
        }
    }

    fn guider_drift_ok(&self, ctx: &PrepareContext<'_>) -> bool {
        !self.enforce_guider_drift
            || self.frame_type != FrameType::Light
            || (ctx.camera.is_initialized(ActionKind::GuiderDrift)
                && ctx
                    .camera
                    .current_guider_drift
                    .is_some_and(|drift| drift <= self.target_guider_drift))
    }

    fn prepare_guider_drift_check(&mut self, ctx: &mut PrepareContext<'_>, enforce_guider_drift: bool) {
        self.enforce_guider_drift = enforce_guider_drift;
        if self.guider_drift_ok(ctx) {
            return;
        }

        let initialized = ctx.camera.is_initialized(ActionKind::GuiderDrift);
        let readiness = if initialized {
            Readiness::Pending
        } else {
            Readiness::NotYetKnown
        };
        if self.actions.arm(ActionKind::GuiderDrift, readiness) {
            self.notify(JobNotice::PrepareState(CaptureStep::GuiderDrift));
            if !initialized {
                self.send(DeviceCommand::ReadCurrentState(CaptureStep::GuiderDrift));
            }
        }
    }

    // =========================================================================
    // RECONCILIATION
    // =========================================================================

    fn check_all_actions_ready(&mut self, ctx: &mut PrepareContext<'_>) {
        match self.preparation {
            PreparationState::None | PreparationState::Completed => {}
            PreparationState::Busy => {
                if !self.actions.all_ready() {
                    tracing::debug!("{}: waiting for {:?}", self.id, self.actions.pending());
                    return;
                }

                let result = match self.frame_type {
                    FrameType::Light => self.check_light_frame_scope_cover_open(ctx),
                    FrameType::Flat => self.check_flat_preconditions(ctx),
                    FrameType::Dark | FrameType::Bias => self.check_dark_preconditions(ctx),
                    FrameType::None => CheckResult::Ready,
                };

                match result {
                    CheckResult::Ready => {
                        self.preparation = PreparationState::Completed;
                        tracing::info!("{}: {:?} frame preparation completed", self.id, self.frame_type);
                        self.notify(JobNotice::PrepareComplete { success: true });
                    }
                    CheckResult::Busy => {}
                    CheckResult::Fatal(message) => self.abort(&message),
                }
            }
            PreparationState::InitCapture => {
                if self.actions.all_ready() {
                    // back to None so that the completion is signalled once
                    self.preparation = PreparationState::None;
                    self.notify(JobNotice::InitCaptureComplete(self.capture_mode));
                }
            }
        }
    }

    fn abort(&mut self, message: &str) {
        tracing::warn!("{}: aborting capture: {}", self.id, message);
        self.log(message);
        self.send(DeviceCommand::AbortCapture);
        self.status = JobStatus::Aborted;
        self.preparation = PreparationState::None;
    }

    // =========================================================================
    // EVENT HANDLERS
    // =========================================================================

    /// Route an input event to its handler
    pub fn handle_event(&mut self, ctx: &mut PrepareContext<'_>, event: &DeviceEvent) {
        match *event {
            DeviceEvent::PrepareCapture {
                frame_type,
                enforce_temperature,
                enforce_guider_drift,
                preview,
            } => self.prepare_capture(ctx, frame_type, enforce_temperature, enforce_guider_drift, preview),
            DeviceEvent::CurrentFilterId { value } => self.set_current_filter_id(ctx, value),
            DeviceEvent::CurrentCcdTemperature { value } => self.set_current_ccd_temperature(ctx, value),
            DeviceEvent::CurrentGuiderDrift { value } => self.set_current_guider_drift(ctx, value),
            DeviceEvent::GuiderActive { active } => self.set_guider_active(ctx, active),
            DeviceEvent::CurrentRotatorAngle { angle, state } => {
                self.set_current_rotator_position_angle(ctx, angle, state)
            }
            DeviceEvent::FocusStatus { state } => self.set_focus_status(ctx, state),
            DeviceEvent::ManualScopeCoverUpdated {
                closed,
                success,
                light_source,
            } => self.update_manual_scope_cover(ctx, closed, success, light_source),
            DeviceEvent::LightBoxLight { on } => self.light_box_light(ctx, on),
            DeviceEvent::DustCapStateChanged { state } => self.dust_cap_state_changed(ctx, state),
            DeviceEvent::ScopeStatusChanged { status } => self.scope_status_changed(ctx, status),
            DeviceEvent::ScopeParkStatusChanged { status } => self.scope_park_status_changed(ctx, status),
            DeviceEvent::DomeStatusChanged { status } => self.dome_status_changed(ctx, status),
            DeviceEvent::FlatSyncFocusChanged { completed } => self.flat_sync_focus_changed(ctx, completed),
            DeviceEvent::HasShutter { present } => self.has_shutter(ctx, present),
            DeviceEvent::FilterStatusChanged { state } => self.set_filter_status(ctx, state),
        }
    }

    /// True if events have to be dropped
    fn ignore_events(&self) -> bool {
        if self.preparation_completed() {
            tracing::trace!("{}: preparation completed, ignoring event", self.id);
            return true;
        }
        false
    }

    pub fn set_current_filter_id(&mut self, ctx: &mut PrepareContext<'_>, value: i32) {
        if self.ignore_events() {
            return;
        }

        let first_reading = !ctx.camera.is_initialized(ActionKind::Filter);
        ctx.camera.current_filter_id = Some(value);
        ctx.camera.set_initialized(ActionKind::Filter, true);

        if self.target_filter_id == Some(value) {
            self.actions.mark_ready(ActionKind::Filter);
        } else if value < 0 && !self.actions.is_ready(ActionKind::Filter) {
            tracing::warn!("{}: filter wheel reported invalid position {}", self.id, value);
            self.status = JobStatus::Error;
            self.preparation = PreparationState::None;
            self.notify(JobNotice::PrepareComplete { success: false });
            return;
        } else if let Some(target) = self.target_filter_id {
            if first_reading && self.preparation != PreparationState::None {
                self.request_filter_change(target);
            }
        }

        self.check_all_actions_ready(ctx);
    }

    pub fn set_current_ccd_temperature(&mut self, ctx: &mut PrepareContext<'_>, value: f64) {
        if self.ignore_events() {
            return;
        }
        if self.actions.take_echo_suppression(ActionKind::Temperature) {
            tracing::debug!("{}: ignoring echoed temperature {:.2}°C", self.id, value);
            return;
        }

        ctx.camera.current_temperature = Some(value);
        let on_target = self.temperature_on_target(ctx, value);

        if ctx.camera.is_initialized(ActionKind::Temperature) {
            if on_target {
                self.actions.mark_ready(ActionKind::Temperature);
            }
        } else {
            ctx.camera.set_initialized(ActionKind::Temperature, true);
            if on_target {
                self.actions.mark_ready(ActionKind::Temperature);
            } else if self.preparation == PreparationState::Busy {
                // first reading is off target, now the set point is needed
                self.prepare_temperature_check(ctx, self.enforce_temperature);
            }
        }

        self.check_all_actions_ready(ctx);
    }

    pub fn set_current_guider_drift(&mut self, ctx: &mut PrepareContext<'_>, value: f64) {
        if self.ignore_events() {
            return;
        }

        ctx.camera.current_guider_drift = Some(value);
        ctx.camera.set_initialized(ActionKind::GuiderDrift, true);

        if self.guider_drift_ok(ctx) {
            self.actions.mark_ready(ActionKind::GuiderDrift);
        } else if self.actions.readiness(ActionKind::GuiderDrift) == Readiness::NotYetKnown {
            self.actions.arm(ActionKind::GuiderDrift, Readiness::Pending);
        }

        self.check_all_actions_ready(ctx);
    }

    /// Guiding stopped or started. Without guiding, drift readings are stale and
    /// a pending drift check has to wait for fresh ones.
    pub fn set_guider_active(&mut self, ctx: &mut PrepareContext<'_>, active: bool) {
        if self.ignore_events() {
            return;
        }

        ctx.camera.guider_active = active;
        let waiting = !self.actions.is_ready(ActionKind::GuiderDrift);
        if !active {
            ctx.camera.set_initialized(ActionKind::GuiderDrift, false);
            if waiting {
                self.actions.arm(ActionKind::GuiderDrift, Readiness::NotYetKnown);
                self.log("Guiding stopped, waiting for guiding to settle before capturing.");
            }
        } else if waiting && !ctx.camera.is_initialized(ActionKind::GuiderDrift) {
            self.send(DeviceCommand::ReadCurrentState(CaptureStep::GuiderDrift));
        }

        self.check_all_actions_ready(ctx);
    }

    /// A raw rotator angle was reported
    pub fn set_current_rotator_position_angle(&mut self, ctx: &mut PrepareContext<'_>, angle: f64, state: PropertyState) {
        if self.ignore_events() {
            return;
        }

        let position_angle = ctx.angles.position_angle_from_rotator_angle(angle, false);
        ctx.camera.current_position_angle = Some(position_angle);
        ctx.camera.set_initialized(ActionKind::Rotator, true);

        // a moving rotator has not reached its target yet, wait for it to settle
        if state == PropertyState::Busy {
            self.check_all_actions_ready(ctx);
            return;
        }

        if self.rotator_on_target(ctx, position_angle) {
            self.actions.mark_ready(ActionKind::Rotator);
        } else if self.preparation == PreparationState::Busy
            && self.actions.readiness(ActionKind::Rotator) == Readiness::NotYetKnown
        {
            // first settled reading is off target, now the set point is needed
            self.prepare_rotator_check(ctx);
        }

        self.check_all_actions_ready(ctx);
    }

    pub fn set_focus_status(&mut self, ctx: &mut PrepareContext<'_>, state: FocusState) {
        if self.ignore_events() {
            return;
        }

        // only relevant while waiting for an autofocus run
        if self.actions.is_ready(ActionKind::Autofocus) {
            return;
        }
        match state {
            FocusState::Complete => {
                self.actions.mark_ready(ActionKind::Autofocus);
                self.check_all_actions_ready(ctx);
            }
            FocusState::Failed | FocusState::Aborted => {
                self.abort("Autofocus failed, aborting...");
            }
            FocusState::Idle | FocusState::InProgress => {}
        }
    }

    pub fn set_filter_status(&mut self, ctx: &mut PrepareContext<'_>, state: FilterState) {
        if self.ignore_events() {
            return;
        }

        if state == FilterState::Autofocus && self.actions.arm(ActionKind::Autofocus, Readiness::Pending) {
            self.notify(JobNotice::PrepareState(CaptureStep::Focusing));
        }
        self.check_all_actions_ready(ctx);
    }

    /// The user answered a manual cover request
    pub fn update_manual_scope_cover(&mut self, ctx: &mut PrepareContext<'_>, closed: bool, success: bool, light_source: bool) {
        if self.ignore_events() {
            return;
        }

        self.cover_queries.answered(closed, light_source);
        if success {
            ctx.camera.manual_cover = match (closed, light_source) {
                (false, _) => ManualCoverState::Open,
                (true, true) => ManualCoverState::ClosedLight,
                (true, false) => ManualCoverState::ClosedDark,
            };
            self.check_all_actions_ready(ctx);
        } else {
            // ask again next time instead of trusting a shutter we could not confirm
            ctx.camera.shutter_status = ShutterStatus::Unknown;
            self.abort("Manual scope cover request declined, aborting...");
        }
    }

    pub fn light_box_light(&mut self, ctx: &mut PrepareContext<'_>, on: bool) {
        if self.ignore_events() {
            return;
        }

        ctx.camera.light_box_light = if on { LightState::On } else { LightState::Off };
        self.log(if on { "Light box on." } else { "Light box off." });
        self.check_all_actions_ready(ctx);
    }

    pub fn dust_cap_state_changed(&mut self, ctx: &mut PrepareContext<'_>, state: DustCapState) {
        if self.ignore_events() {
            return;
        }

        ctx.camera.dust_cap_state = state;
        match state {
            DustCapState::Error => {
                if matches!(self.preparation, PreparationState::Busy | PreparationState::InitCapture) {
                    self.abort("Dust cap error, aborting...");
                }
                return;
            }
            DustCapState::Parked => self.log("Dust cap parked."),
            DustCapState::Idle => self.log("Dust cap unparked."),
            _ => {}
        }
        self.check_all_actions_ready(ctx);
    }

    pub fn scope_status_changed(&mut self, ctx: &mut PrepareContext<'_>, status: MountStatus) {
        if self.ignore_events() {
            return;
        }

        match status {
            MountStatus::Tracking if self.wall_state == WallPositionState::Slewing => {
                self.wall_state = WallPositionState::SlewCompleted;
            }
            MountStatus::Idle
                if matches!(self.wall_state, WallPositionState::Slewing | WallPositionState::TrackingBusy) =>
            {
                self.wall_state = WallPositionState::TrackingOff;
            }
            MountStatus::Parking => {
                // avoid a second park request
                ctx.camera.scope_park_state = ParkState::Parking;
            }
            _ => {}
        }
        ctx.camera.scope_status = status;
        self.check_all_actions_ready(ctx);
    }

    pub fn scope_park_status_changed(&mut self, ctx: &mut PrepareContext<'_>, status: ParkState) {
        if self.ignore_events() {
            return;
        }

        ctx.camera.scope_park_state = status;
        self.check_all_actions_ready(ctx);
    }

    pub fn dome_status_changed(&mut self, ctx: &mut PrepareContext<'_>, status: DomeState) {
        if self.ignore_events() {
            return;
        }

        ctx.camera.dome_state = status;
        self.check_all_actions_ready(ctx);
    }

    pub fn flat_sync_focus_changed(&mut self, ctx: &mut PrepareContext<'_>, completed: bool) {
        if self.ignore_events() {
            return;
        }

        self.flat_sync = if completed {
            FlatSyncStatus::Completed
        } else {
            FlatSyncStatus::Busy
        };
        self.flat_sync_retry_pending = false;
        self.check_all_actions_ready(ctx);
    }

    pub fn has_shutter(&mut self, ctx: &mut PrepareContext<'_>, present: bool) {
        if self.ignore_events() {
            return;
        }

        ctx.camera.shutter_status = if present {
            ShutterStatus::Yes
        } else {
            ShutterStatus::No
        };
        self.check_all_actions_ready(ctx);
    }

    // =========================================================================
    // OUTPUT
    // =========================================================================

    fn send(&mut self, command: DeviceCommand) {
        tracing::debug!("{}: -> {:?}", self.id, command);
        self.outbox.push(Outgoing::Command(command));
    }

    fn send_delayed(&mut self, delay: Duration, command: DeviceCommand) {
        tracing::debug!("{}: -> {:?} in {:?}", self.id, command, delay);
        self.outbox.push(Outgoing::Delayed(delay, command));
    }

    fn notify(&mut self, notice: JobNotice) {
        tracing::debug!("{}: notice {:?}", self.id, notice);
        self.outbox.push(Outgoing::Notice(notice));
    }

    fn log(&mut self, message: impl Into<String>) {
        let message = message.into();
        tracing::info!("{}: {}", self.id, message);
        self.outbox.push(Outgoing::Command(DeviceCommand::Log(message)));
    }
}
