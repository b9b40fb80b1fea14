//! Jobs of one capture sequence and the shared state they work on
//!
//! Jobs live in an arena and are addressed by [`JobId`]. Only the active job
//! receives device events, so the shared [`CameraState`] is mutated by one job
//! at a time.

use crate::angle::RotatorAngles;
use crate::camera_state::CameraState;
use crate::commands::{DeviceEvent, Outgoing};
use crate::device::FrameType;
use crate::error::{PrepareError, PrepareResult};
use crate::job_state::{PrepareContext, SequenceJobState};
use crate::options::PrepareOptions;
use crate::{CaptureMode, JobId};

pub struct CaptureSequence {
    camera: CameraState,
    options: PrepareOptions,
    angles: RotatorAngles,
    jobs: Vec<SequenceJobState>,
    active: Option<JobId>,
}

impl CaptureSequence {
    pub fn new(camera: CameraState, options: PrepareOptions) -> Self {
        let angles = options.rotator.angles();
        Self {
            camera,
            options,
            angles,
            jobs: Vec::new(),
            active: None,
        }
    }

    pub fn camera(&self) -> &CameraState {
        &self.camera
    }

    pub fn camera_mut(&mut self) -> &mut CameraState {
        &mut self.camera
    }

    pub fn options(&self) -> &PrepareOptions {
        &self.options
    }

    pub fn angles_mut(&mut self) -> &mut RotatorAngles {
        &mut self.angles
    }

    pub fn add_job(&mut self, frame_type: FrameType) -> JobId {
        let id = JobId(self.jobs.len());
        self.jobs.push(SequenceJobState::new(id, frame_type));
        tracing::debug!("Added {} ({:?})", id, frame_type);
        id
    }

    pub fn job(&self, id: JobId) -> PrepareResult<&SequenceJobState> {
        self.jobs.get(id.0).ok_or(PrepareError::UnknownJob(id))
    }

    pub fn job_mut(&mut self, id: JobId) -> PrepareResult<&mut SequenceJobState> {
        self.jobs.get_mut(id.0).ok_or(PrepareError::UnknownJob(id))
    }

    pub fn job_count(&self) -> usize {
        self.jobs.len()
    }

    /// Route device events to this job from now on
    pub fn set_active_job(&mut self, id: JobId) -> PrepareResult<()> {
        self.job(id)?;
        if self.active != Some(id) {
            tracing::info!("Active capture job is now {}", id);
        }
        self.active = Some(id);
        Ok(())
    }

    pub fn active_job(&self) -> Option<JobId> {
        self.active
    }

    /// Reset a job to idle, dropping anything it has not handed out yet
    pub fn reset_job(&mut self, id: JobId) -> PrepareResult<()> {
        let job = self.job_mut(id)?;
        job.reset();
        job.take_outgoing();
        Ok(())
    }

    /// Hand an event to the active job and collect what it emits
    pub fn dispatch(&mut self, event: &DeviceEvent) -> Vec<Outgoing> {
        let Some(id) = self.active else {
            tracing::warn!("No active capture job, dropping {:?}", event);
            return Vec::new();
        };
        let Some(job) = self.jobs.get_mut(id.0) else {
            tracing::warn!("Active {} does not exist, dropping {:?}", id, event);
            return Vec::new();
        };

        let mut ctx = PrepareContext::new(&mut self.camera, &self.options, &self.angles);
        job.handle_event(&mut ctx, event);
        job.take_outgoing()
    }

    /// Select the filter of the active job before its exposure starts. The flag
    /// tells whether the exposure can start right away.
    pub fn init_capture(
        &mut self,
        frame_type: FrameType,
        preview: bool,
        autofocus_ready: bool,
        mode: CaptureMode,
    ) -> PrepareResult<(bool, Vec<Outgoing>)> {
        let id = self.active.ok_or(PrepareError::NoActiveJob)?;
        let job = self.jobs.get_mut(id.0).ok_or(PrepareError::UnknownJob(id))?;

        let mut ctx = PrepareContext::new(&mut self.camera, &self.options, &self.angles);
        let ready = job.init_capture(&mut ctx, frame_type, preview, autofocus_ready, mode);
        Ok((ready, job.take_outgoing()))
    }
}
