//! Preparation Driver
//!
//! Owns a [`CaptureSequence`] on a tokio task and feeds it device events one at a
//! time. Commands emitted by the active job are handed to the [`DeviceAdaptor`] in
//! emission order, notices are broadcast to subscribers.

use crate::adaptor::{execute_command, SharedDeviceAdaptor};
use crate::commands::{DeviceEvent, JobNotice, Outgoing};
use crate::device::FrameType;
use crate::error::{PrepareError, PrepareResult};
use crate::sequence::CaptureSequence;
use crate::{CaptureMode, JobId};
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;

/// A job notice together with the job that raised it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreparationNotice {
    pub job: JobId,
    pub notice: JobNotice,
}

type ConfigureFn = Box<dyn FnOnce(&mut CaptureSequence) + Send>;

/// Commands that can be sent to the driver
pub enum DriverCommand {
    Event(DeviceEvent),
    SetActiveJob(JobId),
    /// Run a closure against the sequence between two events
    Configure(ConfigureFn),
    InitCapture {
        frame_type: FrameType,
        preview: bool,
        autofocus_ready: bool,
        mode: CaptureMode,
        reply: oneshot::Sender<PrepareResult<bool>>,
    },
    Shutdown,
}

impl fmt::Debug for DriverCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DriverCommand::Event(event) => f.debug_tuple("Event").field(event).finish(),
            DriverCommand::SetActiveJob(id) => f.debug_tuple("SetActiveJob").field(id).finish(),
            DriverCommand::Configure(_) => f.write_str("Configure(..)"),
            DriverCommand::InitCapture {
                frame_type,
                preview,
                autofocus_ready,
                mode,
                ..
            } => f
                .debug_struct("InitCapture")
                .field("frame_type", frame_type)
                .field("preview", preview)
                .field("autofocus_ready", autofocus_ready)
                .field("mode", mode)
                .finish_non_exhaustive(),
            DriverCommand::Shutdown => f.write_str("Shutdown"),
        }
    }
}

/// Cloneable handle for talking to a running driver
#[derive(Clone)]
pub struct DriverHandle {
    command_tx: mpsc::Sender<DriverCommand>,
    notice_tx: broadcast::Sender<PreparationNotice>,
}

impl DriverHandle {
    async fn send(&self, command: DriverCommand) -> PrepareResult<()> {
        self.command_tx
            .send(command)
            .await
            .map_err(|e| PrepareError::ChannelClosed(e.to_string()))
    }

    pub async fn send_event(&self, event: DeviceEvent) -> PrepareResult<()> {
        self.send(DriverCommand::Event(event)).await
    }

    pub async fn set_active_job(&self, id: JobId) -> PrepareResult<()> {
        self.send(DriverCommand::SetActiveJob(id)).await
    }

    pub async fn configure<F>(&self, f: F) -> PrepareResult<()>
    where
        F: FnOnce(&mut CaptureSequence) + Send + 'static,
    {
        self.send(DriverCommand::Configure(Box::new(f))).await
    }

    /// Start the filter selection of the active job and wait for the verdict
    pub async fn init_capture(
        &self,
        frame_type: FrameType,
        preview: bool,
        autofocus_ready: bool,
        mode: CaptureMode,
    ) -> PrepareResult<bool> {
        let (reply, rx) = oneshot::channel();
        self.send(DriverCommand::InitCapture {
            frame_type,
            preview,
            autofocus_ready,
            mode,
            reply,
        })
        .await?;
        rx.await
            .map_err(|_| PrepareError::ChannelClosed("init capture reply dropped".to_string()))?
    }

    pub async fn shutdown(&self) -> PrepareResult<()> {
        self.send(DriverCommand::Shutdown).await
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PreparationNotice> {
        self.notice_tx.subscribe()
    }
}

/// Runs the dispatch loop of one capture sequence
pub struct PreparationDriver {
    sequence: CaptureSequence,
    command_rx: mpsc::Receiver<DriverCommand>,
    notice_tx: broadcast::Sender<PreparationNotice>,
}

impl PreparationDriver {
    pub fn new(sequence: CaptureSequence, capacity: usize) -> (Self, DriverHandle) {
        let (command_tx, command_rx) = mpsc::channel(capacity);
        let (notice_tx, _) = broadcast::channel(256);

        let driver = Self {
            sequence,
            command_rx,
            notice_tx: notice_tx.clone(),
        };
        let handle = DriverHandle { command_tx, notice_tx };
        (driver, handle)
    }

    /// Run until shut down, handing the sequence back afterwards
    pub fn spawn(self, adaptor: SharedDeviceAdaptor) -> JoinHandle<CaptureSequence> {
        tokio::spawn(self.run(adaptor))
    }

    pub async fn run(mut self, adaptor: SharedDeviceAdaptor) -> CaptureSequence {
        tracing::info!("Preparation driver started");

        while let Some(command) = self.command_rx.recv().await {
            match command {
                DriverCommand::Event(event) => {
                    let job = self.sequence.active_job();
                    let outgoing = self.sequence.dispatch(&event);
                    if let Some(job) = job {
                        self.deliver(job, outgoing, &adaptor).await;
                    }
                }
                DriverCommand::SetActiveJob(id) => {
                    if let Err(e) = self.sequence.set_active_job(id) {
                        tracing::warn!("Cannot activate {}: {}", id, e);
                    }
                }
                DriverCommand::Configure(f) => f(&mut self.sequence),
                DriverCommand::InitCapture {
                    frame_type,
                    preview,
                    autofocus_ready,
                    mode,
                    reply,
                } => {
                    let result = match (
                        self.sequence.active_job(),
                        self.sequence.init_capture(frame_type, preview, autofocus_ready, mode),
                    ) {
                        (Some(job), Ok((ready, outgoing))) => {
                            self.deliver(job, outgoing, &adaptor).await;
                            Ok(ready)
                        }
                        (_, Err(e)) => Err(e),
                        (None, Ok(_)) => Err(PrepareError::NoActiveJob),
                    };
                    // the caller may have given up waiting
                    let _ = reply.send(result);
                }
                DriverCommand::Shutdown => {
                    tracing::info!("Preparation driver shutting down");
                    break;
                }
            }
        }

        self.sequence
    }

    async fn deliver(&self, job: JobId, outgoing: Vec<Outgoing>, adaptor: &SharedDeviceAdaptor) {
        for item in outgoing {
            match item {
                Outgoing::Command(command) => {
                    // set points move hardware, the rest are reads and prompts
                    if command.is_set_command() {
                        tracing::info!("{}: {:?}", job, command);
                    } else {
                        tracing::debug!("{}: {}", job, command.name());
                    }
                    if let Err(e) = execute_command(adaptor.as_ref(), &command).await {
                        tracing::error!("{}: {} failed: {}", job, command.name(), e);
                    }
                }
                Outgoing::Delayed(delay, command) => {
                    let adaptor = adaptor.clone();
                    tokio::spawn(async move {
                        tokio::time::sleep(delay).await;
                        if let Err(e) = execute_command(adaptor.as_ref(), &command).await {
                            tracing::error!("{}: delayed {} failed: {}", job, command.name(), e);
                        }
                    });
                }
                Outgoing::Notice(notice) => {
                    // no subscribers is fine
                    let _ = self.notice_tx.send(PreparationNotice { job, notice });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adaptor::NullDeviceAdaptor;
    use crate::camera_state::CameraState;
    use crate::options::PrepareOptions;
    use crate::sim::{SimulatedAdaptor, SimulatedDevices};
    use crate::{DeviceCommand, JobStatus, PreparationState};
    use std::sync::Arc;
    use std::time::Duration;

    fn sequence_with(frame_type: FrameType, options: PrepareOptions) -> (CaptureSequence, JobId) {
        let camera = CameraState::new().with_camera_name("Simulated CCD");
        let mut sequence = CaptureSequence::new(camera, options);
        let id = sequence.add_job(frame_type);
        (sequence, id)
    }

    async fn next_completion(rx: &mut broadcast::Receiver<PreparationNotice>) -> PreparationNotice {
        loop {
            let notice = rx.recv().await.unwrap();
            if matches!(notice.notice, JobNotice::PrepareComplete { .. }) {
                return notice;
            }
        }
    }

    fn prepare(frame_type: FrameType, enforce_temperature: bool) -> DeviceEvent {
        DeviceEvent::PrepareCapture {
            frame_type,
            enforce_temperature,
            enforce_guider_drift: false,
            preview: false,
        }
    }

    #[tokio::test]
    async fn test_shutdown_returns_sequence() {
        let (sequence, id) = sequence_with(FrameType::Light, PrepareOptions::default());
        let (driver, handle) = PreparationDriver::new(sequence, 32);
        let task = driver.spawn(Arc::new(NullDeviceAdaptor));

        handle.set_active_job(id).await.unwrap();
        handle.send_event(prepare(FrameType::Light, true)).await.unwrap();
        handle.shutdown().await.unwrap();

        let sequence = task.await.unwrap();
        let job = sequence.job(id).unwrap();
        // nothing answers the temperature request without hardware
        assert_eq!(job.status(), JobStatus::Busy);
        assert_eq!(job.preparation_state(), PreparationState::Busy);
        assert!(handle.send_event(prepare(FrameType::Light, false)).await.is_err());
    }

    #[tokio::test]
    async fn test_init_capture_without_active_job() {
        let (sequence, _) = sequence_with(FrameType::Light, PrepareOptions::default());
        let (driver, handle) = PreparationDriver::new(sequence, 32);
        driver.spawn(Arc::new(NullDeviceAdaptor));

        let err = handle
            .init_capture(FrameType::Light, false, false, CaptureMode::Normal)
            .await
            .unwrap_err();
        assert!(matches!(err, PrepareError::NoActiveJob));
        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_light_frame_with_simulated_devices() {
        let (sequence, id) = sequence_with(FrameType::Light, PrepareOptions::default());
        let (driver, handle) = PreparationDriver::new(sequence, 32);
        let devices = SimulatedDevices {
            temperature: -10.0,
            ..Default::default()
        };
        let sim = Arc::new(SimulatedAdaptor::new(handle.clone(), devices, PrepareOptions::default()));
        let task = driver.spawn(sim.clone());
        let mut notices = handle.subscribe();

        handle
            .configure(move |seq| {
                if let Ok(job) = seq.job_mut(id) {
                    job.set_target_ccd_temperature(-10.0);
                }
            })
            .await
            .unwrap();
        handle.set_active_job(id).await.unwrap();
        handle.send_event(prepare(FrameType::Light, true)).await.unwrap();

        let done = next_completion(&mut notices).await;
        assert_eq!(done.job, id);
        assert_eq!(done.notice, JobNotice::PrepareComplete { success: true });

        handle.shutdown().await.unwrap();
        let sequence = task.await.unwrap();
        assert_eq!(sequence.job(id).unwrap().preparation_state(), PreparationState::Completed);
        let received = sim.received().await;
        assert_eq!(received.first(), Some(&DeviceCommand::SetCcdBatchMode(true)));
        assert!(received.contains(&DeviceCommand::ReadCurrentState(crate::CaptureStep::SettingTemperature)));
    }

    #[tokio::test]
    async fn test_dark_frame_learns_shutter() {
        let (sequence, id) = sequence_with(FrameType::Dark, PrepareOptions::default());
        let (driver, handle) = PreparationDriver::new(sequence, 32);
        let devices = SimulatedDevices {
            has_shutter: false,
            ..Default::default()
        };
        let sim = Arc::new(SimulatedAdaptor::new(handle.clone(), devices, PrepareOptions::default()));
        let task = driver.spawn(sim.clone());
        let mut notices = handle.subscribe();

        handle.set_active_job(id).await.unwrap();
        handle.send_event(prepare(FrameType::Dark, false)).await.unwrap();

        let done = next_completion(&mut notices).await;
        assert_eq!(done.notice, JobNotice::PrepareComplete { success: true });
        assert_eq!(sim.options().await.shutter_known("Simulated CCD"), Some(false));

        let received = sim.received().await;
        assert!(received.contains(&DeviceCommand::QueryHasShutter));
        assert!(received
            .iter()
            .any(|c| matches!(c, DeviceCommand::AskManualScopeCover { light_source: false, .. })));

        handle.shutdown().await.unwrap();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_flat_sync_focus_is_polled() {
        let options = PrepareOptions {
            flat_sync_focus: true,
            ..Default::default()
        };
        let (mut sequence, id) = sequence_with(FrameType::Flat, options.clone());
        {
            let camera = sequence.camera_mut();
            camera.has_dust_cap = true;
            camera.has_light_box = true;
            camera.autofocus_ready = true;
        }
        sequence.job_mut(id).unwrap().set_target_filter_id(2);

        let (driver, handle) = PreparationDriver::new(sequence, 32);
        let devices = SimulatedDevices {
            filter_id: 2,
            flat_sync_busy_polls: 2,
            ..Default::default()
        };
        let sim = Arc::new(SimulatedAdaptor::new(handle.clone(), devices, options));
        let task = driver.spawn(sim.clone());
        let mut notices = handle.subscribe();

        let started = tokio::time::Instant::now();
        handle.set_active_job(id).await.unwrap();
        handle.send_event(prepare(FrameType::Flat, false)).await.unwrap();

        let done = next_completion(&mut notices).await;
        assert_eq!(done.notice, JobNotice::PrepareComplete { success: true });
        // two busy answers, each followed by a one second pause
        assert!(started.elapsed() >= Duration::from_secs(2));

        let polls = sim
            .received()
            .await
            .iter()
            .filter(|c| matches!(c, DeviceCommand::FlatSyncFocus { filter_id: 2 }))
            .count();
        assert_eq!(polls, 3);

        handle.shutdown().await.unwrap();
        task.await.unwrap();
    }
}
