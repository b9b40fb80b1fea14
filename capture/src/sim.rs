//! Simulated devices
//!
//! A [`DeviceAdaptor`] that answers every command the way a well behaved set of
//! drivers would, by feeding events back into a running [`PreparationDriver`].
//! Useful for dry runs of a sequence and for tests.
//!
//! [`PreparationDriver`]: crate::driver::PreparationDriver

use crate::adaptor::DeviceAdaptor;
use crate::commands::{DeviceCommand, DeviceEvent};
use crate::device::{DomeState, DustCapState, HorizontalCoord, MountStatus, ParkState, PropertyState};
use crate::driver::DriverHandle;
use crate::error::PrepareResult;
use crate::options::PrepareOptions;
use crate::{CaptureStep, FilterPolicy};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, Mutex};

/// Initial readings and behaviour of the simulated devices
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatedDevices {
    pub camera_name: String,
    pub has_shutter: bool,
    pub temperature: f64,
    pub rotator_angle: f64,
    pub guider_drift: f64,
    pub filter_id: i32,
    pub park_state: ParkState,
    /// How often the focuser reports busy before a flat sync completes
    pub flat_sync_busy_polls: u32,
    /// Answer manual cover requests with success
    pub confirm_covers: bool,
}

impl Default for SimulatedDevices {
    fn default() -> Self {
        Self {
            camera_name: "Simulated CCD".to_string(),
            has_shutter: true,
            temperature: 20.0,
            rotator_angle: 0.0,
            guider_drift: 0.5,
            filter_id: 0,
            park_state: ParkState::Unparked,
            flat_sync_busy_polls: 0,
            confirm_covers: true,
        }
    }
}

struct SimState {
    devices: SimulatedDevices,
    options: PrepareOptions,
    flat_sync_polls: u32,
    received: Vec<DeviceCommand>,
}

pub struct SimulatedAdaptor {
    state: Mutex<SimState>,
    events: mpsc::UnboundedSender<DeviceEvent>,
}

impl SimulatedAdaptor {
    /// Must be called from within a tokio runtime. Events are forwarded to the
    /// driver by a separate task so that answering a command never waits on the
    /// driver that issued it.
    pub fn new(handle: DriverHandle, devices: SimulatedDevices, options: PrepareOptions) -> Self {
        let (events, mut rx) = mpsc::unbounded_channel::<DeviceEvent>();

        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                if let Err(e) = handle.send_event(event).await {
                    tracing::debug!("[SIM] driver gone: {}", e);
                    break;
                }
            }
        });

        Self {
            state: Mutex::new(SimState {
                devices,
                options,
                flat_sync_polls: 0,
                received: Vec::new(),
            }),
            events,
        }
    }

    /// Commands received so far
    pub async fn received(&self) -> Vec<DeviceCommand> {
        self.state.lock().await.received.clone()
    }

    /// Options including the shutter knowledge learned so far
    pub async fn options(&self) -> PrepareOptions {
        self.state.lock().await.options.clone()
    }

    fn emit(&self, event: DeviceEvent) {
        tracing::trace!("[SIM] <- {:?}", event);
        if self.events.send(event).is_err() {
            tracing::debug!("[SIM] event forwarder stopped");
        }
    }

    async fn record(&self, command: DeviceCommand) -> tokio::sync::MutexGuard<'_, SimState> {
        tracing::debug!("[SIM] -> {:?}", command);
        let mut state = self.state.lock().await;
        state.received.push(command);
        state
    }
}

#[async_trait]
impl DeviceAdaptor for SimulatedAdaptor {
    async fn set_ccd_temperature(&self, celsius: f64) -> PrepareResult<()> {
        let mut state = self.record(DeviceCommand::SetCcdTemperature(celsius)).await;
        // cameras echo the set point before reporting measurements
        self.emit(DeviceEvent::CurrentCcdTemperature { value: celsius });
        state.devices.temperature = celsius;
        self.emit(DeviceEvent::CurrentCcdTemperature { value: celsius });
        Ok(())
    }

    async fn set_ccd_batch_mode(&self, enabled: bool) -> PrepareResult<()> {
        self.record(DeviceCommand::SetCcdBatchMode(enabled)).await;
        Ok(())
    }

    async fn query_has_shutter(&self) -> PrepareResult<()> {
        let mut state = self.record(DeviceCommand::QueryHasShutter).await;
        let camera = state.devices.camera_name.clone();
        let present = match state.options.shutter_known(&camera) {
            Some(present) => present,
            None => {
                let present = state.devices.has_shutter;
                state.options.remember_shutter(&camera, present);
                present
            }
        };
        self.emit(DeviceEvent::HasShutter { present });
        Ok(())
    }

    async fn abort_capture(&self) -> PrepareResult<()> {
        self.record(DeviceCommand::AbortCapture).await;
        Ok(())
    }

    async fn read_current_state(&self, step: CaptureStep) -> PrepareResult<()> {
        let state = self.record(DeviceCommand::ReadCurrentState(step)).await;
        let devices = &state.devices;
        let event = match step {
            CaptureStep::ChangingFilter => DeviceEvent::CurrentFilterId {
                value: devices.filter_id,
            },
            CaptureStep::SettingTemperature => DeviceEvent::CurrentCcdTemperature {
                value: devices.temperature,
            },
            CaptureStep::SettingRotator => DeviceEvent::CurrentRotatorAngle {
                angle: devices.rotator_angle,
                state: PropertyState::Ok,
            },
            CaptureStep::GuiderDrift => DeviceEvent::CurrentGuiderDrift {
                value: devices.guider_drift,
            },
            CaptureStep::Focusing => return Ok(()),
        };
        self.emit(event);
        Ok(())
    }

    async fn change_filter_position(&self, filter_id: i32, policy: FilterPolicy) -> PrepareResult<()> {
        let mut state = self
            .record(DeviceCommand::ChangeFilterPosition { filter_id, policy })
            .await;
        state.devices.filter_id = filter_id;
        self.emit(DeviceEvent::CurrentFilterId { value: filter_id });
        Ok(())
    }

    async fn read_filter_position(&self) -> PrepareResult<()> {
        let state = self.record(DeviceCommand::ReadFilterPosition).await;
        self.emit(DeviceEvent::CurrentFilterId {
            value: state.devices.filter_id,
        });
        Ok(())
    }

    async fn set_rotator_angle(&self, raw_angle: f64) -> PrepareResult<()> {
        let mut state = self.record(DeviceCommand::SetRotatorAngle(raw_angle)).await;
        self.emit(DeviceEvent::CurrentRotatorAngle {
            angle: state.devices.rotator_angle,
            state: PropertyState::Busy,
        });
        state.devices.rotator_angle = raw_angle;
        self.emit(DeviceEvent::CurrentRotatorAngle {
            angle: raw_angle,
            state: PropertyState::Ok,
        });
        Ok(())
    }

    async fn flat_sync_focus(&self, filter_id: i32) -> PrepareResult<()> {
        let mut state = self.record(DeviceCommand::FlatSyncFocus { filter_id }).await;
        let completed = state.flat_sync_polls >= state.devices.flat_sync_busy_polls;
        state.flat_sync_polls = if completed { 0 } else { state.flat_sync_polls + 1 };
        self.emit(DeviceEvent::FlatSyncFocusChanged { completed });
        Ok(())
    }

    async fn slew_telescope(&self, target: HorizontalCoord) -> PrepareResult<()> {
        self.record(DeviceCommand::SlewTelescope(target)).await;
        self.emit(DeviceEvent::ScopeStatusChanged {
            status: MountStatus::Slewing,
        });
        self.emit(DeviceEvent::ScopeStatusChanged {
            status: MountStatus::Tracking,
        });
        Ok(())
    }

    async fn set_scope_tracking(&self, on: bool) -> PrepareResult<()> {
        self.record(DeviceCommand::SetScopeTracking(on)).await;
        let status = if on { MountStatus::Tracking } else { MountStatus::Idle };
        self.emit(DeviceEvent::ScopeStatusChanged { status });
        Ok(())
    }

    async fn set_scope_parked(&self, parked: bool) -> PrepareResult<()> {
        let mut state = self.record(DeviceCommand::SetScopeParked(parked)).await;
        if parked {
            self.emit(DeviceEvent::ScopeStatusChanged {
                status: MountStatus::Parking,
            });
        }
        let park_state = if parked { ParkState::Parked } else { ParkState::Unparked };
        state.devices.park_state = park_state;
        self.emit(DeviceEvent::ScopeParkStatusChanged { status: park_state });
        Ok(())
    }

    async fn read_mount_park_state(&self) -> PrepareResult<()> {
        let state = self.record(DeviceCommand::ReadMountParkState).await;
        self.emit(DeviceEvent::ScopeParkStatusChanged {
            status: state.devices.park_state,
        });
        Ok(())
    }

    async fn set_dome_parked(&self, parked: bool) -> PrepareResult<()> {
        self.record(DeviceCommand::SetDomeParked(parked)).await;
        let (moving, done) = if parked {
            (DomeState::Parking, DomeState::Parked)
        } else {
            (DomeState::Unparking, DomeState::Idle)
        };
        self.emit(DeviceEvent::DomeStatusChanged { status: moving });
        self.emit(DeviceEvent::DomeStatusChanged { status: done });
        Ok(())
    }

    async fn park_dust_cap(&self, park: bool) -> PrepareResult<()> {
        self.record(DeviceCommand::ParkDustCap(park)).await;
        let (moving, done) = if park {
            (DustCapState::Parking, DustCapState::Parked)
        } else {
            (DustCapState::Unparking, DustCapState::Idle)
        };
        self.emit(DeviceEvent::DustCapStateChanged { state: moving });
        self.emit(DeviceEvent::DustCapStateChanged { state: done });
        Ok(())
    }

    async fn set_light_box_light(&self, on: bool) -> PrepareResult<()> {
        self.record(DeviceCommand::SetLightBoxLight(on)).await;
        self.emit(DeviceEvent::LightBoxLight { on });
        Ok(())
    }

    async fn ask_manual_scope_cover(&self, question: &str, title: &str, light_source: bool) -> PrepareResult<()> {
        let state = self
            .record(DeviceCommand::AskManualScopeCover {
                question: question.to_string(),
                title: title.to_string(),
                light_source,
            })
            .await;
        self.emit(DeviceEvent::ManualScopeCoverUpdated {
            closed: true,
            success: state.devices.confirm_covers,
            light_source,
        });
        Ok(())
    }

    async fn ask_manual_scope_open(&self, light_source: bool) -> PrepareResult<()> {
        let state = self.record(DeviceCommand::AskManualScopeOpen { light_source }).await;
        self.emit(DeviceEvent::ManualScopeCoverUpdated {
            closed: false,
            success: state.devices.confirm_covers,
            light_source,
        });
        Ok(())
    }

    async fn log(&self, message: &str) -> PrepareResult<()> {
        self.record(DeviceCommand::Log(message.to_string())).await;
        Ok(())
    }
}
