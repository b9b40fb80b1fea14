//! Device Adaptor Trait
//!
//! Defines what the preparation needs from the hardware layer. Implementations
//! translate each call into device driver traffic and report results back as
//! [`DeviceEvent`](crate::commands::DeviceEvent)s through the driver handle; the
//! calls themselves only confirm that a command was accepted.

use crate::commands::DeviceCommand;
use crate::device::HorizontalCoord;
use crate::error::PrepareResult;
use crate::{CaptureStep, FilterPolicy};
use async_trait::async_trait;
use std::sync::Arc;

/// Hardware operations requested by the capture preparation
#[async_trait]
pub trait DeviceAdaptor: Send + Sync {
    // =========================================================================
    // CAMERA
    // =========================================================================

    async fn set_ccd_temperature(&self, celsius: f64) -> PrepareResult<()>;

    async fn set_ccd_batch_mode(&self, enabled: bool) -> PrepareResult<()>;

    /// Ask the camera driver or the user whether the camera has a shutter
    async fn query_has_shutter(&self) -> PrepareResult<()>;

    async fn abort_capture(&self) -> PrepareResult<()>;

    /// Request a fresh reading for the given step
    async fn read_current_state(&self, step: CaptureStep) -> PrepareResult<()>;

    // =========================================================================
    // FILTER, ROTATOR AND FOCUSER
    // =========================================================================

    async fn change_filter_position(&self, filter_id: i32, policy: FilterPolicy) -> PrepareResult<()>;

    async fn read_filter_position(&self) -> PrepareResult<()>;

    /// Move the rotator to a raw angle in [0, 360)
    async fn set_rotator_angle(&self, raw_angle: f64) -> PrepareResult<()>;

    /// Move the focuser to the flat focus position of a filter
    async fn flat_sync_focus(&self, filter_id: i32) -> PrepareResult<()>;

    // =========================================================================
    // MOUNT AND DOME
    // =========================================================================

    async fn slew_telescope(&self, target: HorizontalCoord) -> PrepareResult<()>;

    async fn set_scope_tracking(&self, on: bool) -> PrepareResult<()>;

    async fn set_scope_parked(&self, parked: bool) -> PrepareResult<()>;

    async fn read_mount_park_state(&self) -> PrepareResult<()>;

    async fn set_dome_parked(&self, parked: bool) -> PrepareResult<()>;

    // =========================================================================
    // COVERS AND LIGHT SOURCES
    // =========================================================================

    async fn park_dust_cap(&self, park: bool) -> PrepareResult<()>;

    async fn set_light_box_light(&self, on: bool) -> PrepareResult<()>;

    async fn ask_manual_scope_cover(&self, question: &str, title: &str, light_source: bool) -> PrepareResult<()>;

    async fn ask_manual_scope_open(&self, light_source: bool) -> PrepareResult<()>;

    /// Message for the capture log
    async fn log(&self, message: &str) -> PrepareResult<()> {
        tracing::info!("{}", message);
        Ok(())
    }
}

pub type SharedDeviceAdaptor = Arc<dyn DeviceAdaptor>;

/// Hand a command to the matching adaptor call
pub async fn execute_command(adaptor: &dyn DeviceAdaptor, command: &DeviceCommand) -> PrepareResult<()> {
    match command {
        DeviceCommand::SetCcdTemperature(celsius) => adaptor.set_ccd_temperature(*celsius).await,
        DeviceCommand::SetCcdBatchMode(enabled) => adaptor.set_ccd_batch_mode(*enabled).await,
        DeviceCommand::SetRotatorAngle(raw_angle) => adaptor.set_rotator_angle(*raw_angle).await,
        DeviceCommand::ChangeFilterPosition { filter_id, policy } => {
            adaptor.change_filter_position(*filter_id, *policy).await
        }
        DeviceCommand::ReadFilterPosition => adaptor.read_filter_position().await,
        DeviceCommand::ReadCurrentState(step) => adaptor.read_current_state(*step).await,
        DeviceCommand::SlewTelescope(target) => adaptor.slew_telescope(*target).await,
        DeviceCommand::SetScopeTracking(on) => adaptor.set_scope_tracking(*on).await,
        DeviceCommand::SetScopeParked(parked) => adaptor.set_scope_parked(*parked).await,
        DeviceCommand::ReadMountParkState => adaptor.read_mount_park_state().await,
        DeviceCommand::SetDomeParked(parked) => adaptor.set_dome_parked(*parked).await,
        DeviceCommand::ParkDustCap(park) => adaptor.park_dust_cap(*park).await,
        DeviceCommand::SetLightBoxLight(on) => adaptor.set_light_box_light(*on).await,
        DeviceCommand::AskManualScopeCover {
            question,
            title,
            light_source,
        } => adaptor.ask_manual_scope_cover(question, title, *light_source).await,
        DeviceCommand::AskManualScopeOpen { light_source } => adaptor.ask_manual_scope_open(*light_source).await,
        DeviceCommand::FlatSyncFocus { filter_id } => adaptor.flat_sync_focus(*filter_id).await,
        DeviceCommand::QueryHasShutter => adaptor.query_has_shutter().await,
        DeviceCommand::AbortCapture => adaptor.abort_capture().await,
        DeviceCommand::Log(message) => adaptor.log(message).await,
    }
}

/// Adaptor without hardware, every call is logged and accepted
#[derive(Debug, Default, Clone)]
pub struct NullDeviceAdaptor;

#[async_trait]
impl DeviceAdaptor for NullDeviceAdaptor {
    async fn set_ccd_temperature(&self, celsius: f64) -> PrepareResult<()> {
        tracing::debug!("[NULL_ADAPTOR] set_ccd_temperature({:.2})", celsius);
        Ok(())
    }

    async fn set_ccd_batch_mode(&self, enabled: bool) -> PrepareResult<()> {
        tracing::debug!("[NULL_ADAPTOR] set_ccd_batch_mode({})", enabled);
        Ok(())
    }

    async fn query_has_shutter(&self) -> PrepareResult<()> {
        tracing::debug!("[NULL_ADAPTOR] query_has_shutter()");
        Ok(())
    }

    async fn abort_capture(&self) -> PrepareResult<()> {
        tracing::debug!("[NULL_ADAPTOR] abort_capture()");
        Ok(())
    }

    async fn read_current_state(&self, step: CaptureStep) -> PrepareResult<()> {
        tracing::debug!("[NULL_ADAPTOR] read_current_state({:?})", step);
        Ok(())
    }

    async fn change_filter_position(&self, filter_id: i32, policy: FilterPolicy) -> PrepareResult<()> {
        tracing::debug!("[NULL_ADAPTOR] change_filter_position({}, {:#05b})", filter_id, policy.bits());
        Ok(())
    }

    async fn read_filter_position(&self) -> PrepareResult<()> {
        tracing::debug!("[NULL_ADAPTOR] read_filter_position()");
        Ok(())
    }

    async fn set_rotator_angle(&self, raw_angle: f64) -> PrepareResult<()> {
        tracing::debug!("[NULL_ADAPTOR] set_rotator_angle({:.2})", raw_angle);
        Ok(())
    }

    async fn flat_sync_focus(&self, filter_id: i32) -> PrepareResult<()> {
        tracing::debug!("[NULL_ADAPTOR] flat_sync_focus({})", filter_id);
        Ok(())
    }

    async fn slew_telescope(&self, target: HorizontalCoord) -> PrepareResult<()> {
        tracing::debug!(
            "[NULL_ADAPTOR] slew_telescope(alt={:.2}, az={:.2})",
            target.altitude,
            target.azimuth
        );
        Ok(())
    }

    async fn set_scope_tracking(&self, on: bool) -> PrepareResult<()> {
        tracing::debug!("[NULL_ADAPTOR] set_scope_tracking({})", on);
        Ok(())
    }

    async fn set_scope_parked(&self, parked: bool) -> PrepareResult<()> {
        tracing::debug!("[NULL_ADAPTOR] set_scope_parked({})", parked);
        Ok(())
    }

    async fn read_mount_park_state(&self) -> PrepareResult<()> {
        tracing::debug!("[NULL_ADAPTOR] read_mount_park_state()");
        Ok(())
    }

    async fn set_dome_parked(&self, parked: bool) -> PrepareResult<()> {
        tracing::debug!("[NULL_ADAPTOR] set_dome_parked({})", parked);
        Ok(())
    }

    async fn park_dust_cap(&self, park: bool) -> PrepareResult<()> {
        tracing::debug!("[NULL_ADAPTOR] park_dust_cap({})", park);
        Ok(())
    }

    async fn set_light_box_light(&self, on: bool) -> PrepareResult<()> {
        tracing::debug!("[NULL_ADAPTOR] set_light_box_light({})", on);
        Ok(())
    }

    async fn ask_manual_scope_cover(&self, question: &str, title: &str, light_source: bool) -> PrepareResult<()> {
        tracing::debug!(
            "[NULL_ADAPTOR] ask_manual_scope_cover('{}', '{}', light_source={})",
            question,
            title,
            light_source
        );
        Ok(())
    }

    async fn ask_manual_scope_open(&self, light_source: bool) -> PrepareResult<()> {
        tracing::debug!("[NULL_ADAPTOR] ask_manual_scope_open(light_source={})", light_source);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PrepareError;
    use tokio::sync::Mutex;

    /// Records the calls it receives, fails on dome commands
    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<String>>,
    }

    impl Recorder {
        async fn record(&self, call: String) -> PrepareResult<()> {
            self.calls.lock().await.push(call);
            Ok(())
        }
    }

    #[async_trait]
    impl DeviceAdaptor for Recorder {
        async fn set_ccd_temperature(&self, celsius: f64) -> PrepareResult<()> {
            self.record(format!("temperature {celsius}")).await
        }
        async fn set_ccd_batch_mode(&self, enabled: bool) -> PrepareResult<()> {
            self.record(format!("batch {enabled}")).await
        }
        async fn query_has_shutter(&self) -> PrepareResult<()> {
            self.record("shutter?".into()).await
        }
        async fn abort_capture(&self) -> PrepareResult<()> {
            self.record("abort".into()).await
        }
        async fn read_current_state(&self, step: CaptureStep) -> PrepareResult<()> {
            self.record(format!("read {step:?}")).await
        }
        async fn change_filter_position(&self, filter_id: i32, policy: FilterPolicy) -> PrepareResult<()> {
            self.record(format!("filter {filter_id} {}", policy.bits())).await
        }
        async fn read_filter_position(&self) -> PrepareResult<()> {
            self.record("filter?".into()).await
        }
        async fn set_rotator_angle(&self, raw_angle: f64) -> PrepareResult<()> {
            self.record(format!("rotator {raw_angle}")).await
        }
        async fn flat_sync_focus(&self, filter_id: i32) -> PrepareResult<()> {
            self.record(format!("sync {filter_id}")).await
        }
        async fn slew_telescope(&self, target: HorizontalCoord) -> PrepareResult<()> {
            self.record(format!("slew {} {}", target.altitude, target.azimuth)).await
        }
        async fn set_scope_tracking(&self, on: bool) -> PrepareResult<()> {
            self.record(format!("tracking {on}")).await
        }
        async fn set_scope_parked(&self, parked: bool) -> PrepareResult<()> {
            self.record(format!("scope parked {parked}")).await
        }
        async fn read_mount_park_state(&self) -> PrepareResult<()> {
            self.record("park?".into()).await
        }
        async fn set_dome_parked(&self, _parked: bool) -> PrepareResult<()> {
            Err(PrepareError::device("set_dome_parked", "dome not connected"))
        }
        async fn park_dust_cap(&self, park: bool) -> PrepareResult<()> {
            self.record(format!("cap parked {park}")).await
        }
        async fn set_light_box_light(&self, on: bool) -> PrepareResult<()> {
            self.record(format!("light {on}")).await
        }
        async fn ask_manual_scope_cover(&self, _question: &str, title: &str, light_source: bool) -> PrepareResult<()> {
            self.record(format!("cover '{title}' {light_source}")).await
        }
        async fn ask_manual_scope_open(&self, light_source: bool) -> PrepareResult<()> {
            self.record(format!("open {light_source}")).await
        }
    }

    #[tokio::test]
    async fn test_execute_command_routes_to_adaptor() {
        let recorder = Recorder::default();
        let commands = vec![
            DeviceCommand::SetCcdBatchMode(false),
            DeviceCommand::ChangeFilterPosition {
                filter_id: 4,
                policy: FilterPolicy::CHANGE | FilterPolicy::OFFSET,
            },
            DeviceCommand::AskManualScopeCover {
                question: "Cover it".into(),
                title: "Flat Frame".into(),
                light_source: true,
            },
            DeviceCommand::SlewTelescope(HorizontalCoord {
                altitude: 10.0,
                azimuth: 90.0,
            }),
            DeviceCommand::Log("not recorded".into()),
            DeviceCommand::AbortCapture,
        ];
        for command in &commands {
            execute_command(&recorder, command).await.unwrap();
        }

        let calls = recorder.calls.lock().await.clone();
        assert_eq!(
            calls,
            vec!["batch false", "filter 4 3", "cover 'Flat Frame' true", "slew 10 90", "abort"]
        );
    }

    #[tokio::test]
    async fn test_adaptor_errors_are_returned() {
        let recorder = Recorder::default();
        let err = execute_command(&recorder, &DeviceCommand::SetDomeParked(true))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("dome not connected"));
    }

    #[tokio::test]
    async fn test_null_adaptor_accepts_everything() {
        let adaptor = NullDeviceAdaptor;
        for command in [
            DeviceCommand::SetCcdTemperature(-10.0),
            DeviceCommand::QueryHasShutter,
            DeviceCommand::ReadCurrentState(CaptureStep::GuiderDrift),
            DeviceCommand::FlatSyncFocus { filter_id: 1 },
        ] {
            assert!(execute_command(&adaptor, &command).await.is_ok());
        }
    }
}
