//! Options consumed by the capture preparation
//!
//! Stored as JSON. Missing fields fall back to their defaults, so an options file
//! written by an older version keeps loading.

use crate::angle::{PierSide, RotatorAngles};
use crate::device::HorizontalCoord;
use crate::error::{PrepareError, PrepareResult};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Rotator calibration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RotatorOptions {
    /// Offset between rotator zero and camera position angle zero (degrees)
    #[serde(default)]
    pub camera_offset: f64,
    /// Pier side the offset was measured on
    #[serde(default)]
    pub calibration_pier_side: PierSide,
}

impl Default for RotatorOptions {
    fn default() -> Self {
        Self {
            camera_offset: 0.0,
            calibration_pier_side: PierSide::Unknown,
        }
    }
}

impl RotatorOptions {
    /// Angle converter for this calibration
    pub fn angles(&self) -> RotatorAngles {
        let mut angles = RotatorAngles::new(self.camera_offset);
        angles.set_calibration_pier_side(self.calibration_pier_side);
        angles
    }
}

/// Options of the capture preparation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrepareOptions {
    /// Accepted deviation from the target CCD temperature (°C)
    #[serde(default = "default_max_temperature_diff")]
    pub max_temperature_diff: f64,

    /// Accepted deviation from the target position angle (arc-minutes)
    #[serde(default = "default_astrometry_rotator_threshold")]
    pub astrometry_rotator_threshold: f64,

    /// Move the focuser to the focus position of the flat's filter
    #[serde(default)]
    pub flat_sync_focus: bool,

    /// Poll interval while a flat sync is running (ms)
    #[serde(default = "default_flat_sync_retry_ms")]
    pub flat_sync_retry_ms: u64,

    #[serde(default)]
    pub rotator: RotatorOptions,

    /// Cameras known to have a mechanical shutter
    #[serde(default)]
    pub shutterful_cameras: Vec<String>,

    /// Cameras known to have no shutter
    #[serde(default)]
    pub shutterless_cameras: Vec<String>,

    /// Flat wall position, if calibration frames are taken against a wall
    #[serde(default)]
    pub wall_position: Option<HorizontalCoord>,
}

fn default_max_temperature_diff() -> f64 {
    0.1
}

fn default_astrometry_rotator_threshold() -> f64 {
    1.0
}

fn default_flat_sync_retry_ms() -> u64 {
    1000
}

impl Default for PrepareOptions {
    fn default() -> Self {
        Self {
            max_temperature_diff: default_max_temperature_diff(),
            astrometry_rotator_threshold: default_astrometry_rotator_threshold(),
            flat_sync_focus: false,
            flat_sync_retry_ms: default_flat_sync_retry_ms(),
            rotator: RotatorOptions::default(),
            shutterful_cameras: Vec::new(),
            shutterless_cameras: Vec::new(),
            wall_position: None,
        }
    }
}

impl PrepareOptions {
    pub fn load(path: impl AsRef<Path>) -> PrepareResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| PrepareError::OptionsIo {
            path: path.to_path_buf(),
            source,
        })?;
        let options = serde_json::from_str(&content).map_err(|source| PrepareError::OptionsParse {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::debug!("Loaded capture preparation options from {}", path.display());
        Ok(options)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> PrepareResult<()> {
        let path = path.as_ref();
        let content = serde_json::to_string_pretty(self).map_err(|source| PrepareError::OptionsParse {
            path: path.to_path_buf(),
            source,
        })?;
        std::fs::write(path, content).map_err(|source| PrepareError::OptionsIo {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn flat_sync_retry(&self) -> Duration {
        Duration::from_millis(self.flat_sync_retry_ms)
    }

    /// Cached shutter knowledge for a camera, `None` if it has never been asked
    pub fn shutter_known(&self, camera: &str) -> Option<bool> {
        if self.shutterful_cameras.iter().any(|name| name == camera) {
            Some(true)
        } else if self.shutterless_cameras.iter().any(|name| name == camera) {
            Some(false)
        } else {
            None
        }
    }

    /// Record whether a camera has a shutter, replacing older knowledge
    pub fn remember_shutter(&mut self, camera: &str, present: bool) {
        self.shutterful_cameras.retain(|name| name != camera);
        self.shutterless_cameras.retain(|name| name != camera);
        if present {
            self.shutterful_cameras.push(camera.to_string());
        } else {
            self.shutterless_cameras.push(camera.to_string());
        }
        tracing::info!(
            "Camera '{}' recorded as {}",
            camera,
            if present { "having a shutter" } else { "shutterless" }
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = PrepareOptions::default();
        assert_eq!(options.max_temperature_diff, 0.1);
        assert_eq!(options.astrometry_rotator_threshold, 1.0);
        assert_eq!(options.flat_sync_retry(), Duration::from_secs(1));
        assert!(!options.flat_sync_focus);
        assert!(options.wall_position.is_none());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let options: PrepareOptions =
            serde_json::from_str(r#"{"flat_sync_focus": true, "rotator": {"camera_offset": 12.5}}"#).unwrap();
        assert!(options.flat_sync_focus);
        assert_eq!(options.max_temperature_diff, 0.1);
        assert_eq!(options.rotator.camera_offset, 12.5);
        assert_eq!(options.rotator.calibration_pier_side, PierSide::Unknown);
    }

    #[test]
    fn test_shutter_cache() {
        let mut options = PrepareOptions::default();
        assert_eq!(options.shutter_known("QHY600M"), None);

        options.remember_shutter("QHY600M", false);
        assert_eq!(options.shutter_known("QHY600M"), Some(false));

        // new knowledge replaces the old entry
        options.remember_shutter("QHY600M", true);
        assert_eq!(options.shutter_known("QHY600M"), Some(true));
        assert!(options.shutterless_cameras.is_empty());
        assert_eq!(options.shutterful_cameras, vec!["QHY600M".to_string()]);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("capture.json");

        let mut options = PrepareOptions::default();
        options.max_temperature_diff = 0.5;
        options.wall_position = Some(HorizontalCoord {
            altitude: 10.0,
            azimuth: 180.0,
        });
        options.remember_shutter("ZWO ASI294MM", false);
        options.save(&path).unwrap();

        let loaded = PrepareOptions::load(&path).unwrap();
        assert_eq!(loaded, options);
    }

    #[test]
    fn test_load_errors() {
        let dir = tempfile::tempdir().unwrap();

        let missing = dir.path().join("missing.json");
        assert!(matches!(
            PrepareOptions::load(&missing),
            Err(PrepareError::OptionsIo { .. })
        ));

        let broken = dir.path().join("broken.json");
        std::fs::write(&broken, "{ not json").unwrap();
        assert!(matches!(
            PrepareOptions::load(&broken),
            Err(PrepareError::OptionsParse { .. })
        ));
    }

    #[test]
    fn test_rotator_angles_from_options() {
        let options = RotatorOptions {
            camera_offset: 20.0,
            calibration_pier_side: PierSide::West,
        };
        let mut angles = options.angles();
        assert_eq!(angles.offset(), 20.0);
        angles.set_mount_pier_side(PierSide::East);
        assert!(angles.is_mount_flipped());
    }
}
