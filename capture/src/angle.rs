//! Rotator angle conversions
//!
//! A rotator reports a raw circular angle in [0, 360). The camera position angle
//! (PA) is sky referenced and lives in (-180, 180]. Both are related by the
//! camera offset measured during plate solving and by a 180° correction whenever
//! the mount currently sits on the other pier side than during calibration.

use serde::{Deserialize, Serialize};

/// Side of the pier the optical tube points from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum PierSide {
    East,
    West,
    #[default]
    Unknown,
}

/// Reduce an angle to [0, 360)
pub fn range360(angle: f64) -> f64 {
    let reduced = angle.rem_euclid(360.0);
    // rem_euclid can round up to exactly 360 for tiny negative inputs
    if reduced >= 360.0 {
        0.0
    } else {
        reduced
    }
}

/// Reduce a position angle to (-180, 180]
pub fn range_pa(angle: f64) -> f64 {
    let mut pa = range360(angle);
    if pa > 180.0 {
        pa -= 360.0;
    }
    pa
}

/// Signed shortest difference between two position angles, in degrees
pub fn diff_pa(current: f64, target: f64) -> f64 {
    range_pa(current - target)
}

/// Converter between raw rotator angles and camera position angles
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct RotatorAngles {
    /// Mechanical offset between rotator zero and PA zero (degrees)
    offset: f64,
    /// Pier side at the time the offset was calibrated
    calibration_pier_side: PierSide,
    /// Pier side the mount reports right now
    mount_pier_side: PierSide,
}

impl RotatorAngles {
    pub fn new(offset: f64) -> Self {
        Self {
            offset: range_pa(offset),
            ..Default::default()
        }
    }

    pub fn offset(&self) -> f64 {
        self.offset
    }

    /// Store a freshly derived offset, e.g. after a plate solve
    pub fn update_offset(&mut self, offset: f64) {
        self.offset = range_pa(offset);
        self.calibration_pier_side = self.mount_pier_side;
        tracing::debug!(
            "Rotator offset updated to {:.2}° (pier side {:?})",
            self.offset,
            self.calibration_pier_side
        );
    }

    pub fn set_calibration_pier_side(&mut self, side: PierSide) {
        self.calibration_pier_side = side;
    }

    pub fn set_mount_pier_side(&mut self, side: PierSide) {
        self.mount_pier_side = side;
    }

    /// The optical train sits on the other pier side than when calibrated
    pub fn is_mount_flipped(&self) -> bool {
        self.calibration_pier_side != PierSide::Unknown
            && self.mount_pier_side != PierSide::Unknown
            && self.calibration_pier_side != self.mount_pier_side
    }

    /// Raw rotator angle needed to reach the given camera position angle
    pub fn rotator_angle_from_position_angle(&self, position_angle: f64) -> f64 {
        let pa = if self.is_mount_flipped() {
            position_angle + 180.0
        } else {
            position_angle
        };
        range360(pa - self.offset)
    }

    /// Camera position angle for a raw rotator angle.
    ///
    /// `flipped_image` marks an image taken on the other pier side; the 180°
    /// correction applies when exactly one of mount and image is flipped.
    pub fn position_angle_from_rotator_angle(&self, rotator_angle: f64, flipped_image: bool) -> f64 {
        let mut pa = signed_rotator_angle(rotator_angle) + self.offset;
        if self.is_mount_flipped() ^ flipped_image {
            pa = flip_180(pa);
        }
        range_pa(pa)
    }

    /// Offset that maps `rotator_angle` onto the solved `position_angle`
    pub fn offset_angle_from_rotator_and_position_angle(&self, rotator_angle: f64, position_angle: f64) -> f64 {
        let mut offset = position_angle - signed_rotator_angle(rotator_angle);
        if self.is_mount_flipped() {
            offset = flip_180(offset);
        }
        range_pa(offset)
    }
}

fn signed_rotator_angle(rotator_angle: f64) -> f64 {
    let angle = range360(rotator_angle);
    if angle > 180.0 {
        angle - 360.0
    } else {
        angle
    }
}

fn flip_180(angle: f64) -> f64 {
    if angle > 0.0 {
        angle - 180.0
    } else {
        angle + 180.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-9;

    fn flipped(offset: f64) -> RotatorAngles {
        let mut angles = RotatorAngles::new(offset);
        angles.set_calibration_pier_side(PierSide::East);
        angles.set_mount_pier_side(PierSide::West);
        angles
    }

    #[test]
    fn test_range_helpers() {
        assert_eq!(range360(370.0), 10.0);
        assert_eq!(range360(-10.0), 350.0);
        assert_eq!(range360(360.0), 0.0);
        assert_eq!(range_pa(190.0), -170.0);
        assert_eq!(range_pa(180.0), 180.0);
        assert_eq!(range_pa(-180.0), 180.0);
        assert_eq!(range_pa(-90.0), -90.0);
        assert_eq!(diff_pa(179.0, -179.0), -2.0);
    }

    #[test]
    fn test_rotator_angle_without_flip() {
        let angles = RotatorAngles::new(20.0);
        assert!((angles.rotator_angle_from_position_angle(30.0) - 10.0).abs() < EPS);
        assert!((angles.rotator_angle_from_position_angle(10.0) - 350.0).abs() < EPS);
        assert!((angles.rotator_angle_from_position_angle(-170.0) - 170.0).abs() < EPS);
    }

    #[test]
    fn test_position_angle_without_flip() {
        let angles = RotatorAngles::new(20.0);
        assert!((angles.position_angle_from_rotator_angle(10.0, false) - 30.0).abs() < EPS);
        assert!((angles.position_angle_from_rotator_angle(350.0, false) - 10.0).abs() < EPS);
        assert!((angles.position_angle_from_rotator_angle(170.0, false) - -170.0).abs() < EPS);
        // an image flip alone turns the result by 180°
        assert!((angles.position_angle_from_rotator_angle(10.0, true) - -150.0).abs() < EPS);
    }

    #[test]
    fn test_flipped_mount() {
        let angles = flipped(0.0);
        assert!(angles.is_mount_flipped());
        assert!((angles.rotator_angle_from_position_angle(10.0) - 190.0).abs() < EPS);
        assert!((angles.position_angle_from_rotator_angle(10.0, false) - -170.0).abs() < EPS);
        // mount and image flipped together cancel out
        assert!((angles.position_angle_from_rotator_angle(10.0, true) - 10.0).abs() < EPS);
    }

    #[test]
    fn test_unknown_pier_side_is_not_flipped() {
        let mut angles = RotatorAngles::new(0.0);
        angles.set_calibration_pier_side(PierSide::East);
        assert!(!angles.is_mount_flipped());
    }

    #[test]
    fn test_offset_from_solve() {
        let angles = RotatorAngles::new(0.0);
        assert!((angles.offset_angle_from_rotator_and_position_angle(10.0, 30.0) - 20.0).abs() < EPS);
        assert!((angles.offset_angle_from_rotator_and_position_angle(350.0, 10.0) - 20.0).abs() < EPS);

        let angles = flipped(0.0);
        assert!((angles.offset_angle_from_rotator_and_position_angle(10.0, -150.0) - 20.0).abs() < EPS);
    }

    #[test]
    fn test_update_offset_records_pier_side() {
        let mut angles = RotatorAngles::new(0.0);
        angles.set_mount_pier_side(PierSide::West);
        angles.update_offset(370.0);
        assert!((angles.offset() - 10.0).abs() < EPS);
        angles.set_mount_pier_side(PierSide::East);
        assert!(angles.is_mount_flipped());
    }

    #[test]
    fn test_round_trip_through_position_angle() {
        for offset in [-135.0, -20.0, 0.0, 42.5, 179.0] {
            for angles in [RotatorAngles::new(offset), flipped(offset)] {
                let mut raw = 0.0;
                while raw < 360.0 {
                    let pa = angles.position_angle_from_rotator_angle(raw, false);
                    let back = angles.rotator_angle_from_position_angle(pa);
                    let diff = diff_pa(back, raw).abs();
                    assert!(diff < 1e-6, "offset {offset}, raw {raw}: got {back}");
                    raw += 7.5;
                }
            }
        }
    }
}
