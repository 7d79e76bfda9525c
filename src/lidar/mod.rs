use crate::messages::LaserScan;
use nalgebra as na;
use serde::{Deserialize, Serialize};
use tracing::*;

/// Quality assigned when the scan carries no intensities
pub const UNRATED_QUALITY: f32 = f32::MAX;

/// Distance reported for a ray that saw nothing
pub const NO_RETURN_MM: f32 = 0.0;

const METRES_TO_MM: f32 = 1000.0;

/// One lidar ray
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RangeSample {
    pub angle_deg: f32,
    pub distance_mm: f32,
    pub quality: f32,
}

impl RangeSample {
    pub fn new(angle_deg: f32, distance_mm: f32, quality: f32) -> Self {
        Self {
            angle_deg,
            distance_mm,
            quality,
        }
    }

    /// Unpack a scan message into samples, keeping the source order
    ///
    /// Only structurally broken rays are dropped: angles outside the declared
    /// bounds and rays that have no intensity when the message carries fewer
    /// intensities than ranges. Non finite ranges are kept as
    /// [`NO_RETURN_MM`]. Angles are wrapped into [0, 360).
    pub fn from_laser_scan(scan: &LaserScan) -> Vec<RangeSample> {
        let ray_count = scan.ranges.len();
        let angle_of = ray_angle_fn(scan);
        let declared_bounds = declared_bounds(scan);

        if !scan.intensities.is_empty() && scan.intensities.len() != ray_count {
            debug!(
                ranges = ray_count,
                intensities = scan.intensities.len(),
                "Ray count mismatch in scan"
            );
        }

        scan.ranges
            .iter()
            .enumerate()
            .filter_map(|(index, range)| {
                let quality = if scan.intensities.is_empty() {
                    UNRATED_QUALITY
                } else {
                    *scan.intensities.get(index)?
                };
                let angle = angle_of(index);
                if let Some((min, max)) = declared_bounds {
                    if angle < min || angle > max {
                        trace!(index, angle, "Dropping ray outside declared bounds");
                        return None;
                    }
                }
                let distance_mm = if range.is_finite() {
                    range * METRES_TO_MM
                } else {
                    trace!(index, "No return");
                    NO_RETURN_MM
                };
                Some(RangeSample::new(
                    wrap_degrees(angle.to_degrees()),
                    distance_mm,
                    quality,
                ))
            })
            .collect()
    }
}

const ANGLE_SLACK: f32 = 1e-4;

fn wrap_degrees(angle: f32) -> f32 {
    let wrapped = angle.rem_euclid(360.0);
    // tiny negatives round up to a full turn
    if wrapped >= 360.0 {
        0.0
    } else {
        wrapped
    }
}

fn declared_bounds(scan: &LaserScan) -> Option<(f32, f32)> {
    if scan.angle_min.is_finite() && scan.angle_max.is_finite() && scan.angle_max > scan.angle_min
    {
        Some((scan.angle_min - ANGLE_SLACK, scan.angle_max + ANGLE_SLACK))
    } else {
        None
    }
}

/// Angle in radians for a ray index
///
/// Falls back to an even split of a full turn when the message does not
/// declare a usable increment.
fn ray_angle_fn(scan: &LaserScan) -> impl Fn(usize) -> f32 {
    let ray_count = scan.ranges.len().max(1) as f32;
    let declared = scan.angle_increment.is_finite()
        && scan.angle_increment > 0.0
        && scan.angle_min.is_finite();
    let (start, step) = if declared {
        (scan.angle_min, scan.angle_increment)
    } else {
        (0.0, std::f32::consts::TAU / ray_count)
    };
    move |index| start + step * index as f32
}

/// What the localisation service consumes, index aligned
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LocalisationScan {
    pub distances_mm: Vec<f32>,
    pub angles_deg: Vec<f32>,
}

impl LocalisationScan {
    pub fn len(&self) -> usize {
        self.distances_mm.len()
    }

    pub fn is_empty(&self) -> bool {
        self.distances_mm.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScanProjection {
    pub localisation: LocalisationScan,
    /// Nearby returns in display window pixels
    pub cloud: Vec<na::Point2<f32>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct ScanProjectorConfig {
    /// Returns with lower quality stay out of the cloud
    #[serde(default = "default_min_quality")]
    pub min_quality: f32,
    /// Returns at or beyond this distance stay out of the cloud
    #[serde(default = "default_display_cutoff_mm")]
    pub display_cutoff_mm: f32,
    /// Pixel radius the cutoff distance maps to
    #[serde(default = "default_window_radius_px")]
    pub window_radius_px: f32,
    #[serde(default = "default_window_center_px")]
    pub window_center_px: [f32; 2],
}

fn default_min_quality() -> f32 {
    1.0
}

fn default_display_cutoff_mm() -> f32 {
    750.0
}

fn default_window_radius_px() -> f32 {
    300.0
}

fn default_window_center_px() -> [f32; 2] {
    [300.0, 300.0]
}

impl Default for ScanProjectorConfig {
    fn default() -> Self {
        Self {
            min_quality: default_min_quality(),
            display_cutoff_mm: default_display_cutoff_mm(),
            window_radius_px: default_window_radius_px(),
            window_center_px: default_window_center_px(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ScanProjector {
    config: ScanProjectorConfig,
}

impl ScanProjector {
    pub fn new(config: ScanProjectorConfig) -> Self {
        Self { config }
    }

    pub fn project(&self, samples: &[RangeSample]) -> ScanProjection {
        let localisation = LocalisationScan {
            distances_mm: samples.iter().map(|sample| sample.distance_mm).collect(),
            angles_deg: samples.iter().map(|sample| sample.angle_deg).collect(),
        };
        let center = na::Point2::from(self.config.window_center_px);
        let scale = self.config.window_radius_px / self.config.display_cutoff_mm;
        let cloud = samples
            .iter()
            .filter(|sample| sample.quality >= self.config.min_quality)
            .filter(|sample| {
                sample.distance_mm > 0.0 && sample.distance_mm < self.config.display_cutoff_mm
            })
            .map(|sample| {
                let radius = sample.distance_mm * scale;
                let angle = sample.angle_deg.to_radians();
                center + na::Vector2::new(radius * angle.cos(), radius * angle.sin())
            })
            .collect();
        ScanProjection {
            localisation,
            cloud,
        }
    }
}
