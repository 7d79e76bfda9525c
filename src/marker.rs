use crate::error::GuidanceError;
use nalgebra as na;
use serde::{Deserialize, Serialize};

/// Size of the camera frame a detection came from, in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameDimensions {
    pub width: u32,
    pub height: u32,
}

impl FrameDimensions {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn half_width(&self) -> f32 {
        self.width as f32 / 2.0
    }
}

/// Four marker corners in detection order
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MarkerQuad([na::Point2<f32>; 4]);

impl MarkerQuad {
    pub fn new(corners: [na::Point2<f32>; 4]) -> Self {
        Self(corners)
    }

    pub fn from_pixels(corners: [[f32; 2]; 4]) -> Self {
        Self(corners.map(|[x, y]| na::Point2::new(x, y)))
    }

    pub fn corners(&self) -> &[na::Point2<f32>; 4] {
        &self.0
    }

    /// Mean length of edges 0-1, 1-2 and 2-3
    ///
    /// The closing edge is left out on purpose, the calibration was
    /// measured the same way.
    pub fn mean_edge_length(&self) -> f32 {
        let sum: f32 = self
            .0
            .windows(2)
            .map(|pair| na::distance(&pair[0], &pair[1]))
            .sum();
        sum / 3.0
    }

    pub fn mean_x(&self) -> f32 {
        self.0.iter().map(|corner| corner.x).sum::<f32>() / 4.0
    }
}

/// Marker position relative to the camera
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MarkerPose {
    /// Marker centre minus half the frame width, positive to the right
    pub lateral_offset_px: f32,
    pub distance_cm: f32,
}

/// Pinhole calibration taken from one measurement of the printed marker
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct MarkerCalibration {
    /// Distance at which the reference measurement was taken
    #[serde(default = "default_known_distance_cm")]
    pub known_distance_cm: f32,
    /// Apparent marker edge length at `known_distance_cm`
    #[serde(default = "default_known_width_units")]
    pub known_width_units: f32,
}

fn default_known_distance_cm() -> f32 {
    40.0
}

fn default_known_width_units() -> f32 {
    100.0
}

impl Default for MarkerCalibration {
    fn default() -> Self {
        Self {
            known_distance_cm: default_known_distance_cm(),
            known_width_units: default_known_width_units(),
        }
    }
}

/// Turns marker corners into a [`MarkerPose`]
#[derive(Debug, Clone)]
pub struct MarkerPoseEstimator {
    calibration: MarkerCalibration,
}

impl MarkerPoseEstimator {
    pub fn new(calibration: MarkerCalibration) -> Self {
        Self { calibration }
    }

    pub fn distance_cm(&self, quad: &MarkerQuad) -> Result<f32, GuidanceError> {
        let edge = quad.mean_edge_length();
        if !edge.is_finite() || edge <= f32::EPSILON {
            return Err(GuidanceError::InvalidMarkerGeometry);
        }
        let distance =
            self.calibration.known_distance_cm * self.calibration.known_width_units / edge;
        if distance.is_finite() {
            Ok(distance)
        } else {
            Err(GuidanceError::InvalidMarkerGeometry)
        }
    }

    pub fn estimate(
        &self,
        quad: &MarkerQuad,
        dimensions: Option<FrameDimensions>,
    ) -> Result<MarkerPose, GuidanceError> {
        let dimensions = dimensions
            .filter(|dimensions| dimensions.width > 0)
            .ok_or(GuidanceError::MissingFrameDimensions)?;
        let distance_cm = self.distance_cm(quad)?;
        let lateral_offset_px = quad.mean_x() - dimensions.half_width();
        if !lateral_offset_px.is_finite() {
            return Err(GuidanceError::InvalidMarkerGeometry);
        }
        Ok(MarkerPose {
            lateral_offset_px,
            distance_cm,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn square(x: f32, y: f32, side: f32) -> MarkerQuad {
        MarkerQuad::from_pixels([[x, y], [x + side, y], [x + side, y + side], [x, y + side]])
    }

    fn estimator() -> MarkerPoseEstimator {
        MarkerPoseEstimator::new(MarkerCalibration::default())
    }

    #[test]
    fn calibration_size_gives_calibration_distance() {
        let pose = estimator()
            .estimate(&square(0.0, 0.0, 100.0), Some(FrameDimensions::new(640, 480)))
            .unwrap();
        assert_relative_eq!(pose.distance_cm, 40.0);
    }

    #[test]
    fn distance_is_inverse_to_size() {
        let estimator = estimator();
        let near = estimator.distance_cm(&square(0.0, 0.0, 200.0)).unwrap();
        let far = estimator.distance_cm(&square(0.0, 0.0, 50.0)).unwrap();
        assert_relative_eq!(near, 20.0);
        assert_relative_eq!(far, 80.0);
    }

    #[test]
    fn only_three_edges_are_measured() {
        // closing edge 3-0 is much longer than the rest
        let quad = MarkerQuad::from_pixels([[0.0, 0.0], [10.0, 0.0], [10.0, 10.0], [10.0, 20.0]]);
        assert_relative_eq!(quad.mean_edge_length(), 10.0);
    }

    #[test]
    fn positive_quads_have_finite_positive_distance() {
        let estimator = estimator();
        for side in [0.5_f32, 3.0, 42.0, 640.0, 5000.0] {
            for origin in [-100.0_f32, 0.0, 333.3] {
                let distance = estimator.distance_cm(&square(origin, origin, side)).unwrap();
                assert!(distance.is_finite());
                assert!(distance > 0.0);
            }
        }
    }

    #[test]
    fn collapsed_marker_is_rejected() {
        let point = MarkerQuad::from_pixels([[5.0, 5.0]; 4]);
        assert_eq!(
            estimator().estimate(&point, Some(FrameDimensions::new(640, 480))),
            Err(GuidanceError::InvalidMarkerGeometry)
        );
    }

    #[test]
    fn nan_corner_is_rejected() {
        let quad = MarkerQuad::from_pixels([[f32::NAN, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0]]);
        assert_eq!(
            estimator().distance_cm(&quad),
            Err(GuidanceError::InvalidMarkerGeometry)
        );
    }

    #[test]
    fn missing_frame_width_is_reported() {
        let quad = square(0.0, 0.0, 100.0);
        assert_eq!(
            estimator().estimate(&quad, None),
            Err(GuidanceError::MissingFrameDimensions)
        );
        assert_eq!(
            estimator().estimate(&quad, Some(FrameDimensions::new(0, 480))),
            Err(GuidanceError::MissingFrameDimensions)
        );
    }

    #[test]
    fn lateral_offset_is_relative_to_frame_centre() {
        let pose = estimator()
            .estimate(&square(400.0, 0.0, 100.0), Some(FrameDimensions::new(640, 480)))
            .unwrap();
        // centre x 450, half width 320
        assert_relative_eq!(pose.lateral_offset_px, 130.0);
    }
}
