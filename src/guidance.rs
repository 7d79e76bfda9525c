use crate::{
    error::GuidanceError,
    marker::{FrameDimensions, MarkerPose, MarkerPoseEstimator, MarkerQuad},
};
use serde::{Deserialize, Serialize};
use tracing::*;

/// Where the marker is relative to where we want it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GuidanceState {
    Lost,
    AlignLeft,
    AlignRight,
    Forward,
    Backward,
    Finish,
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct GuidanceThresholds {
    #[serde(default = "default_alignment_tolerance_px")]
    pub alignment_tolerance_px: f32,
    #[serde(default = "default_target_distance_cm")]
    pub target_distance_cm: f32,
    #[serde(default = "default_position_tolerance_cm")]
    pub position_tolerance_cm: f32,
}

fn default_alignment_tolerance_px() -> f32 {
    50.0
}

fn default_target_distance_cm() -> f32 {
    30.0
}

fn default_position_tolerance_cm() -> f32 {
    3.0
}

impl Default for GuidanceThresholds {
    fn default() -> Self {
        Self {
            alignment_tolerance_px: default_alignment_tolerance_px(),
            target_distance_cm: default_target_distance_cm(),
            position_tolerance_cm: default_position_tolerance_cm(),
        }
    }
}

/// Classify the latest marker pose
///
/// Memoryless, the first matching rule wins. Alignment is fixed before
/// distance so the robot never drives at a marker it is not facing.
pub fn classify(thresholds: &GuidanceThresholds, pose: Option<&MarkerPose>) -> GuidanceState {
    let Some(pose) = pose else {
        return GuidanceState::Lost;
    };
    if pose.lateral_offset_px > thresholds.alignment_tolerance_px {
        GuidanceState::AlignRight
    } else if pose.lateral_offset_px < -thresholds.alignment_tolerance_px {
        GuidanceState::AlignLeft
    } else if pose.distance_cm > thresholds.target_distance_cm + thresholds.position_tolerance_cm
    {
        GuidanceState::Forward
    } else if pose.distance_cm < thresholds.target_distance_cm - thresholds.position_tolerance_cm
    {
        GuidanceState::Backward
    } else {
        GuidanceState::Finish
    }
}

/// Everything the marker follower needs from one camera frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GuidanceFrame {
    pub dimensions: Option<FrameDimensions>,
    pub state: GuidanceState,
    /// Latest good pose, possibly from an earlier frame when the marker is lost
    pub pose: Option<MarkerPose>,
}

/// Runs estimation and classification for every camera frame
///
/// Keeps the last good pose so error terms stay defined across a missed
/// frame, while the state still drops to [`GuidanceState::Lost`].
#[derive(Debug, Clone)]
pub struct MarkerTracker {
    estimator: MarkerPoseEstimator,
    thresholds: GuidanceThresholds,
    last_pose: Option<MarkerPose>,
}

impl MarkerTracker {
    pub fn new(estimator: MarkerPoseEstimator, thresholds: GuidanceThresholds) -> Self {
        Self {
            estimator,
            thresholds,
            last_pose: None,
        }
    }

    pub fn last_pose(&self) -> Option<&MarkerPose> {
        self.last_pose.as_ref()
    }

    pub fn observe(
        &mut self,
        dimensions: Option<FrameDimensions>,
        quad: Option<&MarkerQuad>,
    ) -> GuidanceFrame {
        let current = match quad.map(|quad| self.estimator.estimate(quad, dimensions)) {
            Some(Ok(pose)) => Some(pose),
            Some(Err(GuidanceError::InvalidMarkerGeometry)) => {
                debug!("Discarding degenerate marker");
                None
            }
            Some(Err(err)) => {
                debug!("Marker not usable: {}", err);
                None
            }
            None => None,
        };
        if let Some(pose) = current {
            self.last_pose = Some(pose);
        }
        GuidanceFrame {
            dimensions,
            state: classify(&self.thresholds, current.as_ref()),
            pose: self.last_pose,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::marker::MarkerCalibration;

    fn pose(lateral_offset_px: f32, distance_cm: f32) -> MarkerPose {
        MarkerPose {
            lateral_offset_px,
            distance_cm,
        }
    }

    fn state(lateral_offset_px: f32, distance_cm: f32) -> GuidanceState {
        classify(
            &GuidanceThresholds::default(),
            Some(&pose(lateral_offset_px, distance_cm)),
        )
    }

    #[test]
    fn absent_marker_is_lost() {
        assert_eq!(
            classify(&GuidanceThresholds::default(), None),
            GuidanceState::Lost
        );
    }

    #[test]
    fn alignment_wins_over_distance() {
        assert_eq!(state(51.0, 100.0), GuidanceState::AlignRight);
        assert_eq!(state(-51.0, 5.0), GuidanceState::AlignLeft);
    }

    #[test]
    fn distance_decides_once_aligned() {
        assert_eq!(state(0.0, 40.0), GuidanceState::Forward);
        assert_eq!(state(10.0, 20.0), GuidanceState::Backward);
        assert_eq!(state(-10.0, 31.0), GuidanceState::Finish);
    }

    #[test]
    fn tolerance_edges_are_inclusive() {
        assert_eq!(state(50.0, 33.0), GuidanceState::Finish);
        assert_eq!(state(-50.0, 27.0), GuidanceState::Finish);
    }

    #[test]
    fn exactly_one_predicate_holds() {
        let thresholds = GuidanceThresholds::default();
        for offset in (-400..=400).step_by(7) {
            for distance in (0..=120).step_by(1) {
                let offset = offset as f32;
                let distance = distance as f32;
                let predicates = [
                    offset > thresholds.alignment_tolerance_px,
                    offset <= thresholds.alignment_tolerance_px
                        && offset < -thresholds.alignment_tolerance_px,
                    offset.abs() <= thresholds.alignment_tolerance_px
                        && distance
                            > thresholds.target_distance_cm + thresholds.position_tolerance_cm,
                    offset.abs() <= thresholds.alignment_tolerance_px
                        && distance
                            <= thresholds.target_distance_cm + thresholds.position_tolerance_cm
                        && distance
                            < thresholds.target_distance_cm - thresholds.position_tolerance_cm,
                    offset.abs() <= thresholds.alignment_tolerance_px
                        && (distance - thresholds.target_distance_cm).abs()
                            <= thresholds.position_tolerance_cm,
                ];
                assert_eq!(predicates.iter().filter(|held| **held).count(), 1);
                // and classification is deterministic
                assert_eq!(state(offset, distance), state(offset, distance));
            }
        }
    }

    #[test]
    fn tracker_keeps_stale_pose_while_lost() {
        let mut tracker = MarkerTracker::new(
            MarkerPoseEstimator::new(MarkerCalibration::default()),
            GuidanceThresholds::default(),
        );
        let dimensions = Some(FrameDimensions::new(640, 480));
        let quad =
            MarkerQuad::from_pixels([[270.0, 0.0], [370.0, 0.0], [370.0, 100.0], [270.0, 100.0]]);

        let seen = tracker.observe(dimensions, Some(&quad));
        assert_eq!(seen.state, GuidanceState::Forward);

        let lost = tracker.observe(dimensions, None);
        assert_eq!(lost.state, GuidanceState::Lost);
        assert_eq!(lost.pose, seen.pose);
    }

    #[test]
    fn degenerate_marker_is_lost() {
        let mut tracker = MarkerTracker::new(
            MarkerPoseEstimator::new(MarkerCalibration::default()),
            GuidanceThresholds::default(),
        );
        let collapsed = MarkerQuad::from_pixels([[1.0, 1.0]; 4]);
        let frame = tracker.observe(Some(FrameDimensions::new(640, 480)), Some(&collapsed));
        assert_eq!(frame.state, GuidanceState::Lost);
        assert!(frame.pose.is_none());
    }
}
