use crate::{
    control::{CommandBatch, ControlKind, Controller, ErrorHistory, PidGains},
    error::GuidanceError,
};
use nalgebra as na;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::*;

/// Robot pose in the map frame
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RobotPose {
    pub x_cm: f32,
    pub y_cm: f32,
    pub heading_deg: f32,
}

impl RobotPose {
    pub fn new(x_cm: f32, y_cm: f32, heading_deg: f32) -> Self {
        Self {
            x_cm,
            y_cm,
            heading_deg,
        }
    }

    pub fn position(&self) -> na::Point2<f32> {
        na::Point2::new(self.x_cm, self.y_cm)
    }
}

impl fmt::Display for RobotPose {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "[{:.1}, {:.1}] -> {:.1}",
            self.x_cm, self.y_cm, self.heading_deg
        )
    }
}

/// Operator selected goal in the map frame
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Destination {
    pub x_cm: f32,
    pub y_cm: f32,
}

impl Destination {
    pub fn new(x_cm: f32, y_cm: f32) -> Self {
        Self { x_cm, y_cm }
    }

    pub fn position(&self) -> na::Point2<f32> {
        na::Point2::new(self.x_cm, self.y_cm)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct WaypointConfig {
    #[serde(default = "default_angle_tolerance_deg")]
    pub angle_tolerance_deg: f32,
    #[serde(default = "default_position_tolerance_cm")]
    pub position_tolerance_cm: f32,
    #[serde(default = "default_cruise_speed")]
    pub cruise_speed: f32,
    #[serde(default = "default_heading_gains")]
    pub heading_gains: PidGains,
}

fn default_angle_tolerance_deg() -> f32 {
    4.0
}

fn default_position_tolerance_cm() -> f32 {
    5.0
}

fn default_cruise_speed() -> f32 {
    20.0
}

fn default_heading_gains() -> PidGains {
    PidGains::new(1.0, 0.04, 2.0)
}

impl Default for WaypointConfig {
    fn default() -> Self {
        Self {
            angle_tolerance_deg: default_angle_tolerance_deg(),
            position_tolerance_cm: default_position_tolerance_cm(),
            cruise_speed: default_cruise_speed(),
            heading_gains: default_heading_gains(),
        }
    }
}

/// Snapshot handed to the waypoint controller every scan cycle
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct WaypointInput {
    pub pose: Option<RobotPose>,
    pub destination: Option<Destination>,
}

/// Wrap an angle into (-180, 180]
pub fn normalize_degrees(angle: f32) -> f32 {
    let wrapped = (angle + 180.0).rem_euclid(360.0) - 180.0;
    if wrapped == -180.0 {
        180.0
    } else {
        wrapped
    }
}

/// Bearing to the destination relative to the robot heading and the distance to it
pub fn relative_polar(pose: &RobotPose, destination: &Destination) -> (f32, f32) {
    let delta = destination.position() - pose.position();
    let bearing = delta.y.atan2(delta.x).to_degrees();
    (normalize_degrees(bearing - pose.heading_deg), delta.norm())
}

/// Continuous polar pursuit
///
/// Turns on the spot until facing the destination, then drives straight at
/// it. Recomputed every cycle.
#[derive(Debug, Clone)]
pub struct WaypointController {
    config: WaypointConfig,
    heading: ErrorHistory,
}

impl WaypointController {
    pub fn new(config: WaypointConfig) -> Self {
        Self {
            config,
            heading: ErrorHistory::default(),
        }
    }

    fn drive(&mut self, input: &WaypointInput) -> Result<CommandBatch, GuidanceError> {
        let Some(destination) = input.destination else {
            return Ok(CommandBatch::stop());
        };
        let pose = input.pose.ok_or(GuidanceError::MissingPoseEstimate)?;

        let (relative_angle, relative_distance) = relative_polar(&pose, &destination);
        let far = relative_distance > self.config.position_tolerance_cm;

        if far && relative_angle.abs() > self.config.angle_tolerance_deg {
            let angular = self
                .config
                .heading_gains
                .apply(relative_angle, &mut self.heading);
            trace!(relative_angle, angular, "Turning towards destination");
            Ok(CommandBatch::movement(0.0, angular))
        } else if far {
            trace!(relative_distance, "Driving towards destination");
            Ok(CommandBatch::movement(self.config.cruise_speed, 0.0))
        } else {
            Ok(CommandBatch::stop())
        }
    }
}

impl Controller for WaypointController {
    type Input = WaypointInput;

    fn kind(&self) -> ControlKind {
        ControlKind::Sampled
    }

    fn update(&mut self, input: &WaypointInput) -> CommandBatch {
        match self.drive(input) {
            Ok(batch) => batch,
            Err(err) => {
                warn!("Holding position: {}", err);
                CommandBatch::stop()
            }
        }
    }

    fn reset(&mut self) {
        self.heading.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::Axis;
    use approx::assert_relative_eq;

    fn input(pose: RobotPose, destination: Destination) -> WaypointInput {
        WaypointInput {
            pose: Some(pose),
            destination: Some(destination),
        }
    }

    #[test]
    fn straight_ahead_drives_forward() {
        let mut controller = WaypointController::new(WaypointConfig::default());
        let batch = controller.update(&input(
            RobotPose::new(0.0, 0.0, 0.0),
            Destination::new(100.0, 0.0),
        ));
        assert_eq!(batch, CommandBatch::movement(20.0, 0.0));
    }

    #[test]
    fn sideways_goal_rotates_first() {
        let mut controller = WaypointController::new(WaypointConfig::default());
        let batch = controller.update(&input(
            RobotPose::new(0.0, 0.0, 0.0),
            Destination::new(0.0, 100.0),
        ));
        assert_eq!(batch.last_on(Axis::Forward), Some(0.0));
        // 1.0 * 90 + 0.04 * 90 + 2.0 * 90
        assert_relative_eq!(batch.last_on(Axis::Rotate).unwrap(), 270.0, epsilon = 1e-3);
    }

    #[test]
    fn arrival_ignores_angle() {
        let mut controller = WaypointController::new(WaypointConfig::default());
        for heading in [-179.0, -90.0, 0.0, 45.0, 180.0] {
            let batch = controller.update(&input(
                RobotPose::new(10.0, 10.0, heading),
                Destination::new(13.0, 14.0),
            ));
            assert_eq!(batch, CommandBatch::stop());
        }
    }

    #[test]
    fn no_destination_holds() {
        let mut controller = WaypointController::new(WaypointConfig::default());
        let batch = controller.update(&WaypointInput {
            pose: Some(RobotPose::new(0.0, 0.0, 0.0)),
            destination: None,
        });
        assert_eq!(batch, CommandBatch::stop());
    }

    #[test]
    fn missing_pose_holds() {
        let mut controller = WaypointController::new(WaypointConfig::default());
        let batch = controller.update(&WaypointInput {
            pose: None,
            destination: Some(Destination::new(100.0, 0.0)),
        });
        assert_eq!(batch, CommandBatch::stop());
    }

    #[test]
    fn bearing_is_continuous_across_y_axis() {
        let pose = RobotPose::new(0.0, 0.0, 0.0);
        let (left, _) = relative_polar(&pose, &Destination::new(-0.001, 100.0));
        let (right, _) = relative_polar(&pose, &Destination::new(0.001, 100.0));
        assert_relative_eq!(left, right, epsilon = 0.01);
        let (straight_up, _) = relative_polar(&pose, &Destination::new(0.0, 100.0));
        assert_relative_eq!(straight_up, 90.0);
    }

    #[test]
    fn bearing_wraps_around_heading() {
        let pose = RobotPose::new(0.0, 0.0, 170.0);
        let (angle, distance) = relative_polar(&pose, &Destination::new(-100.0, -10.0));
        // target at about -174.3 deg
        assert_relative_eq!(angle, 15.71, epsilon = 0.01);
        assert_relative_eq!(distance, 100.498_76, epsilon = 1e-3);
    }

    #[test]
    fn normalize_range() {
        assert_relative_eq!(normalize_degrees(190.0), -170.0);
        assert_relative_eq!(normalize_degrees(-190.0), 170.0);
        assert_relative_eq!(normalize_degrees(-180.0), 180.0);
        assert_relative_eq!(normalize_degrees(180.0), 180.0);
        assert_relative_eq!(normalize_degrees(720.0), 0.0);
    }

    #[test]
    fn reset_drops_heading_history() {
        let mut controller = WaypointController::new(WaypointConfig::default());
        let turn = input(RobotPose::new(0.0, 0.0, 0.0), Destination::new(0.0, 100.0));
        let first = controller.update(&turn);
        let second = controller.update(&turn);
        assert_ne!(first, second);
        controller.reset();
        assert_eq!(controller.update(&turn), first);
    }
}
