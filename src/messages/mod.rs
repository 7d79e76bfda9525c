pub mod laser_scan;

use crate::{
    dispatcher::DriveMode,
    guidance::GuidanceState,
    marker::{FrameDimensions, MarkerQuad},
    waypoint::{Destination, RobotPose},
};
use chrono::prelude::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use laser_scan::LaserScan;

/// Output of the external marker detector for one camera frame
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MarkerObservation {
    /// Frame size, missing until the camera delivered a decodable frame
    #[serde(default)]
    pub frame: Option<FrameDimensions>,
    /// Corner pixels in detection order
    #[serde(default)]
    pub corners: Option<[[f32; 2]; 4]>,
}

impl MarkerObservation {
    pub fn quad(&self) -> Option<MarkerQuad> {
        self.corners.map(MarkerQuad::from_pixels)
    }
}

#[derive(Debug, Deserialize, Serialize, PartialEq, Eq, Hash, Clone, Copy)]
pub enum Key {
    Up,
    Down,
    Left,
    Right,
}

#[derive(Debug, Deserialize, Serialize, PartialEq, Clone, Copy)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OperatorCommand {
    KeyDown { key: Key },
    KeyUp { key: Key },
    /// Click in operator display pixels
    Click { x: f32, y: f32 },
    SetMode { mode: DriveMode },
    ClearDestination,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct OperatorMessage {
    pub time: DateTime<Utc>,
    pub command: OperatorCommand,
}

/// Projected lidar points for the operator display
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct PointCloudMessage {
    pub points: Vec<[f32; 2]>,
}

#[derive(Debug, Serialize, Clone)]
pub struct PilotStatus {
    pub time: DateTime<Utc>,
    pub mode: DriveMode,
    pub guidance: Option<GuidanceState>,
    pub marker_distance_cm: Option<f32>,
    pub pose: Option<RobotPose>,
    pub destination: Option<Destination>,
}
