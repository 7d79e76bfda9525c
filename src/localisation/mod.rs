pub mod zenoh_slam;

use crate::{lidar::LocalisationScan, waypoint::RobotPose};
use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

pub use zenoh_slam::ZenohSlamClient;

/// Pose as reported by the SLAM service, origin in the map corner
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SlamPose {
    pub x_mm: f32,
    pub y_mm: f32,
    pub heading_deg: f32,
}

/// Square occupancy grid snapshot, one byte per cell
#[derive(Debug, Clone, PartialEq)]
pub struct OccupancyGrid {
    pub size_px: usize,
    pub size_m: f32,
    pub cells: Vec<u8>,
}

impl OccupancyGrid {
    /// Build from a raw row major buffer, `None` when the length does not match
    pub fn from_raw(size_px: usize, size_m: f32, cells: Vec<u8>) -> Option<Self> {
        (cells.len() == size_px * size_px).then_some(Self {
            size_px,
            size_m,
            cells,
        })
    }

    pub fn cell(&self, x: usize, y: usize) -> Option<u8> {
        if x < self.size_px && y < self.size_px {
            self.cells.get(y * self.size_px + x).copied()
        } else {
            None
        }
    }
}

/// Black box localisation service
///
/// Consumers only ever read snapshots, the service owns pose and map.
#[async_trait]
pub trait Localiser: Send + Sync {
    async fn update(&mut self, scan: &LocalisationScan) -> Result<()>;

    /// Latest pose, `None` while the service has not localised us
    fn get_pose(&self) -> Option<SlamPose>;

    /// Latest occupancy grid
    ///
    /// Part of the service contract for map viewers. The pilot itself only
    /// steers by pose.
    fn get_map(&self) -> Option<OccupancyGrid>;
}

#[derive(Debug, Clone, Deserialize)]
pub struct LocalisationConfig {
    #[serde(default = "default_map_size_m")]
    pub map_size_m: f32,
    #[serde(default = "default_map_size_px")]
    pub map_size_px: usize,
    /// Poses older than this are treated as missing
    #[serde(default = "default_pose_timeout_ms")]
    pub pose_timeout_ms: u64,
    #[serde(default = "default_scan_topic")]
    pub scan_topic: String,
    #[serde(default = "default_pose_topic")]
    pub pose_topic: String,
    #[serde(default = "default_map_topic")]
    pub map_topic: String,
}

fn default_map_size_m() -> f32 {
    5.0
}

fn default_map_size_px() -> usize {
    600
}

fn default_pose_timeout_ms() -> u64 {
    1000
}

fn default_scan_topic() -> String {
    "turtle/slam/scan".to_owned()
}

fn default_pose_topic() -> String {
    "turtle/slam/pose".to_owned()
}

fn default_map_topic() -> String {
    "turtle/slam/map".to_owned()
}

impl Default for LocalisationConfig {
    fn default() -> Self {
        Self {
            map_size_m: default_map_size_m(),
            map_size_px: default_map_size_px(),
            pose_timeout_ms: default_pose_timeout_ms(),
            scan_topic: default_scan_topic(),
            pose_topic: default_pose_topic(),
            map_topic: default_map_topic(),
        }
    }
}

impl LocalisationConfig {
    pub fn pose_timeout(&self) -> Duration {
        Duration::from_millis(self.pose_timeout_ms)
    }

    pub fn map_frame(&self) -> MapFrame {
        MapFrame::new(self.map_size_m)
    }
}

/// Moves SLAM poses into the centred map frame the controllers use
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MapFrame {
    map_size_m: f32,
}

impl MapFrame {
    pub fn new(map_size_m: f32) -> Self {
        Self { map_size_m }
    }

    pub fn half_extent_cm(&self) -> f32 {
        self.map_size_m * 100.0 / 2.0
    }

    pub fn robot_pose(&self, pose: &SlamPose) -> RobotPose {
        RobotPose::new(
            pose.x_mm / 10.0 - self.half_extent_cm(),
            pose.y_mm / 10.0 - self.half_extent_cm(),
            pose.heading_deg,
        )
    }
}

/// Latest pose together with when it arrived
#[derive(Debug, Clone, Default)]
pub struct PoseCache {
    latest: Option<(SlamPose, Instant)>,
}

impl PoseCache {
    pub fn store(&mut self, pose: SlamPose, received: Instant) {
        self.latest = Some((pose, received));
    }

    pub fn get(&self, now: Instant, timeout: Duration) -> Option<SlamPose> {
        self.latest
            .filter(|(_, received)| now.saturating_duration_since(*received) <= timeout)
            .map(|(pose, _)| pose)
    }
}
