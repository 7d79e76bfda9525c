use crate::{
    control::{CommandBatch, Controller},
    guidance::GuidanceFrame,
    manual::{ManualDrive, ManualInput},
    marker_follower::MarkerFollowController,
    waypoint::{Destination, RobotPose, WaypointController, WaypointInput},
};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DriveMode {
    #[default]
    Manual,
    MarkerFollow,
    Waypoint,
}

impl fmt::Display for DriveMode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            DriveMode::Manual => write!(f, "manual"),
            DriveMode::MarkerFollow => write!(f, "marker follow"),
            DriveMode::Waypoint => write!(f, "waypoint"),
        }
    }
}

/// Single authority over the velocity command stream
///
/// Inputs meant for a mode that is not active are dropped, so only the
/// active controller ever produces commands.
#[derive(Debug)]
pub struct CommandDispatcher {
    mode: DriveMode,
    manual: ManualDrive,
    marker_follower: MarkerFollowController,
    waypoint: WaypointController,
    destination: Option<Destination>,
}

impl CommandDispatcher {
    pub fn new(
        manual: ManualDrive,
        marker_follower: MarkerFollowController,
        waypoint: WaypointController,
    ) -> Self {
        Self {
            mode: DriveMode::Manual,
            manual,
            marker_follower,
            waypoint,
            destination: None,
        }
    }

    pub fn mode(&self) -> DriveMode {
        self.mode
    }

    pub fn destination(&self) -> Option<Destination> {
        self.destination
    }

    /// Switch modes, stopping the robot and starting the new mode fresh
    pub fn set_mode(&mut self, mode: DriveMode) -> CommandBatch {
        if mode == self.mode {
            return CommandBatch::abstain();
        }
        info!("Switching from {} to {} mode", self.mode, mode);
        self.mode = mode;
        match mode {
            DriveMode::Manual => self.manual.reset(),
            DriveMode::MarkerFollow => self.marker_follower.reset(),
            DriveMode::Waypoint => self.waypoint.reset(),
        }
        CommandBatch::stop()
    }

    pub fn set_destination(&mut self, destination: Destination) {
        info!("New destination {:?}", destination);
        self.destination = Some(destination);
    }

    pub fn clear_destination(&mut self) {
        self.destination = None;
    }

    pub fn on_manual(&mut self, input: ManualInput) -> CommandBatch {
        if self.mode != DriveMode::Manual {
            return CommandBatch::abstain();
        }
        self.manual.update(&input)
    }

    pub fn on_guidance(&mut self, frame: &GuidanceFrame) -> CommandBatch {
        if self.mode != DriveMode::MarkerFollow {
            return CommandBatch::abstain();
        }
        self.marker_follower.update(frame)
    }

    pub fn on_pose(&mut self, pose: Option<RobotPose>) -> CommandBatch {
        if self.mode != DriveMode::Waypoint {
            return CommandBatch::abstain();
        }
        self.waypoint.update(&WaypointInput {
            pose,
            destination: self.destination,
        })
    }
}
