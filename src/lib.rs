#![doc = include_str!("../README.md")]
pub mod configuration;
pub mod control;
pub mod dispatcher;
pub mod driver;
pub mod error;
pub mod guidance;
pub mod lidar;
pub mod localisation;
pub mod logging;
pub mod manual;
pub mod map;
pub mod marker;
pub mod marker_follower;
pub mod messages;
pub mod pilot;
pub mod waypoint;
