use config::Config;
use serde::Deserialize;
use std::{path::PathBuf, time::Duration};
use tracing::*;

use crate::{
    driver::ActuationConfig, error::ErrorWrapper, guidance::GuidanceThresholds,
    lidar::ScanProjectorConfig, localisation::LocalisationConfig, manual::ManualDriveConfig,
    map::MapDisplayConfig, marker::MarkerCalibration, marker_follower::MarkerFollowerConfig,
    waypoint::WaypointConfig,
};

#[derive(Deserialize, Debug, Clone)]
pub struct AppConfig {
    #[serde(default)]
    pub marker: MarkerCalibration,
    #[serde(default)]
    pub guidance: GuidanceThresholds,
    #[serde(default)]
    pub marker_follower: MarkerFollowerConfig,
    #[serde(default)]
    pub waypoint: WaypointConfig,
    #[serde(default)]
    pub scan: ScanProjectorConfig,
    #[serde(default)]
    pub localisation: LocalisationConfig,
    #[serde(default)]
    pub manual: ManualDriveConfig,
    #[serde(default)]
    pub map_display: MapDisplayConfig,
    #[serde(default)]
    pub actuation: ActuationConfig,
    #[serde(default)]
    pub topics: TopicConfig,
    #[serde(default)]
    pub zenoh: PilotZenohConfig,
    /// How often the manual drive watchdog is checked
    #[serde(default = "default_watchdog_period_ms")]
    pub watchdog_period_ms: u64,
}

fn default_watchdog_period_ms() -> u64 {
    100
}

impl AppConfig {
    pub fn load_config(config: &Option<PathBuf>) -> anyhow::Result<Self> {
        let settings = if let Some(config) = config {
            info!("Using configuration from {:?}", config);
            Config::builder()
                .add_source(config::Environment::with_prefix("APP"))
                .add_source(config::File::with_name(
                    config
                        .to_str()
                        .ok_or_else(|| anyhow::anyhow!("Failed to convert path"))?,
                ))
                .build()?
        } else {
            info!("Using dev configuration");
            Config::builder()
                .add_source(config::Environment::with_prefix("APP"))
                .add_source(config::File::with_name("config/settings"))
                .add_source(config::File::with_name("config/dev_settings").required(false))
                .build()?
        };

        Ok(settings.try_deserialize()?)
    }

    pub fn watchdog_period(&self) -> Duration {
        Duration::from_millis(self.watchdog_period_ms.max(1))
    }
}

#[derive(Deserialize, Debug, Clone)]
pub struct TopicConfig {
    #[serde(default = "default_marker_topic")]
    pub marker: String,
    #[serde(default = "default_lidar_topic")]
    pub lidar: String,
    #[serde(default = "default_operator_topic")]
    pub operator: String,
    #[serde(default = "default_cloud_topic")]
    pub cloud: String,
    #[serde(default = "default_status_topic")]
    pub status: String,
}

fn default_marker_topic() -> String {
    "turtle/marker".to_owned()
}

fn default_lidar_topic() -> String {
    "turtle/lidar".to_owned()
}

fn default_operator_topic() -> String {
    "turtle/operator".to_owned()
}

fn default_cloud_topic() -> String {
    "turtle/lidar/cloud".to_owned()
}

fn default_status_topic() -> String {
    "turtle/pilot/status".to_owned()
}

impl Default for TopicConfig {
    fn default() -> Self {
        Self {
            marker: default_marker_topic(),
            lidar: default_lidar_topic(),
            operator: default_operator_topic(),
            cloud: default_cloud_topic(),
            status: default_status_topic(),
        }
    }
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct PilotZenohConfig {
    #[serde(default)]
    pub connect: Vec<zenoh_config::EndPoint>,
    #[serde(default)]
    pub listen: Vec<zenoh_config::EndPoint>,
    #[serde(default)]
    pub config_path: Option<String>,
}

impl PilotZenohConfig {
    pub fn get_zenoh_config(&self) -> anyhow::Result<zenoh::config::Config> {
        let mut config = if let Some(conf_file) = &self.config_path {
            zenoh::config::Config::from_file(conf_file).map_err(ErrorWrapper::ZenohError)?
        } else {
            zenoh::config::Config::default()
        };
        if !self.connect.is_empty() {
            config.connect.endpoints.clone_from(&self.connect);
        }
        if !self.listen.is_empty() {
            config.listen.endpoints.clone_from(&self.listen);
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    static DEFAULT_CONFIG: &str = include_str!("../config/settings.yaml");

    fn parse(text: &str) -> AppConfig {
        Config::builder()
            .add_source(config::File::from_str(text, config::FileFormat::Yaml))
            .build()
            .unwrap()
            .try_deserialize::<AppConfig>()
            .unwrap()
    }

    #[test]
    fn test_config() {
        let config = parse(DEFAULT_CONFIG);
        assert_relative_eq!(config.marker.known_distance_cm, 40.0);
        assert_relative_eq!(config.guidance.target_distance_cm, 30.0);
        assert_relative_eq!(config.waypoint.angle_tolerance_deg, 4.0);
        assert!(matches!(config.actuation, ActuationConfig::Zenoh { .. }));
    }

    #[test]
    fn empty_config_uses_defaults() {
        let config = parse("watchdog_period_ms: 50");
        assert_eq!(config.watchdog_period(), Duration::from_millis(50));
        assert_relative_eq!(config.scan.display_cutoff_mm, 750.0);
        assert_relative_eq!(config.marker_follower.rotation_gains.kp, 0.4);
        assert_eq!(config.topics.lidar, "turtle/lidar");
        assert_eq!(config.manual.watchdog_timeout_ms, 1000);
    }

    #[test]
    fn gains_are_settable() {
        let config = parse(
            r#"
waypoint:
  heading_gains:
    kp: 0.5
    kd: 1.0
guidance:
  alignment_tolerance_px: 75
"#,
        );
        assert_relative_eq!(config.waypoint.heading_gains.kp, 0.5);
        assert_relative_eq!(config.waypoint.heading_gains.ki, 0.0);
        assert_relative_eq!(config.guidance.alignment_tolerance_px, 75.0);
        assert_relative_eq!(config.guidance.position_tolerance_cm, 3.0);
    }
}
