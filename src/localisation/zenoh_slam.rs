use super::{LocalisationConfig, Localiser, OccupancyGrid, PoseCache, SlamPose};
use crate::{error::ErrorWrapper, lidar::LocalisationScan};
use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use std::{
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};
use tracing::*;
use zenoh::{prelude::r#async::*, subscriber::FlumeSubscriber, Session, SessionDeclarations};

/// Scan message the SLAM node ingests
#[derive(Debug, Serialize)]
struct SlamScanMessage<'a> {
    scans_mm: &'a [f32],
    scan_angles_degrees: &'a [f32],
}

#[derive(Debug, Default)]
struct SharedEstimate {
    pose: PoseCache,
    map: Option<OccupancyGrid>,
}

/// Talks to an external SLAM node over zenoh
///
/// Scans are published on the scan topic, pose and map arrive on their own
/// topics and are cached for snapshot reads.
pub struct ZenohSlamClient {
    session: Arc<Session>,
    scan_topic: String,
    pose_timeout: Duration,
    estimate: Arc<Mutex<SharedEstimate>>,
}

impl ZenohSlamClient {
    pub async fn new(session: Arc<Session>, config: &LocalisationConfig) -> Result<Self> {
        let estimate = Arc::new(Mutex::new(SharedEstimate::default()));

        let mut pose_subscriber = session
            .declare_subscriber(config.pose_topic.clone())
            .res()
            .await
            .map_err(ErrorWrapper::ZenohError)?;
        let mut map_subscriber = session
            .declare_subscriber(config.map_topic.clone())
            .res()
            .await
            .map_err(ErrorWrapper::ZenohError)?;

        tokio::spawn({
            let estimate = estimate.clone();
            async move {
                while let Err(err) = run_pose_listener(&mut pose_subscriber, &estimate).await {
                    error!("SLAM pose listener failed with {:?}", err);
                }
            }
        });

        tokio::spawn({
            let estimate = estimate.clone();
            let (size_px, size_m) = (config.map_size_px, config.map_size_m);
            async move {
                while let Err(err) =
                    run_map_listener(&mut map_subscriber, &estimate, size_px, size_m).await
                {
                    error!("SLAM map listener failed with {:?}", err);
                }
            }
        });

        Ok(Self {
            session,
            scan_topic: config.scan_topic.clone(),
            pose_timeout: config.pose_timeout(),
            estimate,
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SharedEstimate> {
        // a panicked listener must not take localisation down with it
        self.estimate
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

async fn run_pose_listener(
    subscriber: &mut FlumeSubscriber<'_>,
    estimate: &Mutex<SharedEstimate>,
) -> anyhow::Result<()> {
    loop {
        let sample = subscriber.recv_async().await?;
        let message: String = sample.value.try_into()?;
        let pose: SlamPose = serde_json::from_str(&message)?;
        trace!(?pose, "SLAM pose");
        estimate
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .pose
            .store(pose, Instant::now());
    }
}

async fn run_map_listener(
    subscriber: &mut FlumeSubscriber<'_>,
    estimate: &Mutex<SharedEstimate>,
    size_px: usize,
    size_m: f32,
) -> anyhow::Result<()> {
    loop {
        let sample = subscriber.recv_async().await?;
        let cells = sample.value.payload.contiguous().to_vec();
        let received = cells.len();
        match OccupancyGrid::from_raw(size_px, size_m, cells) {
            Some(grid) => {
                estimate
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner())
                    .map = Some(grid)
            }
            None => warn!(
                "Ignoring map of {} bytes, expected {}x{}",
                received, size_px, size_px
            ),
        }
    }
}

#[async_trait]
impl Localiser for ZenohSlamClient {
    async fn update(&mut self, scan: &LocalisationScan) -> Result<()> {
        let message = SlamScanMessage {
            scans_mm: &scan.distances_mm,
            scan_angles_degrees: &scan.angles_deg,
        };
        let payload = serde_json::to_string(&message)?;
        self.session
            .put(self.scan_topic.as_str(), payload)
            .res_async()
            .await
            .map_err(ErrorWrapper::ZenohError)?;
        Ok(())
    }

    fn get_pose(&self) -> Option<SlamPose> {
        self.lock().pose.get(Instant::now(), self.pose_timeout)
    }

    fn get_map(&self) -> Option<OccupancyGrid> {
        self.lock().map.clone()
    }
}
