use crate::{
    configuration::AppConfig,
    control::CommandBatch,
    dispatcher::CommandDispatcher,
    driver::{send_batch, CommandSink},
    error::ErrorWrapper,
    guidance::{GuidanceFrame, MarkerTracker},
    lidar::{RangeSample, ScanProjector},
    localisation::{Localiser, MapFrame},
    manual::{ManualDrive, ManualInput},
    map::MapDisplay,
    marker::MarkerPoseEstimator,
    marker_follower::MarkerFollowController,
    messages::{
        LaserScan, MarkerObservation, OperatorCommand, OperatorMessage, PilotStatus,
        PointCloudMessage,
    },
    waypoint::{RobotPose, WaypointController},
};
use anyhow::Result;
use chrono::prelude::{DateTime, Utc};
use std::{
    sync::Arc,
    time::{Duration, Instant},
};
use tokio::sync::mpsc;
use tracing::*;
use zenoh::{prelude::r#async::*, subscriber::FlumeSubscriber, Session, SessionDeclarations};

const EVENT_QUEUE_SIZE: usize = 64;
const STATUS_PERIOD: Duration = Duration::from_millis(500);

#[derive(Debug, Clone)]
pub enum PilotEvent {
    Marker(MarkerObservation),
    /// Pose snapshot taken after the localiser digested a scan
    Pose(Option<RobotPose>),
    /// Operator input with its local arrival time
    Operator {
        message: OperatorMessage,
        received: Instant,
    },
}

/// All guidance state of the robot, driven one event at a time
#[derive(Debug)]
pub struct Pilot {
    tracker: MarkerTracker,
    dispatcher: CommandDispatcher,
    map_display: MapDisplay,
    operator_timeout: Option<Duration>,
    last_guidance: Option<GuidanceFrame>,
    last_pose: Option<RobotPose>,
}

impl Pilot {
    pub fn from_config(config: &AppConfig) -> Self {
        let tracker = MarkerTracker::new(MarkerPoseEstimator::new(config.marker), config.guidance);
        let dispatcher = CommandDispatcher::new(
            ManualDrive::new(config.manual),
            MarkerFollowController::new(config.marker_follower, &config.guidance),
            WaypointController::new(config.waypoint),
        );
        let map_display = MapDisplay::new(&config.map_display, config.localisation.map_size_m);
        let operator_timeout = config.manual.watchdog_timeout();
        Self {
            tracker,
            dispatcher,
            map_display,
            operator_timeout,
            last_guidance: None,
            last_pose: None,
        }
    }

    pub fn dispatcher(&self) -> &CommandDispatcher {
        &self.dispatcher
    }

    pub fn handle(&mut self, event: PilotEvent, now: Instant) -> CommandBatch {
        match event {
            PilotEvent::Marker(observation) => {
                let quad = observation.quad();
                let frame = self.tracker.observe(observation.frame, quad.as_ref());
                self.last_guidance = Some(frame);
                self.dispatcher.on_guidance(&frame)
            }
            PilotEvent::Pose(pose) => {
                self.last_pose = pose;
                self.dispatcher.on_pose(pose)
            }
            PilotEvent::Operator { message, received } => {
                self.handle_operator(message, received, now)
            }
        }
    }

    fn handle_operator(
        &mut self,
        message: OperatorMessage,
        received: Instant,
        now: Instant,
    ) -> CommandBatch {
        // queue time only, the operator clock is not ours
        let age = now.saturating_duration_since(received);
        match message.command {
            OperatorCommand::KeyDown { key } => {
                // a late press would outlive its own release
                if self.operator_timeout.is_some_and(|timeout| age > timeout) {
                    warn!(
                        "Ignoring {:?} press sent at {} that waited {} ms",
                        key,
                        message.time,
                        age.as_millis()
                    );
                    return CommandBatch::abstain();
                }
                self.dispatcher.on_manual(ManualInput::Press(key, now))
            }
            OperatorCommand::KeyUp { key } => self.dispatcher.on_manual(ManualInput::Release(key)),
            OperatorCommand::Click { x, y } => {
                match self.map_display.click_to_destination(x, y) {
                    Some(destination) => self.dispatcher.set_destination(destination),
                    None => debug!("Click at {} {} is outside the map", x, y),
                }
                CommandBatch::abstain()
            }
            OperatorCommand::SetMode { mode } => self.dispatcher.set_mode(mode),
            OperatorCommand::ClearDestination => {
                self.dispatcher.clear_destination();
                CommandBatch::abstain()
            }
        }
    }

    pub fn tick(&mut self, now: Instant) -> CommandBatch {
        self.dispatcher.on_manual(ManualInput::Tick(now))
    }

    pub fn status(&self, wall_clock: DateTime<Utc>) -> PilotStatus {
        PilotStatus {
            time: wall_clock,
            mode: self.dispatcher.mode(),
            guidance: self.last_guidance.map(|frame| frame.state),
            marker_distance_cm: self.tracker.last_pose().map(|pose| pose.distance_cm),
            pose: self.last_pose,
            destination: self.dispatcher.destination(),
        }
    }
}

/// Wire sensors, operator input and actuation together and run until Ctrl-C
pub async fn run_pilot(
    config: AppConfig,
    zenoh_session: Arc<Session>,
    mut sink: Box<dyn CommandSink>,
    localiser: Box<dyn Localiser>,
) -> Result<()> {
    let (tx, mut rx) = mpsc::channel(EVENT_QUEUE_SIZE);

    start_marker_listener(zenoh_session.clone(), &config.topics.marker, tx.clone()).await?;
    start_operator_listener(zenoh_session.clone(), &config.topics.operator, tx.clone()).await?;
    start_scan_listener(
        zenoh_session.clone(),
        &config,
        ScanProjector::new(config.scan),
        localiser,
        tx,
    )
    .await?;

    let mut pilot = Pilot::from_config(&config);
    let mut watchdog = tokio::time::interval(config.watchdog_period());
    let mut status_interval = tokio::time::interval(STATUS_PERIOD);
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    info!("Pilot running in {} mode", pilot.dispatcher().mode());
    loop {
        let batch = tokio::select! {
            event = rx.recv() => match event {
                Some(event) => pilot.handle(event, Instant::now()),
                None => {
                    error!("All event sources closed");
                    break;
                }
            },
            _ = watchdog.tick() => pilot.tick(Instant::now()),
            _ = status_interval.tick() => {
                publish_json(&zenoh_session, &config.topics.status, &pilot.status(Utc::now())).await;
                CommandBatch::abstain()
            }
            _ = &mut shutdown => {
                info!("Caught interrupt, stopping robot");
                break;
            }
        };
        if !batch.is_empty() {
            send_batch(sink.as_mut(), batch).await;
        }
    }

    send_batch(sink.as_mut(), CommandBatch::stop()).await;
    Ok(())
}

async fn publish_json<T: serde::Serialize>(zenoh_session: &Session, topic: &str, value: &T) {
    let payload = match serde_json::to_string(value) {
        Ok(payload) => payload,
        Err(err) => {
            error!("Failed to serialize message for {}: {:?}", topic, err);
            return;
        }
    };
    if let Err(err) = zenoh_session
        .put(topic, payload)
        .res_async()
        .await
        .map_err(ErrorWrapper::ZenohError)
    {
        error!("Failed to publish on {}: {:?}", topic, err);
    }
}

/// Queue a sensor event, dropping it when the control loop is behind
///
/// Returns false once the control loop is gone.
fn offer(tx: &mpsc::Sender<PilotEvent>, event: PilotEvent) -> bool {
    match tx.try_send(event) {
        Ok(()) => true,
        Err(mpsc::error::TrySendError::Full(_)) => {
            debug!("Control loop busy, dropping sensor event");
            true
        }
        Err(mpsc::error::TrySendError::Closed(_)) => false,
    }
}

async fn start_marker_listener(
    zenoh_session: Arc<Session>,
    topic: &str,
    tx: mpsc::Sender<PilotEvent>,
) -> Result<()> {
    let mut subscriber = zenoh_session
        .declare_subscriber(topic.to_owned())
        .res()
        .await
        .map_err(ErrorWrapper::ZenohError)?;

    tokio::spawn(async move {
        while let Err(err) = run_marker_listener(&mut subscriber, &tx).await {
            error!("Marker listener failed with {:?}", err);
        }
    });
    Ok(())
}

async fn run_marker_listener(
    subscriber: &mut FlumeSubscriber<'_>,
    tx: &mpsc::Sender<PilotEvent>,
) -> anyhow::Result<()> {
    loop {
        let sample = subscriber.recv_async().await?;
        let message: String = sample.value.try_into()?;
        let observation: MarkerObservation = match serde_json::from_str(&message) {
            Ok(observation) => observation,
            Err(err) => {
                warn!("Malformed marker observation: {}", err);
                continue;
            }
        };
        if !offer(tx, PilotEvent::Marker(observation)) {
            return Ok(());
        }
    }
}

async fn start_operator_listener(
    zenoh_session: Arc<Session>,
    topic: &str,
    tx: mpsc::Sender<PilotEvent>,
) -> Result<()> {
    let mut subscriber = zenoh_session
        .declare_subscriber(topic.to_owned())
        .res()
        .await
        .map_err(ErrorWrapper::ZenohError)?;

    tokio::spawn(async move {
        while let Err(err) = run_operator_listener(&mut subscriber, &tx).await {
            error!("Operator listener failed with {:?}", err);
        }
    });
    Ok(())
}

async fn run_operator_listener(
    subscriber: &mut FlumeSubscriber<'_>,
    tx: &mpsc::Sender<PilotEvent>,
) -> anyhow::Result<()> {
    loop {
        let sample = subscriber.recv_async().await?;
        let received = Instant::now();
        let message: String = sample.value.try_into()?;
        let message: OperatorMessage = match serde_json::from_str(&message) {
            Ok(message) => message,
            Err(err) => {
                warn!("Malformed operator message: {}", err);
                continue;
            }
        };
        debug!(?message, "Operator input");
        // operator input is never dropped
        if tx
            .send(PilotEvent::Operator { message, received })
            .await
            .is_err()
        {
            return Ok(());
        }
    }
}

struct ScanPipeline {
    projector: ScanProjector,
    localiser: Box<dyn Localiser>,
    map_frame: MapFrame,
    cloud_topic: String,
}

async fn start_scan_listener(
    zenoh_session: Arc<Session>,
    config: &AppConfig,
    projector: ScanProjector,
    localiser: Box<dyn Localiser>,
    tx: mpsc::Sender<PilotEvent>,
) -> Result<()> {
    let mut subscriber = zenoh_session
        .declare_subscriber(config.topics.lidar.clone())
        .res()
        .await
        .map_err(ErrorWrapper::ZenohError)?;

    let mut pipeline = ScanPipeline {
        projector,
        localiser,
        map_frame: config.localisation.map_frame(),
        cloud_topic: config.topics.cloud.clone(),
    };

    tokio::spawn(async move {
        while let Err(err) =
            run_scan_listener(&mut subscriber, &mut pipeline, &zenoh_session, &tx).await
        {
            error!("Scan listener failed with {:?}", err);
        }
    });
    Ok(())
}

async fn run_scan_listener(
    subscriber: &mut FlumeSubscriber<'_>,
    pipeline: &mut ScanPipeline,
    zenoh_session: &Session,
    tx: &mpsc::Sender<PilotEvent>,
) -> anyhow::Result<()> {
    loop {
        let sample = subscriber.recv_async().await?;
        let payload = sample.value.payload.contiguous().to_vec();
        let scan = match LaserScan::from_cdr(payload) {
            Ok(scan) => scan,
            Err(err) => {
                warn!("Dropping undecodable scan: {}", err);
                continue;
            }
        };

        let samples = RangeSample::from_laser_scan(&scan);
        let projection = pipeline.projector.project(&samples);
        let cloud = PointCloudMessage {
            points: projection.cloud.iter().map(|point| [point.x, point.y]).collect(),
        };
        publish_json(zenoh_session, &pipeline.cloud_topic, &cloud).await;

        if let Err(err) = pipeline.localiser.update(&projection.localisation).await {
            error!("Failed to feed localiser: {:?}", err);
        }
        let pose = pipeline
            .localiser
            .get_pose()
            .map(|pose| pipeline.map_frame.robot_pose(&pose));
        if !offer(tx, PilotEvent::Pose(pose)) {
            return Ok(());
        }
    }
}
