use anyhow::Result;
use clap::Parser;
use turtle_pilot::{
    error::ErrorWrapper,
    lidar::{RangeSample, ScanProjector, ScanProjectorConfig},
    logging,
    messages::LaserScan,
};
use zenoh::prelude::r#async::*;

#[derive(Parser, Debug)]
#[command(version, about = "Print laser scans seen on zenoh")]
struct Args {
    /// Scan topic
    #[arg(long, default_value = "turtle/lidar")]
    topic: String,

    /// Endpoints to connect to
    #[arg(short, long)]
    connect: Vec<String>,

    /// Print every sample
    #[arg(long)]
    samples: bool,

    /// Sets the level of verbosity
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbosity: u8,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    logging::setup_tracing(args.verbosity);

    let mut zenoh_config = zenoh::config::Config::default();
    if !args.connect.is_empty() {
        zenoh_config.connect.endpoints = args
            .connect
            .iter()
            .map(|endpoint| endpoint.parse::<zenoh_config::EndPoint>())
            .collect::<Result<_, _>>()
            .map_err(ErrorWrapper::ZenohError)?;
    }
    let zenoh_session = zenoh::open(zenoh_config)
        .res()
        .await
        .map_err(ErrorWrapper::ZenohError)?
        .into_arc();

    let subscriber = zenoh_session
        .declare_subscriber(args.topic.clone())
        .res()
        .await
        .map_err(ErrorWrapper::ZenohError)?;

    let projector = ScanProjector::new(ScanProjectorConfig::default());

    loop {
        let sample = subscriber.recv_async().await?;
        let payload = sample.value.payload.contiguous().to_vec();
        let scan = match LaserScan::from_cdr(payload) {
            Ok(scan) => scan,
            Err(err) => {
                eprintln!("Failed to decode scan: {}", err);
                continue;
            }
        };
        let samples = RangeSample::from_laser_scan(&scan);
        let projection = projector.project(&samples);
        println!(
            "{} {}.{:09} rays {} usable {} near {}",
            scan.header.frame_id,
            scan.header.stamp.sec,
            scan.header.stamp.nsec,
            scan.ranges.len(),
            projection.localisation.len(),
            projection.cloud.len(),
        );
        if args.samples {
            for sample in &samples {
                println!(
                    "  {:>7.2} deg {:>8.1} mm q {}",
                    sample.angle_deg, sample.distance_mm, sample.quality
                );
            }
        }
    }
}
