use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use turtle_pilot::{
    configuration, driver::command_sink_from_config, error::ErrorWrapper,
    localisation::ZenohSlamClient, logging, pilot::run_pilot,
};
use zenoh::prelude::r#async::*;

#[derive(Parser, Debug)]
#[command(version, about = "Turtle pilot")]
struct Args {
    /// path to config
    #[arg(long)]
    config: Option<PathBuf>,

    /// Sets the level of verbosity
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbosity: u8,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    logging::setup_tracing(args.verbosity);

    let app_config = configuration::AppConfig::load_config(&args.config)?;

    // zenoh
    let zenoh_config = app_config.zenoh.get_zenoh_config()?;
    let zenoh_session = zenoh::open(zenoh_config)
        .res()
        .await
        .map_err(ErrorWrapper::ZenohError)?
        .into_arc();

    let sink = command_sink_from_config(&app_config.actuation, zenoh_session.clone())?;
    let localiser =
        ZenohSlamClient::new(zenoh_session.clone(), &app_config.localisation).await?;

    run_pilot(app_config, zenoh_session, sink, Box::new(localiser)).await
}
