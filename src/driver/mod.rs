pub mod serial_driver;
pub mod zenoh_driver;

use crate::control::{AxisCommand, CommandBatch};
use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use tracing::*;
use zenoh::Session;

pub use serial_driver::SerialCommandSink;
pub use zenoh_driver::ZenohCommandSink;

/// Anything that can carry velocity commands to the robot
#[async_trait]
pub trait CommandSink: Send + Sync {
    async fn send(&mut self, command: AxisCommand) -> Result<()>;
}

/// Send every command in `batch`, logging failures instead of giving up
///
/// Returns how many commands went out. A failed command does not stop the
/// rest of the batch, the next cycle will try again anyway.
pub async fn send_batch(sink: &mut dyn CommandSink, batch: CommandBatch) -> usize {
    let mut sent = 0;
    for command in batch {
        match sink.send(command).await {
            Ok(()) => {
                trace!("Sent {}", command);
                sent += 1;
            }
            Err(err) => error!("Failed to send {}: {:?}", command, err),
        }
    }
    sent
}

#[derive(Deserialize, Debug, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActuationConfig {
    Zenoh {
        #[serde(default = "default_cmd_vel_topic")]
        topic: String,
    },
    Serial {
        port: String,
        #[serde(default = "default_baud_rate")]
        baud_rate: u32,
    },
}

fn default_cmd_vel_topic() -> String {
    "turtle/cmd_vel".to_owned()
}

fn default_baud_rate() -> u32 {
    115200
}

impl Default for ActuationConfig {
    fn default() -> Self {
        ActuationConfig::Zenoh {
            topic: default_cmd_vel_topic(),
        }
    }
}

pub fn command_sink_from_config(
    config: &ActuationConfig,
    zenoh_session: Arc<Session>,
) -> Result<Box<dyn CommandSink>> {
    match config {
        ActuationConfig::Zenoh { topic } => {
            info!("Publishing velocity commands on {}", topic);
            Ok(Box::new(ZenohCommandSink::new(zenoh_session, topic)))
        }
        ActuationConfig::Serial { port, baud_rate } => {
            info!("Sending velocity commands over serial {}", port);
            Ok(Box::new(SerialCommandSink::new(port, *baud_rate)?))
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Records commands, failing every `fail_every`th send
    #[derive(Default)]
    pub(crate) struct RecordingSink {
        pub sent: Vec<AxisCommand>,
        pub fail_every: Option<usize>,
        attempts: usize,
    }

    #[async_trait]
    impl CommandSink for RecordingSink {
        async fn send(&mut self, command: AxisCommand) -> Result<()> {
            self.attempts += 1;
            if let Some(every) = self.fail_every {
                if self.attempts % every == 0 {
                    anyhow::bail!("transport unavailable");
                }
            }
            self.sent.push(command);
            Ok(())
        }
    }

    #[tokio::test]
    async fn failures_do_not_abort_batch() {
        let mut sink = RecordingSink {
            fail_every: Some(2),
            ..Default::default()
        };
        let mut batch = CommandBatch::stop();
        batch.push(AxisCommand::rotate(5.0));
        let sent = send_batch(&mut sink, batch).await;
        assert_eq!(sent, 2);
        assert_eq!(
            sink.sent,
            vec![AxisCommand::forward(0.0), AxisCommand::rotate(5.0)]
        );
    }

    #[test]
    fn actuation_config_parses() {
        let config: ActuationConfig =
            serde_json::from_str(r#"{"type": "serial", "port": "/dev/ttyUSB0"}"#).unwrap();
        match config {
            ActuationConfig::Serial { port, baud_rate } => {
                assert_eq!(port, "/dev/ttyUSB0");
                assert_eq!(baud_rate, 115200);
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
