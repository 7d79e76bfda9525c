use super::CommandSink;
use crate::{control::AxisCommand, error::ErrorWrapper};
use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use zenoh::{prelude::r#async::*, Session};

/// Publishes each command as `["Forward", 20.0]` for the turtle base node
pub struct ZenohCommandSink {
    session: Arc<Session>,
    topic: String,
}

impl ZenohCommandSink {
    pub fn new(session: Arc<Session>, topic: &str) -> Self {
        Self {
            session,
            topic: topic.to_owned(),
        }
    }
}

#[async_trait]
impl CommandSink for ZenohCommandSink {
    async fn send(&mut self, command: AxisCommand) -> Result<()> {
        let payload = serde_json::to_string(&command)?;
        self.session
            .put(self.topic.as_str(), payload)
            .res_async()
            .await
            .map_err(ErrorWrapper::ZenohError)?;
        Ok(())
    }
}
