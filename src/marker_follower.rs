use crate::{
    control::{AxisCommand, CommandBatch, ControlKind, Controller, ErrorHistory, PidGains},
    error::GuidanceError,
    guidance::{GuidanceFrame, GuidanceState, GuidanceThresholds},
};
use serde::{Deserialize, Serialize};
use tracing::*;

#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct MarkerFollowerConfig {
    /// Gains on pixel offset from frame centre
    #[serde(default = "default_rotation_gains")]
    pub rotation_gains: PidGains,
    /// Gains on distance error in cm
    #[serde(default = "default_translation_gains")]
    pub translation_gains: PidGains,
    #[serde(default = "default_max_translation_speed")]
    pub max_translation_speed: f32,
}

fn default_rotation_gains() -> PidGains {
    PidGains::new(0.4, 0.0, 0.2)
}

fn default_translation_gains() -> PidGains {
    PidGains::new(1.5, 0.0, 0.2)
}

fn default_max_translation_speed() -> f32 {
    20.0
}

impl Default for MarkerFollowerConfig {
    fn default() -> Self {
        Self {
            rotation_gains: default_rotation_gains(),
            translation_gains: default_translation_gains(),
            max_translation_speed: default_max_translation_speed(),
        }
    }
}

/// Edge triggered marker follower
///
/// Commands go out only when the guidance state changes. Between changes the
/// robot keeps executing whatever it was last told. The distance error is
/// taken against the same target the classifier uses.
#[derive(Debug, Clone)]
pub struct MarkerFollowController {
    config: MarkerFollowerConfig,
    target_distance_cm: f32,
    rotation: ErrorHistory,
    translation: ErrorHistory,
    last_state: Option<GuidanceState>,
}

impl MarkerFollowController {
    pub fn new(config: MarkerFollowerConfig, thresholds: &GuidanceThresholds) -> Self {
        Self {
            config,
            target_distance_cm: thresholds.target_distance_cm,
            rotation: ErrorHistory::default(),
            translation: ErrorHistory::default(),
            last_state: None,
        }
    }

    pub fn last_state(&self) -> Option<GuidanceState> {
        self.last_state
    }

    fn transition(&mut self, frame: &GuidanceFrame) -> Result<CommandBatch, GuidanceError> {
        frame
            .dimensions
            .filter(|dimensions| dimensions.width > 0)
            .ok_or(GuidanceError::MissingFrameDimensions)?;

        let mut batch = CommandBatch::stop();
        self.last_state = Some(frame.state);

        // lost with no history at all, settling is all we can do
        let Some(pose) = frame.pose else {
            return Ok(batch);
        };

        let rotation_error = -pose.lateral_offset_px;
        let translation_error = pose.distance_cm - self.target_distance_cm;

        let rotation_velocity = self
            .config
            .rotation_gains
            .apply(rotation_error, &mut self.rotation);
        let max_speed = self.config.max_translation_speed;
        let translation_velocity = self
            .config
            .translation_gains
            .apply(translation_error, &mut self.translation)
            .clamp(-max_speed, max_speed);

        match frame.state {
            GuidanceState::AlignLeft | GuidanceState::AlignRight => {
                batch.push(AxisCommand::rotate(rotation_velocity))
            }
            GuidanceState::Forward | GuidanceState::Backward => {
                batch.push(AxisCommand::forward(translation_velocity))
            }
            GuidanceState::Lost | GuidanceState::Finish => (),
        }
        Ok(batch)
    }
}

impl Controller for MarkerFollowController {
    type Input = GuidanceFrame;

    fn kind(&self) -> ControlKind {
        ControlKind::EventDriven
    }

    fn update(&mut self, frame: &GuidanceFrame) -> CommandBatch {
        if self.last_state == Some(frame.state) && frame.dimensions.is_some() {
            return CommandBatch::abstain();
        }
        match self.transition(frame) {
            Ok(batch) => {
                debug!(state = ?frame.state, "Guidance state changed");
                batch
            }
            Err(err) => {
                warn!("Holding marker follower: {}", err);
                // stop once if we were driving, then stay quiet
                if self.last_state.take().is_some() {
                    CommandBatch::stop()
                } else {
                    CommandBatch::abstain()
                }
            }
        }
    }

    fn reset(&mut self) {
        self.rotation.reset();
        self.translation.reset();
        self.last_state = None;
    }
}
