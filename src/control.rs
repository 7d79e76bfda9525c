use serde::{Deserialize, Serialize};
use std::fmt;

/// Velocity channel on the robot
///
/// The turtle firmware takes two independent scalar channels rather than a
/// single twist message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Axis {
    Forward,
    Rotate,
}

/// One velocity message, serialized as `["Forward", 20.0]`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AxisCommand(pub Axis, pub f32);

impl AxisCommand {
    pub fn forward(magnitude: f32) -> Self {
        Self(Axis::Forward, magnitude)
    }

    pub fn rotate(magnitude: f32) -> Self {
        Self(Axis::Rotate, magnitude)
    }

    pub fn axis(&self) -> Axis {
        self.0
    }

    pub fn magnitude(&self) -> f32 {
        self.1
    }
}

impl fmt::Display for AxisCommand {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?} {:.2}", self.0, self.1)
    }
}

/// Ordered axis commands produced by a single controller update
///
/// An empty batch means the controller abstained this cycle.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommandBatch(Vec<AxisCommand>);

impl CommandBatch {
    pub fn abstain() -> Self {
        Self(vec![])
    }

    /// Zero on both channels
    pub fn stop() -> Self {
        Self(vec![AxisCommand::forward(0.0), AxisCommand::rotate(0.0)])
    }

    pub fn movement(linear: f32, angular: f32) -> Self {
        Self(vec![AxisCommand::forward(linear), AxisCommand::rotate(angular)])
    }

    pub fn single(command: AxisCommand) -> Self {
        Self(vec![command])
    }

    pub fn push(&mut self, command: AxisCommand) {
        self.0.push(command);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn commands(&self) -> &[AxisCommand] {
        &self.0
    }

    /// Last magnitude written to `axis` in this batch
    pub fn last_on(&self, axis: Axis) -> Option<f32> {
        self.0
            .iter()
            .rev()
            .find(|command| command.axis() == axis)
            .map(AxisCommand::magnitude)
    }
}

impl IntoIterator for CommandBatch {
    type Item = AxisCommand;
    type IntoIter = std::vec::IntoIter<AxisCommand>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// Proportional, integral and derivative gains
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct PidGains {
    pub kp: f32,
    #[serde(default)]
    pub ki: f32,
    #[serde(default)]
    pub kd: f32,
}

impl PidGains {
    pub const fn new(kp: f32, ki: f32, kd: f32) -> Self {
        Self { kp, ki, kd }
    }

    /// Combined output for `error`, then `error` is shifted into `history`
    ///
    /// The integral term only covers earlier samples.
    pub fn apply(&self, error: f32, history: &mut ErrorHistory) -> f32 {
        let integral = history.cumulative_error;
        let derivative = history.record(error);
        self.kp * error + self.ki * integral + self.kd * derivative
    }
}

/// Error terms one controller carries between updates
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ErrorHistory {
    pub last_error: f32,
    pub previous_error: f32,
    pub cumulative_error: f32,
}

impl ErrorHistory {
    /// Shift `error` into the history and return the derivative term
    pub fn record(&mut self, error: f32) -> f32 {
        let derivative = error - self.last_error;
        self.previous_error = self.last_error;
        self.last_error = error;
        self.cumulative_error += error;
        derivative
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlKind {
    /// Emits only when its discrete input changes
    EventDriven,
    /// Recomputes a command on every sample
    Sampled,
}

/// Common face of the guidance controllers
pub trait Controller {
    type Input;

    fn kind(&self) -> ControlKind;

    /// Produce the commands for this cycle, an empty batch abstains
    fn update(&mut self, input: &Self::Input) -> CommandBatch;

    /// Forget accumulated error history
    fn reset(&mut self);
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn axis_command_serializes_as_pair() {
        let json = serde_json::to_string(&AxisCommand::forward(20.0)).unwrap();
        assert_eq!(json, r#"["Forward",20.0]"#);
        let parsed: AxisCommand = serde_json::from_str(r#"["Rotate",-100.0]"#).unwrap();
        assert_eq!(parsed, AxisCommand::rotate(-100.0));
    }

    #[test]
    fn history_tracks_derivative_and_sum() {
        let mut history = ErrorHistory::default();
        assert_relative_eq!(history.record(10.0), 10.0);
        assert_relative_eq!(history.record(4.0), -6.0);
        assert_relative_eq!(history.previous_error, 10.0);
        assert_relative_eq!(history.last_error, 4.0);
        assert_relative_eq!(history.cumulative_error, 14.0);
        history.reset();
        assert_eq!(history, ErrorHistory::default());
    }

    #[test]
    fn pid_combines_terms() {
        let gains = PidGains::new(0.4, 0.0, 0.2);
        let mut history = ErrorHistory::default();
        // first sample derivative is the full error
        assert_relative_eq!(gains.apply(100.0, &mut history), 60.0);
        assert_relative_eq!(gains.apply(100.0, &mut history), 40.0);
    }

    #[test]
    fn integral_lags_one_sample() {
        let gains = PidGains::new(1.0, 0.5, 0.0);
        let mut history = ErrorHistory::default();
        assert_relative_eq!(gains.apply(10.0, &mut history), 10.0);
        // 10 + 0.5 * 10
        assert_relative_eq!(gains.apply(10.0, &mut history), 15.0);
        assert_relative_eq!(history.cumulative_error, 20.0);
    }

    #[test]
    fn batch_reports_last_axis_value() {
        let mut batch = CommandBatch::stop();
        batch.push(AxisCommand::rotate(12.0));
        assert_eq!(batch.len(), 3);
        assert_eq!(batch.last_on(Axis::Rotate), Some(12.0));
        assert_eq!(batch.last_on(Axis::Forward), Some(0.0));
        assert!(CommandBatch::abstain().last_on(Axis::Forward).is_none());
    }
}
