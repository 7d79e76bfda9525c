use crate::{
    control::{Axis, AxisCommand, CommandBatch, ControlKind, Controller},
    messages::Key,
};
use serde::Deserialize;
use std::time::{Duration, Instant};
use tracing::*;

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct ManualDriveConfig {
    #[serde(default = "default_forward_speed")]
    pub forward_speed: f32,
    #[serde(default = "default_rotation_speed")]
    pub rotation_speed: f32,
    /// A held key not refreshed for this long counts as released, 0 disables
    #[serde(default = "default_watchdog_timeout_ms")]
    pub watchdog_timeout_ms: u64,
}

fn default_forward_speed() -> f32 {
    20.0
}

fn default_rotation_speed() -> f32 {
    100.0
}

fn default_watchdog_timeout_ms() -> u64 {
    1000
}

impl Default for ManualDriveConfig {
    fn default() -> Self {
        Self {
            forward_speed: default_forward_speed(),
            rotation_speed: default_rotation_speed(),
            watchdog_timeout_ms: default_watchdog_timeout_ms(),
        }
    }
}

impl ManualDriveConfig {
    pub fn watchdog_timeout(&self) -> Option<Duration> {
        (self.watchdog_timeout_ms > 0).then(|| Duration::from_millis(self.watchdog_timeout_ms))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManualInput {
    Press(Key, Instant),
    Release(Key),
    /// Periodic check for keys whose release was lost
    Tick(Instant),
}

/// Direct operator drive
///
/// Every key press maps to a fixed command on one axis and every release to
/// a zero on that axis. Presses repeated while the key is held refresh the
/// watchdog without sending anything. A release also forgets other keys held
/// on the same axis, so their next repeat drives again.
#[derive(Debug, Clone)]
pub struct ManualDrive {
    config: ManualDriveConfig,
    held: Vec<(Key, Instant)>,
}

impl ManualDrive {
    pub fn new(config: ManualDriveConfig) -> Self {
        Self {
            config,
            held: vec![],
        }
    }

    pub fn held_keys(&self) -> impl Iterator<Item = Key> + '_ {
        self.held.iter().map(|(key, _)| *key)
    }

    pub fn key_command(&self, key: Key) -> AxisCommand {
        match key {
            Key::Up => AxisCommand::forward(self.config.forward_speed),
            Key::Down => AxisCommand::forward(-self.config.forward_speed),
            Key::Left => AxisCommand::rotate(self.config.rotation_speed),
            Key::Right => AxisCommand::rotate(-self.config.rotation_speed),
        }
    }

    fn key_axis(&self, key: Key) -> Axis {
        self.key_command(key).axis()
    }

    /// Zero `axis` and drop every key held on it
    fn release_axis(&mut self, axis: Axis) -> AxisCommand {
        let held = std::mem::take(&mut self.held);
        self.held = held
            .into_iter()
            .filter(|(key, _)| self.key_axis(*key) != axis)
            .collect();
        AxisCommand(axis, 0.0)
    }

    fn press(&mut self, key: Key, now: Instant) -> CommandBatch {
        if let Some(entry) = self.held.iter_mut().find(|(held, _)| *held == key) {
            entry.1 = now;
            return CommandBatch::abstain();
        }
        self.held.push((key, now));
        CommandBatch::single(self.key_command(key))
    }

    fn release(&mut self, key: Key) -> CommandBatch {
        CommandBatch::single(self.release_axis(self.key_axis(key)))
    }

    fn watchdog(&mut self, now: Instant) -> CommandBatch {
        let Some(timeout) = self.config.watchdog_timeout() else {
            return CommandBatch::abstain();
        };
        let (expired, alive): (Vec<_>, Vec<_>) = self
            .held
            .drain(..)
            .partition(|(_, refreshed)| now.saturating_duration_since(*refreshed) > timeout);
        self.held = alive;
        if expired.is_empty() {
            return CommandBatch::abstain();
        }

        let mut batch = CommandBatch::abstain();
        for axis in [Axis::Forward, Axis::Rotate] {
            if expired.iter().any(|(key, _)| self.key_axis(*key) == axis) {
                warn!(?axis, "No key refresh within watchdog timeout, releasing");
                batch.push(self.release_axis(axis));
            }
        }
        batch
    }
}

impl Controller for ManualDrive {
    type Input = ManualInput;

    fn kind(&self) -> ControlKind {
        ControlKind::EventDriven
    }

    fn update(&mut self, input: &ManualInput) -> CommandBatch {
        match *input {
            ManualInput::Press(key, now) => self.press(key, now),
            ManualInput::Release(key) => self.release(key),
            ManualInput::Tick(now) => self.watchdog(now),
        }
    }

    fn reset(&mut self) {
        self.held.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drive() -> ManualDrive {
        ManualDrive::new(ManualDriveConfig::default())
    }

    #[test]
    fn keys_map_to_fixed_commands() {
        let mut drive = drive();
        let now = Instant::now();
        let cases = [
            (Key::Up, AxisCommand::forward(20.0)),
            (Key::Down, AxisCommand::forward(-20.0)),
            (Key::Left, AxisCommand::rotate(100.0)),
            (Key::Right, AxisCommand::rotate(-100.0)),
        ];
        for (key, expected) in cases {
            assert_eq!(
                drive.update(&ManualInput::Press(key, now)),
                CommandBatch::single(expected)
            );
            drive.update(&ManualInput::Release(key));
        }
    }

    #[test]
    fn release_sends_standby() {
        let mut drive = drive();
        drive.update(&ManualInput::Press(Key::Left, Instant::now()));
        assert_eq!(
            drive.update(&ManualInput::Release(Key::Left)),
            CommandBatch::single(AxisCommand::rotate(0.0))
        );
    }

    #[test]
    fn release_zeroes_axis_even_with_other_key_held() {
        let mut drive = drive();
        let now = Instant::now();
        drive.update(&ManualInput::Press(Key::Up, now));
        drive.update(&ManualInput::Press(Key::Down, now));
        drive.update(&ManualInput::Press(Key::Left, now));
        assert_eq!(
            drive.update(&ManualInput::Release(Key::Down)),
            CommandBatch::single(AxisCommand::forward(0.0))
        );
        assert_eq!(drive.held_keys().collect::<Vec<_>>(), vec![Key::Left]);
        // the still held key drives again on its next repeat
        assert_eq!(
            drive.update(&ManualInput::Press(Key::Up, now)),
            CommandBatch::single(AxisCommand::forward(20.0))
        );
    }

    #[test]
    fn repeated_press_only_refreshes() {
        let mut drive = drive();
        let now = Instant::now();
        drive.update(&ManualInput::Press(Key::Up, now));
        assert!(drive
            .update(&ManualInput::Press(Key::Up, now + Duration::from_millis(900)))
            .is_empty());
        // refreshed at 900 ms, still alive at 1.5 s
        assert!(drive
            .update(&ManualInput::Tick(now + Duration::from_millis(1500)))
            .is_empty());
    }

    #[test]
    fn watchdog_releases_lost_keys() {
        let mut drive = drive();
        let now = Instant::now();
        drive.update(&ManualInput::Press(Key::Up, now));
        drive.update(&ManualInput::Press(Key::Right, now + Duration::from_millis(800)));

        let batch = drive.update(&ManualInput::Tick(now + Duration::from_millis(1200)));
        assert_eq!(batch, CommandBatch::single(AxisCommand::forward(0.0)));
        assert_eq!(drive.held_keys().collect::<Vec<_>>(), vec![Key::Right]);

        let batch = drive.update(&ManualInput::Tick(now + Duration::from_millis(2000)));
        assert_eq!(batch, CommandBatch::single(AxisCommand::rotate(0.0)));
        assert_eq!(drive.held_keys().count(), 0);
    }

    #[test]
    fn watchdog_can_be_disabled() {
        let mut drive = ManualDrive::new(ManualDriveConfig {
            watchdog_timeout_ms: 0,
            ..Default::default()
        });
        let now = Instant::now();
        drive.update(&ManualInput::Press(Key::Up, now));
        assert!(drive
            .update(&ManualInput::Tick(now + Duration::from_secs(60)))
            .is_empty());
    }
}
