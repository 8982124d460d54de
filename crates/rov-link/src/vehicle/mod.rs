// Copyright 2025 Chris Custine
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Vehicle state management.
//!
//! [`VehicleState`] owns the console's view of the vehicle: the five
//! sensors, the relay outputs and the servos. It applies messages parsed
//! from the link, validates operator commands and builds the batched
//! control frames that go back down the tether.

use std::time::Instant;

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::fault::LinkStatus;
use crate::protocol::{ControlFrame, VehicleMessage};
use crate::telemetry::TelemetrySample;

/// Servo step applied by one joystick nudge.
pub const SERVO_STEP: i32 = 5;

/// Voltage below which the supply is considered dead.
pub const VOLTAGE_FLOOR: f64 = 1.0;

/// How far behind the newest control frame an acknowledgement may lag.
const ACK_WINDOW: u32 = 64;

/// Errors raised by operator commands against the vehicle model.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum VehicleError {
    #[error("relay {id} does not exist (vehicle has {count})")]
    UnknownRelay { id: usize, count: usize },

    #[error("servo {id} does not exist (vehicle has {count})")]
    UnknownServo { id: usize, count: usize },
}

/// Classify a voltage reading against the configured maximum.
///
/// At or above `max` is a warning, below [`VOLTAGE_FLOOR`] is an error.
#[must_use]
pub fn classify_voltage(value: f64, max: f64) -> LinkStatus {
    if value >= max {
        LinkStatus::Warn
    } else if value < VOLTAGE_FLOOR {
        LinkStatus::Error
    } else {
        LinkStatus::Ok
    }
}

/// Static description of one sensor channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorConfig {
    pub name: String,
    pub units: String,
    /// Full-scale value used for gauges and the voltage over-range check.
    pub max: f64,
    /// Alarm level; readouts above it are highlighted.
    pub threshold: f64,
}

impl SensorConfig {
    fn new(name: &str, units: &str, max: f64, threshold: f64) -> Self {
        Self {
            name: name.to_string(),
            units: units.to_string(),
            max,
            threshold,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayConfig {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServoConfig {
    pub name: String,
    pub min: i32,
    pub max: i32,
    /// Position commanded at startup.
    pub initial: i32,
}

/// Sensor, relay and servo layout of the vehicle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VehicleConfig {
    pub depth: SensorConfig,
    pub compass: SensorConfig,
    pub voltage: SensorConfig,
    pub other0: SensorConfig,
    pub other1: SensorConfig,
    pub relays: Vec<RelayConfig>,
    pub servos: Vec<ServoConfig>,
}

impl Default for VehicleConfig {
    fn default() -> Self {
        Self {
            depth: SensorConfig::new("Depth", "m", 10.0, 8.0),
            compass: SensorConfig::new("Heading", "°", 360.0, 360.0),
            voltage: SensorConfig::new("Voltage", "V", 14.0, 14.0),
            other0: SensorConfig::new("Water Temp", "°C", 40.0, 35.0),
            other1: SensorConfig::new("Internal Temp", "°C", 70.0, 60.0),
            relays: ["Lights", "Camera", "Pump"]
                .into_iter()
                .map(|name| RelayConfig {
                    name: name.to_string(),
                })
                .collect(),
            servos: ["Tilt", "Claw"]
                .into_iter()
                .map(|name| ServoConfig {
                    name: name.to_string(),
                    min: 0,
                    max: 100,
                    initial: 50,
                })
                .collect(),
        }
    }
}

/// Live value of one sensor together with its configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct Sensor {
    pub config: SensorConfig,
    pub value: f64,
}

impl Sensor {
    fn new(config: SensorConfig) -> Self {
        Self { config, value: 0.0 }
    }

    /// Whether the current value is above the alarm threshold.
    #[must_use]
    pub fn exceeds_threshold(&self) -> bool {
        self.value > self.config.threshold
    }
}

/// A vehicle-side switched output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relay {
    pub name: String,
    /// State commanded by the console.
    pub state: bool,
    /// State last reported by the vehicle.
    pub reported: Option<bool>,
}

/// A vehicle-side actuator with a bounded position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Servo {
    pub name: String,
    pub value: i32,
    pub min: i32,
    pub max: i32,
    /// Position last reported by the vehicle.
    pub reported: Option<i32>,
}

impl Servo {
    fn new(config: &ServoConfig) -> Self {
        let (min, max) = if config.min <= config.max {
            (config.min, config.max)
        } else {
            (config.max, config.min)
        };
        Self {
            name: config.name.clone(),
            value: config.initial.clamp(min, max),
            min,
            max,
            reported: None,
        }
    }

    fn set(&mut self, value: i32) -> i32 {
        self.value = value.clamp(self.min, self.max);
        self.value
    }
}

/// Direction of a single servo nudge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServoDirection {
    Increase,
    Decrease,
}

impl ServoDirection {
    const fn step(self) -> i32 {
        match self {
            Self::Increase => SERVO_STEP,
            Self::Decrease => -SERVO_STEP,
        }
    }
}

/// Console-side model of the vehicle.
#[derive(Debug, Clone)]
pub struct VehicleState {
    pub depth: Sensor,
    pub compass: Sensor,
    pub voltage: Sensor,
    pub other0: Sensor,
    pub other1: Sensor,
    relays: Vec<Relay>,
    servos: Vec<Servo>,
    next_seq: u32,
    last_sent_seq: Option<u32>,
    last_sample: Option<TelemetrySample>,
}

impl VehicleState {
    #[must_use]
    pub fn new(config: &VehicleConfig) -> Self {
        Self {
            depth: Sensor::new(config.depth.clone()),
            compass: Sensor::new(config.compass.clone()),
            voltage: Sensor::new(config.voltage.clone()),
            other0: Sensor::new(config.other0.clone()),
            other1: Sensor::new(config.other1.clone()),
            relays: config
                .relays
                .iter()
                .map(|relay| Relay {
                    name: relay.name.clone(),
                    state: false,
                    reported: None,
                })
                .collect(),
            servos: config.servos.iter().map(Servo::new).collect(),
            next_seq: 0,
            last_sent_seq: None,
            last_sample: None,
        }
    }

    /// Replace names, units and limits from a reloaded configuration.
    ///
    /// Live readings are kept. Relays and servos that still exist keep
    /// their commanded state (re-clamped to the new servo range).
    pub fn apply_config(&mut self, config: &VehicleConfig) {
        self.depth.config = config.depth.clone();
        self.compass.config = config.compass.clone();
        self.voltage.config = config.voltage.clone();
        self.other0.config = config.other0.clone();
        self.other1.config = config.other1.clone();

        let relays = config
            .relays
            .iter()
            .enumerate()
            .map(|(id, relay)| {
                let old = self.relays.get(id);
                Relay {
                    name: relay.name.clone(),
                    state: old.is_some_and(|r| r.state),
                    reported: old.and_then(|r| r.reported),
                }
            })
            .collect();
        self.relays = relays;

        let servos = config
            .servos
            .iter()
            .enumerate()
            .map(|(id, servo)| {
                let mut fresh = Servo::new(servo);
                if let Some(old) = self.servos.get(id) {
                    fresh.set(old.value);
                    fresh.reported = old.reported;
                }
                fresh
            })
            .collect();
        self.servos = servos;
    }

    /// Apply a message received from the vehicle.
    ///
    /// Telemetry is stamped with `received_at`. Acknowledgements don't change
    /// the model; see [`acknowledge`](Self::acknowledge).
    pub fn apply(&mut self, message: &VehicleMessage, received_at: Instant) -> Result<(), VehicleError> {
        match *message {
            VehicleMessage::Telemetry {
                depth,
                heading,
                voltage,
                aux0,
                aux1,
            } => {
                self.depth.value = depth;
                self.compass.value = heading;
                self.voltage.value = voltage;
                self.other0.value = aux0;
                self.other1.value = aux1;
                self.last_sample = Some(TelemetrySample {
                    received_at,
                    depth,
                    heading,
                    voltage,
                    aux0,
                    aux1,
                });
            }
            VehicleMessage::Relay { id, on } => {
                let count = self.relays.len();
                let relay = self
                    .relays
                    .get_mut(id)
                    .ok_or(VehicleError::UnknownRelay { id, count })?;
                relay.reported = Some(on);
            }
            VehicleMessage::Servo { id, value } => {
                let count = self.servos.len();
                let servo = self
                    .servos
                    .get_mut(id)
                    .ok_or(VehicleError::UnknownServo { id, count })?;
                servo.reported = Some(value);
            }
            VehicleMessage::Ack { .. } => {}
        }
        Ok(())
    }

    /// Whether `seq` acknowledges a control frame we actually sent recently.
    #[must_use]
    pub fn acknowledge(&self, seq: u32) -> bool {
        match self.last_sent_seq {
            Some(last) => {
                let behind = last.wrapping_sub(seq);
                if behind < ACK_WINDOW {
                    true
                } else {
                    debug!("Ignoring stale or unknown ACK {seq} (last sent {last})");
                    false
                }
            }
            None => false,
        }
    }

    /// Build the next batched control frame.
    pub fn next_control_frame(&mut self) -> ControlFrame {
        let seq = self.next_seq;
        self.next_seq = self.next_seq.wrapping_add(1);
        self.last_sent_seq = Some(seq);
        ControlFrame {
            seq,
            relays: self.relays.iter().map(|r| r.state).collect(),
            servos: self.servos.iter().map(|s| s.value).collect(),
        }
    }

    #[must_use]
    pub fn relays(&self) -> &[Relay] {
        &self.relays
    }

    #[must_use]
    pub fn servos(&self) -> &[Servo] {
        &self.servos
    }

    pub fn set_relay(&mut self, id: usize, on: bool) -> Result<(), VehicleError> {
        let count = self.relays.len();
        let relay = self
            .relays
            .get_mut(id)
            .ok_or(VehicleError::UnknownRelay { id, count })?;
        relay.state = on;
        Ok(())
    }

    /// Flip a relay and return its new commanded state.
    pub fn toggle_relay(&mut self, id: usize) -> Result<bool, VehicleError> {
        let count = self.relays.len();
        let relay = self
            .relays
            .get_mut(id)
            .ok_or(VehicleError::UnknownRelay { id, count })?;
        relay.state = !relay.state;
        Ok(relay.state)
    }

    /// Set a servo position, clamped to its range. Returns the applied value.
    pub fn set_servo(&mut self, id: usize, value: i32) -> Result<i32, VehicleError> {
        let count = self.servos.len();
        let servo = self
            .servos
            .get_mut(id)
            .ok_or(VehicleError::UnknownServo { id, count })?;
        let applied = servo.set(value);
        if applied != value {
            warn!("Servo {} clamped from {} to {}", servo.name, value, applied);
        }
        Ok(applied)
    }

    /// Move a servo one [`SERVO_STEP`] in `direction`. Returns the applied value.
    pub fn nudge_servo(&mut self, id: usize, direction: ServoDirection) -> Result<i32, VehicleError> {
        let count = self.servos.len();
        let servo = self
            .servos
            .get_mut(id)
            .ok_or(VehicleError::UnknownServo { id, count })?;
        Ok(servo.set(servo.value.saturating_add(direction.step())))
    }

    #[must_use]
    pub fn voltage_status(&self) -> LinkStatus {
        classify_voltage(self.voltage.value, self.voltage.config.max)
    }

    #[must_use]
    pub fn depth_exceeded(&self) -> bool {
        self.depth.exceeds_threshold()
    }

    /// Most recent telemetry sample, if any has arrived.
    #[must_use]
    pub fn last_sample(&self) -> Option<&TelemetrySample> {
        self.last_sample.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vehicle() -> VehicleState {
        VehicleState::new(&VehicleConfig::default())
    }

    #[test]
    fn test_classify_voltage() {
        assert_eq!(classify_voltage(12.0, 14.0), LinkStatus::Ok);
        assert_eq!(classify_voltage(14.0, 14.0), LinkStatus::Warn);
        assert_eq!(classify_voltage(20.0, 14.0), LinkStatus::Warn);
        assert_eq!(classify_voltage(0.5, 14.0), LinkStatus::Error);
        assert_eq!(classify_voltage(1.0, 14.0), LinkStatus::Ok);
    }

    #[test]
    fn test_apply_telemetry_updates_sensors() {
        let mut state = vehicle();
        let now = Instant::now();
        state
            .apply(
                &VehicleMessage::Telemetry {
                    depth: 9.5,
                    heading: 90.0,
                    voltage: 12.1,
                    aux0: 11.0,
                    aux1: 30.0,
                },
                now,
            )
            .unwrap();

        assert!((state.depth.value - 9.5).abs() < f64::EPSILON);
        assert!((state.compass.value - 90.0).abs() < f64::EPSILON);
        assert!(state.depth_exceeded());
        assert_eq!(state.voltage_status(), LinkStatus::Ok);
        let sample = state.last_sample().unwrap();
        assert!((sample.aux1 - 30.0).abs() < f64::EPSILON);
        assert_eq!(sample.received_at, now);
    }

    #[test]
    fn test_apply_reported_relay_and_servo() {
        let mut state = vehicle();
        state.apply(&VehicleMessage::Relay { id: 1, on: true }, Instant::now()).unwrap();
        state.apply(&VehicleMessage::Servo { id: 0, value: 70 }, Instant::now()).unwrap();

        assert_eq!(state.relays()[1].reported, Some(true));
        assert!(!state.relays()[1].state);
        assert_eq!(state.servos()[0].reported, Some(70));
        assert_eq!(state.servos()[0].value, 50);
    }

    #[test]
    fn test_unknown_ids_are_rejected() {
        let mut state = vehicle();
        assert_eq!(
            state.apply(&VehicleMessage::Relay { id: 7, on: true }, Instant::now()),
            Err(VehicleError::UnknownRelay { id: 7, count: 3 })
        );
        assert_eq!(
            state.set_servo(2, 10),
            Err(VehicleError::UnknownServo { id: 2, count: 2 })
        );
        assert!(state.toggle_relay(3).is_err());
    }

    #[test]
    fn test_servo_clamping_and_nudge() {
        let mut state = vehicle();
        assert_eq!(state.set_servo(0, 250), Ok(100));
        assert_eq!(state.nudge_servo(0, ServoDirection::Increase), Ok(100));
        assert_eq!(state.nudge_servo(0, ServoDirection::Decrease), Ok(95));

        // Each servo id moves its own servo
        assert_eq!(state.nudge_servo(1, ServoDirection::Increase), Ok(55));
        assert_eq!(state.servos()[0].value, 95);
        assert_eq!(state.set_servo(1, -20), Ok(0));
    }

    #[test]
    fn test_control_frames_carry_commanded_state() {
        let mut state = vehicle();
        state.set_relay(0, true).unwrap();
        assert_eq!(state.toggle_relay(2), Ok(true));
        state.set_servo(1, 10).unwrap();

        let first = state.next_control_frame();
        assert_eq!(first.seq, 0);
        assert_eq!(first.relays, vec![true, false, true]);
        assert_eq!(first.servos, vec![50, 10]);

        let second = state.next_control_frame();
        assert_eq!(second.seq, 1);
    }

    #[test]
    fn test_acknowledge_window() {
        let mut state = vehicle();
        assert!(!state.acknowledge(0));

        for _ in 0..100 {
            state.next_control_frame();
        }
        assert!(state.acknowledge(99));
        assert!(state.acknowledge(40));
        assert!(!state.acknowledge(10));
        assert!(!state.acknowledge(150));
    }

    #[test]
    fn test_apply_config_keeps_commanded_state() {
        let mut state = vehicle();
        state.set_relay(1, true).unwrap();
        state.set_servo(0, 90).unwrap();

        let mut config = VehicleConfig::default();
        config.relays[1].name = "Strobe".to_string();
        config.relays.pop();
        config.servos[0].max = 80;
        config.depth.units = "ft".to_string();
        state.apply_config(&config);

        assert_eq!(state.relays().len(), 2);
        assert_eq!(state.relays()[1].name, "Strobe");
        assert!(state.relays()[1].state);
        assert_eq!(state.servos()[0].value, 80);
        assert_eq!(state.depth.config.units, "ft");
    }
}
