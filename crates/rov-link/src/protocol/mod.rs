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

//! Protocol layer for the vehicle link.
//!
//! This module provides a trait-based abstraction over the framing used
//! between the console and the vehicle. The default implementation is the
//! newline-terminated, comma-separated text protocol in [`LineParser`].

mod line;

pub use line::{encode_control_frame, LineParser};

use thiserror::Error;

/// Errors that can occur during message parsing.
#[derive(Debug, Error, PartialEq)]
pub enum ParseError {
    #[error("invalid message format: {0}")]
    InvalidFormat(String),

    #[error("missing required field: {0}")]
    MissingField(&'static str),

    #[error("invalid value for field '{field}': {value}")]
    InvalidValue { field: &'static str, value: String },
}

/// Messages sent by the vehicle to the console.
#[derive(Debug, Clone, PartialEq)]
pub enum VehicleMessage {
    /// One telemetry sample from the vehicle sensors.
    Telemetry {
        /// Depth below the surface in the configured depth units.
        depth: f64,
        /// Compass heading in degrees (0-360, north = 0).
        heading: f64,
        /// Supply voltage at the vehicle.
        voltage: f64,
        /// First auxiliary sensor.
        aux0: f64,
        /// Second auxiliary sensor.
        aux1: f64,
    },

    /// The vehicle received the control frame with this sequence number.
    Ack {
        /// Sequence number of the acknowledged control frame.
        seq: u32,
    },

    /// Reported state of one relay.
    Relay {
        /// Relay index.
        id: usize,
        /// Whether the relay output is energized.
        on: bool,
    },

    /// Reported position of one servo.
    Servo {
        /// Servo index.
        id: usize,
        /// Current servo position.
        value: i32,
    },
}

impl VehicleMessage {
    /// Short tag used in logs.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Telemetry { .. } => "TEL",
            Self::Ack { .. } => "ACK",
            Self::Relay { .. } => "RLY",
            Self::Servo { .. } => "SRV",
        }
    }
}

/// Batched control frame sent from the console to the vehicle.
///
/// Every frame carries the full commanded state so a lost frame is repaired
/// by the next one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlFrame {
    /// Monotonic sequence number, echoed back by the vehicle in `ACK`.
    pub seq: u32,
    /// Commanded relay states in relay order.
    pub relays: Vec<bool>,
    /// Commanded servo positions in servo order.
    pub servos: Vec<i32>,
}

/// Trait for protocol parsers.
///
/// Implement this trait to support a different vehicle framing.
pub trait Protocol {
    /// The message type produced by this parser.
    type Message;
    /// The error type for parsing failures.
    type Error;

    /// Parse input bytes into a message.
    ///
    /// Returns `Ok(Some(message))` if parsing succeeded,
    /// `Ok(None)` if the input is valid but doesn't produce a message,
    /// or `Err(error)` if parsing failed.
    fn parse(&mut self, input: &[u8]) -> Result<Option<Self::Message>, Self::Error>;
}
