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

//! Line protocol parser.
//!
//! Vehicle to console:
//! ```text
//! TEL,<depth>,<heading>,<voltage>,<aux0>,<aux1>
//! ACK,<seq>
//! RLY,<id>,<0|1>
//! SRV,<id>,<value>
//! ```
//!
//! Console to vehicle:
//! ```text
//! CTL,<seq>,<relay bits>,<servo;servo;...>
//! ```

use super::{ControlFrame, ParseError, Protocol, VehicleMessage};

/// Parser for the newline-terminated vehicle protocol.
#[derive(Debug, Default)]
pub struct LineParser;

impl LineParser {
    /// Create a new line parser.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Protocol for LineParser {
    type Message = VehicleMessage;
    type Error = ParseError;

    fn parse(&mut self, input: &[u8]) -> Result<Option<VehicleMessage>, ParseError> {
        let line = std::str::from_utf8(input)
            .map_err(|_| ParseError::InvalidFormat("invalid UTF-8".to_string()))?;

        parse_line(line)
    }
}

fn field<'a>(parts: &[&'a str], index: usize, name: &'static str) -> Result<&'a str, ParseError> {
    parts
        .get(index)
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .ok_or(ParseError::MissingField(name))
}

fn number<T: std::str::FromStr>(
    parts: &[&str],
    index: usize,
    name: &'static str,
) -> Result<T, ParseError> {
    let raw = field(parts, index, name)?;
    raw.parse::<T>().map_err(|_| ParseError::InvalidValue {
        field: name,
        value: raw.to_string(),
    })
}

fn float(parts: &[&str], index: usize, name: &'static str) -> Result<f64, ParseError> {
    let value: f64 = number(parts, index, name)?;
    if value.is_finite() {
        Ok(value)
    } else {
        Err(ParseError::InvalidValue {
            field: name,
            value: value.to_string(),
        })
    }
}

/// Parse a "0"/"1" flag.
fn flag(parts: &[&str], index: usize, name: &'static str) -> Result<bool, ParseError> {
    match field(parts, index, name)? {
        "1" => Ok(true),
        "0" => Ok(false),
        other => Err(ParseError::InvalidValue {
            field: name,
            value: other.to_string(),
        }),
    }
}

/// Parse a single protocol line.
fn parse_line(line: &str) -> Result<Option<VehicleMessage>, ParseError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }

    let parts: Vec<&str> = line.split(',').collect();

    match parts[0].trim() {
        "TEL" => Ok(Some(VehicleMessage::Telemetry {
            depth: float(&parts, 1, "depth")?,
            heading: float(&parts, 2, "heading")?,
            voltage: float(&parts, 3, "voltage")?,
            aux0: float(&parts, 4, "aux0")?,
            aux1: float(&parts, 5, "aux1")?,
        })),
        "ACK" => Ok(Some(VehicleMessage::Ack {
            seq: number(&parts, 1, "seq")?,
        })),
        "RLY" => Ok(Some(VehicleMessage::Relay {
            id: number(&parts, 1, "id")?,
            on: flag(&parts, 2, "state")?,
        })),
        "SRV" => Ok(Some(VehicleMessage::Servo {
            id: number(&parts, 1, "id")?,
            value: number(&parts, 2, "value")?,
        })),
        // Frames we don't understand (including our own echoed CTL) are ignored
        _ => Ok(None),
    }
}

/// Encode a control frame as a protocol line, without the trailing newline.
#[must_use]
pub fn encode_control_frame(frame: &ControlFrame) -> String {
    let relays: String = frame
        .relays
        .iter()
        .map(|on| if *on { '1' } else { '0' })
        .collect();
    let servos = frame
        .servos
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(";");

    format!("CTL,{},{},{}", frame.seq, relays, servos)
}
