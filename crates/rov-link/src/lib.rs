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

//! Vehicle link library for the Monterey ROV console.
//!
//! This library holds everything between the tether socket and the screen
//! that is not UI:
//!
//! - **Protocol layer**: line framing of telemetry, acknowledgements and
//!   batched control frames
//! - **Connection layer**: async TCP with automatic reconnection, address
//!   hot-reload and an outbound queue
//! - **Monitor layer**: TIBO/TOBI heartbeat monitors with edge reporting
//! - **Vehicle layer**: sensors, relays and servos, command validation
//! - **Fault layer**: tri-state statuses and the master fault aggregate
//! - **Telemetry window**: bounded rolling series for the depth trace
//! - **Simulator**: a stand-in vehicle for bench testing
//!
//! # Quick Start
//!
//! ```
//! use rov_link::fault::{compute_aggregate, LinkStatus};
//!
//! let status = compute_aggregate(true, true, false, LinkStatus::Ok);
//! assert_eq!(status, LinkStatus::Error);
//! ```
//!
//! ## Protocol Layer Only
//!
//! ```
//! use rov_link::protocol::{LineParser, Protocol, VehicleMessage};
//!
//! let mut parser = LineParser::new();
//! if let Ok(Some(VehicleMessage::Telemetry { depth, .. })) = parser.parse(b"TEL,4.2,90,12.3,15,28") {
//!     println!("Vehicle at {depth} m");
//! }
//! ```

pub mod fault;
pub mod monitor;
pub mod protocol;
pub mod sim;
pub mod tcp;
pub mod telemetry;
pub mod vehicle;

pub use fault::{aggregate, compute_aggregate, LinkStatus};
pub use monitor::{EdgeDetector, Link, LinkMonitor, LinkTransition};
pub use protocol::{encode_control_frame, ControlFrame, LineParser, ParseError, Protocol, VehicleMessage};
pub use sim::{Simulator, SimulatorConfig};
pub use tcp::{Connection, ConnectionConfig, ConnectionEvent, ConnectionState};
pub use telemetry::{TelemetrySample, TelemetryWindow};
pub use vehicle::{
    classify_voltage, Relay, RelayConfig, Sensor, SensorConfig, Servo, ServoConfig, ServoDirection,
    VehicleConfig, VehicleError, VehicleState,
};
