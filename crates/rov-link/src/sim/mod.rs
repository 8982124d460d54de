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

//! In-process vehicle simulator.
//!
//! Listens on a TCP port and behaves like the vehicle end of the tether:
//! streams telemetry, acknowledges control frames and reports the relay
//! and servo states it was commanded to. Used for bench testing the
//! console without hardware and by the integration tests.

use std::net::SocketAddr;
use std::time::Duration;

use log::{debug, info, warn};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Simulator behaviour.
#[derive(Debug, Clone)]
pub struct SimulatorConfig {
    /// Address to listen on; port 0 picks a free port.
    pub bind: String,
    /// Interval between telemetry frames.
    pub telemetry_interval: Duration,
    /// Acknowledge control frames (feeds the console's TOBI monitor).
    pub acknowledge: bool,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:0".to_string(),
            telemetry_interval: Duration::from_millis(100),
            acknowledge: true,
        }
    }
}

/// Handle to a running simulator.
#[derive(Debug)]
pub struct Simulator {
    local_addr: SocketAddr,
    acknowledge_tx: watch::Sender<bool>,
    cancel_token: CancellationToken,
}

impl Simulator {
    /// Bind the listener and start serving in the background.
    ///
    /// Must be called from within a tokio runtime.
    pub async fn spawn(config: SimulatorConfig) -> std::io::Result<Self> {
        let listener = TcpListener::bind(&config.bind).await?;
        let local_addr = listener.local_addr()?;
        let (acknowledge_tx, acknowledge_rx) = watch::channel(config.acknowledge);
        let cancel_token = CancellationToken::new();

        info!("Vehicle simulator listening on {}", local_addr);

        let task_cancel = cancel_token.clone();
        let interval = config.telemetry_interval;
        tokio::spawn(async move {
            loop {
                let accepted = tokio::select! {
                    accepted = listener.accept() => accepted,
                    () = task_cancel.cancelled() => return,
                };
                match accepted {
                    Ok((socket, peer)) => {
                        info!("Simulator: console connected from {}", peer);
                        serve(socket, interval, acknowledge_rx.clone(), task_cancel.clone()).await;
                        info!("Simulator: console disconnected");
                    }
                    Err(e) => warn!("Simulator accept failed: {}", e),
                }
            }
        });

        Ok(Self {
            local_addr,
            acknowledge_tx,
            cancel_token,
        })
    }

    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Start or stop acknowledging control frames.
    pub fn set_acknowledge(&self, acknowledge: bool) {
        let _ = self.acknowledge_tx.send(acknowledge);
    }

    pub fn shutdown(&self) {
        self.cancel_token.cancel();
    }
}

impl Drop for Simulator {
    fn drop(&mut self) {
        self.cancel_token.cancel();
    }
}

/// Simulated vehicle physics, advanced once per telemetry frame.
#[derive(Debug, Default)]
struct SimulatedVehicle {
    tick: u64,
    relays: Vec<bool>,
    servos: Vec<i32>,
}

impl SimulatedVehicle {
    #[allow(clippy::cast_precision_loss, reason = "tick counter stays small")]
    fn telemetry_line(&mut self) -> String {
        self.tick += 1;
        let t = self.tick as f64 / 10.0;
        let depth = 3.0 + 2.5 * (t / 8.0).sin();
        let heading = (t * 6.0) % 360.0;
        let voltage = 12.4 - 0.3 * (t / 20.0).sin().abs();
        let water = 14.0 + 0.5 * (t / 30.0).cos();
        let internal = 28.0 + (t / 15.0).sin();
        format!("TEL,{depth:.2},{heading:.1},{voltage:.2},{water:.2},{internal:.2}")
    }

    /// Apply a `CTL` frame; returns the acknowledged sequence number.
    fn apply_control(&mut self, line: &str) -> Option<u32> {
        let mut parts = line.trim().split(',');
        if parts.next()? != "CTL" {
            return None;
        }
        let seq = parts.next()?.parse().ok()?;
        self.relays = parts.next()?.chars().map(|c| c == '1').collect();
        self.servos = parts
            .next()
            .unwrap_or_default()
            .split(';')
            .filter_map(|s| s.parse().ok())
            .collect();
        Some(seq)
    }

    fn state_lines(&self) -> Vec<String> {
        let relays = self
            .relays
            .iter()
            .enumerate()
            .map(|(id, on)| format!("RLY,{},{}", id, u8::from(*on)));
        let servos = self
            .servos
            .iter()
            .enumerate()
            .map(|(id, value)| format!("SRV,{id},{value}"));
        relays.chain(servos).collect()
    }
}

async fn serve(
    socket: TcpStream,
    interval: Duration,
    acknowledge_rx: watch::Receiver<bool>,
    cancel_token: CancellationToken,
) {
    let (read_half, mut write_half) = socket.into_split();
    let mut lines = BufReader::new(read_half).lines();
    let mut vehicle = SimulatedVehicle::default();

    let mut telemetry = tokio::time::interval(interval);
    telemetry.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        let mut outgoing = Vec::new();
        tokio::select! {
            _ = telemetry.tick() => {
                outgoing.push(vehicle.telemetry_line());
                outgoing.extend(vehicle.state_lines());
            }
            line = lines.next_line() => {
                match line {
                    Ok(Some(line)) => {
                        if let Some(seq) = vehicle.apply_control(&line) {
                            if *acknowledge_rx.borrow() {
                                outgoing.push(format!("ACK,{seq}"));
                            }
                        } else {
                            debug!("Simulator ignoring line: {}", line);
                        }
                    }
                    Ok(None) | Err(_) => return,
                }
            }
            () = cancel_token.cancelled() => return,
        }

        for mut line in outgoing {
            line.push('\n');
            if write_half.write_all(line.as_bytes()).await.is_err() {
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{LineParser, Protocol, VehicleMessage};
    use tokio::time::timeout;

    #[test]
    fn test_apply_control_frame() {
        let mut vehicle = SimulatedVehicle::default();
        assert_eq!(vehicle.apply_control("CTL,9,101,20;80"), Some(9));
        assert_eq!(vehicle.relays, vec![true, false, true]);
        assert_eq!(vehicle.servos, vec![20, 80]);
        assert_eq!(
            vehicle.state_lines(),
            vec!["RLY,0,1", "RLY,1,0", "RLY,2,1", "SRV,0,20", "SRV,1,80"]
        );
        assert_eq!(vehicle.apply_control("TEL,1,2,3,4,5"), None);
    }

    #[test]
    fn test_telemetry_line_parses() {
        let mut vehicle = SimulatedVehicle::default();
        let line = vehicle.telemetry_line();
        let parsed = LineParser::new().parse(line.as_bytes()).unwrap();
        assert!(matches!(parsed, Some(VehicleMessage::Telemetry { .. })));
    }

    #[tokio::test]
    async fn test_simulator_acknowledges() {
        let simulator = Simulator::spawn(SimulatorConfig::default()).await.unwrap();
        let socket = TcpStream::connect(simulator.local_addr()).await.unwrap();
        let (read_half, mut write_half) = socket.into_split();
        write_half.write_all(b"CTL,3,1,\n").await.unwrap();

        let mut lines = BufReader::new(read_half).lines();
        let found = timeout(Duration::from_secs(5), async {
            while let Ok(Some(line)) = lines.next_line().await {
                if line == "ACK,3" {
                    return true;
                }
            }
            false
        })
        .await
        .unwrap();
        assert!(found);
    }
}
