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

use chrono::{DateTime, Local};
use log::{error, info, warn};
use rov_link::ConnectionState;
use std::collections::VecDeque;

/// Number of activity log lines kept for display.
pub const MAX_DIAGNOSTICS: usize = 200;

/// Window over which the frame rate is averaged, in seconds.
const RATE_WINDOW_SECS: i64 = 10;

/// Activity log line with timestamp
#[derive(Debug, Clone)]
pub struct DiagnosticMessage {
    pub timestamp: DateTime<Local>,
    pub level: DiagnosticLevel,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticLevel {
    Info,
    Warning,
    Error,
}

/// Console status: vehicle link bookkeeping, frame rate and the activity log.
#[derive(Debug)]
pub struct ConsoleStatus {
    // Vehicle link
    pub connection: ConnectionState,
    pub vehicle_address: String,
    pub connected_at: Option<DateTime<Local>>,

    // Frame statistics
    pub frames_per_second: f64,
    pub frame_history: VecDeque<(DateTime<Local>, u64)>, // Frames received per second, last 60 s
    last_frame_total: u64,

    // Activity log (keep last MAX_DIAGNOSTICS)
    pub diagnostics: VecDeque<DiagnosticMessage>,
    max_diagnostics: usize,

    // UI frame timing
    pub last_update_duration_ms: f64,
    pub average_update_duration_ms: f64,
}

impl Default for ConsoleStatus {
    fn default() -> Self {
        Self::new()
    }
}

impl ConsoleStatus {
    pub fn new() -> Self {
        Self {
            connection: ConnectionState::Disconnected,
            vehicle_address: String::new(),
            connected_at: None,

            frames_per_second: 0.0,
            frame_history: VecDeque::with_capacity(60),
            last_frame_total: 0,

            diagnostics: VecDeque::with_capacity(MAX_DIAGNOSTICS),
            max_diagnostics: MAX_DIAGNOSTICS,

            last_update_duration_ms: 0.0,
            average_update_duration_ms: 0.0,
        }
    }

    /// Add a line to the activity log and mirror it to the log facade
    pub fn add_diagnostic(&mut self, level: DiagnosticLevel, message: impl Into<String>) {
        let message = message.into();
        match level {
            DiagnosticLevel::Info => info!("{}", message),
            DiagnosticLevel::Warning => warn!("{}", message),
            DiagnosticLevel::Error => error!("{}", message),
        }

        self.diagnostics.push_back(DiagnosticMessage {
            timestamp: Local::now(),
            level,
            message,
        });

        while self.diagnostics.len() > self.max_diagnostics {
            self.diagnostics.pop_front();
        }
    }

    /// Record a vehicle connection state change
    pub fn set_connection(&mut self, state: ConnectionState) {
        let (level, message) = match &state {
            ConnectionState::Connecting => (
                DiagnosticLevel::Info,
                format!("Connecting to vehicle at {}...", self.vehicle_address),
            ),
            ConnectionState::Connected => {
                self.connected_at = Some(Local::now());
                (
                    DiagnosticLevel::Info,
                    format!("Connected to vehicle at {}", self.vehicle_address),
                )
            }
            ConnectionState::Disconnected => {
                self.connected_at = None;
                (DiagnosticLevel::Warning, "Vehicle disconnected".to_string())
            }
            ConnectionState::Error(e) => {
                self.connected_at = None;
                (DiagnosticLevel::Error, format!("Vehicle link error: {e}"))
            }
        };
        self.connection = state;
        self.add_diagnostic(level, message);
    }

    /// Seconds since the vehicle link came up, zero while down
    pub fn connection_uptime_seconds(&self) -> u64 {
        match (&self.connection, self.connected_at) {
            (ConnectionState::Connected, Some(since)) => {
                u64::try_from((Local::now() - since).num_seconds()).unwrap_or(0)
            }
            _ => 0,
        }
    }

    /// Feed the controller's running frame total and update the rate
    pub fn record_frames(&mut self, total: u64) {
        self.record_frames_at(Local::now(), total);
    }

    fn record_frames_at(&mut self, now: DateTime<Local>, total: u64) {
        // Counter restarts with the controller
        let delta = total.saturating_sub(self.last_frame_total);
        self.last_frame_total = total;

        match self.frame_history.back_mut() {
            Some((last_time, count)) if (now - *last_time).num_milliseconds() < 1000 => {
                *count += delta;
            }
            _ => self.frame_history.push_back((now, delta)),
        }

        while let Some((timestamp, _)) = self.frame_history.front() {
            if (now - *timestamp).num_seconds() > 60 {
                self.frame_history.pop_front();
            } else {
                break;
            }
        }

        let window_start = now - chrono::Duration::seconds(RATE_WINDOW_SECS);
        let (frames, buckets) = self
            .frame_history
            .iter()
            .filter(|(timestamp, _)| *timestamp >= window_start)
            .fold((0u64, 0u32), |(frames, buckets), (_, count)| {
                (frames + count, buckets + 1)
            });

        if buckets > 0 {
            #[allow(clippy::cast_precision_loss, reason = "frame counts over ten seconds")]
            let frames = frames as f64;
            self.frames_per_second = frames / f64::from(buckets);
        }
    }

    /// Update UI frame timing
    pub fn update_performance(&mut self, duration_ms: f64) {
        const ALPHA: f64 = 0.1; // Smoothing factor

        self.last_update_duration_ms = duration_ms;
        if self.average_update_duration_ms == 0.0 {
            self.average_update_duration_ms = duration_ms;
        } else {
            self.average_update_duration_ms =
                ALPHA * duration_ms + (1.0 - ALPHA) * self.average_update_duration_ms;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diagnostics_are_bounded() {
        let mut status = ConsoleStatus::new();
        for i in 0..(MAX_DIAGNOSTICS + 25) {
            status.add_diagnostic(DiagnosticLevel::Info, format!("line {i}"));
        }
        assert_eq!(status.diagnostics.len(), MAX_DIAGNOSTICS);
        assert_eq!(status.diagnostics.front().unwrap().message, "line 25");
    }

    #[test]
    fn test_connection_changes_are_logged() {
        let mut status = ConsoleStatus::new();
        status.vehicle_address = "10.0.0.2:5000".to_string();
        status.set_connection(ConnectionState::Connected);
        assert!(status.connected_at.is_some());
        status.set_connection(ConnectionState::Error("refused".to_string()));
        assert!(status.connected_at.is_none());
        assert_eq!(status.connection_uptime_seconds(), 0);

        let last = status.diagnostics.back().unwrap();
        assert_eq!(last.level, DiagnosticLevel::Error);
        assert_eq!(last.message, "Vehicle link error: refused");
        assert_eq!(
            status.diagnostics[0].message,
            "Connected to vehicle at 10.0.0.2:5000"
        );
    }

    #[test]
    fn test_frame_rate_over_window() {
        let mut status = ConsoleStatus::new();
        let start = Local::now();
        for second in 0..5 {
            let at = start + chrono::Duration::seconds(second);
            status.record_frames_at(at, (second as u64 + 1) * 10);
        }
        assert_eq!(status.frame_history.len(), 5);
        assert!((status.frames_per_second - 10.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_frame_counter_restart() {
        let mut status = ConsoleStatus::new();
        let start = Local::now();
        status.record_frames_at(start, 100);
        status.record_frames_at(start + chrono::Duration::seconds(2), 5);
        assert_eq!(status.frame_history.back().unwrap().1, 0);
    }
}
