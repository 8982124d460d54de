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

//! Rolling telemetry window.
//!
//! Samples are stamped with the monotonic time they arrived and kept only
//! while they are within `span` of the current processing tick, and never
//! more than `capacity` of them. The console uses this for the depth trace;
//! everything older is discarded, so a silent vehicle scrolls off the trace.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// One telemetry reading from the vehicle.
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetrySample {
    pub received_at: Instant,
    pub depth: f64,
    pub heading: f64,
    pub voltage: f64,
    pub aux0: f64,
    pub aux1: f64,
}

/// Default length of the rolling window.
pub const DEFAULT_WINDOW_SECS: u64 = 10;

/// Hard upper bound on retained samples (20 Hz refresh for well over the window).
pub const DEFAULT_WINDOW_CAPACITY: usize = 1024;

/// Bounded, time-windowed series of telemetry samples.
#[derive(Debug, Clone)]
pub struct TelemetryWindow {
    samples: VecDeque<TelemetrySample>,
    span: Duration,
    capacity: usize,
}

impl Default for TelemetryWindow {
    fn default() -> Self {
        Self::new(Duration::from_secs(DEFAULT_WINDOW_SECS), DEFAULT_WINDOW_CAPACITY)
    }
}

impl TelemetryWindow {
    #[must_use]
    pub fn new(span: Duration, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity.min(DEFAULT_WINDOW_CAPACITY)),
            span,
            capacity,
        }
    }

    #[must_use]
    pub fn span(&self) -> Duration {
        self.span
    }

    /// Change the window length. Takes effect at the next [`advance`](Self::advance).
    pub fn set_span(&mut self, span: Duration) {
        self.span = span;
    }

    /// Append a sample, evicting the oldest once `capacity` is reached.
    ///
    /// Samples older than the newest retained one are ignored so the series
    /// stays ordered.
    pub fn push(&mut self, sample: TelemetrySample) {
        if self
            .samples
            .back()
            .is_some_and(|newest| sample.received_at < newest.received_at)
        {
            return;
        }
        self.samples.push_back(sample);
        while self.samples.len() > self.capacity {
            self.samples.pop_front();
        }
    }

    /// Drop every sample that is more than `span` older than `now`.
    pub fn advance(&mut self, now: Instant) {
        let Some(cutoff) = now.checked_sub(self.span) else {
            return;
        };
        while self
            .samples
            .front()
            .is_some_and(|oldest| oldest.received_at < cutoff)
        {
            self.samples.pop_front();
        }
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    #[must_use]
    pub fn latest(&self) -> Option<&TelemetrySample> {
        self.samples.back()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TelemetrySample> {
        self.samples.iter()
    }

    /// Depth trace as `[seconds relative to now, -depth]`.
    ///
    /// The x axis runs from `-span` to `0`; depth is negated so the trace
    /// goes down as the vehicle dives.
    #[must_use]
    pub fn depth_points(&self, now: Instant) -> Vec<[f64; 2]> {
        self.samples
            .iter()
            .map(|sample| {
                let age = now.saturating_duration_since(sample.received_at);
                [-age.as_secs_f64(), -sample.depth]
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_at(base: Instant, millis: u64, depth: f64) -> TelemetrySample {
        TelemetrySample {
            received_at: base + Duration::from_millis(millis),
            depth,
            heading: 0.0,
            voltage: 12.0,
            aux0: 0.0,
            aux1: 0.0,
        }
    }

    #[test]
    fn test_window_evicts_by_age() {
        let base = Instant::now();
        let mut window = TelemetryWindow::default();

        for step in 0..=24 {
            window.push(sample_at(base, step * 500, 1.0));
        }
        window.advance(base + Duration::from_secs(12));

        // Now is 12s, keep everything from 2s onward
        assert_eq!(window.len(), 21);
        let oldest = window.iter().next().unwrap();
        assert_eq!(oldest.received_at, base + Duration::from_secs(2));
    }

    #[test]
    fn test_silent_vehicle_scrolls_off() {
        let base = Instant::now();
        let mut window = TelemetryWindow::default();
        for step in 0..10 {
            window.push(sample_at(base, step * 100, 2.0));
        }

        window.advance(base + Duration::from_secs(5));
        assert_eq!(window.len(), 10);

        // No new samples for longer than the span
        window.advance(base + Duration::from_secs(11) + Duration::from_millis(500));
        assert!(window.is_empty());
        assert!(window
            .depth_points(base + Duration::from_secs(12))
            .is_empty());
    }

    #[test]
    fn test_window_respects_capacity() {
        let base = Instant::now();
        let mut window = TelemetryWindow::new(Duration::from_secs(60), 5);

        for step in 0..20 {
            window.push(sample_at(base, step * 10, 1.0));
        }

        assert_eq!(window.len(), 5);
        assert_eq!(
            window.latest().unwrap().received_at,
            base + Duration::from_millis(190)
        );
    }

    #[test]
    fn test_out_of_order_sample_ignored() {
        let base = Instant::now();
        let mut window = TelemetryWindow::default();
        window.push(sample_at(base, 1000, 1.0));
        window.push(sample_at(base, 500, 2.0));
        assert_eq!(window.len(), 1);
    }

    #[test]
    fn test_depth_points_are_relative_to_now_and_negated() {
        let base = Instant::now();
        let mut window = TelemetryWindow::default();
        window.push(sample_at(base, 0, 1.5));
        window.push(sample_at(base, 2000, 3.0));

        let points = window.depth_points(base + Duration::from_secs(3));
        assert_eq!(points.len(), 2);
        assert!((points[0][0] - (-3.0)).abs() < 1e-9);
        assert!((points[0][1] - (-1.5)).abs() < 1e-9);
        assert!((points[1][0] - (-1.0)).abs() < 1e-9);
        assert!((points[1][1] - (-3.0)).abs() < 1e-9);
    }

    #[test]
    fn test_shrinking_span_evicts_on_advance() {
        let base = Instant::now();
        let mut window = TelemetryWindow::default();
        for step in 0..10 {
            window.push(sample_at(base, step * 1000, 1.0));
        }
        window.set_span(Duration::from_secs(3));
        window.advance(base + Duration::from_secs(9));
        assert_eq!(window.len(), 4);
    }
}
