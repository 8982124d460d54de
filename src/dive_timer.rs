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

use std::time::{Duration, Instant};

/// Elapsed-time counter for the current dive.
#[derive(Debug, Clone, Copy, Default)]
pub struct DiveTimer {
    started_at: Option<Instant>,
}

impl DiveTimer {
    #[must_use]
    pub const fn new() -> Self {
        Self { started_at: None }
    }

    /// Start timing. Has no effect while already running.
    pub fn start(&mut self, now: Instant) {
        if self.started_at.is_none() {
            self.started_at = Some(now);
        }
    }

    pub fn reset(&mut self) {
        self.started_at = None;
    }

    #[must_use]
    pub const fn is_running(&self) -> bool {
        self.started_at.is_some()
    }

    #[must_use]
    pub fn elapsed(&self, now: Instant) -> Duration {
        self.started_at
            .map_or(Duration::ZERO, |start| now.saturating_duration_since(start))
    }

    /// Elapsed time as `HH:MM:SS`.
    #[must_use]
    pub fn display(&self, now: Instant) -> String {
        let secs = self.elapsed(now).as_secs();
        format!("{:02}:{:02}:{:02}", secs / 3600, (secs / 60) % 60, secs % 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_started() {
        let timer = DiveTimer::new();
        assert!(!timer.is_running());
        assert_eq!(timer.display(Instant::now()), "00:00:00");
    }

    #[test]
    fn test_display_formats_hours() {
        let start = Instant::now();
        let mut timer = DiveTimer::new();
        timer.start(start);
        let later = start + Duration::from_secs(3 * 3600 + 25 * 60 + 7);
        assert_eq!(timer.display(later), "03:25:07");
    }

    #[test]
    fn test_start_while_running_keeps_origin() {
        let start = Instant::now();
        let mut timer = DiveTimer::new();
        timer.start(start);
        timer.start(start + Duration::from_secs(30));
        assert_eq!(timer.elapsed(start + Duration::from_secs(60)), Duration::from_secs(60));

        timer.reset();
        assert_eq!(timer.display(start + Duration::from_secs(90)), "00:00:00");
    }
}
