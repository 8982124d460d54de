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

//! Heartbeat link monitoring.
//!
//! A [`LinkMonitor`] is credited with a beat whenever proof of liveness
//! arrives on its link and is polled once per processing tick. It reports
//! each change of alive-ness exactly once so callers can log edges instead
//! of levels.

use std::time::{Duration, Instant};

use log::{info, warn};

use crate::fault::LinkStatus;

/// Which of the two vehicle heartbeat links a monitor watches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Link {
    /// Topside in, bottomside out: frames flowing from the vehicle.
    Tibo,
    /// Topside out, bottomside in: control frames acknowledged by the vehicle.
    Tobi,
}

impl Link {
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Tibo => "TIBO",
            Self::Tobi => "TOBI",
        }
    }
}

impl std::fmt::Display for Link {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Edge reported by [`LinkMonitor::poll`] and [`EdgeDetector::update`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkTransition {
    Gained,
    Lost,
}

/// Remembers the last boolean level and reports changes.
#[derive(Debug, Clone, Copy)]
pub struct EdgeDetector {
    level: bool,
}

impl EdgeDetector {
    #[must_use]
    pub const fn new(initial: bool) -> Self {
        Self { level: initial }
    }

    /// Feed the current level; returns the edge if it differs from the last one.
    pub fn update(&mut self, level: bool) -> Option<LinkTransition> {
        if level == self.level {
            return None;
        }
        self.level = level;
        Some(if level {
            LinkTransition::Gained
        } else {
            LinkTransition::Lost
        })
    }

    #[must_use]
    pub const fn level(&self) -> bool {
        self.level
    }
}

/// Timeout-based liveness monitor for one heartbeat link.
#[derive(Debug, Clone)]
pub struct LinkMonitor {
    link: Link,
    timeout: Duration,
    last_beat: Option<Instant>,
    edge: EdgeDetector,
    beats: u64,
}

impl LinkMonitor {
    /// Create a monitor that considers the link dead until the first beat.
    #[must_use]
    pub const fn new(link: Link, timeout: Duration) -> Self {
        Self {
            link,
            timeout,
            last_beat: None,
            edge: EdgeDetector::new(false),
            beats: 0,
        }
    }

    #[must_use]
    pub const fn link(&self) -> Link {
        self.link
    }

    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    /// Record proof of liveness at `now`.
    pub fn beat(&mut self, now: Instant) {
        self.last_beat = Some(now);
        self.beats += 1;
    }

    /// Whether a beat was seen within the timeout of `now`.
    #[must_use]
    pub fn is_alive_at(&self, now: Instant) -> bool {
        self.last_beat
            .is_some_and(|beat| now.saturating_duration_since(beat) <= self.timeout)
    }

    /// Re-evaluate liveness and return the transition, if any.
    pub fn poll(&mut self, now: Instant) -> Option<LinkTransition> {
        let transition = self.edge.update(self.is_alive_at(now));
        match transition {
            Some(LinkTransition::Gained) => info!("Gained {}", self.link),
            Some(LinkTransition::Lost) => warn!("Lost {}", self.link),
            None => {}
        }
        transition
    }

    /// Liveness as of the last [`poll`](Self::poll).
    #[must_use]
    pub const fn is_alive(&self) -> bool {
        self.edge.level()
    }

    /// Indicator status as of the last poll: alive is `Ok`, dead is `Error`.
    #[must_use]
    pub const fn status(&self) -> LinkStatus {
        LinkStatus::from_required(self.is_alive())
    }

    /// Total beats credited since creation.
    #[must_use]
    pub const fn beat_count(&self) -> u64 {
        self.beats
    }

    /// Time since the last beat, if any.
    #[must_use]
    pub fn since_last_beat(&self, now: Instant) -> Option<Duration> {
        self.last_beat.map(|beat| now.saturating_duration_since(beat))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TIMEOUT: Duration = Duration::from_millis(500);

    #[test]
    fn test_starts_dead() {
        let mut monitor = LinkMonitor::new(Link::Tibo, TIMEOUT);
        let now = Instant::now();
        assert!(!monitor.is_alive_at(now));
        assert_eq!(monitor.poll(now), None);
        assert_eq!(monitor.status(), LinkStatus::Error);
    }

    #[test]
    fn test_gain_then_lose_reports_each_edge_once() {
        let mut monitor = LinkMonitor::new(Link::Tobi, TIMEOUT);
        let start = Instant::now();

        monitor.beat(start);
        assert_eq!(monitor.poll(start), Some(LinkTransition::Gained));
        assert_eq!(monitor.poll(start + Duration::from_millis(100)), None);
        assert_eq!(monitor.status(), LinkStatus::Ok);

        let late = start + Duration::from_millis(600);
        assert_eq!(monitor.poll(late), Some(LinkTransition::Lost));
        assert_eq!(monitor.poll(late + Duration::from_millis(10)), None);
        assert_eq!(monitor.status(), LinkStatus::Error);
    }

    #[test]
    fn test_regular_beats_keep_link_alive() {
        let mut monitor = LinkMonitor::new(Link::Tibo, TIMEOUT);
        let start = Instant::now();

        for step in 0..10 {
            let now = start + Duration::from_millis(step * 200);
            monitor.beat(now);
            let transition = monitor.poll(now);
            if step == 0 {
                assert_eq!(transition, Some(LinkTransition::Gained));
            } else {
                assert_eq!(transition, None);
            }
        }
        assert_eq!(monitor.beat_count(), 10);
    }

    #[test]
    fn test_edge_detector() {
        let mut edge = EdgeDetector::new(false);
        assert_eq!(edge.update(false), None);
        assert_eq!(edge.update(true), Some(LinkTransition::Gained));
        assert_eq!(edge.update(true), None);
        assert_eq!(edge.update(false), Some(LinkTransition::Lost));
    }
}
