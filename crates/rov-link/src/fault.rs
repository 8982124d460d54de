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

//! Fault aggregation.
//!
//! Every monitored subsystem reports a [`LinkStatus`]. The console shows the
//! worst of them on a single master indicator.

/// Tri-state health of one monitored subsystem.
///
/// Variants are ordered by severity so the worst status is simply the maximum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum LinkStatus {
    #[default]
    Ok,
    Warn,
    Error,
}

impl LinkStatus {
    /// Map a required boolean condition: present is `Ok`, missing is `Error`.
    #[must_use]
    pub const fn from_required(ok: bool) -> Self {
        if ok {
            Self::Ok
        } else {
            Self::Error
        }
    }

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::Warn => "WARN",
            Self::Error => "ERROR",
        }
    }
}

impl std::fmt::Display for LinkStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Worst status of any number of subsystems. An empty set is `Ok`.
pub fn aggregate<I>(statuses: I) -> LinkStatus
where
    I: IntoIterator<Item = LinkStatus>,
{
    statuses.into_iter().max().unwrap_or_default()
}

/// Aggregate the four console inputs into the master fault indicator.
///
/// A missing joystick or a dead heartbeat link counts as `Error`; the
/// voltage status is taken as-is.
#[must_use]
pub fn compute_aggregate(
    joystick_ok: bool,
    link_a_ok: bool,
    link_b_ok: bool,
    voltage: LinkStatus,
) -> LinkStatus {
    aggregate([
        LinkStatus::from_required(joystick_ok),
        LinkStatus::from_required(link_a_ok),
        LinkStatus::from_required(link_b_ok),
        voltage,
    ])
}
