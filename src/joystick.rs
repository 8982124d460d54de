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

//! Gamepad input.
//!
//! The controller polls a [`JoystickSource`] once per processing tick. Button
//! presses are translated through the configured bindings into relay toggles
//! and servo nudges; attach/detach changes drive the joystick indicator.

use gilrs::{EventType, GamepadId, Gilrs};
use log::{info, warn};
use rov_link::ServoDirection;
use serde::{Deserialize, Serialize};

/// Gamepad buttons that can be bound to console actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ButtonBinding {
    South,
    East,
    North,
    West,
    LeftTrigger,
    LeftTrigger2,
    RightTrigger,
    RightTrigger2,
    Select,
    Start,
    DPadUp,
    DPadDown,
    DPadLeft,
    DPadRight,
}

impl ButtonBinding {
    #[must_use]
    pub fn from_gilrs(button: gilrs::Button) -> Option<Self> {
        use gilrs::Button;
        Some(match button {
            Button::South => Self::South,
            Button::East => Self::East,
            Button::North => Self::North,
            Button::West => Self::West,
            Button::LeftTrigger => Self::LeftTrigger,
            Button::LeftTrigger2 => Self::LeftTrigger2,
            Button::RightTrigger => Self::RightTrigger,
            Button::RightTrigger2 => Self::RightTrigger2,
            Button::Select => Self::Select,
            Button::Start => Self::Start,
            Button::DPadUp => Self::DPadUp,
            Button::DPadDown => Self::DPadDown,
            Button::DPadLeft => Self::DPadLeft,
            Button::DPadRight => Self::DPadRight,
            _ => return None,
        })
    }
}

/// Pair of buttons that move one servo up and down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServoBinding {
    pub increase: ButtonBinding,
    pub decrease: ButtonBinding,
}

/// Button bindings, indexed by relay and servo id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JoystickConfig {
    pub relay_toggles: Vec<ButtonBinding>,
    pub servos: Vec<ServoBinding>,
}

impl Default for JoystickConfig {
    fn default() -> Self {
        Self {
            relay_toggles: vec![ButtonBinding::South, ButtonBinding::East, ButtonBinding::West],
            servos: vec![
                ServoBinding {
                    increase: ButtonBinding::DPadUp,
                    decrease: ButtonBinding::DPadDown,
                },
                ServoBinding {
                    increase: ButtonBinding::DPadRight,
                    decrease: ButtonBinding::DPadLeft,
                },
            ],
        }
    }
}

/// What a bound button press asks the controller to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoystickAction {
    ToggleRelay(usize),
    NudgeServo { id: usize, direction: ServoDirection },
}

impl JoystickConfig {
    /// Resolve a press to an action. Relay bindings win over servo bindings.
    #[must_use]
    pub fn action_for(&self, button: ButtonBinding) -> Option<JoystickAction> {
        if let Some(id) = self.relay_toggles.iter().position(|b| *b == button) {
            return Some(JoystickAction::ToggleRelay(id));
        }
        self.servos.iter().enumerate().find_map(|(id, binding)| {
            if binding.increase == button {
                Some(JoystickAction::NudgeServo {
                    id,
                    direction: ServoDirection::Increase,
                })
            } else if binding.decrease == button {
                Some(JoystickAction::NudgeServo {
                    id,
                    direction: ServoDirection::Decrease,
                })
            } else {
                None
            }
        })
    }
}

/// Input observed since the last poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoystickEvent {
    Pressed(ButtonBinding),
    Attached(String),
    Detached,
}

/// Source of gamepad input, polled from the controller thread.
pub trait JoystickSource {
    /// Drain pending input.
    fn poll(&mut self) -> Vec<JoystickEvent>;

    /// Whether a gamepad is currently in use.
    fn is_attached(&self) -> bool;

    /// Re-select the active gamepad from what is currently connected.
    fn rescan(&mut self) -> Vec<JoystickEvent>;
}

/// Gamepad input through gilrs. Only the first connected pad is used.
pub struct GilrsJoystick {
    gilrs: Gilrs,
    active: Option<GamepadId>,
}

impl std::fmt::Debug for GilrsJoystick {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GilrsJoystick")
            .field("active", &self.active)
            .finish_non_exhaustive()
    }
}

impl GilrsJoystick {
    pub fn new() -> Result<Self, gilrs::Error> {
        let mut joystick = Self {
            gilrs: Gilrs::new()?,
            active: None,
        };
        joystick.select_first_connected();
        Ok(joystick)
    }

    fn select_first_connected(&mut self) -> Option<String> {
        self.active = None;
        let (id, gamepad) = self.gilrs.gamepads().find(|(_, pad)| pad.is_connected())?;
        self.active = Some(id);
        Some(gamepad.name().to_string())
    }
}

impl JoystickSource for GilrsJoystick {
    fn poll(&mut self) -> Vec<JoystickEvent> {
        let mut events = Vec::new();

        while let Some(gilrs::Event { id, event, .. }) = self.gilrs.next_event() {
            match event {
                EventType::Connected => {
                    if self.active.is_none() {
                        self.active = Some(id);
                        let name = self.gilrs.gamepad(id).name().to_string();
                        events.push(JoystickEvent::Attached(name));
                    }
                }
                EventType::Disconnected => {
                    if self.active == Some(id) {
                        events.push(JoystickEvent::Detached);
                        if let Some(name) = self.select_first_connected() {
                            events.push(JoystickEvent::Attached(name));
                        }
                    }
                }
                EventType::ButtonPressed(button, _) if self.active == Some(id) => {
                    if let Some(binding) = ButtonBinding::from_gilrs(button) {
                        events.push(JoystickEvent::Pressed(binding));
                    }
                }
                _ => {}
            }
        }

        events
    }

    fn is_attached(&self) -> bool {
        self.active
            .is_some_and(|id| self.gilrs.connected_gamepad(id).is_some())
    }

    fn rescan(&mut self) -> Vec<JoystickEvent> {
        let was_attached = self.active.is_some();
        match self.select_first_connected() {
            Some(name) => {
                info!("Joystick rescan selected '{}'", name);
                vec![JoystickEvent::Attached(name)]
            }
            None if was_attached => vec![JoystickEvent::Detached],
            None => Vec::new(),
        }
    }
}

/// Stand-in used when no gamepad backend is available.
#[derive(Debug, Default)]
pub struct NoJoystick;

impl JoystickSource for NoJoystick {
    fn poll(&mut self) -> Vec<JoystickEvent> {
        Vec::new()
    }

    fn is_attached(&self) -> bool {
        false
    }

    fn rescan(&mut self) -> Vec<JoystickEvent> {
        Vec::new()
    }
}

/// Open the platform gamepad backend, falling back to [`NoJoystick`].
#[must_use]
pub fn open_joystick() -> Box<dyn JoystickSource> {
    match GilrsJoystick::new() {
        Ok(joystick) => Box::new(joystick),
        Err(e) => {
            warn!("Gamepad support unavailable: {}", e);
            Box::new(NoJoystick)
        }
    }
}
