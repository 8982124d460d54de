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

use rov_link::{Relay, Servo};

use crate::controller::{ConsoleSnapshot, ControllerCommand};
use crate::ui::{section_header, LABEL_COLOR, OK_COLOR, WARN_COLOR};

/// Relay toggles and servo sliders
#[derive(Debug, Default)]
pub struct ControlsPanel;

impl ControlsPanel {
    /// Render the controls and return the commands the operator issued
    pub fn render(&self, ui: &mut egui::Ui, snapshot: &ConsoleSnapshot) -> Vec<ControllerCommand> {
        let mut commands = Vec::new();

        section_header(ui, "RELAYS");
        ui.horizontal_wrapped(|ui| {
            for (id, relay) in snapshot.vehicle.relays().iter().enumerate() {
                let mut on = relay.state;
                if ui
                    .toggle_value(&mut on, relay.name.as_str())
                    .on_hover_text(reported_relay(relay))
                    .changed()
                {
                    commands.push(ControllerCommand::SetRelay { id, on });
                }
            }
        });

        ui.add_space(8.0);

        section_header(ui, "SERVOS");
        egui::Grid::new("servo_grid")
            .num_columns(3)
            .spacing([12.0, 6.0])
            .show(ui, |ui| {
                for (id, servo) in snapshot.vehicle.servos().iter().enumerate() {
                    ui.label(egui::RichText::new(&servo.name).color(LABEL_COLOR));

                    let mut value = servo.value;
                    if ui
                        .add(egui::Slider::new(&mut value, servo.min..=servo.max))
                        .changed()
                    {
                        commands.push(ControllerCommand::SetServo { id, value });
                    }

                    let (text, color) = reported_servo(servo);
                    ui.label(egui::RichText::new(text).color(color).size(9.0).monospace());
                    ui.end_row();
                }
            });

        commands
    }
}

fn reported_relay(relay: &Relay) -> String {
    match relay.reported {
        Some(true) => "Vehicle reports on".to_string(),
        Some(false) => "Vehicle reports off".to_string(),
        None => "No report from vehicle".to_string(),
    }
}

/// Vehicle-reported position, highlighted while it lags the command
fn reported_servo(servo: &Servo) -> (String, egui::Color32) {
    match servo.reported {
        Some(reported) if reported == servo.value => (format!("@{reported}"), OK_COLOR),
        Some(reported) => (format!("@{reported}"), WARN_COLOR),
        None => ("@--".to_string(), LABEL_COLOR),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn servo(value: i32, reported: Option<i32>) -> Servo {
        Servo {
            name: "Tilt".to_string(),
            value,
            min: 0,
            max: 100,
            reported,
        }
    }

    #[test]
    fn test_reported_servo_lag() {
        assert_eq!(reported_servo(&servo(50, Some(50))), ("@50".to_string(), OK_COLOR));
        assert_eq!(reported_servo(&servo(55, Some(50))), ("@50".to_string(), WARN_COLOR));
        assert_eq!(reported_servo(&servo(55, None)).0, "@--");
    }

    #[test]
    fn test_reported_relay_text() {
        let relay = Relay {
            name: "Lights".to_string(),
            state: true,
            reported: None,
        };
        assert_eq!(reported_relay(&relay), "No report from vehicle");
    }
}
