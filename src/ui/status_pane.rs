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

use rov_link::{ConnectionState, LinkStatus};

use crate::controller::ConsoleSnapshot;
use crate::status::{ConsoleStatus, DiagnosticLevel};
use crate::ui::{section_header, ERROR_COLOR, LABEL_COLOR, OK_COLOR, VALUE_COLOR, WARN_COLOR};

/// Unlit lamp color
const LED_OFF: egui::Color32 = egui::Color32::from_rgb(45, 50, 55);

const LED_RADIUS: f32 = 5.0;

/// Indicator lamps, link metrics and the activity log
pub struct StatusPane {
    pub show_all_diagnostics: bool,
}

impl Default for StatusPane {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusPane {
    pub fn new() -> Self {
        Self {
            show_all_diagnostics: false,
        }
    }

    pub fn render(&mut self, ui: &mut egui::Ui, snapshot: &ConsoleSnapshot, status: &ConsoleStatus) {
        self.render_indicator_section(ui, snapshot);

        ui.add_space(6.0);

        self.render_connection_section(ui, snapshot, status);

        ui.add_space(6.0);

        self.render_metrics_section(ui, snapshot, status);

        ui.add_space(6.0);

        self.render_diagnostics_section(ui, status);
    }

    fn render_indicator_section(&self, ui: &mut egui::Ui, snapshot: &ConsoleSnapshot) {
        section_header(ui, "INDICATORS");

        egui::Grid::new("indicator_grid")
            .num_columns(2)
            .spacing([12.0, 4.0])
            .show(ui, |ui| {
                let rows = [
                    ("Joystick", LinkStatus::from_required(snapshot.joystick_attached)),
                    ("TIBO", snapshot.tibo),
                    ("TOBI", snapshot.tobi),
                    ("Voltage", snapshot.voltage_status),
                    ("ERROR", snapshot.aggregate),
                ];
                for (name, status) in rows {
                    let text = egui::RichText::new(name).size(9.0).monospace();
                    let text = if name == "ERROR" {
                        text.color(VALUE_COLOR).strong()
                    } else {
                        text.color(LABEL_COLOR)
                    };
                    ui.label(text).on_hover_text(status.label());
                    led_row(ui, status);
                    ui.end_row();
                }
            });
    }

    fn render_connection_section(
        &self,
        ui: &mut egui::Ui,
        snapshot: &ConsoleSnapshot,
        status: &ConsoleStatus,
    ) {
        section_header(ui, "VEHICLE");

        // Connection status with colored indicator
        ui.horizontal(|ui| {
            let (status_color, status_text, status_icon) = match &snapshot.connection {
                ConnectionState::Connected => (OK_COLOR, "CONNECTED", "●"),
                ConnectionState::Connecting => (WARN_COLOR, "CONNECTING", "◐"),
                ConnectionState::Disconnected => {
                    (egui::Color32::from_rgb(150, 150, 150), "DISCONNECTED", "○")
                }
                ConnectionState::Error(_) => (ERROR_COLOR, "ERROR", "✕"),
            };

            ui.label(egui::RichText::new(status_icon).color(status_color).size(10.0));

            ui.label(
                egui::RichText::new(status_text)
                    .color(status_color)
                    .size(10.0)
                    .monospace()
                    .strong(),
            );
        });

        ui.label(
            egui::RichText::new(&snapshot.vehicle_address)
                .color(egui::Color32::from_rgb(180, 180, 180))
                .size(8.0)
                .monospace(),
        );

        let uptime = status.connection_uptime_seconds();
        if uptime > 0 {
            metric_row(ui, "Uptime:", format_duration(uptime));
        }
    }

    fn render_metrics_section(
        &self,
        ui: &mut egui::Ui,
        snapshot: &ConsoleSnapshot,
        status: &ConsoleStatus,
    ) {
        section_header(ui, "METRICS");

        metric_row(ui, "Frames in:", snapshot.frames_received.to_string());
        metric_row(ui, "Rate:", format!("{:.1}/s", status.frames_per_second));
        render_sparkline(ui, status);
        metric_row(ui, "Frames out:", snapshot.frames_sent.to_string());
        if snapshot.parse_errors > 0 {
            ui.horizontal(|ui| {
                ui.label(egui::RichText::new("Malformed:").color(LABEL_COLOR).size(9.0));
                ui.label(
                    egui::RichText::new(snapshot.parse_errors.to_string())
                        .color(WARN_COLOR)
                        .size(9.0)
                        .monospace(),
                );
            });
        }
        metric_row(
            ui,
            "Frame:",
            format!(
                "{:.1}ms (last {:.1}ms)",
                status.average_update_duration_ms, status.last_update_duration_ms
            ),
        );
    }

    fn render_diagnostics_section(&mut self, ui: &mut egui::Ui, status: &ConsoleStatus) {
        ui.horizontal(|ui| {
            section_header(ui, "ACTIVITY");
            ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                ui.checkbox(
                    &mut self.show_all_diagnostics,
                    egui::RichText::new("all").size(8.0),
                )
                .on_hover_text("Show the full activity log");
            });
        });

        if status.diagnostics.is_empty() {
            ui.label(
                egui::RichText::new("No messages")
                    .color(egui::Color32::from_rgb(100, 100, 100))
                    .size(8.0)
                    .italics(),
            );
            return;
        }

        let line_height = 14.0;
        let max_visible_lines = if self.show_all_diagnostics { 30.0 } else { 10.0 };

        egui::ScrollArea::vertical()
            .max_height(line_height * max_visible_lines)
            .auto_shrink([false, true])
            .show(ui, |ui| {
                // Newest first
                for diagnostic in status.diagnostics.iter().rev() {
                    ui.horizontal(|ui| {
                        let (icon, color) = match diagnostic.level {
                            DiagnosticLevel::Info => ("ℹ", egui::Color32::from_rgb(100, 180, 255)),
                            DiagnosticLevel::Warning => ("⚠", WARN_COLOR),
                            DiagnosticLevel::Error => ("✕", ERROR_COLOR),
                        };

                        ui.label(egui::RichText::new(icon).color(color).size(9.0));

                        let time_str = diagnostic.timestamp.format("%H:%M:%S").to_string();
                        ui.label(
                            egui::RichText::new(time_str)
                                .color(egui::Color32::from_rgb(100, 100, 100))
                                .size(8.0)
                                .monospace(),
                        );

                        ui.label(
                            egui::RichText::new(&diagnostic.message)
                                .color(egui::Color32::from_rgb(180, 180, 180))
                                .size(8.0),
                        );
                    });
                }
            });
    }
}

/// Green, yellow and red lamp colors with only the one matching `status` lit
pub fn led_colors(status: LinkStatus) -> [egui::Color32; 3] {
    let mut lamps = [LED_OFF; 3];
    match status {
        LinkStatus::Ok => lamps[0] = OK_COLOR,
        LinkStatus::Warn => lamps[1] = WARN_COLOR,
        LinkStatus::Error => lamps[2] = ERROR_COLOR,
    }
    lamps
}

fn led_row(ui: &mut egui::Ui, status: LinkStatus) {
    ui.horizontal(|ui| {
        for color in led_colors(status) {
            let (rect, _) = ui.allocate_exact_size(
                egui::vec2(LED_RADIUS * 2.0 + 2.0, LED_RADIUS * 2.0 + 2.0),
                egui::Sense::hover(),
            );
            ui.painter().circle_filled(rect.center(), LED_RADIUS, color);
        }
    });
}

/// Frames-per-second history, oldest on the left
fn render_sparkline(ui: &mut egui::Ui, status: &ConsoleStatus) {
    let width = 120.0;
    let height = 18.0;

    let (rect, _response) = ui.allocate_exact_size(egui::vec2(width, height), egui::Sense::hover());

    // The newest bucket is still filling, leave it out
    let stable = status.frame_history.len().saturating_sub(1);
    if stable < 2 {
        return;
    }

    #[allow(clippy::cast_precision_loss, reason = "per-second frame counts are small")]
    let max_count = status
        .frame_history
        .iter()
        .take(stable)
        .map(|(_, count)| *count)
        .max()
        .unwrap_or(1)
        .max(1) as f32;

    #[allow(clippy::cast_precision_loss, reason = "per-second frame counts are small")]
    let points: Vec<egui::Pos2> = status
        .frame_history
        .iter()
        .take(stable)
        .enumerate()
        .map(|(i, (_, count))| {
            let x = rect.min.x + (i as f32 / (stable - 1) as f32) * width;
            let y = rect.max.y - (*count as f32 / max_count) * height;
            egui::pos2(x, y)
        })
        .collect();

    ui.painter().add(egui::Shape::line(
        points,
        egui::Stroke::new(1.5, egui::Color32::from_rgb(100, 220, 220)),
    ));
}

fn metric_row(ui: &mut egui::Ui, label: &str, value: String) {
    ui.horizontal(|ui| {
        ui.label(egui::RichText::new(label).color(LABEL_COLOR).size(9.0));
        ui.label(egui::RichText::new(value).color(VALUE_COLOR).size(9.0).monospace());
    });
}

fn format_duration(seconds: u64) -> String {
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;

    if hours > 0 {
        format!("{}h {}m {}s", hours, minutes, secs)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, secs)
    } else {
        format!("{}s", secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_one_lamp_lit_per_status() {
        assert_eq!(led_colors(LinkStatus::Ok), [OK_COLOR, LED_OFF, LED_OFF]);
        assert_eq!(led_colors(LinkStatus::Warn), [LED_OFF, WARN_COLOR, LED_OFF]);
        assert_eq!(led_colors(LinkStatus::Error), [LED_OFF, LED_OFF, ERROR_COLOR]);
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(42), "42s");
        assert_eq!(format_duration(125), "2m 5s");
        assert_eq!(format_duration(3_725), "1h 2m 5s");
    }
}
