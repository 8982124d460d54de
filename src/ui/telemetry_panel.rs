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

//! Sensor readouts, gauges and the depth trace.

use egui_plot::{Line, Plot, PlotPoints};
use rov_link::{LinkStatus, Sensor};

use crate::controller::ConsoleSnapshot;
use crate::ui::{section_header, ERROR_COLOR, LABEL_COLOR, VALUE_COLOR, WARN_COLOR};

/// Full scale of the voltage gauge in volts.
pub const VOLTAGE_GAUGE_MAX: f64 = 50.0;

const TRACE_LIVE_COLOR: egui::Color32 = egui::Color32::from_rgb(80, 160, 255);
const TRACE_STALE_COLOR: egui::Color32 = egui::Color32::from_rgb(120, 120, 120);

/// Compass point for a heading in degrees.
#[must_use]
pub fn cardinal(heading: f64) -> &'static str {
    const POINTS: [&str; 8] = ["N", "NE", "E", "SE", "S", "SW", "W", "NW"];
    let normalized = heading.rem_euclid(360.0);
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, reason = "value is in 0..16")]
    let index = ((normalized + 22.5) / 45.0) as usize % POINTS.len();
    POINTS[index]
}

/// Fraction of full scale, clamped to the gauge range.
#[must_use]
pub fn gauge_fraction(value: f64, max: f64) -> f32 {
    if max <= 0.0 {
        return 0.0;
    }
    #[allow(clippy::cast_possible_truncation, reason = "fraction is in 0..=1")]
    let fraction = (value / max).clamp(0.0, 1.0) as f32;
    fraction
}

#[derive(Debug, Default)]
pub struct TelemetryPanel;

impl TelemetryPanel {
    pub fn render(&self, ui: &mut egui::Ui, snapshot: &ConsoleSnapshot) {
        section_header(ui, "TELEMETRY");

        let vehicle = &snapshot.vehicle;
        egui::Grid::new("readout_grid")
            .num_columns(2)
            .spacing([16.0, 4.0])
            .show(ui, |ui| {
                let depth_color = if snapshot.depth_exceeded {
                    ERROR_COLOR
                } else {
                    VALUE_COLOR
                };
                readout(ui, &vehicle.depth, 2, depth_color);

                let heading = format!(
                    "{:.0}{} {}",
                    vehicle.compass.value,
                    vehicle.compass.config.units,
                    cardinal(vehicle.compass.value)
                );
                ui.label(egui::RichText::new(&vehicle.compass.config.name).color(LABEL_COLOR));
                ui.label(egui::RichText::new(heading).color(VALUE_COLOR).monospace().size(16.0));
                ui.end_row();

                let voltage_color = match snapshot.voltage_status {
                    LinkStatus::Ok => VALUE_COLOR,
                    LinkStatus::Warn => WARN_COLOR,
                    LinkStatus::Error => ERROR_COLOR,
                };
                readout(ui, &vehicle.voltage, 1, voltage_color);
                readout(ui, &vehicle.other0, 1, threshold_color(&vehicle.other0));
                readout(ui, &vehicle.other1, 1, threshold_color(&vehicle.other1));
            });

        ui.add_space(8.0);

        ui.horizontal(|ui| {
            ui.label(egui::RichText::new("Voltage").color(LABEL_COLOR).size(9.0));
            ui.add(
                egui::ProgressBar::new(gauge_fraction(vehicle.voltage.value, VOLTAGE_GAUGE_MAX))
                    .desired_width(220.0)
                    .text(format!("{:.1} / {:.0} V", vehicle.voltage.value, VOLTAGE_GAUGE_MAX)),
            );
        });

        ui.horizontal(|ui| {
            ui.label(egui::RichText::new("Depth  ").color(LABEL_COLOR).size(9.0));
            let fill = if snapshot.depth_exceeded { ERROR_COLOR } else { TRACE_LIVE_COLOR };
            ui.add(
                egui::ProgressBar::new(gauge_fraction(vehicle.depth.value, vehicle.depth.config.max))
                    .desired_width(220.0)
                    .fill(fill)
                    .text(format!(
                        "{:.1} / {:.0} {}",
                        vehicle.depth.value, vehicle.depth.config.max, vehicle.depth.config.units
                    )),
            );
        });

        ui.add_space(8.0);

        self.render_depth_trace(ui, snapshot);
    }

    fn render_depth_trace(&self, ui: &mut egui::Ui, snapshot: &ConsoleSnapshot) {
        let color = if snapshot.tibo == LinkStatus::Ok {
            TRACE_LIVE_COLOR
        } else {
            TRACE_STALE_COLOR
        };

        let depth = &snapshot.vehicle.depth.config;
        let span = snapshot
            .depth_trace
            .first()
            .map_or(0.0, |first| first[0])
            .min(-1.0);
        let points: PlotPoints = snapshot.depth_trace.iter().copied().collect();

        Plot::new("depth_trace")
            .height(180.0)
            .include_x(span)
            .include_x(0.0)
            .include_y(0.0)
            .include_y(-depth.max)
            .x_axis_label("s")
            .y_axis_label(depth.units.clone())
            .allow_drag(false)
            .allow_zoom(false)
            .allow_scroll(false)
            .show(ui, |plot_ui| {
                plot_ui.line(Line::new(depth.name.as_str(), points).color(color).fill(0.0));
            });
    }
}

fn readout(ui: &mut egui::Ui, sensor: &Sensor, precision: usize, color: egui::Color32) {
    ui.label(egui::RichText::new(&sensor.config.name).color(LABEL_COLOR));
    ui.label(
        egui::RichText::new(format!(
            "{:.*} {}",
            precision, sensor.value, sensor.config.units
        ))
        .color(color)
        .monospace()
        .size(16.0),
    );
    ui.end_row();
}

fn threshold_color(sensor: &Sensor) -> egui::Color32 {
    if sensor.exceeds_threshold() {
        WARN_COLOR
    } else {
        VALUE_COLOR
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cardinal_points() {
        assert_eq!(cardinal(0.0), "N");
        assert_eq!(cardinal(359.0), "N");
        assert_eq!(cardinal(44.0), "NE");
        assert_eq!(cardinal(90.0), "E");
        assert_eq!(cardinal(200.0), "S");
        assert_eq!(cardinal(-90.0), "W");
        assert_eq!(cardinal(720.0 + 315.0), "NW");
    }

    #[test]
    fn test_gauge_fraction_clamps() {
        assert!((gauge_fraction(25.0, VOLTAGE_GAUGE_MAX) - 0.5).abs() < f32::EPSILON);
        assert!((gauge_fraction(80.0, VOLTAGE_GAUGE_MAX) - 1.0).abs() < f32::EPSILON);
        assert!(gauge_fraction(-3.0, 10.0).abs() < f32::EPSILON);
        assert!(gauge_fraction(5.0, 0.0).abs() < f32::EPSILON);
    }
}
