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

//! UI components for the Monterey console.
//!
//! Each panel renders from a [`ConsoleSnapshot`](crate::controller::ConsoleSnapshot)
//! and returns the commands the operator issued, leaving it to the app to
//! hand them to the controller.

pub mod controls_panel;
pub mod status_pane;
pub mod telemetry_panel;

pub use controls_panel::ControlsPanel;
pub use status_pane::StatusPane;
pub use telemetry_panel::TelemetryPanel;

use egui::Color32;

pub const HEADER_COLOR: Color32 = Color32::from_rgb(150, 150, 150);
pub const LABEL_COLOR: Color32 = Color32::from_rgb(130, 130, 130);
pub const VALUE_COLOR: Color32 = Color32::from_rgb(200, 200, 200);
pub const OK_COLOR: Color32 = Color32::from_rgb(100, 255, 100);
pub const WARN_COLOR: Color32 = Color32::from_rgb(255, 200, 100);
pub const ERROR_COLOR: Color32 = Color32::from_rgb(255, 100, 100);

/// Small section header in the style used across the panels
pub fn section_header(ui: &mut egui::Ui, title: &str) {
    ui.label(egui::RichText::new(title).color(HEADER_COLOR).size(10.0).strong());
    ui.add_space(3.0);
}
