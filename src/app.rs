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

use std::path::PathBuf;
use std::time::Instant;

use chrono::{DateTime, Local};
use eframe::egui;

use crate::config::AppConfig;
use crate::controller::{ConsoleSnapshot, ControllerCommand, ControllerEvent, ControllerHandle};
use crate::status::{ConsoleStatus, DiagnosticLevel};
use crate::ui::{ControlsPanel, StatusPane, TelemetryPanel};

/// Wall clock as shown in the menu bar, e.g. `03:04:05 pm`
pub fn clock_text(now: DateTime<Local>) -> String {
    now.format("%I:%M:%S %P").to_string()
}

/// Activity log as it reads when the window first opens
fn startup_status(vehicle_address: &str) -> ConsoleStatus {
    let mut status = ConsoleStatus::new();
    status.vehicle_address = vehicle_address.to_string();
    status.add_diagnostic(DiagnosticLevel::Info, "Monterey started...");
    status.add_diagnostic(
        DiagnosticLevel::Info,
        format!("Version: {}", env!("CARGO_PKG_VERSION")),
    );
    // Config was read before the window opened
    status.add_diagnostic(DiagnosticLevel::Info, "Settings loaded");
    status
}

pub struct MontereyApp {
    controller: ControllerHandle,
    config: AppConfig,
    config_path: Option<PathBuf>,
    snapshot: ConsoleSnapshot,
    status: ConsoleStatus,
    status_pane: StatusPane,
    telemetry_panel: TelemetryPanel,
    controls_panel: ControlsPanel,
    show_about: bool,
    // None until the controller reports the joystick for the first time
    joystick_attached: Option<bool>,
}

impl MontereyApp {
    pub fn new(controller: ControllerHandle, config: AppConfig, config_path: Option<PathBuf>) -> Self {
        let snapshot = controller.snapshot();

        let status = startup_status(&snapshot.vehicle_address);

        Self {
            controller,
            config,
            config_path,
            snapshot,
            status,
            status_pane: StatusPane::new(),
            telemetry_panel: TelemetryPanel,
            controls_panel: ControlsPanel,
            show_about: false,
            joystick_attached: None,
        }
    }

    fn process_events(&mut self) {
        for event in self.controller.drain_events() {
            match event {
                ControllerEvent::SettingsSaved(path) => {
                    self.status
                        .add_diagnostic(DiagnosticLevel::Info, format!("Settings saved to {path}"));
                }
                ControllerEvent::LinkChanged { link, alive } => {
                    if alive {
                        self.status
                            .add_diagnostic(DiagnosticLevel::Info, format!("Gained {link}"));
                    } else {
                        self.status
                            .add_diagnostic(DiagnosticLevel::Warning, format!("Lost {link}"));
                    }
                }
                ControllerEvent::JoystickChanged(attached) => {
                    let message = match (self.joystick_attached, attached) {
                        (_, true) => "Joystick attached",
                        (None, false) => "Joystick not attached",
                        (Some(_), false) => "Joystick detached",
                    };
                    let level = if attached {
                        DiagnosticLevel::Info
                    } else {
                        DiagnosticLevel::Warning
                    };
                    self.status.add_diagnostic(level, message);
                    self.joystick_attached = Some(attached);
                }
                ControllerEvent::VehicleConnection(state) => {
                    self.status.vehicle_address = self.snapshot.vehicle_address.clone();
                    self.status.set_connection(state);
                }
                ControllerEvent::Fault(message) => {
                    self.status.add_diagnostic(DiagnosticLevel::Error, message);
                }
            }
        }
    }

    fn send(&mut self, command: ControllerCommand) {
        if !self.controller.send(command) {
            self.status
                .add_diagnostic(DiagnosticLevel::Warning, "Controller busy, command dropped");
        }
    }

    fn reload_settings(&mut self) {
        match AppConfig::load(self.config_path.as_deref()) {
            Ok(config) => {
                self.send(ControllerCommand::ReloadSettings(Box::new(config.clone())));
                self.config = config;
                self.status.add_diagnostic(DiagnosticLevel::Info, "Settings loaded");
            }
            Err(e) => {
                self.status
                    .add_diagnostic(DiagnosticLevel::Error, format!("Failed to load settings: {e}"));
            }
        }
    }

    fn render_menu(&mut self, ctx: &egui::Context, ui: &mut egui::Ui) {
        egui::MenuBar::new().ui(ui, |ui| {
            ui.menu_button("File", |ui| {
                if ui.button("Reload settings").clicked() {
                    self.reload_settings();
                    ui.close();
                }
                if ui.button("Save settings").clicked() {
                    self.send(ControllerCommand::SaveSettings);
                    ui.close();
                }
                ui.separator();
                if ui.button("Exit").clicked() {
                    ctx.send_viewport_cmd(egui::ViewportCommand::Close);
                    ui.close();
                }
            });

            ui.menu_button("Dive", |ui| {
                if ui.button("Start dive timer").clicked() {
                    self.send(ControllerCommand::DiveTimerStart);
                    ui.close();
                }
                if ui.button("Reset dive timer").clicked() {
                    self.send(ControllerCommand::DiveTimerReset);
                    ui.close();
                }
            });

            ui.menu_button("Joystick", |ui| {
                if ui.button("Rescan joysticks").clicked() {
                    self.send(ControllerCommand::RescanJoysticks);
                    ui.close();
                }
            });

            ui.menu_button("Help", |ui| {
                if ui.button("About").clicked() {
                    self.show_about = true;
                    ui.close();
                }
            });

            ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                ui.label(
                    egui::RichText::new(clock_text(Local::now()))
                        .monospace()
                        .color(egui::Color32::from_rgb(200, 200, 200)),
                );
                ui.separator();
                let dive_color = if self.snapshot.dive_running {
                    egui::Color32::from_rgb(100, 200, 220)
                } else {
                    egui::Color32::from_rgb(130, 130, 130)
                };
                ui.label(
                    egui::RichText::new(format!("Dive {}", self.snapshot.dive_time))
                        .monospace()
                        .color(dive_color),
                );
            });
        });
    }

    fn render_about(&mut self, ctx: &egui::Context) {
        egui::Window::new("About Monterey")
            .open(&mut self.show_about)
            .collapsible(false)
            .resizable(false)
            .anchor(egui::Align2::CENTER_CENTER, egui::vec2(0.0, 0.0))
            .show(ctx, |ui| {
                ui.heading(format!("Monterey {}", env!("CARGO_PKG_VERSION")));
                ui.label("Operator console for a tethered ROV.");
                ui.add_space(6.0);
                ui.label(
                    egui::RichText::new(format!("Vehicle: {}", self.snapshot.vehicle_address))
                        .monospace()
                        .size(10.0),
                );
            });
    }
}

impl eframe::App for MontereyApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        let frame_start = Instant::now();
        ctx.request_repaint_after(self.config.refresh_interval());

        if let Some(snapshot) = self.controller.poll_snapshot() {
            self.status.record_frames(snapshot.frames_received);
            self.snapshot = snapshot;
        }
        self.process_events();

        egui::TopBottomPanel::top("menu_bar").show(ctx, |ui| {
            self.render_menu(ctx, ui);
        });

        egui::SidePanel::right("status_panel")
            .resizable(false)
            .exact_width(300.0)
            .show(ctx, |ui| {
                egui::ScrollArea::vertical().show(ui, |ui| {
                    self.status_pane.render(ui, &self.snapshot, &self.status);
                });
            });

        let mut commands = Vec::new();
        egui::SidePanel::left("controls_panel")
            .resizable(false)
            .exact_width(260.0)
            .show(ctx, |ui| {
                commands = self.controls_panel.render(ui, &self.snapshot);
            });

        egui::CentralPanel::default().show(ctx, |ui| {
            self.telemetry_panel.render(ui, &self.snapshot);
        });

        for command in commands {
            self.send(command);
        }

        self.render_about(ctx);

        self.status
            .update_performance(frame_start.elapsed().as_secs_f64() * 1000.0);
    }
}
