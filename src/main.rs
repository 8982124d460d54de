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

//! Monterey: operator console for a tethered ROV.

mod app;
mod config;
mod controller;
mod dive_timer;
mod error;
mod joystick;
mod status;
mod ui;

use std::path::PathBuf;

use clap::Parser;
use eframe::egui;
use log::{info, warn};

use app::MontereyApp;
use config::AppConfig;
use controller::ControllerHandle;
use error::ConsoleError;

#[derive(Parser, Debug)]
#[command(name = "monterey", version, about = "Operator console for a tethered ROV")]
struct Args {
    /// Vehicle address (host:port), overrides the configured one
    #[arg(short, long)]
    address: Option<String>,

    /// Configuration file to use instead of the platform default
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Start the built-in vehicle simulator and connect to it
    #[arg(long)]
    simulate: bool,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> Result<(), ConsoleError> {
    let args = Args::parse();

    let log_level = match args.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    // RUST_LOG wins over -v
    env_logger::Builder::new()
        .filter_level(log_level)
        .parse_default_env()
        .init();

    let mut config = match AppConfig::load(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            warn!("{}, using defaults", ConsoleError::from(e));
            AppConfig::default()
        }
    };
    if let Some(address) = args.address {
        config.vehicle_address = address;
    }

    info!(
        "Starting Monterey {} (vehicle {}{})",
        env!("CARGO_PKG_VERSION"),
        config.vehicle_address,
        if args.simulate { ", simulated" } else { "" }
    );

    let controller = ControllerHandle::spawn(
        config.clone(),
        args.config.clone(),
        args.simulate,
        Box::new(joystick::open_joystick),
    )?;

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([1280.0, 760.0])
            .with_min_inner_size([960.0, 600.0])
            .with_title(format!("Monterey {}", env!("CARGO_PKG_VERSION"))),
        ..Default::default()
    };

    eframe::run_native(
        "Monterey",
        options,
        Box::new(move |_cc| Ok(Box::new(MontereyApp::new(controller, config, args.config)))),
    )?;

    Ok(())
}
