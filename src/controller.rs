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

//! Vehicle controller worker.
//!
//! The controller owns the vehicle model and runs on its own thread with a
//! tokio runtime. The UI talks to it through a [`ControllerHandle`]:
//! commands go in over a bounded queue, events come back over another, and
//! the latest [`ConsoleSnapshot`] is published through a watch channel so
//! the UI only ever sees the newest state and never blocks on the worker.

use std::path::PathBuf;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use log::{debug, error, info, warn};
use rov_link::{
    compute_aggregate, encode_control_frame, Connection, ConnectionConfig, ConnectionEvent,
    ConnectionState, EdgeDetector, LineParser, Link, LinkMonitor, LinkStatus, LinkTransition,
    Protocol, ServoDirection, Simulator, SimulatorConfig, TelemetryWindow, VehicleMessage,
    VehicleState,
};
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::config::AppConfig;
use crate::dive_timer::DiveTimer;
use crate::error::ConsoleError;
use crate::joystick::{JoystickAction, JoystickEvent, JoystickSource};

const COMMAND_QUEUE_SIZE: usize = 64;
const EVENT_QUEUE_SIZE: usize = 256;

/// Builds the joystick source on the worker thread.
pub type JoystickFactory = Box<dyn FnOnce() -> Box<dyn JoystickSource> + Send>;

/// Requests from the UI to the controller.
#[derive(Debug, Clone)]
pub enum ControllerCommand {
    SetRelay { id: usize, on: bool },
    ToggleRelay(usize),
    SetServo { id: usize, value: i32 },
    NudgeServo { id: usize, direction: ServoDirection },
    DiveTimerStart,
    DiveTimerReset,
    RescanJoysticks,
    ReloadSettings(Box<AppConfig>),
    SaveSettings,
    Shutdown,
}

/// Notifications from the controller to the UI.
#[derive(Debug, Clone, PartialEq)]
pub enum ControllerEvent {
    /// Settings were written to the given path.
    SettingsSaved(String),
    LinkChanged { link: Link, alive: bool },
    JoystickChanged(bool),
    VehicleConnection(ConnectionState),
    Fault(String),
}

/// Immutable copy of controller state published for the UI.
#[derive(Debug, Clone)]
pub struct ConsoleSnapshot {
    pub vehicle: VehicleState,
    pub vehicle_address: String,
    pub connection: ConnectionState,
    pub joystick_attached: bool,
    pub tibo: LinkStatus,
    pub tobi: LinkStatus,
    pub voltage_status: LinkStatus,
    pub aggregate: LinkStatus,
    pub depth_exceeded: bool,
    /// Depth trace points, `[seconds before this snapshot, -depth]`.
    pub depth_trace: Vec<[f64; 2]>,
    pub dive_time: String,
    pub dive_running: bool,
    pub frames_received: u64,
    pub frames_sent: u64,
    pub parse_errors: u64,
}

impl ConsoleSnapshot {
    /// Snapshot shown before the worker publishes its first one.
    #[must_use]
    pub fn initial(config: &AppConfig) -> Self {
        let vehicle = VehicleState::new(&config.vehicle);
        let voltage_status = vehicle.voltage_status();
        Self {
            vehicle,
            vehicle_address: config.vehicle_address.clone(),
            connection: ConnectionState::Disconnected,
            joystick_attached: false,
            tibo: LinkStatus::Error,
            tobi: LinkStatus::Error,
            voltage_status,
            aggregate: compute_aggregate(false, false, false, voltage_status),
            depth_exceeded: false,
            depth_trace: Vec::new(),
            dive_time: DiveTimer::new().display(Instant::now()),
            dive_running: false,
            frames_received: 0,
            frames_sent: 0,
            parse_errors: 0,
        }
    }
}

/// UI-side handle to the controller worker thread.
pub struct ControllerHandle {
    command_tx: mpsc::Sender<ControllerCommand>,
    event_rx: mpsc::Receiver<ControllerEvent>,
    snapshot_rx: watch::Receiver<ConsoleSnapshot>,
    cancel_token: CancellationToken,
    worker: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for ControllerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControllerHandle")
            .field("running", &self.worker.is_some())
            .finish_non_exhaustive()
    }
}

impl ControllerHandle {
    /// Start the controller on a dedicated thread.
    ///
    /// With `simulate` set, an in-process vehicle simulator is started and
    /// the controller connects to it instead of the configured address.
    pub fn spawn(
        config: AppConfig,
        config_path: Option<PathBuf>,
        simulate: bool,
        joystick: JoystickFactory,
    ) -> Result<Self, ConsoleError> {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_QUEUE_SIZE);
        let (event_tx, event_rx) = mpsc::channel(EVENT_QUEUE_SIZE);
        let (snapshot_tx, snapshot_rx) = watch::channel(ConsoleSnapshot::initial(&config));
        let cancel_token = CancellationToken::new();

        let worker_cancel = cancel_token.clone();
        let worker = std::thread::Builder::new()
            .name("rov-controller".to_string())
            .spawn(move || {
                let rt = match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(rt) => rt,
                    Err(e) => {
                        error!("Failed to start controller runtime: {}", e);
                        return;
                    }
                };
                rt.block_on(async move {
                    let controller = RovController::new(config, config_path, joystick(), event_tx);
                    controller
                        .run(command_rx, snapshot_tx, worker_cancel, simulate)
                        .await;
                });
                info!("Controller worker stopped");
            })?;

        Ok(Self {
            command_tx,
            event_rx,
            snapshot_rx,
            cancel_token,
            worker: Some(worker),
        })
    }

    /// Queue a command without blocking. Returns `false` if it was dropped.
    pub fn send(&self, command: ControllerCommand) -> bool {
        match self.command_tx.try_send(command) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(command)) => {
                debug!("Command queue full, dropping {:?}", command);
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }

    /// Take every event that arrived since the last call.
    pub fn drain_events(&mut self) -> Vec<ControllerEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.event_rx.try_recv() {
            events.push(event);
        }
        events
    }

    /// Newest published snapshot.
    #[must_use]
    pub fn snapshot(&self) -> ConsoleSnapshot {
        self.snapshot_rx.borrow().clone()
    }

    /// The snapshot published since the last call, if the worker processed
    /// new data in between.
    pub fn poll_snapshot(&mut self) -> Option<ConsoleSnapshot> {
        match self.snapshot_rx.has_changed() {
            Ok(true) => Some(self.snapshot_rx.borrow_and_update().clone()),
            Ok(false) | Err(_) => None,
        }
    }

    /// Stop the worker and wait for its thread to exit.
    pub fn shutdown(&mut self) {
        let _ = self.command_tx.try_send(ControllerCommand::Shutdown);
        self.cancel_token.cancel();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                error!("Controller worker panicked");
            }
        }
    }
}

impl Drop for ControllerHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// State owned by the worker thread.
struct RovController {
    config: AppConfig,
    config_path: Option<PathBuf>,
    vehicle: VehicleState,
    parser: LineParser,
    tibo: LinkMonitor,
    tobi: LinkMonitor,
    joystick: Box<dyn JoystickSource>,
    joystick_edge: EdgeDetector,
    dive_timer: DiveTimer,
    window: TelemetryWindow,
    connection_state: ConnectionState,
    vehicle_address: String,
    frames_received: u64,
    frames_sent: u64,
    parse_errors: u64,
    events: mpsc::Sender<ControllerEvent>,
}

impl RovController {
    fn new(
        config: AppConfig,
        config_path: Option<PathBuf>,
        joystick: Box<dyn JoystickSource>,
        events: mpsc::Sender<ControllerEvent>,
    ) -> Self {
        let attached = joystick.is_attached();
        let controller = Self {
            vehicle: VehicleState::new(&config.vehicle),
            parser: LineParser::new(),
            tibo: LinkMonitor::new(Link::Tibo, config.link_timeout()),
            tobi: LinkMonitor::new(Link::Tobi, config.link_timeout()),
            joystick,
            joystick_edge: EdgeDetector::new(attached),
            dive_timer: DiveTimer::new(),
            window: TelemetryWindow::new(
                config.depth_window(),
                rov_link::telemetry::DEFAULT_WINDOW_CAPACITY,
            ),
            connection_state: ConnectionState::Disconnected,
            vehicle_address: config.vehicle_address.clone(),
            frames_received: 0,
            frames_sent: 0,
            parse_errors: 0,
            config,
            config_path,
            events,
        };
        controller.emit(ControllerEvent::JoystickChanged(attached));
        controller
    }

    fn emit(&self, event: ControllerEvent) {
        if let Err(mpsc::error::TrySendError::Full(event)) = self.events.try_send(event) {
            warn!("Event queue full, dropping {:?}", event);
        }
    }

    fn fault(&self, message: String) {
        warn!("{}", message);
        self.emit(ControllerEvent::Fault(message));
    }

    /// Handle one line received from the vehicle.
    fn handle_line(&mut self, line: &[u8], now: Instant) {
        let message = match self.parser.parse(line) {
            Ok(Some(message)) => message,
            Ok(None) => return,
            Err(e) => {
                self.parse_errors += 1;
                debug!("Dropping malformed line {:?}: {}", String::from_utf8_lossy(line), e);
                return;
            }
        };

        self.frames_received += 1;
        self.tibo.beat(now);

        if let VehicleMessage::Ack { seq } = message {
            if self.vehicle.acknowledge(seq) {
                self.tobi.beat(now);
            }
            return;
        }

        if let Err(e) = self.vehicle.apply(&message, now) {
            self.fault(format!("Vehicle reported {}: {}", message.kind(), e));
            return;
        }

        if let Some(sample) = self.vehicle.last_sample() {
            if matches!(message, VehicleMessage::Telemetry { .. }) {
                self.window.push(sample.clone());
            }
        }
    }

    fn handle_connection_state(&mut self, state: ConnectionState) {
        if state == self.connection_state {
            return;
        }
        info!("Vehicle link {}", state);
        self.connection_state = state.clone();
        self.emit(ControllerEvent::VehicleConnection(state));
    }

    fn handle_command(&mut self, command: ControllerCommand, now: Instant) {
        let result = match command {
            ControllerCommand::SetRelay { id, on } => self.vehicle.set_relay(id, on),
            ControllerCommand::ToggleRelay(id) => self.vehicle.toggle_relay(id).map(|_| ()),
            ControllerCommand::SetServo { id, value } => self.vehicle.set_servo(id, value).map(|_| ()),
            ControllerCommand::NudgeServo { id, direction } => {
                self.vehicle.nudge_servo(id, direction).map(|_| ())
            }
            ControllerCommand::DiveTimerStart => {
                self.dive_timer.start(now);
                Ok(())
            }
            ControllerCommand::DiveTimerReset => {
                self.dive_timer.reset();
                Ok(())
            }
            ControllerCommand::RescanJoysticks => {
                let events = self.joystick.rescan();
                self.handle_joystick(events);
                Ok(())
            }
            ControllerCommand::ReloadSettings(config) => {
                self.apply_config(*config);
                Ok(())
            }
            ControllerCommand::SaveSettings => {
                self.save_settings();
                Ok(())
            }
            ControllerCommand::Shutdown => Ok(()),
        };

        if let Err(e) = result {
            self.fault(format!("Command rejected: {e}"));
        }
    }

    fn apply_config(&mut self, config: AppConfig) {
        self.vehicle.apply_config(&config.vehicle);
        self.tibo.set_timeout(config.link_timeout());
        self.tobi.set_timeout(config.link_timeout());
        self.window.set_span(config.depth_window());
        self.config = config;
        info!("Controller settings reloaded");
    }

    fn save_settings(&self) {
        match self.config.save(self.config_path.as_deref()) {
            Ok(path) => {
                let path = path.display().to_string();
                info!("Settings saved to {}", path);
                self.emit(ControllerEvent::SettingsSaved(path));
            }
            Err(e) => self.fault(format!("Failed to save settings: {e}")),
        }
    }

    /// Translate joystick input into vehicle commands.
    fn handle_joystick(&mut self, events: Vec<JoystickEvent>) {
        for event in events {
            match event {
                JoystickEvent::Pressed(button) => {
                    let result = match self.config.joystick.action_for(button) {
                        Some(JoystickAction::ToggleRelay(id)) => {
                            self.vehicle.toggle_relay(id).map(|_| ())
                        }
                        Some(JoystickAction::NudgeServo { id, direction }) => {
                            self.vehicle.nudge_servo(id, direction).map(|_| ())
                        }
                        None => Ok(()),
                    };
                    if let Err(e) = result {
                        self.fault(format!("Joystick binding for {button:?}: {e}"));
                    }
                }
                JoystickEvent::Attached(name) => info!("Joystick attached: {}", name),
                JoystickEvent::Detached => warn!("Joystick detached"),
            }
        }

        if let Some(transition) = self.joystick_edge.update(self.joystick.is_attached()) {
            self.emit(ControllerEvent::JoystickChanged(
                transition == LinkTransition::Gained,
            ));
        }
    }

    /// Processing tick: poll input and link monitors.
    fn tick(&mut self, now: Instant) {
        let events = self.joystick.poll();
        self.handle_joystick(events);

        let edges: Vec<_> = [&mut self.tibo, &mut self.tobi]
            .into_iter()
            .filter_map(|monitor| Some((monitor.link(), monitor.poll(now)?)))
            .collect();
        for (link, transition) in edges {
            self.emit(ControllerEvent::LinkChanged {
                link,
                alive: transition == LinkTransition::Gained,
            });
        }

        self.window.advance(now);
    }

    /// Next control frame, encoded for the wire.
    fn control_line(&mut self) -> String {
        encode_control_frame(&self.vehicle.next_control_frame())
    }

    fn snapshot(&self, now: Instant) -> ConsoleSnapshot {
        let joystick_attached = self.joystick_edge.level();
        let voltage_status = self.vehicle.voltage_status();
        ConsoleSnapshot {
            vehicle: self.vehicle.clone(),
            vehicle_address: self.vehicle_address.clone(),
            connection: self.connection_state.clone(),
            joystick_attached,
            tibo: self.tibo.status(),
            tobi: self.tobi.status(),
            voltage_status,
            aggregate: compute_aggregate(
                joystick_attached,
                self.tibo.is_alive(),
                self.tobi.is_alive(),
                voltage_status,
            ),
            depth_exceeded: self.vehicle.depth_exceeded(),
            depth_trace: self.window.depth_points(now),
            dive_time: self.dive_timer.display(now),
            dive_running: self.dive_timer.is_running(),
            frames_received: self.frames_received,
            frames_sent: self.frames_sent,
            parse_errors: self.parse_errors,
        }
    }

    async fn run(
        mut self,
        mut commands: mpsc::Receiver<ControllerCommand>,
        snapshot_tx: watch::Sender<ConsoleSnapshot>,
        cancel_token: CancellationToken,
        simulate: bool,
    ) {
        // Held for the lifetime of the loop; dropping it stops the simulator
        let mut _simulator = None;
        if simulate {
            match Simulator::spawn(SimulatorConfig::default()).await {
                Ok(simulator) => {
                    self.vehicle_address = simulator.local_addr().to_string();
                    _simulator = Some(simulator);
                }
                Err(e) => self.fault(format!("Failed to start vehicle simulator: {e}")),
            }
        }

        let mut connection = Connection::spawn(ConnectionConfig {
            address: self.vehicle_address.clone(),
            reconnect_delay: self.config.reconnect_delay(),
            ..ConnectionConfig::default()
        });

        let mut control_period = self.config.control_interval();
        let mut control = new_interval(control_period);
        let mut refresh_period = self.config.refresh_interval();
        let mut refresh = new_interval(refresh_period);

        info!("Controller running, vehicle at {}", self.vehicle_address);

        loop {
            tokio::select! {
                event = connection.recv() => {
                    match event {
                        Some(ConnectionEvent::DataReceived(line)) => {
                            self.handle_line(&line, Instant::now());
                        }
                        Some(ConnectionEvent::StateChanged(state)) => {
                            self.handle_connection_state(state);
                        }
                        None => {
                            error!("Vehicle connection task ended");
                            break;
                        }
                    }
                }

                command = commands.recv() => {
                    let Some(command) = command else { break };
                    if matches!(command, ControllerCommand::Shutdown) {
                        break;
                    }
                    self.handle_command(command, Instant::now());

                    if !simulate && self.config.vehicle_address != self.vehicle_address {
                        self.vehicle_address = self.config.vehicle_address.clone();
                        connection.set_address(self.vehicle_address.clone());
                    }
                    if self.config.control_interval() != control_period {
                        control_period = self.config.control_interval();
                        control = new_interval(control_period);
                    }
                    if self.config.refresh_interval() != refresh_period {
                        refresh_period = self.config.refresh_interval();
                        refresh = new_interval(refresh_period);
                    }
                }

                _ = control.tick() => {
                    if self.connection_state == ConnectionState::Connected {
                        let line = self.control_line();
                        if connection.send_line(line) {
                            self.frames_sent += 1;
                        }
                    }
                }

                _ = refresh.tick() => {
                    let now = Instant::now();
                    self.tick(now);
                    snapshot_tx.send_replace(self.snapshot(now));
                }

                () = cancel_token.cancelled() => break,
            }
        }

        connection.shutdown();
        info!("Controller loop exited");
    }
}

fn new_interval(period: Duration) -> tokio::time::Interval {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    interval
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::joystick::{ButtonBinding, NoJoystick};
    use std::sync::{Arc, Mutex};

    /// Joystick fed from a shared script by the test.
    #[derive(Default, Clone)]
    struct ScriptedJoystick {
        pending: Arc<Mutex<Vec<JoystickEvent>>>,
        attached: Arc<Mutex<bool>>,
    }

    impl JoystickSource for ScriptedJoystick {
        fn poll(&mut self) -> Vec<JoystickEvent> {
            std::mem::take(&mut *self.pending.lock().unwrap())
        }

        fn is_attached(&self) -> bool {
            *self.attached.lock().unwrap()
        }

        fn rescan(&mut self) -> Vec<JoystickEvent> {
            Vec::new()
        }
    }

    fn controller_with(
        joystick: Box<dyn JoystickSource>,
    ) -> (RovController, mpsc::Receiver<ControllerEvent>) {
        let (tx, rx) = mpsc::channel(64);
        let controller = RovController::new(AppConfig::default(), None, joystick, tx);
        (controller, rx)
    }

    fn drain(rx: &mut mpsc::Receiver<ControllerEvent>) -> Vec<ControllerEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[test]
    fn test_reports_initial_joystick_state() {
        let (_controller, mut rx) = controller_with(Box::new(NoJoystick));
        assert_eq!(drain(&mut rx), vec![ControllerEvent::JoystickChanged(false)]);
    }

    #[test]
    fn test_telemetry_beats_tibo_and_fills_trace() {
        let (mut controller, mut rx) = controller_with(Box::new(NoJoystick));
        drain(&mut rx);

        let now = Instant::now();
        controller.handle_line(b"TEL,9.2,180,12.5,14,30", now);
        controller.tick(now);

        assert_eq!(
            drain(&mut rx),
            vec![ControllerEvent::LinkChanged {
                link: Link::Tibo,
                alive: true
            }]
        );

        let snapshot = controller.snapshot(now);
        assert_eq!(snapshot.tibo, LinkStatus::Ok);
        assert_eq!(snapshot.tobi, LinkStatus::Error);
        assert!(snapshot.depth_exceeded);
        assert_eq!(snapshot.depth_trace.len(), 1);
        assert_eq!(snapshot.frames_received, 1);
        // No joystick and no TOBI
        assert_eq!(snapshot.aggregate, LinkStatus::Error);
    }

    #[test]
    fn test_ack_beats_tobi_only_for_sent_frames() {
        let (mut controller, mut rx) = controller_with(Box::new(NoJoystick));
        drain(&mut rx);
        let now = Instant::now();

        controller.handle_line(b"ACK,0", now);
        controller.tick(now);
        assert!(!controller.tobi.is_alive());

        let line = controller.control_line();
        assert!(line.starts_with("CTL,0,"));
        controller.handle_line(b"ACK,0", now);
        controller.tick(now);
        assert!(controller.tobi.is_alive());
    }

    #[test]
    fn test_links_lost_after_timeout() {
        let (mut controller, mut rx) = controller_with(Box::new(NoJoystick));
        let now = Instant::now();
        controller.handle_line(b"TEL,1,2,12,4,5", now);
        controller.tick(now);
        drain(&mut rx);

        controller.tick(now + Duration::from_secs(5));
        assert_eq!(
            drain(&mut rx),
            vec![ControllerEvent::LinkChanged {
                link: Link::Tibo,
                alive: false
            }]
        );
    }

    #[test]
    fn test_malformed_lines_are_counted() {
        let (mut controller, _rx) = controller_with(Box::new(NoJoystick));
        let now = Instant::now();
        controller.handle_line(b"TEL,abc", now);
        controller.handle_line(b"", now);
        let snapshot = controller.snapshot(now);
        assert_eq!(snapshot.parse_errors, 1);
        assert_eq!(snapshot.frames_received, 0);
    }

    #[test]
    fn test_commands_mutate_vehicle() {
        let (mut controller, mut rx) = controller_with(Box::new(NoJoystick));
        drain(&mut rx);
        let now = Instant::now();

        controller.handle_command(ControllerCommand::ToggleRelay(0), now);
        controller.handle_command(ControllerCommand::SetServo { id: 1, value: 20 }, now);
        controller.handle_command(
            ControllerCommand::NudgeServo {
                id: 1,
                direction: ServoDirection::Increase,
            },
            now,
        );

        assert!(controller.vehicle.relays()[0].state);
        assert_eq!(controller.vehicle.servos()[1].value, 25);
        assert_eq!(controller.vehicle.servos()[0].value, 50);

        controller.handle_command(ControllerCommand::ToggleRelay(9), now);
        assert!(matches!(drain(&mut rx).as_slice(), [ControllerEvent::Fault(_)]));
    }

    #[test]
    fn test_dive_timer_commands() {
        let (mut controller, _rx) = controller_with(Box::new(NoJoystick));
        let start = Instant::now();
        controller.handle_command(ControllerCommand::DiveTimerStart, start);
        let snapshot = controller.snapshot(start + Duration::from_secs(61));
        assert_eq!(snapshot.dive_time, "00:01:01");
        assert!(snapshot.dive_running);

        controller.handle_command(ControllerCommand::DiveTimerReset, start);
        assert_eq!(controller.snapshot(start).dive_time, "00:00:00");
    }

    #[test]
    fn test_joystick_presses_drive_relays_and_servos() {
        let joystick = ScriptedJoystick::default();
        *joystick.attached.lock().unwrap() = true;
        let (mut controller, mut rx) = controller_with(Box::new(joystick.clone()));
        assert_eq!(drain(&mut rx), vec![ControllerEvent::JoystickChanged(true)]);

        joystick.pending.lock().unwrap().extend([
            JoystickEvent::Pressed(ButtonBinding::East),
            JoystickEvent::Pressed(ButtonBinding::DPadDown),
            JoystickEvent::Pressed(ButtonBinding::DPadLeft),
        ]);
        controller.tick(Instant::now());

        assert!(controller.vehicle.relays()[1].state);
        assert_eq!(controller.vehicle.servos()[0].value, 45);
        assert_eq!(controller.vehicle.servos()[1].value, 45);

        *joystick.attached.lock().unwrap() = false;
        controller.tick(Instant::now());
        assert_eq!(drain(&mut rx), vec![ControllerEvent::JoystickChanged(false)]);
    }

    #[test]
    fn test_reload_settings_renames_relays() {
        let (mut controller, _rx) = controller_with(Box::new(NoJoystick));
        let mut config = AppConfig::default();
        config.vehicle.relays[0].name = "Flood".to_string();
        config.link_timeout_ms = 3000;

        controller.handle_command(ControllerCommand::ReloadSettings(Box::new(config)), Instant::now());
        assert_eq!(controller.vehicle.relays()[0].name, "Flood");
        assert_eq!(controller.config.link_timeout_ms, 3000);
    }

    #[test]
    fn test_save_settings_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("saved.toml");
        let (tx, mut rx) = mpsc::channel(16);
        let mut controller =
            RovController::new(AppConfig::default(), Some(path.clone()), Box::new(NoJoystick), tx);
        drain(&mut rx);

        controller.handle_command(ControllerCommand::SaveSettings, Instant::now());
        assert_eq!(
            drain(&mut rx),
            vec![ControllerEvent::SettingsSaved(path.display().to_string())]
        );
        assert!(path.exists());
    }

    #[test]
    fn test_trace_scrolls_off_when_vehicle_goes_quiet() {
        let (mut controller, _rx) = controller_with(Box::new(NoJoystick));
        let start = Instant::now();
        for step in 0..20u64 {
            let now = start + Duration::from_millis(step * 50);
            controller.handle_line(b"TEL,4,0,12,14,30", now);
            controller.tick(now);
        }
        assert_eq!(controller.snapshot(start + Duration::from_secs(1)).depth_trace.len(), 20);

        let later = start + Duration::from_secs(12);
        controller.tick(later);
        let snapshot = controller.snapshot(later);
        assert_eq!(snapshot.tibo, LinkStatus::Error);
        assert!(snapshot.depth_trace.is_empty());
    }

    #[test]
    fn test_link_edges_survive_a_long_run_without_draining() {
        let (tx, mut rx) = mpsc::channel(4);
        let mut controller = RovController::new(AppConfig::default(), None, Box::new(NoJoystick), tx);
        drain(&mut rx);

        let start = Instant::now();
        for step in 0..2_000u64 {
            let now = start + Duration::from_millis(step * 50);
            controller.handle_line(b"TEL,1,2,12,4,5", now);
            controller.tick(now);
        }
        controller.tick(start + Duration::from_secs(200));

        assert_eq!(
            drain(&mut rx),
            vec![
                ControllerEvent::LinkChanged {
                    link: Link::Tibo,
                    alive: true
                },
                ControllerEvent::LinkChanged {
                    link: Link::Tibo,
                    alive: false
                },
            ]
        );
    }

    #[test]
    fn test_invalid_utf8_line_is_a_parse_error() {
        let (mut controller, _rx) = controller_with(Box::new(NoJoystick));
        let now = Instant::now();
        controller.handle_line(b"TEL,1,2,3,4,\xff", now);
        controller.handle_line(b"ACK,1", now);
        let snapshot = controller.snapshot(now);
        assert_eq!(snapshot.parse_errors, 1);
        assert_eq!(snapshot.frames_received, 1);
    }

    fn wait_for(
        handle: &ControllerHandle,
        what: &str,
        done: impl Fn(&ConsoleSnapshot) -> bool,
    ) -> ConsoleSnapshot {
        let deadline = Instant::now() + Duration::from_secs(10);
        loop {
            let snapshot = handle.snapshot();
            if done(&snapshot) {
                return snapshot;
            }
            assert!(Instant::now() < deadline, "timed out waiting for {what}");
            std::thread::sleep(Duration::from_millis(20));
        }
    }

    #[test]
    fn test_worker_drives_simulated_vehicle() {
        let factory: JoystickFactory = Box::new(|| Box::new(NoJoystick) as Box<dyn JoystickSource>);
        let mut handle = ControllerHandle::spawn(AppConfig::default(), None, true, factory).unwrap();

        let live = wait_for(&handle, "both links", |s| {
            s.tibo == LinkStatus::Ok && s.tobi == LinkStatus::Ok && s.frames_sent > 0
        });
        assert_eq!(live.connection, ConnectionState::Connected);
        assert!(live.frames_received > 0);
        assert!(!live.depth_trace.is_empty());
        assert!(handle.poll_snapshot().is_some());

        assert!(handle.send(ControllerCommand::ToggleRelay(0)));
        wait_for(&handle, "relay 0 reported on", |s| {
            let relay = &s.vehicle.relays()[0];
            relay.state && relay.reported == Some(true)
        });

        let events = handle.drain_events();
        assert!(events.contains(&ControllerEvent::JoystickChanged(false)));
        assert!(events.contains(&ControllerEvent::VehicleConnection(ConnectionState::Connected)));
        assert!(events.contains(&ControllerEvent::LinkChanged {
            link: Link::Tibo,
            alive: true
        }));
        assert!(events.contains(&ControllerEvent::LinkChanged {
            link: Link::Tobi,
            alive: true
        }));

        handle.shutdown();
        assert!(handle.worker.is_none());
        assert!(!handle.send(ControllerCommand::DiveTimerStart));
    }

    #[test]
    fn test_connection_state_changes_are_reported_once() {
        let (mut controller, mut rx) = controller_with(Box::new(NoJoystick));
        drain(&mut rx);
        controller.handle_connection_state(ConnectionState::Connecting);
        controller.handle_connection_state(ConnectionState::Connecting);
        assert_eq!(
            drain(&mut rx),
            vec![ControllerEvent::VehicleConnection(ConnectionState::Connecting)]
        );
    }
}
