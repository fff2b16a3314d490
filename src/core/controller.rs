//! Cycle session controller
//!
//! Owns the `CycleSession`, the port discovery service and, while a job runs,
//! the device worker. Background contexts never touch the session directly:
//! they push `CoreEvent`s into the controller's inbox, and the owning thread
//! applies them through `process_pending` / `wait_and_process`.

use flume::{Receiver, Sender};
use std::{collections::HashSet, sync::Arc, time::Duration};

use super::{
    bus::{CoreEvent, SessionUpdate},
    config::RigConfig,
    error::{Result, SessionError},
    session::{CycleSession, LifecycleState},
};
use crate::protocol::{
    codec::DeviceEvent,
    discovery::{PortDiscovery, PortEnumerator, PortSet},
    runtime::SerialConnector,
    worker::DeviceWorker,
};

pub struct CycleController {
    config: RigConfig,
    session: CycleSession,
    selected_port: Option<String>,
    known_ports: PortSet,
    discovery: PortDiscovery,
    connector: Arc<dyn SerialConnector>,
    worker: Option<DeviceWorker>,
    session_id: u64,
    /// Sessions whose worker still holds its port. Discovery stays off until
    /// every one of them has reported release.
    unreleased: HashSet<u64>,
    inbox_tx: Sender<CoreEvent>,
    inbox_rx: Receiver<CoreEvent>,
    updates: Sender<SessionUpdate>,
}

impl std::fmt::Debug for CycleController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CycleController")
            .field("session", &self.session)
            .field("selected_port", &self.selected_port)
            .field("discovery", &self.discovery)
            .field("worker", &self.worker)
            .finish_non_exhaustive()
    }
}

impl CycleController {
    /// Build an idle controller and start port discovery. The returned receiver
    /// carries every update meant for the presentation layer.
    pub fn new(
        config: RigConfig,
        enumerator: Arc<dyn PortEnumerator>,
        connector: Arc<dyn SerialConnector>,
    ) -> (Self, Receiver<SessionUpdate>) {
        let (inbox_tx, inbox_rx) = flume::unbounded();
        let (updates, updates_rx) = flume::unbounded();

        let discovery = PortDiscovery::new(enumerator, config.poll_interval());
        let ports_tx = inbox_tx.clone();
        discovery.on_change(move |ports| {
            let _ = ports_tx.send(CoreEvent::PortsChanged(ports.clone()));
        });

        let mut controller = Self {
            config,
            session: CycleSession::new(),
            selected_port: None,
            known_ports: PortSet::new(),
            discovery,
            connector,
            worker: None,
            session_id: 0,
            unreleased: HashSet::new(),
            inbox_tx,
            inbox_rx,
            updates,
        };
        controller.resume_discovery();
        (controller, updates_rx)
    }

    pub fn session(&self) -> &CycleSession {
        &self.session
    }

    pub fn state(&self) -> LifecycleState {
        self.session.state()
    }

    pub fn selected_port(&self) -> Option<&str> {
        self.selected_port.as_deref()
    }

    pub fn known_ports(&self) -> &PortSet {
        &self.known_ports
    }

    pub fn is_discovery_running(&self) -> bool {
        self.discovery.is_running()
    }

    pub fn config(&self) -> &RigConfig {
        &self.config
    }

    /// Change the target count by `delta`, saturating at 0 and 99.
    pub fn adjust_target(&mut self, delta: i32) -> Result<u8> {
        self.require_state(LifecycleState::Idle)?;
        let target = self.session.adjust_target(delta);
        self.emit(SessionUpdate::TargetChanged {
            target,
            remaining: self.session.remaining(),
        });
        Ok(target)
    }

    /// Select the port the next job runs on. An empty name clears the selection.
    pub fn select_port(&mut self, port_name: &str) -> Result<()> {
        self.require_state(LifecycleState::Idle)?;
        let port_name = port_name.trim();
        self.selected_port = (!port_name.is_empty()).then(|| port_name.to_string());
        self.emit(SessionUpdate::PortSelected {
            port: self.selected_port.clone(),
        });
        Ok(())
    }

    pub fn start(&mut self) -> Result<()> {
        self.require_state(LifecycleState::Idle)?;
        if self.session.target_count() == 0 {
            return Err(self.report(SessionError::InvalidConfiguration));
        }
        let Some(port_name) = self.selected_port.clone() else {
            return Err(self.report(SessionError::NoPortSelected));
        };

        self.suspend_discovery();
        self.session_id += 1;

        let session = self.session_id;
        let mut worker = DeviceWorker::new(
            port_name.clone(),
            self.session.target_count(),
            self.config.serial.clone(),
            Arc::clone(&self.connector),
        );
        let event_tx = self.inbox_tx.clone();
        worker.on_event(move |event| {
            let _ = event_tx.send(CoreEvent::Device { session, event });
        });
        let release_tx = self.inbox_tx.clone();
        worker.on_released(move || {
            let _ = release_tx.send(CoreEvent::WorkerReleased { session });
        });

        if let Err(err) = worker.start() {
            self.resume_discovery_when_released();
            return Err(self.report(err));
        }

        log::info!(
            "Job #{session} started on {port_name}: {} cycles",
            self.session.target_count()
        );
        self.worker = Some(worker);
        self.transition(LifecycleState::Running);
        self.emit(SessionUpdate::Progress(self.session.progress()));
        Ok(())
    }

    /// Flip the pause label. Nothing is sent to the device.
    pub fn toggle_pause(&mut self) -> Result<bool> {
        self.require_state(LifecycleState::Running)?;
        let paused = self.session.toggle_pause();
        log::info!("Job {}", if paused { "paused" } else { "resumed" });
        self.emit(SessionUpdate::PauseChanged { paused });
        Ok(paused)
    }

    /// Ask for cancellation; the job keeps running until confirmed.
    pub fn request_cancel(&mut self) -> Result<()> {
        match self.state() {
            LifecycleState::Cancelling => Ok(()),
            LifecycleState::Running => {
                self.transition(LifecycleState::Cancelling);
                Ok(())
            }
            state => Err(SessionError::Busy(state)),
        }
    }

    pub fn confirm_cancel(&mut self) -> Result<()> {
        self.require_state(LifecycleState::Cancelling)?;
        log::info!(
            "Job #{} cancelled after {}/{} cycles",
            self.session_id,
            self.session.done_count(),
            self.session.target_count()
        );
        self.teardown();
        Ok(())
    }

    pub fn decline_cancel(&mut self) -> Result<()> {
        self.require_state(LifecycleState::Cancelling)?;
        self.transition(LifecycleState::Running);
        Ok(())
    }

    /// Apply every queued background event. Returns how many were handled.
    pub fn process_pending(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(event) = self.inbox_rx.try_recv() {
            self.handle(event);
            handled += 1;
        }
        handled
    }

    /// Block up to `timeout` for the next background event, then drain the rest.
    pub fn wait_and_process(&mut self, timeout: Duration) -> usize {
        match self.inbox_rx.recv_timeout(timeout) {
            Ok(event) => {
                self.handle(event);
                1 + self.process_pending()
            }
            Err(_) => 0,
        }
    }

    fn handle(&mut self, event: CoreEvent) {
        match event {
            CoreEvent::PortsChanged(ports) => self.apply_ports(ports),
            CoreEvent::Device { session, event } => {
                if session != self.session_id || !self.state().is_active() {
                    log::trace!("Discarding {event:?} from job #{session}");
                    return;
                }
                self.apply_device_event(event);
            }
            CoreEvent::WorkerReleased { session } => {
                if !self.unreleased.remove(&session) {
                    log::trace!("Ignoring release of job #{session}");
                    return;
                }
                log::debug!("Job #{session} released its port");
                if !self.state().is_active() {
                    self.resume_discovery_when_released();
                }
            }
        }
    }

    fn apply_ports(&mut self, ports: PortSet) {
        if self.state().is_active() {
            log::trace!("Ignoring port set published during a job");
            return;
        }

        let keep = self
            .selected_port
            .as_deref()
            .is_some_and(|name| ports.contains(name));
        if !keep {
            self.selected_port = ports.first().map(str::to_string);
        }
        log::debug!(
            "Ports: {:?}, selected: {:?}",
            ports.iter().collect::<Vec<_>>(),
            self.selected_port
        );
        self.known_ports = ports.clone();
        self.emit(SessionUpdate::PortsChanged {
            ports,
            selected: self.selected_port.clone(),
        });
    }

    fn apply_device_event(&mut self, event: DeviceEvent) {
        match event {
            DeviceEvent::CycleCompleted => {
                let finished = self.session.record_cycle();
                let progress = self.session.progress();
                log::info!(
                    "Cycle {}/{} done ({}%)",
                    progress.done,
                    progress.target,
                    progress.percent
                );
                self.emit(SessionUpdate::Progress(progress));
                if finished {
                    self.transition(LifecycleState::Completed);
                    log::info!("Job #{} completed", self.session_id);
                    self.teardown();
                }
            }
            DeviceEvent::Unrecognized(line) => {
                log::debug!("Unrecognized device message: {line:?}");
                self.emit(SessionUpdate::DeviceMessage { line });
            }
            DeviceEvent::ConnectionLost(reason) => {
                let port = self
                    .worker
                    .as_ref()
                    .map(|w| w.port_name().to_string())
                    .unwrap_or_default();
                self.report(SessionError::ConnectionLost { port, reason });
                self.teardown();
            }
        }
    }

    /// Stop the worker, reset the session and return to Idle. Discovery comes
    /// back once the worker reports that its handle is gone.
    fn teardown(&mut self) {
        match self.worker.take() {
            Some(mut worker) => {
                worker.stop();
                self.unreleased.insert(self.session_id);
            }
            None => self.resume_discovery_when_released(),
        }
        self.transition(LifecycleState::Idle);
        self.session.reset();
        self.emit(SessionUpdate::TargetChanged {
            target: 0,
            remaining: 0,
        });
    }

    fn suspend_discovery(&mut self) {
        if self.discovery.is_running() {
            self.discovery.stop();
            self.emit(SessionUpdate::DiscoveryChanged { running: false });
        }
    }

    fn resume_discovery(&mut self) {
        if !self.discovery.is_running() {
            self.discovery.start();
            self.emit(SessionUpdate::DiscoveryChanged { running: true });
        }
    }

    fn resume_discovery_when_released(&mut self) {
        if self.unreleased.is_empty() {
            self.resume_discovery();
        } else {
            log::debug!("Discovery waits on {} worker(s)", self.unreleased.len());
        }
    }

    fn transition(&mut self, state: LifecycleState) {
        log::info!("Session state: {} -> {state}", self.session.state());
        self.session.set_state(state);
        self.emit(SessionUpdate::StateChanged { state });
    }

    fn require_state(&self, expected: LifecycleState) -> Result<()> {
        match self.state() {
            state if state == expected => Ok(()),
            state => Err(SessionError::Busy(state)),
        }
    }

    fn report(&self, error: SessionError) -> SessionError {
        if error.is_transport() {
            log::warn!("{error}");
        } else {
            log::info!("Rejected: {error}");
        }
        self.emit(SessionUpdate::Notice {
            error: error.clone(),
        });
        error
    }

    fn emit(&self, update: SessionUpdate) {
        // Nobody listening is fine
        let _ = self.updates.send(update);
    }
}
