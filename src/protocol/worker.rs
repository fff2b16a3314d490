use flume::{Receiver, Sender, TryRecvError};
use std::{
    io::{ErrorKind, Read, Write},
    sync::Arc,
    thread::{self, JoinHandle},
    time::Duration,
};

use super::{
    codec::{encode_target, DeviceEvent, LineDecoder},
    runtime::{SerialConfig, SerialConnector, SerialLink},
};
use crate::core::error::{Result, SessionError};

pub type EventHook = Box<dyn FnMut(DeviceEvent) + Send + 'static>;
pub type ReleaseHook = Box<dyn FnOnce() + Send + 'static>;

/// Owns the serial connection for one session.
///
/// The connection lives on the read loop thread. `stop` only signals that
/// thread, it never waits for an in-flight read; the `on_released` hook tells
/// the owner when the handle has actually been dropped.
pub struct DeviceWorker {
    port_name: String,
    target: u8,
    config: SerialConfig,
    connector: Arc<dyn SerialConnector>,
    on_event: Option<EventHook>,
    on_released: Option<ReleaseHook>,
    kill_tx: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for DeviceWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceWorker")
            .field("port_name", &self.port_name)
            .field("target", &self.target)
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

impl DeviceWorker {
    pub fn new(
        port_name: impl Into<String>,
        target: u8,
        config: SerialConfig,
        connector: Arc<dyn SerialConnector>,
    ) -> Self {
        Self {
            port_name: port_name.into(),
            target,
            config,
            connector,
            on_event: None,
            on_released: None,
            kill_tx: None,
            handle: None,
        }
    }

    pub fn port_name(&self) -> &str {
        &self.port_name
    }

    /// Register the event hook. Called on the read loop thread, once per line,
    /// in arrival order. Must be set before `start`.
    pub fn on_event<F>(&mut self, callback: F)
    where
        F: FnMut(DeviceEvent) + Send + 'static,
    {
        self.on_event = Some(Box::new(callback));
    }

    /// Register the hook fired after the read loop has dropped the connection.
    pub fn on_released<F>(&mut self, callback: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.on_released = Some(Box::new(callback));
    }

    /// Open the port, send the target count and spawn the read loop.
    pub fn start(&mut self) -> Result<()> {
        if self.kill_tx.is_some() {
            return Err(SessionError::ConnectionError {
                port: self.port_name.clone(),
                reason: "worker already started".into(),
            });
        }

        let mut link = self
            .connector
            .open(&self.port_name, &self.config)
            .map_err(|err| SessionError::ConnectionError {
                port: self.port_name.clone(),
                reason: format!("{err:#}"),
            })?;

        let header = encode_target(self.target);
        link.write_all(&header)
            .and_then(|_| link.flush())
            .map_err(|err| SessionError::ConnectionError {
                port: self.port_name.clone(),
                reason: format!("failed to send target count: {err}"),
            })?;
        log::info!("Sent target of {} cycles to {}", self.target, self.port_name);

        let (kill_tx, kill_rx) = flume::bounded(1);
        let port_name = self.port_name.clone();
        let on_event = self.on_event.take();
        let on_released = self.on_released.take();
        let handle = thread::Builder::new()
            .name(format!("cyclerig-worker-{}", sanitize(&port_name)))
            .spawn(move || run_read_loop(link, port_name, kill_rx, on_event, on_released))
            .map_err(|err| SessionError::ConnectionError {
                port: self.port_name.clone(),
                reason: format!("failed to spawn read loop: {err}"),
            })?;

        self.kill_tx = Some(kill_tx);
        self.handle = Some(handle);
        Ok(())
    }

    /// Signal the read loop to end. Returns immediately; safe to call repeatedly
    /// and on a worker that never started.
    pub fn stop(&mut self) {
        if let Some(kill_tx) = self.kill_tx.take() {
            log::debug!("Stopping worker on {}", self.port_name);
            // Loop already gone when the receiver is dropped
            let _ = kill_tx.try_send(());
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }
}

impl Drop for DeviceWorker {
    fn drop(&mut self) {
        self.stop();
    }
}

enum LoopExit {
    Stopped,
    Lost(String),
}

fn run_read_loop(
    mut link: Box<dyn SerialLink>,
    port_name: String,
    kill_rx: Receiver<()>,
    mut on_event: Option<EventHook>,
    on_released: Option<ReleaseHook>,
) {
    let mut decoder = LineDecoder::new();
    let mut buf = [0u8; 256];

    let exit = 'read: loop {
        if stop_requested(&kill_rx) {
            break LoopExit::Stopped;
        }
        match link.read(&mut buf) {
            Ok(0) => thread::sleep(Duration::from_millis(2)),
            Ok(n) => {
                for line in decoder.push(&buf[..n]) {
                    let Some(event) = DeviceEvent::decode(&line) else {
                        continue;
                    };
                    // Nothing is delivered once the owner asked us to stop
                    if stop_requested(&kill_rx) {
                        break 'read LoopExit::Stopped;
                    }
                    log::debug!("{port_name} <- {line:?}");
                    dispatch(&mut on_event, event);
                }
            }
            Err(err)
                if matches!(
                    err.kind(),
                    ErrorKind::TimedOut | ErrorKind::WouldBlock | ErrorKind::Interrupted
                ) => {}
            Err(err) => break LoopExit::Lost(err.to_string()),
        }
    };

    drop(link);

    match exit {
        LoopExit::Stopped => log::info!("Worker on {port_name} stopped"),
        LoopExit::Lost(reason) => {
            log::warn!("Connection to {port_name} lost: {reason}");
            if !stop_requested(&kill_rx) {
                dispatch(&mut on_event, DeviceEvent::ConnectionLost(reason));
            }
        }
    }

    if let Some(on_released) = on_released {
        on_released();
    }
}

fn stop_requested(kill_rx: &Receiver<()>) -> bool {
    match kill_rx.try_recv() {
        Ok(()) | Err(TryRecvError::Disconnected) => true,
        Err(TryRecvError::Empty) => false,
    }
}

fn dispatch(on_event: &mut Option<EventHook>, event: DeviceEvent) {
    match on_event {
        Some(callback) => callback(event),
        None => log::trace!("No event hook registered, dropping {event:?}"),
    }
}

fn sanitize(port_name: &str) -> String {
    port_name.rsplit(['/', '\\']).next().unwrap_or(port_name).to_string()
}
