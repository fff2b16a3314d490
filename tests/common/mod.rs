#![allow(dead_code)]

use anyhow::{anyhow, Result};
use flume::{Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use std::{
    collections::VecDeque,
    io::{self, Read, Write},
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

use cyclerig::{
    protocol::{PortEnumerator, PortSet, SerialConfig, SerialConnector, SerialLink},
    CycleController, RigConfig, SessionUpdate,
};

pub const POLL_INTERVAL: Duration = Duration::from_millis(15);
pub const LINK_TIMEOUT: Duration = Duration::from_millis(10);
pub const WAIT: Duration = Duration::from_secs(5);

/// Port list whose contents the test controls.
pub struct FakeEnumerator {
    ports: Mutex<std::result::Result<Vec<String>, String>>,
    polls: AtomicUsize,
}

impl Default for FakeEnumerator {
    fn default() -> Self {
        Self {
            ports: Mutex::new(Ok(Vec::new())),
            polls: AtomicUsize::new(0),
        }
    }
}

impl FakeEnumerator {
    pub fn with_ports(ports: &[&str]) -> Arc<Self> {
        let fake = Self::default();
        fake.set_ports(ports);
        Arc::new(fake)
    }

    pub fn set_ports(&self, ports: &[&str]) {
        *self.ports.lock() = Ok(ports.iter().map(|p| p.to_string()).collect());
    }

    pub fn fail(&self, reason: &str) {
        *self.ports.lock() = Err(reason.to_string());
    }

    pub fn polls(&self) -> usize {
        self.polls.load(Ordering::SeqCst)
    }
}

impl PortEnumerator for FakeEnumerator {
    fn enumerate(&self) -> Result<PortSet> {
        self.polls.fetch_add(1, Ordering::SeqCst);
        match &*self.ports.lock() {
            Ok(ports) => Ok(ports.iter().cloned().collect()),
            Err(reason) => Err(anyhow!("{reason}")),
        }
    }
}

/// In-memory serial link. Reads time out like a real port when the device is
/// quiet and fail with `BrokenPipe` once the device side is unplugged.
pub struct FakeLink {
    incoming: Receiver<Vec<u8>>,
    pending: Vec<u8>,
    /// Added to every read, so a stopped reader holds the link this long
    read_delay: Duration,
    written: Arc<Mutex<Vec<u8>>>,
    released: Arc<AtomicBool>,
}

impl Read for FakeLink {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if !self.read_delay.is_zero() {
            std::thread::sleep(self.read_delay);
        }
        if self.pending.is_empty() {
            match self.incoming.recv_timeout(LINK_TIMEOUT) {
                Ok(chunk) => self.pending = chunk,
                Err(RecvTimeoutError::Timeout) => {
                    return Err(io::Error::new(io::ErrorKind::TimedOut, "read timed out"))
                }
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(io::Error::new(io::ErrorKind::BrokenPipe, "device unplugged"))
                }
            }
        }
        let n = buf.len().min(self.pending.len());
        buf[..n].copy_from_slice(&self.pending[..n]);
        self.pending = self.pending.split_off(n);
        Ok(n)
    }
}

impl Write for FakeLink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.written.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for FakeLink {
    fn drop(&mut self) {
        self.released.store(true, Ordering::SeqCst);
    }
}

/// Test side of a `FakeLink`.
pub struct FakeDevice {
    tx: Option<Sender<Vec<u8>>>,
    written: Arc<Mutex<Vec<u8>>>,
    released: Arc<AtomicBool>,
}

impl FakeDevice {
    pub fn send(&self, bytes: &[u8]) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(bytes.to_vec());
        }
    }

    pub fn send_line(&self, line: &str) {
        self.send(format!("{line}\n").as_bytes());
    }

    pub fn send_done(&self, times: usize) {
        for _ in 0..times {
            self.send_line("done");
        }
    }

    pub fn unplug(&mut self) {
        self.tx = None;
    }

    pub fn written(&self) -> String {
        String::from_utf8_lossy(&self.written.lock()).into_owned()
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }
}

pub fn fake_link() -> (FakeLink, FakeDevice) {
    slow_link(Duration::ZERO)
}

pub fn slow_link(read_delay: Duration) -> (FakeLink, FakeDevice) {
    let (tx, rx) = flume::unbounded();
    let written = Arc::new(Mutex::new(Vec::new()));
    let released = Arc::new(AtomicBool::new(false));
    (
        FakeLink {
            incoming: rx,
            pending: Vec::new(),
            read_delay,
            written: Arc::clone(&written),
            released: Arc::clone(&released),
        },
        FakeDevice {
            tx: Some(tx),
            written,
            released,
        },
    )
}

/// Hands out prepared links in order; fails when none is queued.
#[derive(Default)]
pub struct FakeConnector {
    links: Mutex<VecDeque<FakeLink>>,
    opened: Mutex<Vec<String>>,
}

impl FakeConnector {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn attach(&self) -> FakeDevice {
        self.attach_slow(Duration::ZERO)
    }

    /// Queue a link whose reads stall for `read_delay`.
    pub fn attach_slow(&self, read_delay: Duration) -> FakeDevice {
        let (link, device) = slow_link(read_delay);
        self.links.lock().push_back(link);
        device
    }

    pub fn opened(&self) -> Vec<String> {
        self.opened.lock().clone()
    }
}

impl SerialConnector for FakeConnector {
    fn open(&self, port_name: &str, _config: &SerialConfig) -> Result<Box<dyn SerialLink>> {
        let link = self
            .links
            .lock()
            .pop_front()
            .ok_or_else(|| anyhow!("no such device: {port_name}"))?;
        self.opened.lock().push(port_name.to_string());
        Ok(Box::new(link))
    }
}

pub fn test_config() -> RigConfig {
    let mut config = RigConfig::default();
    config.discovery.poll_interval_ms = POLL_INTERVAL.as_millis() as u64;
    config
}

pub fn controller_with(
    enumerator: &Arc<FakeEnumerator>,
    connector: &Arc<FakeConnector>,
) -> (CycleController, Receiver<SessionUpdate>) {
    CycleController::new(test_config(), enumerator.clone(), connector.clone())
}

/// Pump the controller until `cond` holds. Returns false on timeout.
pub fn pump_until(
    controller: &mut CycleController,
    mut cond: impl FnMut(&CycleController) -> bool,
) -> bool {
    let deadline = Instant::now() + WAIT;
    while Instant::now() < deadline {
        if cond(controller) {
            return true;
        }
        controller.wait_and_process(Duration::from_millis(5));
    }
    cond(controller)
}

/// Poll a plain condition until it holds. Returns false on timeout.
pub fn wait_for(mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + WAIT;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    cond()
}

pub fn drain(updates: &Receiver<SessionUpdate>) -> Vec<SessionUpdate> {
    updates.try_iter().collect()
}
