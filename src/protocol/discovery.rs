use anyhow::Result;
use flume::{RecvTimeoutError, Sender};
use parking_lot::Mutex;
use serde::{Serialize, Serializer};
use std::{
    collections::BTreeSet,
    sync::Arc,
    thread::{self, JoinHandle},
    time::Duration,
};

use super::tty::port_priority;

/// Set of port identifiers seen by one poll. Compared as a whole, ordering of
/// the enumeration does not matter. Iteration follows port priority (USB,
/// then ACM, then on-board UARTs), so `first` is the preferred default.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct PortSet(BTreeSet<(u8, String)>);

impl PortSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, port_name: &str) -> bool {
        self.0
            .contains(&(port_priority(port_name), port_name.to_string()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn first(&self) -> Option<&str> {
        self.0.first().map(|(_, name)| name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(_, name)| name.as_str())
    }
}

impl<S: Into<String>> FromIterator<S> for PortSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|name| {
                    let name = name.into();
                    (port_priority(&name), name)
                })
                .collect(),
        )
    }
}

impl std::fmt::Debug for PortSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

impl Serialize for PortSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.iter())
    }
}

/// Source of the host's port list.
pub trait PortEnumerator: Send + Sync {
    fn enumerate(&self) -> Result<PortSet>;
}

pub type ChangeListener = Box<dyn Fn(&PortSet) + Send + 'static>;

struct PollTask {
    stop_tx: Sender<()>,
    handle: JoinHandle<()>,
}

/// Periodically enumerates serial ports on a background thread and notifies
/// listeners when the set changes.
pub struct PortDiscovery {
    enumerator: Arc<dyn PortEnumerator>,
    interval: Duration,
    listeners: Arc<Mutex<Vec<ChangeListener>>>,
    task: Option<PollTask>,
}

impl std::fmt::Debug for PortDiscovery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PortDiscovery")
            .field("interval", &self.interval)
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

impl PortDiscovery {
    pub fn new(enumerator: Arc<dyn PortEnumerator>, interval: Duration) -> Self {
        Self {
            enumerator,
            interval,
            listeners: Arc::new(Mutex::new(Vec::new())),
            task: None,
        }
    }

    /// Register a listener. Invoked on the polling thread; listeners are kept
    /// across `stop`/`start`.
    pub fn on_change<F>(&self, callback: F)
    where
        F: Fn(&PortSet) + Send + 'static,
    {
        self.listeners.lock().push(Box::new(callback));
    }

    pub fn is_running(&self) -> bool {
        self.task.is_some()
    }

    /// Begin polling. The first successful poll is always published.
    pub fn start(&mut self) {
        if self.task.is_some() {
            return;
        }

        let (stop_tx, stop_rx) = flume::bounded::<()>(1);
        let enumerator = Arc::clone(&self.enumerator);
        let listeners = Arc::clone(&self.listeners);
        let interval = self.interval;

        let handle = thread::spawn(move || {
            let mut last: Option<PortSet> = None;
            loop {
                match enumerator.enumerate() {
                    Ok(current) => {
                        if last.as_ref() != Some(&current) {
                            log::debug!("Port set changed: {} port(s)", current.len());
                            for listener in listeners.lock().iter() {
                                listener(&current);
                            }
                            last = Some(current);
                        }
                    }
                    Err(err) => log::debug!("Port enumeration failed, retrying: {err:#}"),
                }

                match stop_rx.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => continue,
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            }
            log::debug!("Port discovery stopped");
        });

        log::info!("Port discovery started ({:?} interval)", self.interval);
        self.task = Some(PollTask { stop_tx, handle });
    }

    /// Stop polling and wait for the polling thread to exit, so no listener
    /// runs after this returns.
    pub fn stop(&mut self) {
        let Some(task) = self.task.take() else {
            return;
        };
        let _ = task.stop_tx.try_send(());
        drop(task.stop_tx);
        if task.handle.thread().id() == thread::current().id() {
            // Called from a listener; the loop exits on its own after returning
            return;
        }
        if task.handle.join().is_err() {
            log::warn!("Port discovery thread panicked");
        }
        log::info!("Port discovery suspended");
    }
}

impl Drop for PortDiscovery {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn port_sets_compare_without_order() {
        let a: PortSet = ["COM3", "COM1"].into_iter().collect();
        let b: PortSet = ["COM1", "COM3", "COM1"].into_iter().collect();
        assert_eq!(a, b);
        assert_eq!(a.len(), 2);
        assert_eq!(a.first(), Some("COM1"));
        assert_ne!(a, PortSet::new());
    }

    #[test]
    fn usb_ports_come_first() {
        let ports: PortSet = ["/dev/ttyS0", "/dev/ttyACM0", "/dev/ttyUSB1", "/dev/ttyS1"]
            .into_iter()
            .collect();
        assert_eq!(ports.first(), Some("/dev/ttyUSB1"));
        assert_eq!(
            ports.iter().collect::<Vec<_>>(),
            vec!["/dev/ttyUSB1", "/dev/ttyACM0", "/dev/ttyS0", "/dev/ttyS1"]
        );
        assert!(ports.contains("/dev/ttyS1"));
        assert!(!ports.contains("/dev/ttyS2"));
    }
}
