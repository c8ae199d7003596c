use crate::store::KeyValueStore;
use std::collections::HashMap;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

#[derive(Debug, Clone)]
struct PendingWrite {
    value: String,
    due: Instant,
}

/// Per-key pending writes. Scheduling a key again replaces its value and
/// pushes its deadline out, so only the last write in a window survives.
#[derive(Debug, Default)]
pub struct PendingWrites {
    entries: HashMap<String, PendingWrite>,
}

impl PendingWrites {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(&mut self, key: String, value: String, due: Instant) {
        self.entries.insert(key, PendingWrite { value, due });
    }

    /// Drop the pending write for `key`. Returns whether one existed.
    pub fn cancel(&mut self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    pub fn next_due(&self) -> Option<Instant> {
        self.entries.values().map(|w| w.due).min()
    }

    /// Remove and return every write whose deadline has passed.
    pub fn take_due(&mut self, now: Instant) -> Vec<(String, String)> {
        let due: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, w)| w.due <= now)
            .map(|(k, _)| k.clone())
            .collect();

        due.into_iter()
            .filter_map(|k| self.entries.remove(&k).map(|w| (k, w.value)))
            .collect()
    }

    pub fn drain(&mut self) -> Vec<(String, String)> {
        self.entries.drain().map(|(k, w)| (k, w.value)).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

enum Command {
    Write { key: String, value: String },
    Remove { key: String, done: Sender<()> },
    Flush { done: Sender<()> },
}

/// Background writer that coalesces writes to a [`KeyValueStore`].
///
/// Removes go through the same worker so a pending write can never land
/// after the key was cleared. Dropping the debouncer writes whatever is
/// still pending.
pub struct Debouncer {
    tx: Option<Sender<Command>>,
    handle: Option<JoinHandle<()>>,
    window: Duration,
}

impl Debouncer {
    pub fn spawn(store: Arc<dyn KeyValueStore>, window: Duration) -> Self {
        let (tx, rx) = mpsc::channel();
        let handle = thread::spawn(move || run_worker(rx, store, window));
        Self {
            tx: Some(tx),
            handle: Some(handle),
            window,
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn write(&self, key: String, value: String) {
        self.send(Command::Write { key, value });
    }

    /// Cancel any pending write for `key` and remove it from the store.
    /// Blocks until the worker has done both.
    pub fn remove(&self, key: String) {
        let (done, wait) = mpsc::channel();
        if self.send(Command::Remove { key, done }) {
            let _ = wait.recv();
        }
    }

    /// Write everything pending now. Blocks until written.
    pub fn flush(&self) {
        let (done, wait) = mpsc::channel();
        if self.send(Command::Flush { done }) {
            let _ = wait.recv();
        }
    }

    fn send(&self, cmd: Command) -> bool {
        match self.tx.as_ref() {
            Some(tx) => tx.send(cmd).is_ok(),
            None => false,
        }
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        // Closing the channel makes the worker flush and exit
        self.tx.take();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn run_worker(rx: Receiver<Command>, store: Arc<dyn KeyValueStore>, window: Duration) {
    let mut pending = PendingWrites::new();

    loop {
        let next = match pending.next_due() {
            Some(due) => match rx.recv_timeout(due.saturating_duration_since(Instant::now())) {
                Ok(cmd) => Some(cmd),
                Err(RecvTimeoutError::Timeout) => None,
                Err(RecvTimeoutError::Disconnected) => break,
            },
            None => match rx.recv() {
                Ok(cmd) => Some(cmd),
                Err(_) => break,
            },
        };

        match next {
            Some(Command::Write { key, value }) => {
                pending.schedule(key, value, Instant::now() + window);
            }
            Some(Command::Remove { key, done }) => {
                pending.cancel(&key);
                if let Err(e) = store.remove(&key) {
                    warn!(%key, error = %e, "failed to remove stored value");
                }
                let _ = done.send(());
            }
            Some(Command::Flush { done }) => {
                write_all(store.as_ref(), pending.drain());
                let _ = done.send(());
            }
            None => {}
        }

        write_all(store.as_ref(), pending.take_due(Instant::now()));
    }

    write_all(store.as_ref(), pending.drain());
}

fn write_all(store: &dyn KeyValueStore, writes: Vec<(String, String)>) {
    for (key, value) in writes {
        match store.set(&key, &value) {
            Ok(()) => debug!(%key, "debounced write"),
            Err(e) => warn!(%key, error = %e, "debounced write failed"),
        }
    }
}
