/*
  rtuhub, a PROFINET sensor hub / remote terminal unit core.
  Copyright (C) 2026 rtuhub contributors.

  rtuhub is free software: you can redistribute it and/or modify
  it under the terms of the GNU General Public License as published by
  the Free Software Foundation, either version 3 of the License, or
  (at your option) any later version.

  rtuhub is distributed in the hope that it will be useful,
  but WITHOUT ANY WARRANTY; without even the implied warranty of
  MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
  GNU General Public License for more details.

  You should have received a copy of the GNU General Public License
  along with this program.  If not, see <http://www.gnu.org/licenses/>.
*/

//! The store-and-forward data logger (spec.md §4.6): a bounded ring queue
//! fed from any thread, drained by one worker thread that always attempts a
//! local write and conditionally attempts a remote batch POST.
//!
//! Grounded on the teacher's `data::sensor_listen` worker-thread-with-period
//! idiom and `outgoing::DashChannel`'s "target may or may not be present"
//! shape, generalized from a dashboard socket to an HTTP remote sink that's
//! injected like the teacher's `MakeHardware` trait so tests never touch
//! the network.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::callbacks::Slot;
use crate::error::RtuError;

/// Queue capacity (spec.md §4.6).
pub const LOG_QUEUE_SIZE: usize = 1000;
/// Maximum entries drained for a local write per worker wake.
pub const MAX_LOG_BATCH_SIZE: usize = 100;
/// Maximum entries per remote POST.
pub const REMOTE_BATCH_SIZE: usize = 50;
/// Minimum gap between remote attempts after a failure.
pub const REMOTE_RETRY_INTERVAL_SECS: i64 = 60;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
/// One queued reading destined for local persistence and/or remote upload.
pub struct LogEntry {
    /// The originating module.
    pub module_id: i64,
    /// The logged value.
    pub value: f64,
    /// A free-form status string (e.g. a `Quality` rendered as text).
    pub status: String,
    /// When the value was sampled.
    pub timestamp: DateTime<Utc>,
}

struct Queued {
    entry: LogEntry,
    locally_persisted: bool,
}

/// Sink for the always-attempted local write.
pub trait LocalSink: Send + Sync {
    /// Persist a batch of entries. Should not fail on partial duplication;
    /// the logger may present the same entry across more than one call.
    fn insert_log_batch(&self, entries: &[LogEntry]) -> Result<(), RtuError>;
}

/// Sink for the conditional remote upload.
pub trait RemoteSink: Send + Sync {
    /// POST one sub-batch (`{device, data}` per spec.md §4.6). `Ok` means a
    /// 2xx response; any other outcome is a failure for backoff purposes.
    fn post_batch(&self, device: &str, batch: &[LogEntry]) -> Result<(), RtuError>;
}

/// Static, never-succeeding-until-configured remote sink, used where no
/// remote endpoint is configured.
pub struct NoRemote;

impl RemoteSink for NoRemote {
    fn post_batch(&self, _device: &str, _batch: &[LogEntry]) -> Result<(), RtuError> {
        Err(RtuError::new(crate::error::ErrorKind::NotSupported, "no remote sink configured"))
    }
}

#[derive(Serialize)]
struct RemoteEntry<'a> {
    module_id: i64,
    value: f64,
    status: &'a str,
    timestamp: i64,
}

#[derive(Serialize)]
struct RemotePayload<'a> {
    device: &'a str,
    data: Vec<RemoteEntry<'a>>,
}

fn build_payload<'a>(device: &'a str, batch: &'a [LogEntry]) -> RemotePayload<'a> {
    RemotePayload {
        device,
        data: batch.iter().map(|e| RemoteEntry { module_id: e.module_id, value: e.value, status: &e.status, timestamp: e.timestamp.timestamp() }).collect(),
    }
}

/// The real remote sink: a blocking HTTP POST per batch (spec.md §4.6/§6.2).
/// Grounded on the teacher's `outgoing::DashChannel`, generalized from a raw
/// TCP socket write to an HTTP client, which is why construction can fail
/// (building the client validates the TLS backend) where the teacher's own
/// socket connect could not.
pub struct HttpRemote {
    client: reqwest::blocking::Client,
    endpoint: String,
    api_key: Option<String>,
}

/// Connect timeout for the remote POST (spec.md §6.2).
pub const REMOTE_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
/// Total request timeout for the remote POST (spec.md §6.2).
pub const REMOTE_TOTAL_TIMEOUT: Duration = Duration::from_secs(10);

impl HttpRemote {
    /// Build a remote sink posting to `endpoint`, optionally authenticated
    /// with a bearer `api_key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying HTTP client cannot be built.
    pub fn new(endpoint: impl Into<String>, api_key: Option<String>) -> Result<HttpRemote, RtuError> {
        let client = reqwest::blocking::Client::builder()
            .connect_timeout(REMOTE_CONNECT_TIMEOUT)
            .timeout(REMOTE_TOTAL_TIMEOUT)
            .build()
            .map_err(|e| RtuError::new(crate::error::ErrorKind::IoError, e.to_string()))?;
        Ok(HttpRemote { client, endpoint: endpoint.into(), api_key })
    }
}

impl RemoteSink for HttpRemote {
    fn post_batch(&self, device: &str, batch: &[LogEntry]) -> Result<(), RtuError> {
        let payload = build_payload(device, batch);
        let mut request = self.client.post(&self.endpoint).json(&payload);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        let response = request.send().map_err(|e| RtuError::new(crate::error::ErrorKind::IoError, e.to_string()))?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(RtuError::new(crate::error::ErrorKind::IoError, format!("remote logger endpoint responded with {}", response.status())))
        }
    }
}

/// Tunables for the data logger, all with spec.md §4.6 defaults.
pub struct LoggerConfig {
    /// Worker wake period.
    pub interval_seconds: u64,
    /// Entries older than this are dropped from the queue unsent.
    pub max_queue_age_seconds: i64,
    /// Whether local persistence is attempted at all.
    pub local_enabled: bool,
    /// Whether remote delivery is attempted at all.
    pub remote_enabled: bool,
    /// Whether the remote endpoint is currently reachable in principle
    /// (operator/config gate, independent of live `network_connected`).
    pub remote_available: bool,
    /// Raise `flush_pending` automatically on a false->true connection
    /// transition.
    pub flush_on_reconnect: bool,
    /// The device identifier sent in the remote JSON envelope.
    pub device_id: String,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        LoggerConfig {
            interval_seconds: 60,
            max_queue_age_seconds: 3600,
            local_enabled: true,
            remote_enabled: false,
            remote_available: true,
            flush_on_reconnect: true,
            device_id: String::new(),
        }
    }
}

/// Logger counters, useful for the health snapshot and tests.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggerStats {
    /// Entries evicted for exceeding `max_queue_age_seconds`.
    pub total_dropped_age: u64,
    /// Entries evicted by ring-buffer backpressure (FIFO drop-oldest).
    pub total_dropped_backpressure: u64,
    /// Entries successfully confirmed remote-delivered.
    pub remote_sent: u64,
    /// Failed remote POST attempts.
    pub remote_failures: u64,
}

/// The store-and-forward data logger.
pub struct DataLogger {
    config: Mutex<LoggerConfig>,
    queue: Mutex<VecDeque<Queued>>,
    local_sink: Arc<dyn LocalSink>,
    remote_sink: Arc<dyn RemoteSink>,
    network_connected: AtomicBool,
    flush_pending: AtomicBool,
    last_remote_attempt: Mutex<Option<DateTime<Utc>>>,
    dropped_age: AtomicU64,
    dropped_backpressure: AtomicU64,
    remote_sent: AtomicU64,
    remote_failures: AtomicU64,
    running: AtomicBool,
    handle: Mutex<Option<JoinHandle<()>>>,
    /// Fired whenever an entry is dropped by ring-buffer backpressure, with
    /// a human-readable warning string.
    pub on_warning: Slot<dyn Fn(String) + Send + Sync>,
}

impl DataLogger {
    #[must_use]
    /// Construct a logger with the given sinks and configuration.
    pub fn new(config: LoggerConfig, local_sink: Arc<dyn LocalSink>, remote_sink: Arc<dyn RemoteSink>) -> DataLogger {
        DataLogger {
            config: Mutex::new(config),
            queue: Mutex::new(VecDeque::new()),
            local_sink,
            remote_sink,
            network_connected: AtomicBool::new(false),
            flush_pending: AtomicBool::new(false),
            last_remote_attempt: Mutex::new(None),
            dropped_age: AtomicU64::new(0),
            dropped_backpressure: AtomicU64::new(0),
            remote_sent: AtomicU64::new(0),
            remote_failures: AtomicU64::new(0),
            running: AtomicBool::new(false),
            handle: Mutex::new(None),
            on_warning: Slot::default(),
        }
    }

    #[must_use]
    /// Whether remote delivery is currently gated on.
    pub fn remote_enabled(&self) -> bool {
        self.config.lock().unwrap_or_else(|e| e.into_inner()).remote_enabled
    }

    #[must_use]
    /// A snapshot of the counters tracked for the health/diagnostics view.
    pub fn stats(&self) -> LoggerStats {
        LoggerStats {
            total_dropped_age: self.dropped_age.load(Ordering::Relaxed),
            total_dropped_backpressure: self.dropped_backpressure.load(Ordering::Relaxed),
            remote_sent: self.remote_sent.load(Ordering::Relaxed),
            remote_failures: self.remote_failures.load(Ordering::Relaxed),
        }
    }

    #[must_use]
    /// Current queue depth.
    pub fn queue_depth(&self) -> usize {
        self.queue.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Enqueue a reading from any thread. Evicts the oldest entry (FIFO)
    /// and fires `on_warning` if the queue is already full.
    pub fn log(&self, module_id: i64, value: f64, status: impl Into<String>, timestamp: DateTime<Utc>) {
        let mut queue = self.queue.lock().unwrap_or_else(|e| e.into_inner());
        if queue.len() >= LOG_QUEUE_SIZE {
            queue.pop_front();
            self.dropped_backpressure.fetch_add(1, Ordering::Relaxed);
            drop(queue);
            self.on_warning.invoke(format!("log queue full ({LOG_QUEUE_SIZE} entries); dropped oldest"));
            queue = self.queue.lock().unwrap_or_else(|e| e.into_inner());
        }
        queue.push_back(Queued { entry: LogEntry { module_id, value, status: status.into(), timestamp }, locally_persisted: false });
    }

    /// Called by the actuator controller's degraded-mode callback (spec.md
    /// §4.6). A false->true transition with `flush_on_reconnect` raises
    /// `flush_pending` and resets the failure backoff.
    pub fn notify_connection(&self, connected: bool) {
        let was_connected = self.network_connected.swap(connected, Ordering::SeqCst);
        if !was_connected && connected {
            let flush_on_reconnect = self.config.lock().unwrap_or_else(|e| e.into_inner()).flush_on_reconnect;
            if flush_on_reconnect {
                self.flush_pending.store(true, Ordering::SeqCst);
                self.remote_failures.store(0, Ordering::Relaxed);
                *self.last_remote_attempt.lock().unwrap_or_else(|e| e.into_inner()) = None;
            }
        }
    }

    /// Request an immediate remote attempt on the next worker wake,
    /// regardless of backoff state.
    pub fn force_flush(&self) {
        self.flush_pending.store(true, Ordering::SeqCst);
    }

    /// Run exactly one worker pass: age eviction, local write, and
    /// (conditionally) remote delivery. Returns the number of entries
    /// remote-delivered this pass.
    pub fn run_once(&self, now: DateTime<Utc>) -> u64 {
        self.evict_aged(now);
        self.write_local_batch();
        self.maybe_flush_remote(now)
    }

    fn evict_aged(&self, now: DateTime<Utc>) {
        let max_age = self.config.lock().unwrap_or_else(|e| e.into_inner()).max_queue_age_seconds;
        let mut queue = self.queue.lock().unwrap_or_else(|e| e.into_inner());
        while let Some(front) = queue.front() {
            let age = (now - front.entry.timestamp).num_seconds();
            if age > max_age {
                queue.pop_front();
                self.dropped_age.fetch_add(1, Ordering::Relaxed);
            } else {
                break;
            }
        }
    }

    fn write_local_batch(&self) {
        let local_enabled = self.config.lock().unwrap_or_else(|e| e.into_inner()).local_enabled;
        if !local_enabled {
            return;
        }
        let batch: Vec<LogEntry> = {
            let queue = self.queue.lock().unwrap_or_else(|e| e.into_inner());
            queue.iter().filter(|q| !q.locally_persisted).take(MAX_LOG_BATCH_SIZE).map(|q| q.entry.clone()).collect()
        };
        if batch.is_empty() {
            return;
        }
        if self.local_sink.insert_log_batch(&batch).is_ok() {
            let mut queue = self.queue.lock().unwrap_or_else(|e| e.into_inner());
            let mut remaining = batch.len();
            for q in queue.iter_mut() {
                if remaining == 0 {
                    break;
                }
                if !q.locally_persisted {
                    q.locally_persisted = true;
                    remaining -= 1;
                }
            }
        }
    }

    fn remote_should_attempt(&self, now: DateTime<Utc>) -> bool {
        let cfg = self.config.lock().unwrap_or_else(|e| e.into_inner());
        let flush_pending = self.flush_pending.load(Ordering::SeqCst);
        let gated = cfg.remote_enabled && cfg.remote_available && self.network_connected.load(Ordering::SeqCst);
        if !gated && !flush_pending {
            return false;
        }
        let last_attempt = *self.last_remote_attempt.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(last) = last_attempt {
            if self.remote_failures.load(Ordering::Relaxed) > 0 && (now - last).num_seconds() < REMOTE_RETRY_INTERVAL_SECS {
                return false;
            }
        }
        true
    }

    fn maybe_flush_remote(&self, now: DateTime<Utc>) -> u64 {
        if !self.remote_should_attempt(now) {
            return 0;
        }
        let device_id = self.config.lock().unwrap_or_else(|e| e.into_inner()).device_id.clone();
        let mut sent_total = 0u64;
        loop {
            let batch: Vec<LogEntry> = {
                let queue = self.queue.lock().unwrap_or_else(|e| e.into_inner());
                queue.iter().take(REMOTE_BATCH_SIZE).map(|q| q.entry.clone()).collect()
            };
            if batch.is_empty() {
                break;
            }
            *self.last_remote_attempt.lock().unwrap_or_else(|e| e.into_inner()) = Some(now);
            match self.remote_sink.post_batch(&device_id, &batch) {
                Ok(()) => {
                    let sent = batch.len();
                    let mut queue = self.queue.lock().unwrap_or_else(|e| e.into_inner());
                    for _ in 0..sent {
                        queue.pop_front();
                    }
                    drop(queue);
                    self.remote_sent.fetch_add(sent as u64, Ordering::Relaxed);
                    sent_total += sent as u64;
                    self.remote_failures.store(0, Ordering::Relaxed);
                    if sent < REMOTE_BATCH_SIZE {
                        break; // queue drained
                    }
                }
                Err(_) => {
                    self.remote_failures.fetch_add(1, Ordering::Relaxed);
                    break;
                }
            }
        }
        self.flush_pending.store(false, Ordering::SeqCst);
        sent_total
    }

    #[must_use]
    /// Whether the worker thread is running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Start the worker thread, waking every `interval_seconds`. No-op if
    /// already running.
    pub fn start(self: &Arc<Self>) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }
        let logger = Arc::clone(self);
        let period = Duration::from_secs(logger.config.lock().unwrap_or_else(|e| e.into_inner()).interval_seconds.max(1));
        let handle = std::thread::spawn(move || {
            while logger.running.load(Ordering::SeqCst) {
                logger.run_once(Utc::now());
                std::thread::sleep(period);
            }
        });
        *self.handle.lock().unwrap_or_else(|e| e.into_inner()) = Some(handle);
    }

    /// Stop the worker thread and join it. No-op if not running.
    pub fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        if let Some(handle) = self.handle.lock().unwrap_or_else(|e| e.into_inner()).take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    struct RecordingLocal {
        batches: StdMutex<Vec<Vec<LogEntry>>>,
    }

    impl LocalSink for RecordingLocal {
        fn insert_log_batch(&self, entries: &[LogEntry]) -> Result<(), RtuError> {
            self.batches.lock().unwrap().push(entries.to_vec());
            Ok(())
        }
    }

    struct FlakyRemote {
        fail_next: StdMutex<bool>,
        delivered: StdMutex<Vec<LogEntry>>,
    }

    impl RemoteSink for FlakyRemote {
        fn post_batch(&self, _device: &str, batch: &[LogEntry]) -> Result<(), RtuError> {
            if *self.fail_next.lock().unwrap() {
                return Err(RtuError::new(crate::error::ErrorKind::IoError, "simulated failure"));
            }
            self.delivered.lock().unwrap().extend_from_slice(batch);
            Ok(())
        }
    }

    fn entry(module_id: i64, ts: DateTime<Utc>) -> LogEntry {
        LogEntry { module_id, value: 1.0, status: "Good".into(), timestamp: ts }
    }

    #[test]
    fn backpressure_drops_oldest_and_warns() {
        let local = Arc::new(RecordingLocal { batches: StdMutex::new(Vec::new()) });
        let remote = Arc::new(NoRemote);
        let logger = DataLogger::new(LoggerConfig::default(), local, remote);
        let warned = Arc::new(StdMutex::new(false));
        let w = Arc::clone(&warned);
        logger.on_warning.set(Box::new(move |_| *w.lock().unwrap() = true));

        let now = Utc::now();
        for i in 0..LOG_QUEUE_SIZE + 5 {
            logger.log(i as i64, 1.0, "Good", now);
        }
        assert_eq!(logger.queue_depth(), LOG_QUEUE_SIZE);
        assert!(*warned.lock().unwrap());
        assert_eq!(logger.stats().total_dropped_backpressure, 5);
    }

    #[test]
    fn aged_entries_are_evicted_from_the_queue() {
        let local = Arc::new(RecordingLocal { batches: StdMutex::new(Vec::new()) });
        let remote = Arc::new(NoRemote);
        let mut cfg = LoggerConfig::default();
        cfg.max_queue_age_seconds = 10;
        let logger = DataLogger::new(cfg, local, remote);

        let now = Utc::now();
        logger.log(1, 1.0, "Good", now - chrono::Duration::seconds(20));
        logger.log(2, 1.0, "Good", now);
        logger.run_once(now);
        assert_eq!(logger.stats().total_dropped_age, 1);
        assert_eq!(logger.queue_depth(), 1);
    }

    #[test]
    fn local_write_is_always_attempted_even_without_remote() {
        let local = Arc::new(RecordingLocal { batches: StdMutex::new(Vec::new()) });
        let remote = Arc::new(NoRemote);
        let logger = DataLogger::new(LoggerConfig::default(), local.clone(), remote);

        let now = Utc::now();
        logger.log(1, 1.0, "Good", now);
        logger.run_once(now);
        assert_eq!(local.batches.lock().unwrap().len(), 1);
        // queue still holds the entry: local write doesn't dequeue, only remote delivery does
        assert_eq!(logger.queue_depth(), 1);
    }

    #[test]
    fn remote_delivery_drains_the_queue_in_sub_batches() {
        let local = Arc::new(RecordingLocal { batches: StdMutex::new(Vec::new()) });
        let remote = Arc::new(FlakyRemote { fail_next: StdMutex::new(false), delivered: StdMutex::new(Vec::new()) });
        let mut cfg = LoggerConfig::default();
        cfg.remote_enabled = true;
        cfg.remote_available = true;
        let logger = DataLogger::new(cfg, local, remote.clone());
        logger.notify_connection(true);

        let now = Utc::now();
        for i in 0..200 {
            logger.log(i, 1.0, "Good", now);
        }
        let sent = logger.run_once(now);
        assert_eq!(sent, 200);
        assert_eq!(logger.stats().remote_sent, 200);
        assert_eq!(logger.queue_depth(), 0);
        assert_eq!(remote.delivered.lock().unwrap().len(), 200);
    }

    #[test]
    fn remote_failure_enters_backoff_until_retry_interval_elapses() {
        let local = Arc::new(RecordingLocal { batches: StdMutex::new(Vec::new()) });
        let remote = Arc::new(FlakyRemote { fail_next: StdMutex::new(true), delivered: StdMutex::new(Vec::new()) });
        let mut cfg = LoggerConfig::default();
        cfg.remote_enabled = true;
        let logger = DataLogger::new(cfg, local, remote.clone());
        logger.notify_connection(true);

        let now = Utc::now();
        logger.log(1, 1.0, "Good", now);
        logger.run_once(now);
        assert_eq!(logger.stats().remote_failures, 1);

        // immediate retry within the backoff window is skipped
        logger.log(2, 1.0, "Good", now);
        logger.run_once(now + chrono::Duration::seconds(10));
        assert_eq!(logger.stats().remote_failures, 1);

        // after the retry interval, an attempt is made again (and fails again)
        logger.run_once(now + chrono::Duration::seconds(61));
        assert_eq!(logger.stats().remote_failures, 2);
    }

    #[test]
    fn reconnect_with_flush_on_reconnect_raises_flush_pending_and_resets_failures() {
        let local = Arc::new(RecordingLocal { batches: StdMutex::new(Vec::new()) });
        let remote = Arc::new(FlakyRemote { fail_next: StdMutex::new(false), delivered: StdMutex::new(Vec::new()) });
        let mut cfg = LoggerConfig::default();
        cfg.remote_enabled = false; // gated off, but flush_pending should override
        let logger = DataLogger::new(cfg, local, remote.clone());

        let now = Utc::now();
        logger.log(1, 1.0, "Good", now);
        logger.notify_connection(true); // false -> true transition
        let sent = logger.run_once(now);
        assert_eq!(sent, 1);
        assert_eq!(remote.delivered.lock().unwrap().len(), 1);
    }

    #[test]
    fn force_flush_triggers_an_attempt_even_when_gated_off() {
        let local = Arc::new(RecordingLocal { batches: StdMutex::new(Vec::new()) });
        let remote = Arc::new(FlakyRemote { fail_next: StdMutex::new(false), delivered: StdMutex::new(Vec::new()) });
        let cfg = LoggerConfig { remote_enabled: false, ..LoggerConfig::default() };
        let logger = DataLogger::new(cfg, local, remote.clone());

        let now = Utc::now();
        logger.log(1, 1.0, "Good", now);
        logger.force_flush();
        let sent = logger.run_once(now);
        assert_eq!(sent, 1);
    }

    #[test]
    fn start_stop_is_idempotent() {
        let local = Arc::new(RecordingLocal { batches: StdMutex::new(Vec::new()) });
        let remote = Arc::new(NoRemote);
        let cfg = LoggerConfig { interval_seconds: 1, ..LoggerConfig::default() };
        let logger = Arc::new(DataLogger::new(cfg, local, remote));
        logger.start();
        logger.start();
        assert!(logger.is_running());
        logger.stop();
        logger.stop();
        assert!(!logger.is_running());
    }

    #[test]
    fn remote_payload_matches_the_wire_format() {
        let now = DateTime::<Utc>::UNIX_EPOCH + chrono::Duration::seconds(1_700_000_000);
        let batch = vec![LogEntry { module_id: 3, value: 21.5, status: "Good".into(), timestamp: now }];
        let payload = build_payload("rtu-01", &batch);
        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(value["device"], "rtu-01");
        assert_eq!(value["data"][0]["module_id"], 3);
        assert_eq!(value["data"][0]["value"], 21.5);
        assert_eq!(value["data"][0]["status"], "Good");
        assert_eq!(value["data"][0]["timestamp"], 1_700_000_000);
    }
}
