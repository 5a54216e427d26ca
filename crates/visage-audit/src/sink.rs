//! Bounded, non-blocking audit sink.
//!
//! Events flow through a bounded channel to a dedicated writer thread which
//! appends one JSON object per line to `audit/YYYY-MM-DD.log`. The writer
//! rotates by filename date at local midnight and runs the retention sweep
//! on open and at every rotation. `log()` never blocks: on a saturated
//! queue the event is dropped and a single summary event is emitted at most
//! once per minute.

use crate::errors::*;
use crate::event::{AuditEvent, AuditEventType, AuditOutcome};
use crate::retention;
use chrono::{Local, NaiveDate};
use sha2::{Digest, Sha256};
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{sync_channel, Receiver, SyncSender, TrySendError};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{error, warn};

/// Audit sink configuration.
#[derive(Debug, Clone)]
pub struct AuditConfig {
    /// Directory for `YYYY-MM-DD.log[.gz]` files.
    pub dir: PathBuf,
    /// Days before a log file is compressed; twice this before deletion.
    pub retention_days: u32,
    /// Replace user names and hash identifiers in persisted events.
    pub redact_pii: bool,
    /// Bounded queue depth between callers and the writer thread.
    pub queue_capacity: usize,
}

impl AuditConfig {
    pub fn new(dir: PathBuf) -> Self {
        Self {
            dir,
            retention_days: 30,
            redact_pii: false,
            queue_capacity: 1024,
        }
    }
}

/// Cloneable handle to the audit writer.
#[derive(Clone)]
pub struct AuditSink {
    shared: Arc<SinkShared>,
}

struct SinkShared {
    tx: Mutex<Option<SyncSender<AuditEvent>>>,
    writer: Mutex<Option<JoinHandle<()>>>,
    dropped: AtomicU64,
    last_drop_report: Mutex<Instant>,
}

impl AuditSink {
    /// Open the sink, spawning the writer thread. Fails if the audit
    /// directory cannot be created or written.
    pub fn open(config: AuditConfig) -> Result<Self> {
        fs::create_dir_all(&config.dir)?;

        // Probe writability up front so startup fails loudly
        let probe = config.dir.join(".write_probe");
        fs::write(&probe, b"ok")?;
        fs::remove_file(&probe)?;

        let (tx, rx) = sync_channel(config.queue_capacity);
        let writer_config = config.clone();
        let handle = std::thread::Builder::new()
            .name("visage-audit".to_string())
            .spawn(move || writer_loop(writer_config, rx))
            .map_err(AuditError::Io)?;

        Ok(Self {
            shared: Arc::new(SinkShared {
                tx: Mutex::new(Some(tx)),
                writer: Mutex::new(Some(handle)),
                dropped: AtomicU64::new(0),
                last_drop_report: Mutex::new(
                    Instant::now()
                        .checked_sub(Duration::from_secs(61))
                        .unwrap_or_else(Instant::now),
                ),
            }),
        })
    }

    /// Append an event. Never blocks; saturation drops the event.
    pub fn log(&self, event: AuditEvent) {
        let guard = match self.shared.tx.lock() {
            Ok(g) => g,
            Err(_) => return,
        };
        let Some(tx) = guard.as_ref() else { return };

        self.report_drops(tx);

        match tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                self.shared.dropped.fetch_add(1, Ordering::Relaxed);
            }
            Err(TrySendError::Disconnected(_)) => {
                warn!("Audit writer thread is gone; event discarded");
            }
        }
    }

    /// If events were dropped, emit one summary event per minute at most.
    fn report_drops(&self, tx: &SyncSender<AuditEvent>) {
        let dropped = self.shared.dropped.load(Ordering::Relaxed);
        if dropped == 0 {
            return;
        }

        let mut last = match self.shared.last_drop_report.lock() {
            Ok(g) => g,
            Err(_) => return,
        };
        if last.elapsed() < Duration::from_secs(60) {
            return;
        }

        let summary = AuditEvent::new(
            AuditEventType::EventsDropped,
            AuditOutcome::Failure,
            "audit",
        )
        .with_info("dropped_count", &dropped.to_string());

        if tx.try_send(summary).is_ok() {
            self.shared.dropped.fetch_sub(dropped, Ordering::Relaxed);
            *last = Instant::now();
        }
    }

    /// Flush and stop the writer thread. Called automatically on last drop.
    pub fn shutdown(&self) {
        if let Ok(mut guard) = self.shared.tx.lock() {
            guard.take();
        }
        if let Ok(mut guard) = self.shared.writer.lock() {
            if let Some(handle) = guard.take() {
                let _ = handle.join();
            }
        }
    }
}

impl Drop for SinkShared {
    fn drop(&mut self) {
        if let Ok(mut guard) = self.tx.lock() {
            guard.take();
        }
        if let Ok(mut guard) = self.writer.lock() {
            if let Some(handle) = guard.take() {
                let _ = handle.join();
            }
        }
    }
}

struct OpenLog {
    date: NaiveDate,
    writer: BufWriter<File>,
}

fn writer_loop(config: AuditConfig, rx: Receiver<AuditEvent>) {
    if let Err(e) = retention::sweep(&config.dir, config.retention_days) {
        warn!("Audit retention sweep failed: {}", e);
    }

    let mut open: Option<OpenLog> = None;

    while let Ok(event) = rx.recv() {
        let event = if config.redact_pii {
            redact(event)
        } else {
            event
        };

        let today = Local::now().date_naive();
        let rotate = open.as_ref().map(|o| o.date != today).unwrap_or(true);
        if rotate {
            match open_log(&config.dir, today) {
                Ok(log) => {
                    open = Some(log);
                    if let Err(e) = retention::sweep(&config.dir, config.retention_days) {
                        warn!("Audit retention sweep failed: {}", e);
                    }
                }
                Err(e) => {
                    error!("Cannot open audit log for {}: {}", today, e);
                    continue;
                }
            }
        }

        let Some(log) = open.as_mut() else { continue };
        match serde_json::to_string(&event) {
            Ok(line) => {
                if writeln!(log.writer, "{}", line).and_then(|_| log.writer.flush()).is_err() {
                    error!("Audit append failed; reopening on next event");
                    open = None;
                }
            }
            Err(e) => error!("Audit event serialization failed: {}", e),
        }
    }
}

fn open_log(dir: &std::path::Path, date: NaiveDate) -> std::io::Result<OpenLog> {
    let path = dir.join(format!("{}.log", date.format("%Y-%m-%d")));
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    Ok(OpenLog {
        date,
        writer: BufWriter::new(file),
    })
}

/// Hash an identifier down to a short stable digest.
fn hash_identifier(value: &str) -> String {
    let digest = Sha256::digest(value.as_bytes());
    let mut out = String::with_capacity(16);
    for byte in digest.iter().take(8) {
        out.push_str(&format!("{:02x}", byte));
    }
    out
}

fn redact(mut event: AuditEvent) -> AuditEvent {
    if let Some(user_id) = event.user_id.take() {
        event.user_id = Some(hash_identifier(&user_id));
    }
    if event.client_id != "unknown" && event.client_id != "audit" {
        event.client_id = hash_identifier(&event.client_id);
    }
    if event.user_name.is_some() {
        event.user_name = Some("[redacted]".to_string());
    }
    event
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{AuditEventType, AuditOutcome};

    fn read_today(dir: &std::path::Path) -> Vec<serde_json::Value> {
        let path = dir.join(format!("{}.log", Local::now().date_naive().format("%Y-%m-%d")));
        std::fs::read_to_string(path)
            .unwrap_or_default()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    #[test]
    fn test_append_one_line_per_event() {
        let dir = tempfile::TempDir::new().unwrap();
        let sink = AuditSink::open(AuditConfig::new(dir.path().to_path_buf())).unwrap();

        for i in 0..3 {
            sink.log(
                AuditEvent::new(
                    AuditEventType::Recognition,
                    AuditOutcome::Success,
                    &format!("client_{}", i),
                ),
            );
        }
        sink.shutdown();

        let lines = read_today(dir.path());
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0]["event_type"], "recognition");
    }

    #[test]
    fn test_redaction_hashes_identifiers() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut config = AuditConfig::new(dir.path().to_path_buf());
        config.redact_pii = true;
        let sink = AuditSink::open(config).unwrap();

        sink.log(
            AuditEvent::new(
                AuditEventType::Deletion,
                AuditOutcome::Success,
                "client_secret_id",
            )
            .with_user("john_smith_1", "John Smith"),
        );
        sink.shutdown();

        let lines = read_today(dir.path());
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0]["user_name"], "[redacted]");
        assert_ne!(lines[0]["user_id"], "john_smith_1");
        assert_ne!(lines[0]["client_id"], "client_secret_id");
    }

    #[test]
    fn test_unwritable_dir_fails_open() {
        let result = AuditSink::open(AuditConfig::new(PathBuf::from(
            "/proc/definitely/not/writable",
        )));
        assert!(result.is_err());
    }
}
