//! Dedicated thread that hands appended entries to the configured sinks, so
//! sink I/O never runs on the caller's thread.

use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::RwLock;
use tracing::error;

use crate::errors::AuditError;
use crate::model::AuditEntry;
use crate::sink::AuditSink;

pub(crate) type SharedSinks = Arc<RwLock<Vec<Arc<dyn AuditSink>>>>;

enum Command {
    Append(Box<AuditEntry>),
    Flush(mpsc::Sender<()>),
    Shutdown,
}

pub(crate) struct SinkWriterHandle {
    tx: Sender<Command>,
    thread: Option<JoinHandle<()>>,
}

impl SinkWriterHandle {
    /// Queues the entry; returns once it is on the channel.
    pub(crate) fn append(&self, entry: AuditEntry) -> Result<(), AuditError> {
        self.tx
            .send(Command::Append(Box::new(entry)))
            .map_err(|err| broken_pipe(err.to_string()))
    }

    /// Blocks until every entry queued before this call has been handed to
    /// the sinks.
    pub(crate) fn flush(&self) -> Result<(), AuditError> {
        let (tx, rx) = mpsc::channel();
        self.tx
            .send(Command::Flush(tx))
            .map_err(|err| broken_pipe(err.to_string()))?;
        rx.recv().map_err(|err| broken_pipe(err.to_string()))
    }
}

impl Drop for SinkWriterHandle {
    fn drop(&mut self) {
        let _ = self.tx.send(Command::Shutdown);
        if let Some(thread) = self.thread.take() {
            if thread.thread().id() != thread::current().id() && thread.join().is_err() {
                error!(target: "audit-log", "audit sink writer exited with a panic");
            }
        }
    }
}

pub(crate) fn spawn(sinks: SharedSinks) -> Result<SinkWriterHandle, AuditError> {
    let (tx, rx) = mpsc::channel();
    let thread = thread::Builder::new()
        .name("audit-sink-writer".into())
        .spawn(move || {
            while let Ok(command) = rx.recv() {
                match command {
                    Command::Append(entry) => write_to_sinks(&sinks, &entry),
                    Command::Flush(reply) => {
                        let _ = reply.send(());
                    }
                    Command::Shutdown => break,
                }
            }
        })?;
    Ok(SinkWriterHandle {
        tx,
        thread: Some(thread),
    })
}

fn write_to_sinks(sinks: &SharedSinks, entry: &AuditEntry) {
    let sinks = sinks.read().clone();
    for sink in sinks {
        match panic::catch_unwind(AssertUnwindSafe(|| sink.write(entry))) {
            Ok(Ok(())) => {}
            Ok(Err(err)) => error!(
                target: "audit-log",
                sink = sink.name(),
                entry_id = %entry.id,
                "audit sink write failed: {err}"
            ),
            Err(_) => error!(
                target: "audit-log",
                sink = sink.name(),
                entry_id = %entry.id,
                "audit sink panicked"
            ),
        }
    }
}

fn broken_pipe(message: String) -> AuditError {
    AuditError::Io(io::Error::new(io::ErrorKind::BrokenPipe, message))
}
