//! Periodic index flushing.

use super::EngineInner;
use crate::error::{CoreError, CoreResult};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, warn};

/// Background thread that persists dirty indexes on a fixed interval.
///
/// The worker holds only a weak reference to the engine, so it never keeps
/// a dropped engine alive.
pub(crate) struct FlushWorker {
    stop_tx: Sender<()>,
    done_rx: Receiver<()>,
    handle: Option<JoinHandle<()>>,
}

impl FlushWorker {
    /// Starts the worker. A zero interval disables it.
    pub(crate) fn spawn(engine: &Arc<EngineInner>, interval: Duration) -> CoreResult<Option<Self>> {
        if interval.is_zero() {
            return Ok(None);
        }

        let (stop_tx, stop_rx) = mpsc::channel();
        let (done_tx, done_rx) = mpsc::channel();
        let engine = Arc::downgrade(engine);
        let handle = thread::Builder::new()
            .name("segdb-flush".into())
            .spawn(move || {
                run(&engine, interval, &stop_rx);
                let _ = done_tx.send(());
            })
            .map_err(|e| CoreError::invalid_operation(format!("could not start flush worker: {e}")))?;

        debug!(?interval, "flush worker started");
        Ok(Some(Self {
            stop_tx,
            done_rx,
            handle: Some(handle),
        }))
    }

    /// Signals the worker and waits up to `grace` for it to finish.
    ///
    /// Returns false if the worker was still busy when the grace period
    /// ran out; it is then left to finish on its own.
    pub(crate) fn stop(mut self, grace: Duration) -> bool {
        let _ = self.stop_tx.send(());
        match self.done_rx.recv_timeout(grace) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if let Some(handle) = self.handle.take() {
                    let _ = handle.join();
                }
                true
            }
            Err(RecvTimeoutError::Timeout) => false,
        }
    }
}

fn run(engine: &Weak<EngineInner>, interval: Duration, stop_rx: &Receiver<()>) {
    loop {
        match stop_rx.recv_timeout(interval) {
            Err(RecvTimeoutError::Timeout) => {}
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
        }
        let Some(engine) = engine.upgrade() else {
            break;
        };
        if let Err(e) = engine.flush() {
            warn!(error = %e, "auto-flush failed");
        }
    }
    debug!("flush worker stopped");
}
