// Copyright 2025 Zurich Instruments AG
// SPDX-License-Identifier: Apache-2.0

//! Delivery of telemetry records to subscribers.

use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_channel::Receiver;
use ionpulse_log::error;
use parking_lot::{Condvar, Mutex};

use crate::Result;
use crate::record::TelemetryRecord;

type Subscriber = Box<dyn FnMut(&TelemetryRecord) + Send>;

#[derive(Debug, Default)]
struct Progress {
    delivered: usize,
    acknowledged: usize,
    closed: bool,
}

/// Holds the dispatcher until the consumer has processed the last record.
#[derive(Debug, Default)]
struct Gate {
    progress: Mutex<Progress>,
    condvar: Condvar,
}

impl Gate {
    fn delivered_and_wait(&self) {
        let mut progress = self.progress.lock();
        progress.delivered += 1;
        while progress.acknowledged < progress.delivered && !progress.closed {
            self.condvar.wait(&mut progress);
        }
    }

    fn acknowledge(&self) {
        let mut progress = self.progress.lock();
        progress.acknowledged = (progress.acknowledged + 1).min(progress.delivered);
        self.condvar.notify_all();
    }

    fn close(&self) {
        self.progress.lock().closed = true;
        self.condvar.notify_all();
    }

    fn unacknowledged(&self) -> usize {
        let progress = self.progress.lock();
        progress.delivered - progress.acknowledged
    }
}

/// Reads records off the telemetry channel and calls every subscriber.
///
/// With backpressure enabled the dispatcher waits after each record until
/// [`Dispatcher::acknowledge`] is called, so at most one record is ever
/// waiting to be processed by the consumer.
pub struct Dispatcher {
    subscribers: Arc<Mutex<Vec<Subscriber>>>,
    gate: Arc<Gate>,
    thread: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("subscribers", &self.subscribers.lock().len())
            .field("gate", &self.gate)
            .finish_non_exhaustive()
    }
}

impl Dispatcher {
    pub fn spawn(records: Receiver<TelemetryRecord>, backpressure: bool) -> Result<Self> {
        let subscribers: Arc<Mutex<Vec<Subscriber>>> = Arc::default();
        let gate = Arc::new(Gate::default());
        let thread = {
            let subscribers = Arc::clone(&subscribers);
            let gate = Arc::clone(&gate);
            std::thread::Builder::new()
                .name("pulser-telemetry".to_string())
                .spawn(move || {
                    for record in records.iter() {
                        for subscriber in subscribers.lock().iter_mut() {
                            subscriber(&record);
                        }
                        if backpressure {
                            gate.delivered_and_wait();
                        }
                    }
                })?
        };
        Ok(Dispatcher {
            subscribers,
            gate,
            thread: Some(thread),
        })
    }

    pub fn subscribe(&self, handler: impl FnMut(&TelemetryRecord) + Send + 'static) {
        self.subscribers.lock().push(Box::new(handler));
    }

    /// The consumer finished processing the last delivered record.
    pub fn acknowledge(&self) {
        self.gate.acknowledge();
    }

    /// Records delivered but not yet acknowledged.
    pub fn pending(&self) -> usize {
        self.gate.unacknowledged()
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        self.gate.close();
        if self.thread.take().is_some_and(|thread| thread.join().is_err()) {
            error!("Telemetry dispatcher panicked");
        }
    }
}
