//! Producer/estimator/consumer pipeline.
//!
//! The input worker produces color frames, the estimator turns them into
//! keypoints and the output worker consumes the results. Each stage runs on
//! its own thread, joined by bounded channels, unless multithreading is
//! disabled, in which case all three stages run in sequence on one thread.
//!
//! A stage that fails logs the error and clears the shared running flag,
//! which halts every other stage.

use crate::{camera::ColorImage, engine::Timing, error::Error, pose::PoseKeypoints};
use crossbeam::channel::{bounded, Receiver, RecvTimeoutError, SendTimeoutError, Sender};
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
    time::Duration,
};
use tracing::{debug, error, info, info_span};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// One unit of work flowing through the pipeline.
#[derive(Debug, Clone)]
pub(crate) struct Datum {
    pub(crate) seq: u64,
    pub(crate) image: Arc<ColorImage>,
    pub(crate) keypoints: Option<PoseKeypoints>,
    pub(crate) timing: Timing,
}

impl Datum {
    pub(crate) fn new(seq: u64, image: Arc<ColorImage>) -> Self {
        Self {
            seq,
            image,
            keypoints: None,
            timing: Timing::default(),
        }
    }
}

pub(crate) trait Producer: Send {
    /// Produce the next datum, or `None` when there is nothing to process.
    fn produce(&mut self) -> Result<Option<Datum>, Error>;
}

pub(crate) trait PoseEstimator: Send {
    fn estimate(&mut self, image: &ColorImage) -> Result<PoseKeypoints, Error>;

    /// Cumulative inference timing.
    fn timing(&self) -> Timing {
        Timing::default()
    }
}

pub(crate) trait Consumer: Send {
    fn consume(&mut self, datum: Datum) -> Result<(), Error>;
}

#[derive(Debug, Copy, Clone)]
pub(crate) struct WrapperConfig {
    pub(crate) multi_thread: bool,
    pub(crate) input_queue_size: usize,
    pub(crate) output_queue_size: usize,
}

pub(crate) struct Wrapper {
    running: Arc<AtomicBool>,
    threads: Vec<(&'static str, thread::JoinHandle<()>)>,
}

fn halt(worker: &'static str, operation: &'static str, e: &Error, running: &AtomicBool) {
    error!(
        worker,
        operation,
        error = %e,
        details = ?e,
        "worker failed, stopping"
    );
    running.store(false, Ordering::SeqCst);
}

fn estimate<E>(estimator: &mut E, mut datum: Datum) -> Result<Datum, Error>
where
    E: PoseEstimator,
{
    datum.keypoints = Some(estimator.estimate(&datum.image)?);
    datum.timing = estimator.timing();
    Ok(datum)
}

/// Send `item`, giving up once the pipeline stops or the receiver is gone.
fn forward<T>(tx: &Sender<T>, mut item: T, running: &AtomicBool) -> bool {
    loop {
        match tx.send_timeout(item, POLL_INTERVAL) {
            Ok(()) => return true,
            Err(SendTimeoutError::Timeout(back)) => {
                if !running.load(Ordering::SeqCst) {
                    return false;
                }
                item = back;
            }
            Err(SendTimeoutError::Disconnected(_)) => return false,
        }
    }
}

/// Receive the next item, or `None` once the pipeline stops or the sender is
/// gone.
fn next<T>(rx: &Receiver<T>, running: &AtomicBool) -> Option<T> {
    while running.load(Ordering::SeqCst) {
        match rx.recv_timeout(POLL_INTERVAL) {
            Ok(item) => return Some(item),
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => return None,
        }
    }
    None
}

impl Wrapper {
    pub(crate) fn start<P, E, C>(
        mut producer: P,
        mut estimator: E,
        mut consumer: C,
        config: WrapperConfig,
    ) -> Result<Self, Error>
    where
        P: Producer + 'static,
        E: PoseEstimator + 'static,
        C: Consumer + 'static,
    {
        let running = Arc::new(AtomicBool::new(true));
        let mut wrapper = Self {
            running: running.clone(),
            threads: Vec::with_capacity(3),
        };

        if !config.multi_thread {
            wrapper.spawn("pipeline", move || {
                while running.load(Ordering::SeqCst) {
                    let result = producer
                        .produce()
                        .map_err(|e| ("input", "produce", e))
                        .and_then(|datum| match datum {
                            Some(datum) => estimate(&mut estimator, datum)
                                .map_err(|e| ("pose", "estimate", e))
                                .and_then(|datum| {
                                    consumer.consume(datum).map_err(|e| ("output", "consume", e))
                                }),
                            None => Ok(()),
                        });
                    if let Err((worker, operation, e)) = result {
                        halt(worker, operation, &e, &running);
                    }
                }
            })?;
            return Ok(wrapper);
        }

        let (input_tx, input_rx) = bounded(config.input_queue_size);
        let (output_tx, output_rx) = bounded(config.output_queue_size);

        let running_input = running.clone();
        wrapper.spawn("input", move || {
            while running_input.load(Ordering::SeqCst) {
                match producer.produce() {
                    Ok(Some(datum)) => {
                        if !forward(&input_tx, datum, &running_input) {
                            break;
                        }
                    }
                    Ok(None) => {}
                    Err(e) => halt("input", "produce", &e, &running_input),
                }
            }
        })?;

        let running_pose = running.clone();
        wrapper.spawn("pose", move || {
            while let Some(datum) = next(&input_rx, &running_pose) {
                match estimate(&mut estimator, datum) {
                    Ok(datum) => {
                        if !forward(&output_tx, datum, &running_pose) {
                            break;
                        }
                    }
                    Err(e) => halt("pose", "estimate", &e, &running_pose),
                }
            }
        })?;

        wrapper.spawn("output", move || {
            while let Some(datum) = next(&output_rx, &running) {
                if let Err(e) = consumer.consume(datum) {
                    halt("output", "consume", &e, &running);
                }
            }
        })?;

        Ok(wrapper)
    }

    fn spawn<F>(&mut self, name: &'static str, f: F) -> Result<(), Error>
    where
        F: FnOnce() + Send + 'static,
    {
        let handle = thread::Builder::new()
            .name(format!("pose3d-{}", name))
            .spawn(move || {
                let _span = info_span!("worker", name).entered();
                debug!(worker = name, "worker started");
                f();
                debug!(worker = name, "worker exited");
            })
            .map_err(|e| Error::SpawnWorker(e, name))?;
        self.threads.push((name, handle));
        Ok(())
    }

    /// Whether every worker is still processing.
    pub(crate) fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Signal every worker to stop and wait for them to exit.
    pub(crate) fn stop(mut self) -> Result<(), Error> {
        self.join()
    }

    fn join(&mut self) -> Result<(), Error> {
        self.running.store(false, Ordering::SeqCst);
        let mut result = Ok(());
        for (name, handle) in self.threads.drain(..) {
            if handle.join().is_err() {
                error!(worker = name, "worker panicked");
                result = Err(Error::JoinWorker(name));
            }
        }
        info!("pipeline stopped");
        result
    }
}

impl Drop for Wrapper {
    fn drop(&mut self) {
        if !self.threads.is_empty() {
            let _ = self.join();
        }
    }
}
