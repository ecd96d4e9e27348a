//! Periodic and on-demand incremental updates.
//!
//! The scheduler thread calls [`Engine::update`] every `interval` and
//! whenever [`Scheduler::trigger`] or [`Scheduler::hint`] is called. Hints
//! (paths reported by a file watcher, for instance) only force an earlier
//! run; every run still walks the roots completely, so missed or dropped
//! notifications never leave the index stale past the next tick. Requests
//! queued while an update runs are folded into a single follow-up run.

use std::path::PathBuf;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, select, tick, unbounded};

use crate::engine::Engine;
use crate::error::{FiledexError, Result};

enum Control {
    Run(Vec<PathBuf>),
    Stop,
}

/// Sends triggers and hints to a running [`Scheduler`]. Messages sent after
/// the scheduler stopped are ignored.
#[derive(Clone)]
pub struct SchedulerHandle {
    control: Sender<Control>,
}

impl SchedulerHandle {
    pub fn trigger(&self) {
        let _ = self.control.send(Control::Run(Vec::new()));
    }

    pub fn hint(&self, paths: Vec<PathBuf>) {
        let _ = self.control.send(Control::Run(paths));
    }
}

/// Background update loop for one engine.
pub struct Scheduler {
    control: Sender<Control>,
    engine: Arc<Engine>,
    handle: Option<JoinHandle<()>>,
}

impl Scheduler {
    /// Start the loop. The first run happens after one `interval` unless
    /// triggered earlier.
    pub fn start(engine: Arc<Engine>, roots: Vec<PathBuf>, interval: Duration) -> Result<Scheduler> {
        if interval.is_zero() {
            return Err(FiledexError::config("update interval must be positive"));
        }
        let (control, rx) = unbounded();
        let worker_engine = Arc::clone(&engine);
        let handle = thread::Builder::new()
            .name("filedex-scheduler".to_string())
            .spawn(move || run_loop(&worker_engine, &roots, interval, &rx))?;
        log::info!("scheduled updates every {interval:?}");

        Ok(Scheduler {
            control,
            engine,
            handle: Some(handle),
        })
    }

    /// Ask for an update as soon as possible.
    pub fn trigger(&self) {
        self.handle().trigger();
    }

    /// Report paths known to have changed; forces an update.
    pub fn hint(&self, paths: Vec<PathBuf>) {
        self.handle().hint(paths);
    }

    /// A cloneable handle for other threads (a file watcher callback).
    pub fn handle(&self) -> SchedulerHandle {
        SchedulerHandle {
            control: self.control.clone(),
        }
    }

    /// Cancel any running update and wait for the thread to exit.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        let _ = self.control.send(Control::Stop);
        self.engine.cancel_handle().cancel();
        if handle.join().is_err() {
            log::error!("scheduler thread panicked");
        }
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_loop(
    engine: &Engine,
    roots: &[PathBuf],
    interval: Duration,
    control: &Receiver<Control>,
) {
    let ticker = tick(interval);
    loop {
        let mut hints = select! {
            recv(ticker) -> _ => Vec::new(),
            recv(control) -> message => match message {
                Ok(Control::Run(paths)) => paths,
                Ok(Control::Stop) | Err(_) => return,
            },
        };

        for message in control.try_iter() {
            match message {
                Control::Run(paths) => hints.extend(paths),
                Control::Stop => return,
            }
        }
        if !hints.is_empty() {
            log::debug!("update forced by {} changed path(s)", hints.len());
        }

        match engine.update(roots) {
            Ok(report) => log::info!(
                "scheduled {} done: {} committed, {} deleted",
                report.mode,
                report.counts.committed,
                report.counts.deleted
            ),
            Err(FiledexError::Cancelled(_)) => log::debug!("scheduled update cancelled"),
            Err(err) => log::error!("scheduled update failed: {err}"),
        }
    }
}
