//! Background thread that runs checkpoint passes on a fixed delay
//!
//! The thread sleeps one tick at a time and runs a pass every
//! `checkpoint_interval` ticks, counted from the end of the previous pass.
//! Stopping wakes a sleeping thread at once; a pass in flight always
//! finishes first.

use crate::checkpointer::Checkpointer;
use crate::error::CheckpointError;
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{error, info};

/// Name of the checkpoint thread
pub const DRIVER_THREAD_NAME: &str = "tilestore-checkpoint";

/// Whether the checkpoint thread is running
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DriverState {
    /// No thread
    #[default]
    Stopped,
    /// Thread is ticking
    Running,
}

#[derive(Debug, Default)]
struct Signal {
    state: Mutex<DriverState>,
    wake: Condvar,
}

#[derive(Debug, Default)]
pub(crate) struct Driver {
    signal: Arc<Signal>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl Driver {
    pub(crate) fn state(&self) -> DriverState {
        *self.signal.state.lock()
    }

    pub(crate) fn start(
        &self,
        checkpointer: Arc<Checkpointer>,
        interval: u32,
        tick: Duration,
    ) -> Result<(), CheckpointError> {
        let mut handle = self.handle.lock();
        {
            let mut state = self.signal.state.lock();
            if *state == DriverState::Running {
                return Err(CheckpointError::AlreadyRunning);
            }
            *state = DriverState::Running;
        }

        let signal = Arc::clone(&self.signal);
        let spawned = thread::Builder::new()
            .name(DRIVER_THREAD_NAME.to_string())
            .spawn(move || run_loop(&signal, &checkpointer, interval, tick));
        match spawned {
            Ok(join) => {
                *handle = Some(join);
                Ok(())
            }
            Err(e) => {
                *self.signal.state.lock() = DriverState::Stopped;
                Err(CheckpointError::Spawn(e))
            }
        }
    }

    pub(crate) fn stop(&self) {
        let mut handle = self.handle.lock();
        {
            let mut state = self.signal.state.lock();
            *state = DriverState::Stopped;
            self.signal.wake.notify_all();
        }
        if let Some(join) = handle.take() {
            if join.join().is_err() {
                error!(target: "tilestore::checkpoint", "Checkpoint thread panicked");
            }
        }
    }
}

impl Drop for Driver {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Sleep one tick. Returns false once the driver is stopped.
fn wait_tick(signal: &Signal, tick: Duration) -> bool {
    let deadline = Instant::now() + tick;
    let mut state = signal.state.lock();
    while *state == DriverState::Running {
        if signal.wake.wait_until(&mut state, deadline).timed_out() {
            break;
        }
    }
    *state == DriverState::Running
}

fn run_loop(signal: &Signal, checkpointer: &Checkpointer, interval: u32, tick: Duration) {
    info!(
        target: "tilestore::checkpoint",
        interval,
        tick_ms = tick.as_millis() as u64,
        "Checkpoint driver started"
    );
    let mut ticks = 0u32;
    while wait_tick(signal, tick) {
        ticks += 1;
        if ticks < interval {
            continue;
        }
        ticks = 0;
        if let Err(err) = checkpointer.run_pass() {
            error!(target: "tilestore::checkpoint", error = %err, "Checkpoint pass failed, retrying next interval");
        }
    }
    info!(target: "tilestore::checkpoint", "Checkpoint driver stopped");
}
