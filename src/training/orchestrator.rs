//! `TrainingOrchestrator` (SPEC_FULL.md §4.6 "Train" / §4.7): runs the
//! epoch/minibatch loop on a dedicated worker thread so the client can poll
//! or block on progress from any other thread. Cancellation is cooperative
//! and only honored at epoch boundaries — mid-epoch cancellation would
//! leave gradient accumulators partially applied.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::errors::{EngineError, EngineResult};
use crate::network::Network;
use crate::resource_handle::NetworkResourceHandle;
use crate::tasks::ComputeTasks;
use crate::training::TrainingSuite;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Pending,
    Running,
    Completed,
    Cancelled,
    Failed,
}

impl RunState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => RunState::Pending,
            1 => RunState::Running,
            2 => RunState::Completed,
            3 => RunState::Cancelled,
            _ => RunState::Failed,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            RunState::Pending => 0,
            RunState::Running => 1,
            RunState::Completed => 2,
            RunState::Cancelled => 3,
            RunState::Failed => 4,
        }
    }
}

/// Progress-reporting handle shared between the client and the worker
/// thread. Every field is safe to read from a thread other than the one
/// updating it.
#[derive(Debug)]
pub struct TrainingResultTracker {
    epoch_progress_bits: AtomicU32,
    epochs_finished: AtomicU64,
    stop_at_next_epoch: AtomicBool,
    state: AtomicU32,
    failure: Mutex<Option<String>>,
}

impl TrainingResultTracker {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            epoch_progress_bits: AtomicU32::new(0.0f32.to_bits()),
            epochs_finished: AtomicU64::new(0),
            stop_at_next_epoch: AtomicBool::new(false),
            state: AtomicU32::new(RunState::Pending.as_u8() as u32),
            failure: Mutex::new(None),
        })
    }

    pub fn epoch_progress(&self) -> f32 {
        f32::from_bits(self.epoch_progress_bits.load(Ordering::Acquire))
    }

    fn set_epoch_progress(&self, value: f32) {
        self.epoch_progress_bits.store(value.to_bits(), Ordering::Release);
    }

    pub fn epochs_finished(&self) -> u64 {
        self.epochs_finished.load(Ordering::Acquire)
    }

    pub fn request_stop_at_next_epoch(&self) {
        self.stop_at_next_epoch.store(true, Ordering::Release);
    }

    pub fn stop_at_next_epoch(&self) -> bool {
        self.stop_at_next_epoch.load(Ordering::Acquire)
    }

    pub fn state(&self) -> RunState {
        RunState::from_u8(self.state.load(Ordering::Acquire) as u8)
    }

    fn set_state(&self, state: RunState) {
        self.state.store(state.as_u8() as u32, Ordering::Release);
    }

    pub fn failure_message(&self) -> Option<String> {
        self.failure.lock().expect("failure mutex poisoned").clone()
    }

    fn set_failure(&self, message: String) {
        *self.failure.lock().expect("failure mutex poisoned") = Some(message);
    }
}

/// What a training run produced: the epoch count actually completed (less
/// than `suite.epochs` if cancelled) and the network with its weights
/// synchronized from the device tensor after the run.
pub struct TrainingOutcome {
    pub epochs_run: u64,
    pub network: Network,
}

/// A training run in flight. Holds the worker thread's `JoinHandle` and a
/// shared [`TrainingResultTracker`] for progress/cancellation.
#[derive(Debug)]
pub struct TrainingOrchestrator {
    tracker: Arc<TrainingResultTracker>,
    worker: Option<JoinHandle<EngineResult<TrainingOutcome>>>,
}

impl TrainingOrchestrator {
    /// Validates the suite against `network`'s topology and spawns the
    /// worker thread. Returns immediately; the caller polls `tracker()` or
    /// calls `join()` to block for completion.
    pub fn spawn(
        mut handle: NetworkResourceHandle,
        mut network: Network,
        suite: TrainingSuite,
        shuffle_seed: Option<u64>,
    ) -> EngineResult<Self> {
        if suite.epochs < 1 {
            return Err(EngineError::InvalidArgument("suite.epochs must be >= 1".into()));
        }
        if suite.training_data.is_empty() {
            return Err(EngineError::InvalidArgument("training_data must be non-empty".into()));
        }
        if suite.training_data[0].input.len() as u32 != network.input_count {
            return Err(EngineError::InvalidArgument(
                "training_data[0].input length does not match network.input_count".into(),
            ));
        }
        if suite.training_data[0].desired_output.len() as u32 != network.output_count() {
            return Err(EngineError::InvalidArgument(
                "training_data[0].desired_output length does not match network.output_count".into(),
            ));
        }

        let tracker = TrainingResultTracker::new();
        let worker_tracker = tracker.clone();

        let worker = std::thread::spawn(move || -> EngineResult<TrainingOutcome> {
            worker_tracker.set_state(RunState::Running);
            let result = run_epochs(&mut handle, &mut network, &suite, shuffle_seed, &worker_tracker)
                .map(|epochs_run| TrainingOutcome { epochs_run, network });
            match &result {
                Ok(_) => worker_tracker.set_state(
                    if worker_tracker.stop_at_next_epoch() { RunState::Cancelled } else { RunState::Completed },
                ),
                Err(e) => {
                    worker_tracker.set_failure(e.to_string());
                    worker_tracker.set_state(RunState::Failed);
                }
            }
            result
        });

        Ok(Self { tracker, worker: Some(worker) })
    }

    pub fn tracker(&self) -> Arc<TrainingResultTracker> {
        self.tracker.clone()
    }

    /// Blocks until the worker thread finishes, returning the trained
    /// network and the number of epochs actually executed.
    pub fn join(mut self) -> EngineResult<TrainingOutcome> {
        match self.worker.take() {
            Some(handle) => handle.join().unwrap_or_else(|_| {
                Err(EngineError::backend("training_orchestrator", "worker thread panicked"))
            }),
            None => Err(EngineError::InvalidArgument("orchestrator already joined".into())),
        }
    }
}

fn run_epochs(
    handle: &mut NetworkResourceHandle,
    network: &mut Network,
    suite: &TrainingSuite,
    shuffle_seed: Option<u64>,
    tracker: &TrainingResultTracker,
) -> EngineResult<u64> {
    let max_minibatch = suite.mini_batch_size.unwrap_or(suite.training_data.len() as u64);
    handle.allocate_training_resources(max_minibatch)?;

    // `training_data` is shuffled in place each epoch so that
    // `regularization_terms`/`minibatch_learning_rate` — which divide by
    // `training_data.len()` — keep seeing the full dataset size; only the
    // sample order changes, never the count passed to `train_minibatch`.
    let mut suite = suite.clone();
    let mut rng = shuffle_seed.map(rand::rngs::StdRng::seed_from_u64);

    let mut epochs_run = 0u64;
    for _epoch in 0..suite.epochs {
        if tracker.stop_at_next_epoch() {
            break;
        }

        if suite.shuffle_training_data {
            match rng.as_mut() {
                Some(r) => suite.training_data.shuffle(r),
                None => {
                    let mut entropy = rand::thread_rng();
                    suite.training_data.shuffle(&mut entropy);
                }
            }
        }

        let total = suite.training_data.len();
        let batch_size = suite.mini_batch_size.unwrap_or(total as u64).max(1) as usize;
        let mut begin = 0usize;
        while begin < total {
            let end = (begin + batch_size).min(total);
            ComputeTasks::train_minibatch(handle, network, &suite, begin, end)?;
            tracker.set_epoch_progress(end as f32 / total as f32);
            begin = end;
        }

        tracker.epochs_finished.fetch_add(1, Ordering::AcqRel);
        epochs_run += 1;
    }

    handle.synchronize_network_data(network)?;
    handle.free_cached_resources();
    Ok(epochs_run)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_state_round_trips_through_u8() {
        for state in [RunState::Pending, RunState::Running, RunState::Completed, RunState::Cancelled, RunState::Failed] {
            assert_eq!(RunState::from_u8(state.as_u8()), state);
        }
    }

    #[test]
    fn tracker_starts_pending_with_zero_progress() {
        let tracker = TrainingResultTracker::new();
        assert_eq!(tracker.state(), RunState::Pending);
        assert_eq!(tracker.epoch_progress(), 0.0);
        assert_eq!(tracker.epochs_finished(), 0);
        assert!(!tracker.stop_at_next_epoch());
    }

    #[test]
    fn requesting_stop_is_visible_immediately() {
        let tracker = TrainingResultTracker::new();
        tracker.request_stop_at_next_epoch();
        assert!(tracker.stop_at_next_epoch());
    }
}
