//! Test Scheduler for deterministic testing of time-based operators.
//!
//! Provides virtual time that only advances when explicitly instructed,
//! enabling deterministic testing of `delay`, `debounce`, `interval`, etc.
//!
//! # Usage
//!
//! ```rust
//! use std::time::Duration;
//!
//! use rxsignal::prelude::*;
//!
//! let scheduler = TestScheduler::new();
//! let latest = Signal::just(42)
//!   .delay_on(Duration::from_millis(100), scheduler.clone())
//!   .to_variable();
//!
//! assert!(latest.is_absent());
//! // Advance virtual time to trigger the delayed emission
//! scheduler.advance_by(Duration::from_millis(100));
//! assert_eq!(latest.get(), Some(42));
//! ```
//!
//! Clones share the same clock and queue. Tasks run synchronously on the
//! thread that advances time.

use std::{
  cmp::Ordering,
  collections::BinaryHeap,
  sync::Arc,
  time::{Duration, Instant},
};

use parking_lot::Mutex;

use super::Timer;
use crate::disposable::Disposable;

// ==================== Internal State ====================

struct State {
  origin: Instant,
  virtual_time: Duration,
  task_queue: BinaryHeap<PendingTask>,
  next_task_id: u64,
}

struct PendingTask {
  scheduled_time: Duration,
  task_id: u64,
  task: Box<dyn FnOnce() + Send>,
  handle: Disposable,
}

impl PartialEq for PendingTask {
  fn eq(&self, other: &Self) -> bool {
    self.scheduled_time == other.scheduled_time && self.task_id == other.task_id
  }
}

impl Eq for PendingTask {}

impl PartialOrd for PendingTask {
  fn partial_cmp(&self, other: &Self) -> Option<Ordering> { Some(self.cmp(other)) }
}

impl Ord for PendingTask {
  fn cmp(&self, other: &Self) -> Ordering {
    // Min-heap: earlier times first, then FIFO by task_id
    other
      .scheduled_time
      .cmp(&self.scheduled_time)
      .then_with(|| other.task_id.cmp(&self.task_id))
  }
}

// ==================== TestScheduler ====================

/// A virtual time [`Timer`] for deterministic tests.
#[derive(Clone)]
pub struct TestScheduler {
  state: Arc<Mutex<State>>,
}

impl Default for TestScheduler {
  fn default() -> Self { Self::new() }
}

impl TestScheduler {
  pub fn new() -> Self {
    TestScheduler {
      state: Arc::new(Mutex::new(State {
        origin: Instant::now(),
        virtual_time: Duration::ZERO,
        task_queue: BinaryHeap::new(),
        next_task_id: 0,
      })),
    }
  }

  /// Virtual time elapsed since creation.
  pub fn elapsed(&self) -> Duration { self.state.lock().virtual_time }

  /// Number of queued tasks that have not been cancelled.
  pub fn pending(&self) -> usize {
    self.state.lock().task_queue.iter().filter(|t| !t.handle.is_disposed()).count()
  }

  /// Advance virtual time by `duration`, running every task that falls due.
  ///
  /// Tasks run in order of their scheduled time, FIFO for equal times. Tasks
  /// scheduled while advancing run too if they fall inside the window.
  pub fn advance_by(&self, duration: Duration) {
    let target_time = self.state.lock().virtual_time + duration;
    self.advance_to(target_time);
  }

  /// Advance virtual time to `elapsed` since creation.
  pub fn advance_to(&self, elapsed: Duration) {
    self.execute_tasks_until(Some(elapsed));
    let mut state = self.state.lock();
    state.virtual_time = state.virtual_time.max(elapsed);
  }

  /// Run every pending task, jumping time forward as needed.
  ///
  /// Never returns while a periodic source keeps rescheduling itself.
  pub fn flush(&self) { self.execute_tasks_until(None) }

  fn execute_tasks_until(&self, target_time: Option<Duration>) {
    loop {
      let task = {
        let mut state = self.state.lock();
        let due = match state.task_queue.peek() {
          Some(peek) => target_time.map_or(true, |limit| peek.scheduled_time <= limit),
          None => false,
        };
        if !due {
          break;
        }
        let task = state.task_queue.pop();
        if let Some(task) = &task {
          state.virtual_time = state.virtual_time.max(task.scheduled_time);
        }
        task
      };

      if let Some(PendingTask { task, handle, .. }) = task {
        if !handle.is_disposed() {
          task();
          handle.dispose();
        }
      }
    }
  }
}

impl Timer for TestScheduler {
  fn now(&self) -> Instant {
    let state = self.state.lock();
    state.origin + state.virtual_time
  }

  fn run_after(&self, delay: Duration, task: Box<dyn FnOnce() + Send>) -> Disposable {
    let handle = Disposable::empty();
    let mut state = self.state.lock();
    let task_id = state.next_task_id;
    state.next_task_id += 1;
    let scheduled_time = state.virtual_time + delay;
    state.task_queue.push(PendingTask { scheduled_time, task_id, task, handle: handle.clone() });
    handle
  }
}
