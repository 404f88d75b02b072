use std::{
  cmp::Ordering as CmpOrdering,
  sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
  },
  time::{Duration, Instant},
};

use chrono::Local;
use parking_lot::Mutex;

use crate::cron::{Cron, CronError};

/// How a recurring task computes its next due time.
pub(super) enum Recurrence {
  /// Previous due time plus the period.
  FixedRate(Duration),
  /// Completion time plus the period.
  FixedDelay(Duration),
  /// Next cron match after the current wall-clock time.
  Cron(Box<Cron>),
}

impl Recurrence {
  pub(super) fn next_due(&self, due: Instant) -> Result<Instant, CronError> {
    match self {
      Recurrence::FixedRate(period) => Ok(due + *period),
      Recurrence::FixedDelay(period) => Ok(Instant::now() + *period),
      Recurrence::Cron(cron) => cron_due(cron),
    }
  }
}

/// Converts the next cron match into a monotonic due time.
pub(super) fn cron_due(cron: &Cron) -> Result<Instant, CronError> {
  let now = Local::now();
  let next = cron.next_after(&now)?;
  let wait = (next - now).to_std().unwrap_or_default();
  Ok(Instant::now() + wait)
}

pub(super) struct TaskState {
  pub(super) id: u64,
  body: Mutex<Box<dyn FnMut() + Send>>,
  pub(super) recurrence: Option<Recurrence>,
  due: Mutex<Instant>,
  cancelled: AtomicBool,
  done: AtomicBool,
  interrupted: AtomicBool,
}

impl TaskState {
  pub(super) fn new(
    id: u64,
    body: Box<dyn FnMut() + Send>,
    recurrence: Option<Recurrence>,
    due: Instant,
  ) -> Self {
    TaskState {
      id,
      body: Mutex::new(body),
      recurrence,
      due: Mutex::new(due),
      cancelled: AtomicBool::new(false),
      done: AtomicBool::new(false),
      interrupted: AtomicBool::new(false),
    }
  }

  pub(super) fn run(&self) {
    let mut body = self.body.lock();
    (*body)()
  }

  pub(super) fn due(&self) -> Instant { *self.due.lock() }

  pub(super) fn set_due(&self, due: Instant) { *self.due.lock() = due }

  pub(super) fn is_cancelled(&self) -> bool { self.cancelled.load(Ordering::Acquire) }

  /// Marks the task cancelled; `false` if it was already cancelled or done.
  pub(super) fn cancel(&self) -> bool {
    !self.is_done() && !self.cancelled.swap(true, Ordering::AcqRel)
  }

  pub(super) fn is_done(&self) -> bool { self.done.load(Ordering::Acquire) }

  pub(super) fn finish(&self) { self.done.store(true, Ordering::Release) }

  pub(super) fn interrupt(&self) { self.interrupted.store(true, Ordering::Release) }

  pub(super) fn is_interrupted(&self) -> bool { self.interrupted.load(Ordering::Acquire) }
}

/// A queue slot. The heap pops the earliest due time first, then the
/// earliest enqueued.
pub(super) struct Entry {
  pub(super) due: Instant,
  pub(super) sequence: u64,
  pub(super) task: Arc<TaskState>,
}

impl PartialEq for Entry {
  fn eq(&self, other: &Self) -> bool { self.due == other.due && self.sequence == other.sequence }
}

impl Eq for Entry {}

impl PartialOrd for Entry {
  fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> { Some(self.cmp(other)) }
}

impl Ord for Entry {
  fn cmp(&self, other: &Self) -> CmpOrdering {
    other.due.cmp(&self.due).then_with(|| other.sequence.cmp(&self.sequence))
  }
}
