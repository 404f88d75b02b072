//! Time-ordered task execution.
//!
//! [`Scheduler`] runs one-shot, fixed-rate, fixed-delay and cron tasks. A
//! dedicated dispatcher thread takes the earliest due task from a min-heap,
//! waits for its due time, acquires an admission permit and releases the body
//! to a worker pool, so task bodies never block the dispatcher. The permit
//! returns to the gate when the body finishes; a recurring task is then
//! re-queued under its next due time.
//!
//! Time-based signal operators only need the small [`Timer`] seam, which is
//! implemented by [`Scheduler`] and by the virtual-time [`TestScheduler`].

mod config;
mod task;
mod test_scheduler;

use std::{
  cell::RefCell,
  collections::{BinaryHeap, HashMap},
  fmt, mem,
  panic::{self, AssertUnwindSafe},
  sync::{
    atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
    Arc,
  },
  thread,
  time::{Duration, Instant},
};

pub use config::SchedulerConfig;
use futures::executor::{block_on, ThreadPool};
use once_cell::sync::Lazy;
use parking_lot::{Condvar, Mutex};
use task::{cron_due, Entry, Recurrence, TaskState};
pub use test_scheduler::TestScheduler;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::{
  cron::{Cron, CronError},
  disposable::Disposable,
};

// ============================================================================
// Timer seam
// ============================================================================

/// A clock plus a way to run something later.
pub trait Timer: Send + Sync + 'static {
  fn now(&self) -> Instant;

  /// Runs `task` once after `delay`. Disposing the returned token before the
  /// task starts cancels it.
  fn run_after(&self, delay: Duration, task: Box<dyn FnOnce() + Send>) -> Disposable;
}

impl<T: Timer + ?Sized> Timer for Arc<T> {
  #[inline]
  fn now(&self) -> Instant { (**self).now() }
  #[inline]
  fn run_after(&self, delay: Duration, task: Box<dyn FnOnce() + Send>) -> Disposable {
    (**self).run_after(delay, task)
  }
}

pub type SharedTimer = Arc<dyn Timer>;

static GLOBAL: Lazy<Scheduler> = Lazy::new(|| {
  Scheduler::with_config(SchedulerConfig::default()).expect("start the global scheduler")
});

static GLOBAL_TIMER: Lazy<SharedTimer> = Lazy::new(|| {
  let timer: SharedTimer = Arc::new(Scheduler::clone(&GLOBAL));
  timer
});

/// The timer used by time operators without an explicit one.
pub fn global_timer() -> SharedTimer { GLOBAL_TIMER.clone() }

/// Runs `task` once on `timer`, tied to `disposer`.
///
/// The returned child token cancels the task; it disposes itself after the
/// task has run, so long chains of timer tasks do not pile up in `disposer`.
pub(crate) fn run_once<F>(
  timer: &SharedTimer,
  delay: Duration,
  disposer: &Disposable,
  task: F,
) -> Disposable
where
  F: FnOnce() + Send + 'static,
{
  let slot = disposer.sub();
  let c_slot = slot.clone();
  let handle = timer.run_after(
    delay,
    Box::new(move || {
      if !c_slot.is_disposed() {
        task();
      }
      c_slot.dispose();
    }),
  );
  slot.add_disposable(handle);
  slot
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
  #[error("scheduler is shut down, task rejected")]
  Rejected,
  #[error("failed to start the dispatcher thread: {0}")]
  Startup(#[source] std::io::Error),
  #[error("failed to build the worker pool: {0}")]
  Pool(#[source] std::io::Error),
  #[error(transparent)]
  Cron(#[from] CronError),
}

// ============================================================================
// Scheduler
// ============================================================================

thread_local! {
  static CURRENT_TASK: RefCell<Option<Arc<TaskState>>> = const { RefCell::new(None) };
}

/// Whether the task running on this thread has been cancelled with
/// interruption. Long task bodies poll this to stop early.
pub fn is_interrupted() -> bool {
  CURRENT_TASK.with(|current| current.borrow().as_ref().is_some_and(|task| task.is_interrupted()))
}

/// A handle to a task submitted to a [`Scheduler`].
#[derive(Clone)]
pub struct ScheduledTask {
  state: Arc<TaskState>,
  shared: Arc<Shared>,
}

impl ScheduledTask {
  pub fn id(&self) -> u64 { self.state.id }

  /// Cancels the task. A queued task never runs; a running one is flagged
  /// interrupted when `interrupt` is set. Returns `false` if the task had
  /// already finished or been cancelled.
  pub fn cancel(&self, interrupt: bool) -> bool {
    if !self.state.cancel() {
      return false;
    }
    let id = self.state.id;
    self.shared.queue.lock().retain(|entry| entry.task.id != id);
    if interrupt && self.shared.running.lock().contains_key(&id) {
      self.state.interrupt();
    }
    self.shared.progress.notify_all();
    true
  }

  pub fn is_cancelled(&self) -> bool { self.state.is_cancelled() }

  /// Finished, failed, cancelled, or stopped recurring.
  pub fn is_done(&self) -> bool { self.state.is_done() || self.state.is_cancelled() }

  /// Time left until the next run.
  pub fn remaining(&self) -> Duration { self.state.due().saturating_duration_since(Instant::now()) }
}

impl fmt::Debug for ScheduledTask {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("ScheduledTask")
      .field("id", &self.state.id)
      .field("cancelled", &self.is_cancelled())
      .field("done", &self.is_done())
      .finish()
  }
}

struct Shared {
  name: String,
  queue: Mutex<BinaryHeap<Entry>>,
  available: Condvar,
  running: Mutex<HashMap<u64, Arc<TaskState>>>,
  progress: Condvar,
  in_flight: AtomicUsize,
  permits: Arc<Semaphore>,
  accepting: AtomicBool,
  pool: ThreadPool,
  ids: AtomicU64,
  sequence: AtomicU64,
}

impl Shared {
  fn enqueue(&self, task: Arc<TaskState>, due: Instant) -> Result<(), SchedulerError> {
    let mut queue = self.queue.lock();
    if !self.accepting.load(Ordering::Acquire) {
      return Err(SchedulerError::Rejected);
    }
    task.set_due(due);
    let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
    queue.push(Entry { due, sequence, task });
    self.available.notify_all();
    Ok(())
  }

  /// Blocks until the earliest task is due. `None` once shut down with an
  /// empty queue.
  fn next_due(&self) -> Option<Arc<TaskState>> {
    let mut queue = self.queue.lock();
    loop {
      match queue.peek() {
        None if !self.accepting.load(Ordering::Acquire) => return None,
        None => self.available.wait(&mut queue),
        Some(head) if head.due <= Instant::now() => {
          let entry = queue.pop()?;
          self.in_flight.fetch_add(1, Ordering::SeqCst);
          return Some(entry.task);
        }
        Some(head) => {
          let due = head.due;
          self.available.wait_until(&mut queue, due);
        }
      }
    }
  }

  /// Stops accepting tasks and drops queued recurring ones, which would
  /// never run again.
  fn shutdown(&self) {
    let mut queue = self.queue.lock();
    if self.accepting.swap(false, Ordering::AcqRel) {
      tracing::debug!(name = %self.name, "scheduler shutting down");
    }
    let (once, recurring): (Vec<Entry>, Vec<Entry>) =
      mem::take(&mut *queue).into_vec().into_iter().partition(|entry| entry.task.recurrence.is_none());
    *queue = BinaryHeap::from(once);
    for entry in &recurring {
      entry.task.finish();
    }
    if !recurring.is_empty() {
      tracing::debug!(name = %self.name, dropped = recurring.len(), "recurring tasks dropped");
    }
    self.available.notify_all();
    drop(queue);
    self.progress.notify_all();
  }
}

/// Shuts the scheduler down once the last [`Scheduler`] handle is dropped, so
/// the dispatcher thread and the worker pool exit.
struct ShutdownGuard {
  shared: Arc<Shared>,
}

impl Drop for ShutdownGuard {
  fn drop(&mut self) { self.shared.shutdown(); }
}

/// A priority-time-ordered task executor with bounded concurrency.
///
/// ```rust
/// use std::time::Duration;
///
/// use rxsignal::scheduler::Scheduler;
///
/// let scheduler = Scheduler::new(2).unwrap();
/// scheduler.schedule(|| println!("later"), Duration::from_millis(10)).unwrap();
/// scheduler.shutdown();
/// assert!(scheduler.await_termination(Duration::from_secs(1)));
/// ```
#[derive(Clone)]
pub struct Scheduler {
  shared: Arc<Shared>,
  _guard: Arc<ShutdownGuard>,
}

impl Scheduler {
  /// The lazily started process-wide scheduler.
  pub fn global() -> &'static Scheduler { &GLOBAL }

  pub fn new(max_concurrency: usize) -> Result<Self, SchedulerError> {
    Self::with_config(SchedulerConfig::default().with_max_concurrency(max_concurrency))
  }

  pub fn with_config(config: SchedulerConfig) -> Result<Self, SchedulerError> {
    let mut pool = ThreadPool::builder();
    pool.name_prefix(format!("{}-worker-", config.name));
    if let Some(size) = config.pool_size {
      pool.pool_size(size);
    }
    let pool = pool.create().map_err(SchedulerError::Pool)?;

    let shared = Arc::new(Shared {
      name: config.name.clone(),
      queue: Mutex::new(BinaryHeap::new()),
      available: Condvar::new(),
      running: Mutex::new(HashMap::new()),
      progress: Condvar::new(),
      in_flight: AtomicUsize::new(0),
      permits: Arc::new(Semaphore::new(config.permits())),
      accepting: AtomicBool::new(true),
      pool,
      ids: AtomicU64::new(0),
      sequence: AtomicU64::new(0),
    });

    let dispatcher = shared.clone();
    thread::Builder::new()
      .name(config.name.clone())
      .spawn(move || dispatch(dispatcher))
      .map_err(SchedulerError::Startup)?;
    tracing::debug!(name = %config.name, permits = config.permits(), "scheduler started");
    let guard = Arc::new(ShutdownGuard { shared: shared.clone() });
    Ok(Scheduler { shared, _guard: guard })
  }

  /// Runs `task` as soon as a permit is free.
  pub fn execute<F>(&self, task: F) -> Result<ScheduledTask, SchedulerError>
  where
    F: FnOnce() + Send + 'static,
  {
    let mut task = Some(task);
    let body = Box::new(move || {
      if let Some(task) = task.take() {
        task()
      }
    });
    self.submit(self.next_id(), body, None, Instant::now())
  }

  /// Runs `task` once after `delay`.
  pub fn schedule<F>(&self, task: F, delay: Duration) -> Result<ScheduledTask, SchedulerError>
  where
    F: FnMut() + Send + 'static,
  {
    self.submit(self.next_id(), Box::new(task), None, Instant::now() + delay)
  }

  /// Runs `task` after `initial_delay`, then every `period` measured from the
  /// previous due time.
  pub fn schedule_at_fixed_rate<F>(
    &self,
    task: F,
    initial_delay: Duration,
    period: Duration,
  ) -> Result<ScheduledTask, SchedulerError>
  where
    F: FnMut() + Send + 'static,
  {
    let recurrence = Recurrence::FixedRate(period);
    self.submit(self.next_id(), Box::new(task), Some(recurrence), Instant::now() + initial_delay)
  }

  /// Runs `task` after `initial_delay`, then `period` after each completion.
  pub fn schedule_with_fixed_delay<F>(
    &self,
    task: F,
    initial_delay: Duration,
    period: Duration,
  ) -> Result<ScheduledTask, SchedulerError>
  where
    F: FnMut() + Send + 'static,
  {
    let recurrence = Recurrence::FixedDelay(period);
    self.submit(self.next_id(), Box::new(task), Some(recurrence), Instant::now() + initial_delay)
  }

  /// Runs `task` at every match of the cron `expression`, evaluated in local
  /// time. `R` tokens are seeded with the task id.
  pub fn schedule_at<F>(&self, task: F, expression: &str) -> Result<ScheduledTask, SchedulerError>
  where
    F: FnMut() + Send + 'static,
  {
    let id = self.next_id();
    self.schedule_cron(id, Box::new(task), expression, id)
  }

  /// Like [`schedule_at`](Self::schedule_at) with an explicit seed for `R`
  /// tokens, so the same job keeps its slot across restarts.
  pub fn schedule_at_with_seed<F>(
    &self,
    task: F,
    expression: &str,
    seed: u64,
  ) -> Result<ScheduledTask, SchedulerError>
  where
    F: FnMut() + Send + 'static,
  {
    self.schedule_cron(self.next_id(), Box::new(task), expression, seed)
  }

  fn schedule_cron(
    &self,
    id: u64,
    body: Box<dyn FnMut() + Send>,
    expression: &str,
    seed: u64,
  ) -> Result<ScheduledTask, SchedulerError> {
    let cron = Cron::parse_with_seed(expression, seed)?;
    let due = cron_due(&cron)?;
    self.submit(id, body, Some(Recurrence::Cron(Box::new(cron))), due)
  }

  /// Stops accepting tasks. Queued one-shot tasks still run; queued recurring
  /// tasks are dropped and marked done, running ones are not rescheduled.
  pub fn shutdown(&self) { self.shared.shutdown(); }

  /// Stops accepting tasks, interrupts running ones and returns the tasks
  /// that never started.
  pub fn shutdown_now(&self) -> Vec<ScheduledTask> {
    let pending: Vec<Entry> = {
      let mut queue = self.shared.queue.lock();
      self.shared.accepting.store(false, Ordering::Release);
      self.shared.available.notify_all();
      std::mem::take(&mut *queue).into_vec()
    };
    self.shared.permits.close();
    for task in self.shared.running.lock().values() {
      task.interrupt();
    }
    tracing::debug!(name = %self.shared.name, pending = pending.len(), "scheduler stopped");
    self.shared.progress.notify_all();
    pending
      .into_iter()
      .map(|entry| ScheduledTask { state: entry.task, shared: self.shared.clone() })
      .collect()
  }

  pub fn is_shutdown(&self) -> bool { !self.shared.accepting.load(Ordering::Acquire) }

  /// Shut down with nothing queued or running.
  pub fn is_terminated(&self) -> bool {
    self.is_shutdown()
      && self.shared.queue.lock().is_empty()
      && self.shared.in_flight.load(Ordering::SeqCst) == 0
      && self.shared.running.lock().is_empty()
  }

  /// Waits until terminated or `timeout` elapses; `true` if terminated.
  pub fn await_termination(&self, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
      if self.is_terminated() {
        return true;
      }
      let now = Instant::now();
      if now >= deadline {
        return false;
      }
      let mut running = self.shared.running.lock();
      let wake = deadline.min(now + Duration::from_millis(10));
      self.shared.progress.wait_until(&mut running, wake);
    }
  }

  fn next_id(&self) -> u64 { self.shared.ids.fetch_add(1, Ordering::Relaxed) }

  fn submit(
    &self,
    id: u64,
    body: Box<dyn FnMut() + Send>,
    recurrence: Option<Recurrence>,
    due: Instant,
  ) -> Result<ScheduledTask, SchedulerError> {
    let state = Arc::new(TaskState::new(id, body, recurrence, due));
    if let Err(error) = self.shared.enqueue(state.clone(), due) {
      tracing::warn!(name = %self.shared.name, task = id, "task rejected after shutdown");
      return Err(error);
    }
    tracing::trace!(task = id, "task scheduled");
    Ok(ScheduledTask { state, shared: self.shared.clone() })
  }
}

impl fmt::Debug for Scheduler {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Scheduler")
      .field("name", &self.shared.name)
      .field("queued", &self.shared.queue.lock().len())
      .field("running", &self.shared.running.lock().len())
      .field("shutdown", &self.is_shutdown())
      .finish()
  }
}

impl Timer for Scheduler {
  fn now(&self) -> Instant { Instant::now() }

  fn run_after(&self, delay: Duration, task: Box<dyn FnOnce() + Send>) -> Disposable {
    let mut task = Some(task);
    let body = move || {
      if let Some(task) = task.take() {
        task()
      }
    };
    match self.schedule(body, delay) {
      Ok(handle) => Disposable::from_fn(move || {
        handle.cancel(false);
      }),
      Err(error) => {
        tracing::warn!(%error, "timer task dropped");
        Disposable::disposed()
      }
    }
  }
}

// ============================================================================
// Dispatcher
// ============================================================================

fn dispatch(shared: Arc<Shared>) {
  while let Some(task) = shared.next_due() {
    if task.is_cancelled() {
      shared.in_flight.fetch_sub(1, Ordering::SeqCst);
      continue;
    }
    let permit = match block_on(shared.permits.clone().acquire_owned()) {
      Ok(permit) => permit,
      Err(_) => {
        shared.in_flight.fetch_sub(1, Ordering::SeqCst);
        break;
      }
    };
    shared.running.lock().insert(task.id, task.clone());
    shared.in_flight.fetch_sub(1, Ordering::SeqCst);
    tracing::trace!(task = task.id, "task released");

    let worker = shared.clone();
    shared.pool.spawn_ok(async move { execute(worker, task, permit) });
  }
  tracing::debug!(name = %shared.name, "dispatcher stopped");
  shared.progress.notify_all();
}

fn execute(shared: Arc<Shared>, task: Arc<TaskState>, permit: OwnedSemaphorePermit) {
  let due = task.due();
  let mut finished = true;
  if !task.is_cancelled() {
    CURRENT_TASK.with(|current| *current.borrow_mut() = Some(task.clone()));
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| task.run()));
    CURRENT_TASK.with(|current| current.borrow_mut().take());

    match outcome {
      Err(_) => tracing::error!(task = task.id, "scheduled task panicked"),
      Ok(()) => finished = !reschedule(&shared, &task, due),
    }
  }
  if finished {
    task.finish();
  }
  shared.running.lock().remove(&task.id);
  drop(permit);
  shared.progress.notify_all();
}

/// Puts a recurring task back in the queue; `false` if it is finished.
fn reschedule(shared: &Shared, task: &Arc<TaskState>, due: Instant) -> bool {
  let Some(recurrence) = &task.recurrence else {
    return false;
  };
  if task.is_cancelled() || !shared.accepting.load(Ordering::Acquire) {
    return false;
  }
  match recurrence.next_due(due) {
    Ok(next) => shared.enqueue(task.clone(), next).is_ok(),
    Err(error) => {
      tracing::error!(task = task.id, %error, "recurring task has no next run");
      false
    }
  }
}
