//! Operators.
//!
//! Every operator is an inherent method on [`Signal`] that wraps the upstream
//! subscription: it builds an upstream [`Subscriber`] which transforms,
//! filters or buffers notifications before handing them to the downstream
//! one. Per-subscription state lives in the closures built for that
//! subscription, so one signal can be subscribed many times.
//!
//! | File | Operators |
//! |------|-----------|
//! | `map` | `map` `try_map` `map_to` `map_with_previous` `scan` `is` `toggle` `index` |
//! | `filter` | `filter` `try_filter` `distinct` `diff` `take_while` `skip_while` `take_until` `skip_until` `take_at` `skip_at` `take_when` `skip_when` `skip_none` |
//! | `take` | `take` `skip` `first` `last` `take_until_signal` `skip_until_signal` `take_for` `skip_for` |
//! | `merge` | `merge` `merge_all` `concat` `concat_all` `start_with` `start_with_signal` |
//! | `combine` | `combine*` `combine_latest*` |
//! | `sample` | `sample` |
//! | `flatten` | `flat_map` `flat_iter` `switch_map` `concat_map` |
//! | `buffer` | `buffer` `buffer_sliding` `buffer_time` `buffer_signal` `buffer_signal_flushing` |
//! | `debounce` `throttle` `delay` `timeout` | time-based operators, plus `delay_count` |
//! | `observe_on` | `on` |
//! | `retry` | `retry*` `repeat*` |
//! | `recover` | `recover` `recover_when` `error_resume*` `skip_error` `stop_error` |
//! | `lifecycle` | `effect*` |
//! | `share` | `share` |
//!
//! Time-based operators run on the global [`Scheduler`](crate::scheduler::Scheduler)
//! unless the `_on` variant is given another [`Timer`](crate::scheduler::Timer).

mod buffer;
mod combine;
mod debounce;
mod delay;
mod filter;
mod flatten;
mod lifecycle;
mod map;
mod merge;
mod observe_on;
mod recover;
mod retry;
mod sample;
mod share;
mod take;
mod throttle;
mod timeout;

use std::collections::VecDeque;

pub use observe_on::Job;
use parking_lot::Mutex;

use crate::{disposable::Disposable, signal::Signal, subscriber::Subscriber};

/// Runs jobs one at a time in submission order.
///
/// A job submitted while another one is running, from a nested call or from
/// another thread, is queued and run by the thread already draining. Timer
/// callbacks of one subscription therefore never overlap, and chains of
/// synchronous completions run in a loop instead of recursing.
#[derive(Default)]
pub(crate) struct Serial {
  state: Mutex<SerialState>,
}

#[derive(Default)]
struct SerialState {
  jobs: VecDeque<Job>,
  draining: bool,
}

impl Serial {
  pub(crate) fn run<F: FnOnce() + Send + 'static>(&self, job: F) {
    {
      let mut state = self.state.lock();
      state.jobs.push_back(Box::new(job));
      if state.draining {
        return;
      }
      state.draining = true;
    }
    let mut drain = DrainGuard { serial: self, active: true };
    loop {
      let job = {
        let mut state = self.state.lock();
        match state.jobs.pop_front() {
          Some(job) => job,
          None => {
            state.draining = false;
            drain.active = false;
            return;
          }
        }
      };
      job();
    }
  }
}

/// Releases the drain when a job panics, so the next submitter picks up the
/// jobs left in the queue.
struct DrainGuard<'a> {
  serial: &'a Serial,
  active: bool,
}

impl Drop for DrainGuard<'_> {
  fn drop(&mut self) {
    if self.active {
      self.serial.state.lock().draining = false;
    }
  }
}

impl<V: Send + 'static> Signal<V> {
  /// Builds a signal that subscribes to `self` through the subscriber `lift`
  /// makes from the downstream one.
  ///
  /// `lift` also receives the upstream token: disposing it releases the
  /// upstream subscription without touching the downstream.
  pub(crate) fn lift<R, F>(&self, lift: F) -> Signal<R>
  where
    R: Send + 'static,
    F: Fn(Subscriber<R>, &Disposable) -> Subscriber<V> + Send + Sync + 'static,
  {
    let source = self.clone();
    Signal::new(move |observer: Subscriber<R>, disposer: Disposable| {
      let upstream = disposer.sub();
      let subscriber = lift(observer, &upstream);
      source.subscribe(subscriber, upstream);
      disposer
    })
  }
}


#[cfg(test)]
mod tests {
  use std::sync::Arc;

  use parking_lot::Mutex;

  use super::Serial;

  #[test]
  fn nested_jobs_run_after_the_current_one() {
    let serial = Arc::new(Serial::default());
    let order = Arc::new(Mutex::new(vec![]));
    let (c_serial, c_order) = (serial.clone(), order.clone());
    serial.run(move || {
      let inner = c_order.clone();
      c_serial.run(move || inner.lock().push("nested"));
      c_order.lock().push("outer");
    });
    assert_eq!(*order.lock(), vec!["outer", "nested"]);
  }

  fn chain(serial: Arc<Serial>, count: Arc<Mutex<usize>>, left: usize) {
    *count.lock() += 1;
    if left > 0 {
      let next = serial.clone();
      serial.run(move || chain(next, count, left - 1));
    }
  }

  #[test]
  fn deep_chains_do_not_grow_the_stack() {
    let serial = Arc::new(Serial::default());
    let count = Arc::new(Mutex::new(0));
    let (c_serial, c_count) = (serial.clone(), count.clone());
    serial.run(move || chain(c_serial, c_count, 100_000));
    assert_eq!(*count.lock(), 100_001);
  }

  #[test]
  fn a_panicking_job_releases_the_drain() {
    let serial = Serial::default();
    let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
      serial.run(|| panic!("job failed"));
    }));
    assert!(outcome.is_err());

    let ran = Arc::new(Mutex::new(false));
    let c_ran = ran.clone();
    serial.run(move || *c_ran.lock() = true);
    assert!(*ran.lock());
  }
}
