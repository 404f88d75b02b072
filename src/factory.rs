//! Signal factories
//!
//! Constructors for source signals. Every factory is cold: each subscription
//! replays it from the start.
//!
//! | Method | Values Emitted | Terminal |
//! |--------|----------------|----------|
//! | `empty()` | none | complete |
//! | `never()` | none | none |
//! | `just(v)` | `v` | complete |
//! | `of(values)` | each value | complete |
//! | `iterate(iter)` | each item, possibly forever | complete if finite |
//! | `error(e)` | none | error |
//! | `interval(initial, period)` | `0, 1, 2, ..` | none |
//! | `timer(delay)` | `0` | complete |
//!
//! ```rust
//! use rxsignal::prelude::*;
//!
//! let words = Signal::of(["a", "b"]).concat(Signal::just("c")).to_list();
//! assert_eq!(words, vec!["a", "b", "c"]);
//! ```

use std::{
  sync::Arc,
  time::{Duration, Instant},
};

use crate::{
  disposable::Disposable,
  error::Error,
  scheduler::{global_timer, run_once, SharedTimer, Timer},
  signal::Signal,
  subscriber::Subscriber,
};

impl<V: Send + 'static> Signal<V> {
  /// Completes immediately.
  pub fn empty() -> Self {
    Signal::new(|observer: Subscriber<V>, disposer: Disposable| {
      observer.complete();
      disposer
    })
  }

  /// Never notifies anything.
  pub fn never() -> Self { Signal::new(|_: Subscriber<V>, disposer: Disposable| disposer) }

  /// Fails immediately with `error`.
  pub fn error(error: impl Into<Error>) -> Self {
    let error = error.into();
    Signal::new(move |observer: Subscriber<V>, disposer: Disposable| {
      observer.error(error.clone());
      disposer
    })
  }

  /// Emits `value` and completes.
  pub fn just(value: V) -> Self
  where
    V: Clone + Sync,
  {
    Self::of([value])
  }

  /// Emits every value in order and completes.
  pub fn of<I>(values: I) -> Self
  where
    I: IntoIterator<Item = V>,
    V: Clone + Sync,
  {
    let values: Arc<[V]> = values.into_iter().collect();
    Signal::new(move |observer: Subscriber<V>, disposer: Disposable| {
      for value in values.iter() {
        if observer.is_stopped() {
          return disposer;
        }
        observer.accept(value.clone());
      }
      observer.complete();
      disposer
    })
  }

  /// Walks a fresh clone of `iter` on each subscription.
  ///
  /// The iterator may be infinite; emission stops once the subscription is
  /// disposed.
  pub fn iterate<I>(iter: I) -> Self
  where
    I: IntoIterator<Item = V> + Clone + Send + Sync + 'static,
  {
    Signal::new(move |observer: Subscriber<V>, disposer: Disposable| {
      for value in iter.clone() {
        if observer.is_stopped() {
          return disposer;
        }
        observer.accept(value);
      }
      observer.complete();
      disposer
    })
  }

  /// Builds a new signal for every subscription.
  pub fn defer<F>(factory: F) -> Self
  where
    F: Fn() -> Signal<V> + Send + Sync + 'static,
  {
    Signal::new(move |observer: Subscriber<V>, disposer: Disposable| {
      factory().subscribe(observer, disposer)
    })
  }
}

impl Signal<u64> {
  /// Emits `0, 1, 2, ..` at a fixed rate on the global scheduler.
  pub fn interval(initial: Duration, period: Duration) -> Self {
    Self::interval_shared(initial, period, global_timer())
  }

  pub fn interval_on<T: Timer>(initial: Duration, period: Duration, timer: T) -> Self {
    Self::interval_shared(initial, period, Arc::new(timer))
  }

  /// Emits `0` after `delay` and completes.
  pub fn timer(delay: Duration) -> Self { Self::timer_shared(delay, global_timer()) }

  pub fn timer_on<T: Timer>(delay: Duration, timer: T) -> Self {
    Self::timer_shared(delay, Arc::new(timer))
  }

  fn interval_shared(initial: Duration, period: Duration, timer: SharedTimer) -> Self {
    Signal::new(move |observer: Subscriber<u64>, disposer: Disposable| {
      let due = timer.now() + initial;
      tick(timer.clone(), observer, disposer.clone(), 0, due, period);
      disposer
    })
  }

  fn timer_shared(delay: Duration, timer: SharedTimer) -> Self {
    Signal::new(move |observer: Subscriber<u64>, disposer: Disposable| {
      run_once(&timer, delay, &disposer, move || {
        observer.accept(0);
        observer.complete();
      });
      disposer
    })
  }
}

/// Schedules tick `count` at `due`; each tick schedules the next one from
/// its own due time so the rate does not drift.
fn tick(
  timer: SharedTimer,
  observer: Subscriber<u64>,
  disposer: Disposable,
  count: u64,
  due: Instant,
  period: Duration,
) {
  let delay = due.saturating_duration_since(timer.now());
  let next_timer = timer.clone();
  let next_disposer = disposer.clone();
  run_once(&timer, delay, &disposer, move || {
    observer.accept(count);
    tick(next_timer, observer, next_disposer, count + 1, due + period, period);
  });
}

#[cfg(test)]
mod tests {
  use parking_lot::Mutex;

  use super::*;
  use crate::{observer::Handlers, scheduler::TestScheduler};

  fn record<V: Send + std::fmt::Debug + 'static>(
    signal: &Signal<V>,
  ) -> (Arc<Mutex<Vec<String>>>, Disposable) {
    let log = Arc::new(Mutex::new(vec![]));
    let (n, e, c) = (log.clone(), log.clone(), log.clone());
    let disposer = signal.to_observer(
      Handlers::new()
        .on_next(move |v: V| n.lock().push(format!("{v:?}")))
        .on_error(move |err| e.lock().push(format!("error {err}")))
        .on_complete(move || c.lock().push("complete".into())),
    );
    (log, disposer)
  }

  #[test]
  fn trivial_factories() {
    assert_eq!(*record(&Signal::<i32>::empty()).0.lock(), vec!["complete"]);
    assert!(record(&Signal::<i32>::never()).0.lock().is_empty());
    assert_eq!(*record(&Signal::<i32>::error("nope")).0.lock(), vec!["error nope"]);
    assert_eq!(*record(&Signal::just(7)).0.lock(), vec!["7", "complete"]);
  }

  #[test]
  fn of_replays_per_subscription() {
    let signal = Signal::of(vec!["a", "b"]);
    assert_eq!(signal.to_list(), vec!["a", "b"]);
    assert_eq!(signal.to_list(), vec!["a", "b"]);
  }

  #[test]
  fn iterate_stops_on_dispose() {
    let seen = Arc::new(Mutex::new(vec![]));
    let c_seen = seen.clone();
    let gate = Arc::new(Mutex::new(None::<Disposable>));
    let c_gate = gate.clone();
    let signal = Signal::new(move |observer: Subscriber<u64>, disposer: Disposable| {
      *c_gate.lock() = Some(disposer.clone());
      Signal::iterate(0..).subscribe(observer, disposer)
    });
    signal.to(move |v| {
      c_seen.lock().push(v);
      if v == 2 {
        if let Some(d) = gate.lock().as_ref() {
          d.dispose()
        }
      }
    });
    assert_eq!(*seen.lock(), vec![0, 1, 2]);
  }

  #[test]
  fn defer_builds_per_subscription() {
    let counter = Arc::new(Mutex::new(0));
    let c_counter = counter.clone();
    let signal = Signal::defer(move || {
      let mut counter = c_counter.lock();
      *counter += 1;
      Signal::just(*counter)
    });
    assert_eq!(signal.to_list(), vec![1]);
    assert_eq!(signal.to_list(), vec![2]);
  }

  #[test]
  fn interval_ticks_at_fixed_rate() {
    let scheduler = TestScheduler::new();
    let signal = Signal::interval_on(
      Duration::from_millis(10),
      Duration::from_millis(20),
      scheduler.clone(),
    );
    let (log, disposer) = record(&signal);

    scheduler.advance_by(Duration::from_millis(9));
    assert!(log.lock().is_empty());
    scheduler.advance_by(Duration::from_millis(1));
    assert_eq!(*log.lock(), vec!["0"]);
    scheduler.advance_by(Duration::from_millis(40));
    assert_eq!(*log.lock(), vec!["0", "1", "2"]);

    disposer.dispose();
    scheduler.advance_by(Duration::from_millis(100));
    assert_eq!(log.lock().len(), 3);
    assert_eq!(scheduler.pending(), 0);
  }

  #[test]
  fn timer_fires_once() {
    let scheduler = TestScheduler::new();
    let (log, _) = record(&Signal::timer_on(Duration::from_secs(1), scheduler.clone()));
    scheduler.advance_by(Duration::from_secs(5));
    assert_eq!(*log.lock(), vec!["0", "complete"]);
  }
}
