use std::{collections::VecDeque, sync::Arc, time::Duration};

use parking_lot::Mutex;

use crate::{
  ops::Serial,
  scheduler::{global_timer, run_once, SharedTimer, Timer},
  signal::Signal,
  subscriber::Subscriber,
};

enum Event<V> {
  Value(V),
  Complete,
}

impl<V: Send + 'static> Signal<V> {
  /// Shifts every value and the completion `duration` later, keeping their
  /// order. Errors are forwarded immediately.
  pub fn delay(&self, duration: Duration) -> Self { self.delay_shared(duration, global_timer()) }

  pub fn delay_on<T: Timer>(&self, duration: Duration, timer: T) -> Self {
    self.delay_shared(duration, Arc::new(timer))
  }

  fn delay_shared(&self, duration: Duration, timer: SharedTimer) -> Self {
    self.lift(move |observer: Subscriber<V>, upstream| {
      let queue: Arc<Mutex<VecDeque<Event<V>>>> = Arc::new(Mutex::new(VecDeque::new()));
      let serial = Arc::new(Serial::default());
      let schedule = {
        let (timer, token, observer) = (timer.clone(), upstream.clone(), observer.clone());
        move |event: Event<V>| {
          queue.lock().push_back(event);
          let (queue, observer, serial) = (queue.clone(), observer.clone(), serial.clone());
          // Due times never decrease, so the front event is due whenever any
          // task fires.
          run_once(&timer, duration, &token, move || {
            serial.run(move || {
              let event = queue.lock().pop_front();
              match event {
                Some(Event::Value(value)) => observer.accept(value),
                Some(Event::Complete) => observer.complete(),
                None => {}
              }
            })
          });
        }
      };
      let schedule = Arc::new(schedule);
      let (on_next, on_complete) = (schedule.clone(), schedule);
      let on_error = observer;
      Subscriber::from_fn(
        upstream,
        move |value| on_next(Event::Value(value)),
        move |error| on_error.error(error),
        move || on_complete(Event::Complete),
      )
    })
  }

  /// Holds back the last `count` values: each new value releases the oldest
  /// held one. Held values are dropped when the source terminates. A count
  /// of zero returns the signal unchanged.
  pub fn delay_count(&self, count: usize) -> Self {
    if count == 0 {
      return self.clone();
    }
    self.lift(move |observer: Subscriber<V>, upstream| {
      let held = Mutex::new(VecDeque::with_capacity(count));
      observer.relay(upstream, move |observer: &Subscriber<V>, value: V| {
        let released = {
          let mut held = held.lock();
          let released = if held.len() >= count { held.pop_front() } else { None };
          held.push_back(value);
          released
        };
        if let Some(value) = released {
          observer.accept(value);
        }
      })
    })
  }
}

#[cfg(test)]
mod tests {
  use std::{
    sync::{
      atomic::{AtomicUsize, Ordering},
      mpsc, Arc,
    },
    thread,
    time::Duration,
  };

  use parking_lot::Mutex;

  use crate::{
    observer::Handlers,
    ops::test_util::{events, record, strings},
    scheduler::{Scheduler, SchedulerConfig, TestScheduler},
    signal::Signal,
    subject::Subject,
  };

  #[test]
  fn shifts_values_and_completion() {
    let scheduler = TestScheduler::new();
    let (log, _) = record(&Signal::of([1, 2]).delay_on(Duration::from_millis(50), scheduler.clone()));

    scheduler.advance_by(Duration::from_millis(49));
    assert!(log.lock().is_empty());
    scheduler.advance_by(Duration::from_millis(1));
    assert_eq!(*log.lock(), strings(&["1", "2", "complete"]));
  }

  #[test]
  fn keeps_relative_timing() {
    let scheduler = TestScheduler::new();
    let source = Subject::new();
    let (log, _) = record(&source.signal().delay_on(Duration::from_millis(100), scheduler.clone()));

    source.accept('a');
    scheduler.advance_to(Duration::from_millis(30));
    source.accept('b');
    scheduler.advance_to(Duration::from_millis(100));
    assert_eq!(*log.lock(), strings(&["'a'"]));
    scheduler.advance_to(Duration::from_millis(130));
    assert_eq!(*log.lock(), strings(&["'a'", "'b'"]));
  }

  #[test]
  fn errors_are_not_delayed() {
    let scheduler = TestScheduler::new();
    let source = Subject::new();
    let (log, _) = record(&source.signal().delay_on(Duration::from_millis(100), scheduler.clone()));

    source.accept(1);
    source.error("late".into());

    assert_eq!(*log.lock(), strings(&["error late"]));
    scheduler.advance_by(Duration::from_millis(100));
    assert_eq!(*log.lock(), strings(&["error late"]));
  }

  #[test]
  fn same_due_values_stay_ordered_on_a_worker_pool() {
    let scheduler =
      Scheduler::with_config(SchedulerConfig::default().with_name("delay-pool").with_pool_size(4)).unwrap();
    let signal = Signal::of(0..50).delay_on(Duration::from_millis(5), scheduler.clone());

    let log = Arc::new(Mutex::new(vec![]));
    let active = Arc::new(AtomicUsize::new(0));
    let overlaps = Arc::new(AtomicUsize::new(0));
    let (tx, rx) = mpsc::channel();
    let tx = Mutex::new(tx);
    let (c_log, c_active, c_overlaps) = (log.clone(), active.clone(), overlaps.clone());
    let _subscription = signal.to_observer(
      Handlers::new()
        .on_next(move |v: i32| {
          if c_active.fetch_add(1, Ordering::SeqCst) > 0 {
            c_overlaps.fetch_add(1, Ordering::SeqCst);
          }
          thread::sleep(Duration::from_millis(2));
          c_log.lock().push(v);
          c_active.fetch_sub(1, Ordering::SeqCst);
        })
        .on_complete(move || {
          let _ = tx.lock().send(());
        }),
    );

    rx.recv_timeout(Duration::from_secs(10)).unwrap();
    assert_eq!(*log.lock(), (0..50).collect::<Vec<_>>());
    assert_eq!(overlaps.load(Ordering::SeqCst), 0);
    scheduler.shutdown();
  }

  #[test]
  fn delay_count_releases_the_oldest_held_value() {
    assert_eq!(events(&Signal::of(1..=5).delay_count(2)), strings(&["1", "2", "3", "complete"]));
    assert_eq!(events(&Signal::of(1..=2).delay_count(3)), strings(&["complete"]));
    assert_eq!(Signal::of(1..=3).delay_count(0).to_list(), vec![1, 2, 3]);
  }

  #[test]
  fn delay_count_drops_held_values_on_error() {
    let source = Subject::new();
    let (log, _) = record(&source.signal().delay_count(1));
    source.accept('a');
    source.accept('b');
    source.error("stop".into());
    assert_eq!(*log.lock(), strings(&["'a'", "error stop"]));
  }
}
