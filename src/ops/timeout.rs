use std::{sync::Arc, time::Duration};

use parking_lot::Mutex;

use crate::{
  disposable::Disposable,
  error::Error,
  scheduler::{global_timer, run_once, SharedTimer, Timer},
  signal::Signal,
  subscriber::Subscriber,
};

struct Watch {
  generation: u64,
  task: Option<Disposable>,
}

impl<V: Send + 'static> Signal<V> {
  /// Fails with [`Error::Timeout`] when `duration` passes without a
  /// notification, counting from the subscription and then from each value.
  pub fn timeout(&self, duration: Duration) -> Self { self.timeout_shared(duration, global_timer()) }

  pub fn timeout_on<T: Timer>(&self, duration: Duration, timer: T) -> Self {
    self.timeout_shared(duration, Arc::new(timer))
  }

  fn timeout_shared(&self, duration: Duration, timer: SharedTimer) -> Self {
    self.lift(move |observer: Subscriber<V>, upstream| {
      let watch = Arc::new(Mutex::new(Watch { generation: 0, task: None }));
      let arm = {
        let (watch, timer, token, observer) =
          (watch.clone(), timer.clone(), upstream.clone(), observer.clone());
        Arc::new(move || {
          let (generation, previous) = {
            let mut watch = watch.lock();
            watch.generation += 1;
            (watch.generation, watch.task.take())
          };
          if let Some(previous) = previous {
            previous.dispose();
          }
          let (c_watch, c_token, observer) = (watch.clone(), token.clone(), observer.clone());
          let task = run_once(&timer, duration, &token, move || {
            if c_watch.lock().generation == generation {
              observer.error(Error::Timeout(duration));
              c_token.dispose();
            }
          });
          let mut watch = watch.lock();
          if watch.generation == generation {
            watch.task = Some(task);
          }
        })
      };
      arm();

      let disarm = move || {
        let task = {
          let mut watch = watch.lock();
          watch.generation += 1;
          watch.task.take()
        };
        if let Some(task) = task {
          task.dispose();
        }
      };
      let disarm = Arc::new(disarm);
      let (on_error, on_complete) = (disarm.clone(), disarm);
      let (error_observer, complete_observer) = (observer.clone(), observer.clone());
      Subscriber::from_fn(
        upstream,
        move |value| {
          observer.accept(value);
          arm();
        },
        move |error| {
          on_error();
          error_observer.error(error);
        },
        move || {
          on_complete();
          complete_observer.complete();
        },
      )
    })
  }
}

#[cfg(test)]
mod tests {
  use std::time::Duration;

  use crate::{
    error::Error,
    observer::Handlers,
    ops::test_util::{record, strings},
    scheduler::TestScheduler,
    subject::Subject,
    variable::Variable,
  };

  #[test]
  fn fires_after_silence() {
    let scheduler = TestScheduler::new();
    let source = Subject::new();
    let (log, _) = record(&source.signal().timeout_on(Duration::from_millis(100), scheduler.clone()));

    scheduler.advance_to(Duration::from_millis(80));
    source.accept(1);
    scheduler.advance_to(Duration::from_millis(170));
    source.accept(2);
    scheduler.advance_to(Duration::from_millis(269));
    assert_eq!(*log.lock(), strings(&["1", "2"]));

    scheduler.advance_to(Duration::from_millis(270));
    assert_eq!(*log.lock(), strings(&["1", "2", "error no notification within 100ms"]));
    assert_eq!(source.observer_count(), 0);
  }

  #[test]
  fn timeout_error_is_typed() {
    let scheduler = TestScheduler::new();
    let source = Subject::<i32>::new();
    let failure = Variable::empty();
    let c_failure = failure.clone();
    let _subscription = source
      .signal()
      .timeout_on(Duration::from_millis(10), scheduler.clone())
      .to_observer(Handlers::<i32>::new().on_error(move |error| {
        c_failure.set(error);
      }));

    scheduler.advance_by(Duration::from_millis(10));
    let failure = failure.get();
    assert!(failure.as_ref().is_some_and(Error::is_timeout));
    assert_eq!(failure, Some(Error::Timeout(Duration::from_millis(10))));
  }

  #[test]
  fn completion_cancels_the_watch() {
    let scheduler = TestScheduler::new();
    let source = Subject::<i32>::new();
    let (log, _) = record(&source.signal().timeout_on(Duration::from_millis(100), scheduler.clone()));

    source.complete();
    scheduler.advance_by(Duration::from_millis(500));

    assert_eq!(*log.lock(), strings(&["complete"]));
    assert_eq!(scheduler.pending(), 0);
  }
}
