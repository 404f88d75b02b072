use std::{sync::Arc, time::Duration};

use parking_lot::Mutex;

use crate::{
  disposable::Disposable,
  scheduler::{global_timer, run_once, SharedTimer, Timer},
  signal::Signal,
  subscriber::Subscriber,
};

struct Pending<V> {
  generation: u64,
  value: Option<V>,
  task: Option<Disposable>,
}

impl<V: Send + 'static> Signal<V> {
  /// Emits a value only after `duration` has passed without a newer one.
  ///
  /// Each arrival cancels the scheduled emission of the previous value. A
  /// value still pending when the source completes is emitted before the
  /// completion; errors pass through at once.
  pub fn debounce(&self, duration: Duration) -> Self { self.debounce_shared(duration, global_timer()) }

  pub fn debounce_on<T: Timer>(&self, duration: Duration, timer: T) -> Self {
    self.debounce_shared(duration, Arc::new(timer))
  }

  fn debounce_shared(&self, duration: Duration, timer: SharedTimer) -> Self {
    self.lift(move |observer: Subscriber<V>, upstream| {
      let pending = Arc::new(Mutex::new(Pending { generation: 0, value: None, task: None }));
      let (timer, token) = (timer.clone(), upstream.clone());
      let (on_next, on_error, on_complete) = (observer.clone(), observer.clone(), observer);
      let (next_pending, complete_pending) = (pending.clone(), pending);
      Subscriber::from_fn(
        upstream,
        move |value| {
          let (generation, previous) = {
            let mut pending = next_pending.lock();
            pending.generation += 1;
            pending.value = Some(value);
            (pending.generation, pending.task.take())
          };
          if let Some(previous) = previous {
            previous.dispose();
          }
          let (fire, observer) = (next_pending.clone(), on_next.clone());
          let task = run_once(&timer, duration, &token, move || {
            let value = {
              let mut pending = fire.lock();
              if pending.generation != generation {
                return;
              }
              pending.task = None;
              pending.value.take()
            };
            if let Some(value) = value {
              observer.accept(value);
            }
          });
          let mut pending = next_pending.lock();
          if pending.generation == generation && !task.is_disposed() {
            pending.task = Some(task);
          }
        },
        move |error| on_error.error(error),
        move || {
          let (value, task) = {
            let mut pending = complete_pending.lock();
            (pending.value.take(), pending.task.take())
          };
          if let Some(task) = task {
            task.dispose();
          }
          if let Some(value) = value {
            on_complete.accept(value);
          }
          on_complete.complete();
        },
      )
    })
  }
}
