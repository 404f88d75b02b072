use std::{
  sync::Arc,
  time::{Duration, Instant},
};

use parking_lot::Mutex;

use crate::{
  scheduler::{global_timer, SharedTimer, Timer},
  signal::Signal,
  subscriber::Subscriber,
};

impl<V: Send + 'static> Signal<V> {
  /// Admits a value only if at least `duration` has passed since the last
  /// admitted one arrived; everything in between is dropped.
  pub fn throttle(&self, duration: Duration) -> Self { self.throttle_shared(duration, global_timer()) }

  pub fn throttle_on<T: Timer>(&self, duration: Duration, timer: T) -> Self {
    self.throttle_shared(duration, Arc::new(timer))
  }

  fn throttle_shared(&self, duration: Duration, timer: SharedTimer) -> Self {
    self.lift(move |observer: Subscriber<V>, upstream| {
      let last: Mutex<Option<Instant>> = Mutex::new(None);
      let timer = timer.clone();
      observer.relay(upstream, move |observer: &Subscriber<V>, value: V| {
        let now = timer.now();
        let admitted = {
          let mut last = last.lock();
          let open = last.map_or(true, |at| at + duration <= now);
          if open {
            *last = Some(now);
          }
          open
        };
        if admitted {
          observer.accept(value);
        }
      })
    })
  }
}
