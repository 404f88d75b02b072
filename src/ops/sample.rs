use std::sync::Arc;

use parking_lot::Mutex;

use crate::{signal::Signal, subscriber::Subscriber};

impl<V: Send + 'static> Signal<V> {
  /// Emits the most recent value of `self`, if any arrived since the previous
  /// sample, every time `sampler` emits.
  pub fn sample<T: Send + 'static>(&self, sampler: Signal<T>) -> Self {
    self.lift(move |observer: Subscriber<V>, upstream| {
      let latest: Arc<Mutex<Option<V>>> = Arc::new(Mutex::new(None));
      let control = upstream.sub();
      let (c_latest, on_sample, on_error) = (latest.clone(), observer.clone(), observer.clone());
      sampler.subscribe(
        Subscriber::from_fn(
          &control,
          move |_: T| {
            let value = c_latest.lock().take();
            if let Some(value) = value {
              on_sample.accept(value);
            }
          },
          move |error| on_error.error(error),
          || {},
        ),
        control.clone(),
      );
      observer.relay(upstream, move |_: &Subscriber<V>, value: V| {
        latest.lock().replace(value);
      })
    })
  }
}
