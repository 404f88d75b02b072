use std::sync::Arc;

use crate::{signal::Signal, subscriber::Subscriber};

/// A job handed to the executor of [`Signal::on`].
pub type Job = Box<dyn FnOnce() + Send>;

impl<V: Send + 'static> Signal<V> {
  /// Delivers every notification through `executor`.
  ///
  /// The executor decides where and when each job runs: a thread pool, an
  /// event loop, or inline. Notifications keep their order only if the
  /// executor runs jobs in submission order.
  ///
  /// ```rust
  /// use futures::executor::ThreadPool;
  /// use rxsignal::prelude::*;
  ///
  /// let pool = ThreadPool::new().unwrap();
  /// Signal::of([1, 2, 3])
  ///   .on(move |job| pool.spawn_ok(async move { job() }))
  ///   .to(|v| println!("{v}"));
  /// ```
  pub fn on<F>(&self, executor: F) -> Self
  where
    F: Fn(Job) + Send + Sync + 'static,
  {
    let executor = Arc::new(executor);
    self.lift(move |observer: Subscriber<V>, upstream| {
      let (next_exec, error_exec, complete_exec) = (executor.clone(), executor.clone(), executor.clone());
      let (on_next, on_error, on_complete) = (observer.clone(), observer.clone(), observer);
      Subscriber::from_fn(
        upstream,
        move |value| {
          let observer = on_next.clone();
          next_exec(Box::new(move || observer.accept(value)));
        },
        move |error| {
          let observer = on_error.clone();
          error_exec(Box::new(move || observer.error(error)));
        },
        move || {
          let observer = on_complete.clone();
          complete_exec(Box::new(move || observer.complete()));
        },
      )
    })
  }
}
