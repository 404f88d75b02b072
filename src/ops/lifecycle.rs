use std::sync::Arc;

use crate::{disposable::Disposable, error::Error, signal::Signal, subscriber::Subscriber};

impl<V: Send + 'static> Signal<V> {
  /// Runs `f` on every value before passing it on.
  pub fn effect<F>(&self, f: F) -> Self
  where
    F: Fn(&V) + Send + Sync + 'static,
  {
    let f = Arc::new(f);
    self.lift(move |observer: Subscriber<V>, upstream| {
      let f = f.clone();
      observer.relay(upstream, move |observer: &Subscriber<V>, value: V| {
        f(&value);
        observer.accept(value);
      })
    })
  }

  pub fn effect_on_error<F>(&self, f: F) -> Self
  where
    F: Fn(&Error) + Send + Sync + 'static,
  {
    let f = Arc::new(f);
    self.lift(move |observer: Subscriber<V>, upstream| {
      let (f, on_next, on_error, on_complete) = (f.clone(), observer.clone(), observer.clone(), observer);
      Subscriber::from_fn(
        upstream,
        move |value| on_next.accept(value),
        move |error| {
          f(&error);
          on_error.error(error);
        },
        move || on_complete.complete(),
      )
    })
  }

  pub fn effect_on_complete<F>(&self, f: F) -> Self
  where
    F: Fn() + Send + Sync + 'static,
  {
    let f = Arc::new(f);
    self.lift(move |observer: Subscriber<V>, upstream| {
      let (f, on_next, on_error, on_complete) = (f.clone(), observer.clone(), observer.clone(), observer);
      Subscriber::from_fn(
        upstream,
        move |value| on_next.accept(value),
        move |error| on_error.error(error),
        move || {
          f();
          on_complete.complete();
        },
      )
    })
  }

  /// Runs `f` once the subscription is released, whether by a terminal
  /// notification reaching a root subscriber or by an explicit dispose.
  pub fn effect_on_dispose<F>(&self, f: F) -> Self
  where
    F: Fn() + Send + Sync + 'static,
  {
    let source = self.clone();
    let f = Arc::new(f);
    Signal::new(move |observer: Subscriber<V>, disposer: Disposable| {
      let f = f.clone();
      disposer.add(move || f());
      source.subscribe(observer, disposer)
    })
  }
}

#[cfg(test)]
mod tests {
  use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
  };

  use parking_lot::Mutex;

  use crate::{
    ops::test_util::{events, record, strings},
    signal::Signal,
    subject::Subject,
  };

  #[test]
  fn effects_see_every_notification() {
    let trace = Arc::new(Mutex::new(vec![]));
    let (a, b, c) = (trace.clone(), trace.clone(), trace.clone());
    let signal = Signal::of([1, 2])
      .effect(move |v| a.lock().push(format!("saw {v}")))
      .effect_on_complete(move || b.lock().push("done".to_string()))
      .effect_on_error(move |_| c.lock().push("failed".to_string()));

    assert_eq!(events(&signal), strings(&["1", "2", "complete"]));
    assert_eq!(*trace.lock(), strings(&["saw 1", "saw 2", "done"]));
  }

  #[test]
  fn error_effect_runs_before_the_error_is_forwarded() {
    let seen = Arc::new(Mutex::new(None));
    let c_seen = seen.clone();
    let signal = Signal::<i32>::error("bad").effect_on_error(move |error| {
      c_seen.lock().replace(error.to_string());
    });
    assert_eq!(events(&signal), strings(&["error bad"]));
    assert_eq!(seen.lock().as_deref(), Some("bad"));
  }

  #[test]
  fn dispose_effect_runs_once() {
    let released = Arc::new(AtomicUsize::new(0));
    let c_released = released.clone();
    let source = Subject::<i32>::new();
    let (_, subscription) = record(&source.signal().effect_on_dispose(move || {
      c_released.fetch_add(1, Ordering::SeqCst);
    }));

    assert_eq!(released.load(Ordering::SeqCst), 0);
    subscription.dispose();
    subscription.dispose();
    assert_eq!(released.load(Ordering::SeqCst), 1);

    let completed = Arc::new(AtomicUsize::new(0));
    let c_completed = completed.clone();
    let _ = events(&Signal::of([1]).effect_on_dispose(move || {
      c_completed.fetch_add(1, Ordering::SeqCst);
    }));
    assert_eq!(completed.load(Ordering::SeqCst), 1);
  }
}
