use std::{
  sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Arc,
  },
  time::Duration,
};

use parking_lot::Mutex;

use crate::{
  scheduler::{global_timer, run_once, SharedTimer, Timer},
  signal::Signal,
  subscriber::Subscriber,
};

impl<V: Send + 'static> Signal<V> {
  /// Emits the first `count` values, then completes and releases the
  /// upstream subscription. `take(0)` completes without subscribing.
  pub fn take(&self, count: usize) -> Self {
    if count == 0 {
      return Signal::empty();
    }
    self.lift(move |observer: Subscriber<V>, upstream| {
      let (seen, c_upstream) = (AtomicUsize::new(0), upstream.clone());
      observer.relay(upstream, move |observer: &Subscriber<V>, value: V| {
        let position = seen.fetch_add(1, Ordering::AcqRel) + 1;
        if position <= count {
          observer.accept(value);
        }
        if position == count {
          observer.complete();
          c_upstream.dispose();
        }
      })
    })
  }

  /// Drops the first `count` values.
  pub fn skip(&self, count: usize) -> Self { self.skip_at(move |position| position < count) }

  pub fn first(&self) -> Self { self.take(1) }

  /// Emits only the final value, once the source completes.
  pub fn last(&self) -> Self {
    self.lift(|observer: Subscriber<V>, upstream| {
      let latest: Arc<Mutex<Option<V>>> = Arc::new(Mutex::new(None));
      let (on_next, on_complete) = (latest.clone(), latest);
      let (on_error, downstream) = (observer.clone(), observer);
      Subscriber::from_fn(
        upstream,
        move |value| {
          on_next.lock().replace(value);
        },
        move |error| on_error.error(error),
        move || {
          let last = on_complete.lock().take();
          if let Some(value) = last {
            downstream.accept(value);
          }
          downstream.complete();
        },
      )
    })
  }

  /// Forwards values until `notifier` emits, then completes.
  pub fn take_until_signal<T: Send + 'static>(&self, notifier: Signal<T>) -> Self {
    self.lift(move |observer: Subscriber<V>, upstream| {
      let control = upstream.sub();
      let (on_next, on_error, c_upstream) = (observer.clone(), observer.clone(), upstream.clone());
      notifier.subscribe(
        Subscriber::from_fn(
          &control,
          move |_: T| {
            on_next.complete();
            c_upstream.dispose();
          },
          move |error| on_error.error(error),
          || {},
        ),
        control.clone(),
      );
      observer.forward(upstream)
    })
  }

  /// Drops values until `notifier` emits.
  pub fn skip_until_signal<T: Send + 'static>(&self, notifier: Signal<T>) -> Self {
    self.lift(move |observer: Subscriber<V>, upstream| {
      let open = Arc::new(AtomicBool::new(false));
      let control = upstream.sub();
      let (c_open, c_control, on_error) = (open.clone(), control.clone(), observer.clone());
      notifier.subscribe(
        Subscriber::from_fn(
          &control,
          move |_: T| {
            c_open.store(true, Ordering::Release);
            c_control.dispose();
          },
          move |error| on_error.error(error),
          || {},
        ),
        control.clone(),
      );
      observer.relay(upstream, move |observer: &Subscriber<V>, value: V| {
        if open.load(Ordering::Acquire) {
          observer.accept(value)
        }
      })
    })
  }

  /// Forwards values for `duration`, then completes.
  pub fn take_for(&self, duration: Duration) -> Self { self.take_for_shared(duration, global_timer()) }

  pub fn take_for_on<T: Timer>(&self, duration: Duration, timer: T) -> Self {
    self.take_for_shared(duration, Arc::new(timer))
  }

  /// Drops values arriving during the first `duration`.
  pub fn skip_for(&self, duration: Duration) -> Self { self.skip_for_shared(duration, global_timer()) }

  pub fn skip_for_on<T: Timer>(&self, duration: Duration, timer: T) -> Self {
    self.skip_for_shared(duration, Arc::new(timer))
  }

  fn take_for_shared(&self, duration: Duration, timer: SharedTimer) -> Self {
    self.lift(move |observer: Subscriber<V>, upstream| {
      let (deadline, c_upstream) = (observer.clone(), upstream.clone());
      run_once(&timer, duration, upstream, move || {
        deadline.complete();
        c_upstream.dispose();
      });
      observer.forward(upstream)
    })
  }

  fn skip_for_shared(&self, duration: Duration, timer: SharedTimer) -> Self {
    self.lift(move |observer: Subscriber<V>, upstream| {
      let open = Arc::new(AtomicBool::new(false));
      let c_open = open.clone();
      run_once(&timer, duration, upstream, move || c_open.store(true, Ordering::Release));
      observer.relay(upstream, move |observer: &Subscriber<V>, value: V| {
        if open.load(Ordering::Acquire) {
          observer.accept(value)
        }
      })
    })
  }
}
