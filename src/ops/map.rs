use std::sync::{
  atomic::{AtomicBool, AtomicUsize, Ordering},
  Arc,
};

use parking_lot::Mutex;

use crate::{error::Error, signal::Signal, subscriber::Subscriber};

impl<V: Send + 'static> Signal<V> {
  /// Transforms every value with `f`.
  ///
  /// A panic in `f` is not turned into an error notification; it unwinds
  /// into whatever delivered the value. Use [`try_map`](Self::try_map) for
  /// fallible transforms.
  pub fn map<R, F>(&self, f: F) -> Signal<R>
  where
    R: Send + 'static,
    F: Fn(V) -> R + Send + Sync + 'static,
  {
    let f = Arc::new(f);
    self.lift(move |observer: Subscriber<R>, upstream| {
      let f = f.clone();
      observer.relay(upstream, move |observer: &Subscriber<R>, value: V| observer.accept(f(value)))
    })
  }

  /// Like [`map`](Self::map); an `Err` from `f` becomes the error
  /// notification and releases the upstream subscription.
  pub fn try_map<R, E, F>(&self, f: F) -> Signal<R>
  where
    R: Send + 'static,
    E: Into<Error>,
    F: Fn(V) -> Result<R, E> + Send + Sync + 'static,
  {
    let f = Arc::new(f);
    self.lift(move |observer: Subscriber<R>, upstream| {
      let (f, c_upstream) = (f.clone(), upstream.clone());
      observer.relay(upstream, move |observer: &Subscriber<R>, value: V| match f(value) {
        Ok(value) => observer.accept(value),
        Err(error) => {
          observer.error(error.into());
          c_upstream.dispose();
        }
      })
    })
  }

  /// Replaces every value with `value`.
  pub fn map_to<R>(&self, value: R) -> Signal<R>
  where
    R: Clone + Send + Sync + 'static,
  {
    self.map(move |_| value.clone())
  }

  /// Maps each value together with the one before it; the first value is
  /// paired with `init`.
  pub fn map_with_previous<R, F>(&self, init: V, f: F) -> Signal<R>
  where
    V: Clone + Sync,
    R: Send + 'static,
    F: Fn(&V, &V) -> R + Send + Sync + 'static,
  {
    let f = Arc::new(f);
    self.lift(move |observer: Subscriber<R>, upstream| {
      let (f, previous) = (f.clone(), Mutex::new(init.clone()));
      observer.relay(upstream, move |observer: &Subscriber<R>, value: V| {
        let mapped = {
          let mut previous = previous.lock();
          let mapped = f(&previous, &value);
          *previous = value;
          mapped
        };
        observer.accept(mapped)
      })
    })
  }

  /// Emits every intermediate result of folding the values into `init`.
  pub fn scan<R, F>(&self, init: R, f: F) -> Signal<R>
  where
    R: Clone + Send + Sync + 'static,
    F: Fn(R, V) -> R + Send + Sync + 'static,
  {
    let f = Arc::new(f);
    self.lift(move |observer: Subscriber<R>, upstream| {
      let (f, acc) = (f.clone(), Mutex::new(init.clone()));
      observer.relay(upstream, move |observer: &Subscriber<R>, value: V| {
        let next = {
          let mut acc = acc.lock();
          *acc = f(acc.clone(), value);
          acc.clone()
        };
        observer.accept(next)
      })
    })
  }

  /// Maps every value to whether it satisfies `predicate`.
  pub fn is<F>(&self, predicate: F) -> Signal<bool>
  where
    F: Fn(&V) -> bool + Send + Sync + 'static,
  {
    self.map(move |value| predicate(&value))
  }

  /// Maps the values to `initial`, `!initial`, `initial`, ... in turn.
  pub fn toggle(&self, initial: bool) -> Signal<bool> {
    self.lift(move |observer: Subscriber<bool>, upstream| {
      let state = AtomicBool::new(initial);
      observer.relay(upstream, move |observer: &Subscriber<bool>, _: V| {
        observer.accept(state.fetch_xor(true, Ordering::AcqRel))
      })
    })
  }

  /// Pairs every value with its zero-based position.
  pub fn index(&self) -> Signal<(V, usize)> {
    self.lift(move |observer: Subscriber<(V, usize)>, upstream| {
      let position = AtomicUsize::new(0);
      observer.relay(upstream, move |observer: &Subscriber<(V, usize)>, value: V| {
        observer.accept((value, position.fetch_add(1, Ordering::Relaxed)))
      })
    })
  }
}
