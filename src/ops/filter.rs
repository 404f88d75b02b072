use std::{
  collections::HashSet,
  hash::Hash,
  sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Arc,
  },
};

use parking_lot::Mutex;

use crate::{error::Error, signal::Signal, subscriber::Subscriber};

impl<V: Send + 'static> Signal<V> {
  /// Forwards the values that satisfy `predicate`.
  ///
  /// Panics in `predicate` propagate to the caller instead of becoming an
  /// error notification; see [`try_filter`](Self::try_filter).
  pub fn filter<F>(&self, predicate: F) -> Self
  where
    F: Fn(&V) -> bool + Send + Sync + 'static,
  {
    let predicate = Arc::new(predicate);
    self.lift(move |observer: Subscriber<V>, upstream| {
      let predicate = predicate.clone();
      observer.relay(upstream, move |observer: &Subscriber<V>, value: V| {
        if predicate(&value) {
          observer.accept(value)
        }
      })
    })
  }

  /// Like [`filter`](Self::filter); an `Err` from `predicate` becomes the
  /// error notification.
  pub fn try_filter<E, F>(&self, predicate: F) -> Self
  where
    E: Into<Error>,
    F: Fn(&V) -> Result<bool, E> + Send + Sync + 'static,
  {
    let predicate = Arc::new(predicate);
    self.lift(move |observer: Subscriber<V>, upstream| {
      let (predicate, c_upstream) = (predicate.clone(), upstream.clone());
      observer.relay(upstream, move |observer: &Subscriber<V>, value: V| match predicate(&value) {
        Ok(true) => observer.accept(value),
        Ok(false) => {}
        Err(error) => {
          observer.error(error.into());
          c_upstream.dispose();
        }
      })
    })
  }

  /// Drops every value equal to one seen before.
  pub fn distinct(&self) -> Self
  where
    V: Eq + Hash + Clone,
  {
    self.lift(|observer: Subscriber<V>, upstream| {
      let seen = Mutex::new(HashSet::new());
      observer.relay(upstream, move |observer: &Subscriber<V>, value: V| {
        if seen.lock().insert(value.clone()) {
          observer.accept(value)
        }
      })
    })
  }

  /// Drops every value equal to the one right before it.
  pub fn diff(&self) -> Self
  where
    V: PartialEq + Clone,
  {
    self.lift(|observer: Subscriber<V>, upstream| {
      let previous: Mutex<Option<V>> = Mutex::new(None);
      observer.relay(upstream, move |observer: &Subscriber<V>, value: V| {
        let changed = {
          let mut previous = previous.lock();
          let changed = previous.as_ref() != Some(&value);
          if changed {
            *previous = Some(value.clone());
          }
          changed
        };
        if changed {
          observer.accept(value)
        }
      })
    })
  }

  /// Forwards values while `predicate` holds, then completes. The first
  /// failing value is not emitted.
  pub fn take_while<F>(&self, predicate: F) -> Self
  where
    F: Fn(&V) -> bool + Send + Sync + 'static,
  {
    let predicate = Arc::new(predicate);
    self.lift(move |observer: Subscriber<V>, upstream| {
      let (predicate, c_upstream) = (predicate.clone(), upstream.clone());
      observer.relay(upstream, move |observer: &Subscriber<V>, value: V| {
        if predicate(&value) {
          observer.accept(value);
        } else {
          observer.complete();
          c_upstream.dispose();
        }
      })
    })
  }

  /// Drops values while `predicate` holds, then forwards everything.
  pub fn skip_while<F>(&self, predicate: F) -> Self
  where
    F: Fn(&V) -> bool + Send + Sync + 'static,
  {
    let predicate = Arc::new(predicate);
    self.lift(move |observer: Subscriber<V>, upstream| {
      let (predicate, open) = (predicate.clone(), AtomicBool::new(false));
      observer.relay(upstream, move |observer: &Subscriber<V>, value: V| {
        if open.load(Ordering::Acquire) || !predicate(&value) {
          open.store(true, Ordering::Release);
          observer.accept(value);
        }
      })
    })
  }

  /// Forwards values up to and including the first one satisfying
  /// `predicate`, then completes.
  pub fn take_until<F>(&self, predicate: F) -> Self
  where
    F: Fn(&V) -> bool + Send + Sync + 'static,
  {
    let predicate = Arc::new(predicate);
    self.lift(move |observer: Subscriber<V>, upstream| {
      let (predicate, c_upstream) = (predicate.clone(), upstream.clone());
      observer.relay(upstream, move |observer: &Subscriber<V>, value: V| {
        let last = predicate(&value);
        observer.accept(value);
        if last {
          observer.complete();
          c_upstream.dispose();
        }
      })
    })
  }

  /// Drops values until one satisfies `predicate`; that value and every later
  /// one are forwarded.
  pub fn skip_until<F>(&self, predicate: F) -> Self
  where
    F: Fn(&V) -> bool + Send + Sync + 'static,
  {
    let predicate = Arc::new(predicate);
    self.lift(move |observer: Subscriber<V>, upstream| {
      let (predicate, open) = (predicate.clone(), AtomicBool::new(false));
      observer.relay(upstream, move |observer: &Subscriber<V>, value: V| {
        if open.load(Ordering::Acquire) || predicate(&value) {
          open.store(true, Ordering::Release);
          observer.accept(value);
        }
      })
    })
  }

  /// Forwards the values whose zero-based position satisfies `condition`.
  pub fn take_at<F>(&self, condition: F) -> Self
  where
    F: Fn(usize) -> bool + Send + Sync + 'static,
  {
    let condition = Arc::new(condition);
    self.lift(move |observer: Subscriber<V>, upstream| {
      let (condition, position) = (condition.clone(), AtomicUsize::new(0));
      observer.relay(upstream, move |observer: &Subscriber<V>, value: V| {
        if condition(position.fetch_add(1, Ordering::Relaxed)) {
          observer.accept(value)
        }
      })
    })
  }

  /// Drops the values whose zero-based position satisfies `condition`.
  pub fn skip_at<F>(&self, condition: F) -> Self
  where
    F: Fn(usize) -> bool + Send + Sync + 'static,
  {
    self.take_at(move |position| !condition(position))
  }

  /// Forwards values only while the latest value of `condition` is `true`.
  /// Nothing passes before `condition` emits.
  pub fn take_when(&self, condition: Signal<bool>) -> Self { self.gate(condition, false) }

  /// Drops values while the latest value of `condition` is `true`.
  /// Everything passes before `condition` emits.
  pub fn skip_when(&self, condition: Signal<bool>) -> Self {
    self.gate(condition.map(|skip| !skip), true)
  }

  fn gate(&self, condition: Signal<bool>, open: bool) -> Self {
    self.lift(move |observer: Subscriber<V>, upstream| {
      let gate = Arc::new(AtomicBool::new(open));
      let control = upstream.sub();
      let (c_gate, on_error) = (gate.clone(), observer.clone());
      condition.subscribe(
        Subscriber::from_fn(
          &control,
          move |value: bool| c_gate.store(value, Ordering::Release),
          move |error| on_error.error(error),
          || {},
        ),
        control.clone(),
      );
      observer.relay(upstream, move |observer: &Subscriber<V>, value: V| {
        if gate.load(Ordering::Acquire) {
          observer.accept(value)
        }
      })
    })
  }
}

impl<T: Send + 'static> Signal<Option<T>> {
  /// Drops `None` and unwraps the present values.
  pub fn skip_none(&self) -> Signal<T> {
    self.lift(|observer: Subscriber<T>, upstream| {
      observer.relay(upstream, |observer: &Subscriber<T>, value: Option<T>| {
        if let Some(value) = value {
          observer.accept(value);
        }
      })
    })
  }
}

#[cfg(test)]
mod tests {
  use crate::{
    ops::test_util::{collect, events, strings},
    signal::Signal,
    subject::Subject,
  };

  #[test]
  fn filter_and_try_filter() {
    assert_eq!(Signal::of(1..=6).filter(|v| v % 3 == 0).to_list(), vec![3, 6]);

    let checked = Signal::of([1, 2, 3]).try_filter(|v| if *v < 3 { Ok(*v != 1) } else { Err("bad") });
    assert_eq!(events(&checked), strings(&["2", "error bad"]));
  }

  #[test]
  fn skip_none_unwraps_present_values() {
    let signal = Signal::of([Some(1), None, Some(3), None]).skip_none();
    assert_eq!(events(&signal), strings(&["1", "3", "complete"]));
  }

  #[test]
  fn distinct_and_diff() {
    let values = [1, 1, 2, 1, 3, 3, 2];
    assert_eq!(Signal::of(values).distinct().to_list(), vec![1, 2, 3]);
    assert_eq!(Signal::of(values).diff().to_list(), vec![1, 2, 1, 3, 2]);
  }

  #[test]
  fn take_while_excludes_the_failing_value() {
    let signal = Signal::iterate(1..).take_while(|v: &u32| *v < 4);
    assert_eq!(events(&signal), strings(&["1", "2", "3", "complete"]));
  }

  #[test]
  fn take_until_includes_the_matching_value() {
    let signal = Signal::iterate(1..).take_until(|v: &u32| *v == 3);
    assert_eq!(events(&signal), strings(&["1", "2", "3", "complete"]));
  }

  #[test]
  fn skip_while_and_skip_until() {
    let values = [1, 2, 5, 1, 6];
    assert_eq!(Signal::of(values).skip_while(|v| *v < 5).to_list(), vec![5, 1, 6]);
    assert_eq!(Signal::of(values).skip_until(|v| *v == 2).to_list(), vec![2, 5, 1, 6]);
  }

  #[test]
  fn positions() {
    let letters = ['a', 'b', 'c', 'd'];
    assert_eq!(Signal::of(letters).take_at(|i| i % 2 == 0).to_list(), vec!['a', 'c']);
    assert_eq!(Signal::of(letters).skip_at(|i| i == 0).to_list(), vec!['b', 'c', 'd']);
  }

  #[test]
  fn boolean_gates() {
    let source = Subject::new();
    let condition = Subject::new();
    let taken = collect(&source.signal().take_when(condition.signal()));
    let skipped = collect(&source.signal().skip_when(condition.signal()));

    source.accept(1);
    condition.accept(true);
    source.accept(2);
    condition.accept(false);
    source.accept(3);

    assert_eq!(*taken.lock(), vec![2]);
    assert_eq!(*skipped.lock(), vec![1, 3]);
  }
}
