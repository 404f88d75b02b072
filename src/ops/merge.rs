use std::sync::{
  atomic::{AtomicUsize, Ordering},
  Arc,
};

use crate::{disposable::Disposable, ops::Serial, signal::Signal, subscriber::Subscriber};

impl<V: Send + 'static> Signal<V> {
  /// Subscribes to `self` and `other` at once and interleaves their values.
  pub fn merge(&self, other: Signal<V>) -> Self { Signal::merge_all([self.clone(), other]) }

  /// Interleaves the values of every source.
  ///
  /// Completes once all sources have completed. The first error is forwarded
  /// right away and releases the remaining sources.
  pub fn merge_all<I>(sources: I) -> Self
  where
    I: IntoIterator<Item = Signal<V>>,
  {
    let sources: Arc<[Signal<V>]> = sources.into_iter().collect();
    Signal::new(move |observer: Subscriber<V>, disposer: Disposable| {
      if sources.is_empty() {
        observer.complete();
        return disposer;
      }
      let group = disposer.sub();
      let active = Arc::new(AtomicUsize::new(sources.len()));
      for source in sources.iter() {
        if observer.is_stopped() || group.is_disposed() {
          break;
        }
        let (on_next, on_error, on_complete) = (observer.clone(), observer.clone(), observer.clone());
        let (c_group, c_active) = (group.clone(), active.clone());
        let slot = group.sub();
        source.subscribe(
          Subscriber::from_fn(
            &slot,
            move |value| on_next.accept(value),
            move |error| {
              on_error.error(error);
              c_group.dispose();
            },
            move || {
              if c_active.fetch_sub(1, Ordering::AcqRel) == 1 {
                on_complete.complete();
              }
            },
          ),
          slot,
        );
      }
      disposer
    })
  }

  /// Emits every value of `self`, then every value of `other`.
  pub fn concat(&self, other: Signal<V>) -> Self { Signal::concat_all([self.clone(), other]) }

  /// Subscribes to the sources one after another; each starts once the
  /// previous one has completed.
  pub fn concat_all<I>(sources: I) -> Self
  where
    I: IntoIterator<Item = Signal<V>>,
  {
    let sources: Arc<[Signal<V>]> = sources.into_iter().collect();
    Signal::new(move |observer: Subscriber<V>, disposer: Disposable| {
      let concat = Arc::new(Concat {
        sources: sources.clone(),
        observer,
        disposer: disposer.clone(),
        serial: Serial::default(),
      });
      concat.subscribe_at(0);
      disposer
    })
  }

  /// Emits `values` before the values of `self`.
  pub fn start_with<I>(&self, values: I) -> Self
  where
    I: IntoIterator<Item = V>,
    V: Clone + Sync,
  {
    Signal::of(values).concat(self.clone())
  }

  /// Emits the values of `first` before the values of `self`.
  pub fn start_with_signal(&self, first: Signal<V>) -> Self { first.concat(self.clone()) }
}

struct Concat<V> {
  sources: Arc<[Signal<V>]>,
  observer: Subscriber<V>,
  disposer: Disposable,
  serial: Serial,
}

impl<V: Send + 'static> Concat<V> {
  /// Queues the subscription to source `index`; sources that complete
  /// synchronously are chained in a loop.
  fn subscribe_at(self: &Arc<Self>, index: usize) {
    let this = self.clone();
    self.serial.run(move || this.start(index));
  }

  fn start(self: &Arc<Self>, index: usize) {
    let Some(source) = self.sources.get(index) else {
      self.observer.complete();
      return;
    };
    if self.observer.is_stopped() {
      return;
    }
    let slot = self.disposer.sub();
    let (on_next, on_error) = (self.observer.clone(), self.observer.clone());
    let (this, c_slot) = (self.clone(), slot.clone());
    source.subscribe(
      Subscriber::from_fn(
        &slot,
        move |value| on_next.accept(value),
        move |error| on_error.error(error),
        move || {
          c_slot.dispose();
          this.subscribe_at(index + 1);
        },
      ),
      slot,
    );
  }
}
