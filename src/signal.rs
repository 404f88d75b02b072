//! The [`Signal`] type and its terminal operations.
//!
//! A signal is a cold description of a value sequence, built from one
//! subscription function `(Subscriber<V>, Disposable) -> Disposable`. Nothing
//! runs until a terminal operation (`to*`) subscribes; every subscription
//! runs the function again, independently.
//!
//! ```rust
//! use rxsignal::prelude::*;
//!
//! let evens = Signal::of(0..10)
//!   .filter(|v| v % 2 == 0)
//!   .map(|v| v * 10)
//!   .to_list();
//! assert_eq!(evens, vec![0, 20, 40, 60, 80]);
//! ```

use std::{
  collections::{HashMap, HashSet},
  hash::Hash,
  pin::Pin,
  sync::Arc,
  task::{Context, Poll},
};

use futures::{
  channel::mpsc::{self, UnboundedReceiver},
  Stream, StreamExt,
};
use parking_lot::Mutex;

use crate::{
  disposable::Disposable,
  error::Error,
  observer::{Handlers, Observer},
  subscriber::Subscriber,
  variable::Variable,
};

type SubscribeFn<V> = dyn Fn(Subscriber<V>, Disposable) -> Disposable + Send + Sync;

pub struct Signal<V> {
  subscribe: Arc<SubscribeFn<V>>,
}

impl<V> Clone for Signal<V> {
  fn clone(&self) -> Self { Signal { subscribe: self.subscribe.clone() } }
}

impl<V: Send + 'static> Signal<V> {
  /// Creates a signal from its subscription function.
  ///
  /// The function must send values to the subscriber, finish with at most
  /// one terminal notification, and return a disposable that stops it. Most
  /// functions return the disposable they were given.
  pub fn new<F>(subscribe: F) -> Self
  where
    F: Fn(Subscriber<V>, Disposable) -> Disposable + Send + Sync + 'static,
  {
    Signal { subscribe: Arc::new(subscribe) }
  }

  /// Runs the subscription function with an explicit subscriber.
  #[inline]
  pub fn subscribe(&self, observer: Subscriber<V>, disposer: Disposable) -> Disposable {
    (self.subscribe)(observer, disposer)
  }

  /// Subscribes with a value handler.
  ///
  /// Errors go to the uncaught hook.
  pub fn to<F: Fn(V) + Send + Sync + 'static>(&self, next: F) -> Disposable {
    self.to_observer(Handlers::new().on_next(next))
  }

  /// Subscribes with a full observer, such as [`Handlers`].
  pub fn to_observer<O: Observer<V> + 'static>(&self, observer: O) -> Disposable {
    let disposer = Disposable::empty();
    self.subscribe(Subscriber::root(observer, &disposer), disposer)
  }

  /// Subscribes and keeps the latest value in a [`Variable`].
  ///
  /// For a synchronous source the variable holds the last value as soon as
  /// this returns.
  pub fn to_variable(&self) -> Variable<V> {
    let variable = Variable::empty();
    let slot = variable.clone();
    self.to(move |value| {
      slot.set(value);
    });
    variable
  }

  /// Collects the values delivered during subscription into `C`.
  ///
  /// The subscription is disposed before returning, so values produced
  /// asynchronously afterwards are not collected.
  pub fn to_collection<C, F>(&self, assign: F) -> C
  where
    C: Default + Send + 'static,
    F: Fn(&mut C, V) + Send + Sync + 'static,
  {
    let collection = Arc::new(Mutex::new(C::default()));
    let target = collection.clone();
    let disposer = self.to(move |value| assign(&mut *target.lock(), value));
    disposer.dispose();
    let mut collection = collection.lock();
    std::mem::take(&mut *collection)
  }

  pub fn to_list(&self) -> Vec<V> { self.to_collection(|list: &mut Vec<V>, value| list.push(value)) }

  pub fn to_set(&self) -> HashSet<V>
  where
    V: Eq + Hash,
  {
    self.to_collection(|set: &mut HashSet<V>, value| {
      set.insert(value);
    })
  }

  /// Collects into a map keyed by `key`; later values replace earlier ones.
  pub fn to_map<K, F>(&self, key: F) -> HashMap<K, V>
  where
    K: Eq + Hash + Send + 'static,
    F: Fn(&V) -> K + Send + Sync + 'static,
  {
    self.to_collection(move |map: &mut HashMap<K, V>, value| {
      map.insert(key(&value), value);
    })
  }

  pub fn to_map_with<K, T, FK, FV>(&self, key: FK, value: FV) -> HashMap<K, T>
  where
    K: Eq + Hash + Send + 'static,
    T: Send + 'static,
    FK: Fn(&V) -> K + Send + Sync + 'static,
    FV: Fn(V) -> T + Send + Sync + 'static,
  {
    self.to_collection(move |map: &mut HashMap<K, T>, v| {
      map.insert(key(&v), value(v));
    })
  }

  /// Groups values by `key`, keeping arrival order inside each group.
  pub fn to_grouped<K, F>(&self, key: F) -> HashMap<K, Vec<V>>
  where
    K: Eq + Hash + Send + 'static,
    F: Fn(&V) -> K + Send + Sync + 'static,
  {
    self.to_collection(move |groups: &mut HashMap<K, Vec<V>>, value| {
      groups.entry(key(&value)).or_default().push(value);
    })
  }

  /// Adapts the signal into a [`Stream`] of results.
  ///
  /// An error is yielded as the last item. Dropping the stream disposes the
  /// subscription.
  pub fn to_stream(&self) -> SignalStream<V> {
    let (sender, receiver) = mpsc::unbounded();
    let (on_next, on_error, on_complete) = (sender.clone(), sender.clone(), sender);
    let handlers = Handlers::new()
      .on_next(move |value| {
        let _ = on_next.unbounded_send(Ok(value));
      })
      .on_error(move |error| {
        let _ = on_error.unbounded_send(Err(error));
        on_error.close_channel();
      })
      .on_complete(move || on_complete.close_channel());
    let disposer = self.to_observer(handlers);
    SignalStream { receiver, disposer }
  }
}

/// A [`Stream`] over the notifications of a subscription.
pub struct SignalStream<V> {
  receiver: UnboundedReceiver<Result<V, Error>>,
  disposer: Disposable,
}

impl<V> Unpin for SignalStream<V> {}

impl<V> Stream for SignalStream<V> {
  type Item = Result<V, Error>;

  fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
    self.receiver.poll_next_unpin(cx)
  }
}

impl<V> Drop for SignalStream<V> {
  fn drop(&mut self) { self.disposer.dispose() }
}

#[cfg(test)]
mod tests {
  use std::sync::atomic::{AtomicUsize, Ordering};

  use futures::executor::block_on;

  use super::*;

  fn numbers() -> Signal<i32> {
    Signal::new(|observer: Subscriber<i32>, disposer: Disposable| {
      for v in 1..=4 {
        observer.accept(v);
      }
      observer.complete();
      disposer
    })
  }

  #[test]
  fn each_subscription_reruns_the_source() {
    let runs = Arc::new(AtomicUsize::new(0));
    let c_runs = runs.clone();
    let signal = Signal::new(move |observer: Subscriber<i32>, disposer: Disposable| {
      c_runs.fetch_add(1, Ordering::SeqCst);
      observer.accept(1);
      disposer
    });

    signal.to(|_| {});
    signal.to(|_| {});
    assert_eq!(runs.load(Ordering::SeqCst), 2);
  }

  #[test]
  fn dispose_stops_delivery() {
    let slot: Arc<Mutex<Option<Subscriber<i32>>>> = Arc::new(Mutex::new(None));
    let c_slot = slot.clone();
    let signal = Signal::new(move |observer: Subscriber<i32>, disposer: Disposable| {
      *c_slot.lock() = Some(observer);
      disposer
    });
    let seen = Arc::new(Mutex::new(vec![]));
    let c_seen = seen.clone();
    let disposer = signal.to(move |v| c_seen.lock().push(v));

    let observer = slot.lock().clone().unwrap();
    observer.accept(1);
    disposer.dispose();
    observer.accept(2);
    observer.complete();

    assert_eq!(*seen.lock(), vec![1]);
  }

  #[test]
  fn terminal_releases_subscription() {
    let disposer = numbers().to(|_| {});
    assert!(disposer.is_disposed());
  }

  #[test]
  fn variable_holds_latest() {
    let variable = numbers().to_variable();
    assert_eq!(variable.get(), Some(4));
  }

  #[test]
  fn collections() {
    assert_eq!(numbers().to_list(), vec![1, 2, 3, 4]);
    assert_eq!(numbers().to_set(), HashSet::from([1, 2, 3, 4]));

    let by_parity = numbers().to_map(|v| v % 2);
    assert_eq!(by_parity, HashMap::from([(0, 4), (1, 3)]));

    let squares = numbers().to_map_with(|v| *v, |v| v * v);
    assert_eq!(squares[&3], 9);

    let groups = numbers().to_grouped(|v| v % 2 == 0);
    assert_eq!(groups[&true], vec![2, 4]);
    assert_eq!(groups[&false], vec![1, 3]);
  }

  #[test]
  fn stream_yields_values_then_ends() {
    let items: Vec<_> = block_on(numbers().to_stream().collect());
    assert_eq!(items, vec![Ok(1), Ok(2), Ok(3), Ok(4)]);
  }

  #[test]
  fn stream_yields_error_last() {
    let failing = Signal::new(|observer: Subscriber<i32>, disposer: Disposable| {
      observer.accept(1);
      observer.error(Error::msg("broken"));
      disposer
    });
    let items: Vec<_> = block_on(failing.to_stream().collect());
    assert_eq!(items, vec![Ok(1), Err(Error::msg("broken"))]);
  }
}
