use std::sync::{
  atomic::{AtomicBool, Ordering},
  Arc,
};

use crate::{
  disposable::Disposable,
  error::Error,
  observer::{FnObserver, Observer},
};

/// The observer handle operators pass around.
///
/// A subscriber wraps an [`Observer`] with a stopped guard: once `error` or
/// `complete` has been delivered, or its disposable is disposed, every later
/// notification is dropped. Clones share the guard.
pub struct Subscriber<V> {
  inner: Arc<Inner<V>>,
}

struct Inner<V> {
  observer: Box<dyn Observer<V>>,
  stopped: AtomicBool,
  disposer: Disposable,
  release_on_stop: bool,
}

impl<V> Clone for Subscriber<V> {
  fn clone(&self) -> Self { Subscriber { inner: self.inner.clone() } }
}

impl<V: 'static> Subscriber<V> {
  pub fn new<O: Observer<V> + 'static>(observer: O, disposer: &Disposable) -> Self {
    Self::build(observer, disposer, false)
  }

  /// A terminal subscriber: after `error` or `complete` it disposes its
  /// disposable, releasing the whole subscription chain.
  pub(crate) fn root<O: Observer<V> + 'static>(observer: O, disposer: &Disposable) -> Self {
    Self::build(observer, disposer, true)
  }

  pub(crate) fn from_fn<N, E, C>(disposer: &Disposable, next: N, error: E, complete: C) -> Self
  where
    N: Fn(V) + Send + Sync + 'static,
    E: Fn(Error) + Send + Sync + 'static,
    C: Fn() + Send + Sync + 'static,
  {
    Self::new(FnObserver { next, error, complete }, disposer)
  }

  fn build<O: Observer<V> + 'static>(observer: O, disposer: &Disposable, release: bool) -> Self {
    Subscriber {
      inner: Arc::new(Inner {
        observer: Box::new(observer),
        stopped: AtomicBool::new(false),
        disposer: disposer.clone(),
        release_on_stop: release,
      }),
    }
  }

  pub fn accept(&self, value: V) {
    if !self.is_stopped() {
      self.inner.observer.accept(value)
    }
  }

  pub fn error(&self, error: Error) {
    if self.stop() {
      self.inner.observer.error(error);
      self.release();
    }
  }

  pub fn complete(&self) {
    if self.stop() {
      self.inner.observer.complete();
      self.release();
    }
  }

  /// Whether notifications are still delivered.
  #[inline]
  pub fn is_stopped(&self) -> bool {
    self.inner.stopped.load(Ordering::Acquire) || self.inner.disposer.is_disposed()
  }

  #[inline]
  pub fn disposer(&self) -> &Disposable { &self.inner.disposer }

  /// Builds an upstream subscriber whose values go through `next` and whose
  /// terminal notifications are forwarded to `self`.
  pub fn relay<U, F>(&self, disposer: &Disposable, next: F) -> Subscriber<U>
  where
    U: 'static,
    F: Fn(&Subscriber<V>, U) + Send + Sync + 'static,
  {
    let (downstream, on_error, on_complete) = (self.clone(), self.clone(), self.clone());
    Subscriber::<U>::from_fn(
      disposer,
      move |value| next(&downstream, value),
      move |error| on_error.error(error),
      move || on_complete.complete(),
    )
  }

  /// An upstream subscriber forwarding every notification unchanged.
  pub fn forward(&self, disposer: &Disposable) -> Subscriber<V> {
    self.relay(disposer, |observer, value| observer.accept(value))
  }

  fn stop(&self) -> bool {
    !self.inner.disposer.is_disposed() && !self.inner.stopped.swap(true, Ordering::AcqRel)
  }

  fn release(&self) {
    if self.inner.release_on_stop {
      self.inner.disposer.dispose();
    }
  }
}

impl<V: 'static> Observer<V> for Subscriber<V> {
  #[inline]
  fn accept(&self, value: V) { Subscriber::accept(self, value) }
  #[inline]
  fn error(&self, error: Error) { Subscriber::error(self, error) }
  #[inline]
  fn complete(&self) { Subscriber::complete(self) }
}

#[cfg(test)]
mod tests {
  use parking_lot::Mutex;

  use super::*;
  use crate::observer::Handlers;

  fn recorder() -> (Arc<Mutex<Vec<String>>>, Handlers<i32>) {
    let log = Arc::new(Mutex::new(vec![]));
    let (n, e, c) = (log.clone(), log.clone(), log.clone());
    let handlers = Handlers::new()
      .on_next(move |v: i32| n.lock().push(v.to_string()))
      .on_error(move |err| e.lock().push(format!("error {err}")))
      .on_complete(move || c.lock().push("complete".into()));
    (log, handlers)
  }

  #[test]
  fn nothing_after_terminal() {
    let (log, handlers) = recorder();
    let subscriber = Subscriber::new(handlers, &Disposable::empty());
    subscriber.accept(1);
    subscriber.complete();
    subscriber.accept(2);
    subscriber.error(Error::msg("late"));
    subscriber.complete();
    assert_eq!(*log.lock(), vec!["1", "complete"]);
  }

  #[test]
  fn nothing_after_dispose() {
    let (log, handlers) = recorder();
    let disposer = Disposable::empty();
    let subscriber = Subscriber::new(handlers, &disposer);
    subscriber.accept(1);
    disposer.dispose();
    subscriber.accept(2);
    subscriber.complete();
    assert_eq!(*log.lock(), vec!["1"]);
  }

  #[test]
  fn root_releases_on_terminal() {
    let (_, handlers) = recorder();
    let disposer = Disposable::empty();
    let subscriber = Subscriber::root(handlers, &disposer);
    subscriber.error(Error::msg("bad"));
    assert!(disposer.is_disposed());
  }

  #[test]
  fn relay_transforms_values_and_forwards_terminals() {
    let (log, handlers) = recorder();
    let disposer = Disposable::empty();
    let downstream = Subscriber::new(handlers, &disposer);
    let upstream: Subscriber<&str> =
      downstream.relay(&disposer, |observer, value: &str| observer.accept(value.len() as i32));

    upstream.accept("abc");
    upstream.complete();
    upstream.accept("late");
    assert_eq!(*log.lock(), vec!["3", "complete"]);
    assert!(downstream.is_stopped());
  }
}
