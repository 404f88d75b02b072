//! Observer trait and implementations
//!
//! An observer is the consumer end of a signal. It receives values through
//! `accept`, and at most one terminal notification: `error` or `complete`.
//! Observers are shared between threads, so every method takes `&self`.

use std::sync::Arc;

use crate::error::{report_uncaught, Error};

// ============================================================================
// Observer Trait
// ============================================================================

pub trait Observer<V>: Send + Sync {
  /// Receives the next value.
  fn accept(&self, value: V);

  /// Receives the failure that terminates the sequence.
  ///
  /// The default treats the error as uncaught.
  fn error(&self, error: Error) { report_uncaught(&error) }

  /// Receives the end of the sequence.
  fn complete(&self) {}
}

impl<V, O: Observer<V> + ?Sized> Observer<V> for Arc<O> {
  #[inline]
  fn accept(&self, value: V) { (**self).accept(value) }
  #[inline]
  fn error(&self, error: Error) { (**self).error(error) }
  #[inline]
  fn complete(&self) { (**self).complete() }
}

// ============================================================================
// Handlers
// ============================================================================

type NextFn<V> = Box<dyn Fn(V) + Send + Sync>;
type ErrorFn = Box<dyn Fn(Error) + Send + Sync>;
type CompleteFn = Box<dyn Fn() + Send + Sync>;

/// An observer assembled from optional closures.
///
/// Missing `next` and `complete` handlers do nothing. A missing `error`
/// handler reports the error as uncaught.
///
/// ```rust
/// use rxsignal::prelude::*;
///
/// let handlers = Handlers::new()
///   .on_next(|v: i32| println!("{v}"))
///   .on_complete(|| println!("done"));
/// Signal::of([1, 2, 3]).to_observer(handlers);
/// ```
pub struct Handlers<V> {
  next: Option<NextFn<V>>,
  error: Option<ErrorFn>,
  complete: Option<CompleteFn>,
}

impl<V> Handlers<V> {
  pub fn new() -> Self { Handlers { next: None, error: None, complete: None } }

  pub fn on_next<F: Fn(V) + Send + Sync + 'static>(mut self, next: F) -> Self {
    self.next = Some(Box::new(next));
    self
  }

  pub fn on_error<F: Fn(Error) + Send + Sync + 'static>(mut self, error: F) -> Self {
    self.error = Some(Box::new(error));
    self
  }

  pub fn on_complete<F: Fn() + Send + Sync + 'static>(mut self, complete: F) -> Self {
    self.complete = Some(Box::new(complete));
    self
  }
}

impl<V> Default for Handlers<V> {
  fn default() -> Self { Self::new() }
}

impl<V> Observer<V> for Handlers<V> {
  fn accept(&self, value: V) {
    if let Some(next) = &self.next {
      next(value)
    }
  }

  fn error(&self, error: Error) {
    match &self.error {
      Some(handler) => handler(error),
      None => report_uncaught(&error),
    }
  }

  fn complete(&self) {
    if let Some(complete) = &self.complete {
      complete()
    }
  }
}

/// Closure triple used by operators that intercept all three channels.
pub(crate) struct FnObserver<N, E, C> {
  pub next: N,
  pub error: E,
  pub complete: C,
}

impl<V, N, E, C> Observer<V> for FnObserver<N, E, C>
where
  N: Fn(V) + Send + Sync,
  E: Fn(Error) + Send + Sync,
  C: Fn() + Send + Sync,
{
  #[inline]
  fn accept(&self, value: V) { (self.next)(value) }
  #[inline]
  fn error(&self, error: Error) { (self.error)(error) }
  #[inline]
  fn complete(&self) { (self.complete)() }
}
