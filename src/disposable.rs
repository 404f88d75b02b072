use std::{
  fmt::{Debug, Formatter},
  panic::{self, AssertUnwindSafe},
  sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
  },
};

use parking_lot::Mutex;
use smallvec::SmallVec;

/// A cancellation token owning the cleanup of one subscription.
///
/// Tokens are cheap handles: clones share the same state. Disposal is
/// idempotent and runs every registered teardown in registration order. A
/// teardown added after disposal runs immediately.
#[derive(Clone, Default)]
pub struct Disposable(Arc<Inner>);

#[derive(Default)]
struct Inner {
  disposed: AtomicBool,
  teardown: Mutex<SmallVec<[Teardown; 2]>>,
}

enum Teardown {
  Action(Box<dyn FnOnce() + Send>),
  Child(Disposable),
}

impl Teardown {
  fn run(self) {
    match self {
      Teardown::Action(action) => action(),
      Teardown::Child(child) => child.dispose(),
    }
  }

  fn is_closed(&self) -> bool { matches!(self, Teardown::Child(child) if child.is_disposed()) }
}

impl Disposable {
  pub fn empty() -> Self { Self::default() }

  pub fn from_fn<F: FnOnce() + Send + 'static>(action: F) -> Self {
    let disposable = Self::default();
    disposable.add(action);
    disposable
  }

  /// A token that is already disposed.
  pub fn disposed() -> Self {
    let disposable = Self::default();
    disposable.0.disposed.store(true, Ordering::Release);
    disposable
  }

  #[inline]
  pub fn is_disposed(&self) -> bool { self.0.disposed.load(Ordering::Acquire) }

  /// Registers a cleanup action.
  pub fn add<F: FnOnce() + Send + 'static>(&self, action: F) -> &Self {
    self.push(Teardown::Action(Box::new(action)));
    self
  }

  /// Disposes `child` together with this token.
  pub fn add_disposable(&self, child: Disposable) -> &Self {
    if !Arc::ptr_eq(&self.0, &child.0) {
      self.push(Teardown::Child(child));
    }
    self
  }

  /// Returns a token whose disposal disposes both `self` and `other`.
  pub fn and(&self, other: &Disposable) -> Disposable {
    let composite = Disposable::empty();
    composite.add_disposable(self.clone());
    composite.add_disposable(other.clone());
    composite
  }

  /// Creates a child token: it can be disposed on its own and is disposed
  /// when `self` is.
  pub fn sub(&self) -> Disposable {
    let child = Disposable::empty();
    self.add_disposable(child.clone());
    child
  }

  /// Runs every teardown once.
  ///
  /// A panicking teardown does not stop the others. The first panic is
  /// resumed after all of them have run.
  pub fn dispose(&self) {
    if self.0.disposed.swap(true, Ordering::AcqRel) {
      return;
    }
    let teardown = std::mem::take(&mut *self.0.teardown.lock());
    let mut failure = None;
    for item in teardown {
      if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(move || item.run())) {
        failure.get_or_insert(payload);
      }
    }
    if let Some(payload) = failure {
      panic::resume_unwind(payload);
    }
  }

  fn push(&self, item: Teardown) {
    let mut teardown = self.0.teardown.lock();
    if self.is_disposed() {
      drop(teardown);
      item.run();
    } else {
      teardown.retain(|v| !v.is_closed());
      teardown.push(item);
    }
  }

  #[cfg(test)]
  fn teardown_size(&self) -> usize { self.0.teardown.lock().len() }
}

impl Debug for Disposable {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Disposable")
      .field("is_disposed", &self.is_disposed())
      .field("teardown_size", &self.0.teardown.lock().len())
      .finish()
  }
}
