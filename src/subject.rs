use std::sync::{
  atomic::{AtomicU64, Ordering},
  Arc,
};

use parking_lot::Mutex;

use crate::{
  disposable::Disposable, error::Error, observer::Observer, signal::Signal, subscriber::Subscriber,
};

/// A hot multicast hub.
///
/// Values pushed into a subject are broadcast to the subscribers registered
/// at that moment. Once terminated, the subject delivers the terminal
/// notification to late subscribers immediately.
pub struct Subject<V> {
  inner: Arc<Inner<V>>,
}

struct Inner<V> {
  observers: Mutex<Vec<(u64, Subscriber<V>)>>,
  terminal: Mutex<Option<Terminal>>,
  next_id: AtomicU64,
}

#[derive(Clone)]
enum Terminal {
  Error(Error),
  Complete,
}

impl<V> Clone for Subject<V> {
  fn clone(&self) -> Self { Subject { inner: self.inner.clone() } }
}

impl<V: Clone + Send + 'static> Default for Subject<V> {
  fn default() -> Self { Self::new() }
}

impl<V: Clone + Send + 'static> Subject<V> {
  pub fn new() -> Self {
    Subject {
      inner: Arc::new(Inner {
        observers: Mutex::new(vec![]),
        terminal: Mutex::new(None),
        next_id: AtomicU64::new(0),
      }),
    }
  }

  /// The signal side of the hub.
  pub fn signal(&self) -> Signal<V> {
    let inner = self.inner.clone();
    Signal::new(move |observer: Subscriber<V>, disposer: Disposable| {
      let terminal = inner.terminal.lock().clone();
      match terminal {
        Some(Terminal::Error(error)) => observer.error(error),
        Some(Terminal::Complete) => observer.complete(),
        None => {
          let id = inner.next_id.fetch_add(1, Ordering::Relaxed);
          inner.observers.lock().push((id, observer));
          let inner = Arc::downgrade(&inner);
          disposer.add(move || {
            if let Some(inner) = inner.upgrade() {
              inner.observers.lock().retain(|(v, _)| *v != id);
            }
          });
        }
      }
      disposer
    })
  }

  pub fn accept(&self, value: V) {
    for observer in self.snapshot() {
      observer.accept(value.clone());
    }
  }

  pub fn error(&self, error: Error) {
    if self.terminate(Terminal::Error(error.clone())) {
      for observer in self.drain() {
        observer.error(error.clone());
      }
    }
  }

  pub fn complete(&self) {
    if self.terminate(Terminal::Complete) {
      for observer in self.drain() {
        observer.complete();
      }
    }
  }

  pub fn observer_count(&self) -> usize { self.inner.observers.lock().len() }

  pub fn is_terminated(&self) -> bool { self.inner.terminal.lock().is_some() }

  fn snapshot(&self) -> Vec<Subscriber<V>> {
    self.inner.observers.lock().iter().map(|(_, o)| o.clone()).collect()
  }

  fn drain(&self) -> Vec<Subscriber<V>> {
    std::mem::take(&mut *self.inner.observers.lock()).into_iter().map(|(_, o)| o).collect()
  }

  fn terminate(&self, terminal: Terminal) -> bool {
    let mut slot = self.inner.terminal.lock();
    if slot.is_some() {
      return false;
    }
    *slot = Some(terminal);
    true
  }
}

impl<V: Clone + Send + 'static> Observer<V> for Subject<V> {
  fn accept(&self, value: V) { Subject::accept(self, value) }
  fn error(&self, error: Error) { Subject::error(self, error) }
  fn complete(&self) { Subject::complete(self) }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::observer::Handlers;

  #[test]
  fn broadcasts_to_current_subscribers() {
    let subject = Subject::new();
    let first = Arc::new(Mutex::new(vec![]));
    let second = Arc::new(Mutex::new(vec![]));
    let c_first = first.clone();
    subject.signal().to(move |v| c_first.lock().push(v));
    subject.accept(1);

    let c_second = second.clone();
    subject.signal().to(move |v| c_second.lock().push(v));
    subject.accept(2);

    assert_eq!(*first.lock(), vec![1, 2]);
    assert_eq!(*second.lock(), vec![2]);
  }

  #[test]
  fn dispose_unregisters() {
    let subject = Subject::<i32>::new();
    let disposer = subject.signal().to(|_| {});
    assert_eq!(subject.observer_count(), 1);
    disposer.dispose();
    assert_eq!(subject.observer_count(), 0);
  }

  #[test]
  fn late_subscriber_sees_terminal() {
    let subject = Subject::<i32>::new();
    subject.complete();
    subject.error(Error::msg("ignored"));

    let completed = Arc::new(Mutex::new(false));
    let c_completed = completed.clone();
    subject
      .signal()
      .to_observer(Handlers::new().on_complete(move || *c_completed.lock() = true));
    assert!(*completed.lock());
    assert!(subject.is_terminated());
  }
}
