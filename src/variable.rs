use std::sync::Arc;

use parking_lot::Mutex;

/// A shared single-value slot.
///
/// Returned by [`Signal::to_variable`](crate::signal::Signal::to_variable)
/// and updated with the most recently emitted value.
pub struct Variable<V>(Arc<Mutex<Option<V>>>);

impl<V> Clone for Variable<V> {
  fn clone(&self) -> Self { Variable(self.0.clone()) }
}

impl<V> Default for Variable<V> {
  fn default() -> Self { Self::empty() }
}

impl<V> Variable<V> {
  pub fn empty() -> Self { Variable(Arc::new(Mutex::new(None))) }

  pub fn of(value: V) -> Self { Variable(Arc::new(Mutex::new(Some(value)))) }

  /// Stores `value`, returning the previous one.
  pub fn set(&self, value: V) -> Option<V> { self.0.lock().replace(value) }

  pub fn take(&self) -> Option<V> { self.0.lock().take() }

  pub fn is_present(&self) -> bool { self.0.lock().is_some() }

  pub fn is_absent(&self) -> bool { !self.is_present() }
}

impl<V: Clone> Variable<V> {
  pub fn get(&self) -> Option<V> { self.0.lock().clone() }
}

impl<V: std::fmt::Debug> std::fmt::Debug for Variable<V> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_tuple("Variable").field(&*self.0.lock()).finish()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn set_and_take() {
    let variable = Variable::empty();
    assert!(variable.is_absent());
    assert_eq!(variable.set(1), None);
    assert_eq!(variable.set(2), Some(1));
    assert_eq!(variable.get(), Some(2));
    assert_eq!(variable.take(), Some(2));
    assert!(variable.is_absent());
  }

  #[test]
  fn clones_share_the_slot() {
    let variable = Variable::of("a");
    let other = variable.clone();
    other.set("b");
    assert_eq!(variable.get(), Some("b"));
  }
}
