use std::sync::Arc;

use crate::{disposable::Disposable, error::Error, signal::Signal, subscriber::Subscriber};

impl<V: Send + 'static> Signal<V> {
  /// Replaces an error by `value` followed by completion.
  pub fn recover(&self, value: V) -> Self
  where
    V: Clone + Sync,
  {
    self.error_resume(Signal::just(value))
  }

  /// Feeds the error, as a one-value signal, to `flow` and continues with
  /// the signal it builds.
  pub fn recover_when<F>(&self, flow: F) -> Self
  where
    F: Fn(Signal<Error>) -> Signal<V> + Send + Sync + 'static,
  {
    self.error_resume_with(move |error| flow(Signal::just(error)))
  }

  /// Continues with `fallback` when the source fails.
  pub fn error_resume(&self, fallback: Signal<V>) -> Self {
    self.error_resume_with(move |_| fallback.clone())
  }

  /// Continues with the signal `f` builds from the error.
  pub fn error_resume_with<F>(&self, f: F) -> Self
  where
    F: Fn(Error) -> Signal<V> + Send + Sync + 'static,
  {
    let f = Arc::new(f);
    self.lift(move |observer: Subscriber<V>, upstream| {
      let (f, on_next, on_error, on_complete) =
        (f.clone(), observer.clone(), observer.clone(), observer);
      let token = upstream.clone();
      Subscriber::from_fn(
        upstream,
        move |value| on_next.accept(value),
        move |error| {
          tracing::debug!(%error, "resuming after error");
          let slot = token.sub();
          f(error).subscribe(on_error.forward(&slot), slot);
        },
        move || on_complete.complete(),
      )
    })
  }

  /// Swallows an error: the upstream is released and no terminal
  /// notification is sent.
  pub fn skip_error(&self) -> Self {
    self.lift(|observer: Subscriber<V>, upstream: &Disposable| {
      let (on_next, on_complete, token) = (observer.clone(), observer, upstream.clone());
      Subscriber::from_fn(
        upstream,
        move |value| on_next.accept(value),
        move |error| {
          tracing::debug!(%error, "error skipped");
          token.dispose();
        },
        move || on_complete.complete(),
      )
    })
  }

  /// Turns an error into completion.
  pub fn stop_error(&self) -> Self {
    self.lift(|observer: Subscriber<V>, upstream: &Disposable| {
      let (on_next, on_error, on_complete) = (observer.clone(), observer.clone(), observer);
      Subscriber::from_fn(
        upstream,
        move |value| on_next.accept(value),
        move |_| on_error.complete(),
        move || on_complete.complete(),
      )
    })
  }
}

#[cfg(test)]
mod tests {
  use crate::{
    ops::test_util::{events, record, strings},
    signal::Signal,
    subject::Subject,
  };

  fn failing() -> Signal<i32> { Signal::of([1, 2]).concat(Signal::error("broken")) }

  #[test]
  fn recover_with_a_value() {
    assert_eq!(events(&failing().recover(-1)), strings(&["1", "2", "-1", "complete"]));
  }

  #[test]
  fn recover_when_sees_the_error() {
    let signal = failing().recover_when(|errors| errors.map(|error| error.to_string().len() as i32));
    assert_eq!(events(&signal), strings(&["1", "2", "6", "complete"]));
  }

  #[test]
  fn resume_with_another_signal() {
    let resumed = failing().error_resume(Signal::of([10, 20]));
    assert_eq!(events(&resumed), strings(&["1", "2", "10", "20", "complete"]));

    let chained = failing().error_resume_with(|error| Signal::error(format!("still {error}")));
    assert_eq!(events(&chained), strings(&["1", "2", "error still broken"]));
  }

  #[test]
  fn skip_error_ends_silently() {
    let source = Subject::new();
    let (log, _) = record(&source.signal().skip_error());

    source.accept(1);
    source.error("ignored".into());

    assert_eq!(*log.lock(), strings(&["1"]));
    assert_eq!(source.observer_count(), 0);
  }

  #[test]
  fn stop_error_completes() {
    assert_eq!(events(&failing().stop_error()), strings(&["1", "2", "complete"]));
  }
}
