use std::sync::{
  atomic::{AtomicBool, AtomicUsize, Ordering},
  Arc,
};

use parking_lot::Mutex;

use crate::{
  disposable::Disposable, error::Error, signal::Signal, subject::Subject, subscriber::Subscriber,
};

type ErrorStep<V> = Box<dyn Fn(&Arc<Cycle<V>>, Error) + Send + Sync>;
type CompleteStep<V> = Box<dyn Fn(&Arc<Cycle<V>>) + Send + Sync>;

/// One downstream subscription that may subscribe to its source many times.
struct Cycle<V> {
  source: Signal<V>,
  observer: Subscriber<V>,
  disposer: Disposable,
  state: Mutex<CycleState>,
  on_error: ErrorStep<V>,
  on_complete: CompleteStep<V>,
}

#[derive(Default)]
struct CycleState {
  current: Option<Disposable>,
  attempts: usize,
  pending: usize,
  draining: bool,
}

impl<V: Send + 'static> Cycle<V> {
  fn new(
    source: Signal<V>,
    observer: Subscriber<V>,
    disposer: Disposable,
    on_error: ErrorStep<V>,
    on_complete: CompleteStep<V>,
  ) -> Arc<Self> {
    Arc::new(Cycle { source, observer, disposer, state: Mutex::default(), on_error, on_complete })
  }

  /// Subscribes to the source again, releasing the previous subscription.
  ///
  /// A source that terminates synchronously asks for the next round while
  /// the current one is still being set up; such requests are queued and
  /// run by the outermost call, so the stack stays flat.
  fn resubscribe(self: &Arc<Self>) {
    {
      let mut state = self.state.lock();
      state.pending += 1;
      if state.draining {
        return;
      }
      state.draining = true;
    }

    loop {
      let (slot, previous, attempt) = {
        let mut state = self.state.lock();
        if state.pending == 0 || self.disposer.is_disposed() || self.observer.is_stopped() {
          state.pending = 0;
          state.draining = false;
          return;
        }
        state.pending -= 1;
        state.attempts += 1;
        let slot = self.disposer.sub();
        (slot.clone(), state.current.replace(slot), state.attempts)
      };
      if let Some(previous) = previous {
        previous.dispose();
      }
      if attempt > 1 {
        tracing::debug!(attempt, "resubscribing to source");
      }

      let (on_next, on_error, on_complete) = (self.observer.clone(), self.clone(), self.clone());
      self.source.subscribe(
        Subscriber::from_fn(
          &slot,
          move |value| on_next.accept(value),
          move |error| (on_error.on_error)(&on_error, error),
          move || (on_complete.on_complete)(&on_complete),
        ),
        slot,
      );
    }
  }

  fn release(&self) {
    let current = self.state.lock().current.take();
    if let Some(current) = current {
      current.dispose();
    }
  }
}

impl<V: Send + 'static> Signal<V> {
  /// Runs one cycle per subscription with fresh steps from `steps`.
  fn cycle<S>(&self, steps: S) -> Self
  where
    S: Fn() -> (ErrorStep<V>, CompleteStep<V>) + Send + Sync + 'static,
  {
    let source = self.clone();
    Signal::new(move |observer: Subscriber<V>, disposer: Disposable| {
      let (on_error, on_complete) = steps();
      Cycle::new(source.clone(), observer, disposer.clone(), on_error, on_complete).resubscribe();
      disposer
    })
  }

  /// Resubscribes on every error.
  pub fn retry(&self) -> Self { self.retry_if(|_| true) }

  /// Resubscribes on error at most `times` times, then lets the error
  /// through.
  pub fn retry_times(&self, times: usize) -> Self {
    self.cycle(move || {
      let retries = AtomicUsize::new(0);
      let on_error: ErrorStep<V> = Box::new(move |cycle, error| {
        if retries.fetch_add(1, Ordering::AcqRel) < times {
          cycle.resubscribe();
        } else {
          cycle.observer.error(error);
        }
      });
      (on_error, complete_step())
    })
  }

  /// Resubscribes while `predicate` accepts the error.
  pub fn retry_if<P>(&self, predicate: P) -> Self
  where
    P: Fn(&Error) -> bool + Send + Sync + 'static,
  {
    let predicate = Arc::new(predicate);
    self.cycle(move || {
      let predicate = predicate.clone();
      let on_error: ErrorStep<V> = Box::new(move |cycle, error| {
        if predicate(&error) {
          cycle.resubscribe();
        } else {
          cycle.observer.error(error);
        }
      });
      (on_error, complete_step())
    })
  }

  /// Resubscribes under the control of `flow`.
  ///
  /// `flow` receives the signal of errors and returns the signal of retry
  /// requests: each of its values resubscribes, its error fails the result
  /// and its completion completes it. Backoff and attempt limits are built by
  /// composing operators on the error signal.
  ///
  /// ```rust
  /// use std::time::Duration;
  ///
  /// use rxsignal::prelude::*;
  ///
  /// let scheduler = TestScheduler::new();
  /// let delays = scheduler.clone();
  /// let gave_up = Variable::empty();
  /// let c_gave_up = gave_up.clone();
  /// Signal::<i32>::error("offline")
  ///   .retry_when(move |errors| {
  ///     let delays = delays.clone();
  ///     errors
  ///       .index()
  ///       .take_while(|(_, attempt)| *attempt < 3)
  ///       .flat_map(move |(_, attempt)| {
  ///         Signal::timer_on(Duration::from_millis(10 << attempt), delays.clone())
  ///       })
  ///   })
  ///   .effect_on_complete(move || {
  ///     c_gave_up.set(true);
  ///   })
  ///   .to(|_| {});
  ///
  /// scheduler.flush();
  /// assert_eq!(gave_up.get(), Some(true));
  /// ```
  pub fn retry_when<T, F>(&self, flow: F) -> Self
  where
    T: Send + 'static,
    F: Fn(Signal<Error>) -> Signal<T> + Send + Sync + 'static,
  {
    let source = self.clone();
    Signal::new(move |observer: Subscriber<V>, disposer: Disposable| {
      let errors = Subject::<Error>::new();
      let c_errors = errors.clone();
      let cycle = Cycle::new(
        source.clone(),
        observer,
        disposer.clone(),
        Box::new(move |_, error| c_errors.accept(error)),
        complete_step(),
      );
      drive(&cycle, flow(errors.signal()), &disposer);
      cycle.resubscribe();
      disposer
    })
  }

  /// Resubscribes every time the source completes.
  pub fn repeat(&self) -> Self {
    self.cycle(|| {
      let on_complete: CompleteStep<V> = Box::new(|cycle| cycle.resubscribe());
      (error_step(), on_complete)
    })
  }

  /// Subscribes to the source `times` times in total, one after another.
  pub fn repeat_times(&self, times: usize) -> Self {
    if times == 0 {
      return Signal::empty();
    }
    self.cycle(move || {
      let rounds = AtomicUsize::new(1);
      let on_complete: CompleteStep<V> = Box::new(move |cycle| {
        if rounds.fetch_add(1, Ordering::AcqRel) < times {
          cycle.resubscribe();
        } else {
          cycle.observer.complete();
        }
      });
      (error_step(), on_complete)
    })
  }

  /// Resubscribes on completion while `condition` holds.
  pub fn repeat_if<P>(&self, condition: P) -> Self
  where
    P: Fn() -> bool + Send + Sync + 'static,
  {
    let condition = Arc::new(condition);
    self.cycle(move || {
      let condition = condition.clone();
      let on_complete: CompleteStep<V> = Box::new(move |cycle| {
        if condition() {
          cycle.resubscribe();
        } else {
          cycle.observer.complete();
        }
      });
      (error_step(), on_complete)
    })
  }

  /// Resubscribes on completion until `stopper` has emitted.
  ///
  /// `stopper` is subscribed along with the first round and only its first
  /// value counts; the round running when it emits still finishes.
  pub fn repeat_until<T: Send + 'static>(&self, stopper: Signal<T>) -> Self {
    let source = self.clone();
    Signal::new(move |observer: Subscriber<V>, disposer: Disposable| {
      let stopped = Arc::new(AtomicBool::new(false));
      let control = disposer.sub();
      let (c_stopped, c_control) = (stopped.clone(), control.clone());
      stopper.subscribe(
        Subscriber::from_fn(
          &control,
          move |_: T| {
            c_stopped.store(true, Ordering::Release);
            c_control.dispose();
          },
          |_: Error| {},
          || {},
        ),
        control.clone(),
      );

      let on_complete: CompleteStep<V> = Box::new(move |cycle| {
        if stopped.load(Ordering::Acquire) {
          cycle.observer.complete();
        } else {
          cycle.resubscribe();
        }
      });
      Cycle::new(source.clone(), observer, disposer.clone(), error_step(), on_complete).resubscribe();
      disposer
    })
  }

  /// Resubscribes under the control of `flow`, which receives a signal of
  /// completions. See [`retry_when`](Self::retry_when).
  pub fn repeat_when<T, F>(&self, flow: F) -> Self
  where
    T: Send + 'static,
    F: Fn(Signal<()>) -> Signal<T> + Send + Sync + 'static,
  {
    let source = self.clone();
    Signal::new(move |observer: Subscriber<V>, disposer: Disposable| {
      let completions = Subject::<()>::new();
      let c_completions = completions.clone();
      let cycle = Cycle::new(
        source.clone(),
        observer,
        disposer.clone(),
        error_step(),
        Box::new(move |_| c_completions.accept(())),
      );
      drive(&cycle, flow(completions.signal()), &disposer);
      cycle.resubscribe();
      disposer
    })
  }
}

/// Forwards the error downstream.
fn error_step<V: Send + 'static>() -> ErrorStep<V> { Box::new(|cycle, error| cycle.observer.error(error)) }

/// Forwards the completion downstream.
fn complete_step<V: Send + 'static>() -> CompleteStep<V> { Box::new(|cycle| cycle.observer.complete()) }

/// Subscribes the control signal of a `*_when` operator.
fn drive<V: Send + 'static, T: Send + 'static>(cycle: &Arc<Cycle<V>>, requests: Signal<T>, disposer: &Disposable) {
  let control = disposer.sub();
  let (on_request, on_error, on_complete) = (cycle.clone(), cycle.clone(), cycle.clone());
  requests.subscribe(
    Subscriber::from_fn(
      &control,
      move |_: T| on_request.resubscribe(),
      move |error| {
        on_error.observer.error(error);
        on_error.release();
      },
      move || {
        on_complete.observer.complete();
        on_complete.release();
      },
    ),
    control.clone(),
  );
}
