use std::{
  collections::VecDeque,
  sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
  },
};

use parking_lot::Mutex;

use crate::{disposable::Disposable, error::Error, ops::Serial, signal::Signal, subscriber::Subscriber};

impl<V: Send + 'static> Signal<V> {
  /// Maps every value to a signal and merges all of them.
  ///
  /// Completes once the source and every inner signal have completed.
  pub fn flat_map<R, F>(&self, f: F) -> Signal<R>
  where
    R: Send + 'static,
    F: Fn(V) -> Signal<R> + Send + Sync + 'static,
  {
    let f = Arc::new(f);
    self.lift(move |observer: Subscriber<R>, upstream| {
      // the source counts as one active stream
      let active = Arc::new(AtomicUsize::new(1));
      let (f, inner_observer, inner_active, inner_upstream) =
        (f.clone(), observer.clone(), active.clone(), upstream.clone());
      let (on_error, on_complete) = (observer.clone(), observer);
      Subscriber::from_fn(
        upstream,
        move |value: V| {
          inner_active.fetch_add(1, Ordering::AcqRel);
          let slot = inner_upstream.sub();
          let (on_next, on_error, on_complete) =
            (inner_observer.clone(), inner_observer.clone(), inner_observer.clone());
          let (active, c_slot, c_upstream) = (inner_active.clone(), slot.clone(), inner_upstream.clone());
          f(value).subscribe(
            Subscriber::from_fn(
              &slot,
              move |value| on_next.accept(value),
              move |error| {
                on_error.error(error);
                c_upstream.dispose();
              },
              move || {
                c_slot.dispose();
                if active.fetch_sub(1, Ordering::AcqRel) == 1 {
                  on_complete.complete();
                }
              },
            ),
            slot,
          );
        },
        move |error| on_error.error(error),
        move || {
          if active.fetch_sub(1, Ordering::AcqRel) == 1 {
            on_complete.complete();
          }
        },
      )
    })
  }

  /// Maps every value to an iterable and emits its items in order.
  pub fn flat_iter<R, I, F>(&self, f: F) -> Signal<R>
  where
    R: Send + 'static,
    I: IntoIterator<Item = R>,
    F: Fn(V) -> I + Send + Sync + 'static,
  {
    let f = Arc::new(f);
    self.lift(move |observer: Subscriber<R>, upstream| {
      let f = f.clone();
      observer.relay(upstream, move |observer: &Subscriber<R>, value: V| {
        for item in f(value) {
          if observer.is_stopped() {
            break;
          }
          observer.accept(item);
        }
      })
    })
  }

  /// Maps every value to a signal and follows only the latest one; the
  /// previous inner subscription is released on each new value.
  ///
  /// Completes once the source and the current inner signal have completed.
  pub fn switch_map<R, F>(&self, f: F) -> Signal<R>
  where
    R: Send + 'static,
    F: Fn(V) -> Signal<R> + Send + Sync + 'static,
  {
    let f = Arc::new(f);
    self.lift(move |observer: Subscriber<R>, upstream| {
      let switch = Arc::new(Switch {
        observer,
        upstream: upstream.clone(),
        state: Mutex::new(SwitchState::default()),
      });
      let (f, on_next, on_error, on_complete) =
        (f.clone(), switch.clone(), switch.observer.clone(), switch.clone());
      Subscriber::from_fn(
        upstream,
        move |value: V| on_next.follow(f(value)),
        move |error| on_error.error(error),
        move || on_complete.outer_complete(),
      )
    })
  }

  /// Maps every value to a signal and subscribes to them one at a time, in
  /// arrival order. Values arriving while an inner signal runs are queued.
  pub fn concat_map<R, F>(&self, f: F) -> Signal<R>
  where
    R: Send + 'static,
    F: Fn(V) -> Signal<R> + Send + Sync + 'static,
  {
    let f: Arc<dyn Fn(V) -> Signal<R> + Send + Sync> = Arc::new(f);
    self.lift(move |observer: Subscriber<R>, upstream| {
      let queue = Arc::new(ConcatMap {
        f: f.clone(),
        observer,
        upstream: upstream.clone(),
        state: Mutex::new(ConcatState { pending: VecDeque::new(), running: false, outer_done: false }),
        serial: Serial::default(),
      });
      let (on_next, on_error, on_complete) = (queue.clone(), queue.observer.clone(), queue.clone());
      Subscriber::from_fn(
        upstream,
        move |value: V| on_next.push(value),
        move |error: Error| on_error.error(error),
        move || on_complete.outer_complete(),
      )
    })
  }
}

// ==================== switch_map ====================

#[derive(Default)]
struct SwitchState {
  generation: u64,
  current: Option<Disposable>,
  inner_running: bool,
  outer_done: bool,
}

struct Switch<R> {
  observer: Subscriber<R>,
  upstream: Disposable,
  state: Mutex<SwitchState>,
}

impl<R: Send + 'static> Switch<R> {
  fn follow(self: &Arc<Self>, inner: Signal<R>) {
    let slot = self.upstream.sub();
    let (generation, previous) = {
      let mut state = self.state.lock();
      state.generation += 1;
      state.inner_running = true;
      (state.generation, state.current.replace(slot.clone()))
    };
    if let Some(previous) = previous {
      previous.dispose();
    }

    let (on_next, on_error, this) = (self.observer.clone(), self.observer.clone(), self.clone());
    let upstream = self.upstream.clone();
    inner.subscribe(
      Subscriber::from_fn(
        &slot,
        move |value| on_next.accept(value),
        move |error| {
          on_error.error(error);
          upstream.dispose();
        },
        move || this.inner_complete(generation),
      ),
      slot,
    );
  }

  fn inner_complete(&self, generation: u64) {
    let done = {
      let mut state = self.state.lock();
      if state.generation != generation {
        return;
      }
      state.inner_running = false;
      state.outer_done
    };
    if done {
      self.observer.complete();
    }
  }

  fn outer_complete(&self) {
    let done = {
      let mut state = self.state.lock();
      state.outer_done = true;
      !state.inner_running
    };
    if done {
      self.observer.complete();
    }
  }
}

// ==================== concat_map ====================

struct ConcatState<V> {
  pending: VecDeque<V>,
  running: bool,
  outer_done: bool,
}

struct ConcatMap<V, R> {
  f: Arc<dyn Fn(V) -> Signal<R> + Send + Sync>,
  observer: Subscriber<R>,
  upstream: Disposable,
  state: Mutex<ConcatState<V>>,
  // Inner signals completing synchronously start the next one from here.
  serial: Serial,
}

impl<V: Send + 'static, R: Send + 'static> ConcatMap<V, R> {
  fn push(self: &Arc<Self>, value: V) {
    {
      let mut state = self.state.lock();
      if state.running {
        state.pending.push_back(value);
        return;
      }
      state.running = true;
    }
    self.run(value);
  }

  fn run(self: &Arc<Self>, value: V) {
    let slot = self.upstream.sub();
    let (on_next, on_error, this, c_slot) =
      (self.observer.clone(), self.observer.clone(), self.clone(), slot.clone());
    let upstream = self.upstream.clone();
    (self.f)(value).subscribe(
      Subscriber::from_fn(
        &slot,
        move |value| on_next.accept(value),
        move |error| {
          on_error.error(error);
          upstream.dispose();
        },
        move || {
          c_slot.dispose();
          let next = this.clone();
          this.serial.run(move || next.next());
        },
      ),
      slot,
    );
  }

  /// Starts the next queued inner signal, or completes if nothing is left.
  fn next(self: &Arc<Self>) {
    let (next, done) = {
      let mut state = self.state.lock();
      let next = state.pending.pop_front();
      state.running = next.is_some();
      (next, state.outer_done)
    };
    match next {
      Some(value) => self.run(value),
      None if done => self.observer.complete(),
      None => {}
    }
  }

  fn outer_complete(&self) {
    let done = {
      let mut state = self.state.lock();
      state.outer_done = true;
      !state.running
    };
    if done {
      self.observer.complete();
    }
  }
}
