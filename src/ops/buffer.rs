use std::{collections::VecDeque, mem, sync::Arc, time::Duration};

use parking_lot::Mutex;

use crate::{
  ops::Serial,
  scheduler::{global_timer, run_once, SharedTimer, Timer},
  signal::Signal,
  subscriber::Subscriber,
};

struct Sliding<V> {
  window: VecDeque<V>,
  skip: usize,
}

impl<V: Send + 'static> Signal<V> {
  /// Emits consecutive buffers of `size` values. A trailing buffer that is
  /// not full when the source completes is discarded.
  pub fn buffer(&self, size: usize) -> Signal<Vec<V>>
  where
    V: Clone,
  {
    self.buffer_sliding(size, size)
  }

  /// Emits buffers of `size` values, starting a new one every `interval`
  /// values. Windows overlap when `interval < size` and leave gaps when
  /// `interval > size`. Both are at least 1.
  pub fn buffer_sliding(&self, size: usize, interval: usize) -> Signal<Vec<V>>
  where
    V: Clone,
  {
    let (size, interval) = (size.max(1), interval.max(1));
    self.lift(move |observer: Subscriber<Vec<V>>, upstream| {
      let state = Mutex::new(Sliding { window: VecDeque::with_capacity(size), skip: 0 });
      observer.relay(upstream, move |observer: &Subscriber<Vec<V>>, value: V| {
        let full = {
          let mut state = state.lock();
          if state.skip > 0 {
            state.skip -= 1;
            return;
          }
          state.window.push_back(value);
          if state.window.len() < size {
            return;
          }
          let full: Vec<V> = state.window.iter().cloned().collect();
          if interval >= size {
            state.window.clear();
            state.skip = interval - size;
          } else {
            state.window.drain(..interval);
          }
          full
        };
        observer.accept(full);
      })
    })
  }

  /// Collects values into time windows. A window opens with its first value
  /// and is emitted `duration` later. A pending window is discarded when the
  /// source completes.
  pub fn buffer_time(&self, duration: Duration) -> Signal<Vec<V>> {
    self.buffer_time_shared(duration, global_timer())
  }

  pub fn buffer_time_on<T: Timer>(&self, duration: Duration, timer: T) -> Signal<Vec<V>> {
    self.buffer_time_shared(duration, Arc::new(timer))
  }

  fn buffer_time_shared(&self, duration: Duration, timer: SharedTimer) -> Signal<Vec<V>> {
    self.lift(move |observer: Subscriber<Vec<V>>, upstream| {
      let window: Arc<Mutex<Vec<V>>> = Arc::new(Mutex::new(vec![]));
      let serial = Arc::new(Serial::default());
      let (timer, upstream_token) = (timer.clone(), upstream.clone());
      observer.relay(upstream, move |observer: &Subscriber<Vec<V>>, value: V| {
        let opened = {
          let mut window = window.lock();
          window.push(value);
          window.len() == 1
        };
        if opened {
          let (window, observer, serial) = (window.clone(), observer.clone(), serial.clone());
          run_once(&timer, duration, &upstream_token, move || {
            serial.run(move || {
              let values = mem::take(&mut *window.lock());
              if !values.is_empty() {
                observer.accept(values);
              }
            })
          });
        }
      })
    })
  }

  /// Emits the values collected so far, possibly none, every time `trigger`
  /// emits, and starts over. Completes when either side completes; values
  /// collected since the last trigger are then discarded.
  pub fn buffer_signal<T: Send + 'static>(&self, trigger: Signal<T>) -> Signal<Vec<V>> {
    self.buffer_signal_impl(trigger, false)
  }

  /// Like [`buffer_signal`](Self::buffer_signal), but a non-empty trailing
  /// buffer is emitted when the source completes.
  pub fn buffer_signal_flushing<T: Send + 'static>(&self, trigger: Signal<T>) -> Signal<Vec<V>> {
    self.buffer_signal_impl(trigger, true)
  }

  fn buffer_signal_impl<T: Send + 'static>(&self, trigger: Signal<T>, flush: bool) -> Signal<Vec<V>> {
    self.lift(move |observer: Subscriber<Vec<V>>, upstream| {
      let buffer: Arc<Mutex<Vec<V>>> = Arc::new(Mutex::new(vec![]));
      let control = upstream.sub();

      let (on_trigger, on_trigger_error, on_trigger_complete) =
        (observer.clone(), observer.clone(), observer.clone());
      let (c_buffer, c_upstream) = (buffer.clone(), upstream.clone());
      trigger.subscribe(
        Subscriber::from_fn(
          &control,
          move |_: T| {
            let values = mem::take(&mut *c_buffer.lock());
            on_trigger.accept(values);
          },
          move |error| on_trigger_error.error(error),
          move || {
            on_trigger_complete.complete();
            c_upstream.dispose();
          },
        ),
        control.clone(),
      );

      let (on_next, on_error, on_complete) = (buffer.clone(), observer.clone(), observer);
      Subscriber::from_fn(
        upstream,
        move |value| on_next.lock().push(value),
        move |error| on_error.error(error),
        move || {
          let values = mem::take(&mut *buffer.lock());
          if flush && !values.is_empty() {
            on_complete.accept(values);
          }
          on_complete.complete();
        },
      )
    })
  }
}

#[cfg(test)]
mod tests {
  use std::{
    sync::{
      atomic::{AtomicUsize, Ordering},
      mpsc, Arc,
    },
    thread,
    time::Duration,
  };

  use parking_lot::Mutex;

  use crate::{
    observer::Handlers,
    ops::test_util::{events, record, strings},
    scheduler::{Scheduler, SchedulerConfig, TestScheduler},
    signal::Signal,
    subject::Subject,
  };

  #[test]
  fn buffer_discards_trailing_partial() {
    let signal = Signal::of(1..=7).buffer(3);
    assert_eq!(events(&signal), strings(&["[1, 2, 3]", "[4, 5, 6]", "complete"]));
  }

  #[test]
  fn sliding_windows() {
    assert_eq!(Signal::of(1..=5).buffer_sliding(3, 1).to_list(), vec![
      vec![1, 2, 3],
      vec![2, 3, 4],
      vec![3, 4, 5]
    ]);
    assert_eq!(Signal::of(1..=7).buffer_sliding(2, 3).to_list(), vec![vec![1, 2], vec![4, 5]]);
    assert_eq!(Signal::of(1..=3).buffer_sliding(0, 0).to_list(), vec![vec![1], vec![2], vec![3]]);
  }

  #[test]
  fn time_windows() {
    let scheduler = TestScheduler::new();
    let source = Subject::new();
    let (log, _) = record(&source.signal().buffer_time_on(Duration::from_millis(50), scheduler.clone()));

    source.accept(1);
    scheduler.advance_by(Duration::from_millis(20));
    source.accept(2);
    scheduler.advance_by(Duration::from_millis(30));
    assert_eq!(*log.lock(), strings(&["[1, 2]"]));

    scheduler.advance_by(Duration::from_millis(100));
    source.accept(3);
    source.complete();
    scheduler.advance_by(Duration::from_millis(100));
    assert_eq!(*log.lock(), strings(&["[1, 2]", "complete"]));
  }

  #[test]
  fn time_windows_on_a_worker_pool() {
    let scheduler =
      Scheduler::with_config(SchedulerConfig::default().with_name("buffer-pool").with_pool_size(4)).unwrap();
    let signal = Signal::interval_on(Duration::ZERO, Duration::from_millis(1), scheduler.clone())
      .buffer_time_on(Duration::from_millis(5), scheduler.clone())
      .take(5);

    let buffers = Arc::new(Mutex::new(vec![]));
    let active = Arc::new(AtomicUsize::new(0));
    let overlaps = Arc::new(AtomicUsize::new(0));
    let (tx, rx) = mpsc::channel();
    let tx = Mutex::new(tx);
    let (c_buffers, c_active, c_overlaps) = (buffers.clone(), active.clone(), overlaps.clone());
    let _subscription = signal.to_observer(
      Handlers::new()
        .on_next(move |buffer: Vec<u64>| {
          if c_active.fetch_add(1, Ordering::SeqCst) > 0 {
            c_overlaps.fetch_add(1, Ordering::SeqCst);
          }
          thread::sleep(Duration::from_millis(2));
          c_buffers.lock().push(buffer);
          c_active.fetch_sub(1, Ordering::SeqCst);
        })
        .on_complete(move || {
          let _ = tx.lock().send(());
        }),
    );

    rx.recv_timeout(Duration::from_secs(10)).unwrap();
    let buffers = buffers.lock().clone();
    assert_eq!(buffers.len(), 5);
    assert!(buffers.iter().all(|buffer| !buffer.is_empty()));
    let flat: Vec<u64> = buffers.into_iter().flatten().collect();
    assert_eq!(flat, (0..flat.len() as u64).collect::<Vec<_>>());
    assert_eq!(overlaps.load(Ordering::SeqCst), 0);
    scheduler.shutdown();
  }

  #[test]
  fn trigger_flushes_and_restarts() {
    let (source, trigger) = (Subject::new(), Subject::new());
    let (log, _) = record(&source.signal().buffer_signal(trigger.signal()));

    source.accept(1);
    source.accept(2);
    trigger.accept(());
    trigger.accept(());
    source.accept(3);
    source.complete();

    assert_eq!(*log.lock(), strings(&["[1, 2]", "[]", "complete"]));
    assert_eq!(trigger.observer_count(), 0);
  }

  #[test]
  fn trigger_completion_ends_the_output() {
    let (source, trigger) = (Subject::<i32>::new(), Subject::<()>::new());
    let (log, _) = record(&source.signal().buffer_signal(trigger.signal()));

    source.accept(1);
    trigger.complete();

    assert_eq!(*log.lock(), strings(&["complete"]));
    assert_eq!(source.observer_count(), 0);
  }

  #[test]
  fn flushing_variant_emits_trailing_buffer() {
    let (source, trigger) = (Subject::new(), Subject::<()>::new());
    let (log, _) = record(&source.signal().buffer_signal_flushing(trigger.signal()));

    source.accept(1);
    trigger.accept(());
    source.accept(2);
    source.complete();

    assert_eq!(*log.lock(), strings(&["[1]", "[2]", "complete"]));
  }
}
