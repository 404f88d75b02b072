//! Integration tests for rxsignal
//!
//! Tests operator chains end to end, across virtual and real time.

use std::{
  sync::{
    atomic::{AtomicUsize, Ordering},
    mpsc, Arc,
  },
  time::Duration,
};

use parking_lot::Mutex;
use rxsignal::prelude::*;

fn init_tracing() {
  let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

type Log = Arc<Mutex<Vec<String>>>;

fn record<V: std::fmt::Debug + Send + 'static>(signal: &Signal<V>) -> (Log, Disposable) {
  let log: Log = Arc::new(Mutex::new(vec![]));
  let (n, e, c) = (log.clone(), log.clone(), log.clone());
  let subscription = signal.to_observer(
    Handlers::new()
      .on_next(move |v: V| n.lock().push(format!("{v:?}")))
      .on_error(move |err| e.lock().push(format!("error {err}")))
      .on_complete(move || c.lock().push("complete".into())),
  );
  (log, subscription)
}

fn strings(expected: &[&str]) -> Vec<String> { expected.iter().map(|s| s.to_string()).collect() }

#[test]
fn test_basic_chain_integration() {
  let result = Signal::iterate(1..=10).map(|x| x * 2).filter(|x| *x > 10).take(3).to_list();
  assert_eq!(result, vec![12, 14, 16]);
}

#[test]
fn test_complex_chain_with_multiple_operators() {
  // running sums of even squares: 4, 20, 56, 120, ..
  let result = Signal::iterate(1..=20)
    .filter(|x| x % 2 == 0)
    .map(|x| x * x)
    .scan(0, |acc, v| acc + v)
    .take_while(|x| *x < 100)
    .skip(2)
    .to_list();
  assert_eq!(result, vec![56]);
}

#[test]
fn test_dispose_stops_notifications() {
  let source = Subject::new();
  let (log, subscription) = record(&source.signal().map(|v: i32| v + 1));

  source.accept(1);
  subscription.dispose();
  source.accept(2);
  source.complete();

  assert_eq!(*log.lock(), strings(&["2"]));
}

#[test]
fn test_take_on_infinite_source() {
  let (log, _) = record(&Signal::iterate(0u64..).take(3));
  assert_eq!(*log.lock(), strings(&["0", "1", "2", "complete"]));
}

#[test]
fn test_debounce_burst() {
  let scheduler = TestScheduler::new();
  let source = Subject::new();
  let emitted = Arc::new(Mutex::new(vec![]));
  let (c_emitted, clock) = (emitted.clone(), scheduler.clone());
  source
    .signal()
    .debounce_on(Duration::from_millis(100), scheduler.clone())
    .to(move |v: u64| c_emitted.lock().push((v, clock.elapsed())));

  for at in [0, 30, 60, 200] {
    scheduler.advance_to(Duration::from_millis(at));
    source.accept(at);
  }
  scheduler.advance_to(Duration::from_millis(1000));

  assert_eq!(*emitted.lock(), vec![
    (60, Duration::from_millis(160)),
    (200, Duration::from_millis(300))
  ]);
}

#[test]
fn test_retry_recovers_a_flaky_source() {
  init_tracing();
  let subscriptions = Arc::new(AtomicUsize::new(0));
  let counter = subscriptions.clone();
  let flaky = Signal::defer(move || {
    if counter.fetch_add(1, Ordering::SeqCst) < 2 {
      Signal::error("connection reset")
    } else {
      Signal::of(["ok", "done"])
    }
  });

  let (log, _) = record(&flaky.retry_when(|errors| errors));

  assert_eq!(*log.lock(), strings(&["\"ok\"", "\"done\"", "complete"]));
  assert_eq!(subscriptions.load(Ordering::SeqCst), 3);
}

#[test]
fn test_merge_and_combine_latest() {
  let (a, b) = (Subject::new(), Subject::new());
  let (merged, _) = record(&a.signal().merge(b.signal()));
  let (latest, _) = record(&a.signal().combine_latest(b.signal()));

  a.accept(1);
  b.accept(10);
  a.accept(2);
  a.complete();
  b.accept(20);
  b.complete();

  assert_eq!(*merged.lock(), strings(&["1", "10", "2", "20", "complete"]));
  assert_eq!(*latest.lock(), strings(&["(1, 10)", "(2, 10)", "(2, 20)", "complete"]));
}

#[test]
fn test_buffer_discards_partial_tail() {
  let buffers = Signal::of(1..=7).buffer(3).to_list();
  assert_eq!(buffers, vec![vec![1, 2, 3], vec![4, 5, 6]]);
}

#[test]
fn test_uncaught_error_reaches_the_hook() {
  init_tracing();
  let reported = Arc::new(Mutex::new(vec![]));
  let c_reported = reported.clone();
  assert!(set_uncaught_hook(move |error| c_reported.lock().push(error.to_string())));

  Signal::<i32>::error("nobody listens").to(|_| {});

  assert_eq!(*reported.lock(), strings(&["nobody listens"]));
}

#[test]
fn test_share_multicasts_one_subscription() {
  let scheduler = TestScheduler::new();
  let ticks = Signal::interval_on(Duration::ZERO, Duration::from_millis(10), scheduler.clone())
    .take(3)
    .share();
  let (first, _) = record(&ticks);
  let (second, _) = record(&ticks);

  scheduler.advance_by(Duration::from_millis(50));

  assert_eq!(*first.lock(), strings(&["0", "1", "2", "complete"]));
  assert_eq!(*second.lock(), strings(&["0", "1", "2", "complete"]));
  assert_eq!(scheduler.pending(), 0);
}

#[test]
fn test_signal_on_real_scheduler() {
  init_tracing();
  let scheduler = Scheduler::new(1).unwrap();
  let (tx, rx) = mpsc::channel();
  let tx = Mutex::new(tx);
  Signal::of([1, 2, 3])
    .delay_on(Duration::from_millis(20), scheduler.clone())
    .to(move |v: i32| tx.lock().send(v).unwrap());

  let received: Vec<i32> = rx.iter().take(3).collect();
  assert_eq!(received, vec![1, 2, 3]);
  scheduler.shutdown();
  assert!(scheduler.await_termination(Duration::from_secs(5)));
}

#[test]
fn test_cron_task_handle() {
  let scheduler = Scheduler::new(1).unwrap();
  let task = scheduler.schedule_at(|| {}, "0 0 0 1 1 ?").unwrap();
  assert!(!task.is_done());
  assert!(task.cancel(false));
  assert!(task.is_cancelled());
  assert!(scheduler.schedule_at(|| {}, "61 * * * * *").is_err());
  scheduler.shutdown_now();
}

#[test]
fn test_to_stream_bridges_into_futures() {
  use futures::{executor::block_on, StreamExt};

  let stream = Signal::of([1, 2, 3]).map(|v| v * 10).to_stream();
  let values: Vec<Result<i32, Error>> = block_on(stream.collect());
  assert_eq!(values, vec![Ok(10), Ok(20), Ok(30)]);

  let failing = Signal::of([1]).concat(Signal::error("closed")).to_stream();
  let values: Vec<Result<i32, Error>> = block_on(failing.collect());
  assert_eq!(values, vec![Ok(1), Err(Error::msg("closed"))]);
}
