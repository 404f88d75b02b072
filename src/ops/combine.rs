use std::{collections::VecDeque, sync::Arc};

use parking_lot::Mutex;

use crate::{disposable::Disposable, signal::Signal, subscriber::Subscriber};

// ==================== combine ====================

struct Pairing<A, B> {
  left: VecDeque<A>,
  right: VecDeque<B>,
  left_done: bool,
  right_done: bool,
}

impl<A, B> Pairing<A, B> {
  /// No further pair can be formed: a completed side has nothing buffered.
  fn exhausted(&self) -> bool {
    (self.left_done && self.left.is_empty()) || (self.right_done && self.right.is_empty())
  }
}

// ==================== combine_latest ====================

struct Latest<A, B> {
  left: Option<A>,
  right: Option<B>,
  completed: u8,
}

impl<V: Send + 'static> Signal<V> {
  /// Pairs the values of `self` and `other` by position.
  pub fn combine<O: Send + 'static>(&self, other: Signal<O>) -> Signal<(V, O)> {
    self.combine_with(other, |v, o| (v, o))
  }

  /// Pairs the values of `self` and `other` by position and maps each pair
  /// with `f`.
  ///
  /// The side that is ahead buffers its values. The result completes as soon
  /// as no further pair can be formed, that is when a completed side has no
  /// buffered value left.
  pub fn combine_with<O, R, F>(&self, other: Signal<O>, f: F) -> Signal<R>
  where
    O: Send + 'static,
    R: Send + 'static,
    F: Fn(V, O) -> R + Send + Sync + 'static,
  {
    let source = self.clone();
    let f = Arc::new(f);
    Signal::new(move |observer: Subscriber<R>, disposer: Disposable| {
      let state = Arc::new(Mutex::new(Pairing {
        left: VecDeque::new(),
        right: VecDeque::new(),
        left_done: false,
        right_done: false,
      }));
      let group = disposer.sub();

      let (left_state, left_f, left_observer) = (state.clone(), f.clone(), observer.clone());
      let left_done = (state.clone(), observer.clone());
      let left = Subscriber::from_fn(
        &group,
        move |value: V| {
          let paired = {
            let mut state = left_state.lock();
            match state.right.pop_front() {
              Some(other) => Some((value, other)),
              None => {
                state.left.push_back(value);
                None
              }
            }
          };
          if let Some((value, other)) = paired {
            left_observer.accept(left_f(value, other));
            if left_state.lock().exhausted() {
              left_observer.complete();
            }
          }
        },
        error_to(&observer, &group),
        move || {
          let exhausted = {
            let mut state = left_done.0.lock();
            state.left_done = true;
            state.exhausted()
          };
          if exhausted {
            left_done.1.complete();
          }
        },
      );

      let (right_state, right_f, right_observer) = (state.clone(), f.clone(), observer.clone());
      let right_done = (state, observer.clone());
      let right = Subscriber::from_fn(
        &group,
        move |other: O| {
          let paired = {
            let mut state = right_state.lock();
            match state.left.pop_front() {
              Some(value) => Some((value, other)),
              None => {
                state.right.push_back(other);
                None
              }
            }
          };
          if let Some((value, other)) = paired {
            right_observer.accept(right_f(value, other));
            if right_state.lock().exhausted() {
              right_observer.complete();
            }
          }
        },
        error_to(&observer, &group),
        move || {
          let exhausted = {
            let mut state = right_done.0.lock();
            state.right_done = true;
            state.exhausted()
          };
          if exhausted {
            right_done.1.complete();
          }
        },
      );

      source.subscribe(left, group.sub());
      other.subscribe(right, group.sub());
      disposer
    })
  }

  /// Pairs the values of three signals by position.
  pub fn combine3<A, B>(&self, a: Signal<A>, b: Signal<B>) -> Signal<(V, A, B)>
  where
    A: Send + 'static,
    B: Send + 'static,
  {
    self.combine(a).combine_with(b, |(v, a), b| (v, a, b))
  }

  /// Emits the latest value of each side whenever either side emits, once
  /// both have emitted. Completes when both sides have completed.
  pub fn combine_latest<O>(&self, other: Signal<O>) -> Signal<(V, O)>
  where
    V: Clone,
    O: Clone + Send + 'static,
  {
    self.combine_latest_with(other, |v, o| (v, o))
  }

  pub fn combine_latest_with<O, R, F>(&self, other: Signal<O>, f: F) -> Signal<R>
  where
    V: Clone,
    O: Clone + Send + 'static,
    R: Send + 'static,
    F: Fn(V, O) -> R + Send + Sync + 'static,
  {
    let source = self.clone();
    let f = Arc::new(f);
    Signal::new(move |observer: Subscriber<R>, disposer: Disposable| {
      let state = Arc::new(Mutex::new(Latest { left: None, right: None, completed: 0 }));
      let group = disposer.sub();

      let (left_state, left_f, left_observer) = (state.clone(), f.clone(), observer.clone());
      let left = Subscriber::from_fn(
        &group,
        move |value: V| {
          let snapshot = {
            let mut state = left_state.lock();
            state.left = Some(value.clone());
            state.right.clone()
          };
          if let Some(other) = snapshot {
            left_observer.accept(left_f(value, other));
          }
        },
        error_to(&observer, &group),
        complete_both(&state, &observer),
      );

      let (right_state, right_f, right_observer) = (state.clone(), f.clone(), observer.clone());
      let right = Subscriber::from_fn(
        &group,
        move |other: O| {
          let snapshot = {
            let mut state = right_state.lock();
            state.right = Some(other.clone());
            state.left.clone()
          };
          if let Some(value) = snapshot {
            right_observer.accept(right_f(value, other));
          }
        },
        error_to(&observer, &group),
        complete_both(&state, &observer),
      );

      source.subscribe(left, group.sub());
      other.subscribe(right, group.sub());
      disposer
    })
  }

  /// [`combine_latest`](Self::combine_latest) over three signals.
  pub fn combine_latest3<A, B>(&self, a: Signal<A>, b: Signal<B>) -> Signal<(V, A, B)>
  where
    V: Clone,
    A: Clone + Send + 'static,
    B: Clone + Send + 'static,
  {
    self.combine_latest(a).combine_latest_with(b, |(v, a), b| (v, a, b))
  }
}

/// Forwards an error downstream and releases both sides.
fn error_to<R: 'static>(
  observer: &Subscriber<R>,
  group: &Disposable,
) -> impl Fn(crate::error::Error) + Send + Sync + 'static {
  let (observer, group) = (observer.clone(), group.clone());
  move |error| {
    observer.error(error);
    group.dispose();
  }
}

fn complete_both<A, B, R>(
  state: &Arc<Mutex<Latest<A, B>>>,
  observer: &Subscriber<R>,
) -> impl Fn() + Send + Sync + 'static
where
  A: Send + 'static,
  B: Send + 'static,
  R: 'static,
{
  let (state, observer) = (state.clone(), observer.clone());
  move || {
    let completed = {
      let mut state = state.lock();
      state.completed += 1;
      state.completed
    };
    if completed == 2 {
      observer.complete();
    }
  }
}

#[cfg(test)]
mod tests {
  use crate::{
    ops::test_util::{events, record, strings},
    signal::Signal,
    subject::Subject,
  };

  #[test]
  fn combine_pairs_by_position() {
    let (a, b) = (Subject::new(), Subject::new());
    let (log, _) = record(&a.signal().combine(b.signal()));

    a.accept(1);
    a.accept(2);
    b.accept('x');
    b.accept('y');
    b.accept('z');
    a.accept(3);

    assert_eq!(*log.lock(), strings(&["(1, 'x')", "(2, 'y')", "(3, 'z')"]));
  }

  #[test]
  fn combine_completes_when_no_pair_is_possible() {
    let signal = Signal::of([1, 2, 3]).combine(Signal::of(['a', 'b']));
    assert_eq!(events(&signal), strings(&["(1, 'a')", "(2, 'b')", "complete"]));

    let (a, b) = (Subject::<i32>::new(), Subject::<i32>::new());
    let (log, _) = record(&a.signal().combine(b.signal()));
    a.accept(1);
    a.complete();
    assert!(log.lock().is_empty());
    b.accept(10);
    assert_eq!(*log.lock(), strings(&["(1, 10)", "complete"]));
  }

  #[test]
  fn combine3_and_combine_with() {
    let triples = Signal::of([1, 2]).combine3(Signal::of(['a', 'b']), Signal::of([true, false]));
    assert_eq!(triples.to_list(), vec![(1, 'a', true), (2, 'b', false)]);

    let sums = Signal::of([1, 2]).combine_with(Signal::of([10, 20]), |a, b| a + b);
    assert_eq!(sums.to_list(), vec![11, 22]);
  }

  #[test]
  fn combine_latest_waits_for_both_sides() {
    let (a, b) = (Subject::new(), Subject::new());
    let (log, _) = record(&a.signal().combine_latest(b.signal()));

    a.accept(1);
    a.accept(2);
    assert!(log.lock().is_empty());
    b.accept('x');
    a.accept(3);
    b.accept('y');
    a.complete();
    assert_eq!(*log.lock(), strings(&["(2, 'x')", "(3, 'x')", "(3, 'y')"]));
    b.complete();
    assert_eq!(log.lock().last().map(String::as_str), Some("complete"));
  }

  #[test]
  fn combine_latest3_snapshots() {
    let (a, b, c) = (Subject::new(), Subject::new(), Subject::new());
    let (log, _) = record(&a.signal().combine_latest3(b.signal(), c.signal()));

    a.accept(1);
    b.accept(2);
    c.accept(3);
    a.accept(4);
    assert_eq!(*log.lock(), strings(&["(1, 2, 3)", "(4, 2, 3)"]));
  }

  #[test]
  fn combine_error_releases_both_sides() {
    let (a, b) = (Subject::<i32>::new(), Subject::<i32>::new());
    let (log, _) = record(&a.signal().combine_latest(b.signal()));
    a.error("left failed".into());
    assert_eq!(*log.lock(), strings(&["error left failed"]));
    assert_eq!(b.observer_count(), 0);
  }
}
