use std::sync::Arc;

use parking_lot::Mutex;

use crate::{disposable::Disposable, signal::Signal, subject::Subject, subscriber::Subscriber};

struct Connection<V> {
  subject: Option<Subject<V>>,
  upstream: Option<Disposable>,
  generation: u64,
  subscribers: usize,
}

impl<V: Clone + Send + 'static> Signal<V> {
  /// Multicasts one upstream subscription to every subscriber.
  ///
  /// The first subscriber connects to the source; later ones join the
  /// running stream and only see what it emits from then on. The upstream is
  /// released when the last subscriber leaves, and the next subscriber
  /// connects afresh.
  pub fn share(&self) -> Self {
    let source = self.clone();
    let connection = Arc::new(Mutex::new(Connection {
      subject: None,
      upstream: None,
      generation: 0,
      subscribers: 0,
    }));
    Signal::new(move |observer: Subscriber<V>, disposer: Disposable| {
      let (subject, generation, connect) = {
        let mut connection = connection.lock();
        connection.subscribers += 1;
        match &connection.subject {
          Some(subject) => (subject.clone(), connection.generation, false),
          None => {
            let subject = Subject::new();
            connection.generation += 1;
            connection.subject = Some(subject.clone());
            (subject, connection.generation, true)
          }
        }
      };

      subject.signal().subscribe(observer, disposer.clone());
      let leave = connection.clone();
      disposer.add(move || {
        let upstream = {
          let mut connection = leave.lock();
          connection.subscribers -= 1;
          if connection.subscribers == 0 {
            connection.subject = None;
            connection.upstream.take()
          } else {
            None
          }
        };
        if let Some(upstream) = upstream {
          tracing::trace!("last subscriber left, releasing shared upstream");
          upstream.dispose();
        }
      });

      if connect {
        let upstream = source.to_observer(subject);
        let mut connection = connection.lock();
        if connection.generation == generation && connection.subject.is_some() {
          connection.upstream = Some(upstream);
        } else {
          drop(connection);
          upstream.dispose();
        }
      }
      disposer
    })
  }
}
