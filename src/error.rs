//! Errors carried by the notification channel.
//!
//! Every signal reports failure through a single [`Error`] type. It is cheap
//! to clone because one failure may fan out to several observers (a shared
//! signal, a retry flow, a merge).
//!
//! Operators that run user code come in two flavours: the plain one receives
//! an infallible closure, the `try_*` one receives a closure returning
//! `Result` and turns an `Err` into an `error` notification.
//!
//! An error that reaches a terminal subscriber without an error handler is a
//! reportable fault: it is logged and handed to the process-wide hook set by
//! [`set_uncaught_hook`].

use std::{fmt, sync::Arc, time::Duration};

use once_cell::sync::OnceCell;

use crate::{cron::CronError, scheduler::SchedulerError};

#[derive(Clone, thiserror::Error)]
pub enum Error {
  /// No notification arrived within the allowed window.
  #[error("no notification within {0:?}")]
  Timeout(Duration),
  #[error("{0}")]
  Message(Arc<str>),
  #[error(transparent)]
  Source(Arc<dyn std::error::Error + Send + Sync>),
}

impl Error {
  /// Wraps any error value.
  pub fn new<E>(error: E) -> Self
  where
    E: std::error::Error + Send + Sync + 'static,
  {
    Error::Source(Arc::new(error))
  }

  pub fn msg(message: impl Into<String>) -> Self { Error::Message(Arc::from(message.into())) }

  #[inline]
  pub fn is_timeout(&self) -> bool { matches!(self, Error::Timeout(_)) }

  /// Returns the wrapped error if it has type `E`.
  pub fn downcast_ref<E: std::error::Error + 'static>(&self) -> Option<&E> {
    match self {
      Error::Source(source) => source.downcast_ref::<E>(),
      _ => None,
    }
  }
}

impl fmt::Debug for Error {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Error::Timeout(time) => f.debug_tuple("Timeout").field(time).finish(),
      Error::Message(message) => f.debug_tuple("Message").field(message).finish(),
      Error::Source(source) => f.debug_tuple("Source").field(source).finish(),
    }
  }
}

impl PartialEq for Error {
  fn eq(&self, other: &Self) -> bool {
    match (self, other) {
      (Error::Timeout(a), Error::Timeout(b)) => a == b,
      (Error::Message(a), Error::Message(b)) => a == b,
      (Error::Source(a), Error::Source(b)) => Arc::ptr_eq(a, b),
      _ => false,
    }
  }
}

impl From<&str> for Error {
  fn from(message: &str) -> Self { Error::msg(message) }
}

impl From<String> for Error {
  fn from(message: String) -> Self { Error::msg(message) }
}

impl From<CronError> for Error {
  fn from(error: CronError) -> Self { Error::new(error) }
}

impl From<SchedulerError> for Error {
  fn from(error: SchedulerError) -> Self { Error::new(error) }
}

type Hook = Box<dyn Fn(&Error) + Send + Sync>;

static UNCAUGHT: OnceCell<Hook> = OnceCell::new();

/// Installs the process-wide handler for errors nobody subscribed to.
///
/// The hook can be installed once; returns `false` if one is already present.
pub fn set_uncaught_hook<F>(hook: F) -> bool
where
  F: Fn(&Error) + Send + Sync + 'static,
{
  UNCAUGHT.set(Box::new(hook)).is_ok()
}

pub(crate) fn report_uncaught(error: &Error) {
  tracing::error!(%error, "signal error without a handler");
  if let Some(hook) = UNCAUGHT.get() {
    hook(error);
  }
}
