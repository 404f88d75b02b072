//! Prelude module for convenient imports
//!
//! This module re-exports commonly used types and traits for easy access.

// Core types
pub use crate::{
  disposable::Disposable,
  error::{set_uncaught_hook, Error},
  observer::{Handlers, Observer},
  signal::{Signal, SignalStream},
  subject::Subject,
  subscriber::Subscriber,
  variable::Variable,
};
// Operators
pub use crate::ops::Job;
// Scheduling
pub use crate::{
  cron::{Cron, CronError},
  scheduler::{
    global_timer, is_interrupted, ScheduledTask, Scheduler, SchedulerConfig, SchedulerError,
    SharedTimer, TestScheduler, Timer,
  },
};
