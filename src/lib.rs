//! # rxsignal: cold reactive signals with a time-ordered scheduler
//!
//! A [`Signal`] describes a sequence of values pushed to an observer,
//! finished by at most one `error` or `complete`. Nothing runs until a
//! terminal such as [`Signal::to`] subscribes; every subscription replays the
//! source from the start unless the signal is [shared](Signal::share).
//!
//! ## Quick Start
//!
//! ```rust
//! use rxsignal::prelude::*;
//!
//! let evens = Signal::iterate(1..)
//!   .filter(|v| v % 2 == 0)
//!   .map(|v| v * 10)
//!   .take(3)
//!   .to_list();
//! assert_eq!(evens, vec![20, 40, 60]);
//! ```
//!
//! ## Key Concepts
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Signal`] | Cold sequence built from a subscription function |
//! | [`Observer`] | Consumes `accept`, `error` and `complete` |
//! | [`Subscriber`] | Observer handle with a stopped guard, used by operators |
//! | [`Disposable`] | Cancellation token releasing a subscription |
//! | [`Subject`] | Hot multicast hub |
//! | [`Scheduler`] | Delayed, periodic and cron tasks under a concurrency cap |
//! | [`Cron`] | Six-field cron expression evaluator |
//!
//! Time-based operators (`delay`, `debounce`, `timeout`, ..) run on the
//! global [`Scheduler`]; their `_on` variants accept any [`Timer`], such as
//! the virtual-time [`TestScheduler`].
//!
//! Errors travel as [`Error`] notifications. An error reaching a subscriber
//! without an error handler is logged through `tracing` and handed to the
//! hook installed with [`set_uncaught_hook`].
//!
//! [`Signal`]: signal::Signal
//! [`Signal::to`]: signal::Signal::to
//! [`Observer`]: observer::Observer
//! [`Subscriber`]: subscriber::Subscriber
//! [`Disposable`]: disposable::Disposable
//! [`Subject`]: subject::Subject
//! [`Scheduler`]: scheduler::Scheduler
//! [`Timer`]: scheduler::Timer
//! [`TestScheduler`]: scheduler::TestScheduler
//! [`Cron`]: cron::Cron
//! [`Error`]: error::Error
//! [`set_uncaught_hook`]: error::set_uncaught_hook

pub mod cron;
pub mod disposable;
pub mod error;
pub mod factory;
pub mod observer;
pub mod ops;
pub mod prelude;
pub mod scheduler;
pub mod signal;
pub mod subject;
pub mod subscriber;
pub mod variable;

// Re-export the prelude module
pub use prelude::*;
