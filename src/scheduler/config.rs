use tokio::sync::Semaphore;

/// Settings for a [`Scheduler`](super::Scheduler).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerConfig {
  /// Name of the dispatcher thread, also used as the worker name prefix.
  pub name: String,
  /// Upper bound on task bodies running at the same time.
  pub max_concurrency: usize,
  /// Worker threads; `None` lets the pool pick one per CPU.
  pub pool_size: Option<usize>,
}

impl Default for SchedulerConfig {
  fn default() -> Self {
    SchedulerConfig {
      name: "rxsignal-scheduler".to_string(),
      max_concurrency: Semaphore::MAX_PERMITS,
      pool_size: None,
    }
  }
}

impl SchedulerConfig {
  pub fn with_name(mut self, name: impl Into<String>) -> Self {
    self.name = name.into();
    self
  }

  pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
    self.max_concurrency = max_concurrency;
    self
  }

  pub fn with_pool_size(mut self, pool_size: usize) -> Self {
    self.pool_size = Some(pool_size);
    self
  }

  /// The permit count actually handed to the admission gate.
  pub(crate) fn permits(&self) -> usize { self.max_concurrency.clamp(1, Semaphore::MAX_PERMITS) }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn builder_overrides_defaults() {
    let config = SchedulerConfig::default()
      .with_name("jobs")
      .with_max_concurrency(0)
      .with_pool_size(2);
    assert_eq!(config.name, "jobs");
    assert_eq!(config.permits(), 1);
    assert_eq!(config.pool_size, Some(2));
  }

  #[test]
  fn default_is_unbounded() {
    assert_eq!(SchedulerConfig::default().permits(), Semaphore::MAX_PERMITS);
  }
}
