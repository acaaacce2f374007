//! Process-wide tunables, injected into a [`crate::node::Node`] at
//! construction rather than held as a process-wide mutable singleton: tests
//! need independent configs per node.

use std::time::Duration;

/// Immutable, per-node configuration. `with_*` methods are builder-style:
/// they return a new `Config`, they never mutate shared state. A
/// non-positive value passed to a setter leaves the corresponding field
/// unchanged.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Config {
  /// Cap on entries per TEACH.
  max_teachs: u32,

  /// Seconds between LEARN broadcasts.
  learn_interval: Duration,

  /// Seconds between BEACON broadcasts.
  beacon_interval: Duration,

  /// Seconds before a silent neighbor expires.
  ttl_beacon: Duration,

  /// Seconds beyond which learned entries drop from the filter. `None`
  /// means not applied: entries of any age are eligible unless this is
  /// explicitly set.
  outdated: Option<Duration>,
}

impl Default for Config {
  fn default() -> Self {
    Self {
      max_teachs: 10,
      learn_interval: Duration::from_secs(10),
      beacon_interval: Duration::from_secs(1),
      ttl_beacon: Duration::from_secs(5),
      outdated: None,
    }
  }
}

impl Config {
  pub fn max_teachs(&self) -> u32 {
    self.max_teachs
  }

  pub fn learn_interval(&self) -> Duration {
    self.learn_interval
  }

  pub fn beacon_interval(&self) -> Duration {
    self.beacon_interval
  }

  pub fn ttl_beacon(&self) -> Duration {
    self.ttl_beacon
  }

  pub fn outdated(&self) -> Option<Duration> {
    self.outdated
  }

  #[must_use]
  pub fn with_max_teachs(mut self, value: u32) -> Self {
    if value > 0 {
      self.max_teachs = value;
    }
    self
  }

  #[must_use]
  pub fn with_learn_interval_secs(mut self, secs: i64) -> Self {
    if secs > 0 {
      self.learn_interval = Duration::from_secs(secs as u64);
    }
    self
  }

  #[must_use]
  pub fn with_beacon_interval_secs(mut self, secs: i64) -> Self {
    if secs > 0 {
      self.beacon_interval = Duration::from_secs(secs as u64);
    }
    self
  }

  #[must_use]
  pub fn with_ttl_beacon_secs(mut self, secs: i64) -> Self {
    if secs > 0 {
      self.ttl_beacon = Duration::from_secs(secs as u64);
    }
    self
  }

  #[must_use]
  pub fn with_outdated_secs(mut self, secs: i64) -> Self {
    if secs > 0 {
      self.outdated = Some(Duration::from_secs(secs as u64));
    }
    self
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn defaults_match_spec_table() {
    let c = Config::default();
    assert_eq!(c.max_teachs(), 10);
    assert_eq!(c.learn_interval(), Duration::from_secs(10));
    assert_eq!(c.beacon_interval(), Duration::from_secs(1));
    assert_eq!(c.ttl_beacon(), Duration::from_secs(5));
    assert_eq!(c.outdated(), None);
  }

  #[test]
  fn non_positive_setters_are_no_ops() {
    let c = Config::default()
      .with_max_teachs(0)
      .with_learn_interval_secs(-1)
      .with_beacon_interval_secs(0)
      .with_ttl_beacon_secs(-5);
    assert_eq!(c, Config::default());
  }

  #[test]
  fn positive_setters_apply() {
    let c = Config::default().with_max_teachs(25).with_outdated_secs(60);
    assert_eq!(c.max_teachs(), 25);
    assert_eq!(c.outdated(), Some(Duration::from_secs(60)));
  }
}
