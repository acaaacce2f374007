//! Local microsecond timestamps and signed relative ages.
//!
//! Clocks are never synchronized across peers. A [`Clock`] is injected
//! rather than called directly against [`std::time::SystemTime`] so tests
//! can freeze and advance "now" deterministically instead of sleeping on
//! real wall-clock time.

use std::{
  sync::atomic::{AtomicI64, Ordering},
  time::{SystemTime, UNIX_EPOCH},
};

/// Local microseconds since the Unix epoch.
pub type Timestamp = i64;

/// Signed relative age in microseconds; positive means "in the past".
pub type Age = i64;

/// Source of the local wall clock, injected into [`crate::table::ForwardTable`]
/// and [`crate::node::Node`] so tests can control time without sleeping.
pub trait Clock: Send + Sync + 'static {
  fn now_micros(&self) -> Timestamp;

  /// `age(T) = now - T`
  fn age_of(&self, t: Timestamp) -> Age {
    self.now_micros() - t
  }

  /// `T_of(age) = now - age`
  fn timestamp_of(&self, age: Age) -> Timestamp {
    self.now_micros() - age
  }
}

/// The real system clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
  fn now_micros(&self) -> Timestamp {
    SystemTime::now()
      .duration_since(UNIX_EPOCH)
      .expect("system clock is before the Unix epoch")
      .as_micros() as i64
  }
}

/// A clock whose value is set explicitly, for deterministic tests of
/// age-rebasing and TTL-expiry behavior.
#[derive(Debug)]
pub struct MockClock(AtomicI64);

impl MockClock {
  pub fn new(start: Timestamp) -> Self {
    Self(AtomicI64::new(start))
  }

  pub fn set(&self, t: Timestamp) {
    self.0.store(t, Ordering::SeqCst);
  }

  pub fn advance_micros(&self, delta: i64) {
    self.0.fetch_add(delta, Ordering::SeqCst);
  }

  pub fn advance_secs(&self, delta: i64) {
    self.advance_micros(delta * 1_000_000);
  }
}

impl Clock for MockClock {
  fn now_micros(&self) -> Timestamp {
    self.0.load(Ordering::SeqCst)
  }
}

/// Seconds-to-microseconds helper used throughout [`crate::config`].
pub fn secs_to_micros(secs: u64) -> i64 {
  secs as i64 * 1_000_000
}
