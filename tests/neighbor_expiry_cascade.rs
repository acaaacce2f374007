//! Silence from a relaying neighbor must expire that neighbor entry and
//! cascade to every relay route that depended on it.

mod support;

use std::{sync::Arc, time::Duration};

use ltmesh::{Config, ForwardTable, LifecycleState, MockClock};
use support::peer;

const TTL: Duration = Duration::from_secs(5);

fn learn_round(learner: &ForwardTable, teacher: &ForwardTable, config: &Config) {
  let filter = learner.filter(TTL, config.outdated());
  let (announce, _counts) = teacher.candidates(&filter, config.max_teachs());
  if !announce.is_empty() {
    learner.learn(teacher.owner(), &announce);
  }
}

#[test]
fn silence_past_ttl_removes_the_neighbor_and_its_dependent_relays() {
  let clock = Arc::new(MockClock::new(0));
  let config = Config::default();

  let a = ForwardTable::new(peer(1), clock.clone());
  let b = ForwardTable::new(peer(2), clock.clone());
  let c = ForwardTable::new(peer(3), clock.clone());

  a.add_neighbor(peer(2)); // A learns B is a neighbor
  b.add_neighbor(peer(1));
  b.add_neighbor(peer(3));
  c.add_neighbor(peer(2));

  learn_round(&a, &b, &config); // A learns about C, relayed via B

  assert_eq!(
    a.entry(peer(3)).unwrap().next_hop(),
    Some(peer(2)),
    "precondition: A must route to C via B before B goes silent"
  );

  // B goes silent from A's perspective for longer than TTLBeacon.
  clock.advance_secs(TTL.as_secs() as i64 + 1);
  a.cleanup(TTL);

  let b_entry = a.entry(peer(2)).expect("B's entry must persist, just removed");
  assert_eq!(b_entry.kind.state(), LifecycleState::Removed);

  let c_entry = a.entry(peer(3)).expect("C's relay entry must persist, just removed");
  assert_eq!(c_entry.kind.state(), LifecycleState::Removed);
}
