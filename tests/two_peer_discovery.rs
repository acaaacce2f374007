//! Two peers within reach of each other, starting from empty tables,
//! converge to mutual direct-neighbor routes after exchanging BEACONs.

mod support;

use std::sync::Arc;

use ltmesh::{ForwardTable, MockClock};
use support::peer;

#[test]
fn peers_become_direct_neighbors_after_a_beacon_each() {
  let clock = Arc::new(MockClock::new(0));
  let a = ForwardTable::new(peer(1), clock.clone());
  let b = ForwardTable::new(peer(2), clock.clone());

  // A hears a BEACON from B, and vice versa.
  a.add_neighbor(peer(2));
  b.add_neighbor(peer(1));

  let a_entry = a.entry(peer(2)).expect("A must have learned about B");
  assert_eq!(a_entry.wire_hops(), 0);
  assert_eq!(a_entry.next_hop(), None);
  assert_eq!(a.route(peer(2)), (None, 1));

  let b_entry = b.entry(peer(1)).expect("B must have learned about A");
  assert_eq!(b_entry.wire_hops(), 0);
  assert_eq!(b.route(peer(1)), (None, 1));
}
