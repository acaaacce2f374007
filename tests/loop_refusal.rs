//! A relay must never accept a route update that would forward back
//! through the node computing it, regardless of the hop count claimed.

mod support;

use std::sync::Arc;

use ltmesh::{Forward, ForwardTable, MockClock};
use support::peer;

#[test]
fn an_update_that_would_route_back_through_self_is_refused() {
  let clock = Arc::new(MockClock::new(0));
  let a = ForwardTable::new(peer(1), clock.clone());

  a.add_neighbor(peer(2)); // B
  a.learn(
    peer(2),
    &[Forward {
      peer: peer(3), // C, reached via B
      hops: 0,
      next_tag: 0,
      age: 0,
    }],
  );
  assert_eq!(a.entry(peer(3)).unwrap().next_hop(), Some(peer(2)));

  // B re-announces C, but claims B's own next hop toward C is A itself.
  // Applying this would have A forward to B, which forwards back to A.
  clock.advance_secs(1);
  a.learn(
    peer(2),
    &[Forward {
      peer: peer(3),
      hops: 0, // even an attractively "shorter" hop count...
      next_tag: peer(1).tag(), // ...is refused because next_tag is A's own tag
      age: 0,
    }],
  );

  let entry = a.entry(peer(3)).unwrap();
  assert_eq!(entry.next_hop(), Some(peer(2)));
  assert_eq!(entry.wire_hops(), 1, "the original route must be unchanged");
}
