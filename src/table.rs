//! The forward table: the per-node state machine that turns BEACON/LEARN/TEACH
//! traffic into a forwarding decision for every peer the node has heard about,
//! directly or by relay.
//!
//! A cheap, `Clone`-able handle wrapping `Arc<parking_lot::RwLock<Inner>>`,
//! so callers can hold a `ForwardTable` by value and share it across the
//! node's tick handlers and worker tasks without an extra layer of `Arc` at
//! every call site.
//!
//! Kind and lifecycle state are a tagged enum (`EntryKind`/`LifecycleState`)
//! rather than a single magic-negative `hops` field; a single
//! [`EntryKind::wire_hops`] projection is the only place that wire encoding
//! is reconstructed. An `Entry` built this way simply cannot represent a
//! neighbor with a stray hop count, or a relay with no next hop.

use std::{
  collections::{HashMap, HashSet},
  sync::Arc,
  time::Duration,
};

use parking_lot::RwLock;
use tokio::sync::mpsc::UnboundedSender;

use crate::{
  bloom::BloomFilter,
  event::{Event, EventKind, EventValue},
  identity::PeerId,
  time::{Clock, Timestamp},
  wire::Forward,
};

/// Active, removed, or dormant. Orthogonal to whether the entry is a
/// neighbor or a relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
  Active,
  Removed,
  Dormant,
}

/// What an entry is and where it stands in its lifecycle. A `Neighbor` has
/// no next hop by construction; a `Relay` always has one. This is the
/// invariant the wire's magic-negative `hops` values could silently violate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
  Neighbor(LifecycleState),
  Relay {
    hops: u16,
    next_hop: PeerId,
    state: LifecycleState,
  },
}

impl EntryKind {
  pub fn state(&self) -> LifecycleState {
    match *self {
      EntryKind::Neighbor(s) => s,
      EntryKind::Relay { state, .. } => state,
    }
  }

  pub fn next_hop(&self) -> Option<PeerId> {
    match *self {
      EntryKind::Neighbor(_) => None,
      EntryKind::Relay { next_hop, .. } => Some(next_hop),
    }
  }

  pub fn is_relay(&self) -> bool {
    matches!(self, EntryKind::Relay { .. })
  }

  pub fn is_neighbor(&self) -> bool {
    matches!(self, EntryKind::Neighbor(_))
  }

  pub fn is_active(&self) -> bool {
    self.state() == LifecycleState::Active
  }

  pub fn is_removed(&self) -> bool {
    self.state() == LifecycleState::Removed
  }

  pub fn is_dormant(&self) -> bool {
    self.state() == LifecycleState::Dormant
  }

  /// Reconstructs the wire's magic-negative `hops` encoding at the one
  /// place it is needed: serialization.
  pub fn wire_hops(&self) -> i16 {
    match *self {
      EntryKind::Neighbor(LifecycleState::Active) => 0,
      EntryKind::Neighbor(LifecycleState::Removed) => -2,
      EntryKind::Neighbor(LifecycleState::Dormant) => -4,
      EntryKind::Relay {
        hops,
        state: LifecycleState::Active,
        ..
      } => hops as i16,
      EntryKind::Relay {
        state: LifecycleState::Removed,
        ..
      } => -1,
      EntryKind::Relay {
        state: LifecycleState::Dormant,
        ..
      } => -3,
    }
  }

  fn with_state(self, state: LifecycleState) -> Self {
    match self {
      EntryKind::Neighbor(_) => EntryKind::Neighbor(state),
      EntryKind::Relay { hops, next_hop, .. } => EntryKind::Relay {
        hops,
        next_hop,
        state,
      },
    }
  }
}

/// A local table record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
  pub peer: PeerId,
  pub kind: EntryKind,
  /// Receiver-rebased timestamp of the route's genesis.
  pub origin: Timestamp,
  /// Local time of the entry's last mutation.
  pub changed: Timestamp,
  /// Not yet broadcast in a TEACH since its last change.
  pub pending: bool,
}

impl Entry {
  pub fn wire_hops(&self) -> i16 {
    self.kind.wire_hops()
  }

  pub fn next_hop(&self) -> Option<PeerId> {
    self.kind.next_hop()
  }
}

/// A wire `hops` value decoded into its kind/state meaning, or rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WireClass {
  RelayActive(u16),
  NeighborActive,
  RelayRemoved,
  NeighborRemoved,
  RelayDormant,
  NeighborDormant,
}

/// Classifies a wire `hops` value into the kind/state it encodes. Values
/// outside the six recognized codes are a malformed announcement and must
/// be discarded silently by the caller.
fn classify_wire(hops: i16) -> Option<WireClass> {
  match hops {
    h if h >= 1 => Some(WireClass::RelayActive(h as u16)),
    0 => Some(WireClass::NeighborActive),
    -1 => Some(WireClass::RelayRemoved),
    -2 => Some(WireClass::NeighborRemoved),
    -3 => Some(WireClass::RelayDormant),
    -4 => Some(WireClass::NeighborDormant),
    _ => None,
  }
}

struct Inner {
  owner: PeerId,
  entries: HashMap<PeerId, Entry>,
  clock: Arc<dyn Clock>,
  events: Option<UnboundedSender<Event>>,
  debug_invariants: bool,
}

fn emit(inner: &Inner, kind: EventKind, reference: Option<PeerId>, value: EventValue) {
  if let Some(tx) = &inner.events {
    let _ = tx.send(Event::new(kind, inner.owner, reference, value));
  }
}

/// Halts the process on any violation of the table's structural invariants.
/// Intended for tests, not production: a live node should log and carry on,
/// never abort on a corrupt entry.
fn check_invariants(inner: &Inner) {
  for (peer, entry) in &inner.entries {
    assert_ne!(
      *peer, inner.owner,
      "table must never hold an entry for its own owner"
    );
    assert_eq!(
      entry.peer, *peer,
      "entry.peer must match its map key"
    );
    if let EntryKind::Relay {
      next_hop,
      state: LifecycleState::Active,
      ..
    } = entry.kind
    {
      match inner.entries.get(&next_hop) {
        Some(n) if n.kind.is_neighbor() => {}
        _ => panic!(
          "active relay {:?} has no neighbor entry for next_hop {:?}",
          peer, next_hop
        ),
      }
    }
  }
}

/// The per-peer entry store. Cheap to clone: all clones share the same
/// underlying state, the same handle-over-`Arc<RwLock<_>>` shape as
/// [`crate::channel::Channel`].
#[derive(Clone)]
pub struct ForwardTable {
  inner: Arc<RwLock<Inner>>,
}

impl ForwardTable {
  pub fn new(owner: PeerId, clock: Arc<dyn Clock>) -> Self {
    Self {
      inner: Arc::new(RwLock::new(Inner {
        owner,
        entries: HashMap::new(),
        clock,
        events: None,
        debug_invariants: false,
      })),
    }
  }

  pub fn owner(&self) -> PeerId {
    self.inner.read().owner
  }

  pub fn len(&self) -> usize {
    self.inner.read().entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// A snapshot copy of the entry for `peer`, if any.
  pub fn entry(&self, peer: PeerId) -> Option<Entry> {
    self.inner.read().entries.get(&peer).cloned()
  }

  /// Routes table events to `tx` from here on. Sending into an unbounded
  /// channel keeps event emission non-blocking while the table lock is
  /// held, rather than invoking a listener callback directly.
  pub fn set_event_sender(&self, tx: UnboundedSender<Event>) {
    self.inner.write().events = Some(tx);
  }

  /// Enables the debug invariant checker. Never enable in production: it
  /// panics the process on the first violation.
  pub fn enable_debug_invariants(&self) {
    self.inner.write().debug_invariants = true;
  }

  /// Marks `id` as a live direct neighbor. Total: no failure mode. Receipt
  /// of any message from `id` is ground truth that `id` is presently in
  /// range, so this unconditionally promotes a former relay or a
  /// dormant/removed entry back to active-neighbor status.
  pub fn add_neighbor(&self, id: PeerId) {
    let mut inner = self.inner.write();
    if id == inner.owner {
      return;
    }
    let now = inner.clock.now_micros();
    let existing = inner.entries.get(&id).cloned();
    let entry = Entry {
      peer: id,
      kind: EntryKind::Neighbor(LifecycleState::Active),
      origin: now,
      changed: now,
      pending: true,
    };
    inner.entries.insert(id, entry.clone());
    match existing {
      None => emit(&inner, EventKind::NeighborAdded, None, EventValue::Entry(entry)),
      Some(_) => emit(&inner, EventKind::NeighborUpdated, None, EventValue::Entry(entry)),
    }
    if inner.debug_invariants {
      check_invariants(&inner);
    }
  }

  /// Applies a received TEACH, one announcement at a time, in order.
  pub fn learn(&self, sender: PeerId, announce: &[Forward]) {
    let mut inner = self.inner.write();
    for a in announce {
      learn_one(&mut inner, sender, a);
    }
    if inner.debug_invariants {
      check_invariants(&inner);
    }
  }

  /// Expires silent neighbors and cascades to their dependent relays. Runs
  /// before every `filter()` call.
  pub fn cleanup(&self, ttl_beacon: Duration) {
    let mut inner = self.inner.write();
    let ttl_micros = ttl_beacon.as_micros() as i64;
    let now = inner.clock.now_micros();

    let mut expired_neighbors = Vec::new();
    for (peer, entry) in inner.entries.iter_mut() {
      if matches!(entry.kind, EntryKind::Neighbor(LifecycleState::Active))
        && now - entry.origin > ttl_micros
      {
        entry.kind = EntryKind::Neighbor(LifecycleState::Removed);
        entry.pending = true;
        entry.changed = now;
        expired_neighbors.push(*peer);
      }
    }
    for peer in &expired_neighbors {
      let entry = inner.entries.get(peer).cloned().expect("just inserted");
      emit(&inner, EventKind::NeighborExpired, None, EventValue::Entry(entry));
    }

    if !expired_neighbors.is_empty() {
      let expired: HashSet<PeerId> = expired_neighbors.into_iter().collect();
      let mut cascaded = Vec::new();
      for (peer, entry) in inner.entries.iter_mut() {
        if let EntryKind::Relay {
          next_hop,
          state: LifecycleState::Active,
          ..
        } = entry.kind
        {
          if expired.contains(&next_hop) {
            entry.kind = entry.kind.with_state(LifecycleState::Removed);
            entry.pending = true;
            entry.changed = now;
            cascaded.push(*peer);
          }
        }
      }
      for peer in cascaded {
        let entry = inner.entries.get(&peer).cloned().expect("just inserted");
        emit(&inner, EventKind::RelayRemoved, None, EventValue::Entry(entry));
      }
    }

    if inner.debug_invariants {
      check_invariants(&inner);
    }
  }

  /// Runs cleanup, then summarizes the known, non-dormant peer set (plus the
  /// owner's own id) into a freshly salted bloom filter. `outdated`, when
  /// set, additionally excludes entries whose age exceeds it; `None` leaves
  /// age out of the filter entirely.
  pub fn filter(&self, ttl_beacon: Duration, outdated: Option<Duration>) -> BloomFilter {
    self.cleanup(ttl_beacon);

    let inner = self.inner.read();
    let now = inner.clock.now_micros();
    let outdated_micros = outdated.map(|d| d.as_micros() as i64);

    let eligible: Vec<PeerId> = inner
      .entries
      .values()
      .filter(|e| !e.kind.is_dormant())
      .filter(|e| outdated_micros.map_or(true, |limit| now - e.origin <= limit))
      .map(|e| e.peer)
      .collect();

    let n = eligible.len() + 2;
    let salt: u32 = rand::random();
    let mut bf = BloomFilter::new(salt, n, 1.0 / n as f64);
    for peer in &eligible {
      bf.insert(peer.as_bytes());
    }
    bf.insert(inner.owner.as_bytes());
    bf
  }

  /// Selects entries worth teaching back to a LEARN sender. Mutates removed
  /// entries into dormant ones as a side effect of being selected, and
  /// clears `pending` on every selected entry.
  pub fn candidates(&self, filter: &BloomFilter, max_teachs: u32) -> (Vec<Forward>, [u32; 4]) {
    let mut inner = self.inner.write();
    let now = inner.clock.now_micros();
    let owner = inner.owner;

    struct Candidate {
      peer: PeerId,
      class: u8,
      hops: i16,
    }

    let mut picked: Vec<Candidate> = Vec::new();
    for (peer, entry) in inner.entries.iter() {
      let class = if !filter.contains(peer.as_bytes()) && !entry.kind.is_dormant() {
        0
      } else if entry.kind.is_removed() && entry.kind.is_neighbor() {
        1
      } else if entry.kind.is_removed() && entry.kind.is_relay() {
        2
      } else if entry.kind.is_active() && entry.pending {
        3
      } else {
        continue;
      };
      picked.push(Candidate {
        peer: *peer,
        class,
        hops: entry.wire_hops(),
      });
    }

    let mut counts = [0u32; 4];
    if picked.len() as u32 > max_teachs {
      picked.sort_by(|a, b| a.class.cmp(&b.class).then(a.hops.cmp(&b.hops)));
      counts[3] = picked.len() as u32 - max_teachs;
      picked.truncate(max_teachs as usize);
    }

    let mut out = Vec::with_capacity(picked.len());
    for c in picked {
      let old = inner
        .entries
        .get(&c.peer)
        .cloned()
        .expect("candidate peer must still be present under the same lock hold");

      let reported_hops = old.wire_hops();
      let next_tag = old.kind.next_hop().unwrap_or(owner).tag();
      let age = now - old.origin;

      let mut updated = old.clone();
      if old.kind.is_removed() {
        updated.kind = old.kind.with_state(LifecycleState::Dormant);
        counts[0] += 1;
      } else if old.pending {
        counts[2] += 1;
      } else {
        counts[1] += 1;
      }
      updated.pending = false;
      updated.changed = now;
      inner.entries.insert(c.peer, updated.clone());
      emit(
        &inner,
        EventKind::ForwardChanged,
        None,
        EventValue::Change { old, new: updated },
      );

      out.push(Forward {
        peer: c.peer,
        hops: reported_hops,
        next_tag,
        age,
      });
    }

    if inner.debug_invariants {
      check_invariants(&inner);
    }
    (out, counts)
  }

  /// Looks up the forwarding decision for `target`.
  pub fn route(&self, target: PeerId) -> (Option<PeerId>, i16) {
    let inner = self.inner.read();
    match inner.entries.get(&target) {
      None => (None, 0),
      Some(entry) => {
        if entry.wire_hops() < 0 {
          return (None, 0);
        }
        match entry.kind {
          EntryKind::Neighbor(_) => (None, 1),
          EntryKind::Relay { next_hop, hops, .. } => (Some(next_hop), hops as i16 + 1),
        }
      }
    }
  }
}

/// Applies one TEACH announcement. `inner` is already write-locked by the
/// caller.
fn learn_one(inner: &mut Inner, sender: PeerId, a: &Forward) {
  if a.peer == inner.owner {
    return; // no self-routes
  }
  let Some(class) = classify_wire(a.hops) else {
    return; // malformed kind/state encoding: discarded silently
  };
  let now = inner.clock.now_micros();
  let origin = now - a.age;

  match inner.entries.get(&a.peer).cloned() {
    None => match class {
      WireClass::RelayRemoved => {}
      WireClass::RelayDormant | WireClass::NeighborDormant => {
        // Never legitimately emitted by `candidates` for a peer with no
        // prior entry; treat as malformed and discard.
      }
      WireClass::NeighborRemoved => {
        let entry = Entry {
          peer: a.peer,
          kind: EntryKind::Neighbor(LifecycleState::Removed),
          origin,
          changed: now,
          pending: true,
        };
        inner.entries.insert(a.peer, entry);
      }
      WireClass::RelayActive(h) => {
        let entry = Entry {
          peer: a.peer,
          kind: EntryKind::Relay {
            hops: h + 1,
            next_hop: sender,
            state: LifecycleState::Active,
          },
          origin,
          changed: now,
          pending: true,
        };
        inner.entries.insert(a.peer, entry.clone());
        emit(inner, EventKind::ForwardLearned, Some(sender), EventValue::Entry(entry));
      }
      WireClass::NeighborActive => {
        let entry = Entry {
          peer: a.peer,
          kind: EntryKind::Relay {
            hops: 1,
            next_hop: sender,
            state: LifecycleState::Active,
          },
          origin,
          changed: now,
          pending: true,
        };
        inner.entries.insert(a.peer, entry.clone());
        emit(inner, EventKind::ForwardLearned, Some(sender), EventValue::Entry(entry));
      }
    },
    Some(mut entry) => {
      if entry.kind.is_removed() {
        return; // wait for the dormant transition via candidate broadcast
      }
      let dt = origin - entry.origin;
      if dt < 1 {
        return; // stale: not newer than what we already have
      }

      let old = entry.clone();
      entry.pending = false;
      inner.entries.insert(a.peer, entry.clone());

      let announces_removal = matches!(class, WireClass::RelayRemoved | WireClass::NeighborRemoved);

      if announces_removal {
        // A removal announce about an entry that is already dormant (it
        // was broadcast as removed once already) is a no-op beyond the
        // pending-clear already applied above.
        if entry.kind.is_active() && entry.kind.is_relay() && entry.kind.next_hop() == Some(sender) {
          entry.kind = entry.kind.with_state(LifecycleState::Removed);
          entry.origin = origin;
          entry.changed = now;
          entry.pending = true;
          inner.entries.insert(a.peer, entry.clone());
          emit(inner, EventKind::RelayRemoved, Some(sender), EventValue::Entry(entry.clone()));
          emit(
            inner,
            EventKind::ForwardChanged,
            Some(sender),
            EventValue::Change { old, new: entry },
          );
        }
        // An active neighbor declines a remote-announced removal of
        // itself: receipt of messages from it is stronger evidence than a
        // third party's claim that it is gone. Keep the entry and surface
        // the attempt as an event instead of silently dropping it.
        else if entry.kind.is_active() && entry.kind.is_neighbor() {
          emit(inner, EventKind::NeighborUpdated, Some(sender), EventValue::Entry(entry));
        }
        return;
      }

      let a_hops = match class {
        WireClass::RelayActive(h) => h as i16,
        WireClass::NeighborActive => 0,
        WireClass::RelayDormant | WireClass::NeighborDormant => return,
        WireClass::RelayRemoved | WireClass::NeighborRemoved => unreachable!("handled above"),
      };

      if entry.kind.is_relay() {
        // The loop guard fires regardless of the hops carried on this
        // announcement: an attractively short route is still a route back
        // through ourselves. Check it ahead of update-kind classification
        // rather than only once a candidate update has been found.
        if entry.kind.next_hop() == Some(sender) && a.next_tag == inner.owner.tag() {
          emit(inner, EventKind::LoopDetect, Some(sender), EventValue::Entry(entry));
          return;
        }

        let target_hops = a_hops + 1;
        let current_hops = entry.wire_hops();
        let update_kind = if target_hops < current_hops {
          Some(EventKind::ShorterRoute)
        } else if target_hops == current_hops && entry.kind.next_hop() != Some(sender) {
          Some(EventKind::RelayUpdated)
        } else if entry.kind.is_dormant() {
          Some(EventKind::RelayRevived)
        } else {
          None
        };

        let Some(update_kind) = update_kind else {
          return;
        };

        entry.kind = EntryKind::Relay {
          hops: target_hops as u16,
          next_hop: sender,
          state: LifecycleState::Active,
        };
        entry.origin = origin;
        entry.changed = now;
        entry.pending = true;
        inner.entries.insert(a.peer, entry.clone());
        emit(inner, update_kind, Some(sender), EventValue::Entry(entry.clone()));
        emit(
          inner,
          EventKind::ForwardChanged,
          Some(sender),
          EventValue::Change { old, new: entry },
        );
      } else if entry.kind.is_dormant() {
        // active announce on a dormant neighbor: promote to relay.
        entry.kind = EntryKind::Relay {
          hops: (a_hops + 1) as u16,
          next_hop: sender,
          state: LifecycleState::Active,
        };
        entry.origin = origin;
        entry.changed = now;
        entry.pending = true;
        inner.entries.insert(a.peer, entry.clone());
        emit(inner, EventKind::NeighborRelayed, Some(sender), EventValue::Entry(entry.clone()));
        emit(
          inner,
          EventKind::ForwardChanged,
          Some(sender),
          EventValue::Change { old, new: entry },
        );
      }
      // else: active neighbor entry hearing an indirect route to itself;
      // the direct connection already trumps it. Nothing left to do beyond
      // the pending-clear already persisted above.
    }
  }
}
