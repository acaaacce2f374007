//! Observability events emitted by the forward table and node runtime.
//!
//! Consumers can either hold an [`EventReceiver`] directly, or register a
//! [`Listener`] with [`crate::node::Node::on_event`], which drains the
//! channel on a separate task and invokes the listener there, never under
//! the table lock.

use std::sync::Arc;

use tokio::sync::mpsc::UnboundedReceiver;

use crate::{identity::PeerId, table::Entry};

/// Stable, 1-based event ordinals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum EventKind {
  WantToLearn = 1,
  Learning = 2,
  Teaching = 3,
  NeighborExpired = 4,
  RelayRemoved = 5,
  ShorterRoute = 6,
  ForwardChanged = 7,
  ForwardLearned = 8,
  NeighborAdded = 9,
  NeighborUpdated = 10,
  RelayUpdated = 11,
  RelayRevived = 12,
  NeighborRelayed = 13,
  LoopDetect = 14,
}

impl EventKind {
  pub fn ordinal(self) -> u16 {
    self as u16
  }
}

/// Kind-specific payload. `None` for events that are pure notifications.
#[derive(Debug, Clone)]
pub enum EventValue {
  None,
  Entry(Entry),
  Change { old: Entry, new: Entry },
  Counts([u32; 4]),
}

/// `peer` is the emitting node; `reference` is a secondary peer (sender or
/// target) when meaningful for this event kind.
#[derive(Debug, Clone)]
pub struct Event {
  pub kind: EventKind,
  pub peer: PeerId,
  pub reference: Option<PeerId>,
  pub value: EventValue,
}

impl Event {
  pub(crate) fn new(
    kind: EventKind,
    peer: PeerId,
    reference: Option<PeerId>,
    value: EventValue,
  ) -> Self {
    Self {
      kind,
      peer,
      reference,
      value,
    }
  }
}

pub type EventReceiver = UnboundedReceiver<Event>;

/// A non-blocking listener callback.
pub type Listener = Arc<dyn Fn(Event) + Send + Sync>;
