//! Per-peer forward-table state machine for the LEArn/TEAch broadcast mesh
//! routing protocol: each peer learns a forwarding table to every other
//! reachable peer from periodic BEACON/LEARN/TEACH exchanges with whoever
//! is currently within broadcast range, with no global view and no
//! synchronized clocks.
//!
//! Message framing, authentication, and the broadcast medium itself are
//! collaborators outside this crate (see `DESIGN.md`); this crate is the
//! entry/exit table, the candidate-selection algorithm that decides what to
//! teach, and the node runtime that drives both from the wire.

mod bloom;
mod channel;
mod config;
mod event;
mod identity;
mod node;
mod table;
mod time;
mod wire;

pub use {
  bloom::BloomFilter,
  config::Config,
  event::{Event, EventKind, EventReceiver, EventValue, Listener},
  identity::PeerId,
  node::Node,
  table::{Entry, EntryKind, ForwardTable, LifecycleState},
  time::{Age, Clock, MockClock, SystemClock, Timestamp},
  wire::{DecodeError, Forward, Message},
};
