//! The node runtime: periodic BEACON/LEARN ticks, inbound dispatch, and the
//! start/stop lifecycle.
//!
//! A small handle holding a stop sender and a `JoinHandle`, with the actual
//! `tokio::select!` loop running as a detached task that multiplexes two
//! periodic timers and the inbound-message channel.

use std::sync::Arc;

use metrics::increment_counter;
use tokio::{
  sync::mpsc::{UnboundedReceiver, UnboundedSender},
  task::JoinHandle,
  time::{interval, MissedTickBehavior},
};
use tracing::debug;

use crate::{
  channel::Channel,
  config::Config,
  event::{Event, EventKind, EventReceiver, EventValue, Listener},
  identity::PeerId,
  table::ForwardTable,
  time::Clock,
  wire::Message,
};

/// A running node. Cloning is not provided: a node owns exactly one
/// background task and one stop signal, and dropping the last `Node` handle
/// does not stop that task; call [`Node::stop`] explicitly.
pub struct Node {
  table: ForwardTable,
  stop_tx: UnboundedSender<()>,
  handle: JoinHandle<()>,
}

impl Node {
  /// Starts the node: spawns the tick/dispatch task and returns both the
  /// node handle and its event stream. `inbound`/`outbound` stand in for the
  /// broadcast medium: a pair of unbounded channels of `Message`.
  pub fn start(
    owner: PeerId,
    config: Config,
    clock: Arc<dyn Clock>,
    inbound: UnboundedReceiver<Message>,
    outbound: UnboundedSender<Message>,
  ) -> (Self, EventReceiver) {
    let table = ForwardTable::new(owner, clock);
    let (event_tx, event_rx) = Channel::new().split();
    table.set_event_sender(event_tx.clone());

    let (stop_tx, stop_rx) = tokio::sync::mpsc::unbounded_channel();
    let handle = tokio::spawn(run_loop(
      table.clone(),
      config,
      inbound,
      outbound,
      stop_rx,
      event_tx,
    ));

    (
      Self {
        table,
        stop_tx,
        handle,
      },
      event_rx,
    )
  }

  pub fn table(&self) -> &ForwardTable {
    &self.table
  }

  /// Drains the event stream on a dedicated task and invokes `listener` for
  /// each event. The listener must not block: it runs inline on that task,
  /// never under the table's lock.
  pub fn on_event(events: EventReceiver, listener: Listener) {
    let mut events = events;
    tokio::spawn(async move {
      while let Some(event) = events.recv().await {
        listener(event);
      }
    });
  }

  /// Signals the loop to exit at its next suspension point. Idempotent: a
  /// second call is a harmless send into an already-closing channel.
  pub fn stop(&self) {
    let _ = self.stop_tx.send(());
  }

  /// Awaits the background task's completion.
  pub async fn join(self) -> Result<(), tokio::task::JoinError> {
    self.handle.await
  }
}

fn dispatch_send(outbound: &UnboundedSender<Message>, msg: Message) {
  let outbound = outbound.clone();
  tokio::spawn(async move {
    let _ = outbound.send(msg);
  });
}

async fn run_loop(
  table: ForwardTable,
  config: Config,
  mut inbound: UnboundedReceiver<Message>,
  outbound: UnboundedSender<Message>,
  mut stop_rx: UnboundedReceiver<()>,
  events: UnboundedSender<Event>,
) {
  let owner = table.owner();

  let mut beacon_ticker = interval(config.beacon_interval());
  beacon_ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
  let mut learn_ticker = interval(config.learn_interval());
  learn_ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

  loop {
    tokio::select! {
      _ = stop_rx.recv() => {
        debug!(peer = %owner, "node stopping");
        break;
      }

      _ = beacon_ticker.tick() => {
        increment_counter!("ltmesh_beacon_sent_total", "peer" => owner.to_base32());
        dispatch_send(&outbound, Message::Beacon { sender: owner });
      }

      _ = learn_ticker.tick() => {
        increment_counter!("ltmesh_learn_sent_total", "peer" => owner.to_base32());
        let filter = table.filter(config.ttl_beacon(), config.outdated());
        dispatch_send(&outbound, Message::Learn { sender: owner, filter });
        let _ = events.send(Event::new(EventKind::WantToLearn, owner, None, EventValue::None));
      }

      Some(msg) = inbound.recv() => {
        let table = table.clone();
        let config = config;
        let outbound = outbound.clone();
        let events = events.clone();
        tokio::spawn(async move {
          handle_inbound(table, config, outbound, events, msg).await;
        });
      }
    }
  }
}

/// Dispatches one inbound message: first records the sender as a live
/// neighbor, then acts by message type.
async fn handle_inbound(
  table: ForwardTable,
  config: Config,
  outbound: UnboundedSender<Message>,
  events: UnboundedSender<Event>,
  msg: Message,
) {
  let sender = msg.sender();
  let owner = table.owner();
  table.add_neighbor(sender);

  match msg {
    Message::Beacon { .. } => {}
    Message::Learn { filter, .. } => {
      let (announce, counts) = table.candidates(&filter, config.max_teachs());
      if !announce.is_empty() {
        increment_counter!("ltmesh_teach_sent_total", "peer" => owner.to_base32());
        dispatch_send(
          &outbound,
          Message::Teach {
            sender: owner,
            announce,
          },
        );
        let _ = events.send(Event::new(
          EventKind::Teaching,
          owner,
          Some(sender),
          EventValue::Counts(counts),
        ));
      }
    }
    Message::Teach { announce, .. } => {
      table.learn(sender, &announce);
      let _ = events.send(Event::new(EventKind::Learning, owner, Some(sender), EventValue::None));
    }
  }
}

#[cfg(test)]
mod tests {
  use std::time::Duration;

  use tokio::sync::mpsc;

  use super::*;
  use crate::time::SystemClock;

  fn peer(b: u8) -> PeerId {
    let mut bytes = [0u8; 32];
    bytes[0] = b;
    PeerId::new(bytes)
  }

  #[tokio::test]
  async fn two_nodes_discover_each_other_over_a_shared_medium() {
    let config = Config::default()
      .with_beacon_interval_secs(0) // left at defaults; explicit no-op check
      .with_learn_interval_secs(1);

    let (a_out_tx, mut a_out_rx) = mpsc::unbounded_channel();
    let (b_out_tx, mut b_out_rx) = mpsc::unbounded_channel();
    let (a_in_tx, a_in_rx) = mpsc::unbounded_channel();
    let (b_in_tx, b_in_rx) = mpsc::unbounded_channel();

    let (node_a, _events_a) =
      Node::start(peer(1), config, Arc::new(SystemClock), a_in_rx, a_out_tx);
    let (node_b, _events_b) =
      Node::start(peer(2), config, Arc::new(SystemClock), b_in_rx, b_out_tx);

    // Wire the two "media" together manually: whatever A sends becomes B's
    // inbound, and vice versa.
    let relay_a_to_b = tokio::spawn(async move {
      while let Some(msg) = a_out_rx.recv().await {
        if b_in_tx.send(msg).is_err() {
          break;
        }
      }
    });
    let relay_b_to_a = tokio::spawn(async move {
      while let Some(msg) = b_out_rx.recv().await {
        if a_in_tx.send(msg).is_err() {
          break;
        }
      }
    });

    tokio::time::sleep(Duration::from_millis(50)).await;

    node_a.stop();
    node_b.stop();
    let _ = node_a.join().await;
    let _ = node_b.join().await;
    relay_a_to_b.abort();
    relay_b_to_a.abort();
  }
}
