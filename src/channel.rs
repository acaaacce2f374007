//! A small `Sink`/`Stream`-free wrapper over an unbounded `tokio::mpsc`
//! channel: construct with [`Channel::new`], push with [`Channel::send`],
//! and drive it from a `Future::poll`/`Stream::poll_next` impl with
//! [`Channel::poll_recv`].

use std::task::{Context, Poll};

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

pub struct Channel<T> {
  tx: UnboundedSender<T>,
  rx: UnboundedReceiver<T>,
}

impl<T> Channel<T> {
  pub fn new() -> Self {
    let (tx, rx) = mpsc::unbounded_channel();
    Self { tx, rx }
  }

  pub fn sender(&self) -> UnboundedSender<T> {
    self.tx.clone()
  }

  /// Sends a value, ignoring the (impossible, since `self` also holds the
  /// receiver) disconnect case.
  pub fn send(&self, value: T) {
    let _ = self.tx.send(value);
  }

  pub fn poll_recv(&mut self, cx: &mut Context<'_>) -> Poll<Option<T>> {
    self.rx.poll_recv(cx)
  }

  pub fn split(self) -> (UnboundedSender<T>, UnboundedReceiver<T>) {
    (self.tx, self.rx)
  }
}

impl<T> Default for Channel<T> {
  fn default() -> Self {
    Self::new()
  }
}
