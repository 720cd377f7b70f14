//! Zero-capacity acknowledgment hand-off.

use std::sync::Mutex;
use std::time::Duration;

use futures::channel::oneshot;
use log::warn;

use crate::protocol::DecodedFrame;
use crate::registry::lock;
use crate::runtime;

/// Rendezvous between one waiting sender and one arriving acknowledgment.
///
/// Nothing is buffered: an acknowledgment offered while no sender is waiting
/// is dropped. A reply to a command that already timed out is just
/// unsolicited data by the time it arrives.
#[derive(Debug, Default)]
pub struct AckSlot {
    waiter: Mutex<Option<oneshot::Sender<DecodedFrame>>>,
}

impl AckSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register as the waiter before transmitting, so an acknowledgment that
    /// races the send is not lost.
    ///
    /// Callers must hold the endpoint lock so that at most one waiter exists.
    pub fn arm(&self) -> PendingAck<'_> {
        let (tx, rx) = oneshot::channel();
        *lock(&self.waiter) = Some(tx);
        PendingAck { slot: self, rx }
    }

    /// Wait up to `timeout` for an acknowledgment.
    ///
    /// Returns None when the window closes first.
    pub async fn take(&self, timeout: Duration) -> Option<DecodedFrame> {
        self.arm().wait(timeout).await
    }

    /// Hand `frame` to the waiting sender, if there is one.
    ///
    /// Never blocks. Returns false and discards the frame when nobody is
    /// waiting.
    pub fn offer(&self, frame: DecodedFrame) -> bool {
        let Some(tx) = lock(&self.waiter).take() else {
            warn!("Discarding unsolicited frame (command {}): no pending command", frame.command);
            return false;
        };

        match tx.send(frame) {
            Ok(()) => true,
            Err(frame) => {
                warn!("Discarding late frame (command {}): waiter already gone", frame.command);
                false
            }
        }
    }

    /// Whether a sender is currently waiting.
    pub fn is_waiting(&self) -> bool {
        lock(&self.waiter)
            .as_ref()
            .is_some_and(|tx| !tx.is_canceled())
    }
}

/// A registered waiter. Dropping it withdraws from the slot.
#[derive(Debug)]
pub struct PendingAck<'a> {
    slot: &'a AckSlot,
    rx: oneshot::Receiver<DecodedFrame>,
}

impl PendingAck<'_> {
    pub async fn wait(mut self, timeout: Duration) -> Option<DecodedFrame> {
        match runtime::timeout(timeout, &mut self.rx).await {
            Ok(Ok(frame)) => Some(frame),
            _ => None,
        }
    }
}

impl Drop for PendingAck<'_> {
    fn drop(&mut self) {
        // A late offer must find no taker.
        lock(&self.slot.waiter).take();
    }
}
