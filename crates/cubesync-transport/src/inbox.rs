//! Per-connection queue of inbound events.

use tokio::sync::mpsc::{self, error::TryRecvError};

use crate::NetworkEvent;

/// Receiving end of a connection's event queue.
///
/// I/O tasks (or the in-memory peer) push events; the core pops them without
/// blocking. Once a `Disconnect` has been reported the inbox is closed and
/// only ever yields `Empty`. A queue whose senders are all gone counts as a
/// disconnect too, so a peer that vanishes without saying goodbye is still
/// reported exactly once.
pub(crate) struct Inbox {
    rx: mpsc::UnboundedReceiver<NetworkEvent>,
    closed: bool,
}

impl Inbox {
    pub(crate) fn new(rx: mpsc::UnboundedReceiver<NetworkEvent>) -> Self {
        Self { rx, closed: false }
    }

    pub(crate) fn pop(&mut self) -> NetworkEvent {
        if self.closed {
            return NetworkEvent::Empty;
        }
        match self.rx.try_recv() {
            Ok(NetworkEvent::Disconnect) | Err(TryRecvError::Disconnected) => {
                self.close();
                NetworkEvent::Disconnect
            }
            Ok(event) => event,
            Err(TryRecvError::Empty) => NetworkEvent::Empty,
        }
    }

    pub(crate) fn close(&mut self) {
        self.closed = true;
        self.rx.close();
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed
    }
}
