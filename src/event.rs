//! Bridges the engine's push-style callbacks into values a sequential
//! caller can `.await`.
//!
//! The engine invokes handlers on its own tasks; every primitive here only
//! records the event and wakes waiters, it never blocks the caller that fired it.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::{mpsc, watch, Mutex};
use tracing::trace;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;

/// A one-shot signal. The first `fire` wins, later ones are no-ops.
pub struct Latch<T> {
    tx: watch::Sender<Option<T>>,
}

impl<T: Clone> Latch<T> {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(None);
        Self { tx }
    }

    /// Returns `true` only for the call that actually fired the latch.
    pub fn fire(&self, value: T) -> bool {
        let mut value = Some(value);
        self.tx.send_if_modified(|slot| {
            if slot.is_some() {
                return false;
            }
            *slot = value.take();
            true
        })
    }

    pub fn is_fired(&self) -> bool {
        self.tx.borrow().is_some()
    }

    pub fn value(&self) -> Option<T> {
        self.tx.borrow().clone()
    }

    pub async fn wait(&self) -> T {
        let mut rx = self.tx.subscribe();
        loop {
            let current = rx.borrow_and_update().clone();
            if let Some(value) = current {
                return value;
            }
            // `self` owns the sender, so the channel cannot close under us
            if rx.changed().await.is_err() {
                return std::future::pending().await;
            }
        }
    }
}

impl<T: Clone> Default for Latch<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    New,
    Connecting,
    Connected,
    Failed,
    Closed,
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionStatus::New => "new",
            ConnectionStatus::Connecting => "connecting",
            ConnectionStatus::Connected => "connected",
            ConnectionStatus::Failed => "failed",
            ConnectionStatus::Closed => "closed",
        };
        write!(f, "{s}")
    }
}

impl ConnectionStatus {
    /// Engine states that have no counterpart here (disconnected, unspecified)
    /// are transient and leave the status untouched.
    pub fn from_peer_state(state: RTCPeerConnectionState) -> Option<Self> {
        match state {
            RTCPeerConnectionState::New => Some(ConnectionStatus::New),
            RTCPeerConnectionState::Connecting => Some(ConnectionStatus::Connecting),
            RTCPeerConnectionState::Connected => Some(ConnectionStatus::Connected),
            RTCPeerConnectionState::Failed => Some(ConnectionStatus::Failed),
            RTCPeerConnectionState::Closed => Some(ConnectionStatus::Closed),
            _ => None,
        }
    }

    pub fn is_settled(self) -> bool {
        matches!(
            self,
            ConnectionStatus::Connected | ConnectionStatus::Failed | ConnectionStatus::Closed
        )
    }

    /// The status after observing `next`, or `None` when the move is not allowed.
    /// Once connected, only failed or closed may follow; closed is final.
    pub fn advance(self, next: ConnectionStatus) -> Option<ConnectionStatus> {
        use ConnectionStatus::*;
        match (self, next) {
            (current, next) if current == next => None,
            (Closed, _) => None,
            (Failed, Closed) => Some(Closed),
            (Failed, _) => None,
            (Connected, Failed | Closed) => Some(next),
            (Connected, _) => None,
            (New | Connecting, next) => Some(next),
        }
    }
}

/// Connection status with monotonic transitions and waitable settlement.
pub struct StatusCell {
    tx: watch::Sender<ConnectionStatus>,
}

impl StatusCell {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(ConnectionStatus::New);
        Self { tx }
    }

    pub fn get(&self) -> ConnectionStatus {
        *self.tx.borrow()
    }

    pub fn advance(&self, next: ConnectionStatus) -> bool {
        self.tx.send_if_modified(|current| match current.advance(next) {
            Some(status) => {
                *current = status;
                true
            }
            None => {
                trace!("ignored connection status {} -> {}", current, next);
                false
            }
        })
    }

    pub fn subscribe(&self) -> watch::Receiver<ConnectionStatus> {
        self.tx.subscribe()
    }

    /// Waits until the status is connected, failed or closed.
    pub async fn settled(&self) -> ConnectionStatus {
        let mut rx = self.tx.subscribe();
        loop {
            let current = *rx.borrow_and_update();
            if current.is_settled() {
                return current;
            }
            if rx.changed().await.is_err() {
                return std::future::pending().await;
            }
        }
    }
}

impl Default for StatusCell {
    fn default() -> Self {
        Self::new()
    }
}

/// Tracks ICE candidate gathering. Candidates are queued for trickling until the
/// terminator (`None`) arrives, which closes the queue and fires completion with
/// the number of candidates seen.
pub struct GatheringTracker<C> {
    tx: Mutex<Option<mpsc::UnboundedSender<C>>>,
    rx: Mutex<Option<mpsc::UnboundedReceiver<C>>>,
    gathered: AtomicUsize,
    complete: Latch<usize>,
}

impl<C> GatheringTracker<C> {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx: Mutex::new(Some(tx)),
            rx: Mutex::new(Some(rx)),
            gathered: AtomicUsize::new(0),
            complete: Latch::new(),
        }
    }

    pub async fn on_event(&self, candidate: Option<C>) {
        let mut tx = self.tx.lock().await;
        match candidate {
            Some(candidate) => match tx.as_ref() {
                Some(sender) => {
                    self.gathered.fetch_add(1, Ordering::SeqCst);
                    // nobody trickling (brokered mode) is fine
                    let _ = sender.send(candidate);
                }
                None => trace!("candidate after gathering complete, ignored"),
            },
            None => {
                tx.take();
                if !self.complete.fire(self.gathered.load(Ordering::SeqCst)) {
                    trace!("repeated gathering terminator, ignored");
                }
            }
        }
    }

    /// The trickle queue. Can be taken once.
    pub async fn take_candidates(&self) -> Option<mpsc::UnboundedReceiver<C>> {
        self.rx.lock().await.take()
    }

    pub fn is_complete(&self) -> bool {
        self.complete.is_fired()
    }

    /// Resolves with the number of gathered candidates once gathering completes.
    pub async fn wait(&self) -> usize {
        self.complete.wait().await
    }
}

impl<C> Default for GatheringTracker<C> {
    fn default() -> Self {
        Self::new()
    }
}
