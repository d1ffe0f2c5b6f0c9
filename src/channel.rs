use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};
use webrtc::data_channel::{
    data_channel_message::DataChannelMessage, data_channel_state::RTCDataChannelState,
    RTCDataChannel,
};

use crate::event::Latch;
use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Owns the channel and obtained its id.
    Publish,
    /// References a channel published by another session.
    Subscribe,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Publish => write!(f, "publish"),
            Role::Subscribe => write!(f, "subscribe"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Connecting,
    Open,
    Closed,
    Errored,
}

/// Who a channel belongs to. `role` is `None` for in-band channels that were
/// not allocated as pre-negotiated ones.
#[derive(Debug, Clone)]
pub(crate) struct Binding {
    pub session_id: String,
    pub role: Option<Role>,
    pub remote_session_id: Option<String>,
    pub id: Option<u16>,
}

/// Received messages kept for a reader that may never come.
pub const INBOX_CAPACITY: usize = 64;

/// Queues `text` unless the inbox is full or its reader is gone.
fn deliver(tx: &mpsc::Sender<String>, text: String) -> bool {
    match tx.try_send(text) {
        Ok(()) => true,
        Err(mpsc::error::TrySendError::Full(text)) => {
            debug!("inbox full, not queued: {}", text);
            false
        }
        Err(mpsc::error::TrySendError::Closed(_)) => false,
    }
}

/// A data channel with its open event and incoming messages made awaitable.
#[derive(Clone)]
pub struct DataChannel {
    owner: String,
    binding: Binding,
    inner: Arc<RTCDataChannel>,
    open: Arc<Latch<()>>,
    errored: Arc<AtomicBool>,
    inbox: Arc<Mutex<Option<mpsc::Receiver<String>>>>,
}

impl DataChannel {
    pub(crate) fn attach(inner: Arc<RTCDataChannel>, owner: &str, binding: Binding) -> Self {
        let open = Arc::new(Latch::new());
        let errored = Arc::new(AtomicBool::new(false));
        let (tx, rx) = mpsc::channel(INBOX_CAPACITY);

        let label = format!("{}/{}", owner, inner.label());

        {
            let open = open.clone();
            let label = label.clone();
            inner.on_open(Box::new(move || {
                info!("{} data channel opened", label);
                open.fire(());
                Box::pin(async {})
            }));
        }
        {
            let owner = owner.to_string();
            inner.on_message(Box::new(move |msg: DataChannelMessage| {
                let text = String::from_utf8_lossy(&msg.data).to_string();
                info!("{} received: {}", owner, text);
                deliver(&tx, text);
                Box::pin(async {})
            }));
        }
        {
            let errored = errored.clone();
            let label = label.clone();
            inner.on_error(Box::new(move |err: webrtc::Error| {
                warn!("{} data channel error: {}", label, err);
                errored.store(true, Ordering::SeqCst);
                Box::pin(async {})
            }));
        }
        {
            let label = label.clone();
            inner.on_close(Box::new(move || {
                info!("{} data channel closed", label);
                Box::pin(async {})
            }));
        }

        if inner.ready_state() == RTCDataChannelState::Open {
            open.fire(());
        }

        Self {
            owner: owner.to_string(),
            binding,
            inner,
            open,
            errored,
            inbox: Arc::new(Mutex::new(Some(rx))),
        }
    }

    pub fn name(&self) -> &str {
        self.inner.label()
    }

    pub fn id(&self) -> u16 {
        self.binding.id.unwrap_or_else(|| self.inner.id())
    }

    pub fn role(&self) -> Option<Role> {
        self.binding.role
    }

    /// Handle of the session that created this channel locally.
    pub fn session_id(&self) -> &str {
        &self.binding.session_id
    }

    pub fn remote_session_id(&self) -> Option<&str> {
        self.binding.remote_session_id.as_deref()
    }

    pub fn state(&self) -> ChannelState {
        match self.inner.ready_state() {
            RTCDataChannelState::Open => ChannelState::Open,
            RTCDataChannelState::Closing | RTCDataChannelState::Closed => ChannelState::Closed,
            _ if self.errored.load(Ordering::SeqCst) => ChannelState::Errored,
            _ => ChannelState::Connecting,
        }
    }

    pub fn is_open(&self) -> bool {
        self.state() == ChannelState::Open
    }

    pub async fn wait_open(&self) {
        self.open.wait().await
    }

    /// Checks the ready state before every write.
    pub async fn send_text(&self, text: &str) -> Result<()> {
        if !self.is_open() {
            return Err(Error::ChannelNotOpen(format!("{}/{}", self.owner, self.name())));
        }
        self.inner.send_text(text.to_string()).await?;
        Ok(())
    }

    /// Messages received on this channel. Can be taken once; holds at most
    /// [`INBOX_CAPACITY`] unread messages, later ones are only logged.
    pub async fn take_inbox(&self) -> Option<mpsc::Receiver<String>> {
        self.inbox.lock().await.take()
    }

    pub async fn close(&self) -> Result<()> {
        self.inner.close().await?;
        Ok(())
    }
}

impl fmt::Debug for DataChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataChannel")
            .field("owner", &self.owner)
            .field("name", &self.name())
            .field("id", &self.id())
            .field("role", &self.binding.role)
            .field("state", &self.state())
            .finish()
    }
}
