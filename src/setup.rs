//! Brings two sessions from nothing to an open publish/subscribe channel pair.
//!
//! The sequence is the same for both signaling modes:
//!
//! 1. open the system channel on each session
//! 2. negotiate the first session (and, in direct mode, the second with it)
//! 3. wait until it is connected, then publish the channel on it
//! 4. negotiate the second session if not done yet, wait until it is connected
//! 5. subscribe the second session to the published channel
//! 6. wait until both ends of the channel are open
//!
//! Any failure closes both sessions.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};

use crate::allocator::Allocator;
use crate::broker::Broker;
use crate::channel::DataChannel;
use crate::config::Config;
use crate::session::TransportSession;
use crate::signaling::{Brokered, Direct, Signaling};
use crate::{Error, Result};

pub enum Mode {
    /// Both sessions signal each other in memory.
    Direct,
    /// Each session gets its own broker session.
    Brokered(Broker),
}

impl Mode {
    fn parts(self) -> (Box<dyn Signaling>, Allocator) {
        match self {
            Mode::Direct => (Box::new(Direct), Allocator::direct()),
            Mode::Brokered(broker) => (
                Box::new(Brokered::new(broker.clone())),
                Allocator::brokered(broker),
            ),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Options {
    pub channel: String,
    /// In-band channel opened on both sessions before the offer.
    pub system_channel: String,
    pub timeout: Option<Duration>,
}

impl Default for Options {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for Options {
    fn from(cfg: &Config) -> Self {
        Self {
            channel: cfg.channel.name.clone(),
            system_channel: cfg.channel.system.clone(),
            timeout: cfg.setup.timeout(),
        }
    }
}

/// An established pair: `publisher` lives on the first session, `subscriber`
/// on the second, both with the same channel id.
pub struct Link {
    pub publisher: DataChannel,
    pub subscriber: DataChannel,
    system: Vec<DataChannel>,
    sessions: [Arc<TransportSession>; 2],
}

impl Link {
    pub fn sessions(&self) -> &[Arc<TransportSession>; 2] {
        &self.sessions
    }

    pub fn system_channels(&self) -> &[DataChannel] {
        &self.system
    }

    pub async fn close(&self) {
        close_all(&self.sessions).await;
    }
}

pub async fn establish(
    first: &Arc<TransportSession>,
    second: &Arc<TransportSession>,
    mode: Mode,
    opts: &Options,
) -> Result<Link> {
    let sessions = [first.clone(), second.clone()];
    match run(&sessions, mode, opts).await {
        Ok(link) => Ok(link),
        Err(e) => {
            error!("setup failed: {}", e);
            close_all(&sessions).await;
            Err(e)
        }
    }
}

async fn run(sessions: &[Arc<TransportSession>; 2], mode: Mode, opts: &Options) -> Result<Link> {
    let [first, second] = sessions;
    let (signaling, allocator) = mode.parts();

    let mut system = Vec::new();
    for session in sessions {
        system.push(open_system_channel(session, &opts.system_channel).await?);
    }

    let couples = signaling.couples_sessions();
    bounded(
        opts.timeout,
        "negotiation",
        signaling.negotiate(first, couples.then_some(second)),
    )
    .await?;
    if couples {
        bounded(opts.timeout, "ICE gathering", async {
            first.wait_for_ice_gathering_complete().await?;
            second.wait_for_ice_gathering_complete().await?;
            Ok(())
        })
        .await?;
        info!("ICE gathering has finished");
    }

    connect(first, opts.timeout).await?;
    let publisher = allocator.publish(first, &opts.channel).await?;

    if !couples {
        bounded(opts.timeout, "negotiation", signaling.negotiate(second, None)).await?;
    }
    connect(second, opts.timeout).await?;
    let subscriber = allocator
        .subscribe(second, first.handle(), &opts.channel)
        .await?;

    bounded(opts.timeout, "data channel open", async {
        publisher.wait_open().await;
        subscriber.wait_open().await;
        Ok(())
    })
    .await?;
    info!(
        "{} ready: {} -> {} on id {}",
        opts.channel,
        first.label(),
        second.label(),
        publisher.id()
    );

    Ok(Link {
        publisher,
        subscriber,
        system,
        sessions: sessions.clone(),
    })
}

async fn connect(session: &TransportSession, timeout: Option<Duration>) -> Result<()> {
    info!("Waiting for {} to connect", session.label());
    bounded(timeout, "connection", session.wait_for_connected()).await?;
    info!("{} is connected", session.label());
    match session.stats().await {
        Some(snapshot) => info!(
            "{} connected to IP({}) Port({})",
            session.label(),
            snapshot.remote.ip,
            snapshot.remote.port
        ),
        None => warn!("{} has no selected candidate pair yet", session.label()),
    }
    Ok(())
}

/// Opens the in-band system channel and greets the peer once it is open.
async fn open_system_channel(session: &TransportSession, name: &str) -> Result<DataChannel> {
    let channel = session.create_channel(name).await?;
    let greeter = channel.clone();
    let greeting = format!("Hello from {}!", session.label());
    tokio::spawn(async move {
        greeter.wait_open().await;
        if let Err(e) = greeter.send_text(&greeting).await {
            warn!("system channel greeting failed: {}", e);
        }
    });
    Ok(channel)
}

async fn bounded<F, T>(timeout: Option<Duration>, what: &str, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match timeout {
        Some(duration) => tokio::time::timeout(duration, fut)
            .await
            .map_err(|_| Error::Timeout(what.to_string()))?,
        None => fut.await,
    }
}

async fn close_all(sessions: &[Arc<TransportSession>]) {
    for session in sessions {
        if let Err(e) = session.close().await {
            warn!("{} close error: {}", session.label(), e);
        }
    }
}
