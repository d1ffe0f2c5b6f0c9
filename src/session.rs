use std::collections::HashSet;
use std::sync::{Arc, OnceLock};

use tokio::sync::{mpsc, watch, Mutex};
use tracing::{debug, info, warn};
use webrtc::{
    api::API,
    data_channel::{data_channel_init::RTCDataChannelInit, RTCDataChannel},
    ice_transport::{
        ice_candidate::{RTCIceCandidate, RTCIceCandidateInit},
        ice_connection_state::RTCIceConnectionState,
    },
    peer_connection::{
        configuration::RTCConfiguration, peer_connection_state::RTCPeerConnectionState,
        sdp::sdp_type::RTCSdpType, sdp::session_description::RTCSessionDescription,
        RTCPeerConnection,
    },
};

use crate::channel::{Binding, ChannelState, DataChannel, Role};
use crate::event::{ConnectionStatus, GatheringTracker, StatusCell};
use crate::stats::{self, StatsSnapshot};
use crate::{Error, Result, SdpType, SessionDescriptor};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Offerer,
    Answerer,
}

#[derive(Debug, Default)]
struct Negotiation {
    side: Option<Side>,
    created: bool,
    local_set: bool,
    remote_set: bool,
    closed: bool,
}

/// One relay-only peer connection plus everything needed to drive it
/// sequentially: waitable gathering, monotonic connection status and the
/// channels created on it.
pub struct TransportSession {
    id: String,
    label: String,
    peer: Arc<RTCPeerConnection>,
    status: Arc<StatusCell>,
    gathering: Arc<GatheringTracker<RTCIceCandidateInit>>,
    negotiation: Mutex<Negotiation>,
    negotiated_ids: Mutex<HashSet<u16>>,
    channels: Mutex<Vec<DataChannel>>,
    inbound: Arc<Mutex<Vec<DataChannel>>>,
    broker_id: OnceLock<String>,
}

impl TransportSession {
    /// Creates the peer connection and registers every engine handler before
    /// any description is applied, so no candidate or state change is missed.
    pub async fn new(
        api: &API,
        config: RTCConfiguration,
        label: impl Into<String>,
    ) -> Result<Arc<Self>> {
        let label = label.into();
        let id = uuid::Uuid::new_v4().to_string();
        let peer = Arc::new(api.new_peer_connection(config).await?);
        let status = Arc::new(StatusCell::new());
        let gathering = Arc::new(GatheringTracker::new());
        let inbound = Arc::new(Mutex::new(Vec::new()));

        {
            let gathering = gathering.clone();
            let label = label.clone();
            peer.on_ice_candidate(Box::new(move |candidate: Option<RTCIceCandidate>| {
                let gathering = gathering.clone();
                let label = label.clone();
                Box::pin(async move {
                    let candidate = match candidate {
                        Some(candidate) => match candidate.to_json() {
                            Ok(init) => {
                                debug!("{} gathered candidate: {}", label, init.candidate);
                                Some(init)
                            }
                            Err(e) => {
                                warn!("{} dropped unserializable candidate: {}", label, e);
                                return;
                            }
                        },
                        None => {
                            info!("{} ICE gathering complete", label);
                            None
                        }
                    };
                    gathering.on_event(candidate).await;
                })
            }));
        }

        {
            let label = label.clone();
            peer.on_ice_connection_state_change(Box::new(move |state: RTCIceConnectionState| {
                info!("{} ICE connection state has changed: {}", label, state);
                Box::pin(async {})
            }));
        }

        {
            let status = status.clone();
            let label = label.clone();
            peer.on_peer_connection_state_change(Box::new(
                move |state: RTCPeerConnectionState| {
                    info!("{} connection state has changed: {}", label, state);
                    if let Some(next) = ConnectionStatus::from_peer_state(state) {
                        status.advance(next);
                    }
                    Box::pin(async {})
                },
            ));
        }

        {
            let inbound = inbound.clone();
            let label = label.clone();
            let id = id.clone();
            peer.on_data_channel(Box::new(move |dc: Arc<RTCDataChannel>| {
                info!(
                    "{} new data channel from peer: {} id {}",
                    label,
                    dc.label(),
                    dc.id()
                );
                let channel = DataChannel::attach(
                    dc,
                    &label,
                    Binding {
                        session_id: id.clone(),
                        role: None,
                        remote_session_id: None,
                        id: None,
                    },
                );
                let inbound = inbound.clone();
                Box::pin(async move {
                    inbound.lock().await.push(channel);
                })
            }));
        }

        info!("{} session {} created", label, id);
        Ok(Arc::new(Self {
            id,
            label,
            peer,
            status,
            gathering,
            negotiation: Mutex::new(Negotiation::default()),
            negotiated_ids: Mutex::new(HashSet::new()),
            channels: Mutex::new(Vec::new()),
            inbound,
            broker_id: OnceLock::new(),
        }))
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// The id other parties know this session by: the broker-assigned one
    /// when bound, the local one otherwise.
    pub fn handle(&self) -> &str {
        self.broker_id().unwrap_or(&self.id)
    }

    pub fn broker_id(&self) -> Option<&str> {
        self.broker_id.get().map(String::as_str)
    }

    pub fn bind_broker_id(&self, session_id: &str) -> Result<()> {
        match self.broker_id.set(session_id.to_string()) {
            Ok(()) => Ok(()),
            Err(_) if self.broker_id() == Some(session_id) => Ok(()),
            Err(_) => Err(Error::negotiation(format!(
                "{} already bound to broker session {}",
                self.label,
                self.broker_id().unwrap_or_default()
            ))),
        }
    }

    pub fn status(&self) -> ConnectionStatus {
        self.status.get()
    }

    pub fn watch_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.status.subscribe()
    }

    pub async fn create_offer(&self) -> Result<SessionDescriptor> {
        let mut n = self.negotiation.lock().await;
        if n.closed {
            return Err(self.closed_error());
        }
        if n.side.is_some() || n.created {
            return Err(Error::negotiation(format!(
                "{} can only create an offer from a new session",
                self.label
            )));
        }
        let offer = self
            .peer
            .create_offer(None)
            .await
            .map_err(Error::negotiation)?;
        n.side = Some(Side::Offerer);
        n.created = true;
        from_rtc(offer)
    }

    pub async fn create_answer(&self) -> Result<SessionDescriptor> {
        let mut n = self.negotiation.lock().await;
        if n.closed {
            return Err(self.closed_error());
        }
        if n.side != Some(Side::Answerer) || !n.remote_set || n.created {
            return Err(Error::negotiation(format!(
                "{} can only answer after a remote offer",
                self.label
            )));
        }
        let answer = self
            .peer
            .create_answer(None)
            .await
            .map_err(Error::negotiation)?;
        n.created = true;
        from_rtc(answer)
    }

    pub async fn set_local(&self, desc: SessionDescriptor) -> Result<()> {
        let mut n = self.negotiation.lock().await;
        if n.closed {
            return Err(self.closed_error());
        }
        let allowed = match (n.side, desc.kind) {
            (_, _) if n.local_set => false,
            (Some(Side::Offerer), SdpType::Offer) => true,
            (Some(Side::Answerer), SdpType::Answer) => n.remote_set,
            _ => false,
        };
        if !allowed {
            return Err(Error::negotiation(format!(
                "{} cannot apply local {} now",
                self.label, desc.kind
            )));
        }
        self.peer
            .set_local_description(to_rtc(&desc)?)
            .await
            .map_err(Error::negotiation)?;
        n.local_set = true;
        debug!("{} local {} applied", self.label, desc.kind);
        Ok(())
    }

    pub async fn set_remote(&self, desc: SessionDescriptor) -> Result<()> {
        let mut n = self.negotiation.lock().await;
        if n.closed {
            return Err(self.closed_error());
        }
        let side = match (n.side, desc.kind) {
            (_, _) if n.remote_set => None,
            (None, SdpType::Offer) => Some(Side::Answerer),
            (Some(Side::Offerer), SdpType::Answer) if n.local_set => Some(Side::Offerer),
            _ => None,
        };
        let Some(side) = side else {
            return Err(Error::negotiation(format!(
                "{} cannot apply remote {} now",
                self.label, desc.kind
            )));
        };
        self.peer
            .set_remote_description(to_rtc(&desc)?)
            .await
            .map_err(Error::negotiation)?;
        n.side = Some(side);
        n.remote_set = true;
        debug!("{} remote {} applied", self.label, desc.kind);
        Ok(())
    }

    pub async fn local_description(&self) -> Option<SessionDescriptor> {
        self.peer
            .local_description()
            .await
            .and_then(|desc| from_rtc(desc).ok())
    }

    /// Resolves once the gathering terminator has been observed, with the
    /// local description that now carries every gathered candidate.
    pub async fn wait_for_ice_gathering_complete(&self) -> Result<SessionDescriptor> {
        let count = self.gathering.wait().await;
        debug!("{} gathered {} candidates", self.label, count);
        self.local_description()
            .await
            .ok_or_else(|| Error::negotiation(format!("{} has no local description", self.label)))
    }

    pub async fn wait_for_connected(&self) -> Result<()> {
        match self.status.settled().await {
            ConnectionStatus::Connected => Ok(()),
            status => Err(Error::ConnectionFailed {
                session: self.label.clone(),
                status,
            }),
        }
    }

    /// Candidates arriving after close are dropped.
    pub async fn add_remote_candidate(&self, candidate: RTCIceCandidateInit) -> Result<()> {
        if self.negotiation.lock().await.closed {
            debug!("{} is closed, remote candidate ignored", self.label);
            return Ok(());
        }
        self.peer
            .add_ice_candidate(candidate)
            .await
            .map_err(Error::negotiation)
    }

    /// Locally gathered candidates, for trickling to the other side.
    pub async fn take_candidates(&self) -> Option<mpsc::UnboundedReceiver<RTCIceCandidateInit>> {
        self.gathering.take_candidates().await
    }

    /// An in-band channel announced to the peer during negotiation.
    pub async fn create_channel(&self, name: &str) -> Result<DataChannel> {
        if self.negotiation.lock().await.closed {
            return Err(self.closed_error());
        }
        let dc = self.peer.create_data_channel(name, None).await?;
        let channel = DataChannel::attach(
            dc,
            &self.label,
            Binding {
                session_id: self.id.clone(),
                role: None,
                remote_session_id: None,
                id: None,
            },
        );
        self.channels.lock().await.push(channel.clone());
        Ok(channel)
    }

    /// A channel both ends open by an agreed id, without in-band announcement.
    pub async fn create_negotiated_channel(
        &self,
        name: &str,
        id: u16,
        role: Role,
        remote_session_id: Option<&str>,
    ) -> Result<DataChannel> {
        if self.negotiation.lock().await.closed {
            return Err(self.closed_error());
        }
        if self.in_band_id_taken(id).await || !self.negotiated_ids.lock().await.insert(id) {
            return Err(Error::ChannelIdInUse(id));
        }
        let dc = self
            .peer
            .create_data_channel(
                name,
                Some(RTCDataChannelInit {
                    negotiated: Some(id),
                    ..Default::default()
                }),
            )
            .await?;
        info!("{} {} channel {} with id {}", self.label, role, name, id);
        let channel = DataChannel::attach(
            dc,
            &self.label,
            Binding {
                session_id: self.handle().to_string(),
                role: Some(role),
                remote_session_id: remote_session_id.map(str::to_string),
                id: Some(id),
            },
        );
        self.channels.lock().await.push(channel.clone());
        Ok(channel)
    }

    /// Local in-band channels only get their id once the association is up.
    async fn in_band_id_taken(&self, id: u16) -> bool {
        let local = self.channels.lock().await.iter().any(|c| {
            c.role().is_none() && c.state() != ChannelState::Connecting && c.id() == id
        });
        local || self.inbound.lock().await.iter().any(|c| c.id() == id)
    }

    /// Channels the peer announced in-band.
    pub async fn inbound_channels(&self) -> Vec<DataChannel> {
        self.inbound.lock().await.clone()
    }

    /// Best effort, `None` when no nominated pair has succeeded yet.
    pub async fn stats(&self) -> Option<StatsSnapshot> {
        stats::snapshot(&self.peer.get_stats().await)
    }

    /// Closes channels and the peer connection. Safe to call repeatedly.
    pub async fn close(&self) -> Result<()> {
        {
            let mut n = self.negotiation.lock().await;
            if n.closed {
                return Ok(());
            }
            n.closed = true;
        }

        let mut channels: Vec<DataChannel> = self.channels.lock().await.drain(..).collect();
        channels.extend(self.inbound.lock().await.drain(..));
        for channel in channels {
            if let Err(e) = channel.close().await {
                warn!("{} close channel {} error: {}", self.label, channel.name(), e);
            }
        }

        self.peer.close().await?;
        self.status.advance(ConnectionStatus::Closed);
        info!("{} session closed", self.label);
        Ok(())
    }

    fn closed_error(&self) -> Error {
        Error::negotiation(format!("{} is closed", self.label))
    }
}

fn to_rtc(desc: &SessionDescriptor) -> Result<RTCSessionDescription> {
    match desc.kind {
        SdpType::Offer => RTCSessionDescription::offer(desc.sdp.clone()),
        SdpType::Answer => RTCSessionDescription::answer(desc.sdp.clone()),
    }
    .map_err(Error::negotiation)
}

fn from_rtc(desc: RTCSessionDescription) -> Result<SessionDescriptor> {
    match desc.sdp_type {
        RTCSdpType::Offer => Ok(SessionDescriptor::offer(desc.sdp)),
        RTCSdpType::Answer => Ok(SessionDescriptor::answer(desc.sdp)),
        other => Err(Error::negotiation(format!("unsupported sdp type {other}"))),
    }
}
