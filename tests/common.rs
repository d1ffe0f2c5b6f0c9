#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicU16, AtomicUsize, Ordering};
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::post,
    Json, Router,
};
use serde_json::{json, Value};
use tokio::{net::TcpListener, sync::Mutex};
use webrtc::{
    api::{setting_engine::SettingEngine, API},
    data_channel::{
        data_channel_init::RTCDataChannelInit, data_channel_message::DataChannelMessage,
        data_channel_state::RTCDataChannelState, RTCDataChannel,
    },
    ice::network_type::NetworkType,
    peer_connection::{
        configuration::RTCConfiguration, sdp::session_description::RTCSessionDescription,
        RTCPeerConnection,
    },
};

use peerlink::{engine, event::ConnectionStatus, session::TransportSession};

/// First id the mock hands out, clear of in-band channel ids.
pub const FIRST_CHANNEL_ID: u16 = 100;

/// Host candidates on loopback only need to reach each other in this process.
pub fn api() -> API {
    let mut setting_engine = SettingEngine::default();
    setting_engine.set_include_loopback_candidate(true);
    setting_engine.set_network_types(vec![NetworkType::Udp4]);
    engine::build_api(setting_engine).unwrap()
}

pub async fn session(api: &API, label: &str) -> Arc<TransportSession> {
    TransportSession::new(api, RTCConfiguration::default(), label)
        .await
        .unwrap()
}

/// Collects every status a session goes through until it is closed.
pub fn record_statuses(
    session: &TransportSession,
) -> tokio::task::JoinHandle<Vec<ConnectionStatus>> {
    let mut rx = session.watch_status();
    tokio::spawn(async move {
        let mut seen = vec![*rx.borrow_and_update()];
        while rx.changed().await.is_ok() {
            let status = *rx.borrow_and_update();
            seen.push(status);
            if status == ConnectionStatus::Closed {
                break;
            }
        }
        seen
    })
}

type Key = (String, String);
type Reply = Result<(StatusCode, Json<Value>), (StatusCode, String)>;

/// An in-process stand-in for the SFU: answers offers with its own peer
/// connections, allocates channel ids and forwards published messages to
/// subscribers.
pub struct MockSfu {
    api: API,
    reject: Option<StatusCode>,
    next_id: AtomicU16,
    pub session_requests: AtomicUsize,
    peers: Mutex<HashMap<String, Arc<RTCPeerConnection>>>,
    published: Mutex<HashMap<Key, u16>>,
    subscribers: Arc<Mutex<HashMap<Key, Vec<Arc<RTCDataChannel>>>>>,
    channels: Mutex<Vec<Arc<RTCDataChannel>>>,
}

impl MockSfu {
    pub fn new(reject: Option<StatusCode>) -> Arc<Self> {
        Arc::new(Self {
            api: api(),
            reject,
            next_id: AtomicU16::new(FIRST_CHANNEL_ID),
            session_requests: AtomicUsize::new(0),
            peers: Mutex::new(HashMap::new()),
            published: Mutex::new(HashMap::new()),
            subscribers: Arc::new(Mutex::new(HashMap::new())),
            channels: Mutex::new(Vec::new()),
        })
    }

    pub async fn serve(self: &Arc<Self>) -> String {
        let router = Router::new()
            .route("/apps/:app/sessions/new", post(new_session))
            .route(
                "/apps/:app/sessions/:session/datachannels/new",
                post(new_data_channels),
            )
            .with_state(self.clone());
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, router).await.unwrap() });
        format!("http://{addr}")
    }

    pub async fn close(&self) {
        for pc in self.peers.lock().await.values() {
            let _ = pc.close().await;
        }
    }
}

fn fail(e: impl std::fmt::Display) -> (StatusCode, String) {
    (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
}

async fn new_session(
    State(sfu): State<Arc<MockSfu>>,
    Path(_app): Path<String>,
    Json(body): Json<Value>,
) -> Reply {
    sfu.session_requests.fetch_add(1, Ordering::SeqCst);
    if let Some(status) = sfu.reject {
        return Err((status, "rejected by mock".to_string()));
    }
    let sdp = body["sessionDescription"]["sdp"]
        .as_str()
        .ok_or((StatusCode::BAD_REQUEST, "missing sdp".to_string()))?
        .to_string();

    let pc = Arc::new(
        sfu.api
            .new_peer_connection(RTCConfiguration::default())
            .await
            .map_err(fail)?,
    );
    pc.set_remote_description(RTCSessionDescription::offer(sdp).map_err(fail)?)
        .await
        .map_err(fail)?;
    let answer = pc.create_answer(None).await.map_err(fail)?;
    let mut gathered = pc.gathering_complete_promise().await;
    pc.set_local_description(answer).await.map_err(fail)?;
    let _ = gathered.recv().await;
    let local = pc
        .local_description()
        .await
        .ok_or_else(|| fail("no local description"))?;

    let session_id = uuid::Uuid::new_v4().to_string();
    sfu.peers.lock().await.insert(session_id.clone(), pc);
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "sessionId": session_id,
            "sessionDescription": { "type": "answer", "sdp": local.sdp }
        })),
    ))
}

async fn negotiated(
    pc: &Arc<RTCPeerConnection>,
    label: &str,
    id: u16,
) -> Result<Arc<RTCDataChannel>, (StatusCode, String)> {
    pc.create_data_channel(
        label,
        Some(RTCDataChannelInit {
            negotiated: Some(id),
            ..Default::default()
        }),
    )
    .await
    .map_err(fail)
}

async fn new_data_channels(
    State(sfu): State<Arc<MockSfu>>,
    Path((_app, session_id)): Path<(String, String)>,
    Json(body): Json<Value>,
) -> Reply {
    let pc = sfu
        .peers
        .lock()
        .await
        .get(&session_id)
        .cloned()
        .ok_or((StatusCode::NOT_FOUND, "unknown session".to_string()))?;

    let mut allocated = Vec::new();
    for channel in body["dataChannels"].as_array().cloned().unwrap_or_default() {
        let name = channel["dataChannelName"]
            .as_str()
            .unwrap_or_default()
            .to_string();
        let location = channel["location"].as_str().unwrap_or_default().to_string();
        let id = match location.as_str() {
            "local" => {
                let id = sfu.next_id.fetch_add(1, Ordering::SeqCst);
                let key = (session_id.clone(), name.clone());
                sfu.published.lock().await.insert(key.clone(), id);

                let dc = negotiated(&pc, &name, id).await?;
                let subscribers = sfu.subscribers.clone();
                dc.on_message(Box::new(move |msg: DataChannelMessage| {
                    let subscribers = subscribers.clone();
                    let key = key.clone();
                    Box::pin(async move {
                        let text = String::from_utf8_lossy(&msg.data).to_string();
                        let subscribers = subscribers.lock().await;
                        for sub in subscribers.get(&key).into_iter().flatten() {
                            if sub.ready_state() == RTCDataChannelState::Open {
                                let _ = sub.send_text(text.clone()).await;
                            }
                        }
                    })
                }));
                sfu.channels.lock().await.push(dc);
                id
            }
            "remote" => {
                let publisher = channel["sessionId"].as_str().unwrap_or_default().to_string();
                let key = (publisher, name.clone());
                let id = sfu
                    .published
                    .lock()
                    .await
                    .get(&key)
                    .copied()
                    .ok_or((StatusCode::NOT_FOUND, format!("{name} is not published")))?;
                let dc = negotiated(&pc, &format!("{name}-forward"), id).await?;
                sfu.subscribers
                    .lock()
                    .await
                    .entry(key)
                    .or_default()
                    .push(dc);
                id
            }
            other => return Err((StatusCode::BAD_REQUEST, format!("bad location {other}"))),
        };
        allocated.push(json!({ "location": location, "dataChannelName": name, "id": id }));
    }

    Ok((StatusCode::OK, Json(json!({ "dataChannels": allocated }))))
}
