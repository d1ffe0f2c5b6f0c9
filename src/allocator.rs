use std::collections::HashMap;

use tokio::sync::Mutex;
use tracing::info;

use crate::broker::Broker;
use crate::channel::{DataChannel, Role};
use crate::session::TransportSession;
use crate::{Error, Result};

/// First id handed out when no broker assigns them. Ids below this are left
/// to in-band channels.
pub const DIRECT_CHANNEL_ID_BASE: u16 = 128;

/// Channel ids agreed locally, keyed by publishing session and channel name.
#[derive(Debug, Default)]
pub struct DirectIds {
    assigned: Mutex<HashMap<(String, String), u16>>,
}

impl DirectIds {
    pub async fn assign(&self, publisher: &str, name: &str) -> Result<u16> {
        let mut assigned = self.assigned.lock().await;
        let key = (publisher.to_string(), name.to_string());
        if let Some(id) = assigned.get(&key) {
            return Ok(*id);
        }
        let id = u16::try_from(assigned.len())
            .ok()
            .and_then(|n| DIRECT_CHANNEL_ID_BASE.checked_add(n))
            .ok_or_else(|| Error::negotiation("no free data channel ids left"))?;
        assigned.insert(key, id);
        Ok(id)
    }

    pub async fn lookup(&self, publisher: &str, name: &str) -> Result<u16> {
        self.assigned
            .lock()
            .await
            .get(&(publisher.to_string(), name.to_string()))
            .copied()
            .ok_or_else(|| Error::UnknownChannel(name.to_string()))
    }
}

/// Hands out pre-negotiated channel ids, either locally or from the broker.
pub enum Allocator {
    Direct(DirectIds),
    Brokered(Broker),
}

impl Allocator {
    pub fn direct() -> Self {
        Allocator::Direct(DirectIds::default())
    }

    pub fn brokered(broker: Broker) -> Self {
        Allocator::Brokered(broker)
    }

    /// Allocates `name` as a channel owned by `session` and opens it there.
    pub async fn publish(&self, session: &TransportSession, name: &str) -> Result<DataChannel> {
        let id = match self {
            Allocator::Direct(ids) => ids.assign(session.handle(), name).await?,
            Allocator::Brokered(broker) => broker.publish(broker_id(session)?, name).await?,
        };
        info!("{} publishes {} as id {}", session.label(), name, id);
        session
            .create_negotiated_channel(name, id, Role::Publish, None)
            .await
    }

    /// Opens on `session` the counterpart of the channel `name` published by
    /// `remote_session_id`. The local channel is labelled `<name>-subscribed`.
    pub async fn subscribe(
        &self,
        session: &TransportSession,
        remote_session_id: &str,
        name: &str,
    ) -> Result<DataChannel> {
        let id = match self {
            Allocator::Direct(ids) => ids.lookup(remote_session_id, name).await?,
            Allocator::Brokered(broker) => {
                broker
                    .subscribe(broker_id(session)?, remote_session_id, name)
                    .await?
            }
        };
        info!(
            "{} subscribes to {} of {} as id {}",
            session.label(),
            name,
            remote_session_id,
            id
        );
        session
            .create_negotiated_channel(
                &format!("{name}-subscribed"),
                id,
                Role::Subscribe,
                Some(remote_session_id),
            )
            .await
    }
}

fn broker_id(session: &TransportSession) -> Result<&str> {
    session.broker_id().ok_or_else(|| {
        Error::negotiation(format!("{} has no broker session", session.label()))
    })
}

#[cfg(test)]
mod tests {
    use webrtc::peer_connection::configuration::RTCConfiguration;

    use super::*;
    use crate::engine;

    #[tokio::test]
    async fn test_direct_ids_are_stable_per_publisher() {
        let ids = DirectIds::default();
        let first = ids.assign("a", "channel-one").await.unwrap();
        assert_eq!(first, DIRECT_CHANNEL_ID_BASE);
        assert_eq!(ids.assign("a", "channel-one").await.unwrap(), first);
        assert_eq!(ids.assign("a", "other").await.unwrap(), first + 1);
        assert_eq!(ids.assign("b", "channel-one").await.unwrap(), first + 2);

        assert_eq!(ids.lookup("a", "channel-one").await.unwrap(), first);
        assert!(matches!(
            ids.lookup("c", "channel-one").await,
            Err(Error::UnknownChannel(name)) if name == "channel-one"
        ));
    }

    #[tokio::test]
    async fn test_direct_publish_then_subscribe_share_id() {
        let api = engine::default_api().unwrap();
        let a = TransportSession::new(&api, RTCConfiguration::default(), "a")
            .await
            .unwrap();
        let b = TransportSession::new(&api, RTCConfiguration::default(), "b")
            .await
            .unwrap();

        let allocator = Allocator::direct();
        let publisher = allocator.publish(&a, "channel-one").await.unwrap();
        let subscriber = allocator
            .subscribe(&b, a.handle(), "channel-one")
            .await
            .unwrap();

        assert_eq!(publisher.id(), subscriber.id());
        assert_eq!(publisher.role(), Some(Role::Publish));
        assert_eq!(subscriber.role(), Some(Role::Subscribe));
        assert_eq!(subscriber.name(), "channel-one-subscribed");
        assert_eq!(subscriber.remote_session_id(), Some(a.handle()));

        a.close().await.unwrap();
        b.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_subscribe_before_publish() {
        let api = engine::default_api().unwrap();
        let b = TransportSession::new(&api, RTCConfiguration::default(), "b")
            .await
            .unwrap();
        let err = Allocator::direct()
            .subscribe(&b, "nobody", "channel-one")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::UnknownChannel(_)));
        b.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_brokered_requires_broker_session() {
        let api = engine::default_api().unwrap();
        let a = TransportSession::new(&api, RTCConfiguration::default(), "a")
            .await
            .unwrap();
        let broker = Broker::new(
            libcalls::Client::new("http://127.0.0.1:9", "t").unwrap(),
            "app",
        );
        let err = Allocator::brokered(broker)
            .publish(&a, "channel-one")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Negotiation(_)));
        a.close().await.unwrap();
    }
}
