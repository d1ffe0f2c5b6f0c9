use std::time::Duration;

use tokio::io::BufReader;
use tokio::time::timeout;

use peerlink::{
    channel::Role,
    event::ConnectionStatus,
    relay::{self, StopReason},
    setup::{self, Mode, Options},
    Error,
};

mod common;

const WAIT: Duration = Duration::from_secs(30);

fn options() -> Options {
    Options {
        timeout: Some(WAIT),
        ..Options::default()
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_direct_relays_console_line() {
    let api = common::api();
    let peer1 = common::session(&api, "peer1").await;
    let peer2 = common::session(&api, "peer2").await;

    let link = setup::establish(&peer1, &peer2, Mode::Direct, &options())
        .await
        .unwrap();
    assert_eq!(peer1.status(), ConnectionStatus::Connected);
    assert_eq!(peer2.status(), ConnectionStatus::Connected);
    assert_eq!(link.publisher.role(), Some(Role::Publish));
    assert_eq!(link.subscriber.role(), Some(Role::Subscribe));
    assert_eq!(link.publisher.id(), link.subscriber.id());
    assert_eq!(link.subscriber.name(), "channel-one-subscribed");

    let mut inbox = link.subscriber.take_inbox().await.unwrap();
    let report = relay::run(
        BufReader::new(&b"hello\nexit\n"[..]),
        tokio::io::sink(),
        &link.publisher,
        std::future::pending(),
    )
    .await
    .unwrap();
    assert_eq!(report.reason, StopReason::Exit);
    assert_eq!(report.sent, 1);

    let received = timeout(WAIT, inbox.recv()).await.unwrap();
    assert_eq!(received.as_deref(), Some("hello"));

    link.close().await;
    assert_eq!(peer1.status(), ConnectionStatus::Closed);
    assert_eq!(peer2.status(), ConnectionStatus::Closed);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_direct_system_channel_greets_peer() {
    let api = common::api();
    let peer1 = common::session(&api, "peer1").await;
    let peer2 = common::session(&api, "peer2").await;

    let link = setup::establish(&peer1, &peer2, Mode::Direct, &options())
        .await
        .unwrap();
    assert_eq!(link.system_channels().len(), 2);

    let announced = timeout(WAIT, async {
        loop {
            let found = peer2
                .inbound_channels()
                .await
                .into_iter()
                .find(|c| c.name() == "server-events");
            if let Some(channel) = found {
                return channel;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    })
    .await
    .unwrap();

    let mut inbox = announced.take_inbox().await.unwrap();
    let greeting = timeout(WAIT, inbox.recv()).await.unwrap();
    assert_eq!(greeting.as_deref(), Some("Hello from peer1!"));

    link.close().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_negotiated_id_clashing_with_in_band_channel() {
    let api = common::api();
    let peer1 = common::session(&api, "peer1").await;
    let peer2 = common::session(&api, "peer2").await;

    let link = setup::establish(&peer1, &peer2, Mode::Direct, &options())
        .await
        .unwrap();
    let system = &link.system_channels()[0];
    timeout(WAIT, system.wait_open()).await.unwrap();
    let id = system.id();

    let err = peer1
        .create_negotiated_channel("clash", id, Role::Publish, None)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::ChannelIdInUse(taken) if taken == id));

    link.close().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_relay_after_close_drops_lines() {
    let api = common::api();
    let peer1 = common::session(&api, "peer1").await;
    let peer2 = common::session(&api, "peer2").await;

    let link = setup::establish(&peer1, &peer2, Mode::Direct, &options())
        .await
        .unwrap();
    link.close().await;
    // closing twice is harmless
    link.close().await;

    let report = relay::run(
        BufReader::new(&b"late\n"[..]),
        tokio::io::sink(),
        &link.publisher,
        std::future::pending(),
    )
    .await
    .unwrap();
    assert_eq!(report.sent, 0);
    assert_eq!(report.dropped + report.failed, 1);
    assert_eq!(report.reason, StopReason::EndOfInput);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_immediate_exit_sends_nothing() {
    let api = common::api();
    let peer1 = common::session(&api, "peer1").await;
    let peer2 = common::session(&api, "peer2").await;

    let link = setup::establish(&peer1, &peer2, Mode::Direct, &options())
        .await
        .unwrap();
    let mut inbox = link.subscriber.take_inbox().await.unwrap();

    let report = relay::run(
        BufReader::new(&b"exit\nnever sent\n"[..]),
        tokio::io::sink(),
        &link.publisher,
        std::future::pending(),
    )
    .await
    .unwrap();
    assert_eq!(report.reason, StopReason::Exit);
    assert_eq!(report.sent + report.dropped + report.failed, 0);

    link.close().await;
    assert_eq!(peer1.status(), ConnectionStatus::Closed);
    assert!(inbox.try_recv().is_err());
}
