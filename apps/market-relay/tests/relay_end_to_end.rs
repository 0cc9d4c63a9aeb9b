//! Relay End-to-End Tests
//!
//! An in-process market data service (synthetic feed, broadcaster, gRPC
//! server) feeds the relay, and websocket clients join symbol groups on the
//! relay's hub.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use rust_decimal::Decimal;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use market_data_service::{
    Broadcaster, FeedSource, MarketDataStreamerService, StreamerConfig, SyntheticFeed,
    SyntheticFeedConfig,
};
use market_relay::infrastructure::http::serve;
use market_relay::{GroupHub, RelayHttpState, RelayState, UpstreamConfig, UpstreamRelay};

type WsClient =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// Start the upstream service on `listener`. The handle completes once the
/// gRPC server has shut down.
fn start_market_data_service(listener: TcpListener, cancel: &CancellationToken) -> JoinHandle<()> {
    let broadcaster = Broadcaster::new(256);
    let feed: Arc<dyn FeedSource> = Arc::new(SyntheticFeed::new(
        SyntheticFeedConfig::new(["BTCUSDT", "ETHUSDT"], Duration::from_millis(20)).with_seed(3),
    ));
    tokio::spawn(Arc::clone(&broadcaster).run(feed, cancel.clone()));

    let service = MarketDataStreamerService::new(
        StreamerConfig {
            fixed_spread: Decimal::TEN,
        },
        broadcaster,
    );
    let cancel = cancel.clone();
    tokio::spawn(async move {
        let _ = service.serve(listener, cancel).await;
    })
}

/// Start the relay loop and its HTTP surface. Returns the HTTP address.
async fn start_relay(
    upstream: SocketAddr,
    delay: Duration,
    cancel: &CancellationToken,
) -> (SocketAddr, Arc<RelayState>, Arc<GroupHub>) {
    let hub = GroupHub::new(64);
    let relay_state = RelayState::new();
    let relay = UpstreamRelay::new(
        &UpstreamConfig {
            url: format!("http://{upstream}"),
            reconnect_delay: delay,
        },
        hub.clone(),
        Arc::clone(&relay_state),
    )
    .unwrap();
    tokio::spawn(relay.run(cancel.clone()));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let state = Arc::new(RelayHttpState::new(
        Arc::clone(&hub),
        Arc::clone(&relay_state),
        cancel.clone(),
    ));
    tokio::spawn(serve(listener, state));

    (addr, relay_state, hub)
}

async fn connect_client(addr: SocketAddr) -> WsClient {
    let (ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/hubs/market"))
        .await
        .expect("hub connection failed");
    ws
}

async fn next_event(ws: &mut WsClient) -> serde_json::Value {
    loop {
        let msg = timeout(Duration::from_secs(3), ws.next())
            .await
            .expect("timed out waiting for hub event")
            .expect("hub closed")
            .unwrap();
        if let Message::Text(text) = msg {
            return serde_json::from_str(text.as_str()).unwrap();
        }
    }
}

/// Next non-ticker event. Updates may overtake the reply to a join.
async fn next_reply(ws: &mut WsClient) -> serde_json::Value {
    loop {
        let event = next_event(ws).await;
        if event["event"] != "tickerUpdate" {
            return event;
        }
    }
}

/// Discard everything already queued for the client.
async fn drain(ws: &mut WsClient) {
    while let Ok(Some(_)) = timeout(Duration::from_millis(150), ws.next()).await {}
}

async fn send(ws: &mut WsClient, body: &str) {
    ws.send(Message::Text(body.to_string().into())).await.unwrap();
}

#[tokio::test]
async fn joined_client_receives_only_its_group() {
    let cancel = CancellationToken::new();
    let upstream = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let upstream_addr = upstream.local_addr().unwrap();
    let _service = start_market_data_service(upstream, &cancel);

    let (addr, relay_state, _hub) =
        start_relay(upstream_addr, Duration::from_millis(100), &cancel).await;

    let mut btc = connect_client(addr).await;
    send(&mut btc, r#"{"type":"join","symbol":"btcusdt"}"#).await;
    let joined = next_reply(&mut btc).await;
    assert_eq!(joined["event"], "joined");
    assert_eq!(joined["symbol"], "BTCUSDT");

    for _ in 0..5 {
        let event = next_event(&mut btc).await;
        assert_eq!(event["event"], "tickerUpdate");
        assert_eq!(event["data"]["symbol"], "BTCUSDT");
        let last = event["data"]["lastPrice"].as_f64().unwrap();
        let bid = event["data"]["bidPrice"].as_f64().unwrap();
        let ask = event["data"]["askPrice"].as_f64().unwrap();
        assert!((bid - (last - 5.0)).abs() < 1e-6);
        assert!((ask - (last + 5.0)).abs() < 1e-6);
    }

    assert!(relay_state.is_connected());
    cancel.cancel();
}

#[tokio::test]
async fn leave_stops_updates_and_disconnect_clears_groups() {
    let cancel = CancellationToken::new();
    let upstream = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let upstream_addr = upstream.local_addr().unwrap();
    let _service = start_market_data_service(upstream, &cancel);

    let (addr, _relay_state, hub) =
        start_relay(upstream_addr, Duration::from_millis(100), &cancel).await;

    let mut client = connect_client(addr).await;
    send(&mut client, r#"{"type":"join","symbol":"ETHUSDT"}"#).await;
    assert_eq!(next_reply(&mut client).await["event"], "joined");
    assert_eq!(next_event(&mut client).await["event"], "tickerUpdate");

    send(&mut client, r#"{"type":"leave","symbol":"ethusdt"}"#).await;
    let left = next_reply(&mut client).await;
    assert_eq!(left["event"], "left");
    assert_eq!(left["symbol"], "ETHUSDT");

    send(&mut client, r#"{"type":"ping"}"#).await;
    assert_eq!(next_event(&mut client).await["event"], "pong");

    send(&mut client, r#"{"type":"join","symbol":"BTCUSDT"}"#).await;
    assert_eq!(next_reply(&mut client).await["event"], "joined");
    assert_eq!(hub.group_count(), 1);

    client.close(None).await.unwrap();
    drop(client);

    let cleared = timeout(Duration::from_secs(2), async {
        while hub.connection_count() > 0 || hub.group_count() > 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(cleared.is_ok(), "disconnect should leave every group");
    cancel.cancel();
}

#[tokio::test]
async fn relay_connects_once_upstream_appears() {
    let cancel = CancellationToken::new();

    // Reserve an address, then free it so the first attempts are refused
    let reserved = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let upstream_addr = reserved.local_addr().unwrap();
    drop(reserved);

    let (_addr, relay_state, hub) =
        start_relay(upstream_addr, Duration::from_millis(100), &cancel).await;

    timeout(Duration::from_secs(3), async {
        while relay_state.reconnect_attempts() == 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("relay never retried");
    assert!(!relay_state.is_connected());

    let upstream = TcpListener::bind(upstream_addr).await.unwrap();
    let _service = start_market_data_service(upstream, &cancel);

    timeout(Duration::from_secs(5), async {
        while relay_state.updates_relayed() == 0 {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("relay did not resume after upstream started");

    assert!(relay_state.is_connected());
    assert!(!hub.latest_tickers().is_empty());
    cancel.cancel();
}

#[tokio::test]
async fn relay_resumes_after_upstream_restart() {
    let cancel = CancellationToken::new();
    let upstream = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let upstream_addr = upstream.local_addr().unwrap();
    let first_run = CancellationToken::new();
    let service = start_market_data_service(upstream, &first_run);

    let (addr, relay_state, _hub) =
        start_relay(upstream_addr, Duration::from_millis(100), &cancel).await;

    let mut client = connect_client(addr).await;
    send(&mut client, r#"{"type":"join","symbol":"BTCUSDT"}"#).await;
    assert_eq!(next_reply(&mut client).await["event"], "joined");
    assert_eq!(next_event(&mut client).await["event"], "tickerUpdate");
    assert_eq!(relay_state.reconnect_attempts(), 0);

    // Stop the upstream mid-stream
    first_run.cancel();
    timeout(Duration::from_secs(3), service)
        .await
        .expect("upstream did not shut down")
        .unwrap();

    timeout(Duration::from_secs(3), async {
        while relay_state.reconnect_attempts() == 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("relay did not notice the lost stream");
    drain(&mut client).await;
    let relayed_before = relay_state.updates_relayed();

    let upstream = TcpListener::bind(upstream_addr).await.unwrap();
    let _service = start_market_data_service(upstream, &cancel);

    let event = next_event(&mut client).await;
    assert_eq!(event["event"], "tickerUpdate");
    assert_eq!(event["data"]["symbol"], "BTCUSDT");
    assert!(relay_state.updates_relayed() > relayed_before);
    assert!(relay_state.reconnect_attempts() >= 1);
    assert!(relay_state.is_connected());
    cancel.cancel();
}
