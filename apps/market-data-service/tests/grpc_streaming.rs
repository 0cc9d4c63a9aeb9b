//! gRPC Streaming Integration Tests
//!
//! Runs the synthetic feed through the broadcaster into a live gRPC server
//! and checks what remote callers receive.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tonic::transport::Channel;

use market_data_service::{
    Broadcaster, FeedSource, MarketDataStreamerService, StreamerConfig, SyntheticFeed,
    SyntheticFeedConfig,
    proto::{TickerSubscription, market_data_streamer_client::MarketDataStreamerClient},
};

const TEST_INTERVAL: Duration = Duration::from_millis(20);

struct TestServer {
    client: MarketDataStreamerClient<Channel>,
    broadcaster: Arc<Broadcaster>,
    cancel: CancellationToken,
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Start the feed, broadcaster and gRPC server on a random port.
async fn setup_test_server(symbols: &[&str]) -> TestServer {
    let cancel = CancellationToken::new();
    let broadcaster = Broadcaster::new(256);

    let feed: Arc<dyn FeedSource> = Arc::new(SyntheticFeed::new(
        SyntheticFeedConfig::new(symbols.iter().copied(), TEST_INTERVAL).with_seed(7),
    ));
    tokio::spawn(Arc::clone(&broadcaster).run(feed, cancel.clone()));

    let service = MarketDataStreamerService::new(
        StreamerConfig {
            fixed_spread: Decimal::TEN,
        },
        Arc::clone(&broadcaster),
    );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(service.serve(listener, cancel.clone()));

    tokio::time::sleep(Duration::from_millis(50)).await;

    let client = MarketDataStreamerClient::connect(format!("http://{addr}"))
        .await
        .expect("Failed to connect to test server");

    TestServer {
        client,
        broadcaster,
        cancel,
    }
}

fn subscription(symbol: &str) -> TickerSubscription {
    TickerSubscription {
        symbol: symbol.to_string(),
    }
}

#[tokio::test]
async fn unfiltered_stream_carries_every_symbol_with_spread() {
    let mut server = setup_test_server(&["BTCUSDT", "ETHUSDT"]).await;

    let mut stream = server
        .client
        .stream_tickers(subscription(""))
        .await
        .unwrap()
        .into_inner();

    let mut seen = HashSet::new();
    for _ in 0..20 {
        let update = timeout(Duration::from_secs(2), stream.message())
            .await
            .expect("timed out waiting for update")
            .unwrap()
            .expect("stream ended early");

        assert!((update.bid_price - (update.last_price - 5.0)).abs() < 1e-6);
        assert!((update.ask_price - (update.last_price + 5.0)).abs() < 1e-6);
        assert!(update.last_price >= 0.0);
        assert!(update.ts_unix_ms > 0);
        seen.insert(update.symbol);

        if seen.len() == 2 {
            break;
        }
    }

    assert!(seen.contains("BTCUSDT"));
    assert!(seen.contains("ETHUSDT"));
}

#[tokio::test]
async fn filtered_streams_are_isolated() {
    let mut server = setup_test_server(&["BTCUSDT", "ETHUSDT"]).await;

    let mut btc = server
        .client
        .stream_tickers(subscription("btcusdt"))
        .await
        .unwrap()
        .into_inner();
    let mut eth = server
        .client
        .stream_tickers(subscription("ETHUSDT"))
        .await
        .unwrap()
        .into_inner();

    for _ in 0..5 {
        let update = timeout(Duration::from_secs(2), btc.message())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(update.symbol, "BTCUSDT");

        let update = timeout(Duration::from_secs(2), eth.message())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(update.symbol, "ETHUSDT");
    }
}

#[tokio::test]
async fn partial_symbol_matches_nothing() {
    let mut server = setup_test_server(&["BTCUSDT"]).await;

    let mut stream = server
        .client
        .stream_tickers(subscription("BTC"))
        .await
        .unwrap()
        .into_inner();

    let result = timeout(Duration::from_millis(300), stream.message()).await;
    assert!(result.is_err(), "exact-match filter should not receive BTCUSDT");
}

#[tokio::test]
async fn disconnect_releases_subscriber() {
    let mut server = setup_test_server(&["BTCUSDT"]).await;

    let mut stream = server
        .client
        .stream_tickers(subscription(""))
        .await
        .unwrap()
        .into_inner();
    timeout(Duration::from_secs(2), stream.message())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(server.broadcaster.subscriber_count(), 1);

    drop(stream);

    let released = timeout(Duration::from_secs(2), async {
        while server.broadcaster.subscriber_count() > 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(released.is_ok(), "subscriber should be removed after disconnect");
}

#[tokio::test]
async fn shutdown_ends_open_streams() {
    let mut server = setup_test_server(&["BTCUSDT"]).await;

    let mut stream = server
        .client
        .stream_tickers(subscription(""))
        .await
        .unwrap()
        .into_inner();
    timeout(Duration::from_secs(2), stream.message())
        .await
        .unwrap()
        .unwrap()
        .unwrap();

    server.cancel.cancel();

    let ended = timeout(Duration::from_secs(3), async {
        loop {
            match stream.message().await {
                Ok(Some(_)) => {}
                Ok(None) | Err(_) => break,
            }
        }
    })
    .await;
    assert!(ended.is_ok(), "stream should terminate after shutdown");
}
