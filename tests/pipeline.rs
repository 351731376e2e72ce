//! Loopback scenarios across the two stages: fan-out byte ordering,
//! upstream reconnect, and the full frames-to-bars path.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio::time::{sleep, timeout};

use tickgate::exchange::server::FanoutServer;
use tickgate::gateway::{
    aggregator,
    store::BarStore,
    upstream::{UpstreamClient, UpstreamConfig},
    GatewayStats,
};
use tickgate::models::Tick;
use tickgate::ring::Ring;
use tickgate::{wire, DEFAULT_SECRET};

fn tick(symbol: &str, ts: i64, high: f64, low: f64, close: f64, volume: i64) -> Tick {
    Tick {
        symbol: symbol.to_string(),
        open: 1.17,
        high,
        low,
        close,
        volume,
        ts,
    }
}

async fn wait_for(mut cond: impl FnMut() -> bool, what: &str) {
    for _ in 0..200 {
        if cond() {
            return;
        }
        sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {what}");
}

/// Every subscriber sees the exact concatenation of the broadcast frames,
/// in broadcast order, with no partial frames.
#[tokio::test]
async fn subscribers_receive_identical_ordered_bytes() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = FanoutServer::new(64);
    tokio::spawn(server.clone().run(listener));

    let mut c1 = TcpStream::connect(addr).await.unwrap();
    let mut c2 = TcpStream::connect(addr).await.unwrap();
    {
        let server = server.clone();
        wait_for(move || server.session_count() == 2, "both sessions").await;
    }

    let bodies = [
        tick("S0001", 1000, 1.171, 1.169, 1.170, 10).to_wire_json(),
        tick("S0002", 1000, 1.181, 1.179, 1.180, 20).to_wire_json(),
        tick("S0001", 1001, 1.172, 1.168, 1.171, 30).to_wire_json(),
    ];
    let mut expected = String::new();
    for body in &bodies {
        server.broadcast(&wire::sign_frame(DEFAULT_SECRET, body));
        expected.push_str(&wire::encode(DEFAULT_SECRET, body));
    }

    for client in [&mut c1, &mut c2] {
        let mut buf = vec![0u8; expected.len()];
        timeout(Duration::from_secs(2), client.read_exact(&mut buf))
            .await
            .expect("read timed out")
            .unwrap();
        assert_eq!(String::from_utf8(buf).unwrap(), expected);
    }
}

/// A client started with no server up keeps retrying, connects once the
/// server appears, and the first frame reaches the ring within 2 s.
#[tokio::test]
async fn upstream_client_reconnects_and_delivers() {
    // Grab a port, then free it so the first connect attempts fail.
    let probe = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = probe.local_addr().unwrap();
    drop(probe);

    let ring: Arc<Ring<Tick>> = Arc::new(Ring::with_capacity(1024));
    let stats = Arc::new(GatewayStats::default());
    let client = UpstreamClient::new(
        UpstreamConfig {
            host: "127.0.0.1".to_string(),
            port: addr.port(),
            secret: DEFAULT_SECRET.to_string(),
            backoff: Duration::from_millis(100),
        },
        ring.clone(),
        stats.clone(),
    );
    tokio::spawn(client.run());

    // Let at least one connect attempt fail before the server exists.
    sleep(Duration::from_millis(300)).await;

    let listener = TcpListener::bind(addr).await.unwrap();
    let (mut sock, _) = timeout(Duration::from_secs(2), listener.accept())
        .await
        .expect("client did not reconnect")
        .unwrap();

    let t = tick("S0001", 1000, 1.171, 1.169, 1.170, 10);
    sock.write_all(wire::encode(DEFAULT_SECRET, &t.to_wire_json()).as_bytes())
        .await
        .unwrap();

    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    let received = loop {
        if let Some(t) = ring.pop() {
            break t;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "frame never reached the ring"
        );
        sleep(Duration::from_millis(10)).await;
    };
    assert_eq!(received, t);
}

/// Full Stage-A→Stage-B data plane: broadcast frames flow through a real
/// socket into the ring, the aggregator closes a bar on timestamp advance,
/// and the bar lands in both the store and the push channel.
#[tokio::test]
async fn frames_flow_from_feed_to_closed_bars() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = FanoutServer::new(64);
    tokio::spawn(server.clone().run(listener));

    let ring: Arc<Ring<Tick>> = Arc::new(Ring::with_capacity(1024));
    let stats = Arc::new(GatewayStats::default());
    let store = Arc::new(BarStore::open(":memory:").unwrap());
    let (bar_tx, mut bar_rx) = broadcast::channel(64);
    let _consumer =
        aggregator::spawn_consumer(ring.clone(), store.clone(), bar_tx, stats.clone()).unwrap();

    let client = UpstreamClient::new(
        UpstreamConfig {
            host: "127.0.0.1".to_string(),
            port: addr.port(),
            secret: DEFAULT_SECRET.to_string(),
            backoff: Duration::from_millis(100),
        },
        ring,
        stats.clone(),
    );
    tokio::spawn(client.run());
    {
        let server = server.clone();
        wait_for(move || server.session_count() == 1, "gateway session").await;
    }

    for t in [
        tick("S0001", 1000, 1.1, 1.0, 1.05, 10),
        tick("S0001", 1000, 1.2, 0.9, 1.10, 20),
        tick("S0002", 1001, 1.0, 1.0, 1.00, 1),
    ] {
        server.broadcast(&wire::sign_frame(DEFAULT_SECRET, &t.to_wire_json()));
    }

    let bar = timeout(Duration::from_secs(2), bar_rx.recv())
        .await
        .expect("no bar emitted")
        .unwrap();
    assert_eq!(bar.symbol, "S0001");
    assert_eq!(bar.ts, 1000);
    assert_eq!(bar.open, 1.05);
    assert_eq!(bar.high, 1.2);
    assert_eq!(bar.low, 0.9);
    assert_eq!(bar.close, 1.10);
    assert_eq!(bar.volume, 30);

    // The bar was persisted before it was broadcast.
    assert_eq!(store.count().unwrap(), 1);
    assert_eq!(stats.aggregator.snapshot().bars_closed, 1);
}
