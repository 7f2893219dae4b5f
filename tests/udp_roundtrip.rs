//! 루프백 UDP 소켓을 통한 송수신 통합 테스트

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use rand::seq::SliceRandom;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;

use gelf::{
    compress, ChunkBuilder, ChunkPool, Compression, Config, Handler, ManualClock,
    MemoryChunkPool, Server, CHUNK_HEADER_SIZE,
};

/// 받은 페이로드를 채널로 전달
struct ChannelHandler {
    tx: mpsc::UnboundedSender<(SocketAddr, Vec<u8>)>,
}

impl Handler for ChannelHandler {
    fn handle_payload(&self, addr: SocketAddr, data: &[u8]) {
        let _ = self.tx.send((addr, data.to_vec()));
    }
}

async fn start_server(
    config: Config,
) -> (SocketAddr, mpsc::UnboundedReceiver<(SocketAddr, Vec<u8>)>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let handler: Arc<dyn Handler> = Arc::new(ChannelHandler { tx });

    let server = Server::bind("127.0.0.1:0".parse().unwrap(), config, handler)
        .await
        .unwrap();
    let addr = server.local_addr().unwrap();

    tokio::spawn(server.run());
    (addr, rx)
}

async fn recv_one(
    rx: &mut mpsc::UnboundedReceiver<(SocketAddr, Vec<u8>)>,
) -> (SocketAddr, Vec<u8>) {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for payload")
        .expect("handler channel closed")
}

#[tokio::test]
async fn test_uncompressed_single_datagram() {
    let (server_addr, mut rx) = start_server(Config::default()).await;
    let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();

    let msg = br#"{"version":"1.1","host":"test","short_message":"hi"}"#;
    client.send_to(msg, server_addr).await.unwrap();

    let (from, data) = recv_one(&mut rx).await;
    assert_eq!(from, client.local_addr().unwrap());
    assert_eq!(data, msg.to_vec());
}

#[tokio::test]
async fn test_shuffled_chunks_with_duplicates() {
    let config = Config {
        workers: 3,
        ..Config::default()
    };
    let (server_addr, mut rx) = start_server(config).await;
    let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();

    let payload: Vec<u8> = (0..20_000u32).map(|i| (i % 97) as u8).collect();
    let builder = ChunkBuilder::new(1024);
    let mut chunks = builder.split(0xDEAD_BEEF, &payload).unwrap();
    chunks.shuffle(&mut rand::thread_rng());

    // 마지막 청크를 보내기 전에 앞 청크 하나를 중복 전송
    let dup = chunks[0].clone();
    let (last, rest) = chunks.split_last().unwrap();
    for chunk in rest {
        client.send_to(chunk, server_addr).await.unwrap();
    }
    client.send_to(&dup, server_addr).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    client.send_to(last, server_addr).await.unwrap();

    let (_, data) = recv_one(&mut rx).await;
    assert_eq!(data, payload);
}

#[tokio::test]
async fn test_gzip_then_chunked() {
    let config = Config {
        decompress_assembled: true,
        ..Config::default()
    };
    let (server_addr, mut rx) = start_server(config).await;
    let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();

    let json: Vec<u8> = format!(
        r#"{{"version":"1.1","host":"test","short_message":"big","full_message":"{}"}}"#,
        (0..5000).map(|i| format!("{:x}", i * 7919)).collect::<String>()
    )
    .into_bytes();
    let packed = compress(Compression::Gzip, &json).unwrap();
    let chunks = ChunkBuilder::new(CHUNK_HEADER_SIZE + 512)
        .split(1, &packed)
        .unwrap();
    assert!(chunks.len() > 1);

    for chunk in chunks.iter().rev() {
        client.send_to(chunk, server_addr).await.unwrap();
    }

    let (_, data) = recv_one(&mut rx).await;
    assert_eq!(data, json);
}

#[test]
fn test_chunk_pool_lifecycle_with_manual_clock() {
    let pool = MemoryChunkPool::with_clock(2, 5, 5, ManualClock::new(10_000));
    let builder = ChunkBuilder::new(CHUNK_HEADER_SIZE + 2);

    let stalled = builder.split(1, &[1, 2, 3, 4]).unwrap();
    assert!(pool.assemble(&stalled[0]).is_none());

    // 만료 → tombstone: 늦게 온 청크는 버려짐
    pool.clock().advance(6);
    assert!(pool.assemble(&stalled[1]).is_none());
    assert_eq!(pool.tombstone_count(), 1);

    // tombstone 도 용량을 차지함
    let other = builder.split(2, &[9, 9, 9]).unwrap();
    assert!(pool.assemble(&other[0]).is_none());
    let third = builder.split(3, &[7]).unwrap();
    assert!(pool.assemble(&third[0]).is_none());
    assert_eq!(pool.stats().dropped_capacity, 1);

    // tombstone 삭제 후 같은 ID로 새로 시작 가능
    pool.clock().advance(5);
    assert!(pool.assemble(&other[1]).is_some());
    assert!(pool.is_empty());
    assert!(pool.assemble(&stalled[0]).is_none());
    assert_eq!(
        pool.assemble(&stalled[1]).unwrap().as_ref(),
        &[1, 2, 3, 4]
    );

    let stats = pool.stats();
    assert_eq!(stats.tombstoned, 1);
    assert_eq!(stats.reaped, 1);
    assert_eq!(stats.assembled, 2);
}
