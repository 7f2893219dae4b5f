//! GELF 데모 클라이언트 (송신자)
//!
//! GELF 메시지를 만들어 압축/분할 후 UDP로 전송
//! - 청크는 무작위 순서로 섞어서 전송 (재조립 확인용)
//! - `--duplicate` 로 일부 청크를 중복 전송
//!
//! 사용법:
//!   cargo run --release --bin gelf-client -- [OPTIONS]
//!
//! 예시:
//!   # 짧은 메시지 하나
//!   cargo run --release --bin gelf-client -- -m "hello"
//!
//!   # 64KB 메시지를 zlib 압축 없이 청크로 전송
//!   cargo run --release --bin gelf-client -- --size 65536 --compress none

use std::net::SocketAddr;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use rand::seq::SliceRandom;
use rand::Rng;
use serde::Serialize;
use tokio::net::UdpSocket;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use gelf::{compress, ChunkBuilder, Compression, DEFAULT_PORT, PACKET_MAX_SIZE};

/// 클라이언트 설정
struct ClientConfig {
    bind_addr: SocketAddr,
    server_addr: SocketAddr,
    message: String,
    size: usize,
    count: usize,
    compression: Compression,
    packet_size: usize,
    duplicate: f64,
    interval_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 0)),
            server_addr: SocketAddr::from(([127, 0, 0, 1], DEFAULT_PORT)),
            message: "Hello from gelf-client".to_string(),
            size: 0,
            count: 1,
            compression: Compression::Gzip,
            packet_size: 1420,
            duplicate: 0.0,
            interval_ms: 0,
        }
    }
}

fn parse_compression(s: &str) -> Compression {
    match s {
        "none" => Compression::None,
        "gzip" => Compression::Gzip,
        "zlib" => Compression::Zlib,
        other => panic!("알 수 없는 압축 형식: {} (none|gzip|zlib)", other),
    }
}

fn parse_args() -> ClientConfig {
    let args: Vec<String> = std::env::args().collect();
    let mut config = ClientConfig::default();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--bind" | "-b" => {
                if i + 1 < args.len() {
                    config.bind_addr = args[i + 1].parse().expect("유효한 주소 필요");
                    i += 1;
                }
            }
            "--server" | "-s" => {
                if i + 1 < args.len() {
                    config.server_addr = args[i + 1].parse().expect("유효한 주소 필요");
                    i += 1;
                }
            }
            "--message" | "-m" => {
                if i + 1 < args.len() {
                    config.message = args[i + 1].clone();
                    i += 1;
                }
            }
            "--size" => {
                if i + 1 < args.len() {
                    config.size = args[i + 1].parse().expect("유효한 숫자 필요");
                    i += 1;
                }
            }
            "--count" | "-n" => {
                if i + 1 < args.len() {
                    config.count = args[i + 1].parse().expect("유효한 숫자 필요");
                    i += 1;
                }
            }
            "--compress" | "-c" => {
                if i + 1 < args.len() {
                    config.compression = parse_compression(&args[i + 1]);
                    i += 1;
                }
            }
            "--packet-size" => {
                if i + 1 < args.len() {
                    config.packet_size = args[i + 1].parse().expect("유효한 숫자 필요");
                    i += 1;
                }
            }
            "--duplicate" => {
                if i + 1 < args.len() {
                    config.duplicate = args[i + 1].parse().expect("유효한 숫자 필요");
                    i += 1;
                }
            }
            "--interval" => {
                if i + 1 < args.len() {
                    config.interval_ms = args[i + 1].parse().expect("유효한 숫자 필요");
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!(
                    r#"GELF Client - GELF UDP 송신 데모

사용법:
  cargo run --release --bin gelf-client -- [OPTIONS]

옵션:
  -b, --bind <ADDR>         로컬 바인드 주소 (기본: 0.0.0.0:0)
  -s, --server <ADDR>       서버 주소 (기본: 127.0.0.1:12201)
  -m, --message <TEXT>      short_message 내용
  --size <BYTES>            full_message 에 채울 더미 데이터 크기 (기본: 0)
  -n, --count <N>           보낼 메시지 수 (기본: 1)
  -c, --compress <FMT>      none | gzip | zlib (기본: gzip)
  --packet-size <BYTES>     데이터그램 최대 크기 (기본: 1420, 최대 8192)
  --duplicate <RATIO>       중복 전송할 청크 비율 0.0~1.0 (기본: 0)
  --interval <MS>           메시지 간 간격 (기본: 0)
  -h, --help                이 도움말 출력
"#
                );
                std::process::exit(0);
            }
            _ => {}
        }
        i += 1;
    }

    config.packet_size = config.packet_size.min(PACKET_MAX_SIZE);
    config
}

/// GELF 1.1 메시지
#[derive(Debug, Serialize)]
struct GelfMessage<'a> {
    version: &'a str,
    host: &'a str,
    short_message: &'a str,

    #[serde(skip_serializing_if = "Option::is_none")]
    full_message: Option<String>,

    timestamp: f64,
    level: u8,

    #[serde(rename = "_seq")]
    seq: usize,
}

fn unix_timestamp() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 로깅 설정 (RUST_LOG 가 있으면 우선)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = parse_args();

    let socket = UdpSocket::bind(config.bind_addr).await?;
    let builder = ChunkBuilder::new(config.packet_size);
    let mut rng = rand::thread_rng();

    info!("GELF Client -> {}", config.server_addr);
    info!(
        "Compression: {:?}, packet size: {} bytes",
        config.compression, config.packet_size
    );

    let filler = (config.size > 0).then(|| "x".repeat(config.size));
    let mut total_datagrams = 0usize;

    for seq in 0..config.count {
        let message = GelfMessage {
            version: "1.1",
            host: "gelf-client",
            short_message: &config.message,
            full_message: filler.clone(),
            timestamp: unix_timestamp(),
            level: 6,
            seq,
        };

        let json = serde_json::to_vec(&message)?;
        let payload = compress(config.compression, &json)?;
        let packed_len = payload.len();

        let mut datagrams = if builder.needs_chunking(&payload) {
            let id: u64 = rng.gen();
            builder.split(id, &payload)?
        } else {
            vec![payload.into()]
        };

        // 일부 청크 중복
        if datagrams.len() > 1 && config.duplicate > 0.0 {
            let extra = (datagrams.len() as f64 * config.duplicate).ceil() as usize;
            let copies: Vec<_> = datagrams
                .choose_multiple(&mut rng, extra)
                .cloned()
                .collect();
            datagrams.extend(copies);
        }
        datagrams.shuffle(&mut rng);

        for datagram in &datagrams {
            socket.send_to(datagram, config.server_addr).await?;
        }
        total_datagrams += datagrams.len();

        info!(
            "메시지 {} 전송: json {} bytes, 압축 후 {} bytes, {} datagrams",
            seq,
            json.len(),
            packed_len,
            datagrams.len()
        );

        if config.interval_ms > 0 {
            tokio::time::sleep(Duration::from_millis(config.interval_ms)).await;
        }
    }

    info!(
        "완료: {} messages, {} datagrams",
        config.count, total_datagrams
    );
    Ok(())
}
