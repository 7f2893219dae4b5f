//! GELF 데모 서버 (수신자)
//!
//! UDP로 들어오는 GELF 메시지를 받아 JSON으로 보기 좋게 출력
//! - 여러 워커가 하나의 소켓과 하나의 청크 풀을 공유
//! - gzip / zlib 자동 감지
//!
//! 사용법:
//!   cargo run --release --bin gelf-server -- [OPTIONS]
//!
//! 예시:
//!   # 기본 수신 (0.0.0.0:12201)
//!   cargo run --release --bin gelf-server
//!
//!   # 4 워커, 잘못된 압축 데이터는 건너뜀
//!   cargo run --release --bin gelf-server -- -w 4 --skip-decode-errors

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use gelf::{wait_for_signal, Config, DecodeErrorPolicy, Handler, Server, DEFAULT_PORT};

/// 서버 설정
struct ServerConfig {
    bind_addr: SocketAddr,
    verbose: bool,
    config: Config,
}

impl Default for ServerConfig {
    fn default() -> Self {
        let config = Config {
            // 표준 GELF 클라이언트는 압축 후 분할한다
            decompress_assembled: true,
            ..Config::default()
        };

        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            verbose: false,
            config,
        }
    }
}

fn parse_args() -> ServerConfig {
    let args: Vec<String> = std::env::args().collect();
    let mut config = ServerConfig::default();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--bind" | "-b" => {
                if i + 1 < args.len() {
                    config.bind_addr = args[i + 1].parse().expect("유효한 주소 필요");
                    i += 1;
                }
            }
            "--workers" | "-w" => {
                if i + 1 < args.len() {
                    config.config.workers = args[i + 1].parse().expect("유효한 숫자 필요");
                    i += 1;
                }
            }
            "--max-messages" => {
                if i + 1 < args.len() {
                    config.config.max_messages = args[i + 1].parse().expect("유효한 숫자 필요");
                    i += 1;
                }
            }
            "--expire" => {
                if i + 1 < args.len() {
                    config.config.expire_secs = args[i + 1].parse().expect("유효한 숫자 필요");
                    i += 1;
                }
            }
            "--id-expire" => {
                if i + 1 < args.len() {
                    config.config.id_expire_secs = args[i + 1].parse().expect("유효한 숫자 필요");
                    i += 1;
                }
            }
            "--max-message-size" => {
                if i + 1 < args.len() {
                    config.config.max_message_size =
                        args[i + 1].parse().expect("유효한 숫자 필요");
                    i += 1;
                }
            }
            "--skip-decode-errors" => {
                config.config.decode_error_policy = DecodeErrorPolicy::Skip;
            }
            "--raw-chunks" => {
                config.config.decompress_assembled = false;
            }
            "--verbose" | "-v" => {
                config.verbose = true;
            }
            "--help" | "-h" => {
                println!(
                    r#"GELF Server - GELF UDP 수신 데모

사용법:
  cargo run --release --bin gelf-server -- [OPTIONS]

옵션:
  -b, --bind <ADDR>         바인드 주소 (기본: 0.0.0.0:12201)
  -w, --workers <N>         수신 워커 수 (기본: 1)
  --max-messages <N>        동시 조립 최대 메시지 수 (기본: 1000, 0 = 무제한)
  --expire <SECS>           청크 만료 시간 (기본: 5)
  --id-expire <SECS>        메시지 ID 만료 시간 (기본: 5)
  --max-message-size <B>    압축 해제 후 메시지 최대 크기 (기본: 8388608)
  --skip-decode-errors      압축 해제 실패 시 종료하지 않고 건너뜀
  --raw-chunks              조립된 메시지를 다시 압축 해제하지 않음
  -v, --verbose             DEBUG 로그 출력 (RUST_LOG 가 설정되면 무시)
  -h, --help                이 도움말 출력
"#
                );
                std::process::exit(0);
            }
            _ => {}
        }
        i += 1;
    }

    config
}

/// GELF 메시지 (알려진 필드 + `_`로 시작하는 추가 필드)
#[derive(Debug, Serialize, Deserialize)]
struct GelfMessage {
    version: Option<String>,
    host: Option<String>,
    short_message: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    full_message: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    timestamp: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    level: Option<u8>,

    #[serde(flatten)]
    extra: BTreeMap<String, serde_json::Value>,
}

/// 받은 메시지를 로그로 출력하는 핸들러
struct PrintHandler;

impl Handler for PrintHandler {
    fn handle_payload(&self, addr: SocketAddr, data: &[u8]) {
        let message: GelfMessage = match serde_json::from_slice(data) {
            Ok(message) => message,
            Err(e) => {
                warn!("JSON 파싱 실패 ({}): {}", addr, e);
                return;
            }
        };

        match serde_json::to_string_pretty(&message) {
            Ok(pretty) => info!("event from {}:\n{}", addr, pretty),
            Err(e) => warn!("JSON 직렬화 실패: {}", e),
        }
    }
}

/// `RUST_LOG`가 없을 때 사용할 로그 필터
fn default_directive(verbose: bool) -> &'static str {
    if verbose {
        "debug"
    } else {
        "info"
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let server_config = parse_args();

    // 로깅 설정 (RUST_LOG 가 있으면 우선)
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(server_config.verbose)));
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = server_config.config;
    info!("GELF Server starting...");
    info!("Bind address: {}", server_config.bind_addr);
    info!(
        "Chunk pool: max {} messages, expire {}s + {}s",
        config.max_messages, config.expire_secs, config.id_expire_secs
    );
    info!("Decode error policy: {:?}", config.decode_error_policy);

    let server = Server::bind(server_config.bind_addr, config, Arc::new(PrintHandler)).await?;
    let stats = server.stats();

    server
        .run_until(wait_for_signal(tokio::signal::ctrl_c()))
        .await?;

    info!("Total: {}", stats.summary());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_directive() {
        assert_eq!(default_directive(false), "info");
        assert_eq!(default_directive(true), "debug");
        assert!(EnvFilter::try_new(default_directive(true)).is_ok());
    }

    #[test]
    fn test_gelf_message_keeps_extra_fields() {
        let data = br#"{"version":"1.1","host":"h","short_message":"hi","_user":"kim"}"#;
        let message: GelfMessage = serde_json::from_slice(data).unwrap();
        assert_eq!(message.short_message.as_deref(), Some("hi"));
        assert_eq!(message.extra["_user"], "kim");
    }
}
