//! # GELF (Graylog Extended Log Format) UDP 수신기
//!
//! UDP 데이터그램으로 들어오는 GELF 로그 이벤트 수신 라이브러리
//!
//! ## 핵심 특징
//! - **압축 자동 감지**: gzip / zlib 매직 바이트 스니핑 후 해제
//! - **청크 조립**: 순서 없이, 중복/손실되어 도착하는 청크를 메시지로 재조립
//! - **메모리 상한**: 최대 추적 메시지 수 + 2단계 만료(tombstone → 삭제)
//! - **멀티 워커**: 하나의 소켓과 하나의 청크 풀을 여러 수신 루프가 공유

pub mod chunk;
pub mod compress;
pub mod config;
pub mod error;
pub mod pool;
pub mod server;
pub mod stats;

pub use chunk::{is_chunked_payload, ChunkBuilder, ChunkHeader, MessageId};
pub use compress::{compress, decompress, decompress_limited, detect_compression, Compression};
pub use config::{Config, DecodeErrorPolicy};
pub use error::{Error, Result};
pub use pool::{ChunkPool, Clock, ManualClock, MemoryChunkPool, SystemClock};
pub use server::{serve, serve_with, wait_for_signal, Handler, PacketSource, Server};
pub use stats::{PoolStats, ReceiverStats};

/// 청크 매직 넘버 (0x1E 0x0F)
pub const CHUNK_MAGIC: [u8; 2] = [0x1E, 0x0F];

/// 청크 헤더 크기 (매직 2 + 메시지 ID 8 + 순번 1 + 개수 1)
pub const CHUNK_HEADER_SIZE: usize = 12;

/// 단일 데이터그램 최대 크기 (바이트)
pub const PACKET_MAX_SIZE: usize = 8192;

/// 압축 해제 후 메시지 최대 크기 기본값 (8 MiB)
pub const MAX_MESSAGE_SIZE: usize = 8 * 1024 * 1024;

/// 송신측 메시지당 최대 청크 수 (GELF 권고값)
pub const MAX_CHUNK_COUNT: usize = 128;

/// 기본 GELF UDP 포트
pub const DEFAULT_PORT: u16 = 12201;
