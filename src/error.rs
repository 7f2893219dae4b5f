//! 에러 타입 정의

use thiserror::Error;

use crate::compress::Compression;

/// GELF 수신기 에러 타입
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO 에러: {0}")]
    Io(#[from] std::io::Error),

    #[error("압축 해제 실패 ({format:?}): {source}")]
    Decode {
        format: Compression,
        #[source]
        source: std::io::Error,
    },

    #[error("유효하지 않은 설정: {0}")]
    InvalidConfig(String),

    #[error("메시지가 너무 큼: {len} bytes, 최대 청크 수 {max_chunks}")]
    MessageTooLarge { len: usize, max_chunks: usize },

    #[error("워커 태스크 종료: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Result 타입 별칭
pub type Result<T> = std::result::Result<T, Error>;
