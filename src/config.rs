//! 수신기 설정

use crate::{Error, Result, MAX_MESSAGE_SIZE, PACKET_MAX_SIZE};

/// 압축 해제 실패 시 처리 방식
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DecodeErrorPolicy {
    /// 수신 루프 종료 후 에러 반환
    #[default]
    Fatal,

    /// 경고 로그를 남기고 해당 데이터그램만 버림
    Skip,
}

/// GELF 수신기 설정
#[derive(Debug, Clone)]
pub struct Config {
    /// 동시에 조립 중인 최대 메시지 수 (tombstone 포함, 0이면 무제한)
    pub max_messages: usize,

    /// 청크 만료 시간 (초)
    /// 이 시간 동안 새 청크가 없으면 슬롯 해제 후 tombstone 처리
    /// 0이면 만료 없음
    pub expire_secs: u64,

    /// 메시지 ID 만료 시간 (초, `expire_secs` 이후 추가로)
    /// 0이면 tombstone 을 삭제하지 않음
    pub id_expire_secs: u64,

    /// 수신 버퍼 크기 (단일 데이터그램 최대 크기)
    pub max_packet_size: usize,

    /// 압축 해제 결과의 최대 크기
    /// 넘으면 압축 해제 실패로 취급하여 `decode_error_policy`를 따른다
    pub max_message_size: usize,

    /// 같은 소켓을 읽는 수신 루프 수
    pub workers: usize,

    /// 압축 해제 실패 처리
    pub decode_error_policy: DecodeErrorPolicy,

    /// 조립된 메시지를 한 번 더 압축 해제할지 여부
    /// GELF 클라이언트는 보통 압축 후 분할하므로 표준 클라이언트와 호환하려면 켠다
    pub decompress_assembled: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_messages: 1000,
            expire_secs: 5,
            id_expire_secs: 5,
            max_packet_size: PACKET_MAX_SIZE,
            max_message_size: MAX_MESSAGE_SIZE,
            workers: 1,
            decode_error_policy: DecodeErrorPolicy::Fatal,
            decompress_assembled: false,
        }
    }
}

impl Config {
    /// 새 설정 생성
    pub fn new() -> Self {
        Self::default()
    }

    /// 설정값 검증
    pub fn validate(&self) -> Result<()> {
        if self.max_packet_size == 0 {
            return Err(Error::InvalidConfig("max_packet_size must be > 0".into()));
        }
        if self.max_packet_size > u16::MAX as usize {
            return Err(Error::InvalidConfig(format!(
                "max_packet_size {} exceeds UDP limit",
                self.max_packet_size
            )));
        }
        if self.max_message_size == 0 {
            return Err(Error::InvalidConfig("max_message_size must be > 0".into()));
        }
        if self.workers == 0 {
            return Err(Error::InvalidConfig("workers must be > 0".into()));
        }
        Ok(())
    }

    /// tombstone 이 완전히 삭제되기까지의 시간 (초)
    pub fn total_expire_secs(&self) -> u64 {
        self.expire_secs.saturating_add(self.id_expire_secs)
    }

    /// 저사양 기기용 설정
    pub fn low_spec() -> Self {
        Self {
            max_messages: 128,
            expire_secs: 3,
            id_expire_secs: 3,
            max_packet_size: PACKET_MAX_SIZE,
            max_message_size: MAX_MESSAGE_SIZE,
            workers: 1,
            decode_error_policy: DecodeErrorPolicy::Skip,
            decompress_assembled: true,
        }
    }

    /// 대량 수신용 설정
    pub fn high_throughput() -> Self {
        Self {
            max_messages: 16384,
            expire_secs: 5,
            id_expire_secs: 10,
            max_packet_size: PACKET_MAX_SIZE,
            max_message_size: MAX_MESSAGE_SIZE,
            workers: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
            decode_error_policy: DecodeErrorPolicy::Skip,
            decompress_assembled: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_matches_reference() {
        let config = Config::default();
        assert_eq!(config.max_messages, 1000);
        assert_eq!(config.expire_secs, 5);
        assert_eq!(config.id_expire_secs, 5);
        assert_eq!(config.max_packet_size, 8192);
        assert_eq!(config.max_message_size, MAX_MESSAGE_SIZE);
        assert_eq!(config.decode_error_policy, DecodeErrorPolicy::Fatal);
        assert_eq!(config.total_expire_secs(), 10);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate() {
        let mut config = Config::new();
        config.workers = 0;
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));

        let mut config = Config::new();
        config.max_packet_size = 70_000;
        assert!(config.validate().is_err());

        let mut config = Config::new();
        config.max_message_size = 0;
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));

        assert!(Config::low_spec().validate().is_ok());
        assert!(Config::high_throughput().validate().is_ok());
    }
}
