//! 수신 통계

use std::sync::atomic::{AtomicU64, Ordering};

/// 청크 풀 통계 (풀 락 안에서만 갱신)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// 조립 완료된 메시지 수
    pub assembled: u64,

    /// 받아들인 청크 수
    pub accepted_chunks: u64,

    /// 용량 초과로 버린 청크 수 (새 메시지 ID)
    pub dropped_capacity: u64,

    /// tombstone 상태 ID로 와서 버린 청크 수
    pub dropped_tombstoned: u64,

    /// 청크 개수 불일치로 버린 청크 수
    pub dropped_mismatch: u64,

    /// 만료되어 tombstone 처리된 메시지 수
    pub tombstoned: u64,

    /// tombstone 만료로 완전히 삭제된 메시지 수
    pub reaped: u64,
}

impl PoolStats {
    /// 버린 청크 총합
    pub fn total_dropped(&self) -> u64 {
        self.dropped_capacity + self.dropped_tombstoned + self.dropped_mismatch
    }
}

/// 수신 루프 통계 (여러 워커가 공유)
#[derive(Debug, Default)]
pub struct ReceiverStats {
    datagrams: AtomicU64,
    bytes: AtomicU64,
    empty_datagrams: AtomicU64,
    decode_errors: AtomicU64,
    chunks: AtomicU64,
    dispatched: AtomicU64,
}

impl ReceiverStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// 데이터그램 수신 기록
    pub fn record_datagram(&self, len: usize) {
        if len == 0 {
            self.empty_datagrams.fetch_add(1, Ordering::Relaxed);
            return;
        }
        self.datagrams.fetch_add(1, Ordering::Relaxed);
        self.bytes.fetch_add(len as u64, Ordering::Relaxed);
    }

    pub fn record_decode_error(&self) {
        self.decode_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_chunk(&self) {
        self.chunks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dispatch(&self) {
        self.dispatched.fetch_add(1, Ordering::Relaxed);
    }

    /// 비어있지 않은 수신 데이터그램 수
    pub fn datagrams(&self) -> u64 {
        self.datagrams.load(Ordering::Relaxed)
    }

    /// 수신 바이트 총합 (압축 해제 전)
    pub fn bytes(&self) -> u64 {
        self.bytes.load(Ordering::Relaxed)
    }

    pub fn empty_datagrams(&self) -> u64 {
        self.empty_datagrams.load(Ordering::Relaxed)
    }

    pub fn decode_errors(&self) -> u64 {
        self.decode_errors.load(Ordering::Relaxed)
    }

    /// 청크 풀로 넘긴 데이터그램 수
    pub fn chunks(&self) -> u64 {
        self.chunks.load(Ordering::Relaxed)
    }

    /// 핸들러로 전달한 메시지 수
    pub fn dispatched(&self) -> u64 {
        self.dispatched.load(Ordering::Relaxed)
    }

    /// 요약 문자열
    pub fn summary(&self) -> String {
        format!(
            "datagrams={} bytes={} empty={} chunks={} dispatched={} decode_errors={}",
            self.datagrams(),
            self.bytes(),
            self.empty_datagrams(),
            self.chunks(),
            self.dispatched(),
            self.decode_errors(),
        )
    }
}
