//! 청크 풀 (메시지 재조립 저장소)
//!
//! 메시지 ID별로 도착한 청크를 모아 모든 순번이 채워지면 하나의 페이로드로 합친다.
//! 메모리 상한은 두 가지로 보장한다.
//! - 최대 추적 메시지 수: 가득 차면 새 ID의 청크는 버림
//! - 2단계 만료: `expire_secs` 동안 갱신이 없으면 슬롯을 해제하고 tombstone 으로 남긴 뒤,
//!   `expire_secs + id_expire_secs` 가 지나면 항목 자체를 삭제
//!
//! 만료 정리는 별도 타이머 없이 `assemble` 호출 시점에만 수행된다.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use bytes::{Bytes, BytesMut};
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::chunk::{ChunkHeader, MessageId};
use crate::stats::PoolStats;
use crate::Config;

/// 청크 조립기
pub trait ChunkPool: Send + Sync {
    /// 청크 데이터그램을 받아, 메시지의 모든 청크가 모이면 합쳐진 페이로드를 반환
    fn assemble(&self, data: &[u8]) -> Option<Bytes>;
}

/// 만료 판정용 시계 (초 단위)
pub trait Clock: Send + Sync {
    fn now_secs(&self) -> u64;
}

/// 시스템 벽시계 (유닉스 초)
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_secs(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs()
    }
}

/// 수동 시계 (테스트, 시뮬레이션용)
#[derive(Debug, Default)]
pub struct ManualClock(AtomicU64);

impl ManualClock {
    pub fn new(now: u64) -> Self {
        Self(AtomicU64::new(now))
    }

    pub fn advance(&self, secs: u64) {
        self.0.fetch_add(secs, Ordering::SeqCst);
    }

    pub fn set(&self, now: u64) {
        self.0.store(now, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_secs(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }
}

/// 메시지 하나의 조립 상태
#[derive(Debug)]
enum Slots {
    /// 조립 중: 순번별 페이로드 (아직 안 온 순번은 None)
    Active(Vec<Option<Bytes>>),

    /// 만료됨: 슬롯은 해제, 늦게 온 청크를 거부하기 위해 ID만 남김
    Tombstoned,
}

#[derive(Debug)]
struct Entry {
    /// 마지막으로 청크를 받아들인 시각
    last_update: u64,
    slots: Slots,
}

impl Entry {
    fn new(count: u8) -> Self {
        Self {
            last_update: 0,
            slots: Slots::Active(vec![None; count as usize]),
        }
    }

    fn is_tombstoned(&self) -> bool {
        matches!(self.slots, Slots::Tombstoned)
    }
}

/// 모든 슬롯이 채워졌으면 순번 순서대로 합침
fn join_slots(slots: &[Option<Bytes>]) -> Option<Bytes> {
    let mut total = 0;
    for slot in slots {
        total += slot.as_ref()?.len();
    }

    let mut buf = BytesMut::with_capacity(total);
    for piece in slots.iter().flatten() {
        buf.extend_from_slice(piece);
    }
    Some(buf.freeze())
}

/// 풀 내부 상태 (락으로 보호)
#[derive(Debug, Default)]
struct PoolInner {
    entries: HashMap<MessageId, Entry>,
    stats: PoolStats,
}

impl PoolInner {
    /// 2단계 만료 정리. 같은 시각으로 반복 호출해도 결과가 같다.
    fn gc(&mut self, now: u64, expire_secs: u64, id_expire_secs: u64) {
        if expire_secs == 0 {
            return;
        }

        for entry in self.entries.values_mut() {
            if !entry.is_tombstoned() && entry.last_update.saturating_add(expire_secs) < now {
                entry.slots = Slots::Tombstoned;
                self.stats.tombstoned += 1;
            }
        }

        if id_expire_secs == 0 {
            return;
        }

        let window = expire_secs.saturating_add(id_expire_secs);
        let before = self.entries.len();
        self.entries.retain(|_, entry| {
            !(entry.is_tombstoned() && entry.last_update.saturating_add(window) < now)
        });
        self.stats.reaped += (before - self.entries.len()) as u64;
    }

    fn assemble(
        &mut self,
        header: ChunkHeader,
        payload: &[u8],
        now: u64,
        max_messages: usize,
    ) -> Option<Bytes> {
        let id = header.id;

        if !self.entries.contains_key(&id) {
            if max_messages > 0 && self.entries.len() >= max_messages {
                self.stats.dropped_capacity += 1;
                warn!("청크 풀 가득 참 ({}), 메시지 {:016x} 버림", max_messages, id);
                return None;
            }
            self.entries.insert(id, Entry::new(header.count));
        }

        let entry = self.entries.get_mut(&id)?;

        let slots = match &mut entry.slots {
            Slots::Active(slots) => slots,
            Slots::Tombstoned => {
                self.stats.dropped_tombstoned += 1;
                debug!("만료된 메시지 {:016x}의 청크 {} 버림", id, header.seq);
                return None;
            }
        };

        if slots.len() != header.count as usize {
            self.stats.dropped_mismatch += 1;
            debug!(
                "메시지 {:016x} 청크 수 불일치: expected {}, got {}",
                id,
                slots.len(),
                header.count
            );
            return None;
        }

        slots[header.seq as usize] = Some(Bytes::copy_from_slice(payload));
        entry.last_update = now;
        self.stats.accepted_chunks += 1;

        let joined = join_slots(slots)?;
        self.entries.remove(&id);
        self.stats.assembled += 1;

        debug!(
            "메시지 {:016x} 조립 완료: {} chunks, {} bytes",
            id,
            header.count,
            joined.len()
        );
        Some(joined)
    }
}

/// 메모리 기반 청크 풀
///
/// 단일 뮤텍스로 조회, 갱신, 만료 정리를 모두 직렬화한다.
/// 여러 수신 루프가 하나의 인스턴스를 공유해도 안전하다.
pub struct MemoryChunkPool<C: Clock = SystemClock> {
    inner: Mutex<PoolInner>,
    clock: C,

    /// 최대 추적 메시지 수 (0이면 무제한)
    max_messages: usize,

    /// 1단계 만료 (초, 0이면 만료 없음)
    expire_secs: u64,

    /// 2단계 만료 (초, `expire_secs`에 더해짐, 0이면 tombstone 유지)
    id_expire_secs: u64,

    /// 헤더 검증에서 걸러진 데이터그램 수
    rejected: AtomicU64,
}

impl MemoryChunkPool<SystemClock> {
    /// 새 청크 풀 생성
    pub fn new(max_messages: usize, expire_secs: u64, id_expire_secs: u64) -> Self {
        Self::with_clock(max_messages, expire_secs, id_expire_secs, SystemClock)
    }

    /// 설정으로부터 생성
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.max_messages,
            config.expire_secs,
            config.id_expire_secs,
        )
    }
}

impl<C: Clock> MemoryChunkPool<C> {
    /// 시계를 지정하여 생성
    pub fn with_clock(
        max_messages: usize,
        expire_secs: u64,
        id_expire_secs: u64,
        clock: C,
    ) -> Self {
        Self {
            inner: Mutex::new(PoolInner::default()),
            clock,
            max_messages,
            expire_secs,
            id_expire_secs,
            rejected: AtomicU64::new(0),
        }
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// 추적 중인 메시지 수 (tombstone 포함)
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// tombstone 상태 메시지 수
    pub fn tombstone_count(&self) -> usize {
        self.inner
            .lock()
            .entries
            .values()
            .filter(|e| e.is_tombstoned())
            .count()
    }

    /// 해당 ID가 tombstone 상태인지 (없으면 None)
    pub fn is_tombstoned(&self, id: MessageId) -> Option<bool> {
        self.inner.lock().entries.get(&id).map(Entry::is_tombstoned)
    }

    /// 헤더 검증에서 걸러진 데이터그램 수
    pub fn rejected(&self) -> u64 {
        self.rejected.load(Ordering::Relaxed)
    }

    /// 통계 복사
    pub fn stats(&self) -> PoolStats {
        self.inner.lock().stats.clone()
    }

    /// 현재 시각 기준으로 만료 정리만 수행
    pub fn collect_garbage(&self) {
        let now = self.clock.now_secs();
        self.inner
            .lock()
            .gc(now, self.expire_secs, self.id_expire_secs);
    }
}

impl<C: Clock> ChunkPool for MemoryChunkPool<C> {
    fn assemble(&self, data: &[u8]) -> Option<Bytes> {
        let Some((header, payload)) = ChunkHeader::parse(data) else {
            self.rejected.fetch_add(1, Ordering::Relaxed);
            return None;
        };

        let now = self.clock.now_secs();
        let mut inner = self.inner.lock();
        inner.gc(now, self.expire_secs, self.id_expire_secs);
        inner.assemble(header, payload, now, self.max_messages)
    }
}
