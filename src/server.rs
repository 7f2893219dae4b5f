//! 수신 루프 (데이터그램 수신 → 압축 해제 → 청크 조립 → 핸들러 전달)
//!
//! - 수신 버퍼는 루프가 소유하고 매 반복마다 재사용
//! - 핸들러 호출은 동기식: 느린 핸들러는 해당 루프의 수신 속도를 늦춤
//! - 같은 소켓과 같은 청크 풀을 여러 루프가 공유 가능

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use tokio::net::UdpSocket;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::chunk::is_chunked_payload;
use crate::compress::decompress_limited;
use crate::pool::{ChunkPool, MemoryChunkPool};
use crate::stats::ReceiverStats;
use crate::{Config, DecodeErrorPolicy, Error, Result};

/// 데이터그램 수신원
pub trait PacketSource: Send + Sync {
    /// 데이터그램 하나를 `buf`에 읽고 (길이, 송신자 주소) 반환
    fn recv_datagram<'a>(
        &'a self,
        buf: &'a mut [u8],
    ) -> impl Future<Output = io::Result<(usize, SocketAddr)>> + Send + 'a;
}

impl PacketSource for UdpSocket {
    fn recv_datagram<'a>(
        &'a self,
        buf: &'a mut [u8],
    ) -> impl Future<Output = io::Result<(usize, SocketAddr)>> + Send + 'a {
        self.recv_from(buf)
    }
}

/// 완성된 GELF 페이로드 처리기
///
/// `data`는 수신 루프의 버퍼를 빌린 것이므로 호출 이후에도 쓰려면 복사해야 한다.
pub trait Handler: Send + Sync {
    fn handle_payload(&self, addr: SocketAddr, data: &[u8]);
}

impl<F> Handler for F
where
    F: Fn(SocketAddr, &[u8]) + Send + Sync,
{
    fn handle_payload(&self, addr: SocketAddr, data: &[u8]) {
        self(addr, data)
    }
}

/// 기본 설정으로 수신 루프 실행
///
/// 수신 에러나 압축 해제 실패가 나기 전까지 반환하지 않는다.
pub async fn serve<S, P, H>(source: &S, pool: &P, handler: &H) -> Result<()>
where
    S: PacketSource + ?Sized,
    P: ChunkPool + ?Sized,
    H: Handler + ?Sized,
{
    serve_with(source, pool, handler, &Config::default(), &ReceiverStats::new()).await
}

/// 압축 해제 실패 정책 적용. 계속 진행할 수 있으면 `Ok(())`.
fn on_decode_error(err: Error, policy: DecodeErrorPolicy, addr: SocketAddr) -> Result<()> {
    match policy {
        DecodeErrorPolicy::Fatal => {
            warn!("압축 해제 실패 ({}), 수신 루프 종료: {}", addr, err);
            Err(err)
        }
        DecodeErrorPolicy::Skip => {
            warn!("압축 해제 실패 ({}), 데이터그램 버림: {}", addr, err);
            Ok(())
        }
    }
}

/// 설정과 통계를 지정하여 수신 루프 실행
pub async fn serve_with<S, P, H>(
    source: &S,
    pool: &P,
    handler: &H,
    config: &Config,
    stats: &ReceiverStats,
) -> Result<()>
where
    S: PacketSource + ?Sized,
    P: ChunkPool + ?Sized,
    H: Handler + ?Sized,
{
    let mut buf = vec![0u8; config.max_packet_size];

    loop {
        let (len, addr) = source.recv_datagram(&mut buf).await?;
        stats.record_datagram(len);

        if len == 0 {
            continue;
        }

        let payload = match decompress_limited(&buf[..len], config.max_message_size) {
            Ok(payload) => payload,
            Err(e) => {
                stats.record_decode_error();
                on_decode_error(e, config.decode_error_policy, addr)?;
                continue;
            }
        };

        let joined: Bytes;
        let inner;
        let data: &[u8] = if is_chunked_payload(&payload) {
            stats.record_chunk();
            let Some(complete) = pool.assemble(&payload) else {
                continue;
            };
            joined = complete;

            if !config.decompress_assembled {
                &joined
            } else {
                match decompress_limited(&joined, config.max_message_size) {
                    Ok(decoded) => {
                        inner = decoded;
                        &inner
                    }
                    Err(e) => {
                        stats.record_decode_error();
                        on_decode_error(e, config.decode_error_policy, addr)?;
                        continue;
                    }
                }
            }
        } else {
            &payload
        };

        dispatch(handler, stats, addr, data);
    }
}

fn dispatch<H: Handler + ?Sized>(
    handler: &H,
    stats: &ReceiverStats,
    addr: SocketAddr,
    data: &[u8],
) {
    if data.is_empty() {
        return;
    }
    debug!("메시지 전달: {} bytes from {}", data.len(), addr);
    handler.handle_payload(addr, data);
    stats.record_dispatch();
}

/// 종료 시그널 대기
///
/// 시그널 등록에 실패하면 경고만 남기고 영원히 대기한다.
/// 즉시 완료되면 `run_until`이 시작하자마자 종료되기 때문이다.
pub async fn wait_for_signal<F>(signal: F)
where
    F: Future<Output = io::Result<()>>,
{
    if let Err(e) = signal.await {
        warn!("종료 시그널 등록 실패, 시그널 없이 계속 실행: {}", e);
        std::future::pending::<()>().await;
    }
}

/// 멀티 워커 GELF UDP 서버
///
/// 하나의 소켓과 하나의 청크 풀을 `config.workers`개의 수신 루프가 공유한다.
pub struct Server {
    socket: Arc<UdpSocket>,
    pool: Arc<dyn ChunkPool>,
    handler: Arc<dyn Handler>,
    config: Config,
    stats: Arc<ReceiverStats>,
}

impl Server {
    /// 주소에 바인딩하고 설정에 맞는 메모리 청크 풀로 서버 생성
    pub async fn bind(
        addr: SocketAddr,
        config: Config,
        handler: Arc<dyn Handler>,
    ) -> Result<Self> {
        config.validate()?;
        let socket = UdpSocket::bind(addr).await?;
        let pool = Arc::new(MemoryChunkPool::from_config(&config));
        Ok(Self::new(socket, pool, handler, config))
    }

    /// 이미 바인딩된 소켓과 청크 풀로 서버 생성
    pub fn new(
        socket: UdpSocket,
        pool: Arc<dyn ChunkPool>,
        handler: Arc<dyn Handler>,
        config: Config,
    ) -> Self {
        Self {
            socket: Arc::new(socket),
            pool,
            handler,
            config,
            stats: Arc::new(ReceiverStats::new()),
        }
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// 수신 통계 (워커 공용)
    pub fn stats(&self) -> Arc<ReceiverStats> {
        self.stats.clone()
    }

    fn spawn_workers(&self) -> JoinSet<Result<()>> {
        let mut workers = JoinSet::new();

        for worker_id in 0..self.config.workers.max(1) {
            let socket = self.socket.clone();
            let pool = self.pool.clone();
            let handler = self.handler.clone();
            let config = self.config.clone();
            let stats = self.stats.clone();

            workers.spawn(async move {
                debug!("수신 워커 {} 시작", worker_id);
                let res = serve_with(&*socket, &*pool, &*handler, &config, &stats).await;
                if let Err(e) = &res {
                    warn!("수신 워커 {} 종료: {}", worker_id, e);
                }
                res
            });
        }

        workers
    }

    /// 모든 워커 실행. 첫 번째 워커 에러가 나면 나머지를 중단하고 반환.
    pub async fn run(self) -> Result<()> {
        self.run_until(std::future::pending()).await
    }

    /// `shutdown`이 완료될 때까지 실행
    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let addr = self.local_addr()?;
        let mut workers = self.spawn_workers();
        info!(
            "GELF Server listening on {} ({} workers)",
            addr,
            workers.len()
        );

        tokio::pin!(shutdown);

        let res = loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("GELF Server 종료 요청");
                    break Ok(());
                }
                joined = workers.join_next() => match joined {
                    Some(Ok(Ok(()))) => continue,
                    Some(Ok(Err(e))) => break Err(e),
                    Some(Err(e)) => break Err(Error::Join(e)),
                    None => break Ok(()),
                },
            }
        };

        workers.abort_all();
        info!("GELF Server stopped: {}", self.stats.summary());
        res
    }
}
