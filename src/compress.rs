//! 압축 감지 및 해제
//!
//! 메타데이터 없이 선두 바이트만 보고 형식을 판단한다.
//! - gzip: RFC 1952 매직 (0x1F 0x8B 0x08)
//! - zlib: RFC 1950 CMF/FLG 헤더 체크섬

use std::borrow::Cow;
use std::io::{self, Read, Write};

use flate2::read::MultiGzDecoder;
use flate2::write::{GzEncoder, ZlibEncoder};
use flate2::{Decompress, FlushDecompress, Status};

use crate::{Error, Result};

/// 페이로드 압축 형식
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    /// 비압축 (원본 그대로)
    None,

    /// gzip 컨테이너
    Gzip,

    /// zlib 스트림
    Zlib,
}

/// gzip 압축 데이터 여부
pub fn is_gzip(buf: &[u8]) -> bool {
    buf.len() > 2 && buf[0] == 0x1F && buf[1] == 0x8B && buf[2] == 0x08
}

/// zlib 압축 데이터 여부
pub fn is_zlib(buf: &[u8]) -> bool {
    buf.len() > 2
        && buf[0] & 0xF8 == buf[0]
        && (u16::from_be_bytes([buf[0], buf[1]]) % 31) == 0
}

/// 압축 형식 감지
pub fn detect_compression(buf: &[u8]) -> Compression {
    if is_gzip(buf) {
        Compression::Gzip
    } else if is_zlib(buf) {
        Compression::Zlib
    } else {
        Compression::None
    }
}

/// 압축 해제 (출력 크기 제한 없음)
///
/// 비압축 데이터는 복사 없이 그대로 빌려서 반환한다.
/// 데이터그램은 크기가 제한되어 있으므로 스트림 전체를 한 번에 해제한다.
pub fn decompress(buf: &[u8]) -> Result<Cow<'_, [u8]>> {
    decompress_limited(buf, usize::MAX)
}

/// 해제 결과가 `limit` 바이트를 넘으면 `Error::Decode`로 실패하는 압축 해제
///
/// gzip 은 연결된 멤버를 모두 해제하며, 멤버 뒤의 잘못된 데이터는 에러로 처리한다.
pub fn decompress_limited(buf: &[u8], limit: usize) -> Result<Cow<'_, [u8]>> {
    let format = detect_compression(buf);
    let capacity = buf.len().saturating_mul(4).min(limit.saturating_add(1));

    let res = match format {
        Compression::None => return Ok(Cow::Borrowed(buf)),
        Compression::Gzip => {
            let mut out = Vec::with_capacity(capacity);
            let bound = (limit as u64).saturating_add(1);
            MultiGzDecoder::new(buf)
                .take(bound)
                .read_to_end(&mut out)
                .and_then(|_| check_limit(out.len(), limit))
                .map(|_| out)
        }
        Compression::Zlib => {
            let mut out = Vec::with_capacity(capacity);
            inflate_zlib(buf, &mut out, limit).map(|_| out)
        }
    };

    let out = res.map_err(|source| Error::Decode { format, source })?;
    Ok(Cow::Owned(out))
}

fn check_limit(len: usize, limit: usize) -> io::Result<()> {
    if len > limit {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("decompressed size exceeds limit of {} bytes", limit),
        ));
    }
    Ok(())
}

/// zlib 스트림 해제
///
/// `read::ZlibDecoder`는 입력이 중간에 끊겨도 EOF로 취급하므로
/// 스트림 끝(StreamEnd)까지 도달했는지 직접 확인한다.
/// 출력 버퍼는 `limit + 1` 바이트 이상으로 늘리지 않는다.
fn inflate_zlib(buf: &[u8], out: &mut Vec<u8>, limit: usize) -> io::Result<usize> {
    let mut inflater = Decompress::new(true);

    loop {
        check_limit(out.len(), limit)?;

        if out.len() == out.capacity() {
            let room = limit.saturating_add(1) - out.len();
            out.reserve(buf.len().max(64).min(room));
        }

        let before_in = inflater.total_in();
        let before_out = inflater.total_out();
        let consumed = before_in as usize;

        let status = inflater
            .decompress_vec(&buf[consumed..], out, FlushDecompress::Finish)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

        if status == Status::StreamEnd {
            check_limit(out.len(), limit)?;
            return Ok(out.len());
        }

        // 출력 공간이 남아 있는데 진전이 없으면 입력이 잘린 것
        let stalled = inflater.total_in() == before_in && inflater.total_out() == before_out;
        if stalled && out.len() < out.capacity() {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "truncated zlib stream",
            ));
        }
    }
}

/// 압축 (송신측)
pub fn compress(format: Compression, buf: &[u8]) -> Result<Vec<u8>> {
    let level = flate2::Compression::default();

    let out = match format {
        Compression::None => buf.to_vec(),
        Compression::Gzip => {
            let mut encoder = GzEncoder::new(Vec::with_capacity(buf.len()), level);
            encoder.write_all(buf)?;
            encoder.finish()?
        }
        Compression::Zlib => {
            let mut encoder = ZlibEncoder::new(Vec::with_capacity(buf.len()), level);
            encoder.write_all(buf)?;
            encoder.finish()?
        }
    };

    Ok(out)
}
