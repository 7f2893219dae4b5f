//! 청크 헤더와 청크 생성기
//!
//! 와이어 포맷 (빅엔디언):
//! ```text
//! 0      2                 10     11     12
//! +------+-----------------+------+------+-----------
//! | 1E0F |   message id    | seq  | cnt  | payload...
//! +------+-----------------+------+------+-----------
//! ```

use bytes::{BufMut, Bytes, BytesMut};

use crate::{Error, Result, CHUNK_HEADER_SIZE, CHUNK_MAGIC, MAX_CHUNK_COUNT};

/// 메시지 ID (64비트)
pub type MessageId = u64;

/// 청크 데이터그램 여부
///
/// 12바이트 이상이고 매직 넘버로 시작해야 한다. 나머지 필드는 보지 않는다.
pub fn is_chunked_payload(data: &[u8]) -> bool {
    data.len() >= CHUNK_HEADER_SIZE && data[0] == CHUNK_MAGIC[0] && data[1] == CHUNK_MAGIC[1]
}

/// 청크 헤더 (데이터그램 앞 12바이트에서 파생)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkHeader {
    /// 메시지 ID
    pub id: MessageId,

    /// 청크 순번 (0부터)
    pub seq: u8,

    /// 메시지의 총 청크 수
    pub count: u8,
}

impl ChunkHeader {
    /// 헤더와 페이로드 분리
    ///
    /// 청크 형태가 아니거나 순번/개수가 유효하지 않으면 `None`.
    pub fn parse(data: &[u8]) -> Option<(Self, &[u8])> {
        if !is_chunked_payload(data) {
            return None;
        }

        let mut id = [0u8; 8];
        id.copy_from_slice(&data[2..10]);

        let header = Self {
            id: MessageId::from_be_bytes(id),
            seq: data[10],
            count: data[11],
        };

        if !header.is_valid() {
            return None;
        }

        Some((header, &data[CHUNK_HEADER_SIZE..]))
    }

    /// 개수가 0이 아니고 순번이 개수보다 작은지
    pub fn is_valid(&self) -> bool {
        self.count != 0 && self.seq < self.count
    }

    /// 헤더를 버퍼에 기록
    pub fn write_to(&self, buf: &mut BytesMut) {
        buf.put_slice(&CHUNK_MAGIC);
        buf.put_u64(self.id);
        buf.put_u8(self.seq);
        buf.put_u8(self.count);
    }
}

/// 청크 생성기 (송신측)
///
/// 데이터그램 하나에 들어가지 않는 메시지를 청크 데이터그램들로 분할한다.
pub struct ChunkBuilder {
    /// 청크 하나의 최대 데이터그램 크기 (헤더 포함)
    packet_size: usize,

    /// 메시지당 최대 청크 수
    max_chunks: usize,
}

impl ChunkBuilder {
    pub fn new(packet_size: usize) -> Self {
        Self {
            packet_size: packet_size.max(CHUNK_HEADER_SIZE + 1),
            max_chunks: MAX_CHUNK_COUNT,
        }
    }

    /// 최대 청크 수 지정 (u8 범위로 제한)
    pub fn with_max_chunks(mut self, max_chunks: usize) -> Self {
        self.max_chunks = max_chunks.clamp(1, u8::MAX as usize);
        self
    }

    /// 청크당 페이로드 크기
    pub fn payload_size(&self) -> usize {
        self.packet_size - CHUNK_HEADER_SIZE
    }

    /// 분할 필요 여부
    pub fn needs_chunking(&self, payload: &[u8]) -> bool {
        payload.len() > self.packet_size
    }

    /// 페이로드를 청크 데이터그램들로 분할
    ///
    /// 빈 페이로드도 청크 하나로 만든다.
    pub fn split(&self, id: MessageId, payload: &[u8]) -> Result<Vec<Bytes>> {
        let payload_size = self.payload_size();
        let count = payload.len().div_ceil(payload_size).max(1);

        if count > self.max_chunks {
            return Err(Error::MessageTooLarge {
                len: payload.len(),
                max_chunks: self.max_chunks,
            });
        }

        let pieces: Vec<&[u8]> = if payload.is_empty() {
            vec![payload]
        } else {
            payload.chunks(payload_size).collect()
        };

        let chunks = pieces
            .into_iter()
            .enumerate()
            .map(|(seq, piece)| {
                let header = ChunkHeader {
                    id,
                    seq: seq as u8,
                    count: count as u8,
                };
                let mut buf = BytesMut::with_capacity(CHUNK_HEADER_SIZE + piece.len());
                header.write_to(&mut buf);
                buf.put_slice(piece);
                buf.freeze()
            })
            .collect();

        Ok(chunks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_chunked_payload() {
        let mut data = vec![0x1E, 0x0F, 0, 0, 0, 0, 0, 0, 0, 1, 0, 3];
        assert!(is_chunked_payload(&data));

        // 11바이트
        assert!(!is_chunked_payload(&data[..11]));
        assert!(!is_chunked_payload(&[]));
        assert!(!is_chunked_payload(&[0x1E]));

        data[1] = 0x0E;
        assert!(!is_chunked_payload(&data));
    }

    #[test]
    fn test_parse_header() {
        let data = [
            0x1E, 0x0F, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x02, 0x05, 0xAA, 0xBB,
        ];
        let (header, payload) = ChunkHeader::parse(&data).unwrap();

        assert_eq!(header.id, 0x0102030405060708);
        assert_eq!(header.seq, 2);
        assert_eq!(header.count, 5);
        assert_eq!(payload, &[0xAA, 0xBB]);
    }

    #[test]
    fn test_parse_rejects_bad_sequence() {
        // count == 0
        let zero = [0x1E, 0x0F, 0, 0, 0, 0, 0, 0, 0, 1, 0, 0, 0xAA];
        assert!(ChunkHeader::parse(&zero).is_none());

        // seq == count
        let over = [0x1E, 0x0F, 0, 0, 0, 0, 0, 0, 0, 1, 3, 3, 0xAA];
        assert!(ChunkHeader::parse(&over).is_none());
    }

    #[test]
    fn test_split_and_parse() {
        let builder = ChunkBuilder::new(CHUNK_HEADER_SIZE + 4);
        let payload: Vec<u8> = (0..10).collect();
        let chunks = builder.split(42, &payload).unwrap();

        assert_eq!(chunks.len(), 3);

        let mut joined = Vec::new();
        for (i, chunk) in chunks.iter().enumerate() {
            let (header, piece) = ChunkHeader::parse(chunk).unwrap();
            assert_eq!(header.id, 42);
            assert_eq!(header.seq as usize, i);
            assert_eq!(header.count, 3);
            joined.extend_from_slice(piece);
        }
        assert_eq!(joined, payload);
    }

    #[test]
    fn test_split_empty_payload() {
        let chunks = ChunkBuilder::new(64).split(7, &[]).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].len(), CHUNK_HEADER_SIZE);
    }

    #[test]
    fn test_split_too_large() {
        let builder = ChunkBuilder::new(CHUNK_HEADER_SIZE + 1).with_max_chunks(4);
        let err = builder.split(1, &[0u8; 5]).unwrap_err();
        assert!(matches!(
            err,
            Error::MessageTooLarge {
                len: 5,
                max_chunks: 4
            }
        ));
    }
}
