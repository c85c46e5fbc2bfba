//! 报文记录的存储格式
//!
//! ```text
//! +--------+---------+------------------------------+
//! | "GKPS" | version | mqtt 报文（固定头 + 剩余部分） |
//! +--------+---------+------------------------------+
//! ```
//!
//! mqtt 固定头本身就携带了报文类型和剩余长度，解码时先读固定头，
//! 再按类型分发到对应的报文解码，不需要预先知道报文类型

use bytes::{Buf, BufMut, BytesMut};

use crate::packet::{self, Packet};

const MAGIC: &[u8; 4] = b"GKPS";
const VERSION: u8 = 1;
const HEADER_LEN: usize = MAGIC.len() + 1;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Bad record magic")]
    BadMagic,
    #[error("Unsupported record version: {0}")]
    UnsupportedVersion(u8),
    #[error("Record truncated, at least {0} more bytes required")]
    Truncated(usize),
    #[error("{0} trailing bytes after packet")]
    TrailingBytes(usize),
    #[error("Packet error: {0}")]
    Packet(#[from] packet::Error),
}

pub fn encode(packet: &Packet) -> Result<BytesMut, packet::Error> {
    let mut record = BytesMut::with_capacity(HEADER_LEN + 16);
    record.put_slice(MAGIC);
    record.put_u8(VERSION);
    packet.write(&mut record)?;
    Ok(record)
}

pub fn decode(mut record: BytesMut) -> Result<Packet, Error> {
    if record.len() < HEADER_LEN {
        if !MAGIC.starts_with(&record[..record.len().min(MAGIC.len())]) {
            return Err(Error::BadMagic);
        }
        return Err(Error::Truncated(HEADER_LEN - record.len()));
    }
    if &record[..MAGIC.len()] != MAGIC {
        return Err(Error::BadMagic);
    }
    let version = record[MAGIC.len()];
    if version != VERSION {
        return Err(Error::UnsupportedVersion(version));
    }
    record.advance(HEADER_LEN);

    let packet = match Packet::read(&mut record) {
        Ok(packet) => packet,
        Err(packet::Error::InsufficientBytes(n)) => return Err(Error::Truncated(n)),
        Err(e) => return Err(Error::Packet(e)),
    };

    // 一条记录只能包含一个报文
    if !record.is_empty() {
        return Err(Error::TrailingBytes(record.len()));
    }

    Ok(packet)
}
