use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::packet::{self, Error};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unsubscribe {
    /// 包 id
    pub packet_id: u16,
    /// 取消订阅的主题
    pub filters: Vec<String>,
}

impl Unsubscribe {
    fn len(&self) -> usize {
        2 + self.filters.iter().map(|f| 2 + f.len()).sum::<usize>()
    }

    pub fn read(mut stream: Bytes) -> Result<Self, Error> {
        let packet_id = packet::read_u16(&mut stream)?;
        let mut filters = Vec::with_capacity(1);

        while stream.has_remaining() {
            filters.push(packet::read_string(&mut stream)?);
        }

        if filters.is_empty() {
            return Err(Error::PayloadRequired);
        }

        Ok(Self { packet_id, filters })
    }

    pub fn write(&self, stream: &mut BytesMut) -> Result<(), Error> {
        if self.filters.is_empty() {
            return Err(Error::PayloadRequired);
        }

        stream.put_u8(0xA2);
        packet::write_remaining_length(stream, self.len())?;
        stream.put_u16(self.packet_id);
        for filter in self.filters.iter() {
            packet::write_string(stream, filter)?;
        }
        Ok(())
    }
}
