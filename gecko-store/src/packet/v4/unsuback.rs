use bytes::{BufMut, Bytes, BytesMut};

use crate::packet::{self, Error};

use super::FixedHeader;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsubAck {
    /// 包 id
    pub packet_id: u16,
}

impl UnsubAck {
    pub fn read(fixed_header: FixedHeader, mut stream: Bytes) -> Result<Self, Error> {
        if fixed_header.remaining_len != 2 {
            return Err(Error::MalformedPacket);
        }

        Ok(Self {
            packet_id: packet::read_u16(&mut stream)?,
        })
    }

    pub fn write(&self, stream: &mut BytesMut) -> Result<(), Error> {
        stream.put_slice(&[0xB0, 0x02]);
        stream.put_u16(self.packet_id);
        Ok(())
    }
}
