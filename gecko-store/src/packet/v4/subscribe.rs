use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::{
    packet::{self, read_u8, Error, QoS},
    topic,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscribe {
    pub packet_id: u16,
    pub filters: Vec<SubscribeFilter>,
}

impl Subscribe {
    fn len(&self) -> usize {
        // 每个过滤器：长度前缀 + 过滤器 + 订阅选项
        2 + self
            .filters
            .iter()
            .map(|f| 2 + f.path.len() + 1)
            .sum::<usize>()
    }

    pub fn read(mut stream: Bytes) -> Result<Self, Error> {
        let packet_id = packet::read_u16(&mut stream)?;

        let mut filters = Vec::new();
        while stream.has_remaining() {
            let filter = packet::read_string(&mut stream)?;
            if !topic::valid_subscribe_filter(&filter) {
                return Err(Error::InvalidSubscribeFilter);
            }
            let options = read_u8(&mut stream)?;
            // 高六位为保留位
            if options & 0b1111_1100 != 0 {
                return Err(Error::MalformedPacket);
            }

            filters.push(SubscribeFilter {
                path: filter,
                qos: (options & 0b0000_0011).try_into()?,
            })
        }

        // 至少包含一个订阅
        if filters.is_empty() {
            return Err(Error::PayloadRequired);
        }

        Ok(Self { packet_id, filters })
    }

    pub fn write(&self, stream: &mut BytesMut) -> Result<(), Error> {
        if self.filters.is_empty() {
            return Err(Error::PayloadRequired);
        }

        stream.put_u8(0x82);
        packet::write_remaining_length(stream, self.len())?;
        stream.put_u16(self.packet_id);
        for filter in self.filters.iter() {
            if !topic::valid_subscribe_filter(&filter.path) {
                return Err(Error::InvalidSubscribeFilter);
            }
            packet::write_string(stream, &filter.path)?;
            stream.put_u8(filter.qos as u8);
        }

        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscribeFilter {
    pub path: String,
    pub qos: QoS,
}
