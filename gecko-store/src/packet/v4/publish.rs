use bytes::{BufMut, Bytes, BytesMut};

use crate::{
    packet::{self, Error, QoS},
    topic,
};

use super::FixedHeader;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Publish {
    /// 客户端是否之前发送过此消息（是否重新投递）
    pub dup: bool,
    /// 服务质量
    pub qos: QoS,
    /// 消息保留
    pub retain: bool,
    /// 主题
    pub topic: String,
    /// 包 id，qos0 时为 0
    pub packet_id: u16,
    /// 消息负载
    pub payload: Bytes,
}

impl Publish {
    pub fn new(topic: impl Into<String>, qos: QoS, payload: impl Into<Bytes>) -> Self {
        Self {
            dup: false,
            qos,
            retain: false,
            topic: topic.into(),
            packet_id: 0,
            payload: payload.into(),
        }
    }

    #[inline]
    fn len(&self) -> usize {
        let packet_id_len = match self.qos {
            QoS::AtMostOnce => 0,
            _ => 2,
        };
        2 + self.topic.len() + packet_id_len + self.payload.len()
    }

    pub fn read(fixed_header: FixedHeader, mut stream: Bytes) -> Result<Self, Error> {
        let flags = fixed_header.flags();
        let qos = QoS::try_from((flags & 0b0110) >> 1)?;
        let dup = (flags & 0b1000) != 0;
        let retain = (flags & 0b0001) != 0;
        // qos0 的消息不可以设置 dup
        if dup && qos == QoS::AtMostOnce {
            return Err(Error::MalformedPacket);
        }

        let topic = packet::read_string(&mut stream)?;
        if !topic::valid_publish_topic(&topic) {
            return Err(Error::InvalidPublishTopic);
        }

        let packet_id = match qos {
            QoS::AtMostOnce => 0,
            _ => match packet::read_u16(&mut stream)? {
                0 => return Err(Error::MissPacketId),
                id => id,
            },
        };

        Ok(Self {
            dup,
            qos,
            retain,
            topic,
            packet_id,
            payload: stream,
        })
    }

    pub fn write(&self, stream: &mut BytesMut) -> Result<(), Error> {
        match self.qos {
            // qos0 的消息不带包 id，也不可以设置 dup
            QoS::AtMostOnce if self.dup || self.packet_id != 0 => {
                return Err(Error::MalformedPacket)
            }
            QoS::AtLeastOnce | QoS::ExactlyOnce if self.packet_id == 0 => {
                return Err(Error::MissPacketId)
            }
            _ => {}
        }
        if !topic::valid_publish_topic(&self.topic) {
            return Err(Error::InvalidPublishTopic);
        }

        let byte1 = 0x30
            | ((self.dup as u8) << 3)
            | ((self.qos as u8) << 1)
            | (self.retain as u8);
        stream.put_u8(byte1);
        packet::write_remaining_length(stream, self.len())?;
        packet::write_string(stream, &self.topic)?;
        if self.qos != QoS::AtMostOnce {
            stream.put_u16(self.packet_id);
        }
        stream.extend_from_slice(&self.payload);

        Ok(())
    }
}
