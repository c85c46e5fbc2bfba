//! 3.1.1 协议版本报文

use std::slice::Iter;

use bytes::{Buf, BufMut, BytesMut};

pub use connack::*;
pub use connect::*;
pub use puback::*;
pub use pubcomp::*;
pub use publish::*;
pub use pubrec::*;
pub use pubrel::*;
pub use suback::*;
pub use subscribe::*;
pub use unsuback::*;
pub use unsubscribe::*;

use super::Error;

pub mod connack;
pub mod connect;
pub mod puback;
pub mod pubcomp;
pub mod publish;
pub mod pubrec;
pub mod pubrel;
pub mod suback;
pub mod subscribe;
pub mod unsuback;
pub mod unsubscribe;

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketType {
    Connect = 1,
    ConnAck,
    Publish,
    PubAck,
    PubRec,
    PubRel,
    PubComp,
    Subscribe,
    SubAck,
    Unsubscribe,
    UnsubAck,
    PingReq,
    PingResp,
    Disconnect,
}

impl PacketType {
    /// 固定头中除 publish 以外报文必须携带的 flags
    fn reserved_flags(&self) -> u8 {
        match self {
            PacketType::PubRel | PacketType::Subscribe | PacketType::Unsubscribe => 0b0010,
            _ => 0,
        }
    }
}

impl TryFrom<u8> for PacketType {
    type Error = Error;

    fn try_from(num: u8) -> Result<Self, Self::Error> {
        match num {
            1 => Ok(PacketType::Connect),
            2 => Ok(PacketType::ConnAck),
            3 => Ok(PacketType::Publish),
            4 => Ok(PacketType::PubAck),
            5 => Ok(PacketType::PubRec),
            6 => Ok(PacketType::PubRel),
            7 => Ok(PacketType::PubComp),
            8 => Ok(PacketType::Subscribe),
            9 => Ok(PacketType::SubAck),
            10 => Ok(PacketType::Unsubscribe),
            11 => Ok(PacketType::UnsubAck),
            12 => Ok(PacketType::PingReq),
            13 => Ok(PacketType::PingResp),
            14 => Ok(PacketType::Disconnect),
            n => Err(Error::InvalidPacketType(n)),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FixedHeader {
    /// 固定头的第一个字节，包含报文类型和flags
    byte1: u8,
    /// 固定头的大小
    fixed_header_len: usize,
    /// 剩余长度大小
    remaining_len: usize,
}

impl FixedHeader {
    #[inline]
    pub fn packet_type(&self) -> Result<PacketType, Error> {
        PacketType::try_from(self.byte1 >> 4)
    }

    #[inline]
    fn flags(&self) -> u8 {
        self.byte1 & 0x0F
    }

    /// 整个完整报文的字节长度
    #[inline]
    pub fn packet_len(&self) -> usize {
        self.fixed_header_len + self.remaining_len
    }

    #[inline]
    pub fn remaining_len(&self) -> usize {
        self.remaining_len
    }

    pub fn read_from(mut stream: Iter<u8>) -> Result<Self, Error> {
        let stream_len = stream.len();
        if stream_len < 2 {
            return Err(Error::InsufficientBytes(2 - stream_len));
        }
        // 第一个字节
        let byte1 = match stream.next() {
            Some(b) => *b,
            None => return Err(Error::InsufficientBytes(2)),
        };

        // 剩余字节长度
        let mut remaining_len: usize = 0;
        // 固定头长度，包含第一个字节
        let mut header_len = 1;
        let mut done = false;
        let mut shift = 0;

        for byte in stream {
            header_len += 1;
            let byte = *byte as usize;
            // 字节的后七位 * 128 + 上一个字节
            remaining_len += (byte & 0x7F) << shift;

            // 是否还有后续 remaining_len 字节
            done = (byte & 0x80) == 0;
            if done {
                break;
            }

            shift += 7;

            // 剩余长度字节最多四个字节（0，7，14，21）
            if shift > 21 {
                return Err(Error::MalformedPacket);
            }
        }

        if !done {
            return Err(Error::InsufficientBytes(1));
        }

        Ok(Self {
            byte1,
            fixed_header_len: header_len,
            remaining_len,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    Connect(Connect),
    ConnAck(ConnAck),
    Publish(Publish),
    PubAck(PubAck),
    PubRec(PubRec),
    PubRel(PubRel),
    PubComp(PubComp),
    Subscribe(Subscribe),
    SubAck(SubAck),
    Unsubscribe(Unsubscribe),
    UnsubAck(UnsubAck),
    PingReq,
    PingResp,
    Disconnect,
}

impl Packet {
    /// 从缓冲区头部取出一个完整报文
    /// 数据不足时返回 InsufficientBytes，且不消费缓冲区
    pub fn read(stream: &mut BytesMut) -> Result<Self, Error> {
        let stream_len = stream.len();
        let fixed_header = FixedHeader::read_from(stream.iter())?;

        let packet_len = fixed_header.packet_len();
        if stream_len < packet_len {
            return Err(Error::InsufficientBytes(packet_len - stream_len));
        }

        // 报文类型
        let packet_type = fixed_header.packet_type()?;
        if packet_type != PacketType::Publish && fixed_header.flags() != packet_type.reserved_flags()
        {
            return Err(Error::MalformedPacket);
        }

        // 根据固定头给出的长度信息，取出整个报文字节（包含报文头）
        // split_to 方法会更新 stream
        let packet = stream.split_to(packet_len);

        // 没有负载的 packet 类型，获取到报文头后，可以直接返回
        match packet_type {
            PacketType::PingReq | PacketType::PingResp | PacketType::Disconnect => {
                return match fixed_header.remaining_len {
                    0 => Ok(match packet_type {
                        PacketType::PingReq => Packet::PingReq,
                        PacketType::PingResp => Packet::PingResp,
                        _ => Packet::Disconnect,
                    }),
                    _ => Err(Error::IncorrectPacketFormat),
                };
            }
            _ if fixed_header.remaining_len == 0 => return Err(Error::PayloadRequired),
            _ => {}
        }

        // 去掉固定头的报文
        let mut stream = packet.freeze();
        stream.advance(fixed_header.fixed_header_len);

        let packet = match packet_type {
            PacketType::Connect => Packet::Connect(Connect::read(stream)?),
            PacketType::ConnAck => Packet::ConnAck(ConnAck::read(fixed_header, stream)?),
            PacketType::Publish => Packet::Publish(Publish::read(fixed_header, stream)?),
            PacketType::PubAck => Packet::PubAck(PubAck::read(fixed_header, stream)?),
            PacketType::PubRec => Packet::PubRec(PubRec::read(fixed_header, stream)?),
            PacketType::PubRel => Packet::PubRel(PubRel::read(fixed_header, stream)?),
            PacketType::PubComp => Packet::PubComp(PubComp::read(fixed_header, stream)?),
            PacketType::Subscribe => Packet::Subscribe(Subscribe::read(stream)?),
            PacketType::SubAck => Packet::SubAck(SubAck::read(stream)?),
            PacketType::Unsubscribe => Packet::Unsubscribe(Unsubscribe::read(stream)?),
            PacketType::UnsubAck => Packet::UnsubAck(UnsubAck::read(fixed_header, stream)?),
            PacketType::PingReq | PacketType::PingResp | PacketType::Disconnect => {
                unreachable!("packets without payload returned above")
            }
        };

        Ok(packet)
    }

    pub fn write(&self, stream: &mut BytesMut) -> Result<(), Error> {
        match self {
            Packet::Connect(connect) => connect.write(stream),
            Packet::ConnAck(ack) => ack.write(stream),
            Packet::Publish(publish) => publish.write(stream),
            Packet::PubAck(puback) => puback.write(stream),
            Packet::PubRec(pubrec) => pubrec.write(stream),
            Packet::PubRel(pubrel) => pubrel.write(stream),
            Packet::PubComp(pubcomp) => pubcomp.write(stream),
            Packet::Subscribe(subscribe) => subscribe.write(stream),
            Packet::SubAck(ack) => ack.write(stream),
            Packet::Unsubscribe(unsubscribe) => unsubscribe.write(stream),
            Packet::UnsubAck(unsuback) => unsuback.write(stream),
            Packet::PingReq => {
                stream.put_slice(&[0xC0, 0x00]);
                Ok(())
            }
            Packet::PingResp => {
                stream.put_slice(&[0xD0, 0x00]);
                Ok(())
            }
            Packet::Disconnect => {
                stream.put_slice(&[0xE0, 0x00]);
                Ok(())
            }
        }
    }

    #[inline]
    pub fn packet_type(&self) -> PacketType {
        match self {
            Packet::Connect(_) => PacketType::Connect,
            Packet::ConnAck(_) => PacketType::ConnAck,
            Packet::Publish(_) => PacketType::Publish,
            Packet::PubAck(_) => PacketType::PubAck,
            Packet::PubRec(_) => PacketType::PubRec,
            Packet::PubRel(_) => PacketType::PubRel,
            Packet::PubComp(_) => PacketType::PubComp,
            Packet::Subscribe(_) => PacketType::Subscribe,
            Packet::SubAck(_) => PacketType::SubAck,
            Packet::Unsubscribe(_) => PacketType::Unsubscribe,
            Packet::UnsubAck(_) => PacketType::UnsubAck,
            Packet::PingReq => PacketType::PingReq,
            Packet::PingResp => PacketType::PingResp,
            Packet::Disconnect => PacketType::Disconnect,
        }
    }

    /// 报文携带的包 id，qos0 的 publish 以及没有包 id 的报文返回 None
    pub fn packet_id(&self) -> Option<u16> {
        match self {
            Packet::Publish(publish) if publish.qos != super::QoS::AtMostOnce => {
                Some(publish.packet_id)
            }
            Packet::PubAck(p) => Some(p.packet_id),
            Packet::PubRec(p) => Some(p.packet_id),
            Packet::PubRel(p) => Some(p.packet_id),
            Packet::PubComp(p) => Some(p.packet_id),
            Packet::Subscribe(p) => Some(p.packet_id),
            Packet::SubAck(p) => Some(p.packet_id),
            Packet::Unsubscribe(p) => Some(p.packet_id),
            Packet::UnsubAck(p) => Some(p.packet_id),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;
    use crate::packet::QoS;

    fn write(packet: &Packet) -> BytesMut {
        let mut stream = BytesMut::new();
        packet.write(&mut stream).unwrap();
        stream
    }

    #[test]
    fn fixed_header_parsing_works() {
        let stream = [0x30, 0xC1, 0x02, 0xAA];
        let header = FixedHeader::read_from(stream.iter()).unwrap();
        assert_eq!(header.packet_type().unwrap(), PacketType::Publish);
        assert_eq!(header.fixed_header_len, 3);
        assert_eq!(header.remaining_len, 321);
        assert_eq!(header.packet_len(), 324);
    }

    #[test]
    fn fixed_header_rejects_five_length_bytes() {
        let stream = [0x30, 0xFF, 0xFF, 0xFF, 0xFF, 0x01];
        assert!(matches!(
            FixedHeader::read_from(stream.iter()),
            Err(Error::MalformedPacket)
        ));
    }

    #[test]
    fn read_keeps_buffer_when_incomplete() {
        let mut stream = BytesMut::from(&[0x40, 0x02, 0x00][..]);
        assert!(matches!(
            Packet::read(&mut stream),
            Err(Error::InsufficientBytes(1))
        ));
        assert_eq!(stream.len(), 3);

        stream.put_u8(0x0A);
        let packet = Packet::read(&mut stream).unwrap();
        assert_eq!(packet, Packet::PubAck(PubAck { packet_id: 10 }));
        assert!(stream.is_empty());
    }

    #[test]
    fn read_consumes_exactly_one_packet() {
        let mut stream = write(&Packet::PingReq);
        stream.extend_from_slice(&write(&Packet::PubRel(PubRel { packet_id: 7 })));

        assert_eq!(Packet::read(&mut stream).unwrap(), Packet::PingReq);
        assert_eq!(
            Packet::read(&mut stream).unwrap(),
            Packet::PubRel(PubRel { packet_id: 7 })
        );
        assert!(stream.is_empty());
    }

    #[test]
    fn invalid_type_nibble_is_rejected() {
        let mut stream = BytesMut::from(&[0xF0, 0x00][..]);
        assert!(matches!(
            Packet::read(&mut stream),
            Err(Error::InvalidPacketType(15))
        ));
    }

    #[test]
    fn reserved_flags_are_checked() {
        // pubrel 固定头的 flags 必须是 0b0010
        let mut stream = BytesMut::from(&[0x60, 0x02, 0x00, 0x01][..]);
        assert!(matches!(
            Packet::read(&mut stream),
            Err(Error::MalformedPacket)
        ));
    }

    #[test]
    fn packets_keep_their_variant() {
        let packets = vec![
            Packet::Publish(Publish {
                dup: true,
                qos: QoS::ExactlyOnce,
                retain: false,
                topic: "a/b".into(),
                packet_id: 42,
                payload: Bytes::from_static(b"hello"),
            }),
            Packet::PubAck(PubAck { packet_id: 42 }),
            Packet::PubRec(PubRec { packet_id: 42 }),
            Packet::PubRel(PubRel { packet_id: 42 }),
            Packet::PubComp(PubComp { packet_id: 42 }),
            Packet::UnsubAck(UnsubAck { packet_id: 42 }),
            Packet::PingReq,
            Packet::PingResp,
            Packet::Disconnect,
        ];

        for packet in packets {
            let mut stream = write(&packet);
            let read = Packet::read(&mut stream).unwrap();
            assert_eq!(read.packet_type(), packet.packet_type());
            assert_eq!(read, packet);
        }
    }

    #[test]
    fn packet_id_of_qos0_publish_is_none() {
        let publish = Packet::Publish(Publish::new("a", QoS::AtMostOnce, "x"));
        assert_eq!(publish.packet_id(), None);
        assert_eq!(Packet::PubComp(PubComp { packet_id: 3 }).packet_id(), Some(3));
        assert_eq!(Packet::PingResp.packet_id(), None);
    }
}
