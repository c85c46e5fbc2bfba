use bytes::{BufMut, Bytes, BytesMut};

use crate::packet::{self, Error};

use super::FixedHeader;

/// 连接返回码
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectReturnCode {
    /// 成功
    Success = 0,
    /// 服务器不支持协议版本
    RefusedProtocolVersion,
    /// 客户端id不合法，比如长度超过 23 个字符，包含了不允许的字符等
    BadClientId,
    /// 服务器不可用
    ServiceUnavailable,
    /// 错误的用户名或密码
    BadUserNamePassword,
    /// 未授权
    NotAuthorized,
}

impl TryFrom<u8> for ConnectReturnCode {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(ConnectReturnCode::Success),
            1 => Ok(ConnectReturnCode::RefusedProtocolVersion),
            2 => Ok(ConnectReturnCode::BadClientId),
            3 => Ok(ConnectReturnCode::ServiceUnavailable),
            4 => Ok(ConnectReturnCode::BadUserNamePassword),
            5 => Ok(ConnectReturnCode::NotAuthorized),
            code => Err(Error::InvalidConnectReturnCode(code)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnAck {
    /// 用于标识在 Broker 上是否已存在该 Client的持久性会话
    pub session_present: bool,
    /// 连接返回码
    pub code: ConnectReturnCode,
}

impl ConnAck {
    pub fn new(code: ConnectReturnCode, session_present: bool) -> Self {
        ConnAck {
            session_present,
            code,
        }
    }

    /// 报文长度
    fn len(&self) -> usize {
        // sesssion present + code
        1 + 1
    }

    pub fn read(fixed_header: FixedHeader, mut stream: Bytes) -> Result<Self, Error> {
        if fixed_header.remaining_len != 2 {
            return Err(Error::MalformedPacket);
        }

        let flags = packet::read_u8(&mut stream)?;
        // 只有最低位有意义，其余为保留位
        if flags & 0b1111_1110 != 0 {
            return Err(Error::MalformedPacket);
        }
        let code = ConnectReturnCode::try_from(packet::read_u8(&mut stream)?)?;

        Ok(ConnAck::new(code, flags == 1))
    }

    pub fn write(&self, stream: &mut BytesMut) -> Result<(), Error> {
        stream.put_u8(0x20);

        let len = self.len();
        packet::write_remaining_length(stream, len)?;
        stream.put_u8(self.session_present as u8);
        stream.put_u8(self.code as u8);

        Ok(())
    }
}
