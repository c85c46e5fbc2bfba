use bytes::{BufMut, Bytes, BytesMut};

use crate::packet::{self, Error, QoS};

/// 协议名称
const PROTOCOL_NAME: &str = "MQTT";
/// 3.1.1 协议级别
const PROTOCOL_LEVEL: u8 = 4;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connect {
    /// keepalive
    pub keep_alive: u16,
    /// 客户端id
    pub client_id: String,
    /// 是否开启新会话
    pub clean_session: bool,
    /// 遗嘱消息
    pub last_will: Option<LastWill>,
    /// 登录凭证
    pub login: Option<Login>,
}

impl Connect {
    fn len(&self) -> usize {
        // 协议名称 + 协议级别 + connect flags + keep alive
        let mut len = 2 + PROTOCOL_NAME.len() + 1 + 1 + 2;
        len += 2 + self.client_id.len();
        if let Some(ref will) = self.last_will {
            len += 2 + will.topic.len() + 2 + will.message.len();
        }
        if let Some(ref login) = self.login {
            len += 2 + login.username.len();
            if !login.password.is_empty() {
                len += 2 + login.password.len();
            }
        }
        len
    }

    pub(crate) fn read(mut stream: Bytes) -> Result<Self, Error> {
        // 可变报头
        let protocol_name = packet::read_string(&mut stream)?;
        let protocol_level = packet::read_u8(&mut stream)?;
        if protocol_name != PROTOCOL_NAME {
            return Err(Error::InvalidProtocol);
        }
        if protocol_level != PROTOCOL_LEVEL {
            return Err(Error::InvalidProtocolLevel(protocol_level));
        }

        let connect_flags = packet::read_u8(&mut stream)?;
        // 保留位必须为 0
        if connect_flags & 0b1 != 0 {
            return Err(Error::MalformedPacket);
        }
        let clean_session = (connect_flags & 0b10) != 0;
        let keep_alive = packet::read_u16(&mut stream)?;

        let client_id = packet::read_string(&mut stream)?;
        let last_will = LastWill::read(connect_flags, &mut stream)?;
        let login = Login::read(connect_flags, &mut stream)?;

        Ok(Connect {
            keep_alive,
            client_id,
            clean_session,
            last_will,
            login,
        })
    }

    pub fn write(&self, stream: &mut BytesMut) -> Result<(), Error> {
        stream.put_u8(0x10);
        packet::write_remaining_length(stream, self.len())?;
        packet::write_string(stream, PROTOCOL_NAME)?;
        stream.put_u8(PROTOCOL_LEVEL);

        let mut connect_flags = 0u8;
        if self.clean_session {
            connect_flags |= 0b10;
        }
        if let Some(ref will) = self.last_will {
            connect_flags |= 0b100 | ((will.qos as u8) << 3);
            if will.retain {
                connect_flags |= 0b0010_0000;
            }
        }
        if let Some(ref login) = self.login {
            connect_flags |= 0b1000_0000;
            if !login.password.is_empty() {
                connect_flags |= 0b0100_0000;
            }
        }
        stream.put_u8(connect_flags);
        stream.put_u16(self.keep_alive);

        packet::write_string(stream, &self.client_id)?;
        if let Some(ref will) = self.last_will {
            packet::write_string(stream, &will.topic)?;
            packet::write_bytes(stream, &will.message)?;
        }
        if let Some(ref login) = self.login {
            packet::write_string(stream, &login.username)?;
            if !login.password.is_empty() {
                packet::write_string(stream, &login.password)?;
            }
        }

        Ok(())
    }
}

/// 遗嘱设置
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LastWill {
    /// 遗嘱发送的目标主题
    pub topic: String,
    // 遗嘱消息
    pub message: Bytes,
    /// 服务质量
    pub qos: QoS,
    /// 消息保留
    pub retain: bool,
}

impl LastWill {
    fn read(connect_flags: u8, stream: &mut Bytes) -> Result<Option<LastWill>, Error> {
        let last_will = match connect_flags & 0b100 {
            0 if (connect_flags & 0b0011_1000) != 0 => {
                return Err(Error::IncorrectPacketFormat);
            }
            0 => None,
            _ => Some(LastWill {
                topic: packet::read_string(stream)?,
                message: packet::read_bytes(stream)?,
                qos: QoS::try_from((connect_flags & 0b11000) >> 3)?,
                retain: (connect_flags & 0b0010_0000) != 0,
            }),
        };

        Ok(last_will)
    }
}

/// 登录凭证
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Login {
    /// 用户名
    pub username: String,
    /// 密码，为空时不写入报文
    pub password: String,
}

impl Login {
    fn read(connect_flags: u8, stream: &mut Bytes) -> Result<Option<Login>, Error> {
        let username = match connect_flags & 0b1000_0000 {
            0 => None,
            _ => Some(packet::read_string(stream)?),
        };

        let password = match connect_flags & 0b0100_0000 {
            0 => None,
            _ => Some(packet::read_string(stream)?),
        };

        let login = match (&username, &password) {
            (None, None) => None,
            _ => Some(Login {
                username: username.unwrap_or_default(),
                password: password.unwrap_or_default(),
            }),
        };

        Ok(login)
    }
}
