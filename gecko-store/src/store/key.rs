//! 存储 key 的约定：报文方向 + 包 id，如 `o.12` 表示发出的 12 号报文

use std::{fmt, str::FromStr};

/// 报文方向
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// 从服务端收到的报文
    Inbound,
    /// 发送给服务端的报文
    Outbound,
}

impl Direction {
    fn prefix(&self) -> &'static str {
        match self {
            Direction::Inbound => "i",
            Direction::Outbound => "o",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PacketKey {
    pub direction: Direction,
    pub packet_id: u16,
}

impl PacketKey {
    pub fn inbound(packet_id: u16) -> Self {
        Self {
            direction: Direction::Inbound,
            packet_id,
        }
    }

    pub fn outbound(packet_id: u16) -> Self {
        Self {
            direction: Direction::Outbound,
            packet_id,
        }
    }
}

impl fmt::Display for PacketKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.direction.prefix(), self.packet_id)
    }
}

#[derive(Debug, thiserror::Error)]
#[error("Malformed packet key: {0:?}")]
pub struct ParseKeyError(String);

impl FromStr for PacketKey {
    type Err = ParseKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseKeyError(s.into());
        let (prefix, id) = s.split_once('.').ok_or_else(err)?;
        let direction = match prefix {
            "i" => Direction::Inbound,
            "o" => Direction::Outbound,
            _ => return Err(err()),
        };
        // 只接受 Display 输出的形式，不允许符号和前导 0
        let canonical = !id.is_empty()
            && id.bytes().all(|b| b.is_ascii_digit())
            && (id == "0" || !id.starts_with('0'));
        if !canonical {
            return Err(err());
        }
        let packet_id = id.parse::<u16>().map_err(|_| err())?;

        Ok(Self {
            direction,
            packet_id,
        })
    }
}
