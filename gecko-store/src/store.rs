//! 报文持久化
//! 客户端将尚未确认的报文按 key 保存在这里，进程重启后可以取回继续投递
//!
//! 所有实现都遵循同一套生命周期：
//! * 创建后处于未打开状态，`open` 之后 `put`/`get`/`del`/`all` 才可用
//! * 未打开时调用上述操作返回 [`Error::NotOpen`]
//! * `close` 之后可以再次 `open`，已保存的数据不丢失
//! * `reset` 不受打开状态限制，清空所有数据

use std::{io, path::PathBuf};

use crate::{
    config,
    packet::{self, Packet},
};

pub use file::FileStore;
pub use key::{Direction, PacketKey};
pub use memory::MemoryStore;

pub mod file;
pub mod key;
pub mod memory;
pub mod record;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Store not open")]
    NotOpen,
    #[error("Storage medium unavailable at {path:?}: {source}")]
    MediumUnavailable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Corrupt entry {key}: {source}")]
    CorruptEntry {
        key: String,
        #[source]
        source: record::Error,
    },
    #[error("Key not found: {0}")]
    KeyNotFound(String),
    #[error("Invalid key: {0:?}")]
    InvalidKey(String),
    #[error("Packet can not be encoded: {0}")]
    InvalidPacket(#[from] packet::Error),
}

/// 报文存储，由客户端运行时在一次会话的开始和结束时调用 open/close
///
/// 实现内部使用一把锁串行化所有操作，可以在多个线程间共享
pub trait Store: Send + Sync {
    /// 打开存储，已打开时什么也不做
    fn open(&self) -> Result<(), Error>;
    /// 关闭存储，未打开时返回 [`Error::NotOpen`]，状态不变
    fn close(&self) -> Result<(), Error>;
    /// 保存报文，覆盖同 key 的旧数据
    fn put(&self, key: &str, packet: &Packet) -> Result<(), Error>;
    /// 取出报文，报文类型与保存时一致
    fn get(&self, key: &str) -> Result<Packet, Error>;
    /// 删除报文，key 不存在时也返回成功
    fn del(&self, key: &str) -> Result<(), Error>;
    /// 当前所有完整写入的 key，顺序不定
    fn all(&self) -> Result<Vec<String>, Error>;
    /// 清空所有数据
    fn reset(&self) -> Result<(), Error>;
}

/// 根据配置创建存储，返回的存储处于未打开状态
pub fn from_config(cfg: &config::Store) -> Box<dyn Store> {
    match cfg.backend {
        config::Backend::File => Box::new(FileStore::new(&cfg.dir)),
        config::Backend::Memory => Box::new(MemoryStore::new()),
    }
}

/// key 直接作为文件名使用，不能逃出存储目录，也不能与临时文件冲突
pub(crate) fn validate_key(key: &str) -> Result<(), Error> {
    let invalid = key.is_empty()
        || key.starts_with('.')
        || key.contains(|c: char| matches!(c, '/' | '\\' | '\0'));
    if invalid {
        return Err(Error::InvalidKey(key.into()));
    }
    Ok(())
}
