use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard, PoisonError},
};

use bytes::{Bytes, BytesMut};
use log::{debug, warn};

use crate::packet::Packet;

use super::{record, validate_key, Error, Store};

#[derive(Debug, Default)]
struct State {
    opened: bool,
    /// 保存编码后的记录而非报文本身，与文件存储走同一套编解码
    entries: HashMap<String, Bytes>,
}

/// 内存中的报文存储，进程退出后数据丢失
///
/// 生命周期和错误语义与 [`FileStore`](super::FileStore) 一致，
/// 适用于不需要持久化的客户端以及测试
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_opened(&self) -> Result<MutexGuard<'_, State>, Error> {
        let state = self.lock();
        if !state.opened {
            return Err(Error::NotOpen);
        }
        Ok(state)
    }
}

impl Store for MemoryStore {
    fn open(&self) -> Result<(), Error> {
        let mut state = self.lock();
        state.opened = true;
        debug!("memory store opened with {} entries", state.entries.len());
        Ok(())
    }

    fn close(&self) -> Result<(), Error> {
        let mut state = self.lock();
        if !state.opened {
            warn!("trying to close unopened memory store");
            return Err(Error::NotOpen);
        }
        state.opened = false;
        Ok(())
    }

    fn put(&self, key: &str, packet: &Packet) -> Result<(), Error> {
        let mut state = self.lock_opened()?;
        validate_key(key)?;
        let data = record::encode(packet)?.freeze();
        state.entries.insert(key.into(), data);
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Packet, Error> {
        let state = self.lock_opened()?;
        validate_key(key)?;
        let data = state
            .entries
            .get(key)
            .ok_or_else(|| Error::KeyNotFound(key.into()))?;
        record::decode(BytesMut::from(&data[..])).map_err(|source| Error::CorruptEntry {
            key: key.into(),
            source,
        })
    }

    fn del(&self, key: &str) -> Result<(), Error> {
        let mut state = self.lock_opened()?;
        validate_key(key)?;
        state.entries.remove(key);
        Ok(())
    }

    fn all(&self) -> Result<Vec<String>, Error> {
        let state = self.lock_opened()?;
        Ok(state.entries.keys().cloned().collect())
    }

    fn reset(&self) -> Result<(), Error> {
        self.lock().entries.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::v4::{PubComp, PubRec};

    #[test]
    fn memory_store_lifecycle() {
        let store = MemoryStore::new();
        assert!(matches!(store.put("i.1", &Packet::PingReq), Err(Error::NotOpen)));
        assert!(matches!(store.close(), Err(Error::NotOpen)));

        store.open().unwrap();
        store.put("i.1", &Packet::PubRec(PubRec { packet_id: 1 })).unwrap();
        store.put("i.2", &Packet::PubComp(PubComp { packet_id: 2 })).unwrap();
        store.del("i.2").unwrap();
        assert!(matches!(store.get("i.2"), Err(Error::KeyNotFound(_))));

        store.close().unwrap();
        assert!(matches!(store.all(), Err(Error::NotOpen)));
        store.open().unwrap();
        assert_eq!(
            store.get("i.1").unwrap(),
            Packet::PubRec(PubRec { packet_id: 1 })
        );

        store.reset().unwrap();
        assert!(store.all().unwrap().is_empty());
    }
}
