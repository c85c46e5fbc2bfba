use std::{
    fs::{self, File},
    io::{self, Write},
    path::{Path, PathBuf},
    sync::{Mutex, MutexGuard, PoisonError},
};

use bytes::BytesMut;
use log::{debug, trace, warn};

use crate::packet::Packet;

use super::{record, validate_key, Error, Store};

const TEMP_SUFFIX: &str = ".tmp";

/// 基于文件系统的报文存储
///
/// 每个 key 对应存储目录下的一个同名文件。写入时先写临时文件 `.<key>.tmp`，
/// 刷盘后再重命名为正式文件，读者只会看到完整写入的记录
#[derive(Debug)]
pub struct FileStore {
    dir: PathBuf,
    /// 是否已打开，这把锁同时串行化所有操作
    opened: Mutex<bool>,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            opened: Mutex::new(false),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn lock(&self) -> MutexGuard<'_, bool> {
        // 持锁线程 panic 不会破坏磁盘上的数据，继续使用即可
        self.opened.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.dir.join(key)
    }

    fn temp_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!(".{}{}", key, TEMP_SUFFIX))
    }

    fn unavailable(path: &Path, source: io::Error) -> Error {
        Error::MediumUnavailable {
            path: path.to_path_buf(),
            source,
        }
    }

    /// 存储目录下的文件，区分正式记录和临时文件
    fn entries(&self) -> Result<Vec<(String, bool)>, Error> {
        let dir = match fs::read_dir(&self.dir) {
            Ok(dir) => dir,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(Self::unavailable(&self.dir, e)),
        };

        let mut entries = Vec::new();
        for entry in dir {
            let entry = entry.map_err(|e| Self::unavailable(&self.dir, e))?;
            let file_type = entry
                .file_type()
                .map_err(|e| Self::unavailable(&entry.path(), e))?;
            if !file_type.is_file() {
                continue;
            }
            // 非 utf-8 文件名不可能是本存储写入的
            let name = match entry.file_name().into_string() {
                Ok(name) => name,
                Err(_) => continue,
            };
            let is_temp = name.starts_with('.') && name.ends_with(TEMP_SUFFIX);
            if is_temp || validate_key(&name).is_ok() {
                entries.push((name, is_temp));
            }
        }

        Ok(entries)
    }

    fn remove(&self, name: &str) -> Result<(), Error> {
        let path = self.dir.join(name);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Self::unavailable(&path, e)),
        }
    }
}

/// 写入临时文件并刷盘，然后原子地替换正式文件
fn write_atomic(dir: &Path, temp: &Path, path: &Path, data: &[u8]) -> io::Result<()> {
    let mut file = File::create(temp)?;
    file.write_all(data)?;
    file.sync_all()?;
    drop(file);
    fs::rename(temp, path)?;
    sync_dir(dir)
}

/// 重命名只有在目录项落盘后才不会因断电丢失
#[cfg(unix)]
fn sync_dir(dir: &Path) -> io::Result<()> {
    File::open(dir)?.sync_all()
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> io::Result<()> {
    Ok(())
}

impl Store for FileStore {
    fn open(&self) -> Result<(), Error> {
        let mut opened = self.lock();
        if *opened {
            debug!("file store {:?} already open", self.dir);
            return Ok(());
        }

        fs::create_dir_all(&self.dir).map_err(|e| Self::unavailable(&self.dir, e))?;

        // 上次中断的写入留下的临时文件
        for (name, is_temp) in self.entries()? {
            if is_temp {
                warn!("remove stale temp file {:?} in {:?}", name, self.dir);
                self.remove(&name)?;
            }
        }

        *opened = true;
        debug!("file store {:?} opened", self.dir);
        Ok(())
    }

    fn close(&self) -> Result<(), Error> {
        let mut opened = self.lock();
        if !*opened {
            warn!("trying to close unopened file store {:?}", self.dir);
            return Err(Error::NotOpen);
        }
        *opened = false;
        debug!("file store {:?} closed", self.dir);
        Ok(())
    }

    fn put(&self, key: &str, packet: &Packet) -> Result<(), Error> {
        let opened = self.lock();
        if !*opened {
            return Err(Error::NotOpen);
        }
        validate_key(key)?;

        let data = record::encode(packet)?;
        let temp = self.temp_path(key);
        let path = self.entry_path(key);
        if let Err(e) = write_atomic(&self.dir, &temp, &path, &data) {
            // 旧记录保持不变，只需清理临时文件
            let _ = fs::remove_file(&temp);
            return Err(Self::unavailable(&path, e));
        }

        trace!("put {:?} ({:?}) into {:?}", key, packet.packet_type(), self.dir);
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Packet, Error> {
        let opened = self.lock();
        if !*opened {
            return Err(Error::NotOpen);
        }
        validate_key(key)?;

        let path = self.entry_path(key);
        let data = match fs::read(&path) {
            Ok(data) => data,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(Error::KeyNotFound(key.into()))
            }
            Err(e) => return Err(Self::unavailable(&path, e)),
        };

        record::decode(BytesMut::from(&data[..])).map_err(|source| Error::CorruptEntry {
            key: key.into(),
            source,
        })
    }

    fn del(&self, key: &str) -> Result<(), Error> {
        let opened = self.lock();
        if !*opened {
            return Err(Error::NotOpen);
        }
        validate_key(key)?;

        self.remove(key)?;
        trace!("del {:?} from {:?}", key, self.dir);
        Ok(())
    }

    fn all(&self) -> Result<Vec<String>, Error> {
        let opened = self.lock();
        if !*opened {
            return Err(Error::NotOpen);
        }

        Ok(self
            .entries()?
            .into_iter()
            .filter(|(_, is_temp)| !is_temp)
            .map(|(name, _)| name)
            .collect())
    }

    fn reset(&self) -> Result<(), Error> {
        let _opened = self.lock();
        let entries = self.entries()?;
        for (name, _) in entries.iter() {
            self.remove(name)?;
        }
        debug!("file store {:?} reset, {} files removed", self.dir, entries.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::HashSet,
        sync::{Arc, Barrier},
        thread,
    };

    use bytes::Bytes;
    use tempfile::{tempdir, TempDir};

    use super::*;
    use crate::packet::{
        v4::{PubRel, Publish, SubAck},
        QoS,
    };

    fn publish(packet_id: u16, payload: &'static str) -> Packet {
        Packet::Publish(Publish {
            dup: false,
            qos: QoS::AtLeastOnce,
            retain: false,
            topic: "/go-mqtt/sample".into(),
            packet_id,
            payload: Bytes::from_static(payload.as_bytes()),
        })
    }

    fn open_store() -> (TempDir, FileStore) {
        let dir = tempdir().unwrap();
        let store = FileStore::new(dir.path().join("mqtt-store"));
        store.open().unwrap();
        (dir, store)
    }

    fn sorted(mut keys: Vec<String>) -> Vec<String> {
        keys.sort();
        keys
    }

    #[test]
    fn put_then_get_returns_same_packet() {
        let (_dir, store) = open_store();
        let packet = publish(1, "this is msg #0!");

        store.put("o.1", &packet).unwrap();
        assert_eq!(store.get("o.1").unwrap(), packet);
    }

    #[test]
    fn put_overwrites_existing_key() {
        let (_dir, store) = open_store();

        store.put("o.1", &publish(1, "first")).unwrap();
        store.put("o.1", &Packet::PubRel(PubRel { packet_id: 1 })).unwrap();

        assert_eq!(
            store.get("o.1").unwrap(),
            Packet::PubRel(PubRel { packet_id: 1 })
        );
        assert_eq!(store.all().unwrap(), vec!["o.1".to_string()]);
    }

    #[test]
    fn unopened_store_rejects_operations() {
        let dir = tempdir().unwrap();
        let store = FileStore::new(dir.path());

        // 每次都得到同样的结果
        for _ in 0..2 {
            assert!(matches!(store.put("o.1", &Packet::PingReq), Err(Error::NotOpen)));
            assert!(matches!(store.get("o.1"), Err(Error::NotOpen)));
            assert!(matches!(store.del("o.1"), Err(Error::NotOpen)));
            assert!(matches!(store.all(), Err(Error::NotOpen)));
            assert!(matches!(store.close(), Err(Error::NotOpen)));
        }
        assert!(!dir.path().join("o.1").exists());
    }

    #[test]
    fn closed_store_rejects_operations() {
        let (_dir, store) = open_store();
        store.put("o.1", &publish(1, "x")).unwrap();
        store.close().unwrap();

        assert!(matches!(store.get("o.1"), Err(Error::NotOpen)));
        assert!(matches!(store.put("o.2", &publish(2, "y")), Err(Error::NotOpen)));
        assert!(matches!(store.close(), Err(Error::NotOpen)));
    }

    #[test]
    fn open_is_idempotent() {
        let (_dir, store) = open_store();
        store.put("o.1", &publish(1, "x")).unwrap();
        store.open().unwrap();
        assert_eq!(store.get("o.1").unwrap(), publish(1, "x"));
    }

    #[test]
    fn deleted_key_is_not_found() {
        let (_dir, store) = open_store();
        store.put("o.1", &publish(1, "x")).unwrap();
        store.del("o.1").unwrap();

        assert!(matches!(store.get("o.1"), Err(Error::KeyNotFound(key)) if key == "o.1"));
        // 删除不存在的 key 不报错
        store.del("o.1").unwrap();
    }

    #[test]
    fn all_lists_remaining_keys() {
        let (_dir, store) = open_store();
        for (id, key) in ["a", "b", "c"].into_iter().enumerate() {
            store.put(key, &publish(id as u16 + 1, "x")).unwrap();
        }
        store.del("b").unwrap();

        assert_eq!(sorted(store.all().unwrap()), vec!["a", "c"]);
    }

    #[test]
    fn reset_clears_everything() {
        let (_dir, store) = open_store();
        for id in 1..=5 {
            store.put(&format!("o.{}", id), &publish(id, "x")).unwrap();
        }
        store.reset().unwrap();
        assert!(store.all().unwrap().is_empty());

        // 未打开时同样可以清空
        store.put("o.1", &publish(1, "x")).unwrap();
        store.close().unwrap();
        store.reset().unwrap();
        store.open().unwrap();
        assert!(store.all().unwrap().is_empty());
    }

    #[test]
    fn data_survives_reopen() {
        let (dir, store) = open_store();
        store.put("i.7", &Packet::PubRel(PubRel { packet_id: 7 })).unwrap();
        store.close().unwrap();
        store.open().unwrap();
        assert_eq!(
            store.get("i.7").unwrap(),
            Packet::PubRel(PubRel { packet_id: 7 })
        );

        // 新的实例指向同一个目录，相当于进程重启
        let restarted = FileStore::new(dir.path().join("mqtt-store"));
        restarted.open().unwrap();
        assert_eq!(restarted.all().unwrap(), vec!["i.7".to_string()]);
    }

    #[test]
    fn stale_temp_files_are_hidden_and_cleaned() {
        let (_dir, store) = open_store();
        store.put("o.1", &publish(1, "old")).unwrap();
        // 模拟写入中途崩溃
        fs::write(store.temp_path("o.1"), b"GKPS\x01\x32").unwrap();

        assert_eq!(store.all().unwrap(), vec!["o.1".to_string()]);
        assert_eq!(store.get("o.1").unwrap(), publish(1, "old"));

        store.close().unwrap();
        store.open().unwrap();
        assert!(!store.temp_path("o.1").exists());
    }

    #[test]
    fn corrupt_entry_is_reported() {
        let (_dir, store) = open_store();
        store.put("o.1", &publish(1, "payload")).unwrap();
        let path = store.entry_path("o.1");
        let data = fs::read(&path).unwrap();
        fs::write(&path, &data[..data.len() - 3]).unwrap();

        assert!(matches!(
            store.get("o.1"),
            Err(Error::CorruptEntry {
                source: record::Error::Truncated(_),
                ..
            })
        ));
    }

    #[test]
    fn open_fails_on_unusable_medium() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("not-a-dir");
        fs::write(&file, b"").unwrap();

        let store = FileStore::new(&file);
        assert!(matches!(store.open(), Err(Error::MediumUnavailable { .. })));
        // 打开失败后仍处于未打开状态
        assert!(matches!(store.all(), Err(Error::NotOpen)));
    }

    #[test]
    fn invalid_keys_are_rejected() {
        let (_dir, store) = open_store();
        assert!(matches!(
            store.put("../escape", &Packet::PingReq),
            Err(Error::InvalidKey(_))
        ));
        assert!(matches!(store.get(".o.1.tmp"), Err(Error::InvalidKey(_))));
    }

    #[test]
    fn unencodable_packet_leaves_old_entry() {
        let (_dir, store) = open_store();
        store.put("o.1", &publish(1, "old")).unwrap();

        // qos1 消息缺少包 id
        assert!(matches!(
            store.put("o.1", &publish(0, "new")),
            Err(Error::InvalidPacket(_))
        ));
        assert_eq!(store.get("o.1").unwrap(), publish(1, "old"));

        // 能编码但读不回来的报文同样不会写入
        let mut dup = Publish::new("/go-mqtt/sample", QoS::AtMostOnce, "new");
        dup.dup = true;
        assert!(matches!(
            store.put("o.1", &Packet::Publish(dup)),
            Err(Error::InvalidPacket(_))
        ));
        let empty = Packet::SubAck(SubAck {
            packet_id: 1,
            return_codes: vec![],
        });
        assert!(matches!(store.put("o.2", &empty), Err(Error::InvalidPacket(_))));

        assert_eq!(store.get("o.1").unwrap(), publish(1, "old"));
        assert_eq!(store.all().unwrap(), vec!["o.1".to_string()]);
    }

    #[test]
    fn failed_write_leaves_old_entry() {
        let (_dir, store) = open_store();
        store.put("o.1", &publish(1, "old")).unwrap();

        // 临时文件的位置被目录占用，写入必然失败
        fs::create_dir(store.temp_path("o.1")).unwrap();

        assert!(matches!(
            store.put("o.1", &publish(1, "new")),
            Err(Error::MediumUnavailable { .. })
        ));
        assert_eq!(store.get("o.1").unwrap(), publish(1, "old"));
        assert_eq!(store.all().unwrap(), vec!["o.1".to_string()]);
    }

    #[test]
    fn concurrent_callers_on_disjoint_keys() {
        const THREADS: usize = 8;
        const KEYS: u16 = 25;

        let (_dir, store) = open_store();
        let store = Arc::new(store);
        let barrier = Arc::new(Barrier::new(THREADS));

        let handles = (0..THREADS)
            .map(|t| {
                let store = store.clone();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    barrier.wait();
                    for i in 1..=KEYS {
                        let key = format!("o.{}-{}", t, i);
                        store.put(&key, &publish(i, "concurrent")).unwrap();
                        assert_eq!(store.get(&key).unwrap(), publish(i, "concurrent"));
                    }
                })
            })
            .collect::<Vec<_>>();
        for handle in handles {
            handle.join().unwrap();
        }

        let keys = store.all().unwrap().into_iter().collect::<HashSet<_>>();
        assert_eq!(keys.len(), THREADS * KEYS as usize);
        for t in 0..THREADS {
            for i in 1..=KEYS {
                let key = format!("o.{}-{}", t, i);
                assert!(keys.contains(&key));
                assert_eq!(store.get(&key).unwrap(), publish(i, "concurrent"));
            }
        }
    }
}
