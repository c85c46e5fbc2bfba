//! mqtt 客户端的报文持久化库
//!
//! 客户端运行时把尚未确认的报文交给 [`store::Store`] 保存，进程重启后取回继续投递。
//! 报文以 mqtt 3.1.1 的线上格式落盘，固定头中的报文类型使得读取时无需猜测类型

pub mod config;
pub mod error;
pub mod packet;
pub mod router;
pub mod stats;
pub mod store;
pub mod topic;

pub use error::Error;
pub use store::{FileStore, MemoryStore, Store};
