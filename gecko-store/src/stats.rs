//! 多个来源的消息汇聚到一个消费者，按来源计数
//!
//! 各个 [`Forward`] 回调持有同一个 channel 的发送端，把带来源标签的事件发给
//! [`Aggregator`]，计数只由 aggregator 自己维护

use std::collections::HashMap;

use async_trait::async_trait;
use bytes::Bytes;
use log::{debug, warn};
use tokio::sync::mpsc::{self, Receiver, Sender};

use crate::{packet::v4::Publish, router::Handler};

/// 一条带来源标签的消息
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatEvent {
    pub source: String,
    pub topic: String,
    pub payload: Bytes,
}

pub type StatSender = Sender<StatEvent>;

pub struct Aggregator {
    rx: Receiver<StatEvent>,
    /// key = source
    counts: HashMap<String, u64>,
    total: u64,
}

impl Aggregator {
    /// 创建 aggregator 及其 channel 的发送端
    /// 所有发送端都被 drop 后，[`Aggregator::collect`] 会提前返回
    /// capacity 为 0 时按 1 处理
    pub fn new(capacity: usize) -> (Self, StatSender) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let aggregator = Self {
            rx,
            counts: HashMap::new(),
            total: 0,
        };
        (aggregator, tx)
    }

    /// 接收至多 n 条事件并计数，返回实际接收的条数
    pub async fn collect(&mut self, n: usize) -> usize {
        let mut received = 0;
        while received < n {
            match self.rx.recv().await {
                Some(event) => {
                    debug!("[{}] {:?}", event.source, event.topic);
                    *self.counts.entry(event.source).or_insert(0) += 1;
                    self.total += 1;
                    received += 1;
                }
                None => {
                    debug!("all stat senders dropped after {} events", received);
                    break;
                }
            }
        }
        received
    }

    pub fn count(&self, source: &str) -> u64 {
        self.counts.get(source).copied().unwrap_or(0)
    }

    pub fn counts(&self) -> &HashMap<String, u64> {
        &self.counts
    }

    pub fn total(&self) -> u64 {
        self.total
    }
}

/// 把匹配的消息打上来源标签转发给 aggregator
pub struct Forward {
    source: String,
    tx: StatSender,
}

impl Forward {
    pub fn new(source: impl Into<String>, tx: StatSender) -> Self {
        Self {
            source: source.into(),
            tx,
        }
    }
}

#[async_trait]
impl Handler for Forward {
    async fn handle(&self, publish: &Publish) {
        let event = StatEvent {
            source: self.source.clone(),
            topic: publish.topic.clone(),
            payload: publish.payload.clone(),
        };
        if self.tx.send(event).await.is_err() {
            warn!("aggregator gone, drop stat event from {}", self.source);
        }
    }
}
