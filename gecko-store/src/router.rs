//! 按主题过滤器分发 publish 消息
//! 每个过滤器绑定一个回调，一条消息可以命中多个过滤器

use std::sync::Arc;

use async_trait::async_trait;
use log::trace;

use crate::{packet::v4::Publish, topic};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Invalid subscribe filter: {0:?}")]
    InvalidFilter(String),
}

/// 收到匹配消息时的回调，由用户实现
#[async_trait]
pub trait Handler: Send + Sync + 'static {
    async fn handle(&self, publish: &Publish);
}

struct Route {
    filter: String,
    handler: Arc<dyn Handler>,
}

#[derive(Default)]
pub struct Router {
    routes: Vec<Route>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册过滤器及其回调，同一个过滤器可以注册多次
    pub fn route<H: Handler>(&mut self, filter: &str, handler: H) -> Result<(), Error> {
        self.route_shared(filter, Arc::new(handler))
    }

    pub fn route_shared(&mut self, filter: &str, handler: Arc<dyn Handler>) -> Result<(), Error> {
        if !topic::valid_subscribe_filter(filter) {
            return Err(Error::InvalidFilter(filter.into()));
        }
        self.routes.push(Route {
            filter: filter.into(),
            handler,
        });
        Ok(())
    }

    /// 已注册的过滤器，按注册顺序
    pub fn filters(&self) -> Vec<&str> {
        self.routes.iter().map(|r| r.filter.as_str()).collect()
    }

    /// 依次调用所有匹配的回调，返回调用的个数
    pub async fn dispatch(&self, publish: &Publish) -> usize {
        let mut handled = 0;
        for route in self.routes.iter() {
            if topic::matches(&publish.topic, &route.filter) {
                route.handler.handle(publish).await;
                handled += 1;
            }
        }
        trace!("publish on {:?} handled by {} routes", publish.topic, handled);
        handled
    }
}
