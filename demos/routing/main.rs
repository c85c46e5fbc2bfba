//! 演示按主题订阅的回调
//!
//! 为 broker 的三个统计主题分别注册回调，回调把消息转发给同一个 aggregator，
//! 收到指定条数的消息后输出每个主题收到的消息数

use std::time::Duration;

use async_trait::async_trait;
use clap::Parser;
use demos::{init_logger, load_config};
use gecko_store::{
    config::Routing,
    packet::{v4::Publish, QoS},
    router::{Handler, Router},
    stats::{Aggregator, Forward},
    Error,
};
use log::{info, warn};
use tokio::time;

#[derive(Debug, Parser)]
#[clap(about = "Count broker statistics messages per subscription")]
struct Args {
    /// 配置文件路径
    #[clap(short, long, default_value = "./routing.toml")]
    config: String,
    /// 覆盖配置中的消息条数
    #[clap(short, long)]
    messages: Option<usize>,
    /// 模拟 broker 发布统计消息的间隔，毫秒
    #[clap(long, default_value_t = 200, value_parser = clap::value_parser!(u64).range(1..))]
    interval: u64,
    /// 等待统计消息的最长时间，秒
    #[clap(long, default_value_t = 30, value_parser = clap::value_parser!(u64).range(1..))]
    timeout: u64,
}

/// 打印收到的消息
struct Print(String);

#[async_trait]
impl Handler for Print {
    async fn handle(&self, publish: &Publish) {
        info!(
            "{:<16} [{}]  {}",
            self.0,
            publish.topic,
            String::from_utf8_lossy(&publish.payload)
        );
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let cfg = load_config(&args.config).await?;
    let _logger = init_logger(&cfg.log.level)?;

    let mut routing = cfg.routing.ok_or("missing [routing] section in config")?;
    if let Some(messages) = args.messages {
        routing.messages = messages;
    }

    run(
        routing,
        Duration::from_millis(args.interval),
        Duration::from_secs(args.timeout),
    )
    .await?;
    Ok(())
}

async fn run(routing: Routing, interval: Duration, timeout: Duration) -> Result<(), Error> {
    let (mut aggregator, tx) = Aggregator::new(100);

    let mut router = Router::new();
    for route in routing.routes.iter() {
        let filter = route.filter_for(&routing.node);
        router.route(&filter, Print(format!("{}Handler", route.source)))?;
        router.route(&filter, Forward::new(route.source.clone(), tx.clone()))?;
    }
    // 只保留 router 中的发送端，router 结束后 aggregator 也随之结束
    drop(tx);

    let node = routing.node.clone();
    let feed = tokio::spawn(async move {
        let topics = ["clients", "sessions", "topics", "subscriptions"]
            .map(|stat| format!("$SYS/brokers/{}/stats/{}/count", node, stat));
        let mut ticker = time::interval(interval);
        for round in 0u64.. {
            ticker.tick().await;
            let topic = &topics[round as usize % topics.len()];
            let publish = Publish::new(topic.as_str(), QoS::AtMostOnce, round.to_string());
            router.dispatch(&publish).await;
        }
    });

    info!("Start to listen");
    // 没有过滤器匹配模拟的主题时，collect 永远等不到消息
    if time::timeout(timeout, aggregator.collect(routing.messages))
        .await
        .is_err()
    {
        warn!("no more messages after {:?}", timeout);
    }
    feed.abort();
    let received = aggregator.total();

    for route in routing.routes.iter() {
        info!(
            "Received {:3} {} messages",
            aggregator.count(&route.source),
            route.source
        );
    }
    info!("Received {} messages in total", received);

    Ok(())
}
