//! 演示自定义报文存储
//!
//! 模拟客户端运行时对存储的调用：发送 qos1 消息时保存，收到 puback 后删除；
//! 连接断开后重新打开存储，把尚未确认的消息取出重发

use clap::Parser;
use demos::{init_logger, load_config};
use gecko_store::{
    packet::{v4::Publish, Packet, QoS},
    store::{self, PacketKey},
    Error, Store,
};
use log::{info, warn};

const TOPIC: &str = "/go-mqtt/sample";

#[derive(Debug, Parser)]
#[clap(about = "Persist in-flight publishes and replay them after a restart")]
struct Args {
    /// 配置文件路径
    #[clap(short, long, default_value = "./custom_store.toml")]
    config: String,
    /// 发送的消息条数
    #[clap(short, long, default_value_t = 5)]
    messages: u16,
    /// 结束时清空存储
    #[clap(long)]
    reset: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let cfg = load_config(&args.config).await?;
    let _logger = init_logger(&cfg.log.level)?;

    let store = store::from_config(&cfg.store);
    run(store.as_ref(), &args)?;
    Ok(())
}

fn run(store: &dyn Store, args: &Args) -> Result<(), Error> {
    store.open()?;

    // 第一次连接：发送消息，只有偶数号收到了 puback
    for id in 1..=args.messages {
        let mut publish = Publish::new(TOPIC, QoS::AtLeastOnce, format!("this is msg #{}!", id));
        publish.packet_id = id;
        let key = PacketKey::outbound(id).to_string();
        store.put(&key, &Packet::Publish(publish))?;
        info!("publish {} stored", key);

        if id % 2 == 0 {
            store.del(&key)?;
            info!("puback {} received", key);
        }
    }

    // 连接断开
    store.close()?;
    info!("connection lost, store closed");

    // 重新连接，重发所有未确认的消息
    store.open()?;
    let mut keys = store
        .all()?
        .into_iter()
        .filter_map(|key| match key.parse::<PacketKey>() {
            Ok(parsed) => Some((parsed, key)),
            Err(e) => {
                warn!("skip entry: {}", e);
                None
            }
        })
        .collect::<Vec<_>>();
    keys.sort_by_key(|(parsed, _)| parsed.packet_id);
    info!("{} messages awaiting acknowledgment", keys.len());

    for (_, key) in keys {
        match store.get(&key)? {
            Packet::Publish(mut publish) => {
                publish.dup = true;
                info!(
                    "resend {} on {}: {}",
                    key,
                    publish.topic,
                    String::from_utf8_lossy(&publish.payload)
                );
                store.put(&key, &Packet::Publish(publish))?;
                store.del(&key)?;
                info!("puback {} received", key);
            }
            packet => warn!("unexpected {:?} stored under {}", packet.packet_type(), key),
        }
    }

    if args.reset {
        store.reset()?;
        info!("store reset");
    }
    info!("{} entries left in store", store.all()?.len());

    store.close()?;
    Ok(())
}
