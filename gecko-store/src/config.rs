use std::{io, path::PathBuf, str::FromStr};

use tokio::{fs, io::AsyncReadExt};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O: {0}")]
    IO(#[from] io::Error),
    #[error("Parse config error: {0}")]
    Parse(#[from] toml::de::Error),
}

#[derive(Debug, serde::Deserialize)]
pub struct Config {
    pub store: Store,
    #[serde(default)]
    pub log: Log,
    #[serde(default)]
    pub routing: Option<Routing>,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct Store {
    /// 存储目录，只对文件存储有效
    pub dir: PathBuf,
    #[serde(default)]
    pub backend: Backend,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    #[default]
    File,
    Memory,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct Log {
    /// 日志级别，如 "info"、"debug"，也可以是 flexi_logger 的完整规则
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for Log {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".into()
}

/// 按主题分发统计消息
#[derive(Debug, Clone, serde::Deserialize)]
pub struct Routing {
    /// broker 节点名，替换过滤器中的 `{node}`
    pub node: String,
    /// 收到多少条消息后结束统计
    #[serde(default = "default_messages")]
    pub messages: usize,
    pub routes: Vec<Route>,
}

fn default_messages() -> usize {
    5
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct Route {
    /// 统计时使用的来源名称
    pub source: String,
    pub filter: String,
}

impl Route {
    pub fn filter_for(&self, node: &str) -> String {
        self.filter.replace("{node}", node)
    }
}

impl Config {
    pub async fn from_path(path: &str) -> Result<Self, Error> {
        let mut file = fs::File::open(path).await?;
        let mut s = String::new();
        file.read_to_string(&mut s).await?;

        s.parse()
    }
}

impl FromStr for Config {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(toml::from_str::<Config>(s)?)
    }
}
