use std::{error::Error, path::PathBuf};

use flexi_logger::{FlexiLoggerError, Logger, LoggerHandle};
use gecko_store::config::Config;

/// 环境变量中的配置覆盖，变量名前缀为 `GECKO_`
/// * GECKO_STORE_DIR
/// * GECKO_LOG_LEVEL
#[derive(Debug, Default, serde::Deserialize)]
pub struct Env {
    pub store_dir: Option<PathBuf>,
    pub log_level: Option<String>,
}

impl Env {
    pub fn from_env() -> Result<Self, envy::Error> {
        envy::prefixed("GECKO_").from_env::<Env>()
    }

    pub fn apply(self, cfg: &mut Config) {
        if let Some(dir) = self.store_dir {
            cfg.store.dir = dir;
        }
        if let Some(level) = self.log_level {
            cfg.log.level = level;
        }
    }
}

/// 读取配置文件，并使用环境变量覆盖
pub async fn load_config(path: &str) -> Result<Config, Box<dyn Error>> {
    let mut cfg = Config::from_path(path).await?;
    Env::from_env()?.apply(&mut cfg);
    Ok(cfg)
}

/// RUST_LOG 优先于配置文件中的日志级别
pub fn init_logger(level: &str) -> Result<LoggerHandle, FlexiLoggerError> {
    Logger::try_with_env_or_str(level)?
        .format(flexi_logger::detailed_format)
        .start()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_overrides_config() {
        let mut cfg: Config = "[store]\ndir = \"/tmp/mqtt-store\"".parse().unwrap();
        let env = envy::prefixed("GECKO_")
            .from_iter::<_, Env>(vec![
                ("GECKO_STORE_DIR".to_string(), "/var/lib/gecko".to_string()),
                ("OTHER".to_string(), "x".to_string()),
            ])
            .unwrap();
        env.apply(&mut cfg);

        assert_eq!(cfg.store.dir, PathBuf::from("/var/lib/gecko"));
        assert_eq!(cfg.log.level, "info");
    }
}
