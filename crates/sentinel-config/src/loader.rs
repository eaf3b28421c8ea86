use anyhow::{anyhow, Result};
use config::{Config, Environment, File, FileFormat};
use std::path::{Path, PathBuf};

use crate::SentinelConfig;

const CONFIG_FILE: &str = "sentinel.toml";
const ENV_PREFIX: &str = "SENTINEL";

/// 配置加载器
///
/// 读取 `<dir>/sentinel.toml`（不存在时使用默认值），再叠加
/// `SENTINEL__SECTION__KEY` 形式的环境变量。
pub struct ConfigLoader {
    config_dir: PathBuf,
    use_env: bool,
}

impl ConfigLoader {
    /// 创建配置加载器
    pub fn new<P: AsRef<Path>>(config_dir: P) -> Self {
        Self {
            config_dir: config_dir.as_ref().to_path_buf(),
            use_env: true,
        }
    }

    /// 不读取环境变量（测试用）
    pub fn without_env(mut self) -> Self {
        self.use_env = false;
        self
    }

    pub fn config_path(&self) -> PathBuf {
        self.config_dir.join(CONFIG_FILE)
    }

    /// 加载全局配置
    pub fn load(&self) -> Result<SentinelConfig> {
        let config_path = self.config_path();
        let path_str = config_path
            .to_str()
            .ok_or_else(|| anyhow!("Invalid config path"))?;

        let mut builder = Config::builder()
            .add_source(File::new(path_str, FileFormat::Toml).required(false));

        if self.use_env {
            builder = builder.add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            );
        }

        let config: SentinelConfig = builder.build()?.try_deserialize()?;
        Self::validate(&config)?;

        Ok(config)
    }

    /// 验证配置
    pub fn validate(config: &SentinelConfig) -> Result<()> {
        config.detector.validate().map_err(|e| anyhow!(e))?;

        if config.scheduler.poll_interval_secs == 0 {
            return Err(anyhow!("scheduler.poll_interval_secs must be greater than 0"));
        }

        if config.delivery.free_flush_interval_secs == 0 {
            return Err(anyhow!("delivery.free_flush_interval_secs must be greater than 0"));
        }

        if config.delivery.send_timeout_secs == 0 {
            return Err(anyhow!("delivery.send_timeout_secs must be greater than 0"));
        }

        if config.retry.max_attempts == 0 {
            return Err(anyhow!("retry.max_attempts must be greater than 0"));
        }

        if config.dedup.scheduler_window_secs == 0 || config.dedup.detector_window_secs == 0 {
            return Err(anyhow!("dedup windows must be greater than 0"));
        }

        Ok(())
    }
}
