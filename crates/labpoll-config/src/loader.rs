use anyhow::{anyhow, Result};
use config::{Config, Environment, File, FileFormat};
use std::path::{Path, PathBuf};

use crate::GlobalConfig;

/// 环境变量覆盖前缀，例如 `LABPOLL__POLLING__MAX_RETRIES=3`
pub const DEFAULT_ENV_PREFIX: &str = "LABPOLL";

/// 配置加载器
pub struct ConfigLoader {
    config_dir: PathBuf,
    env_prefix: String,
}

impl ConfigLoader {
    /// 创建配置加载器
    pub fn new<P: AsRef<Path>>(config_dir: P) -> Self {
        Self {
            config_dir: config_dir.as_ref().to_path_buf(),
            env_prefix: DEFAULT_ENV_PREFIX.to_string(),
        }
    }

    /// 使用自定义环境变量前缀
    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    pub fn global_path(&self) -> PathBuf {
        self.config_dir.join("global.toml")
    }

    /// 加载全局配置
    ///
    /// `global.toml` 不存在时使用默认值，环境变量覆盖文件内容
    pub fn load_global(&self) -> Result<GlobalConfig> {
        let config_path = self.global_path();

        let config = Config::builder()
            .add_source(
                File::new(
                    config_path.to_str().ok_or_else(|| anyhow!("Invalid config path"))?,
                    FileFormat::Toml,
                )
                .required(false),
            )
            .add_source(
                Environment::with_prefix(&self.env_prefix)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(config.try_deserialize()?)
    }

    /// 加载并校验全局配置
    pub fn load_validated(&self) -> Result<GlobalConfig> {
        let config = self.load_global()?;
        config.validate()?;
        Ok(config)
    }
}
