//! 应用配置和持久化
//!
//! 提供端口、下载目录、超时等设置的存储和读取。
//! 命令行参数只覆盖单次运行，不会写回配置文件。

use log::debug;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::transfer::{
    CHUNK_SIZE, DEFAULT_ACCEPT_TIMEOUT, DEFAULT_CONNECT_TIMEOUT, DEFAULT_PORT, ReceiveOptions,
    SendOptions, WireFormat,
};

/// 应用设置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    /// 发送目标端口 / 接收监听端口
    pub port: u16,
    /// 上次使用的接收端地址
    pub recipient: Option<String>,
    /// 下载目录
    pub download_dir: PathBuf,
    /// 连接超时 (秒)
    pub connect_timeout_secs: u64,
    /// accept 超时 (秒)
    pub accept_timeout_secs: u64,
    /// 分块大小 (字节)
    pub chunk_size: usize,
    /// 文件名字段格式
    pub wire_format: WireFormat,
    /// 截断的文件视为失败
    pub strict_receive: bool,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            recipient: None,
            download_dir: dirs::download_dir().unwrap_or_else(|| PathBuf::from(".")),
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT.as_secs(),
            accept_timeout_secs: DEFAULT_ACCEPT_TIMEOUT.as_secs(),
            chunk_size: CHUNK_SIZE,
            wire_format: WireFormat::default(),
            strict_receive: false,
        }
    }
}

impl AppSettings {
    /// 获取配置文件路径
    pub fn config_path() -> PathBuf {
        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("wifisender");
        config_dir.join("settings.toml")
    }

    /// 加载设置（如果文件不存在则使用默认值）
    pub fn load() -> Self {
        Self::load_from(&Self::config_path())
    }

    pub fn load_from(path: &Path) -> Self {
        if path.exists() {
            match fs::read_to_string(path) {
                Ok(content) => match toml::from_str(&content) {
                    Ok(settings) => {
                        debug!("Loaded settings from {:?}", path);
                        return settings;
                    }
                    Err(e) => {
                        log::warn!("Failed to parse settings: {}, using defaults", e);
                    }
                },
                Err(e) => {
                    log::warn!("Failed to read settings file: {}, using defaults", e);
                }
            }
        }
        Self::default()
    }

    /// 保存设置
    pub fn save(&self) -> anyhow::Result<()> {
        self.save_to(&Self::config_path())
    }

    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        debug!("Saved settings to {:?}", path);
        Ok(())
    }

    /// 按字段名修改一项设置，`wifisender config set` 使用
    pub fn set(&mut self, key: &str, value: &str) -> anyhow::Result<()> {
        let value = value.trim();
        match key {
            "port" => self.port = value.parse()?,
            "recipient" => {
                self.recipient = (!value.is_empty()).then(|| value.to_string());
            }
            "download_dir" => self.download_dir = PathBuf::from(value),
            "connect_timeout_secs" => self.connect_timeout_secs = value.parse()?,
            "accept_timeout_secs" => self.accept_timeout_secs = value.parse()?,
            "chunk_size" => {
                let size: usize = value.parse()?;
                anyhow::ensure!(size > 0, "chunk_size must be positive");
                self.chunk_size = size;
            }
            "wire_format" => {
                self.wire_format = value.parse().map_err(anyhow::Error::msg)?;
            }
            "strict_receive" => self.strict_receive = value.parse()?,
            other => anyhow::bail!("unknown setting '{other}'"),
        }
        Ok(())
    }

    /// 发送端选项
    pub fn send_options(&self) -> SendOptions {
        SendOptions {
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            chunk_size: self.chunk_size.max(1),
            wire_format: self.wire_format,
        }
    }

    /// 接收端选项
    pub fn receive_options(&self) -> ReceiveOptions {
        ReceiveOptions {
            port: self.port,
            output_dir: self.download_dir.clone(),
            accept_timeout: Duration::from_secs(self.accept_timeout_secs.max(1)),
            chunk_size: self.chunk_size.max(1),
            wire_format: self.wire_format,
            strict: self.strict_receive,
            ..Default::default()
        }
    }
}
