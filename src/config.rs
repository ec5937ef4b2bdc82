//! Search configuration / 搜索配置
//!
//! Loaded from a JSON file; a default config file is created on first run.
//! 从 JSON 文件加载，首次运行时创建默认配置文件。

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Orchestration configuration / 编排配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Minimum query length in characters / 查询最小字符数
    pub min_query_length: usize,
    /// Maximum query length in characters / 查询最大字符数
    pub max_query_length: usize,
    /// Maximum length of the optional structured query / 结构化查询最大长度
    pub max_xml_query_length: usize,
    /// Worker pool size / 工作池大小
    pub worker_threads: usize,
    /// Per-request connect/read timeout / 单次请求超时
    pub fetch_timeout_ms: u64,
    /// Magnet resolution timeout / 磁力解析超时
    pub magnet_timeout_ms: u64,
    /// HTTP torrent-cache gateway used by the magnet resolver
    /// 磁力解析使用的种子缓存网关
    pub magnet_gateway: String,
}

fn default_worker_threads() -> usize {
    num_cpus::get().clamp(2, 6)
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            min_query_length: 3,
            max_query_length: 30,
            max_xml_query_length: 500,
            worker_threads: default_worker_threads(),
            fetch_timeout_ms: 10_000,
            magnet_timeout_ms: 30_000,
            magnet_gateway: "http://itorrents.org/torrent".to_string(),
        }
    }
}

impl SearchConfig {
    /// 加载配置文件，不存在时写出默认配置
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            let config = Self::default();
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(path, serde_json::to_string_pretty(&config)?)?;
            tracing::info!(path = %path.display(), "default search config created");
            return Ok(config);
        }
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        Ok(config)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }

    pub fn magnet_timeout(&self) -> Duration {
        Duration::from_millis(self.magnet_timeout_ms)
    }
}
