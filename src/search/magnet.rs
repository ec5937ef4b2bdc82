//! Magnet resolver / 磁力解析
//!
//! External collaborator turning a magnet identifier into torrent metadata
//! bytes, bounded by a caller-supplied timeout. Crawled performers use it
//! to expand magnet-only listings. / 在超时内将磁力链接解析为种子元数据。

use std::time::Duration;

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use url::Url;

#[async_trait]
pub trait MagnetResolver: Send + Sync {
    /// Resolve a magnet URI into raw torrent bytes. Must honor the timeout
    /// and return promptly; a resolver that produced no data within the
    /// window fails instead of blocking. / 超时内未取得数据即返回失败。
    async fn resolve(&self, magnet: &str, timeout: Duration) -> Result<Vec<u8>>;
}

/// Extract the BitTorrent info hash (`xt=urn:btih:`) / 提取 info hash
pub fn info_hash_of(magnet: &str) -> Option<String> {
    let parsed = Url::parse(magnet).ok()?;
    if parsed.scheme() != "magnet" {
        return None;
    }
    for (key, value) in parsed.query_pairs() {
        if key == "xt" {
            if let Some(hash) = value.strip_prefix("urn:btih:") {
                if !hash.is_empty() {
                    return Some(hash.to_lowercase());
                }
            }
        }
    }
    None
}

/// Extract the display name (`dn`) / 提取显示名称
pub fn display_name_of(magnet: &str) -> Option<String> {
    let parsed = Url::parse(magnet).ok()?;
    if parsed.scheme() != "magnet" {
        return None;
    }
    parsed
        .query_pairs()
        .find(|(key, _)| key == "dn")
        .map(|(_, value)| value.into_owned())
}

/// Resolver backed by an HTTP torrent-cache gateway
/// 基于 HTTP 种子缓存网关的解析器
pub struct HttpMagnetResolver {
    client: reqwest::Client,
    gateway: String,
}

impl HttpMagnetResolver {
    pub fn new(gateway: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            gateway: gateway.into(),
        }
    }
}

#[async_trait]
impl MagnetResolver for HttpMagnetResolver {
    async fn resolve(&self, magnet: &str, timeout: Duration) -> Result<Vec<u8>> {
        let hash = info_hash_of(magnet).ok_or_else(|| anyhow!("invalid magnet uri"))?;
        let url = format!(
            "{}/{}.torrent",
            self.gateway.trim_end_matches('/'),
            urlencoding::encode(&hash)
        );

        let fetch = async {
            let response = self.client.get(&url).timeout(timeout).send().await?;
            if !response.status().is_success() {
                bail!("magnet gateway returned HTTP {}", response.status());
            }
            Ok(response.bytes().await?.to_vec())
        };

        match tokio::time::timeout(timeout, fetch).await {
            Ok(result) => result,
            Err(_) => bail!("magnet resolve timed out after {}ms", timeout.as_millis()),
        }
    }
}
