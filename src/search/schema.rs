//! Search data model / 搜索数据模型
//!
//! Defines the result types flowing through the orchestration pipeline:
//! raw engine results, the crawled parent/child relation, and the
//! display-ready wrapper delivered to the UI layer.
//! 原始结果、父子抓取关系、以及交付给展示层的包装类型。

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Token naming one logical search session / 一次搜索会话的令牌
pub type SearchToken = u64;

/// Sentinel returned when query validation fails / 校验失败时返回的哨兵值
pub const INVALID_TOKEN: SearchToken = 0;

/// Query validation result / 查询校验结果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryValidation {
    Valid,
    Empty,
    TooShort,
    TooLong,
    XmlTooLong,
}

/// Search query / 搜索查询
///
/// Immutable value; validated before any performer is dispatched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchQuery {
    /// Free-text keywords / 关键词
    pub keywords: String,
    /// Optional structured query, validated separately / 可选的结构化查询
    pub xml: Option<String>,
    /// Locale tag, e.g. "en_US" / 区域设置
    pub locale: String,
}

impl SearchQuery {
    pub fn new(keywords: impl Into<String>) -> Self {
        Self {
            keywords: keywords.into(),
            xml: None,
            locale: "en_US".to_string(),
        }
    }

    pub fn with_locale(mut self, locale: impl Into<String>) -> Self {
        self.locale = locale.into();
        self
    }

    pub fn with_xml(mut self, xml: impl Into<String>) -> Self {
        self.xml = Some(xml.into());
        self
    }
}

/// Torrent attributes carried by listing results / 种子列表结果的属性
#[derive(Debug, Clone)]
pub struct TorrentInfo {
    pub filename: String,
    pub size: u64,
    pub magnet: String,
    pub info_hash: String,
    pub seeds: u32,
    /// Whether this listing expands into per-file child results / 是否可展开为子结果
    pub crawlable: bool,
}

/// Result variant tag / 结果变体标签
///
/// Converters and the filter dispatch on this tag; capability accessors on
/// [`RawResult`] replace per-type inspection.
#[derive(Debug, Clone)]
pub enum ResultKind {
    /// Flat result with no file attributes / 普通结果
    Plain,
    /// Single-file result / 单文件结果
    File { filename: String, size: u64 },
    /// Torrent listing, possibly crawlable / 种子列表结果
    Torrent(TorrentInfo),
    /// Child expanded from a crawlable parent. The parent reference is
    /// navigation-only. / 从父结果展开的子结果，父引用仅用于回溯
    Crawled {
        parent: Arc<RawResult>,
        filename: String,
        size: u64,
    },
}

/// Raw result emitted by a performer / 执行器产出的原始结果
#[derive(Debug, Clone)]
pub struct RawResult {
    pub display_name: String,
    /// Name of the engine that produced it / 产出引擎的名称
    pub source: String,
    pub detail_url: String,
    pub kind: ResultKind,
}

impl RawResult {
    pub fn filename(&self) -> Option<&str> {
        match &self.kind {
            ResultKind::Plain => None,
            ResultKind::File { filename, .. } => Some(filename),
            ResultKind::Torrent(info) => Some(&info.filename),
            ResultKind::Crawled { filename, .. } => Some(filename),
        }
    }

    pub fn size(&self) -> Option<u64> {
        match &self.kind {
            ResultKind::Plain => None,
            ResultKind::File { size, .. } => Some(*size),
            ResultKind::Torrent(info) => Some(info.size),
            ResultKind::Crawled { size, .. } => Some(*size),
        }
    }

    pub fn seeds(&self) -> u32 {
        match &self.kind {
            ResultKind::Torrent(info) => info.seeds,
            ResultKind::Crawled { parent, .. } => parent.seeds(),
            _ => 0,
        }
    }

    pub fn is_crawled(&self) -> bool {
        matches!(self.kind, ResultKind::Crawled { .. })
    }

    /// Parent of a crawled child, navigation only / 子结果的父结果，仅用于回溯
    pub fn crawl_parent(&self) -> Option<&Arc<RawResult>> {
        match &self.kind {
            ResultKind::Crawled { parent, .. } => Some(parent),
            _ => None,
        }
    }

    /// Whether this result expands into children / 是否声明了子结果
    pub fn declares_children(&self) -> bool {
        matches!(&self.kind, ResultKind::Torrent(info) if info.crawlable)
    }

    /// Stable identity used as the crawl cache key. Independent of the
    /// search token so cached expansions outlive individual searches.
    /// 抓取缓存键，与搜索令牌无关，可跨搜索复用。
    pub fn crawl_key(&self) -> Option<String> {
        match &self.kind {
            ResultKind::Torrent(info) => {
                if info.info_hash.is_empty() {
                    Some(self.detail_url.clone())
                } else {
                    Some(info.info_hash.to_lowercase())
                }
            }
            _ => None,
        }
    }
}

/// Display category tag / 展示类别标签
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisplayKind {
    Plain,
    File,
    Torrent,
    TorrentFile,
}

/// Render-ready result delivered to a display surface / 交付给展示层的结果
#[derive(Debug, Clone, Serialize)]
pub struct DisplayResult {
    pub token: SearchToken,
    pub engine: String,
    pub query: String,
    pub display_name: String,
    pub filename: Option<String>,
    pub size: Option<u64>,
    pub seeds: u32,
    pub detail_url: String,
    pub kind: DisplayKind,
    pub received_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn torrent_result(name: &str, hash: &str, crawlable: bool) -> RawResult {
        RawResult {
            display_name: name.to_string(),
            source: "mock".to_string(),
            detail_url: format!("http://example.com/{}", hash),
            kind: ResultKind::Torrent(TorrentInfo {
                filename: format!("{}.torrent", name),
                size: 1024,
                magnet: format!("magnet:?xt=urn:btih:{}", hash),
                info_hash: hash.to_string(),
                seeds: 12,
                crawlable,
            }),
        }
    }

    #[test]
    fn test_crawl_key_prefers_info_hash() {
        let r = torrent_result("ubuntu", "ABCDEF0123", true);
        assert_eq!(r.crawl_key().unwrap(), "abcdef0123");
    }

    #[test]
    fn test_crawl_key_falls_back_to_detail_url() {
        let mut r = torrent_result("ubuntu", "", true);
        if let ResultKind::Torrent(ref info) = r.kind {
            assert!(info.info_hash.is_empty());
        }
        r.detail_url = "http://example.com/ubuntu".to_string();
        assert_eq!(r.crawl_key().unwrap(), "http://example.com/ubuntu");
    }

    #[test]
    fn test_crawled_child_capabilities() {
        let parent = Arc::new(torrent_result("ubuntu", "abc", true));
        let child = RawResult {
            display_name: "ubuntu.iso".to_string(),
            source: "mock".to_string(),
            detail_url: parent.detail_url.clone(),
            kind: ResultKind::Crawled {
                parent: parent.clone(),
                filename: "ubuntu.iso".to_string(),
                size: 700,
            },
        };
        assert!(child.is_crawled());
        assert_eq!(child.crawl_parent().unwrap().display_name, "ubuntu");
        assert_eq!(child.filename(), Some("ubuntu.iso"));
        assert_eq!(child.seeds(), 12);
        assert!(child.crawl_key().is_none());
        assert!(!child.declares_children());
    }

    #[test]
    fn test_plain_result_has_no_file_capabilities() {
        let r = RawResult {
            display_name: "hello".to_string(),
            source: "mock".to_string(),
            detail_url: String::new(),
            kind: ResultKind::Plain,
        };
        assert_eq!(r.filename(), None);
        assert_eq!(r.size(), None);
        assert_eq!(r.seeds(), 0);
        assert!(r.crawl_key().is_none());
    }
}
