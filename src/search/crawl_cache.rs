//! Crawl cache / 抓取缓存
//!
//! Shared store of previously expanded child-result sets, keyed by the
//! parent result's stable identity. Entries outlive individual searches,
//! so one query can reuse expansion work done by a prior query.
//! 以父结果的稳定标识为键，跨搜索共享已展开的子结果。
//!
//! No eviction beyond explicit `clear()`; operators are expected to watch
//! `size()` and clear when needed.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use super::schema::RawResult;

pub struct CrawlCache {
    entries: RwLock<HashMap<String, Arc<Vec<RawResult>>>>,
    /// Total cached child count, adjusted while the write lock is held
    /// 缓存的子结果总数，持写锁时更新
    child_count: AtomicU64,
}

impl CrawlCache {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            child_count: AtomicU64::new(0),
        }
    }

    /// 查询缓存，命中返回全部子结果
    pub fn get(&self, key: &str) -> Option<Arc<Vec<RawResult>>> {
        self.entries.read().get(key).cloned()
    }

    /// Insert an expansion, overwriting any prior entry for the key
    /// (last-writer-wins). / 写入展开结果，同键覆盖。
    pub fn put(&self, key: &str, children: Vec<RawResult>) {
        let added = children.len() as u64;
        let mut entries = self.entries.write();
        let removed = entries
            .insert(key.to_string(), Arc::new(children))
            .map(|old| old.len() as u64)
            .unwrap_or(0);
        self.child_count.fetch_add(added, Ordering::SeqCst);
        self.child_count.fetch_sub(removed, Ordering::SeqCst);
    }

    /// Total cached child count / 缓存的子结果总数
    pub fn size(&self) -> u64 {
        self.child_count.load(Ordering::SeqCst)
    }

    /// 清空缓存，允许与其他搜索的读写并发调用
    pub fn clear(&self) {
        let mut entries = self.entries.write();
        entries.clear();
        self.child_count.store(0, Ordering::SeqCst);
    }
}

impl Default for CrawlCache {
    fn default() -> Self {
        Self::new()
    }
}
