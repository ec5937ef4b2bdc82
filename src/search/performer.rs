//! Search performers / 搜索执行器
//!
//! A performer is one engine's execution of one search token. It runs on
//! the manager's worker pool, checks its stop flag between fetch stages
//! and emits result batches through a [`BatchSink`].
//! 执行器在工作池上运行，阶段之间检查停止标志，通过 BatchSink 产出批次。
//!
//! Two shapes are provided: / 提供两种形态：
//! - [`WebSearchPerformer`]: single fetch / 单次抓取
//! - [`CrawledSearchPerformer`]: parent page plus cached child expansion
//!   / 父页面加子结果展开（带缓存）

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use super::crawl_cache::CrawlCache;
use super::magnet::MagnetResolver;
use super::manager::BatchSink;
use super::schema::{RawResult, SearchToken};

/// Stop flag shared between the performer and the manager. Monotonic:
/// once set it never resets. / 停止标志，一经置位不再复位。
#[derive(Debug, Default)]
pub struct PerformerControl {
    stopped: AtomicBool,
}

impl PerformerControl {
    pub fn new() -> Self {
        Self {
            stopped: AtomicBool::new(false),
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }
}

/// One engine's unit of work for one token. Never reused across tokens.
/// 单引擎单令牌的工作单元，不跨令牌复用。
#[async_trait]
pub trait SearchPerformer: Send + Sync {
    fn token(&self) -> SearchToken;

    /// Engine identity, matches `RawResult::source` / 引擎标识
    fn source(&self) -> &str;

    fn control(&self) -> &Arc<PerformerControl>;

    /// Execute the engine-specific fetch logic, emitting batches through
    /// the sink. Network and parse failures end this run only; they never
    /// touch sibling performers. / 失败只终止本执行器。
    async fn run(&self, sink: BatchSink) -> anyhow::Result<()>;

    /// Idempotent, non-blocking / 幂等且不阻塞
    fn stop(&self) {
        self.control().stop();
    }

    fn is_stopped(&self) -> bool {
        self.control().is_stopped()
    }
}

/// Engine callback for single-stage performers / 单阶段引擎回调
#[async_trait]
pub trait FetchEngine: Send + Sync {
    async fn fetch(&self, query: &str) -> anyhow::Result<Vec<RawResult>>;
}

/// Single-stage performer: one fetch, one batch / 单阶段执行器
pub struct WebSearchPerformer<E: FetchEngine> {
    id: Uuid,
    token: SearchToken,
    query: String,
    source: String,
    control: Arc<PerformerControl>,
    engine: E,
}

impl<E: FetchEngine> WebSearchPerformer<E> {
    pub fn new(token: SearchToken, query: impl Into<String>, source: impl Into<String>, engine: E) -> Self {
        Self {
            id: Uuid::new_v4(),
            token,
            query: query.into(),
            source: source.into(),
            control: Arc::new(PerformerControl::new()),
            engine,
        }
    }
}

#[async_trait]
impl<E: FetchEngine> SearchPerformer for WebSearchPerformer<E> {
    fn token(&self) -> SearchToken {
        self.token
    }

    fn source(&self) -> &str {
        &self.source
    }

    fn control(&self) -> &Arc<PerformerControl> {
        &self.control
    }

    async fn run(&self, sink: BatchSink) -> anyhow::Result<()> {
        if self.is_stopped() {
            return Ok(());
        }
        let results = self.engine.fetch(&self.query).await?;
        if self.is_stopped() {
            return Ok(());
        }
        tracing::debug!(
            performer = %self.id,
            source = %self.source,
            count = results.len(),
            "fetch complete"
        );
        sink.deliver(results);
        Ok(())
    }
}

/// Engine callback for crawled performers / 多阶段引擎回调
#[async_trait]
pub trait CrawlEngine: Send + Sync {
    /// Fetch the parent listing page / 抓取父页面
    async fn search_page(&self, query: &str) -> anyhow::Result<Vec<RawResult>>;

    /// Magnet URI for parents whose expansion needs torrent metadata,
    /// `None` when the engine can expand without it / 需要磁力解析时返回链接
    fn magnet_uri(&self, parent: &RawResult) -> Option<String>;

    /// Expand one parent into its child results / 将父结果展开为子结果
    async fn crawl(&self, parent: &Arc<RawResult>, torrent_data: Option<Vec<u8>>)
        -> anyhow::Result<Vec<RawResult>>;
}

/// Multi-stage performer with shared expansion cache / 带共享缓存的多阶段执行器
///
/// Expansion order per crawlable parent: cache lookup, then network fetch
/// (magnet resolution first when required), then cache write and emission.
/// The stop flag is checked between every stage; a stop observed after a
/// fetch suppresses both the cache write and the emission, so the cache
/// never holds a stopped run's partial page.
pub struct CrawledSearchPerformer<E: CrawlEngine> {
    id: Uuid,
    token: SearchToken,
    query: String,
    source: String,
    control: Arc<PerformerControl>,
    engine: E,
    cache: Arc<CrawlCache>,
    magnet: Arc<dyn MagnetResolver>,
    magnet_timeout: Duration,
}

impl<E: CrawlEngine> CrawledSearchPerformer<E> {
    pub fn new(
        token: SearchToken,
        query: impl Into<String>,
        source: impl Into<String>,
        engine: E,
        cache: Arc<CrawlCache>,
        magnet: Arc<dyn MagnetResolver>,
        magnet_timeout: Duration,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            token,
            query: query.into(),
            source: source.into(),
            control: Arc::new(PerformerControl::new()),
            engine,
            cache,
            magnet,
            magnet_timeout,
        }
    }
}

#[async_trait]
impl<E: CrawlEngine> SearchPerformer for CrawledSearchPerformer<E> {
    fn token(&self) -> SearchToken {
        self.token
    }

    fn source(&self) -> &str {
        &self.source
    }

    fn control(&self) -> &Arc<PerformerControl> {
        &self.control
    }

    async fn run(&self, sink: BatchSink) -> anyhow::Result<()> {
        if self.is_stopped() {
            return Ok(());
        }
        let parents: Vec<Arc<RawResult>> = self
            .engine
            .search_page(&self.query)
            .await?
            .into_iter()
            .map(Arc::new)
            .collect();
        if self.is_stopped() {
            return Ok(());
        }

        sink.deliver(parents.iter().map(|p| (**p).clone()).collect());

        for parent in &parents {
            if self.is_stopped() {
                break;
            }
            if !parent.declares_children() {
                continue;
            }
            let Some(key) = parent.crawl_key() else {
                continue;
            };

            if let Some(children) = self.cache.get(&key) {
                tracing::debug!(performer = %self.id, key = %key, "crawl cache hit");
                sink.deliver(children.as_ref().clone());
                continue;
            }

            let torrent_data = match self.engine.magnet_uri(parent) {
                Some(magnet) => match self.magnet.resolve(&magnet, self.magnet_timeout).await {
                    Ok(data) => Some(data),
                    Err(e) => {
                        tracing::debug!(
                            performer = %self.id,
                            key = %key,
                            error = %e,
                            "magnet resolve failed, skipping parent"
                        );
                        continue;
                    }
                },
                None => None,
            };
            if self.is_stopped() {
                break;
            }

            let children = self.engine.crawl(parent, torrent_data).await?;

            // fetch happened outside any lock; a stop observed here means
            // neither cache write nor emission
            if self.is_stopped() {
                break;
            }
            self.cache.put(&key, children.clone());
            sink.deliver(children);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::schema::{ResultKind, TorrentInfo};
    use anyhow::bail;
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::mpsc;
    use tokio::sync::Notify;

    fn listing(name: &str, hash: &str, magnet_only: bool) -> RawResult {
        RawResult {
            display_name: name.to_string(),
            source: "mock".to_string(),
            detail_url: format!("http://tracker.example/{}", hash),
            kind: ResultKind::Torrent(TorrentInfo {
                filename: format!("{}.torrent", name),
                size: 2048,
                magnet: if magnet_only {
                    format!("magnet:?xt=urn:btih:{}", hash)
                } else {
                    String::new()
                },
                info_hash: hash.to_string(),
                seeds: 5,
                crawlable: true,
            }),
        }
    }

    fn child_of(parent: &Arc<RawResult>, name: &str) -> RawResult {
        RawResult {
            display_name: name.to_string(),
            source: parent.source.clone(),
            detail_url: parent.detail_url.clone(),
            kind: ResultKind::Crawled {
                parent: parent.clone(),
                filename: name.to_string(),
                size: 64,
            },
        }
    }

    struct StaticCrawlEngine {
        parents: Vec<RawResult>,
        crawl_calls: AtomicUsize,
        gate: Option<Arc<Notify>>,
        magnet_only: bool,
    }

    #[async_trait]
    impl CrawlEngine for StaticCrawlEngine {
        async fn search_page(&self, _query: &str) -> anyhow::Result<Vec<RawResult>> {
            Ok(self.parents.clone())
        }

        fn magnet_uri(&self, parent: &RawResult) -> Option<String> {
            if !self.magnet_only {
                return None;
            }
            match &parent.kind {
                ResultKind::Torrent(info) if !info.magnet.is_empty() => Some(info.magnet.clone()),
                _ => None,
            }
        }

        async fn crawl(
            &self,
            parent: &Arc<RawResult>,
            _torrent_data: Option<Vec<u8>>,
        ) -> anyhow::Result<Vec<RawResult>> {
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            self.crawl_calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![child_of(parent, "file-a"), child_of(parent, "file-b")])
        }
    }

    struct NullResolver {
        fail: bool,
    }

    #[async_trait]
    impl MagnetResolver for NullResolver {
        async fn resolve(&self, _magnet: &str, _timeout: Duration) -> anyhow::Result<Vec<u8>> {
            if self.fail {
                bail!("resolver offline");
            }
            Ok(vec![1, 2, 3])
        }
    }

    fn sink_pair(
        token: SearchToken,
        control: &Arc<PerformerControl>,
    ) -> (
        BatchSink,
        mpsc::UnboundedReceiver<crate::search::manager::SearchEvent>,
    ) {
        let (tx, rx) = mpsc::unbounded_channel();
        (BatchSink::new(token, "mock", control.clone(), tx), rx)
    }

    fn crawled(
        engine: StaticCrawlEngine,
        cache: Arc<CrawlCache>,
        resolver: NullResolver,
    ) -> CrawledSearchPerformer<StaticCrawlEngine> {
        CrawledSearchPerformer::new(
            7,
            "ubuntu",
            "mock",
            engine,
            cache,
            Arc::new(resolver),
            Duration::from_millis(100),
        )
    }

    fn batch_count(rx: &mut mpsc::UnboundedReceiver<crate::search::manager::SearchEvent>) -> usize {
        let mut batches = 0;
        while rx.try_recv().is_ok() {
            batches += 1;
        }
        batches
    }

    #[tokio::test]
    async fn test_crawl_miss_writes_cache_and_emits() {
        let cache = Arc::new(CrawlCache::new());
        let engine = StaticCrawlEngine {
            parents: vec![listing("ubuntu", "aa11", false)],
            crawl_calls: AtomicUsize::new(0),
            gate: None,
            magnet_only: false,
        };
        let performer = crawled(engine, cache.clone(), NullResolver { fail: false });
        let (sink, mut rx) = sink_pair(7, performer.control());

        performer.run(sink).await.unwrap();

        assert_eq!(performer.engine.crawl_calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.get("aa11").unwrap().len(), 2);
        // one parent batch plus one child batch
        assert_eq!(batch_count(&mut rx), 2);
    }

    #[tokio::test]
    async fn test_crawl_hit_skips_network() {
        let cache = Arc::new(CrawlCache::new());
        let parent = Arc::new(listing("ubuntu", "aa11", false));
        cache.put("aa11", vec![child_of(&parent, "cached-file")]);

        let engine = StaticCrawlEngine {
            parents: vec![listing("ubuntu", "aa11", false)],
            crawl_calls: AtomicUsize::new(0),
            gate: None,
            magnet_only: false,
        };
        let performer = crawled(engine, cache.clone(), NullResolver { fail: false });
        let (sink, mut rx) = sink_pair(7, performer.control());

        performer.run(sink).await.unwrap();

        assert_eq!(performer.engine.crawl_calls.load(Ordering::SeqCst), 0);
        assert_eq!(batch_count(&mut rx), 2);
    }

    #[tokio::test]
    async fn test_stop_during_crawl_suppresses_cache_write_and_emission() {
        let cache = Arc::new(CrawlCache::new());
        let gate = Arc::new(Notify::new());
        let engine = StaticCrawlEngine {
            parents: vec![listing("ubuntu", "aa11", false)],
            crawl_calls: AtomicUsize::new(0),
            gate: Some(gate.clone()),
            magnet_only: false,
        };
        let performer = Arc::new(crawled(engine, cache.clone(), NullResolver { fail: false }));
        let (sink, mut rx) = sink_pair(7, performer.control());

        let runner = {
            let performer = performer.clone();
            tokio::spawn(async move { performer.run(sink).await })
        };
        // wait until the parent batch was emitted, then stop mid-crawl
        tokio::time::sleep(Duration::from_millis(20)).await;
        performer.stop();
        gate.notify_one();
        runner.await.unwrap().unwrap();

        assert!(cache.get("aa11").is_none());
        // only the parent batch made it out
        assert_eq!(batch_count(&mut rx), 1);
    }

    #[tokio::test]
    async fn test_magnet_failure_skips_parent_without_aborting() {
        let cache = Arc::new(CrawlCache::new());
        let engine = StaticCrawlEngine {
            parents: vec![listing("ubuntu", "aa11", true), listing("debian", "bb22", false)],
            crawl_calls: AtomicUsize::new(0),
            gate: None,
            magnet_only: true,
        };
        let performer = crawled(engine, cache.clone(), NullResolver { fail: true });
        let (sink, mut rx) = sink_pair(7, performer.control());

        performer.run(sink).await.unwrap();

        // first parent skipped, second expanded without magnet data
        assert!(cache.get("aa11").is_none());
        assert_eq!(cache.get("bb22").unwrap().len(), 2);
        assert_eq!(batch_count(&mut rx), 2);
    }

    struct FailingFetch;

    #[async_trait]
    impl FetchEngine for FailingFetch {
        async fn fetch(&self, _query: &str) -> anyhow::Result<Vec<RawResult>> {
            bail!("connection refused")
        }
    }

    #[tokio::test]
    async fn test_web_performer_error_ends_run_without_emission() {
        let performer = WebSearchPerformer::new(3, "debian", "mock", FailingFetch);
        let (sink, mut rx) = sink_pair(3, performer.control());
        assert!(performer.run(sink).await.is_err());
        assert_eq!(batch_count(&mut rx), 0);
    }

    #[tokio::test]
    async fn test_cancel_before_start_emits_nothing() {
        struct OneBatch;
        #[async_trait]
        impl FetchEngine for OneBatch {
            async fn fetch(&self, _query: &str) -> anyhow::Result<Vec<RawResult>> {
                Ok(vec![listing("ubuntu", "aa11", false)])
            }
        }
        let performer = WebSearchPerformer::new(3, "ubuntu", "mock", OneBatch);
        performer.stop();
        let (sink, mut rx) = sink_pair(3, performer.control());
        performer.run(sink).await.unwrap();
        assert_eq!(batch_count(&mut rx), 0);
    }

    #[test]
    fn test_control_is_monotonic_and_idempotent() {
        let control = PerformerControl::new();
        assert!(!control.is_stopped());
        control.stop();
        control.stop();
        assert!(control.is_stopped());
    }
}
