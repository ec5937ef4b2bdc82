//! Orchestration context / 编排上下文
//!
//! One explicitly constructed context per process owns every shared
//! component: configuration, engine registry, crawl cache, magnet
//! resolver, manager and mediator. Components receive what they need
//! through this object; there are no ambient singletons.
//! 每进程一个显式构造的上下文，持有全部共享组件，无环境单例。

use std::sync::Arc;

use crate::config::SearchConfig;
use crate::engines::EngineRegistry;
use crate::search::crawl_cache::CrawlCache;
use crate::search::magnet::{HttpMagnetResolver, MagnetResolver};
use crate::search::manager::SearchManager;
use crate::search::mediator::SearchMediator;

pub struct SearchContext {
    config: SearchConfig,
    engines: Arc<EngineRegistry>,
    crawl_cache: Arc<CrawlCache>,
    magnet_resolver: Arc<dyn MagnetResolver>,
    manager: Arc<SearchManager>,
    mediator: Arc<SearchMediator>,
}

impl SearchContext {
    /// Build a context with the default HTTP magnet resolver. Must run
    /// inside a tokio runtime. / 使用默认磁力解析器构建，需在运行时内调用。
    pub fn new(config: SearchConfig) -> Self {
        let resolver = Arc::new(HttpMagnetResolver::new(config.magnet_gateway.clone()));
        Self::with_resolver(config, resolver)
    }

    /// Build a context with a custom magnet resolver / 使用自定义解析器构建
    pub fn with_resolver(config: SearchConfig, magnet_resolver: Arc<dyn MagnetResolver>) -> Self {
        let engines = Arc::new(EngineRegistry::new());
        let crawl_cache = Arc::new(CrawlCache::new());
        let (manager, events) = SearchManager::new(config.worker_threads);
        let manager = Arc::new(manager);
        let mediator =
            SearchMediator::new(config.clone(), engines.clone(), manager.clone(), events);
        tracing::info!(
            workers = config.worker_threads,
            version = crate::VERSION,
            "search context initialized"
        );
        Self {
            config,
            engines,
            crawl_cache,
            magnet_resolver,
            manager,
            mediator,
        }
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    /// Engine registration happens here after construction; factories may
    /// capture the crawl cache and magnet resolver. / 构建后在此注册引擎。
    pub fn engines(&self) -> &Arc<EngineRegistry> {
        &self.engines
    }

    pub fn crawl_cache(&self) -> &Arc<CrawlCache> {
        &self.crawl_cache
    }

    pub fn magnet_resolver(&self) -> &Arc<dyn MagnetResolver> {
        &self.magnet_resolver
    }

    pub fn manager(&self) -> &Arc<SearchManager> {
        &self.manager
    }

    pub fn mediator(&self) -> &Arc<SearchMediator> {
        &self.mediator
    }

    /// 清空抓取缓存
    pub fn clear_crawl_cache(&self) {
        self.crawl_cache.clear();
        tracing::info!("crawl cache cleared");
    }

    /// Total cached child results / 缓存的子结果总数
    pub fn cached_torrents(&self) -> u64 {
        self.crawl_cache.size()
    }

    /// 进程退出时调用一次
    pub async fn shutdown(&self) {
        self.mediator.shutdown().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::schema::{SearchQuery, INVALID_TOKEN};
    use crate::search::DisplaySurface;
    use std::collections::HashSet;

    struct NullSurface;

    impl DisplaySurface for NullSurface {
        fn add_result(&self, _token: u64, _result: crate::search::DisplayResult) {}
        fn mark_idle(&self, _token: u64) {}
        fn active_tokens(&self) -> HashSet<u64> {
            HashSet::new()
        }
    }

    #[tokio::test]
    async fn test_context_wiring() {
        let context = SearchContext::new(SearchConfig::default());
        assert_eq!(context.cached_torrents(), 0);
        assert!(context.engines().all().is_empty());

        let token = context
            .mediator()
            .trigger_search(&SearchQuery::new("ab"), std::sync::Arc::new(NullSurface))
            .unwrap();
        assert_eq!(token, INVALID_TOKEN);

        context.shutdown().await;
    }

    #[tokio::test]
    async fn test_cache_operator_surface() {
        let context = SearchContext::new(SearchConfig::default());
        context.crawl_cache().put(
            "abc",
            vec![crate::search::RawResult {
                display_name: "x".to_string(),
                source: "mock".to_string(),
                detail_url: String::new(),
                kind: crate::search::ResultKind::Plain,
            }],
        );
        assert_eq!(context.cached_torrents(), 1);
        context.clear_crawl_cache();
        assert_eq!(context.cached_torrents(), 0);
    }
}
