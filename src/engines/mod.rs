//! Engine registry / 引擎注册表
//!
//! Each search engine is a black box behind a performer factory: given a
//! token and a query it yields the performer that executes the search.
//! The registry is constructed explicitly and carried by the orchestration
//! context; there is no ambient global.
//! 每个引擎是执行器工厂后面的黑盒，注册表显式构造并由上下文持有，无全局状态。

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::search::performer::SearchPerformer;
use crate::search::schema::SearchToken;

/// Performer factory / 执行器工厂
pub trait PerformerFactory: Send + Sync {
    fn create(&self, token: SearchToken, query: &str) -> Arc<dyn SearchPerformer>;
}

impl<F> PerformerFactory for F
where
    F: Fn(SearchToken, &str) -> Arc<dyn SearchPerformer> + Send + Sync,
{
    fn create(&self, token: SearchToken, query: &str) -> Arc<dyn SearchPerformer> {
        (self)(token, query)
    }
}

/// One registered engine / 单个已注册引擎
pub struct SearchEngine {
    name: String,
    /// Engines whose backend is already query-scoped skip the result
    /// filter, e.g. video platforms. / 后端已按查询过滤的引擎跳过结果过滤。
    filter_exempt: bool,
    enabled: AtomicBool,
    factory: Box<dyn PerformerFactory>,
}

impl SearchEngine {
    pub fn new(name: impl Into<String>, factory: impl PerformerFactory + 'static) -> Self {
        Self {
            name: name.into(),
            filter_exempt: false,
            enabled: AtomicBool::new(true),
            factory: Box::new(factory),
        }
    }

    pub fn filter_exempt(mut self) -> Self {
        self.filter_exempt = true;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_filter_exempt(&self) -> bool {
        self.filter_exempt
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// 运行时开关
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    pub fn performer(&self, token: SearchToken, query: &str) -> Arc<dyn SearchPerformer> {
        self.factory.create(token, query)
    }
}

/// Engine registry / 引擎注册表
pub struct EngineRegistry {
    engines: RwLock<Vec<Arc<SearchEngine>>>,
}

impl EngineRegistry {
    pub fn new() -> Self {
        Self {
            engines: RwLock::new(Vec::new()),
        }
    }

    pub fn register(&self, engine: SearchEngine) {
        tracing::info!(engine = engine.name(), "search engine registered");
        self.engines.write().push(Arc::new(engine));
    }

    /// Enabled engines, in registration order / 启用的引擎，按注册顺序
    pub fn enabled(&self) -> Vec<Arc<SearchEngine>> {
        self.engines
            .read()
            .iter()
            .filter(|engine| engine.is_enabled())
            .cloned()
            .collect()
    }

    /// Resolve the engine a result came from / 按结果来源解析引擎
    pub fn by_name(&self, name: &str) -> Option<Arc<SearchEngine>> {
        self.engines
            .read()
            .iter()
            .find(|engine| engine.name() == name)
            .cloned()
    }

    pub fn all(&self) -> Vec<Arc<SearchEngine>> {
        self.engines.read().clone()
    }
}

impl Default for EngineRegistry {
    fn default() -> Self {
        Self::new()
    }
}
