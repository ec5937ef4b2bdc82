//! Search mediator / 搜索中介
//!
//! Top-level coordinator: allocates tokens, validates queries, dispatches
//! one performer per enabled engine, and pumps manager events into the
//! display surface after filtering and conversion. All delivery crosses a
//! channel; performer work never blocks the coordinator side.
//! 顶层协调者：分配令牌、校验查询、按引擎派发执行器，并把管理器事件
//! 过滤转换后推送到展示层。投递全部经由通道，不阻塞协调侧。

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::SearchConfig;
use crate::engines::EngineRegistry;

use super::manager::{SearchError, SearchEvent, SearchManager};
use super::schema::{
    DisplayKind, DisplayResult, QueryValidation, RawResult, ResultKind, SearchQuery, SearchToken,
    INVALID_TOKEN,
};
use super::tokenizer;

/// Display collaborator consuming render-ready results / 展示层协作者
pub trait DisplaySurface: Send + Sync {
    fn add_result(&self, token: SearchToken, result: DisplayResult);

    /// No further results expected for the token; called exactly once
    /// 该令牌不再有结果，恰好调用一次
    fn mark_idle(&self, token: SearchToken);

    fn active_tokens(&self) -> HashSet<SearchToken>;
}

/// 校验查询，仅计算状态码，不产生用户可见文案
pub fn validate_query(query: &SearchQuery, config: &SearchConfig) -> QueryValidation {
    let normalized = tokenizer::normalize(query.keywords.trim());
    if normalized.is_empty() {
        return QueryValidation::Empty;
    }
    let length = normalized.chars().count();
    if length < config.min_query_length {
        return QueryValidation::TooShort;
    }
    if length > config.max_query_length {
        return QueryValidation::TooLong;
    }
    if let Some(xml) = &query.xml {
        if xml.len() > config.max_xml_query_length {
            return QueryValidation::XmlTooLong;
        }
    }
    QueryValidation::Valid
}

/// One live search binding / 一次在途搜索的绑定
#[derive(Clone)]
struct ActiveSearch {
    query: String,
    /// Normalized filter tokens, computed once at dispatch
    /// 过滤词元，派发时一次性计算
    tokens: Vec<String>,
    surface: Arc<dyn DisplaySurface>,
}

pub struct SearchMediator {
    config: SearchConfig,
    engines: Arc<EngineRegistry>,
    manager: Arc<SearchManager>,
    active: RwLock<HashMap<SearchToken, ActiveSearch>>,
    /// Monotonic token source; never yields 0 / 单调令牌源，永不为 0
    token_seq: AtomicU64,
    pump: Mutex<Option<JoinHandle<()>>>,
}

impl SearchMediator {
    /// Wire the mediator to the manager's event stream. The receiver is
    /// the single listener registration. / 接管管理器事件流（唯一监听者）。
    pub fn new(
        config: SearchConfig,
        engines: Arc<EngineRegistry>,
        manager: Arc<SearchManager>,
        events: mpsc::UnboundedReceiver<SearchEvent>,
    ) -> Arc<Self> {
        let mediator = Arc::new(Self {
            config,
            engines,
            manager,
            active: RwLock::new(HashMap::new()),
            token_seq: AtomicU64::new(1),
            pump: Mutex::new(None),
        });
        mediator.spawn_pump(events);
        mediator
    }

    fn spawn_pump(self: &Arc<Self>, mut events: mpsc::UnboundedReceiver<SearchEvent>) {
        let weak = Arc::downgrade(self);
        let handle = tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                let Some(mediator) = weak.upgrade() else {
                    break;
                };
                match event {
                    SearchEvent::Results {
                        token,
                        source,
                        results,
                    } => mediator.on_results(token, &source, results),
                    SearchEvent::Finished { token } => mediator.on_finished(token),
                }
            }
        });
        *self.pump.lock() = Some(handle);
    }

    fn next_token(&self) -> SearchToken {
        self.token_seq.fetch_add(1, Ordering::SeqCst)
    }

    /// Validate, allocate a token, bind the surface and dispatch one
    /// performer per enabled engine. `Ok(INVALID_TOKEN)` signals a
    /// validation failure; `Err` is reserved for the pool being unable to
    /// schedule at all. / 校验失败返回 0，仅池不可用时报错。
    pub fn trigger_search(
        &self,
        query: &SearchQuery,
        surface: Arc<dyn DisplaySurface>,
    ) -> Result<SearchToken, SearchError> {
        let verdict = validate_query(query, &self.config);
        if verdict != QueryValidation::Valid {
            tracing::debug!(?verdict, "query rejected");
            return Ok(INVALID_TOKEN);
        }

        let token = self.next_token();
        let tokens = tokenizer::tokenize(&query.keywords);
        self.active.write().insert(
            token,
            ActiveSearch {
                query: query.keywords.clone(),
                tokens,
                surface,
            },
        );

        if let Err(e) = self.dispatch(token, &query.keywords) {
            self.active.write().remove(&token);
            return Err(e);
        }
        Ok(token)
    }

    /// Stop the prior token and rerun its query under a fresh token bound
    /// to the same surface. Filter state is recomputed, never carried
    /// over. / 停止旧令牌，用新令牌重跑同一查询并重绑同一展示层。
    pub fn repeat_search(&self, prior: SearchToken) -> Result<SearchToken, SearchError> {
        let previous = self.active.write().remove(&prior);
        let Some(previous) = previous else {
            return Ok(INVALID_TOKEN);
        };
        self.manager.stop(prior);

        let token = self.next_token();
        let tokens = tokenizer::tokenize(&previous.query);
        self.active.write().insert(
            token,
            ActiveSearch {
                query: previous.query.clone(),
                tokens,
                surface: previous.surface.clone(),
            },
        );

        if let Err(e) = self.dispatch(token, &previous.query) {
            self.active.write().remove(&token);
            return Err(e);
        }
        Ok(token)
    }

    fn dispatch(&self, token: SearchToken, keywords: &str) -> Result<(), SearchError> {
        let engines = self.engines.enabled();
        tracing::info!(token, engines = engines.len(), "search dispatched");
        for engine in engines {
            let performer = engine.performer(token, keywords);
            self.manager.perform(performer)?;
        }
        Ok(())
    }

    /// Cooperative cancellation of one search / 协作式停止一次搜索
    pub fn stop_search(&self, token: SearchToken) {
        self.manager.stop(token);
    }

    /// The display closed the search: stop it and forget the binding, so
    /// any late delivery is discarded. / 展示层关闭搜索，停止并遗忘绑定。
    pub fn close_search(&self, token: SearchToken) {
        self.manager.stop(token);
        self.active.write().remove(&token);
    }

    /// Stop all tokens and drain the pool; once at process teardown.
    /// 停止全部令牌并排空池，进程退出时调用一次。
    pub async fn shutdown(&self) {
        tracing::info!("search mediator shutting down");
        self.manager.stop_all().await;
    }

    fn on_results(&self, token: SearchToken, source: &str, results: Vec<RawResult>) {
        let search = self.active.read().get(&token).cloned();
        let Some(search) = search else {
            // expected race between stop and late delivery, not an error
            tracing::debug!(token, source, "discarding results for unknown token");
            return;
        };
        let Some(engine) = self.engines.by_name(source) else {
            tracing::debug!(token, source, "discarding results from unknown engine");
            return;
        };

        let filtered = if engine.is_filter_exempt() {
            results
        } else {
            tokenizer::filter_batch(&search.tokens, &results)
        };
        if filtered.is_empty() {
            return;
        }

        tracing::debug!(token, source, count = filtered.len(), "results delivered");
        for raw in &filtered {
            let display = convert_result(token, &search.query, engine.name(), raw);
            search.surface.add_result(token, display);
        }
    }

    fn on_finished(&self, token: SearchToken) {
        let search = self.active.read().get(&token).cloned();
        if let Some(search) = search {
            tracing::info!(token, query = %search.query, "search finished");
            search.surface.mark_idle(token);
        }
    }

    /// Tokens currently bound to a surface / 当前绑定到展示层的令牌
    pub fn bound_tokens(&self) -> Vec<SearchToken> {
        self.active.read().keys().copied().collect()
    }
}

/// Convert a raw result, dispatching on its variant tag / 按变体标签转换
fn convert_result(
    token: SearchToken,
    query: &str,
    engine: &str,
    raw: &RawResult,
) -> DisplayResult {
    let kind = match &raw.kind {
        ResultKind::Plain => DisplayKind::Plain,
        ResultKind::File { .. } => DisplayKind::File,
        ResultKind::Torrent(_) => DisplayKind::Torrent,
        ResultKind::Crawled { .. } => DisplayKind::TorrentFile,
    };
    DisplayResult {
        token,
        engine: engine.to_string(),
        query: query.to_string(),
        display_name: raw.display_name.clone(),
        filename: raw.filename().map(str::to_string),
        size: raw.size(),
        seeds: raw.seeds(),
        detail_url: raw.detail_url.clone(),
        kind,
        received_at: Utc::now(),
    }
}
