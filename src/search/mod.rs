//! Federated search orchestration / 联邦搜索编排
//!
//! Fans one query out to many engines, each running as a performer on a
//! bounded pool, then filters, converts and streams matching results to
//! the display layer under a cancellable per-token lifecycle.
//! 将单个查询扇出到多个引擎，在有界池上并发执行，过滤转换后按令牌
//! 生命周期流式推送给展示层，可随时取消。

pub mod crawl_cache;
pub mod magnet;
pub mod manager;
pub mod mediator;
pub mod performer;
pub mod schema;
pub mod tokenizer;

pub use crawl_cache::CrawlCache;
pub use magnet::{HttpMagnetResolver, MagnetResolver};
pub use manager::{BatchSink, SearchError, SearchEvent, SearchManager};
pub use mediator::{validate_query, DisplaySurface, SearchMediator};
pub use performer::{
    CrawlEngine, CrawledSearchPerformer, FetchEngine, PerformerControl, SearchPerformer,
    WebSearchPerformer,
};
pub use schema::{
    DisplayKind, DisplayResult, QueryValidation, RawResult, ResultKind, SearchQuery, SearchToken,
    TorrentInfo, INVALID_TOKEN,
};
