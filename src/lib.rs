pub mod config;
pub mod engines;
pub mod search;
pub mod state;

pub use config::SearchConfig;
pub use engines::{EngineRegistry, PerformerFactory, SearchEngine};
pub use search::{
    DisplayResult, DisplaySurface, QueryValidation, RawResult, ResultKind, SearchError,
    SearchMediator, SearchQuery, SearchToken, INVALID_TOKEN,
};
pub use state::SearchContext;

/// Crate version / 版本号
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build timestamp, stamped by build.rs / 构建时间
pub const BUILD_TIME: &str = env!("BUILD_TIME");
