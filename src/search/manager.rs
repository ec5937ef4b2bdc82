//! Search manager / 搜索管理器
//!
//! Owns the bounded worker pool. Accepts performers, runs them
//! concurrently, tracks which tokens are live and posts delivery events to
//! the single registered listener over a channel. Performer work never
//! calls back into the coordinator; everything crosses the channel.
//! 持有有界工作池，执行器并发运行，事件经通道投递给唯一监听者。
//!
//! The hard correctness property is `Finished` firing exactly once per
//! token: the outstanding count is decremented and checked under the
//! group-map lock, never read-then-written.
//! 每令牌恰好一次 Finished：计数在持锁状态下减一并判零。

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

use super::performer::{PerformerControl, SearchPerformer};
use super::schema::{RawResult, SearchToken};

#[derive(Error, Debug)]
pub enum SearchError {
    /// The pool can no longer schedule anything; the only fatal class
    /// surfaced to callers. / 池已关闭，唯一上抛的致命错误。
    #[error("search manager is shut down")]
    Shutdown,
}

/// Delivery events posted to the listener / 投递给监听者的事件
#[derive(Debug)]
pub enum SearchEvent {
    /// One batch from one performer, in production order per performer
    /// 单执行器的一个批次，按产出顺序投递
    Results {
        token: SearchToken,
        source: String,
        results: Vec<RawResult>,
    },
    /// All performers of the token reached a terminal state; fired exactly
    /// once, after their last `Results` was posted. / 恰好一次
    Finished { token: SearchToken },
}

/// Emission handle a running performer writes batches into. Re-checks the
/// stop flag on every call and never blocks (post-and-return).
/// 执行器的产出句柄，每次调用复查停止标志，从不阻塞。
#[derive(Clone)]
pub struct BatchSink {
    token: SearchToken,
    source: String,
    control: Arc<PerformerControl>,
    tx: mpsc::UnboundedSender<SearchEvent>,
}

impl BatchSink {
    pub(crate) fn new(
        token: SearchToken,
        source: impl Into<String>,
        control: Arc<PerformerControl>,
        tx: mpsc::UnboundedSender<SearchEvent>,
    ) -> Self {
        Self {
            token,
            source: source.into(),
            control,
            tx,
        }
    }

    /// Post one batch. Returns false when the performer was stopped or the
    /// listener is gone. / 投递一个批次，已停止或监听者消失时返回 false。
    pub fn deliver(&self, results: Vec<RawResult>) -> bool {
        if results.is_empty() {
            return true;
        }
        if self.control.is_stopped() {
            return false;
        }
        self.tx
            .send(SearchEvent::Results {
                token: self.token,
                source: self.source.clone(),
                results,
            })
            .is_ok()
    }
}

/// Book-keeping for one token's performers / 单令牌的执行器记录
struct TokenGroup {
    outstanding: AtomicUsize,
    stopped: AtomicBool,
    performers: Mutex<Vec<Arc<dyn SearchPerformer>>>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl TokenGroup {
    fn new() -> Self {
        Self {
            outstanding: AtomicUsize::new(0),
            stopped: AtomicBool::new(false),
            performers: Mutex::new(Vec::new()),
            handles: Mutex::new(Vec::new()),
        }
    }
}

pub struct SearchManager {
    groups: Arc<RwLock<HashMap<SearchToken, Arc<TokenGroup>>>>,
    pool: Arc<Semaphore>,
    event_tx: mpsc::UnboundedSender<SearchEvent>,
    shutdown: AtomicBool,
}

impl SearchManager {
    /// Create a manager with a fixed-size pool. The returned receiver is
    /// the single listener registration; `Results` and `Finished` events
    /// arrive on it. / 创建固定大小的工作池，返回值中的接收端即唯一监听者。
    pub fn new(worker_threads: usize) -> (Self, mpsc::UnboundedReceiver<SearchEvent>) {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let manager = Self {
            groups: Arc::new(RwLock::new(HashMap::new())),
            pool: Arc::new(Semaphore::new(worker_threads.max(1))),
            event_tx,
            shutdown: AtomicBool::new(false),
        };
        (manager, event_rx)
    }

    /// Submit a performer for execution; returns immediately. Performers
    /// beyond pool capacity queue for a permit instead of spawning extra
    /// execution contexts. Submitting against an already-stopped token is
    /// a no-op: the performer transitions straight to stopped.
    /// 提交执行器并立即返回，超出池容量的排队等待；已停止令牌下的提交为空操作。
    pub fn perform(&self, performer: Arc<dyn SearchPerformer>) -> Result<(), SearchError> {
        if self.shutdown.load(Ordering::SeqCst) {
            performer.stop();
            return Err(SearchError::Shutdown);
        }

        let token = performer.token();
        let group = {
            let mut groups = self.groups.write();
            let group = groups
                .entry(token)
                .or_insert_with(|| Arc::new(TokenGroup::new()))
                .clone();
            if group.stopped.load(Ordering::SeqCst) {
                performer.stop();
                return Ok(());
            }
            group.outstanding.fetch_add(1, Ordering::SeqCst);
            group.performers.lock().push(performer.clone());
            group
        };

        let sink = BatchSink::new(
            token,
            performer.source(),
            performer.control().clone(),
            self.event_tx.clone(),
        );
        let pool = self.pool.clone();
        let groups = self.groups.clone();
        let tx = self.event_tx.clone();
        let task_group = group.clone();

        let handle = tokio::spawn(async move {
            match pool.acquire_owned().await {
                Ok(_permit) => {
                    if !performer.is_stopped() {
                        tracing::debug!(token, source = performer.source(), "performer started");
                        if let Err(e) = performer.run(sink).await {
                            // engine failures end this performer only
                            tracing::debug!(
                                token,
                                source = performer.source(),
                                error = %e,
                                "performer ended with error"
                            );
                        }
                    }
                }
                Err(_) => {
                    // pool closed during shutdown, never ran
                }
            }
            performer.stop();

            let finished = {
                let mut groups = groups.write();
                let remaining = task_group.outstanding.fetch_sub(1, Ordering::SeqCst) - 1;
                if remaining == 0 {
                    if let Some(current) = groups.get(&token) {
                        if Arc::ptr_eq(current, &task_group) {
                            groups.remove(&token);
                        }
                    }
                    true
                } else {
                    false
                }
            };
            if finished {
                let _ = tx.send(SearchEvent::Finished { token });
            }
        });
        group.handles.lock().push(handle);
        Ok(())
    }

    /// Stop every performer whose token matches. Unknown or already
    /// terminal tokens are a no-op. / 停止该令牌下的全部执行器，未知令牌为空操作。
    pub fn stop(&self, token: SearchToken) {
        let group = self.groups.read().get(&token).cloned();
        if let Some(group) = group {
            group.stopped.store(true, Ordering::SeqCst);
            for performer in group.performers.lock().iter() {
                performer.stop();
            }
            tracing::debug!(token, "search stopped");
        }
    }

    /// Stop all performers and drain the pool. Expected once at teardown.
    /// 停止全部执行器并等待池排空，进程退出时调用一次。
    pub async fn stop_all(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
        self.pool.close();

        let groups: Vec<Arc<TokenGroup>> = self.groups.read().values().cloned().collect();
        let mut handles = Vec::new();
        for group in &groups {
            group.stopped.store(true, Ordering::SeqCst);
            for performer in group.performers.lock().iter() {
                performer.stop();
            }
            handles.append(&mut group.handles.lock());
        }
        tracing::info!(tasks = handles.len(), "draining search worker pool");
        futures::future::join_all(handles).await;
    }

    /// Tokens that still have performers in flight / 仍有执行器在途的令牌
    pub fn active_tokens(&self) -> Vec<SearchToken> {
        self.groups.read().keys().copied().collect()
    }
}
