//! A `Session` is a lightweight, non-thread-safe tracker for a causally
//! chained sequence of transactions: it carries bookmarks forward so each
//! `execute_read`/`execute_write` call observes at least as much as the one
//! before it.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::driver::retry::{with_retry_budget, DEFAULT_MAX_RETRY_TIME};
use crate::driver::result::QueryResultStream;
use crate::driver::transaction::Transaction;
use crate::tx::{TxId, TxMode};
use crate::{Graph, PropertyMap, Result};

static BOOKMARK_SEQ: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bookmark(pub String);

/// State shared between a `Session` and the `Driver` that created it, so the
/// driver can force-close a session the caller still holds. Rolling back
/// through `graph` needs no `.await`: `Graph`'s own commit/rollback are
/// synchronous, only the `Session`/`Transaction` wrappers cross into async.
pub(crate) struct SessionInner {
    graph: Arc<Graph>,
    state: Mutex<SessionState>,
}

struct SessionState {
    closed: bool,
    open_tx: Option<TxId>,
}

impl SessionInner {
    pub(crate) fn force_close(&self) {
        let mut state = self.state.lock();
        if state.closed {
            return;
        }
        if let Some(id) = state.open_tx.take() {
            let _ = self.graph.rollback(id);
        }
        state.closed = true;
    }

    /// Releases the open-transaction guard once `id` commits, rolls back,
    /// or drops — a no-op if some other transaction already holds the slot
    /// (can't happen under the single-open-transaction invariant, but
    /// checked by id rather than just clearing unconditionally).
    pub(crate) fn clear_open_tx(&self, id: TxId) {
        let mut state = self.state.lock();
        if state.open_tx == Some(id) {
            state.open_tx = None;
        }
    }
}

pub struct Session {
    inner: Arc<SessionInner>,
    bookmarks: Vec<Bookmark>,
    retry_budget: Duration,
    /// Fired once, on `close`, to deregister from the owning driver and fan
    /// out to its `onSessionClose` observers.
    on_close: Option<Arc<dyn Fn() + Send + Sync>>,
}

impl Session {
    pub(crate) fn new(graph: Arc<Graph>, bookmarks: Vec<Bookmark>) -> Self {
        Self::with_retry_budget(graph, bookmarks, DEFAULT_MAX_RETRY_TIME)
    }

    pub(crate) fn with_retry_budget(graph: Arc<Graph>, bookmarks: Vec<Bookmark>, retry_budget: Duration) -> Self {
        Self {
            inner: Arc::new(SessionInner { graph, state: Mutex::new(SessionState { closed: false, open_tx: None }) }),
            bookmarks,
            retry_budget,
            on_close: None,
        }
    }

    pub(crate) fn with_close_observer(mut self, on_close: Arc<dyn Fn() + Send + Sync>) -> Self {
        self.on_close = Some(on_close);
        self
    }

    pub(crate) fn inner(&self) -> Arc<SessionInner> {
        self.inner.clone()
    }

    pub fn last_bookmarks(&self) -> &[Bookmark] {
        &self.bookmarks
    }

    pub fn is_open(&self) -> bool {
        !self.inner.state.lock().closed
    }

    /// Auto-commit query: parses, runs, and commits in one round trip with
    /// no explicit transaction visible to the caller.
    pub async fn run(&mut self, query: &str, params: impl Into<PropertyMap>) -> Result<QueryResultStream> {
        self.ensure_open()?;
        let graph = self.inner.graph.clone();
        let query = query.to_string();
        let params = params.into();
        let result = tokio::task::spawn_blocking(move || graph.run(&query, params))
            .await
            .map_err(|e| crate::Error::ExecutionError(format!("blocking task panicked: {e}")))??;
        self.bookmarks = vec![self.next_bookmark()];
        Ok(QueryResultStream::ready(result))
    }

    /// Refuses if a transaction is already open on this session — a Session
    /// owns at most one `Transaction` at a time.
    pub async fn begin_transaction(&self, mode: TxMode) -> Result<Transaction> {
        self.ensure_open()?;
        {
            let state = self.inner.state.lock();
            if state.open_tx.is_some() {
                return Err(crate::Error::TxError("a transaction is already open on this session".into()));
            }
        }
        let graph = self.inner.graph.clone();
        let id = tokio::task::spawn_blocking(move || graph.begin(mode))
            .await
            .map_err(|e| crate::Error::ExecutionError(format!("blocking task panicked: {e}")))?;
        self.inner.state.lock().open_tx = Some(id);
        Ok(Transaction::new(self.inner.graph.clone(), id, Some(self.inner.clone())))
    }

    /// Runs `work` inside a fresh transaction, retrying the whole closure
    /// with exponential backoff on a transient failure. Commits on
    /// success, rolls back on any error.
    pub async fn execute_write<T, F, Fut>(&mut self, mut work: F) -> Result<T>
    where
        F: FnMut(&mut Transaction) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let result = with_retry_budget(self.retry_budget, || async {
            let mut tx = self.begin_transaction(TxMode::ReadWrite).await?;
            match work(&mut tx).await {
                Ok(v) => {
                    tx.commit().await?;
                    Ok(v)
                }
                Err(e) => {
                    let _ = tx.rollback().await;
                    Err(e)
                }
            }
        })
        .await?;
        self.bookmarks = vec![self.next_bookmark()];
        Ok(result)
    }

    pub async fn execute_read<T, F, Fut>(&mut self, mut work: F) -> Result<T>
    where
        F: FnMut(&mut Transaction) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        with_retry_budget(self.retry_budget, || async {
            let mut tx = self.begin_transaction(TxMode::ReadOnly).await?;
            match work(&mut tx).await {
                Ok(v) => {
                    tx.commit().await?;
                    Ok(v)
                }
                Err(e) => {
                    let _ = tx.rollback().await;
                    Err(e)
                }
            }
        })
        .await
    }

    /// Rolls back any open transaction (errors swallowed), marks the
    /// session closed, and fires the driver's close callback. Idempotent.
    pub async fn close(mut self) {
        self.close_inner().await;
    }

    async fn close_inner(&mut self) {
        let open_tx = {
            let mut state = self.inner.state.lock();
            if state.closed {
                return;
            }
            state.closed = true;
            state.open_tx.take()
        };
        if let Some(id) = open_tx {
            let graph = self.inner.graph.clone();
            let _ = tokio::task::spawn_blocking(move || graph.rollback(id)).await;
        }
        if let Some(on_close) = self.on_close.take() {
            on_close();
        }
    }

    fn ensure_open(&self) -> Result<()> {
        if self.inner.state.lock().closed {
            return Err(crate::Error::TxError("session is closed".into()));
        }
        Ok(())
    }

    fn next_bookmark(&self) -> Bookmark {
        Bookmark(format!("graphdb-bm:{}", BOOKMARK_SEQ.fetch_add(1, Ordering::SeqCst)))
    }
}
