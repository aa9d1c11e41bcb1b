//! Client-facing transaction handle — a thin async wrapper around a
//! `tx::TxId` running against the blocking `Graph`.

use std::sync::Arc;

use crate::driver::result::QueryResultStream;
use crate::driver::session::SessionInner;
use crate::tx::TxId;
use crate::{Graph, PropertyMap, Result};

pub struct Transaction {
    graph: Arc<Graph>,
    id: TxId,
    finished: bool,
    /// The session this transaction was opened on, if any — cleared so the
    /// session's open-transaction guard releases once this finishes.
    session: Option<Arc<SessionInner>>,
}

impl Transaction {
    pub(crate) fn new(graph: Arc<Graph>, id: TxId, session: Option<Arc<SessionInner>>) -> Self {
        Self { graph, id, finished: false, session }
    }

    pub fn is_open(&self) -> bool {
        !self.finished
    }

    pub async fn run(&mut self, query: &str, params: impl Into<PropertyMap>) -> Result<QueryResultStream> {
        let graph = self.graph.clone();
        let id = self.id;
        let query = query.to_string();
        let params = params.into();
        let result = tokio::task::spawn_blocking(move || graph.run_in(id, &query, params))
            .await
            .map_err(|e| crate::Error::ExecutionError(format!("blocking task panicked: {e}")))??;
        Ok(QueryResultStream::ready(result))
    }

    pub async fn commit(mut self) -> Result<()> {
        let graph = self.graph.clone();
        let id = self.id;
        tokio::task::spawn_blocking(move || graph.commit(id))
            .await
            .map_err(|e| crate::Error::ExecutionError(format!("blocking task panicked: {e}")))??;
        self.finished = true;
        self.release_session_guard();
        Ok(())
    }

    pub async fn rollback(mut self) -> Result<()> {
        let graph = self.graph.clone();
        let id = self.id;
        tokio::task::spawn_blocking(move || graph.rollback(id))
            .await
            .map_err(|e| crate::Error::ExecutionError(format!("blocking task panicked: {e}")))??;
        self.finished = true;
        self.release_session_guard();
        Ok(())
    }

    fn release_session_guard(&mut self) {
        if let Some(session) = self.session.take() {
            session.clear_open_tx(self.id);
        }
    }
}

impl Drop for Transaction {
    /// An explicit transaction a caller never committed or rolled back is
    /// rolled back on drop, mirroring the driver's auto-close semantics.
    fn drop(&mut self) {
        if !self.finished {
            let _ = self.graph.rollback(self.id);
            if let Some(session) = self.session.take() {
                session.clear_open_tx(self.id);
            }
        }
    }
}
