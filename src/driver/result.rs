//! Lazy streaming `Result` — the client-facing cursor over a query's rows.
//!
//! Modeled as a `pending -> streaming -> completed | error` state machine:
//! the query has already run to completion against the store by the time a
//! `Result` exists (the execution engine is synchronous), but the type
//! still streams rows one at a time and only exposes the final
//! `ExecutionStats`/bookmark after the last row is consumed, matching the
//! client contract a real Bolt-streamed result would present.

use tokio::sync::Notify;

use crate::execution::{ExecutionStats, ResultRow};
use crate::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultState {
    Pending,
    Streaming,
    Completed,
    Errored,
}

pub struct QueryResultStream {
    columns: Vec<String>,
    rows: std::collections::VecDeque<ResultRow>,
    stats: ExecutionStats,
    state: ResultState,
    error: Option<String>,
    done: Notify,
}

impl QueryResultStream {
    pub fn ready(result: crate::execution::QueryResult) -> Self {
        Self {
            columns: result.columns,
            rows: result.rows.into(),
            stats: result.stats,
            state: ResultState::Streaming,
            error: None,
            done: Notify::new(),
        }
    }

    pub fn failed(message: String) -> Self {
        Self {
            columns: Vec::new(),
            rows: Default::default(),
            stats: ExecutionStats::default(),
            state: ResultState::Errored,
            error: Some(message),
            done: Notify::new(),
        }
    }

    pub fn keys(&self) -> &[String] {
        &self.columns
    }

    pub fn state(&self) -> ResultState {
        self.state
    }

    /// Pulls the next row, or `None` once exhausted — transitioning to
    /// `Completed` and waking anyone awaiting `consumed()`.
    pub fn next(&mut self) -> Option<ResultRow> {
        let row = self.rows.pop_front();
        if row.is_none() && self.state == ResultState::Streaming {
            self.state = ResultState::Completed;
            self.done.notify_waiters();
        }
        row
    }

    /// Drains every remaining row eagerly.
    pub fn collect_all(&mut self) -> Vec<ResultRow> {
        let mut out = Vec::new();
        while let Some(row) = self.next() {
            out.push(row);
        }
        out
    }

    pub async fn consumed(&self) {
        if self.state != ResultState::Completed && self.state != ResultState::Errored {
            self.done.notified().await;
        }
    }

    /// Only meaningful once `state()` is `Completed` — summary counters
    /// mirroring Neo4j's `QueryStatistics`.
    pub fn stats(&self) -> &ExecutionStats {
        &self.stats
    }

    pub fn into_result(self) -> Result<()> {
        match self.error {
            Some(msg) => Err(crate::Error::ExecutionError(msg)),
            None => Ok(()),
        }
    }
}
