//! Lazily consumed query results
//!
//! Rows are produced by a backend task and delivered through a bounded
//! channel. The task owns the database cursor: it stops, and the cursor is
//! released, when the rows run out, when a row fails, or when the
//! [`QueryResults`] holding the receiving end is dropped.

use tokio::sync::mpsc;
use tracing::debug;

use crate::error::{Result, SqlStoreError};
use crate::query::{compare_entries, Entry, Query};

/// Receiving end of a backend row stream.
pub type RowReceiver = mpsc::Receiver<Result<Entry>>;

/// Which client-side stages run over the fetched rows.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct ClientStages {
    pub filter: bool,
    pub order: bool,
    /// Apply offset/limit in memory (they were not pushed to the backend)
    pub window: bool,
}

/// Single-pass sequence of query entries.
#[derive(Debug)]
pub struct QueryResults {
    query: Query,
    rows: Option<RowReceiver>,
    peeked: Option<Result<Entry>>,
    sorted: Option<std::vec::IntoIter<Entry>>,
    sort_pending: bool,
    stages: ClientStages,
    skip: usize,
    remaining: Option<usize>,
}

impl QueryResults {
    /// Wrap a row stream, waiting for its first item.
    ///
    /// A backend failure reported before any row is returned as an error
    /// here instead of through [`QueryResults::next`].
    pub(crate) async fn start(
        query: Query,
        mut rows: RowReceiver,
        stages: ClientStages,
    ) -> Result<Self> {
        let first = match rows.recv().await {
            Some(Err(err @ SqlStoreError::Backend(_))) => return Err(err),
            first => first,
        };

        let (skip, remaining) = if stages.window {
            (query.effective_offset().unwrap_or(0), query.effective_limit())
        } else {
            (0, None)
        };

        Ok(Self {
            sort_pending: stages.order && !query.orders.is_empty(),
            rows: first.is_some().then_some(rows),
            peeked: first,
            sorted: None,
            stages,
            skip,
            remaining,
            query,
        })
    }

    /// The descriptor these results were produced for.
    pub fn query(&self) -> &Query {
        &self.query
    }

    /// Next entry, or `None` once the sequence is exhausted.
    ///
    /// After an error the sequence is terminated and further calls return
    /// `Ok(None)`.
    pub async fn next(&mut self) -> Result<Option<Entry>> {
        loop {
            if self.remaining == Some(0) {
                self.release();
                return Ok(None);
            }

            let Some(entry) = self.next_ordered().await? else {
                return Ok(None);
            };

            if self.skip > 0 {
                self.skip -= 1;
                continue;
            }
            if let Some(remaining) = self.remaining.as_mut() {
                *remaining -= 1;
            }

            return Ok(Some(self.project(entry)));
        }
    }

    /// Drain the remaining entries.
    pub async fn rest(mut self) -> Result<Vec<Entry>> {
        let mut entries = Vec::new();
        while let Some(entry) = self.next().await? {
            entries.push(entry);
        }
        Ok(entries)
    }

    /// Stop iterating and release the cursor.
    pub fn close(mut self) {
        self.release();
    }

    async fn next_ordered(&mut self) -> Result<Option<Entry>> {
        if self.sort_pending {
            self.sort_pending = false;
            let mut buffered = Vec::new();
            while let Some(entry) = self.next_filtered().await? {
                buffered.push(entry);
            }
            let orders = &self.query.orders;
            buffered.sort_by(|a, b| compare_entries(orders, a, b));
            self.sorted = Some(buffered.into_iter());
        }

        match self.sorted.as_mut() {
            Some(sorted) => Ok(sorted.next()),
            None => self.next_filtered().await,
        }
    }

    async fn next_filtered(&mut self) -> Result<Option<Entry>> {
        while let Some(entry) = self.next_row().await? {
            if !self.stages.filter || self.query.filters.iter().all(|f| f.matches(&entry)) {
                return Ok(Some(entry));
            }
        }
        Ok(None)
    }

    async fn next_row(&mut self) -> Result<Option<Entry>> {
        let item = match self.peeked.take() {
            Some(item) => Some(item),
            None => match self.rows.as_mut() {
                Some(rows) => rows.recv().await,
                None => None,
            },
        };

        match item {
            Some(Ok(entry)) => Ok(Some(entry)),
            Some(Err(err)) => {
                self.release();
                Err(err)
            }
            None => {
                self.rows = None;
                Ok(None)
            }
        }
    }

    fn project(&self, mut entry: Entry) -> Entry {
        if self.query.returns_sizes {
            entry.size = Some(entry.value.len());
        }
        if self.query.keys_only {
            entry.value = Vec::new();
        }
        entry
    }

    fn release(&mut self) {
        self.peeked = None;
        self.sorted = None;
        if self.rows.take().is_some() {
            debug!("Query results released before the backend stream ended");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{Filter, Op, Order};
    use crate::key::Key;

    async fn results_from(
        query: Query,
        items: Vec<Result<Entry>>,
        stages: ClientStages,
    ) -> Result<QueryResults> {
        let (tx, rx) = mpsc::channel(items.len().max(1));
        for item in items {
            tx.send(item).await.unwrap();
        }
        drop(tx);
        QueryResults::start(query, rx, stages).await
    }

    fn ok(key: &str, value: &str) -> Result<Entry> {
        Ok(Entry::new(key, value.as_bytes().to_vec()))
    }

    fn all_stages() -> ClientStages {
        ClientStages { filter: true, order: true, window: true }
    }

    fn keys(entries: &[Entry]) -> Vec<&str> {
        entries.iter().map(|e| e.key.as_str()).collect()
    }

    #[tokio::test]
    async fn test_filters_then_orders() {
        let query = Query::default()
            .with_filter(Filter::KeyPrefix("a/".into()))
            .with_order(Order::ByKeyDescending);
        let rows = vec![ok("a/1", "v1"), ok("b/1", "v3"), ok("a/2", "v2")];

        let entries = results_from(query, rows, all_stages()).await.unwrap().rest().await.unwrap();

        assert_eq!(keys(&entries), vec!["a/2", "a/1"]);
    }

    #[tokio::test]
    async fn test_client_window_after_filter_and_order() {
        let query = Query::default()
            .with_filter(Filter::KeyCompare { op: Op::NotEqual, key: Key::from("k3") })
            .with_order(Order::ByKey)
            .with_offset(1)
            .with_limit(2);
        let rows = (0..6).rev().map(|i| ok(&format!("k{}", i), "v")).collect();

        let entries = results_from(query, rows, all_stages()).await.unwrap().rest().await.unwrap();

        assert_eq!(keys(&entries), vec!["k1", "k2"]);
    }

    #[tokio::test]
    async fn test_window_not_applied_when_pushed_down() {
        let query = Query::prefixed("k").with_limit(1).with_offset(5);
        let rows = vec![ok("k1", "a"), ok("k2", "b")];
        let stages = ClientStages { filter: true, order: true, window: false };

        let entries = results_from(query, rows, stages).await.unwrap().rest().await.unwrap();

        assert_eq!(entries.len(), 2);
    }

    #[tokio::test]
    async fn test_keys_only_and_sizes_projection() {
        let query = Query::default().keys_only().returning_sizes();
        let rows = vec![ok("k", "hello")];

        let entries = results_from(query, rows, all_stages()).await.unwrap().rest().await.unwrap();

        assert_eq!(entries[0].value, Vec::<u8>::new());
        assert_eq!(entries[0].size, Some(5));
    }

    #[tokio::test]
    async fn test_backend_error_before_first_row_fails_start() {
        let rows = vec![Err(SqlStoreError::Backend(sqlx::Error::PoolClosed))];

        let result = results_from(Query::default(), rows, all_stages()).await;

        assert!(matches!(result, Err(SqlStoreError::Backend(_))));
    }

    #[tokio::test]
    async fn test_scan_error_surfaces_through_next_and_terminates() {
        let rows = vec![
            ok("a", "1"),
            Err(SqlStoreError::Scan(sqlx::Error::RowNotFound)),
            ok("b", "2"),
        ];
        let mut results = results_from(Query::default(), rows, all_stages()).await.unwrap();

        assert_eq!(results.next().await.unwrap().unwrap().key.as_str(), "a");
        assert!(matches!(results.next().await, Err(SqlStoreError::Scan(_))));
        assert!(results.next().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_scan_error_during_sort_is_reported() {
        let query = Query::default().with_order(Order::ByKey);
        let rows = vec![ok("b", "1"), Err(SqlStoreError::Scan(sqlx::Error::RowNotFound))];
        let mut results = results_from(query, rows, all_stages()).await.unwrap();

        assert!(matches!(results.next().await, Err(SqlStoreError::Scan(_))));
        assert!(results.next().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_empty_stream() {
        let results = results_from(Query::default(), vec![], all_stages()).await.unwrap();
        assert!(results.rest().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_close_drops_receiver() {
        let (tx, rx) = mpsc::channel(4);
        tx.send(ok("a", "1")).await.unwrap();
        tx.send(ok("b", "2")).await.unwrap();

        let results = QueryResults::start(Query::default(), rx, all_stages()).await.unwrap();
        results.close();

        assert!(tx.is_closed());
    }
}
