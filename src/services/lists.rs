//! Generic document list backing every table view.
//!
//! A refresh replaces the rows in one step. While a fetch is in flight the list
//! reports `Loading` and exposes no rows, so aggregates are never computed from
//! a superseded row set. Responses from superseded refreshes are dropped, and
//! a background refresh is aborted when the list is dropped.

use serde_json::Value;
use std::collections::BTreeSet;
use std::marker::PhantomData;
use std::sync::{Arc, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::errors::ServiceError;
use crate::store::{Doctype, DocumentStore, Filter, ListQuery, OrderBy};

/// What a list shows and how it can be narrowed.
#[derive(Debug, Clone, Default)]
pub struct ListCapabilities {
    pub columns: Vec<String>,
    pub filters: Vec<Filter>,
    /// Fields offered as facet filters
    pub facets: Vec<String>,
}

impl ListCapabilities {
    pub fn new<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn facet(mut self, field: impl Into<String>) -> Self {
        self.facets.push(field.into());
        self
    }
}

#[derive(Debug, Clone)]
pub enum ListState<D> {
    Idle,
    Loading,
    Ready(Arc<Vec<D>>),
    Failed(String),
}

/// List state and the refresh generation it belongs to. Both change under one
/// lock so a superseded response can never overwrite a newer `Loading`.
struct Snapshot<D> {
    state: ListState<D>,
    generation: u64,
}

struct Shared<D> {
    inner: RwLock<Snapshot<D>>,
}

impl<D: Clone> Shared<D> {
    fn new() -> Self {
        Self {
            inner: RwLock::new(Snapshot {
                state: ListState::Idle,
                generation: 0,
            }),
        }
    }

    fn begin(&self) -> u64 {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        inner.generation += 1;
        inner.state = ListState::Loading;
        inner.generation
    }

    /// Applies a result only if no newer refresh has started.
    fn complete(
        &self,
        generation: u64,
        result: Result<Vec<D>, ServiceError>,
    ) -> Result<Option<Arc<Vec<D>>>, ServiceError> {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        if inner.generation != generation {
            debug!(generation, current = inner.generation, "Discarding superseded list response");
            return Ok(None);
        }
        match result {
            Ok(rows) => {
                let rows = Arc::new(rows);
                inner.state = ListState::Ready(rows.clone());
                Ok(Some(rows))
            }
            Err(err) => {
                inner.state = ListState::Failed(err.to_string());
                Err(err)
            }
        }
    }

    fn get(&self) -> ListState<D> {
        self.inner
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .state
            .clone()
    }
}

pub struct DocumentList<D> {
    store: Arc<dyn DocumentStore>,
    capabilities: ListCapabilities,
    order_by: Option<OrderBy>,
    shared: Arc<Shared<D>>,
    inflight: Mutex<Option<JoinHandle<()>>>,
    _doc: PhantomData<fn() -> D>,
}

impl<D> DocumentList<D>
where
    D: Doctype + Clone + 'static,
{
    pub fn new(
        store: Arc<dyn DocumentStore>,
        capabilities: ListCapabilities,
        order_by: Option<OrderBy>,
    ) -> Self {
        Self {
            store,
            capabilities,
            order_by,
            shared: Arc::new(Shared::new()),
            inflight: Mutex::new(None),
            _doc: PhantomData,
        }
    }

    pub fn capabilities(&self) -> &ListCapabilities {
        &self.capabilities
    }

    pub fn query(&self) -> ListQuery {
        let mut query = ListQuery::new();
        if !self.capabilities.columns.is_empty() {
            query = query.fields(self.capabilities.columns.iter().cloned());
        }
        for filter in &self.capabilities.filters {
            query = query.filter(filter.clone());
        }
        if let Some(order_by) = &self.order_by {
            query = query.order_by(order_by.field.clone(), order_by.order);
        }
        query
    }

    pub fn state(&self) -> ListState<D> {
        self.shared.get()
    }

    pub fn is_loading(&self) -> bool {
        matches!(self.shared.get(), ListState::Loading)
    }

    /// Current rows; `None` unless the last refresh completed successfully.
    pub fn rows(&self) -> Option<Arc<Vec<D>>> {
        match self.shared.get() {
            ListState::Ready(rows) => Some(rows),
            _ => None,
        }
    }

    /// Computes over the current rows; `None` while loading or failed.
    pub fn aggregate<T, F>(&self, f: F) -> Option<T>
    where
        F: FnOnce(&[D]) -> T,
    {
        self.rows().map(|rows| f(&rows))
    }

    /// Distinct values of a facet field across the current rows.
    pub fn facet_values(&self, facet: &str) -> Vec<String> {
        let Some(rows) = self.rows() else {
            return Vec::new();
        };
        let values: BTreeSet<String> = rows
            .iter()
            .filter_map(|row| serde_json::to_value(row).ok())
            .filter_map(|row| match row.get(facet) {
                Some(Value::String(s)) => Some(s.clone()),
                Some(Value::Null) | None => None,
                Some(other) => Some(other.to_string()),
            })
            .collect();
        values.into_iter().collect()
    }

    /// Fetches and swaps in the rows. Returns `Ok(None)` when a newer refresh
    /// started before this one finished.
    pub async fn refresh(&self) -> Result<Option<Arc<Vec<D>>>, ServiceError> {
        let generation = self.shared.begin();
        let result = fetch::<D>(self.store.as_ref(), &self.query()).await;
        self.shared.complete(generation, result)
    }

    /// Starts a refresh in the background, aborting any earlier one.
    pub fn spawn_refresh(&self) {
        let generation = self.shared.begin();
        let store = self.store.clone();
        let shared = self.shared.clone();
        let query = self.query();
        let handle = tokio::spawn(async move {
            let result = fetch::<D>(store.as_ref(), &query).await;
            if let Err(err) = shared.complete(generation, result) {
                warn!(doctype = D::DOCTYPE, error = %err, "List refresh failed");
            }
        });

        let mut inflight = self.inflight.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(previous) = inflight.replace(handle) {
            previous.abort();
        }
    }
}

impl<D> Drop for DocumentList<D> {
    fn drop(&mut self) {
        if let Ok(mut inflight) = self.inflight.lock() {
            if let Some(handle) = inflight.take() {
                handle.abort();
            }
        }
    }
}

async fn fetch<D: Doctype>(store: &dyn DocumentStore, query: &ListQuery) -> Result<Vec<D>, ServiceError> {
    store
        .list(D::DOCTYPE, query)
        .await?
        .into_iter()
        .map(|raw| serde_json::from_value(raw).map_err(ServiceError::from))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{FileUpload, UploadedFile};
    use async_trait::async_trait;
    use serde::{Deserialize, Serialize};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Row {
        name: String,
        vendor: Option<String>,
    }

    impl Doctype for Row {
        const DOCTYPE: &'static str = "Rows";

        fn name(&self) -> &str {
            &self.name
        }
    }

    /// Answers every list call with one row named after the call index,
    /// after a per-call delay.
    struct SlowStore {
        delays_ms: Vec<u64>,
        calls: AtomicUsize,
        completed: AtomicUsize,
    }

    impl SlowStore {
        fn new(delays_ms: Vec<u64>) -> Self {
            Self {
                delays_ms,
                calls: AtomicUsize::new(0),
                completed: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl DocumentStore for SlowStore {
        async fn list(&self, _: &str, _: &ListQuery) -> Result<Vec<Value>, ServiceError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            let delay = self.delays_ms.get(call).copied().unwrap_or(0);
            tokio::time::sleep(Duration::from_millis(delay)).await;
            self.completed.fetch_add(1, Ordering::SeqCst);
            Ok(vec![json!({"name": format!("call-{}", call), "vendor": "V1"})])
        }
        async fn get(&self, _: &str, _: &str) -> Result<Value, ServiceError> {
            unimplemented!()
        }
        async fn create(&self, _: &str, _: Value) -> Result<Value, ServiceError> {
            unimplemented!()
        }
        async fn update(&self, _: &str, _: &str, _: Value) -> Result<Value, ServiceError> {
            unimplemented!()
        }
        async fn delete(&self, _: &str, _: &str) -> Result<(), ServiceError> {
            unimplemented!()
        }
        async fn count(&self, _: &str, _: &[Filter]) -> Result<u64, ServiceError> {
            unimplemented!()
        }
        async fn call(&self, _: &str, _: Value) -> Result<Value, ServiceError> {
            unimplemented!()
        }
        async fn upload(&self, _: FileUpload) -> Result<UploadedFile, ServiceError> {
            unimplemented!()
        }
    }

    fn list(store: Arc<SlowStore>) -> DocumentList<Row> {
        DocumentList::new(
            store,
            ListCapabilities::new(["name", "vendor"]).facet("vendor"),
            None,
        )
    }

    #[test]
    fn late_response_cannot_replace_a_newer_loading_state() {
        let shared: Shared<Row> = Shared::new();
        let first = shared.begin();
        let second = shared.begin();

        let stale = vec![Row {
            name: "stale".to_string(),
            vendor: None,
        }];
        assert!(shared.complete(first, Ok(stale)).unwrap().is_none());
        assert!(matches!(shared.get(), ListState::Loading));

        let fresh = shared.complete(second, Ok(Vec::new())).unwrap().unwrap();
        assert!(fresh.is_empty());
        assert!(matches!(shared.get(), ListState::Ready(_)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_refreshes_settle_on_the_last_one() {
        let shared: Arc<Shared<Row>> = Arc::new(Shared::new());
        for _ in 0..200 {
            let stale = shared.begin();
            let racer = {
                let shared = shared.clone();
                tokio::spawn(async move { shared.complete(stale, Ok(Vec::new())) })
            };
            let latest = shared.begin();
            racer.await.unwrap().unwrap();
            // Whatever the interleaving, the newer refresh is still pending.
            assert!(matches!(shared.get(), ListState::Loading));
            shared.complete(latest, Ok(Vec::new())).unwrap();
        }
    }

    #[tokio::test(start_paused = true)]
    async fn superseded_response_is_discarded() {
        let store = Arc::new(SlowStore::new(vec![200, 10]));
        let rows = list(store);

        let (first, second) = tokio::join!(rows.refresh(), rows.refresh());
        assert!(first.unwrap().is_none());
        assert_eq!(second.unwrap().unwrap()[0].name, "call-1");
        assert_eq!(rows.rows().unwrap()[0].name, "call-1");
    }

    #[tokio::test(start_paused = true)]
    async fn loading_hides_previous_rows() {
        let store = Arc::new(SlowStore::new(vec![0, 500]));
        let rows = list(store);
        rows.refresh().await.unwrap();
        assert_eq!(rows.aggregate(|r| r.len()), Some(1));
        assert_eq!(rows.facet_values("vendor"), vec!["V1"]);

        rows.spawn_refresh();
        assert!(rows.is_loading());
        assert!(rows.rows().is_none());
        assert_eq!(rows.aggregate(|r| r.len()), None);

        tokio::time::sleep(Duration::from_millis(600)).await;
        assert_eq!(rows.rows().unwrap()[0].name, "call-1");
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_the_list_aborts_the_fetch() {
        let store = Arc::new(SlowStore::new(vec![1_000]));
        let rows = list(store.clone());
        rows.spawn_refresh();
        tokio::task::yield_now().await;
        drop(rows);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(store.completed.load(Ordering::SeqCst), 0);
    }
}
