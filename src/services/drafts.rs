use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use slog::{debug, warn, Logger};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::cache::{self, CacheBackend};
use crate::errors::ServiceError;

/// Quiet period after the last edit before a draft is written.
pub const DRAFT_DEBOUNCE: Duration = Duration::from_millis(1500);

/// Persists form drafts, coalescing bursts of edits into one write.
///
/// A write happens once no edit has arrived for [`DRAFT_DEBOUNCE`], so
/// consecutive writes are always at least that far apart. A pending draft is
/// flushed when the autosaver is closed.
pub struct DraftAutosaver {
    key: String,
    cache: Arc<dyn CacheBackend>,
    tx: Option<mpsc::UnboundedSender<Value>>,
    task: Option<JoinHandle<()>>,
    writes: Arc<AtomicUsize>,
}

impl DraftAutosaver {
    pub fn spawn(cache: Arc<dyn CacheBackend>, session_id: &str, form: &str, logger: Logger) -> Self {
        let key = cache::draft_key(session_id, form);
        let (tx, rx) = mpsc::unbounded_channel();
        let writes = Arc::new(AtomicUsize::new(0));
        let task = tokio::spawn(debounce_loop(
            rx,
            cache.clone(),
            key.clone(),
            writes.clone(),
            logger,
        ));
        Self {
            key,
            cache,
            tx: Some(tx),
            task: Some(task),
            writes,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Queues the latest form state.
    pub fn update<T: Serialize>(&self, draft: &T) -> Result<(), ServiceError> {
        let value = serde_json::to_value(draft)?;
        self.tx
            .as_ref()
            .ok_or_else(|| ServiceError::InvalidOperation("draft autosaver is closed".to_string()))?
            .send(value)
            .map_err(|_| ServiceError::InternalError("draft autosaver stopped".to_string()))
    }

    /// Number of writes made so far.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub async fn load<T: DeserializeOwned>(&self) -> Result<Option<T>, ServiceError> {
        Ok(cache::get_json(self.cache.as_ref(), &self.key).await?)
    }

    /// Removes the stored draft, e.g. after the form was submitted.
    pub async fn discard(&self) -> Result<(), ServiceError> {
        Ok(self.cache.delete(&self.key).await?)
    }

    /// Stops accepting edits and writes any pending draft.
    pub async fn close(mut self) -> usize {
        self.tx.take();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
        self.writes()
    }
}

impl Drop for DraftAutosaver {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

async fn debounce_loop(
    mut rx: mpsc::UnboundedReceiver<Value>,
    cache: Arc<dyn CacheBackend>,
    key: String,
    writes: Arc<AtomicUsize>,
    logger: Logger,
) {
    while let Some(first) = rx.recv().await {
        let mut pending = first;
        let mut coalesced = 1usize;
        let closed = loop {
            tokio::select! {
                next = rx.recv() => match next {
                    Some(value) => {
                        pending = value;
                        coalesced += 1;
                    }
                    None => break true,
                },
                _ = tokio::time::sleep(DRAFT_DEBOUNCE) => break false,
            }
        };

        match cache::set_json(cache.as_ref(), &key, &pending).await {
            Ok(()) => {
                writes.fetch_add(1, Ordering::SeqCst);
                debug!(logger, "Draft saved"; "key" => &key, "edits" => coalesced);
            }
            Err(err) => warn!(logger, "Failed to save draft"; "key" => &key, "error" => %err),
        }
        if closed {
            return;
        }
    }
}
