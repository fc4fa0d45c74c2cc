//! Fire-and-forget call-log sink.
//!
//! `record` returns immediately; a background task drains a bounded
//! in-memory queue into storage. On overflow the oldest record is dropped
//! and a counter incremented — call logs are telemetry, not business state.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::Notify;

use prompthub_core::CallLogRecord;
use prompthub_storage::Storage;

struct SinkInner {
    queue: Mutex<VecDeque<CallLogRecord>>,
    notify: Notify,
    dropped: AtomicU64,
    capacity: usize,
    max_content_len: usize,
}

#[derive(Clone)]
pub struct CallLogSink {
    inner: Arc<SinkInner>,
}

impl CallLogSink {
    /// Spawns the writer task; call from within a tokio runtime.
    #[must_use]
    pub fn start(storage: Arc<Storage>, capacity: usize, max_content_len: usize) -> Self {
        let inner = Arc::new(SinkInner {
            queue: Mutex::new(VecDeque::with_capacity(capacity.min(64))),
            notify: Notify::new(),
            dropped: AtomicU64::new(0),
            capacity: capacity.max(1),
            max_content_len,
        });
        let writer = Arc::clone(&inner);
        tokio::spawn(async move {
            loop {
                let batch: Vec<CallLogRecord> = {
                    let mut queue = writer.queue.lock().unwrap_or_else(|e| e.into_inner());
                    queue.drain(..).collect()
                };
                if batch.is_empty() {
                    writer.notify.notified().await;
                    continue;
                }
                for record in batch {
                    if let Err(e) = storage.insert_call_log(&record) {
                        tracing::warn!(error = %e, "call log write failed, record lost");
                    }
                }
            }
        });
        Self { inner }
    }

    /// Non-blocking append. Content is truncated to the configured maximum
    /// before it leaves the request path.
    pub fn record(&self, mut record: CallLogRecord) {
        truncate_chars(&mut record.rendered_content, self.inner.max_content_len);
        {
            let mut queue = self.inner.queue.lock().unwrap_or_else(|e| e.into_inner());
            if queue.len() >= self.inner.capacity {
                queue.pop_front();
                self.inner.dropped.fetch_add(1, Ordering::Relaxed);
            }
            queue.push_back(record);
        }
        self.inner.notify.notify_one();
    }

    /// Records dropped on overflow since startup.
    #[must_use]
    pub fn dropped_count(&self) -> u64 {
        self.inner.dropped.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn pending(&self) -> usize {
        self.inner.queue.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Waits until the queue has drained. Test helper; bounded by `attempts`
    /// ticks of 10ms.
    pub async fn flush(&self, attempts: u32) {
        for _ in 0..attempts {
            if self.pending() == 0 {
                return;
            }
            self.inner.notify.notify_one();
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
    }
}

fn truncate_chars(text: &mut String, max_chars: usize) {
    if let Some((index, _)) = text.char_indices().nth(max_chars) {
        text.truncate(index);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;
    use uuid::Uuid;

    fn record(content: &str) -> CallLogRecord {
        CallLogRecord {
            id: Uuid::new_v4(),
            prompt_id: None,
            scene_id: Some(Uuid::new_v4()),
            version: None,
            caller_system: Some("tests".to_owned()),
            input_variables: json!({}),
            rendered_content: content.to_owned(),
            token_count: 1,
            response_time_ms: 1,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn records_drain_to_storage() {
        let storage = Arc::new(Storage::in_memory().unwrap());
        let sink = CallLogSink::start(Arc::clone(&storage), 8, 4096);
        sink.record(record("hello"));
        sink.flush(100).await;
        assert_eq!(storage.call_log_count().unwrap(), 1);
        assert_eq!(sink.dropped_count(), 0);
    }

    #[tokio::test]
    async fn overflow_drops_oldest_and_counts() {
        // Single-threaded test runtime: the writer task cannot run between
        // the synchronous appends, so the third append must evict the first.
        let storage = Arc::new(Storage::in_memory().unwrap());
        let sink = CallLogSink::start(Arc::clone(&storage), 2, 4096);
        sink.record(record("a"));
        sink.record(record("b"));
        sink.record(record("c"));
        assert_eq!(sink.dropped_count(), 1);
        assert_eq!(sink.pending(), 2);
        sink.flush(100).await;
        assert_eq!(storage.call_log_count().unwrap(), 2);
    }

    #[tokio::test]
    async fn content_is_truncated() {
        let storage = Arc::new(Storage::in_memory().unwrap());
        let sink = CallLogSink::start(storage, 8, 3);
        sink.record(record("abcdef"));
        let queued = {
            let queue = sink.inner.queue.lock().unwrap();
            queue.back().map(|r| r.rendered_content.clone())
        };
        assert_eq!(queued.as_deref(), Some("abc"));
        sink.flush(100).await;
    }
}
