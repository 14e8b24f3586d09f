use async_trait::async_trait;
use bytes::Bytes;
use duet_client::api::{ChunkStorage, TakeProvider};
use duet_client::error::ApiError;
use duet_client::recording::ChunkDestination;
use duet_core::{RoomId, TakeId};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

const URL_PREFIX: &str = "mock://storage";

/// A chunk that reached storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredChunk {
    pub path: String,
    pub content_type: &'static str,
    pub len: usize,
}

/// ChunkStorage double with scripted failures.
///
/// Failures are keyed by the end of the upload path, e.g. `video_0.webm`,
/// and consumed one per attempt.
#[derive(Default)]
pub struct ScriptedStorage {
    put_failures: Mutex<HashMap<String, u32>>,
    target_failures: Mutex<HashMap<String, u32>>,
    stored: Mutex<Vec<StoredChunk>>,
    /// Every PUT attempt (path), successful or not.
    attempts: Mutex<Vec<String>>,
    delay: Duration,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every transfer takes `delay`, which makes overlap observable.
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    pub fn fail_puts(&self, suffix: &str, times: u32) {
        self.put_failures.lock().insert(suffix.to_owned(), times);
    }

    pub fn fail_targets(&self, suffix: &str, times: u32) {
        self.target_failures.lock().insert(suffix.to_owned(), times);
    }

    pub fn stored(&self) -> Vec<StoredChunk> {
        self.stored.lock().clone()
    }

    pub fn stored_paths(&self) -> Vec<String> {
        self.stored.lock().iter().map(|c| c.path.clone()).collect()
    }

    pub fn attempts_for(&self, suffix: &str) -> usize {
        self.attempts
            .lock()
            .iter()
            .filter(|p| p.ends_with(suffix))
            .count()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn take_failure(map: &Mutex<HashMap<String, u32>>, path: &str) -> bool {
        let mut map = map.lock();
        for (suffix, remaining) in map.iter_mut() {
            if path.ends_with(suffix.as_str()) && *remaining > 0 {
                *remaining -= 1;
                return true;
            }
        }
        false
    }
}

#[async_trait]
impl ChunkStorage for ScriptedStorage {
    async fn upload_target(&self, destination: &ChunkDestination) -> Result<String, ApiError> {
        let path = destination.upload_path();
        if Self::take_failure(&self.target_failures, &path) {
            return Err(ApiError::Status {
                endpoint: path,
                status: 500,
            });
        }
        Ok(format!("{URL_PREFIX}{path}"))
    }

    async fn put_chunk(
        &self,
        url: &str,
        content_type: &'static str,
        payload: Bytes,
    ) -> Result<(), ApiError> {
        let path = url.trim_start_matches(URL_PREFIX).to_owned();
        self.attempts.lock().push(path.clone());

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if Self::take_failure(&self.put_failures, &path) {
            return Err(ApiError::Status {
                endpoint: url.to_owned(),
                status: 503,
            });
        }

        tracing::debug!("[ScriptedStorage] stored {} ({} bytes)", path, payload.len());
        self.stored.lock().push(StoredChunk {
            path,
            content_type,
            len: payload.len(),
        });
        Ok(())
    }
}

/// TakeProvider that hands out a fixed sequence of take ids.
pub struct MockTakes {
    ids: Mutex<Vec<TakeId>>,
    requests: Mutex<Vec<RoomId>>,
}

impl MockTakes {
    pub fn new(ids: &[&str]) -> Self {
        Self {
            ids: Mutex::new(ids.iter().rev().map(|id| TakeId::from(*id)).collect()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<RoomId> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl TakeProvider for MockTakes {
    async fn create_take(&self, room_id: &RoomId) -> Result<TakeId, ApiError> {
        self.requests.lock().push(room_id.clone());
        self.ids.lock().pop().ok_or_else(|| ApiError::Status {
            endpoint: format!("/api/takes/create/{room_id}"),
            status: 500,
        })
    }
}
