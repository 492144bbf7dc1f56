//! Mock data source for testing.
//!
//! `MockSource` implements `DataSource` with configurable responses,
//! allowing tests to run without network calls.
//!
//! # Usage
//!
//! ```rust,ignore
//! use fb_ingestion::{DataSource, IngestionError, MockSource};
//!
//! let mock = MockSource::new()
//!     .with_entity(team)
//!     .with_response(EntityKey::league("PL"), Err(IngestionError::Server { status: 503 }))
//!     .with_delay(Duration::from_millis(200));
//!
//! let entity = mock.fetch_entity(&team_key).await?;
//! assert_eq!(mock.calls_for(&team_key), 1);
//! ```

use crate::{DataSource, IngestionError};
use fb_types::{Entity, EntityKey};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Default)]
struct MockState {
    /// One-shot responses, consumed in order before `entities` is consulted.
    scripted: HashMap<EntityKey, VecDeque<Result<Entity, IngestionError>>>,

    /// Standing answer per key.
    entities: HashMap<EntityKey, Entity>,

    calls: HashMap<EntityKey, usize>,

    delay: Duration,
}

/// Mock data source for testing.
///
/// Clones share state, so a test can keep a handle to inspect call counts
/// after moving the source into a client.
#[derive(Clone, Default)]
pub struct MockSource {
    state: Arc<Mutex<MockState>>,
    total_calls: Arc<AtomicUsize>,
}

impl MockSource {
    /// Create a new empty mock source. Unknown keys answer `NotFound`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `entity` under its own key on every call (builder pattern).
    pub fn with_entity(self, entity: impl Into<Entity>) -> Self {
        self.set_entity(entity);
        self
    }

    /// Queue a one-shot response for `key` (builder pattern).
    pub fn with_response(self, key: EntityKey, response: Result<Entity, IngestionError>) -> Self {
        self.push_response(key, response);
        self
    }

    /// Delay every response (builder pattern).
    pub fn with_delay(self, delay: Duration) -> Self {
        self.lock().delay = delay;
        self
    }

    /// Replace the standing answer for the entity's key.
    pub fn set_entity(&self, entity: impl Into<Entity>) {
        let entity = entity.into();
        self.lock().entities.insert(entity.key(), entity);
    }

    /// Queue a one-shot response for `key`.
    pub fn push_response(&self, key: EntityKey, response: Result<Entity, IngestionError>) {
        self.lock().scripted.entry(key).or_default().push_back(response);
    }

    /// Total `fetch_entity` calls across all keys.
    pub fn calls(&self) -> usize {
        self.total_calls.load(Ordering::SeqCst)
    }

    /// `fetch_entity` calls for one key.
    pub fn calls_for(&self, key: &EntityKey) -> usize {
        self.lock().calls.get(key).copied().unwrap_or(0)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Record the call and pick the answer.
    fn answer(&self, key: &EntityKey) -> (Duration, Result<Entity, IngestionError>) {
        self.total_calls.fetch_add(1, Ordering::SeqCst);
        let mut state = self.lock();
        *state.calls.entry(key.clone()).or_default() += 1;

        let scripted = state.scripted.get_mut(key).and_then(VecDeque::pop_front);
        let response = match scripted {
            Some(response) => response,
            None => state
                .entities
                .get(key)
                .cloned()
                .ok_or_else(|| IngestionError::NotFound(key.to_string())),
        };
        (state.delay, response)
    }
}

impl DataSource for MockSource {
    async fn fetch_entity(&self, key: &EntityKey) -> Result<Entity, IngestionError> {
        let (delay, response) = self.answer(key);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        response
    }
}
