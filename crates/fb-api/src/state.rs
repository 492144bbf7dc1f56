//! Application state for the API server.

use fb_indexer::Indexer;
use fb_ingestion::TokenBucket;

/// Shared application state.
pub struct AppState<S, B = TokenBucket> {
    /// Analysis queries and, through them, the coordinator and store.
    pub indexer: Indexer<S, B>,
}

impl<S, B> AppState<S, B> {
    /// Create a new application state with the given indexer.
    pub fn new(indexer: Indexer<S, B>) -> Self {
        Self { indexer }
    }
}
