// src/error.rs
//! Error types for each boundary: console operations, storage, fetches,
//! strategies, per-source runs and the tick driver.

use thiserror::Error;

/// Failures of the persistent store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("store task failed: {0}")]
    Task(String),
    #[error("corrupt row: {0}")]
    Corrupt(String),
}

/// Rejected console operations (source and crawler CRUD, manual runs).
#[derive(Debug, Error)]
pub enum ConsoleError {
    #[error("keyword must not be empty")]
    EmptyKeyword,
    #[error("crawler name must not be empty")]
    EmptyCrawlerName,
    #[error("{what} {id} not found")]
    NotFound { what: &'static str, id: i64 },
    #[error("no recognized field to update")]
    NoOp,
    #[error("crawler `{0}` already exists")]
    DuplicateCrawler(String),
    #[error("invalid crawler: {0}")]
    InvalidCrawler(String),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    RunFailed(#[from] SourceRunError),
}

impl ConsoleError {
    pub fn not_found(what: &'static str, id: i64) -> Self {
        Self::NotFound { what, id }
    }

    /// Message safe to show to an operator. Storage internals are never exposed.
    pub fn user_message(&self) -> String {
        match self {
            Self::Store(_) => "internal storage error".to_string(),
            Self::RunFailed(_) => "collection run failed".to_string(),
            other => other.to_string(),
        }
    }
}

/// Transient failure of a single outbound request.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("http: {0}")]
    Http(#[from] reqwest::Error),
    #[error("upstream status {0}")]
    Status(u16),
    #[error("parse: {0}")]
    Parse(String),
}

/// A strategy could not run at all. The dispatcher falls back on any of these.
#[derive(Debug, Error)]
pub enum StrategyError {
    #[error("invalid strategy config: {0}")]
    Config(String),
    #[error("strategy unavailable: {0}")]
    Unavailable(String),
}

/// Failure while processing one source inside a tick.
#[derive(Debug, Error)]
pub enum SourceRunError {
    #[error("source run panicked: {0}")]
    Panicked(String),
    #[error("store: {0}")]
    Store(#[from] StoreError),
}

/// Failure of the tick driver itself; aborts that tick only.
#[derive(Debug, Error)]
pub enum TickError {
    #[error("loading sources failed: {0}")]
    LoadSources(#[source] StoreError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_errors_are_hidden_from_operators() {
        let e = ConsoleError::Store(StoreError::Corrupt("bad column".into()));
        assert_eq!(e.user_message(), "internal storage error");
        let nf = ConsoleError::not_found("source", 7);
        assert_eq!(nf.user_message(), "source 7 not found");
    }
}
