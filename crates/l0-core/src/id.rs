//! Entity ID generation.
//!
//! IDs embed a short, readable slice of the entity's name followed by a hash
//! so that remote resource names stay recognizable in the cloud console.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;

/// Total length of a generated ID.
pub const MAX_ID_LENGTH: usize = 12;
/// Minimum number of hash characters in a generated ID.
pub const MIN_ID_HASH_LENGTH: usize = 5;

/// Source of entity IDs, injected into each provider.
pub trait IdGenerator: Send + Sync {
    fn generate(&self, name: &str) -> String;
}

/// Default generator: name slice plus blake3 of time and a counter.
#[derive(Debug, Default)]
pub struct HashIdGenerator {
    counter: AtomicU64,
}

impl HashIdGenerator {
    pub fn new() -> Self {
        Self::default()
    }
}

impl IdGenerator for HashIdGenerator {
    fn generate(&self, name: &str) -> String {
        let mut id: String = name
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .take(MAX_ID_LENGTH - MIN_ID_HASH_LENGTH)
            .collect::<String>()
            .to_ascii_lowercase();

        let seed = format!(
            "{}:{}:{}",
            name,
            Utc::now().timestamp_nanos_opt().unwrap_or_default(),
            self.counter.fetch_add(1, Ordering::Relaxed)
        );
        let hash = blake3::hash(seed.as_bytes()).to_hex();
        id.extend(hash.chars().take(MAX_ID_LENGTH - id.len()));
        id
    }
}

/// Hands out a prepared list of IDs, then `<fallback><n>`.
#[derive(Debug)]
pub struct SequenceIdGenerator {
    queued: Mutex<VecDeque<String>>,
    fallback: String,
    counter: AtomicU64,
}

impl SequenceIdGenerator {
    pub fn new<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            queued: Mutex::new(ids.into_iter().map(Into::into).collect()),
            fallback: "id".to_string(),
            counter: AtomicU64::new(1),
        }
    }

    pub fn with_fallback(mut self, fallback: impl Into<String>) -> Self {
        self.fallback = fallback.into();
        self
    }
}

impl IdGenerator for SequenceIdGenerator {
    fn generate(&self, _name: &str) -> String {
        let next = self.queued.lock().ok().and_then(|mut q| q.pop_front());
        if let Some(id) = next {
            return id;
        }
        format!(
            "{}{}",
            self.fallback,
            self.counter.fetch_add(1, Ordering::Relaxed)
        )
    }
}
