use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex;
use tracing::debug;
use url::Url;

use crate::models::ResolutionResult;

#[derive(Debug, Clone)]
struct CacheEntry {
    value: ResolutionResult,
    stored_at: DateTime<Utc>,
}

/// Process-local memo of resolution results keyed by the request URL.
///
/// Entries expire lazily: a `get` at or past `stored_at + ttl` is a miss and
/// drops the entry. `put` additionally prunes expired entries and trims the
/// oldest ones beyond `max_entries`.
pub struct ResultCache {
    ttl: Duration,
    max_entries: usize,
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl ResultCache {
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            ttl,
            max_entries: max_entries.max(1),
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub async fn get(&self, key: &str) -> Option<ResolutionResult> {
        self.get_at(key, Utc::now()).await
    }

    pub async fn put(&self, key: &str, value: ResolutionResult) {
        self.put_at(key, value, Utc::now()).await;
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    async fn get_at(&self, key: &str, now: DateTime<Utc>) -> Option<ResolutionResult> {
        let key = normalize_key(key);
        let mut entries = self.entries.lock().await;
        let entry = entries.get(&key)?;

        if now - entry.stored_at >= self.ttl {
            debug!("cache entry for {key} expired");
            entries.remove(&key);
            return None;
        }

        Some(entry.value.clone())
    }

    async fn put_at(&self, key: &str, value: ResolutionResult, now: DateTime<Utc>) {
        let mut entries = self.entries.lock().await;
        entries.retain(|_, entry| now - entry.stored_at < self.ttl);
        entries.insert(
            normalize_key(key),
            CacheEntry {
                value,
                stored_at: now,
            },
        );
        trim_entries(&mut entries, self.max_entries);
    }
}

fn trim_entries(entries: &mut HashMap<String, CacheEntry>, max_entries: usize) {
    if entries.len() <= max_entries {
        return;
    }

    let overflow = entries.len() - max_entries;
    let mut oldest = entries
        .iter()
        .map(|(key, entry)| (key.clone(), entry.stored_at))
        .collect::<Vec<_>>();
    oldest.sort_by_key(|(_, stored_at)| *stored_at);

    for (key, _) in oldest.into_iter().take(overflow) {
        entries.remove(&key);
    }
}

/// Trimmed input; parseable URLs are re-serialized so scheme and host case
/// do not split entries. Different URL shapes of one video stay separate.
pub fn normalize_key(raw: &str) -> String {
    let trimmed = raw.trim();
    Url::parse(trimmed)
        .map(|parsed| parsed.to_string())
        .unwrap_or_else(|_| trimmed.to_string())
}
